mod assignment;
mod backend;
mod error;
mod linear_model;
mod region;
mod render;
mod session;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use assignment::{AssignmentConfig, AssignmentModel, CostMatrix, DEFAULT_COST};
pub use backend::LpSolver;
pub use error::{AssignmentError, ModelError};
pub use linear_model::{
    AUTO_NAME_PREFIX, LinearModel, ModelConstraint, ModelSolution, VariableDefaults, is_auto_name,
};
pub use region::{BoundaryCurve, BoundaryLine, FeasibleRegion, HalfPlane, PlotConfig};
pub use render::render_svg;
pub use session::Session;
