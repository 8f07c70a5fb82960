mod problem;
mod simplex;
mod solution;

pub use problem::{
    Bounds, Constraint, ConstraintOp, LpProblem, Objective, ProblemError, Sense, VarCategory,
    Variable,
};
pub use simplex::Solver;
pub use solution::{Analysis, ConstraintSlack, ConstraintViolation, Solution, SolutionStatus};
