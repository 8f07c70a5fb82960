use lpsketch_lang::{Comparator, LinearError, ParseError};
use lpsketch_solver::{ProblemError, SolutionStatus};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("This problem is not linear: {0}")]
    Linear(#[from] LinearError),
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error("No objective function has been set")]
    NoObjective,
    #[error("Unknown constraint: {0}")]
    UnknownConstraint(String),
    #[error("Constraint already exists as {0}")]
    DuplicateConstraint(String),
    #[error("Constraint name {0} is reserved for generated names")]
    ReservedName(String),
    #[error("Strict comparator {0} cannot be used in a linear program")]
    StrictComparator(Comparator),
    #[error("The problem has no optimal solution (status {status}, code {code})")]
    NotOptimal { status: SolutionStatus, code: i32 },
    #[error("Cannot plot a problem with {0} variables; at most two are supported")]
    TooManyVariables(usize),
    #[error("Cannot plot a problem without variables")]
    TooFewVariables,
    #[error("Rendering failed: {0}")]
    Render(String),
}

impl ModelError {
    pub fn not_optimal(status: SolutionStatus) -> Self {
        ModelError::NotOptimal {
            status,
            code: status.code(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssignmentError {
    #[error("Cost matrix needs at least one resource and one task")]
    EmptyMatrix,
    #[error("Cost matrix must be rectangular: row {row} has {found} columns, expected {expected}")]
    Shape {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Infeasible or unsolved assignment problem (status {status}, code {code})")]
    InfeasibleOrUnsolved { status: SolutionStatus, code: i32 },
    #[error(transparent)]
    Problem(#[from] ProblemError),
}
