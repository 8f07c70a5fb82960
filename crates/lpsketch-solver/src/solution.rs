use std::fmt;

/// The result of solving an LP problem
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Solution {
    /// Solution status
    pub status: SolutionStatus,
    /// Values for each variable, in problem column order
    pub values: Vec<f64>,
    /// Objective value at `values`
    pub objective_value: f64,
    /// Slack and binding information (populated when optimal)
    pub analysis: Analysis,
    /// Constraint violations (populated when infeasible)
    pub violations: Vec<ConstraintViolation>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    /// An optimal solution was found
    Optimal,
    /// The solver stopped before reaching a conclusion (iteration limit)
    NotSolved,
    /// The problem is infeasible (no solution exists)
    Infeasible,
    /// The problem is unbounded
    Unbounded,
    /// Solver encountered an error
    Error,
}

impl SolutionStatus {
    /// Numeric status code: `1` optimal, `0` not solved, `-1` infeasible,
    /// `-2` unbounded, `-3` undefined.
    pub fn code(self) -> i32 {
        match self {
            SolutionStatus::Optimal => 1,
            SolutionStatus::NotSolved => 0,
            SolutionStatus::Infeasible => -1,
            SolutionStatus::Unbounded => -2,
            SolutionStatus::Error => -3,
        }
    }

    pub fn is_optimal(self) -> bool {
        matches!(self, SolutionStatus::Optimal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolutionStatus::Optimal => "optimal",
            SolutionStatus::NotSolved => "not solved",
            SolutionStatus::Infeasible => "infeasible",
            SolutionStatus::Unbounded => "unbounded",
            SolutionStatus::Error => "undefined",
        }
    }
}

impl fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-solve analysis of the constraints
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Constraints that hold with equality at the optimum
    pub binding_constraints: Vec<String>,
    /// Activity and slack of every constraint
    pub slacks: Vec<ConstraintSlack>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ConstraintSlack {
    /// Constraint name
    pub constraint: String,
    /// Left-hand side value at the solution
    pub activity: f64,
    /// Distance to the right-hand side (always >= 0 for a satisfied constraint)
    pub slack: f64,
}

/// Information about a violated constraint
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ConstraintViolation {
    /// Constraint name
    pub constraint: String,
    /// Required value (from constraint RHS)
    pub required: f64,
    /// Actual value achieved
    pub actual: f64,
    /// How much the constraint is violated by
    pub violation_amount: f64,
    /// Human-readable description of what's wrong
    pub description: String,
}

impl Solution {
    pub fn infeasible() -> Self {
        Self::infeasible_with_violations(Vec::new())
    }

    pub fn infeasible_with_violations(violations: Vec<ConstraintViolation>) -> Self {
        Self {
            status: SolutionStatus::Infeasible,
            values: Vec::new(),
            objective_value: f64::INFINITY,
            analysis: Analysis::default(),
            violations,
        }
    }

    pub fn infeasible_with_relaxed(
        values: Vec<f64>,
        objective_value: f64,
        violations: Vec<ConstraintViolation>,
    ) -> Self {
        Self {
            status: SolutionStatus::Infeasible,
            values,
            objective_value,
            analysis: Analysis::default(),
            violations,
        }
    }

    pub fn unbounded() -> Self {
        Self::without_values(SolutionStatus::Unbounded, f64::NEG_INFINITY)
    }

    pub fn not_solved() -> Self {
        Self::without_values(SolutionStatus::NotSolved, f64::NAN)
    }

    fn without_values(status: SolutionStatus, objective_value: f64) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value,
            analysis: Analysis::default(),
            violations: Vec::new(),
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status.is_optimal()
    }

    /// Objective value, only when the solution is optimal
    pub fn optimal_value(&self) -> Option<f64> {
        self.is_optimal().then_some(self.objective_value)
    }
}
