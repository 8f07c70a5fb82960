use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    #[error("Duplicate variable name: {0}")]
    DuplicateVariable(String),
    #[error("Duplicate constraint name: {0}")]
    DuplicateConstraint(String),
    #[error("Unknown constraint: {0}")]
    UnknownConstraint(String),
    #[error("Expected {expected} coefficients, found {found}")]
    CoefficientCount { expected: usize, found: usize },
    #[error("Invalid bounds for {name}: lower bound {lower} exceeds upper bound {upper}")]
    InvalidBounds { name: String, lower: f64, upper: f64 },
    #[error("Non-finite value in {0}")]
    NonFinite(String),
}

/// Optimization direction
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

impl Sense {
    pub fn is_minimize(self) -> bool {
        matches!(self, Sense::Minimize)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sense::Minimize => "min",
            Sense::Maximize => "max",
        }
    }
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain of a decision variable
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarCategory {
    #[default]
    Continuous,
    Integer,
    Binary,
}

impl VarCategory {
    pub fn is_integral(self) -> bool {
        !matches!(self, VarCategory::Continuous)
    }
}

/// Variable bounds. `None` means unbounded on that side.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::non_negative()
    }
}

impl Bounds {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    /// `[0, inf)`
    pub fn non_negative() -> Self {
        Self { lower: Some(0.0), upper: None }
    }

    pub fn binary() -> Self {
        Self { lower: Some(0.0), upper: Some(1.0) }
    }

    pub fn free() -> Self {
        Self { lower: None, upper: None }
    }

    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        self.lower.is_none_or(|l| value >= l - tolerance)
            && self.upper.is_none_or(|u| value <= u + tolerance)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub bounds: Bounds,
    pub category: VarCategory,
}

impl Variable {
    pub fn new(name: impl Into<String>, bounds: Bounds, category: VarCategory) -> Self {
        Self {
            name: name.into(),
            bounds,
            category,
        }
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self::new(name, Bounds::non_negative(), VarCategory::Continuous)
    }

    /// Binary variables are always bounded to `[0, 1]`
    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, Bounds::binary(), VarCategory::Binary)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Whether to minimize or maximize
    pub sense: Sense,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// Name/label for the constraint, unique within a problem
    pub name: String,
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

impl Constraint {
    /// Left-hand side activity for the given variable values
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(values)
            .map(|(coef, value)| coef * value)
            .sum()
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        self.op.holds(self.activity(values), self.rhs, tolerance)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl ConstraintOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ConstraintOp::Le => "<=",
            ConstraintOp::Ge => ">=",
            ConstraintOp::Eq => "=",
        }
    }

    /// Operator obtained by multiplying both sides by -1
    pub fn flipped(self) -> Self {
        match self {
            ConstraintOp::Le => ConstraintOp::Ge,
            ConstraintOp::Ge => ConstraintOp::Le,
            ConstraintOp::Eq => ConstraintOp::Eq,
        }
    }

    pub fn holds(self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        match self {
            ConstraintOp::Le => lhs <= rhs + tolerance,
            ConstraintOp::Ge => lhs >= rhs - tolerance,
            ConstraintOp::Eq => (lhs - rhs).abs() <= tolerance,
        }
    }
}

impl fmt::Display for ConstraintOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Represents a linear programming problem
///
/// Coefficient vectors are kept dense: every constraint and the objective
/// always hold exactly one coefficient per variable.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LpProblem {
    name: String,
    variables: Vec<Variable>,
    objective: Objective,
    constraints: Vec<Constraint>,
}

impl LpProblem {
    pub fn new(name: impl Into<String>, sense: Sense) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            objective: Objective {
                coefficients: Vec::new(),
                sense,
            },
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn sense(&self) -> Sense {
        self.objective.sense
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Add a variable and return its column index.
    ///
    /// Existing constraints and the objective get a zero coefficient for it.
    pub fn add_variable(&mut self, variable: Variable) -> Result<usize, ProblemError> {
        if self.variable_index(&variable.name).is_some() {
            return Err(ProblemError::DuplicateVariable(variable.name));
        }
        if [variable.bounds.lower, variable.bounds.upper].into_iter().flatten().any(f64::is_nan) {
            return Err(ProblemError::NonFinite(variable.name));
        }
        if let (Some(lower), Some(upper)) = (variable.bounds.lower, variable.bounds.upper) {
            if lower > upper {
                return Err(ProblemError::InvalidBounds {
                    name: variable.name,
                    lower,
                    upper,
                });
            }
        }

        self.variables.push(variable);
        self.objective.coefficients.push(0.0);
        for c in &mut self.constraints {
            c.coefficients.push(0.0);
        }
        Ok(self.variables.len() - 1)
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>) -> Result<(), ProblemError> {
        self.check_width(&coefficients)?;
        check_finite("objective", &coefficients)?;
        self.objective.coefficients = coefficients;
        Ok(())
    }

    pub fn set_sense(&mut self, sense: Sense) {
        self.objective.sense = sense;
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        coefficients: Vec<f64>,
        op: ConstraintOp,
        rhs: f64,
    ) -> Result<(), ProblemError> {
        let name = name.into();
        if self.constraint(&name).is_some() {
            return Err(ProblemError::DuplicateConstraint(name));
        }
        self.check_width(&coefficients)?;
        check_finite(&name, &coefficients)?;
        check_finite(&name, &[rhs])?;
        self.constraints.push(Constraint {
            name,
            coefficients,
            op,
            rhs,
        });
        Ok(())
    }

    pub fn remove_constraint(&mut self, name: &str) -> Result<Constraint, ProblemError> {
        let idx = self
            .constraints
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ProblemError::UnknownConstraint(name.to_string()))?;
        Ok(self.constraints.remove(idx))
    }

    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
    }

    /// Rename constraints in one step.
    ///
    /// `rename` returns the new name for a constraint, or `None` to keep it.
    /// All new names are validated before any is applied, so either every
    /// constraint is renamed or none is.
    pub fn rename_constraints<F>(&mut self, mut rename: F) -> Result<(), ProblemError>
    where
        F: FnMut(usize, &Constraint) -> Option<String>,
    {
        let new_names: Vec<String> = self
            .constraints
            .iter()
            .enumerate()
            .map(|(i, c)| rename(i, c).unwrap_or_else(|| c.name.clone()))
            .collect();

        let mut seen = HashSet::new();
        for name in &new_names {
            if !seen.insert(name.as_str()) {
                return Err(ProblemError::DuplicateConstraint(name.clone()));
            }
        }

        for (c, name) in self.constraints.iter_mut().zip(new_names) {
            c.name = name;
        }
        Ok(())
    }

    /// Keep only the constraints matching the predicate
    pub fn retain_constraints(&mut self, keep: impl FnMut(&Constraint) -> bool) {
        self.constraints.retain(keep);
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .coefficients
            .iter()
            .zip(values)
            .map(|(coef, value)| coef * value)
            .sum()
    }

    /// Integral variables whose value in `values` is not a whole number
    pub fn fractional_integrals<'a>(
        &'a self,
        values: &'a [f64],
        tolerance: f64,
    ) -> impl Iterator<Item = (&'a Variable, f64)> + 'a {
        self.variables
            .iter()
            .zip(values.iter().copied())
            .filter(move |(v, value)| v.category.is_integral() && (value - value.round()).abs() > tolerance)
    }

    fn check_width(&self, coefficients: &[f64]) -> Result<(), ProblemError> {
        if coefficients.len() != self.variables.len() {
            return Err(ProblemError::CoefficientCount {
                expected: self.variables.len(),
                found: coefficients.len(),
            });
        }
        Ok(())
    }
}

fn check_finite(context: &str, values: &[f64]) -> Result<(), ProblemError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ProblemError::NonFinite(context.to_string()))
    }
}
