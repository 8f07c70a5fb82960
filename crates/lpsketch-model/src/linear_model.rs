use std::collections::BTreeMap;

use lpsketch_lang::{Expr, LinearForm, first_seen_variables, parse_expression, parse_relation};
use lpsketch_solver::{
    Bounds, Constraint, ConstraintOp, ConstraintViolation, LpProblem, Sense, Solution,
    SolutionStatus, Solver, VarCategory, Variable,
};
use tracing::{debug, info, warn};

use crate::backend::LpSolver;
use crate::error::ModelError;

/// Prefix of generated constraint names: `Restriccion_0`, `Restriccion_1`, ...
pub const AUTO_NAME_PREFIX: &str = "Restriccion_";

/// Bounds and category given to decision variables created from the objective
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableDefaults {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub category: VarCategory,
}

impl Default for VariableDefaults {
    fn default() -> Self {
        Self {
            lower: Some(0.0),
            upper: None,
            category: VarCategory::Continuous,
        }
    }
}

impl VariableDefaults {
    pub fn with_lower(mut self, lower: Option<f64>) -> Self {
        self.lower = lower;
        self
    }

    pub fn with_upper(mut self, upper: Option<f64>) -> Self {
        self.upper = upper;
        self
    }

    pub fn with_category(mut self, category: VarCategory) -> Self {
        self.category = category;
        self
    }

    pub fn bounds(&self) -> Bounds {
        match self.category {
            VarCategory::Binary => Bounds::binary(),
            _ => Bounds::new(self.lower, self.upper),
        }
    }
}

/// True if `name` has the shape of a generated constraint name
pub fn is_auto_name(name: &str) -> bool {
    name.strip_prefix(AUTO_NAME_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

fn auto_name(index: usize) -> String {
    format!("{AUTO_NAME_PREFIX}{index}")
}

/// Display text of a constraint, kept in step with the problem rows
#[derive(Debug, Clone, PartialEq)]
struct Entry {
    label: String,
    auto_named: bool,
}

/// A constraint of the model together with the text it was built from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConstraint<'a> {
    pub label: &'a str,
    pub auto_named: bool,
    pub row: &'a Constraint,
}

impl ModelConstraint<'_> {
    pub fn name(&self) -> &str {
        &self.row.name
    }
}

/// Values of the last optimal solve
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSolution {
    pub objective_value: f64,
    pub values: BTreeMap<String, f64>,
    pub binding_constraints: Vec<String>,
}

/// A linear program built from algebraic text.
///
/// Decision variables are fixed by the objective, in the order they first
/// appear in it. Constraints may only use those variables.
#[derive(Debug, Clone)]
pub struct LinearModel<S = Solver> {
    objective_text: String,
    objective: Expr,
    objective_constant: f64,
    defaults: VariableDefaults,
    variables: Vec<String>,
    problem: LpProblem,
    entries: Vec<Entry>,
    objective_set: bool,
    next_index: usize,
    solver: S,
    last_run: Option<Solution>,
    solution: Option<ModelSolution>,
}

impl LinearModel<Solver> {
    /// Parse the objective, create its variables and set it in one step
    pub fn new(objective_text: &str, sense: Sense) -> Result<Self, ModelError> {
        Self::with_defaults(objective_text, sense, VariableDefaults::default())
    }

    pub fn with_defaults(
        objective_text: &str,
        sense: Sense,
        defaults: VariableDefaults,
    ) -> Result<Self, ModelError> {
        let mut model = Self::add_function(objective_text, sense, defaults, Solver::new())?;
        model.set_objective()?;
        Ok(model)
    }
}

impl<S: LpSolver> LinearModel<S> {
    /// Parse `objective_text` and create one decision variable per free
    /// variable, in first-seen order.
    ///
    /// The objective itself is installed by [`set_objective`](Self::set_objective);
    /// until then constraints are rejected with [`ModelError::NoObjective`].
    pub fn add_function(
        objective_text: &str,
        sense: Sense,
        defaults: VariableDefaults,
        solver: S,
    ) -> Result<Self, ModelError> {
        let objective = parse_expression(objective_text)?;
        let variables = first_seen_variables(&objective)?;

        let mut problem = LpProblem::new(objective_text.trim(), sense);
        for name in &variables {
            problem.add_variable(Variable::new(name.clone(), defaults.bounds(), defaults.category))?;
        }
        info!(objective = objective_text.trim(), ?variables, %sense, "created model");

        Ok(Self {
            objective_text: objective_text.trim().to_string(),
            objective,
            objective_constant: 0.0,
            defaults,
            variables,
            problem,
            entries: Vec::new(),
            objective_set: false,
            next_index: 0,
            solver,
            last_run: None,
            solution: None,
        })
    }

    /// Install the objective as `sum(coefficient * variable)` over the fixed
    /// variable order. A constant term is carried into reported values.
    pub fn set_objective(&mut self) -> Result<(), ModelError> {
        let form = LinearForm::from_expr(&self.objective, &self.variables)?;
        debug!(coefficients = ?form.coefficients, constant = form.constant, "objective");
        self.problem.set_objective(form.coefficients)?;
        self.objective_constant = form.constant;
        self.objective_set = true;
        Ok(())
    }

    pub fn objective_text(&self) -> &str {
        &self.objective_text
    }

    pub fn sense(&self) -> Sense {
        self.problem.sense()
    }

    pub fn defaults(&self) -> VariableDefaults {
        self.defaults
    }

    /// Decision variable names in column order
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn problem(&self) -> &LpProblem {
        &self.problem
    }

    pub fn num_constraints(&self) -> usize {
        self.entries.len()
    }

    pub fn constraints(&self) -> impl Iterator<Item = ModelConstraint<'_>> {
        self.entries
            .iter()
            .zip(self.problem.constraints())
            .map(|(entry, row)| ModelConstraint {
                label: &entry.label,
                auto_named: entry.auto_named,
                row,
            })
    }

    pub fn constraint(&self, name: &str) -> Option<ModelConstraint<'_>> {
        self.constraints().find(|c| c.name() == name)
    }

    /// Add `lhs <op> rhs` under the next generated name and return that name.
    ///
    /// A constant term in `lhs` moves to the right-hand side.
    pub fn add_constraint(&mut self, lhs: &str, op: ConstraintOp, rhs: f64) -> Result<String, ModelError> {
        let form = self.linearize(lhs)?;
        let label = format!("{} {op} {rhs}", lhs.trim());
        let name = auto_name(self.next_index);
        self.push(name.clone(), label, form.coefficients, op, rhs - form.constant, true)?;
        self.next_index += 1;
        Ok(name)
    }

    /// Like [`add_constraint`](Self::add_constraint) with a caller-chosen name.
    /// Names shaped like generated ones are reserved.
    pub fn add_named_constraint(
        &mut self,
        name: &str,
        lhs: &str,
        op: ConstraintOp,
        rhs: f64,
    ) -> Result<(), ModelError> {
        if is_auto_name(name) {
            return Err(ModelError::ReservedName(name.to_string()));
        }
        let form = self.linearize(lhs)?;
        let label = format!("{} {op} {rhs}", lhs.trim());
        self.push(name.to_string(), label, form.coefficients, op, rhs - form.constant, false)
    }

    /// Add a whole relation such as `x + y >= 4`.
    ///
    /// Variable terms are gathered on the left and constants on the right.
    /// Strict comparators are rejected.
    pub fn add_relation(&mut self, text: &str) -> Result<String, ModelError> {
        self.require_objective()?;
        let relation = parse_relation(text)?;
        let op = relation
            .comparator
            .constraint_op()
            .ok_or(ModelError::StrictComparator(relation.comparator))?;
        let form = LinearForm::from_relation(&relation, &self.variables)?;

        let name = auto_name(self.next_index);
        self.push(name.clone(), text.trim().to_string(), form.coefficients, op, -form.constant, true)?;
        self.next_index += 1;
        Ok(name)
    }

    /// An existing constraint with the same coefficients, operator and
    /// right-hand side as `lhs <op> rhs`
    pub fn equivalent_constraint(
        &self,
        lhs: &str,
        op: ConstraintOp,
        rhs: f64,
    ) -> Result<Option<ModelConstraint<'_>>, ModelError> {
        let form = self.linearize(lhs)?;
        let rhs = rhs - form.constant;
        Ok(self.constraints().find(|c| {
            c.row.op == op && c.row.rhs == rhs && c.row.coefficients == form.coefficients
        }))
    }

    /// Remove a constraint by name.
    ///
    /// Generated names of the remaining constraints are renumbered to
    /// `Restriccion_0 .. Restriccion_{k-1}` in the same step, and the next
    /// generated name continues at `k`.
    pub fn remove_constraint(&mut self, name: &str) -> Result<Constraint, ModelError> {
        let position = self
            .problem
            .constraints()
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ModelError::UnknownConstraint(name.to_string()))?;

        let mut problem = self.problem.clone();
        let mut entries = self.entries.clone();
        let removed = problem.remove_constraint(name)?;
        entries.remove(position);

        let mut counter = 0;
        let renumbered: Vec<Option<String>> = entries
            .iter()
            .map(|entry| {
                entry.auto_named.then(|| {
                    counter += 1;
                    auto_name(counter - 1)
                })
            })
            .collect();
        problem.rename_constraints(|i, _| renumbered[i].clone())?;

        self.problem = problem;
        self.entries = entries;
        self.next_index = counter;
        info!(constraint = name, remaining = self.entries.len(), "removed constraint");
        Ok(removed)
    }

    /// Remove the constraint at `position` in insertion order
    pub fn remove_constraint_at(&mut self, position: usize) -> Result<Constraint, ModelError> {
        let name = self
            .problem
            .constraints()
            .get(position)
            .map(|c| c.name.clone())
            .ok_or_else(|| ModelError::UnknownConstraint(format!("#{position}")))?;
        self.remove_constraint(&name)
    }

    pub fn clear_constraints(&mut self) {
        self.problem.clear_constraints();
        self.entries.clear();
        self.next_index = 0;
        info!("cleared constraints");
    }

    /// Solve and return the optimal objective value.
    ///
    /// Any status other than optimal is an error; the previous optimal
    /// solution, if any, is left in place.
    pub fn solve(&mut self) -> Result<f64, ModelError> {
        self.require_objective()?;
        let run = self.solver.solve(&self.problem);
        let status = run.status;

        if !status.is_optimal() {
            warn!(%status, code = status.code(), violations = run.violations.len(), "no optimal solution");
            self.last_run = Some(run);
            return Err(ModelError::not_optimal(status));
        }

        for (variable, value) in self.problem.fractional_integrals(&run.values, 1e-6) {
            warn!(variable = %variable.name, value, "fractional value on an integral variable");
        }

        let objective_value = run.objective_value + self.objective_constant;
        let values = self
            .variables
            .iter()
            .cloned()
            .zip(run.values.iter().copied())
            .collect();
        info!(objective_value, "solved");

        self.solution = Some(ModelSolution {
            objective_value,
            values,
            binding_constraints: run.analysis.binding_constraints.clone(),
        });
        self.last_run = Some(run);
        Ok(objective_value)
    }

    /// Status of the most recent solve
    pub fn status(&self) -> Option<SolutionStatus> {
        self.last_run.as_ref().map(|run| run.status)
    }

    /// Variable values of the last optimal solve
    pub fn get_solution(&self) -> Option<&BTreeMap<String, f64>> {
        self.solution.as_ref().map(|s| &s.values)
    }

    pub fn solution(&self) -> Option<&ModelSolution> {
        self.solution.as_ref()
    }

    /// Values of the first two variables in the last optimal solution, with
    /// 0 standing in for a missing second variable
    pub fn solution_point(&self) -> Option<(f64, f64)> {
        let values = self.get_solution()?;
        let mut coords = self
            .variables
            .iter()
            .map(|name| values.get(name).copied().unwrap_or(0.0));
        let x = coords.next()?;
        Some((x, coords.next().unwrap_or(0.0)))
    }

    /// Constraints a relaxed solution violates, after an infeasible solve
    pub fn violations(&self) -> &[ConstraintViolation] {
        self.last_run
            .as_ref()
            .map(|run| run.violations.as_slice())
            .unwrap_or_default()
    }

    fn require_objective(&self) -> Result<(), ModelError> {
        if self.objective_set {
            Ok(())
        } else {
            Err(ModelError::NoObjective)
        }
    }

    fn linearize(&self, lhs: &str) -> Result<LinearForm, ModelError> {
        self.require_objective()?;
        let expr = parse_expression(lhs)?;
        Ok(LinearForm::from_expr(&expr, &self.variables)?)
    }

    fn push(
        &mut self,
        name: String,
        label: String,
        coefficients: Vec<f64>,
        op: ConstraintOp,
        rhs: f64,
        auto_named: bool,
    ) -> Result<(), ModelError> {
        debug!(%name, ?coefficients, %op, rhs, "adding constraint");
        self.problem.add_constraint(name, coefficients, op, rhs)?;
        self.entries.push(Entry { label, auto_named });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpsketch_lang::LinearError;

    fn names<S: LpSolver>(model: &LinearModel<S>) -> Vec<String> {
        model.constraints().map(|c| c.name().to_string()).collect()
    }

    /// Reports a fixed status without solving
    struct FixedStatus(SolutionStatus);

    impl LpSolver for FixedStatus {
        fn solve(&self, _problem: &LpProblem) -> Solution {
            match self.0 {
                SolutionStatus::Infeasible => Solution::infeasible(),
                SolutionStatus::Unbounded => Solution::unbounded(),
                _ => Solution::not_solved(),
            }
        }
    }

    #[test]
    fn test_variables_follow_objective_order() {
        let model = LinearModel::new("3y + 2x + z", Sense::Maximize).unwrap();
        assert_eq!(model.variables(), ["y", "x", "z"]);
        assert_eq!(model.problem().objective().coefficients, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_constraint_before_objective() {
        let mut model = LinearModel::add_function("x + y", Sense::Minimize, VariableDefaults::default(), Solver::new()).unwrap();
        assert_eq!(model.add_constraint("x", ConstraintOp::Le, 1.0), Err(ModelError::NoObjective));
        model.set_objective().unwrap();
        assert!(model.add_constraint("x", ConstraintOp::Le, 1.0).is_ok());
    }

    #[test]
    fn test_auto_names_increment() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        assert_eq!(model.add_constraint("x", ConstraintOp::Le, 1.0).unwrap(), "Restriccion_0");
        assert_eq!(model.add_constraint("y", ConstraintOp::Le, 1.0).unwrap(), "Restriccion_1");
        assert_eq!(model.constraint("Restriccion_1").unwrap().label, "y <= 1");
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        let err = model.add_constraint("x + z", ConstraintOp::Le, 1.0).unwrap_err();
        assert_eq!(err, ModelError::Linear(LinearError::UnknownVariable("z".into())));
        assert_eq!(model.num_constraints(), 0);
    }

    #[test]
    fn test_nonlinear_constraint_rejected() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        let err = model.add_constraint("x*y", ConstraintOp::Le, 1.0).unwrap_err();
        assert!(matches!(err, ModelError::Linear(LinearError::NonLinearTerm { .. })));
        assert_eq!(model.num_constraints(), 0);
    }

    #[test]
    fn test_constant_moves_to_rhs() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        model.add_constraint("x + y + 2", ConstraintOp::Le, 6.0).unwrap();
        let row = model.constraint("Restriccion_0").unwrap().row;
        assert_eq!(row.coefficients, vec![1.0, 1.0]);
        assert_eq!(row.rhs, 4.0);
    }

    #[test]
    fn test_non_finite_constraint_rejected() {
        let mut model = LinearModel::new("x", Sense::Maximize).unwrap();
        let err = model.add_relation("x <= (-1)^0.5").unwrap_err();
        assert!(matches!(err, ModelError::Linear(LinearError::NonFinite(_))), "{err}");
        let err = model.add_constraint("(-1)^0.5*x", ConstraintOp::Le, 4.0).unwrap_err();
        assert!(matches!(err, ModelError::Linear(LinearError::NonFinite(_))), "{err}");
        let err = model.add_constraint("x", ConstraintOp::Le, f64::NAN).unwrap_err();
        assert!(matches!(err, ModelError::Problem(_)), "{err}");
        assert_eq!(model.num_constraints(), 0);
    }

    #[test]
    fn test_integer_relaxation_reports_fractional_value() {
        let defaults = VariableDefaults::default().with_category(VarCategory::Integer);
        let mut model = LinearModel::with_defaults("x", Sense::Maximize, defaults).unwrap();
        model.add_constraint("2x", ConstraintOp::Le, 5.0).unwrap();
        assert!((model.solve().unwrap() - 2.5).abs() < 1e-9);

        let values: Vec<f64> = model.get_solution().unwrap().values().copied().collect();
        let fractional: Vec<_> = model
            .problem()
            .fractional_integrals(&values, 1e-6)
            .map(|(v, _)| v.name.clone())
            .collect();
        assert_eq!(fractional, vec!["x"]);
    }

    #[test]
    fn test_add_relation() {
        let mut model = LinearModel::new("x + y", Sense::Minimize).unwrap();
        let name = model.add_relation("2x + 1 >= y - 3").unwrap();
        let row = model.constraint(&name).unwrap().row;
        assert_eq!(row.coefficients, vec![2.0, -1.0]);
        assert_eq!(row.op, ConstraintOp::Ge);
        assert_eq!(row.rhs, -4.0);

        let err = model.add_relation("x < 3").unwrap_err();
        assert!(matches!(err, ModelError::StrictComparator(_)));
    }

    #[test]
    fn test_named_constraints() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        model.add_named_constraint("capacity", "x + y", ConstraintOp::Le, 4.0).unwrap();
        assert_eq!(
            model.add_named_constraint("Restriccion_7", "x", ConstraintOp::Le, 1.0),
            Err(ModelError::ReservedName("Restriccion_7".into()))
        );
        assert!(model.add_named_constraint("capacity", "x", ConstraintOp::Le, 1.0).is_err());
    }

    #[test]
    fn test_remove_renumbers() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        model.add_constraint("x", ConstraintOp::Le, 1.0).unwrap();
        model.add_named_constraint("cap", "x + y", ConstraintOp::Le, 5.0).unwrap();
        model.add_constraint("y", ConstraintOp::Le, 2.0).unwrap();
        model.add_constraint("x - y", ConstraintOp::Ge, 0.0).unwrap();

        model.remove_constraint("Restriccion_0").unwrap();
        assert_eq!(names(&model), vec!["cap", "Restriccion_0", "Restriccion_1"]);
        assert_eq!(model.constraint("Restriccion_0").unwrap().label, "y <= 2");
        assert_eq!(model.add_constraint("x", ConstraintOp::Ge, 0.0).unwrap(), "Restriccion_2");
    }

    #[test]
    fn test_remove_by_position() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        for rhs in [1.0, 2.0, 3.0] {
            model.add_constraint("x", ConstraintOp::Le, rhs).unwrap();
        }
        let removed = model.remove_constraint_at(1).unwrap();
        assert_eq!(removed.rhs, 2.0);
        assert_eq!(names(&model), vec!["Restriccion_0", "Restriccion_1"]);
        assert!(model.remove_constraint_at(2).is_err());
        assert!(matches!(model.remove_constraint("missing"), Err(ModelError::UnknownConstraint(_))));
    }

    #[test]
    fn test_clear_restarts_numbering() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        model.add_constraint("x", ConstraintOp::Le, 1.0).unwrap();
        model.add_constraint("y", ConstraintOp::Le, 1.0).unwrap();
        model.clear_constraints();
        assert_eq!(model.num_constraints(), 0);
        assert_eq!(model.add_constraint("y", ConstraintOp::Le, 1.0).unwrap(), "Restriccion_0");
    }

    #[test]
    fn test_solve_and_solution() {
        let mut model = LinearModel::new("3x + 2y + 1", Sense::Maximize).unwrap();
        assert!(model.get_solution().is_none());
        model.add_constraint("x + y", ConstraintOp::Le, 4.0).unwrap();
        model.add_constraint("x + 3y", ConstraintOp::Le, 6.0).unwrap();
        model.add_constraint("x", ConstraintOp::Le, 3.0).unwrap();

        let value = model.solve().unwrap();
        assert!((value - 12.0).abs() < 1e-6);
        assert_eq!(model.status(), Some(SolutionStatus::Optimal));
        let solution = model.get_solution().unwrap();
        assert!((solution["x"] - 3.0).abs() < 1e-6);
        assert!((solution["y"] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_solve_keeps_previous_solution() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        model.add_constraint("x + y", ConstraintOp::Le, 2.0).unwrap();
        model.solve().unwrap();

        model.add_constraint("x + y", ConstraintOp::Ge, 5.0).unwrap();
        let err = model.solve().unwrap_err();
        assert_eq!(err, ModelError::NotOptimal { status: SolutionStatus::Infeasible, code: -1 });
        assert_eq!(model.status(), Some(SolutionStatus::Infeasible));
        assert!(model.get_solution().is_some());
        assert!(!model.violations().is_empty());
    }

    #[test]
    fn test_custom_solver_status_surfaces() {
        let mut model = LinearModel::add_function(
            "x",
            Sense::Maximize,
            VariableDefaults::default(),
            FixedStatus(SolutionStatus::Unbounded),
        )
        .unwrap();
        model.set_objective().unwrap();
        assert_eq!(
            model.solve(),
            Err(ModelError::NotOptimal { status: SolutionStatus::Unbounded, code: -2 })
        );
        assert!(model.get_solution().is_none());
    }

    #[test]
    fn test_equivalent_constraint() {
        let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        model.add_constraint("x + y", ConstraintOp::Le, 4.0).unwrap();
        let found = model.equivalent_constraint("y + x", ConstraintOp::Le, 4.0).unwrap();
        assert_eq!(found.map(|c| c.name().to_string()), Some("Restriccion_0".to_string()));
        assert!(model.equivalent_constraint("x + y", ConstraintOp::Ge, 4.0).unwrap().is_none());
    }

    #[test]
    fn test_variable_defaults() {
        let defaults = VariableDefaults::default().with_lower(Some(1.0)).with_upper(Some(2.0));
        let mut model = LinearModel::with_defaults("x", Sense::Maximize, defaults).unwrap();
        assert!((model.solve().unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_auto_name() {
        assert!(is_auto_name("Restriccion_12"));
        assert!(!is_auto_name("Restriccion_"));
        assert!(!is_auto_name("Restriccion_x"));
        assert!(!is_auto_name("capacity"));
    }
}
