use tracing::{debug, trace, warn};

use crate::problem::{ConstraintOp, LpProblem};
use crate::solution::{Analysis, ConstraintSlack, ConstraintViolation, Solution, SolutionStatus};

/// Simplex solver for linear programming problems
///
/// Uses the two-phase method with Bland's pivoting rule, which cannot cycle on
/// the highly degenerate problems produced by assignment models.
#[derive(Debug, Clone)]
pub struct Solver {
    /// Maximum pivots per phase before giving up
    max_iterations: usize,
    /// Tolerance for pivot selection
    tolerance: f64,
    /// Tolerance for feasibility and binding checks
    feasibility_tolerance: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            tolerance: 1e-9,
            feasibility_tolerance: 1e-7,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_feasibility_tolerance(mut self, tol: f64) -> Self {
        self.feasibility_tolerance = tol;
        self
    }

    /// Solve the LP problem using the two-phase simplex method
    pub fn solve(&self, problem: &LpProblem) -> Solution {
        debug!(
            problem = problem.name(),
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            sense = %problem.sense(),
            "solving LP"
        );

        match self.solve_strict(problem) {
            Outcome::Optimal(values) => self.optimal_solution(problem, values),
            Outcome::Unbounded => Solution::unbounded(),
            Outcome::IterationLimit => {
                warn!(
                    problem = problem.name(),
                    max_iterations = self.max_iterations,
                    "simplex iteration limit reached"
                );
                Solution::not_solved()
            }
            Outcome::Infeasible => self.solve_with_relaxation(problem),
        }
    }

    /// When the problem is infeasible, solve it again without its
    /// `>=` constraints and report which of them the relaxed optimum violates
    fn solve_with_relaxation(&self, problem: &LpProblem) -> Solution {
        let mut relaxed = problem.clone();
        relaxed.retain_constraints(|c| c.op != ConstraintOp::Ge);

        let Outcome::Optimal(values) = self.solve_strict(&relaxed) else {
            return Solution::infeasible();
        };

        let violations = self.find_violations(problem, &values);
        if violations.is_empty() {
            // No violations means the full problem should have been feasible
            return self.optimal_solution(problem, values);
        }

        let objective_value = problem.objective_value(&values);
        Solution::infeasible_with_relaxed(values, objective_value, violations)
    }

    fn solve_strict(&self, problem: &LpProblem) -> Outcome {
        let form = StandardForm::new(problem);
        let mut tableau = Tableau::new(&form.rows, form.n_columns);

        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau) {
                PhaseResult::Optimal => {}
                PhaseResult::Unbounded => return Outcome::Infeasible,
                PhaseResult::IterationLimit => return Outcome::IterationLimit,
            }
            let rhs_col = tableau.rhs_col();
            let art_start = tableau.artificial_start();
            let infeasible = (0..tableau.n_rows()).any(|i| {
                tableau.basic_vars[i] >= art_start
                    && tableau.data[i][rhs_col] > self.feasibility_tolerance
            });
            if infeasible {
                return Outcome::Infeasible;
            }
            self.drive_out_artificials(&mut tableau);
        }

        tableau.load_objective(&form.objective, problem.sense().is_minimize());

        // Artificial columns may never re-enter the basis
        let limit = tableau.artificial_start();
        match self.iterate(&mut tableau, limit) {
            PhaseResult::Optimal => {}
            PhaseResult::Unbounded => return Outcome::Unbounded,
            PhaseResult::IterationLimit => return Outcome::IterationLimit,
        }

        let column_values = tableau.column_values();
        Outcome::Optimal(form.recover(&column_values, self.tolerance))
    }

    fn phase1(&self, tableau: &mut Tableau) -> PhaseResult {
        // Auxiliary objective: maximize -sum(artificials)
        let obj_row = tableau.obj_row();
        let art_start = tableau.artificial_start();
        let width = tableau.width;

        tableau.data[obj_row] = vec![0.0; width];
        for j in art_start..(art_start + tableau.n_artificial) {
            tableau.data[obj_row][j] = -1.0;
        }

        // Price out the basic artificials
        for i in 0..tableau.n_rows() {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..width {
                    tableau.data[obj_row][j] += tableau.data[i][j];
                }
            }
        }

        let limit = tableau.rhs_col();
        self.iterate(tableau, limit)
    }

    /// Pivot zero-valued artificials out of the basis. Rows where that is
    /// impossible are redundant and stay inert during phase 2.
    fn drive_out_artificials(&self, tableau: &mut Tableau) {
        let art_start = tableau.artificial_start();
        for i in 0..tableau.n_rows() {
            if tableau.basic_vars[i] < art_start {
                continue;
            }
            let replacement = (0..art_start).find(|&j| tableau.data[i][j].abs() > self.tolerance);
            match replacement {
                Some(j) => tableau.pivot(i, j),
                None => trace!(row = i, "redundant constraint row"),
            }
        }
    }

    /// Run simplex pivots over columns `0..limit` until optimal
    fn iterate(&self, tableau: &mut Tableau, limit: usize) -> PhaseResult {
        for iteration in 0..self.max_iterations {
            let Some(pivot_col) = self.find_pivot_column(tableau, limit) else {
                trace!(iterations = iteration, "simplex phase finished");
                return PhaseResult::Optimal;
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return PhaseResult::Unbounded;
            };
            tableau.pivot(pivot_row, pivot_col);
        }
        PhaseResult::IterationLimit
    }

    /// Bland's rule: the lowest-index column with a positive reduced cost
    fn find_pivot_column(&self, tableau: &Tableau, limit: usize) -> Option<usize> {
        let obj_row = tableau.obj_row();
        (0..limit).find(|&j| tableau.data[obj_row][j] > self.tolerance)
    }

    /// Minimum ratio test, ties broken by the lowest basic variable index
    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let rhs_col = tableau.rhs_col();
        let mut best: Option<(f64, usize)> = None;

        for i in 0..tableau.n_rows() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = tableau.data[i][rhs_col].max(0.0) / val;
            best = match best {
                None => Some((ratio, i)),
                Some((min_ratio, min_row)) => {
                    if ratio < min_ratio - self.tolerance
                        || ((ratio - min_ratio).abs() <= self.tolerance
                            && tableau.basic_vars[i] < tableau.basic_vars[min_row])
                    {
                        Some((ratio, i))
                    } else {
                        Some((min_ratio, min_row))
                    }
                }
            };
        }

        best.map(|(_, row)| row)
    }

    fn optimal_solution(&self, problem: &LpProblem, values: Vec<f64>) -> Solution {
        let objective_value = problem.objective_value(&values);
        let analysis = self.analyze(problem, &values);
        debug!(objective = objective_value, "optimal solution found");

        Solution {
            status: SolutionStatus::Optimal,
            values,
            objective_value,
            analysis,
            violations: Vec::new(),
        }
    }

    fn analyze(&self, problem: &LpProblem, values: &[f64]) -> Analysis {
        let mut binding_constraints = Vec::new();
        let mut slacks = Vec::with_capacity(problem.num_constraints());

        for c in problem.constraints() {
            let activity = c.activity(values);
            let slack = match c.op {
                ConstraintOp::Le => c.rhs - activity,
                ConstraintOp::Ge => activity - c.rhs,
                ConstraintOp::Eq => 0.0,
            };
            if slack.abs() <= self.feasibility_tolerance * (1.0 + c.rhs.abs()) {
                binding_constraints.push(c.name.clone());
            }
            slacks.push(ConstraintSlack {
                constraint: c.name.clone(),
                activity,
                slack,
            });
        }

        Analysis {
            binding_constraints,
            slacks,
        }
    }

    /// Find which constraints are violated by a given solution
    fn find_violations(&self, problem: &LpProblem, values: &[f64]) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        for c in problem.constraints() {
            let lhs = c.activity(values);
            if c.op.holds(lhs, c.rhs, self.feasibility_tolerance) {
                continue;
            }

            let (violation_amount, description) = match c.op {
                ConstraintOp::Le => {
                    let amt = lhs - c.rhs;
                    (amt, format!("{} exceeds maximum of {:.2} by {:.2}", c.name, c.rhs, amt))
                }
                ConstraintOp::Ge => {
                    let amt = c.rhs - lhs;
                    (amt, format!("{} is below minimum of {:.2} by {:.2}", c.name, c.rhs, amt))
                }
                ConstraintOp::Eq => (
                    (lhs - c.rhs).abs(),
                    format!("{} requires exactly {:.2} but got {:.2}", c.name, c.rhs, lhs),
                ),
            };

            violations.push(ConstraintViolation {
                constraint: c.name.clone(),
                required: c.rhs,
                actual: lhs,
                violation_amount,
                description,
            });
        }

        // Sort by violation amount (worst first)
        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));
        violations
    }
}

enum Outcome {
    Optimal(Vec<f64>),
    Infeasible,
    Unbounded,
    IterationLimit,
}

enum PhaseResult {
    Optimal,
    Unbounded,
    IterationLimit,
}

/// How one problem variable maps onto non-negative tableau columns:
/// `value = offset + sum(sign * column)`
struct ColumnMap {
    offset: f64,
    columns: Vec<(usize, f64)>,
}

struct Row {
    coefficients: Vec<f64>,
    op: ConstraintOp,
    rhs: f64,
}

/// The problem rewritten over non-negative columns, with finite upper bounds
/// turned into extra `<=` rows
struct StandardForm {
    mapping: Vec<ColumnMap>,
    n_columns: usize,
    rows: Vec<Row>,
    objective: Vec<f64>,
}

impl StandardForm {
    fn new(problem: &LpProblem) -> Self {
        let mut mapping = Vec::with_capacity(problem.num_variables());
        let mut n_columns = 0;
        let mut upper_rows = Vec::new();

        for var in problem.variables() {
            let map = match (var.bounds.lower, var.bounds.upper) {
                (Some(lower), upper) => {
                    let col = n_columns;
                    n_columns += 1;
                    if let Some(upper) = upper {
                        upper_rows.push((col, upper - lower));
                    }
                    ColumnMap {
                        offset: lower,
                        columns: vec![(col, 1.0)],
                    }
                }
                (None, Some(upper)) => {
                    let col = n_columns;
                    n_columns += 1;
                    ColumnMap {
                        offset: upper,
                        columns: vec![(col, -1.0)],
                    }
                }
                (None, None) => {
                    let col = n_columns;
                    n_columns += 2;
                    ColumnMap {
                        offset: 0.0,
                        columns: vec![(col, 1.0), (col + 1, -1.0)],
                    }
                }
            };
            mapping.push(map);
        }

        let mut rows: Vec<Row> = problem
            .constraints()
            .iter()
            .map(|c| Row {
                coefficients: expand(&mapping, n_columns, &c.coefficients),
                op: c.op,
                rhs: c.rhs - shift(&mapping, &c.coefficients),
            })
            .collect();

        for (col, upper) in upper_rows {
            let mut coefficients = vec![0.0; n_columns];
            coefficients[col] = 1.0;
            rows.push(Row {
                coefficients,
                op: ConstraintOp::Le,
                rhs: upper,
            });
        }

        let objective = expand(&mapping, n_columns, &problem.objective().coefficients);

        Self {
            mapping,
            n_columns,
            rows,
            objective,
        }
    }

    fn recover(&self, column_values: &[f64], tolerance: f64) -> Vec<f64> {
        self.mapping
            .iter()
            .map(|m| {
                let value = m.offset
                    + m.columns
                        .iter()
                        .map(|&(col, sign)| sign * column_values[col])
                        .sum::<f64>();
                if value.abs() < tolerance { 0.0 } else { value }
            })
            .collect()
    }
}

fn expand(mapping: &[ColumnMap], n_columns: usize, coefficients: &[f64]) -> Vec<f64> {
    let mut row = vec![0.0; n_columns];
    for (coef, map) in coefficients.iter().zip(mapping) {
        for &(col, sign) in &map.columns {
            row[col] += coef * sign;
        }
    }
    row
}

fn shift(mapping: &[ColumnMap], coefficients: &[f64]) -> f64 {
    coefficients
        .iter()
        .zip(mapping)
        .map(|(coef, map)| coef * map.offset)
        .sum()
}

/// Dense simplex tableau. The last row is the objective row, stored so that a
/// positive entry marks a column whose entry improves the objective.
struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    width: usize,
    n_structural: usize,
    n_slack: usize,
    n_artificial: usize,
}

impl Tableau {
    fn new(rows: &[Row], n_structural: usize) -> Self {
        // Make every RHS non-negative first
        let rows: Vec<Row> = rows
            .iter()
            .map(|r| {
                if r.rhs < 0.0 {
                    Row {
                        coefficients: r.coefficients.iter().map(|c| -c).collect(),
                        op: r.op.flipped(),
                        rhs: -r.rhs,
                    }
                } else {
                    Row {
                        coefficients: r.coefficients.clone(),
                        op: r.op,
                        rhs: r.rhs,
                    }
                }
            })
            .collect();

        let mut n_slack = 0;
        let mut n_artificial = 0;
        for r in &rows {
            match r.op {
                ConstraintOp::Le => n_slack += 1,
                ConstraintOp::Ge => {
                    n_slack += 1; // surplus
                    n_artificial += 1;
                }
                ConstraintOp::Eq => n_artificial += 1,
            }
        }

        let width = n_structural + n_slack + n_artificial + 1; // +1 for RHS
        let mut data = vec![vec![0.0; width]; rows.len() + 1]; // +1 for objective
        let mut basic_vars = vec![0; rows.len()];

        let mut slack_idx = n_structural;
        let mut artificial_idx = n_structural + n_slack;

        for (i, r) in rows.iter().enumerate() {
            data[i][..n_structural].copy_from_slice(&r.coefficients);
            data[i][width - 1] = r.rhs;

            match r.op {
                ConstraintOp::Le => {
                    data[i][slack_idx] = 1.0;
                    basic_vars[i] = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    data[i][slack_idx] = -1.0;
                    slack_idx += 1;
                    data[i][artificial_idx] = 1.0;
                    basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    data[i][artificial_idx] = 1.0;
                    basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        Self {
            data,
            basic_vars,
            width,
            n_structural,
            n_slack,
            n_artificial,
        }
    }

    fn n_rows(&self) -> usize {
        self.basic_vars.len()
    }

    fn obj_row(&self) -> usize {
        self.data.len() - 1
    }

    fn rhs_col(&self) -> usize {
        self.width - 1
    }

    fn artificial_start(&self) -> usize {
        self.n_structural + self.n_slack
    }

    /// Install the real objective and price out the current basis.
    /// Simplex maximizes, so minimization negates the coefficients.
    fn load_objective(&mut self, objective: &[f64], minimize: bool) {
        let obj_row = self.obj_row();
        self.data[obj_row] = vec![0.0; self.width];
        for (j, &coef) in objective.iter().enumerate() {
            self.data[obj_row][j] = if minimize { -coef } else { coef };
        }

        for i in 0..self.n_rows() {
            let basic = self.basic_vars[i];
            let ratio = self.data[obj_row][basic];
            if ratio != 0.0 {
                for j in 0..self.width {
                    self.data[obj_row][j] -= ratio * self.data[i][j];
                }
            }
        }
    }

    fn pivot(&mut self, row: usize, col: usize) {
        self.basic_vars[row] = col;

        let pivot_val = self.data[row][col];
        for j in 0..self.width {
            self.data[row][j] /= pivot_val;
        }

        let pivot_row = self.data[row].clone();
        for (i, r) in self.data.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = r[col];
            if factor != 0.0 {
                for (value, p) in r.iter_mut().zip(&pivot_row) {
                    *value -= factor * p;
                }
            }
        }
    }

    fn column_values(&self) -> Vec<f64> {
        let rhs_col = self.rhs_col();
        let mut values = vec![0.0; self.n_structural];
        for (i, &basic) in self.basic_vars.iter().enumerate() {
            if basic < self.n_structural {
                values[basic] = self.data[i][rhs_col];
            }
        }
        values
    }
}
