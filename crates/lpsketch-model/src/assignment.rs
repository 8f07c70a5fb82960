use std::collections::BTreeMap;

use lpsketch_solver::{
    Bounds, ConstraintOp, LpProblem, Sense, SolutionStatus, Solver, VarCategory, Variable,
};
use tracing::{debug, info, warn};

use crate::backend::LpSolver;
use crate::error::AssignmentError;

/// Cost given to cells of a newly added resource or task
pub const DEFAULT_COST: f64 = 1e6;

/// Values at or below this are treated as unassigned
const ASSIGNED_TOLERANCE: f64 = 1e-9;

/// Rectangular cost grid: rows are resources, columns are tasks
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>"))]
#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrix {
    costs: Vec<Vec<f64>>,
}

impl TryFrom<Vec<Vec<f64>>> for CostMatrix {
    type Error = AssignmentError;

    fn try_from(costs: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::new(costs)
    }
}

impl From<CostMatrix> for Vec<Vec<f64>> {
    fn from(matrix: CostMatrix) -> Self {
        matrix.costs
    }
}

impl CostMatrix {
    /// Fails on an empty or ragged matrix
    pub fn new(costs: Vec<Vec<f64>>) -> Result<Self, AssignmentError> {
        let expected = costs.first().map(Vec::len).unwrap_or(0);
        if expected == 0 {
            return Err(AssignmentError::EmptyMatrix);
        }
        if let Some((row, found)) = costs
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|&(_, len)| len != expected)
        {
            return Err(AssignmentError::Shape { row, expected, found });
        }
        Ok(Self { costs })
    }

    pub fn num_resources(&self) -> usize {
        self.costs.len()
    }

    pub fn num_tasks(&self) -> usize {
        self.costs[0].len()
    }

    /// `(resources, tasks)`
    pub fn shape(&self) -> (usize, usize) {
        (self.num_resources(), self.num_tasks())
    }

    pub fn get(&self, resource: usize, task: usize) -> Option<f64> {
        self.costs.get(resource)?.get(task).copied()
    }

    /// Overwrite one cell; returns `false` if it is out of range
    pub fn set(&mut self, resource: usize, task: usize, cost: f64) -> bool {
        match self.costs.get_mut(resource).and_then(|row| row.get_mut(task)) {
            Some(cell) => {
                *cell = cost;
                true
            }
            None => false,
        }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.costs
    }

    /// Append a resource row filled with `default_cost`; returns its index
    pub fn add_resource(&mut self, default_cost: f64) -> usize {
        self.costs.push(vec![default_cost; self.num_tasks()]);
        self.costs.len() - 1
    }

    /// Append a task column filled with `default_cost`; returns its index
    pub fn add_task(&mut self, default_cost: f64) -> usize {
        for row in &mut self.costs {
            row.push(default_cost);
        }
        self.num_tasks() - 1
    }

    /// `sum(cost * amount)` over an assignment
    pub fn total_cost(&self, assignment: &BTreeMap<(usize, usize), f64>) -> f64 {
        assignment
            .iter()
            .filter_map(|(&(r, t), amount)| self.get(r, t).map(|cost| cost * amount))
            .sum()
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentConfig {
    /// Resources every task needs
    pub max_resources_per_task: u32,
    /// Tasks a resource may take on
    pub max_tasks_per_resource: u32,
    /// Let a task go unserved: its constraint becomes `sum <= 1`
    pub allow_unassigned_tasks: bool,
    pub category: VarCategory,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_resources_per_task: 1,
            max_tasks_per_resource: 1,
            allow_unassigned_tasks: false,
            category: VarCategory::Binary,
        }
    }
}

fn variable_name(resource: usize, task: usize) -> String {
    format!("x_{resource}_{task}")
}

/// Minimum-cost assignment of resources to tasks.
///
/// Holds one variable per cost cell. Each [`solve`](Self::solve) rebuilds the
/// objective and constraints from the current matrix, so resizing between
/// solves never leaves stale rows behind.
#[derive(Debug, Clone)]
pub struct AssignmentModel<S = Solver> {
    costs: CostMatrix,
    config: AssignmentConfig,
    grid: Vec<Vec<Variable>>,
    solver: S,
    status: Option<SolutionStatus>,
    solution: Option<BTreeMap<(usize, usize), f64>>,
}

impl AssignmentModel<Solver> {
    pub fn new(costs: CostMatrix, config: AssignmentConfig) -> Self {
        Self::with_solver(costs, config, Solver::new())
    }
}

impl<S: LpSolver> AssignmentModel<S> {
    pub fn with_solver(costs: CostMatrix, config: AssignmentConfig, solver: S) -> Self {
        let grid = (0..costs.num_resources())
            .map(|r| (0..costs.num_tasks()).map(|t| Self::cell(&config, r, t)).collect())
            .collect();
        Self {
            costs,
            config,
            grid,
            solver,
            status: None,
            solution: None,
        }
    }

    fn cell(config: &AssignmentConfig, resource: usize, task: usize) -> Variable {
        let name = variable_name(resource, task);
        match config.category {
            VarCategory::Continuous => Variable::new(name, Bounds::non_negative(), VarCategory::Continuous),
            category => Variable::new(name, Bounds::binary(), category),
        }
    }

    pub fn costs(&self) -> &CostMatrix {
        &self.costs
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: AssignmentConfig) {
        self.config = config;
        for (r, row) in self.grid.iter_mut().enumerate() {
            for (t, variable) in row.iter_mut().enumerate() {
                *variable = Self::cell(&config, r, t);
            }
        }
    }

    /// Variable grid, same shape as the cost matrix
    pub fn variables(&self) -> &[Vec<Variable>] {
        &self.grid
    }

    pub fn add_resource(&mut self, default_cost: f64) -> usize {
        let r = self.costs.add_resource(default_cost);
        let row = (0..self.costs.num_tasks())
            .map(|t| Self::cell(&self.config, r, t))
            .collect();
        self.grid.push(row);
        r
    }

    pub fn add_task(&mut self, default_cost: f64) -> usize {
        let t = self.costs.add_task(default_cost);
        for (r, row) in self.grid.iter_mut().enumerate() {
            row.push(Self::cell(&self.config, r, t));
        }
        t
    }

    /// The LP for the current matrix and configuration
    pub fn build_problem(&self) -> Result<LpProblem, AssignmentError> {
        let (resources, tasks) = self.costs.shape();
        let mut problem = LpProblem::new("resource_assignment", Sense::Minimize);
        for variable in self.grid.iter().flatten() {
            problem.add_variable(variable.clone())?;
        }
        problem.set_objective(self.costs.rows().iter().flatten().copied().collect())?;

        let column = |r: usize, t: usize| r * tasks + t;

        for t in 0..tasks {
            let mut coefficients = vec![0.0; resources * tasks];
            for r in 0..resources {
                coefficients[column(r, t)] = 1.0;
            }
            if self.config.allow_unassigned_tasks {
                problem.add_constraint(format!("task_{t}_optional"), coefficients, ConstraintOp::Le, 1.0)?;
            } else {
                problem.add_constraint(
                    format!("task_{t}_assigned"),
                    coefficients,
                    ConstraintOp::Eq,
                    f64::from(self.config.max_resources_per_task),
                )?;
            }
        }

        for r in 0..resources {
            let mut coefficients = vec![0.0; resources * tasks];
            for t in 0..tasks {
                coefficients[column(r, t)] = 1.0;
            }
            problem.add_constraint(
                format!("resource_{r}_task_limit"),
                coefficients,
                ConstraintOp::Le,
                f64::from(self.config.max_tasks_per_resource),
            )?;
        }

        debug!(resources, tasks, constraints = problem.num_constraints(), "built assignment problem");
        Ok(problem)
    }

    /// Solve and return the total cost of the optimal assignment
    pub fn solve(&mut self) -> Result<f64, AssignmentError> {
        let problem = self.build_problem()?;
        let run = self.solver.solve(&problem);
        self.status = Some(run.status);

        if !run.is_optimal() {
            warn!(status = %run.status, code = run.status.code(), "assignment not solved");
            return Err(AssignmentError::InfeasibleOrUnsolved {
                status: run.status,
                code: run.status.code(),
            });
        }

        for (variable, value) in problem.fractional_integrals(&run.values, 1e-6) {
            warn!(variable = %variable.name, value, "fractional value on an integral variable");
        }

        let tasks = self.costs.num_tasks();
        let mut assignment = BTreeMap::new();
        for (idx, &value) in run.values.iter().enumerate() {
            if value > ASSIGNED_TOLERANCE {
                assignment.insert((idx / tasks, idx % tasks), value);
            }
        }

        info!(total_cost = run.objective_value, assigned = assignment.len(), "assignment solved");
        self.solution = Some(assignment);
        Ok(run.objective_value)
    }

    pub fn status(&self) -> Option<SolutionStatus> {
        self.status
    }

    /// Cells with a positive assigned amount, keyed by `(resource, task)`
    pub fn get_solution(&self) -> Option<&BTreeMap<(usize, usize), f64>> {
        self.solution.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> CostMatrix {
        CostMatrix::new(vec![
            vec![4.0, 1.0, 3.0],
            vec![2.0, 0.0, 5.0],
            vec![3.0, 2.0, 2.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_matrix_shape_errors() {
        assert_eq!(CostMatrix::new(vec![]), Err(AssignmentError::EmptyMatrix));
        assert_eq!(CostMatrix::new(vec![vec![]]), Err(AssignmentError::EmptyMatrix));
        assert_eq!(
            CostMatrix::new(vec![vec![1.0, 2.0], vec![3.0]]),
            Err(AssignmentError::Shape { row: 1, expected: 2, found: 1 })
        );
    }

    #[test]
    fn test_resize_keeps_rectangle() {
        let mut costs = matrix();
        assert_eq!(costs.add_resource(DEFAULT_COST), 3);
        assert_eq!(costs.add_task(7.0), 3);
        assert_eq!(costs.shape(), (4, 4));
        assert!(costs.rows().iter().all(|row| row.len() == 4));
        assert_eq!(costs.get(3, 0), Some(DEFAULT_COST));
        assert_eq!(costs.get(0, 3), Some(7.0));
        assert!(costs.set(1, 1, 9.0));
        assert!(!costs.set(4, 0, 1.0));
    }

    #[test]
    fn test_optimal_assignment() {
        let mut model = AssignmentModel::new(matrix(), AssignmentConfig::default());
        let total = model.solve().unwrap();
        assert!((total - 5.0).abs() < 1e-6);

        let solution = model.get_solution().unwrap();
        let cells: Vec<_> = solution.keys().copied().collect();
        assert_eq!(cells, vec![(0, 1), (1, 0), (2, 2)]);
        assert!((model.costs().total_cost(solution) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_does_not_duplicate_constraints() {
        let mut model = AssignmentModel::new(matrix(), AssignmentConfig::default());
        let first = model.solve().unwrap();
        let second = model.solve().unwrap();
        assert_eq!(first, second);
        assert_eq!(model.build_problem().unwrap().num_constraints(), 6);
    }

    #[test]
    fn test_added_task_uses_spare_resource() {
        let costs = CostMatrix::new(vec![vec![1.0], vec![2.0]]).unwrap();
        let mut model = AssignmentModel::new(costs, AssignmentConfig::default());
        assert_eq!(model.add_task(DEFAULT_COST), 1);
        assert_eq!(model.variables()[1].len(), 2);
        model.solve().unwrap();
        assert_eq!(model.get_solution().unwrap().len(), 2);
    }

    #[test]
    fn test_too_few_resources_is_infeasible() {
        let costs = CostMatrix::new(vec![vec![1.0, 1.0]]).unwrap();
        let mut model = AssignmentModel::new(costs, AssignmentConfig::default());
        assert_eq!(
            model.solve(),
            Err(AssignmentError::InfeasibleOrUnsolved { status: SolutionStatus::Infeasible, code: -1 })
        );
        assert_eq!(model.status(), Some(SolutionStatus::Infeasible));
        assert!(model.get_solution().is_none());
    }

    #[test]
    fn test_unassigned_tasks_allowed() {
        let costs = CostMatrix::new(vec![vec![1.0, 1.0]]).unwrap();
        let config = AssignmentConfig {
            allow_unassigned_tasks: true,
            ..AssignmentConfig::default()
        };
        let mut model = AssignmentModel::new(costs, config);
        // Nothing forces an assignment, so the cheapest plan is none
        assert_eq!(model.solve().unwrap(), 0.0);
        assert!(model.get_solution().unwrap().is_empty());
    }

    #[test]
    fn test_multiple_tasks_per_resource() {
        let costs = CostMatrix::new(vec![vec![1.0, 1.0, 1.0], vec![5.0, 5.0, 5.0]]).unwrap();
        let config = AssignmentConfig {
            max_tasks_per_resource: 3,
            ..AssignmentConfig::default()
        };
        let mut model = AssignmentModel::new(costs, config);
        assert!((model.solve().unwrap() - 3.0).abs() < 1e-6);
        assert!(model.get_solution().unwrap().keys().all(|&(r, _)| r == 0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_checks_shape() {
        let ragged = serde_json::from_str::<CostMatrix>("[[1.0, 2.0], [3.0]]").unwrap_err();
        assert!(ragged.to_string().contains("row 1"), "{ragged}");
        assert!(serde_json::from_str::<CostMatrix>("[]").is_err());
        assert!(serde_json::from_str::<CostMatrix>("[[]]").is_err());

        let costs: CostMatrix = serde_json::from_str("[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(costs.shape(), (2, 2));
        assert_eq!(serde_json::to_string(&costs).unwrap(), "[[1.0,2.0],[3.0,4.0]]");
    }
}
