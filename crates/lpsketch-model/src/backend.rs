use lpsketch_solver::{LpProblem, Solution, Solver};

/// The LP engine a model hands its problem to.
///
/// A status of [`SolutionStatus::Optimal`](lpsketch_solver::SolutionStatus::Optimal)
/// (code `1`) is the only one models accept as solved.
pub trait LpSolver {
    fn solve(&self, problem: &LpProblem) -> Solution;
}

impl LpSolver for Solver {
    fn solve(&self, problem: &LpProblem) -> Solution {
        Solver::solve(self, problem)
    }
}
