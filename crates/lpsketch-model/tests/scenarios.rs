use approx::assert_relative_eq;
use lpsketch_model::{
    AssignmentConfig, AssignmentError, AssignmentModel, CostMatrix, DEFAULT_COST, FeasibleRegion,
    LinearModel, ModelError, PlotConfig, Session, render_svg,
};
use lpsketch_solver::{ConstraintOp, Sense, SolutionStatus};

fn production_model() -> LinearModel {
    let mut model = LinearModel::new("2x + 3y", Sense::Minimize).unwrap();
    model.add_constraint("x + y", ConstraintOp::Ge, 4.0).unwrap();
    model.add_constraint("x", ConstraintOp::Le, 3.0).unwrap();
    model.add_constraint("y", ConstraintOp::Le, 3.0).unwrap();
    model
}

#[test]
fn test_two_variable_minimization() {
    let mut model = production_model();
    let value = model.solve().unwrap();

    assert_eq!(model.status().map(SolutionStatus::code), Some(1));
    assert_relative_eq!(value, 9.0, epsilon = 1e-6);

    let solution = model.get_solution().unwrap();
    assert_relative_eq!(solution["x"], 3.0, epsilon = 1e-6);
    assert_relative_eq!(solution["y"], 1.0, epsilon = 1e-6);

    let values = [solution["x"], solution["y"]];
    for constraint in model.constraints() {
        assert!(constraint.row.is_satisfied(&values, 1e-6), "{} violated", constraint.label);
    }
    let binding = &model.solution().unwrap().binding_constraints;
    assert!(binding.contains(&"Restriccion_0".to_string()));
    assert!(binding.contains(&"Restriccion_1".to_string()));
}

#[test]
fn test_relation_text_matches_operator_form() {
    let mut by_operator = production_model();
    let mut by_relation = LinearModel::new("2x + 3y", Sense::Minimize).unwrap();
    for relation in ["x + y >= 4", "x <= 3", "3 >= y"] {
        by_relation.add_relation(relation).unwrap();
    }
    assert_relative_eq!(by_operator.solve().unwrap(), by_relation.solve().unwrap(), epsilon = 1e-9);
}

#[test]
fn test_remove_then_readd_restores_objective() {
    let mut model = production_model();
    let before = model.solve().unwrap();

    let removed = model.remove_constraint("Restriccion_1").unwrap();
    let names: Vec<_> = model.constraints().map(|c| c.name().to_string()).collect();
    assert_eq!(names, vec!["Restriccion_0", "Restriccion_1"]);
    assert_eq!(model.constraint("Restriccion_1").unwrap().label, "y <= 3");

    // Without x <= 3 the cheaper x carries the whole demand
    assert_relative_eq!(model.solve().unwrap(), 8.0, epsilon = 1e-6);

    let name = model.add_constraint("x", removed.op, removed.rhs).unwrap();
    assert_eq!(name, "Restriccion_2");
    assert_relative_eq!(model.solve().unwrap(), before, epsilon = 1e-9);
}

#[test]
fn test_position_removal_never_hits_stale_names() {
    let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
    for rhs in [1.0, 2.0, 3.0, 4.0] {
        model.add_constraint("x + y", ConstraintOp::Le, rhs).unwrap();
    }
    model.remove_constraint_at(0).unwrap();
    model.remove_constraint_at(0).unwrap();
    let rhs: Vec<_> = model.constraints().map(|c| c.row.rhs).collect();
    assert_eq!(rhs, vec![3.0, 4.0]);
    assert_relative_eq!(model.solve().unwrap(), 3.0, epsilon = 1e-6);
}

#[test]
fn test_infeasible_reports_status() {
    let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
    model.add_constraint("x + y", ConstraintOp::Le, 1.0).unwrap();
    model.add_constraint("x", ConstraintOp::Ge, 2.0).unwrap();
    let err = model.solve().unwrap_err();
    assert_eq!(err, ModelError::NotOptimal { status: SolutionStatus::Infeasible, code: -1 });
    assert!(model.get_solution().is_none());
}

#[test]
fn test_unbounded_reports_status() {
    let mut model = LinearModel::new("x + y", Sense::Maximize).unwrap();
    model.add_constraint("x - y", ConstraintOp::Le, 1.0).unwrap();
    assert!(matches!(
        model.solve(),
        Err(ModelError::NotOptimal { status: SolutionStatus::Unbounded, code: -2 })
    ));
}

#[test]
fn test_objective_change_rebuilds_session() {
    let mut session = Session::new();
    session.set_objective("2x + 3y", Sense::Minimize).unwrap();
    session.add_constraint("x + y", ConstraintOp::Ge, 4.0).unwrap();
    assert_relative_eq!(session.solve().unwrap(), 8.0, epsilon = 1e-6);

    assert!(session.set_objective("2x + 3y", Sense::Maximize).unwrap());
    assert_eq!(session.model().unwrap().num_constraints(), 0);
    assert!(session.solution().is_none());
}

#[test]
fn test_session_renders_region() {
    let mut session = Session::new().with_plot_config(PlotConfig::default().with_resolution(40));
    session.set_objective("3x + 2y", Sense::Maximize).unwrap();
    session.add_constraint("x + y", ConstraintOp::Le, 4.0).unwrap();
    session.add_constraint("x + 3y", ConstraintOp::Le, 6.0).unwrap();
    session.solve().unwrap();

    let svg = session.render_region().unwrap();
    assert!(svg.contains("<svg"));
    assert!(svg.contains("optimum"));
}

#[test]
fn test_three_variables_cannot_be_plotted() {
    let mut model = LinearModel::new("x + y + z", Sense::Maximize).unwrap();
    model.add_constraint("x + y + z", ConstraintOp::Le, 1.0).unwrap();
    assert_relative_eq!(model.solve().unwrap(), 1.0, epsilon = 1e-9);
    assert_eq!(
        FeasibleRegion::from_model(&model, PlotConfig::default()),
        Err(ModelError::TooManyVariables(3))
    );
}

#[test]
fn test_region_without_solution_has_no_marker() {
    let model = production_model();
    let region = FeasibleRegion::from_model(&model, PlotConfig::default().with_resolution(30)).unwrap();
    assert!(region.optimum.is_none());
    assert!(!region.is_empty());
    assert!(render_svg(&region).is_ok());
}

#[test]
fn test_assignment_each_task_served_once() {
    let costs = CostMatrix::new(vec![
        vec![4.0, 1.0, 3.0],
        vec![2.0, 0.0, 5.0],
        vec![3.0, 2.0, 2.0],
    ])
    .unwrap();
    let mut model = AssignmentModel::new(costs, AssignmentConfig::default());
    assert_relative_eq!(model.solve().unwrap(), 5.0, epsilon = 1e-6);

    let solution = model.get_solution().unwrap();
    for task in 0..3 {
        let served: f64 = solution.iter().filter(|((_, t), _)| *t == task).map(|(_, v)| v).sum();
        assert_relative_eq!(served, 1.0, epsilon = 1e-6);
    }
    assert!(solution.values().all(|&v| v > 0.0));
}

#[test]
fn test_assignment_resize() {
    let costs = CostMatrix::new(vec![vec![3.0, 1.0], vec![1.0, 3.0]]).unwrap();
    let mut model = AssignmentModel::new(costs, AssignmentConfig::default());
    assert_relative_eq!(model.solve().unwrap(), 2.0, epsilon = 1e-6);

    model.add_resource(DEFAULT_COST);
    assert_eq!(model.costs().shape(), (3, 2));
    assert_eq!(model.variables().len(), 3);
    // the new resource is too expensive to use
    assert_relative_eq!(model.solve().unwrap(), 2.0, epsilon = 1e-6);
    assert!(model.get_solution().unwrap().keys().all(|&(r, _)| r < 2));

    model.add_task(DEFAULT_COST);
    assert_eq!(model.costs().shape(), (3, 3));
    assert!(model.variables().iter().all(|row| row.len() == 3));
    assert_relative_eq!(model.solve().unwrap(), 2.0 + DEFAULT_COST, epsilon = 1e-3);
}

#[test]
fn test_ragged_matrix_fails_before_modelling() {
    assert_eq!(
        CostMatrix::new(vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0]]),
        Err(AssignmentError::Shape { row: 1, expected: 3, found: 2 })
    );
}
