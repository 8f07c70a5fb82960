//! WASM bindings for a browser front end
//!
//! Every entry point rebuilds its model from the arguments, so the page owns
//! all state and the bindings stay stateless.

use std::collections::BTreeMap;

use lpsketch_lang::{Lexer, TokenKind};
use lpsketch_solver::Sense;
use tracing::debug;
use wasm_bindgen::prelude::*;

use crate::assignment::{AssignmentConfig, AssignmentModel, CostMatrix};
use crate::linear_model::LinearModel;
use crate::region::{FeasibleRegion, PlotConfig};
use crate::render::render_svg;

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn sense(maximize: bool) -> Sense {
    if maximize { Sense::Maximize } else { Sense::Minimize }
}

fn build(objective: &str, maximize: bool, constraints: JsValue) -> Result<LinearModel, JsValue> {
    let relations: Vec<String> = serde_wasm_bindgen::from_value(constraints).map_err(js_error)?;
    let mut model = LinearModel::new(objective, sense(maximize)).map_err(js_error)?;
    for relation in &relations {
        model.add_relation(relation).map_err(js_error)?;
    }
    Ok(model)
}

#[derive(serde::Serialize)]
struct TokenInfo {
    kind: String,
    text: String,
    start: usize,
    end: usize,
}

/// Tokens of an expression or relation, for highlighting
#[wasm_bindgen]
pub fn tokenize(source: &str) -> Result<JsValue, JsValue> {
    let tokens: Vec<TokenInfo> = Lexer::tokenize(source)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| TokenInfo {
            kind: format!("{:?}", t.kind),
            text: t.text,
            start: t.span.start,
            end: t.span.end,
        })
        .collect();
    serde_wasm_bindgen::to_value(&tokens).map_err(js_error)
}

#[derive(serde::Serialize)]
struct LpResult {
    status: String,
    code: i32,
    objective_value: Option<f64>,
    values: BTreeMap<String, f64>,
    binding_constraints: Vec<String>,
    violations: Vec<String>,
}

/// Solve `objective` subject to relations such as `"x + y <= 4"`
#[wasm_bindgen]
pub fn solve_lp(objective: &str, maximize: bool, constraints: JsValue) -> Result<JsValue, JsValue> {
    let mut model = build(objective, maximize, constraints)?;
    let outcome = model.solve().ok();

    let solution = model.solution().cloned();
    let status = model.status().unwrap_or(lpsketch_solver::SolutionStatus::NotSolved);
    let result = LpResult {
        status: status.to_string(),
        code: status.code(),
        objective_value: outcome,
        values: solution.as_ref().map(|s| s.values.clone()).unwrap_or_default(),
        binding_constraints: solution.map(|s| s.binding_constraints).unwrap_or_default(),
        violations: model.violations().iter().map(|v| v.description.clone()).collect(),
    };
    serde_wasm_bindgen::to_value(&result).map_err(js_error)
}

/// SVG drawing of the feasible region of a one- or two-variable problem
#[wasm_bindgen]
pub fn feasible_region_svg(objective: &str, maximize: bool, constraints: JsValue) -> Result<String, JsValue> {
    let mut model = build(objective, maximize, constraints)?;
    // An unsolved model still has a region to draw, just no optimum marker
    if let Err(err) = model.solve() {
        debug!(%err, "drawing region without an optimum");
    }
    let config = match model.solution_point() {
        Some(point) => PlotConfig::default().fit_to(point),
        None => PlotConfig::default(),
    };
    let region = FeasibleRegion::from_model(&model, config).map_err(js_error)?;
    render_svg(&region).map_err(js_error)
}

#[derive(serde::Serialize)]
struct AssignmentCell {
    resource: usize,
    task: usize,
    amount: f64,
}

#[derive(serde::Serialize)]
struct AssignmentResult {
    total_cost: f64,
    assignments: Vec<AssignmentCell>,
}

/// Minimum-cost assignment over a row-major cost matrix
#[wasm_bindgen]
pub fn solve_assignment(costs: JsValue, config: JsValue) -> Result<JsValue, JsValue> {
    let costs: Vec<Vec<f64>> = serde_wasm_bindgen::from_value(costs).map_err(js_error)?;
    let config: AssignmentConfig = if config.is_undefined() || config.is_null() {
        AssignmentConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config).map_err(js_error)?
    };

    let mut model = AssignmentModel::new(CostMatrix::new(costs).map_err(js_error)?, config);
    let total_cost = model.solve().map_err(js_error)?;
    let assignments = model
        .get_solution()
        .into_iter()
        .flatten()
        .map(|(&(resource, task), &amount)| AssignmentCell { resource, task, amount })
        .collect();

    serde_wasm_bindgen::to_value(&AssignmentResult { total_cost, assignments }).map_err(js_error)
}
