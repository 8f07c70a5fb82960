use lpsketch_solver::{ConstraintOp, Sense};
use tracing::info;

use crate::error::ModelError;
use crate::linear_model::{LinearModel, ModelSolution, VariableDefaults};
use crate::region::{FeasibleRegion, PlotConfig};
use crate::render::render_svg;

/// One interactive problem at a time.
///
/// Replaces the model wholesale when the objective text or direction changes.
#[derive(Debug, Clone, Default)]
pub struct Session {
    model: Option<LinearModel>,
    defaults: VariableDefaults,
    plot: PlotConfig,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(mut self, defaults: VariableDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_plot_config(mut self, plot: PlotConfig) -> Self {
        self.plot = plot;
        self
    }

    pub fn model(&self) -> Option<&LinearModel> {
        self.model.as_ref()
    }

    pub fn plot_config(&self) -> PlotConfig {
        self.plot
    }

    /// Submit the objective. Returns `true` if the model was rebuilt, which
    /// discards every constraint; the same text and direction are a no-op.
    pub fn set_objective(&mut self, text: &str, sense: Sense) -> Result<bool, ModelError> {
        if let Some(model) = &self.model {
            if model.objective_text() == text.trim() && model.sense() == sense {
                return Ok(false);
            }
        }
        let model = LinearModel::with_defaults(text, sense, self.defaults)?;
        info!(objective = text.trim(), %sense, "rebuilt session model");
        self.model = Some(model);
        Ok(true)
    }

    /// Add `lhs <op> rhs` unless an equivalent constraint already exists
    pub fn add_constraint(&mut self, lhs: &str, op: ConstraintOp, rhs: f64) -> Result<String, ModelError> {
        let model = self.model.as_mut().ok_or(ModelError::NoObjective)?;
        if let Some(existing) = model.equivalent_constraint(lhs, op, rhs)? {
            return Err(ModelError::DuplicateConstraint(existing.name().to_string()));
        }
        model.add_constraint(lhs, op, rhs)
    }

    /// Remove by position in the constraint list
    pub fn remove_constraint(&mut self, position: usize) -> Result<String, ModelError> {
        let model = self.model.as_mut().ok_or(ModelError::NoObjective)?;
        let label = model
            .constraints()
            .nth(position)
            .map(|c| c.label.to_string())
            .ok_or_else(|| ModelError::UnknownConstraint(format!("#{position}")))?;
        model.remove_constraint_at(position)?;
        Ok(label)
    }

    pub fn clear_constraints(&mut self) {
        if let Some(model) = &mut self.model {
            model.clear_constraints();
        }
    }

    /// Drop the model entirely
    pub fn reset(&mut self) {
        self.model = None;
        info!("session reset");
    }

    pub fn solve(&mut self) -> Result<f64, ModelError> {
        self.model.as_mut().ok_or(ModelError::NoObjective)?.solve()
    }

    pub fn solution(&self) -> Option<&ModelSolution> {
        self.model.as_ref()?.solution()
    }

    /// Feasible region of the current model, widened to show the optimum
    pub fn feasible_region(&self) -> Result<FeasibleRegion, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::NoObjective)?;
        let config = match model.solution_point() {
            Some(point) => self.plot.fit_to(point),
            None => self.plot,
        };
        FeasibleRegion::from_model(model, config)
    }

    pub fn render_region(&self) -> Result<String, ModelError> {
        render_svg(&self.feasible_region()?)
    }
}
