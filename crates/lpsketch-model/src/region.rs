//! Sampled feasible region and constraint boundary lines for plotting.

use lpsketch_solver::ConstraintOp;
use tracing::debug;

use crate::backend::LpSolver;
use crate::error::ModelError;
use crate::linear_model::LinearModel;

const EPSILON: f64 = 1e-12;

/// Plot window and sampling density
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotConfig {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    /// Grid points per axis
    pub resolution: usize,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            x_range: (0.0, 10.0),
            y_range: (0.0, 10.0),
            resolution: 300,
            width: 800,
            height: 600,
        }
    }
}

impl PlotConfig {
    pub fn with_x_range(mut self, min: f64, max: f64) -> Self {
        self.x_range = (min, max);
        self
    }

    pub fn with_y_range(mut self, min: f64, max: f64) -> Self {
        self.y_range = (min, max);
        self
    }

    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution.max(2);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Grow both ranges so `point` sits inside with a 20% margin
    pub fn fit_to(mut self, point: (f64, f64)) -> Self {
        self.x_range = widen(self.x_range, point.0);
        self.y_range = widen(self.y_range, point.1);
        self
    }
}

fn widen((min, max): (f64, f64), value: f64) -> (f64, f64) {
    if !value.is_finite() {
        return (min, max);
    }
    let min = if value < min { value - 0.2 * value.abs().max(1.0) } else { min };
    let max = if value > max { value + 0.2 * value.abs().max(1.0) } else { max };
    (min, max)
}

/// `a*x + b*y <op> rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct HalfPlane {
    pub label: String,
    pub a: f64,
    pub b: f64,
    pub op: ConstraintOp,
    pub rhs: f64,
}

impl HalfPlane {
    pub fn new(label: impl Into<String>, a: f64, b: f64, op: ConstraintOp, rhs: f64) -> Self {
        Self {
            label: label.into(),
            a,
            b,
            op,
            rhs,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let lhs = self.a * x + self.b * y;
        let tolerance = 1e-9 * (1.0 + self.rhs.abs());
        self.op.holds(lhs, self.rhs, tolerance)
    }

    /// The boundary `a*x + b*y = rhs`, solved for y when possible and for x
    /// otherwise. `None` when both coefficients vanish.
    pub fn boundary(&self) -> Option<BoundaryCurve> {
        if self.b.abs() > EPSILON {
            Some(BoundaryCurve::YOfX {
                slope: -self.a / self.b,
                intercept: self.rhs / self.b,
            })
        } else if self.a.abs() > EPSILON {
            Some(BoundaryCurve::XOfY {
                slope: -self.b / self.a,
                intercept: self.rhs / self.a,
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryCurve {
    /// `y = slope * x + intercept`
    YOfX { slope: f64, intercept: f64 },
    /// `x = slope * y + intercept`
    XOfY { slope: f64, intercept: f64 },
}

impl BoundaryCurve {
    /// The part of the line inside the plot window
    pub fn clip(&self, x_range: (f64, f64), y_range: (f64, f64)) -> Option<((f64, f64), (f64, f64))> {
        let (p, q) = match *self {
            BoundaryCurve::YOfX { slope, intercept } => (
                (x_range.0, slope * x_range.0 + intercept),
                (x_range.1, slope * x_range.1 + intercept),
            ),
            BoundaryCurve::XOfY { slope, intercept } => (
                (slope * y_range.0 + intercept, y_range.0),
                (slope * y_range.1 + intercept, y_range.1),
            ),
        };
        clip_segment(p, q, x_range, y_range)
    }
}

/// Liang-Barsky clipping of the segment `p`-`q` to the window
fn clip_segment(
    p: (f64, f64),
    q: (f64, f64),
    x_range: (f64, f64),
    y_range: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (q.0 - p.0, q.1 - p.1);
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;

    for (pk, qk) in [
        (-dx, p.0 - x_range.0),
        (dx, x_range.1 - p.0),
        (-dy, p.1 - y_range.0),
        (dy, y_range.1 - p.1),
    ] {
        if pk == 0.0 {
            if qk < 0.0 {
                return None;
            }
            continue;
        }
        let r = qk / pk;
        if pk < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some(((p.0 + t0 * dx, p.1 + t0 * dy), (p.0 + t1 * dx, p.1 + t1 * dy)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLine {
    pub label: String,
    pub curve: BoundaryCurve,
    /// `None` when the line misses the plot window
    pub segment: Option<((f64, f64), (f64, f64))>,
}

/// Feasible region of a model with one or two variables, sampled on a grid
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibleRegion {
    pub x_axis: String,
    /// `None` for a one-variable model; the vertical axis is then a dummy
    pub y_axis: Option<String>,
    pub config: PlotConfig,
    /// Row-major, `mask[j * resolution + i]` is the point `(x_at(i), y_at(j))`
    mask: Vec<bool>,
    pub boundaries: Vec<BoundaryLine>,
    pub optimum: Option<(f64, f64)>,
}

impl FeasibleRegion {
    /// Sample `constraints` and `bounds` over the window. Only `constraints`
    /// get boundary lines.
    pub fn compute(
        x_axis: impl Into<String>,
        y_axis: Option<String>,
        constraints: &[HalfPlane],
        bounds: &[HalfPlane],
        config: PlotConfig,
    ) -> Self {
        let n = config.resolution.max(2);
        let mut region = Self {
            x_axis: x_axis.into(),
            y_axis,
            config: PlotConfig { resolution: n, ..config },
            mask: Vec::with_capacity(n * n),
            boundaries: Vec::new(),
            optimum: None,
        };

        for j in 0..n {
            let y = region.y_at(j);
            for i in 0..n {
                let x = region.x_at(i);
                let feasible = constraints.iter().chain(bounds).all(|h| h.contains(x, y));
                region.mask.push(feasible);
            }
        }

        for constraint in constraints {
            match constraint.boundary() {
                Some(curve) => region.boundaries.push(BoundaryLine {
                    label: constraint.label.clone(),
                    segment: curve.clip(config.x_range, config.y_range),
                    curve,
                }),
                None => debug!(constraint = %constraint.label, "boundary line omitted"),
            }
        }

        region
    }

    /// Region of a model's constraints and variable bounds, with the last
    /// optimal solution marked
    pub fn from_model<S: LpSolver>(model: &LinearModel<S>, config: PlotConfig) -> Result<Self, ModelError> {
        let variables = model.variables();
        match variables.len() {
            0 => return Err(ModelError::TooFewVariables),
            1 | 2 => {}
            n => return Err(ModelError::TooManyVariables(n)),
        }

        let coefficient = |coefficients: &[f64], i: usize| coefficients.get(i).copied().unwrap_or(0.0);
        let constraints: Vec<HalfPlane> = model
            .constraints()
            .map(|c| {
                HalfPlane::new(
                    c.label,
                    coefficient(&c.row.coefficients, 0),
                    coefficient(&c.row.coefficients, 1),
                    c.row.op,
                    c.row.rhs,
                )
            })
            .collect();

        let mut bounds = Vec::new();
        for (i, variable) in model.problem().variables().iter().enumerate() {
            let (a, b) = if i == 0 { (1.0, 0.0) } else { (0.0, 1.0) };
            if let Some(lower) = variable.bounds.lower {
                bounds.push(HalfPlane::new(format!("{} >= {lower}", variable.name), a, b, ConstraintOp::Ge, lower));
            }
            if let Some(upper) = variable.bounds.upper {
                bounds.push(HalfPlane::new(format!("{} <= {upper}", variable.name), a, b, ConstraintOp::Le, upper));
            }
        }

        let mut region = Self::compute(
            variables[0].clone(),
            variables.get(1).cloned(),
            &constraints,
            &bounds,
            config,
        );
        region.optimum = model.solution_point();
        Ok(region)
    }

    pub fn resolution(&self) -> usize {
        self.config.resolution
    }

    pub fn x_at(&self, i: usize) -> f64 {
        let (min, max) = self.config.x_range;
        min + (max - min) * i as f64 / (self.config.resolution - 1) as f64
    }

    pub fn y_at(&self, j: usize) -> f64 {
        let (min, max) = self.config.y_range;
        min + (max - min) * j as f64 / (self.config.resolution - 1) as f64
    }

    pub fn is_feasible_at(&self, i: usize, j: usize) -> bool {
        let n = self.config.resolution;
        i < n && j < n && self.mask[j * n + i]
    }

    pub fn feasible_count(&self) -> usize {
        self.mask.iter().filter(|&&f| f).count()
    }

    pub fn is_empty(&self) -> bool {
        self.feasible_count() == 0
    }

    /// Horizontal runs of feasible grid points as `(x_start, x_end, y)`
    pub fn feasible_runs(&self) -> Vec<(f64, f64, f64)> {
        let n = self.config.resolution;
        let mut runs = Vec::new();
        for j in 0..n {
            let row = &self.mask[j * n..(j + 1) * n];
            let mut start = None;
            for i in 0..=n {
                let feasible = i < n && row[i];
                match (start, feasible) {
                    (None, true) => start = Some(i),
                    (Some(s), false) => {
                        runs.push((self.x_at(s), self.x_at(i - 1), self.y_at(j)));
                        start = None;
                    }
                    _ => {}
                }
            }
        }
        runs
    }

    /// Grid spacing along each axis
    pub fn cell_size(&self) -> (f64, f64) {
        let steps = (self.config.resolution - 1) as f64;
        let (x0, x1) = self.config.x_range;
        let (y0, y1) = self.config.y_range;
        ((x1 - x0) / steps, (y1 - y0) / steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpsketch_solver::Sense;

    fn config() -> PlotConfig {
        PlotConfig::default().with_resolution(11)
    }

    #[test]
    fn test_half_plane_boundary() {
        let h = HalfPlane::new("x + 2y <= 4", 1.0, 2.0, ConstraintOp::Le, 4.0);
        assert_eq!(h.boundary(), Some(BoundaryCurve::YOfX { slope: -0.5, intercept: 2.0 }));

        let vertical = HalfPlane::new("x <= 3", 1.0, 0.0, ConstraintOp::Le, 3.0);
        assert_eq!(vertical.boundary(), Some(BoundaryCurve::XOfY { slope: -0.0, intercept: 3.0 }));

        let empty = HalfPlane::new("0 <= 1", 0.0, 0.0, ConstraintOp::Le, 1.0);
        assert_eq!(empty.boundary(), None);
    }

    #[test]
    fn test_clip_to_window() {
        let curve = BoundaryCurve::YOfX { slope: -1.0, intercept: 4.0 };
        let (p, q) = curve.clip((0.0, 10.0), (0.0, 10.0)).unwrap();
        assert_eq!(p, (0.0, 4.0));
        assert_eq!(q, (4.0, 0.0));

        let outside = BoundaryCurve::YOfX { slope: 0.0, intercept: 20.0 };
        assert_eq!(outside.clip((0.0, 10.0), (0.0, 10.0)), None);

        let vertical = BoundaryCurve::XOfY { slope: 0.0, intercept: 3.0 };
        assert_eq!(vertical.clip((0.0, 10.0), (0.0, 10.0)), Some(((3.0, 0.0), (3.0, 10.0))));
    }

    #[test]
    fn test_mask_is_intersection() {
        let constraints = [
            HalfPlane::new("x <= 5", 1.0, 0.0, ConstraintOp::Le, 5.0),
            HalfPlane::new("y <= 5", 0.0, 1.0, ConstraintOp::Le, 5.0),
        ];
        let region = FeasibleRegion::compute("x", Some("y".into()), &constraints, &[], config());
        // grid step is 1, so x and y each take 0..=5
        assert_eq!(region.feasible_count(), 36);
        assert!(region.is_feasible_at(5, 5));
        assert!(!region.is_feasible_at(6, 0));
        assert_eq!(region.boundaries.len(), 2);
    }

    #[test]
    fn test_feasible_runs() {
        let constraints = [HalfPlane::new("x + y <= 2", 1.0, 1.0, ConstraintOp::Le, 2.0)];
        let region = FeasibleRegion::compute("x", Some("y".into()), &constraints, &[], config());
        assert_eq!(region.feasible_runs(), vec![(0.0, 2.0, 0.0), (0.0, 1.0, 1.0), (0.0, 0.0, 2.0)]);
    }

    #[test]
    fn test_from_model() {
        let mut model = LinearModel::new("2x + 3y", Sense::Minimize).unwrap();
        model.add_constraint("x + y", ConstraintOp::Ge, 4.0).unwrap();
        model.add_constraint("x", ConstraintOp::Le, 3.0).unwrap();
        model.add_constraint("y", ConstraintOp::Le, 3.0).unwrap();
        model.solve().unwrap();

        let region = FeasibleRegion::from_model(&model, config()).unwrap();
        assert_eq!(region.x_axis, "x");
        assert_eq!(region.y_axis.as_deref(), Some("y"));
        assert_eq!(region.boundaries.len(), 3);
        assert_eq!(region.boundaries[0].label, "x + y >= 4");
        assert!(region.is_feasible_at(3, 1));
        assert!(!region.is_feasible_at(1, 1));
        let (x, y) = region.optimum.unwrap();
        assert!((x - 3.0).abs() < 1e-6 && (y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_variable_bounds_in_mask() {
        let config = PlotConfig::default().with_x_range(-5.0, 5.0).with_y_range(-5.0, 5.0).with_resolution(11);
        let model = LinearModel::new("x + y", Sense::Maximize).unwrap();
        let region = FeasibleRegion::from_model(&model, config).unwrap();
        // only the non-negative quadrant survives
        assert_eq!(region.feasible_count(), 36);
        assert!(region.boundaries.is_empty());
    }

    #[test]
    fn test_single_variable() {
        let mut model = LinearModel::new("x", Sense::Maximize).unwrap();
        model.add_constraint("2x", ConstraintOp::Le, 8.0).unwrap();
        let region = FeasibleRegion::from_model(&model, config()).unwrap();
        assert_eq!(region.y_axis, None);
        assert!(matches!(region.boundaries[0].curve, BoundaryCurve::XOfY { .. }));
        assert!(region.is_feasible_at(4, 10));
        assert!(!region.is_feasible_at(5, 0));
    }

    #[test]
    fn test_variable_count_limits() {
        let model = LinearModel::new("x + y + z", Sense::Maximize).unwrap();
        assert_eq!(
            FeasibleRegion::from_model(&model, config()),
            Err(ModelError::TooManyVariables(3))
        );
        let constant = LinearModel::new("5", Sense::Maximize).unwrap();
        assert_eq!(FeasibleRegion::from_model(&constant, config()), Err(ModelError::TooFewVariables));
    }

    #[test]
    fn test_fit_to() {
        let config = PlotConfig::default().fit_to((20.0, 5.0));
        assert_eq!(config.x_range, (0.0, 24.0));
        assert_eq!(config.y_range, (0.0, 10.0));
    }
}
