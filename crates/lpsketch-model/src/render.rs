use std::fmt::Display;

use plotters::prelude::*;
use tracing::debug;

use crate::error::ModelError;
use crate::region::FeasibleRegion;

fn render_error(err: impl Display) -> ModelError {
    ModelError::Render(err.to_string())
}

/// Draw the region as an SVG document: shaded feasible area, one labelled
/// line per constraint boundary, and the optimum when known.
pub fn render_svg(region: &FeasibleRegion) -> Result<String, ModelError> {
    let config = &region.config;
    let (x0, x1) = config.x_range;
    let (y0, y1) = config.y_range;
    let (_, dy) = region.cell_size();

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (config.width, config.height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Feasible region", ("sans-serif", 22))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc(region.x_axis.as_str())
            .y_desc(region.y_axis.as_deref().unwrap_or(""))
            .draw()
            .map_err(render_error)?;

        let shade = BLUE.mix(0.2).filled();
        chart
            .draw_series(region.feasible_runs().into_iter().map(|(start, end, y)| {
                let low = (y - dy / 2.0).max(y0);
                let high = (y + dy / 2.0).min(y1);
                Rectangle::new([(start, low), (end, high)], shade)
            }))
            .map_err(render_error)?;

        for (idx, line) in region.boundaries.iter().enumerate() {
            let Some((start, end)) = line.segment else {
                debug!(constraint = %line.label, "boundary outside the plot window");
                continue;
            };
            let color = Palette99::pick(idx).to_rgba();
            chart
                .draw_series(LineSeries::new([start, end], color.stroke_width(2)))
                .map_err(render_error)?
                .label(line.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        if let Some((x, y)) = region.optimum {
            chart
                .draw_series(std::iter::once(Circle::new((x, y), 5, RED.filled())))
                .map_err(render_error)?
                .label(format!("optimum ({x:.2}, {y:.2})"))
                .legend(|(x, y)| Circle::new((x + 10, y), 4, RED.filled()));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
    }

    Ok(svg)
}
