use anyhow::Result;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use std::path::Path;

use crate::histogram::Histogram;

/// Renders a density histogram as PNG, with a vertical marker at
/// `reference` when given.
pub fn render_histogram(
    path: &Path,
    histogram: &Histogram,
    title: &str,
    x_label: &str,
    reference: Option<f64>,
) -> Result<()> {
    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let bars = histogram.bars();
    let top = bars.iter().map(|b| b.2).fold(0.0f64, f64::max) * 1.1;
    let (mut lo, mut hi) = (histogram.lo, histogram.hi);
    if let Some(r) = reference {
        lo = lo.min(r);
        hi = hi.max(r);
    }
    let pad = 0.02 * (hi - lo);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((lo - pad)..(hi + pad), 0f64..top)?;

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc("Probability density")
        .draw()?;

    chart.draw_series(
        bars.iter()
            .map(|&(x0, x1, density)| Rectangle::new([(x0, 0.0), (x1, density)], GREEN.filled())),
    )?;

    if let Some(r) = reference {
        chart.draw_series(LineSeries::new([(r, 0.0), (r, top)], BLACK.stroke_width(2)))?;
    }

    root.present()?;
    Ok(())
}
