use std::path::PathBuf;

use common::{
    chart::{ChartSpec, render_bar_chart, render_line_chart},
    plot::{ChartOptions, Plot, PlotContext, chart_groups, file_stem},
};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One line per series over the varying axis
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LineBasic {
    #[serde(flatten)]
    pub options: ChartOptions,
}

/// Grouped bars, one group per value of the varying axis
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BarBasic {
    #[serde(flatten)]
    pub options: ChartOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChartKind {
    Line,
    Bar,
}

fn render(ctx: &PlotContext, options: &ChartOptions, kind: ChartKind) -> Result<Vec<PathBuf>> {
    let stem = file_stem(&ctx.plan.file_name);
    let categories = ctx.plan.varying.labels();

    let mut written = Vec::new();
    for group in chart_groups(ctx.plan, ctx.results_path) {
        let series = group.load_series()?;
        debug!(
            "{} chart {:?}: {:?}",
            ctx.experiment,
            group.prefix,
            series.iter().map(|s| &s.values).collect::<Vec<_>>()
        );
        let spec = ChartSpec {
            x_label: ctx.plan.varying.title.clone(),
            y_label: options.y_label.clone(),
            categories: categories.clone(),
            series,
            y_min: options.y_min,
            y_max: options.y_max,
            legend: options.legend,
            size: (options.width, options.height),
        };

        let path = ctx
            .plot_path
            .join(group.file_name(stem, options.suffix.as_deref()));
        match kind {
            ChartKind::Line => render_line_chart(&path, &spec),
            ChartKind::Bar => render_bar_chart(&path, &spec),
        }
        .context(format!("Render {}", path.display()))?;
        info!("Chart {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[typetag::serde]
impl Plot for LineBasic {
    fn name(&self) -> &'static str {
        "line-basic"
    }

    fn plot(&self, ctx: &PlotContext) -> Result<Vec<PathBuf>> {
        render(ctx, &self.options, ChartKind::Line)
    }
}

#[typetag::serde]
impl Plot for BarBasic {
    fn name(&self) -> &'static str {
        "bar-basic"
    }

    fn plot(&self, ctx: &PlotContext) -> Result<Vec<PathBuf>> {
        render(ctx, &self.options, ChartKind::Bar)
    }
}
