use core::fmt::Debug;
use std::path::{Path, PathBuf};

use downcast_rs::{Downcast, impl_downcast};
use dyn_clone::{DynClone, clone_trait_object};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    axis::SweepPlan,
    chart::{DEFAULT_SIZE, Series, build_series, load_dataset},
    result::result_file,
};

/// Everything a plot needs to find one experiment's results and place its charts
#[derive(Debug, Clone, Copy)]
pub struct PlotContext<'a> {
    pub experiment: &'a str,
    pub plan: &'a SweepPlan,
    /// The experiment's result tree, ie. results/latency
    pub results_path: &'a Path,
    /// The experiment's chart dir, ie. images/latency
    pub plot_path: &'a Path,
}

#[typetag::serde(tag = "type")]
pub trait Plot: Debug + DynClone + Downcast + Send + Sync {
    /// Name of the plot, for identification
    fn name(&self) -> &'static str;
    /// Renders every chart of the experiment, returning the written files
    fn plot(&self, ctx: &PlotContext) -> Result<Vec<PathBuf>>;
}
clone_trait_object!(Plot);
impl_downcast!(Plot);

/// Options shared by the chart plots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    pub y_label: String,
    pub y_min: f64,
    /// Defaults to the largest value rounded up
    pub y_max: Option<f64>,
    pub legend: bool,
    pub width: u32,
    pub height: u32,
    /// Appended to chart file names, for several plots over one experiment
    pub suffix: Option<String>,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            y_label: "Throughput (ops)".to_owned(),
            y_min: 0.0,
            y_max: None,
            legend: true,
            width: DEFAULT_SIZE.0,
            height: DEFAULT_SIZE.1,
            suffix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSource {
    pub label: String,
    pub path: PathBuf,
}

/// The result files drawn together on one chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartGroup {
    /// Directory segments shared by every series of the chart
    pub prefix: Vec<String>,
    pub series: Vec<SeriesSource>,
}

impl ChartGroup {
    /// `<stem>-<prefix>-<suffix>.svg`, skipping empty parts
    pub fn file_name(&self, stem: &str, suffix: Option<&str>) -> String {
        let mut parts = vec![stem];
        parts.extend(self.prefix.iter().map(String::as_str));
        parts.extend(suffix);
        format!("{}.svg", parts.join("-"))
    }

    pub fn load_series(&self) -> Result<Vec<Series>> {
        let datasets = self
            .series
            .iter()
            .map(|source| Ok((source.label.clone(), load_dataset(&source.path)?)))
            .collect::<Result<Vec<_>>>()?;
        let series = build_series(&datasets).context(format!(
            "Build series for chart {}",
            self.prefix.join("/")
        ))?;
        Ok(series)
    }
}

/// Splits the result files of a plan into charts.
///
/// The last directory axis provides the series of a chart, every combination of the
/// remaining directory axes gets its own chart. Without directory axes the single result
/// file is the only series.
pub fn chart_groups(plan: &SweepPlan, results_path: &Path) -> Vec<ChartGroup> {
    let Some((last, outer)) = plan.dirs.split_last() else {
        return vec![ChartGroup {
            prefix: Vec::new(),
            series: vec![SeriesSource {
                label: file_stem(&plan.file_name).to_owned(),
                path: result_file(results_path, &[] as &[&str], &plan.file_name),
            }],
        }];
    };

    let outer = SweepPlan {
        dirs: outer.to_vec(),
        varying: last.clone(),
        file_name: plan.file_name.clone(),
    };
    outer
        .groups()
        .into_iter()
        .map(|values| {
            let prefix = values.iter().map(|v| v.segment.clone()).collect::<Vec<_>>();
            let series = last
                .values
                .iter()
                .map(|value| {
                    let mut segments = prefix.clone();
                    segments.push(value.segment.clone());
                    SeriesSource {
                        label: value.label.clone(),
                        path: result_file(results_path, &segments, &plan.file_name),
                    }
                })
                .collect();
            ChartGroup { prefix, series }
        })
        .collect()
}

/// File name without its extension
pub fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}
