use std::{collections::HashMap, path::PathBuf, time::Duration};

use eyre::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::{bench::Bench, plot::Plot};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    pub benches: Vec<InnerBench>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root of the per-experiment result trees
    pub results_dir: PathBuf,
    /// Root of the per-experiment chart trees
    pub plots_dir: PathBuf,
    /// Wall clock limit for a single benchmark run
    pub timeout_secs: u64,
    /// Failed runs tolerated per experiment point before the sweep aborts
    pub max_retries: usize,
    /// Whitespace separated column of the last output line holding the statistic
    pub stat_column: usize,
    /// Benchmark stdout capture, relative to the experiment's result dir
    pub capture_file: String,
    /// Case insensitive substrings that mark a run as failed. Empty means only the exit
    /// status counts.
    pub failure_markers: Vec<String>,
    /// Expected duration of one benchmark run, for the runtime estimate
    pub run_estimate_secs: u64,
    pub env: Option<HashMap<String, String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            plots_dir: PathBuf::from("images"),
            timeout_secs: 600,
            max_retries: 30,
            stat_column: 0,
            capture_file: "output.txt".to_owned(),
            failure_markers: vec!["error".to_owned(), "fail".to_owned()],
            run_estimate_secs: 10,
            env: None,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn results_path(&self, experiment: &str) -> PathBuf {
        self.results_dir.join(experiment)
    }

    pub fn plot_path(&self, experiment: &str) -> PathBuf {
        self.plots_dir.join(experiment)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InnerBench {
    pub name: String,
    pub repeat: usize,
    pub bench: Box<dyn Bench>,
    pub plots: Option<Vec<Box<dyn Plot>>>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for experiment in &self.benches {
            if experiment.repeat == 0 {
                bail!("Experiment {} must repeat at least once", experiment.name);
            }
            if seen.contains(&&experiment.name) {
                bail!("Experiment {} is defined twice", experiment.name);
            }
            seen.push(&experiment.name);
        }
        Ok(())
    }

    /// Experiments named in `only`, in config order, or all of them when `only` is empty
    pub fn selected(&self, only: &[String]) -> Result<Vec<&InnerBench>> {
        for name in only {
            if !self.benches.iter().any(|b| &b.name == name) {
                bail!("No experiment named {name} in config {}", self.name);
            }
        }
        Ok(self
            .benches
            .iter()
            .filter(|b| only.is_empty() || only.contains(&b.name))
            .collect())
    }
}
