use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use eyre::{Context, Result};
use regex::{Regex, RegexBuilder, escape};
use thiserror::Error;
use tokio::{
    fs::{File, read, remove_file},
    process::Command,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    axis::Point,
    bench::{Bench, Cmd, CmdsResult},
    config::Settings,
    result::{append_row, ensure_result_file, reset_dir},
};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Giving up on {point} after {retries} retries, last failure: {last}")]
    RetriesExhausted {
        point: String,
        retries: usize,
        last: Failure,
    },
    #[error("Capture file {} has no output", .0.display())]
    EmptyCapture(PathBuf),
    #[error("No column {column} in benchmark output line '{line}'")]
    MissingStat { column: usize, line: String },
    #[error("Could not parse statistic '{0}'")]
    InvalidStat(String),
    #[error("Repeat count must be at least 1")]
    InvalidRepeat,
}

/// Why a single benchmark run is treated as failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("exited with status {0:?}")]
    Exit(Option<i32>),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("reported '{0}'")]
    Marker(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed(Failure),
}

#[derive(Debug, Clone)]
pub struct RunPolicy {
    pub repeat: usize,
    pub max_retries: usize,
    pub timeout: Duration,
    pub stat_column: usize,
    pub markers: Option<Regex>,
}

impl RunPolicy {
    pub fn new(settings: &Settings, repeat: usize) -> Result<Self> {
        if repeat == 0 {
            return Err(SweepError::InvalidRepeat.into());
        }
        Ok(Self {
            repeat,
            max_retries: settings.max_retries,
            timeout: settings.timeout(),
            stat_column: settings.stat_column,
            markers: marker_regex(&settings.failure_markers)?,
        })
    }
}

fn marker_regex(markers: &[String]) -> Result<Option<Regex>> {
    if markers.is_empty() {
        return Ok(None);
    }
    let pattern = markers
        .iter()
        .map(|m| escape(m))
        .collect::<Vec<_>>()
        .join("|");
    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .context("Build failure marker pattern")?;
    Ok(Some(regex))
}

#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub env: Option<&'a HashMap<String, String>>,
    /// stdout goes here, stderr next to it with an `err` extension
    pub capture: &'a Path,
}

/// Runs the benchmark once and classifies the run
pub async fn invoke(invocation: &Invocation<'_>, policy: &RunPolicy) -> Result<RunOutcome> {
    let stdout = File::create(invocation.capture)
        .await
        .context(format!("Create capture {}", invocation.capture.display()))?
        .into_std()
        .await;
    let stderr = File::create(invocation.capture.with_extension("err"))
        .await?
        .into_std()
        .await;

    let mut cmd = Command::new(invocation.program);
    cmd.args(invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);
    if let Some(env) = invocation.env {
        cmd.envs(env);
    }
    let mut child = cmd
        .spawn()
        .context(format!("Running benchmark {}", invocation.program))?;

    let status = match timeout(policy.timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            child.kill().await.context("Kill timed out benchmark")?;
            return Ok(RunOutcome::Failed(Failure::Timeout(policy.timeout)));
        }
    };

    if !status.success() {
        return Ok(RunOutcome::Failed(Failure::Exit(status.code())));
    }

    if let Some(markers) = &policy.markers {
        let output = read(invocation.capture).await?;
        let output = String::from_utf8_lossy(&output);
        if let Some(line) = output.lines().find(|line| markers.is_match(line)) {
            return Ok(RunOutcome::Failed(Failure::Marker(line.trim().to_owned())));
        }
    }

    Ok(RunOutcome::Success)
}

/// Reads the statistic at `column` of the last non-empty captured line
pub async fn collect_stat(capture: &Path, column: usize) -> Result<f64> {
    let output = read(capture)
        .await
        .context(format!("Read capture {}", capture.display()))?;
    let output = String::from_utf8_lossy(&output);
    let line = output
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .ok_or_else(|| SweepError::EmptyCapture(capture.to_path_buf()))?;
    let value = line
        .split_whitespace()
        .nth(column)
        .ok_or_else(|| SweepError::MissingStat {
            column,
            line: line.to_owned(),
        })?;
    let stat = value
        .parse::<f64>()
        .ok()
        .filter(|stat| stat.is_finite())
        .ok_or_else(|| SweepError::InvalidStat(value.to_owned()))?;
    Ok(stat)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointResult {
    pub mean: f64,
    pub runs: usize,
    pub retries: usize,
}

/// Runs one experiment point until `repeat` runs succeeded, returning their mean.
///
/// Failed runs count against a single retry budget for the point. Exceeding it aborts
/// with [`SweepError::RetriesExhausted`].
pub async fn run_point(
    invocation: &Invocation<'_>,
    policy: &RunPolicy,
    point: &str,
) -> Result<PointResult> {
    if policy.repeat == 0 {
        return Err(SweepError::InvalidRepeat.into());
    }

    let mut retries = 0;
    let mut runs = 0;
    let mut sum = 0.0;
    loop {
        match invoke(invocation, policy).await? {
            RunOutcome::Success => {
                let stat = collect_stat(invocation.capture, policy.stat_column).await?;
                runs += 1;
                sum += stat;
                debug!("run={runs}/{} stat={stat}", policy.repeat);
                if runs >= policy.repeat {
                    return Ok(PointResult {
                        mean: sum / runs as f64,
                        runs,
                        retries,
                    });
                }
            }
            RunOutcome::Failed(failure) => {
                retries += 1;
                warn!(
                    "Benchmark {} {failure}, retry {retries}/{}",
                    invocation.program, policy.max_retries
                );
                if retries > policy.max_retries {
                    return Err(SweepError::RetriesExhausted {
                        point: point.to_owned(),
                        retries: policy.max_retries,
                        last: failure,
                    }
                    .into());
                }
            }
        }
    }
}

/// Deletes the stdout capture and its stderr sibling, if present
pub async fn remove_capture(capture: &Path) -> Result<()> {
    for path in [capture.to_path_buf(), capture.with_extension("err")] {
        match remove_file(&path).await {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err).context(format!("Remove {}", path.display())),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Result files in the order they were first written
    pub files: Vec<PathBuf>,
    pub points: usize,
    pub retries: usize,
}

/// Drives one experiment: every point of the bench's plan, one result row each
pub struct Sweep<'a> {
    pub name: &'a str,
    pub bench: &'a dyn Bench,
    pub settings: &'a Settings,
    pub repeat: usize,
}

impl Sweep<'_> {
    pub fn results_path(&self) -> PathBuf {
        self.settings.results_path(self.name)
    }

    /// Resets the experiment's result tree, then runs every point in sweep order.
    /// `on_point` is called after each row is written.
    pub async fn run<F>(&self, mut on_point: F) -> Result<SweepReport>
    where
        F: FnMut(&Point, &PointResult),
    {
        let policy = RunPolicy::new(self.settings, self.repeat)?;
        let CmdsResult {
            program,
            file_name,
            cmds,
        } = self.bench.cmds()?;

        let results_path = self.results_path();
        reset_dir(&results_path).await?;
        let capture = results_path.join(&self.settings.capture_file);

        let mut report = SweepReport::default();
        for Cmd { point, args } in &cmds {
            let path = ensure_result_file(&results_path, &point.segments(), &file_name).await?;
            info!("{} > {point}", self.name);
            debug!("program={program} args={}", args.join(" "));

            let invocation = Invocation {
                program: &program,
                args,
                env: self.settings.env.as_ref(),
                capture: &capture,
            };
            let result = run_point(&invocation, &policy, &point.to_string()).await?;
            debug!("mean={} runs={} retries={}", result.mean, result.runs, result.retries);
            append_row(&path, &point.x.code, result.mean).await?;

            if !report.files.contains(&path) {
                report.files.push(path);
            }
            report.points += 1;
            report.retries += result.retries;
            on_point(point, &result);
        }

        remove_capture(&capture).await?;
        Ok(report)
    }
}
