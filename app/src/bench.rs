use std::time::Duration;

use chrono::{Local, TimeDelta};
use common::{
    config::{InnerBench, Settings},
    plot::PlotContext,
    result::reset_dir,
    sweep::Sweep,
    util::{estimate_runtime, format_duration},
};
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::load_config;

fn progress_bar(len: u64, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )?
        .progress_chars("#>-"),
    );
    Ok(progress)
}

pub async fn run_benchmark(
    config_file: &str,
    only: &[String],
    no_progress: bool,
    skip_plot: bool,
) -> Result<()> {
    let config = load_config(config_file).await?;
    let per_run = Duration::from_secs(config.settings.run_estimate_secs);

    for experiment in config.selected(only)? {
        let points = experiment.bench.plan()?.len();
        let eta = estimate_runtime(points, experiment.repeat, per_run);
        let done_at = Local::now() + TimeDelta::from_std(eta).context("Runtime estimate")?;
        info!(
            "{}: {points} points x{}, expected time to complete {} (around {})",
            experiment.name,
            experiment.repeat,
            format_duration(eta),
            done_at.format("%H:%M:%S")
        );

        let progress = progress_bar(points as u64, no_progress)?;
        let sweep = Sweep {
            name: &experiment.name,
            bench: &*experiment.bench,
            settings: &config.settings,
            repeat: experiment.repeat,
        };
        let report = sweep
            .run(|point, result| {
                if result.retries > 0 {
                    progress.suspend(|| warn!("{point} needed {} retries", result.retries));
                }
                progress.set_message(point.to_string());
                progress.inc(1);
            })
            .await;
        progress.finish_and_clear();
        let report = report.context(format!("Experiment {}", experiment.name))?;
        info!(
            "{}: {} points into {} result files, {} retries",
            experiment.name,
            report.points,
            report.files.len(),
            report.retries
        );

        if !skip_plot {
            plot_experiment(&config.settings, experiment).await?;
        }
    }

    debug!("Exiting");
    Ok(())
}

pub async fn plot(config_file: &str, only: &[String]) -> Result<()> {
    let config = load_config(config_file).await?;
    for experiment in config.selected(only)? {
        plot_experiment(&config.settings, experiment).await?;
    }
    Ok(())
}

async fn plot_experiment(settings: &Settings, experiment: &InnerBench) -> Result<()> {
    let Some(plots) = &experiment.plots else {
        debug!("{} has no plots", experiment.name);
        return Ok(());
    };

    let plot_path = settings.plot_path(&experiment.name);
    reset_dir(&plot_path).await?;
    let plan = experiment.bench.plan()?;
    let results_path = settings.results_path(&experiment.name);
    let ctx = PlotContext {
        experiment: &experiment.name,
        plan: &plan,
        results_path: &results_path,
        plot_path: &plot_path,
    };

    for plot in plots {
        let written = plot
            .plot(&ctx)
            .context(format!("Plot {} of {}", plot.name(), experiment.name))?;
        debug!("{} wrote {} charts", plot.name(), written.len());
    }
    println!("Plots for {} in {}", experiment.name, plot_path.display());
    Ok(())
}
