use std::time::Duration;

use clap::{Parser, Subcommand};
use common::{
    bench::Bench,
    config::Config,
    util::{estimate_runtime, format_duration},
};
use eyre::{Context, Result};
use tokio::fs::read_to_string;
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod bench;

const MODULES: &[&str] = &["common", "machine", "index", "sweep_basic"];

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    #[arg(short, long)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the experiments of a config
    Ls {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
    },
    /// Run experiments
    Bench {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
        /// Only run these experiments
        #[arg(short, long)]
        only: Vec<String>,
        /// Do not generate plots
        #[arg(long, default_value_t = false)]
        skip_plot: bool,
    },
    /// Generate plots from existing results
    Plot {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
        #[arg(short, long)]
        only: Vec<String>,
    },
    /// Print generated benchmark commands
    Print {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
        #[arg(short, long)]
        only: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("tierbench={log_level}"));
    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }
    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    init_plugins();

    let result = match args.command {
        Commands::Ls { config_file } => list_experiments(&config_file).await,
        Commands::Bench {
            config_file,
            only,
            skip_plot,
        } => bench::run_benchmark(&config_file, &only, args.no_progress, skip_plot).await,
        Commands::Plot { config_file, only } => bench::plot(&config_file, &only).await,
        Commands::Print { config_file, only } => print_commands(&config_file, &only).await,
    };
    if let Err(err) = result {
        error!("{err:#?}");
        return Err(err);
    }
    Ok(())
}

/// Plugins register themselves with typetag, their crates only have to be linked
fn init_plugins() {
    _ = machine::Machine::default_bench();
    _ = index::Index::default_bench();
    _ = sweep_basic::LineBasic::default();
    _ = sweep_basic::BarBasic::default();
}

pub async fn load_config(config_file: &str) -> Result<Config> {
    let config: Config = serde_yml::from_str(
        &read_to_string(config_file)
            .await
            .context(format!("Read config {config_file}"))?,
    )
    .context(format!("Parse config {config_file}"))?;
    config.validate()?;
    Ok(config)
}

async fn list_experiments(config_file: &str) -> Result<()> {
    let config = load_config(config_file).await?;
    let per_run = Duration::from_secs(config.settings.run_estimate_secs);
    println!("{}", config.name);
    for experiment in &config.benches {
        let points = experiment.bench.plan()?.len();
        let eta = estimate_runtime(points, experiment.repeat, per_run);
        println!(
            "{} -> {} ({points} points x{}, ~{})",
            experiment.name,
            experiment.bench.name(),
            experiment.repeat,
            format_duration(eta)
        );
    }
    Ok(())
}

async fn print_commands(config_file: &str, only: &[String]) -> Result<()> {
    let config = load_config(config_file).await?;
    for experiment in config.selected(only)? {
        let cmds = experiment.bench.cmds()?;
        println!("# {} -> {}", experiment.name, cmds.file_name);
        for cmd in &cmds.cmds {
            println!("{} {}", cmds.program, cmd.args.join(" "));
        }
    }
    Ok(())
}
