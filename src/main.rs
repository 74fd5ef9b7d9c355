use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stress_chaos::helper::build_helper_spec;
use stress_chaos::platform::SimulatedCluster;
use stress_chaos::types::{LabelSuffix, RunId, TargetInstance};
use stress_chaos::{ExperimentConfig, Orchestrator};

#[derive(Parser)]
#[command(name = "stress-chaos")]
#[command(about = "Stress chaos orchestrator for helper-agent based fault injection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigSource {
    #[arg(long, help = "Experiment config file (yaml, toml or json)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Read the experiment config from environment variables")]
    from_env: bool,
}

impl ConfigSource {
    fn load(&self) -> Result<ExperimentConfig> {
        match (&self.config, self.from_env) {
            (Some(path), false) => ExperimentConfig::from_file(path),
            (None, true) => Ok(ExperimentConfig::from_env()),
            _ => anyhow::bail!("exactly one of --config or --from-env is required"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the helper launch spec for one target as YAML
    Render {
        #[command(flatten)]
        source: ConfigSource,

        #[arg(long, help = "Target instance name")]
        target: String,

        #[arg(long, help = "Node the target runs on")]
        node: String,

        #[arg(long, help = "Target container (defaults to the configured one)")]
        container: Option<String>,
    },
    /// Run the experiment against a simulated cluster
    Simulate {
        #[command(flatten)]
        source: ConfigSource,

        #[arg(long, help = "Cluster manifest (yaml)")]
        cluster: PathBuf,

        #[arg(long, help = "Print the run summary as JSON")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            source,
            target,
            node,
            container,
        } => render(source.load()?, &target, &node, container)?,
        Commands::Simulate {
            source,
            cluster,
            json,
        } => {
            let success = simulate(source.load()?, &cluster, json).await?;
            if !success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn render(
    mut config: ExperimentConfig,
    target: &str,
    node: &str,
    container: Option<String>,
) -> Result<()> {
    config.validate_settings()?;
    if let Some(container) = container {
        config.target_container = container;
    }

    let instance = TargetInstance::new(target, config.app_ns.clone(), node);
    let spec = build_helper_spec(
        &config,
        &instance,
        &RunId::generate(),
        &LabelSuffix::generate(),
    );
    print!("{}", serde_yaml::to_string(&spec)?);

    Ok(())
}

async fn simulate(config: ExperimentConfig, manifest: &Path, json: bool) -> Result<bool> {
    let cluster = SimulatedCluster::from_file(manifest)
        .with_context(|| format!("loading cluster manifest {}", manifest.display()))?;
    let shared = Arc::new(cluster.clone());

    let orchestrator =
        Orchestrator::new(shared.clone(), shared.clone()).with_derived_config(shared);

    println!(
        "Starting {} ({} sequence)",
        config.experiment_name, config.sequence
    );
    let result = orchestrator.run_experiment(config).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
    } else {
        println!("\nRun finished with outcome: {}", result.outcome);
        if let Some(err) = &result.error {
            println!("Error: {}", err);
        }
        for report in &result.targets {
            let state = report
                .state
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "NotCreated".to_string());
            println!("  {} on {}: {}", report.target, report.node, state);
        }
        println!("Helpers created: {}", cluster.created().len());
        println!("Helpers still present: {}", cluster.live_agents().len());
    }

    Ok(result.is_success())
}
