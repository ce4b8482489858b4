use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dockroute_cli::{format_route, load_scenario, PlanOutcome};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Plan a docking-aware drone route from a scenario file",
    long_about = None
)]
struct Args {
    /// Scenario JSON with zones, stations and a route request
    scenario: PathBuf,

    /// Print the full outcome as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Emit planner logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("dockroute_core=debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let scenario = load_scenario(&args.scenario)?;
    println!(
        "Loaded {} zones and {} docking stations",
        scenario.zones.len(),
        scenario.stations.len()
    );
    let outcome = scenario.plan()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match &outcome {
            PlanOutcome::Planned { route } => print!("{}", format_route(route)),
            PlanOutcome::Failed { message, .. } => eprintln!("No route: {}", message),
        }
    }

    Ok(match outcome {
        PlanOutcome::Planned { .. } => ExitCode::SUCCESS,
        PlanOutcome::Failed { .. } => ExitCode::from(2),
    })
}
