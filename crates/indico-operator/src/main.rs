//! `indico-operator` binary entry point

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use indico_coordination::ReplicaRole;
use indico_operator::{
    init_logging, run_simulator, LogFormat, Scenario, SimulatorConfig, Validation, VERSION,
};
use std::path::PathBuf;

fn cli() -> Command {
    let scenario = Arg::new("scenario")
        .long("scenario")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Scenario file (YAML)");

    Command::new("indico-operator")
        .version(VERSION)
        .about("Desired-state controller for the Indico workload")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("pretty")
                .value_parser(value_parser!(LogFormat))
                .help("Log output format"),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a scenario and check readiness")
                .arg(scenario.clone()),
        )
        .subcommand(
            Command::new("render")
                .about("Run one pass and print the service topology")
                .arg(scenario)
                .arg(
                    Arg::new("replica")
                        .long("replica")
                        .help("Replica id, overriding the scenario"),
                )
                .arg(
                    Arg::new("follower")
                        .long("follower")
                        .action(ArgAction::SetTrue)
                        .help("Render as a follower replica"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("json")
                        .value_parser(["json", "yaml"])
                        .help("Output format"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the seeded multi-replica simulation")
                .arg(
                    Arg::new("replicas")
                        .long("replicas")
                        .default_value("3")
                        .value_parser(value_parser!(usize))
                        .help("Replicas at start"),
                )
                .arg(
                    Arg::new("rounds")
                        .long("rounds")
                        .default_value("200")
                        .value_parser(value_parser!(u64))
                        .help("Number of rounds"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop at the first violation"),
                ),
        )
}

fn scenario_arg(args: &ArgMatches) -> anyhow::Result<Scenario> {
    let path = args
        .get_one::<PathBuf>("scenario")
        .context("missing --scenario")?;
    Scenario::load(path)
}

fn validate(args: &ArgMatches) -> anyhow::Result<bool> {
    let scenario = scenario_arg(args)?;
    match scenario.validate() {
        Validation::Ready => {
            println!("ready");
            Ok(true)
        }
        Validation::Waiting(reason) => {
            println!("waiting: {reason}");
            Ok(true)
        }
        Validation::Invalid { field, message } => {
            println!("blocked ({field}): {message}");
            Ok(false)
        }
    }
}

async fn render(args: &ArgMatches) -> anyhow::Result<()> {
    let mut scenario = scenario_arg(args)?;
    if let Some(replica) = args.get_one::<String>("replica") {
        scenario = scenario.with_replica(replica.as_str());
    }
    if args.get_flag("follower") {
        scenario = scenario.with_role(ReplicaRole::Follower);
    }

    let topology = scenario.render().await?;
    let output = match args.get_one::<String>("format").map(String::as_str) {
        Some("yaml") => topology.to_yaml()?,
        _ => topology.to_json()?,
    };
    println!("{output}");
    Ok(())
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = SimulatorConfig {
        seed: *args.get_one::<u64>("seed").context("missing --seed")?,
        replicas: *args.get_one::<usize>("replicas").context("missing --replicas")?,
        rounds: *args.get_one::<u64>("rounds").context("missing --rounds")?,
        stop_on_first_violation: args.get_flag("stop-on-violation"),
    };
    let report = run_simulator(config).await;
    println!("{}", report.generate_text());
    Ok(report.passed())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(
        matches
            .get_one::<LogFormat>("log-format")
            .copied()
            .unwrap_or_default(),
    );

    let passed = match matches.subcommand() {
        Some(("validate", args)) => validate(args)?,
        Some(("render", args)) => {
            render(args).await?;
            true
        }
        Some(("simulate", args)) => simulate(args).await?,
        _ => true,
    };
    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn simulate_defaults() {
        let matches = cli().get_matches_from(["indico-operator", "simulate"]);
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(args.get_one::<u64>("seed"), Some(&42));
        assert_eq!(args.get_one::<usize>("replicas"), Some(&3));
    }
}
