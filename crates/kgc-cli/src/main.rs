//! `kgc` - knowledge graph clone tools

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use kgc_core::CloneConfig;
use std::path::PathBuf;

mod simulator;

use simulator::{run_simulator, SimulatorConfig};

fn cli() -> Command {
    Command::new("kgc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Knowledge graph clone service tools")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Clone a synthetic graph and verify the invariants")
                .arg(
                    Arg::new("entities")
                        .long("entities")
                        .default_value("1200")
                        .value_parser(value_parser!(usize))
                        .help("Entities in the synthetic graph"),
                )
                .arg(
                    Arg::new("edges")
                        .long("edges")
                        .default_value("2300")
                        .value_parser(value_parser!(usize))
                        .help("Edges in the synthetic graph"),
                )
                .arg(
                    Arg::new("batch-size")
                        .long("batch-size")
                        .value_parser(value_parser!(usize))
                        .help("Rows per transaction step (overrides config)"),
                )
                .arg(
                    Arg::new("chunk-size")
                        .long("chunk-size")
                        .value_parser(value_parser!(usize))
                        .help("Records per store create call (overrides config)"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("fail-at-create")
                        .long("fail-at-create")
                        .value_parser(value_parser!(usize))
                        .help("Fail the K-th store create call (1-based)"),
                )
                .arg(
                    Arg::new("reject")
                        .long("reject")
                        .action(ArgAction::SetTrue)
                        .help("Reject the clone instead of committing it"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML file to load (same as --config)"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CloneConfig> {
    match path {
        Some(path) => CloneConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(CloneConfig::default()),
    }
}

async fn simulate(args: &ArgMatches, mut clone: CloneConfig) -> anyhow::Result<bool> {
    if let Some(batch) = args.get_one::<usize>("batch-size") {
        clone = clone.with_batch_size(*batch);
    }
    if let Some(chunk) = args.get_one::<usize>("chunk-size") {
        clone = clone.with_write_chunk_size(*chunk);
    }
    clone.validate().context("invalid simulation settings")?;

    let config = SimulatorConfig {
        entities: args.get_one::<usize>("entities").copied().unwrap_or_default(),
        edges: args.get_one::<usize>("edges").copied().unwrap_or_default(),
        seed: args.get_one::<u64>("seed").copied().unwrap_or_default(),
        fail_at_create: args.get_one::<usize>("fail-at-create").copied(),
        reject: args.get_flag("reject"),
        clone_config: clone,
    };
    tracing::info!(entities = config.entities, edges = config.edges, "Starting simulation");

    let report = run_simulator(config).await?;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.generate_text());
    }
    Ok(report.passed())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = load_config(args.get_one::<PathBuf>("config"))?;
            if !simulate(args, config).await? {
                std::process::exit(1);
            }
        }
        Some(("config", args)) => {
            let path = args
                .get_one::<PathBuf>("file")
                .or_else(|| args.get_one::<PathBuf>("config"));
            let config = load_config(path)?;
            print!("{}", config.to_toml_string()?);
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}
