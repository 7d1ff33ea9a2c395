// Spina — wheat-head command-log generator, CLI entry point.
//
// Grows the built-in wheat grammar into a command log for a rendering host.
// Run settings come from the embedded wheat configuration, or from a JSON
// file given with `--config`; the remaining flags override single fields.
//
// Usage:
//   cargo run -p spina_lsystem -- [output.cmds] [--config FILE] [--seed N]
//     [--plants N] [--stages A..B]
//
// Logging is controlled by `RUST_LOG` (default `spina=info,spina_lsystem=warn`).

use spina_lsystem::command_log::CommandLog;
use spina_lsystem::config::RunConfig;
use spina_lsystem::wheat::wheat_grammar;
use spina_lsystem::{Engine, LsysError, RunReport};
use std::path::Path;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: spina [output.cmds] [--config FILE] [--seed N] [--plants N] [--stages A..B]";

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spina=info,spina_lsystem=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return;
    }

    let output_path = args
        .get(1)
        .filter(|s| !s.starts_with("--"))
        .map(|s| s.as_str())
        .unwrap_or("wheat.cmds");

    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(path) => RunConfig::load(Path::new(path)),
            None => Err(LsysError::InvalidConfig("--config needs a file".into())),
        },
        None => RunConfig::default_wheat(),
    }
    .unwrap_or_else(|e| fail(&e));

    if let Some(seed) = parse_flag(&args, "--seed").unwrap_or_else(|e| fail(&e)) {
        config.seed = Some(seed);
    }
    if let Some(plants) = parse_flag(&args, "--plants").unwrap_or_else(|e| fail(&e)) {
        config.plants = plants;
    }
    if let Some(stages) = parse_flag::<String>(&args, "--stages").unwrap_or_else(|e| fail(&e)) {
        match parse_stages(&stages) {
            Some((stage0, stage1)) => {
                config.stage0 = stage0;
                config.stage1 = stage1;
            }
            None => fail(&LsysError::InvalidConfig(format!(
                "--stages expects A..B, got {stages:?}"
            ))),
        }
    }
    if let Err(e) = config.validate() {
        fail(&e);
    }

    println!("=== Spina wheat-head generator ===");
    println!("Output: {output_path}");
    println!("Plants: {}", config.plants.max(1));
    println!("Stages: {}..{}", config.stage0, config.stage1);
    if let Some(seed) = config.seed {
        println!("Seed: {seed}");
    }

    match generate(output_path, config) {
        Ok(report) => {
            println!();
            println!("Plants grown:       {}", report.plants);
            println!("Stages grown:       {}", report.stages);
            println!("Commands written:   {}", report.commands_written);
            println!("Dropped rules:      {}", report.dropped_rules);
            println!("Empty selections:   {}", report.selections_dropped);
        }
        Err(e) => fail(&e),
    }
}

fn generate(output_path: &str, config: RunConfig) -> Result<RunReport, LsysError> {
    let log = CommandLog::create(Path::new(output_path))?;
    let mut engine = Engine::new(wheat_grammar(), config.into_store(), log)?;
    tracing::info!(output = output_path, "growing");
    engine.run()
}

fn fail(e: &LsysError) -> ! {
    eprintln!("error: {e}");
    std::process::exit(1);
}

/// `A..B` (inclusive stage range).
fn parse_stages(s: &str) -> Option<(u32, u32)> {
    let (a, b) = s.split_once("..")?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// The value following `flag`, if the flag is present. A flag without a
/// value, or with one that does not parse, is an error.
fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>, LsysError> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    let value = args
        .get(i + 1)
        .ok_or_else(|| LsysError::InvalidConfig(format!("{flag} needs a value")))?;
    value
        .parse()
        .map(Some)
        .map_err(|_| LsysError::InvalidConfig(format!("{flag} cannot use {value:?}")))
}
