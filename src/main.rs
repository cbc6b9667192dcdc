//! ParallelRunner CLI Entry Point
//!
//! Loads a workflow definition, runs it with the scripted block runner and
//! prints what each parallel construct produced.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow
//! parallelrunner fanout.yaml
//!
//! # JSON workflow, debug logging
//! parallelrunner fanout.json --verbose
//!
//! # Only print the aggregated outputs as JSON
//! parallelrunner fanout.yaml --json
//!
//! # Lower the stall watchdog
//! parallelrunner fanout.yaml --max-passes 50
//! ```

use std::env;
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info};

use parallelrunner::execution::{Engine, RunReport, ScriptedRunner, DEFAULT_MAX_PASSES};
use parallelrunner::workflow::parser::load_workflow;
use parallelrunner::{APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "workflow.yaml";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    max_passes: usize,
    json: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: DEFAULT_WORKFLOW.to_string(),
            max_passes: DEFAULT_MAX_PASSES,
            json: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool, quiet: bool) {
    let level = match (verbose, quiet) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Parallel Block Execution for Graph Workflows");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: parallelrunner [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>     Path to workflow YAML or JSON file");
    println!();
    println!("Options:");
    println!(
        "  --max-passes N      Scheduling passes before the run counts as stalled (default: {})",
        DEFAULT_MAX_PASSES
    );
    println!("  --json              Print only the aggregated outputs as JSON");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  parallelrunner demos/fanout.yaml");
    println!("  parallelrunner demos/fanout.yaml --json");
    println!("  parallelrunner pipeline.json --max-passes 50 --verbose");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--json" => {
                config.json = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--max-passes" => {
                i += 1;
                if i >= args.len() {
                    return Err("--max-passes requires a number argument".to_string());
                }
                config.max_passes = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid max-passes value: {}", args[i]))?;
                if config.max_passes == 0 {
                    return Err("--max-passes must be at least 1".to_string());
                }
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.workflow_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Prints a colored per-construct summary followed by the outputs.
fn print_report(report: &RunReport) -> Result<(), serde_json::Error> {
    println!();
    println!("{}", "Workflow completed".green().bold());
    println!(
        "  Passes: {}   Instances executed: {}",
        report.passes,
        report.executed_count()
    );

    for (parallel_id, summary) in report.timeline.parallel_summaries() {
        let status = if report.context.is_loop_completed(&parallel_id) {
            "completed".green()
        } else {
            "incomplete".yellow()
        };
        let failed = if summary.instances_failed > 0 {
            summary.instances_failed.to_string().red()
        } else {
            summary.instances_failed.to_string().normal()
        };

        println!(
            "  {} {} ({} instance(s), {} iteration(s), {} failed)",
            parallel_id.cyan(),
            status,
            summary.instances_completed,
            summary.iterations_seen,
            failed
        );
    }

    println!("{}", report.timeline.summary());
    println!("{}", "Aggregated outputs:".bold());
    println!("{}", serde_json::to_string_pretty(&report.outputs)?);
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose, config.json);

    if !config.json {
        print_banner();
    }

    info!("Loading workflow: {}", config.workflow_path);
    let workflow = load_workflow(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;

    info!(
        "Workflow loaded: {} blocks, {} parallel construct(s)",
        workflow.blocks.len(),
        workflow.parallels.len()
    );

    let mut engine = Engine::new(workflow, ScriptedRunner::new());
    engine.set_max_passes(config.max_passes);

    let report = engine.run()?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report.outputs)?);
    } else {
        print_report(&report)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
