use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};
use jobtrack_cli::commands::{open_store, render_tasks};
use jobtrack_cli::{generate_plans, init_tracing, simulate, JobtrackConfig, SimulateOptions};
use jobtrack_core::TaskStore;
use jobtrack_poller::TaskTracker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn cli() -> Command {
    let cli = Command::new("jobtrack")
        .version(jobtrack_cli::VERSION)
        .about("Track long-running backend jobs")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default: ./jobtrack.toml if present)"),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding persisted tasks"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run simulated jobs against an in-process fake backend")
                .arg(
                    Arg::new("jobs")
                        .long("jobs")
                        .default_value("5")
                        .value_parser(value_parser!(usize))
                        .help("Number of jobs to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("processing-ms")
                        .long("processing-ms")
                        .value_parser(value_parser!(u64))
                        .help("Override the processing poll interval"),
                )
                .arg(
                    Arg::new("queued-ms")
                        .long("queued-ms")
                        .value_parser(value_parser!(u64))
                        .help("Override the queued poll interval"),
                )
                .arg(
                    Arg::new("ephemeral")
                        .long("ephemeral")
                        .action(ArgAction::SetTrue)
                        .help("Keep tasks in memory instead of the state dir"),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("Print persisted tasks")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                )
                .arg(
                    Arg::new("active")
                        .long("active")
                        .action(ArgAction::SetTrue)
                        .help("Only queued and processing tasks"),
                ),
        )
        .subcommand(Command::new("clear").about("Remove completed and failed tasks"));

    #[cfg(feature = "http")]
    let cli = cli.subcommand(
        Command::new("watch")
            .about("Poll one remote job until it completes or fails")
            .arg(Arg::new("url").long("url").required(true).help("Status endpoint URL"))
            .arg(Arg::new("id").long("id").required(true).help("Job id"))
            .arg(
                Arg::new("type")
                    .long("type")
                    .default_value("analysis")
                    .value_parser(value_parser!(jobtrack_core::TaskType))
                    .help("analysis or document-generation"),
            ),
    );

    cli
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let mut config = JobtrackConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    if let Some(dir) = matches.get_one::<PathBuf>("state-dir") {
        config.state_dir.clone_from(dir);
    }

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let options = SimulateOptions {
                jobs: args.get_one::<usize>("jobs").copied().unwrap_or(5),
                seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
            };

            let mut poller = config.poller;
            if let Some(ms) = args.get_one::<u64>("processing-ms") {
                poller = poller.with_processing_interval(Duration::from_millis(*ms));
            }
            if let Some(ms) = args.get_one::<u64>("queued-ms") {
                poller = poller.with_queued_interval(Duration::from_millis(*ms));
            }

            let store = if args.get_flag("ephemeral") {
                Arc::new(TaskStore::in_memory())
            } else {
                open_store(&config)?
            };
            let tracker = TaskTracker::with_config(store, poller)?;

            println!("Simulating {} jobs (seed {})", options.jobs, options.seed);
            let summary = simulate::run(&tracker, generate_plans(options.jobs, options.seed)).await;

            println!();
            println!("Submitted:        {}", summary.submitted);
            println!("Completed:        {}", summary.completed);
            println!("Failed:           {}", summary.failed);
            println!("Transient errors: {}", summary.transient_errors);
            println!("Status changes:   {}", summary.status_changes);
        }
        Some(("list", args)) => {
            let store = open_store(&config)?;
            let tasks = if args.get_flag("active") {
                store.active()
            } else {
                store.list()
            };
            print!("{}", render_tasks(&tasks, args.get_flag("json"))?);
        }
        Some(("clear", _)) => {
            let store = open_store(&config)?;
            let removed = store.clear_terminal();
            println!("Removed {} finished task(s)", removed.len());
        }
        #[cfg(feature = "http")]
        Some(("watch", args)) => {
            let url = args.get_one::<String>("url").map_or("", String::as_str);
            let id = args.get_one::<String>("id").map_or("", String::as_str);
            let task_type = args
                .get_one::<jobtrack_core::TaskType>("type")
                .copied()
                .unwrap_or(jobtrack_core::TaskType::Analysis);

            let tracker = TaskTracker::with_config(open_store(&config)?, config.poller)?;
            let reason = jobtrack_cli::commands::watch(&tracker, url, id, task_type).await?;
            tracker.shutdown();
            jobtrack_cli::commands::finish_watch(id, reason)?;
        }
        _ => {}
    }

    Ok(())
}
