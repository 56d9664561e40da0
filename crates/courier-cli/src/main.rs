use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use courier::Reporter;
use courier::attempt::AttemptOutcome;
use courier::coordinator::{self, BatchStatus, DeliverySummary};
use courier::endpoint::{self, Endpoint};
use courier::error::NotifyError;
use courier::{aggregator, resend};
use courier_config::{Config, RegistryProfile};
use courier_registry::DeliveryClient;
use courier_store::ProjectStore;
use courier_types::{DeliveryEvent, EventType, OutstandingEntry};

#[derive(Parser, Debug)]
#[command(name = "courier", version)]
#[command(about = "At-least-once delivery of module registry notifications")]
struct Cli {
    /// Project directory holding the build history
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Configuration file (default: nearest .courier.toml from <project> upward)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Registry profile to use, overriding `[notifier] profile`
    #[arg(long)]
    profile: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deliver the queued notifications of a finished build.
    Deliver {
        /// Build number
        #[arg(long)]
        build: u64,
    },
    /// List unresolved pending entries, most recent build first.
    Outstanding {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Replay pending entries.
    Resend {
        /// Build owning the entry
        #[arg(long, requires = "entry")]
        build: Option<u64>,

        /// Entry id
        #[arg(long, requires = "build")]
        entry: Option<String>,

        /// Replay every outstanding entry of the project
        #[arg(long, conflicts_with_all = ["build", "entry"])]
        all: bool,
    },
    /// Show the event log of a build: deliveries, postponements and resolutions.
    Events {
        /// Build number
        #[arg(long)]
        build: u64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check that the selected registry answers.
    Ping,
    /// Check the registry profiles in the configuration.
    Validate,
}

struct CliReporter;

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        eprintln!("[info] {msg}");
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => courier_config::load_config_from_file(path),
        None => courier_config::load_config(&cli.project),
    };
    let project = ProjectStore::new(cli.project.clone());
    let profile = cli.profile.as_deref();
    let mut reporter = CliReporter;

    match cli.cmd {
        Commands::Deliver { build } => {
            // never fails the build, not even on a broken config
            let summary = match config {
                Ok(config) => {
                    coordinator::run_delivery(&config, profile, &project, build, &mut reporter)
                }
                Err(err) => {
                    let err = NotifyError::Configuration(format!("{err:#}"));
                    reporter.error(&format!("{err}; no notification sent"));
                    DeliverySummary::aborted(build, err)
                }
            };
            print_summary(&summary);
        }
        Commands::Outstanding { json } => {
            let outstanding = aggregator::collect_outstanding(&project, &mut reporter);
            if json {
                let out = serde_json::to_string_pretty(&outstanding)
                    .context("failed to serialize outstanding entries")?;
                println!("{out}");
            } else {
                print_outstanding(&outstanding);
            }
        }
        Commands::Resend { build, entry, all } => {
            let config = config?;
            let selected = select_profile(&config, profile)?;
            let client = endpoint::client_for(selected);
            let target = Endpoint::new(&client, selected.credentials());

            if all {
                let results = resend::resend_all(&project, &target, &mut reporter);
                for (item, outcome) in &results {
                    print_outcome(item.build, &item.entry.id, outcome);
                }
            } else {
                let (Some(build), Some(entry)) = (build, entry) else {
                    bail!("either --build with --entry, or --all is required");
                };
                let outcome = resend::resend(&project, build, &entry, &target, &mut reporter)?;
                print_outcome(build, &entry, &outcome);
            }
        }
        Commands::Events { build, json } => {
            let log = project
                .build(build)
                .events()
                .with_context(|| format!("failed to read event log of build #{build}"))?;
            if json {
                let out = serde_json::to_string_pretty(log.all_events())
                    .context("failed to serialize events")?;
                println!("{out}");
            } else {
                print_events(build, log.all_events());
            }
        }
        Commands::Ping => {
            let config = config?;
            let selected = select_profile(&config, profile)?;
            run_ping(selected, &mut reporter)?;
        }
        Commands::Validate => {
            run_validate(&config?)?;
        }
    }

    Ok(())
}

fn select_profile<'c>(config: &'c Config, requested: Option<&str>) -> Result<&'c RegistryProfile> {
    Ok(endpoint::resolve_profile(config, requested)?)
}

fn print_summary(summary: &DeliverySummary) {
    println!("build: {}", summary.build);
    let status = match &summary.status {
        BatchStatus::Processed => "processed".to_string(),
        BatchStatus::BuildNotSuccessful(Some(outcome)) => format!("not notified (build {outcome})"),
        BatchStatus::BuildNotSuccessful(None) => "not notified (build unfinished)".to_string(),
        BatchStatus::NothingToSend => "nothing to send".to_string(),
        BatchStatus::Aborted(err) => format!("aborted ({err})"),
    };
    println!("status: {status}");

    if summary.outcomes.is_empty() {
        return;
    }
    println!();
    for (record, outcome) in &summary.outcomes {
        println!("{} {}: {outcome}", record.action, record.module);
    }
    println!();
    println!(
        "delivered: {}, postponed: {}, skipped: {}",
        summary.delivered(),
        summary.postponed(),
        summary.skipped()
    );
}

fn print_outstanding(outstanding: &[OutstandingEntry]) {
    if outstanding.is_empty() {
        println!("no outstanding entries");
        return;
    }

    for item in outstanding {
        let entry = &item.entry;
        match &entry.payload {
            Some(payload) => println!(
                "#{} {} {} {} ({})",
                item.build,
                entry.id,
                entry.action,
                entry.module,
                payload.display()
            ),
            None => println!("#{} {} {} {}", item.build, entry.id, entry.action, entry.module),
        }
    }
}

fn print_outcome(build: u64, entry: &str, outcome: &AttemptOutcome) {
    println!("#{build} {entry}: {outcome}");
}

fn print_events(build: u64, events: &[DeliveryEvent]) {
    if events.is_empty() {
        println!("no events for build #{build}");
        return;
    }

    for event in events {
        let what = match &event.event_type {
            EventType::Delivered { receipt } => format!(
                "{} delivered to {} ({})",
                receipt.action, receipt.registry, receipt.status
            ),
            EventType::Postponed {
                action,
                entry_id,
                reason,
            } => format!("{action} postponed as {entry_id}: {reason}"),
            EventType::Skipped { action, reason } => format!("{action} skipped: {reason}"),
            EventType::Discarded { entry_id } => format!("entry {entry_id} resolved"),
        };
        println!("{} {} {what}", event.timestamp.to_rfc3339(), event.module);
    }
}

fn run_ping(profile: &RegistryProfile, reporter: &mut dyn Reporter) -> Result<()> {
    let client = endpoint::client_for(profile);
    reporter.info(&format!("probing {}...", client.base_url()));

    if !client.is_reachable() {
        bail!("registry '{}' at {} is not reachable", profile.name, client.base_url());
    }
    println!("registry '{}' at {}: reachable", profile.name, client.base_url());
    Ok(())
}

fn run_validate(config: &Config) -> Result<()> {
    let issues = config.validate();
    if issues.is_empty() {
        println!("configuration ok ({} profile(s))", config.registries.len());
        return Ok(());
    }

    for issue in &issues {
        println!("{issue}");
    }

    let errors = issues.iter().filter(|i| i.is_error()).count();
    if errors > 0 {
        bail!("configuration has {errors} error(s)");
    }
    Ok(())
}
