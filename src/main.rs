// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! casetrace main entry point - demo driver and config inspection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use casetrace::config;
use casetrace::fields;
use casetrace::logging::{
    coordinator, get_logger, init_coordinator, Direction, Fields, LogLevel, RequestSummary,
    UnifiedLogger,
};
use casetrace::telemetry::{init_telemetry, GLOBAL_METRICS};
use casetrace::LayerError;

/// casetrace version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Investigation phases every simulated request runs through.
const PHASES: [&str; 3] = ["intake", "hypothesis", "validation"];

/// casetrace - request-scoped logging coordination.
#[derive(Parser)]
#[command(name = "casetrace")]
#[command(author, version, about = "Request-scoped logging coordination", long_about = None)]
struct Cli {
    /// Config file (JSON or YAML) applied over workspace and global config
    #[arg(short, long, global = true, env = "CASETRACE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CASETRACE_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive simulated investigation requests through all four layers
    Demo {
        /// Number of requests to run
        #[arg(short = 'n', long, default_value_t = 8)]
        requests: usize,

        /// Requests in flight at once
        #[arg(short = 'j', long, default_value_t = 4)]
        concurrency: usize,

        /// Probability (0-1) that an LLM call fails
        #[arg(long, default_value_t = 0.2)]
        fail_rate: f64,

        /// Output format for summaries
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration
    Show,
}

/// Failures the simulated backend can produce.
#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("LLM call timed out after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Layer(#[from] LayerError),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let workspace_root = std::env::current_dir()?;
    let mut resolved = config::load_config(&workspace_root, cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        resolved.telemetry.level = level.to_lowercase();
        config::validate(&resolved)?;
    }

    match cli.command {
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("{}", serde_json::to_string_pretty(&resolved)?);
            }
        },
        Commands::Version => {
            println!("casetrace {}", VERSION);
        }
        Commands::Demo {
            requests,
            concurrency,
            fail_rate,
            format,
        } => {
            if !(0.0..=1.0).contains(&fail_rate) {
                anyhow::bail!("--fail-rate must be between 0 and 1, got {fail_rate}");
            }
            let _guard = init_telemetry(&resolved.telemetry_config())?;
            init_coordinator(resolved.coordinator_settings())?;
            run_demo(requests, concurrency, fail_rate, format).await?;
        }
    }
    Ok(())
}

async fn run_demo(
    requests: usize,
    concurrency: usize,
    fail_rate: f64,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for n in 0..requests {
        let permit = Arc::clone(&permits).acquire_owned().await?;
        tasks.spawn(async move {
            let attributes = fields! {
                "investigation_id" => format!("inv-{n:04}"),
                "session_id" => format!("s-{}", n % 3),
                "route" => "/investigations",
            };
            let (outcome, summary) = coordinator()
                .run_request(attributes, investigate(fail_rate))
                .await;
            drop(permit);
            (n, outcome, summary)
        });
    }

    let mut results = Vec::with_capacity(requests);
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(n, _, _)| *n);

    match format {
        OutputFormat::Json => {
            for (_, _, summary) in &results {
                if let Some(summary) = summary {
                    println!("{}", serde_json::to_string(summary)?);
                }
            }
            let counts = GLOBAL_METRICS.emission_counts();
            println!(
                "{}",
                json!({
                    "requests": counts.requests,
                    "emitted": counts.emitted,
                    "deduplicated": counts.deduplicated,
                    "errorsSuppressed": counts.errors_suppressed,
                })
            );
        }
        OutputFormat::Text => {
            println!("\n{}", "Request summaries".bright_blue().bold());
            for (n, outcome, summary) in &results {
                print_summary(*n, outcome, summary.as_ref());
            }
            println!("\n{}", GLOBAL_METRICS.snapshot().format_report());
        }
    }
    Ok(())
}

fn print_summary(n: usize, outcome: &Result<usize, DemoError>, summary: Option<&RequestSummary>) {
    let status = match outcome {
        Ok(findings) => format!("ok ({findings} findings)").green(),
        Err(e) => format!("failed: {e}").red(),
    };
    let Some(summary) = summary else {
        println!("  #{n:<3} {status}");
        return;
    };
    let short_id = summary.correlation_id.get(..8).unwrap_or(summary.correlation_id.as_str());
    let violations = if summary.performance_violations > 0 {
        summary.performance_violations.to_string().yellow()
    } else {
        summary.performance_violations.to_string().normal()
    };
    println!(
        "  #{n:<3} {} {:>7.1}ms  ops {:<3} errors {:<2} slow {:<2} {}",
        short_id.dimmed(),
        summary.duration_seconds * 1000.0,
        summary.operations_logged,
        summary.errors_encountered,
        violations,
        status
    );
}

/// One simulated investigation: API handler, service orchestration, core phases.
async fn investigate(fail_rate: f64) -> Result<usize, DemoError> {
    let api = get_logger("investigations", "api")?;
    let service = get_logger("investigation_service", "service")?;
    let core = get_logger("agent", "core")?;
    let llm = get_logger("llm_client", "infrastructure")?;
    let (core, llm) = (core.as_ref(), llm.as_ref());

    let payload = json!({"alert": "checkout latency p99 > 2s", "severity": "high", "service": "checkout"});
    api.log_boundary("create_investigation", Direction::Inbound, Some(&payload), Fields::new());

    let result = api
        .operation_async("create_investigation", Fields::new(), |_| async {
            service
                .operation_async("run_phases", Fields::new(), |ctx| async move {
                    let mut findings = 0;
                    for phase in PHASES {
                        ctx.insert("phase", phase);
                        findings += core
                            .operation_async(phase, fields! { "phase" => phase }, |_| {
                                run_phase(core, llm, phase, fail_rate)
                            })
                            .await?;
                    }
                    Ok::<_, DemoError>(findings)
                })
                .await
        })
        .await;

    api.log_boundary(
        "create_investigation",
        Direction::Outbound,
        None,
        fields! { "ok" => result.is_ok() },
    );
    result
}

async fn run_phase(
    core: &UnifiedLogger,
    llm: &UnifiedLogger,
    phase: &'static str,
    fail_rate: f64,
) -> Result<usize, DemoError> {
    let latency_ms = 10 + (roll() * 60.0) as u64;

    llm.log_boundary("chat_completion", Direction::Outbound, None, fields! { "phase" => phase });
    let tokens = llm
        .operation_async("chat_completion", fields! { "phase" => phase }, |ctx| async move {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
            if roll() < fail_rate {
                return Err(DemoError::Timeout(latency_ms));
            }
            let tokens = 200 + (roll() * 800.0) as u64;
            ctx.insert("tokens", tokens);
            Ok(tokens)
        })
        .await?;

    core.log_metric("llm_tokens", tokens as f64, "tokens", fields! { "phase" => phase });
    let findings = 1 + (roll() * 3.0) as usize;
    core.log_event(
        "business",
        &format!("{phase}_completed"),
        LogLevel::Info,
        Some(json!({ "findings": findings })),
    );
    Ok(findings)
}

/// Uniform value in [0, 1).
fn roll() -> f64 {
    (Uuid::new_v4().as_u128() % 10_000) as f64 / 10_000.0
}
