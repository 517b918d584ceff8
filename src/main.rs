//! composable-rag - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use composable_rag::{
    cli::{Args, Commands, RagRuntime, Verbosity},
    config::Config,
    degradation::{DegradationLevel, DegradationStatus},
    pipeline::operations::BUILTIN_FALLBACKS,
    scheduler::TaskStatus,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let mut config = match (&args.command, args.config.as_deref()) {
        (Commands::Config { init: true }, Some(path)) if !path.exists() => Config::default(),
        (_, path) => Config::load(path).context("Failed to load configuration")?,
    };
    if let Some(model) = &args.model {
        config.services.model = model.clone();
    }

    match &args.command {
        Commands::Ask {
            question,
            wait,
            keyword_intent,
            answer_prompt,
            json,
        } => {
            let runtime =
                RagRuntime::from_config(config).context("Failed to initialize services")?;
            let outcome = run_ask(
                &runtime,
                &args,
                question,
                Duration::from_secs(*wait),
                *keyword_intent,
                answer_prompt.clone(),
                *json,
            )
            .await;
            runtime.shutdown().await;
            outcome?;
        }
        Commands::Status { json } => {
            show_operations(&config, *json)?;
        }
        Commands::Config { init } => {
            show_config(&args, &config, *init)?;
        }
    }

    Ok(())
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_ask(
    runtime: &RagRuntime,
    args: &Args,
    question: &str,
    wait: Duration,
    keyword_intent: bool,
    answer_prompt: Option<String>,
    json: bool,
) -> Result<()> {
    let verbosity = args.verbosity();
    let (id, intent, result) = runtime
        .ask(question, wait, keyword_intent, answer_prompt)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if verbosity.show_report() {
        println!(
            "{} {} ({}, confidence {:.2})",
            "Intent:".bold(),
            intent.level,
            intent.level.description(),
            intent.confidence
        );
        println!("{} {}", "Task:".bold(), id.dimmed());
    }

    match result.status {
        TaskStatus::Completed => {
            let data = result.data.unwrap_or_default();
            let answer = data
                .get("answer")
                .and_then(|a| a.as_str())
                .unwrap_or("(no answer produced)");

            if verbosity.show_report() {
                println!();
            }
            println!("{}", answer);

            if verbosity.show_report() {
                if let Some(summary) = data.get("summary").and_then(|s| s.as_str()) {
                    println!();
                    println!("{}", "Execution report".bold());
                    println!("{}", summary.dimmed());
                }
                println!();
                print_health(&runtime.status());
            }
            Ok(())
        }
        TaskStatus::Queued | TaskStatus::Running => {
            anyhow::bail!("task {} still {} after {}s", id, result.status, wait.as_secs())
        }
        status => {
            let message = result.message.unwrap_or_default();
            eprintln!("{} {}: {}", "Task".red().bold(), status.to_string().red(), message);
            if verbosity.show_report() {
                eprintln!();
                print_health(&runtime.status());
            }
            anyhow::bail!("task {} {}", id, status)
        }
    }
}

/// Operation health as seen by this process after the run
fn print_health(status: &BTreeMap<String, DegradationStatus>) {
    println!("{}", "Operation health".bold());
    for (name, health) in status {
        let level = match health.level {
            DegradationLevel::Normal => health.level.to_string().green(),
            DegradationLevel::Partial => health.level.to_string().yellow(),
            DegradationLevel::Severe => health.level.to_string().red(),
        };
        println!(
            "  {:<18} {:<8} errors={} {}",
            name,
            level,
            health.error_count,
            health.reason_str().dimmed()
        );
    }
}

/// Built-in operations, their fallbacks and the configured thresholds.
///
/// Health counters live only as long as one process, so live levels are
/// printed by `ask` after each run rather than here.
fn show_operations(config: &Config, json: bool) -> Result<()> {
    let degradation = &config.degradation;

    if json {
        let operations: Vec<_> = BUILTIN_FALLBACKS
            .iter()
            .map(|(primary, fallback)| json!({ "operation": primary, "fallback": fallback }))
            .collect();
        let listing = json!({ "operations": operations, "degradation": degradation });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{}", "Built-in operations".bold());
    for (primary, fallback) in BUILTIN_FALLBACKS {
        println!("  {:<18} -> {}", primary, fallback);
    }
    println!();
    println!(
        "Degraded to {} after {} consecutive errors, {} after {}",
        DegradationLevel::Partial.to_string().yellow(),
        degradation.partial_threshold,
        DegradationLevel::Severe.to_string().red(),
        degradation.severe_threshold
    );
    Ok(())
}

fn show_config(args: &Args, config: &Config, init: bool) -> Result<()> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    if init {
        config.save(&path).context("Failed to write configuration")?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    println!("{} {}", "Configuration:".bold(), path.display());
    println!();
    print!("{}", toml::to_string_pretty(config).context("Failed to serialize config")?);
    Ok(())
}
