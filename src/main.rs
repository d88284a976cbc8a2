use anyhow::{Context, Result};
use std::sync::Arc;
use tagrelease::cli::commands::{HistoryCommand, MatchCommand, RunCommand, ValidateCommand};
use tagrelease::cli::output::*;
use tagrelease::cli::{Cli, Command};
use tagrelease::execution::{ExecutionEngine, ExecutionEvent, ProcessRunner};
use tagrelease::persistence::{
    create_summary, ExecutionSummary, PersistenceBackend, SqliteExecutionStore,
};
use tagrelease::{ExecutionStatus, Pipeline, PipelineConfig, PushEvent, SecretStore};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for a run interrupted with Ctrl-C
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.stream).await?,
        Command::Match(cmd) => match_reference(cmd)?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand, stream: bool) -> Result<()> {
    let config = PipelineConfig::load(cmd.file.as_deref())
        .context("Failed to load pipeline config")?;

    let mut event = PushEvent::new(&cmd.reference, &cmd.repository);
    if let Some(sha) = &cmd.sha {
        event = event.with_commit(sha);
    }

    let Some(mut pipeline) = Pipeline::for_push(&config, &event)? else {
        println!(
            "{} {} does not match the release trigger, no job created",
            INFO,
            style(&cmd.reference).cyan()
        );
        return Ok(());
    };

    println!(
        "{} Loaded pipeline: {} ({} -> {})",
        INFO,
        style(&pipeline.name).bold(),
        style(&pipeline.tag.name).cyan(),
        style(&pipeline.tag.version).dim()
    );

    // Apply environment overrides
    let secret_names = config.secret_names();
    for (key, value) in &cmd.env {
        if secret_names.contains(key) {
            anyhow::bail!("--env {} would shadow a secret of the same name", key);
        }
        pipeline.variables.insert(key.clone(), value.clone());
        debug!("Environment override: {}={}", key, value);
    }

    let secrets = SecretStore::from_env(&secret_names);
    for name in secret_names.iter().filter(|n| secrets.get(n.as_str()).is_none()) {
        warn!("Secret {} is not set; the publish step will fail", name);
    }

    let mut engine = ExecutionEngine::new(ProcessRunner::new(), secrets);
    engine.add_event_handler(move |event| {
        if let Some(line) = format_execution_event(&event) {
            println!("{}", line);
        } else if stream {
            if let ExecutionEvent::StepOutput {
                step_id,
                stream: output_stream,
                line,
            } = &event
            {
                println!("{}", format_output_line(step_id, *output_stream, line));
            }
        }
    });

    // Dropping the run kills the running child and removes the workspace
    println!();
    let outcome = tokio::select! {
        result = engine.execute(&mut pipeline) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let result = match outcome {
        Some(result) => result.map_err(|e| e.to_string()),
        None => {
            pipeline.cancel("run cancelled");
            Err("cancelled".to_string())
        }
    };

    // Save to history
    if !cmd.no_history {
        let summary = create_summary(&pipeline);
        match save_history(&summary).await {
            Ok(()) => println!(
                "\n{} Run saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            ),
            Err(e) => warn!("Failed to save run history: {:#}", e),
        }
    }

    match result {
        Ok(()) => {
            println!(
                "\n{} {} published {}",
                CHECK,
                style(&pipeline.name).bold(),
                style(&pipeline.tag.version).green()
            );
            Ok(())
        }
        Err(_) if pipeline.state.status == ExecutionStatus::Cancelled => {
            println!(
                "\n{} {} {}",
                WARN,
                style(&pipeline.name).bold(),
                style("cancelled").yellow()
            );
            std::process::exit(EXIT_CANCELLED);
        }
        Err(e) => {
            println!(
                "\n{} {} {} ({} of steps completed)",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red(),
                style(format!("{:.0}%", pipeline.state.progress() * 100.0)).dim()
            );
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn save_history(summary: &ExecutionSummary) -> Result<()> {
    let store: Arc<dyn PersistenceBackend> = Arc::new(SqliteExecutionStore::with_default_path().await?);
    store.save_execution(summary).await
}

fn match_reference(cmd: &MatchCommand) -> Result<()> {
    let config = PipelineConfig::load(cmd.file.as_deref())
        .context("Failed to load pipeline config")?;
    let trigger = config.trigger()?;
    let event = PushEvent::new(&cmd.reference, "");
    let tag = trigger.evaluate(&event);

    if cmd.json {
        let data = serde_json::json!({
            "reference": cmd.reference,
            "triggers": tag.is_some(),
            "tag": tag,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    match tag {
        Some(tag) => println!(
            "{} {} triggers a release of {}",
            CHECK,
            style(&cmd.reference).cyan(),
            style(&tag.version).bold()
        ),
        None => {
            let patterns: Vec<&str> = trigger.patterns().iter().map(|p| p.as_str()).collect();
            println!(
                "{} {} does not trigger a release (tags: {})",
                SKIP,
                style(&cmd.reference).cyan(),
                style(patterns.join(", ")).dim()
            )
        }
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::load(cmd.file.as_deref()) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Tags: {}", style(config.trigger.tags.join(", ")).cyan());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            println!("  Secrets: {}", style(config.secret_names().join(", ")).cyan());
            println!("  Timeout: {}m", style(config.timeout_minutes()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteExecutionStore::with_default_path().await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.details)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let mut executions = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_executions(pipeline_name).await?
    } else {
        let mut all_execs = Vec::new();
        for pipeline in &store.list_pipelines().await? {
            all_execs.extend(store.list_executions(pipeline).await?);
        }
        all_execs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_execs
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, details: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Tag: {} ({})", style(&summary.tag).cyan(), summary.version);
    println!("  Status: {}", format_status(summary.status));
    println!("  Published: {}", summary.published);
    if let Some(step) = &summary.failed_step {
        println!("  Failed step: {}", style(step).red());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Steps: {}/{}",
        summary.completed_steps, summary.total_steps
    );

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
