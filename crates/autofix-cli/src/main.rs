//! autofix - automated source repair CLI
//!
//! The `autofix` command runs the repair pipeline from a CI job step.
//!
//! ## Commands
//!
//! - `run`: ask the completion service for a fix, validate it, publish it
//! - `validate`: build and run a source file as it is, without writing

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use autofix_ci::{
    BotIdentity, BuiltinToolchain, CompletionApi, CompletionConfig, GitPublisher,
    HttpCompletionClient, PipelineResult, PublishConfig, PublishPolicy, RepairPipeline,
    RepairSpec, RunLock, StageConfig, StageResult, ToolchainConfig, Validator,
};
use autofix_core::{
    append_run_summary_md, write_run_report_json, GenerationParams, RunStage, TriggerContext,
    TriggerDecision, DEFAULT_INSTRUCTION, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
};

#[derive(Parser)]
#[command(name = "autofix")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Automated source repair pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a fix for a source file, validate it and publish it
    Run(RunArgs),

    /// Build and run a source file without modifying it
    Validate {
        /// Source file to validate
        file: PathBuf,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct ToolchainArgs {
    /// Toolchain preset: java, rust or python
    #[arg(long, default_value = "java")]
    toolchain: String,

    /// Custom build command ({file}, {stem} and {dir} are substituted)
    #[arg(long)]
    build_cmd: Option<String>,

    /// Custom run command ({file}, {stem} and {dir} are substituted)
    #[arg(long)]
    run_cmd: Option<String>,

    /// Build stage timeout in seconds
    #[arg(long, default_value = "300")]
    build_timeout: u64,

    /// Run stage timeout in seconds
    #[arg(long, default_value = "60")]
    run_timeout: u64,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Source file to repair
    file: PathBuf,

    #[command(flatten)]
    toolchain: ToolchainArgs,

    /// Instruction placed before the source in the prompt
    #[arg(long, default_value = DEFAULT_INSTRUCTION)]
    instruction: String,

    /// Model identifier
    #[arg(long, env = "AUTOFIX_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Maximum output tokens
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value = "0.2")]
    temperature: f32,

    /// Completion wire format: completions or chat
    #[arg(long, env = "AUTOFIX_API", default_value = "completions")]
    api: String,

    /// Completion endpoint URL (default depends on --api)
    #[arg(long, env = "AUTOFIX_ENDPOINT")]
    endpoint: Option<String>,

    /// API key for the completion service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Completion request timeout in seconds
    #[arg(long, env = "AUTOFIX_TIMEOUT_SECS", default_value = "60")]
    timeout: u64,

    /// Branch that triggers the pipeline and receives the push
    #[arg(short, long, default_value = "main")]
    branch: String,

    /// Remote to push to
    #[arg(long, default_value = "origin")]
    remote: String,

    /// Commit without pushing
    #[arg(long)]
    no_push: bool,

    /// Run even if the trigger is not a push to --branch
    #[arg(long)]
    ignore_trigger: bool,

    /// Skip publishing when the candidate equals the original
    #[arg(long)]
    skip_unchanged: bool,

    /// Leave a failed candidate on disk instead of restoring the original
    #[arg(long)]
    keep_failed_candidate: bool,

    /// Seconds to wait for a concurrent run on the same branch
    #[arg(long, default_value = "0")]
    lock_wait: u64,

    /// Commit author name
    #[arg(long, default_value = autofix_ci::DEFAULT_BOT_NAME)]
    bot_name: String,

    /// Commit author email
    #[arg(long, default_value = autofix_ci::DEFAULT_BOT_EMAIL)]
    bot_email: String,

    /// Commit message
    #[arg(short, long, default_value = autofix_ci::DEFAULT_COMMIT_MESSAGE)]
    message: String,

    /// Write the run report as JSON to this path ("-" for stdout)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Append a Markdown run summary to this file
    #[arg(long, env = "GITHUB_STEP_SUMMARY")]
    summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    autofix_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Validate { file, toolchain } => cmd_validate(&file, &toolchain).await,
    }
}

fn build_toolchain(args: &ToolchainArgs) -> Result<ToolchainConfig> {
    let preset = BuiltinToolchain::parse(&args.toolchain)?;
    let mut toolchain = ToolchainConfig::from_builtin(preset);

    if let Some(line) = &args.build_cmd {
        toolchain.build = StageConfig::custom(
            "build".to_string(),
            StageConfig::parse_command(line).context("Invalid --build-cmd")?,
            args.build_timeout,
        );
    }
    if let Some(line) = &args.run_cmd {
        toolchain.run = StageConfig::custom(
            "run".to_string(),
            StageConfig::parse_command(line).context("Invalid --run-cmd")?,
            args.run_timeout,
        );
    }

    Ok(toolchain.with_timeouts(args.build_timeout, args.run_timeout))
}

fn build_spec(args: &RunArgs) -> Result<RepairSpec> {
    let params = GenerationParams {
        model: args.model.clone(),
        max_tokens: args.max_tokens,
        temperature: args.temperature,
    };
    let spec = RepairSpec::new(&args.file)
        .with_instruction(&args.instruction)
        .with_params(params)
        .with_toolchain(build_toolchain(&args.toolchain)?)
        .with_policy(PublishPolicy {
            skip_unchanged: args.skip_unchanged,
        })
        .keep_failed_candidate(args.keep_failed_candidate);
    spec.validate().context("Invalid repair configuration")?;
    Ok(spec)
}

fn build_completion_config(args: &RunArgs) -> Result<CompletionConfig> {
    let api = CompletionApi::parse(&args.api)?;
    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| api.default_endpoint().to_string());
    let mut config = CompletionConfig::new(&endpoint, api).with_timeout(args.timeout);
    if let Some(key) = &args.api_key {
        config = config.with_api_key(key);
    }
    Ok(config)
}

fn build_publish_config(args: &RunArgs) -> PublishConfig {
    PublishConfig {
        identity: BotIdentity {
            name: args.bot_name.clone(),
            email: args.bot_email.clone(),
        },
        message: args.message.clone(),
        remote: args.remote.clone(),
        branch: args.branch.clone(),
        push: !args.no_push,
    }
}

/// Directory that holds `file`, for git and toolchain commands.
fn file_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let dir = file_dir(&args.file);
    if !autofix_core::is_git_repo(&dir) {
        anyhow::bail!("{:?} is not inside a git repository", args.file);
    }
    let repo = autofix_core::repo_root(&dir).context("Failed to locate repository root")?;

    if !args.ignore_trigger {
        let local_branch = autofix_core::current_branch(&repo).ok();
        match TriggerContext::from_env().evaluate(&args.branch, local_branch.as_deref()) {
            TriggerDecision::Run { branch } => info!(branch = %branch, "Trigger accepted"),
            TriggerDecision::Ignore { reason } => {
                println!("Nothing to do: {}", reason);
                return Ok(());
            }
        }
    }

    let spec = build_spec(args)?;
    let client = match HttpCompletionClient::new(build_completion_config(args)?) {
        Ok(client) => client,
        Err(err) => {
            let result = PipelineResult::aborted(&spec, RunStage::Request, err);
            return finish(args, &result);
        }
    };
    let publisher = GitPublisher::new(&repo, build_publish_config(args));

    println!("Repairing: {:?}", args.file);
    println!("Repository: {:?}", repo);
    println!(
        "Git SHA: {}",
        autofix_core::capture_head_sha(&repo).unwrap_or_else(|_| "unknown".to_string())
    );
    println!("Spec digest: {}", spec.digest().short());
    println!();

    let pipeline = RepairPipeline::new(Arc::new(client), Arc::new(publisher))
        .with_lock(RunLock::default_path(&repo, &args.branch))
        .with_lock_wait(std::time::Duration::from_secs(args.lock_wait));
    let result = pipeline.run(&spec).await;
    finish(args, &result)
}

/// Print and record a finished run, failing unless it succeeded.
fn finish(args: &RunArgs, result: &PipelineResult) -> Result<()> {
    print_result(result);
    write_artifacts(args, result)?;

    if let Some(err) = &result.error {
        anyhow::bail!("Repair run failed: {}", err)
    } else if result.success() {
        println!("\n✓ Repair run finished: {}", result.state());
        Ok(())
    } else {
        anyhow::bail!("Candidate was not published: {}", result.state())
    }
}

fn print_result(result: &PipelineResult) {
    println!("Run ID: {}", result.run_id());
    println!("State: {}", result.state());
    println!("Duration: {}ms", result.duration_ms());
    println!();

    print_stages(result.stages());

    if let Some(verdict) = &result.verdict {
        println!();
        println!(
            "Gate: {} ({})",
            if verdict.passed() { "✓ PUBLISH" } else { "✗ SKIP" },
            verdict.message
        );
    }
    if let Some(receipt) = &result.receipt {
        println!(
            "Commit: {}{}",
            receipt.commit_sha,
            if receipt.pushed { " (pushed)" } else { "" }
        );
    }
    if let Some(err) = &result.error {
        println!("Error [{}]: {}", err.kind(), err);
    }
}

fn print_stages(stages: &[StageResult]) {
    for stage_result in stages {
        let status = if stage_result.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, stage_result.stage_name, stage_result.duration_ms, stage_result.exit_code
        );
    }
}

fn write_artifacts(args: &RunArgs, result: &PipelineResult) -> Result<()> {
    let report = result.to_report();

    match &args.report {
        Some(path) if path.as_os_str() == "-" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(path) => {
            write_run_report_json(path, &report)
                .with_context(|| format!("Failed to write run report {:?}", path))?;
            info!(path = ?path, "Wrote run report");
        }
        None => {}
    }

    if let Some(path) = &args.summary {
        append_run_summary_md(path, &report)
            .with_context(|| format!("Failed to write run summary {:?}", path))?;
    }
    Ok(())
}

async fn cmd_validate(file: &Path, toolchain: &ToolchainArgs) -> Result<()> {
    let validator = Validator::new(build_toolchain(toolchain)?);

    println!("Validating: {:?}", file);
    for line in validator.toolchain().command_lines() {
        println!("  $ {}", line);
    }
    println!();

    let report = validator
        .check(file)
        .await
        .with_context(|| format!("Failed to validate {:?}", file))?;

    print_stages(&report.stages);
    println!();

    if report.outcome.passed() {
        println!("✓ {}", report.outcome);
        Ok(())
    } else {
        anyhow::bail!("Validation failed: {}", report.outcome)
    }
}
