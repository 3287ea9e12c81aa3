use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use regex::Regex;
use scrutin_contracts::CancelSignal;
use scrutin_core::config::OrchestratorConfig;
use scrutin_core::orchestration::{AnalysisManager, Collaborators, RunOutcome};
use scrutin_core::store::InMemoryFindingStore;
use scrutin_model::{FindingKind, ProjectId, TriggerType};
use scrutinctl::engine::LinePatternEngine;
use scrutinctl::report::{OutputFormat, ProgressCallback, render_json, render_text};
use scrutinctl::rules::{PatternRule, RuleSet};
use scrutinctl::state::FindingState;
use scrutinctl::workspace::{DirectoryExclusions, FsDocuments, collect_files};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_FINDINGS: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "scrutinctl", version)]
#[command(about = "Run scrutin static analysis over local source files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze files and print the findings
    Analyze(AnalyzeArgs),
    /// List the rules that would be applied
    Rules(RuleArgs),
    /// Print the effective orchestrator configuration as TOML
    Config(ConfigArgs),
}

#[derive(ClapArgs, Debug, Clone)]
struct RuleArgs {
    /// TOML file with additional `[[rule]]` entries
    #[arg(long, env = "SCRUTIN_RULES")]
    rules: Option<PathBuf>,

    /// Inline rule as KEY=PATTERN; may be repeated
    #[arg(long = "rule", value_name = "KEY=PATTERN")]
    inline: Vec<String>,

    /// Skip the built-in rules
    #[arg(long, default_value_t = false)]
    no_builtin: bool,
}

#[derive(ClapArgs, Debug, Clone)]
struct ConfigArgs {
    /// Orchestrator configuration file (TOML)
    #[arg(long, env = "SCRUTIN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
struct AnalyzeArgs {
    /// Files or directories to analyze, relative to the root. Defaults to
    /// the whole root.
    paths: Vec<PathBuf>,

    /// Workspace root; findings are reported relative to it
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    rules: RuleArgs,

    /// Regex over relative paths excluding files from analysis; may be
    /// repeated
    #[arg(long = "exclude", value_name = "REGEX")]
    excludes: Vec<String>,

    /// Analyze excluded files anyway (binary and missing files are still
    /// skipped)
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Run as a background analysis that does not take the run status
    #[arg(long, default_value_t = false)]
    background: bool,

    /// JSON file keeping findings between invocations
    #[arg(long)]
    state: Option<PathBuf>,

    /// Exit with status 1 when any issue or hotspot is reported
    #[arg(long, default_value_t = false)]
    fail_on_findings: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                |_| "info,analysis::run=info,analysis::queue=info,analysis::tracking=warn".into(),
            ),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Analyze(args) => analyze(args).await,
        Command::Rules(args) => {
            print_rules(&load_rules(&args)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config(args) => {
            let config = load_config(&args)?;
            print!("{}", toml::to_string(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(args: &ConfigArgs) -> Result<OrchestratorConfig> {
    match &args.config {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(OrchestratorConfig::default()),
    }
}

fn load_rules(args: &RuleArgs) -> Result<RuleSet> {
    let mut rules = if args.no_builtin {
        RuleSet::empty()
    } else {
        RuleSet::builtin()?
    };
    if let Some(path) = &args.rules {
        rules.extend(RuleSet::load(path)?)?;
    }
    for spec in &args.inline {
        rules.push(PatternRule::parse_inline(spec)?)?;
    }
    Ok(rules)
}

fn print_rules(rules: &RuleSet) {
    for rule in rules.rules() {
        let kind = match rule.kind {
            FindingKind::Issue => "issue",
            FindingKind::SecurityHotspot => "hotspot",
        };
        println!(
            "{:<24} {:<8} {:<9} {}",
            rule.key,
            kind,
            format!("{:?}", rule.severity).to_lowercase(),
            rule.pattern
        );
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize()
        .with_context(|| format!("workspace root {} is not accessible", root.display()))
}

/// Flips the returned signal on Ctrl-C; the run watchdog picks it up.
fn install_interrupt_signal() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling analysis");
            flag.store(true, Ordering::Release);
        }
    });
    interrupted
}

async fn analyze(args: AnalyzeArgs) -> Result<ExitCode> {
    let root = canonical_root(&args.root)?;
    let config = load_config(&args.config)?;
    let rules = Arc::new(load_rules(&args.rules)?);
    if rules.is_empty() {
        bail!("no rules to apply");
    }
    let excludes = args
        .excludes
        .iter()
        .map(|pattern| {
            Regex::new(pattern).with_context(|| format!("invalid --exclude pattern '{pattern}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    let project = ProjectId::new();
    let documents = Arc::new(FsDocuments::new(&root));
    let store = Arc::new(InMemoryFindingStore::new());
    if let Some(path) = &args.state {
        FindingState::load(path)?.seed(&store);
    }
    let collaborators = Collaborators {
        exclusions: Arc::new(DirectoryExclusions::new(project, &root).with_patterns(excludes)),
        engine: Arc::new(LinePatternEngine::new(rules, documents.clone())),
        store: store.clone(),
        documents,
    };
    let manager = AnalysisManager::new(project, collaborators, &config)?;

    let files = collect_files(&root, &args.paths);
    if files.is_empty() {
        info!(root = %root.display(), "No files to analyze");
        return Ok(ExitCode::SUCCESS);
    }

    let trigger = if args.force {
        TriggerType::Action
    } else {
        TriggerType::CheckIn
    };
    let callback = Arc::new(ProgressCallback::new());
    let signal: Arc<dyn CancelSignal> = install_interrupt_signal();
    let handle = if args.background {
        manager.submit_background(files, trigger, callback.clone(), signal)
    } else {
        match manager.submit_foreground(files, trigger, false, callback.clone(), signal) {
            Some(handle) => handle,
            None => bail!("another analysis is already running"),
        }
    };

    let outcome = handle.outcome().await;
    manager.shutdown();

    let report = match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::Cancelled => {
            eprintln!("analysis cancelled");
            return Ok(ExitCode::from(EXIT_CANCELLED));
        }
        RunOutcome::Failed { message } => {
            bail!(callback.error().unwrap_or(message));
        }
    };

    if let Some(path) = &args.state {
        FindingState::capture(&store).save(path)?;
    }

    match args.format {
        OutputFormat::Text => print!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }

    if let Some(failed) = callback.failed_files()
        && !failed.is_empty()
    {
        warn!(count = failed.len(), "some files could not be analyzed");
    }

    if args.fail_on_findings && !report.findings.is_empty() {
        return Ok(ExitCode::from(EXIT_FINDINGS));
    }
    Ok(ExitCode::SUCCESS)
}
