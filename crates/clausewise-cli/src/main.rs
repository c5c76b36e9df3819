use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use clausewise_runtime::{AgentSet, CancellationFlag, Orchestrator, PipelineMode, RuntimeConfig};

mod render;

#[derive(Parser, Debug)]
#[command(name = "clausewise", version, about = "Contract clause and risk analysis")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse one contract document
    Analyze(AnalyzeArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Path to the document (PDF, DOCX or plain text)
    path: PathBuf,

    /// Pipeline mode (overrides the config file)
    #[arg(long)]
    mode: Option<PipelineMode>,

    /// Parser tool attempts in adaptive mode (overrides the config file)
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Runtime configuration (YAML or JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Agents for the four reasoning roles
    #[arg(long, value_enum, default_value_t = AgentKind::Heuristic)]
    agents: AgentKind,

    /// Format hint; defaults to the file extension
    #[arg(long)]
    hint: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum AgentKind {
    Heuristic,
    Anthropic,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Analyze(args) => run_analyze(args).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_analyze(args: AnalyzeArgs) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(attempts) = args.max_attempts {
        config.max_tool_attempts = attempts;
    }

    let bytes = std::fs::read(&args.path)
        .with_context(|| format!("read document {}", args.path.display()))?;
    let hint = args.hint.clone().or_else(|| extension_hint(&args.path));

    let agents = build_agents(args.agents, &config)?;
    let orchestrator = Orchestrator::builder()
        .config(config)
        .agents(agents)
        .build()
        .context("build orchestrator")?;

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping before the next stage");
            on_interrupt.cancel();
        }
    });

    let run = orchestrator.analyze_with_cancel(bytes, hint, &cancel).await;

    match args.format {
        OutputFormat::Text => print!("{}", render::render_text(&run)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&run).context("serialize report")?
        ),
    }

    if run.is_completed() {
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(error) = &run.report.error {
        eprintln!("{}: {}", error.kind, error.message);
    }
    Ok(ExitCode::FAILURE)
}

fn extension_hint(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(feature = "anthropic")]
fn build_agents(kind: AgentKind, config: &RuntimeConfig) -> Result<AgentSet> {
    use clausewise_runtime::providers::{AnthropicProvider, LlmProvider};
    use clausewise_runtime::resilience::{BudgetTracker, CircuitBreaker};
    use clausewise_runtime::{CachedProvider, LlmClient};
    use std::sync::Arc;

    match kind {
        AgentKind::Heuristic => Ok(AgentSet::heuristic()),
        AgentKind::Anthropic => {
            let llm = &config.llm;
            let provider: Arc<dyn LlmProvider> =
                Arc::new(AnthropicProvider::from_env().context("configure Anthropic provider")?);
            let provider: Arc<dyn LlmProvider> = if llm.cache.enabled {
                Arc::new(CachedProvider::new(provider, &llm.cache))
            } else {
                provider
            };

            let client = LlmClient::new(provider, llm.completion.clone())
                .with_circuit_breaker(Arc::new(CircuitBreaker::new(llm.circuit_breaker.clone())))
                .with_budget(Arc::new(BudgetTracker::from_config(&llm.budget)));
            Ok(AgentSet::llm(client))
        }
    }
}

#[cfg(not(feature = "anthropic"))]
fn build_agents(kind: AgentKind, _config: &RuntimeConfig) -> Result<AgentSet> {
    match kind {
        AgentKind::Heuristic => Ok(AgentSet::heuristic()),
        AgentKind::Anthropic => {
            anyhow::bail!("this build has no Anthropic support; rebuild with --features anthropic")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze_flags() {
        let cli = Cli::try_parse_from([
            "clausewise",
            "analyze",
            "nda.pdf",
            "--mode",
            "adaptive",
            "--max-attempts",
            "5",
            "--format",
            "json",
        ])
        .unwrap();

        let Commands::Analyze(args) = cli.command;
        assert_eq!(args.mode, Some(PipelineMode::Adaptive));
        assert_eq!(args.max_attempts, Some(5));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.agents, AgentKind::Heuristic);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = Cli::try_parse_from(["clausewise", "analyze", "x.txt", "--mode", "random"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint(Path::new("a/Contract.PDF")), Some("pdf".into()));
        assert_eq!(extension_hint(Path::new("README")), None);
    }
}
