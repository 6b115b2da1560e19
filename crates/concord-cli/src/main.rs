use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use concord_core::{
    ConsensusResult, DetectionRequest, ModelRegistry, Provider, RegistryFile, VotingStrategy,
};
use concord_runtime::{AnthropicJudge, ConsensusEngineBuilder, EngineConfig, JudgeRouter};

#[derive(Parser)]
#[command(
    name = "concord",
    version,
    about = "Multi-model hallucination detection by judge consensus"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the judge roster
    Models {
        /// Registry file (YAML or JSON); defaults to the built-in roster
        #[arg(long)]
        registry: Option<PathBuf>,
    },
    /// Run one detection
    Detect(DetectArgs),
}

#[derive(Args)]
struct DetectArgs {
    /// Agent output to check
    #[arg(long)]
    output: String,

    /// Prompt the agent answered
    #[arg(long)]
    input: Option<String>,

    /// Reference material the output should be grounded in
    #[arg(long)]
    context: Option<String>,

    /// majority|weighted|unanimous|threshold|cascading|adaptive
    #[arg(long, default_value = "weighted")]
    strategy: VotingStrategy,

    #[arg(long, default_value_t = 2)]
    min_models: usize,

    #[arg(long, default_value_t = 0.7)]
    threshold: f64,

    /// Spend ceiling in USD
    #[arg(long)]
    budget: Option<f64>,

    #[arg(long)]
    registry: Option<PathBuf>,

    /// Engine config (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

fn load_registry(path: Option<&Path>) -> Result<ModelRegistry> {
    let Some(path) = path else {
        return Ok(ModelRegistry::with_defaults());
    };
    let file = if path.extension().is_some_and(|ext| ext == "json") {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading registry {}", path.display()))?;
        RegistryFile::from_json(&content)?
    } else {
        RegistryFile::from_yaml_file(path)?
    };
    Ok(file.into_registry()?)
}

/// Disable enabled models that no judge client can reach.
fn disable_unrouted(registry: &mut ModelRegistry, router: &JudgeRouter) -> Result<()> {
    for model in registry.enabled() {
        if !router.has_client(model.provider) {
            tracing::warn!(
                model = %model.name,
                provider = %model.provider,
                routed = ?router.providers(),
                "No judge client for provider, model disabled"
            );
            registry.disable(model.name)?;
        }
    }
    Ok(())
}

fn print_models(registry: &ModelRegistry) {
    println!(
        "{:<15} {:<10} {:<8} {:>6} {:>10} {:>8}",
        "MODEL", "PROVIDER", "ENABLED", "WEIGHT", "$/1K TOK", "TIMEOUT"
    );
    for model in registry.list() {
        println!(
            "{:<15} {:<10} {:<8} {:>6.2} {:>10.5} {:>7}s",
            model.name.as_str(),
            model.provider.as_str(),
            if model.enabled { "yes" } else { "no" },
            model.weight,
            model.cost_per_1k_tokens,
            model.timeout.as_secs()
        );
    }
}

fn print_result(result: &ConsensusResult) {
    let verdict = if result.is_hallucination {
        "HALLUCINATION"
    } else {
        "GROUNDED"
    };
    println!("Verdict:    {}", verdict);
    println!("Confidence: {:.3}", result.confidence);
    println!("Agreement:  {:.3}", result.agreement_score);
    println!(
        "Votes:      {} of {} queried ({} agreed)",
        result.models_voted, result.models_queried, result.models_agreed
    );
    println!(
        "Cost:       ${:.5} (saved ${:.5})",
        result.total_cost, result.cost_savings
    );
    println!("Latency:    {}ms", result.total_latency_ms);
    println!("Rationale:  {}", result.rationale);
    println!();
    for model in &result.model_results {
        match &model.error {
            Some(error) => println!("  {:<15} error: {}", model.model.as_str(), error),
            None => println!(
                "  {:<15} {:<5} {:.2}  {}",
                model.model.as_str(),
                model.is_hallucination,
                model.confidence,
                model.rationale
            ),
        }
    }
}

async fn detect(args: DetectArgs) -> Result<()> {
    let mut registry = load_registry(args.registry.as_deref())?;
    let config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("loading engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let anthropic = AnthropicJudge::from_env().context("Anthropic judge unavailable")?;
    let router = JudgeRouter::new().route(Provider::Anthropic, Arc::new(anthropic));
    disable_unrouted(&mut registry, &router)?;

    let engine = ConsensusEngineBuilder::new()
        .judge(Arc::new(router))
        .registry(registry)
        .config(config)
        .build()?;

    let mut request = DetectionRequest::new(args.output)
        .with_strategy(args.strategy)
        .with_min_models(args.min_models)
        .with_confidence_threshold(args.threshold);
    if let Some(input) = args.input {
        request = request.with_input(input);
    }
    if let Some(context) = args.context {
        request = request.with_context(context);
    }
    if let Some(budget) = args.budget {
        request = request.with_budget(budget);
    }

    let result = engine.detect(request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Models { registry } => {
            print_models(&load_registry(registry.as_deref())?);
            Ok(())
        }
        Command::Detect(args) => detect(args).await,
    }
}
