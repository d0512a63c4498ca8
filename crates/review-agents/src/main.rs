use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use coordination::debate::{load_batch, write_atomic, write_json};
use coordination::review::prompts::PROMPT_VERSION;
use coordination::{
    review_schema, CompletionTransport, DebateOrchestrator, Persona, ResultAggregator, ReviewAgent,
};
use review_agents::{load_manifest, FsPaperLoader, OpenRouterTransport, PanelConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "review-debate",
    version,
    about = "Two-round multi-agent peer review over an ICLR paper corpus"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Review papers, debate, and write results.
    Run(RunArgs),
    /// Print the JSON schema of a review.
    Schema,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Number of papers to process.
    #[arg(long, conflicts_with = "all")]
    limit: Option<usize>,
    /// Process every matched paper.
    #[arg(long)]
    all: bool,
    /// Papers in flight at once.
    #[arg(long)]
    parallel_papers: Option<usize>,
    /// Call agents one after another within a round.
    #[arg(long)]
    sequential_agents: bool,
    /// Persona for agents without a literal system prompt.
    #[arg(long)]
    persona: Option<Persona>,
    #[arg(long)]
    temperature: Option<f32>,
    /// Skip papers already in the partial-results checkpoint.
    #[arg(long)]
    resume: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut PanelConfig) {
        let run = &mut config.run;
        if let Some(dir) = &self.data_dir {
            run.data_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            run.output_dir = dir.clone();
        }
        if self.all {
            run.limit = None;
        } else if let Some(limit) = self.limit {
            run.limit = Some(limit);
        }
        if let Some(n) = self.parallel_papers {
            run.max_parallel_papers = n;
        }
        if self.sequential_agents {
            run.parallel_agents = false;
        }
        if let Some(t) = self.temperature {
            run.temperature = t;
        }
        if self.resume {
            run.resume = true;
        }
        if let Some(persona) = self.persona {
            for agent in &mut config.agents {
                agent.persona = persona;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&review_schema())?);
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = PanelConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("Invalid panel configuration")?;

    let transport: Arc<dyn CompletionTransport> = Arc::new(
        OpenRouterTransport::new(&config.provider)
            .context("Failed to build completion transport")?,
    );
    let agents: Vec<ReviewAgent> = config
        .identities()
        .into_iter()
        .map(|identity| {
            ReviewAgent::new(identity, transport.clone())
                .with_temperature(config.run.temperature)
                .with_call_timeout(config.run.call_timeout())
        })
        .collect();

    info!(
        base_url = %config.provider.base_url,
        agents = ?config.agents.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        data_dir = %config.run.data_dir.display(),
        prompt_version = PROMPT_VERSION,
        "Review debate starting"
    );

    let manifest = load_manifest(&config.run.data_dir, config.run.limit)
        .await
        .context("Failed to load corpus manifest")?;
    if manifest.is_empty() {
        warn!("No papers with extracted text found, nothing to do");
        return Ok(());
    }

    let checkpoint = config.run.checkpoint_path();
    let prior = if config.run.resume && tokio::fs::try_exists(&checkpoint).await.unwrap_or(false) {
        let prior = load_batch(&checkpoint)
            .await
            .with_context(|| format!("Failed to read checkpoint {}", checkpoint.display()))?;
        info!(papers = prior.len(), "Loaded checkpoint");
        prior
    } else {
        Vec::new()
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight papers");
            on_signal.cancel();
        }
    });

    let orchestrator = DebateOrchestrator::new(
        agents,
        Arc::new(FsPaperLoader::new(config.run.max_tokens)),
    )?
    .with_config(config.run.orchestrator_config())
    .with_cancellation(cancel)
    .resume_from(prior);

    let report = orchestrator.run_report(manifest).await?;

    let results_path = config.run.results_path();
    write_json(&results_path, &report.batch)
        .await
        .with_context(|| format!("Failed to write {}", results_path.display()))?;

    let table_path = config.run.table_path();
    let csv = ResultAggregator::render_csv(&ResultAggregator::flatten(&report.batch));
    write_atomic(&table_path, csv.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", table_path.display()))?;

    let summary = ResultAggregator::summarize(&report.batch);
    for change in &summary.changes {
        info!(
            paper_id = %change.paper_id,
            agent = %change.agent,
            from = change.score_0,
            to = change.score_1,
            "score changed after debate"
        );
    }
    info!(
        papers = summary.papers,
        skipped = report.skipped.len(),
        resumed = report.resumed,
        cancelled = report.cancelled,
        mean_score_0 = summary.mean_score_0,
        mean_score_1 = summary.mean_score_1,
        mean_variance_0 = summary.mean_variance_0,
        mean_variance_1 = summary.mean_variance_1,
        fallbacks_0 = summary.fallbacks_0,
        fallbacks_1 = summary.fallbacks_1,
        elapsed_s = (report.finished_at - report.started_at).num_seconds(),
        results = %results_path.display(),
        table = %table_path.display(),
        "Review debate complete"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(args: &[&str]) -> RunArgs {
        let mut argv = vec!["review-debate", "run"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Run(args) => args,
            Command::Schema => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = parse_run(&[
            "--limit",
            "4",
            "--parallel-papers",
            "2",
            "--sequential-agents",
            "--persona",
            "harsh",
            "--resume",
        ]);
        let mut config = PanelConfig::default();
        args.apply(&mut config);

        assert_eq!(config.run.limit, Some(4));
        assert_eq!(config.run.max_parallel_papers, 2);
        assert!(!config.run.parallel_agents);
        assert!(config.run.resume);
        assert!(config.agents.iter().all(|a| a.persona == Persona::Harsh));
    }

    #[test]
    fn test_cli_all_clears_limit() {
        let mut config = PanelConfig::default();
        parse_run(&["--all"]).apply(&mut config);
        assert_eq!(config.run.limit, None);
    }

    #[test]
    fn test_cli_rejects_limit_with_all() {
        assert!(Cli::try_parse_from(["review-debate", "run", "--all", "--limit", "3"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_persona() {
        assert!(Cli::try_parse_from(["review-debate", "run", "--persona", "gentle"]).is_err());
    }

    #[test]
    fn test_schema_subcommand() {
        let cli = Cli::try_parse_from(["review-debate", "schema"]).unwrap();
        assert!(matches!(cli.command, Command::Schema));
    }
}
