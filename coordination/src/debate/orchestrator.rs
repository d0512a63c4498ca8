//! Debate orchestrator: drives papers through the two-round protocol.
//!
//! Per paper: load text, run Round 0 across all agents, wait for every
//! Round 0 review, then run Round 1 with each agent seeing only its peers.
//! Papers start in input order as `JoinSet` tasks, at most
//! `max_parallel_papers` at a time. The orchestrator task is the only writer
//! of the checkpoint file.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::persistence::{CheckpointWriter, PersistenceError};
use super::record::{BatchResult, PaperResult};
use crate::corpus::{DataError, PaperLoader, PaperManifest, PaperRecord};
use crate::review::{Review, ReviewAgent};

/// Configuration for the debate orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Papers in flight at once. Values below 1 are treated as 1.
    pub max_parallel_papers: usize,
    /// Issue each round's agent calls concurrently instead of one after another.
    pub parallel_agents: bool,
    /// Running checkpoint, rewritten after every completed paper.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_papers: 1,
            parallel_agents: true,
            checkpoint_path: None,
        }
    }
}

/// Error from the debate orchestrator.
#[derive(Debug, Error)]
pub enum DebateError {
    #[error("no review agents configured")]
    NoAgents,

    #[error("duplicate agent name: {0}")]
    DuplicateAgent(String),

    #[error("checkpoint write failed: {0}")]
    Checkpoint(#[from] PersistenceError),
}

/// A paper that produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPaper {
    pub paper_id: String,
    pub reason: String,
}

/// Everything a run produced, beyond the batch itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub batch: BatchResult,
    pub skipped: Vec<SkippedPaper>,
    /// Papers carried over from a prior checkpoint without re-running.
    pub resumed: usize,
    /// Papers never started because the run was cancelled.
    pub not_started: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

enum PaperOutcome {
    /// The permit travels with the result so the slot frees only once the
    /// checkpoint includes this paper.
    Done {
        index: usize,
        result: PaperResult,
        permit: OwnedSemaphorePermit,
    },
    Skipped(SkippedPaper),
}

/// Runs a batch of papers through the review panel.
pub struct DebateOrchestrator {
    agents: Arc<[ReviewAgent]>,
    loader: Arc<dyn PaperLoader>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
    prior: BatchResult,
}

impl DebateOrchestrator {
    /// Agent order here is the key order of every review map produced.
    pub fn new(
        agents: Vec<ReviewAgent>,
        loader: Arc<dyn PaperLoader>,
    ) -> Result<Self, DebateError> {
        if agents.is_empty() {
            return Err(DebateError::NoAgents);
        }
        let mut seen = HashSet::new();
        for agent in &agents {
            if !seen.insert(agent.name()) {
                return Err(DebateError::DuplicateAgent(agent.name().to_string()));
            }
        }

        Ok(Self {
            agents: agents.into(),
            loader,
            config: OrchestratorConfig::default(),
            cancel: CancellationToken::new(),
            prior: Vec::new(),
        })
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Stop scheduling new papers once `token` fires. In-flight papers finish.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Reuse complete results from an earlier run instead of re-reviewing them.
    pub fn resume_from(mut self, prior: BatchResult) -> Self {
        self.prior = prior;
        self
    }

    pub fn agents(&self) -> &[ReviewAgent] {
        &self.agents
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    /// Process `papers` and return completed results in input order.
    pub async fn run(&self, papers: Vec<PaperManifest>) -> Result<BatchResult, DebateError> {
        Ok(self.run_report(papers).await?.batch)
    }

    /// Like [`run`](Self::run), with skip and cancellation bookkeeping.
    pub async fn run_report(&self, papers: Vec<PaperManifest>) -> Result<RunReport, DebateError> {
        let started_at = Utc::now();
        let total = papers.len();
        let names = self.agent_names();

        let mut completed: BTreeMap<usize, PaperResult> = BTreeMap::new();
        let mut pending = Vec::new();
        for (index, manifest) in papers.into_iter().enumerate() {
            let prior = self
                .prior
                .iter()
                .find(|p| p.paper_id == manifest.paper_id && p.is_complete_for(&names));
            match prior {
                Some(result) => {
                    debug!(paper_id = %manifest.paper_id, "reusing checkpointed result");
                    completed.insert(index, result.clone());
                }
                None => pending.push((index, manifest)),
            }
        }
        let resumed = completed.len();
        if resumed > 0 {
            info!(resumed, remaining = pending.len(), "resuming from checkpoint");
        }

        let mut progress = Progress {
            completed,
            skipped: Vec::new(),
            checkpoint: self.config.checkpoint_path.clone().map(CheckpointWriter::new),
            prior: &self.prior,
            total,
        };
        let sem = Arc::new(Semaphore::new(self.config.max_parallel_papers.max(1)));
        let mut join_set: JoinSet<PaperOutcome> = JoinSet::new();
        let mut not_started = 0usize;

        // Permits are taken here, in input order, so papers start in the
        // order given. Finished papers are drained while waiting for a slot.
        let queued = pending.len();
        for (scheduled, (index, manifest)) in pending.into_iter().enumerate() {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break None,
                    Some(joined) = join_set.join_next() => progress.settle(joined).await?,
                    permit = sem.clone().acquire_owned() => break permit.ok(),
                }
            };
            let Some(permit) = permit.filter(|_| !self.cancel.is_cancelled()) else {
                not_started = queued - scheduled;
                break;
            };

            let agents = self.agents.clone();
            let loader = self.loader.clone();
            let parallel = self.config.parallel_agents;
            join_set.spawn(async move {
                info!(paper_id = %manifest.paper_id, "processing paper");
                match load_and_debate(&agents, loader.as_ref(), &manifest, parallel).await {
                    Ok(result) => PaperOutcome::Done {
                        index,
                        result,
                        permit,
                    },
                    Err(e) => {
                        warn!(paper_id = %manifest.paper_id, error = %e, "skipping paper");
                        PaperOutcome::Skipped(SkippedPaper {
                            paper_id: manifest.paper_id,
                            reason: e.to_string(),
                        })
                    }
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            progress.settle(joined).await?;
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!(
                completed = progress.completed.len(),
                not_started, "run cancelled before all papers were scheduled"
            );
        }

        Ok(RunReport {
            batch: progress.completed.into_values().collect(),
            skipped: progress.skipped,
            resumed,
            not_started,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Bookkeeping owned by the orchestrator task while a run is in progress.
struct Progress<'a> {
    completed: BTreeMap<usize, PaperResult>,
    skipped: Vec<SkippedPaper>,
    checkpoint: Option<CheckpointWriter>,
    /// Checkpointed results from an earlier run, kept in every snapshot
    /// until this run replaces them.
    prior: &'a [PaperResult],
    total: usize,
}

impl Progress<'_> {
    async fn settle(&mut self, joined: Result<PaperOutcome, JoinError>) -> Result<(), DebateError> {
        match joined {
            Ok(PaperOutcome::Done {
                index,
                result,
                permit,
            }) => {
                info!(
                    paper_id = %result.paper_id,
                    done = self.completed.len() + 1,
                    total = self.total,
                    "paper complete"
                );
                self.completed.insert(index, result);
                self.write_checkpoint().await?;
                drop(permit);
            }
            Ok(PaperOutcome::Skipped(skip)) => self.skipped.push(skip),
            Err(e) => {
                warn!(error = %e, "paper task panicked");
            }
        }
        Ok(())
    }

    /// Results from this run in input order, then prior results for papers
    /// this run has not produced (including papers outside this manifest).
    async fn write_checkpoint(&mut self) -> Result<(), DebateError> {
        let Some(writer) = self.checkpoint.as_mut() else {
            return Ok(());
        };
        let done: HashSet<&str> = self
            .completed
            .values()
            .map(|p| p.paper_id.as_str())
            .collect();
        let snapshot: Vec<&PaperResult> = self
            .completed
            .values()
            .chain(
                self.prior
                    .iter()
                    .filter(|p| !done.contains(p.paper_id.as_str())),
            )
            .collect();
        writer.write(&snapshot).await?;
        info!(
            papers = snapshot.len(),
            path = %writer.path().display(),
            "checkpoint written"
        );
        Ok(())
    }
}

impl std::fmt::Debug for DebateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebateOrchestrator")
            .field("agents", &self.agent_names())
            .field("config", &self.config)
            .field("prior", &self.prior.len())
            .finish()
    }
}

async fn load_and_debate(
    agents: &[ReviewAgent],
    loader: &dyn PaperLoader,
    manifest: &PaperManifest,
    parallel_agents: bool,
) -> Result<PaperResult, DataError> {
    let record = loader.load(manifest).await?;
    Ok(debate_paper(agents, &record, parallel_agents).await)
}

/// Run both rounds for one already-loaded paper.
///
/// Round 1 does not start until every Round 0 call has returned.
pub async fn debate_paper(
    agents: &[ReviewAgent],
    record: &PaperRecord,
    parallel_agents: bool,
) -> PaperResult {
    let text = record.text.as_str();
    let mut result = PaperResult::new(record);

    // ── Round 0: independent reviews ──
    let round_0: Vec<Review> = if parallel_agents {
        join_all(agents.iter().map(|agent| agent.review(text))).await
    } else {
        let mut reviews = Vec::with_capacity(agents.len());
        for agent in agents {
            reviews.push(agent.review(text).await);
        }
        reviews
    };
    for (agent, review) in agents.iter().zip(&round_0) {
        result.reviews_round_0.insert(agent.name(), review.clone());
    }
    debug!(paper_id = %record.paper_id, scores = ?result.reviews_round_0.scores(), "round 0 complete");

    // ── Round 1: each agent sees its peers ──
    let peers: Vec<Vec<Review>> = (0..agents.len())
        .map(|i| peers_excluding(&round_0, i))
        .collect();
    let round_1: Vec<Review> = if parallel_agents {
        join_all(
            agents
                .iter()
                .enumerate()
                .map(|(i, agent)| agent.update_review(text, &round_0[i], &peers[i])),
        )
        .await
    } else {
        let mut reviews = Vec::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            reviews.push(agent.update_review(text, &round_0[i], &peers[i]).await);
        }
        reviews
    };
    for (agent, review) in agents.iter().zip(round_1) {
        result.reviews_round_1.insert(agent.name(), review);
    }
    debug!(paper_id = %record.paper_id, scores = ?result.reviews_round_1.scores(), "round 1 complete");

    result
}

/// Every review except the one at `index`, in order.
pub fn peers_excluding(reviews: &[Review], index: usize) -> Vec<Review> {
    reviews
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != index)
        .map(|(_, r)| r.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{AgentIdentity, Decision};
    use crate::transport::{CompletionRequest, CompletionTransport, TransportError};
    use async_trait::async_trait;

    struct FixedScore(u8);

    #[async_trait]
    impl CompletionTransport for FixedScore {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, TransportError> {
            Ok(format!(r#"{{"score": {}, "decision": "Accept"}}"#, self.0))
        }
    }

    struct NoLoader;

    #[async_trait]
    impl PaperLoader for NoLoader {
        async fn load(&self, manifest: &PaperManifest) -> Result<PaperRecord, DataError> {
            Err(DataError::Missing(manifest.text_path.clone()))
        }
    }

    fn agent(name: &str, score: u8) -> ReviewAgent {
        ReviewAgent::new(AgentIdentity::new("m", name), Arc::new(FixedScore(score)))
    }

    fn review(score: u8) -> Review {
        Review {
            score,
            ..Review::fallback()
        }
    }

    #[test]
    fn test_peers_excluding() {
        let reviews = vec![review(1), review(2), review(3)];
        let peers: Vec<u8> = peers_excluding(&reviews, 1).iter().map(|r| r.score).collect();
        assert_eq!(peers, vec![1, 3]);
        assert!(peers_excluding(&reviews[..1], 0).is_empty());
    }

    #[test]
    fn test_rejects_empty_panel() {
        let err = DebateOrchestrator::new(vec![], Arc::new(NoLoader)).unwrap_err();
        assert!(matches!(err, DebateError::NoAgents));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = DebateOrchestrator::new(vec![agent("A", 5), agent("A", 6)], Arc::new(NoLoader))
            .unwrap_err();
        assert!(matches!(err, DebateError::DuplicateAgent(name) if name == "A"));
    }

    #[tokio::test]
    async fn test_debate_paper_sequential_matches_parallel_keys() {
        let agents = vec![agent("B", 4), agent("A", 8)];
        let record = PaperRecord {
            paper_id: "p".into(),
            text: "text".into(),
            ground_truth_decision: "Accept".into(),
            ground_truth_score: None,
        };

        for parallel in [true, false] {
            let result = debate_paper(&agents, &record, parallel).await;
            let names: Vec<&str> = result.reviews_round_1.names().collect();
            assert_eq!(names, vec!["B", "A"]);
            assert_eq!(result.reviews_round_0.scores(), vec![4, 8]);
            assert_eq!(
                result.reviews_round_1.get("A").map(|r| r.decision),
                Some(Decision::Accept)
            );
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let orchestrator = DebateOrchestrator::new(vec![agent("A", 5)], Arc::new(NoLoader))
            .unwrap()
            .with_cancellation(token);

        let manifest = PaperManifest {
            paper_id: "p".into(),
            text_path: "p.txt".into(),
            ground_truth_decision: "Reject".into(),
            ground_truth_score: None,
        };
        let report = orchestrator.run_report(vec![manifest]).await.unwrap();
        assert!(report.cancelled);
        assert!(report.batch.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(report.not_started, 1);
    }
}
