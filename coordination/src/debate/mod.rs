//! Debate Orchestration: Two-Round Review Panel
//!
//! Every paper goes through the same fixed protocol. There is no consensus
//! check and no early exit; disagreement is measured afterwards by
//! [`crate::aggregate`].
//!
//! # Protocol Flow
//!
//! ```text
//! load text ──► Round 0: agent_i.review(text)          (all agents)
//!                    │
//!                    ▼  barrier: every Round 0 review returned
//!               Round 1: agent_i.update_review(text,
//!                            own = r0[i],
//!                            peers = r0 \ {r0[i]})    (all agents)
//!                    │
//!                    ▼
//!               PaperResult ──► checkpoint (single writer)
//! ```
//!
//! A paper whose text cannot be loaded is skipped; the batch continues.

pub mod orchestrator;
pub mod persistence;
pub mod record;

pub use orchestrator::{
    debate_paper, peers_excluding, DebateError, DebateOrchestrator, OrchestratorConfig, RunReport,
    SkippedPaper,
};
pub use persistence::{load_batch, write_atomic, write_json, CheckpointWriter, PersistenceError};
pub use record::{BatchResult, PaperResult};

/// Running checkpoint, rewritten after every paper.
pub const PARTIAL_RESULTS_FILE: &str = "experiment_results_partial.json";

/// Final batch output.
pub const FINAL_RESULTS_FILE: &str = "experiment_results.json";

/// Flattened per-paper score table.
pub const RESULTS_TABLE_FILE: &str = "experiment_results.csv";
