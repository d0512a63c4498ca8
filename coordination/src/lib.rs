//! Debate Coordination Library
//!
//! This library provides the deterministic core of a multi-agent paper
//! review panel:
//! - Structured [`Review`] contract with strict-then-recovery parsing and a
//!   documented fallback review
//! - [`ReviewAgent`]: one model identity that reviews and later revises
//! - [`DebateOrchestrator`]: two-round protocol per paper with a hard barrier
//!   between rounds, bounded paper parallelism, and per-paper checkpoints
//! - [`ResultAggregator`]: flattened score tables and debate dynamics
//!
//! # Seams
//!
//! The core does no network I/O and never reads the corpus layout itself.
//! Callers provide:
//! - a [`CompletionTransport`] that turns a chat request into a response body
//! - a [`PaperLoader`] that turns a [`PaperManifest`] into a [`PaperRecord`]
//!
//! # Usage
//!
//! ```ignore
//! let agents = vec![
//!     ReviewAgent::new(AgentIdentity::new("openai/gpt-4o", "GPT-4o"), transport.clone()),
//!     ReviewAgent::new(AgentIdentity::new("anthropic/claude-3.5-sonnet", "Claude-3.5"), transport),
//! ];
//! let batch = DebateOrchestrator::new(agents, loader)?
//!     .run(manifests)
//!     .await?;
//! let rows = ResultAggregator::flatten(&batch);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod aggregate;
pub mod corpus;
pub mod debate;
pub mod review;
pub mod transport;

// Re-export review contract types
pub use review::{
    parse_review, review_schema, AgentIdentity, Decision, ParseOutcome, Persona, Review,
    ReviewAgent, ReviewSet, FALLBACK_REASONING, FALLBACK_SCORE,
};

// Re-export transport seam types
pub use transport::{ChatMessage, CompletionRequest, CompletionTransport, Role, TransportError};

// Re-export corpus seam types
pub use corpus::{cap_text, DataError, PaperLoader, PaperManifest, PaperRecord};

// Re-export debate types
pub use debate::{
    BatchResult, CheckpointWriter, DebateError, DebateOrchestrator, OrchestratorConfig,
    PaperResult, PersistenceError, RunReport, SkippedPaper,
};

// Re-export aggregation types
pub use aggregate::{DebateSummary, FlatRow, ResultAggregator, ScoreChange};
