//! Review panel runner.
//!
//! Outer shell around the `coordination` debate core:
//! - [`config`]: layered panel configuration (defaults, TOML, environment)
//! - [`openrouter`]: OpenAI-compatible chat-completions transport
//! - [`corpus`]: ratings manifest and on-disk paper text loader

pub mod config;
pub mod corpus;
pub mod openrouter;

pub use config::{AgentConfig, PanelConfig, ProviderConfig, RunConfig};
pub use corpus::{load_manifest, FsPaperLoader};
pub use openrouter::OpenRouterTransport;
