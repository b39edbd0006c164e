//! Distributed coordination core for a fleet of workers extracting
//! YouTube metadata through a spreadsheet-shaped backend with no
//! native transactions (see `SPEC_FULL.md` for the full design).
//!
//! Embedding programs construct a [`Config`], a [`gateway::Gateway`]
//! over a concrete [`gateway::backend::SheetBackend`], and an
//! [`orchestrator::Orchestrator`], then supply an [`extractor::Extractor`]
//! and a [`callback::Callback`] to [`orchestrator::Orchestrator::run`].

pub mod callback;
pub mod config;
pub mod election;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod schema;
pub mod signal;

pub use config::Config;
pub use orchestrator::Orchestrator;
