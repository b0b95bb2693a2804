//! Build module for contentbuild
//!
//! Registers assets and drives one synchronous build against an external
//! asset transformation engine.
//!
//! # Overview
//!
//! A build call consists of:
//! - **Registration**: assets are added to an [`AssetRegistry`], either by
//!   extension convention or with explicit importer/processor names
//! - **Submission**: a [`BuildRequest`] snapshot is handed to a [`BuildEngine`]
//!   together with a fresh [`ErrorCollector`]
//! - **Completion**: the caller blocks on the engine's [`BuildHandle`] and
//!   receives a [`BuildResult`]
//!
//! # Example
//!
//! ```ignore
//! use contentbuild::build::{BuildOrchestrator, PassthroughEngine};
//! use std::sync::Arc;
//!
//! let orchestrator = BuildOrchestrator::new(Arc::new(PassthroughEngine::new()));
//! let result = orchestrator.run(request)?;
//! if let Some(errors) = result.error_text() {
//!     eprintln!("{}", errors);
//! }
//! ```

pub mod asset;
pub mod collector;
pub mod command;
pub mod engine;
pub mod extensions;
pub mod orchestrator;
pub mod passthrough;
pub mod project;
pub mod result;

pub use asset::*;
pub use collector::*;
pub use command::*;
pub use engine::*;
pub use extensions::*;
pub use orchestrator::*;
pub use passthrough::*;
pub use project::*;
pub use result::*;
