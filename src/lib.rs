//! Contentbuild - Library for driving an asset compilation toolchain
//!
//! This library provides functionality to:
//! - Allocate per-session build workspaces that never collide across processes
//! - Reap workspaces left behind by crashed processes
//! - Register assets and run one synchronous build against a pluggable engine
//! - Tear workspaces down deterministically when a session ends

pub mod build;
pub mod cli;
pub mod config;
pub mod session;
pub mod workspace;
