// SPDX-License-Identifier: MIT

//! Agent graphs
//!
//! This module provides:
//! - `ExecutionState` - per-run state with fixed reducers
//! - node executors for plain, validating and delegating steps
//! - routers deciding the next step from model output
//! - `GraphCompiler` / `CompiledGraph` - topology wiring
//! - `GraphCache` - compiled graphs keyed by content hash
//! - `RunExecutor` - drives a graph and streams `RunEvent`s

mod cache;
mod compiler;
mod executor;
pub mod node;
pub mod router;
mod state;

pub use cache::{content_hash, CacheStats, ContentHasher, GraphCache};
pub use compiler::{CompiledGraph, CompiledNode, Edge, GraphCompiler};
pub use executor::{surfaced_content, EventKind, RunEvent, RunExecutor, MAX_ITERATIONS};
pub use node::{NodeExecutor, NodeKind};
pub use router::{Decision, Route, Router, Termination, DONE_SENTINEL, MAX_RETRIES};
pub use state::{ExecutionState, StateUpdate, ValidationResult};
