// SPDX-License-Identifier: MIT

//! Tool registry and built-in tools

pub mod builtins;
pub mod calculator;
mod registry;

pub use builtins::{builtin_tools, ACCEPTED_SENTINEL, REJECTED_SENTINEL};
pub use registry::ToolRegistry;
