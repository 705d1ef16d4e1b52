// SPDX-License-Identifier: MIT

pub mod agents;
pub mod config;
pub mod graph;
pub mod runtime;
pub mod scheduler;
pub mod server;
pub mod tools;
