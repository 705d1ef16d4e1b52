// SPDX-License-Identifier: MIT

//! Agent development kit: model, tool and agent-loop abstractions

pub mod agent;
pub mod error;
pub mod model;
pub mod tool;
