// SPDX-License-Identifier: MIT

//! Agent module - the model + tool-call loop shared by every graph node

mod llm;

pub use llm::{LLMAgent, TurnOutcome, DEFAULT_MAX_TURNS};
