// SPDX-License-Identifier: MIT

//! Typed error handling for fabriq-rs
//!
//! `FabriqError` is the one error type the engine surfaces. External
//! capabilities (`Model`, `Tool`) still return boxed errors; the core
//! converts those at the boundary where it calls them.

use thiserror::Error;

/// Top-level error type for fabriq-rs
#[derive(Debug, Error)]
pub enum FabriqError {
    /// Agent reference names a type missing from the agent type registry
    #[error("Unknown agent type '{name}'. Available types: {available:?}")]
    UnknownAgentType {
        name: String,
        available: Vec<String>,
    },

    /// The model asked for a tool that is not bound to the agent
    #[error("Tool '{name}' not found")]
    UnknownTool { name: String },

    /// The model capability failed or returned something unusable
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    /// A topology could not be wired into a graph
    #[error("Graph compilation failed: {0}")]
    GraphCompilation(#[from] CompileError),

    /// Driving a compiled graph failed outside of any single node
    #[error("Run execution failed: {0}")]
    RunExecution(String),

    /// Configuration errors (invalid YAML content, dangling references)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request data does not satisfy an endpoint contract
    #[error("{0}")]
    Contract(String),

    /// Max iterations/turns reached
    #[error("Max {kind} reached: {limit}")]
    MaxIterations { kind: String, limit: u32 },

    /// Provider-level model errors
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Graph compilation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Every topology needs at least one agent
    #[error("{topology} topology needs at least one agent")]
    NoAgents { topology: String },

    /// Two nodes resolved to the same name
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    /// The entry point is not one of the graph's nodes
    #[error("Entry node '{0}' is not part of the graph")]
    MissingEntry(String),

    /// An edge points at a node that does not exist
    #[error("Edge from '{from}' targets unknown node '{to}'")]
    DanglingEdge { from: String, to: String },
}

/// Model/LLM provider errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider answered with a non-success status
    #[error("{provider} API error ({status}): {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

impl FabriqError {
    /// Create an unknown tool error
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a run execution error
    pub fn run(message: impl Into<String>) -> Self {
        Self::RunExecution(message.into())
    }

    /// Wrap a boxed error coming back from a model capability
    pub fn model_invocation(err: impl std::fmt::Display) -> Self {
        Self::ModelInvocation(err.to_string())
    }
}
