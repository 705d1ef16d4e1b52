// SPDX-License-Identifier: MIT

//! Agent types and agent resolution
//!
//! Agent types carry the static capabilities (model, tools); systems only
//! reference a type and add an instance prompt. Resolution merges the two
//! into a [`ResolvedAgent`] named `{type}_{index}`.

use crate::adk::error::FabriqError;
use crate::fabriq::config::SystemAgentRef;
use serde::Serialize;
use std::collections::HashMap;

/// Default model for the built-in agent types
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Statically registered agent type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTypeDefinition {
    pub name: String,
    pub description: String,
    pub model: String,
    /// Ordered tool names
    pub tools: Vec<String>,
}

impl AgentTypeDefinition {
    pub fn new(name: &str, description: &str, model: &str, tools: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            model: model.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Name-keyed agent type lookup, fixed after startup
#[derive(Debug, Clone, Default)]
pub struct AgentTypeRegistry {
    types: HashMap<String, AgentTypeDefinition>,
}

impl AgentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in agent types
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let defs = [
            AgentTypeDefinition::new(
                "researcher",
                "Expert at web research and data analysis.",
                DEFAULT_MODEL,
                &[
                    "tavily_search",
                    "ashby_fetch_jobs",
                    "ashby_resolve_slug",
                    "linkedin_company",
                    "linkedin_employees",
                    "parse_document",
                ],
            ),
            AgentTypeDefinition::new(
                "coder",
                "Senior software engineer and architect.",
                DEFAULT_MODEL,
                &["calculate", "parse_document"],
            ),
            AgentTypeDefinition::new(
                "writer",
                "Creative writer for marketing and content.",
                DEFAULT_MODEL,
                &["parse_document"],
            ),
            AgentTypeDefinition::new(
                "analyst",
                "Business analyst specialising in structured reasoning.",
                DEFAULT_MODEL,
                &["calculate", "tavily_search", "score_candidate", "parse_document"],
            ),
            AgentTypeDefinition::new(
                "validator",
                "Reviews pipeline output and accepts or rejects it.",
                DEFAULT_MODEL,
                &["accept_output", "reject_output"],
            ),
            AgentTypeDefinition::new(
                "sourcer",
                "Finds and profiles candidates on LinkedIn for a given role.",
                DEFAULT_MODEL,
                &["tavily_search", "linkedin_employees", "linkedin_profile"],
            ),
            AgentTypeDefinition::new(
                "screener",
                "Parses resumes and scores candidates against a job description.",
                DEFAULT_MODEL,
                &["parse_document", "score_candidate"],
            ),
            AgentTypeDefinition::new(
                "recruiter",
                "Recruiting coordinator: discovers roles, sources, and scores candidates.",
                DEFAULT_MODEL,
                &[
                    "ashby_resolve_slug",
                    "ashby_fetch_jobs",
                    "linkedin_company",
                    "linkedin_employees",
                    "linkedin_profile",
                    "score_candidate",
                ],
            ),
            AgentTypeDefinition::new(
                "notifier",
                "Sends notifications via email or Telegram based on the requested channel.",
                DEFAULT_MODEL,
                &["send_email", "send_telegram_message"],
            ),
            AgentTypeDefinition::new(
                "payments",
                "Handles Stripe payments, customers, invoices, and subscriptions.",
                DEFAULT_MODEL,
                &[
                    "stripe_create_payment_intent",
                    "stripe_create_customer",
                    "stripe_get_customer",
                    "stripe_list_charges",
                    "stripe_create_invoice",
                    "stripe_create_subscription",
                ],
            ),
        ];
        for def in defs {
            registry.register(def);
        }
        registry
    }

    pub fn register(&mut self, def: AgentTypeDefinition) {
        self.types.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&AgentTypeDefinition> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn lookup(&self, name: &str) -> Result<&AgentTypeDefinition, FabriqError> {
        self.get(name).ok_or_else(|| FabriqError::UnknownAgentType {
            name: name.to_string(),
            available: self.names(),
        })
    }
}

/// Agent instance with its type's capabilities merged in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAgent {
    /// `{type}_{index}`, unique within one system
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub description: String,
    pub model: String,
    pub tools: Vec<String>,
    pub prompt: String,
}

/// Merge an agent reference with its type definition
pub fn resolve(
    registry: &AgentTypeRegistry,
    agent_ref: &SystemAgentRef,
    index: usize,
) -> Result<ResolvedAgent, FabriqError> {
    let def = registry.lookup(&agent_ref.agent_type)?;
    Ok(ResolvedAgent {
        name: format!("{}_{}", agent_ref.agent_type, index),
        agent_type: agent_ref.agent_type.clone(),
        description: def.description.clone(),
        model: def.model.clone(),
        tools: def.tools.clone(),
        prompt: agent_ref.prompt.clone(),
    })
}

/// Resolve every agent of a system in declared order
pub fn resolve_all(
    registry: &AgentTypeRegistry,
    refs: &[SystemAgentRef],
) -> Result<Vec<ResolvedAgent>, FabriqError> {
    refs.iter()
        .enumerate()
        .map(|(i, r)| resolve(registry, r, i))
        .collect()
}
