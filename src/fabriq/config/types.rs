// SPDX-License-Identifier: MIT

//! YAML schema types for the engine configuration
//!
//! Three levels: endpoints reference systems, systems list agent instances,
//! and agent instances reference a statically registered agent type.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Control-flow shape of a system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// One agent, one step
    Single,
    /// Agents in order, last one validates with a retry loop
    Sequential,
    /// First agent routes to specialists which report back to it
    Orchestrator,
    /// Peers delegate to each other
    Decentralised,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topology::Single => "single",
            Topology::Sequential => "sequential",
            Topology::Orchestrator => "orchestrator",
            Topology::Decentralised => "decentralised",
        };
        f.write_str(name)
    }
}

/// JSON type a contract field must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A typed field in an endpoint's input contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// One callable endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub system_id: String,
    #[serde(default)]
    pub contract: Vec<ContractField>,
    /// Template with `{placeholder}` markers
    pub prompt: String,
}

/// Agent instance inside a system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAgentRef {
    #[serde(rename = "type")]
    pub agent_type: String,
    pub prompt: String,
}

/// A reusable agent system with a fixed topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub topology: Topology,
    pub agents: Vec<SystemAgentRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

/// Wall-clock schedule for an async function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub frequency: Frequency,
    /// 0-23
    pub hour: u32,
    /// Required for weekly schedules: `mon`..`sun` or `0`..`6` (0 = Monday)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<String>,
    /// Required for monthly schedules: 1-31
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
}

impl ScheduleConfig {
    /// Parsed `day_of_week`, if present and well formed
    pub fn weekday(&self) -> Option<Weekday> {
        self.day_of_week.as_deref().and_then(parse_weekday)
    }
}

/// Accepts `mon`..`sun` (any case, full names too) or `0`..`6` with 0 = Monday
pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    let raw = raw.trim().to_ascii_lowercase();
    if let Ok(n) = raw.parse::<u8>() {
        return match n {
            0 => Some(Weekday::Mon),
            1 => Some(Weekday::Tue),
            2 => Some(Weekday::Wed),
            3 => Some(Weekday::Thu),
            4 => Some(Weekday::Fri),
            5 => Some(Weekday::Sat),
            6 => Some(Weekday::Sun),
            _ => None,
        };
    }
    let prefix = raw.get(..3)?;
    match prefix {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// A system run on a schedule with a fixed prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncFunctionConfig {
    pub system_id: String,
    pub prompt: String,
    pub schedule: ScheduleConfig,
}

fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub endpoints: Vec<EndpointConfig>,
    pub systems: Vec<SystemConfig>,
    #[serde(default)]
    pub async_functions: Vec<AsyncFunctionConfig>,
    /// Never echoed back by the config endpoint
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
}
