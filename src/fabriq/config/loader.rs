// SPDX-License-Identifier: MIT

//! Config loader - YAML parsing, reference validation and reload

use super::types::{EndpointConfig, EngineConfig, Frequency, SystemConfig};
use crate::adk::error::FabriqError;
use crate::fabriq::agents::AgentTypeRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

impl EngineConfig {
    /// Parse an engine config from a YAML string (no reference checks)
    pub fn parse_yaml(content: &str) -> Result<Self, FabriqError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Read, parse and validate a config file
    pub fn load<P: AsRef<Path>>(
        path: P,
        agent_types: &AgentTypeRegistry,
    ) -> Result<Self, FabriqError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FabriqError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = Self::parse_yaml(&fs::read_to_string(path)?)?;
        config.validate(agent_types)?;
        log::info!(
            "Loaded config: systems={}, endpoints={}",
            config.systems.len(),
            config.endpoints.len()
        );
        Ok(config)
    }

    fn system_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.systems.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Check cross references and schedule fields
    pub fn validate(&self, agent_types: &AgentTypeRegistry) -> Result<(), FabriqError> {
        let ids = self.system_ids();

        for system in &self.systems {
            if system.agents.is_empty() {
                return Err(FabriqError::config(format!(
                    "System '{}' must have at least one agent",
                    system.id
                )));
            }
            for agent in &system.agents {
                if !agent_types.contains(&agent.agent_type) {
                    return Err(FabriqError::config(format!(
                        "System '{}' references unknown agent type '{}'. Available: {:?}",
                        system.id,
                        agent.agent_type,
                        agent_types.names()
                    )));
                }
            }
        }

        for ep in &self.endpoints {
            if !ids.contains(&ep.system_id.as_str()) {
                return Err(FabriqError::config(format!(
                    "Endpoint '{}' references unknown system_id '{}'. Available: {:?}",
                    ep.slug, ep.system_id, ids
                )));
            }
        }

        for func in &self.async_functions {
            if !ids.contains(&func.system_id.as_str()) {
                return Err(FabriqError::config(format!(
                    "async_function references unknown system_id '{}'. Available: {:?}",
                    func.system_id, ids
                )));
            }
            let schedule = &func.schedule;
            if schedule.hour > 23 {
                return Err(FabriqError::config(format!(
                    "Schedule hour must be 0-23, got {}",
                    schedule.hour
                )));
            }
            match schedule.frequency {
                Frequency::Weekly if schedule.day_of_week.is_none() => {
                    return Err(FabriqError::config("day_of_week is required for weekly schedules"));
                }
                Frequency::Weekly if schedule.weekday().is_none() => {
                    return Err(FabriqError::config(format!(
                        "Invalid day_of_week '{}'",
                        schedule.day_of_week.as_deref().unwrap_or_default()
                    )));
                }
                Frequency::Monthly => match schedule.day_of_month {
                    None => {
                        return Err(FabriqError::config(
                            "day_of_month is required for monthly schedules",
                        ))
                    }
                    Some(day) if !(1..=31).contains(&day) => {
                        return Err(FabriqError::config(format!(
                            "day_of_month must be 1-31, got {}",
                            day
                        )))
                    }
                    Some(_) => {}
                },
                _ => {}
            }
        }

        Ok(())
    }

    /// System by id
    pub fn get_system(&self, system_id: &str) -> Result<&SystemConfig, FabriqError> {
        self.systems
            .iter()
            .find(|s| s.id == system_id)
            .ok_or_else(|| {
                FabriqError::config(format!(
                    "System '{}' not found. Available: {:?}",
                    system_id,
                    self.system_ids()
                ))
            })
    }

    pub fn get_endpoint(&self, slug: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|ep| ep.slug == slug)
    }
}

/// Current config plus the path it was read from
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    agent_types: Arc<AgentTypeRegistry>,
    current: Arc<RwLock<Arc<EngineConfig>>>,
}

impl ConfigStore {
    pub fn open<P: Into<PathBuf>>(
        path: P,
        agent_types: Arc<AgentTypeRegistry>,
    ) -> Result<Self, FabriqError> {
        let path = path.into();
        let config = EngineConfig::load(&path, &agent_types)?;
        Ok(Self::with_config(path, agent_types, config))
    }

    /// Store seeded with an already validated config
    pub fn with_config<P: Into<PathBuf>>(
        path: P,
        agent_types: Arc<AgentTypeRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            path: path.into(),
            agent_types,
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current config
    pub async fn get(&self) -> Arc<EngineConfig> {
        self.current.read().await.clone()
    }

    /// Re-read the file; the old config stays active if it is invalid
    pub async fn reload(&self) -> Result<Arc<EngineConfig>, FabriqError> {
        log::info!("Reloading config from {}", self.path.display());
        let config = Arc::new(EngineConfig::load(&self.path, &self.agent_types)?);
        *self.current.write().await = config.clone();
        Ok(config)
    }
}
