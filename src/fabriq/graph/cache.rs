// SPDX-License-Identifier: MIT

//! Graph cache - one compiled graph per system id
//!
//! Entries are validated by a content hash over the system config and its
//! resolved agents, so a changed prompt or agent list rebuilds on the next
//! request. There is no expiry and no size bound.

use super::compiler::{CompiledGraph, GraphCompiler};
use crate::adk::error::FabriqError;
use crate::fabriq::agents::ResolvedAgent;
use crate::fabriq::config::SystemConfig;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Content hash function used for change detection
pub type ContentHasher = fn(&SystemConfig, &[ResolvedAgent]) -> Result<String, FabriqError>;

#[derive(Serialize)]
struct HashInput<'a> {
    system: &'a SystemConfig,
    agents: &'a [ResolvedAgent],
}

/// SHA-256 over the canonical JSON of the system and its agents,
/// hex encoded and cut to 16 characters
pub fn content_hash(
    system: &SystemConfig,
    agents: &[ResolvedAgent],
) -> Result<String, FabriqError> {
    let payload = serde_json::to_vec(&HashInput { system, agents })?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(16);
    Ok(digest)
}

struct CacheEntry {
    hash: String,
    graph: Arc<CompiledGraph>,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub builds: u64,
}

pub struct GraphCache {
    compiler: GraphCompiler,
    hasher: ContentHasher,
    /// Per-system slots; a slot lock serialises builds for that system only
    slots: Mutex<HashMap<String, Slot>>,
    hits: AtomicU64,
    builds: AtomicU64,
}

impl GraphCache {
    pub fn new(compiler: GraphCompiler) -> Self {
        Self::with_hasher(compiler, content_hash)
    }

    pub fn with_hasher(compiler: GraphCompiler, hasher: ContentHasher) -> Self {
        Self {
            compiler,
            hasher,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            builds: AtomicU64::new(0),
        }
    }

    async fn slot(&self, system_id: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry(system_id.to_string()).or_default().clone()
    }

    /// Cached graph for `system`, rebuilt when its content hash changed
    pub async fn get_or_build(
        &self,
        system: &SystemConfig,
        agents: &[ResolvedAgent],
    ) -> Result<Arc<CompiledGraph>, FabriqError> {
        let hash = (self.hasher)(system, agents)?;
        let slot = self.slot(&system.id).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.hash == hash {
                log::debug!("Graph cache hit: {}", system.id);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached.graph.clone());
            }
        }

        log::info!(
            "Building graph for system '{}' (topology={}, agents={})",
            system.id,
            system.topology,
            agents.len()
        );
        let compiled = self
            .compiler
            .compile(system.topology, &system.id, agents)
            .await?;
        let graph = Arc::new(compiled);
        *entry = Some(CacheEntry {
            hash,
            graph: graph.clone(),
        });
        self.builds.fetch_add(1, Ordering::Relaxed);
        Ok(graph)
    }

    /// Drop one system's entry, or every entry when `system_id` is `None`
    pub async fn invalidate(&self, system_id: Option<&str>) {
        let mut slots = self.slots.lock().await;
        match system_id {
            Some(id) => {
                slots.remove(id);
                log::info!("Graph cache invalidated: {}", id);
            }
            None => {
                slots.clear();
                log::info!("Graph cache invalidated: all systems");
            }
        }
    }

    /// Number of systems with a compiled graph
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }
}
