// SPDX-License-Identifier: MIT

//! Graph compiler - wires resolved agents into an executable graph
//!
//! A compiled graph is a set of named nodes, an entry node, and one
//! outgoing edge per node: either a fixed route or a router. It holds no
//! per-run state, so one graph can drive many concurrent runs.

use super::node::{AgentNode, DelegatingNode, NodeExecutor, ValidatorNode};
use super::router::{Decision, Route, Router, Termination, MAX_RETRIES};
use super::state::ExecutionState;
use crate::adk::agent::LLMAgent;
use crate::adk::error::{CompileError, FabriqError};
use crate::adk::model::ModelProvider;
use crate::fabriq::agents::ResolvedAgent;
use crate::fabriq::config::Topology;
use crate::fabriq::tools::ToolRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// Outgoing transition of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edge {
    Static(Route),
    Conditional(Router),
}

pub struct CompiledNode {
    pub executor: Arc<dyn NodeExecutor>,
    pub edge: Edge,
}

impl CompiledNode {
    pub fn new(executor: Arc<dyn NodeExecutor>, edge: Edge) -> Self {
        Self { executor, edge }
    }
}

/// Immutable executable graph
pub struct CompiledGraph {
    name: String,
    topology: Topology,
    entry: String,
    nodes: HashMap<String, CompiledNode>,
    /// Declared node order
    order: Vec<String>,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("topology", &self.topology)
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .finish()
    }
}

impl CompiledGraph {
    /// Assemble a graph, checking names, entry point and edge targets
    pub fn new(
        name: impl Into<String>,
        topology: Topology,
        entry: impl Into<String>,
        nodes: Vec<CompiledNode>,
    ) -> Result<Self, CompileError> {
        let entry = entry.into();
        let mut order = Vec::with_capacity(nodes.len());
        let mut map = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let node_name = node.executor.name().to_string();
            if map.contains_key(&node_name) {
                return Err(CompileError::DuplicateNode(node_name));
            }
            order.push(node_name.clone());
            map.insert(node_name, node);
        }

        if !map.contains_key(&entry) {
            return Err(CompileError::MissingEntry(entry));
        }

        for (from, node) in &map {
            let targets = match &node.edge {
                Edge::Static(Route::To(target)) => vec![target.as_str()],
                Edge::Static(Route::End(_)) => vec![],
                Edge::Conditional(router) => router.targets(),
            };
            if let Some(missing) = targets.into_iter().find(|t| !map.contains_key(*t)) {
                return Err(CompileError::DanglingEdge {
                    from: from.clone(),
                    to: missing.to_string(),
                });
            }
        }

        Ok(Self {
            name: name.into(),
            topology,
            entry,
            nodes: map,
            order,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&CompiledNode> {
        self.nodes.get(name)
    }

    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Transition out of `node` given the state after it ran
    pub fn next(&self, node: &str, state: &ExecutionState) -> Result<Decision, FabriqError> {
        let Some(compiled) = self.node(node) else {
            let detail = format!("Unknown node '{}' in '{}'", node, self.name);
            return Err(FabriqError::run(detail));
        };
        Ok(match &compiled.edge {
            Edge::Static(route) => route.clone().into(),
            Edge::Conditional(router) => router.decide(state),
        })
    }
}

/// Builds graphs for the four topologies
#[derive(Clone)]
pub struct GraphCompiler {
    tools: ToolRegistry,
    models: Arc<dyn ModelProvider>,
    max_retries: u32,
}

impl GraphCompiler {
    pub fn new(tools: ToolRegistry, models: Arc<dyn ModelProvider>) -> Self {
        Self {
            tools,
            models,
            max_retries: MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Model, bound tools and prompt for one agent
    async fn llm_agent(&self, agent: &ResolvedAgent) -> Result<LLMAgent, FabriqError> {
        let model = self.models.model(&agent.model)?;
        let tools = self.tools.resolve(&agent.tools).await;
        Ok(LLMAgent::new(agent.name.clone(), agent.prompt.clone(), model, tools))
    }

    pub async fn compile(
        &self,
        topology: Topology,
        name: &str,
        agents: &[ResolvedAgent],
    ) -> Result<CompiledGraph, FabriqError> {
        if agents.is_empty() {
            return Err(CompileError::NoAgents {
                topology: topology.to_string(),
            }
            .into());
        }

        let graph = match topology {
            Topology::Single => self.build_single(name, agents).await?,
            Topology::Sequential => self.build_sequential(name, agents).await?,
            Topology::Orchestrator => self.build_orchestrator(name, agents).await?,
            Topology::Decentralised => self.build_decentralised(name, agents).await?,
        };
        Ok(graph)
    }

    /// START -> [agent] -> END
    async fn build_single(
        &self,
        name: &str,
        agents: &[ResolvedAgent],
    ) -> Result<CompiledGraph, FabriqError> {
        let agent = &agents[0];
        if agents.len() > 1 {
            log::warn!(
                "Single topology '{}' uses '{}' and ignores {} other agent(s)",
                name,
                agent.name,
                agents.len() - 1
            );
        }

        let node = CompiledNode::new(
            Arc::new(AgentNode::new(self.llm_agent(agent).await?)),
            Edge::Static(Route::End(Termination::Done)),
        );
        let graph = CompiledGraph::new(name, Topology::Single, agent.name.clone(), vec![node])?;
        log::info!("Built single graph: {}", agent.name);
        Ok(graph)
    }

    /// START -> a0 -> a1 -> ... -> validator -> (retry a0 | END)
    async fn build_sequential(
        &self,
        name: &str,
        agents: &[ResolvedAgent],
    ) -> Result<CompiledGraph, FabriqError> {
        if agents.len() < 2 {
            return self.build_single(name, agents).await;
        }

        let Some((validator, workers)) = agents.split_last() else {
            let topology = Topology::Sequential.to_string();
            return Err(CompileError::NoAgents { topology }.into());
        };
        let first = agents[0].name.clone();

        let mut nodes = Vec::with_capacity(agents.len());
        for (i, agent) in workers.iter().enumerate() {
            let next = agents[i + 1].name.clone();
            nodes.push(CompiledNode::new(
                Arc::new(AgentNode::new(self.llm_agent(agent).await?)),
                Edge::Static(Route::To(next)),
            ));
        }
        nodes.push(CompiledNode::new(
            Arc::new(ValidatorNode::new(self.llm_agent(validator).await?)),
            Edge::Conditional(Router::Validation {
                retry_target: first.clone(),
                max_retries: self.max_retries,
            }),
        ));

        let graph = CompiledGraph::new(name, Topology::Sequential, first, nodes)?;
        log::info!(
            "Built sequential graph: {} (with validator retry)",
            graph.node_names().join(" -> ")
        );
        Ok(graph)
    }

    /// START -> orchestrator -> (specialist -> orchestrator | END)
    async fn build_orchestrator(
        &self,
        name: &str,
        agents: &[ResolvedAgent],
    ) -> Result<CompiledGraph, FabriqError> {
        let hub = &agents[0];
        let specialists: Vec<String> = agents[1..].iter().map(|a| a.name.clone()).collect();

        let mut nodes = Vec::with_capacity(agents.len());
        nodes.push(CompiledNode::new(
            Arc::new(AgentNode::new(self.llm_agent(hub).await?)),
            Edge::Conditional(Router::Orchestrator {
                specialists: specialists.clone(),
            }),
        ));
        for agent in &agents[1..] {
            nodes.push(CompiledNode::new(
                Arc::new(AgentNode::new(self.llm_agent(agent).await?)),
                Edge::Static(Route::To(hub.name.clone())),
            ));
        }

        let graph = CompiledGraph::new(name, Topology::Orchestrator, hub.name.clone(), nodes)?;
        log::info!(
            "Built orchestrator graph: entry={}, specialists={:?}",
            hub.name,
            specialists
        );
        Ok(graph)
    }

    /// START -> a0 -> (any other peer | END), for every peer
    async fn build_decentralised(
        &self,
        name: &str,
        agents: &[ResolvedAgent],
    ) -> Result<CompiledGraph, FabriqError> {
        let mut nodes = Vec::with_capacity(agents.len());
        for agent in agents {
            let others: Vec<&ResolvedAgent> =
                agents.iter().filter(|a| a.name != agent.name).collect();
            let roster: Vec<(String, String)> = others
                .iter()
                .map(|a| (a.name.clone(), a.description.clone()))
                .collect();
            let peers = others.iter().map(|a| a.name.clone()).collect();

            nodes.push(CompiledNode::new(
                Arc::new(DelegatingNode::new(self.llm_agent(agent).await?, &roster)),
                Edge::Conditional(Router::Delegation { peers }),
            ));
        }

        let entry = agents[0].name.clone();
        let graph = CompiledGraph::new(name, Topology::Decentralised, entry, nodes)?;
        log::info!("Built decentralised graph: agents={:?}", graph.node_names());
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::{Content, GenerationConfig, Model};
    use crate::adk::tool::Tool;
    use crate::fabriq::graph::node::NodeKind;
    use async_trait::async_trait;
    use std::error::Error;

    struct EchoModel;

    #[async_trait]
    impl Model for EchoModel {
        async fn generate_content(
            &self,
            _history: &[Content],
            _config: Option<&GenerationConfig>,
            _tools: Option<&[Arc<dyn Tool>]>,
        ) -> Result<Content, Box<dyn Error + Send + Sync>> {
            Ok(Content::model("ok"))
        }
    }

    struct EchoProvider;

    impl ModelProvider for EchoProvider {
        fn model(&self, _model_name: &str) -> Result<Arc<dyn Model>, FabriqError> {
            Ok(Arc::new(EchoModel))
        }
    }

    fn agent(agent_type: &str, index: usize) -> ResolvedAgent {
        ResolvedAgent {
            name: format!("{}_{}", agent_type, index),
            agent_type: agent_type.to_string(),
            description: format!("{} agent", agent_type),
            model: "mock".to_string(),
            tools: vec![],
            prompt: "Do the work".to_string(),
        }
    }

    async fn compiler() -> GraphCompiler {
        GraphCompiler::new(ToolRegistry::with_builtins().await, Arc::new(EchoProvider))
    }

    #[tokio::test]
    async fn test_single() {
        let graph = compiler()
            .await
            .compile(Topology::Single, "s", &[agent("coder", 0)])
            .await
            .unwrap();
        assert_eq!(graph.entry(), "coder_0");
        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.node("coder_0").unwrap().edge,
            Edge::Static(Route::End(Termination::Done))
        );
    }

    #[tokio::test]
    async fn test_sequential_chains_into_validator() {
        let agents = [agent("researcher", 0), agent("writer", 1), agent("validator", 2)];
        let graph = compiler()
            .await
            .compile(Topology::Sequential, "seq", &agents)
            .await
            .unwrap();

        assert_eq!(graph.entry(), "researcher_0");
        assert_eq!(
            graph.node("researcher_0").unwrap().edge,
            Edge::Static(Route::To("writer_1".to_string()))
        );
        assert_eq!(
            graph.node("writer_1").unwrap().edge,
            Edge::Static(Route::To("validator_2".to_string()))
        );
        let validator = graph.node("validator_2").unwrap();
        assert_eq!(validator.executor.kind(), NodeKind::Validator);
        assert_eq!(
            validator.edge,
            Edge::Conditional(Router::Validation {
                retry_target: "researcher_0".to_string(),
                max_retries: MAX_RETRIES,
            })
        );
    }

    #[tokio::test]
    async fn test_custom_retry_limit_reaches_validation_router() {
        let agents = [agent("writer", 0), agent("validator", 1)];
        let graph = compiler()
            .await
            .with_max_retries(1)
            .compile(Topology::Sequential, "seq", &agents)
            .await
            .unwrap();

        assert_eq!(
            graph.node("validator_1").unwrap().edge,
            Edge::Conditional(Router::Validation {
                retry_target: "writer_0".to_string(),
                max_retries: 1,
            })
        );
    }

    #[tokio::test]
    async fn test_sequential_with_one_agent_degrades_to_single() {
        let graph = compiler()
            .await
            .compile(Topology::Sequential, "seq", &[agent("coder", 0)])
            .await
            .unwrap();
        assert_eq!(graph.topology(), Topology::Single);
        let node = graph.node("coder_0").unwrap();
        assert_eq!(node.executor.kind(), NodeKind::Agent);
    }

    #[tokio::test]
    async fn test_orchestrator_loops_back_to_hub() {
        let agents = [agent("analyst", 0), agent("writer", 1), agent("coder", 2)];
        let graph = compiler()
            .await
            .compile(Topology::Orchestrator, "orch", &agents)
            .await
            .unwrap();

        assert_eq!(
            graph.node("analyst_0").unwrap().edge,
            Edge::Conditional(Router::Orchestrator {
                specialists: vec!["writer_1".to_string(), "coder_2".to_string()],
            })
        );
        assert_eq!(
            graph.node("coder_2").unwrap().edge,
            Edge::Static(Route::To("analyst_0".to_string()))
        );
    }

    #[tokio::test]
    async fn test_decentralised_excludes_self() {
        let agents = [agent("coder", 0), agent("writer", 1)];
        let graph = compiler()
            .await
            .compile(Topology::Decentralised, "p2p", &agents)
            .await
            .unwrap();

        let node = graph.node("coder_0").unwrap();
        assert_eq!(node.executor.kind(), NodeKind::Delegating);
        assert_eq!(
            node.edge,
            Edge::Conditional(Router::Delegation {
                peers: vec!["writer_1".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_empty_agent_list_is_compile_error() {
        let err = compiler()
            .await
            .compile(Topology::Orchestrator, "orch", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FabriqError::GraphCompilation(CompileError::NoAgents { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let agents = [agent("coder", 0), agent("coder", 0)];
        let err = compiler()
            .await
            .compile(Topology::Decentralised, "p2p", &agents)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FabriqError::GraphCompilation(CompileError::DuplicateNode(ref n)) if n == "coder_0"
        ));
    }

    #[tokio::test]
    async fn test_dangling_edge_rejected() {
        let node = CompiledNode::new(
            Arc::new(AgentNode::new(LLMAgent::new(
                "a".to_string(),
                String::new(),
                Arc::new(EchoModel),
                vec![],
            ))),
            Edge::Static(Route::To("ghost".to_string())),
        );
        let err = CompiledGraph::new("g", Topology::Single, "a", vec![node]).unwrap_err();
        assert_eq!(
            err,
            CompileError::DanglingEdge {
                from: "a".to_string(),
                to: "ghost".to_string()
            }
        );
    }
}
