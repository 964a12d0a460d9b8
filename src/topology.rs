use crate::encoding::Configuration;
use crate::error::ReconfError;
use crate::network::Network;
use petgraph::algo::connected_components;
use petgraph::graph::UnGraph;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopologyViolation {
    #[error("switched network falls apart into {components} islands")]
    Islanded { components: usize },
    #[error("switched network contains {loops} loop(s)")]
    Meshed { loops: usize },
    #[error(transparent)]
    Network(#[from] ReconfError),
}

/// Structural check applied to a switch configuration before it is evaluated.
pub trait TopologyValidator: Send + Sync {
    fn validate(&self, code: &Configuration) -> Result<(), TopologyViolation>;
}

/// Counts for the graph formed by the in-service lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopologySummary {
    pub buses: usize,
    pub lines: usize,
    pub components: usize,
}

impl TopologySummary {
    /// Independent loops (cyclomatic number) of the graph.
    pub fn loops(&self) -> usize {
        (self.lines + self.components).saturating_sub(self.buses)
    }

    /// A tree: one component and no loops.
    pub fn is_radial(&self) -> bool {
        self.components == 1 && self.loops() == 0
    }
}

/// Radiality check: every bus connected to the rest and no closed loop.
#[derive(Clone)]
pub struct RadialityValidator {
    network: Arc<Network>,
}

impl RadialityValidator {
    pub fn new(network: Arc<Network>) -> Self {
        Self { network }
    }

    pub fn summarize(&self, code: &Configuration) -> Result<TopologySummary, ReconfError> {
        let states = self.network.line_states(code)?;
        let mut graph = UnGraph::<usize, usize>::with_capacity(
            self.network.buses.len(),
            self.network.lines.len(),
        );
        let nodes: Vec<_> = (0..self.network.buses.len())
            .map(|bus| graph.add_node(bus))
            .collect();
        for (idx, line) in self.network.lines.iter().enumerate() {
            if states[idx] {
                graph.add_edge(nodes[line.from_bus], nodes[line.to_bus], idx);
            }
        }
        Ok(TopologySummary {
            buses: graph.node_count(),
            lines: graph.edge_count(),
            components: connected_components(&graph),
        })
    }
}

impl TopologyValidator for RadialityValidator {
    fn validate(&self, code: &Configuration) -> Result<(), TopologyViolation> {
        let summary = self.summarize(code)?;
        if summary.components > 1 {
            Err(TopologyViolation::Islanded {
                components: summary.components,
            })
        } else if summary.loops() > 0 {
            Err(TopologyViolation::Meshed {
                loops: summary.loops(),
            })
        } else {
            Ok(())
        }
    }
}
