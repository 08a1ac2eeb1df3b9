//! Live node graph: node arena, connections, keyframed inputs and invalidation propagation.
//!
//! Every mutation walks the dependents of the touched node with an explicit worklist and turns
//! each viewer it reaches into a queued [`GraphEvent`]. The render backend drains those events
//! on the coordinating thread (see [`crate::RenderBackend::sync`]).

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::{Time, TimeRange};

/// Nodes, their inputs and keyframed parameters.
pub mod node;
/// The operation interface every node kind implements.
pub mod op;
pub mod project;
/// Typed values flowing between nodes.
pub mod value;

pub use node::{Node, NodeInput, Param, duplicate_connections_between_lists};
pub use op::{AudioContext, ChangeKind, EvalContext, InputSpec, InputValues, NodeOp};
pub use value::{ImageBuffer, SampleBuffer, Value, ValueKind};

/// Stable handle of a node in a [`NodeGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Arena slot.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a viewer learns about a change upstream of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphEventKind {
    /// Output may differ inside the range.
    ChangedBetween(TimeRange),
    /// Connections upstream of the viewer changed.
    TopologyChanged,
    /// The viewer's length input changed.
    LengthChanged {
        /// Previous length.
        old: Time,
        /// New length.
        new: Time,
    },
    /// The viewer's resolution or time base changed.
    VideoParamsChanged,
}

/// Event addressed to one viewer node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphEvent {
    /// Receiving viewer.
    pub viewer: NodeId,
    /// Event payload.
    pub kind: GraphEventKind,
}

/// Editable node graph owned by the coordinating thread.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Option<Node>>,
    dependents: Vec<BTreeSet<NodeId>>,
    events: Vec<GraphEvent>,
}

impl NodeGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node built from `op` with default inputs.
    pub fn add_node(&mut self, name: impl Into<String>, op: Arc<dyn NodeOp>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node::new(name, op)));
        self.dependents.push(BTreeSet::new());
        id
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// First node whose name matches.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.iter().find(|(_, n)| n.name() == name).map(|(id, _)| id)
    }

    /// Live nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i as u32), n)))
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Return `true` when the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn require(&self, id: NodeId) -> KinemaResult<&Node> {
        self.node(id)
            .ok_or_else(|| KinemaError::graph(format!("unknown node {id}")))
    }

    fn require_mut(&mut self, id: NodeId) -> KinemaResult<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| KinemaError::graph(format!("unknown node {id}")))
    }

    /// Nodes that consume `id` through at least one input.
    pub fn dependents(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.dependents
            .get(id.index())
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Every node `id` transitively depends on, breadth-first, without duplicates.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut work = VecDeque::from([id]);
        while let Some(cur) = work.pop_front() {
            let Some(node) = self.node(cur) else {
                continue;
            };
            for up in node.edges() {
                if seen.insert(up) {
                    out.push(up);
                    work.push_back(up);
                }
            }
        }
        out
    }

    /// Connect the output of `from` to input `input` of `to`, replacing any existing edge.
    pub fn connect(&mut self, from: NodeId, to: NodeId, input: &str) -> KinemaResult<()> {
        self.require(from)?;
        let target = self.require(to)?;
        if target.input(input).is_none() {
            return Err(KinemaError::graph(format!(
                "node '{}' has no input '{input}'",
                target.name()
            )));
        }
        if from == to || self.dependencies(from).contains(&to) {
            return Err(KinemaError::graph(format!(
                "connecting {from} -> {to} would create a cycle"
            )));
        }

        let previous = self.set_edge(to, input, Some(from))?;
        if let Some(prev) = previous {
            self.forget_dependent(prev, to);
        }
        self.dependents[from.index()].insert(to);
        self.propagate_topology(to);
        Ok(())
    }

    /// Remove the connection feeding input `input` of `to`, if any.
    pub fn disconnect(&mut self, to: NodeId, input: &str) -> KinemaResult<()> {
        if let Some(prev) = self.set_edge(to, input, None)? {
            self.forget_dependent(prev, to);
            self.propagate_topology(to);
        }
        Ok(())
    }

    /// Detach and remove a node.
    pub fn remove_node(&mut self, id: NodeId) -> KinemaResult<()> {
        let inputs: Vec<&'static str> = self
            .require(id)?
            .inputs()
            .iter()
            .filter(|i| i.edge.is_some())
            .map(|i| i.id)
            .collect();
        for input in inputs {
            self.disconnect(id, input)?;
        }
        let downstream: Vec<NodeId> = self.dependents(id).collect();
        for down in downstream {
            let fed: Vec<&'static str> = self
                .require(down)?
                .inputs()
                .iter()
                .filter(|i| i.edge == Some(id))
                .map(|i| i.id)
                .collect();
            for input in fed {
                self.disconnect(down, input)?;
            }
        }
        self.nodes[id.index()] = None;
        Ok(())
    }

    /// Replace input `input` of `id` with a constant.
    pub fn set_value(&mut self, id: NodeId, input: &str, value: Value) -> KinemaResult<()> {
        let length_before = self.viewer_length(id);
        let node = self.require_mut(id)?;
        let slot = node
            .input_mut(input)
            .ok_or_else(|| KinemaError::graph(format!("unknown input '{input}'")))?;
        slot.param = Param::Constant(value);
        self.report_change(id, input, TimeRange::new(Time::ZERO, Time::MAX), length_before);
        Ok(())
    }

    /// Insert or replace the key at `t`; a constant input becomes a one-key track.
    pub fn set_keyframe(
        &mut self,
        id: NodeId,
        input: &str,
        t: Time,
        value: Value,
    ) -> KinemaResult<()> {
        let length_before = self.viewer_length(id);
        let node = self.require_mut(id)?;
        let slot = node
            .input_mut(input)
            .ok_or_else(|| KinemaError::graph(format!("unknown input '{input}'")))?;
        let range = match &mut slot.param {
            Param::Keyframes(keys) => {
                keys.insert(t, value);
                Param::key_span(keys, t)
            }
            p @ Param::Constant(_) => {
                *p = Param::Keyframes([(t, value)].into());
                // Every time now resolves to the single key.
                TimeRange::new(Time::ZERO.min(t), Time::MAX)
            }
        };
        self.report_change(id, input, range, length_before);
        Ok(())
    }

    /// Remove the key at `t`. Removing the last key turns the input back into a constant.
    pub fn remove_keyframe(&mut self, id: NodeId, input: &str, t: Time) -> KinemaResult<()> {
        let length_before = self.viewer_length(id);
        let node = self.require_mut(id)?;
        let slot = node
            .input_mut(input)
            .ok_or_else(|| KinemaError::graph(format!("unknown input '{input}'")))?;
        let Param::Keyframes(keys) = &mut slot.param else {
            return Err(KinemaError::graph(format!("input '{input}' is not animated")));
        };
        let range = Param::key_span(keys, t);
        let Some(removed) = keys.remove(&t) else {
            return Err(KinemaError::graph(format!("no keyframe at {t} on '{input}'")));
        };
        if keys.is_empty() {
            slot.param = Param::Constant(removed);
        }
        self.report_change(id, input, range, length_before);
        Ok(())
    }

    /// Drain every queued event.
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain the events addressed to `viewer`, leaving the rest queued.
    pub fn take_events_for(&mut self, viewer: NodeId) -> Vec<GraphEvent> {
        let (mine, rest) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| e.viewer == viewer);
        self.events = rest;
        mine
    }

    fn set_edge(
        &mut self,
        to: NodeId,
        input: &str,
        edge: Option<NodeId>,
    ) -> KinemaResult<Option<NodeId>> {
        let node = self.require_mut(to)?;
        let name = node.name().to_owned();
        let slot = node
            .input_mut(input)
            .ok_or_else(|| KinemaError::graph(format!("node '{name}' has no input '{input}'")))?;
        Ok(std::mem::replace(&mut slot.edge, edge))
    }

    fn forget_dependent(&mut self, upstream: NodeId, to: NodeId) {
        let still_fed = self
            .node(to)
            .is_some_and(|n| n.edges().any(|e| e == upstream));
        if !still_fed && let Some(set) = self.dependents.get_mut(upstream.index()) {
            set.remove(&to);
        }
    }

    fn viewer_length(&self, id: NodeId) -> Option<Time> {
        let node = self.node(id)?;
        if !node.op().is_viewer() {
            return None;
        }
        node.input(crate::nodes::viewer::LENGTH)
            .and_then(|i| i.param.value_at(Time::ZERO).as_time())
    }

    fn report_change(
        &mut self,
        id: NodeId,
        input: &str,
        range: TimeRange,
        length_before: Option<Time>,
    ) {
        let Some(node) = self.node(id) else {
            return;
        };
        if node.op().is_viewer() {
            match node.op().classify_change(input) {
                ChangeKind::Length => {
                    let new = self.viewer_length(id).unwrap_or(Time::ZERO);
                    let old = length_before.unwrap_or(Time::ZERO);
                    if old != new {
                        self.events.push(GraphEvent {
                            viewer: id,
                            kind: GraphEventKind::LengthChanged { old, new },
                        });
                    }
                    return;
                }
                ChangeKind::VideoParams => {
                    self.events.push(GraphEvent {
                        viewer: id,
                        kind: GraphEventKind::VideoParamsChanged,
                    });
                    return;
                }
                ChangeKind::Content => {}
            }
        }
        self.propagate(id, GraphEventKind::ChangedBetween(range));
    }

    fn propagate_topology(&mut self, from: NodeId) {
        self.propagate(from, GraphEventKind::TopologyChanged);
        self.propagate(
            from,
            GraphEventKind::ChangedBetween(TimeRange::new(Time::ZERO, Time::MAX)),
        );
    }

    /// Walk downstream from `origin` and queue `kind` for each viewer reached.
    fn propagate(&mut self, origin: NodeId, kind: GraphEventKind) {
        let mut seen = HashSet::from([origin]);
        let mut work = VecDeque::from([origin]);
        while let Some(cur) = work.pop_front() {
            if self.node(cur).is_some_and(|n| n.op().is_viewer()) {
                self.events.push(GraphEvent { viewer: cur, kind });
            }
            for down in self.dependents(cur).collect::<Vec<_>>() {
                if seen.insert(down) {
                    work.push_back(down);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/graph.rs"]
mod tests;
