use std::collections::BTreeMap;
use std::sync::Arc;

use crate::foundation::time::{Time, TimeRange};
use crate::graph::op::NodeOp;
use crate::graph::value::{Value, ValueKind};

/// Stored value of an input: a constant or hold-interpolated keyframes.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    /// Same value at every time.
    Constant(Value),
    /// Non-empty keyframe track; each key holds until the next one.
    Keyframes(BTreeMap<Time, Value>),
}

impl Param {
    /// Value at `t`. Before the first key the first key's value holds.
    pub fn value_at(&self, t: Time) -> Value {
        match self {
            Param::Constant(v) => v.clone(),
            Param::Keyframes(keys) => keys
                .range(..=t)
                .next_back()
                .or_else(|| keys.iter().next())
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::None),
        }
    }

    /// Return `true` for a keyframe track.
    pub fn is_animated(&self) -> bool {
        matches!(self, Param::Keyframes(_))
    }

    /// Range whose values change when the key at `t` is inserted, replaced or removed.
    ///
    /// With hold interpolation that is `[t, next key]`, extended back to zero when `t` is (or
    /// becomes) the first key.
    pub(crate) fn key_span(keys: &BTreeMap<Time, Value>, t: Time) -> TimeRange {
        let has_prev = keys.range(..t).next_back().is_some();
        let next = keys
            .range((std::ops::Bound::Excluded(t), std::ops::Bound::Unbounded))
            .next()
            .map(|(k, _)| *k)
            .unwrap_or(Time::MAX);
        let start = if has_prev { t } else { Time::ZERO.min(t) };
        TimeRange::new(start, next)
    }
}

/// One named input of a node.
#[derive(Clone, Debug)]
pub struct NodeInput<E = crate::graph::NodeId> {
    /// Input identifier as declared by the op.
    pub id: &'static str,
    /// Declared value kind.
    pub kind: ValueKind,
    /// Stored value used when the input is not connected.
    pub param: Param,
    /// Upstream node feeding this input.
    pub edge: Option<E>,
}

/// A node: an op plus its input state.
///
/// `E` is the edge handle type. The live graph uses [`crate::graph::NodeId`]; compiled snapshots
/// use arena indices.
#[derive(Clone, Debug)]
pub struct Node<E = crate::graph::NodeId> {
    name: String,
    op: Arc<dyn NodeOp>,
    inputs: Vec<NodeInput<E>>,
}

impl<E: Copy + PartialEq> Node<E> {
    /// Fresh node with default input values and no connections.
    pub fn new(name: impl Into<String>, op: Arc<dyn NodeOp>) -> Self {
        let inputs = op
            .inputs()
            .into_iter()
            .map(|spec| NodeInput {
                id: spec.id,
                kind: spec.kind,
                param: Param::Constant(spec.default),
                edge: None,
            })
            .collect();
        Self {
            name: name.into(),
            op,
            inputs,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared operation.
    pub fn op(&self) -> &Arc<dyn NodeOp> {
        &self.op
    }

    /// Inputs in declaration order.
    pub fn inputs(&self) -> &[NodeInput<E>] {
        &self.inputs
    }

    /// Input by id.
    pub fn input(&self, id: &str) -> Option<&NodeInput<E>> {
        self.inputs.iter().find(|i| i.id == id)
    }

    pub(crate) fn input_mut(&mut self, id: &str) -> Option<&mut NodeInput<E>> {
        self.inputs.iter_mut().find(|i| i.id == id)
    }

    /// Upstream handles of all connected inputs, in input order.
    pub fn edges(&self) -> impl Iterator<Item = E> + '_ {
        self.inputs.iter().filter_map(|i| i.edge)
    }

    /// Same op and name with default inputs and no connections, for any edge type.
    pub fn copy<F: Copy + PartialEq>(&self) -> Node<F> {
        Node::new(self.name.clone(), Arc::clone(&self.op))
    }

    /// Copy every stored input value of `src` onto the matching inputs of `dst`.
    ///
    /// Inputs are matched by id; connections on `dst` are untouched.
    pub fn copy_values<F>(src: &Node<F>, dst: &mut Node<E>) {
        for input in &src.inputs {
            if let Some(d) = dst.input_mut(input.id) {
                d.param = input.param.clone();
            }
        }
    }

    /// Copy inputs from `src` to `dst`, optionally including its connections.
    pub fn copy_inputs(src: &Node<E>, dst: &mut Node<E>, include_connections: bool) {
        Self::copy_values(src, dst);
        if include_connections {
            for input in &src.inputs {
                if let Some(d) = dst.input_mut(input.id) {
                    d.edge = input.edge;
                }
            }
        }
    }

    /// Value of input `id` at `t`, ignoring connections.
    pub fn stored_value(&self, id: &str, t: Time) -> Option<Value> {
        self.input(id).map(|i| i.param.value_at(t))
    }
}

/// Reproduce the edges among `sources` onto the position-matched `dests`.
///
/// Edges pointing outside `sources` are dropped. `dests[i]` receives the connections of
/// `sources[i]`, rewritten to positions within the list.
pub fn duplicate_connections_between_lists<F: Copy + PartialEq>(
    source_ids: &[F],
    sources: &[&Node<F>],
    dests: &mut [Node<usize>],
) {
    for (src, dst) in sources.iter().zip(dests.iter_mut()) {
        for input in &src.inputs {
            let mapped = input
                .edge
                .and_then(|e| source_ids.iter().position(|id| *id == e));
            if let Some(d) = dst.input_mut(input.id) {
                d.edge = mapped;
            }
        }
    }
}
