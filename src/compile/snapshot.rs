use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;

use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::{Time, TimeRange};
use crate::graph::{
    AudioContext, EvalContext, InputValues, Node, NodeGraph, NodeId, Value, ValueKind,
    duplicate_connections_between_lists,
};
use crate::nodes::viewer;

/// Index of the evaluation root inside a [`CompiledGraph`].
pub const ROOT: usize = 0;

const VALUE_CACHE_LIMIT: usize = 8;
const REFRESH_LOG_LIMIT: usize = 64;

type ValueKey = (Time, u32, u32);

#[derive(Debug)]
struct CompiledNode {
    // Swapped whole on refresh; evaluations keep the copy they loaded.
    node: ArcSwap<Node<usize>>,
    // Locked only to look up or insert, never across an evaluation.
    values: Mutex<BTreeMap<ValueKey, Value>>,
}

/// Worker-shared deep copy of a viewer and everything it depends on.
///
/// Edges are arena indices, so the copy never references the live graph. Input values are
/// refreshed by [`CompiledGraph::refresh`]; structural edits require a new snapshot.
///
/// Workers evaluate concurrently without holding any lock a refresh waits on. Work that must not
/// mix values from before and after a refresh reads [`CompiledGraph::epoch`] first and checks
/// [`CompiledGraph::unchanged_at`] afterwards.
#[derive(Debug)]
pub struct CompiledGraph {
    nodes: Vec<CompiledNode>,
    sources: Vec<NodeId>,
    // Odd while a refresh is running.
    epoch: AtomicU64,
    // (odd start epoch, refreshed range) of recent refreshes, oldest first.
    refreshes: Mutex<VecDeque<(u64, TimeRange)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CompiledGraph {
    /// Copy `root` and its dependencies out of `graph`.
    ///
    /// Fails when `root` is not a viewer or has nothing connected to its texture input.
    #[tracing::instrument(skip(graph))]
    pub fn compile(graph: &NodeGraph, root: NodeId) -> KinemaResult<Self> {
        let root_node = graph
            .node(root)
            .ok_or_else(|| KinemaError::graph(format!("root {root} is not in the graph")))?;
        if !root_node.op().is_viewer() {
            return Err(KinemaError::graph(format!(
                "root '{}' is not a viewer",
                root_node.name()
            )));
        }
        if root_node
            .input(viewer::TEXTURE)
            .and_then(|i| i.edge)
            .is_none()
        {
            return Err(KinemaError::invalid_state(format!(
                "nothing is connected to viewer '{}'",
                root_node.name()
            )));
        }

        let mut ids = vec![root];
        ids.extend(graph.dependencies(root));
        let sources = ids
            .iter()
            .map(|id| graph.node(*id))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| KinemaError::graph("dependency vanished during compile"))?;

        let mut copies: Vec<Node<usize>> = sources
            .iter()
            .map(|n| {
                let mut copy = n.copy::<usize>();
                Node::copy_values(*n, &mut copy);
                copy
            })
            .collect();
        duplicate_connections_between_lists(&ids, &sources, &mut copies);

        tracing::debug!(nodes = copies.len(), "compiled viewer snapshot");
        Ok(Self {
            nodes: copies
                .into_iter()
                .map(|node| CompiledNode {
                    node: ArcSwap::from_pointee(node),
                    values: Mutex::new(BTreeMap::new()),
                })
                .collect(),
            sources: ids,
            epoch: AtomicU64::new(0),
            refreshes: Mutex::new(VecDeque::new()),
        })
    }

    /// Number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a snapshot holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Live node each snapshot entry was copied from.
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Re-copy input values from the live graph and drop cached values inside `range`.
    ///
    /// `range` must cover every time whose output the live edits changed. Never waits for a
    /// running evaluation. Not meant to run concurrently with itself.
    pub fn refresh(&self, graph: &NodeGraph, range: TimeRange) {
        {
            let mut log = lock(&self.refreshes);
            let start = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            if log.len() >= REFRESH_LOG_LIMIT {
                log.pop_front();
            }
            log.push_back((start, range));
        }
        for (entry, id) in self.nodes.iter().zip(&self.sources) {
            let Some(live) = graph.node(*id) else {
                continue;
            };
            let current = entry.node.load_full();
            let mut next = Node::<usize>::clone(&current);
            Node::copy_values(live, &mut next);
            entry.node.store(Arc::new(next));
        }
        for entry in &self.nodes {
            lock(&entry.values).retain(|(t, _, _), _| !range.contains(*t));
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Refresh counter, read before work that must not overlap a refresh.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Return `true` when no refresh started or ran since `epoch` was read.
    pub fn unchanged_since(&self, epoch: u64) -> bool {
        epoch % 2 == 0 && self.epoch() == epoch
    }

    /// Return `true` when no refresh since `epoch` touched `time`.
    pub fn unchanged_at(&self, epoch: u64, time: Time) -> bool {
        self.unchanged_over(epoch, TimeRange::point(time))
    }

    /// Return `true` when no refresh since `epoch` overlapped `range`.
    ///
    /// Outputs outside a refreshed range are the same before and after it, so work that only
    /// concerns `range` stays valid. Conservatively `false` once the refresh log no longer
    /// reaches back to `epoch`.
    pub fn unchanged_over(&self, epoch: u64, range: TimeRange) -> bool {
        if self.unchanged_since(epoch) {
            return true;
        }
        // First refresh that can have overlapped: the running one when `epoch` is odd.
        let first = epoch | 1;
        let log = lock(&self.refreshes);
        match log.front() {
            Some((start, _)) if *start <= first => {}
            _ => return false,
        }
        !log
            .iter()
            .any(|(start, r)| *start >= first && r.overlaps(range))
    }

    /// Evaluate entry `idx` at `ctx.time`, reusing per-node cached values.
    ///
    /// Concurrent calls may evaluate the same node twice; the results are identical. Values
    /// computed while a refresh touching `ctx.time` overlaps are returned but not cached.
    pub fn evaluate(&self, idx: usize, ctx: &EvalContext) -> KinemaResult<Value> {
        self.evaluate_at_epoch(idx, ctx, self.epoch())
    }

    fn evaluate_at_epoch(&self, idx: usize, ctx: &EvalContext, epoch: u64) -> KinemaResult<Value> {
        let entry = self
            .nodes
            .get(idx)
            .ok_or_else(|| KinemaError::evaluation(format!("no snapshot node {idx}")))?;
        let key = (ctx.time, ctx.width, ctx.height);
        if let Some(v) = lock(&entry.values).get(&key) {
            return Ok(v.clone());
        }

        let node = entry.node.load_full();
        let mut inputs = InputValues::with_capacity(node.inputs().len());
        for input in node.inputs() {
            let v = match input.edge {
                Some(_) if input.kind == ValueKind::Samples => Value::None,
                Some(up) => self.evaluate_at_epoch(up, ctx, epoch)?,
                None => input.param.value_at(ctx.time),
            };
            inputs.push(input.id, v);
        }
        let out = node.op().value(&inputs, ctx).map_err(|e| {
            KinemaError::evaluation(format!("node '{}' at {}: {e}", node.name(), ctx.time))
        })?;

        let mut values = lock(&entry.values);
        // Checked under the lock so a refresh clearing this entry comes strictly after.
        if self.unchanged_at(epoch, ctx.time) {
            if !values.contains_key(&key) && values.len() >= VALUE_CACHE_LIMIT {
                values.pop_first();
            }
            values.insert(key, out.clone());
        }
        Ok(out)
    }

    /// Evaluate the audio output of entry `idx` over `ctx.range`. Not cached.
    pub fn evaluate_audio(&self, idx: usize, ctx: &AudioContext) -> KinemaResult<Value> {
        let entry = self
            .nodes
            .get(idx)
            .ok_or_else(|| KinemaError::evaluation(format!("no snapshot node {idx}")))?;
        let node = entry.node.load_full();
        let at = ctx.range.in_point();
        let mut inputs = InputValues::with_capacity(node.inputs().len());
        for input in node.inputs() {
            let v = match input.edge {
                Some(_) if input.kind == ValueKind::Texture => Value::None,
                Some(up) => self.evaluate_audio(up, ctx)?,
                None => input.param.value_at(at),
            };
            inputs.push(input.id, v);
        }
        node.op().samples(&inputs, ctx).map_err(|e| {
            KinemaError::evaluation(format!("node '{}' over {}: {e}", node.name(), ctx.range))
        })
    }

    pub(crate) fn with_node<R>(&self, idx: usize, f: impl FnOnce(&Node<usize>) -> R) -> Option<R> {
        self.nodes.get(idx).map(|e| f(&e.node.load()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/snapshot.rs"]
mod tests;
