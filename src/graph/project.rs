//! JSON project files describing a node graph.
//!
//! ```json
//! {
//!   "viewer": "out",
//!   "nodes": [
//!     { "name": "out", "op": "viewer", "inputs": { "length": "10", "timebase": "1/24" } },
//!     { "name": "bg", "op": "solid", "inputs": { "color": [1, 0, 0, 1] } },
//!     { "name": "fade", "op": "opacity",
//!       "inputs": { "opacity": { "keyframes": [ { "time": "0", "value": 100 },
//!                                               { "time": "5", "value": 0 } ] } } }
//!   ],
//!   "edges": [
//!     { "from": "bg", "to": "fade", "input": "texture" },
//!     { "from": "fade", "to": "out", "input": "texture" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::Time;
use crate::graph::{NodeGraph, NodeId, Value, ValueKind};

/// Deserialized project document.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    /// Name of the node used as evaluation root.
    pub viewer: String,
    /// Node declarations.
    pub nodes: Vec<NodeDecl>,
    /// Connections between declared nodes.
    #[serde(default)]
    pub edges: Vec<EdgeDecl>,
}

/// One node declaration.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDecl {
    /// Unique node name.
    pub name: String,
    /// Built-in op id.
    pub op: String,
    /// Input values keyed by input id.
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_json::Value>,
}

/// One connection declaration.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeDecl {
    /// Upstream node name.
    pub from: String,
    /// Downstream node name.
    pub to: String,
    /// Input of `to` that receives the connection.
    pub input: String,
}

#[derive(serde::Deserialize)]
struct KeyDecl {
    time: serde_json::Value,
    value: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct TrackDecl {
    keyframes: Vec<KeyDecl>,
}

impl Project {
    /// Parse a project from JSON text.
    pub fn from_json(text: &str) -> KinemaResult<Self> {
        serde_json::from_str(text).map_err(|e| KinemaError::config(format!("invalid project: {e}")))
    }

    /// Read and parse a project file.
    pub fn load(path: &Path) -> KinemaResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| KinemaError::io(e, path))?;
        Self::from_json(&text)
    }

    /// Build the live graph; returns it with the viewer's id.
    ///
    /// Values are applied before edges, so building queues no events worth keeping; the returned
    /// graph has its event queue drained.
    pub fn build(&self) -> KinemaResult<(NodeGraph, NodeId)> {
        let mut graph = NodeGraph::new();
        let mut ids: BTreeMap<&str, NodeId> = BTreeMap::new();

        for decl in &self.nodes {
            let op = crate::nodes::op_by_id(&decl.op).ok_or_else(|| {
                KinemaError::config(format!("node '{}': unknown op '{}'", decl.name, decl.op))
            })?;
            if ids.contains_key(decl.name.as_str()) {
                return Err(KinemaError::config(format!(
                    "duplicate node name '{}'",
                    decl.name
                )));
            }
            let specs = op.inputs();
            let id = graph.add_node(decl.name.clone(), op);
            ids.insert(&decl.name, id);

            for (input, raw) in &decl.inputs {
                let spec = specs.iter().find(|s| s.id == input).ok_or_else(|| {
                    KinemaError::config(format!("node '{}': unknown input '{input}'", decl.name))
                })?;
                let ctx = |e: KinemaError| {
                    KinemaError::config(format!("node '{}' input '{input}': {e}", decl.name))
                };
                if let Ok(track) = serde_json::from_value::<TrackDecl>(raw.clone()) {
                    for key in track.keyframes {
                        let t = parse_time(&key.time).map_err(ctx)?;
                        let v = parse_value(spec.kind, &key.value).map_err(ctx)?;
                        graph.set_keyframe(id, spec.id, t, v)?;
                    }
                } else {
                    let v = parse_value(spec.kind, raw).map_err(ctx)?;
                    graph.set_value(id, spec.id, v)?;
                }
            }
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| KinemaError::config(format!("edge references unknown node '{name}'")))
        };
        for edge in &self.edges {
            graph.connect(lookup(&edge.from)?, lookup(&edge.to)?, &edge.input)?;
        }

        let viewer = lookup(&self.viewer)?;
        if !graph.node(viewer).is_some_and(|n| n.op().is_viewer()) {
            return Err(KinemaError::config(format!(
                "'{}' is not a viewer node",
                self.viewer
            )));
        }
        graph.take_events();
        Ok((graph, viewer))
    }
}

fn parse_time(raw: &serde_json::Value) -> KinemaResult<Time> {
    match raw {
        serde_json::Value::String(s) => s.parse(),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Time::from_secs)
            .ok_or_else(|| KinemaError::config(format!("time {n} is not an integer or 'n/d'"))),
        other => Err(KinemaError::config(format!("expected time, got {other}"))),
    }
}

fn parse_value(kind: ValueKind, raw: &serde_json::Value) -> KinemaResult<Value> {
    let bad = || KinemaError::config(format!("expected {kind:?}, got {raw}"));
    Ok(match kind {
        ValueKind::Bool => Value::Bool(raw.as_bool().ok_or_else(bad)?),
        ValueKind::Int => Value::Int(raw.as_i64().ok_or_else(bad)?),
        ValueKind::Float => Value::Float(raw.as_f64().ok_or_else(bad)?),
        ValueKind::Time => Value::Time(parse_time(raw)?),
        ValueKind::Color => {
            let c: [f32; 4] = serde_json::from_value(raw.clone()).map_err(|_| bad())?;
            Value::Color(c)
        }
        ValueKind::Texture | ValueKind::Samples => {
            return Err(KinemaError::config(format!(
                "{kind:?} inputs can only be connected, not set"
            )));
        }
    })
}

#[cfg(test)]
#[path = "../../tests/unit/graph/project.rs"]
mod tests;
