use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use xxhash_rust::xxh3::Xxh3;

use crate::compile::snapshot::CompiledGraph;
use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::Time;
use crate::graph::{Value, ValueKind};

const XXH3_SEED: u64 = 0x6b69_6e65_6d61_0001;

/// Content hash of one frame: equal hashes render to identical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl ContentHash {
    /// Big-endian byte form.
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.hi.to_be_bytes());
        out[8..].copy_from_slice(&self.lo.to_be_bytes());
        out
    }

    /// Lowercase hex form used for cache file names.
    pub fn to_hex(self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = KinemaError;

    fn from_str(s: &str) -> KinemaResult<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| KinemaError::config(format!("invalid content hash '{s}': {e}")))?;
        let (hi, lo) = bytes.split_at(8);
        let word = |b: &[u8]| {
            let mut w = [0u8; 8];
            w.copy_from_slice(b);
            u64::from_be_bytes(w)
        };
        Ok(Self {
            hi: word(hi),
            lo: word(lo),
        })
    }
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    fn write_time(&mut self, t: Time) {
        self.write_i64(t.num());
        self.write_i64(t.den());
    }

    fn finish(self) -> ContentHash {
        let v = self.inner.digest128();
        ContentHash {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

/// Hash everything that determines the output of snapshot entry `idx` at `time`.
///
/// Connected inputs contribute the hash of their upstream node; unconnected inputs contribute
/// their stored value at `time`. Audio inputs are skipped. The time itself only counts for
/// time-variant ops, so a still graph hashes identically on every frame.
pub fn content_hash(graph: &CompiledGraph, idx: usize, time: Time) -> KinemaResult<ContentHash> {
    let mut memo = HashMap::new();
    hash_node(graph, idx, time, &mut memo)
}

fn hash_node(
    graph: &CompiledGraph,
    idx: usize,
    time: Time,
    memo: &mut HashMap<usize, ContentHash>,
) -> KinemaResult<ContentHash> {
    if let Some(h) = memo.get(&idx) {
        return Ok(*h);
    }

    let (op_id, time_variant, inputs) = graph
        .with_node(idx, |node| {
            let inputs: Vec<_> = node
                .inputs()
                .iter()
                // Audio never reaches a frame.
                .filter(|i| i.kind != ValueKind::Samples)
                .map(|i| (i.id, i.edge, i.param.value_at(time)))
                .collect();
            (node.op().id(), node.op().is_time_variant(), inputs)
        })
        .ok_or_else(|| KinemaError::evaluation(format!("no snapshot node {idx}")))?;

    let mut h = StableHasher::new();
    h.write_str(op_id);
    h.write_u32(inputs.len() as u32);
    for (id, edge, value) in inputs {
        h.write_str(id);
        match edge {
            Some(up) => {
                let sub = hash_node(graph, up, time, memo)?;
                h.write_u8(1);
                h.write_u64(sub.hi);
                h.write_u64(sub.lo);
            }
            None => {
                h.write_u8(0);
                write_value(&mut h, &value);
            }
        }
    }
    if time_variant {
        h.write_u8(1);
        h.write_time(time);
    } else {
        h.write_u8(0);
    }

    let out = h.finish();
    memo.insert(idx, out);
    Ok(out)
}

fn write_value(h: &mut StableHasher, v: &Value) {
    match v {
        Value::None => h.write_u8(0),
        Value::Bool(b) => {
            h.write_u8(1);
            h.write_u8(u8::from(*b));
        }
        Value::Int(i) => {
            h.write_u8(2);
            h.write_i64(*i);
        }
        Value::Float(f) => {
            h.write_u8(3);
            h.write_f64(*f);
        }
        Value::Color(c) => {
            h.write_u8(4);
            for ch in c {
                h.write_f32(*ch);
            }
        }
        Value::Time(t) => {
            h.write_u8(5);
            h.write_time(*t);
        }
        Value::Image(img) => {
            h.write_u8(6);
            h.write_u32(img.width());
            h.write_u32(img.height());
            for px in img.pixels() {
                for ch in px {
                    h.write_f32(*ch);
                }
            }
        }
        Value::Samples(buf) => {
            h.write_u8(7);
            h.write_u32(buf.sample_rate());
            h.write_u32(u32::from(buf.channels()));
            for s in buf.data() {
                h.write_f32(*s);
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/fingerprint.rs"]
mod tests;
