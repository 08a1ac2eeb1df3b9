use super::*;
use crate::graph::{ImageBuffer, InputSpec, NodeOp};
use crate::nodes::{OpacityOp, SolidOp, ToneOp, ViewerOp};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct SlowOp(Duration);

impl NodeOp for SlowOp {
    fn id(&self) -> &'static str {
        "slow"
    }

    fn inputs(&self) -> Vec<InputSpec> {
        Vec::new()
    }

    fn value(&self, _inputs: &InputValues, ctx: &EvalContext) -> KinemaResult<Value> {
        std::thread::sleep(self.0);
        Ok(Value::Image(Arc::new(ImageBuffer::filled(
            ctx.width,
            ctx.height,
            [1.0; 4],
        ))))
    }

    fn is_time_variant(&self) -> bool {
        true
    }
}

fn slow_graph(delay: Duration) -> (NodeGraph, NodeId, NodeId) {
    let mut g = NodeGraph::new();
    let out = g.add_node("out", Arc::new(ViewerOp));
    let fade = g.add_node("fade", Arc::new(OpacityOp));
    let slow = g.add_node("slow", Arc::new(SlowOp(delay)));
    g.connect(slow, fade, "texture").unwrap();
    g.connect(fade, out, viewer::TEXTURE).unwrap();
    (g, out, fade)
}

fn graph() -> (NodeGraph, NodeId, NodeId) {
    let mut g = NodeGraph::new();
    let out = g.add_node("out", Arc::new(ViewerOp));
    let fade = g.add_node("fade", Arc::new(OpacityOp));
    let bg = g.add_node("bg", Arc::new(SolidOp));
    g.set_value(bg, "color", Value::Color([1.0, 1.0, 1.0, 1.0]))
        .unwrap();
    g.connect(bg, fade, "texture").unwrap();
    g.connect(fade, out, viewer::TEXTURE).unwrap();
    (g, out, fade)
}

fn ctx(time: Time) -> EvalContext {
    EvalContext {
        time,
        width: 4,
        height: 2,
    }
}

fn first_pixel(v: &Value) -> [f32; 4] {
    v.as_image().unwrap().pixels()[0]
}

#[test]
fn compile_requires_connected_viewer() {
    let mut g = NodeGraph::new();
    let out = g.add_node("out", Arc::new(ViewerOp));
    let bg = g.add_node("bg", Arc::new(SolidOp));
    assert!(matches!(
        CompiledGraph::compile(&g, out),
        Err(KinemaError::InvalidState(_))
    ));
    assert!(CompiledGraph::compile(&g, bg).is_err());
}

#[test]
fn snapshot_is_isolated_from_live_edits_until_refresh() {
    let (mut g, out, fade) = graph();
    let snap = CompiledGraph::compile(&g, out).unwrap();
    assert_eq!(snap.len(), 3);
    assert_eq!(snap.sources()[0], out);

    let before = snap.evaluate(ROOT, &ctx(Time::ZERO)).unwrap();
    assert_eq!(first_pixel(&before), [1.0; 4]);

    g.set_value(fade, "opacity", Value::Float(50.0)).unwrap();
    let stale = snap.evaluate(ROOT, &ctx(Time::ZERO)).unwrap();
    assert_eq!(first_pixel(&stale), [1.0; 4]);

    snap.refresh(&g, TimeRange::new(Time::ZERO, Time::MAX));
    let fresh = snap.evaluate(ROOT, &ctx(Time::ZERO)).unwrap();
    assert_eq!(first_pixel(&fresh), [0.5; 4]);
}

#[test]
fn refresh_keeps_cached_values_outside_range() {
    let (mut g, out, fade) = graph();
    let snap = CompiledGraph::compile(&g, out).unwrap();
    let late = Time::from_secs(5);
    snap.evaluate(ROOT, &ctx(late)).unwrap();

    g.set_value(fade, "opacity", Value::Float(0.0)).unwrap();
    snap.refresh(&g, TimeRange::new(Time::ZERO, Time::from_secs(1)));

    // Still served from the per-node value cache.
    let cached = snap.evaluate(ROOT, &ctx(late)).unwrap();
    assert_eq!(first_pixel(&cached), [1.0; 4]);
    let recomputed = snap.evaluate(ROOT, &ctx(Time::ZERO)).unwrap();
    assert_eq!(first_pixel(&recomputed), [0.0; 4]);
}

#[test]
fn evaluation_is_shared_across_threads() {
    let (g, out, _) = graph();
    let snap = Arc::new(CompiledGraph::compile(&g, out).unwrap());
    std::thread::scope(|s| {
        for i in 0..4 {
            let snap = Arc::clone(&snap);
            s.spawn(move || {
                let v = snap.evaluate(ROOT, &ctx(Time::from_secs(i))).unwrap();
                assert_eq!(first_pixel(&v), [1.0; 4]);
            });
        }
    });
}

#[test]
fn refresh_advances_epoch_by_a_full_step() {
    let (g, out, _) = graph();
    let snap = CompiledGraph::compile(&g, out).unwrap();
    let before = snap.epoch();
    assert!(snap.unchanged_since(before));

    snap.refresh(&g, TimeRange::new(Time::ZERO, Time::MAX));
    assert!(!snap.unchanged_since(before));
    assert_eq!(snap.epoch(), before + 2);
    assert!(snap.unchanged_since(snap.epoch()));
}

#[test]
fn slow_nodes_evaluate_in_parallel() {
    let (g, out, _) = slow_graph(Duration::from_millis(300));
    let snap = Arc::new(CompiledGraph::compile(&g, out).unwrap());
    let start = Instant::now();
    std::thread::scope(|s| {
        for i in 0..4 {
            let snap = Arc::clone(&snap);
            s.spawn(move || snap.evaluate(ROOT, &ctx(Time::from_secs(i))).unwrap());
        }
    });
    // One after another would take 1.2 s.
    assert!(start.elapsed() < Duration::from_millis(900));
}

#[test]
fn refresh_does_not_wait_for_a_running_evaluation() {
    let (mut g, out, fade) = slow_graph(Duration::from_millis(600));
    let snap = Arc::new(CompiledGraph::compile(&g, out).unwrap());
    let late = Time::from_secs(5);
    std::thread::scope(|s| {
        let worker = {
            let snap = Arc::clone(&snap);
            s.spawn(move || {
                let epoch = snap.epoch();
                snap.evaluate(ROOT, &ctx(late)).unwrap();
                snap.unchanged_at(epoch, late)
            })
        };
        std::thread::sleep(Duration::from_millis(100));

        g.set_value(fade, "opacity", Value::Float(0.0)).unwrap();
        let start = Instant::now();
        snap.refresh(&g, TimeRange::new(Time::ZERO, Time::from_secs(1)));
        assert!(start.elapsed() < Duration::from_millis(300));

        // The edit did not touch the time being rendered.
        assert!(worker.join().unwrap());
    });
    let fresh = snap.evaluate(ROOT, &ctx(Time::ZERO)).unwrap();
    assert_eq!(first_pixel(&fresh), [0.0; 4]);
}

#[test]
fn unchanged_checks_only_the_refreshed_range() {
    let (g, out, _) = graph();
    let snap = CompiledGraph::compile(&g, out).unwrap();
    let epoch = snap.epoch();
    snap.refresh(&g, TimeRange::new(Time::ZERO, Time::from_secs(1)));

    assert!(snap.unchanged_at(epoch, Time::from_secs(5)));
    assert!(!snap.unchanged_at(epoch, Time::ZERO));
    assert!(!snap.unchanged_over(
        epoch,
        TimeRange::new(Time::new(1, 2).unwrap(), Time::from_secs(2))
    ));
    assert!(snap.unchanged_at(snap.epoch(), Time::ZERO));

    // Too old to tell once the log has moved on.
    for _ in 0..REFRESH_LOG_LIMIT {
        snap.refresh(&g, TimeRange::point(Time::ZERO));
    }
    assert!(!snap.unchanged_at(epoch, Time::from_secs(5)));
}

#[test]
fn audio_is_evaluated_over_a_block() {
    let (mut g, out, _) = graph();
    let tone = g.add_node("tone", Arc::new(ToneOp));
    g.connect(tone, out, viewer::AUDIO).unwrap();
    let snap = CompiledGraph::compile(&g, out).unwrap();

    let block = AudioContext {
        range: TimeRange::new(Time::ZERO, Time::from_secs(1)),
        sample_rate: 10,
        channels: 2,
    };
    let v = snap.evaluate_audio(ROOT, &block).unwrap();
    let samples = v.as_samples().unwrap();
    assert_eq!(samples.frames(), 10);
    assert_eq!(samples.data().len(), 20);
    assert_eq!(samples.data()[0], 0.0);

    // The picture path ignores the audio input.
    let picture = snap.evaluate(ROOT, &ctx(Time::ZERO)).unwrap();
    assert_eq!(first_pixel(&picture), [1.0; 4]);
}
