use super::*;
use crate::graph::NodeGraph;
use crate::nodes::{SolidOp, ToneOp, ViewerOp, viewer};
use crate::render::params::PixelFormat;
use std::time::Duration;

fn params() -> RenderParams {
    RenderParams {
        width: 8,
        height: 4,
        format: PixelFormat::Rgba8,
        divider: 2,
        time_base: Time::new(1, 24).unwrap(),
        audio: None,
    }
}

fn snapshot() -> Arc<CompiledGraph> {
    let mut g = NodeGraph::new();
    let out = g.add_node("out", Arc::new(ViewerOp));
    let bg = g.add_node("bg", Arc::new(SolidOp));
    g.set_value(bg, "color", Value::Color([1.0, 0.0, 0.0, 1.0]))
        .unwrap();
    g.connect(bg, out, viewer::TEXTURE).unwrap();
    Arc::new(CompiledGraph::compile(&g, out).unwrap())
}

fn job(time: Time, length: Time) -> RenderJob {
    RenderJob {
        snapshot: snapshot(),
        time,
        params: params(),
        cache_id: "ns".into(),
        generation: 1,
        sequence_length: length,
    }
}

fn next_event(rx: &Receiver<WorkerEvent>) -> WorkerEvent {
    rx.recv_timeout(Duration::from_secs(10)).expect("worker event")
}

fn finished(rx: &Receiver<WorkerEvent>) -> Finished {
    loop {
        if let WorkerEvent::Finished(f) = next_event(rx) {
            return f;
        }
    }
}

#[test]
fn renders_then_reuses_identical_content() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FrameCache::new(dir.path()));
    let (tx, rx) = unbounded();
    let mut w = WorkerHandle::spawn(0, Arc::clone(&cache), params(), tx).unwrap();
    assert!(matches!(next_event(&rx), WorkerEvent::Ready { worker: 0 }));

    assert!(w.send(WorkerRequest::Render(job(Time::ZERO, Time::ZERO))));
    let first = finished(&rx);
    let RenderOutcome::Rendered(hash) = first.outcome else {
        panic!("expected a render, got {:?}", first.outcome);
    };
    assert!(!first.sibling);
    assert_eq!(first.hash, Some(hash));
    let path = cache.cache_path_in("ns", hash);
    let bytes = std::fs::read(&path).unwrap();
    // 4x2 after the divider, RGBA8.
    assert_eq!(bytes.len(), 4 * 2 * 4);
    assert_eq!(&bytes[..4], &[255, 0, 0, 255]);

    assert!(w.send(WorkerRequest::RenderAsSibling(job(
        Time::from_secs(3),
        Time::ZERO
    ))));
    let second = finished(&rx);
    assert!(second.sibling);
    assert_eq!(second.outcome, RenderOutcome::AlreadyCached(hash));

    assert!(w.send(WorkerRequest::Shutdown));
    assert!(matches!(next_event(&rx), WorkerEvent::Exited { worker: 0 }));
    w.join();
}

#[test]
fn primary_jobs_request_the_next_time_base_step() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FrameCache::new(dir.path()));
    let (tx, rx) = unbounded();
    let mut w = WorkerHandle::spawn(3, cache, params(), tx).unwrap();
    next_event(&rx);

    w.send(WorkerRequest::Render(job(Time::ZERO, Time::from_secs(1))));
    match next_event(&rx) {
        WorkerEvent::RequestSibling { worker, job } => {
            assert_eq!(worker, 3);
            assert_eq!(job.time, Time::new(1, 24).unwrap());
        }
        other => panic!("expected sibling request, got {other:?}"),
    }
    finished(&rx);

    // The last frame of the sequence has no sibling.
    w.send(WorkerRequest::Render(job(Time::from_secs(1), Time::from_secs(1))));
    assert!(matches!(next_event(&rx), WorkerEvent::Finished(_)));

    w.send(WorkerRequest::Shutdown);
    w.join();
}

#[test]
fn claimed_hash_reports_in_flight_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FrameCache::new(dir.path()));
    let j = job(Time::ZERO, Time::ZERO);
    let hash = content_hash(&j.snapshot, ROOT, Time::ZERO).unwrap();
    assert!(cache.try_claim("ns", hash));

    let (tx, rx) = unbounded();
    let mut w = WorkerHandle::spawn(0, Arc::clone(&cache), params(), tx).unwrap();
    next_event(&rx);
    w.send(WorkerRequest::Render(j));
    assert_eq!(finished(&rx).outcome, RenderOutcome::InFlightElsewhere(hash));
    assert!(!cache.has_hash("ns", hash));

    w.send(WorkerRequest::Shutdown);
    w.join();
}

#[test]
fn reserve_takes_idle_worker_once() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FrameCache::new(dir.path()));
    let (tx, rx) = unbounded();
    let mut w = WorkerHandle::spawn(0, cache, params(), tx).unwrap();
    next_event(&rx);
    assert!(w.try_reserve());
    assert!(!w.try_reserve());
    w.send(WorkerRequest::Shutdown);
    w.join();
}

#[test]
fn audio_job_writes_one_block() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FrameCache::new(dir.path()));
    let mut g = NodeGraph::new();
    let out = g.add_node("out", Arc::new(ViewerOp));
    let bg = g.add_node("bg", Arc::new(SolidOp));
    let tone = g.add_node("tone", Arc::new(ToneOp));
    g.connect(bg, out, viewer::TEXTURE).unwrap();
    g.connect(tone, out, viewer::AUDIO).unwrap();
    let snapshot = Arc::new(CompiledGraph::compile(&g, out).unwrap());

    let (tx, rx) = unbounded();
    let mut w = WorkerHandle::spawn(0, Arc::clone(&cache), params(), tx).unwrap();
    next_event(&rx);
    w.send(WorkerRequest::RenderAudio(AudioJob {
        snapshot,
        index: 2,
        range: TimeRange::new(Time::from_secs(2), Time::new(5, 2).unwrap()),
        params: AudioParams {
            sample_rate: 40,
            channel_layout: 0b1,
        },
        cache_id: "ns".into(),
        generation: 1,
    }));
    let done = loop {
        if let WorkerEvent::AudioFinished(done) = next_event(&rx) {
            break done;
        }
    };
    assert_eq!(done.index, 2);
    assert_eq!(done.result, Ok(()));
    let bytes = std::fs::read(cache.audio_path_in("ns", 2)).unwrap();
    // Half a second of mono at 40 Hz.
    assert_eq!(bytes.len(), 20 * 4);

    w.send(WorkerRequest::Shutdown);
    w.join();
}
