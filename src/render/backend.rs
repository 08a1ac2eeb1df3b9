//! Coordinator of the render-and-cache pipeline.
//!
//! The backend lives on the thread that owns the [`NodeGraph`]. It turns invalidated ranges into
//! prioritized cache points, dispatches one primary render at a time to a pool of worker threads,
//! routes sibling prefetch requests to idle workers and folds completions back into the
//! time-to-hash table of the [`FrameCache`].
//!
//! Every job carries the render params and cache namespace it was dispatched with. Completions
//! from an older namespace are dropped, as are completions whose time has been invalidated again
//! since dispatch.
//!
//! When audio params are set and the viewer has audio connected, invalidation also queues the
//! one-second audio blocks it overlaps. They are rendered one at a time alongside frames.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::cache::{FrameCache, generate_cache_id};
use crate::compile::{CompiledGraph, ContentHash};
use crate::config::BackendConfig;
use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::{Time, TimeRange};
use crate::graph::{GraphEventKind, NodeGraph, NodeId};
use crate::nodes::viewer;
use crate::render::params::RenderParams;
use crate::render::worker::{
    AudioFinished, AudioJob, Finished, RenderJob, RenderOutcome, WorkerEvent, WorkerHandle,
    WorkerRequest,
};
use crate::schedule::{CacheQueue, aligned_points};

const POLL_SLICE: Duration = Duration::from_millis(50);
const AUDIO_BLOCK: Time = Time::from_secs(1);

/// Completion counters since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Frames evaluated and written by a worker.
    pub frames_rendered: u64,
    /// Frames whose content already existed on disk.
    pub frames_reused: u64,
    /// Frames skipped because identical content was being rendered elsewhere.
    pub frames_skipped: u64,
    /// Frames that failed to render.
    pub frames_failed: u64,
    /// Completed sibling (prefetch) jobs, included in the counts above.
    pub sibling_renders: u64,
    /// Completions dropped because their namespace or time was invalidated meanwhile.
    pub stale_dropped: u64,
    /// Audio blocks evaluated and written.
    pub audio_blocks_rendered: u64,
    /// Audio blocks that failed to render.
    pub audio_blocks_failed: u64,
}

/// Asynchronous render-and-cache backend for one viewer.
#[derive(Debug)]
pub struct RenderBackend {
    config: BackendConfig,
    frame_cache: Arc<FrameCache>,
    workers: Vec<WorkerHandle>,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
    started: bool,
    last_error: Option<String>,

    viewer: Option<NodeId>,
    compiled: Option<Arc<CompiledGraph>>,
    recompile_queued: bool,

    params: RenderParams,
    cache_name: String,
    cache_stamp_ms: u64,
    cache_id: Option<String>,

    queue: CacheQueue,
    audio_queue: CacheQueue,
    last_requested: Time,
    pending_update: Option<TimeRange>,
    primary_in_flight: bool,
    audio_in_flight: bool,
    outstanding: usize,
    generation: u64,
    // Generation of the latest invalidation of each point / audio block.
    invalidated: HashMap<Time, u64>,
    audio_invalidated: HashMap<i64, u64>,
    // Points whose content another job was producing when they were rendered.
    waiting: HashMap<ContentHash, Vec<(Time, u64)>>,

    load_buffer: Vec<u8>,
    stats: BackendStats,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1)
        .max(1)
}

impl RenderBackend {
    /// Build a stopped backend. Call [`RenderBackend::init`] to start workers.
    pub fn new(config: BackendConfig) -> Self {
        let (events_tx, events_rx) = unbounded();
        let mut backend = Self {
            frame_cache: Arc::new(FrameCache::new(config.cache_dir.clone())),
            queue: CacheQueue::new(config.behind_penalty),
            audio_queue: CacheQueue::new(config.behind_penalty),
            workers: Vec::new(),
            events_tx,
            events_rx,
            started: false,
            last_error: None,
            viewer: None,
            compiled: None,
            recompile_queued: false,
            params: RenderParams {
                audio: config.audio,
                ..RenderParams::default()
            },
            cache_name: String::new(),
            cache_stamp_ms: 0,
            cache_id: None,
            last_requested: Time::ZERO,
            pending_update: None,
            primary_in_flight: false,
            audio_in_flight: false,
            outstanding: 0,
            generation: 0,
            invalidated: HashMap::new(),
            audio_invalidated: HashMap::new(),
            waiting: HashMap::new(),
            load_buffer: Vec::new(),
            stats: BackendStats::default(),
            config,
        };
        if !backend.config.cache_name.is_empty() {
            let name = backend.config.cache_name.clone();
            backend.set_cache_name(name);
        }
        backend
    }

    /// Spawn one worker per configured core and wait until each reports in.
    ///
    /// Idempotent once started. On failure every spawned worker is shut down again, the message
    /// is kept in [`RenderBackend::last_error`] and [`KinemaError::Setup`] is returned.
    #[tracing::instrument(skip(self))]
    pub fn init(&mut self) -> KinemaResult<()> {
        if self.started {
            return Ok(());
        }
        self.last_error = None;
        // Fresh channel per run so events of detached workers never reach this one.
        let (tx, rx) = unbounded();
        self.events_tx = tx;
        self.events_rx = rx;

        let count = self.config.resolved_worker_count();
        for index in 0..count {
            match WorkerHandle::spawn(
                index,
                Arc::clone(&self.frame_cache),
                self.params,
                self.events_tx.clone(),
            ) {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    return self.abort_init(format!("cannot spawn render worker {index}: {e}"));
                }
            }
        }

        let timeout = self.config.startup_timeout();
        let deadline = Instant::now() + timeout;
        let mut ready = 0;
        while ready < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(WorkerEvent::Ready { .. }) => ready += 1,
                Ok(WorkerEvent::InitFailed { worker, message }) => {
                    return self.abort_init(format!(
                        "render worker {worker} failed to start: {message}"
                    ));
                }
                Ok(other) => tracing::debug!(?other, "ignoring event during startup"),
                Err(_) => {
                    return self.abort_init(format!(
                        "only {ready} of {count} render workers ready after {} ms",
                        timeout.as_millis()
                    ));
                }
            }
        }

        self.started = true;
        self.load_buffer = vec![0; self.params.buffer_size()];
        tracing::info!(workers = count, "render backend started");
        Ok(())
    }

    fn abort_init(&mut self, message: String) -> KinemaResult<()> {
        tracing::error!(%message, "render backend setup failed");
        self.last_error = Some(message.clone());
        if let Err(e) = self.stop_workers() {
            tracing::warn!(error = %e, "cleanup after failed setup");
        }
        Err(KinemaError::setup(message))
    }

    /// Stop every worker and release the snapshot. Idempotent.
    ///
    /// Returns [`KinemaError::StuckWorker`] when a worker does not exit in time; that worker is
    /// detached and the backend is still considered closed.
    #[tracing::instrument(skip(self))]
    pub fn close(&mut self) -> KinemaResult<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        let result = self.stop_workers();
        self.decompile();
        self.load_buffer = Vec::new();
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        tracing::info!("render backend closed");
        result
    }

    fn stop_workers(&mut self) -> KinemaResult<()> {
        let mut pending: Vec<usize> = self
            .workers
            .iter()
            .filter(|w| w.send(WorkerRequest::Shutdown))
            .map(|w| w.index)
            .collect();

        let timeout = self.config.shutdown_timeout();
        let deadline = Instant::now() + timeout;
        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(WorkerEvent::Exited { worker }) => pending.retain(|w| *w != worker),
                // Results still in flight at shutdown are discarded.
                Ok(_) => {}
                Err(_) => break,
            }
        }

        let mut stuck = None;
        for mut w in self.workers.drain(..) {
            if pending.contains(&w.index) {
                tracing::warn!(worker = w.index, "render worker did not stop; detaching");
                w.detach();
                stuck.get_or_insert(w.index);
            } else {
                w.join();
            }
        }
        self.outstanding = 0;
        self.primary_in_flight = false;
        self.audio_in_flight = false;
        self.requeue_waiters();

        match stuck {
            Some(worker) => Err(KinemaError::StuckWorker {
                worker,
                timeout_ms: timeout.as_millis(),
            }),
            None => Ok(()),
        }
    }

    /// Snapshot the attached viewer and its dependencies unless a valid snapshot exists.
    pub fn compile(&mut self, graph: &NodeGraph) -> KinemaResult<()> {
        if self.recompile_queued {
            self.recompile_queued = false;
            self.decompile();
        }
        if self.compiled.is_some() {
            return Ok(());
        }
        let viewer = self
            .viewer
            .ok_or_else(|| KinemaError::invalid_state("no viewer node attached"))?;
        let snapshot = CompiledGraph::compile(graph, viewer)?;
        self.compiled = Some(Arc::new(snapshot));
        self.pending_update = None;
        Ok(())
    }

    /// Drop the snapshot. Jobs already dispatched keep their own reference.
    pub fn decompile(&mut self) {
        if self.compiled.take().is_some() {
            tracing::debug!("viewer snapshot released");
        }
    }

    /// Attach (or with `None` detach) the viewer whose output is cached.
    ///
    /// Pending points and time mappings belong to the previous viewer and are discarded. Render
    /// params are taken from the new viewer's width, height and time base.
    pub fn set_viewer_node(&mut self, graph: &NodeGraph, viewer: Option<NodeId>) {
        if self.viewer == viewer {
            return;
        }
        self.decompile();
        self.recompile_queued = false;
        self.queue.clear();
        self.audio_queue.clear();
        self.invalidated.clear();
        self.audio_invalidated.clear();
        self.waiting.clear();
        self.frame_cache.clear();
        self.pending_update = None;
        self.generation += 1;
        self.viewer = viewer;
        if viewer.is_some() {
            self.apply_viewer_params(graph);
        }
    }

    fn apply_viewer_params(&mut self, graph: &NodeGraph) {
        let Some(v) = self.viewer else {
            return;
        };
        match viewer::video_params(graph, v) {
            Ok(video) => {
                let mut params =
                    RenderParams::from_video(video, self.config.pixel_format, self.config.divider);
                params.audio = self.params.audio;
                self.set_render_params(params);
            }
            Err(e) => tracing::warn!(error = %e, "viewer has unusable video params"),
        }
    }

    /// Replace the render params, notify workers and recompute the cache namespace.
    pub fn set_render_params(&mut self, params: RenderParams) {
        self.params = params;
        if params.audio.is_none() {
            self.audio_queue.clear();
        }
        for w in &self.workers {
            w.send(WorkerRequest::SetParams(params));
        }
        if self.started {
            self.load_buffer = vec![0; params.buffer_size()];
        }
        self.regenerate_cache_id();
    }

    /// Set the cache name, stamping it with the current time.
    pub fn set_cache_name(&mut self, name: impl Into<String>) {
        self.set_cache_name_with_stamp(name, now_ms());
    }

    /// Set the cache name with an explicit creation stamp (milliseconds since the epoch).
    ///
    /// Reusing a stamp across runs reuses the cache namespace.
    pub fn set_cache_name_with_stamp(&mut self, name: impl Into<String>, stamp_ms: u64) {
        self.cache_name = name.into();
        self.cache_stamp_ms = stamp_ms;
        self.regenerate_cache_id();
    }

    fn regenerate_cache_id(&mut self) {
        let id = generate_cache_id(&self.params, &self.cache_name, self.cache_stamp_ms);
        let changed = id != self.cache_id;
        if changed {
            tracing::debug!(cache_id = ?id, "cache namespace changed");
        }
        self.cache_id = id.clone();
        self.frame_cache.set_cache_id(id);
        if changed {
            // Their content was claimed in the old namespace.
            self.requeue_waiters();
        }
    }

    /// Cached pixels for the frame showing at `time`, or `None` when not available yet.
    ///
    /// `time` is snapped down onto the time-base grid. It is also recorded, unsnapped, as the
    /// playhead the queue is ordered around. The returned slice is reused by the next call.
    pub fn request_frame(&mut self, time: Time) -> Option<&[u8]> {
        self.last_requested = time;
        self.viewer?;
        if self.cache_id.is_none() {
            tracing::warn!(%time, "frame requested without a cache id");
            return None;
        }
        if !self.params.is_valid() {
            tracing::warn!(%time, "frame requested with invalid render params");
            return None;
        }

        let frame = time.floor_to(self.params.time_base);
        let size = self.params.buffer_size();
        if self.load_buffer.len() != size {
            self.load_buffer = vec![0; size];
        }
        match self.frame_cache.read_frame(frame, &mut self.load_buffer) {
            Ok(true) => Some(&self.load_buffer),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(%time, error = %e, "cached frame unreadable");
                None
            }
        }
    }

    /// Cached interleaved samples of the audio block containing `time`, or `None`.
    pub fn request_audio(&self, time: Time) -> Option<Vec<f32>> {
        self.viewer?;
        self.params.audio?;
        match self.frame_cache.read_audio(time.div_floor(AUDIO_BLOCK)) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(%time, error = %e, "cached audio unreadable");
                None
            }
        }
    }

    /// Queue every time-base point of `[start, end]` (clamped to the sequence) for caching.
    ///
    /// No-op while render params are invalid. Mappings and pending work past the sequence end
    /// are forgotten.
    #[tracing::instrument(skip(self, graph), fields(start = %start, end = %end))]
    pub fn invalidate(&mut self, graph: &NodeGraph, start: Time, end: Time) {
        if !self.params.is_valid() {
            return;
        }
        let length = self.sequence_length(graph);
        let range = TimeRange::new(start, end);
        self.generation += 1;
        let generation = self.generation;

        self.queue.set_anchor(self.last_requested);
        let mut queued = 0;
        for t in aligned_points(range, length, self.params.time_base) {
            self.invalidated.insert(t, generation);
            if self.queue.insert(t) {
                queued += 1;
            }
        }
        self.truncate_to(length);
        if self.params.audio.is_some() && self.has_audio(graph) {
            self.invalidate_audio(range, length, generation);
        }
        self.pending_update = Some(match self.pending_update {
            Some(r) => r.union(range),
            None => range,
        });
        tracing::debug!(queued, pending = self.queue.len(), "cache invalidated");

        self.dispatch(graph);
    }

    fn invalidate_audio(&mut self, range: TimeRange, length: Time, generation: u64) {
        let first = range.in_point().max(Time::ZERO).div_floor(AUDIO_BLOCK);
        let last = range.out_point().min(length).div_floor(AUDIO_BLOCK);
        self.audio_queue
            .set_anchor(self.last_requested.floor_to(AUDIO_BLOCK));
        for index in first..=last {
            let start = Time::from_secs(index);
            if start >= length {
                break;
            }
            self.frame_cache.forget_audio(index);
            self.audio_invalidated.insert(index, generation);
            self.audio_queue.insert(start);
        }
    }

    fn truncate_to(&mut self, length: Time) {
        self.frame_cache.truncate(length);
        self.queue.retain(|t| t <= length);
        self.invalidated.retain(|t, _| *t <= length);
        for waiters in self.waiting.values_mut() {
            waiters.retain(|(t, _)| *t <= length);
        }
        self.audio_queue.retain(|t| t < length);
        self.audio_invalidated
            .retain(|index, _| Time::from_secs(*index) < length);
    }

    fn dispatch(&mut self, graph: &NodeGraph) {
        self.dispatch_next(graph);
        self.dispatch_audio(graph);
    }

    fn prepare_snapshot(&mut self, graph: &NodeGraph) -> Option<Arc<CompiledGraph>> {
        if let Err(e) = self.compile(graph) {
            tracing::debug!(error = %e, "viewer not renderable; nothing dispatched");
            return None;
        }
        let snapshot = self.compiled.clone()?;
        if let Some(range) = self.pending_update.take() {
            snapshot.refresh(graph, range);
        }
        Some(snapshot)
    }

    /// Send the most urgent queued point to a worker if nothing primary is in flight.
    pub fn dispatch_next(&mut self, graph: &NodeGraph) {
        if !self.started || self.queue.is_empty() || self.viewer.is_none() || self.primary_in_flight
        {
            return;
        }
        let Some(cache_id) = self.cache_id.clone() else {
            tracing::debug!("no cache id; nothing dispatched");
            return;
        };
        self.queue.set_anchor(self.last_requested);
        let Some(snapshot) = self.prepare_snapshot(graph) else {
            return;
        };
        let sequence_length = self.sequence_length(graph);
        let Some(time) = self.queue.pop_front() else {
            return;
        };

        let job = RenderJob {
            snapshot,
            time,
            params: self.params,
            cache_id,
            generation: self.generation,
            sequence_length,
        };
        let Some(worker) = self
            .workers
            .iter()
            .find(|w| w.is_idle())
            .or_else(|| self.workers.last())
        else {
            self.queue.push_front(time);
            return;
        };
        worker.mark_busy();
        if !worker.send(WorkerRequest::Render(job)) {
            tracing::warn!(worker = worker.index, "render worker is gone");
            self.queue.push_front(time);
            return;
        }
        tracing::trace!(worker = worker.index, %time, "dispatched");
        self.primary_in_flight = true;
        self.outstanding += 1;
    }

    fn dispatch_audio(&mut self, graph: &NodeGraph) {
        if !self.started || self.audio_in_flight || self.audio_queue.is_empty() {
            return;
        }
        let Some(params) = self.params.audio else {
            self.audio_queue.clear();
            return;
        };
        let Some(cache_id) = self.cache_id.clone() else {
            return;
        };
        let Some(snapshot) = self.prepare_snapshot(graph) else {
            return;
        };
        let length = self.sequence_length(graph);
        self.audio_queue
            .set_anchor(self.last_requested.floor_to(AUDIO_BLOCK));
        let Some(start) = self.audio_queue.pop_front() else {
            return;
        };

        let job = AudioJob {
            snapshot,
            index: start.div_floor(AUDIO_BLOCK),
            range: TimeRange::new(start, (start + AUDIO_BLOCK).min(length)),
            params,
            cache_id,
            generation: self.generation,
        };
        let Some(worker) = self
            .workers
            .iter()
            .find(|w| w.try_reserve())
            .or_else(|| self.workers.last())
        else {
            self.audio_queue.push_front(start);
            return;
        };
        worker.mark_busy();
        if !worker.send(WorkerRequest::RenderAudio(job)) {
            tracing::warn!(worker = worker.index, "render worker is gone");
            self.audio_queue.push_front(start);
            return;
        }
        tracing::trace!(worker = worker.index, %start, "audio block dispatched");
        self.audio_in_flight = true;
        self.outstanding += 1;
    }

    /// Handle every worker event that is ready, without blocking. Returns how many were handled.
    pub fn poll(&mut self, graph: &NodeGraph) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(graph, event);
            handled += 1;
        }
        handled
    }

    /// Block until the queue is drained and no job is outstanding.
    ///
    /// Fails when `timeout` elapses first or when queued points cannot be dispatched at all.
    pub fn run_until_idle(&mut self, graph: &NodeGraph, timeout: Duration) -> KinemaResult<()> {
        let deadline = Instant::now() + timeout;
        self.poll(graph);
        self.dispatch(graph);
        loop {
            if self.outstanding == 0 {
                if self.queue.is_empty() && self.audio_queue.is_empty() {
                    return Ok(());
                }
                self.dispatch(graph);
                if self.outstanding == 0 {
                    return Err(KinemaError::invalid_state(format!(
                        "{} cache points and {} audio blocks pending but none can be dispatched",
                        self.queue.len(),
                        self.audio_queue.len()
                    )));
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(KinemaError::invalid_state(format!(
                    "render backend still busy after {} ms ({} queued, {} in flight)",
                    timeout.as_millis(),
                    self.queue.len(),
                    self.outstanding
                )));
            }
            match self.events_rx.recv_timeout(remaining.min(POLL_SLICE)) {
                Ok(event) => {
                    self.handle_event(graph, event);
                    self.poll(graph);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(KinemaError::invalid_state("render workers disconnected"));
                }
            }
        }
    }

    /// Apply queued graph events addressed to the attached viewer.
    pub fn sync(&mut self, graph: &mut NodeGraph) {
        let Some(viewer) = self.viewer else {
            return;
        };
        for event in graph.take_events_for(viewer) {
            match event.kind {
                GraphEventKind::ChangedBetween(r) => {
                    self.invalidate(graph, r.in_point(), r.out_point());
                }
                GraphEventKind::TopologyChanged => self.recompile_queued = true,
                GraphEventKind::LengthChanged { old, new } => {
                    self.invalidate(graph, old.min(new), old.max(new));
                }
                GraphEventKind::VideoParamsChanged => {
                    self.apply_viewer_params(graph);
                    let length = self.sequence_length(graph);
                    self.invalidate(graph, Time::ZERO, length);
                }
            }
        }
    }

    fn handle_event(&mut self, graph: &NodeGraph, event: WorkerEvent) {
        match event {
            WorkerEvent::Finished(done) => {
                let length = self.sequence_length(graph);
                self.complete(done, length);
                self.dispatch(graph);
            }
            WorkerEvent::AudioFinished(done) => {
                let length = self.sequence_length(graph);
                self.complete_audio(done, length);
                self.dispatch(graph);
            }
            WorkerEvent::RequestSibling { worker, job } => {
                self.route_sibling(graph, worker, job);
            }
            WorkerEvent::InitFailed { worker, message } => {
                tracing::warn!(worker, %message, "late worker init failure");
            }
            WorkerEvent::Ready { worker } | WorkerEvent::Exited { worker } => {
                tracing::trace!(worker, "worker lifecycle event");
            }
        }
    }

    fn complete(&mut self, done: Finished, length: Time) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if !done.sibling {
            self.primary_in_flight = false;
        }
        self.settle(done, length);
        if self.outstanding == 0 {
            // Nobody is left to finish what they were waiting on.
            self.requeue_waiters();
        }
    }

    fn settle(&mut self, done: Finished, length: Time) {
        if self.cache_id.as_deref() != Some(done.cache_id.as_str()) {
            self.stats.stale_dropped += 1;
            tracing::debug!(time = %done.time, "dropping result from an old cache namespace");
            return;
        }
        if let Some(hash) = done.hash {
            match done.outcome {
                RenderOutcome::Rendered(_) | RenderOutcome::AlreadyCached(_) => {
                    self.resolve_waiters(hash, true);
                }
                RenderOutcome::Failed(_) => self.resolve_waiters(hash, false),
                RenderOutcome::InFlightElsewhere(_) => {}
            }
        }
        if self.superseded(done.time, done.generation) || done.time > length {
            self.stats.stale_dropped += 1;
            tracing::debug!(time = %done.time, "dropping result invalidated since dispatch");
            return;
        }

        let hash = match done.outcome {
            RenderOutcome::Rendered(h) => {
                self.stats.frames_rendered += 1;
                h
            }
            RenderOutcome::AlreadyCached(h) => {
                self.stats.frames_reused += 1;
                h
            }
            RenderOutcome::InFlightElsewhere(h) => {
                self.stats.frames_skipped += 1;
                self.queue.remove(done.time);
                if !self.frame_cache.has_hash(&done.cache_id, h) {
                    self.waiting
                        .entry(h)
                        .or_default()
                        .push((done.time, done.generation));
                    return;
                }
                h
            }
            RenderOutcome::Failed(message) if done.generation < self.generation => {
                // Likely interrupted by a refresh; the frame itself may be fine.
                tracing::debug!(time = %done.time, %message, "retrying frame after edit");
                self.queue.insert(done.time);
                return;
            }
            RenderOutcome::Failed(message) => {
                self.stats.frames_failed += 1;
                tracing::warn!(worker = done.worker, time = %done.time, %message, "frame not cached");
                return;
            }
        };
        if done.sibling {
            self.stats.sibling_renders += 1;
        }
        self.frame_cache.set_hash(done.time, hash);
        self.queue.remove(done.time);
    }

    fn superseded(&self, time: Time, generation: u64) -> bool {
        self.invalidated.get(&time).is_some_and(|g| *g > generation)
    }

    fn resolve_waiters(&mut self, hash: ContentHash, stored: bool) {
        let Some(waiters) = self.waiting.remove(&hash) else {
            return;
        };
        for (time, generation) in waiters {
            // Re-invalidated points are queued again already.
            if self.superseded(time, generation) {
                continue;
            }
            if stored {
                self.frame_cache.set_hash(time, hash);
                self.queue.remove(time);
            } else {
                self.queue.insert(time);
            }
        }
    }

    fn requeue_waiters(&mut self) {
        let waiting = std::mem::take(&mut self.waiting);
        for (time, _) in waiting.into_values().flatten() {
            self.queue.insert(time);
        }
    }

    fn complete_audio(&mut self, done: AudioFinished, length: Time) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.audio_in_flight = false;
        self.settle_audio(done, length);
        if self.outstanding == 0 {
            self.requeue_waiters();
        }
    }

    fn settle_audio(&mut self, done: AudioFinished, length: Time) {
        let superseded = self
            .audio_invalidated
            .get(&done.index)
            .is_some_and(|g| *g > done.generation);
        if self.cache_id.as_deref() != Some(done.cache_id.as_str())
            || superseded
            || Time::from_secs(done.index) >= length
        {
            self.stats.stale_dropped += 1;
            tracing::debug!(index = done.index, "dropping stale audio block");
            return;
        }
        match done.result {
            Ok(()) => {
                self.stats.audio_blocks_rendered += 1;
                self.frame_cache.set_audio_ready(done.index);
            }
            Err(message) if done.generation < self.generation => {
                tracing::debug!(index = done.index, %message, "retrying audio block after edit");
                self.audio_queue.insert(Time::from_secs(done.index));
            }
            Err(message) => {
                self.stats.audio_blocks_failed += 1;
                tracing::warn!(worker = done.worker, index = done.index, %message, "audio block not cached");
            }
        }
    }

    fn route_sibling(&mut self, graph: &NodeGraph, from: usize, mut job: RenderJob) {
        if !self.started
            || self.recompile_queued
            || self.cache_id.as_deref() != Some(job.cache_id.as_str())
            || !self.queue.contains(job.time)
        {
            return;
        }
        match &self.compiled {
            Some(current) if Arc::ptr_eq(current, &job.snapshot) => {}
            _ => return,
        }
        let Some(worker) = self.workers.iter().find(|w| w.try_reserve()) else {
            tracing::trace!(from, "no idle worker for sibling");
            return;
        };
        // Edits made since the primary was dispatched.
        if let Some(range) = self.pending_update.take() {
            job.snapshot.refresh(graph, range);
        }
        // Judged against invalidations after now, not after its primary was dispatched.
        job.generation = self.generation;
        let (index, time) = (worker.index, job.time);
        if worker.send(WorkerRequest::RenderAsSibling(job)) {
            tracing::trace!(from, worker = index, %time, "sibling dispatched");
            self.outstanding += 1;
        }
    }

    fn sequence_length(&self, graph: &NodeGraph) -> Time {
        self.viewer
            .map(|v| viewer::sequence_length(graph, v))
            .unwrap_or(Time::ZERO)
    }

    fn has_audio(&self, graph: &NodeGraph) -> bool {
        self.viewer.is_some_and(|v| viewer::has_audio(graph, v))
    }

    /// Return `true` between a successful `init` and `close`.
    pub fn is_initialized(&self) -> bool {
        self.started
    }

    /// Message of the last setup or shutdown failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Number of running workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Attached viewer.
    pub fn viewer_node(&self) -> Option<NodeId> {
        self.viewer
    }

    /// Return `true` while a snapshot is held.
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Current render params.
    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    /// Current cache namespace.
    pub fn cache_id(&self) -> Option<&str> {
        self.cache_id.as_deref()
    }

    /// Shared frame cache.
    pub fn frame_cache(&self) -> &Arc<FrameCache> {
        &self.frame_cache
    }

    /// Pending cache points.
    pub fn queue(&self) -> &CacheQueue {
        &self.queue
    }

    /// Pending audio blocks, by block start.
    pub fn audio_queue(&self) -> &CacheQueue {
        &self.audio_queue
    }

    /// Last time passed to [`RenderBackend::request_frame`].
    pub fn last_requested(&self) -> Time {
        self.last_requested
    }

    /// Completion counters.
    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    /// Configuration this backend was built with.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

impl Drop for RenderBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "render backend did not shut down cleanly");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/backend.rs"]
mod tests;
