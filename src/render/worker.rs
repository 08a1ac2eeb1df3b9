use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::cache::FrameCache;
use crate::compile::{CompiledGraph, ContentHash, ROOT, content_hash};
use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::{Time, TimeRange};
use crate::graph::{AudioContext, EvalContext, ImageBuffer, Value};
use crate::render::params::{AudioParams, RenderParams};
use crate::render::priority::lower_current_thread_priority;

/// One frame to produce, with everything needed to do it off the coordinating thread.
#[derive(Clone, Debug)]
pub(crate) struct RenderJob {
    pub(crate) snapshot: Arc<CompiledGraph>,
    pub(crate) time: Time,
    pub(crate) params: RenderParams,
    pub(crate) cache_id: String,
    pub(crate) generation: u64,
    pub(crate) sequence_length: Time,
}

impl RenderJob {
    fn at(&self, time: Time) -> Self {
        Self {
            time,
            ..self.clone()
        }
    }
}

/// One audio block to produce.
#[derive(Clone, Debug)]
pub(crate) struct AudioJob {
    pub(crate) snapshot: Arc<CompiledGraph>,
    pub(crate) index: i64,
    pub(crate) range: TimeRange,
    pub(crate) params: AudioParams,
    pub(crate) cache_id: String,
    pub(crate) generation: u64,
}

#[derive(Debug)]
pub(crate) enum WorkerRequest {
    Render(RenderJob),
    RenderAsSibling(RenderJob),
    RenderAudio(AudioJob),
    SetParams(RenderParams),
    Shutdown,
}

/// How a render request ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Frame evaluated and written to the cache.
    Rendered(ContentHash),
    /// Identical content was already on disk.
    AlreadyCached(ContentHash),
    /// Another worker is producing identical content right now.
    InFlightElsewhere(ContentHash),
    /// Hashing, evaluation or writing failed.
    Failed(String),
}

#[derive(Debug)]
pub(crate) struct Finished {
    pub(crate) worker: usize,
    pub(crate) sibling: bool,
    pub(crate) time: Time,
    pub(crate) cache_id: String,
    pub(crate) generation: u64,
    // Content hash of the frame, when hashing got that far.
    pub(crate) hash: Option<ContentHash>,
    pub(crate) outcome: RenderOutcome,
}

#[derive(Debug)]
pub(crate) struct AudioFinished {
    pub(crate) worker: usize,
    pub(crate) index: i64,
    pub(crate) cache_id: String,
    pub(crate) generation: u64,
    pub(crate) result: Result<(), String>,
}

#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Ready { worker: usize },
    InitFailed { worker: usize, message: String },
    RequestSibling { worker: usize, job: RenderJob },
    Finished(Finished),
    AudioFinished(AudioFinished),
    Exited { worker: usize },
}

/// Coordinator-side handle of one worker thread.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub(crate) index: usize,
    tx: Sender<WorkerRequest>,
    idle: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn spawn(
        index: usize,
        cache: Arc<FrameCache>,
        params: RenderParams,
        events: Sender<WorkerEvent>,
    ) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let idle = Arc::new(AtomicBool::new(true));
        let worker = RenderWorker {
            index,
            cache,
            params,
            events,
            idle: Arc::clone(&idle),
            download: Vec::new(),
        };
        let thread = thread::Builder::new()
            .name(format!("kinema-render-{index}"))
            .spawn(move || worker.run(rx))?;
        Ok(Self {
            index,
            tx,
            idle,
            thread: Some(thread),
        })
    }

    /// Queue a request; `false` when the thread is gone.
    pub(crate) fn send(&self, req: WorkerRequest) -> bool {
        self.tx.send(req).is_ok()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    /// Atomically take an idle worker.
    pub(crate) fn try_reserve(&self) -> bool {
        self.idle
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_busy(&self) {
        self.idle.store(false, Ordering::Release);
    }

    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            tracing::warn!(worker = self.index, "render worker panicked");
        }
    }

    /// Give up on the thread without joining it.
    pub(crate) fn detach(&mut self) {
        self.thread.take();
    }
}

struct RenderWorker {
    index: usize,
    cache: Arc<FrameCache>,
    params: RenderParams,
    events: Sender<WorkerEvent>,
    idle: Arc<AtomicBool>,
    download: Vec<u8>,
}

impl RenderWorker {
    fn init(&mut self) -> Result<(), String> {
        if !lower_current_thread_priority() {
            tracing::debug!(worker = self.index, "render worker keeps default priority");
        }
        self.download
            .try_reserve_exact(self.params.buffer_size())
            .map_err(|e| format!("cannot allocate download buffer: {e}"))
    }

    fn run(mut self, rx: Receiver<WorkerRequest>) {
        let worker = self.index;
        let _ = match self.init() {
            Ok(()) => self.events.send(WorkerEvent::Ready { worker }),
            Err(message) => self.events.send(WorkerEvent::InitFailed { worker, message }),
        };

        while let Ok(req) = rx.recv() {
            match req {
                WorkerRequest::Render(job) => self.render(job, false),
                WorkerRequest::RenderAsSibling(job) => self.render(job, true),
                WorkerRequest::RenderAudio(job) => self.render_audio(job),
                WorkerRequest::SetParams(params) => {
                    self.params = params;
                    self.download.clear();
                    if let Err(e) = self.download.try_reserve_exact(params.buffer_size()) {
                        tracing::warn!(worker, error = %e, "cannot grow download buffer");
                    }
                }
                WorkerRequest::Shutdown => break,
            }
        }
        let _ = self.events.send(WorkerEvent::Exited { worker });
    }

    fn render(&mut self, job: RenderJob, sibling: bool) {
        self.idle.store(false, Ordering::Release);

        if !sibling {
            let next = job.time + job.params.time_base;
            if next <= job.sequence_length {
                let _ = self.events.send(WorkerEvent::RequestSibling {
                    worker: self.index,
                    job: job.at(next),
                });
            }
        }

        let (hash, outcome) = self.produce(&job);
        let _ = self.events.send(WorkerEvent::Finished(Finished {
            worker: self.index,
            sibling,
            time: job.time,
            cache_id: job.cache_id,
            generation: job.generation,
            hash,
            outcome,
        }));
        // Flip only after the event is queued so "all idle" implies "all reported".
        self.idle.store(true, Ordering::Release);
    }

    #[tracing::instrument(skip(self, job), fields(worker = self.index, time = %job.time))]
    fn produce(&mut self, job: &RenderJob) -> (Option<ContentHash>, RenderOutcome) {
        let epoch = job.snapshot.epoch();
        let hash = match content_hash(&job.snapshot, ROOT, job.time) {
            Ok(h) => h,
            Err(e) => return (None, RenderOutcome::Failed(e.to_string())),
        };
        if !job.snapshot.unchanged_at(epoch, job.time) {
            return (
                None,
                RenderOutcome::Failed("node values changed while hashing".into()),
            );
        }
        if self.cache.has_hash(&job.cache_id, hash) {
            return (Some(hash), RenderOutcome::AlreadyCached(hash));
        }
        if !self.cache.try_claim(&job.cache_id, hash) {
            return (Some(hash), RenderOutcome::InFlightElsewhere(hash));
        }
        // Another worker may have finished between the lookup and the claim.
        if self.cache.has_hash(&job.cache_id, hash) {
            self.cache.release(&job.cache_id, hash);
            return (Some(hash), RenderOutcome::AlreadyCached(hash));
        }

        let result = self.render_and_store(job, hash, epoch);
        self.cache.release(&job.cache_id, hash);
        let outcome = match result {
            Ok(()) => RenderOutcome::Rendered(hash),
            Err(e) => {
                tracing::warn!(error = %e, "frame render failed");
                RenderOutcome::Failed(e.to_string())
            }
        };
        (Some(hash), outcome)
    }

    fn render_and_store(
        &mut self,
        job: &RenderJob,
        hash: ContentHash,
        epoch: u64,
    ) -> KinemaResult<()> {
        let p = &job.params;
        let ctx = EvalContext {
            time: job.time,
            width: p.effective_width(),
            height: p.effective_height(),
        };
        let value = job.snapshot.evaluate(ROOT, &ctx)?;
        if !job.snapshot.unchanged_at(epoch, job.time) {
            return Err(KinemaError::evaluation("node values changed while rendering"));
        }

        self.download.clear();
        match value {
            Value::Image(img) => {
                if img.width() != ctx.width || img.height() != ctx.height {
                    return Err(KinemaError::evaluation(format!(
                        "viewer produced {}x{}, expected {}x{}",
                        img.width(),
                        img.height(),
                        ctx.width,
                        ctx.height
                    )));
                }
                p.format.encode(&img, &mut self.download);
            }
            Value::None => {
                let blank = ImageBuffer::transparent(ctx.width, ctx.height);
                p.format.encode(&blank, &mut self.download);
            }
            other => {
                return Err(KinemaError::evaluation(format!(
                    "viewer produced a non-image value ({:?})",
                    other.kind()
                )));
            }
        }

        self.cache
            .write_frame(&job.cache_id, hash, &self.download)?;
        Ok(())
    }

    fn render_audio(&mut self, job: AudioJob) {
        self.idle.store(false, Ordering::Release);
        let result = self.produce_audio(&job).map_err(|e| {
            tracing::warn!(worker = self.index, index = job.index, error = %e, "audio block failed");
            e.to_string()
        });
        let _ = self.events.send(WorkerEvent::AudioFinished(AudioFinished {
            worker: self.index,
            index: job.index,
            cache_id: job.cache_id,
            generation: job.generation,
            result,
        }));
        self.idle.store(true, Ordering::Release);
    }

    #[tracing::instrument(skip(self, job), fields(worker = self.index, range = %job.range))]
    fn produce_audio(&mut self, job: &AudioJob) -> KinemaResult<()> {
        let epoch = job.snapshot.epoch();
        let ctx = AudioContext {
            range: job.range,
            sample_rate: job.params.sample_rate,
            channels: job.params.channels(),
        };
        let value = job.snapshot.evaluate_audio(ROOT, &ctx)?;
        if !job.snapshot.unchanged_over(epoch, job.range) {
            return Err(KinemaError::evaluation(
                "node values changed while rendering audio",
            ));
        }

        let expected = ctx.frames() * usize::from(ctx.channels);
        self.download.clear();
        match value {
            Value::Samples(buf) => {
                if buf.channels() != ctx.channels || buf.data().len() != expected {
                    return Err(KinemaError::evaluation(format!(
                        "viewer produced {} samples on {} channels, expected {expected} on {}",
                        buf.data().len(),
                        buf.channels(),
                        ctx.channels
                    )));
                }
                for s in buf.data() {
                    self.download.extend_from_slice(&s.to_le_bytes());
                }
            }
            Value::None => self.download.resize(expected * 4, 0),
            other => {
                return Err(KinemaError::evaluation(format!(
                    "viewer produced non-audio value ({:?})",
                    other.kind()
                )));
            }
        }

        self.cache
            .write_audio(&job.cache_id, job.index, &self.download)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/worker.rs"]
mod tests;
