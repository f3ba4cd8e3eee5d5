//! The conversion task orchestrator: one job, driven end to end.
//!
//! ## Lifecycle
//!
//! ```text
//! select_file ──▶ start(config) ──┬─▶ upload ──▶ convert ──▶ [poll loop + tick loop] ──▶ completed ──▶ result fetch
//!                                 │                              │
//!                                 └── error: back to             └─▶ failed (server error or
//!                                     fileSelected                       transport error)
//! reset() ──▶ idle   (timers cancelled first)
//! ```
//!
//! ## Concurrency
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Two [`RepeatingTimer`]s drive polling and the elapsed-time clock;
//! each callback captures only a `Weak` reference and checks its timer
//! generation under the state lock before touching anything, so a callback
//! that fires after cancellation is a no-op. Entering `completed`, `failed`
//! or `idle` cancels both timers before any other field changes.
//!
//! Observers are notified after the lock is released, and every mutation
//! publishes a fresh [`TaskSnapshot`] on a watch channel.

mod file;
mod phase;
mod state;
mod timer;

pub use file::{format_file_size, FileSource, SelectedFile};
pub use phase::Phase;
pub use state::{ConversionResult, TaskSnapshot};
pub use timer::{RepeatingTimer, TimerGuard};

use crate::config::ClientConfig;
use crate::error::{ClientError, ConfigError};
use crate::job_config::shape::to_wire;
use crate::job_config::validate::ConfigValidator;
use crate::job_config::ConfigModel;
use crate::progress::{NoopObserver, SharedObserver};
use crate::service::{Artifact, ArtifactKind, ConversionService, HttpConversionService, ProgressReport};
use crate::stream::{snapshot_stream, SnapshotStream};
use state::{Notice, TaskState};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Something an observer should hear about, collected under the lock and
/// dispatched after it is released.
enum Event {
    Phase(Phase, Phase),
    Progress(u8),
    Tick(Duration),
    Notice(String),
    Result(ConversionResult),
}

struct Inner {
    service: Arc<dyn ConversionService>,
    config: ClientConfig,
    observer: SharedObserver,
    state: Mutex<TaskState>,
    poll_timer: RepeatingTimer,
    tick_timer: RepeatingTimer,
    snapshots: watch::Sender<TaskSnapshot>,
}

/// Drives one conversion task through upload, convert, poll and result.
///
/// Cheap to clone; clones share the same task.
#[derive(Clone)]
pub struct TaskOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOrchestrator")
            .field("config", &self.inner.config)
            .field("state", &*self.inner.lock())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, state: &mut TaskState, to: Phase, events: &mut Vec<Event>) {
        let from = state.phase;
        if from == to {
            state.notice = None;
            return;
        }
        if !from.can_transition_to(to) {
            warn!("Unexpected phase change {from} -> {to}");
        }
        info!("Task phase: {from} -> {to}");
        state.phase = to;
        state.notice = None;
        events.push(Event::Phase(from, to));
    }

    fn raise(&self, state: &mut TaskState, message: String, events: &mut Vec<Event>) {
        state.notice_seq += 1;
        state.notice = Some(Notice {
            seq: state.notice_seq,
            message: message.clone(),
            raised_at: Instant::now(),
        });
        events.push(Event::Notice(message));
    }

    /// Stop both loops, freeze the clock, then enter `to`.
    fn finish(&self, state: &mut TaskState, to: Phase, events: &mut Vec<Event>) {
        self.poll_timer.cancel();
        self.tick_timer.cancel();
        if state.clock.freeze(Instant::now()) {
            debug!("Elapsed time frozen at {:?}", state.clock.elapsed());
        }
        self.transition(state, to, events);
    }

    fn dispatch(&self, events: Vec<Event>) {
        for event in events {
            match event {
                Event::Phase(from, to) => self.observer.on_phase_change(from, to),
                Event::Progress(p) => self.observer.on_progress(p),
                Event::Tick(d) => self.observer.on_tick(d),
                Event::Notice(m) => self.observer.on_notice(&m),
                Event::Result(r) => self.observer.on_result(&r),
            }
        }
    }
}

impl TaskOrchestrator {
    pub fn new(service: Arc<dyn ConversionService>, config: ClientConfig) -> Self {
        Self::with_observer(service, config, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        service: Arc<dyn ConversionService>,
        config: ClientConfig,
        observer: SharedObserver,
    ) -> Self {
        let (snapshots, _) = watch::channel(TaskSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                service,
                config,
                observer,
                state: Mutex::new(TaskState::default()),
                poll_timer: RepeatingTimer::new("poll"),
                tick_timer: RepeatingTimer::new("tick"),
                snapshots,
            }),
        }
    }

    /// An orchestrator talking to the service over HTTP.
    pub fn http(config: ClientConfig, observer: SharedObserver) -> Result<Self, ClientError> {
        let service = Arc::new(HttpConversionService::new(&config)?);
        Ok(Self::with_observer(service, config, observer))
    }

    pub fn service(&self) -> Arc<dyn ConversionService> {
        Arc::clone(&self.inner.service)
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Run `f` under the state lock, then publish a snapshot, schedule the
    /// expiry of any newly raised notice, and notify the observer.
    fn mutate<R>(&self, f: impl FnOnce(&Inner, &mut TaskState, &mut Vec<Event>) -> R) -> R {
        let mut events = Vec::new();
        let (out, snapshot, new_notice) = {
            let mut state = self.inner.lock();
            let seq_before = state.notice_seq;
            let out = f(&self.inner, &mut *state, &mut events);
            let snapshot = state.snapshot(Instant::now(), self.inner.config.notice_ttl);
            let new_notice = (state.notice_seq != seq_before).then_some(state.notice_seq);
            (out, snapshot, new_notice)
        };
        self.inner.snapshots.send_replace(snapshot);
        if let Some(seq) = new_notice {
            self.schedule_notice_expiry(seq);
        }
        self.inner.dispatch(events);
        out
    }

    fn schedule_notice_expiry(&self, seq: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let ttl = self.inner.config.notice_ttl;
        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                TaskOrchestrator { inner }.mutate(|_, state, _| {
                    if state.notice.as_ref().is_some_and(|n| n.seq == seq) {
                        state.notice = None;
                    }
                });
            }
        });
    }

    /// Surface `err` as a notice and hand it back.
    fn surface(&self, err: ClientError) -> ClientError {
        let message = err.to_string();
        self.mutate(|inner, state, events| inner.raise(state, message, events));
        err
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> TaskSnapshot {
        self.inner
            .lock()
            .snapshot(Instant::now(), self.inner.config.notice_ttl)
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    pub fn task_id(&self) -> Option<String> {
        self.inner.lock().task_id.clone()
    }

    /// The configuration the current task was started with.
    pub fn task_config(&self) -> Option<ConfigModel> {
        self.inner.lock().config.clone()
    }

    /// True while the progress poll loop exists.
    pub fn is_polling(&self) -> bool {
        self.inner.poll_timer.is_running()
    }

    /// True while the elapsed-time clock loop exists.
    pub fn is_ticking(&self) -> bool {
        self.inner.tick_timer.is_running()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Every published snapshot, starting with the latest.
    pub fn snapshots(&self) -> SnapshotStream {
        snapshot_stream(self.subscribe())
    }

    /// Wait until the task has failed, or completed with its result fetch
    /// finished, and return that snapshot.
    ///
    /// Fails immediately if no conversion has been started, and as soon as
    /// the task is reset or sent back to `fileSelected` while waiting.
    pub async fn wait_until_settled(&self) -> Result<TaskSnapshot, ClientError> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| {
                s.is_settled() || matches!(s.phase, Phase::Idle | Phase::FileSelected)
            })
            .await
            .map_err(|_| ClientError::Internal("snapshot channel closed".into()))?
            .clone();
        if snapshot.is_settled() {
            Ok(snapshot)
        } else {
            Err(ClientError::InvalidTransition {
                operation: "wait for a result",
                phase: snapshot.phase,
            })
        }
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// Choose the file to convert.
    ///
    /// Allowed before upload. A file that fails the acceptance rule leaves
    /// the phase unchanged and raises a notice. Choosing a different file
    /// discards the previous task.
    pub fn select_file(&self, file: SelectedFile) -> Result<(), ClientError> {
        let max = self.inner.config.max_file_size;
        self.mutate(|inner, state, events| {
            if !matches!(state.phase, Phase::Idle | Phase::FileSelected) {
                return Err(ClientError::InvalidTransition {
                    operation: "select a file",
                    phase: state.phase,
                });
            }
            if let Err(e) = file.accept(max) {
                inner.raise(state, e.to_string(), events);
                return Err(e);
            }
            if state.phase == Phase::FileSelected {
                state.clear();
                state.phase = Phase::FileSelected;
            }
            info!("Selected {} ({})", file.name, format_file_size(file.size));
            state.file = Some(file);
            inner.transition(state, Phase::FileSelected, events);
            Ok(())
        })
    }

    /// Read `path` from disk and select it.
    pub async fn select_path(&self, path: impl AsRef<std::path::Path>) -> Result<(), ClientError> {
        match SelectedFile::from_path(path).await {
            Ok(file) => self.select_file(file),
            Err(e) => Err(self.surface(e)),
        }
    }

    /// Upload the selected file and start converting it with `config`.
    ///
    /// Returns once the service has accepted the conversion and polling has
    /// begun, or with the error that sent the task back to `fileSelected`.
    /// `None` means no mode was chosen.
    pub async fn start(&self, config: Option<&ConfigModel>) -> Result<(), ClientError> {
        // ── Preconditions ────────────────────────────────────────────────
        let (epoch, phase) = {
            let s = self.inner.lock();
            (s.epoch, s.phase)
        };
        if phase != Phase::FileSelected {
            return Err(ClientError::InvalidTransition {
                operation: "start a conversion",
                phase,
            });
        }
        let Some(config) = config else {
            return Err(self.surface(ClientError::NoModeSelected));
        };
        let config = config
            .clone()
            .checked()
            .map_err(|e| self.surface(ClientError::Config(e)))?;

        if self.inner.config.validate_remotely {
            let validator =
                ConfigValidator::new(self.service(), self.inner.config.wire_shape);
            let verdict = validator.validate(&config).await.map_err(|e| self.surface(e))?;
            verdict
                .into_result()
                .map_err(|e: ConfigError| self.surface(ClientError::Config(e)))?;
        }

        // ── Upload ───────────────────────────────────────────────────────
        let file = self.mutate(|inner, state, events| {
            if state.epoch != epoch || state.phase != Phase::FileSelected {
                return Err(ClientError::InvalidTransition {
                    operation: "start a conversion",
                    phase: state.phase,
                });
            }
            let file = state.file.clone().ok_or_else(|| {
                ClientError::Internal("file selected but no file recorded".into())
            })?;
            state.config = Some(config.clone());
            inner.transition(state, Phase::Uploading, events);
            Ok(file)
        })?;
        let guard = StartGuard::new(self, epoch);

        let task_id = match self.inner.service.upload(&file).await {
            Ok(id) => id,
            Err(e) => {
                guard.fail(e.to_string());
                return Err(e);
            }
        };

        // ── Convert ──────────────────────────────────────────────────────
        let current = self.mutate(|inner, state, events| {
            if state.epoch != epoch {
                return false;
            }
            state.task_id = Some(task_id.clone());
            inner.transition(state, Phase::Uploaded, events);
            inner.transition(state, Phase::Converting, events);
            true
        });
        if !current {
            guard.disarm();
            return Err(task_was_reset());
        }

        let wire = to_wire(&config, self.inner.config.wire_shape);
        match self.inner.service.convert(&task_id, &wire).await {
            Ok(ack) => {
                if let Some(shape) = ack.shape {
                    debug!("Service read the configuration as {shape} shape");
                }
            }
            Err(e) => {
                guard.fail(e.to_string());
                return Err(e);
            }
        }

        // ── Poll ─────────────────────────────────────────────────────────
        let current = self.mutate(|inner, state, events| {
            if state.epoch != epoch {
                return false;
            }
            state.progress = 0;
            state.clock.begin(Instant::now());
            inner.transition(state, Phase::Polling, events);
            true
        });
        guard.disarm();
        if !current {
            return Err(task_was_reset());
        }
        self.start_loops();
        Ok(())
    }

    /// Restart the poll and tick loops of a polling task.
    ///
    /// Any running loops are cancelled first, so at most one of each exists.
    pub fn restart_polling(&self) -> Result<(), ClientError> {
        let phase = self.phase();
        if phase != Phase::Polling {
            return Err(ClientError::InvalidTransition {
                operation: "poll",
                phase,
            });
        }
        self.start_loops();
        Ok(())
    }

    fn start_loops(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .poll_timer
            .start(self.inner.config.poll_interval, move |guard| {
                let weak: Weak<Inner> = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => TaskOrchestrator { inner }.poll_once(guard).await,
                        None => ControlFlow::Break(()),
                    }
                }
            });

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .tick_timer
            .start(self.inner.config.tick_interval, move |guard| {
                let flow = match weak.upgrade() {
                    Some(inner) => TaskOrchestrator { inner }.tick_once(&guard),
                    None => ControlFlow::Break(()),
                };
                futures::future::ready(flow)
            });
    }

    fn tick_once(&self, guard: &TimerGuard) -> ControlFlow<()> {
        self.mutate(|_, state, events| {
            if !guard.is_current() || state.phase != Phase::Polling {
                return ControlFlow::Break(());
            }
            state.clock.tick(Instant::now());
            events.push(Event::Tick(state.clock.elapsed()));
            ControlFlow::Continue(())
        })
    }

    async fn poll_once(&self, guard: TimerGuard) -> ControlFlow<()> {
        let task_id = {
            let s = self.inner.lock();
            if !guard.is_current() || s.phase != Phase::Polling {
                return ControlFlow::Break(());
            }
            match &s.task_id {
                Some(id) => id.clone(),
                None => return ControlFlow::Break(()),
            }
        };
        let outcome = self.inner.service.progress(&task_id).await;
        self.apply_poll(&guard, outcome)
    }

    /// Fold one poll outcome into the task.
    fn apply_poll(
        &self,
        guard: &TimerGuard,
        outcome: Result<ProgressReport, ClientError>,
    ) -> ControlFlow<()> {
        use crate::service::JobStatus;

        let fetch = self.mutate(|inner, state, events| {
            if !guard.is_current() || state.phase != Phase::Polling {
                debug!("Discarding stale poll (generation {})", guard.generation());
                return None;
            }
            match outcome {
                Ok(report) => {
                    let percent = report.percent();
                    if percent > state.progress {
                        state.progress = percent;
                        events.push(Event::Progress(percent));
                    } else if percent < state.progress {
                        debug!("Ignoring progress regression {percent} < {}", state.progress);
                    }
                    match report.status {
                        JobStatus::Running | JobStatus::Unknown => None,
                        JobStatus::Completed => {
                            inner.finish(state, Phase::Completed, events);
                            state.fetching_result = true;
                            state.task_id.clone().map(|id| (state.epoch, id))
                        }
                        JobStatus::Failed => {
                            let message = report
                                .error
                                .filter(|e| !e.trim().is_empty())
                                .unwrap_or_else(|| "Conversion failed".into());
                            inner.finish(state, Phase::Failed, events);
                            state.failure = Some(message.clone());
                            inner.raise(state, message, events);
                            None
                        }
                    }
                }
                Err(e) => {
                    warn!("Progress poll failed: {e}");
                    let message = e.to_string();
                    inner.finish(state, Phase::Failed, events);
                    state.failure = Some(message.clone());
                    inner.raise(state, message, events);
                    None
                }
            }
        });

        if let Some((epoch, task_id)) = fetch {
            let this = self.clone();
            tokio::spawn(async move { this.fetch_result(epoch, task_id).await });
        }

        if self.phase() == Phase::Polling && guard.is_current() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    async fn fetch_result(&self, epoch: u64, task_id: String) {
        let outcome = self.inner.service.result(&task_id).await;
        self.mutate(|inner, state, events| {
            if state.epoch != epoch || state.phase != Phase::Completed {
                debug!("Discarding result of a task that is gone");
                return;
            }
            state.fetching_result = false;
            match outcome {
                Ok(response) => {
                    let result = ConversionResult::from(response);
                    info!(
                        "Result fetched: {} chars, {} images",
                        result.content.len(),
                        result.image_count
                    );
                    state.result = Some(result.clone());
                    events.push(Event::Result(result));
                }
                Err(e) => {
                    warn!("Result fetch failed: {e}");
                    inner.raise(state, e.to_string(), events);
                }
            }
        });
    }

    /// Start a new conversion: stop the loops and clear every task field.
    ///
    /// Allowed in every phase. A `start` still waiting on its upload or
    /// convert call sees the new epoch when the call returns and gives up
    /// without touching the task.
    pub fn reset(&self) -> Result<(), ClientError> {
        self.mutate(|inner, state, events| {
            inner.poll_timer.cancel();
            inner.tick_timer.cancel();
            let from = state.phase;
            state.clear();
            if from != Phase::Idle {
                info!("Task phase: {from} -> {}", Phase::Idle);
                events.push(Event::Phase(from, Phase::Idle));
            }
            Ok(())
        })
    }

    /// Dismiss the current notice.
    pub fn clear_notice(&self) {
        self.mutate(|_, state, _| state.notice = None);
    }

    // ── Artifacts ────────────────────────────────────────────────────────

    /// Download the Markdown document of a completed task.
    pub async fn download_markdown(&self) -> Result<Artifact, ClientError> {
        self.download(ArtifactKind::Markdown).await
    }

    /// Download the image archive of a completed task that has images.
    pub async fn download_images(&self) -> Result<Artifact, ClientError> {
        self.download(ArtifactKind::Images).await
    }

    async fn download(&self, kind: ArtifactKind) -> Result<Artifact, ClientError> {
        let task_id = {
            let s = self.inner.lock();
            let task_id = match (&s.task_id, s.phase) {
                (Some(id), Phase::Completed) => id.clone(),
                (_, phase) => {
                    return Err(ClientError::InvalidTransition {
                        operation: "download",
                        phase,
                    })
                }
            };
            if kind == ArtifactKind::Images
                && !s.result.as_ref().is_some_and(ConversionResult::images_available)
            {
                return Err(ClientError::DownloadFailed {
                    task_id,
                    artifact: kind.label(),
                    reason: "the conversion produced no images".into(),
                });
            }
            task_id
        };
        self.inner
            .service
            .download(&task_id, kind)
            .await
            .map_err(|e| self.surface(e))
    }
}

fn task_was_reset() -> ClientError {
    info!("Task was reset while starting; dropping the late reply");
    ClientError::Internal("task was reset".into())
}

/// Sends an abandoned `start` back to `fileSelected`.
///
/// Armed from the moment the upload begins. Dropping it armed (the `start`
/// future was dropped mid-call, or a call failed) reverts the task, unless a
/// reset has moved it to a new epoch in the meantime.
struct StartGuard<'a> {
    task: &'a TaskOrchestrator,
    epoch: u64,
    armed: bool,
}

impl<'a> StartGuard<'a> {
    fn new(task: &'a TaskOrchestrator, epoch: u64) -> Self {
        Self {
            task,
            epoch,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// Revert with `message` as the notice.
    fn fail(mut self, message: String) {
        self.armed = false;
        self.revert(message);
    }

    fn revert(&self, message: String) {
        let epoch = self.epoch;
        self.task.mutate(|inner, state, events| {
            if state.epoch != epoch || !state.phase.is_starting() {
                return;
            }
            state.task_id = None;
            state.config = None;
            inner.transition(state, Phase::FileSelected, events);
            inner.raise(state, message, events);
        });
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Conversion start abandoned before polling began");
            self.revert("Conversion start was cancelled".into());
        }
    }
}
