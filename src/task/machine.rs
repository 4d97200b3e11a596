//! The task actor.
//!
//! Owns at most one [`ActiveTask`]. Long I/O (download, zip and upload) runs in
//! spawned jobs which report back through the event channel tagged with the
//! attempt that started them; a result for any other attempt is stale and
//! dropped. Decoder callbacks act on whichever task is in flight, in any busy
//! state. A keyword that arrives while the input is still staging is replayed
//! once staging completes. Statuses naming the file of a task that already
//! finished are dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handle::{
    AgentHandle, ErrorCallback, MachineSnapshot, RetryOutcome, StatusCallback, TaskEvent, deliver,
};
use super::model::{FailureReason, Task, TaskId};
use super::state::{ActiveTask, EarlySignal, TaskState};
use super::watchdog::Watchdog;
use crate::controller::Controller;
use crate::error::{PackageError, StagingError};
use crate::package::Packager;
use crate::staging::layout::{file_stem, is_supported};
use crate::staging::{StagedArtifact, StagingPipeline};

const EVENT_QUEUE_CAPACITY: usize = 64;
/// How many finished tasks' file stems are remembered for stale statuses.
const RETIRED_STEMS: usize = 8;

pub struct TaskMachine {
    controller: Arc<dyn Controller>,
    staging: StagingPipeline,
    packager: Arc<Packager>,
    decoder_start_timeout: Duration,
    rx: mpsc::Receiver<TaskEvent>,
    events: mpsc::WeakSender<TaskEvent>,
    active: Option<ActiveTask>,
    polling: bool,
    next_attempt: u64,
    watchdog: Watchdog,
    /// Staging or packaging job of the active task.
    io_job: Option<JoinHandle<()>>,
    retired_stems: VecDeque<String>,
    stop_waiters: Vec<oneshot::Sender<()>>,
}

impl TaskMachine {
    pub fn new(
        controller: Arc<dyn Controller>,
        staging: StagingPipeline,
        packager: Arc<Packager>,
        decoder_start_timeout: Duration,
    ) -> (Self, AgentHandle) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let machine = Self {
            controller,
            staging,
            packager,
            decoder_start_timeout,
            rx,
            events: tx.downgrade(),
            active: None,
            polling: true,
            next_attempt: 0,
            watchdog: Watchdog::default(),
            io_job: None,
            retired_stems: VecDeque::with_capacity(RETIRED_STEMS),
            stop_waiters: Vec::new(),
        };
        (machine, AgentHandle::new(tx))
    }

    /// Start the actor on the runtime.
    pub fn spawn(
        controller: Arc<dyn Controller>,
        staging: StagingPipeline,
        packager: Arc<Packager>,
        decoder_start_timeout: Duration,
    ) -> AgentHandle {
        let (machine, handle) = Self::new(controller, staging, packager, decoder_start_timeout);
        tokio::spawn(machine.run());
        handle
    }

    /// Process events until every [`AgentHandle`] is dropped.
    pub async fn run(mut self) {
        info!("Task machine started");
        while let Some(event) = self.rx.recv().await {
            self.handle_event(event).await;
        }
        self.watchdog.cancel();
        info!("Task machine stopped");
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            state: self.state(),
            task_id: self.active.as_ref().map(|a| a.task.task_id.to_string()),
            busy: self.active.is_some(),
            polling: self.polling,
            current_filename: self.active.as_ref().map(|a| a.current_filename.clone()),
        }
    }

    fn state(&self) -> TaskState {
        self.active.as_ref().map_or(TaskState::Idle, |a| a.state)
    }

    async fn handle_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Poll => self.poll().await,
            TaskEvent::StagingFinished { attempt, result } => {
                self.on_staging_finished(attempt, result).await
            }
            TaskEvent::WatchdogExpired { attempt } => self.on_watchdog_expired(attempt).await,
            TaskEvent::DecoderStatus(callback) => self.on_decoder_status(callback).await,
            TaskEvent::DecoderError(callback) => self.on_decoder_error(callback).await,
            TaskEvent::PackagingFinished { attempt, result } => {
                self.on_packaging_finished(attempt, result).await
            }
            TaskEvent::Stop { done } => self.on_stop(done),
            TaskEvent::Retry { reply } => self.on_retry(reply).await,
            TaskEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn poll(&mut self) {
        if !self.polling || self.active.is_some() {
            return;
        }

        match self.controller.reserve().await {
            Ok(Some(task)) => self.admit(task).await,
            Ok(None) => debug!("No task available"),
            Err(e) => {
                error!(error = %e, "Failed to reserve task");
                self.send_failure(None, &FailureReason::PollingTaskError)
                    .await;
            }
        }
    }

    async fn admit(&mut self, task: Task) {
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        info!(
            task_id = %task.task_id,
            filename = %task.filename,
            queue = %task.queue,
            attempt,
            "Task reserved"
        );
        self.active = Some(ActiveTask::reserve(task.clone(), attempt));

        if !is_supported(&task.filename) {
            warn!(filename = %task.filename, "File extension not supported");
            self.fail(FailureReason::FileExtensionNotSupported).await;
            return;
        }
        if !self.advance(TaskState::Staging) {
            return;
        }

        let staging = self.staging.clone();
        let events = self.events.clone();
        self.io_job = Some(tokio::spawn(async move {
            let result = staging.stage(&task).await;
            deliver(&events, TaskEvent::StagingFinished { attempt, result }).await;
        }));
    }

    async fn on_staging_finished(
        &mut self,
        attempt: u64,
        result: Result<StagedArtifact, StagingError>,
    ) {
        if !self.is_current(attempt, TaskState::Staging) {
            debug!(attempt, "Discarding stale staging result");
            return;
        }

        self.io_job = None;
        let artifact = match result {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(error = %e, "Staging failed");
                self.fail(e.failure_reason()).await;
                return;
            }
        };

        info!(
            path = %artifact.audio_path.display(),
            bytes = artifact.bytes_written,
            metadata = artifact.metadata_path.is_some(),
            "Input staged, waiting for decoder"
        );
        let early = self.active.as_ref().and_then(|a| a.early_signal);
        if !self.advance(TaskState::AwaitingDecoderStart) {
            return;
        }
        match early {
            None => self
                .watchdog
                .arm(attempt, self.decoder_start_timeout, self.events.clone()),
            Some(EarlySignal::Started) => {
                info!("Decoder already started");
                self.advance(TaskState::Decoding);
            }
            Some(EarlySignal::Done) => {
                info!("Decoder already done");
                self.start_packaging();
            }
        }
    }

    async fn on_watchdog_expired(&mut self, attempt: u64) {
        if !self.is_current(attempt, TaskState::AwaitingDecoderStart) {
            debug!(attempt, "Discarding stale watchdog expiry");
            return;
        }
        warn!(
            timeout_secs = self.decoder_start_timeout.as_secs_f64(),
            "Decoder did not start in time"
        );
        self.fail(FailureReason::DecoderDidNotStart).await;
    }

    async fn on_decoder_status(&mut self, callback: StatusCallback) {
        let Some(active) = self.active.as_mut() else {
            warn!(status = %callback.status, "Discarding decoder status, no task in progress");
            return;
        };

        if let Some(filename) = callback.filename.as_deref().filter(|f| !f.is_empty()) {
            let stem = file_stem(filename);
            let ours = stem == file_stem(&active.current_filename)
                || stem == file_stem(&active.task.filename);
            if !ours && self.retired_stems.iter().any(|s| s == stem) {
                warn!(
                    filename,
                    status = %callback.status,
                    "Discarding decoder status for a finished task"
                );
                return;
            }
            if filename != active.current_filename {
                if active.state.accepts_rename() {
                    info!(from = %active.current_filename, to = %filename, "Input renamed by decoder");
                    active.current_filename = filename.to_string();
                } else {
                    debug!(state = %active.state, filename, "Rename after DONE ignored");
                }
            }
        }

        let task_id = active.task.task_id.clone();
        info!(
            task_id = %task_id,
            status = %callback.status,
            channel = %callback.channel_label(),
            "Decoder status"
        );
        self.spawn_progress(task_id, callback.status.clone());

        match callback.keyword() {
            Some("STARTING") => self.on_decoder_started(),
            Some("DONE") => self.on_decoder_done(),
            _ => {}
        }
    }

    fn on_decoder_started(&mut self) {
        match self.state() {
            TaskState::Staging => {
                if let Some(active) = self.active.as_mut() {
                    active.early_signal.get_or_insert(EarlySignal::Started);
                }
                info!("Decoder started while input is still staging");
            }
            TaskState::AwaitingDecoderStart => {
                self.watchdog.cancel();
                self.advance(TaskState::Decoding);
            }
            state => debug!(%state, "STARTING ignored"),
        }
    }

    fn on_decoder_done(&mut self) {
        match self.state() {
            TaskState::Staging => {
                if let Some(active) = self.active.as_mut() {
                    active.early_signal = Some(EarlySignal::Done);
                }
                info!("Decoder done while input is still staging");
            }
            TaskState::AwaitingDecoderStart | TaskState::Decoding => self.start_packaging(),
            state => debug!(%state, "Duplicate DONE ignored"),
        }
    }

    fn start_packaging(&mut self) {
        self.watchdog.cancel();
        if !self.advance(TaskState::Packaging) {
            return;
        }
        let Some(active) = self.active.as_ref() else {
            return;
        };

        let attempt = active.attempt;
        let current = active.current_filename.clone();
        let original = active.task.filename.clone();
        let packager = self.packager.clone();
        let events = self.events.clone();
        self.io_job = Some(tokio::spawn(async move {
            let result = packager.package_and_upload(&current, &original).await;
            deliver(&events, TaskEvent::PackagingFinished { attempt, result }).await;
        }));
    }

    async fn on_decoder_error(&mut self, callback: ErrorCallback) {
        let Some(state) = self.active.as_ref().map(|a| a.state) else {
            warn!(code = %callback.status, "Discarding decoder error, no task in progress");
            return;
        };
        warn!(code = %callback.status, %state, "Decoder reported an error");
        self.fail(FailureReason::Decoder(callback.status)).await;
    }

    async fn on_packaging_finished(&mut self, attempt: u64, result: Result<String, PackageError>) {
        if !self.is_current(attempt, TaskState::Packaging) {
            debug!(attempt, "Discarding stale packaging result");
            return;
        }
        self.io_job = None;

        match result {
            Ok(location) => self.succeed(location).await,
            Err(e) => {
                warn!(error = %e, "Packaging failed");
                self.fail(e.failure_reason()).await;
            }
        }
    }

    fn on_stop(&mut self, done: oneshot::Sender<()>) {
        self.polling = false;
        info!(busy = self.active.is_some(), "Stop requested, polling disabled");
        if self.active.is_some() {
            self.stop_waiters.push(done);
        } else {
            let _ = done.send(());
        }
    }

    async fn on_retry(&mut self, reply: oneshot::Sender<RetryOutcome>) {
        self.polling = false;
        let Some(task_id) = self.active.as_ref().map(|a| a.task.task_id.clone()) else {
            info!("Retry requested with no task in progress, polling disabled");
            let _ = reply.send(RetryOutcome::NoTask);
            return;
        };

        info!(task_id = %task_id, "Retry requested, abandoning task");
        self.watchdog.cancel();
        self.advance(TaskState::Retried);
        if let Err(e) = self.controller.report_retry(&task_id).await {
            warn!(task_id = %task_id, error = %e, "Failed to report retry");
        }
        self.finish();
        let _ = reply.send(RetryOutcome::Requested);
    }

    async fn succeed(&mut self, location: String) {
        if !self.advance(TaskState::Succeeded) {
            return;
        }
        let Some((task_id, current)) = self.identify() else {
            return;
        };

        info!(task_id = %task_id, location = %location, "Task succeeded");
        if let Err(e) = self.controller.report_success(&task_id, &location).await {
            warn!(task_id = %task_id, error = %e, "Failed to report success");
        }
        self.staging.stager().cleanup(&current).await;
        self.finish();
    }

    /// Terminate the active task with `reason`. Always cleans up.
    async fn fail(&mut self, reason: FailureReason) {
        self.watchdog.cancel();
        self.abort_io_job();
        self.advance(TaskState::Failed);
        let Some((task_id, current)) = self.identify() else {
            return;
        };

        warn!(task_id = %task_id, reason = %reason, "Task failed");
        self.send_failure(Some(&task_id), &reason).await;
        self.staging.stager().cleanup(&current).await;
        self.finish();
    }

    /// Clear the active task and release stop waiters.
    fn finish(&mut self) {
        self.watchdog.cancel();
        self.abort_io_job();
        if let Some(active) = self.active.take() {
            info!(
                task_id = %active.task.task_id,
                state = %active.state,
                elapsed_secs = active.elapsed_secs(),
                "Task finished"
            );
            self.retire(file_stem(&active.task.filename));
            self.retire(file_stem(&active.current_filename));
        }
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn abort_io_job(&mut self) {
        if let Some(job) = self.io_job.take() {
            job.abort();
        }
    }

    /// Remember the stem of a finished task's file.
    fn retire(&mut self, stem: &str) {
        if self.retired_stems.iter().any(|s| s == stem) {
            return;
        }
        if self.retired_stems.len() == RETIRED_STEMS {
            self.retired_stems.pop_front();
        }
        self.retired_stems.push_back(stem.to_string());
    }

    async fn send_failure(&self, task_id: Option<&TaskId>, reason: &FailureReason) {
        if let Err(e) = self.controller.report_failure(task_id, reason).await {
            warn!(reason = %reason, error = %e, "Failed to report failure");
        }
    }

    fn spawn_progress(&self, task_id: TaskId, status: String) {
        let controller = self.controller.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.report_progress(&task_id, &status).await {
                warn!(task_id = %task_id, error = %e, "Failed to report progress");
            }
        });
    }

    fn identify(&self) -> Option<(TaskId, String)> {
        self.active
            .as_ref()
            .map(|a| (a.task.task_id.clone(), a.current_filename.clone()))
    }

    fn is_current(&self, attempt: u64, state: TaskState) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.attempt == attempt && a.state == state)
    }

    /// Move the active task to `target`, logging a rejected transition.
    fn advance(&mut self, target: TaskState) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        match active.transition_to(target) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Rejected task transition");
                false
            }
        }
    }
}
