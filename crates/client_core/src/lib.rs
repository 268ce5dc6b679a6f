use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use shared::{
    domain::{CommandKind, DesiredState, DeviceSnapshot, LinkPhase},
    error::CommandError,
    protocol::DeviceStatus,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod notify;
mod poller;
pub mod transport;

pub use notify::{Notice, NoticeCenter, NoticeKind, DEFAULT_NOTICE_DISMISS_AFTER};
pub use transport::{DeviceBackend, HttpDeviceBackend};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(40);

/// Everything subscribers can observe about the link: status snapshots as
/// they are polled, phase changes, and notice lifecycle.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    SnapshotUpdated(DeviceSnapshot),
    PhaseChanged(LinkPhase),
    NoticePosted(Notice),
    NoticeDismissed { id: u64 },
}

/// Synchronous rejection of an operator request. None of these emit a notice;
/// the caller asked for something the current state rules out and learns so
/// from the return value alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("device link state is not known yet")]
    LinkStateUnknown,
    #[error("a connection transition is already in progress")]
    TransitionInFlight,
    #[error("device is already connected")]
    AlreadyConnected,
    #[error("device is already disconnected")]
    AlreadyDisconnected,
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub poll_interval: Duration,
    /// How long an accepted command may wait for a confirming snapshot before
    /// the transition is abandoned.
    pub confirm_timeout: Duration,
    pub notice_dismiss_after: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            notice_dismiss_after: DEFAULT_NOTICE_DISMISS_AFTER,
        }
    }
}

/// In-flight command tracking. `Pending` always carries its kind, so a
/// pending transition without one cannot be represented.
#[derive(Debug, Clone, Copy)]
enum Transition {
    Idle,
    Pending {
        kind: CommandKind,
        seq: u64,
        stage: PendingStage,
    },
}

#[derive(Debug, Clone, Copy)]
enum PendingStage {
    /// The start/stop call has not resolved yet.
    Dispatching,
    /// The backend accepted the command; waiting for a snapshot to confirm it.
    AwaitingObserved { deadline: Instant },
}

struct SupervisorState {
    snapshot: Option<DeviceSnapshot>,
    desired: DesiredState,
    transition: Transition,
    bootstrapped: bool,
    device_uid: String,
    command_seq: u64,
    poll_generation: u64,
}

impl SupervisorState {
    fn phase(&self) -> LinkPhase {
        if !self.bootstrapped {
            return LinkPhase::Unknown;
        }
        match self.transition {
            Transition::Pending {
                kind: CommandKind::Start,
                ..
            } => LinkPhase::PendingStart,
            Transition::Pending {
                kind: CommandKind::Stop,
                ..
            } => LinkPhase::PendingStop,
            Transition::Idle => {
                if self.observed_connected() {
                    LinkPhase::Connected
                } else {
                    LinkPhase::Disconnected
                }
            }
        }
    }

    fn observed_connected(&self) -> bool {
        self.snapshot
            .map(|snapshot| snapshot.connected)
            .unwrap_or(false)
    }
}

/// Reconciles the operator's desired connection state against the state the
/// backend reports. Owns desired state and the in-flight transition
/// exclusively; everything else reads them through snapshots, events and the
/// phase accessor.
pub struct LinkSupervisor {
    backend: Arc<dyn DeviceBackend>,
    options: SupervisorOptions,
    inner: Mutex<SupervisorState>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    notices: Arc<NoticeCenter>,
    events: broadcast::Sender<LinkEvent>,
}

impl LinkSupervisor {
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Arc<Self> {
        Self::new_with_options(backend, SupervisorOptions::default())
    }

    pub fn new_with_options(
        backend: Arc<dyn DeviceBackend>,
        options: SupervisorOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let notices = NoticeCenter::new(events.clone(), options.notice_dismiss_after);
        Arc::new(Self {
            backend,
            options,
            inner: Mutex::new(SupervisorState {
                snapshot: None,
                desired: DesiredState::Disconnected,
                transition: Transition::Idle,
                bootstrapped: false,
                device_uid: String::new(),
                command_seq: 0,
                poll_generation: 0,
            }),
            poll_task: Mutex::new(None),
            notices,
            events,
        })
    }

    /// Loads the device uid hint, then starts the polling task. Activating
    /// again replaces any previous polling session.
    pub async fn activate(self: &Arc<Self>) {
        match self.backend.fetch_uid().await {
            Ok(uid) => {
                info!(%uid, "device uid loaded");
                self.inner.lock().await.device_uid = uid;
            }
            Err(err) => {
                warn!(error = %err, "device uid unavailable, connect will rely on auto-detection");
            }
        }

        let generation = {
            let mut state = self.inner.lock().await;
            state.poll_generation += 1;
            state.poll_generation
        };

        let task = poller::spawn(
            Arc::clone(self),
            Arc::clone(&self.backend),
            self.options.poll_interval,
            generation,
        );
        let previous = self.poll_task.lock().await.replace(task);
        if let Some(task) = previous {
            task.abort();
        }
    }

    /// Stops polling. Future ticks are cancelled outright; an in-flight
    /// status query may still resolve, but the generation check in
    /// `apply_snapshot` discards its result.
    pub async fn deactivate(&self) {
        {
            let mut state = self.inner.lock().await;
            state.poll_generation += 1;
        }
        let previous = self.poll_task.lock().await.take();
        if let Some(task) = previous {
            task.abort();
        }
        info!("status polling stopped");
    }

    /// Operator intent: bring the device up. Accepted only when no transition
    /// is in flight and the device is observed disconnected. The backend's
    /// acceptance is surfaced as a Success notice right away; the phase
    /// settles once a later snapshot confirms the connection.
    ///
    /// `uid_hint` may be empty to let the backend auto-detect the device.
    pub async fn request_connect(&self, uid_hint: &str) -> Result<(), IntentError> {
        let seq = self.begin_transition(CommandKind::Start).await?;
        info!(uid = %uid_hint, "start command dispatched");
        let outcome = self.backend.send_start(uid_hint).await;
        self.finish_dispatch(CommandKind::Start, seq, outcome).await;
        Ok(())
    }

    /// Operator intent: shut the device link down. Mirror of
    /// `request_connect` with the stop command.
    pub async fn request_disconnect(&self) -> Result<(), IntentError> {
        let seq = self.begin_transition(CommandKind::Stop).await?;
        info!("stop command dispatched");
        let outcome = self.backend.send_stop().await;
        self.finish_dispatch(CommandKind::Stop, seq, outcome).await;
        Ok(())
    }

    pub async fn phase(&self) -> LinkPhase {
        self.inner.lock().await.phase()
    }

    pub async fn desired_state(&self) -> DesiredState {
        self.inner.lock().await.desired
    }

    pub async fn latest_snapshot(&self) -> Option<DeviceSnapshot> {
        self.inner.lock().await.snapshot
    }

    /// Uid hint loaded at activation; empty when the backend had none.
    pub async fn device_uid(&self) -> String {
        self.inner.lock().await.device_uid.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub fn notices(&self) -> Arc<NoticeCenter> {
        Arc::clone(&self.notices)
    }

    /// Precondition check and state mutation for an operator request, done
    /// under one lock acquisition so the Idle guard cannot race the dispatch.
    async fn begin_transition(&self, kind: CommandKind) -> Result<u64, IntentError> {
        let mut state = self.inner.lock().await;
        if !state.bootstrapped {
            return Err(IntentError::LinkStateUnknown);
        }
        if matches!(state.transition, Transition::Pending { .. }) {
            return Err(IntentError::TransitionInFlight);
        }
        match kind {
            CommandKind::Start if state.observed_connected() => {
                return Err(IntentError::AlreadyConnected);
            }
            CommandKind::Stop if !state.observed_connected() => {
                return Err(IntentError::AlreadyDisconnected);
            }
            _ => {}
        }

        let before = state.phase();
        state.desired = match kind {
            CommandKind::Start => DesiredState::Connected,
            CommandKind::Stop => DesiredState::Disconnected,
        };
        state.command_seq += 1;
        let seq = state.command_seq;
        state.transition = Transition::Pending {
            kind,
            seq,
            stage: PendingStage::Dispatching,
        };
        self.publish_phase_change(before, &state);
        Ok(seq)
    }

    /// Applies a command outcome. Success keeps the transition pending until
    /// a snapshot confirms it; failure reverts desired state and surfaces the
    /// error detail.
    async fn finish_dispatch(
        &self,
        kind: CommandKind,
        seq: u64,
        outcome: Result<(), CommandError>,
    ) {
        let mut state = self.inner.lock().await;
        let still_pending = matches!(
            state.transition,
            Transition::Pending { seq: pending, .. } if pending == seq
        );
        if !still_pending {
            return;
        }

        let before = state.phase();
        match outcome {
            Ok(()) => {
                state.transition = Transition::Pending {
                    kind,
                    seq,
                    stage: PendingStage::AwaitingObserved {
                        deadline: Instant::now() + self.options.confirm_timeout,
                    },
                };
                let message = match kind {
                    CommandKind::Start => "start command accepted",
                    CommandKind::Stop => "stop command accepted",
                };
                info!(?kind, "device command accepted");
                self.notices.post(NoticeKind::Success, message).await;
            }
            Err(err) => {
                state.desired = match kind {
                    CommandKind::Start => DesiredState::Disconnected,
                    CommandKind::Stop => DesiredState::Connected,
                };
                state.transition = Transition::Idle;
                warn!(?kind, error = %err, "device command failed");
                self.notices.post(NoticeKind::Error, err.to_string()).await;
            }
        }
        self.publish_phase_change(before, &state);
    }

    /// Entry point for poll results. The first snapshot bootstraps desired
    /// state from what is observed instead of forcing Disconnected, so a
    /// dashboard reload never fights a device that was already running.
    pub(crate) async fn apply_snapshot(&self, generation: u64, status: DeviceStatus) {
        let mut state = self.inner.lock().await;
        if state.poll_generation != generation {
            // A stopped polling session resolved late; discard its result.
            return;
        }

        let before = state.phase();
        let snapshot = DeviceSnapshot {
            connected: status.is_connected,
            battery_percent: status.battery_percent(),
            observed_at: Utc::now(),
        };
        state.snapshot = Some(snapshot);

        if !state.bootstrapped {
            state.bootstrapped = true;
            state.desired = DesiredState::from_observed(snapshot.connected);
            info!(
                connected = snapshot.connected,
                battery = ?snapshot.battery_percent,
                "initial device state observed"
            );
        } else if let Transition::Pending {
            kind,
            stage: PendingStage::AwaitingObserved { deadline },
            ..
        } = state.transition
        {
            if snapshot.connected == state.desired.wants_connected() {
                state.transition = Transition::Idle;
                info!(?kind, connected = snapshot.connected, "transition confirmed");
            } else if Instant::now() >= deadline {
                state.transition = Transition::Idle;
                state.desired = DesiredState::from_observed(snapshot.connected);
                warn!(?kind, "transition unconfirmed within deadline, abandoning");
                let message = match kind {
                    CommandKind::Start => "device did not report connected in time",
                    CommandKind::Stop => "device did not report disconnected in time",
                };
                self.notices.post(NoticeKind::Error, message).await;
            }
        }

        let _ = self.events.send(LinkEvent::SnapshotUpdated(snapshot));
        self.publish_phase_change(before, &state);
    }

    fn publish_phase_change(&self, before: LinkPhase, state: &SupervisorState) {
        let after = state.phase();
        if after != before {
            let _ = self.events.send(LinkEvent::PhaseChanged(after));
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
