//! Worker supervisor: owns the worker processes.
//!
//! One task (`WorkerSupervisor::run`) owns every slot. Per-process helper
//! tasks read the child's stdout for the readiness handshake and wait for it
//! to exit; both report back through a single event channel, tagged with the
//! slot's generation so that events from a superseded process are dropped.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use skirmish_core::{WORKER_ID_ENV, WorkerId, WorkerMessage};
use skirmish_metrics::FleetMetrics;

use crate::error::{SupervisorError, SupervisorResult};
use crate::readiness::{FleetReady, ReadinessBarrier};
use crate::restart::{RestartPolicy, RestartTracker};

/// How long shutdown waits for children to exit after killing them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The command line used to launch every worker.
///
/// Each child additionally gets `WORKER_ID=<id>` in its environment, a piped
/// stdout for the handshake, and the supervisor's stderr.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn build(&self, worker_id: WorkerId) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(WORKER_ID_ENV, worker_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

/// Lifecycle phase of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Process spawned, handshake not yet received.
    Starting,
    Ready,
    /// Process gone; a replacement is scheduled.
    Restarting,
    Stopped,
}

/// Snapshot of one slot, as reported by [`SupervisorHandle::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub worker_id: WorkerId,
    pub pid: Option<u32>,
    pub state: WorkerState,
    pub restarts: u32,
    pub crash_looping: bool,
    pub last_exit: Option<String>,
}

enum Event {
    Ready { worker_id: WorkerId, generation: u64 },
    Exited { worker_id: WorkerId, generation: u64, cause: String },
    Respawn { worker_id: WorkerId },
}

enum Control {
    Kill {
        worker_id: WorkerId,
        reply: oneshot::Sender<SupervisorResult<()>>,
    },
}

struct Slot {
    generation: u64,
    pid: Option<u32>,
    /// Dropping or firing this kills the current process.
    kill_tx: Option<oneshot::Sender<()>>,
    tracker: RestartTracker,
}

/// Cloneable handle for inspecting and poking the fleet.
#[derive(Clone)]
pub struct SupervisorHandle {
    status: Arc<RwLock<Vec<WorkerStatus>>>,
    control: mpsc::Sender<Control>,
}

impl SupervisorHandle {
    /// Per-slot snapshot.
    pub async fn status(&self) -> Vec<WorkerStatus> {
        self.status.read().await.clone()
    }

    /// Terminate the current process of `worker_id`; it is restarted like
    /// any other exit.
    pub async fn kill(&self, worker_id: WorkerId) -> SupervisorResult<()> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Kill { worker_id, reply })
            .await
            .map_err(|_| SupervisorError::Stopped)?;
        rx.await.map_err(|_| SupervisorError::Stopped)?
    }
}

/// Spawns the worker fleet and keeps it at full size.
pub struct WorkerSupervisor {
    command: WorkerCommand,
    slots: Vec<Slot>,
    barrier: ReadinessBarrier,
    status: Arc<RwLock<Vec<WorkerStatus>>>,
    metrics: FleetMetrics,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    control_rx: mpsc::Receiver<Control>,
    shutting_down: bool,
}

impl WorkerSupervisor {
    /// Prepare a supervisor for `num_workers` slots. Nothing is spawned
    /// until [`run`](Self::run).
    pub fn new(
        command: WorkerCommand,
        num_workers: u32,
        policy: RestartPolicy,
        metrics: FleetMetrics,
    ) -> (Self, SupervisorHandle, FleetReady) {
        let (barrier, ready) = ReadinessBarrier::new(num_workers);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::channel(16);

        let slots = (0..num_workers)
            .map(|_| Slot {
                generation: 0,
                pid: None,
                kill_tx: None,
                tracker: RestartTracker::new(policy),
            })
            .collect();
        let status = (0..num_workers)
            .map(|worker_id| WorkerStatus {
                worker_id,
                pid: None,
                state: WorkerState::Starting,
                restarts: 0,
                crash_looping: false,
                last_exit: None,
            })
            .collect();
        let status = Arc::new(RwLock::new(status));

        let handle = SupervisorHandle {
            status: status.clone(),
            control: control_tx,
        };
        let supervisor = Self {
            command,
            slots,
            barrier,
            status,
            metrics,
            events_tx,
            events_rx,
            control_rx,
            shutting_down: false,
        };
        (supervisor, handle, ready)
    }

    /// Spawn every worker, then supervise until `shutdown` flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(workers = self.slots.len(), "starting worker fleet");
        for worker_id in 0..self.slots.len() as WorkerId {
            self.spawn_worker(worker_id).await;
        }

        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                Some(control) = self.control_rx.recv() => self.handle_control(control),
                _ = shutdown.changed() => break,
            }
        }

        self.stop_all().await;
    }

    async fn spawn_worker(&mut self, worker_id: WorkerId) {
        let idx = worker_id as usize;
        self.slots[idx].generation += 1;
        let generation = self.slots[idx].generation;

        let mut child = match self.command.build(worker_id).spawn() {
            Ok(child) => child,
            Err(source) => {
                let e = SupervisorError::Spawn { worker_id, source };
                error!(worker_id, error = %e, "worker spawn failed");
                // Treated as an immediate crash of this generation.
                let _ = self.events_tx.send(Event::Exited {
                    worker_id,
                    generation,
                    cause: e.to_string(),
                });
                return;
            }
        };

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_handshake(
                worker_id,
                generation,
                stdout,
                self.events_tx.clone(),
            ));
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let cause = match status {
                Ok(status) => status.to_string(),
                Err(e) => format!("wait failed: {e}"),
            };
            let _ = events.send(Event::Exited {
                worker_id,
                generation,
                cause,
            });
        });

        let slot = &mut self.slots[idx];
        slot.pid = pid;
        slot.kill_tx = Some(kill_tx);

        let mut status = self.status.write().await;
        status[idx].pid = pid;
        status[idx].state = WorkerState::Starting;
        info!(worker_id, pid = pid.unwrap_or_default(), generation, "worker spawned");
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Ready {
                worker_id,
                generation,
            } => {
                let idx = worker_id as usize;
                if self.slots[idx].generation != generation {
                    debug!(worker_id, generation, "ignoring readiness from superseded worker");
                    return;
                }
                if self.slots[idx].pid.is_none() {
                    debug!(worker_id, generation, "ignoring readiness from exited worker");
                    return;
                }
                self.status.write().await[idx].state = WorkerState::Ready;
                let fleet_ready = self.barrier.mark_ready(worker_id);
                self.publish_ready_count().await;
                info!(worker_id, pid = self.slots[idx].pid.unwrap_or_default(), "worker ready");
                if fleet_ready {
                    info!(workers = self.slots.len(), "all workers ready");
                }
            }
            Event::Exited {
                worker_id,
                generation,
                cause,
            } => {
                let idx = worker_id as usize;
                if self.slots[idx].generation != generation {
                    debug!(worker_id, generation, "ignoring exit of superseded worker");
                    return;
                }
                let pid = self.slots[idx].pid.take();
                self.slots[idx].kill_tx = None;

                if self.shutting_down {
                    let mut status = self.status.write().await;
                    status[idx].pid = None;
                    status[idx].state = WorkerState::Stopped;
                    status[idx].last_exit = Some(cause);
                    return;
                }

                error!(worker_id, pid = pid.unwrap_or_default(), %cause, "worker exited, restarting");
                let decision = self.slots[idx].tracker.record_exit(Instant::now());
                self.metrics.record_worker_restart(worker_id);
                if decision.entered_crash_loop {
                    self.metrics.record_crash_loop(worker_id);
                    error!(worker_id, "worker is crash-looping; restarts continue with backoff");
                }

                {
                    let mut status = self.status.write().await;
                    status[idx].pid = None;
                    status[idx].state = WorkerState::Restarting;
                    status[idx].restarts = self.slots[idx].tracker.total_restarts();
                    status[idx].crash_looping = decision.crash_looping;
                    status[idx].last_exit = Some(cause);
                }
                self.publish_ready_count().await;

                if decision.delay.is_zero() {
                    let _ = self.events_tx.send(Event::Respawn { worker_id });
                } else {
                    debug!(worker_id, delay_ms = decision.delay.as_millis() as u64, "restart delayed");
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(decision.delay).await;
                        let _ = events.send(Event::Respawn { worker_id });
                    });
                }
            }
            Event::Respawn { worker_id } => {
                if !self.shutting_down && self.slots[worker_id as usize].pid.is_none() {
                    self.spawn_worker(worker_id).await;
                }
            }
        }
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Kill { worker_id, reply } => {
                let result = match self.slots.get_mut(worker_id as usize) {
                    None => Err(SupervisorError::UnknownWorker(worker_id)),
                    Some(slot) => match slot.kill_tx.take() {
                        Some(tx) => {
                            warn!(worker_id, pid = slot.pid.unwrap_or_default(), "killing worker on request");
                            let _ = tx.send(());
                            Ok(())
                        }
                        None => Err(SupervisorError::NotRunning(worker_id)),
                    },
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn publish_ready_count(&self) {
        let ready = self
            .status
            .read()
            .await
            .iter()
            .filter(|s| s.state == WorkerState::Ready)
            .count();
        self.metrics.set_workers_ready(ready as u32);
    }

    /// Kill every child and wait (bounded) for them to exit.
    async fn stop_all(&mut self) {
        self.shutting_down = true;
        info!("stopping worker fleet");
        for slot in &mut self.slots {
            if let Some(tx) = slot.kill_tx.take() {
                let _ = tx.send(());
            }
        }

        let drain = async {
            while self.slots.iter().any(|s| s.pid.is_some()) {
                match self.events_rx.recv().await {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("timed out waiting for workers to exit");
        }
        self.publish_ready_count().await;
        info!("worker fleet stopped");
    }
}

/// Forward the readiness handshake from a child's stdout.
async fn read_handshake(
    worker_id: WorkerId,
    generation: u64,
    stdout: ChildStdout,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match WorkerMessage::parse_line(&line) {
            Some(WorkerMessage::WorkerReady { worker_id: announced }) if announced == worker_id => {
                let _ = events.send(Event::Ready {
                    worker_id,
                    generation,
                });
            }
            Some(WorkerMessage::WorkerReady { worker_id: announced }) => {
                warn!(worker_id, announced, "readiness signal with wrong worker id ignored");
            }
            None => debug!(worker_id, %line, "worker stdout"),
        }
    }
}
