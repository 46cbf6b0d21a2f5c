use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use cvp_devices::{CommandExecutor, Device};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::commands::{commands_for, scope_to_device};
use crate::error::InstallError;
use crate::log::{LogKind, LogStream};
use crate::policy::VersionPolicy;

const SEPARATOR: &str = "-------------------------------------------------------------";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Outcome of one settled run.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub cancelled: bool,
    pub outcomes: BTreeMap<String, TaskState>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty()
            && self
                .outcomes
                .values()
                .all(|state| *state == TaskState::Succeeded)
    }
}

/// A running installation. `wait` resolves once every device task has
/// settled; dropping the handle detaches and the run continues.
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    join: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn wait(self) -> RunSummary {
        match self.join.await {
            Ok(summary) => summary,
            // The supervisor is never aborted; a join failure is unexpected.
            Err(err) => {
                warn!("run supervisor join failed: {err}");
                RunSummary {
                    run_id: self.run_id,
                    cancelled: false,
                    outcomes: BTreeMap::new(),
                }
            }
        }
    }
}

type TaskStates = Arc<Mutex<BTreeMap<String, TaskState>>>;

struct Inner {
    running: bool,
    generation: u64,
    cancel_tx: watch::Sender<bool>,
    tasks: TaskStates,
}

struct Shared {
    executor: Arc<dyn CommandExecutor>,
    policy: Arc<VersionPolicy>,
    logs: Arc<LogStream>,
    run_state_tx: watch::Sender<RunState>,
    inner: Mutex<Inner>,
}

/// Drives one installation run at a time: one independent task per selected
/// device, a shared cancel flag polled at step boundaries, and a supervisor
/// that settles every task before declaring the run over.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        policy: Arc<VersionPolicy>,
        logs: Arc<LogStream>,
    ) -> Self {
        let (run_state_tx, _) = watch::channel(RunState::Idle);
        let (cancel_tx, _) = watch::channel(false);
        Orchestrator {
            shared: Arc::new(Shared {
                executor,
                policy,
                logs,
                run_state_tx,
                inner: Mutex::new(Inner {
                    running: false,
                    generation: 0,
                    cancel_tx,
                    tasks: Arc::new(Mutex::new(BTreeMap::new())),
                }),
            }),
        }
    }

    pub fn logs(&self) -> Arc<LogStream> {
        self.shared.logs.clone()
    }

    pub fn run_state(&self) -> watch::Receiver<RunState> {
        self.shared.run_state_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.inner.lock().unwrap().running
    }

    /// Snapshot of the current (or last) run's per-device states.
    pub fn task_states(&self) -> BTreeMap<String, TaskState> {
        let tasks = self.shared.inner.lock().unwrap().tasks.clone();
        let snapshot = tasks.lock().unwrap().clone();
        snapshot
    }

    pub fn start(&self, selected: Vec<Device>) -> Result<RunHandle, InstallError> {
        if selected.is_empty() {
            return Err(InstallError::NothingSelected);
        }

        let (cancel_rx, tasks, generation) = {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.running {
                return Err(InstallError::Busy);
            }
            inner.running = true;
            inner.generation += 1;

            // Fresh cancel flag per run; tasks of an older cancelled run
            // keep their own receiver and wind down on their own.
            let (cancel_tx, cancel_rx) = watch::channel(false);
            inner.cancel_tx = cancel_tx;

            let tasks: TaskStates = Arc::new(Mutex::new(
                selected
                    .iter()
                    .map(|device| (device.id.clone(), TaskState::Pending))
                    .collect(),
            ));
            inner.tasks = tasks.clone();
            (cancel_rx, tasks, inner.generation)
        };

        let run_id = Uuid::new_v4().to_string();
        self.shared.logs.clear();
        // send_replace: the state must stick even with no subscribers yet.
        self.shared.run_state_tx.send_replace(RunState::Running);
        self.shared.logs.push(
            LogKind::Info,
            format!("Starting installation for {} device(s)...", selected.len()),
            None,
        );
        info!(run_id = %run_id, devices = selected.len(), "installation run started");

        let mut handles = Vec::with_capacity(selected.len());
        for device in selected {
            let id = device.id.clone();
            let task = run_device(
                device,
                self.shared.executor.clone(),
                self.shared.policy.clone(),
                self.shared.logs.clone(),
                cancel_rx.clone(),
                tasks.clone(),
            );
            handles.push((id, tokio::spawn(task)));
        }

        let shared = self.shared.clone();
        let supervisor_run_id = run_id.clone();
        let join = tokio::spawn(supervise(
            shared,
            supervisor_run_id,
            generation,
            handles,
            cancel_rx,
            tasks,
        ));

        Ok(RunHandle { run_id, join })
    }

    /// Requests cancellation of the active run. The run state returns to
    /// Idle immediately; in-flight tasks settle asynchronously and emit
    /// their own cancellation entries as they notice. No-op when Idle.
    pub fn cancel(&self) {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            if !inner.running {
                return;
            }
            inner.running = false;
            let _ = inner.cancel_tx.send(true);
        }
        self.shared
            .logs
            .push(LogKind::Info, "Cancellation request received.", None);
        self.shared.run_state_tx.send_replace(RunState::Idle);
        info!("installation run cancellation requested");
    }
}

fn set_task_state(tasks: &TaskStates, device_id: &str, state: TaskState) {
    tasks
        .lock()
        .unwrap()
        .insert(device_id.to_string(), state);
}

async fn run_device(
    device: Device,
    executor: Arc<dyn CommandExecutor>,
    policy: Arc<VersionPolicy>,
    logs: Arc<LogStream>,
    cancel_rx: watch::Receiver<bool>,
    tasks: TaskStates,
) {
    let id = device.id.as_str();
    set_task_state(&tasks, id, TaskState::Running);
    logs.push(
        LogKind::Info,
        format!("Starting process for device {} (Android {})", id, device.version),
        Some(id),
    );

    let commands = match commands_for(&policy, &device.version) {
        Ok(commands) => commands,
        Err(err) => {
            logs.push(LogKind::Error, format!("An error occurred: {err}"), Some(id));
            set_task_state(&tasks, id, TaskState::Failed);
            return;
        }
    };

    for command in commands {
        // Cancellation is polled at step boundaries only; a step already
        // executing finishes its own logs first.
        if *cancel_rx.borrow() {
            logs.push(LogKind::Error, "Process cancelled by user.", Some(id));
            set_task_state(&tasks, id, TaskState::Cancelled);
            return;
        }

        let scoped = scope_to_device(&command, id);
        logs.push(LogKind::Info, SEPARATOR, Some(id));
        logs.push(LogKind::Command, format!("Running command: {scoped}"), Some(id));

        match executor.execute(&scoped).await {
            Ok(()) => logs.push(LogKind::Success, "Success", Some(id)),
            Err(err) => {
                logs.push(LogKind::Error, format!("An error occurred: {err}"), Some(id));
                set_task_state(&tasks, id, TaskState::Failed);
                return;
            }
        }
    }

    logs.push(LogKind::Success, "Installation complete.", Some(id));
    set_task_state(&tasks, id, TaskState::Succeeded);
}

async fn supervise(
    shared: Arc<Shared>,
    run_id: String,
    generation: u64,
    handles: Vec<(String, JoinHandle<()>)>,
    cancel_rx: watch::Receiver<bool>,
    tasks: TaskStates,
) -> RunSummary {
    // Settle every device task; a failure or cancellation of one never
    // short-circuits the others.
    for (device_id, handle) in handles {
        if let Err(err) = handle.await {
            warn!(device = %device_id, "device task join failed: {err}");
            shared.logs.push(
                LogKind::Error,
                format!("An error occurred: device task aborted ({err})"),
                Some(&device_id),
            );
            set_task_state(&tasks, &device_id, TaskState::Failed);
        }
    }

    let cancelled = *cancel_rx.borrow();
    if !cancelled {
        shared.logs.push(LogKind::Success, "ALL DONE, Bye bye !!!", None);
    }

    {
        let mut inner = shared.inner.lock().unwrap();
        // A cancelled run may already have been replaced by a newer one;
        // only the current generation gets to flip the gate back.
        if inner.generation == generation {
            inner.running = false;
            shared.run_state_tx.send_replace(RunState::Idle);
        }
    }

    let outcomes = tasks.lock().unwrap().clone();
    info!(run_id = %run_id, cancelled, "installation run settled");
    RunSummary {
        run_id,
        cancelled,
        outcomes,
    }
}
