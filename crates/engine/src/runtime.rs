//! Async driver for a [`SyncController`].
//!
//! [`spawn_field`] moves the controller into a task that owns it exclusively.
//! Callers talk to the task through a [`FieldHandle`]; fetches run on their
//! own tasks and report back over a completion channel, so a slow request
//! never blocks commands. Starting a fetch aborts the one it supersedes.

use std::sync::Arc;

use selectsync_types::{DataSourceConfig, FetchResponse, SearchTerm};
use serde_json::Value;
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
        oneshot,
    },
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info};

use crate::{FieldSnapshot, ItemsLoaded, OptionFetcher, Readiness, SelectError, SyncController, SyncStep, SyncTrigger};

/// Messages accepted by the field task.
#[derive(Debug)]
pub enum FieldCommand {
    Sync(SyncTrigger),
    SetValue { value: Value, silent: bool },
    ReportSelection { selection: Value, reply: oneshot::Sender<Value> },
    SetVisible(bool),
    SetDisabled(bool),
    SetDataSource(DataSourceConfig),
    SetTemplate(Option<String>),
    DisplayString { value: Option<Value>, reply: oneshot::Sender<String> },
    Snapshot(oneshot::Sender<FieldSnapshot>),
    ItemsLoaded(oneshot::Sender<ItemsLoaded>),
    Shutdown,
}

struct Completion {
    cycle: u64,
    result: Result<FetchResponse, SelectError>,
}

/// Cloneable handle to a running field task.
///
/// Every operation fails with [`SelectError::Closed`] once the task is gone.
#[derive(Debug, Clone)]
pub struct FieldHandle {
    command_tx: UnboundedSender<FieldCommand>,
}

impl FieldHandle {
    pub fn send(&self, command: FieldCommand) -> Result<(), SelectError> {
        self.command_tx.send(command).map_err(|_| SelectError::Closed)
    }

    pub fn mount(&self) -> Result<(), SelectError> {
        self.send(FieldCommand::Sync(SyncTrigger::Mount))
    }

    pub fn reveal(&self) -> Result<(), SelectError> {
        self.send(FieldCommand::Sync(SyncTrigger::Reveal))
    }

    pub fn focus(&self) -> Result<(), SelectError> {
        self.send(FieldCommand::Sync(SyncTrigger::Focus))
    }

    pub fn search(&self, term: Option<SearchTerm>) -> Result<(), SelectError> {
        self.send(FieldCommand::Sync(SyncTrigger::Search(term)))
    }

    pub fn scroll(&self) -> Result<(), SelectError> {
        self.send(FieldCommand::Sync(SyncTrigger::Scroll))
    }

    pub fn refresh(&self) -> Result<(), SelectError> {
        self.send(FieldCommand::Sync(SyncTrigger::Refresh))
    }

    pub fn set_value(&self, value: Value, silent: bool) -> Result<(), SelectError> {
        self.send(FieldCommand::SetValue { value, silent })
    }

    pub fn set_visible(&self, visible: bool) -> Result<(), SelectError> {
        self.send(FieldCommand::SetVisible(visible))
    }

    pub fn set_disabled(&self, disabled: bool) -> Result<(), SelectError> {
        self.send(FieldCommand::SetDisabled(disabled))
    }

    pub fn set_data_source(&self, source: DataSourceConfig) -> Result<(), SelectError> {
        self.send(FieldCommand::SetDataSource(source))
    }

    pub fn set_template(&self, template: Option<String>) -> Result<(), SelectError> {
        self.send(FieldCommand::SetTemplate(template))
    }

    /// Commits the widget's raw selection and returns the reported value.
    pub async fn report_selection(&self, selection: Value) -> Result<Value, SelectError> {
        let (reply, receiver) = oneshot::channel();
        self.send(FieldCommand::ReportSelection { selection, reply })?;
        receiver.await.map_err(|_| SelectError::Closed)
    }

    pub async fn display_string(&self, value: Option<Value>) -> Result<String, SelectError> {
        let (reply, receiver) = oneshot::channel();
        self.send(FieldCommand::DisplayString { value, reply })?;
        receiver.await.map_err(|_| SelectError::Closed)
    }

    pub async fn snapshot(&self) -> Result<FieldSnapshot, SelectError> {
        let (reply, receiver) = oneshot::channel();
        self.send(FieldCommand::Snapshot(reply))?;
        receiver.await.map_err(|_| SelectError::Closed)
    }

    /// Waiter bound to the generation current after all previously sent
    /// commands were applied.
    pub async fn items_loaded(&self) -> Result<ItemsLoaded, SelectError> {
        let (reply, receiver) = oneshot::channel();
        self.send(FieldCommand::ItemsLoaded(reply))?;
        receiver.await.map_err(|_| SelectError::Closed)
    }

    /// Shorthand for `items_loaded().await?.wait().await`.
    pub async fn wait_until_loaded(&self) -> Result<Readiness, SelectError> {
        Ok(self.items_loaded().await?.wait().await)
    }

    pub fn shutdown(&self) -> Result<(), SelectError> {
        self.send(FieldCommand::Shutdown)
    }
}

/// Spawns the task driving `controller`. The task ends on
/// [`FieldHandle::shutdown`] or once every handle is dropped; pending
/// readiness waiters then observe [`Readiness::Closed`].
pub fn spawn_field(controller: SyncController, fetcher: Arc<dyn OptionFetcher>) -> (FieldHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = unbounded_channel();
    let task = tokio::spawn(drive_field(controller, fetcher, command_rx));
    (FieldHandle { command_tx }, task)
}

async fn drive_field(mut controller: SyncController, fetcher: Arc<dyn OptionFetcher>, mut command_rx: UnboundedReceiver<FieldCommand>) {
    let key = controller.config().key.clone();
    info!(field = %key, source = %controller.config().source.kind(), "field runtime started");

    let (completion_tx, mut completion_rx) = unbounded_channel::<Completion>();
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        let deadline = controller.next_debounce_deadline();
        let step = tokio::select! {
            command = command_rx.recv() => {
                match command {
                    None | Some(FieldCommand::Shutdown) => break,
                    Some(command) => apply_command(&mut controller, command),
                }
            }
            Some(completion) = completion_rx.recv() => {
                controller.complete_fetch(completion.cycle, completion.result);
                None
            }
            _ = debounce_elapsed(deadline), if deadline.is_some() => {
                controller.poll_debounce(Instant::now())
            }
        };

        if let Some(SyncStep::Fetch(pending)) = step {
            if let Some(previous) = in_flight.take() {
                previous.abort();
            }
            let fetcher = Arc::clone(&fetcher);
            let completion_tx = completion_tx.clone();
            debug!(field = %key, cycle = pending.cycle, method = %pending.request.method, "dispatching option fetch");
            in_flight = Some(tokio::spawn(async move {
                let result = fetcher.fetch(pending.request).await;
                let _ = completion_tx.send(Completion {
                    cycle: pending.cycle,
                    result,
                });
            }));
        }
    }

    if let Some(previous) = in_flight.take() {
        previous.abort();
    }
    info!(field = %key, "field runtime stopped");
}

fn apply_command(controller: &mut SyncController, command: FieldCommand) -> Option<SyncStep> {
    match command {
        FieldCommand::Sync(trigger) => Some(controller.request_sync(trigger, Instant::now())),
        FieldCommand::SetValue { value, silent } => controller.set_value(value, silent),
        FieldCommand::ReportSelection { selection, reply } => {
            let _ = reply.send(controller.report_selection(selection));
            None
        }
        FieldCommand::SetVisible(visible) => controller.set_visible(visible),
        FieldCommand::SetDisabled(disabled) => {
            controller.set_disabled(disabled);
            None
        }
        FieldCommand::SetDataSource(source) => Some(controller.set_data_source(source)),
        FieldCommand::SetTemplate(template) => {
            controller.set_template(template);
            None
        }
        FieldCommand::DisplayString { value, reply } => {
            let _ = reply.send(controller.display_string(value.as_ref()));
            None
        }
        FieldCommand::Snapshot(reply) => {
            let _ = reply.send(controller.snapshot());
            None
        }
        FieldCommand::ItemsLoaded(reply) => {
            let _ = reply.send(controller.items_loaded());
            None
        }
        FieldCommand::Shutdown => None,
    }
}

async fn debounce_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
