use super::messages::{BackendCommand, BackendEvent};
use crate::queue::{QueueEvent, QueueManager};
use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Owns the queue manager on behalf of a front end.
///
/// Commands arrive on `receiver`; queue notifications and replies leave on
/// `sender`. Failures of a command are reported as `BackendEvent::Error`
/// rather than ending the actor. When `receiver` closes without a
/// `Shutdown`, queued tasks are run to completion before `run` returns.
pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,

    // Components
    queue_manager: QueueManager,
    queue_events: mpsc::Receiver<QueueEvent>,
}

impl BackendActor {
    /// `queue_events` is the receiving end of the `ChannelNotifier` the
    /// manager was built with.
    pub fn new(
        queue_manager: QueueManager,
        queue_events: mpsc::Receiver<QueueEvent>,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        Self {
            receiver,
            sender,
            queue_manager,
            queue_events,
        }
    }

    pub async fn run(mut self) {
        info!("BackendActor started");

        // Pick up whatever the previous session left queued
        if let Err(e) = self.queue_manager.resume().await {
            error!("Failed to resume queue: {:#}", e);
            self.report(e).await;
        }

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(BackendCommand::Shutdown) => {
                        info!("BackendActor shutting down");
                        break;
                    }
                    None => {
                        info!("Command channel closed, finishing queued tasks");
                        self.drain().await;
                        break;
                    }
                    Some(cmd) => {
                        if let Err(e) = self.handle_command(cmd).await {
                            error!("Command failed: {:#}", e);
                            self.report(e).await;
                        }
                    }
                },
                Some(event) = self.queue_events.recv() => {
                    let _ = self.sender.send(BackendEvent::Queue(event)).await;
                }
            }
        }

        // Flush notifications that were already produced
        while let Ok(event) = self.queue_events.try_recv() {
            let _ = self.sender.send(BackendEvent::Queue(event)).await;
        }
    }

    /// Keep forwarding queue events until the run loop goes idle
    async fn drain(&mut self) {
        let manager = self.queue_manager.clone();
        let idle = manager.wait_idle();
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = &mut idle => break,
                Some(event) = self.queue_events.recv() => {
                    let _ = self.sender.send(BackendEvent::Queue(event)).await;
                }
            }
        }
    }

    async fn handle_command(&self, cmd: BackendCommand) -> Result<()> {
        match cmd {
            BackendCommand::Enqueue { task: Some(task) } => {
                self.queue_manager.enqueue(task.into_element()).await?;
            }
            BackendCommand::Enqueue { task: None } => {
                error!("Can not add undefined element to queue!");
            }
            BackendCommand::Remove { id } => {
                self.queue_manager.dequeue_by_id(&id).await?;
            }
            BackendCommand::Cancel { id } => {
                self.queue_manager.cancel(&id).await?;
            }
            BackendCommand::ClearHistory => {
                self.queue_manager.clear_history().await?;
            }
            BackendCommand::Snapshot => {
                let snapshot = self.queue_manager.snapshot().await?;
                let _ = self.sender.send(BackendEvent::Snapshot(snapshot)).await;
            }
            BackendCommand::Shutdown => {}
        }
        Ok(())
    }

    async fn report(&self, e: anyhow::Error) {
        let _ = self
            .sender
            .send(BackendEvent::Error {
                message: format!("{:#}", e),
            })
            .await;
    }
}
