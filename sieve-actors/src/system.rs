//! Task tracking and shutdown signaling for long-lived actors.
//!
//! Actors spawned with [`crate::actor::spawn_actor_with_shutdown`] subscribe to
//! the broadcast channel; tracked tasks are awaited during teardown.
use anyhow::Result;
use tokio::{sync::broadcast, task::JoinSet};

#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn signal(&self) {
        let _ = self.tx.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

pub struct ActorSystem {
    joinset: JoinSet<Result<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSystem {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            joinset: JoinSet::new(),
            shutdown_tx,
        }
    }

    pub fn shutdown_notifier(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Await `task` during [`ActorSystem::graceful_shutdown`].
    pub fn track(&mut self, task: impl std::future::Future<Output = Result<()>> + Send + 'static) {
        self.joinset.spawn(task);
    }

    pub fn tracked(&self) -> usize {
        self.joinset.len()
    }

    /// Signal shutdown and wait for every tracked task. The first task error wins.
    pub async fn graceful_shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        while let Some(res) = self.joinset.join_next().await {
            res??;
        }
        Ok(())
    }
}
