//! Ordered background writes of the session-resume snapshot.
//!
//! Snapshots are queued to a single writer task that saves them on the
//! blocking pool, newest last. Queued snapshots that were overtaken before the
//! writer got to them are skipped. Without a Tokio runtime the writer falls
//! back to saving inline.

use std::sync::Arc;
use storage::{SessionSnapshot, SessionStore, StorageError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

enum Command {
    Save(Box<SessionSnapshot>),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug)]
pub struct SessionWriter {
    store: Arc<SessionStore>,
    queue: Option<mpsc::UnboundedSender<Command>>,
}

impl SessionWriter {
    pub fn new(store: SessionStore) -> Self {
        Self { store: Arc::new(store), queue: None }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Queues `snapshot` behind every earlier one.
    pub fn save(&mut self, snapshot: SessionSnapshot) {
        let mut command = Command::Save(Box::new(snapshot));
        if let Some(queue) = self.queue() {
            match queue.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(unsent)) => {
                    log::debug!("session writer stopped, saving inline");
                    self.queue = None;
                    command = unsent;
                }
            }
        }

        if let Command::Save(snapshot) = command {
            if let Err(err) = self.store.save(&snapshot) {
                log::warn!("failed to save session for {}: {err}", snapshot.document_id);
            }
        }
    }

    /// Resolves once every snapshot queued so far is on disk.
    pub async fn flush(&self) {
        let Some(queue) = &self.queue else {
            return;
        };
        let (done, finished) = oneshot::channel();
        if queue.send(Command::Flush(done)).is_ok() {
            let _ = finished.await;
        }
    }

    /// Reads the saved session after pending writes have landed.
    pub async fn load(&self) -> Result<Option<SessionSnapshot>, StorageError> {
        self.flush().await;
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(result) => result,
            Err(err) => {
                log::warn!("session read task failed: {err}");
                Ok(None)
            }
        }
    }

    fn queue(&mut self) -> Option<&mpsc::UnboundedSender<Command>> {
        if self.queue.as_ref().is_some_and(|queue| queue.is_closed()) {
            self.queue = None;
        }
        if self.queue.is_none() {
            let handle = Handle::try_current().ok()?;
            let (sender, receiver) = mpsc::unbounded_channel();
            handle.spawn(write_loop(Arc::clone(&self.store), receiver));
            self.queue = Some(sender);
        }
        self.queue.as_ref()
    }
}

async fn write_loop(store: Arc<SessionStore>, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut next = Some(command);
        while let Some(command) = next {
            match command {
                Command::Save(snapshot) => latest = Some(snapshot),
                Command::Flush(done) => waiters.push(done),
            }
            next = commands.try_recv().ok();
        }

        if let Some(snapshot) = latest {
            let store = Arc::clone(&store);
            let saved = tokio::task::spawn_blocking(move || {
                store.save(&snapshot).map_err(|err| (snapshot.document_id.clone(), err))
            })
            .await;
            match saved {
                Ok(Ok(())) => {}
                Ok(Err((id, err))) => log::warn!("failed to save session for {id}: {err}"),
                Err(err) => log::warn!("session write task failed: {err}"),
            }
        }

        for done in waiters {
            let _ = done.send(());
        }
    }
}
