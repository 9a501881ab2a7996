//! Fire-and-forget persistence worker.
//!
//! Store writes run on a dedicated thread fed by an unbounded queue, so a slow
//! or failing database never delays the live broadcast. Failures are logged
//! and dropped; nothing is retried.

use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, oneshot};

use crate::store::{BusStore, BusUpdate};

/// A single store write.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    Upsert { bus_number: String, update: BusUpdate },
    SetActive { bus_number: String, active: bool },
}

enum Job {
    Write(PersistOp),
    Flush(oneshot::Sender<()>),
}

/// Handle to the persistence thread. Dropping it lets the thread drain its
/// queue and exit.
pub struct Persister {
    tx: mpsc::UnboundedSender<Job>,
}

impl Persister {
    /// Spawns the worker thread for `store`.
    pub fn spawn(store: Arc<dyn BusStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        thread::spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                match job {
                    Job::Write(op) => apply(store.as_ref(), op),
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Persistence worker stopped");
        });

        Self { tx }
    }

    /// Queues a write. Never blocks.
    pub fn submit(&self, op: PersistOp) {
        if self.tx.send(Job::Write(op)).is_err() {
            tracing::error!("Persistence worker is gone, dropping write");
        }
    }

    /// Waits until every write queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

fn apply(store: &dyn BusStore, op: PersistOp) {
    match op {
        PersistOp::Upsert { bus_number, update } => {
            if let Err(e) = store.upsert_bus(&bus_number, &update) {
                tracing::warn!(bus_number = %bus_number, ?e, "Failed to upsert bus");
            }
        }
        PersistOp::SetActive { bus_number, active } => match store.set_active(&bus_number, active) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(bus_number = %bus_number, active, "No bus record to update");
            }
            Err(e) => {
                tracing::warn!(bus_number = %bus_number, active, ?e, "Failed to set bus active flag");
            }
        },
    }
}
