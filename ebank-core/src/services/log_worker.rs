//! Transaction log worker
//!
//! Drains a sink subscription on its own thread and forwards each event to a
//! `TransactionLog`, keeping file I/O off the sink's critical section and off
//! push-delivery threads. The worker ends when the sink releases its
//! subscribers (on close) or is dropped.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::domain::RecordedEvent;
use crate::ports::TransactionLog;

pub struct TransactionLogWorker {
    handle: Option<JoinHandle<usize>>,
}

impl TransactionLogWorker {
    /// Spawn a worker that writes `backlog` and then every event from `rx`
    pub fn spawn(
        log: Arc<dyn TransactionLog>,
        backlog: Vec<RecordedEvent>,
        rx: Receiver<RecordedEvent>,
    ) -> std::io::Result<Self> {
        let name = format!("txlog-{}", log.name());
        let handle = thread::Builder::new().name(name).spawn(move || {
            let mut written = 0;
            for recorded in backlog.into_iter().chain(rx.iter()) {
                // Events with no account have no per-account stream to go to
                if let Some(account_id) = &recorded.account_id {
                    log.append(account_id, &recorded.event);
                    written += 1;
                }
            }
            written
        })?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the worker to drain; returns how many events it wrote
    ///
    /// Only returns once the sink has released the subscription.
    pub fn join(mut self) -> usize {
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or(0)
    }
}
