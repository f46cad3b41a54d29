//! The single protocol thread.
//!
//! One OS thread drives a current-thread tokio runtime that executes posted
//! work items one at a time, in the order they were posted. Only work items
//! touch the [`StackContext`].

use chipctl_core::{ChipError, Result};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use crate::options::StackOptions;
use crate::stack::StackContext;

/// A unit of work executed on the protocol thread
pub type Work = Box<dyn FnOnce(&mut StackContext, &LoopHandle) + Send + 'static>;

enum Message {
    Work(Work),
    Stop,
}

/// Posts work onto the protocol thread from anywhere
#[derive(Clone)]
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<Message>,
    runtime: Handle,
}

impl LoopHandle {
    /// Queue a work item behind everything already queued
    pub fn schedule_work<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&mut StackContext, &LoopHandle) + Send + 'static,
    {
        self.tx
            .send(Message::Work(Box::new(work)))
            .map_err(|_| ChipError::Internal("protocol loop is not running".into()))
    }

    /// Queue a work item once `delay` has elapsed
    pub fn schedule_after<F>(&self, delay: Duration, work: F) -> Result<()>
    where
        F: FnOnce(&mut StackContext, &LoopHandle) + Send + 'static,
    {
        if self.tx.is_closed() {
            return Err(ChipError::Internal("protocol loop is not running".into()));
        }
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(Message::Work(Box::new(work))).is_err() {
                trace!("timer fired after the protocol loop stopped");
            }
        });
        Ok(())
    }

    /// Ask the loop to exit after the work already queued
    pub fn stop(&self) {
        // Already stopped is fine.
        let _ = self.tx.send(Message::Stop);
    }

    /// Returns true once the loop has exited
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner of the protocol thread
pub struct ProtocolLoop {
    handle: LoopHandle,
    thread: Option<JoinHandle<()>>,
}

impl ProtocolLoop {
    /// Start the loop with a fresh stack context
    pub fn start(options: StackOptions) -> Result<Self> {
        Self::start_with(move || StackContext::new(options))
    }

    /// Start the loop; `make_stack` runs on the protocol thread
    pub fn start_with<F>(make_stack: F) -> Result<Self>
    where
        F: FnOnce() -> StackContext + Send + 'static,
    {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = LoopHandle {
            tx,
            runtime: runtime.handle().clone(),
        };

        let loop_handle = handle.clone();
        let thread = std::thread::Builder::new()
            .name("chipctl-protocol".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut stack = make_stack();
                    debug!("protocol loop started");
                    while let Some(message) = rx.recv().await {
                        match message {
                            Message::Work(work) => work(&mut stack, &loop_handle),
                            Message::Stop => break,
                        }
                    }
                    rx.close();
                    debug!("protocol loop stopped");
                });
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Handle for posting work
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Run `work` on the protocol thread and wait for its result
    pub async fn call<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut StackContext, &LoopHandle) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.handle.schedule_work(move |stack, handle| {
            // The caller may have given up waiting.
            let _ = tx.send(work(stack, handle));
        })?;
        rx.await
            .map_err(|_| ChipError::Internal("protocol loop dropped a work item".into()))
    }

    /// Stop the loop and join its thread
    pub fn shutdown(&mut self) -> Result<()> {
        self.handle.stop();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| {
                error!("protocol thread panicked");
                ChipError::Internal("protocol thread panicked".into())
            }),
            None => Ok(()),
        }
    }
}

impl Drop for ProtocolLoop {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "protocol loop did not shut down cleanly");
        }
    }
}
