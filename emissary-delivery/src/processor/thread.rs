use std::{
    io,
    thread::{self, JoinHandle},
};

use emissary_common::{Shutdown, Signal, internal};
use tokio::sync::broadcast;

use super::QueueProcessor;

const THREAD_NAME: &str = "QueueProcessorThread";

/// Runs a [`QueueProcessor`] on its own OS thread with a single-threaded
/// runtime, so queue processing never competes with the caller's executor.
///
/// Dropping the handle stops the processor and waits for it, which lets an
/// in-flight delivery finish before the process exits.
#[derive(Debug)]
pub struct QueueProcessorThread {
    sender: broadcast::Sender<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl QueueProcessorThread {
    /// Spawn the thread and start serving.
    ///
    /// # Errors
    /// If the runtime or the thread cannot be created
    pub fn start(processor: QueueProcessor) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (sender, shutdown) = Shutdown::channel();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(processor.serve(shutdown)))?;

        internal!(level = DEBUG, "Started {THREAD_NAME}");

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Ask the processor to stop after the file it is working on.
    pub fn stop(&self) {
        // No receiver left means the thread is already gone
        let _ = self.sender.send(Signal::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the thread to finish without asking it to stop.
    ///
    /// # Errors
    /// With the panic payload if the thread panicked
    pub fn join(mut self) -> thread::Result<()> {
        self.handle.take().map_or(Ok(()), JoinHandle::join)
    }

    /// [`stop`](Self::stop), then [`join`](Self::join).
    ///
    /// # Errors
    /// With the panic payload if the thread panicked
    pub fn shutdown(self) -> thread::Result<()> {
        self.stop();
        self.join()
    }
}

impl Drop for QueueProcessorThread {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop();
            if handle.join().is_err() {
                tracing::error!("{THREAD_NAME} panicked");
            }
        }
    }
}
