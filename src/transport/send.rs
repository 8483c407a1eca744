//! Asynchronous send
//!
//! `send_async` moves a transport onto a writer thread and returns at once.
//! The bytes go out in slices; a cancelled send stops at the next slice
//! boundary. The transport comes back through the handle either way, so the
//! caller decides whether a partly written stream is still usable (it
//! usually is not).

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};

use super::Transport;
use crate::error::{Result, WireError};

/// Bytes written between cancellation checks
const SEND_SLICE: usize = 16 * 1024;

/// Result of a finished asynchronous send
#[derive(Debug)]
pub struct SendOutcome {
    /// The transport, handed back to the caller
    pub transport: Box<dyn Transport>,

    /// Bytes written before the send finished or stopped
    pub written: usize,

    /// `Ok` once every byte was written and flushed
    pub result: io::Result<()>,
}

impl SendOutcome {
    pub fn is_complete(&self) -> bool {
        self.result.is_ok()
    }
}

/// In-flight asynchronous send
pub struct SendHandle {
    cancelled: Arc<AtomicBool>,
    done: Receiver<SendOutcome>,
}

impl SendHandle {
    /// Ask the writer to stop before its next slice
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True once the outcome is ready to collect
    pub fn is_finished(&self) -> bool {
        !self.done.is_empty()
    }

    /// Collect the outcome if the send has finished
    pub fn try_wait(&self) -> Result<Option<SendOutcome>> {
        match self.done.try_recv() {
            Ok(outcome) => Ok(Some(outcome)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(writer_lost()),
        }
    }

    /// Block until the send finishes
    pub fn wait(self) -> Result<SendOutcome> {
        self.done.recv().map_err(|_| writer_lost())
    }

    /// Block up to `timeout`; `None` if the send is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<SendOutcome>> {
        match self.done.recv_timeout(timeout) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(writer_lost()),
        }
    }
}

impl fmt::Debug for SendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendHandle")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Write `data` to `transport` on a writer thread
pub fn send_async(transport: Box<dyn Transport>, data: Bytes) -> Result<SendHandle> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let writer_cancelled = Arc::clone(&cancelled);
    let (done_tx, done) = channel::bounded(1);

    std::thread::Builder::new()
        .name("wirecall-sender".to_string())
        .spawn(move || {
            let outcome = write_slices(transport, &data, &writer_cancelled);
            if let Err(e) = &outcome.result {
                tracing::debug!("Async send stopped after {} bytes: {}", outcome.written, e);
            }
            // The handle may already be gone; the transport is dropped then
            let _ = done_tx.send(outcome);
        })?;

    Ok(SendHandle { cancelled, done })
}

fn write_slices(
    mut transport: Box<dyn Transport>,
    data: &[u8],
    cancelled: &AtomicBool,
) -> SendOutcome {
    let mut written = 0;
    let mut result = Ok(());

    for slice in data.chunks(SEND_SLICE) {
        if cancelled.load(Ordering::Acquire) {
            result = Err(io::Error::new(io::ErrorKind::Interrupted, "send cancelled"));
            break;
        }
        if let Err(e) = transport.write_all(slice) {
            result = Err(e);
            break;
        }
        written += slice.len();
    }
    if result.is_ok() {
        result = transport.flush();
    }

    SendOutcome {
        transport,
        written,
        result,
    }
}

fn writer_lost() -> WireError {
    WireError::Internal("async send writer exited without a result".to_string())
}
