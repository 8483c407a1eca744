//! Readiness watcher
//!
//! One thread parks every idle server connection and probes it with a
//! non-blocking fill of its read buffer. When bytes arrive the connection
//! is handed to its callback; idle connections cost no thread of their own.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::codec::FillStatus;
use crate::error::{Result, WireError};
use crate::protocol::WireConnection;

/// Called on the watcher thread once a connection has data
pub type ReadyCallback = Box<dyn FnOnce(WireConnection) + Send>;

/// Cancels one outstanding wait
#[derive(Debug, Clone)]
pub struct WatchHandle {
    connection_id: u64,
    cancelled: Arc<AtomicBool>,
}

impl WatchHandle {
    /// Stop waiting; the watcher closes the connection on its next pass
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }
}

struct Watched {
    conn: WireConnection,
    on_ready: ReadyCallback,
    cancelled: Arc<AtomicBool>,
    since: Instant,
}

enum Command {
    Watch(Watched),
    Shutdown,
}

/// Waits for data on idle connections without a thread per connection
pub struct ReadinessWatcher {
    commands: Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
    watched: Arc<AtomicUsize>,
}

impl ReadinessWatcher {
    /// Start the watcher thread
    pub fn new(poll_interval: Duration, idle_timeout: Duration) -> Result<Self> {
        let (commands, rx) = channel::unbounded();
        let watched = Arc::new(AtomicUsize::new(0));
        let thread_watched = Arc::clone(&watched);
        let handle = std::thread::Builder::new()
            .name("wirecall-watcher".to_string())
            .spawn(move || run(rx, poll_interval, idle_timeout, thread_watched))?;

        Ok(Self {
            commands,
            handle: Mutex::new(Some(handle)),
            watched,
        })
    }

    /// Wait for the next request on `conn`, then call `on_ready` with it
    ///
    /// Fails with `Shutdown` (closing the connection) once the watcher has
    /// stopped.
    pub fn watch<F>(&self, conn: WireConnection, on_ready: F) -> Result<WatchHandle>
    where
        F: FnOnce(WireConnection) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = WatchHandle {
            connection_id: conn.id(),
            cancelled: Arc::clone(&cancelled),
        };
        let watched = Watched {
            conn,
            on_ready: Box::new(on_ready),
            cancelled,
            since: Instant::now(),
        };

        self.watched.fetch_add(1, Ordering::AcqRel);
        if let Err(channel::SendError(Command::Watch(mut rejected))) =
            self.commands.send(Command::Watch(watched))
        {
            self.watched.fetch_sub(1, Ordering::AcqRel);
            rejected.conn.close();
            return Err(WireError::Shutdown);
        }
        Ok(handle)
    }

    /// Connections currently waiting for data
    pub fn watched_count(&self) -> usize {
        self.watched.load(Ordering::Acquire)
    }

    /// Stop the thread and close every parked connection
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if handle.join().is_err() {
            tracing::warn!("Readiness watcher thread panicked");
        }
    }
}

impl Drop for ReadinessWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ReadinessWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessWatcher")
            .field("watched", &self.watched_count())
            .finish()
    }
}

fn run(
    commands: Receiver<Command>,
    poll_interval: Duration,
    idle_timeout: Duration,
    count: Arc<AtomicUsize>,
) {
    let mut watched: Vec<Watched> = Vec::new();

    'outer: loop {
        // Sleep until work arrives when nothing is parked
        let first = if watched.is_empty() {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        } else {
            match commands.recv_timeout(poll_interval) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        let mut next = first;
        while let Some(command) = next.take() {
            match command {
                Command::Watch(w) => watched.push(w),
                Command::Shutdown => break 'outer,
            }
            next = match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break 'outer,
            };
        }

        probe(&mut watched, idle_timeout, &count);
    }

    // Registrations that raced with shutdown
    while let Ok(command) = commands.try_recv() {
        if let Command::Watch(w) = command {
            watched.push(w);
        }
    }
    for mut w in watched.drain(..) {
        w.conn.close();
        count.fetch_sub(1, Ordering::AcqRel);
    }
    tracing::debug!("Readiness watcher stopped");
}

fn probe(watched: &mut Vec<Watched>, idle_timeout: Duration, count: &AtomicUsize) {
    let mut i = 0;
    while i < watched.len() {
        let w = &mut watched[i];

        if w.cancelled.load(Ordering::Acquire) {
            let mut w = watched.swap_remove(i);
            tracing::trace!("Wait on connection {} cancelled", w.conn.id());
            w.conn.close();
            count.fetch_sub(1, Ordering::AcqRel);
            continue;
        }

        match w.conn.poll_readable() {
            Ok(FillStatus::Pending) => {
                if w.since.elapsed() > idle_timeout {
                    let mut w = watched.swap_remove(i);
                    tracing::debug!("Closing idle connection {}", w.conn.id());
                    w.conn.close();
                    count.fetch_sub(1, Ordering::AcqRel);
                } else {
                    i += 1;
                }
            }
            Ok(FillStatus::Ready(_)) => {
                let w = watched.swap_remove(i);
                count.fetch_sub(1, Ordering::AcqRel);
                (w.on_ready)(w.conn);
            }
            Ok(FillStatus::Closed) => {
                let mut w = watched.swap_remove(i);
                tracing::debug!("Connection {} closed by peer", w.conn.id());
                w.conn.close();
                count.fetch_sub(1, Ordering::AcqRel);
            }
            Err(e) => {
                let mut w = watched.swap_remove(i);
                tracing::debug!("Connection {} failed while idle: {}", w.conn.id(), e);
                w.conn.close();
                count.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}
