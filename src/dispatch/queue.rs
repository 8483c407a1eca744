//! Request dispatch queue
//!
//! Admission control and bounded-concurrency dispatch for inbound
//! connections.
//!
//! ## Admission
//! - Spare worker capacity above `min_free_workers`: park the connection in
//!   the readiness watcher until its next request arrives.
//! - Otherwise: queue it. A queued connection starts a worker while fewer
//!   than `max_workers` run, else waits in a FIFO of `max_queued_requests`.
//! - Queue full: the connection waits up to `admission_timeout` for a slot,
//!   then is rejected with ServerBusy and closed. The accept path blocks for
//!   that wait. Connections coming back from the readiness watcher join the
//!   admission list instead, so the watcher thread never blocks; a freed
//!   worker or queue slot takes the oldest entry and the admission timer
//!   rejects entries past their deadline.
//!
//! ## Workers
//! A worker serves one request at a time, re-arms the wait on its
//! connection, then takes the next queued connection until none is left.

use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::watcher::ReadinessWatcher;
use crate::config::Config;
use crate::error::{Result, WireError};
use crate::protocol::WireConnection;

/// Serves requests for the dispatch queue
pub trait RequestProcessor: Send + Sync + 'static {
    /// Read one request from `conn`, handle it and send the reply
    ///
    /// Errors the peer should see as a normal reply (application errors)
    /// must be answered here. An `Err` makes the queue send an error frame
    /// and close the connection.
    fn process(&self, conn: &mut WireConnection) -> Result<()>;
}

/// A connection waiting for a worker
struct QueuedRequest {
    conn: WireConnection,
    queued_at: Instant,
}

/// A ready connection waiting for a queue slot
struct Admitting {
    conn: WireConnection,
    queued_at: Instant,
    deadline: Instant,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedRequest>,
    admitting: VecDeque<Admitting>,
    active_workers: usize,
    shutting_down: bool,
    processed: u64,
    rejected: u64,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub active_workers: usize,
    pub queued: usize,
    pub admitting: usize,
    pub watched: usize,
    pub processed: u64,
    pub rejected: u64,
}

struct Limits {
    max_queued: usize,
    max_workers: usize,
    min_free_workers: usize,
    admission_timeout: Duration,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when a queue slot frees up
    space: Condvar,
    /// Signalled when the last worker retires
    idle: Condvar,
    /// Signalled when the admission list gains an entry or shutdown starts
    admission: Condvar,
    limits: Limits,
    processor: Arc<dyn RequestProcessor>,
    watcher: ReadinessWatcher,
}

/// Server-side dispatcher with a bounded worker count
pub struct DispatchQueue {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchQueue {
    /// Create a queue and its readiness watcher
    pub fn new(config: &Config, processor: Arc<dyn RequestProcessor>) -> Result<Self> {
        config.validate()?;
        let watcher = ReadinessWatcher::new(config.poll_interval(), config.idle_timeout())?;
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            space: Condvar::new(),
            idle: Condvar::new(),
            admission: Condvar::new(),
            limits: Limits {
                max_queued: config.max_queued_requests,
                max_workers: config.max_workers,
                min_free_workers: config.min_free_workers,
                admission_timeout: config.admission_timeout(),
            },
            processor,
            watcher,
        });

        let timer_shared = Arc::clone(&shared);
        let timer = std::thread::Builder::new()
            .name("wirecall-admission".to_string())
            .spawn(move || run_admission_timer(&timer_shared))?;

        Ok(Self {
            shared,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Admit a newly accepted connection
    ///
    /// Returns `Err(Overloaded)` if the connection was rejected.
    pub fn admit(&self, conn: WireConnection) -> Result<()> {
        admit(&self.shared, conn)
    }

    /// Queue a connection for a worker right away
    pub fn enqueue(&self, conn: WireConnection) -> Result<()> {
        enqueue(&self.shared, conn)
    }

    pub fn stats(&self) -> DispatchStats {
        let state = self.shared.state.lock();
        DispatchStats {
            active_workers: state.active_workers,
            queued: state.pending.len(),
            admitting: state.admitting.len(),
            watched: self.shared.watcher.watched_count(),
            processed: state.processed,
            rejected: state.rejected,
        }
    }

    /// Stop admitting, wait up to `timeout` for workers to finish, then
    /// close everything still queued or parked
    ///
    /// Returns true if all workers finished in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let drained = {
            let mut state = self.shared.state.lock();
            state.shutting_down = true;
            self.shared.space.notify_all();
            self.shared.admission.notify_all();
            while state.active_workers > 0 {
                if self
                    .shared
                    .idle
                    .wait_until(&mut state, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            state.active_workers == 0
        };

        let leftover: Vec<WireConnection> = {
            let mut state = self.shared.state.lock();
            let mut conns: Vec<WireConnection> = state.pending.drain(..).map(|q| q.conn).collect();
            conns.extend(state.admitting.drain(..).map(|a| a.conn));
            conns
        };
        for mut conn in leftover {
            reject(&mut conn, &WireError::Shutdown);
        }
        if let Some(timer) = self.timer.lock().take() {
            if timer.join().is_err() {
                tracing::warn!("Admission timer thread panicked");
            }
        }
        self.shared.watcher.shutdown();

        if drained {
            tracing::info!("Dispatch queue drained");
        } else {
            tracing::warn!("Dispatch queue shutdown timed out with workers still running");
        }
        drained
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        let already = self.shared.state.lock().shutting_down;
        if !already {
            self.shutdown(self.shared.limits.admission_timeout);
        }
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Admission
// =============================================================================

fn admit(shared: &Arc<Shared>, mut conn: WireConnection) -> Result<()> {
    let free = {
        let state = shared.state.lock();
        if state.shutting_down {
            drop(state);
            reject(&mut conn, &WireError::Shutdown);
            return Err(WireError::Shutdown);
        }
        shared.limits.max_workers.saturating_sub(state.active_workers)
    };

    if free > shared.limits.min_free_workers {
        park(shared, conn);
        Ok(())
    } else {
        enqueue(shared, conn)
    }
}

/// Wait for the next request on `conn` without holding a worker
fn park(shared: &Arc<Shared>, conn: WireConnection) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let result = shared.watcher.watch(conn, move |mut conn| match weak.upgrade() {
        Some(shared) => dispatch_ready(&shared, conn),
        None => conn.close(),
    });
    if let Err(e) = result {
        tracing::debug!("Could not park connection: {}", e);
    }
}

enum Placement {
    /// A worker slot was reserved; the caller spawns it
    Spawn(WireConnection),
    Queued,
    Full(WireConnection),
}

/// Hand `conn` to a new worker or the FIFO if either has room
fn place(shared: &Shared, state: &mut QueueState, conn: WireConnection) -> Placement {
    if state.active_workers < shared.limits.max_workers {
        state.active_workers += 1;
        return Placement::Spawn(conn);
    }
    if state.pending.len() < shared.limits.max_queued {
        state.pending.push_back(QueuedRequest {
            conn,
            queued_at: Instant::now(),
        });
        return Placement::Queued;
    }
    Placement::Full(conn)
}

/// Blocking admission, used on the accept path
fn enqueue(shared: &Arc<Shared>, mut conn: WireConnection) -> Result<()> {
    let mut state = shared.state.lock();
    let deadline = Instant::now() + shared.limits.admission_timeout;
    let mut timed_out = false;

    loop {
        if state.shutting_down {
            drop(state);
            reject(&mut conn, &WireError::Shutdown);
            return Err(WireError::Shutdown);
        }

        conn = match place(shared, &mut state, conn) {
            Placement::Spawn(conn) => {
                drop(state);
                return spawn_worker(shared, conn);
            }
            Placement::Queued => return Ok(()),
            Placement::Full(conn) => conn,
        };

        if timed_out {
            state.rejected += 1;
            drop(state);
            reject_overloaded(&mut conn);
            return Err(WireError::Overloaded);
        }
        timed_out = shared.space.wait_until(&mut state, deadline).timed_out();
    }
}

/// Non-blocking admission for connections the watcher found ready
fn dispatch_ready(shared: &Arc<Shared>, mut conn: WireConnection) {
    let mut state = shared.state.lock();
    if state.shutting_down {
        drop(state);
        reject(&mut conn, &WireError::Shutdown);
        return;
    }

    match place(shared, &mut state, conn) {
        Placement::Spawn(conn) => {
            drop(state);
            if let Err(e) = spawn_worker(shared, conn) {
                tracing::debug!("Ready connection not dispatched: {}", e);
            }
        }
        Placement::Queued => {}
        Placement::Full(conn) => {
            let now = Instant::now();
            state.admitting.push_back(Admitting {
                conn,
                queued_at: now,
                deadline: now + shared.limits.admission_timeout,
            });
            shared.admission.notify_one();
        }
    }
}

/// Reject admission-list entries once their deadline passes
fn run_admission_timer(shared: &Shared) {
    let mut state = shared.state.lock();
    while !state.shutting_down {
        let now = Instant::now();
        let mut expired = Vec::new();
        // Every entry gets the same timeout, so deadlines are in FIFO order
        while state.admitting.front().is_some_and(|a| a.deadline <= now) {
            if let Some(admitting) = state.admitting.pop_front() {
                expired.push(admitting.conn);
            }
        }

        if !expired.is_empty() {
            state.rejected += expired.len() as u64;
            MutexGuard::unlocked(&mut state, || {
                for mut conn in expired {
                    reject_overloaded(&mut conn);
                }
            });
            continue;
        }

        match state.admitting.front().map(|a| a.deadline) {
            Some(deadline) => {
                shared.admission.wait_until(&mut state, deadline);
            }
            None => shared.admission.wait(&mut state),
        }
    }
    tracing::debug!("Admission timer stopped");
}

fn reject_overloaded(conn: &mut WireConnection) {
    tracing::warn!(
        "Rejecting connection {} from {}: server overloaded",
        conn.id(),
        conn.remote_address()
    );
    reject(conn, &WireError::Overloaded);
}

/// Report `error` to the peer and close the connection
fn reject(conn: &mut WireConnection, error: &WireError) {
    if let Err(e) = conn.send_error(error.status_code(), &error.to_string()) {
        tracing::debug!("Could not send rejection to connection {}: {}", conn.id(), e);
    }
    conn.close();
}

// =============================================================================
// Workers
// =============================================================================

fn spawn_worker(shared: &Arc<Shared>, conn: WireConnection) -> Result<()> {
    let worker_shared = Arc::clone(shared);
    let conn_slot = Arc::new(Mutex::new(Some(conn)));
    let worker_slot = Arc::clone(&conn_slot);

    let spawned = std::thread::Builder::new()
        .name("wirecall-worker".to_string())
        .spawn(move || {
            if let Some(conn) = worker_slot.lock().take() {
                run_worker(&worker_shared, conn);
            }
        });

    match spawned {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::error!("Failed to spawn dispatch worker: {}", e);
            retire_worker(shared);
            if let Some(mut conn) = conn_slot.lock().take() {
                reject(&mut conn, &WireError::Internal("no worker available".to_string()));
            }
            Err(WireError::Io(e))
        }
    }
}

fn run_worker(shared: &Arc<Shared>, conn: WireConnection) {
    let mut current = Some(conn);
    while let Some(conn) = current.take() {
        serve_connection(shared, conn);
        current = next_pending(shared);
    }
}

/// Serve requests on `conn` while they are already buffered, then park it
fn serve_connection(shared: &Arc<Shared>, mut conn: WireConnection) {
    loop {
        if !serve_one(shared, &mut conn) {
            return;
        }
        if !conn.has_buffered_data() {
            break;
        }
    }

    if shared.state.lock().shutting_down {
        conn.close();
    } else {
        park(shared, conn);
    }
}

/// Serve a single request; false once the connection is closed
fn serve_one(shared: &Shared, conn: &mut WireConnection) -> bool {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.processor.process(conn)))
        .unwrap_or_else(|_| Err(WireError::Internal("request processor panicked".to_string())));
    shared.state.lock().processed += 1;

    match outcome {
        Ok(()) => conn.is_connected(),
        Err(WireError::Io(ref e)) if is_disconnect(e) => {
            tracing::debug!("Connection {} ended: {}", conn.id(), e);
            conn.close();
            false
        }
        Err(WireError::Io(e)) => {
            tracing::warn!("I/O error on connection {}: {}", conn.id(), e);
            conn.close();
            false
        }
        Err(e) => {
            tracing::warn!("Request on connection {} failed: {}", conn.id(), e);
            reject(conn, &e);
            false
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// Take the next queued connection, or retire this worker
fn next_pending(shared: &Arc<Shared>) -> Option<WireConnection> {
    let mut state = shared.state.lock();
    if let Some(queued) = state.pending.pop_front() {
        // The freed slot goes to the oldest admission entry first
        match state.admitting.pop_front() {
            Some(admitting) => state.pending.push_back(QueuedRequest {
                conn: admitting.conn,
                queued_at: admitting.queued_at,
            }),
            None => {
                shared.space.notify_one();
            }
        }
        tracing::trace!(
            "Connection {} waited {:?} in queue",
            queued.conn.id(),
            queued.queued_at.elapsed()
        );
        return Some(queued.conn);
    }

    match state.admitting.pop_front() {
        Some(admitting) => {
            tracing::trace!(
                "Connection {} waited {:?} for admission",
                admitting.conn.id(),
                admitting.queued_at.elapsed()
            );
            Some(admitting.conn)
        }
        None => {
            state.active_workers -= 1;
            if state.active_workers == 0 {
                shared.idle.notify_all();
            }
            // Admitters blocked on a full queue may now start a worker
            shared.space.notify_all();
            None
        }
    }
}

fn retire_worker(shared: &Shared) {
    let mut state = shared.state.lock();
    state.active_workers = state.active_workers.saturating_sub(1);
    if state.active_workers == 0 {
        shared.idle.notify_all();
    }
}
