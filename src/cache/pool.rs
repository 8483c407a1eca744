//! Connection pool implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::codec::FillStatus;
use crate::error::{Result, WireError};
use crate::protocol::WireConnection;
use crate::transport::Address;

/// A connection the cache can hold
pub trait Poolable: Send + 'static {
    /// Release the underlying resources
    fn close(&mut self);

    /// Cheap check run before an idle connection is handed out again
    fn is_alive(&mut self) -> bool {
        true
    }
}

impl Poolable for WireConnection {
    fn close(&mut self) {
        WireConnection::close(self);
    }

    fn is_alive(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }
        // An idle client connection must have nothing to read: data means
        // the stream is out of sync, EOF means the server hung up
        match self.poll_readable() {
            Ok(FillStatus::Pending) => true,
            Ok(FillStatus::Ready(_)) | Ok(FillStatus::Closed) => false,
            Err(e) => {
                tracing::debug!("Connection {} failed liveness check: {}", self.id(), e);
                false
            }
        }
    }
}

struct IdleConnection<C> {
    conn: C,
    last_used: Instant,
}

/// Idle connections for one destination, most recently stored last
struct PoolEntry<C> {
    idle: Mutex<Vec<IdleConnection<C>>>,
}

impl<C> PoolEntry<C> {
    fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }
}

struct CacheInner<C> {
    pools: Mutex<HashMap<Address, Arc<PoolEntry<C>>>>,
    keep_alive: Duration,
    closed: AtomicBool,
}

impl<C: Poolable> CacheInner<C> {
    fn entry(&self, destination: &Address) -> Arc<PoolEntry<C>> {
        let mut pools = self.pools.lock();
        Arc::clone(
            pools
                .entry(destination.clone())
                .or_insert_with(|| Arc::new(PoolEntry::new())),
        )
    }

    fn existing_entry(&self, destination: &Address) -> Option<Arc<PoolEntry<C>>> {
        self.pools.lock().get(destination).cloned()
    }

    fn snapshot(&self) -> Vec<(Address, Arc<PoolEntry<C>>)> {
        self.pools
            .lock()
            .iter()
            .map(|(address, entry)| (address.clone(), Arc::clone(entry)))
            .collect()
    }

    fn evict_expired(&self, now: Instant) -> usize {
        let mut evicted = 0;
        for (address, entry) in self.snapshot() {
            let expired: Vec<IdleConnection<C>> = {
                let mut idle = entry.idle.lock();
                let (expired, kept): (Vec<_>, Vec<_>) = idle
                    .drain(..)
                    .partition(|c| now.saturating_duration_since(c.last_used) > self.keep_alive);
                *idle = kept;
                expired
            };
            for mut idle in expired {
                tracing::debug!("Evicting idle connection to {}", address);
                idle.conn.close();
                evicted += 1;
            }
        }
        evicted
    }

    fn close_all(&self) -> usize {
        let mut closed = 0;
        for (_, entry) in self.snapshot() {
            let idle: Vec<IdleConnection<C>> = entry.idle.lock().drain(..).collect();
            for mut idle in idle {
                idle.conn.close();
                closed += 1;
            }
        }
        closed
    }
}

struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Pool of idle connections keyed by destination
pub struct ConnectionCache<C: Poolable = WireConnection> {
    inner: Arc<CacheInner<C>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<C: Poolable> ConnectionCache<C> {
    /// Create a cache and start its sweeper
    ///
    /// The sweep runs every `keep_alive` and evicts connections idle for
    /// longer than `keep_alive`, which must be non-zero.
    pub fn new(keep_alive: Duration) -> Result<Self> {
        if keep_alive.is_zero() {
            return Err(WireError::Config("keep_alive must be non-zero".to_string()));
        }

        let inner = Arc::new(CacheInner {
            pools: Mutex::new(HashMap::new()),
            keep_alive,
            closed: AtomicBool::new(false),
        });

        let (stop, stop_rx) = channel::bounded::<()>(1);
        let sweeper_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("wirecall-cache-sweeper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(keep_alive) {
                    Err(RecvTimeoutError::Timeout) => {
                        let evicted = sweeper_inner.evict_expired(Instant::now());
                        if evicted > 0 {
                            tracing::debug!("Cache sweep evicted {} connections", evicted);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            inner,
            sweeper: Mutex::new(Some(Sweeper { stop, handle })),
        })
    }

    /// Idle time after which a connection is evicted
    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive
    }

    /// Pop the most recently stored idle connection for `destination`
    ///
    /// Connections past their keep-alive, or that fail `is_alive`, are
    /// closed and skipped.
    pub fn take(&self, destination: &Address) -> Option<C> {
        let entry = self.inner.existing_entry(destination)?;
        loop {
            let mut idle = entry.idle.lock().pop()?;
            if idle.last_used.elapsed() > self.inner.keep_alive {
                tracing::debug!("Discarding expired connection to {}", destination);
                idle.conn.close();
                continue;
            }
            if !idle.conn.is_alive() {
                tracing::debug!("Discarding dead connection to {}", destination);
                idle.conn.close();
                continue;
            }
            return Some(idle.conn);
        }
    }

    /// Reuse an idle connection or open a new one with `connect`
    pub fn get<F>(&self, destination: &Address, connect: F) -> Result<C>
    where
        F: FnOnce() -> Result<C>,
    {
        if let Some(conn) = self.take(destination) {
            tracing::trace!("Reusing cached connection to {}", destination);
            return Ok(conn);
        }
        tracing::trace!("No idle connection to {}, connecting", destination);
        connect()
    }

    /// Return a connection to the idle list of `destination`
    pub fn store(&self, destination: &Address, mut conn: C) {
        if self.inner.closed.load(Ordering::Acquire) {
            conn.close();
            return;
        }
        let entry = self.inner.entry(destination);
        entry.idle.lock().push(IdleConnection {
            conn,
            last_used: Instant::now(),
        });
    }

    /// Idle connections currently held for `destination`
    pub fn idle_count(&self, destination: &Address) -> usize {
        self.inner
            .existing_entry(destination)
            .map_or(0, |entry| entry.idle.lock().len())
    }

    /// Idle connections across all destinations
    pub fn total_idle(&self) -> usize {
        self.inner
            .snapshot()
            .iter()
            .map(|(_, entry)| entry.idle.lock().len())
            .sum()
    }

    /// Run one sweep now, returning how many connections were closed
    pub fn evict_expired(&self) -> usize {
        self.inner.evict_expired(Instant::now())
    }

    /// Stop the sweeper and close every idle connection
    ///
    /// Connections stored afterwards are closed immediately.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sweeper) = self.sweeper.lock().take() {
            let _ = sweeper.stop.send(());
            if sweeper.handle.join().is_err() {
                tracing::warn!("Cache sweeper thread panicked");
            }
        }
        let closed = self.inner.close_all();
        tracing::debug!("Connection cache shut down, closed {} idle connections", closed);
    }
}

impl<C: Poolable> Drop for ConnectionCache<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C: Poolable> std::fmt::Debug for ConnectionCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("keep_alive", &self.inner.keep_alive)
            .field("total_idle", &self.total_idle())
            .finish()
    }
}

