//! Server
//!
//! Accepts connections and hands them to the dispatch queue.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::dispatch::{DispatchQueue, DispatchStats, RequestProcessor};
use crate::error::Result;
use crate::protocol::WireConnection;
use crate::transport::{self, Address, Listener};

/// How often the accept loop checks for shutdown
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Signals a running server to stop
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Listener plus dispatch queue
pub struct Server {
    config: Config,
    listener: Box<dyn Listener>,
    queue: DispatchQueue,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind `config.listen_addr` and prepare the dispatch queue
    pub fn bind(config: Config, processor: Arc<dyn RequestProcessor>) -> Result<Self> {
        config.validate()?;
        let address = Address::parse(&config.listen_addr)?;
        let listener = transport::bind(&address, config.backlog)?;
        let queue = DispatchQueue::new(&config, processor)?;

        Ok(Self {
            config,
            listener,
            queue,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    /// Address clients should connect to (resolves port 0)
    pub fn local_address(&self) -> Address {
        self.listener.local_address()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    pub fn stats(&self) -> DispatchStats {
        self.queue.stats()
    }

    /// Accept connections until shut down, then drain the queue (blocking)
    pub fn run(&self) -> Result<()> {
        self.listener.set_nonblocking(true)?;
        tracing::info!("Server accepting on {}", self.local_address());

        while !self.shutdown.is_shutdown() {
            match self.listener.accept() {
                Ok(transport) => self.admit(transport),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // Typically out of file descriptors; back off and keep serving
                    tracing::warn!("Accept failed: {}", e);
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Server shutting down");
        self.queue.shutdown(self.config.admission_timeout());
        Ok(())
    }

    fn admit(&self, transport: Box<dyn transport::Transport>) {
        let conn = WireConnection::new(transport, &self.config);
        if let Err(e) = conn.set_timeouts(&self.config) {
            tracing::warn!("Could not configure connection {}: {}", conn.id(), e);
            return;
        }
        if let Err(e) = self.queue.admit(conn) {
            tracing::debug!("Connection not admitted: {}", e);
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.local_address())
            .field("queue", &self.queue)
            .finish()
    }
}
