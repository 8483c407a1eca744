//! Configuration for wirecall
//!
//! Centralized configuration with sensible defaults. Shared by the client
//! side (connection cache) and the server side (dispatch queue, watcher).

use std::time::Duration;

use crate::error::{Result, WireError};

/// Main configuration for a wirecall client or server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Listen address, `tcp://host:port` or `\\.\pipe\name`
    pub listen_addr: String,

    /// Requested listen backlog (advisory, std picks its own)
    pub backlog: u32,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// Client connect timeout (milliseconds, 0 = none)
    pub connect_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Framing Configuration
    // -------------------------------------------------------------------------
    /// Size of each half (read/write) of the per-connection buffer
    pub buffer_size: usize,

    /// Largest payload accepted when collecting a message body
    pub max_payload_size: usize,

    // -------------------------------------------------------------------------
    // Connection Cache Configuration
    // -------------------------------------------------------------------------
    /// How long an idle client connection is kept, also the sweep interval
    pub keep_alive_ms: u64,

    // -------------------------------------------------------------------------
    // Dispatch Queue Configuration
    // -------------------------------------------------------------------------
    /// Max connections waiting for a worker
    pub max_queued_requests: usize,

    /// Max concurrently running dispatch workers
    pub max_workers: usize,

    /// Spare worker capacity required before idle connections are parked
    /// in the readiness watcher instead of being queued
    pub min_free_workers: usize,

    /// How long admission blocks on a full queue before rejecting
    pub admission_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Readiness Watcher Configuration
    // -------------------------------------------------------------------------
    /// Interval between readiness probes of idle connections
    pub poll_interval_ms: u64,

    /// Idle server connections are closed after this long
    pub idle_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "tcp://127.0.0.1:8085".to_string(),
            backlog: 128,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            connect_timeout_ms: 5000,
            buffer_size: 4096,
            max_payload_size: 16 * 1024 * 1024, // 16 MB
            keep_alive_ms: 30_000,
            max_queued_requests: 256,
            max_workers: 32,
            min_free_workers: 2,
            admission_timeout_ms: 5000,
            poll_interval_ms: 5,
            idle_timeout_ms: 300_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check limits that would make the components unusable
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(WireError::Config("buffer_size must be non-zero".to_string()));
        }
        if self.max_workers == 0 {
            return Err(WireError::Config("max_workers must be non-zero".to_string()));
        }
        if self.min_free_workers > self.max_workers {
            return Err(WireError::Config(format!(
                "min_free_workers ({}) exceeds max_workers ({})",
                self.min_free_workers, self.max_workers
            )));
        }
        if self.keep_alive_ms == 0 {
            return Err(WireError::Config("keep_alive_ms must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the per-direction connection buffer size (in bytes)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Set the largest accepted payload (in bytes)
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the idle keep-alive of cached client connections (in milliseconds)
    pub fn keep_alive_ms(mut self, ms: u64) -> Self {
        self.config.keep_alive_ms = ms;
        self
    }

    pub fn max_queued_requests(mut self, count: usize) -> Self {
        self.config.max_queued_requests = count;
        self
    }

    pub fn max_workers(mut self, count: usize) -> Self {
        self.config.max_workers = count;
        self
    }

    pub fn min_free_workers(mut self, count: usize) -> Self {
        self.config.min_free_workers = count;
        self
    }

    /// Set how long admission waits on a full queue (in milliseconds)
    pub fn admission_timeout_ms(mut self, ms: u64) -> Self {
        self.config.admission_timeout_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set how long an idle server connection is kept (in milliseconds)
    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
