// src/listen/scheduler.rs
//! Lifecycle of the background poll loop: `Created -> Running -> Stopped`.
//!
//! Stop is cooperative. The loop checks the running flag before each cycle,
//! so an in-flight cycle (bounded by the fetch/publish timeouts) always runs
//! to completion. A stopped listener cannot be restarted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ActivityPoller, ListenerConfig};
use crate::broadcast::PublishSink;
use crate::error::ListenerError;
use crate::listen::types::ActivitySource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Running,
    Stopped,
}

pub struct ActivityListener {
    cfg: ListenerConfig,
    source: Arc<dyn ActivitySource>,
    sink: Arc<dyn PublishSink>,
    state: ListenerState,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl ActivityListener {
    pub fn new(
        cfg: ListenerConfig,
        source: Arc<dyn ActivitySource>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        Self {
            cfg,
            source,
            sink,
            state: ListenerState::Created,
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            task: None,
        }
    }

    /// `new` + `start`. Must be called from within a tokio runtime.
    pub fn spawn(
        cfg: ListenerConfig,
        source: Arc<dyn ActivitySource>,
        sink: Arc<dyn PublishSink>,
    ) -> Result<Self, ListenerError> {
        let mut listener = Self::new(cfg, source, sink);
        listener.start()?;
        Ok(listener)
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Build the cache and launch the poll loop. Returns immediately.
    pub fn start(&mut self) -> Result<(), ListenerError> {
        if self.state != ListenerState::Created {
            return Err(ListenerError::AlreadyStarted);
        }

        let poller = ActivityPoller::new(
            self.cfg.clone(),
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
        )?;

        self.running.store(true, Ordering::SeqCst);
        self.task = Some(tokio::spawn(run(
            poller,
            Arc::clone(&self.running),
            Arc::clone(&self.wake),
            self.cfg.poll_interval,
        )));
        self.state = ListenerState::Running;

        info!(
            target: "listener",
            portfolio_id = %self.cfg.portfolio_id,
            cache_capacity = self.cfg.cache_capacity,
            poll_interval_ms = self.cfg.poll_interval.as_millis() as u64,
            "activity listener started"
        );
        Ok(())
    }

    /// Ask the loop to exit after its current cycle and wait until it has.
    pub async fn stop(&mut self) -> Result<(), ListenerError> {
        if self.state != ListenerState::Running {
            return Err(ListenerError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
        self.state = ListenerState::Stopped;

        let Some(task) = self.task.take() else {
            return Err(ListenerError::NotRunning);
        };
        task.await.map_err(|e| ListenerError::Join(e.to_string()))?;

        info!(target: "listener", "activity listener stopped");
        Ok(())
    }
}

impl Drop for ActivityListener {
    fn drop(&mut self) {
        // Detached loop still exits on its own at the next flag check.
        if self.state == ListenerState::Running {
            self.running.store(false, Ordering::SeqCst);
            self.wake.notify_one();
        }
    }
}

async fn run(
    mut poller: ActivityPoller,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    interval: Duration,
) {
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        // Errors are logged inside the cycle.
        if let Ok(stats) = poller.poll_cycle().await {
            debug!(
                target: "listener",
                pages = stats.pages,
                fetched = stats.fetched,
                published = stats.published,
                duplicates = stats.duplicates,
                unencodable = stats.unencodable,
                publish_failures = stats.publish_failures,
                "poll cycle finished"
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wake.notified() => {}
        }
    }
    debug!(target: "listener", cached = poller.cache().len(), "poll loop exited");
}
