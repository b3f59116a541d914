// src/rotation/scheduler.rs
//! Periodic timer driving enrollment checks and due rotations

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{debug, warn};

use crate::error::Result;

/// Running scheduler. Stops (and joins its thread) on [`Self::stop`] or drop.
pub struct SchedulerHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    period: Duration,
}

impl SchedulerHandle {
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the stop channel
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Call `on_tick` every `period` on a dedicated thread until stopped.
/// The first call happens one period after start.
pub fn spawn<F>(period: Duration, mut on_tick: F) -> Result<SchedulerHandle>
where
    F: FnMut() + Send + 'static,
{
    let (stop_tx, stop_rx) = bounded::<()>(0);
    let ticker = tick(period);

    let thread = thread::Builder::new()
        .name("key-rotation-scheduler".into())
        .spawn(move || {
            debug!(?period, "scheduler started");
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => on_tick(),
                }
            }
            debug!("scheduler stopped");
        })?;

    Ok(SchedulerHandle {
        stop: Some(stop_tx),
        thread: Some(thread),
        period,
    })
}
