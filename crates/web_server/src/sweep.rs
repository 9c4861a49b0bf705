use std::sync::Arc;
use std::time::Duration;

use booking_engine::BookingEngine;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Manager for the periodic sweep
/// Completes confirmed reservations whose end date has passed and removes
/// expired availability blocks.
pub struct SweepManager {
    engine: Arc<BookingEngine>,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl SweepManager {
    /// Create a new sweep manager over the engine
    pub fn new(engine: Arc<BookingEngine>, period: Duration) -> Self {
        Self {
            engine,
            period,
            handle: None,
        }
    }

    /// Start the sweep loop in a background task
    pub fn start(&mut self) {
        let engine = self.engine.clone();
        let period = self.period;

        log::info!("Starting sweep loop (every {:?})", period);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                match engine.run_sweep(Utc::now()).await {
                    Ok(outcome) => {
                        if outcome.completed > 0 || outcome.expired_blocks > 0 {
                            log::info!(
                                "Sweep pass: {} completed, {} blocks expired",
                                outcome.completed,
                                outcome.expired_blocks
                            );
                        }
                    }
                    Err(e) => {
                        log::error!("Sweep pass failed: {}", e);
                    }
                }
            }
        });
        self.handle = Some(handle);
    }

    /// Stop the sweep loop
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log::info!("Sweep loop stopped");
        }
    }
}

impl Drop for SweepManager {
    fn drop(&mut self) {
        self.stop();
    }
}
