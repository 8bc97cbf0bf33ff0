use super::config::CLOCK_CHANNEL_CAPACITY;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Time zero of a fresh sequence
    Start,
    Periodic,
}

/// Shared refresh clock for one entity type.
///
/// A single timer task broadcasts a tick every `period`. Every call to
/// [`Clock::ticks`] starts a fresh sequence whose first tick is immediate and
/// whose later ticks follow the shared timer, so all pipelines of a type poll
/// in phase.
#[derive(Debug)]
pub struct Clock {
    period: Duration,
    tx: broadcast::Sender<Tick>,
}

impl Clock {
    /// Spawns the timer task. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(period: Duration, shutdown: CancellationToken) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(CLOCK_CHANNEL_CAPACITY);
        let sender = tx.clone();

        tokio::spawn(async move {
            Self::run(period, sender, shutdown).await;
        });

        Arc::new(Self { period, tx })
    }

    async fn run(period: Duration, tx: broadcast::Sender<Tick>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("⏱️  Refresh clock started ({}s period)", period.as_secs());

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("⏱️  Refresh clock shutting down");
                    break;
                }
                _ = interval.tick() => {
                    // No receivers just means no pipeline is alive yet
                    let receivers = tx.send(Tick::Periodic).unwrap_or(0);
                    debug!("⏱️  TICK -> {} pipelines", receivers);
                }
            }
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub fn ticks(&self) -> Ticks {
        Ticks {
            primed: true,
            rx: self.tx.subscribe(),
        }
    }
}

/// One restartable tick sequence.
#[derive(Debug)]
pub struct Ticks {
    primed: bool,
    rx: broadcast::Receiver<Tick>,
}

impl Ticks {
    /// Waits for the next tick. Returns `None` once the clock has stopped.
    ///
    /// Ticks missed while the consumer was busy collapse into one.
    pub async fn next(&mut self) -> Option<Tick> {
        if std::mem::take(&mut self.primed) {
            return Some(Tick::Start);
        }
        match self.rx.recv().await {
            Ok(tick) => Some(tick),
            Err(RecvError::Lagged(_)) => {
                self.rx = self.rx.resubscribe();
                Some(Tick::Periodic)
            }
            Err(RecvError::Closed) => None,
        }
    }
}
