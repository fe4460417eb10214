// rentscan/src/supervisor.rs
//! Tokio supervisor for an enabled central.
//!
//! Two periodic jobs share one `Arc<Mutex<Central<Enabled>>>`:
//! the event pump drains transport events and relays decoded messages to a
//! [`MessageHandler`], and the health check restarts scanning whenever
//! nothing is connected. Every touch of the central runs on the blocking
//! pool and the lock is released before the next `.await`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::central::{Central, Enabled};
use crate::protocol::RentalMessage;
use crate::recovery::RecoveryLevel;
use crate::utils::ms;
use crate::{Error, Result};

/// The lock boundary every supervisor job goes through.
pub type SharedCentral = Arc<Mutex<Central<Enabled>>>;

/// Default period of the event pump.
pub const DEFAULT_PUMP_INTERVAL: Duration = ms(20);

/// Consumer of messages received from the peer.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// An `Err` counts towards the consecutive-error reset threshold.
    async fn handle(&self, msg: RentalMessage) -> Result<()>;
}

/// Run `f` against the central on the blocking pool.
pub async fn with_central<T, F>(central: &SharedCentral, f: F) -> Result<T>
where
    F: FnOnce(&mut Central<Enabled>) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let central = Arc::clone(central);
    tokio::task::spawn_blocking(move || {
        let mut guard = central.lock().map_err(|_| Error::StatePoisoned)?;
        f(&mut guard)
    })
    .await
    .map_err(|e| Error::Task(e.to_string()))?
}

/// Outcome of one pump pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub received: usize,
    pub handled: usize,
    pub failed: usize,
    /// Set when handler failures reached the threshold.
    pub recovery: Option<RecoveryLevel>,
}

/// Periodic event pump and health check around one central.
pub struct Supervisor<H> {
    central: SharedCentral,
    handler: Arc<H>,
    pump_interval: Duration,
    health_period: Duration,
}

impl<H: MessageHandler + 'static> Supervisor<H> {
    pub fn new(central: Central<Enabled>, handler: H) -> Self {
        let health_period = central.config().health_check_period;
        Self {
            central: Arc::new(Mutex::new(central)),
            handler: Arc::new(handler),
            pump_interval: DEFAULT_PUMP_INTERVAL,
            health_period,
        }
    }

    /// Override [`DEFAULT_PUMP_INTERVAL`].
    pub fn with_pump_interval(mut self, period: Duration) -> Self {
        self.pump_interval = period;
        self
    }

    pub fn with_health_period(mut self, period: Duration) -> Self {
        self.health_period = period;
        self
    }

    pub fn central(&self) -> SharedCentral {
        Arc::clone(&self.central)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Drain pending events and hand each decoded message to the handler.
    pub async fn pump_once(&self) -> Result<PumpReport> {
        let messages = with_central(&self.central, |c| c.process_pending()).await?;
        let mut report = PumpReport {
            received: messages.len(),
            ..PumpReport::default()
        };

        for msg in messages {
            match self.handler.handle(msg).await {
                Ok(()) => {
                    report.handled += 1;
                    with_central(&self.central, |c| {
                        c.record_message_ok();
                        Ok(())
                    })
                    .await?;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("message handler: {}", e);
                    if let Some(level) =
                        with_central(&self.central, |c| c.record_message_error()).await?
                    {
                        report.recovery = Some(level);
                    }
                }
            }
        }
        Ok(report)
    }

    /// One health check pass: scan again when nothing is connected.
    pub async fn health_check(&self) -> Result<()> {
        with_central(&self.central, |c| c.health_check()).await
    }

    /// Run both jobs until `shutdown` turns true or its sender is dropped.
    /// Job errors are logged and the loop keeps going; a fatal recovery is
    /// retried by the next health check.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut pump = interval(self.pump_interval);
        pump.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut health = interval(self.health_period);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("supervisor stopping");
                        break;
                    }
                }
                _ = pump.tick() => {
                    match self.pump_once().await {
                        Ok(report) if report.received > 0 => debug!("pump: {:?}", report),
                        Ok(_) => {}
                        Err(e) => error!("event pump: {}", e),
                    }
                }
                _ = health.tick() => {
                    if let Err(e) = self.health_check().await {
                        error!("health check: {}", e);
                    }
                }
            }
        }
    }

    /// Spawn [`Supervisor::run`] on the current runtime.
    pub fn spawn(self) -> SupervisorHandle {
        let (tx, rx) = watch::channel(false);
        let central = self.central();
        let task = tokio::spawn(async move { self.run(rx).await });
        SupervisorHandle {
            central,
            shutdown: tx,
            task,
        }
    }
}

/// Handle to a spawned supervisor.
pub struct SupervisorHandle {
    central: SharedCentral,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn central(&self) -> SharedCentral {
        Arc::clone(&self.central)
    }

    /// Stop both jobs and wait for the loop to exit.
    pub async fn shutdown(self) -> Result<()> {
        // the receiver is gone only if the task already ended
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|e| Error::Task(e.to_string()))
    }
}
