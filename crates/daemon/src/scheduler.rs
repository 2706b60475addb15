use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Datelike, Local, TimeZone, Weekday};
use nav_backup_core::{BackupOutcome, Frequency};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::BackupEngine;

/// Local hour at which scheduled backups run.
pub const RUN_HOUR: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "frequency", rename_all = "snake_case")]
pub enum ScheduleState {
    Unscheduled,
    Scheduled(Frequency),
}

struct Trigger {
    frequency: Frequency,
    /// Dropping or firing this stops the loop at its next wait. A backup
    /// already in progress runs to completion.
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Trigger {
    fn cancel(self) -> JoinHandle<()> {
        let _ = self.stop.send(());
        self.handle
    }
}

/// Owns the single recurring backup trigger.
pub struct Scheduler {
    engine: Arc<BackupEngine>,
    active: Mutex<Option<Trigger>>,
}

impl Scheduler {
    pub fn new(engine: Arc<BackupEngine>) -> Self {
        Self {
            engine,
            active: Mutex::new(None),
        }
    }

    /// Cancels the current trigger and registers a new one for the stored
    /// frequency, if any.
    pub async fn reconfigure(&self) -> Result<ScheduleState> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            let frequency = previous.frequency.clone();
            drop(previous.cancel());
            info!(%frequency, "cancelled scheduled backups");
        }

        let frequency = self.engine.configs().get().await?.frequency;
        match frequency {
            None | Some(Frequency::Off) => {
                info!("scheduled backups are off");
                Ok(ScheduleState::Unscheduled)
            }
            Some(Frequency::Unknown(raw)) => {
                warn!(frequency = %raw, "unknown backup frequency, not scheduling");
                Ok(ScheduleState::Unscheduled)
            }
            Some(frequency) => {
                let (stop, cancelled) = oneshot::channel();
                let handle = tokio::spawn(trigger_loop(
                    self.engine.clone(),
                    frequency.clone(),
                    cancelled,
                ));
                info!(%frequency, hour = RUN_HOUR, "scheduled backups enabled");
                *active = Some(Trigger {
                    frequency: frequency.clone(),
                    stop,
                    handle,
                });
                Ok(ScheduleState::Scheduled(frequency))
            }
        }
    }

    pub async fn state(&self) -> ScheduleState {
        match self.active.lock().await.as_ref() {
            Some(trigger) => ScheduleState::Scheduled(trigger.frequency.clone()),
            None => ScheduleState::Unscheduled,
        }
    }

    /// Stops future runs and waits for a backup already in progress.
    pub async fn shutdown(&self) {
        let trigger = self.active.lock().await.take();
        if let Some(trigger) = trigger {
            if let Err(err) = trigger.cancel().await {
                warn!(error = %err, "scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(trigger) = self.active.get_mut().take() {
            drop(trigger.cancel());
        }
    }
}

async fn trigger_loop(
    engine: Arc<BackupEngine>,
    frequency: Frequency,
    mut cancelled: oneshot::Receiver<()>,
) {
    loop {
        let now = Local::now();
        let Some(next) = next_fire(&now, &frequency) else {
            error!(%frequency, "no upcoming run time, scheduled backups stopped");
            return;
        };
        let wait = next
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        info!(next = %next, "next scheduled backup");
        tokio::select! {
            biased;
            _ = &mut cancelled => {
                info!(%frequency, "scheduled backup trigger stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        run_scheduled_backup(&engine, &frequency).await;
    }
}

/// One unattended run. Failures are stored as the last status without
/// touching the last successful backup time.
pub async fn run_scheduled_backup(
    engine: &BackupEngine,
    frequency: &Frequency,
) -> Option<BackupOutcome> {
    info!(%frequency, "running scheduled backup");
    match engine.perform_backup().await {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            error!(error = %err, "scheduled backup failed");
            let status = format!("failed: {err}");
            if let Err(store_err) = engine.configs().record_status(&status, None).await {
                error!(error = %store_err, "could not record backup failure");
            }
            None
        }
    }
}

/// Next 03:00 strictly after `now`: every day for `Daily`, Sundays for
/// `Weekly`. `None` for frequencies that never fire.
pub fn next_fire<Tz: TimeZone>(now: &DateTime<Tz>, frequency: &Frequency) -> Option<DateTime<Tz>> {
    let weekly = match frequency {
        Frequency::Daily => false,
        Frequency::Weekly => true,
        Frequency::Off | Frequency::Unknown(_) => return None,
    };

    let tz = now.timezone();
    let mut date = now.date_naive();
    // Two weeks covers any weekday plus a skipped local 03:00.
    for _ in 0..15 {
        let naive = date.and_hms_opt(RUN_HOUR, 0, 0)?;
        if let Some(candidate) = tz.from_local_datetime(&naive).earliest() {
            let right_day = !weekly || date.weekday() == Weekday::Sun;
            if right_day && candidate > *now {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}
