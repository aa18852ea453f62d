//! A virtual-time scheduler.
//!
//! Time only moves when the owner calls [`ManualScheduler::advance`] or
//! [`ManualScheduler::set_now`]. Registered resumptions are kept so the owner
//! can see which executions are due.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{EffectError, Scheduler};

/// A resumption registered by a delay node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResume {
    pub execution_id: Uuid,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ManualScheduler {
    now: Mutex<DateTime<Utc>>,
    pending: Mutex<Vec<PendingResume>>,
}

impl ManualScheduler {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set_now(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    /// Remove and return every registration whose due time has passed.
    pub fn take_due(&self) -> Vec<PendingResume> {
        let now = self.now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let (due, later): (Vec<_>, Vec<_>) = pending.drain(..).partition(|p| p.due_at <= now);
        *pending = later;
        due
    }

    pub fn pending(&self) -> Vec<PendingResume> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn schedule_resume(
        &self,
        execution_id: Uuid,
        due_at: DateTime<Utc>,
    ) -> Result<(), EffectError> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PendingResume { execution_id, due_at });
        Ok(())
    }
}
