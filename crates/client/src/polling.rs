//! Polling fallback used once push delivery has been given up on.

use std::rc::Rc;
use std::time::Duration;

use crate::stores::NotificationFeed;
use crate::timer::{Scheduler, TimerEvent, TimerId};

/// Re-fetches the first page and unread count on a fixed interval.
pub struct PollingFallback {
    scheduler: Rc<dyn Scheduler>,
    interval: Duration,
    timer: Option<TimerId>,
    active: bool,
}

impl PollingFallback {
    pub fn new(scheduler: Rc<dyn Scheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
            timer: None,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Begin polling. The first tick is due immediately.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        crate::log_info!(
            "Polling for notifications every {}s",
            self.interval.as_secs()
        );
        self.active = true;
        self.timer = Some(self.scheduler.schedule(Duration::ZERO, TimerEvent::Poll));
    }

    /// Whether `id` is the tick this fallback is waiting for.
    pub fn owns(&self, id: TimerId) -> bool {
        self.active && self.timer == Some(id)
    }

    /// Run one tick: arm the next one, then fetch. A failed fetch is only
    /// logged; the next tick tries again.
    pub async fn tick(&mut self, id: TimerId, feed: &NotificationFeed) {
        if !self.owns(id) {
            return;
        }
        self.timer = Some(self.scheduler.schedule(self.interval, TimerEvent::Poll));

        if let Err(e) = feed.poll().await {
            crate::log_warn!("Notification poll failed: {}", e.detail());
        }
    }

    pub fn stop(&mut self) {
        if let Some(id) = self.timer.take() {
            self.scheduler.cancel(id);
        }
        if self.active {
            crate::log_debug!("Polling stopped");
        }
        self.active = false;
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        self.stop();
    }
}
