use crate::{
    domain::NotificationTime,
    effective_settings::{current_settings, SettingsDefaults},
    fan_out::{DispatchOutcome, FanOutDispatcher},
    subscriber_store::SubscriberStore,
};
use std::{sync::Arc, time::Duration};
use time::{Date, OffsetDateTime, UtcOffset};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Firing,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TickDecision {
    Fire,
    NotDue,
    Disabled,
    AlreadyFiring,
    AlreadyFiredThisMinute,
}

/// Decides on each tick whether the daily notification is due.
///
/// Fires at most once per calendar minute: the minute of the last firing is
/// kept, so jittery or delayed ticks landing twice in the same minute do not
/// re-fire. Minutes that pass without a tick are skipped, never caught up.
#[derive(Debug)]
pub struct NotificationScheduler {
    state: SchedulerState,
    last_fired: Option<(Date, NotificationTime)>,
}

impl Default for NotificationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            last_fired: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// `now` must already be in the wall-clock zone notifications are configured for.
    pub fn on_tick(
        &mut self,
        now: OffsetDateTime,
        target: NotificationTime,
        enabled: bool,
    ) -> TickDecision {
        if !enabled {
            return TickDecision::Disabled;
        }
        if now.hour() != target.hour() || now.minute() != target.minute() {
            return TickDecision::NotDue;
        }
        if self.state == SchedulerState::Firing {
            return TickDecision::AlreadyFiring;
        }

        let minute = (now.date(), target);
        if self.last_fired == Some(minute) {
            return TickDecision::AlreadyFiredThisMinute;
        }

        self.last_fired = Some(minute);
        self.state = SchedulerState::Firing;
        TickDecision::Fire
    }

    pub fn on_dispatch_completed(&mut self) {
        self.state = SchedulerState::Idle;
    }
}

pub struct SchedulerLoop {
    pub dispatcher: Arc<FanOutDispatcher>,
    pub store: Arc<dyn SubscriberStore>,
    pub defaults: SettingsDefaults,
    pub tick_interval: Duration,
    pub utc_offset: UtcOffset,
}

impl SchedulerLoop {
    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        let mut scheduler = NotificationScheduler::new();
        let mut in_flight = None;
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            tick_interval = ?self.tick_interval,
            "Notification scheduler started"
        );

        loop {
            interval.tick().await;
            let now = OffsetDateTime::now_utc().to_offset(self.utc_offset);
            self.tick(&mut scheduler, &mut in_flight, now).await;
        }
    }

    /// One evaluation at wall-clock `now`. A finished fan-out is reaped first,
    /// so the scheduler stays `Firing` for as long as its task runs.
    async fn tick(
        &self,
        scheduler: &mut NotificationScheduler,
        in_flight: &mut Option<JoinHandle<DispatchOutcome>>,
        now: OffsetDateTime,
    ) -> TickDecision {
        if in_flight.as_ref().is_some_and(JoinHandle::is_finished) {
            if let Some(handle) = in_flight.take() {
                match handle.await {
                    Ok(DispatchOutcome::AlreadyRunning) => {
                        tracing::warn!("A manual fan-out was already running. Nothing was sent.")
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error.message = %e, "Fan-out task ended abnormally"),
                }
            }
            scheduler.on_dispatch_completed();
        }

        let settings = current_settings(self.store.as_ref(), &self.defaults).await;
        let decision = scheduler.on_tick(
            now,
            settings.notification_time,
            settings.notifications_enabled,
        );

        match decision {
            TickDecision::Fire => {
                tracing::info!(
                    notification_time = %settings.notification_time,
                    "Notification time reached. Starting fan-out."
                );
                let dispatcher = self.dispatcher.clone();
                *in_flight = Some(tokio::spawn(async move { dispatcher.dispatch().await }));
            }
            TickDecision::AlreadyFiring => {
                tracing::warn!("Previous fan-out is still running. Not starting another.");
            }
            _ => {}
        }
        decision
    }
}
