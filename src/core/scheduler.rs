use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::core::oracle::{is_valid_selection, PriceOracle, RefreshReport};
use crate::error::TrackerError;
use crate::models::{RefreshStatus, Selection};

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Tick,
    Visible,
    Manual,
    SelectionChanged,
    Shutdown,
}

/// Published after every cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshEvent {
    Completed(RefreshReport),
    /// The cycle aborted; price, history and rates were kept. One notice per failed cycle.
    Failed { notice: String },
}

/// Repeating poll timer. Re-armed after every cycle, so the next tick is always
/// one full interval after the last refresh of any kind.
struct PollTimer {
    sched: JobScheduler,
    job: Option<Uuid>,
    interval: Duration,
    ticks: mpsc::UnboundedSender<Trigger>,
}

impl PollTimer {
    async fn start(interval: Duration, ticks: mpsc::UnboundedSender<Trigger>) -> Result<Self, JobSchedulerError> {
        let sched = JobScheduler::new().await?;
        let mut timer = Self { sched, job: None, interval, ticks };
        timer.arm().await?;
        timer.sched.start().await?;
        Ok(timer)
    }

    /// Replaces the job with a fresh one and returns its next tick.
    async fn arm(&mut self) -> Result<Option<DateTime<Utc>>, JobSchedulerError> {
        let tx = self.ticks.clone();
        let job = Job::new_repeated_async(self.interval, move |_uuid, _l| {
            let tx = tx.clone();
            Box::pin(async move {
                tracing::debug!("scheduled refresh tick");
                let _ = tx.send(Trigger::Tick);
            })
        })?;
        let id = self.sched.add(job).await?;
        if let Some(old) = self.job.replace(id) {
            self.sched.remove(&old).await?;
        }
        self.sched.next_tick_for_job(id).await
    }

    async fn shutdown(mut self) -> Result<(), JobSchedulerError> {
        self.sched.shutdown().await
    }
}

/// Owns the oracle on a single task. Every trigger goes through one channel,
/// so at most one refresh runs at a time.
pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Starts the refresh loop and the repeating timer, and requests an
    /// immediate startup refresh.
    pub async fn start(oracle: PriceOracle, poll_interval: Duration) -> Result<SchedulerHandle, anyhow::Error> {
        let initial = oracle.state().selection.clone();
        let initial_status = oracle.state().status.clone();
        let (selection_tx, selection_rx) = watch::channel(initial);
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(initial_status);

        let timer = PollTimer::start(poll_interval, trigger_tx.clone()).await?;
        let _ = trigger_tx.send(Trigger::Startup);

        let task = tokio::spawn(run_loop(oracle, timer, trigger_rx, selection_rx, events_tx, status_tx));

        Ok(SchedulerHandle {
            triggers: trigger_tx,
            selection: selection_tx,
            events: events_rx,
            status: status_rx,
            task: Some(task),
        })
    }
}

pub struct SchedulerHandle {
    triggers: mpsc::UnboundedSender<Trigger>,
    selection: watch::Sender<Selection>,
    events: watch::Receiver<Option<RefreshEvent>>,
    status: watch::Receiver<RefreshStatus>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// User-requested refresh. Shares the single-flight path with the timer.
    pub fn refresh_now(&self) {
        let _ = self.triggers.send(Trigger::Manual);
    }

    /// The host regained foreground visibility.
    pub fn on_visible(&self) {
        let _ = self.triggers.send(Trigger::Visible);
    }

    pub fn selection(&self) -> Selection {
        self.selection.borrow().clone()
    }

    pub fn set_currency(&self, currency: &str) -> Result<(), TrackerError> {
        let mut next = self.selection();
        next.currency = currency.trim().to_ascii_uppercase();
        self.set_selection(next)
    }

    pub fn set_karat(&self, karat: u8) -> Result<(), TrackerError> {
        let mut next = self.selection();
        next.karat = karat;
        self.set_selection(next)
    }

    fn set_selection(&self, next: Selection) -> Result<(), TrackerError> {
        if !is_valid_selection(&next) {
            return Err(TrackerError::Config(format!("unsupported selection {} {}K", next.currency, next.karat)));
        }
        let changed = self.selection.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            let _ = self.triggers.send(Trigger::SelectionChanged);
        }
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RefreshEvent>> {
        self.events.clone()
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.borrow().clone()
    }

    /// Waits for the refresh loop to finish its current cycle, then stops the timer.
    pub async fn shutdown(mut self) -> Result<(), anyhow::Error> {
        let _ = self.triggers.send(Trigger::Shutdown);
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

async fn run_loop(
    mut oracle: PriceOracle,
    mut timer: PollTimer,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
    mut selection: watch::Receiver<Selection>,
    events: watch::Sender<Option<RefreshEvent>>,
    status: watch::Sender<RefreshStatus>,
) {
    let mut next = triggers.recv().await;

    while let Some(trigger) = next {
        if trigger == Trigger::Shutdown {
            break;
        }
        tracing::info!(?trigger, "refresh requested");

        let result = oracle.refresh_until_settled(&mut selection).await;

        // Any cycle, timed or not, restarts the poll interval.
        match timer.arm().await {
            Ok(Some(at)) => oracle.set_next_due(at).await,
            Ok(None) => tracing::warn!("poll timer has no next tick"),
            Err(e) => tracing::warn!(error = %e, "failed to re-arm poll timer"),
        }

        let event = match result {
            Ok(mut report) => {
                report.status = oracle.state().status.clone();
                RefreshEvent::Completed(report)
            }
            Err(e) => RefreshEvent::Failed { notice: e.to_string() },
        };
        status.send_replace(oracle.state().status.clone());
        events.send_replace(Some(event));

        // Requests that queued up during the cycle are satisfied by it.
        let mut coalesced = 0;
        let mut stop = false;
        while let Ok(pending) = triggers.try_recv() {
            if pending == Trigger::Shutdown {
                stop = true;
                break;
            }
            coalesced += 1;
        }
        if coalesced > 0 {
            tracing::debug!(coalesced, "coalesced refresh requests into the completed cycle");
        }
        if stop {
            break;
        }

        // A selection change that landed after the last sample still needs its own cycle.
        next = if selection.has_changed().unwrap_or(false) {
            Some(Trigger::SelectionChanged)
        } else {
            triggers.recv().await
        };
    }

    if let Err(e) = timer.shutdown().await {
        tracing::warn!(error = %e, "failed to stop poll timer");
    }
    tracing::info!("refresh loop stopped");
}
