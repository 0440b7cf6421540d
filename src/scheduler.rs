//! # Ingestion Scheduler
//!
//! Background loop that fires the orchestrator on the documented cadence:
//! fetchable sources every six hours, the manual-import queue hourly, daily
//! maintenance at 02:00 UTC (archival, stale-confidence recompute, search
//! rebuild, sitemap ping), and the weekly candidate sweep on Monday
//! mornings. Jobs run inline on the tick so two runs never overlap.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc, Weekday};
use metrics::{counter, histogram};
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::pipeline::PipelineOrchestrator;

/// Seconds between scheduler wake-ups.
const TICK_SECONDS: u64 = 60;

/// Interval between fetch runs over API-style sources.
const FETCH_INTERVAL_HOURS: i64 = 6;

/// UTC hour of the daily maintenance pass.
const MAINTENANCE_HOUR: u32 = 2;

/// Day and UTC hour of the weekly candidate sweep.
const SWEEP_WEEKDAY: Weekday = Weekday::Mon;
const SWEEP_HOUR: u32 = 3;

/// Next occurrence of `hour:00` UTC strictly after `now`.
fn next_daily(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let candidate = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), hour, 0, 0)
        .single()
        .expect("valid utc time");
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    }
}

/// Next occurrence of `weekday` at `hour:00` UTC strictly after `now`.
fn next_weekly(now: DateTime<Utc>, weekday: Weekday, hour: u32) -> DateTime<Utc> {
    let mut candidate = next_daily(now, hour);
    while candidate.weekday() != weekday {
        candidate += ChronoDuration::days(1);
    }
    candidate
}

pub struct IngestionScheduler {
    orchestrator: Arc<PipelineOrchestrator>,
    fetch_due: DateTime<Utc>,
    manual_due: DateTime<Utc>,
    maintenance_due: DateTime<Utc>,
    sweep_due: DateTime<Utc>,
}

impl IngestionScheduler {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        let now = Utc::now();
        Self {
            orchestrator,
            // First fetch fires on the next tick; queues wait their turn.
            fetch_due: now,
            manual_due: now + ChronoDuration::hours(1),
            maintenance_due: next_daily(now, MAINTENANCE_HOUR),
            sweep_due: next_weekly(now, SWEEP_WEEKDAY, SWEEP_HOUR),
        }
    }

    /// Run the scheduler loop until the shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("starting ingestion scheduler");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("ingestion scheduler shutdown requested");
                    break;
                }
                _ = sleep(Duration::from_secs(TICK_SECONDS)) => {
                    let tick_started = Instant::now();
                    self.tick(&shutdown).await;
                    histogram!("scheduler_tick_duration_seconds")
                        .record(tick_started.elapsed().as_secs_f64());
                }
            }
        }
        info!("ingestion scheduler stopped");
    }

    async fn tick(&mut self, cancel: &CancellationToken) {
        let now = Utc::now();

        if now >= self.fetch_due {
            self.fetch_due = now + ChronoDuration::hours(FETCH_INTERVAL_HOURS);
            counter!("scheduler_fetch_runs_total").increment(1);
            match self.orchestrator.run(cancel).await {
                Ok(report) => {
                    let totals = report.totals();
                    info!(
                        run_id = %report.run_id,
                        fetched = totals.fetched,
                        created = totals.created,
                        merged = totals.merged,
                        "scheduled ingestion run finished"
                    );
                }
                Err(err) => error!(error = %err, "scheduled ingestion run failed"),
            }
        }

        if now >= self.manual_due {
            self.manual_due = now + ChronoDuration::hours(1);
            counter!("scheduler_manual_runs_total").increment(1);
            if let Err(err) = self.orchestrator.process_pending(cancel).await {
                error!(error = %err, "manual queue processing failed");
            }
        }

        if now >= self.maintenance_due {
            self.maintenance_due = next_daily(now, MAINTENANCE_HOUR);
            counter!("scheduler_maintenance_runs_total").increment(1);
            if let Err(err) = self.orchestrator.maintenance(cancel).await {
                error!(error = %err, "daily maintenance failed");
            }
        }

        if now >= self.sweep_due {
            self.sweep_due = next_weekly(now, SWEEP_WEEKDAY, SWEEP_HOUR);
            counter!("scheduler_sweep_runs_total").increment(1);
            if let Err(err) = self.orchestrator.sweep_candidates().await {
                error!(error = %err, "candidate sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn next_daily_rolls_forward() {
        let before = utc("2025-06-26T01:30:00Z");
        assert_eq!(next_daily(before, 2), utc("2025-06-26T02:00:00Z"));

        let after = utc("2025-06-26T02:00:00Z");
        assert_eq!(next_daily(after, 2), utc("2025-06-27T02:00:00Z"));
    }

    #[test]
    fn next_weekly_lands_on_requested_weekday() {
        // 2025-06-26 is a Thursday.
        let now = utc("2025-06-26T10:00:00Z");
        let due = next_weekly(now, Weekday::Mon, 3);
        assert_eq!(due, utc("2025-06-30T03:00:00Z"));
        assert_eq!(due.weekday(), Weekday::Mon);
        assert_eq!(due.hour(), 3);

        // Already Monday before the hour: fires the same day.
        let monday_early = utc("2025-06-30T01:00:00Z");
        assert_eq!(
            next_weekly(monday_early, Weekday::Mon, 3),
            utc("2025-06-30T03:00:00Z")
        );
    }
}
