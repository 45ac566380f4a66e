use crate::session::{ExtractionSession, RunOutcome};
use chrono::{DateTime, Local, NaiveDate};
use staywatch_core::{DailyTrigger, RecordSink, Result, RunParams, RunPlan};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fires the run plan once a day at a fixed local time.
pub struct RunScheduler {
    session: ExtractionSession,
    sink: Arc<dyn RecordSink>,
    plan: RunPlan,
    trigger: DailyTrigger,
    next_trigger: Option<DateTime<Local>>,
}

impl RunScheduler {
    pub fn new(
        session: ExtractionSession,
        sink: Arc<dyn RecordSink>,
        plan: RunPlan,
        trigger: DailyTrigger,
    ) -> Self {
        Self {
            session,
            sink,
            plan,
            trigger,
            next_trigger: None,
        }
    }

    /// When the scheduler will next fire, once it is waiting.
    pub fn next_trigger(&self) -> Option<DateTime<Local>> {
        self.next_trigger
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Executes every run of the plan for `today`, in plan order. A failed run
    /// is logged and the remaining runs still execute. Stops early when the
    /// session is cancelled.
    pub async fn run_day(&self, today: NaiveDate) -> Vec<(RunParams, Result<RunOutcome>)> {
        let runs = self.plan.runs_for(today);
        info!("Starting {} runs for {}", runs.len(), today);

        let mut results = Vec::with_capacity(runs.len());
        for params in runs {
            if self.session.cancellation().is_cancelled() {
                warn!("Cancelled, skipping remaining runs from {}", params);
                break;
            }

            let result = self.session.run_and_write(&params, self.sink.as_ref()).await;
            match &result {
                Ok(outcome) => info!(
                    "Run {} finished: {} records ({})",
                    params, outcome.records, outcome.final_state
                ),
                Err(e) => error!("Run {} failed: {}", params, e),
            }
            results.push((params, result));
        }
        results
    }

    /// Sleeps until each trigger and runs the plan, until the session's
    /// cancellation token fires.
    pub async fn run_forever(&mut self) {
        let shutdown = self.session.cancellation().clone();
        loop {
            let now = Local::now();
            let next = self.trigger.next_after(&now);
            self.next_trigger = Some(next);
            info!("Next run scheduled at {}", next.format("%Y-%m-%d %H:%M:%S %Z"));

            let wait = next.signed_duration_since(now).to_std().unwrap_or_default();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Scheduler shutting down");
                    self.next_trigger = None;
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let results = self.run_day(next.date_naive()).await;
            let failed = results.iter().filter(|(_, result)| result.is_err()).count();
            if failed > 0 {
                warn!("{} of {} runs failed", failed, results.len());
            } else {
                info!("All {} runs completed", results.len());
            }
        }
    }
}
