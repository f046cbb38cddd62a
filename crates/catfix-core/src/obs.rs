//! Structured lifecycle events for catfix runs.
//!
//! Every event carries an `event` field (`run.started`, `page.fetched`,
//! `item.planned`, `item.outcome`, `request.retry`, `run.finished`) so JSON
//! log lines can be filtered without parsing messages.

use std::time::Duration;

use tracing::{info, warn};

use crate::driver::{ItemOutcome, RunMode, RunSummary};
use crate::plan::MutationPlan;

/// RAII guard that tags every event of a run with its `run_id`.
///
/// ```ignore
/// let _span = RunSpan::enter(&run_id);
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("catfix.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, mode: RunMode, limit: Option<usize>, resuming: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        mode = %mode,
        limit = ?limit,
        resuming = resuming,
    );
}

pub fn emit_page_fetched(page: u64, listed: usize, pending: usize, has_next: bool) {
    info!(
        event = "page.fetched",
        page = page,
        listed = listed,
        pending = pending,
        has_next = has_next,
    );
}

/// Intended change for one item; the only output of a dry run.
pub fn emit_plan(title: &str, plan: &MutationPlan) {
    let images = match &plan.images {
        Ok(swap) => format!("{} -> {}", swap.first, swap.order.join(",")),
        Err(e) => format!("skip ({e})"),
    };
    let price = match &plan.price {
        Ok(change) if change.is_noop() => format!("{} (unchanged)", change.to),
        Ok(change) => match change.from {
            Some(from) => format!("{from} -> {}", change.to),
            None => format!("unset -> {}", change.to),
        },
        Err(e) => format!("skip ({e})"),
    };
    info!(
        event = "item.planned",
        item_id = %plan.item_id,
        title = %title,
        images = %images,
        price = %price,
    );
}

pub fn emit_item_outcome(item_id: &str, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::Failed(reasons) => warn!(
            event = "item.outcome",
            item_id = %item_id,
            status = "failed",
            reasons = %reasons.join("; "),
        ),
        other => info!(event = "item.outcome", item_id = %item_id, status = %other.status()),
    }
}

pub fn emit_retry(operation: &str, attempt: u32, delay: Duration, error: &dyn std::fmt::Display) {
    warn!(
        event = "request.retry",
        operation = %operation,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

/// Final summary line of a run.
pub fn emit_run_finished(summary: &RunSummary, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %summary.run_id,
        mode = %summary.mode,
        done = summary.done,
        failed = summary.failed,
        skipped = summary.skipped,
        already_done = summary.already_done,
        total = summary.total(),
        stopped_at_limit = summary.stopped_at_limit,
        requests = summary.requests,
        retries = summary.retries,
        rate_limited = summary.rate_limited,
        duration_ms = duration_ms,
    );
}

pub fn emit_run_aborted(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::error!(event = "run.aborted", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id");
    }
}
