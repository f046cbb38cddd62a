//! The resumable batch driver.
//!
//! One run walks the vendor's catalog page by page starting at the ledger
//! cursor, skips items the ledger already has as `done`, plans the image
//! swap and price change for every other item, and either logs the plan
//! (dry run) or sends it (apply). Each item's outcome is persisted before
//! the next item starts; the cursor moves only once a whole page has been
//! recorded.

use std::fmt;
use std::time::{Duration, Instant};

use catalog_client::{CatalogClient, CatalogItem, ClientError, Cursor, Mutation, Page};
use progress_ledger::{AspectStatus, ItemProgress, ItemStatus, ProgressLedger, RunStats};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DriverError, Result};
use crate::obs::{self, RunSpan};
use crate::plan::MutationPlan;
use crate::retry::{retry_transient, RetryError, RetryPolicy};

/// Pause between items that issued requests
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(1500);

/// Whether planned corrections are sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    DryRun,
    Apply,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::DryRun => f.write_str("dry-run"),
            RunMode::Apply => f.write_str("apply"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    /// Maximum number of items attempted this run
    pub limit: Option<usize>,
    pub throttle: Duration,
    pub retry: RetryPolicy,
}

impl RunConfig {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            limit: None,
            throttle: DEFAULT_THROTTLE,
            retry: RetryPolicy::default(),
        }
    }

    /// `Some(0)` means no limit.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|n| *n > 0);
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Result of one item attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    Failed(Vec<String>),
    /// Planned only (dry run)
    Skipped,
}

impl ItemOutcome {
    pub fn status(&self) -> ItemStatus {
        match self {
            ItemOutcome::Done => ItemStatus::Done,
            ItemOutcome::Failed(_) => ItemStatus::Failed,
            ItemOutcome::Skipped => ItemStatus::Skipped,
        }
    }
}

/// What one run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: RunMode,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Listed items passed over because the ledger has them as done
    pub already_done: usize,
    pub stopped_at_limit: bool,
    pub requests: u64,
    pub retries: u64,
    pub rate_limited: u64,
}

impl RunSummary {
    fn new(run_id: String, mode: RunMode) -> Self {
        Self {
            run_id,
            mode,
            done: 0,
            failed: 0,
            skipped: 0,
            already_done: 0,
            stopped_at_limit: false,
            requests: 0,
            retries: 0,
            rate_limited: 0,
        }
    }

    /// Items attempted this run
    pub fn total(&self) -> usize {
        self.done + self.failed + self.skipped
    }

    fn count(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Done => self.done += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// How a single mutation ended when it did not abort the run
enum Sent {
    Applied,
    Rejected(String),
}

/// Batch driver over a catalog client and a progress ledger
pub struct Driver<C, L> {
    client: C,
    ledger: L,
    config: RunConfig,
}

impl<C, L> Driver<C, L>
where
    C: CatalogClient,
    L: ProgressLedger,
{
    pub fn new(client: C, ledger: L, config: RunConfig) -> Self {
        Self {
            client,
            ledger,
            config,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn into_parts(self) -> (C, L) {
        (self.client, self.ledger)
    }

    /// Run until the catalog is exhausted, the limit is reached, or a
    /// fatal error occurs.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let _span = RunSpan::enter(&run_id);
        let started = Instant::now();
        let baseline = self.client.stats();

        let mut summary = RunSummary::new(run_id.clone(), self.config.mode);
        obs::emit_run_started(
            &run_id,
            self.config.mode,
            self.config.limit,
            self.ledger.cursor().is_some(),
        );

        let result = self.run_pages(&mut summary).await;

        let stats = self.client.stats();
        summary.requests = stats.requests.saturating_sub(baseline.requests);
        summary.rate_limited = stats.rate_limited.saturating_sub(baseline.rate_limited);
        let run_stats = RunStats {
            runs: 1,
            requests: summary.requests,
            retries: summary.retries,
            rate_limited: summary.rate_limited,
        };

        match result {
            Ok(()) => {
                self.ledger.record_stats(&run_stats)?;
                obs::emit_run_finished(&summary, started.elapsed().as_millis() as u64);
                Ok(summary)
            }
            Err(err) => {
                if let Err(e) = self.ledger.record_stats(&run_stats) {
                    warn!(error = %e, "could not record stats of aborted run");
                }
                obs::emit_run_aborted(&run_id, &err);
                Err(err)
            }
        }
    }

    async fn run_pages(&mut self, summary: &mut RunSummary) -> Result<()> {
        let mut cursor = self.ledger.cursor().map(Cursor::new);
        let mut page_no = 0u64;

        loop {
            let page = self.fetch_page(cursor.as_ref(), &mut summary.retries).await?;
            page_no += 1;

            let pending: Vec<&CatalogItem> = page
                .items
                .iter()
                .filter(|item| !self.ledger.is_processed(&item.id))
                .collect();
            summary.already_done += page.items.len() - pending.len();
            obs::emit_page_fetched(page_no, page.items.len(), pending.len(), page.next.is_some());

            for item in pending {
                if self.limit_reached(summary) {
                    summary.stopped_at_limit = true;
                    return Ok(());
                }
                let (outcome, sent) = self.process_item(item, &mut summary.retries).await?;
                obs::emit_item_outcome(&item.id, &outcome);
                summary.count(&outcome);
                if sent && !self.config.throttle.is_zero() {
                    tokio::time::sleep(self.config.throttle).await;
                }
            }

            // A dry run reads the cursor but never moves it, so it cannot
            // make a later apply run skip unvisited pages.
            if self.config.mode == RunMode::Apply {
                self.ledger
                    .advance_cursor(page.next.as_ref().map(Cursor::as_str))?;
            }

            match page.next {
                // the page is fully recorded; do not list another one
                Some(_) if self.limit_reached(summary) => {
                    summary.stopped_at_limit = true;
                    return Ok(());
                }
                Some(next) => cursor = Some(next),
                None => {
                    debug!("end of catalog");
                    return Ok(());
                }
            }
        }
    }

    fn limit_reached(&self, summary: &RunSummary) -> bool {
        matches!(self.config.limit, Some(limit) if summary.total() >= limit)
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>, retries: &mut u64) -> Result<Page> {
        let client = &self.client;
        retry_transient(&self.config.retry, "list_page", retries, move || {
            client.list_page(cursor)
        })
        .await
        .map_err(|e| fatal("list_page", e))
    }

    /// Plan, then log or send, then persist. Returns the outcome and
    /// whether any request was sent.
    async fn process_item(
        &mut self,
        item: &CatalogItem,
        retries: &mut u64,
    ) -> Result<(ItemOutcome, bool)> {
        let plan = MutationPlan::for_item(item);
        // A swap is not idempotent; once it has landed it is never sent again.
        let swapped_before = self
            .ledger
            .record()
            .items
            .get(&item.id)
            .map(|p| swap_landed(p, item))
            .unwrap_or(false);

        let (progress, sent) = match self.config.mode {
            RunMode::DryRun => {
                obs::emit_plan(&item.title, &plan);
                (dry_run_progress(&plan, swapped_before), false)
            }
            RunMode::Apply => self.apply_plan(&plan, swapped_before, retries).await?,
        };

        let outcome = match progress.status {
            ItemStatus::Done => ItemOutcome::Done,
            ItemStatus::Failed => ItemOutcome::Failed(progress.reasons.clone()),
            ItemStatus::Skipped => ItemOutcome::Skipped,
        };
        self.ledger.mark(&item.id, progress)?;
        Ok((outcome, sent))
    }

    async fn apply_plan(
        &mut self,
        plan: &MutationPlan,
        swapped_before: bool,
        retries: &mut u64,
    ) -> Result<(ItemProgress, bool)> {
        let mut reasons = Vec::new();
        let mut sent = false;
        // Set whenever the swap may have partly landed. The swap is two
        // requests and the first one alone already reorders the product.
        let mut swap_target = None;

        let images = if swapped_before {
            AspectStatus::Applied
        } else {
            match &plan.images {
                Err(e) => {
                    reasons.push(format!("images: {e}"));
                    AspectStatus::Failed
                }
                Ok(swap) => {
                    sent = true;
                    match self.send(&plan.item_id, &swap.to_mutation(), retries).await {
                        Ok(Sent::Applied) => AspectStatus::Applied,
                        Ok(Sent::Rejected(reason)) => {
                            reasons.push(format!("images: {reason}"));
                            swap_target = Some(swap.leading());
                            AspectStatus::Failed
                        }
                        Err(err) => {
                            let partial = ItemProgress::failed("images: run aborted")
                                .with_images(AspectStatus::Interrupted)
                                .with_swap_target(swap.leading());
                            self.ledger.mark(&plan.item_id, partial)?;
                            return Err(err);
                        }
                    }
                }
            }
        };

        let price = match &plan.price {
            Err(e) => {
                reasons.push(format!("price: {e}"));
                AspectStatus::Failed
            }
            Ok(change) if change.is_noop() => AspectStatus::Unchanged,
            Ok(change) => {
                sent = true;
                match self.send(&plan.item_id, &change.to_mutation(), retries).await {
                    Ok(Sent::Applied) => AspectStatus::Applied,
                    Ok(Sent::Rejected(reason)) => {
                        reasons.push(format!("price: {reason}"));
                        AspectStatus::Failed
                    }
                    Err(err) => {
                        // keep the swap on record so a rerun does not undo it
                        if images == AspectStatus::Applied && !swapped_before {
                            let partial = ItemProgress::failed("price: run aborted")
                                .with_images(AspectStatus::Applied);
                            self.ledger.mark(&plan.item_id, partial)?;
                        }
                        return Err(err);
                    }
                }
            }
        };

        let status = if reasons.is_empty() {
            ItemStatus::Done
        } else {
            ItemStatus::Failed
        };
        let mut progress = ItemProgress::new(status)
            .with_images(images)
            .with_price(price);
        progress.reasons = reasons;
        progress.swap_target = swap_target;
        Ok((progress, sent))
    }

    async fn send(&self, item_id: &str, mutation: &Mutation, retries: &mut u64) -> Result<Sent> {
        let client = &self.client;
        let aspect = mutation.aspect();
        match retry_transient(&self.config.retry, aspect, retries, move || {
            client.apply_mutation(item_id, mutation)
        })
        .await
        {
            Ok(()) => Ok(Sent::Applied),
            Err(RetryError::Permanent(ClientError::Item { reason })) => Ok(Sent::Rejected(reason)),
            Err(e) => Err(fatal(aspect, e)),
        }
    }
}

/// Whether an earlier run already swapped this item's images, either on
/// record or, after an interrupted or rejected swap, as seen in the listing.
fn swap_landed(progress: &ItemProgress, item: &CatalogItem) -> bool {
    if progress.images == Some(AspectStatus::Applied) {
        return true;
    }
    match progress.swap_target.as_deref() {
        Some(target) if !target.is_empty() && target.len() <= item.images.len() => target
            .iter()
            .zip(&item.images)
            .all(|(id, image)| *id == image.id),
        _ => false,
    }
}

fn dry_run_progress(plan: &MutationPlan, swapped_before: bool) -> ItemProgress {
    let images = match &plan.images {
        _ if swapped_before => AspectStatus::Applied,
        Ok(_) => AspectStatus::Planned,
        Err(_) => AspectStatus::Failed,
    };
    let price = match &plan.price {
        Ok(change) if change.is_noop() => AspectStatus::Unchanged,
        Ok(_) => AspectStatus::Planned,
        Err(_) => AspectStatus::Failed,
    };
    let mut progress = ItemProgress::skipped().with_images(images).with_price(price);
    progress.reasons = plan.reasons();
    progress
}

fn fatal(operation: &str, err: RetryError) -> DriverError {
    match err {
        RetryError::Permanent(e @ ClientError::Auth { .. }) => DriverError::Auth(e),
        RetryError::Permanent(e) => DriverError::Client(e),
        RetryError::Exhausted { attempts, last } => DriverError::TransientExhausted {
            operation: operation.to_string(),
            attempts,
            source: last,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_means_unlimited() {
        assert_eq!(RunConfig::new(RunMode::Apply).with_limit(Some(0)).limit, None);
        assert_eq!(
            RunConfig::new(RunMode::Apply).with_limit(Some(3)).limit,
            Some(3)
        );
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(RunMode::default(), RunMode::DryRun);
        assert_eq!(RunMode::DryRun.to_string(), "dry-run");
        assert_eq!(RunMode::Apply.to_string(), "apply");
    }

    #[test]
    fn test_swap_landed_checks_listed_order() {
        let item = CatalogItem::new("1", "Chair", "Venture Design").with_images(["b", "a", "c"]);

        let applied = ItemProgress::done().with_images(AspectStatus::Applied);
        assert!(swap_landed(&applied, &item));

        let interrupted = ItemProgress::failed("images: run aborted")
            .with_images(AspectStatus::Interrupted)
            .with_swap_target(["b", "a"]);
        assert!(swap_landed(&interrupted, &item));

        let untouched =
            CatalogItem::new("1", "Chair", "Venture Design").with_images(["a", "b", "c"]);
        assert!(!swap_landed(&interrupted, &untouched));

        let no_target = ItemProgress::failed("price: HTTP 422").with_images(AspectStatus::Failed);
        assert!(!swap_landed(&no_target, &item));
    }

    #[test]
    fn test_list_errors_map_to_fatal_variants() {
        let auth = fatal("list_page", RetryError::Permanent(ClientError::Auth { status: 401 }));
        assert!(matches!(auth, DriverError::Auth(_)));

        let decode = fatal("list_page", RetryError::Permanent(ClientError::Decode("x".into())));
        assert!(matches!(decode, DriverError::Client(_)));

        let exhausted = fatal(
            "price",
            RetryError::Exhausted {
                attempts: 3,
                last: ClientError::transient("HTTP 503"),
            },
        );
        assert!(matches!(
            exhausted,
            DriverError::TransientExhausted { attempts: 3, ref operation, .. } if operation == "price"
        ));
    }
}
