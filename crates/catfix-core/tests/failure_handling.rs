//! Per-item failures versus run-stopping failures.

use std::time::Duration;

use catalog_client::fakes::FakeCatalog;
use catalog_client::{CatalogItem, ClientError, Money, Mutation};
use catfix_core::{Driver, DriverError, ItemOutcome, RunConfig, RunMode};
use progress_ledger::fakes::MemoryLedger;
use progress_ledger::{AspectStatus, ItemStatus, ProgressLedger};

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

fn product(id: &str) -> CatalogItem {
    CatalogItem::new(id, format!("Sofa {id}"), "Venture Design")
        .with_images([format!("{id}a"), format!("{id}b")])
        .with_variant(format!("v{id}"), None, Some(money("100.00")))
}

fn apply() -> RunConfig {
    RunConfig::new(RunMode::Apply).with_throttle(Duration::ZERO)
}

fn driver(items: Vec<CatalogItem>) -> Driver<FakeCatalog, MemoryLedger> {
    Driver::new(FakeCatalog::new(items, 10), MemoryLedger::new(), apply())
}

#[tokio::test(start_paused = true)]
async fn single_image_item_still_gets_its_price() {
    let lonely = CatalogItem::new("1", "Stool", "Venture Design")
        .with_images(["only"])
        .with_variant("v1", Some(money("10.00")), Some(money("100.00")));
    let mut driver = driver(vec![lonely]);
    let summary = driver.run().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(
        driver.client().mutations(),
        vec![(
            "1".to_string(),
            Mutation::SetPrice {
                variant_id: "v1".into(),
                price: money("175.00")
            }
        )]
    );

    let entry = &driver.ledger().record().items["1"];
    assert_eq!(entry.status, ItemStatus::Failed);
    assert_eq!(entry.images, Some(AspectStatus::Failed));
    assert_eq!(entry.price, Some(AspectStatus::Applied));
    assert_eq!(entry.reasons, vec!["images: insufficient_images"]);
}

#[tokio::test(start_paused = true)]
async fn missing_cost_still_swaps_images() {
    let no_cost = CatalogItem::new("1", "Stool", "Venture Design")
        .with_images(["a", "b"])
        .with_variant("v1", Some(money("10.00")), None);
    let free = CatalogItem::new("2", "Bench", "Venture Design")
        .with_images(["c", "d"])
        .with_variant("v2", None, Some(Money::ZERO));
    let mut driver = driver(vec![no_cost, free]);
    driver.run().await.unwrap();

    assert_eq!(driver.client().mutation_count(), 2);
    let record = driver.ledger().record();
    assert_eq!(record.items["1"].reasons, vec!["price: missing_cost"]);
    assert_eq!(record.items["2"].reasons, vec!["price: non_positive_cost"]);
    assert_eq!(record.items["2"].images, Some(AspectStatus::Applied));
}

#[tokio::test(start_paused = true)]
async fn item_rejection_does_not_stop_the_run() {
    let mut driver = driver(vec![product("1"), product("2"), product("3")]);
    driver.client().reject_mutation(
        "2",
        "price",
        ClientError::item("HTTP 422: price must be a number"),
    );
    let summary = driver.run().await.unwrap();

    assert_eq!((summary.done, summary.failed), (2, 1));
    let entry = &driver.ledger().record().items["2"];
    assert_eq!(entry.images, Some(AspectStatus::Applied));
    assert_eq!(entry.reasons, vec!["price: HTTP 422: price must be a number"]);
    assert!(driver.ledger().is_processed("3"));
}

#[tokio::test(start_paused = true)]
async fn retrying_a_failed_item_does_not_swap_back() {
    let mut driver = driver(vec![product("1")]);
    driver
        .client()
        .reject_mutation("1", "price", ClientError::item("HTTP 422"));
    driver.run().await.unwrap();
    driver.run().await.unwrap();

    let images: Vec<String> = driver
        .client()
        .item("1")
        .unwrap()
        .images
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(images, vec!["1b", "1a"]);
    assert_eq!(driver.client().mutation_count(), 1);
    assert_eq!(driver.ledger().status_of("1"), Some(ItemStatus::Failed));
}

#[tokio::test(start_paused = true)]
async fn auth_failure_aborts_immediately() {
    let mut driver = driver(vec![product("1"), product("2"), product("3")]);
    driver
        .client()
        .reject_mutation("2", "images", ClientError::Auth { status: 401 });
    let err = driver.run().await.unwrap_err();

    assert!(matches!(err, DriverError::Auth(ClientError::Auth { status: 401 })));
    assert_eq!(driver.client().touched_items(), vec!["1"]);
    assert!(driver.ledger().is_processed("1"));
    let entry = &driver.ledger().record().items["2"];
    assert_eq!(entry.status, ItemStatus::Failed);
    assert_eq!(entry.images, Some(AspectStatus::Interrupted));
    assert_eq!(entry.price, None);
    assert_eq!(driver.ledger().status_of("3"), None);
}

#[tokio::test(start_paused = true)]
async fn auth_failure_on_listing_aborts() {
    let mut driver = driver(vec![product("1")]);
    driver
        .client()
        .fail_listing([ClientError::Auth { status: 403 }]);
    let err = driver.run().await.unwrap_err();

    assert!(matches!(err, DriverError::Auth(_)));
    assert_eq!(driver.client().mutation_count(), 0);
    assert_eq!(driver.ledger().counts().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let mut driver = driver(vec![product("1")]);
    driver.client().fail_listing([ClientError::transient("HTTP 502")]);
    driver
        .client()
        .fail_mutation_times("1", "price", ClientError::transient("HTTP 503"), 2);
    let summary = driver.run().await.unwrap();

    assert_eq!(summary.done, 1);
    assert_eq!(summary.retries, 3);
    assert_eq!(driver.ledger().record().stats.retries, 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_stop_the_run_and_keep_the_swap() {
    let mut driver = driver(vec![product("1"), product("2")]);
    driver
        .client()
        .fail_mutation_times("1", "price", ClientError::transient("timeout"), 5);
    let err = driver.run().await.unwrap_err();

    match err {
        DriverError::TransientExhausted {
            operation,
            attempts,
            ..
        } => {
            assert_eq!(operation, "price");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    let entry = &driver.ledger().record().items["1"];
    assert_eq!(entry.status, ItemStatus::Failed);
    assert_eq!(entry.images, Some(AspectStatus::Applied));
    assert_eq!(driver.ledger().status_of("2"), None);

    // two scripted failures remain; the rerun absorbs them and finishes
    let summary = driver.run().await.unwrap();
    assert_eq!(summary.done, 2);
    let images: Vec<String> = driver
        .client()
        .item("1")
        .unwrap()
        .images
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(images, vec!["1b", "1a"]);
}

#[tokio::test(start_paused = true)]
async fn malformed_listing_is_fatal() {
    let mut driver = driver(vec![product("1")]);
    driver
        .client()
        .fail_listing([ClientError::Decode("missing data.products".into())]);
    let err = driver.run().await.unwrap_err();
    assert!(matches!(err, DriverError::Client(ClientError::Decode(_))));
}

#[tokio::test(start_paused = true)]
async fn dry_run_records_why_aspects_cannot_apply() {
    let lonely = CatalogItem::new("1", "Stool", "Venture Design").with_images(["only"]);
    let mut driver = Driver::new(
        FakeCatalog::new(vec![lonely], 10),
        MemoryLedger::new(),
        RunConfig::new(RunMode::DryRun).with_throttle(Duration::ZERO),
    );
    driver.run().await.unwrap();

    let entry = &driver.ledger().record().items["1"];
    assert_eq!(entry.status, ItemStatus::Skipped);
    assert_eq!(
        entry.reasons,
        vec!["images: insufficient_images", "price: missing_variant"]
    );
    assert_eq!(
        ItemOutcome::Failed(entry.reasons.clone()).status(),
        ItemStatus::Failed
    );
}

fn image_ids(driver: &Driver<FakeCatalog, MemoryLedger>, id: &str) -> Vec<String> {
    driver
        .client()
        .item(id)
        .unwrap()
        .images
        .into_iter()
        .map(|i| i.id)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn swap_that_landed_before_an_abort_is_not_undone() {
    let mut driver = driver(vec![product("1"), product("2")]);
    driver
        .client()
        .land_then_fail("1", "images", ClientError::transient("HTTP 503"), 3);
    let err = driver.run().await.unwrap_err();

    assert!(matches!(
        err,
        DriverError::TransientExhausted { ref operation, .. } if operation == "images"
    ));
    assert_eq!(image_ids(&driver, "1"), vec!["1b", "1a"]);
    let entry = &driver.ledger().record().items["1"];
    assert_eq!(entry.status, ItemStatus::Failed);
    assert_eq!(entry.images, Some(AspectStatus::Interrupted));
    assert_eq!(entry.swap_target, Some(vec!["1b".to_string(), "1a".to_string()]));

    let summary = driver.run().await.unwrap();
    assert_eq!(summary.done, 2);
    assert_eq!(image_ids(&driver, "1"), vec!["1b", "1a"]);
    let entry = &driver.ledger().record().items["1"];
    assert_eq!(entry.images, Some(AspectStatus::Applied));
    assert_eq!(entry.price, Some(AspectStatus::Applied));
}

#[tokio::test(start_paused = true)]
async fn swap_that_never_landed_is_sent_again() {
    let mut driver = driver(vec![product("1")]);
    driver
        .client()
        .fail_mutation_times("1", "images", ClientError::transient("timeout"), 3);
    driver.run().await.unwrap_err();
    assert_eq!(image_ids(&driver, "1"), vec!["1a", "1b"]);
    assert_eq!(
        driver.ledger().record().items["1"].images,
        Some(AspectStatus::Interrupted)
    );

    let summary = driver.run().await.unwrap();
    assert_eq!(summary.done, 1);
    assert_eq!(image_ids(&driver, "1"), vec!["1b", "1a"]);
}

#[tokio::test(start_paused = true)]
async fn rejected_swap_that_landed_is_not_undone() {
    let mut driver = driver(vec![product("1")]);
    driver
        .client()
        .land_then_fail("1", "images", ClientError::item("HTTP 422: position"), 1);
    let summary = driver.run().await.unwrap();

    assert_eq!(summary.failed, 1);
    let entry = &driver.ledger().record().items["1"];
    assert_eq!(entry.images, Some(AspectStatus::Failed));
    assert_eq!(entry.reasons, vec!["images: HTTP 422: position"]);

    let summary = driver.run().await.unwrap();
    assert_eq!(summary.done, 1);
    assert_eq!(image_ids(&driver, "1"), vec!["1b", "1a"]);
    assert_eq!(
        driver.ledger().record().items["1"].price,
        Some(AspectStatus::Unchanged)
    );
}
