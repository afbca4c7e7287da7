use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tagsync_core::{
    CancelSignal, Orchestrator, Outcome, ReconcileError, Reconciler, ShopApi, Transport,
};
use tagsync_test_utils::{order, orders, test_config, FakeShop, GET_ORDER, ORDER_UPDATE};

fn orchestrator(shop: &Arc<FakeShop>, concurrency: usize) -> Orchestrator {
    let api = ShopApi::new(Transport::new(shop.clone(), test_config().retry));
    Orchestrator::new(Reconciler::new(api), concurrency)
}

fn reconciler(shop: &Arc<FakeShop>) -> Reconciler {
    Reconciler::new(ShopApi::new(Transport::new(shop.clone(), test_config().retry)))
}

#[tokio::test]
async fn test_second_run_makes_no_mutations() {
    let records = orders(12, "shopify_payments");
    let shop = Arc::new(FakeShop::new(records.clone()));
    let orchestrator = orchestrator(&shop, 5);

    let first = orchestrator.run(records.clone()).await;
    assert_eq!(first.counts.tagged, 12);
    assert_eq!(shop.requests(ORDER_UPDATE), 12);

    let second = orchestrator.run(records).await;
    assert_eq!(second.counts.already_tagged, 12);
    assert_eq!(second.counts.tagged, 0);
    assert_eq!(shop.requests(ORDER_UPDATE), 12);

    for n in 0..12 {
        let tags = shop.tags(&format!("gid://shopify/Order/{n}"));
        assert_eq!(tags, vec!["shopify_payments".to_string()]);
    }
}

#[tokio::test]
async fn test_appends_to_server_tags_not_fetched_tags() {
    let record = order(1, Some("paypal"), &["vip"]);
    let shop = Arc::new(FakeShop::new(vec![record.clone()]));
    // Someone edited the order after it was fetched
    shop.set_tags("gid://shopify/Order/1", &["vip", "gift"]);

    let reconciled = reconciler(&shop).reconcile(record).await.unwrap();

    assert_eq!(reconciled.outcome, Outcome::Tagged);
    assert_eq!(
        shop.tags("gid://shopify/Order/1"),
        vec!["vip".to_string(), "gift".to_string(), "paypal".to_string()]
    );
    assert_eq!(reconciled.record.tags.as_slice(), shop.tags("gid://shopify/Order/1"));
}

#[tokio::test]
async fn test_tag_added_elsewhere_is_not_duplicated() {
    let record = order(1, Some("paypal"), &[]);
    let shop = Arc::new(FakeShop::new(vec![record.clone()]));
    shop.set_tags("gid://shopify/Order/1", &["paypal"]);

    let reconciled = reconciler(&shop).reconcile(record).await.unwrap();

    assert_eq!(reconciled.outcome, Outcome::AlreadyTagged);
    assert_eq!(reconciled.record.tags.as_slice(), ["paypal".to_string()]);
    assert_eq!(shop.requests(ORDER_UPDATE), 0);
}

#[tokio::test]
async fn test_no_gateway_makes_no_calls() {
    let record = order(1, None, &["vip"]);
    let shop = Arc::new(FakeShop::new(vec![record.clone()]));

    let reconciled = reconciler(&shop).reconcile(record.clone()).await.unwrap();

    assert_eq!(reconciled.outcome, Outcome::SkippedNoGateway);
    assert_eq!(reconciled.record, record);
    assert_eq!(shop.requests(GET_ORDER), 0);
    assert_eq!(shop.requests(ORDER_UPDATE), 0);
}

#[tokio::test]
async fn test_unverified_update_still_counts_as_tagged() {
    let record = order(1, Some("paypal"), &["vip"]);
    let shop = Arc::new(FakeShop::new(vec![record.clone()]));
    shop.fail_reads_after_update("gid://shopify/Order/1");

    let reconciled = reconciler(&shop).reconcile(record).await.unwrap();

    assert_eq!(reconciled.outcome, Outcome::Tagged);
    assert_eq!(
        reconciled.record.tags.as_slice(),
        ["vip".to_string(), "paypal".to_string()]
    );
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let records = orders(10, "paypal");
    let shop = Arc::new(FakeShop::new(records.clone()));
    shop.reject_updates("gid://shopify/Order/3");
    shop.fail_updates("gid://shopify/Order/4");
    shop.fail_reads("gid://shopify/Order/5");

    let report = orchestrator(&shop, 3).run(records).await;

    assert_eq!(report.counts.tagged, 7);
    assert_eq!(report.counts.failed, 3);
    assert_eq!(report.included.len(), 7);
    assert_eq!(report.not_dispatched, 0);
    assert!(report
        .included
        .iter()
        .all(|r| !["3", "4", "5"].iter().any(|n| r.id.as_str().ends_with(n))));

    let mut failures: Vec<_> = report
        .failures
        .iter()
        .map(|f| (f.id.as_str().to_string(), f.error.clone()))
        .collect();
    failures.sort_by(|a, b| a.0.cmp(&b.0));
    assert!(matches!(failures[0].1, ReconcileError::UserErrors(ref e) if e[0].message == "Order is locked"));
    assert!(matches!(failures[1].1, ReconcileError::UpdateTags(_)));
    assert!(matches!(failures[2].1, ReconcileError::ReadTags(_)));
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let records = orders(40, "paypal");
    let shop = Arc::new(FakeShop::new(records.clone()).with_latency(Duration::from_millis(10)));

    let report = orchestrator(&shop, 5).run(records).await;

    assert_eq!(report.counts.tagged, 40);
    assert_eq!(shop.max_in_flight(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_single_worker_is_sequential() {
    let records = orders(6, "paypal");
    let shop = Arc::new(FakeShop::new(records.clone()).with_latency(Duration::from_millis(10)));

    let report = orchestrator(&shop, 1).run(records).await;

    assert_eq!(report.counts.tagged, 6);
    assert_eq!(shop.max_in_flight(), 1);
}

#[tokio::test]
async fn test_cancel_before_start_dispatches_nothing() {
    let records = orders(8, "paypal");
    let shop = Arc::new(FakeShop::new(records.clone()));
    let cancel = CancelSignal::new();
    cancel.cancel();

    let report = orchestrator(&shop, 2).with_cancel(cancel).run(records).await;

    assert_eq!(report.not_dispatched, 8);
    assert!(report.included.is_empty());
    assert_eq!(shop.requests(GET_ORDER), 0);
}
