use std::sync::Arc;
use std::time::Duration;
use tagsync_core::{CancelSignal, PaginationError, Record, RunError, Tagger};
use tagsync_test_utils::{
    order, orders, test_config, FakeShop, GET_ORDER, GET_ORDERS, ORDER_UPDATE,
};

#[tokio::test]
async fn test_full_run_writes_included_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = orders(8, "paypal");
    records.push(order(8, None, &["wholesale"]));
    records.push(order(9, Some("stripe"), &["stripe"]));
    let shop = Arc::new(FakeShop::new(records));
    shop.reject_updates("gid://shopify/Order/2");

    let config = test_config().with_page_size(3).with_output_dir(dir.path());
    let summary = Tagger::with_endpoint(&config, shop.clone())
        .run(None)
        .await
        .unwrap();

    assert_eq!(summary.fetched, 10);
    assert_eq!(summary.counts.tagged, 7);
    assert_eq!(summary.counts.already_tagged, 1);
    assert_eq!(summary.counts.skipped_no_gateway, 1);
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.included, 9);
    assert_eq!(summary.excluded, 1);

    let path = summary.output.expect("result file");
    assert!(path.starts_with(dir.path()));
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("orders_") && name.ends_with(".json"));

    let saved: Vec<Record> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(saved.len(), 9);
    assert!(saved.iter().all(|r| r.id.as_str() != "gid://shopify/Order/2"));
    let tagged = saved
        .iter()
        .find(|r| r.id.as_str() == "gid://shopify/Order/0")
        .unwrap();
    assert!(tagged.tags.contains("paypal"));
}

#[tokio::test]
async fn test_limit_caps_processing() {
    let dir = tempfile::tempdir().unwrap();
    let shop = Arc::new(FakeShop::new(orders(30, "paypal")));
    let config = test_config().with_page_size(10).with_output_dir(dir.path());

    let summary = Tagger::with_endpoint(&config, shop.clone())
        .run(Some(12))
        .await
        .unwrap();

    assert_eq!(summary.fetched, 12);
    assert_eq!(shop.requests(ORDER_UPDATE), 12);
}

#[tokio::test]
async fn test_empty_store_is_nothing_fetched() {
    let dir = tempfile::tempdir().unwrap();
    let shop = Arc::new(FakeShop::new(Vec::new()));
    let config = test_config().with_output_dir(dir.path());

    let err = Tagger::with_endpoint(&config, shop).run(None).await.unwrap_err();

    assert!(matches!(err, RunError::NothingFetched { cause: None }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_first_page_failure_is_nothing_fetched() {
    let dir = tempfile::tempdir().unwrap();
    let shop = Arc::new(FakeShop::new(orders(5, "paypal")));
    shop.fail_page(1);
    let config = test_config().with_output_dir(dir.path());

    let err = Tagger::with_endpoint(&config, shop).run(None).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::NothingFetched {
            cause: Some(PaginationError::PageFailed { page: 1, .. })
        }
    ));
}

#[tokio::test]
async fn test_partial_fetch_still_processes() {
    let dir = tempfile::tempdir().unwrap();
    let shop = Arc::new(FakeShop::new(orders(25, "paypal")));
    shop.fail_page(3);
    let config = test_config().with_page_size(10).with_output_dir(dir.path());

    let summary = Tagger::with_endpoint(&config, shop).run(None).await.unwrap();

    assert_eq!(summary.fetched, 20);
    assert_eq!(summary.counts.tagged, 20);
    assert!(summary.output.is_some());
}

#[tokio::test]
async fn test_all_failed_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let shop = Arc::new(FakeShop::new(orders(2, "paypal")));
    shop.fail_updates("gid://shopify/Order/0");
    shop.fail_updates("gid://shopify/Order/1");
    let config = test_config().with_output_dir(dir.path());

    let summary = Tagger::with_endpoint(&config, shop).run(None).await.unwrap();

    assert_eq!(summary.counts.failed, 2);
    assert_eq!(summary.included, 0);
    assert!(summary.output.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_fetches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let shop = Arc::new(FakeShop::new(orders(120, "paypal")));
    let config = test_config().with_output_dir(dir.path());
    let cancel = CancelSignal::new();
    cancel.cancel();

    let err = Tagger::with_endpoint(&config, shop.clone())
        .with_cancel(cancel)
        .run(None)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Cancelled { fetched: 0 }));
    assert_eq!(shop.requests(GET_ORDERS), 0);
    assert_eq!(shop.requests(GET_ORDER), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_fetch_stops_paging() {
    let dir = tempfile::tempdir().unwrap();
    let shop = Arc::new(
        FakeShop::new(orders(200, "paypal")).with_latency(Duration::from_millis(10)),
    );
    let config = test_config().with_output_dir(dir.path());
    let cancel = CancelSignal::new();
    let tagger = Tagger::with_endpoint(&config, shop.clone()).with_cancel(cancel.clone());

    let (result, ()) = tokio::join!(tagger.run(None), async {
        tokio::time::sleep(Duration::from_millis(15)).await;
        cancel.cancel();
    });

    assert!(matches!(result, Err(RunError::Cancelled { fetched: 100 })));
    assert_eq!(shop.requests(GET_ORDERS), 2);
    assert_eq!(shop.requests(GET_ORDER), 0);
    assert_eq!(shop.requests(ORDER_UPDATE), 0);
}
