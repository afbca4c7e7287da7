//! Testing utilities for the tagsync workspace
//!
//! Shared endpoints and fixtures:
//! - [`FakeShop`]: in-memory store answering the three tagging operations
//! - [`ScriptedEndpoint`]: replays canned HTTP outcomes and timestamps calls
//! - record builders

#![allow(missing_docs)]

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tagsync_core::{
    Endpoint, EndpointError, GraphQlRequest, RawResponse, Record, RetryPolicy, TaggerConfig,
    Transaction,
};
use tokio::time::Instant;

pub const GET_ORDERS: &str = "getOrders";
pub const GET_ORDER: &str = "getOrder";
pub const ORDER_UPDATE: &str = "orderUpdate";

/// Order fixture; `gateway = None` gives an order without transactions
pub fn order(n: usize, gateway: Option<&str>, tags: &[&str]) -> Record {
    let record = Record::new(format!("gid://shopify/Order/{n}"), format!("#{}", 1000 + n))
        .with_tags(tags.iter().copied());
    match gateway {
        Some(gateway) => record.with_transactions(vec![
            Transaction::with_gateway(gateway).status("SUCCESS"),
            Transaction::with_gateway("manual").status("SUCCESS"),
        ]),
        None => record,
    }
}

/// `count` orders paying through `gateway`, numbered from 0
pub fn orders(count: usize, gateway: &str) -> Vec<Record> {
    (0..count).map(|n| order(n, Some(gateway), &[])).collect()
}

/// Config suitable for tests: fake credentials, short transient backoff
pub fn test_config() -> TaggerConfig {
    TaggerConfig::new("test.myshopify.com", "shpat_test")
        .with_retry(RetryPolicy::default().with_transient_base(Duration::from_millis(10)))
}

#[derive(Debug, Default)]
struct ShopState {
    orders: Vec<Record>,
    tags: HashMap<String, Vec<String>>,
    requests: HashMap<String, usize>,
    failing_pages: HashSet<usize>,
    failing_reads: HashSet<String>,
    failing_updates: HashSet<String>,
    rejected_updates: HashSet<String>,
    unverifiable: HashSet<String>,
    updated: HashSet<String>,
    pages_served: usize,
}

/// In-memory store behind the GraphQL seam
///
/// Pages are cut from the order list with cursors of the form `cursor:<offset>`.
/// Tag updates replace the stored list, like the real mutation.
#[derive(Debug, Default)]
pub struct FakeShop {
    state: Mutex<ShopState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeShop {
    /// Store holding `orders`; server-side tags start as the orders' tags
    pub fn new(orders: Vec<Record>) -> Self {
        let tags = orders
            .iter()
            .map(|o| (o.id.0.clone(), o.tags.as_slice().to_vec()))
            .collect();
        Self {
            state: Mutex::new(ShopState {
                orders,
                tags,
                ..ShopState::default()
            }),
            ..Self::default()
        }
    }

    /// Delay every response by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer page `page` (1-based) with HTTP 500
    pub fn fail_page(&self, page: usize) {
        self.state.lock().failing_pages.insert(page);
    }

    /// Answer tag reads of `id` with a GraphQL error
    pub fn fail_reads(&self, id: &str) {
        self.state.lock().failing_reads.insert(id.to_string());
    }

    /// Answer tag updates of `id` with HTTP 500
    pub fn fail_updates(&self, id: &str) {
        self.state.lock().failing_updates.insert(id.to_string());
    }

    /// Answer tag updates of `id` with `userErrors`
    pub fn reject_updates(&self, id: &str) {
        self.state.lock().rejected_updates.insert(id.to_string());
    }

    /// Apply updates of `id` but fail every read that follows
    pub fn fail_reads_after_update(&self, id: &str) {
        self.state.lock().unverifiable.insert(id.to_string());
    }

    /// Change tags behind the tagger's back
    pub fn set_tags(&self, id: &str, tags: &[&str]) {
        self.state
            .lock()
            .tags
            .insert(id.to_string(), tags.iter().map(|t| (*t).to_string()).collect());
    }

    /// Tags currently stored for `id`
    pub fn tags(&self, id: &str) -> Vec<String> {
        self.state.lock().tags.get(id).cloned().unwrap_or_default()
    }

    /// Requests received for an operation
    pub fn requests(&self, operation: &str) -> usize {
        self.state
            .lock()
            .requests
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of requests being served at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, request: &GraphQlRequest) -> RawResponse {
        let mut state = self.state.lock();
        let operation = request.operation_name.clone().unwrap_or_default();
        *state.requests.entry(operation.clone()).or_insert(0) += 1;

        match operation.as_str() {
            GET_ORDERS => Self::orders_page(&mut state, &request.variables),
            GET_ORDER => Self::order_tags(&state, &request.variables),
            ORDER_UPDATE => Self::update(&mut state, &request.variables),
            other => RawResponse::status(400, format!("unknown operation {other}")),
        }
    }

    fn orders_page(state: &mut ShopState, variables: &Value) -> RawResponse {
        state.pages_served += 1;
        if state.failing_pages.contains(&state.pages_served) {
            return RawResponse::status(500, "internal error");
        }

        let first = variables["first"].as_u64().unwrap_or(50) as usize;
        let offset = variables["after"]
            .as_str()
            .and_then(|c| c.strip_prefix("cursor:"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (offset + first).min(state.orders.len());
        let start = offset.min(end);

        let edges: Vec<Value> = state.orders[start..end]
            .iter()
            .map(|o| json!({ "node": o }))
            .collect();
        let has_next = end < state.orders.len();
        ok(json!({
            "orders": {
                "pageInfo": {
                    "hasNextPage": has_next,
                    "endCursor": has_next.then(|| format!("cursor:{end}")),
                },
                "edges": edges,
            }
        }))
    }

    fn order_tags(state: &ShopState, variables: &Value) -> RawResponse {
        let id = variables["id"].as_str().unwrap_or_default();
        if state.failing_reads.contains(id)
            || (state.unverifiable.contains(id) && state.updated.contains(id))
        {
            return RawResponse::ok(
                json!({ "errors": [{ "message": format!("cannot read {id}") }] }).to_string(),
            );
        }
        match state.tags.get(id) {
            Some(tags) => ok(json!({ "order": { "id": id, "tags": tags } })),
            None => ok(json!({ "order": null })),
        }
    }

    fn update(state: &mut ShopState, variables: &Value) -> RawResponse {
        let input = &variables["input"];
        let id = input["id"].as_str().unwrap_or_default().to_string();
        if state.failing_updates.contains(&id) {
            return RawResponse::status(500, "internal error");
        }
        if state.rejected_updates.contains(&id) {
            return ok(json!({
                "orderUpdate": {
                    "order": null,
                    "userErrors": [{ "field": ["tags"], "message": "Order is locked" }],
                }
            }));
        }

        let tags: Vec<String> = input["tags"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        state.tags.insert(id.clone(), tags.clone());
        state.updated.insert(id.clone());
        ok(json!({
            "orderUpdate": {
                "order": { "id": id, "tags": tags },
                "userErrors": [],
            }
        }))
    }
}

#[async_trait::async_trait]
impl Endpoint for FakeShop {
    async fn post(&self, request: &GraphQlRequest) -> Result<RawResponse, EndpointError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let response = self.answer(request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response)
    }
}

fn ok(data: Value) -> RawResponse {
    RawResponse::ok(json!({ "data": data }).to_string())
}

/// Replays a fixed sequence of HTTP outcomes
///
/// Once the script runs out the last entry is repeated. Every call is
/// timestamped with tokio's clock so tests can assert on backoff under
/// paused time.
#[derive(Debug)]
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Result<RawResponse, EndpointError>>>,
    calls: Mutex<Vec<(Instant, GraphQlRequest)>>,
}

impl ScriptedEndpoint {
    pub fn new(script: Vec<Result<RawResponse, EndpointError>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one response");
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls received
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Time between consecutive calls
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock();
        calls
            .windows(2)
            .map(|pair| pair[1].0.duration_since(pair[0].0))
            .collect()
    }

    /// Requests received, in order
    pub fn requests(&self) -> Vec<GraphQlRequest> {
        self.calls.lock().iter().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Endpoint for ScriptedEndpoint {
    async fn post(&self, request: &GraphQlRequest) -> Result<RawResponse, EndpointError> {
        self.calls.lock().push((Instant::now(), request.clone()));
        let mut script = self.script.lock();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or_else(|| Err(EndpointError::Network("script exhausted".into())))
    }
}
