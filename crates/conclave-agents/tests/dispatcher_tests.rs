//! Dispatcher behaviour against scripted adapters, on a paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{model, reply, reply_after, Behaviour, ScriptedAdapter, ScriptedFactory};
use conclave_agents::Dispatcher;
use coordination::errors::FailureKind;
use coordination::invocation::{InvocationOptions, InvocationRequest};
use coordination::perf_control::{DispatchConfig, RetryPolicy};
use tokio_util::sync::CancellationToken;

fn dispatcher(adapter: &Arc<ScriptedAdapter>, config: DispatchConfig) -> Dispatcher {
    Dispatcher::new(config, Arc::new(ScriptedFactory(adapter.clone())))
}

fn config(max_concurrency: usize, timeout_secs: u64, retry: RetryPolicy) -> DispatchConfig {
    DispatchConfig {
        max_concurrency,
        request_timeout_secs: timeout_secs,
        retry,
    }
}

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff_ms: 100,
        backoff_multiplier: 2.0,
        max_backoff_ms: 1_000,
        jitter: 0.2,
    }
}

fn requests(ids: &[&str]) -> Vec<InvocationRequest> {
    ids.iter()
        .map(|id| InvocationRequest::new(model(id), "Review the change"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_results_come_back_in_request_order() {
    let adapter = ScriptedAdapter::new();
    adapter.script("slow", reply_after(300, "slow answer"));
    adapter.script("fast", reply_after(5, "fast answer"));
    adapter.script("mid", reply_after(100, "mid answer"));

    let results = dispatcher(&adapter, DispatchConfig::default())
        .dispatch(requests(&["slow", "fast", "mid"]))
        .await;

    let ids: Vec<&str> = results.iter().map(|r| r.model_id.as_str()).collect();
    assert_eq!(ids, ["slow", "fast", "mid"]);
    assert_eq!(results[0].text(), Some("slow answer"));
    assert_eq!(results[1].text(), Some("fast answer"));
    assert!(results.iter().all(|r| r.is_success()));
}

#[tokio::test(start_paused = true)]
async fn test_empty_batch_returns_nothing() {
    let adapter = ScriptedAdapter::new();
    let results = dispatcher(&adapter, DispatchConfig::default())
        .dispatch(Vec::new())
        .await;
    assert!(results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hung_model_times_out_without_delaying_siblings() {
    let adapter = ScriptedAdapter::new();
    adapter.script("stuck", Behaviour::Hang);
    adapter.script("quick", reply_after(20, "done"));

    let results = dispatcher(&adapter, config(4, 2, RetryPolicy::none()))
        .dispatch(requests(&["stuck", "quick"]))
        .await;

    let stuck = results[0].failure().unwrap();
    assert_eq!(stuck.kind, FailureKind::NetworkError);
    assert!(results[0].latency >= Duration::from_secs(2));

    assert!(results[1].is_success());
    assert!(results[1].latency < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_override_applies_per_request() {
    let adapter = ScriptedAdapter::new();
    adapter.script("slowish", reply_after(3_000, "late"));

    let patient = InvocationRequest::new(model("slowish"), "x").with_options(InvocationOptions {
        timeout_secs: Some(10),
        ..InvocationOptions::default()
    });
    let results = dispatcher(&adapter, config(4, 1, RetryPolicy::none()))
        .dispatch(vec![patient])
        .await;
    assert_eq!(results[0].text(), Some("late"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let adapter = ScriptedAdapter::new();
    adapter.script(
        "flaky",
        Behaviour::FailThenReply {
            failures: 2,
            kind: FailureKind::RateLimited,
            retry_after: None,
            text: "eventually".into(),
        },
    );

    let results = dispatcher(&adapter, config(4, 30, fast_retries(2)))
        .dispatch(requests(&["flaky"]))
        .await;

    assert_eq!(results[0].text(), Some("eventually"));
    assert_eq!(results[0].retries_used, 2);
    assert_eq!(adapter.calls("flaky"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let adapter = ScriptedAdapter::new();
    adapter.script(
        "down",
        Behaviour::FailThenReply {
            failures: 10,
            kind: FailureKind::NetworkError,
            retry_after: None,
            text: "never".into(),
        },
    );

    let results = dispatcher(&adapter, config(4, 30, fast_retries(2)))
        .dispatch(requests(&["down"]))
        .await;

    let failure = results[0].failure().unwrap();
    assert_eq!(failure.kind, FailureKind::NetworkError);
    assert_eq!(results[0].retries_used, 2);
    assert_eq!(adapter.calls("down"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_auth_errors_are_not_retried() {
    let adapter = ScriptedAdapter::new();
    adapter.script("locked", Behaviour::Fail(FailureKind::AuthError));
    adapter.script("open", reply("fine"));

    let results = dispatcher(&adapter, config(4, 30, fast_retries(3)))
        .dispatch(requests(&["locked", "open"]))
        .await;

    assert_eq!(results[0].failure().unwrap().kind, FailureKind::AuthError);
    assert_eq!(results[0].retries_used, 0);
    assert_eq!(adapter.calls("locked"), 1);
    assert!(results[1].is_success());
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_is_a_backoff_floor() {
    let adapter = ScriptedAdapter::new();
    adapter.script(
        "throttled",
        Behaviour::FailThenReply {
            failures: 1,
            kind: FailureKind::RateLimited,
            retry_after: Some(Duration::from_secs(7)),
            text: "ok".into(),
        },
    );

    let results = dispatcher(&adapter, config(4, 30, fast_retries(1)))
        .dispatch(requests(&["throttled"]))
        .await;

    assert!(results[0].is_success());
    assert!(results[0].latency >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_beyond_request_timeout_is_not_honoured() {
    let adapter = ScriptedAdapter::new();
    adapter.script(
        "throttled",
        Behaviour::FailThenReply {
            failures: 1,
            kind: FailureKind::RateLimited,
            retry_after: Some(Duration::from_secs(86_400)),
            text: "tomorrow".into(),
        },
    );
    let policy = RetryPolicy {
        max_backoff_ms: 5_000,
        ..fast_retries(1)
    };

    let results = dispatcher(&adapter, config(4, 5, policy))
        .dispatch(requests(&["throttled"]))
        .await;

    let failure = results[0].failure().unwrap();
    assert_eq!(failure.kind, FailureKind::RateLimited);
    assert_eq!(results[0].retries_used, 0);
    assert_eq!(adapter.calls("throttled"), 1);
    assert!(results[0].latency < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_queues_extra_work() {
    let adapter = ScriptedAdapter::new();
    let ids = ["m1", "m2", "m3", "m4", "m5", "m6"];
    for id in ids {
        adapter.script(id, reply_after(100, "ok"));
    }
    let dispatcher = dispatcher(&adapter, config(2, 30, RetryPolicy::none()));

    let results = dispatcher.dispatch(requests(&ids)).await;

    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(adapter.peak_in_flight(), 2);
    assert_eq!(dispatcher.available_slots(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slots_are_released_after_timeouts() {
    let adapter = ScriptedAdapter::new();
    adapter.script("stuck", Behaviour::Hang);
    let dispatcher = dispatcher(&adapter, config(1, 1, RetryPolicy::none()));

    let first = dispatcher.dispatch(requests(&["stuck"])).await;
    assert!(!first[0].is_success());
    assert_eq!(dispatcher.available_slots(), 1);

    let second = dispatcher.dispatch(requests(&["other"])).await;
    assert!(second[0].is_success());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_keeps_finished_results() {
    let adapter = ScriptedAdapter::new();
    adapter.script("done", reply_after(10, "early"));
    adapter.script("stuck", Behaviour::Hang);
    let dispatcher = dispatcher(&adapter, config(4, 60, RetryPolicy::none()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let results = dispatcher
        .dispatch_with_cancel(requests(&["done", "stuck"]), &cancel)
        .await;

    assert_eq!(results[0].text(), Some("early"));
    let stuck = results[1].failure().unwrap();
    assert_eq!(stuck.kind, FailureKind::Cancelled);
    assert_eq!(stuck.model_id, "stuck");
    assert!(results[1].latency < Duration::from_secs(60));
    assert_eq!(dispatcher.available_slots(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_never_invokes() {
    let adapter = ScriptedAdapter::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let results = dispatcher(&adapter, DispatchConfig::default())
        .dispatch_with_cancel(requests(&["a", "b"]), &cancel)
        .await;

    assert!(results
        .iter()
        .all(|r| r.failure().map(|f| f.kind) == Some(FailureKind::Cancelled)));
    assert_eq!(adapter.total_calls(), 0);
}
