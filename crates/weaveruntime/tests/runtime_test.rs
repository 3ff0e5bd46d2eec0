// crates/weaveruntime/tests/runtime_test.rs
//
// End-to-end runs through WeaveRuntime and the LocalInvoker: registry
// dispatch, retry policy, timeouts, cancellation, and event emission.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weavecore::{
    ActOpts, Activity, ActivityContext, ActivityError, ActivityInvocation, EngineError,
    ExecutionEvent, Expr, RetryPolicy, Statement, Value, Workflow,
};
use weaveruntime::{ActivityRegistry, RuntimeConfig, WeaveRuntime};

struct EchoActivity;

#[async_trait]
impl Activity for EchoActivity {
    fn name(&self) -> &str {
        "test.echo"
    }

    async fn run(&self, _ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError> {
        Ok(args.into_iter().next().unwrap_or(Value::Null))
    }
}

/// Fails until the configured attempt, recording each attempt number.
struct FlakyActivity {
    succeed_on: u32,
    attempts: Mutex<Vec<u32>>,
}

impl FlakyActivity {
    fn new(succeed_on: u32) -> Self {
        Self {
            succeed_on,
            attempts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Activity for FlakyActivity {
    fn name(&self) -> &str {
        "test.flaky"
    }

    async fn run(&self, ctx: ActivityContext, _args: Vec<Value>) -> Result<Value, ActivityError> {
        self.attempts.lock().unwrap().push(ctx.attempt);
        if ctx.attempt < self.succeed_on {
            Err(ActivityError::Failed(format!(
                "transient failure on attempt {}",
                ctx.attempt
            )))
        } else {
            Ok(Value::Str("recovered".into()))
        }
    }
}

struct SlowActivity;

#[async_trait]
impl Activity for SlowActivity {
    fn name(&self) -> &str {
        "test.slow"
    }

    async fn run(&self, _ctx: ActivityContext, _args: Vec<Value>) -> Result<Value, ActivityError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Value::Null)
    }
}

struct CountingActivity {
    calls: AtomicU32,
}

#[async_trait]
impl Activity for CountingActivity {
    fn name(&self) -> &str {
        "test.count"
    }

    async fn run(&self, _ctx: ActivityContext, _args: Vec<Value>) -> Result<Value, ActivityError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(ActivityError::Failed(format!("failure {}", n)))
    }
}

fn runtime_with(activities: Vec<Arc<dyn Activity>>) -> WeaveRuntime {
    let mut registry = ActivityRegistry::new();
    for activity in activities {
        registry.register(activity);
    }
    WeaveRuntime::with_registry(Arc::new(registry), RuntimeConfig::default())
}

fn single_activity_workflow(invocation: ActivityInvocation) -> Workflow {
    Workflow {
        root: Some(Box::new(Statement::activity(invocation))),
        ..Default::default()
    }
}

#[tokio::test]
async fn runs_a_registered_activity_and_binds_the_result() {
    let runtime = runtime_with(vec![Arc::new(EchoActivity)]);
    let wf = single_activity_workflow(
        ActivityInvocation::new("test.echo")
            .arg(Expr::str("hello"))
            .store("out"),
    );

    let bindings = runtime.run(&wf).await.unwrap();
    assert_eq!(bindings["out"], Value::Str("hello".into()));
}

#[tokio::test]
async fn unknown_activity_names_are_rejected() {
    let runtime = runtime_with(vec![]);
    let wf = single_activity_workflow(ActivityInvocation::new("test.ghost"));

    let err = runtime.run(&wf).await.unwrap_err();
    match err {
        EngineError::Activity { name, source } => {
            assert_eq!(name, "test.ghost");
            assert!(matches!(source, ActivityError::Unknown(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn retries_until_the_activity_recovers() {
    let flaky = Arc::new(FlakyActivity::new(3));
    let runtime = runtime_with(vec![flaky.clone()]);
    let wf = single_activity_workflow(
        ActivityInvocation::new("test.flaky")
            .store("out")
            .with_opts(ActOpts {
                retry: Some(RetryPolicy {
                    max_attempts: 5,
                    initial_interval_sec: 1,
                    ..Default::default()
                }),
                ..Default::default()
            }),
    );

    let bindings = runtime.run(&wf).await.unwrap();

    assert_eq!(bindings["out"], Value::Str("recovered".into()));
    assert_eq!(*flaky.attempts.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn retries_exhaust_at_max_attempts() {
    let counting = Arc::new(CountingActivity {
        calls: AtomicU32::new(0),
    });
    let runtime = runtime_with(vec![counting.clone()]);
    let wf = single_activity_workflow(ActivityInvocation::new("test.count").with_opts(ActOpts {
        retry: Some(RetryPolicy {
            max_attempts: 3,
            initial_interval_sec: 1,
            ..Default::default()
        }),
        ..Default::default()
    }));

    let err = runtime.run(&wf).await.unwrap_err();

    match err {
        EngineError::Activity { source, .. } => {
            assert!(matches!(
                source,
                ActivityError::RetriesExhausted { attempts: 3, .. }
            ));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(counting.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn no_retry_policy_means_a_single_attempt() {
    let counting = Arc::new(CountingActivity {
        calls: AtomicU32::new(0),
    });
    let runtime = runtime_with(vec![counting.clone()]);
    let wf = single_activity_workflow(ActivityInvocation::new("test.count"));

    let err = runtime.run(&wf).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::Activity {
            source: ActivityError::Failed(_),
            ..
        }
    ));
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn start_to_close_timeout_fails_the_attempt() {
    let runtime = runtime_with(vec![Arc::new(SlowActivity)]);
    let wf = single_activity_workflow(ActivityInvocation::new("test.slow").with_opts(ActOpts {
        start_to_close_seconds: 2,
        ..Default::default()
    }));

    let err = runtime.run(&wf).await.unwrap_err();

    match err {
        EngineError::Activity { source, .. } => {
            assert!(matches!(source, ActivityError::Timeout { seconds: 2 }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn schedule_to_close_caps_the_retry_loop() {
    let counting = Arc::new(CountingActivity {
        calls: AtomicU32::new(0),
    });
    let runtime = runtime_with(vec![counting.clone()]);
    let wf = single_activity_workflow(ActivityInvocation::new("test.count").with_opts(ActOpts {
        schedule_to_close_seconds: 15,
        retry: Some(RetryPolicy {
            // unlimited attempts, bounded only by schedule-to-close
            max_attempts: 0,
            initial_interval_sec: 10,
            ..Default::default()
        }),
        ..Default::default()
    }));

    let err = runtime.run(&wf).await.unwrap_err();

    match err {
        EngineError::Activity { source, .. } => {
            assert!(matches!(source, ActivityError::RetriesExhausted { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // first attempt at t=0, second after the 10 s backoff; the next backoff
    // would land past the 15 s deadline
    assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn firing_the_cancel_token_aborts_the_run() {
    let runtime = runtime_with(vec![Arc::new(SlowActivity)]);
    let wf = single_activity_workflow(ActivityInvocation::new("test.slow"));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = runtime.run_with_cancel(&wf, cancel).await.unwrap_err();
    assert!(err.is_cancellation());
}

#[tokio::test]
async fn a_run_emits_lifecycle_events() {
    let runtime = runtime_with(vec![Arc::new(EchoActivity)]);
    let mut events = runtime.subscribe_events();
    let wf = single_activity_workflow(
        ActivityInvocation::new("test.echo")
            .arg(Expr::int(1))
            .store("out"),
    );

    runtime.run(&wf).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen[0], ExecutionEvent::WorkflowStarted { .. }));
    assert!(seen
        .iter()
        .any(|e| matches!(e, ExecutionEvent::ActivityStarted { name, .. } if name == "test.echo")));
    assert!(seen
        .iter()
        .any(|e| matches!(e, ExecutionEvent::ActivityCompleted { name, .. } if name == "test.echo")));
    assert!(matches!(
        seen.last().unwrap(),
        ExecutionEvent::WorkflowCompleted { success: true, .. }
    ));
}

#[tokio::test]
async fn a_failed_run_emits_a_failure_event() {
    let runtime = runtime_with(vec![]);
    let mut events = runtime.subscribe_events();
    let wf = single_activity_workflow(ActivityInvocation::new("test.ghost"));

    runtime.run(&wf).await.unwrap_err();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, ExecutionEvent::ActivityFailed { name, .. } if name == "test.ghost")));
    assert!(matches!(
        seen.last().unwrap(),
        ExecutionEvent::WorkflowCompleted { success: false, .. }
    ));
}
