use crate::dsl::{ActOpts, RetryPolicy, Workflow, DEFAULT_TIMEOUT_SEC};
use crate::error::ActivityError;
use crate::events::{EventEmitter, RunId};
use crate::value::Value;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Effective per-invocation options, after layering node-level overrides on
/// top of the workflow-level defaults.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub start_to_close: Duration,
    pub schedule_to_close: Option<Duration>,
    pub heartbeat: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        ActivityOptions {
            start_to_close: Duration::from_secs(DEFAULT_TIMEOUT_SEC),
            schedule_to_close: None,
            heartbeat: None,
            retry: None,
        }
    }
}

impl ActivityOptions {
    /// Ambient options for a run: the workflow-level timeout (30 s fallback)
    /// and the workflow-level retry policy.
    pub fn for_workflow(wf: &Workflow) -> Self {
        ActivityOptions {
            start_to_close: if wf.timeout_sec > 0 {
                Duration::from_secs(wf.timeout_sec)
            } else {
                Duration::from_secs(DEFAULT_TIMEOUT_SEC)
            },
            schedule_to_close: None,
            heartbeat: None,
            retry: wf.retry.clone(),
        }
    }

    /// Layer node-level options over these: only positive/non-nil source
    /// fields override, everything else inherits.
    pub fn merged(&self, opts: &ActOpts) -> Self {
        let mut out = self.clone();
        if opts.start_to_close_seconds > 0 {
            out.start_to_close = Duration::from_secs(opts.start_to_close_seconds);
        }
        if opts.schedule_to_close_seconds > 0 {
            out.schedule_to_close = Some(Duration::from_secs(opts.schedule_to_close_seconds));
        }
        if opts.heartbeat_seconds > 0 {
            out.heartbeat = Some(Duration::from_secs(opts.heartbeat_seconds));
        }
        if opts.retry.is_some() {
            out.retry = opts.retry.clone();
        }
        out
    }
}

/// Context handed to a running activity implementation.
#[derive(Clone)]
pub struct ActivityContext {
    pub run_id: RunId,
    /// 1-based attempt counter; increments across substrate retries.
    pub attempt: u32,
    pub events: EventEmitter,
    pub cancellation: CancellationToken,
}

/// A named, externally-implemented, side-effecting operation.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Registered name (e.g. "sim.fetch", "http.fetch").
    fn name(&self) -> &str;

    async fn run(&self, ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError>;
}

/// The narrow port through which the interpreter reaches the execution
/// substrate. A production implementation dispatches to a durable runtime; a
/// test implementation can script results and record the call log.
#[async_trait]
pub trait ActivityInvoker: Send + Sync {
    /// Invoke a registered activity and await its fully-typed result. The
    /// substrate owns timeouts and retry policy.
    async fn execute(
        &self,
        opts: &ActivityOptions,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ActivityError>;

    /// Cooperative suspension for the given duration.
    async fn sleep(&self, duration: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{ActOpts, RetryPolicy};

    #[test]
    fn workflow_timeout_falls_back_to_thirty_seconds() {
        let wf = Workflow::default();
        assert_eq!(
            ActivityOptions::for_workflow(&wf).start_to_close,
            Duration::from_secs(30)
        );
        let wf = Workflow {
            timeout_sec: 5,
            ..Default::default()
        };
        assert_eq!(
            ActivityOptions::for_workflow(&wf).start_to_close,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn merge_overrides_only_set_fields() {
        let ambient = ActivityOptions {
            start_to_close: Duration::from_secs(30),
            schedule_to_close: None,
            heartbeat: None,
            retry: Some(RetryPolicy {
                max_attempts: 3,
                ..Default::default()
            }),
        };
        let merged = ambient.merged(&ActOpts {
            start_to_close_seconds: 10,
            ..Default::default()
        });
        assert_eq!(merged.start_to_close, Duration::from_secs(10));
        assert!(merged.schedule_to_close.is_none());
        // unset retry inherits the ambient policy
        assert_eq!(merged.retry.as_ref().map(|r| r.max_attempts), Some(3));

        let merged = ambient.merged(&ActOpts {
            schedule_to_close_seconds: 60,
            heartbeat_seconds: 2,
            retry: Some(RetryPolicy {
                max_attempts: 1,
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(merged.start_to_close, Duration::from_secs(30));
        assert_eq!(merged.schedule_to_close, Some(Duration::from_secs(60)));
        assert_eq!(merged.heartbeat, Some(Duration::from_secs(2)));
        assert_eq!(merged.retry.as_ref().map(|r| r.max_attempts), Some(1));
    }
}
