use crate::registry::ActivityRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use weavecore::{
    ActivityContext, ActivityError, ActivityInvoker, ActivityOptions, EventEmitter, Value,
};

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// In-process substrate: dispatches activity invocations straight to the
/// registry, enforcing the start-to-close timeout per attempt and the retry
/// policy (exponential backoff, capped by schedule-to-close) across attempts.
///
/// The heartbeat timeout is carried in the options but not enforced here;
/// a durable substrate would act on it.
pub struct LocalInvoker {
    registry: Arc<ActivityRegistry>,
    events: EventEmitter,
    cancel: CancellationToken,
}

impl LocalInvoker {
    pub fn new(
        registry: Arc<ActivityRegistry>,
        events: EventEmitter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            events,
            cancel,
        }
    }
}

#[async_trait]
impl ActivityInvoker for LocalInvoker {
    async fn execute(
        &self,
        opts: &ActivityOptions,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ActivityError> {
        let activity = self
            .registry
            .get(name)
            .ok_or_else(|| ActivityError::Unknown(name.to_string()))?;

        let overall_deadline = opts.schedule_to_close.map(|d| Instant::now() + d);
        let mut backoff = match &opts.retry {
            Some(policy) if policy.initial_interval_sec > 0 => {
                Duration::from_secs(policy.initial_interval_sec)
            }
            _ => DEFAULT_RETRY_INTERVAL,
        };
        let mut attempt: u32 = 1;

        loop {
            let ctx = ActivityContext {
                run_id: self.events.run_id(),
                attempt,
                events: self.events.clone(),
                cancellation: self.cancel.child_token(),
            };
            let outcome = match tokio::time::timeout(
                opts.start_to_close,
                activity.run(ctx, args.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ActivityError::Timeout {
                    seconds: opts.start_to_close.as_secs(),
                }),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(ActivityError::Cancelled) => return Err(ActivityError::Cancelled),
                Err(err) => err,
            };

            let policy = match &opts.retry {
                Some(policy) => policy,
                None => return Err(err),
            };
            if policy.max_attempts > 0 && attempt >= policy.max_attempts {
                if attempt == 1 {
                    return Err(err);
                }
                return Err(ActivityError::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }
            if let Some(deadline) = overall_deadline {
                if Instant::now() + backoff >= deadline {
                    return Err(ActivityError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
            }

            tracing::debug!(
                activity = name,
                attempt,
                delay_ms = backoff.as_millis() as u64,
                error = %err,
                "retrying activity"
            );
            tokio::time::sleep(backoff).await;

            let coefficient = if policy.backoff_coefficient > 0.0 {
                policy.backoff_coefficient
            } else {
                2.0
            };
            backoff = backoff.mul_f64(coefficient);
            if policy.max_interval_sec > 0 {
                backoff = backoff.min(Duration::from_secs(policy.max_interval_sec));
            }
            attempt += 1;
        }
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
