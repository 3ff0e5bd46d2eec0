use async_trait::async_trait;
use std::time::Duration;
use weavecore::{Activity, ActivityContext, ActivityError, Value};

fn required_arg(name: &str, args: &[Value], index: usize) -> Result<Value, ActivityError> {
    args.get(index)
        .cloned()
        .ok_or_else(|| ActivityError::Failed(format!("{} expects argument {}", name, index)))
}

/// Simulated compute activity: tags its argument with "A:".
pub struct TagA;

#[async_trait]
impl Activity for TagA {
    fn name(&self) -> &str {
        "sim.a"
    }

    async fn run(&self, _ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError> {
        let x = required_arg(self.name(), &args, 0)?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Value::Str(format!("A:{}", x)))
    }
}

/// Simulated compute activity: tags its argument with "B:".
pub struct TagB;

#[async_trait]
impl Activity for TagB {
    fn name(&self) -> &str {
        "sim.b"
    }

    async fn run(&self, _ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError> {
        let y = required_arg(self.name(), &args, 0)?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Value::Str(format!("B:{}", y)))
    }
}

/// Joins two upstream results into "C(a+b)".
pub struct JoinC;

#[async_trait]
impl Activity for JoinC {
    fn name(&self) -> &str {
        "sim.c"
    }

    async fn run(&self, _ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError> {
        let a = required_arg(self.name(), &args, 0)?;
        let b = required_arg(self.name(), &args, 1)?;
        Ok(Value::Str(format!("C({}+{})", a, b)))
    }
}

/// Simulated fetch; a production counterpart would do HTTP or storage I/O
/// and has to be idempotent under retries.
pub struct SimFetch;

#[async_trait]
impl Activity for SimFetch {
    fn name(&self) -> &str {
        "sim.fetch"
    }

    async fn run(&self, _ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError> {
        let url = required_arg(self.name(), &args, 0)?;
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(Value::Str(format!("content-of-{}", url)))
    }
}

/// Approval stub that always signs off.
pub struct AutoApprove;

#[async_trait]
impl Activity for AutoApprove {
    fn name(&self) -> &str {
        "sim.approve"
    }

    async fn run(&self, _ctx: ActivityContext, _args: Vec<Value>) -> Result<Value, ActivityError> {
        Ok(Value::Bool(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use weavecore::EventBus;

    fn ctx() -> ActivityContext {
        let bus = EventBus::new(16);
        ActivityContext {
            run_id: uuid::Uuid::new_v4(),
            attempt: 1,
            events: bus.create_emitter(uuid::Uuid::new_v4()),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn tag_activities_format_their_argument() {
        let out = TagA.run(ctx(), vec![Value::Int(1)]).await.unwrap();
        assert_eq!(out, Value::Str("A:1".into()));
        let out = TagB.run(ctx(), vec![Value::Int(2)]).await.unwrap();
        assert_eq!(out, Value::Str("B:2".into()));
    }

    #[tokio::test]
    async fn join_combines_both_arguments() {
        let out = JoinC
            .run(ctx(), vec![Value::Str("A:1".into()), Value::Str("B:2".into())])
            .await
            .unwrap();
        assert_eq!(out, Value::Str("C(A:1+B:2)".into()));
    }

    #[tokio::test]
    async fn fetch_prefixes_the_url() {
        let out = SimFetch
            .run(ctx(), vec![Value::Str("u1".into())])
            .await
            .unwrap();
        assert_eq!(out, Value::Str("content-of-u1".into()));
    }

    #[tokio::test]
    async fn missing_arguments_are_rejected() {
        let err = TagA.run(ctx(), vec![]).await.unwrap_err();
        assert!(matches!(err, ActivityError::Failed(_)));
    }
}
