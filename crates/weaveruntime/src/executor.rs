use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use weavecore::{
    eval_cond, eval_value, deep_eq, ActivityInvocation, ActivityInvoker, ActivityOptions,
    Bindings, EngineError, EventEmitter, If, Map, Parallel, Sequence, Statement, Value, While,
    Workflow, DEFAULT_ITEM_VAR,
};

/// Which operator a merge is running for; decides the conflict error kind.
#[derive(Clone, Copy)]
enum MergeKind {
    Parallel,
    Map,
}

impl MergeKind {
    fn conflict(self, key: String) -> EngineError {
        match self {
            MergeKind::Parallel => EngineError::ParallelWriteConflict(key),
            MergeKind::Map => EngineError::MapWriteConflict(key),
        }
    }
}

/// Workflow-level defaults threaded through the recursive walk.
struct RunEnv {
    ambient: ActivityOptions,
    default_window: usize,
}

/// Tree-walking executor for a workflow statement tree.
///
/// The executor owns no threads: branches and map iterations run as futures
/// on a [`FuturesUnordered`] selector inside the caller's task, so every
/// observable effect is sequenced at a suspension point (activity await,
/// sleep, selector receive). Scopes are cloned at fan-out and merged back
/// after join, so no two live futures ever alias one bindings map.
pub struct Executor {
    invoker: Arc<dyn ActivityInvoker>,
    events: EventEmitter,
}

impl Executor {
    pub fn new(invoker: Arc<dyn ActivityInvoker>, events: EventEmitter) -> Self {
        Self { invoker, events }
    }

    /// Validate and run a workflow to completion, returning the final
    /// top-level bindings. `cancel` aborts the whole run when fired.
    pub async fn run(
        &self,
        workflow: &Workflow,
        cancel: CancellationToken,
    ) -> Result<Bindings, EngineError> {
        workflow.validate()?;
        let root = match &workflow.root {
            Some(root) => root,
            None => return Err(EngineError::InvalidDsl("root statement is missing".into())),
        };
        let env = RunEnv {
            ambient: ActivityOptions::for_workflow(workflow),
            default_window: workflow.concurrency,
        };
        let mut bindings = workflow.variables.clone();
        self.exec(root, &env, &mut bindings, &cancel).await?;
        Ok(bindings)
    }

    fn exec<'a>(
        &'a self,
        statement: &'a Statement,
        env: &'a RunEnv,
        scope: &'a mut Bindings,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        async move {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if let Some(activity) = &statement.activity {
                self.exec_activity(&statement.id, activity, env, scope, cancel)
                    .await
            } else if let Some(sequence) = &statement.sequence {
                self.exec_sequence(sequence, env, scope, cancel).await
            } else if let Some(parallel) = &statement.parallel {
                self.exec_parallel(parallel, env, scope, cancel).await
            } else if let Some(map) = &statement.map {
                self.exec_map(map, env, scope, cancel).await
            } else if let Some(while_) = &statement.while_ {
                self.exec_while(while_, env, scope, cancel).await
            } else if let Some(if_) = &statement.if_ {
                self.exec_if(if_, env, scope, cancel).await
            } else {
                Err(EngineError::Malformed(format!(
                    "statement (id={:?}) has no operator set",
                    statement.id
                )))
            }
        }
        .boxed()
    }

    async fn exec_activity(
        &self,
        statement_id: &str,
        invocation: &ActivityInvocation,
        env: &RunEnv,
        scope: &mut Bindings,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let opts = match &invocation.opts {
            Some(node_opts) => env.ambient.merged(node_opts),
            None => env.ambient.clone(),
        };

        let mut args = Vec::with_capacity(invocation.args.len());
        for (index, expr) in invocation.args.iter().enumerate() {
            let value = eval_value(expr, scope).map_err(|err| EngineError::ArgEval {
                name: invocation.name.clone(),
                index,
                source: Box::new(err),
            })?;
            args.push(value);
        }

        tracing::debug!(activity = %invocation.name, "invoking activity");
        self.events.activity_started(statement_id, &invocation.name);
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(weavecore::ActivityError::Cancelled),
            result = self.invoker.execute(&opts, &invocation.name, args) => result,
        };

        match outcome {
            Ok(value) => {
                self.events
                    .activity_completed(&invocation.name, started.elapsed().as_millis() as u64);
                if !invocation.result.is_empty() {
                    scope.insert(invocation.result.clone(), value);
                }
                Ok(())
            }
            Err(err) => {
                tracing::error!(activity = %invocation.name, error = %err, "activity failed");
                self.events.activity_failed(&invocation.name, &err.to_string());
                Err(EngineError::Activity {
                    name: invocation.name.clone(),
                    source: err,
                })
            }
        }
    }

    async fn exec_sequence(
        &self,
        sequence: &Sequence,
        env: &RunEnv,
        scope: &mut Bindings,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        for element in &sequence.elements {
            self.exec(element, env, scope, cancel).await?;
        }
        Ok(())
    }

    /// Fan out every branch on a clone of the current scope, join them all,
    /// then merge the clones back with write-conflict detection.
    ///
    /// The join never returns early: a failing branch does not cancel its
    /// siblings, and the reported error is the earliest-completing failure
    /// as observed on the selector.
    async fn exec_parallel(
        &self,
        parallel: &Parallel,
        env: &RunEnv,
        scope: &mut Bindings,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if parallel.branches.is_empty() {
            return Ok(());
        }
        tracing::debug!(branches = parallel.branches.len(), "parallel: fanning out");

        let mut running: FuturesUnordered<_> = parallel
            .branches
            .iter()
            .enumerate()
            .map(|(index, branch)| {
                let mut local = scope.clone();
                async move {
                    let result = self.exec(branch, env, &mut local, cancel).await;
                    (index, local, result)
                }
            })
            .collect();

        let mut completed: Vec<Bindings> = Vec::with_capacity(parallel.branches.len());
        let mut first_err: Option<EngineError> = None;
        while let Some((index, local, result)) = running.next().await {
            match result {
                Ok(()) => {
                    tracing::debug!(branch = index, "parallel: branch completed");
                    completed.push(local);
                }
                Err(err) => {
                    tracing::debug!(branch = index, error = %err, "parallel: branch failed");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_err {
            return Err(err);
        }
        for local in completed {
            merge_scope(scope, local, MergeKind::Parallel)?;
        }
        Ok(())
    }

    /// Bounded fan-out over a sequence: keep at most `window` iterations in
    /// flight, record results by item index, and on fail-fast cancel the
    /// derived token and wait for every outstanding iteration to settle.
    async fn exec_map(
        &self,
        map: &Map,
        env: &RunEnv,
        scope: &mut Bindings,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let items: Vec<Value> = match scope.get(&map.items_ref) {
            None => return Err(EngineError::UnboundRef(map.items_ref.clone())),
            Some(Value::List(items)) => items.clone(),
            Some(_) => return Err(EngineError::NotASequence(map.items_ref.clone())),
        };
        let body = match map.body.as_deref() {
            Some(body) => body,
            None => return Err(EngineError::InvalidDsl("map body is missing".into())),
        };
        let item_var: &str = if map.item_var.is_empty() {
            DEFAULT_ITEM_VAR
        } else {
            &map.item_var
        };
        let window = if map.concurrency > 0 {
            map.concurrency
        } else if env.default_window > 0 {
            env.default_window
        } else {
            1
        };
        let total = items.len();
        tracing::debug!(items = total, window, "map: fanning out");

        // Derived cancellation scope for this fan-out; dropping it on any
        // exit path releases it.
        let child_cancel = cancel.child_token();

        let spawn_iteration = |index: usize| {
            let mut local = scope.clone();
            local.insert(item_var.to_string(), items[index].clone());
            let token = child_cancel.clone();
            async move {
                let result = self.exec(body, env, &mut local, &token).await;
                (index, local, result)
            }
        };

        let mut running = FuturesUnordered::new();
        let mut next = 0usize;
        while next < total && running.len() < window {
            running.push(spawn_iteration(next));
            next += 1;
        }

        // One selector receive per completed iteration; each completion may
        // launch at most one replacement, so the window never grows.
        let mut slots: Vec<Option<Bindings>> = (0..total).map(|_| None).collect();
        let mut first_err: Option<EngineError> = None;
        while let Some((index, local, result)) = running.next().await {
            match result {
                Ok(()) => {
                    tracing::debug!(item = index, "map: iteration completed");
                    slots[index] = Some(local);
                }
                Err(err) => {
                    tracing::debug!(item = index, error = %err, "map: iteration failed");
                    if map.fail_fast && !err.is_cancellation() {
                        child_cancel.cancel();
                        // Outstanding iterations settle with cancellation
                        // errors, which are discarded in favour of the
                        // triggering failure.
                        while running.next().await.is_some() {}
                        return Err(err);
                    }
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
            if next < total {
                running.push(spawn_iteration(next));
                next += 1;
            }
        }
        drop(running);

        if map.fail_fast {
            if let Some(err) = first_err {
                return Err(err);
            }
        }

        // Pick the per-iteration collector output: the collect variable
        // itself, then its indexed form, then the single key the body
        // introduced (lexicographically first for a stable choice).
        let collect_prefix = format!("{}_", map.collect_var);
        let mut collected_keys: Vec<Option<String>> = vec![None; total];
        let mut collected_vals: Vec<Option<Value>> = vec![None; total];
        if !map.collect_var.is_empty() {
            for (index, slot) in slots.iter().enumerate() {
                let local = match slot {
                    Some(local) => local,
                    None => continue,
                };
                if let Some(value) = local.get(&map.collect_var) {
                    collected_keys[index] = Some(map.collect_var.clone());
                    collected_vals[index] = Some(value.clone());
                    continue;
                }
                let indexed = format!("{}_{}", map.collect_var, index);
                if let Some(value) = local.get(&indexed) {
                    collected_keys[index] = Some(indexed);
                    collected_vals[index] = Some(value.clone());
                    continue;
                }
                let mut keys: Vec<&String> = local.keys().collect();
                keys.sort();
                for key in keys {
                    if key.as_str() == item_var
                        || key.as_str() == map.collect_var
                        || key.starts_with(&collect_prefix)
                        || scope.contains_key(key)
                    {
                        continue;
                    }
                    collected_keys[index] = Some(key.clone());
                    collected_vals[index] = Some(local[key].clone());
                    break;
                }
            }
        }

        // Merge surviving keys of successful iterations back into the outer
        // scope, skipping the item variable, collector-owned names and each
        // iteration's consumed key.
        for (index, slot) in slots.iter_mut().enumerate() {
            let local = match slot.take() {
                Some(local) => local,
                None => continue,
            };
            let mut keys: Vec<String> = local.keys().cloned().collect();
            keys.sort();
            for key in keys {
                if key == item_var {
                    continue;
                }
                if !map.collect_var.is_empty()
                    && (key == map.collect_var || key.starts_with(&collect_prefix))
                {
                    continue;
                }
                if collected_keys[index].as_deref() == Some(key.as_str()) {
                    continue;
                }
                if let Some(value) = local.get(&key) {
                    match scope.get(&key) {
                        Some(existing) => {
                            if !deep_eq(existing, value) {
                                return Err(MergeKind::Map.conflict(key));
                            }
                        }
                        None => {
                            scope.insert(key, value.clone());
                        }
                    }
                }
            }
        }

        if !map.collect_var.is_empty() {
            let collected: Vec<Value> = collected_vals.into_iter().flatten().collect();
            tracing::debug!(
                collected = collected.len(),
                var = %map.collect_var,
                "map: collection complete"
            );
            scope.insert(map.collect_var.clone(), Value::List(collected));
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn exec_if(
        &self,
        if_: &If,
        env: &RunEnv,
        scope: &mut Bindings,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let truth = eval_cond(&if_.cond, scope)
            .map_err(|err| EngineError::CondEval { source: Box::new(err) })?;
        if truth {
            if let Some(then) = if_.then.as_deref() {
                return self.exec(then, env, scope, cancel).await;
            }
        } else if let Some(else_) = if_.else_.as_deref() {
            return self.exec(else_, env, scope, cancel).await;
        }
        Ok(())
    }

    async fn exec_while(
        &self,
        while_: &While,
        env: &RunEnv,
        scope: &mut Bindings,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let body = match while_.body.as_deref() {
            Some(body) => body,
            None => return Err(EngineError::InvalidDsl("while body is missing".into())),
        };
        let mut iterations: u32 = 0;
        loop {
            let truth = eval_cond(&while_.cond, scope)
                .map_err(|err| EngineError::CondEval { source: Box::new(err) })?;
            if !truth {
                return Ok(());
            }
            if while_.max_iters > 0 && iterations >= while_.max_iters {
                return Err(EngineError::MaxItersExceeded(while_.max_iters));
            }
            self.exec(body, env, scope, cancel).await?;
            if while_.sleep_seconds > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = self.invoker.sleep(Duration::from_secs(while_.sleep_seconds)) => {}
                }
            }
            iterations += 1;
        }
    }
}

/// Fold one branch clone into the parent scope. Keys are visited in sorted
/// order so the first-reported conflict is stable across runs.
fn merge_scope(
    parent: &mut Bindings,
    mut branch: Bindings,
    kind: MergeKind,
) -> Result<(), EngineError> {
    let mut keys: Vec<String> = branch.keys().cloned().collect();
    keys.sort();
    for key in keys {
        if let Some(value) = branch.remove(&key) {
            match parent.get(&key) {
                Some(existing) => {
                    if !deep_eq(existing, &value) {
                        return Err(kind.conflict(key));
                    }
                }
                None => {
                    parent.insert(key, value);
                }
            }
        }
    }
    Ok(())
}
