use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name bound to the current element inside a `map` body when the document
/// does not pick one.
pub const DEFAULT_ITEM_VAR: &str = "_item";

/// Default activity start-to-close timeout when the document sets none.
pub const DEFAULT_TIMEOUT_SEC: u64 = 30;

/// A complete workflow document.
///
/// Unknown keys in the source document are ignored; all fields are optional
/// except `root`, which the validator insists on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Workflow {
    pub version: String,
    pub task_queue: String,
    pub variables: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<Box<Statement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    pub timeout_sec: u64,
    pub concurrency: usize,
}

/// One node of the workflow tree. Exactly one of the operator fields must be
/// set; `id` is carried for diagnostics only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statement {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<ActivityInvocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Sequence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<Parallel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<Map>,
    #[serde(rename = "while", skip_serializing_if = "Option::is_none")]
    pub while_: Option<While>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_: Option<If>,
}

impl Statement {
    pub fn activity(invocation: ActivityInvocation) -> Self {
        Statement {
            activity: Some(invocation),
            ..Default::default()
        }
    }

    pub fn sequence(elements: Vec<Statement>) -> Self {
        Statement {
            sequence: Some(Sequence { elements }),
            ..Default::default()
        }
    }

    pub fn parallel(branches: Vec<Statement>) -> Self {
        Statement {
            parallel: Some(Parallel { branches }),
            ..Default::default()
        }
    }

    pub fn map(map: Map) -> Self {
        Statement {
            map: Some(map),
            ..Default::default()
        }
    }

    pub fn while_loop(while_: While) -> Self {
        Statement {
            while_: Some(while_),
            ..Default::default()
        }
    }

    pub fn if_branch(if_: If) -> Self {
        Statement {
            if_: Some(if_),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Ordered children, executed left to right over a shared scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sequence {
    pub elements: Vec<Statement>,
}

/// Concurrent branches, each over a copy-on-write clone of the parent scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parallel {
    pub branches: Vec<Statement>,
}

/// Bounded fan-out of `body` over the sequence bound to `items_ref`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Map {
    pub items_ref: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub item_var: String,
    pub concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Box<Statement>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub collect_var: String,
    pub fail_fast: bool,
}

/// Condition-guarded loop with an optional safety bound and inter-iteration
/// sleep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct While {
    pub cond: Cond,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Box<Statement>>,
    pub max_iters: u32,
    pub sleep_seconds: u64,
}

/// Two-way conditional; `else` may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct If {
    pub cond: Cond,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<Statement>>,
    #[serde(rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_: Option<Box<Statement>>,
}

/// Invocation of a registered activity by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityInvocation {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Expr>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opts: Option<ActOpts>,
}

impl ActivityInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        ActivityInvocation {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, expr: Expr) -> Self {
        self.args.push(expr);
        self
    }

    /// Store the activity result under the given variable name.
    pub fn store(mut self, var: impl Into<String>) -> Self {
        self.result = var.into();
        self
    }

    pub fn with_opts(mut self, opts: ActOpts) -> Self {
        self.opts = Some(opts);
        self
    }
}

/// Per-invocation timeout and retry overrides, all in whole seconds. Zero
/// means "inherit the ambient value".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActOpts {
    pub start_to_close_seconds: u64,
    pub schedule_to_close_seconds: u64,
    pub heartbeat_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

/// Retry parameters applied by the substrate at activity invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// 0 defers to the substrate default; 1 disables retries.
    pub max_attempts: u32,
    pub initial_interval_sec: u64,
    pub max_interval_sec: u64,
    /// Defaults to 2.0 when left at zero.
    pub backoff_coefficient: f64,
}

/// Structured condition. Exactly one form per node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Cond {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truthy: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eq: Option<Compare>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ne: Option<Compare>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Cond>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<Cond>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<Cond>,
}

impl Cond {
    pub fn truthy(expr: Expr) -> Self {
        Cond {
            truthy: Some(expr),
            ..Default::default()
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Cond {
            eq: Some(Compare { left, right }),
            ..Default::default()
        }
    }

    pub fn ne(left: Expr, right: Expr) -> Self {
        Cond {
            ne: Some(Compare { left, right }),
            ..Default::default()
        }
    }

    pub fn not(cond: Cond) -> Self {
        Cond {
            not: Some(Box::new(cond)),
            ..Default::default()
        }
    }

    pub fn any(conds: Vec<Cond>) -> Self {
        Cond {
            any: conds,
            ..Default::default()
        }
    }

    pub fn all(conds: Vec<Cond>) -> Self {
        Cond {
            all: conds,
            ..Default::default()
        }
    }
}

/// Left/right operands of an `eq`/`ne` comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Compare {
    pub left: Expr,
    pub right: Expr,
}

/// A typed literal or a variable reference. Exactly one form per value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expr {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub r#ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub str: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub int: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bool: Option<bool>,
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr {
            r#ref: name.into(),
            ..Default::default()
        }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Expr {
            str: Some(s.into()),
            ..Default::default()
        }
    }

    pub fn int(n: i64) -> Self {
        Expr {
            int: Some(n),
            ..Default::default()
        }
    }

    pub fn float(f: f64) -> Self {
        Expr {
            float: Some(f),
            ..Default::default()
        }
    }

    pub fn bool(b: bool) -> Self {
        Expr {
            bool: Some(b),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
version: "1"
taskQueue: demo
variables:
  x: 1
  urls: [u1, u2]
timeoutSec: 10
concurrency: 2
root:
  sequence:
    elements:
      - activity:
          name: sim.a
          args:
            - ref: x
          result: a
      - if:
          cond:
            eq:
              left: { ref: x }
              right: { int: 1 }
          then:
            activity:
              name: sim.b
              args: [ { int: 0 } ]
              result: b
      - map:
          itemsRef: urls
          itemVar: url
          collectVar: pages
          failFast: true
          body:
            activity:
              name: sim.fetch
              args: [ { ref: url } ]
              result: page
"#;

    #[test]
    fn parses_yaml_document() {
        let wf: Workflow = serde_yaml::from_str(DOC).expect("parse");
        assert_eq!(wf.task_queue, "demo");
        assert_eq!(wf.timeout_sec, 10);
        assert_eq!(wf.concurrency, 2);
        assert_eq!(wf.variables["x"], Value::Int(1));
        assert_eq!(
            wf.variables["urls"],
            Value::List(vec![Value::Str("u1".into()), Value::Str("u2".into())])
        );

        let root = wf.root.expect("root");
        let seq = root.sequence.expect("sequence");
        assert_eq!(seq.elements.len(), 3);

        let act = seq.elements[0].activity.as_ref().expect("activity");
        assert_eq!(act.name, "sim.a");
        assert_eq!(act.args, vec![Expr::var("x")]);
        assert_eq!(act.result, "a");

        let if_ = seq.elements[1].if_.as_ref().expect("if");
        let cmp = if_.cond.eq.as_ref().expect("eq");
        assert_eq!(cmp.left, Expr::var("x"));
        assert_eq!(cmp.right, Expr::int(1));
        assert!(if_.else_.is_none());

        let map = seq.elements[2].map.as_ref().expect("map");
        assert_eq!(map.items_ref, "urls");
        assert_eq!(map.item_var, "url");
        assert_eq!(map.collect_var, "pages");
        assert!(map.fail_fast);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let wf: Workflow = serde_yaml::from_str(
            "version: \"2\"\nfuture_knob: 42\nroot:\n  sequence: { elements: [] }\n",
        )
        .expect("parse");
        assert_eq!(wf.version, "2");
        assert!(wf.root.is_some());
    }

    #[test]
    fn statement_round_trips_through_yaml() {
        let st = Statement::sequence(vec![Statement::activity(
            ActivityInvocation::new("sim.a").arg(Expr::int(1)).store("a"),
        )]);
        let text = serde_yaml::to_string(&st).expect("serialize");
        let back: Statement = serde_yaml::from_str(&text).expect("parse");
        let seq = back.sequence.expect("sequence");
        let act = seq.elements[0].activity.as_ref().expect("activity");
        assert_eq!(act.name, "sim.a");
        assert_eq!(act.args, vec![Expr::int(1)]);
    }
}
