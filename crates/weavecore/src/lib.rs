//! Core abstractions for the weave workflow interpreter
//!
//! This crate provides the workflow model (statements, conditions, value
//! expressions), the structural validator, the pure evaluator over a binding
//! environment, and the narrow ports through which the interpreter reaches
//! the activity substrate. It contains no scheduling logic of its own.

mod activity;
mod dsl;
mod error;
mod eval;
mod events;
mod validate;
mod value;

pub use activity::{Activity, ActivityContext, ActivityInvoker, ActivityOptions};
pub use dsl::{
    ActOpts, ActivityInvocation, Compare, Cond, Expr, If, Map, Parallel, RetryPolicy, Sequence,
    Statement, While, Workflow, DEFAULT_ITEM_VAR, DEFAULT_TIMEOUT_SEC,
};
pub use error::{ActivityError, EngineError};
pub use eval::{eval_cond, eval_value};
pub use events::{EventBus, EventEmitter, ExecutionEvent, RunId};
pub use value::{deep_eq, Bindings, Value};

/// Result type for interpreter operations.
pub type Result<T> = std::result::Result<T, EngineError>;
