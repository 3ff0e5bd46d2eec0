use crate::dsl::{Cond, Expr};
use crate::error::EngineError;
use crate::value::{deep_eq, Bindings, Value};

/// Resolve a DSL value expression against the current bindings.
pub fn eval_value(expr: &Expr, bindings: &Bindings) -> Result<Value, EngineError> {
    if !expr.r#ref.is_empty() {
        return bindings
            .get(&expr.r#ref)
            .cloned()
            .ok_or_else(|| EngineError::UnboundRef(expr.r#ref.clone()));
    }
    if let Some(s) = &expr.str {
        return Ok(Value::Str(s.clone()));
    }
    if let Some(n) = expr.int {
        return Ok(Value::Int(n));
    }
    if let Some(f) = expr.float {
        return Ok(Value::Float(f));
    }
    if let Some(b) = expr.bool {
        return Ok(Value::Bool(b));
    }
    Err(EngineError::EmptyValue)
}

/// Evaluate a structured condition against the current bindings.
///
/// Composite operators are tried first (`not`, `all`, `any`), then the atomic
/// predicates. `all` stops at the first false, `any` at the first true;
/// errors from sub-conditions evaluated up to that point propagate.
pub fn eval_cond(cond: &Cond, bindings: &Bindings) -> Result<bool, EngineError> {
    if let Some(sub) = &cond.not {
        return Ok(!eval_cond(sub, bindings)?);
    }
    if !cond.all.is_empty() {
        for sub in &cond.all {
            if !eval_cond(sub, bindings)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if !cond.any.is_empty() {
        for sub in &cond.any {
            if eval_cond(sub, bindings)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if let Some(expr) = &cond.truthy {
        return Ok(eval_value(expr, bindings)?.is_truthy());
    }
    if let Some(cmp) = &cond.eq {
        let left = eval_value(&cmp.left, bindings)?;
        let right = eval_value(&cmp.right, bindings)?;
        return Ok(deep_eq(&left, &right));
    }
    if let Some(cmp) = &cond.ne {
        let left = eval_value(&cmp.left, bindings)?;
        let right = eval_value(&cmp.right, bindings)?;
        return Ok(!deep_eq(&left, &right));
    }
    Err(EngineError::EmptyCondition)
}
