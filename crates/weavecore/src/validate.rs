use crate::dsl::{Statement, Workflow};
use crate::error::EngineError;

impl Workflow {
    /// Structural well-formedness check, run once before execution.
    pub fn validate(&self) -> Result<(), EngineError> {
        match &self.root {
            Some(root) => root.validate(),
            None => Err(EngineError::InvalidDsl("root statement is missing".into())),
        }
    }
}

impl Statement {
    pub fn validate(&self) -> Result<(), EngineError> {
        let set = [
            self.activity.is_some(),
            self.sequence.is_some(),
            self.parallel.is_some(),
            self.map.is_some(),
            self.while_.is_some(),
            self.if_.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        if set != 1 {
            return Err(EngineError::InvalidDsl(format!(
                "statement (id={:?}) must set exactly one of activity/sequence/parallel/map/while/if, found {}",
                self.id, set
            )));
        }

        if let Some(activity) = &self.activity {
            if activity.name.is_empty() {
                return Err(EngineError::InvalidDsl(format!(
                    "activity (id={:?}) requires a name",
                    self.id
                )));
            }
        }
        if let Some(sequence) = &self.sequence {
            for element in &sequence.elements {
                element.validate()?;
            }
        }
        if let Some(parallel) = &self.parallel {
            for branch in &parallel.branches {
                branch.validate()?;
            }
        }
        if let Some(map) = &self.map {
            let body = map.body.as_ref().ok_or_else(|| {
                EngineError::InvalidDsl(format!("map (id={:?}) requires a body", self.id))
            })?;
            body.validate()?;
            if map.items_ref.is_empty() {
                return Err(EngineError::InvalidDsl(format!(
                    "map (id={:?}) requires itemsRef",
                    self.id
                )));
            }
        }
        if let Some(while_) = &self.while_ {
            let body = while_.body.as_ref().ok_or_else(|| {
                EngineError::InvalidDsl(format!("while (id={:?}) requires a body", self.id))
            })?;
            body.validate()?;
        }
        if let Some(if_) = &self.if_ {
            let then = if_.then.as_ref().ok_or_else(|| {
                EngineError::InvalidDsl(format!("if (id={:?}) requires a then branch", self.id))
            })?;
            then.validate()?;
            if let Some(else_) = &if_.else_ {
                else_.validate()?;
            }
        }
        Ok(())
    }
}
