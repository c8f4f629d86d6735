use std::fmt;

use crate::error::ModelError;
use crate::expression::Expr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Integration stops when the expression crosses zero.
    Termination,
    /// The crossing time is recorded and integration continues.
    Interpolation,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Termination => f.write_str("termination"),
            EventKind::Interpolation => f.write_str("interpolation"),
        }
    }
}

/// Named scalar expression whose sign change is reported to the solver.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub name: String,
    pub expression: Expr,
    pub kind: EventKind,
}

impl Event {
    pub fn new(name: impl Into<String>, expression: Expr, kind: EventKind) -> Result<Self, ModelError> {
        let name = name.into();
        if !expression.domains().is_empty() {
            return Err(ModelError::domain(format!(
                "event `{name}` must be a scalar, but its expression lives on {}",
                expression.domains()
            )));
        }
        Ok(Self {
            name,
            expression,
            kind,
        })
    }

    pub fn termination(name: impl Into<String>, expression: Expr) -> Result<Self, ModelError> {
        Self::new(name, expression, EventKind::Termination)
    }

    pub fn interpolation(name: impl Into<String>, expression: Expr) -> Result<Self, ModelError> {
        Self::new(name, expression, EventKind::Interpolation)
    }
}
