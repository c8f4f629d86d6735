use std::fmt;

use nalgebra::DVector;

use crate::discretization::DiscretizedModel;
use crate::error::ModelError;
use crate::physics::variables::Key;

/// Why time stepping stopped.
#[derive(Clone, Debug, PartialEq)]
pub enum Termination {
    FinalTime,
    Event(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::FinalTime => f.write_str("final time"),
            Termination::Event(name) => write!(f, "event: {name}"),
        }
    }
}

/// Accepted time points and states of one run.
#[derive(Clone, Debug)]
pub struct Solution {
    pub t: Vec<f64>,
    pub y: Vec<DVector<f64>>,
    pub termination: Termination,
    /// Crossing times of interpolation events, in the order they happened.
    pub interpolation_times: Vec<(String, f64)>,
}

impl Solution {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn last(&self) -> Option<(f64, &DVector<f64>)> {
        self.t.last().copied().zip(self.y.last())
    }

    /// Discrete values of `key` at every stored time.
    pub fn variable(&self, model: &DiscretizedModel, key: Key) -> Result<Vec<DVector<f64>>, ModelError> {
        self.t
            .iter()
            .zip(&self.y)
            .map(|(t, y)| model.output(key, *t, y))
            .collect()
    }

    /// Time series of a quantity living on a single point (scalars and
    /// current-collector averages).
    pub fn scalar_series(&self, model: &DiscretizedModel, key: Key) -> Result<Vec<f64>, ModelError> {
        let values = self.variable(model, key)?;
        values
            .into_iter()
            .map(|v| {
                if v.len() == 1 {
                    Ok(v[0])
                } else {
                    Err(ModelError::shape(key.to_string(), "a single point", 1, v.len()))
                }
            })
            .collect()
    }
}
