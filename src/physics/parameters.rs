use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::ModelError;
use crate::expression::{Expr, ExprPool, ExprResult};

/// Pure function of expressions, e.g. a diffusivity `D(c, T)`.
///
/// Implementations must not have side effects and should return an expression
/// whose domains are compatible with those of the arguments.
pub type ParameterFunction = Rc<dyn Fn(&[Expr]) -> ExprResult>;

/// Key-value lookup of model parameters consumed by submodels.
pub trait ParameterSource {
    fn scalar(&self, name: &str) -> Result<f64, ModelError>;

    fn function(&self, name: &str, args: &[Expr]) -> ExprResult;

    /// Scalar parameter as an expression node.
    fn parameter(&self, pool: &ExprPool, name: &str) -> ExprResult {
        Ok(pool.scalar(self.scalar(name)?))
    }
}

/// Scalar parameters plus expression-valued parameter functions.
#[derive(Clone, Default)]
pub struct ParameterValues {
    scalars: IndexMap<String, f64>,
    functions: IndexMap<String, ParameterFunction>,
}

impl fmt::Debug for ParameterValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterValues")
            .field("scalars", &self.scalars)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A function ignoring its arguments and returning `value`.
pub fn constant_function(value: f64) -> ParameterFunction {
    Rc::new(move |args: &[Expr]| match args.first() {
        Some(arg) => Ok(arg.pool().scalar(value)),
        None => Err(ModelError::Configuration(
            "parameter functions need at least one argument".into(),
        )),
    })
}

impl ParameterValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimensionless single-particle defaults. Potentials are in volts, the
    /// kinetic overpotential is scaled by `thermal_voltage`.
    pub fn lithium_ion() -> Self {
        let mut values = Self::new();
        for (name, value) in [
            ("l_n", 0.4),
            ("l_s", 0.2),
            ("l_p", 0.4),
            ("C_n", 1.0),
            ("C_p", 1.0),
            ("C_e", 1.0),
            ("a_R_n", 1.8),
            ("a_R_p", 1.5),
            ("gamma_p", 2.0),
            ("m_n", 1.0),
            ("m_p", 1.0),
            ("j0_Li", 1.0),
            ("Theta", 0.0),
            ("thermal_voltage", 0.025_7),
            ("epsilon_n", 0.3),
            ("epsilon_s", 1.0),
            ("epsilon_p", 0.3),
            ("t_plus", 0.4),
            ("R_min_n", 0.5),
            ("R_max_n", 1.5),
            ("R_min_p", 0.5),
            ("R_max_p", 1.5),
            ("sd_a_n", 0.3),
            ("sd_a_p", 0.3),
            ("C_th", 1.0),
            ("h", 1.0),
            ("V_min", 3.0),
            ("V_max", 4.3),
        ] {
            values.set_scalar(name, value);
        }

        values
            .set_function("Current function", constant_function(1.0))
            .set_function("Initial concentration in negative electrode", constant_function(0.8))
            .set_function("Initial concentration in positive electrode", constant_function(0.6))
            .set_function("Negative particle diffusivity", constant_function(1.0))
            .set_function("Positive particle diffusivity", constant_function(1.0))
            .set_function("Electrolyte diffusivity", constant_function(1.0))
            .set_function(
                "Negative electrode OCP",
                Rc::new(|args: &[Expr]| {
                    let c = first(args)?;
                    (&(-(c * 8.0)?).exp() * 0.8)? + 0.08
                }),
            )
            .set_function(
                "Positive electrode OCP",
                Rc::new(|args: &[Expr]| {
                    let c = first(args)?;
                    4.3 - (c * 0.9)?
                }),
            )
            .set_function(
                "External circuit function",
                Rc::new(|args: &[Expr]| first(args)? - 1.0),
            );
        values
    }

    pub fn set_scalar(&mut self, name: &str, value: f64) -> &mut Self {
        self.scalars.insert(name.to_string(), value);
        self
    }

    pub fn set_function(&mut self, name: &str, f: ParameterFunction) -> &mut Self {
        self.functions.insert(name.to_string(), f);
        self
    }

    /// Apply scalar overrides. A name that is already a function is replaced
    /// by a constant function.
    pub fn update(&mut self, overrides: &IndexMap<String, f64>) {
        for (name, value) in overrides {
            if self.functions.contains_key(name) {
                self.functions
                    .insert(name.clone(), constant_function(*value));
            } else {
                self.scalars.insert(name.clone(), *value);
            }
        }
    }

    pub fn scalars(&self) -> &IndexMap<String, f64> {
        &self.scalars
    }
}

fn first(args: &[Expr]) -> Result<&Expr, ModelError> {
    args.first().ok_or_else(|| {
        ModelError::Configuration("parameter functions need at least one argument".into())
    })
}

impl ParameterSource for ParameterValues {
    fn scalar(&self, name: &str) -> Result<f64, ModelError> {
        self.scalars
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::MissingParameter(name.to_string()))
    }

    fn function(&self, name: &str, args: &[Expr]) -> ExprResult {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| ModelError::MissingParameter(name.to_string()))?;
        f(args)
    }
}
