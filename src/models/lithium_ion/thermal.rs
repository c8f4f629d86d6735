use crate::error::ModelError;
use crate::expression::domain::CURRENT_COLLECTOR;
use crate::expression::{full_broadcast, Domains, Variable};
use crate::physics::context::ModelContext;
use crate::physics::variables::{Electrode, Key, Variables};
use crate::physics::{declared, Equations, Submodel};

/// Temperature rise fixed at zero.
pub struct Isothermal {
    ctx: ModelContext,
}

impl Isothermal {
    pub fn new(ctx: &ModelContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

impl Submodel for Isothermal {
    fn name(&self) -> &str {
        "isothermal"
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let t = full_broadcast(
            &self.ctx.pool.scalar(0.0),
            Domains::primary(&[CURRENT_COLLECTOR]),
        )?;
        Ok(Variables::new().with(Key::XAveragedTemperature, t))
    }
}

/// One ODE for the x-averaged temperature: reaction heating against
/// Newton cooling.
pub struct Lumped {
    ctx: ModelContext,
    temperature: Option<Variable>,
}

impl Lumped {
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            ctx: ctx.clone(),
            temperature: None,
        }
    }
}

impl Submodel for Lumped {
    fn name(&self) -> &str {
        "lumped thermal"
    }

    fn requires(&self) -> Vec<Key> {
        [Electrode::Negative, Electrode::Positive]
            .into_iter()
            .flat_map(|e| [Key::InterfacialCurrentDensity(e), Key::ReactionOverpotential(e)])
            .collect()
    }

    fn provides(&self) -> Vec<Key> {
        vec![Key::TotalHeating]
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let t = self.ctx.pool.variable(
            "X-averaged cell temperature",
            Domains::primary(&[CURRENT_COLLECTOR]),
        )?;
        self.temperature = Some(t.clone());
        Ok(Variables::new().with(Key::XAveragedTemperature, t))
    }

    fn get_coupled_variables(&mut self, variables: &Variables) -> Result<Variables, ModelError> {
        let mut heating = self.ctx.pool.scalar(0.0);
        for e in [Electrode::Negative, Electrode::Positive] {
            let j = variables.get(Key::InterfacialCurrentDensity(e), self.name())?;
            let eta = variables.get(Key::ReactionOverpotential(e), self.name())?;
            let l = self.ctx.params.parameter(&self.ctx.pool, &e.param("l"))?;
            heating = (heating + ((&l * j)? * eta))?;
        }
        Ok(Variables::new().with(Key::TotalHeating, heating))
    }

    fn set_rhs(&self, variables: &Variables) -> Result<Equations, ModelError> {
        let t = declared(&self.temperature, self.name())?;
        let q = variables.get(Key::TotalHeating, self.name())?;
        let pool = &self.ctx.pool;
        let h = self.ctx.params.parameter(pool, "h")?;
        let c_th = self.ctx.params.parameter(pool, "C_th")?;
        let rhs = ((q - (&h * t.expr())?)? / c_th)?;
        Ok(Equations::from([(t.clone(), rhs)]))
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        let t = declared(&self.temperature, self.name())?;
        Ok(Equations::from([(t.clone(), self.ctx.pool.scalar(0.0))]))
    }
}
