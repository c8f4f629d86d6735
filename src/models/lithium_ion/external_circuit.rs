use crate::error::ModelError;
use crate::expression::{Domains, Variable};
use crate::physics::context::ModelContext;
use crate::physics::variables::{Key, Variables};
use crate::physics::{declared, Equations, Submodel};

/// Discharge capacity `Q` with `dQ/dt = I`, shared by both control modes.
fn discharge_capacity(ctx: &ModelContext) -> Result<Variable, ModelError> {
    ctx.pool.variable("Discharge capacity", Domains::empty())
}

/// Current prescribed as a function of time by the `Current function` parameter.
pub struct CurrentControl {
    ctx: ModelContext,
    capacity: Option<Variable>,
}

impl CurrentControl {
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            ctx: ctx.clone(),
            capacity: None,
        }
    }
}

impl Submodel for CurrentControl {
    fn name(&self) -> &str {
        "current control external circuit"
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let t = self.ctx.pool.time();
        let current = self.ctx.params.function("Current function", &[t.clone()])?;
        let q = discharge_capacity(&self.ctx)?;
        self.capacity = Some(q.clone());
        Ok(Variables::new()
            .with(Key::Time, t)
            .with(Key::Current, current)
            .with(Key::DischargeCapacity, q))
    }

    fn set_rhs(&self, variables: &Variables) -> Result<Equations, ModelError> {
        let q = declared(&self.capacity, self.name())?;
        let current = variables.get(Key::Current, self.name())?;
        Ok(Equations::from([(q.clone(), current.clone())]))
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        let q = declared(&self.capacity, self.name())?;
        Ok(Equations::from([(q.clone(), self.ctx.pool.scalar(0.0))]))
    }
}

/// The current is an algebraic state fixed by `External circuit function(I, V) = 0`.
pub struct FunctionControl {
    ctx: ModelContext,
    current: Option<Variable>,
    capacity: Option<Variable>,
}

impl FunctionControl {
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            ctx: ctx.clone(),
            current: None,
            capacity: None,
        }
    }
}

impl Submodel for FunctionControl {
    fn name(&self) -> &str {
        "function control external circuit"
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let current = self.ctx.pool.variable("Current", Domains::empty())?;
        let q = discharge_capacity(&self.ctx)?;
        self.current = Some(current.clone());
        self.capacity = Some(q.clone());
        Ok(Variables::new()
            .with(Key::Time, self.ctx.pool.time())
            .with(Key::Current, current)
            .with(Key::DischargeCapacity, q))
    }

    fn set_rhs(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        let q = declared(&self.capacity, self.name())?;
        let current = declared(&self.current, self.name())?;
        Ok(Equations::from([(q.clone(), current.expr().clone())]))
    }

    fn set_algebraic(&self, variables: &Variables) -> Result<Equations, ModelError> {
        let current = declared(&self.current, self.name())?;
        let voltage = variables.get(Key::TerminalVoltage, self.name())?;
        let residual = self.ctx.params.function(
            "External circuit function",
            &[current.expr().clone(), voltage.clone()],
        )?;
        Ok(Equations::from([(current.clone(), residual)]))
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        let current = declared(&self.current, self.name())?;
        let q = declared(&self.capacity, self.name())?;
        // Start from the nominal current; the Newton pass makes it consistent.
        let guess = self
            .ctx
            .params
            .function("Current function", &[self.ctx.pool.time()])?;
        Ok(Equations::from([
            (current.clone(), guess),
            (q.clone(), self.ctx.pool.scalar(0.0)),
        ]))
    }
}
