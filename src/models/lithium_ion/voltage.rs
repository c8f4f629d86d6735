use crate::error::ModelError;
use crate::expression::{max, min};
use crate::physics::context::ModelContext;
use crate::physics::event::Event;
use crate::physics::variables::{Electrode, Key, Variables};
use crate::physics::Submodel;

/// `V = U_p - U_n + eta_p - eta_n`, with cut-off events at `V_min` and `V_max`.
pub struct LeadingOrderVoltage {
    ctx: ModelContext,
}

impl LeadingOrderVoltage {
    pub fn new(ctx: &ModelContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

impl Submodel for LeadingOrderVoltage {
    fn name(&self) -> &str {
        "leading-order voltage"
    }

    fn requires(&self) -> Vec<Key> {
        [Electrode::Negative, Electrode::Positive]
            .into_iter()
            .flat_map(|e| [Key::OpenCircuitPotential(e), Key::ReactionOverpotential(e)])
            .collect()
    }

    fn provides(&self) -> Vec<Key> {
        vec![Key::TerminalVoltage]
    }

    fn get_coupled_variables(&mut self, variables: &Variables) -> Result<Variables, ModelError> {
        let get = |key| variables.get(key, self.name());
        let u_n = get(Key::OpenCircuitPotential(Electrode::Negative))?;
        let u_p = get(Key::OpenCircuitPotential(Electrode::Positive))?;
        let eta_n = get(Key::ReactionOverpotential(Electrode::Negative))?;
        let eta_p = get(Key::ReactionOverpotential(Electrode::Positive))?;
        let ocv = (u_p - u_n)?;
        let overpotential = (eta_p - eta_n)?;
        Ok(Variables::new().with(Key::TerminalVoltage, (ocv + overpotential)?))
    }

    fn set_events(&self, variables: &Variables) -> Result<Vec<Event>, ModelError> {
        let v = variables.get(Key::TerminalVoltage, self.name())?;
        let v_min = self.ctx.params.scalar("V_min")?;
        let v_max = self.ctx.params.scalar("V_max")?;
        Ok(vec![
            Event::termination("Minimum voltage", (min(v) - v_min)?)?,
            Event::termination("Maximum voltage", (v_max - max(v))?)?,
        ])
    }
}
