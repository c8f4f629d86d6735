use crate::error::ModelError;
use crate::expression::Expr;
use crate::physics::context::ModelContext;
use crate::physics::variables::{Electrode, Key, Variables};
use crate::physics::Submodel;

fn ocp_name(electrode: Electrode) -> &'static str {
    match electrode {
        Electrode::Negative => "Negative electrode OCP",
        Electrode::Positive => "Positive electrode OCP",
    }
}

/// Butler-Volmer kinetics inverted for the overpotential. At leading order
/// the x-averaged interfacial current density follows directly from the
/// applied current, so `eta = 2 (1 + Theta T) asinh(j / (2 j0))`.
pub struct InverseButlerVolmer {
    ctx: ModelContext,
    electrode: Electrode,
    name: String,
}

impl InverseButlerVolmer {
    pub fn new(ctx: &ModelContext, electrode: Electrode) -> Self {
        Self {
            ctx: ctx.clone(),
            electrode,
            name: format!("{} inverse butler-volmer", electrode.name()),
        }
    }

    fn interfacial_current(&self, current: &Expr) -> Result<Expr, ModelError> {
        let l = self.ctx.params.scalar(&self.electrode.param("l"))?;
        match self.electrode {
            Electrode::Negative => current / l,
            Electrode::Positive => current / (-l),
        }
    }

    fn exchange_current(&self, c_e: &Expr, c_s: &Expr) -> Result<Expr, ModelError> {
        let m = self.ctx.params.scalar(&self.electrode.param("m"))?;
        let vacancies = (1.0 - c_s)?;
        let product = ((c_e * c_s)? * vacancies)?;
        m * product.sqrt()
    }
}

impl Submodel for InverseButlerVolmer {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<Key> {
        vec![
            Key::Current,
            Key::XAveragedTemperature,
            Key::SurfaceConcentration(self.electrode),
            Key::XAveragedElectrolyteConcentration(self.electrode),
        ]
    }

    fn provides(&self) -> Vec<Key> {
        let e = self.electrode;
        vec![
            Key::InterfacialCurrentDensity(e),
            Key::ExchangeCurrentDensity(e),
            Key::ReactionOverpotential(e),
            Key::OpenCircuitPotential(e),
        ]
    }

    fn get_coupled_variables(&mut self, variables: &Variables) -> Result<Variables, ModelError> {
        let e = self.electrode;
        let current = variables.get(Key::Current, &self.name)?;
        let temperature = variables.get(Key::XAveragedTemperature, &self.name)?;
        let c_s = variables.get(Key::SurfaceConcentration(e), &self.name)?;
        let c_e = variables.get(Key::XAveragedElectrolyteConcentration(e), &self.name)?;

        let j = self.interfacial_current(current)?;
        let j0 = self.exchange_current(c_e, c_s)?;

        let params = &self.ctx.params;
        let thermal_voltage = params.scalar("thermal_voltage")?;
        let theta = params.scalar("Theta")?;
        let prefactor = ((2.0 * thermal_voltage) * ((theta * temperature)? + 1.0)?)?;
        let eta = (&prefactor * ((&j / (2.0 * &j0)?)?).arcsinh())?;
        let ocp = params.function(ocp_name(e), &[c_s.clone()])?;

        Ok(Variables::new()
            .with(Key::InterfacialCurrentDensity(e), j)
            .with(Key::ExchangeCurrentDensity(e), j0)
            .with(Key::ReactionOverpotential(e), eta)
            .with(Key::OpenCircuitPotential(e), ocp))
    }
}

/// Lithium metal foil replacing the negative electrode of a half cell: no
/// open-circuit potential, all of the current crosses the foil surface.
pub struct LithiumMetalCounterElectrode {
    ctx: ModelContext,
}

impl LithiumMetalCounterElectrode {
    pub fn new(ctx: &ModelContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

impl Submodel for LithiumMetalCounterElectrode {
    fn name(&self) -> &str {
        "lithium metal counter electrode"
    }

    fn requires(&self) -> Vec<Key> {
        vec![Key::Current]
    }

    fn provides(&self) -> Vec<Key> {
        let e = Electrode::Negative;
        vec![
            Key::InterfacialCurrentDensity(e),
            Key::ExchangeCurrentDensity(e),
            Key::ReactionOverpotential(e),
            Key::OpenCircuitPotential(e),
        ]
    }

    fn get_coupled_variables(&mut self, variables: &Variables) -> Result<Variables, ModelError> {
        let e = Electrode::Negative;
        let current = variables.get(Key::Current, self.name())?;
        let params = &self.ctx.params;
        let pool = &self.ctx.pool;
        let j0 = params.scalar("j0_Li")?;
        let thermal_voltage = params.scalar("thermal_voltage")?;
        let eta = ((2.0 * thermal_voltage) * (current / (2.0 * j0))?.arcsinh())?;

        Ok(Variables::new()
            .with(Key::InterfacialCurrentDensity(e), current.clone())
            .with(Key::ExchangeCurrentDensity(e), pool.scalar(j0))
            .with(Key::ReactionOverpotential(e), eta)
            .with(Key::OpenCircuitPotential(e), pool.scalar(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::simplify::evaluate_constant;

    fn coupled_inputs(ctx: &ModelContext, c_s: f64) -> Variables {
        let pool = &ctx.pool;
        Variables::new()
            .with(Key::Current, pool.scalar(1.0))
            .with(Key::XAveragedTemperature, pool.scalar(0.0))
            .with(Key::SurfaceConcentration(Electrode::Positive), pool.scalar(c_s))
            .with(
                Key::XAveragedElectrolyteConcentration(Electrode::Positive),
                pool.scalar(1.0),
            )
    }

    #[test]
    fn positive_current_density_opposes_the_applied_current() {
        let ctx = ModelContext::lithium_ion();
        let mut kinetics = InverseButlerVolmer::new(&ctx, Electrode::Positive);
        let out = kinetics
            .get_coupled_variables(&coupled_inputs(&ctx, 0.5))
            .unwrap();
        let j = out
            .get(Key::InterfacialCurrentDensity(Electrode::Positive), "test")
            .unwrap();
        approx::assert_relative_eq!(evaluate_constant(j, 0.0).unwrap(), -1.0 / 0.4);

        let j0 = out
            .get(Key::ExchangeCurrentDensity(Electrode::Positive), "test")
            .unwrap();
        approx::assert_relative_eq!(evaluate_constant(j0, 0.0).unwrap(), 0.5);

        let eta = out
            .get(Key::ReactionOverpotential(Electrode::Positive), "test")
            .unwrap();
        let expected = 2.0 * 0.0257 * (-2.5f64).asinh();
        approx::assert_relative_eq!(evaluate_constant(eta, 0.0).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn missing_surface_concentration_names_the_kinetics() {
        let ctx = ModelContext::lithium_ion();
        let mut kinetics = InverseButlerVolmer::new(&ctx, Electrode::Negative);
        let err = kinetics
            .get_coupled_variables(&coupled_inputs(&ctx, 0.5))
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::DependencyLookup { ref requested_by, .. }
                if requested_by == "negative inverse butler-volmer"
        ));
    }

    #[test]
    fn counter_electrode_carries_the_full_current() {
        let ctx = ModelContext::lithium_ion();
        let mut foil = LithiumMetalCounterElectrode::new(&ctx);
        let out = foil
            .get_coupled_variables(&coupled_inputs(&ctx, 0.5))
            .unwrap();
        let j = out
            .get(Key::InterfacialCurrentDensity(Electrode::Negative), "test")
            .unwrap();
        assert_eq!(evaluate_constant(j, 0.0), Some(1.0));
        let u = out
            .get(Key::OpenCircuitPotential(Electrode::Negative), "test")
            .unwrap();
        assert_eq!(evaluate_constant(u, 0.0), Some(0.0));
    }
}
