use crate::error::ModelError;
use crate::expression::domain::*;
use crate::expression::{
    concatenation, div, domain_list, full_broadcast, grad, integral, primary_broadcast, Domains,
    Expr, Variable,
};
use crate::physics::bc::{BCRegistry, BoundaryCondition, BoundaryConditions};
use crate::physics::context::ModelContext;
use crate::physics::variables::{Electrode, Key, Variables};
use crate::physics::{declared, Equations, Submodel};

const SUBDOMAINS: [&str; 3] = [NEGATIVE_ELECTRODE, SEPARATOR, POSITIVE_ELECTRODE];

fn cell_domains() -> Result<Domains, ModelError> {
    Domains::of(&SUBDOMAINS, &[CURRENT_COLLECTOR], &[])
}

fn subdomain(name: &str) -> Result<Domains, ModelError> {
    Domains::of(&[name], &[CURRENT_COLLECTOR], &[])
}

/// Piecewise-constant field across the cell, one value per subdomain.
fn piecewise(ctx: &ModelContext, values: [f64; 3]) -> Result<Expr, ModelError> {
    let parts = SUBDOMAINS
        .iter()
        .zip(values)
        .map(|(name, v)| full_broadcast(&ctx.pool.scalar(v), subdomain(name)?))
        .collect::<Result<Vec<_>, _>>()?;
    concatenation(&parts)
}

/// Electrolyte concentration fixed at its reference value.
pub struct ConstantConcentration {
    ctx: ModelContext,
}

impl ConstantConcentration {
    pub fn new(ctx: &ModelContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

impl Submodel for ConstantConcentration {
    fn name(&self) -> &str {
        "constant electrolyte concentration"
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let one = self.ctx.pool.scalar(1.0);
        let c_e = full_broadcast(&one, cell_domains()?)?;
        let c_e_av = full_broadcast(&one, Domains::primary(&[CURRENT_COLLECTOR]))?;
        Ok(Variables::new()
            .with(Key::ElectrolyteConcentration, c_e)
            .with(Key::XAveragedElectrolyteConcentration(Electrode::Negative), c_e_av.clone())
            .with(Key::XAveragedElectrolyteConcentration(Electrode::Positive), c_e_av))
    }
}

/// Fickian transport across the whole cell with interfacial sources in the
/// electrodes and Bruggeman-corrected effective diffusivity.
pub struct Diffusion {
    ctx: ModelContext,
    concentration: Option<Variable>,
}

impl Diffusion {
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            ctx: ctx.clone(),
            concentration: None,
        }
    }

    fn porosity(&self) -> Result<Expr, ModelError> {
        let p = &self.ctx.params;
        piecewise(
            &self.ctx,
            [p.scalar("epsilon_n")?, p.scalar("epsilon_s")?, p.scalar("epsilon_p")?],
        )
    }

    fn flux(&self, c_e: &Expr, variables: &Variables) -> Result<Expr, ModelError> {
        let eps = self.porosity()?;
        let t_av = variables.get(Key::XAveragedTemperature, self.name())?;
        let t = primary_broadcast(t_av, domain_list(SUBDOMAINS))?;
        let d_e = self.ctx.params.function("Electrolyte diffusivity", &[c_e.clone(), t])?;
        let effective = (eps.pow(1.5)? * d_e)?;
        Ok(-(&effective * grad(c_e)?)?)
    }
}

impl Submodel for Diffusion {
    fn name(&self) -> &str {
        "electrolyte diffusion"
    }

    fn requires(&self) -> Vec<Key> {
        vec![Key::XAveragedTemperature]
    }

    fn provides(&self) -> Vec<Key> {
        vec![
            Key::XAveragedElectrolyteConcentration(Electrode::Negative),
            Key::XAveragedElectrolyteConcentration(Electrode::Positive),
        ]
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let c_e = self.ctx.pool.bounded_variable(
            "Electrolyte concentration",
            cell_domains()?,
            (0.0, f64::INFINITY),
        )?;
        self.concentration = Some(c_e.clone());
        Ok(Variables::new().with(Key::ElectrolyteConcentration, c_e))
    }

    fn get_coupled_variables(&mut self, _variables: &Variables) -> Result<Variables, ModelError> {
        let c_e = declared(&self.concentration, self.name())?.expr().clone();
        let x = self.ctx.pool.spatial_variable("x", cell_domains()?)?;
        let mut out = Variables::new();
        for (e, indicator) in [
            (Electrode::Negative, [1.0, 0.0, 0.0]),
            (Electrode::Positive, [0.0, 0.0, 1.0]),
        ] {
            let mask = piecewise(&self.ctx, indicator)?;
            let l = self.ctx.params.parameter(&self.ctx.pool, &e.param("l"))?;
            let average = (integral(&(&c_e * mask)?, &x)? / l)?;
            out.insert(Key::XAveragedElectrolyteConcentration(e), average);
        }
        Ok(out)
    }

    fn set_rhs(&self, variables: &Variables) -> Result<Equations, ModelError> {
        let c_e = declared(&self.concentration, self.name())?;
        let params = &self.ctx.params;
        let pool = &self.ctx.pool;

        let mut sources = Vec::with_capacity(3);
        for name in SUBDOMAINS {
            let source = match name {
                NEGATIVE_ELECTRODE | POSITIVE_ELECTRODE => {
                    let e = if name == NEGATIVE_ELECTRODE {
                        Electrode::Negative
                    } else {
                        Electrode::Positive
                    };
                    let j = variables.get(Key::InterfacialCurrentDensity(e), self.name())?;
                    full_or_broadcast(j, name)?
                }
                _ => full_broadcast(&pool.scalar(0.0), subdomain(name)?)?,
            };
            sources.push(source);
        }
        let source = concatenation(&sources)?;

        let t_plus = params.scalar("t_plus")?;
        let c_scale = params.parameter(pool, "C_e")?;
        let transport = (div(&self.flux(c_e.expr(), variables)?)? / c_scale)?;
        let reaction = ((1.0 - t_plus) * source)?;
        let rhs = ((-(transport) + reaction)? / self.porosity()?)?;
        Ok(Equations::from([(c_e.clone(), rhs)]))
    }

    fn set_boundary_conditions(&self, _variables: &Variables) -> Result<BCRegistry, ModelError> {
        let c_e = declared(&self.concentration, self.name())?;
        let zero = self.ctx.pool.scalar(0.0);
        let mut bcs = BCRegistry::new();
        bcs.add(
            c_e.expr(),
            BoundaryConditions::new(
                BoundaryCondition::neumann(zero.clone()),
                BoundaryCondition::neumann(zero),
            ),
        )?;
        Ok(bcs)
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        let c_e = declared(&self.concentration, self.name())?;
        Ok(Equations::from([(c_e.clone(), self.ctx.pool.scalar(1.0))]))
    }
}

/// Reinstate an x-averaged interfacial current across one electrode.
fn full_or_broadcast(j: &Expr, electrode: &str) -> Result<Expr, ModelError> {
    if j.domains().is_empty() {
        let with_cc = full_broadcast(j, Domains::primary(&[CURRENT_COLLECTOR]))?;
        primary_broadcast(&with_cc, domain_list([electrode]))
    } else {
        primary_broadcast(j, domain_list([electrode]))
    }
}
