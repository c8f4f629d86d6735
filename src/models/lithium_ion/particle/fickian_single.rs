use std::f64::consts::PI;

use super::{diffusivity, initial_concentration, surface_concentration_events, surface_flux_scale};
use crate::error::ModelError;
use crate::expression::domain::CURRENT_COLLECTOR;
use crate::expression::{div, domain_list, grad, integral, primary_broadcast, surf, Domains, Expr, Variable};
use crate::physics::bc::{BCRegistry, BoundaryCondition, BoundaryConditions};
use crate::physics::context::ModelContext;
use crate::physics::event::Event;
use crate::physics::variables::{Electrode, Key, Variables};
use crate::physics::{declared, Equations, Submodel};

/// Fickian diffusion in one representative (x-averaged) spherical particle.
pub struct FickianSingleParticle {
    ctx: ModelContext,
    electrode: Electrode,
    name: String,
    concentration: Option<Variable>,
}

impl FickianSingleParticle {
    pub fn new(ctx: &ModelContext, electrode: Electrode) -> Self {
        Self {
            ctx: ctx.clone(),
            electrode,
            name: format!("{} fickian single particle", electrode.name()),
            concentration: None,
        }
    }

    fn domains(&self) -> Domains {
        Domains {
            primary: self.electrode.particle_domain(),
            secondary: domain_list([CURRENT_COLLECTOR]),
            tertiary: Vec::new(),
        }
    }

    /// Temperature reinstated inside the particle.
    fn particle_temperature(&self, variables: &Variables) -> Result<Expr, ModelError> {
        let t = variables.get(Key::XAveragedTemperature, &self.name)?;
        primary_broadcast(t, self.electrode.particle_domain())
    }
}

impl Submodel for FickianSingleParticle {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<Key> {
        vec![Key::XAveragedTemperature]
    }

    fn provides(&self) -> Vec<Key> {
        vec![Key::ParticleFlux(self.electrode)]
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let e = self.electrode;
        let c = self.ctx.pool.bounded_variable(
            format!("X-averaged {} particle concentration", e.name()),
            self.domains(),
            (0.0, 1.0),
        )?;
        let r = self.ctx.pool.spatial_variable(
            match e {
                Electrode::Negative => "r_n",
                Electrode::Positive => "r_p",
            },
            self.domains(),
        )?;
        let average = (integral(c.expr(), &r)? / (4.0 * PI / 3.0))?;
        let c_surf = surf(c.expr())?;
        self.concentration = Some(c.clone());
        Ok(Variables::new()
            .with(Key::ParticleConcentration(e), c)
            .with(Key::SurfaceConcentration(e), c_surf)
            .with(Key::AverageParticleConcentration(e), average))
    }

    fn get_coupled_variables(&mut self, variables: &Variables) -> Result<Variables, ModelError> {
        let c = declared(&self.concentration, &self.name)?.expr().clone();
        let t = self.particle_temperature(variables)?;
        let d = diffusivity(&self.ctx, self.electrode, &c, &t)?;
        let flux = -(&d * grad(&c)?)?;
        Ok(Variables::new().with(Key::ParticleFlux(self.electrode), flux))
    }

    fn set_rhs(&self, variables: &Variables) -> Result<Equations, ModelError> {
        let c = declared(&self.concentration, &self.name)?;
        let flux = variables.get(Key::ParticleFlux(self.electrode), &self.name)?;
        let c_scale = self.ctx.params.scalar(&self.electrode.param("C"))?;
        let rhs = (-1.0 / c_scale) * div(flux)?;
        Ok(Equations::from([(c.clone(), rhs?)]))
    }

    fn set_boundary_conditions(&self, variables: &Variables) -> Result<BCRegistry, ModelError> {
        let e = self.electrode;
        let c = declared(&self.concentration, &self.name)?;
        let c_surf = variables.get(Key::SurfaceConcentration(e), &self.name)?;
        let j = variables.get(Key::InterfacialCurrentDensity(e), &self.name)?;
        let t = variables.get(Key::XAveragedTemperature, &self.name)?;
        let d_surf = diffusivity(&self.ctx, e, c_surf, t)?;
        let scale = surface_flux_scale(&self.ctx, e)?;
        let right = ((-scale * j)? / d_surf)?;

        let mut bcs = BCRegistry::new();
        bcs.add(
            c.expr(),
            BoundaryConditions::new(
                BoundaryCondition::neumann(self.ctx.pool.scalar(0.0)),
                BoundaryCondition::neumann(right),
            ),
        )?;
        Ok(bcs)
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        let c = declared(&self.concentration, &self.name)?;
        let c_init = initial_concentration(&self.ctx, self.electrode)?;
        Ok(Equations::from([(c.clone(), c_init)]))
    }

    fn set_events(&self, variables: &Variables) -> Result<Vec<Event>, ModelError> {
        let c_surf = variables.get(Key::SurfaceConcentration(self.electrode), &self.name)?;
        surface_concentration_events(self.electrode, c_surf)
    }
}
