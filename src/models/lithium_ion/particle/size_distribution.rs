use std::f64::consts::PI;

use super::{diffusivity, initial_concentration, surface_concentration_events, surface_flux_scale};
use crate::error::ModelError;
use crate::expression::domain::CURRENT_COLLECTOR;
use crate::expression::{
    div, domain_list, full_broadcast, grad, integral, primary_broadcast, surf, Domains, Expr,
    Variable,
};
use crate::physics::bc::{BCRegistry, BoundaryCondition, BoundaryConditions};
use crate::physics::context::ModelContext;
use crate::physics::event::Event;
use crate::physics::variables::{Electrode, Key, Variables};
use crate::physics::{declared, Equations, Submodel};

/// Fickian diffusion in a single (x-averaged) distribution of particle
/// sizes. Every size class sees the same interfacial current density;
/// concentrations are averaged over sizes with the volume-weighted
/// distribution.
pub struct FickianSingleSizeDistribution {
    ctx: ModelContext,
    electrode: Electrode,
    name: String,
    concentration: Option<Variable>,
    sizes: Option<Expr>,
}

impl FickianSingleSizeDistribution {
    pub fn new(ctx: &ModelContext, electrode: Electrode) -> Self {
        ctx.cite("Kirk2020");
        Self {
            ctx: ctx.clone(),
            electrode,
            name: format!("{} fickian single size distribution", electrode.name()),
            concentration: None,
            sizes: None,
        }
    }

    /// `(particle, particle size, current collector)`.
    fn distribution_domains(&self) -> Domains {
        Domains {
            primary: self.electrode.particle_domain(),
            secondary: self.electrode.size_domain(),
            tertiary: domain_list([CURRENT_COLLECTOR]),
        }
    }

    fn size_domains(&self) -> Domains {
        Domains {
            primary: self.electrode.size_domain(),
            secondary: domain_list([CURRENT_COLLECTOR]),
            tertiary: Vec::new(),
        }
    }

    /// `f / Integral(f, R)`, broadcast back over the sizes.
    fn normalised(&self, f: Expr, sizes: &Expr) -> Result<Expr, ModelError> {
        let total = integral(&f, sizes)?;
        let total = primary_broadcast(&total, self.electrode.size_domain())?;
        f / total
    }

    /// Area-weighted lognormal distribution with unit mean radius.
    fn area_weighted(&self, sizes: &Expr) -> Result<Expr, ModelError> {
        let sd = self.ctx.params.scalar(&self.electrode.param("sd_a"))?;
        let sigma_sq = (1.0 + sd * sd).ln();
        let mu = -0.5 * sigma_sq;
        let log_r = (sizes.ln() - mu)?;
        let exponent = ((&log_r * &log_r)? / (-2.0 * sigma_sq))?;
        let pdf = (exponent.exp() / ((2.0 * PI * sigma_sq).sqrt() * sizes)?)?;
        self.normalised(pdf, sizes)
    }

    fn temperature_on(&self, variables: &Variables, with_particle: bool) -> Result<Expr, ModelError> {
        let t = variables.get(Key::XAveragedTemperature, &self.name)?;
        let t = primary_broadcast(t, self.electrode.size_domain())?;
        if with_particle {
            primary_broadcast(&t, self.electrode.particle_domain())
        } else {
            Ok(t)
        }
    }
}

impl Submodel for FickianSingleSizeDistribution {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<Key> {
        vec![
            Key::XAveragedTemperature,
            Key::InterfacialCurrentDensity(self.electrode),
        ]
    }

    fn provides(&self) -> Vec<Key> {
        vec![
            Key::ParticleFluxDistribution(self.electrode),
            Key::ParticleFlux(self.electrode),
            Key::InterfacialCurrentDensityDistribution(self.electrode),
        ]
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let e = self.electrode;
        let pool = &self.ctx.pool;
        let c_dist = pool.bounded_variable(
            format!("X-averaged {} particle concentration distribution", e.name()),
            self.distribution_domains(),
            (0.0, 1.0),
        )?;
        let (size_name, radius_name) = match e {
            Electrode::Negative => ("R_n", "r_n"),
            Electrode::Positive => ("R_p", "r_p"),
        };
        let sizes = pool.spatial_variable(size_name, self.size_domains())?;

        let f_a = self.area_weighted(&sizes)?;
        let f_v = self.normalised((&sizes * &f_a)?, &sizes)?;
        let f_num = self.normalised((&f_a / sizes.pow(2.0)?)?, &sizes)?;

        let f_v_particle = primary_broadcast(&f_v, e.particle_domain())?;
        let c_xav = integral(&(&f_v_particle * c_dist.expr())?, &sizes)?;
        let c_surf_dist = surf(c_dist.expr())?;
        let c_surf = integral(&(&f_v * &c_surf_dist)?, &sizes)?;

        let r = pool.spatial_variable(
            radius_name,
            Domains {
                primary: e.particle_domain(),
                secondary: domain_list([CURRENT_COLLECTOR]),
                tertiary: Vec::new(),
            },
        )?;
        let average = (integral(&c_xav, &r)? / (4.0 * PI / 3.0))?;

        self.concentration = Some(c_dist.clone());
        self.sizes = Some(sizes.clone());
        Ok(Variables::new()
            .with(Key::ParticleSizes(e), sizes)
            .with(Key::AreaWeightedSizeDistribution(e), f_a)
            .with(Key::VolumeWeightedSizeDistribution(e), f_v)
            .with(Key::NumberWeightedSizeDistribution(e), f_num)
            .with(Key::ParticleConcentrationDistribution(e), c_dist)
            .with(Key::SurfaceConcentrationDistribution(e), c_surf_dist)
            .with(Key::ParticleConcentration(e), c_xav)
            .with(Key::SurfaceConcentration(e), c_surf)
            .with(Key::AverageParticleConcentration(e), average))
    }

    fn get_coupled_variables(&mut self, variables: &Variables) -> Result<Variables, ModelError> {
        let e = self.electrode;
        let c_dist = declared(&self.concentration, &self.name)?.expr().clone();
        let t = self.temperature_on(variables, true)?;
        let d = diffusivity(&self.ctx, e, &c_dist, &t)?;
        let flux = -(&d * grad(&c_dist)?)?;
        let f_a = variables.get(Key::AreaWeightedSizeDistribution(e), &self.name)?;
        let sizes = variables.get(Key::ParticleSizes(e), &self.name)?;
        let f_a_particle = primary_broadcast(f_a, e.particle_domain())?;
        let flux_av = integral(&(&f_a_particle * &flux)?, sizes)?;

        let j = variables.get(Key::InterfacialCurrentDensity(e), &self.name)?;
        let j = if j.domains().is_empty() {
            full_broadcast(j, Domains::primary(&[CURRENT_COLLECTOR]))?
        } else {
            j.clone()
        };
        let j_dist = primary_broadcast(&j, e.size_domain())?;
        Ok(Variables::new()
            .with(Key::ParticleFluxDistribution(e), flux)
            .with(Key::ParticleFlux(e), flux_av)
            .with(Key::InterfacialCurrentDensityDistribution(e), j_dist))
    }

    fn set_rhs(&self, variables: &Variables) -> Result<Equations, ModelError> {
        let e = self.electrode;
        let c_dist = declared(&self.concentration, &self.name)?;
        let sizes = self.sizes.as_ref().ok_or_else(|| {
            ModelError::Configuration(format!("`{}` has no particle sizes", self.name))
        })?;
        let flux = variables.get(Key::ParticleFluxDistribution(e), &self.name)?;
        let c_scale = self.ctx.params.scalar(&e.param("C"))?;
        let r_sq = primary_broadcast(sizes, e.particle_domain())?.pow(2.0)?;
        let rhs = (((-1.0 / c_scale) * div(flux)?)? / r_sq)?;
        Ok(Equations::from([(c_dist.clone(), rhs)]))
    }

    fn set_boundary_conditions(&self, variables: &Variables) -> Result<BCRegistry, ModelError> {
        let e = self.electrode;
        let c_dist = declared(&self.concentration, &self.name)?;
        let c_surf_dist = variables.get(Key::SurfaceConcentrationDistribution(e), &self.name)?;
        let j_dist = variables.get(Key::InterfacialCurrentDensityDistribution(e), &self.name)?;
        let sizes = variables.get(Key::ParticleSizes(e), &self.name)?;
        let t = self.temperature_on(variables, false)?;
        let d_surf = diffusivity(&self.ctx, e, c_surf_dist, &t)?;
        let scale = surface_flux_scale(&self.ctx, e)?;
        let right = (((-scale * sizes)? * j_dist)? / d_surf)?;

        let mut bcs = BCRegistry::new();
        bcs.add(
            c_dist.expr(),
            BoundaryConditions::new(
                BoundaryCondition::neumann(self.ctx.pool.scalar(0.0)),
                BoundaryCondition::neumann(right),
            ),
        )?;
        Ok(bcs)
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        let c_dist = declared(&self.concentration, &self.name)?;
        let c_init = initial_concentration(&self.ctx, self.electrode)?;
        Ok(Equations::from([(c_dist.clone(), c_init)]))
    }

    fn set_events(&self, variables: &Variables) -> Result<Vec<Event>, ModelError> {
        let c_surf_dist =
            variables.get(Key::SurfaceConcentrationDistribution(self.electrode), &self.name)?;
        surface_concentration_events(self.electrode, c_surf_dist)
    }
}
