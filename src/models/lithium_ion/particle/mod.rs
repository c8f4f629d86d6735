//! Particle diffusion submodels.

mod fickian_single;
mod size_distribution;

pub use fickian_single::FickianSingleParticle;
pub use size_distribution::FickianSingleSizeDistribution;

use crate::error::ModelError;
use crate::expression::{max, min, Expr};
use crate::physics::context::ModelContext;
use crate::physics::event::Event;
use crate::physics::variables::Electrode;

/// Distance kept from the physical concentration limits 0 and 1.
pub const SURFACE_CONCENTRATION_TOLERANCE: f64 = 1e-4;

fn diffusivity(ctx: &ModelContext, electrode: Electrode, c: &Expr, temperature: &Expr) -> Result<Expr, ModelError> {
    let name = match electrode {
        Electrode::Negative => "Negative particle diffusivity",
        Electrode::Positive => "Positive particle diffusivity",
    };
    ctx.params.function(name, &[c.clone(), temperature.clone()])
}

/// Initial concentration of an x-averaged particle, sampled at the slice
/// chosen by the context's [`InitialSlicePolicy`](crate::physics::context::InitialSlicePolicy).
fn initial_concentration(ctx: &ModelContext, electrode: Electrode) -> Result<Expr, ModelError> {
    let (name, x) = match electrode {
        Electrode::Negative => (
            "Initial concentration in negative electrode",
            ctx.options.initial_slice.negative,
        ),
        Electrode::Positive => (
            "Initial concentration in positive electrode",
            ctx.options.initial_slice.positive,
        ),
    };
    ctx.params.function(name, &[ctx.pool.scalar(x)])
}

/// Scale of the surface flux boundary value: `C / a_R`, and additionally
/// `1 / gamma_p` on the positive side.
fn surface_flux_scale(ctx: &ModelContext, electrode: Electrode) -> Result<f64, ModelError> {
    let p = &ctx.params;
    let mut scale = p.scalar(&electrode.param("C"))? / p.scalar(&electrode.param("a_R"))?;
    if electrode == Electrode::Positive {
        scale /= p.scalar("gamma_p")?;
    }
    Ok(scale)
}

fn surface_concentration_events(electrode: Electrode, c_surf: &Expr) -> Result<Vec<Event>, ModelError> {
    let tol = SURFACE_CONCENTRATION_TOLERANCE;
    Ok(vec![
        Event::termination(
            format!("Minimum {} particle surface concentration", electrode.name()),
            (min(c_surf) - tol)?,
        )?,
        Event::termination(
            format!("Maximum {} particle surface concentration", electrode.name()),
            ((1.0 - tol) - max(c_surf))?,
        )?,
    ])
}
