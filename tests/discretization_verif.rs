use std::f64::consts::PI;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use indexmap::IndexMap;
use nalgebra::DVector;

use battery_fv::discretization::{
    lithium_ion_mesh, Discretization, DiscretizationOptions, DiscretizedModel, Location,
};
use battery_fv::expression::domain::*;
use battery_fv::expression::{div, domain_list, grad, integral, Domains, Expr, Variable};
use battery_fv::numerics::TransientSolver;
use battery_fv::physics::assembly::assemble;
use battery_fv::physics::bc::{BCRegistry, BoundaryCondition, BoundaryConditions};
use battery_fv::physics::context::ModelContext;
use battery_fv::physics::model::Model;
use battery_fv::physics::variables::{Electrode, Key, Variables};
use battery_fv::physics::{Equations, Submodel};
use battery_fv::ModelError;

/// `dc/dt = div(D(c) grad c)` in the positive particle with a prescribed
/// surface condition and `D(c) = 1 + slope * c`.
struct SphericalDiffusion {
    ctx: ModelContext,
    slope: f64,
    surface_flux: f64,
    dirichlet_surface: bool,
    initial: f64,
    c: Option<Variable>,
}

impl SphericalDiffusion {
    fn new(ctx: &ModelContext, surface_flux: f64, initial: f64) -> Self {
        Self {
            ctx: ctx.clone(),
            slope: 1.0,
            surface_flux,
            dirichlet_surface: false,
            initial,
            c: None,
        }
    }

    fn c(&self) -> &Variable {
        self.c.as_ref().unwrap()
    }
}

impl Submodel for SphericalDiffusion {
    fn name(&self) -> &str {
        "spherical diffusion"
    }

    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        let c = self
            .ctx
            .pool
            .variable("c", Domains::primary(&[POSITIVE_PARTICLE]))?;
        self.c = Some(c.clone());
        Ok(Variables::new().with(Key::ParticleConcentration(Electrode::Positive), c))
    }

    fn set_rhs(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        let c = self.c().expr();
        let d = ((self.slope * c)? + 1.0)?;
        let flux = (&d * grad(c)?)?;
        Ok(Equations::from([(self.c().clone(), div(&flux)?)]))
    }

    fn set_boundary_conditions(&self, _variables: &Variables) -> Result<BCRegistry, ModelError> {
        let pool = &self.ctx.pool;
        let right = if self.dirichlet_surface {
            BoundaryCondition::dirichlet(pool.scalar(self.surface_flux))
        } else {
            BoundaryCondition::neumann(pool.scalar(self.surface_flux))
        };
        let mut bcs = BCRegistry::new();
        bcs.add(
            self.c().expr(),
            BoundaryConditions::new(BoundaryCondition::neumann(pool.scalar(0.0)), right),
        )?;
        Ok(bcs)
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        Ok(Equations::from([(
            self.c().clone(),
            self.ctx.pool.scalar(self.initial),
        )]))
    }
}

fn build(ctx: &ModelContext, submodel: SphericalDiffusion) -> Model {
    assemble("spherical diffusion", ctx, vec![Box::new(submodel)]).unwrap()
}

fn discretise(ctx: &ModelContext, model: &Model, points: usize, simplify: bool) -> DiscretizedModel {
    let mesh = lithium_ion_mesh(ctx.params.as_ref(), &IndexMap::new(), points).unwrap();
    Discretization::new(mesh)
        .with_options(DiscretizationOptions { simplify })
        .process_model(model)
        .unwrap()
}

fn particle_nodes(model: &DiscretizedModel) -> Vec<f64> {
    model
        .mesh()
        .combined(&domain_list([POSITIVE_PARTICLE]))
        .unwrap()
        .nodes
}

#[test]
fn flux_of_a_constant_profile_vanishes() {
    let ctx = ModelContext::lithium_ion();
    let model = build(&ctx, SphericalDiffusion::new(&ctx, 0.0, 0.7));
    let disc = discretise(&ctx, &model, 12, true);
    assert_eq!(disc.len(), 12);
    let rhs = disc.rhs(0.0, disc.initial_state());
    for v in rhs.iter() {
        assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn integrated_divergence_equals_the_surface_flux() {
    let ctx = ModelContext::lithium_ion();
    let mut submodel = SphericalDiffusion::new(&ctx, 2.0, 0.5);
    submodel.slope = 0.0;
    let model = build(&ctx, submodel);
    let mut disc = discretise(&ctx, &model, 16, true);

    let r = ctx
        .pool
        .spatial_variable("r_p", Domains::primary(&[POSITIVE_PARTICLE]))
        .unwrap();
    let rhs: Expr = model.rhs().values().next().unwrap().clone();
    let total = integral(&rhs, &r).unwrap();

    // Any state works: interior fluxes telescope away.
    let y = DVector::from_vec(particle_nodes(&disc).iter().map(|x| x * x).collect());
    let value = disc.evaluate_symbol(&total, 0.0, &y).unwrap();
    assert_eq!(value.len(), 1);
    assert_relative_eq!(value[0], 4.0 * PI * 2.0, epsilon = 1e-10);
}

#[test]
fn one_euler_step_loses_the_outward_surface_flux() {
    let ctx = ModelContext::lithium_ion();
    let mut submodel = SphericalDiffusion::new(&ctx, -0.5, 0.8);
    submodel.slope = 0.0;
    let model = build(&ctx, submodel);
    let mut disc = discretise(&ctx, &model, 20, true);

    let dt = 1e-3;
    let solver = TransientSolver {
        t_end: dt,
        dt,
        ..TransientSolver::default()
    };
    let solution = solver.solve(&disc, |_, _| {}).unwrap();
    let (t, y) = solution.last().unwrap();
    assert_relative_eq!(t, dt);

    let r = ctx
        .pool
        .spatial_variable("r_p", Domains::primary(&[POSITIVE_PARTICLE]))
        .unwrap();
    let c = model.rhs().keys().next().unwrap().expr().clone();
    let average = (integral(&c, &r).unwrap() / (4.0 * PI / 3.0)).unwrap();
    let value = disc.evaluate_symbol(&average, t, y).unwrap();
    // Outward flux 0.5 through a unit sphere: area / volume = 3.
    assert_relative_eq!(value[0], 0.8 - dt * 0.5 * 3.0, epsilon = 1e-12);
}

#[test]
fn simplification_does_not_change_the_residual() {
    let ctx = ModelContext::lithium_ion();
    let model = build(&ctx, SphericalDiffusion::new(&ctx, -0.5, 0.3));
    let plain = discretise(&ctx, &model, 9, false);
    let simplified = discretise(&ctx, &model, 9, true);

    let y = DVector::from_vec(particle_nodes(&plain).iter().map(|x| 0.2 + x.powi(3)).collect());
    let a = plain.rhs(0.0, &y);
    let b = simplified.rhs(0.0, &y);
    for (x, z) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*x, *z, epsilon = 1e-12, max_relative = 1e-12);
    }
}

#[test]
fn jacobian_matches_finite_differences() {
    let ctx = ModelContext::lithium_ion();
    let model = build(&ctx, SphericalDiffusion::new(&ctx, 1.0, 0.4));
    let disc = discretise(&ctx, &model, 6, true);
    let y = DVector::from_vec(particle_nodes(&disc).iter().map(|x| 0.4 + 0.1 * x).collect());

    let jac = disc.jacobian(0.0, &y);
    let h = 1e-7;
    for j in 0..disc.len() {
        let mut plus = y.clone();
        plus[j] += h;
        let mut minus = y.clone();
        minus[j] -= h;
        let column = (disc.rhs(0.0, &plus) - disc.rhs(0.0, &minus)) / (2.0 * h);
        for i in 0..disc.len() {
            assert_abs_diff_eq!(jac[(i, j)], column[i], epsilon = 1e-5);
        }
    }

    let sparse = disc.jacobian_sparse(0.0, &y);
    // Three-point stencil.
    assert!(sparse.nnz() <= 3 * disc.len());
}

#[test]
fn surface_value_matching_the_profile_is_steady() {
    let ctx = ModelContext::lithium_ion();
    let mut submodel = SphericalDiffusion::new(&ctx, 0.6, 0.6);
    submodel.dirichlet_surface = true;
    let model = build(&ctx, submodel);
    let disc = discretise(&ctx, &model, 5, true);
    let rhs = disc.rhs(0.0, disc.initial_state());
    for v in rhs.iter() {
        assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-12);
    }

    // A surface value above the profile drives lithium into the last cell.
    let mut y = disc.initial_state().clone();
    y[4] = 0.5;
    assert!(disc.rhs(0.0, &y)[4] > 0.0);
}

#[test]
fn outputs_and_extra_symbols_share_the_layout() {
    let ctx = ModelContext::lithium_ion();
    let model = build(&ctx, SphericalDiffusion::new(&ctx, 0.0, 0.25));
    let mut disc = discretise(&ctx, &model, 4, true);

    let y = disc.initial_state().clone();
    let c = disc
        .output(Key::ParticleConcentration(Electrode::Positive), 0.0, &y)
        .unwrap();
    assert_eq!(c, DVector::from_element(4, 0.25));

    let missing = disc.output(Key::TerminalVoltage, 0.0, &y).unwrap_err();
    assert!(matches!(missing, ModelError::DependencyLookup { .. }));

    let state = model.rhs().keys().next().unwrap().expr().clone();
    let gradient = disc.process_symbol(&grad(&state).unwrap()).unwrap();
    assert_eq!(gradient.location, Location::Edges);
    assert_eq!(gradient.len, 5);

    let mass = disc.mass_matrix();
    assert_eq!(mass.nnz(), 4);
    let (lo, hi) = disc.bounds();
    assert!(lo.iter().all(|v| *v == f64::NEG_INFINITY));
    assert!(hi.iter().all(|v| *v == f64::INFINITY));
}
