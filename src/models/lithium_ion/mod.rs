//! Dimensionless leading-order lithium-ion submodels and the model factory.

pub mod electrolyte;
pub mod external_circuit;
pub mod kinetics;
pub mod particle;
pub mod thermal;
pub mod voltage;

use tracing::info;

use crate::error::ModelError;
use crate::physics::assembly::assemble;
use crate::physics::context::{
    ElectrolyteModel, ModelContext, OperatingMode, ParticleModel, ThermalModel, WorkingElectrode,
};
use crate::physics::model::Model;
use crate::physics::variables::Electrode;
use crate::physics::Submodel;

/// Electrodes carrying intercalation particles.
pub fn working_electrodes(option: WorkingElectrode) -> Vec<Electrode> {
    match option {
        WorkingElectrode::Both => vec![Electrode::Negative, Electrode::Positive],
        WorkingElectrode::Positive => vec![Electrode::Positive],
    }
}

fn model_name(ctx: &ModelContext) -> String {
    let mut name = match ctx.options.particle {
        ParticleModel::Fickian => "Single Particle Model".to_string(),
        ParticleModel::FickianSizeDistribution => "Many-Particle Model".to_string(),
    };
    if ctx.options.electrolyte == ElectrolyteModel::Diffusion {
        name.push_str(" with electrolyte");
    }
    if ctx.options.working_electrode == WorkingElectrode::Positive {
        name.push_str(" (half cell)");
    }
    name
}

/// Select the submodels named by `ctx.options` and assemble them.
pub fn single_particle_model(ctx: &ModelContext) -> Result<Model, ModelError> {
    let options = ctx.options;
    if options.working_electrode == WorkingElectrode::Positive
        && options.electrolyte == ElectrolyteModel::Diffusion
    {
        return Err(ModelError::Configuration(
            "electrolyte diffusion is not available for a lithium metal half cell".into(),
        ));
    }
    ctx.cite("Marquis2019");

    let mut submodels: Vec<Box<dyn Submodel>> = Vec::new();
    submodels.push(match options.operating_mode {
        OperatingMode::Current => Box::new(external_circuit::CurrentControl::new(ctx)),
        OperatingMode::Function => Box::new(external_circuit::FunctionControl::new(ctx)),
    });
    submodels.push(match options.thermal {
        ThermalModel::Isothermal => Box::new(thermal::Isothermal::new(ctx)),
        ThermalModel::Lumped => Box::new(thermal::Lumped::new(ctx)),
    });

    let electrodes = working_electrodes(options.working_electrode);
    for &e in &electrodes {
        submodels.push(match options.particle {
            ParticleModel::Fickian => Box::new(particle::FickianSingleParticle::new(ctx, e)),
            ParticleModel::FickianSizeDistribution => {
                Box::new(particle::FickianSingleSizeDistribution::new(ctx, e))
            }
        });
    }

    submodels.push(match options.electrolyte {
        ElectrolyteModel::Constant => Box::new(electrolyte::ConstantConcentration::new(ctx)),
        ElectrolyteModel::Diffusion => Box::new(electrolyte::Diffusion::new(ctx)),
    });

    if !electrodes.contains(&Electrode::Negative) {
        submodels.push(Box::new(kinetics::LithiumMetalCounterElectrode::new(ctx)));
    }
    for &e in &electrodes {
        submodels.push(Box::new(kinetics::InverseButlerVolmer::new(ctx, e)));
    }
    submodels.push(Box::new(voltage::LeadingOrderVoltage::new(ctx)));

    let name = model_name(ctx);
    info!(model = %name, submodels = submodels.len(), "building model");
    assemble(&name, ctx, submodels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::context::ModelOptions;
    use crate::physics::variables::Key;

    fn with(options: ModelOptions) -> ModelContext {
        ModelContext::lithium_ion().with_options(options)
    }

    #[test]
    fn default_options_give_the_single_particle_model() {
        let ctx = ModelContext::lithium_ion();
        let model = single_particle_model(&ctx).unwrap();
        assert_eq!(model.name(), "Single Particle Model");
        assert_eq!(model.rhs().len(), 3);
        assert!(!model.is_dae());
        assert!(model.variables().contains(Key::TerminalVoltage));
        assert_eq!(model.events().len(), 6);
        assert_eq!(model.citations(), ["Marquis2019"]);
    }

    #[test]
    fn kinetics_run_before_the_voltage() {
        let model = single_particle_model(&ModelContext::lithium_ion()).unwrap();
        let order = model.submodel_order();
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("positive inverse butler-volmer") < position("leading-order voltage"));
        assert!(position("negative inverse butler-volmer") < position("leading-order voltage"));
    }

    #[test]
    fn half_cell_swaps_the_negative_electrode_for_a_foil() {
        let ctx = with(ModelOptions {
            working_electrode: WorkingElectrode::Positive,
            ..ModelOptions::default()
        });
        let model = single_particle_model(&ctx).unwrap();
        assert!(!model
            .variables()
            .contains(Key::ParticleConcentration(Electrode::Negative)));
        assert!(model
            .submodel_order()
            .iter()
            .any(|n| n == "lithium metal counter electrode"));
        assert_eq!(model.rhs().len(), 2);
    }

    #[test]
    fn half_cell_rejects_electrolyte_diffusion() {
        let ctx = with(ModelOptions {
            working_electrode: WorkingElectrode::Positive,
            electrolyte: ElectrolyteModel::Diffusion,
            ..ModelOptions::default()
        });
        assert!(matches!(
            single_particle_model(&ctx),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn size_distribution_cites_its_source() {
        let ctx = with(ModelOptions {
            particle: ParticleModel::FickianSizeDistribution,
            ..ModelOptions::default()
        });
        let model = single_particle_model(&ctx).unwrap();
        assert!(model.citations().iter().any(|c| c == "Kirk2020"));
        assert!(model
            .variables()
            .contains(Key::VolumeWeightedSizeDistribution(Electrode::Positive)));
    }

    #[test]
    fn function_control_adds_an_algebraic_current() {
        let ctx = with(ModelOptions {
            operating_mode: OperatingMode::Function,
            thermal: ThermalModel::Lumped,
            electrolyte: ElectrolyteModel::Diffusion,
            ..ModelOptions::default()
        });
        let model = single_particle_model(&ctx).unwrap();
        assert!(model.is_dae());
        assert_eq!(model.algebraic().len(), 1);
        assert_eq!(model.rhs().len(), 5);
    }
}
