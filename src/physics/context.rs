use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::parameters::{ParameterSource, ParameterValues};
use crate::expression::ExprPool;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingElectrode {
    #[default]
    Both,
    /// Half cell: lithium metal counter electrode on the negative side.
    Positive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleModel {
    #[default]
    Fickian,
    FickianSizeDistribution,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectrolyteModel {
    #[default]
    Constant,
    Diffusion,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalModel {
    #[default]
    Isothermal,
    Lumped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Current prescribed by the `Current function` parameter.
    #[default]
    Current,
    /// Current is an algebraic state fixed by `External circuit function`.
    Function,
}

/// Where x-dependent initial profiles are sampled for x-averaged particle states.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialSlicePolicy {
    pub negative: f64,
    pub positive: f64,
}

impl Default for InitialSlicePolicy {
    fn default() -> Self {
        Self {
            negative: 0.0,
            positive: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    pub working_electrode: WorkingElectrode,
    pub particle: ParticleModel,
    pub electrolyte: ElectrolyteModel,
    pub thermal: ThermalModel,
    pub operating_mode: OperatingMode,
    pub initial_slice: InitialSlicePolicy,
}

/// Everything a submodel needs at construction time. Cloning shares the
/// pool, the parameters and the citation list.
#[derive(Clone)]
pub struct ModelContext {
    pub pool: ExprPool,
    pub params: Rc<dyn ParameterSource>,
    pub options: ModelOptions,
    citations: Rc<RefCell<Vec<String>>>,
}

impl ModelContext {
    pub fn new(params: Rc<dyn ParameterSource>, options: ModelOptions) -> Self {
        Self {
            pool: ExprPool::new(),
            params,
            options,
            citations: Rc::default(),
        }
    }

    /// Default lithium-ion parameters with default options.
    pub fn lithium_ion() -> Self {
        Self::new(Rc::new(ParameterValues::lithium_ion()), ModelOptions::default())
    }

    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Record a reference for the model being built.
    pub fn cite(&self, key: &str) {
        let mut citations = self.citations.borrow_mut();
        if !citations.iter().any(|c| c == key) {
            citations.push(key.to_string());
        }
    }

    pub fn citations(&self) -> Vec<String> {
        self.citations.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citations_are_shared_and_deduplicated() {
        let ctx = ModelContext::lithium_ion();
        let other = ctx.clone();
        ctx.cite("Kirk2020");
        other.cite("Kirk2020");
        other.cite("Marquis2019");
        assert_eq!(ctx.citations(), vec!["Kirk2020", "Marquis2019"]);
    }

    #[test]
    fn options_parse_from_toml() {
        let options: ModelOptions = toml::from_str(
            r#"
            particle = "fickian_size_distribution"
            working_electrode = "positive"
            [initial_slice]
            negative = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(options.particle, ParticleModel::FickianSizeDistribution);
        assert_eq!(options.working_electrode, WorkingElectrode::Positive);
        assert_eq!(options.initial_slice.negative, 0.5);
        assert_eq!(options.initial_slice.positive, 1.0);
    }
}
