//! TOML run configuration. Every section has defaults, so an empty file is a
//! valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discretization::generator::SubMeshType;
use crate::discretization::mesh::SubMeshSpec;
use crate::expression::Domain;
use crate::numerics::{Convergence, NewtonSolver, Tolerance, TransientSolver};
use crate::physics::context::{ModelContext, ModelOptions};
use crate::physics::parameters::ParameterValues;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub mesh: MeshConfig,
    pub model: ModelOptions,
    pub solver: SolverConfig,
    pub output: OutputConfig,
    /// Scalar overrides on top of the default lithium-ion parameters.
    pub parameters: IndexMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Cells per domain unless the domain has its own entry.
    pub points: usize,
    pub domains: IndexMap<String, DomainMeshConfig>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            points: 10,
            domains: IndexMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainMeshConfig {
    pub points: Option<usize>,
    pub strategy: SubMeshType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub t_end: f64,
    pub dt: f64,
    pub newton_tolerance: f64,
    pub newton_max_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            t_end: 1.0,
            dt: 1e-4,
            newton_tolerance: 1e-10,
            newton_max_iterations: 50,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
        }
    }
}

impl SimulationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let solver = &self.solver;
        if !(solver.dt > 0.0) {
            return Err(ConfigError::Invalid(format!("dt must be positive, got {}", solver.dt)));
        }
        if !(solver.t_end > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "t_end must be positive, got {}",
                solver.t_end
            )));
        }
        if self.mesh.points == 0 {
            return Err(ConfigError::Invalid("mesh.points must be at least 1".into()));
        }
        if let Some((name, _)) = self.mesh.domains.iter().find(|(_, d)| d.points == Some(0)) {
            return Err(ConfigError::Invalid(format!(
                "mesh.domains.\"{name}\".points must be at least 1"
            )));
        }
        Ok(())
    }

    /// Default parameters with the `[parameters]` overrides applied.
    pub fn parameter_values(&self) -> ParameterValues {
        let mut values = ParameterValues::lithium_ion();
        values.update(&self.parameters);
        values
    }

    pub fn context(&self) -> ModelContext {
        ModelContext::new(Rc::new(self.parameter_values()), self.model)
    }

    pub fn submesh_specs(&self) -> IndexMap<Domain, SubMeshSpec> {
        self.mesh
            .domains
            .iter()
            .map(|(name, entry)| {
                let spec = SubMeshSpec {
                    points: entry.points.unwrap_or(self.mesh.points),
                    kind: entry.strategy.clone(),
                };
                (Domain::new(name.as_str()), spec)
            })
            .collect()
    }

    pub fn transient_solver(&self) -> TransientSolver {
        TransientSolver {
            t_start: 0.0,
            t_end: self.solver.t_end,
            dt: self.solver.dt,
            newton: NewtonSolver {
                convergence: Convergence {
                    tolerance: Tolerance::Absolute(self.solver.newton_tolerance),
                    ..Convergence::default()
                },
                max_iterations: self.solver.newton_max_iterations,
            },
        }
    }
}
