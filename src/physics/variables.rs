use std::fmt;

use indexmap::IndexMap;

use crate::error::ModelError;
use crate::expression::domain::*;
use crate::expression::{domain_list, Domain, Expr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Electrode {
    Negative,
    Positive,
}

impl Electrode {
    pub fn name(self) -> &'static str {
        match self {
            Electrode::Negative => "negative",
            Electrode::Positive => "positive",
        }
    }

    pub fn electrode_domain(self) -> Vec<Domain> {
        match self {
            Electrode::Negative => domain_list([NEGATIVE_ELECTRODE]),
            Electrode::Positive => domain_list([POSITIVE_ELECTRODE]),
        }
    }

    pub fn particle_domain(self) -> Vec<Domain> {
        match self {
            Electrode::Negative => domain_list([NEGATIVE_PARTICLE]),
            Electrode::Positive => domain_list([POSITIVE_PARTICLE]),
        }
    }

    pub fn size_domain(self) -> Vec<Domain> {
        match self {
            Electrode::Negative => domain_list([NEGATIVE_PARTICLE_SIZE]),
            Electrode::Positive => domain_list([POSITIVE_PARTICLE_SIZE]),
        }
    }

    /// Parameter name with the conventional `_n`/`_p` suffix.
    pub fn param(self, base: &str) -> String {
        match self {
            Electrode::Negative => format!("{base}_n"),
            Electrode::Positive => format!("{base}_p"),
        }
    }

    fn capitalized(self) -> &'static str {
        match self {
            Electrode::Negative => "Negative",
            Electrode::Positive => "Positive",
        }
    }
}

/// Typed identity of a model quantity. The `Display` form is the
/// human-readable label used in diagnostics and output files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Time,
    Current,
    DischargeCapacity,
    TerminalVoltage,
    XAveragedTemperature,
    TotalHeating,
    ElectrolyteConcentration,
    XAveragedElectrolyteConcentration(Electrode),
    ParticleConcentration(Electrode),
    SurfaceConcentration(Electrode),
    AverageParticleConcentration(Electrode),
    ParticleFlux(Electrode),
    ParticleSizes(Electrode),
    ParticleConcentrationDistribution(Electrode),
    SurfaceConcentrationDistribution(Electrode),
    ParticleFluxDistribution(Electrode),
    AreaWeightedSizeDistribution(Electrode),
    VolumeWeightedSizeDistribution(Electrode),
    NumberWeightedSizeDistribution(Electrode),
    InterfacialCurrentDensity(Electrode),
    InterfacialCurrentDensityDistribution(Electrode),
    ExchangeCurrentDensity(Electrode),
    ReactionOverpotential(Electrode),
    OpenCircuitPotential(Electrode),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Time => f.write_str("Time"),
            Key::Current => f.write_str("Current"),
            Key::DischargeCapacity => f.write_str("Discharge capacity"),
            Key::TerminalVoltage => f.write_str("Terminal voltage"),
            Key::XAveragedTemperature => f.write_str("X-averaged cell temperature"),
            Key::TotalHeating => f.write_str("X-averaged total heating"),
            Key::ElectrolyteConcentration => f.write_str("Electrolyte concentration"),
            Key::XAveragedElectrolyteConcentration(e) => {
                write!(f, "X-averaged {} electrolyte concentration", e.name())
            }
            Key::ParticleConcentration(e) => {
                write!(f, "X-averaged {} particle concentration", e.name())
            }
            Key::SurfaceConcentration(e) => {
                write!(f, "X-averaged {} particle surface concentration", e.name())
            }
            Key::AverageParticleConcentration(e) => {
                write!(f, "Volume-averaged {} particle concentration", e.name())
            }
            Key::ParticleFlux(e) => write!(f, "X-averaged {} particle flux", e.name()),
            Key::ParticleSizes(e) => write!(f, "{} particle sizes", e.capitalized()),
            Key::ParticleConcentrationDistribution(e) => write!(
                f,
                "X-averaged {} particle concentration distribution",
                e.name()
            ),
            Key::SurfaceConcentrationDistribution(e) => write!(
                f,
                "X-averaged {} particle surface concentration distribution",
                e.name()
            ),
            Key::ParticleFluxDistribution(e) => {
                write!(f, "X-averaged {} particle flux distribution", e.name())
            }
            Key::AreaWeightedSizeDistribution(e) => write!(
                f,
                "X-averaged {} area-weighted particle-size distribution",
                e.name()
            ),
            Key::VolumeWeightedSizeDistribution(e) => write!(
                f,
                "X-averaged {} volume-weighted particle-size distribution",
                e.name()
            ),
            Key::NumberWeightedSizeDistribution(e) => write!(
                f,
                "X-averaged {} number-based particle-size distribution",
                e.name()
            ),
            Key::InterfacialCurrentDensity(e) => write!(
                f,
                "X-averaged {} electrode interfacial current density",
                e.name()
            ),
            Key::InterfacialCurrentDensityDistribution(e) => write!(
                f,
                "X-averaged {} electrode interfacial current density distribution",
                e.name()
            ),
            Key::ExchangeCurrentDensity(e) => write!(
                f,
                "X-averaged {} electrode exchange current density",
                e.name()
            ),
            Key::ReactionOverpotential(e) => write!(
                f,
                "X-averaged {} electrode reaction overpotential",
                e.name()
            ),
            Key::OpenCircuitPotential(e) => write!(
                f,
                "X-averaged {} electrode open circuit potential",
                e.name()
            ),
        }
    }
}

/// Insertion-ordered mapping from keys to expressions.
#[derive(Clone, Debug, Default)]
pub struct Variables {
    entries: IndexMap<Key, Expr>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Key, expr: impl Into<Expr>) -> &mut Self {
        self.entries.insert(key, expr.into());
        self
    }

    pub fn with(mut self, key: Key, expr: impl Into<Expr>) -> Self {
        self.insert(key, expr);
        self
    }

    /// Look up `key` on behalf of the submodel `requested_by`.
    pub fn get(&self, key: Key, requested_by: &str) -> Result<&Expr, ModelError> {
        self.entries
            .get(&key)
            .ok_or_else(|| ModelError::DependencyLookup {
                key: key.to_string(),
                requested_by: requested_by.to_string(),
            })
    }

    pub fn contains(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Expr)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    /// Merge `other` into `self`. Registering a key twice is a configuration
    /// error naming `source`.
    pub fn extend(&mut self, other: Variables, source: &str) -> Result<(), ModelError> {
        for (key, expr) in other.entries {
            if let Some(existing) = self.entries.get(&key) {
                if *existing != expr {
                    return Err(ModelError::Configuration(format!(
                        "`{source}` registers `{key}`, which is already defined"
                    )));
                }
            }
            self.entries.insert(key, expr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExprPool;

    #[test]
    fn missing_key_reports_the_requester() {
        let vars = Variables::new();
        let err = vars
            .get(Key::SurfaceConcentration(Electrode::Positive), "kinetics")
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::DependencyLookup {
                key: "X-averaged positive particle surface concentration".into(),
                requested_by: "kinetics".into(),
            }
        );
    }

    #[test]
    fn conflicting_registrations_are_rejected() {
        let pool = ExprPool::new();
        let mut a = Variables::new().with(Key::Current, pool.scalar(1.0));
        let b = Variables::new().with(Key::Current, pool.scalar(2.0));
        assert!(a.extend(b, "other").is_err());
        let same = Variables::new().with(Key::Current, pool.scalar(1.0));
        assert!(a.extend(same, "same").is_ok());
    }
}
