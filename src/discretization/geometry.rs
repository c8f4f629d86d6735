use indexmap::IndexMap;

use crate::error::ModelError;
use crate::expression::domain::*;
use crate::expression::Domain;
use crate::physics::parameters::ParameterSource;

/// Coordinate system of a one-dimensional domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoordSys {
    Cartesian,
    /// Radial coordinate of a sphere; operators weight by `r^2`.
    SphericalPolar,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DomainGeometry {
    /// An interval `[min, max]` of the coordinate `coord`.
    Line {
        coord: String,
        min: f64,
        max: f64,
        coord_sys: CoordSys,
    },
    /// A zero-dimensional domain, discretised as a single node.
    Point,
}

impl DomainGeometry {
    pub fn line(coord: impl Into<String>, min: f64, max: f64, coord_sys: CoordSys) -> Self {
        DomainGeometry::Line {
            coord: coord.into(),
            min,
            max,
            coord_sys,
        }
    }
}

/// Spatial extent of every named domain.
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    pub domains: IndexMap<Domain, DomainGeometry>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, domain: &str, geometry: DomainGeometry) -> Self {
        self.domains.insert(Domain::new(domain), geometry);
        self
    }

    pub fn get(&self, domain: &Domain) -> Result<&DomainGeometry, ModelError> {
        self.domains
            .get(domain)
            .ok_or_else(|| ModelError::Mesh(format!("no geometry for domain '{domain}'")))
    }

    /// Dimensionless lithium-ion cell: the through-cell coordinate spans
    /// `[0, 1]`, particles are unit spheres, particle sizes span the configured
    /// radius range and the current collector is a point.
    pub fn lithium_ion(params: &dyn ParameterSource) -> Result<Self, ModelError> {
        let l_n = params.scalar("l_n")?;
        let l_s = params.scalar("l_s")?;
        let l_p = params.scalar("l_p")?;
        if (l_n + l_s + l_p - 1.0).abs() > 1e-12 {
            return Err(ModelError::Mesh(format!(
                "dimensionless electrode and separator lengths must sum to 1, got {}",
                l_n + l_s + l_p
            )));
        }
        Ok(Self::new()
            .with(
                NEGATIVE_ELECTRODE,
                DomainGeometry::line("x_n", 0.0, l_n, CoordSys::Cartesian),
            )
            .with(
                SEPARATOR,
                DomainGeometry::line("x_s", l_n, l_n + l_s, CoordSys::Cartesian),
            )
            .with(
                POSITIVE_ELECTRODE,
                DomainGeometry::line("x_p", l_n + l_s, 1.0, CoordSys::Cartesian),
            )
            .with(
                NEGATIVE_PARTICLE,
                DomainGeometry::line("r_n", 0.0, 1.0, CoordSys::SphericalPolar),
            )
            .with(
                POSITIVE_PARTICLE,
                DomainGeometry::line("r_p", 0.0, 1.0, CoordSys::SphericalPolar),
            )
            .with(
                NEGATIVE_PARTICLE_SIZE,
                DomainGeometry::line(
                    "R_n",
                    params.scalar("R_min_n")?,
                    params.scalar("R_max_n")?,
                    CoordSys::Cartesian,
                ),
            )
            .with(
                POSITIVE_PARTICLE_SIZE,
                DomainGeometry::line(
                    "R_p",
                    params.scalar("R_min_p")?,
                    params.scalar("R_max_p")?,
                    CoordSys::Cartesian,
                ),
            )
            .with(CURRENT_COLLECTOR, DomainGeometry::Point))
    }
}
