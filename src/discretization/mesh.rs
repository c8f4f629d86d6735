use indexmap::IndexMap;
use tracing::debug;

use super::generator::SubMeshType;
use super::geometry::{CoordSys, DomainGeometry, Geometry};
use crate::error::ModelError;
use crate::expression::Domain;

/// Relative tolerance used when checking that adjacent submeshes touch.
const ADJACENCY_TOL: f64 = 1e-12;

/// Finite-volume grid of one domain (or of an ordered union of domains).
///
/// `edges` are the cell boundaries and `nodes` the cell centres, so
/// `edges.len() == nodes.len() + 1` always holds.
#[derive(Clone, Debug, PartialEq)]
pub struct SubMesh {
    pub edges: Vec<f64>,
    pub nodes: Vec<f64>,
    pub coord_sys: CoordSys,
}

impl SubMesh {
    /// Build from edges; nodes are the midpoints.
    pub fn from_edges(edges: Vec<f64>, coord_sys: CoordSys) -> Result<Self, ModelError> {
        if edges.len() < 2 {
            return Err(ModelError::Mesh(format!(
                "a submesh needs at least two edges, got {}",
                edges.len()
            )));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ModelError::Mesh(
                "submesh edges must be strictly increasing".into(),
            ));
        }
        let nodes = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Ok(Self {
            edges,
            nodes,
            coord_sys,
        })
    }

    /// Single unit cell standing for a zero-dimensional domain.
    pub fn point() -> Self {
        Self {
            edges: vec![0.0, 1.0],
            nodes: vec![0.5],
            coord_sys: CoordSys::Cartesian,
        }
    }

    pub fn npts(&self) -> usize {
        self.nodes.len()
    }

    pub fn start(&self) -> f64 {
        self.edges[0]
    }

    pub fn end(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Cell widths `e[i+1] - e[i]`.
    pub fn d_edges(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Node spacings `x[i+1] - x[i]`.
    pub fn d_nodes(&self) -> Vec<f64> {
        self.nodes.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Join adjacent submeshes. Shared interface edges are kept once.
    pub fn combine(parts: &[&SubMesh]) -> Result<Self, ModelError> {
        let Some(first) = parts.first() else {
            return Err(ModelError::Mesh("cannot combine zero submeshes".into()));
        };
        let mut edges = first.edges.clone();
        let mut nodes = first.nodes.clone();
        for part in &parts[1..] {
            if part.coord_sys != first.coord_sys {
                return Err(ModelError::Mesh(
                    "cannot combine submeshes with different coordinate systems".into(),
                ));
            }
            let last = edges[edges.len() - 1];
            let scale = last.abs().max(part.start().abs()).max(1.0);
            if (part.start() - last).abs() > ADJACENCY_TOL * scale {
                return Err(ModelError::Mesh(format!(
                    "submeshes are not adjacent: one ends at {last}, the next starts at {}",
                    part.start()
                )));
            }
            edges.extend_from_slice(&part.edges[1..]);
            nodes.extend_from_slice(&part.nodes);
        }
        Ok(Self {
            edges,
            nodes,
            coord_sys: first.coord_sys,
        })
    }
}

/// Mesh resolution and strategy for one domain.
#[derive(Clone, Debug, PartialEq)]
pub struct SubMeshSpec {
    pub points: usize,
    pub kind: SubMeshType,
}

/// All submeshes of a model, plus named composites such as the whole cell.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    submeshes: IndexMap<Domain, SubMesh>,
    composites: IndexMap<Domain, Vec<Domain>>,
}

impl Mesh {
    /// Generate one submesh per geometry entry. Domains without an entry in
    /// `specs` fall back to `default_points` uniform cells.
    pub fn new(
        geometry: &Geometry,
        specs: &IndexMap<Domain, SubMeshSpec>,
        default_points: usize,
    ) -> Result<Self, ModelError> {
        let mut submeshes = IndexMap::new();
        for (domain, geo) in &geometry.domains {
            let submesh = match geo {
                DomainGeometry::Point => SubMesh::point(),
                DomainGeometry::Line {
                    min,
                    max,
                    coord_sys,
                    ..
                } => {
                    let spec = specs.get(domain).cloned().unwrap_or(SubMeshSpec {
                        points: default_points,
                        kind: SubMeshType::Uniform,
                    });
                    spec.kind
                        .generate((*min, *max), spec.points, *coord_sys)
                        .map_err(|e| match e {
                            ModelError::Mesh(msg) => ModelError::Mesh(format!("{domain}: {msg}")),
                            other => other,
                        })?
                }
            };
            debug!(domain = %domain, points = submesh.npts(), "generated submesh");
            submeshes.insert(domain.clone(), submesh);
        }
        Ok(Self {
            submeshes,
            composites: IndexMap::new(),
        })
    }

    pub fn from_submeshes(submeshes: impl IntoIterator<Item = (Domain, SubMesh)>) -> Self {
        Self {
            submeshes: submeshes.into_iter().collect(),
            composites: IndexMap::new(),
        }
    }

    /// Register `name` as the ordered union of `parts`. Adjacency is checked now.
    pub fn add_composite(&mut self, name: &str, parts: &[&str]) -> Result<(), ModelError> {
        let parts: Vec<Domain> = parts.iter().map(|p| Domain::new(*p)).collect();
        self.combined(&parts)?;
        self.composites.insert(Domain::new(name), parts);
        Ok(())
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.submeshes.keys()
    }

    fn expand<'a>(&'a self, domain: &'a Domain) -> Vec<&'a Domain> {
        match self.composites.get(domain) {
            Some(parts) => parts.iter().collect(),
            None => vec![domain],
        }
    }

    /// Submesh of an ordered list of domains (one domain level of an expression).
    pub fn combined(&self, domains: &[Domain]) -> Result<SubMesh, ModelError> {
        let mut parts = Vec::new();
        for domain in domains {
            for d in self.expand(domain) {
                parts.push(self.submeshes.get(d).ok_or_else(|| {
                    ModelError::Mesh(format!("no submesh for domain '{d}'"))
                })?);
            }
        }
        SubMesh::combine(&parts)
    }

    /// Number of discrete points of a domain level; an empty level counts as one.
    pub fn level_size(&self, domains: &[Domain]) -> Result<usize, ModelError> {
        if domains.is_empty() {
            return Ok(1);
        }
        Ok(self.combined(domains)?.npts())
    }

    /// Total number of cells across all submeshes.
    pub fn total_points(&self) -> usize {
        self.submeshes.values().map(SubMesh::npts).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(a: f64, b: f64, n: usize) -> SubMesh {
        SubMeshType::Uniform
            .generate((a, b), n, CoordSys::Cartesian)
            .unwrap()
    }

    #[test]
    fn combine_deduplicates_shared_edges() {
        let a = uniform(0.0, 0.4, 4);
        let b = uniform(0.4, 1.0, 6);
        let c = SubMesh::combine(&[&a, &b]).unwrap();
        assert_eq!(c.npts(), 10);
        assert_eq!(c.edges.len(), 11);
        assert_eq!(c.end(), 1.0);
    }

    #[test]
    fn gaps_are_rejected() {
        let a = uniform(0.0, 0.4, 4);
        let b = uniform(0.5, 1.0, 6);
        assert!(matches!(
            SubMesh::combine(&[&a, &b]),
            Err(ModelError::Mesh(_))
        ));
    }

    #[test]
    fn point_mesh_has_one_node() {
        let p = SubMesh::point();
        assert_eq!(p.npts(), 1);
        assert_eq!(p.d_edges(), vec![1.0]);
    }
}
