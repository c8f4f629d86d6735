use serde::{Deserialize, Serialize};

use super::geometry::CoordSys;
use super::mesh::SubMesh;
use crate::error::ModelError;

/// Which end(s) of an exponential submesh are refined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
    Symmetric,
}

/// Strategy for placing the edges of a one-dimensional submesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubMeshType {
    #[default]
    Uniform,
    /// Edges clustered towards `side`; larger `stretch` means stronger clustering.
    Exponential { side: Side, stretch: f64 },
    /// Explicit edges. They must start and end on the domain bounds.
    User { edges: Vec<f64> },
}

impl SubMeshType {
    /// Generate `npts` cells spanning `lims`.
    pub fn generate(
        &self,
        lims: (f64, f64),
        npts: usize,
        coord_sys: CoordSys,
    ) -> Result<SubMesh, ModelError> {
        let (a, b) = lims;
        if a.is_nan() || b.is_nan() || b <= a {
            return Err(ModelError::Mesh(format!("invalid limits [{a}, {b}]")));
        }
        if npts == 0 {
            return Err(ModelError::Mesh("a submesh needs at least one cell".into()));
        }
        let edges = match self {
            SubMeshType::Uniform => uniform_edges(a, b, npts),
            SubMeshType::Exponential { side, stretch } => {
                if *stretch <= 0.0 {
                    return Err(ModelError::Mesh(format!(
                        "exponential stretch must be positive, got {stretch}"
                    )));
                }
                match side {
                    Side::Left => exponential_left(a, b, npts, *stretch),
                    Side::Right => exponential_right(a, b, npts, *stretch),
                    Side::Symmetric => {
                        let mid = 0.5 * (a + b);
                        let n_left = npts / 2;
                        if n_left == 0 {
                            return Err(ModelError::Mesh(
                                "a symmetric exponential submesh needs at least two cells".into(),
                            ));
                        }
                        let mut edges = exponential_left(a, mid, n_left, *stretch);
                        let right = exponential_right(mid, b, npts - n_left, *stretch);
                        edges.extend_from_slice(&right[1..]);
                        edges
                    }
                }
            }
            SubMeshType::User { edges } => {
                if edges.len() != npts + 1 {
                    return Err(ModelError::Mesh(format!(
                        "{} user edges given for {npts} cells",
                        edges.len()
                    )));
                }
                let tol = 1e-12 * (b - a);
                if (edges[0] - a).abs() > tol || (edges[npts] - b).abs() > tol {
                    return Err(ModelError::Mesh(format!(
                        "user edges must span [{a}, {b}], got [{}, {}]",
                        edges[0], edges[npts]
                    )));
                }
                edges.clone()
            }
        };
        SubMesh::from_edges(edges, coord_sys)
    }
}

fn uniform_edges(a: f64, b: f64, npts: usize) -> Vec<f64> {
    (0..=npts)
        .map(|i| a + (b - a) * i as f64 / npts as f64)
        .collect()
}

fn exponential_left(a: f64, b: f64, npts: usize, stretch: f64) -> Vec<f64> {
    let scale = (b - a) / (stretch.exp() - 1.0);
    let mut edges: Vec<f64> = (0..=npts)
        .map(|i| a + scale * ((stretch * i as f64 / npts as f64).exp() - 1.0))
        .collect();
    edges[npts] = b;
    edges
}

fn exponential_right(a: f64, b: f64, npts: usize, stretch: f64) -> Vec<f64> {
    let left = exponential_left(a, b, npts, stretch);
    let mut edges: Vec<f64> = left.iter().rev().map(|e| a + b - e).collect();
    edges[0] = a;
    edges[npts] = b;
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uniform_spans_limits() {
        let m = SubMeshType::Uniform
            .generate((0.2, 0.6), 8, CoordSys::Cartesian)
            .unwrap();
        assert_eq!(m.edges.len(), 9);
        assert_relative_eq!(m.start(), 0.2);
        assert_relative_eq!(m.end(), 0.6);
        for w in m.d_edges() {
            assert_relative_eq!(w, 0.05, epsilon = 1e-14);
        }
    }

    #[test]
    fn exponential_refines_the_requested_side() {
        let kind = SubMeshType::Exponential {
            side: Side::Right,
            stretch: 2.0,
        };
        let m = kind.generate((0.0, 1.0), 10, CoordSys::SphericalPolar).unwrap();
        let d = m.d_edges();
        assert!(d[9] < d[0]);
        assert_relative_eq!(m.end(), 1.0);

        let sym = SubMeshType::Exponential {
            side: Side::Symmetric,
            stretch: 2.0,
        };
        let m = sym.generate((0.0, 1.0), 10, CoordSys::Cartesian).unwrap();
        let d = m.d_edges();
        assert_eq!(m.npts(), 10);
        assert!(d[0] < d[4] && d[9] < d[5]);
    }

    #[test]
    fn user_edges_must_match_the_domain() {
        let good = SubMeshType::User {
            edges: vec![0.0, 0.1, 0.5, 1.0],
        };
        assert_eq!(good.generate((0.0, 1.0), 3, CoordSys::Cartesian).unwrap().npts(), 3);
        let bad = SubMeshType::User {
            edges: vec![0.0, 0.5, 0.9],
        };
        assert!(bad.generate((0.0, 1.0), 2, CoordSys::Cartesian).is_err());
    }
}
