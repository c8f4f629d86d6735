//! Finite-volume operator matrices.
//!
//! Every operator acts on one slice of the primary domain and is repeated
//! block-diagonally over the outer (secondary/tertiary) index, which is the
//! slowest-varying index of the flattened layout:
//! `index = (tertiary * n_secondary + secondary) * n_primary + primary`.

use std::f64::consts::PI;

use nalgebra_sparse::{CooMatrix, CsrMatrix};

use super::geometry::CoordSys;
use super::mesh::SubMesh;
use crate::expression::Side;

type Triplet = (usize, usize, f64);

/// `kron(I_repeats, block)` for a `rows x cols` block given as triplets.
fn block_diagonal(rows: usize, cols: usize, block: &[Triplet], repeats: usize) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(rows * repeats, cols * repeats);
    for k in 0..repeats {
        for &(i, j, v) in block {
            coo.push(k * rows + i, k * cols + j, v);
        }
    }
    CsrMatrix::from(&coo)
}

fn from_triplets(rows: usize, cols: usize, entries: &[Triplet]) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(rows, cols);
    for &(i, j, v) in entries {
        coo.push(i, j, v);
    }
    CsrMatrix::from(&coo)
}

/// Gradient at the interior edges: `(u[i+1] - u[i]) / (x[i+1] - x[i])`.
pub fn gradient_interior(mesh: &SubMesh, repeats: usize) -> CsrMatrix<f64> {
    let n = mesh.npts();
    let block: Vec<Triplet> = mesh
        .d_nodes()
        .iter()
        .enumerate()
        .flat_map(|(i, dx)| [(i, i, -1.0 / dx), (i, i + 1, 1.0 / dx)])
        .collect();
    block_diagonal(n.saturating_sub(1), n, &block, repeats)
}

/// Scatter interior-edge values into the full edge layout, leaving zeros at
/// the two boundary edges of every slice.
pub fn interior_to_edges(npts: usize, repeats: usize) -> CsrMatrix<f64> {
    let block: Vec<Triplet> = (0..npts.saturating_sub(1)).map(|i| (i + 1, i, 1.0)).collect();
    block_diagonal(npts + 1, npts.saturating_sub(1), &block, repeats)
}

/// Scatter one value per slice onto the boundary edge at `side`.
pub fn boundary_edge_scatter(npts: usize, side: Side, repeats: usize) -> CsrMatrix<f64> {
    let row = match side {
        Side::Left => 0,
        Side::Right => npts,
    };
    block_diagonal(npts + 1, 1, &[(row, 0, 1.0)], repeats)
}

/// Pick the node nearest to `side` in every slice.
pub fn boundary_node_select(npts: usize, side: Side, repeats: usize) -> CsrMatrix<f64> {
    let col = match side {
        Side::Left => 0,
        Side::Right => npts - 1,
    };
    block_diagonal(1, npts, &[(0, col, 1.0)], repeats)
}

/// Distance between the boundary edge and the nearest node.
pub fn boundary_half_width(mesh: &SubMesh, side: Side) -> f64 {
    let n = mesh.npts();
    match side {
        Side::Left => mesh.nodes[0] - mesh.edges[0],
        Side::Right => mesh.edges[n] - mesh.nodes[n - 1],
    }
}

/// Face areas (per unit solid angle for spherical coordinates).
fn edge_areas(mesh: &SubMesh) -> Vec<f64> {
    match mesh.coord_sys {
        CoordSys::Cartesian => vec![1.0; mesh.edges.len()],
        CoordSys::SphericalPolar => mesh.edges.iter().map(|e| e * e).collect(),
    }
}

/// Cell volumes, consistent with [`edge_areas`].
fn cell_volumes(mesh: &SubMesh) -> Vec<f64> {
    match mesh.coord_sys {
        CoordSys::Cartesian => mesh.d_edges(),
        CoordSys::SphericalPolar => mesh
            .edges
            .windows(2)
            .map(|w| (w[1].powi(3) - w[0].powi(3)) / 3.0)
            .collect(),
    }
}

/// Conservative divergence from edge fluxes to node values:
/// `(A[i+1] N[i+1] - A[i] N[i]) / V[i]`.
pub fn divergence(mesh: &SubMesh, repeats: usize) -> CsrMatrix<f64> {
    let n = mesh.npts();
    let areas = edge_areas(mesh);
    let volumes = cell_volumes(mesh);
    let block: Vec<Triplet> = (0..n)
        .flat_map(|i| {
            [
                (i, i, -areas[i] / volumes[i]),
                (i, i + 1, areas[i + 1] / volumes[i]),
            ]
        })
        .collect();
    block_diagonal(n, n + 1, &block, repeats)
}

/// Quadrature weights over one slice. Spherical weights are exact shell
/// volumes, so integrating a divergence gives the surface flux times area.
pub fn integral_weights(mesh: &SubMesh) -> Vec<f64> {
    match mesh.coord_sys {
        CoordSys::Cartesian => mesh.d_edges(),
        CoordSys::SphericalPolar => cell_volumes(mesh).iter().map(|v| 4.0 * PI * v).collect(),
    }
}

/// Integrate over the primary domain of every slice.
pub fn integral_primary(mesh: &SubMesh, repeats: usize) -> CsrMatrix<f64> {
    let block: Vec<Triplet> = integral_weights(mesh)
        .into_iter()
        .enumerate()
        .map(|(j, w)| (0, j, w))
        .collect();
    block_diagonal(1, mesh.npts(), &block, repeats)
}

/// Integrate over the secondary domain, keeping the primary index.
pub fn integral_secondary(secondary: &SubMesh, n_primary: usize, n_tertiary: usize) -> CsrMatrix<f64> {
    let weights = integral_weights(secondary);
    let block: Vec<Triplet> = weights
        .iter()
        .enumerate()
        .flat_map(|(s, w)| (0..n_primary).map(move |p| (p, s * n_primary + p, *w)))
        .collect();
    block_diagonal(n_primary, weights.len() * n_primary, &block, n_tertiary)
}

/// Column of ones: replicate one value `len` times.
pub fn ones(len: usize) -> CsrMatrix<f64> {
    let block: Vec<Triplet> = (0..len).map(|i| (i, 0, 1.0)).collect();
    from_triplets(len, 1, &block)
}

/// `kron(I_child, ones(n_new))`: each child entry becomes a whole new
/// innermost slice.
pub fn primary_broadcast(child_len: usize, n_new: usize) -> CsrMatrix<f64> {
    let block: Vec<Triplet> = (0..n_new).map(|i| (i, 0, 1.0)).collect();
    block_diagonal(n_new, 1, &block, child_len)
}

/// `kron(I_outer, kron(ones(n_new), I_primary))`: the primary slice is copied
/// for every entry of the new secondary level.
pub fn secondary_broadcast(n_primary: usize, n_new: usize, n_outer: usize) -> CsrMatrix<f64> {
    let block: Vec<Triplet> = (0..n_new)
        .flat_map(|s| (0..n_primary).map(move |p| (s * n_primary + p, p, 1.0)))
        .collect();
    block_diagonal(n_new * n_primary, n_primary, &block, n_outer)
}

/// Linear extrapolation to the boundary edge from the two nearest nodes.
pub fn extrapolate_boundary(mesh: &SubMesh, side: Side, repeats: usize) -> CsrMatrix<f64> {
    let n = mesh.npts();
    let block = if n == 1 {
        vec![(0, 0, 1.0)]
    } else {
        let (near, far, edge) = match side {
            Side::Left => (0, 1, mesh.edges[0]),
            Side::Right => (n - 1, n - 2, mesh.edges[n]),
        };
        let t = (edge - mesh.nodes[near]) / (mesh.nodes[far] - mesh.nodes[near]);
        vec![(0, near, 1.0 - t), (0, far, t)]
    };
    block_diagonal(1, n, &block, repeats)
}

fn interior_edge_weights(mesh: &SubMesh) -> Vec<[Triplet; 2]> {
    (0..mesh.npts().saturating_sub(1))
        .map(|i| {
            let dx = mesh.nodes[i + 1] - mesh.nodes[i];
            let t = (mesh.edges[i + 1] - mesh.nodes[i]) / dx;
            [(i, i, 1.0 - t), (i, i + 1, t)]
        })
        .collect()
}

/// Interpolate node values onto the interior edges.
pub fn node_to_interior_edge(mesh: &SubMesh, repeats: usize) -> CsrMatrix<f64> {
    let n = mesh.npts();
    let block: Vec<Triplet> = interior_edge_weights(mesh).into_iter().flatten().collect();
    block_diagonal(n.saturating_sub(1), n, &block, repeats)
}

/// Interpolate node values onto every edge, extrapolating at the boundaries.
pub fn node_to_edge(mesh: &SubMesh, repeats: usize) -> CsrMatrix<f64> {
    let n = mesh.npts();
    let mut block: Vec<Triplet> = Vec::new();
    for side in [Side::Left, Side::Right] {
        let row = match side {
            Side::Left => 0,
            Side::Right => n,
        };
        let one = extrapolate_boundary(mesh, side, 1);
        for (_, j, v) in one.triplet_iter() {
            block.push((row, j, *v));
        }
    }
    for [a, b] in interior_edge_weights(mesh) {
        block.push((a.0 + 1, a.1, a.2));
        block.push((b.0 + 1, b.1, b.2));
    }
    block_diagonal(n + 1, n, &block, repeats)
}

/// Place one part of a concatenation at `offset` within each slice of
/// length `total`.
pub fn concatenation_scatter(
    part_len: usize,
    offset: usize,
    total: usize,
    repeats: usize,
) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(total * repeats, part_len * repeats);
    for k in 0..repeats {
        for p in 0..part_len {
            coo.push(k * total + offset + p, k * part_len + p, 1.0);
        }
    }
    CsrMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::SubMeshType;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn apply(m: &CsrMatrix<f64>, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; m.nrows()];
        for (i, j, v) in m.triplet_iter() {
            out[i] += v * x[j];
        }
        out
    }

    fn mesh(coord_sys: CoordSys, n: usize) -> SubMesh {
        SubMeshType::Uniform.generate((0.0, 1.0), n, coord_sys).unwrap()
    }

    #[test]
    fn gradient_of_linear_profile_is_constant() {
        let m = mesh(CoordSys::Cartesian, 8);
        let u: Vec<f64> = m.nodes.iter().map(|x| 3.0 * x + 1.0).collect();
        for g in apply(&gradient_interior(&m, 1), &u) {
            assert_relative_eq!(g, 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn spherical_divergence_integrates_to_surface_flux() {
        let m = mesh(CoordSys::SphericalPolar, 12);
        let flux: Vec<f64> = m.edges.iter().map(|r| r * r - 0.3 * r).collect();
        let div = apply(&divergence(&m, 1), &flux);
        let total = apply(&integral_primary(&m, 1), &div)[0];
        assert_relative_eq!(total, 4.0 * PI * flux[12], epsilon = 1e-12);
    }

    #[test]
    fn integral_of_one_is_the_volume() {
        let m = mesh(CoordSys::SphericalPolar, 7);
        let total: f64 = integral_weights(&m).iter().sum();
        assert_relative_eq!(total, 4.0 * PI / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn secondary_integral_keeps_primary_index() {
        let sec = mesh(CoordSys::Cartesian, 4);
        // two primary points, four secondary points
        let x: Vec<f64> = (0..8).map(|k| if k % 2 == 0 { 1.0 } else { 2.0 }).collect();
        let out = apply(&integral_secondary(&sec, 2, 1), &x);
        assert_relative_eq!(out[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(out[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn broadcasts_replicate_in_layout_order() {
        let pb = primary_broadcast(2, 3);
        assert_eq!(apply(&pb, &[1.0, 2.0]), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        let sb = secondary_broadcast(2, 3, 1);
        assert_eq!(apply(&sb, &[1.0, 2.0]), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn node_to_edge_is_exact_for_linear_data() {
        let m = SubMeshType::User {
            edges: vec![0.0, 0.1, 0.3, 0.7, 1.0],
        }
        .generate((0.0, 1.0), 4, CoordSys::Cartesian)
        .unwrap();
        let u: Vec<f64> = m.nodes.iter().map(|x| 2.0 - x).collect();
        let e = apply(&node_to_edge(&m, 2), &[u.clone(), u].concat());
        let expected = DVector::from_iterator(5, m.edges.iter().map(|x| 2.0 - x));
        for k in 0..2 {
            for i in 0..5 {
                assert_relative_eq!(e[k * 5 + i], expected[i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn concatenation_interleaves_per_slice() {
        let a = concatenation_scatter(1, 0, 3, 2);
        let b = concatenation_scatter(2, 1, 3, 2);
        let mut out = apply(&a, &[1.0, 4.0]);
        for (o, v) in out.iter_mut().zip(apply(&b, &[2.0, 3.0, 5.0, 6.0])) {
            *o += v;
        }
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
