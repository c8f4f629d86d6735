use approx::assert_relative_eq;
use indexmap::IndexMap;

use battery_fv::discretization::generator::{Side, SubMeshType};
use battery_fv::discretization::geometry::Geometry;
use battery_fv::discretization::lithium_ion_mesh;
use battery_fv::discretization::mesh::{Mesh, SubMeshSpec};
use battery_fv::expression::domain::*;
use battery_fv::expression::{domain_list, Domain};
use battery_fv::physics::parameters::ParameterValues;
use battery_fv::ModelError;

fn specs(entries: &[(&str, usize, SubMeshType)]) -> IndexMap<Domain, SubMeshSpec> {
    entries
        .iter()
        .map(|(name, points, kind)| {
            (
                Domain::new(*name),
                SubMeshSpec {
                    points: *points,
                    kind: kind.clone(),
                },
            )
        })
        .collect()
}

#[test]
fn whole_cell_is_the_union_of_its_parts() {
    let params = ParameterValues::lithium_ion();
    let mesh = lithium_ion_mesh(&params, &IndexMap::new(), 10).unwrap();
    let cell = mesh.combined(&domain_list([WHOLE_CELL])).unwrap();
    assert_eq!(cell.npts(), 30);
    assert_relative_eq!(cell.start(), 0.0);
    assert_relative_eq!(cell.end(), 1.0);

    let parts = mesh
        .combined(&domain_list([NEGATIVE_ELECTRODE, SEPARATOR, POSITIVE_ELECTRODE]))
        .unwrap();
    assert_eq!(parts, cell);
}

#[test]
fn current_collector_is_a_single_point() {
    let params = ParameterValues::lithium_ion();
    let mesh = lithium_ion_mesh(&params, &IndexMap::new(), 7).unwrap();
    assert_eq!(mesh.level_size(&domain_list([CURRENT_COLLECTOR])).unwrap(), 1);
    assert_eq!(mesh.level_size(&[]).unwrap(), 1);
    assert_eq!(mesh.level_size(&domain_list([POSITIVE_PARTICLE])).unwrap(), 7);
}

#[test]
fn per_domain_specs_override_the_default() {
    let params = ParameterValues::lithium_ion();
    let specs = specs(&[
        (
            POSITIVE_PARTICLE,
            12,
            SubMeshType::Exponential {
                side: Side::Right,
                stretch: 1.5,
            },
        ),
        (SEPARATOR, 3, SubMeshType::Uniform),
    ]);
    let mesh = lithium_ion_mesh(&params, &specs, 5).unwrap();
    let particle = mesh.combined(&domain_list([POSITIVE_PARTICLE])).unwrap();
    assert_eq!(particle.npts(), 12);
    let widths = particle.d_edges();
    assert!(widths[11] < widths[0]);
    assert_eq!(mesh.level_size(&domain_list([SEPARATOR])).unwrap(), 3);
    assert_eq!(mesh.level_size(&domain_list([NEGATIVE_ELECTRODE])).unwrap(), 5);
    assert_eq!(mesh.level_size(&domain_list([WHOLE_CELL])).unwrap(), 13);
}

#[test]
fn user_edges_must_span_the_domain() {
    let params = ParameterValues::lithium_ion();
    let specs = specs(&[(
        NEGATIVE_ELECTRODE,
        2,
        SubMeshType::User {
            edges: vec![0.0, 0.1, 0.3],
        },
    )]);
    let err = lithium_ion_mesh(&params, &specs, 4).unwrap_err();
    match err {
        ModelError::Mesh(msg) => assert!(msg.contains("negative electrode"), "{msg}"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn lengths_must_sum_to_one() {
    let mut params = ParameterValues::lithium_ion();
    params.set_scalar("l_s", 0.3);
    assert!(matches!(
        Geometry::lithium_ion(&params),
        Err(ModelError::Mesh(_))
    ));
}

#[test]
fn unknown_domains_are_mesh_errors() {
    let params = ParameterValues::lithium_ion();
    let geometry = Geometry::lithium_ion(&params).unwrap();
    let mesh = Mesh::new(&geometry, &IndexMap::new(), 4).unwrap();
    assert!(matches!(
        mesh.combined(&domain_list(["nowhere"])),
        Err(ModelError::Mesh(_))
    ));
    // The composite only exists once registered.
    assert!(mesh.combined(&domain_list([WHOLE_CELL])).is_err());
}
