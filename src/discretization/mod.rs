//! Lowering of assembled models onto a finite-volume mesh.
//!
//! [`Discretization::process_model`] walks every equation of a frozen
//! [`Model`] once and produces a [`DiscretizedModel`]: a flat
//! [`discrete::DiscreteGraph`] plus the state layout, initial state, bounds
//! and event roots the time integrator needs.

pub mod discrete;
pub mod finite_volume;
pub mod generator;
pub mod geometry;
pub mod mesh;

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use indexmap::IndexMap;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use num_dual::{jacobian, DualDVec64, DualNum};
use tracing::{debug, info};

use crate::error::ModelError;
use crate::expression::simplify::simplify;
use crate::expression::{domain, BinaryOp, Domains, Expr, ExprPool, Node, NodeId, Side, VariableId};
use crate::physics::bc::{
    describe_missing, BCRegistry, BoundaryCondition, BoundaryConditions, BoundaryKind,
};
use crate::physics::event::EventKind;
use crate::physics::model::Model;
use crate::physics::parameters::ParameterSource;
use crate::physics::variables::Key;
use discrete::{DiscreteGraph, NodeIndex};
use finite_volume as fv;
use geometry::Geometry;
use mesh::{Mesh, SubMeshSpec};

/// Where the entries of a lowered array live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// Cell centres.
    Nodes,
    /// Every cell boundary, including the two domain ends.
    Edges,
    /// Cell boundaries between two nodes only.
    InteriorEdges,
}

/// A lowered expression: its root in the discrete graph and its length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscreteSymbol {
    pub root: NodeIndex,
    pub len: usize,
    pub location: Location,
}

impl DiscreteSymbol {
    fn nodes(root: NodeIndex, len: usize) -> Self {
        Self {
            root,
            len,
            location: Location::Nodes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscretizationOptions {
    /// Run the algebraic simplification pass before lowering.
    pub simplify: bool,
}

impl Default for DiscretizationOptions {
    fn default() -> Self {
        Self { simplify: true }
    }
}

/// Mesh for the standard lithium-ion geometry, with the `whole cell`
/// composite registered.
pub fn lithium_ion_mesh(
    params: &dyn ParameterSource,
    specs: &IndexMap<domain::Domain, SubMeshSpec>,
    default_points: usize,
) -> Result<Mesh, ModelError> {
    let geometry = Geometry::lithium_ion(params)?;
    let mut mesh = Mesh::new(&geometry, specs, default_points)?;
    mesh.add_composite(
        domain::WHOLE_CELL,
        &[
            domain::NEGATIVE_ELECTRODE,
            domain::SEPARATOR,
            domain::POSITIVE_ELECTRODE,
        ],
    )?;
    Ok(mesh)
}

fn level_sizes(mesh: &Mesh, domains: &Domains) -> Result<(usize, usize, usize), ModelError> {
    Ok((
        mesh.level_size(&domains.primary)?,
        mesh.level_size(&domains.secondary)?,
        mesh.level_size(&domains.tertiary)?,
    ))
}

fn total_size(mesh: &Mesh, domains: &Domains) -> Result<usize, ModelError> {
    let (p, s, t) = level_sizes(mesh, domains)?;
    Ok(p * s * t)
}

/// Number of primary slices, i.e. the product of the outer level sizes.
fn outer_size(mesh: &Mesh, domains: &Domains) -> Result<usize, ModelError> {
    let (_, s, t) = level_sizes(mesh, domains)?;
    Ok(s * t)
}

#[derive(Clone, Debug)]
pub struct Discretization {
    mesh: Mesh,
    options: DiscretizationOptions,
}

impl Discretization {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            options: DiscretizationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DiscretizationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn options(&self) -> DiscretizationOptions {
        self.options
    }

    /// Lower every equation, initial condition, event and registered
    /// variable of `model`.
    pub fn process_model(&self, model: &Model) -> Result<DiscretizedModel, ModelError> {
        let mut slices = Vec::new();
        let mut states = HashMap::new();
        let mut offset = 0;
        let differential = model.rhs().keys().map(|v| (v, true));
        let algebraic = model.algebraic().keys().map(|v| (v, false));
        for (var, is_differential) in differential.chain(algebraic) {
            let len = total_size(&self.mesh, &var.domains())?;
            let range = offset..offset + len;
            debug!(variable = %var.name(), start = range.start, len, "state slice");
            states.insert(var.id(), range.clone());
            slices.push(StateSlice {
                name: var.name(),
                variable: var.id(),
                domains: var.domains(),
                range,
                differential: is_differential,
            });
            offset += len;
        }
        let n_states = offset;
        let n_differential = slices
            .iter()
            .filter(|s| s.differential)
            .map(|s| s.range.len())
            .sum();

        let boundary_conditions = if self.options.simplify {
            simplified_conditions(model.boundary_conditions())?
        } else {
            model.boundary_conditions().clone()
        };
        let mut lowering = Lowering {
            mesh: self.mesh.clone(),
            pool: model.pool().clone(),
            graph: DiscreteGraph::new(),
            memo: HashMap::new(),
            active: HashSet::new(),
            states,
            bcs: boundary_conditions,
            simplify: self.options.simplify,
        };

        let mut rhs_roots = Vec::with_capacity(model.rhs().len());
        for (var, eq) in model.rhs() {
            rhs_roots.push(lowering.lower_to(eq, &var.name(), &var.domains())?);
        }
        let mut algebraic_roots = Vec::with_capacity(model.algebraic().len());
        for (var, eq) in model.algebraic() {
            algebraic_roots.push(lowering.lower_to(eq, &var.name(), &var.domains())?);
        }

        let mut initial_state = DVector::zeros(n_states);
        let mut lower_bounds = DVector::from_element(n_states, f64::NEG_INFINITY);
        let mut upper_bounds = DVector::from_element(n_states, f64::INFINITY);
        let zeros = DVector::<f64>::zeros(n_states);
        for var in model.states() {
            let ic = model
                .initial_conditions()
                .get(var)
                .ok_or_else(|| ModelError::MissingInitialCondition(var.name()))?;
            if let Some(dep) = ic.variables().into_iter().next() {
                return Err(ModelError::Configuration(format!(
                    "initial condition for `{}` depends on `{}`",
                    var.name(),
                    model.pool().variable_info(dep).name
                )));
            }
            let root = lowering.lower_to(ic, &var.name(), &var.domains())?;
            let value = lowering.graph.evaluate(&[root], 0.0, &zeros).remove(0);
            let range = lowering.states[&var.id()].clone();
            initial_state.rows_mut(range.start, range.len()).copy_from(&value);
            let (lo, hi) = var.bounds();
            lower_bounds.rows_mut(range.start, range.len()).fill(lo);
            upper_bounds.rows_mut(range.start, range.len()).fill(hi);
        }

        let mut events = Vec::with_capacity(model.events().len());
        for event in model.events() {
            let symbol = lowering.lower(&event.expression)?;
            if symbol.len != 1 {
                return Err(ModelError::shape(
                    event.name.clone(),
                    event.expression.domains(),
                    1,
                    symbol.len,
                ));
            }
            events.push(DiscreteEvent {
                name: event.name.clone(),
                kind: event.kind,
                root: symbol.root,
            });
        }

        let mut outputs = IndexMap::new();
        for (key, expr) in model.variables().iter() {
            outputs.insert(*key, lowering.lower(expr)?);
        }

        info!(
            model = model.name(),
            states = n_states,
            differential = n_differential,
            graph_nodes = lowering.graph.len(),
            events = events.len(),
            "discretised model"
        );

        Ok(DiscretizedModel {
            name: model.name().to_string(),
            lowering,
            slices,
            n_states,
            n_differential,
            rhs_roots,
            algebraic_roots,
            initial_state,
            bounds: (lower_bounds, upper_bounds),
            events,
            outputs,
        })
    }
}

fn simplified_conditions(bcs: &BCRegistry) -> Result<BCRegistry, ModelError> {
    let simplify_bc = |bc: &Option<BoundaryCondition>| {
        bc.as_ref().map(|bc| BoundaryCondition {
            value: simplify(&bc.value),
            kind: bc.kind,
        })
    };
    let mut out = BCRegistry::new();
    for (target, conditions) in bcs.iter() {
        out.add(
            &simplify(target),
            BoundaryConditions {
                left: simplify_bc(&conditions.left),
                right: simplify_bc(&conditions.right),
            },
        )?;
    }
    Ok(out)
}

/// Symbolic-to-discrete lowering state, kept alive so that further
/// expressions can be processed after the model itself.
#[derive(Clone)]
struct Lowering {
    mesh: Mesh,
    pool: ExprPool,
    graph: DiscreteGraph,
    memo: HashMap<NodeId, DiscreteSymbol>,
    active: HashSet<NodeId>,
    states: HashMap<VariableId, Range<usize>>,
    bcs: BCRegistry,
    simplify: bool,
}

impl Lowering {
    fn lower(&mut self, expr: &Expr) -> Result<DiscreteSymbol, ModelError> {
        if !self.pool.same_pool(expr.pool()) {
            return Err(ModelError::Configuration(format!(
                "`{expr}` does not belong to the discretised model"
            )));
        }
        let expr = if self.simplify {
            simplify(expr)
        } else {
            expr.clone()
        };
        self.lower_node(expr.id())
    }

    /// Lower `expr` as the node-valued right-hand side of the quantity `name`.
    fn lower_to(&mut self, expr: &Expr, name: &str, domains: &Domains) -> Result<NodeIndex, ModelError> {
        let symbol = self.lower(expr)?;
        let expected = total_size(&self.mesh, domains)?;
        if symbol.location != Location::Nodes {
            return Err(ModelError::shape(name, domains, expected, symbol.len));
        }
        self.expand(symbol, expected, name, domains)
    }

    /// Broadcast a length-one array to `expected` entries.
    fn expand(
        &mut self,
        symbol: DiscreteSymbol,
        expected: usize,
        name: &str,
        domains: &Domains,
    ) -> Result<NodeIndex, ModelError> {
        if symbol.len == expected {
            Ok(symbol.root)
        } else if symbol.len == 1 {
            Ok(self.graph.matrix(fv::ones(expected), symbol.root))
        } else {
            Err(ModelError::shape(name, domains, expected, symbol.len))
        }
    }

    /// Lower a child that must be node-valued and span its whole domain.
    fn lower_full_nodes(&mut self, id: NodeId) -> Result<DiscreteSymbol, ModelError> {
        let symbol = self.lower_node(id)?;
        let expr = self.pool.expr(id);
        let domains = expr.domains();
        let expected = total_size(&self.mesh, &domains)?;
        if symbol.location != Location::Nodes {
            return Err(ModelError::shape(expr.label(), &domains, expected, symbol.len));
        }
        let root = self.expand(symbol, expected, &expr.label(), &domains)?;
        Ok(DiscreteSymbol::nodes(root, expected))
    }

    fn lower_node(&mut self, id: NodeId) -> Result<DiscreteSymbol, ModelError> {
        if let Some(done) = self.memo.get(&id) {
            return Ok(*done);
        }
        if !self.active.insert(id) {
            return Err(ModelError::Configuration(format!(
                "`{}` depends on itself through its boundary conditions",
                self.pool.expr(id)
            )));
        }
        let result = self.lower_uncached(id);
        self.active.remove(&id);
        let symbol = result?;
        self.memo.insert(id, symbol);
        Ok(symbol)
    }

    fn lower_uncached(&mut self, id: NodeId) -> Result<DiscreteSymbol, ModelError> {
        let expr = self.pool.expr(id);
        let domains = expr.domains();
        match expr.node() {
            Node::Scalar(bits) => Ok(DiscreteSymbol::nodes(
                self.graph.scalar(f64::from_bits(bits)),
                1,
            )),
            Node::Time => Ok(DiscreteSymbol::nodes(self.graph.time(), 1)),
            Node::Variable(var) => {
                let info = self.pool.variable_info(var);
                let range = self
                    .states
                    .get(&var)
                    .cloned()
                    .ok_or_else(|| ModelError::UndeterminedVariable(info.name.clone()))?;
                let expected = total_size(&self.mesh, &domains)?;
                if range.len() != expected {
                    return Err(ModelError::shape(info.name, &domains, expected, range.len()));
                }
                Ok(DiscreteSymbol::nodes(self.graph.state_vector(range), expected))
            }
            Node::SpatialVariable(_) => {
                let sub = self.mesh.combined(&domains.primary)?;
                let repeats = outer_size(&self.mesh, &domains)?;
                let len = sub.npts() * repeats;
                let values = DVector::from_iterator(
                    len,
                    (0..repeats).flat_map(|_| sub.nodes.iter().copied()),
                );
                Ok(DiscreteSymbol::nodes(self.graph.constant(values), len))
            }
            Node::Unary(op, c) => {
                let child = self.lower_node(c)?;
                Ok(DiscreteSymbol {
                    root: self.graph.unary(op, child.root),
                    ..child
                })
            }
            Node::Binary(op, a, b) => self.lower_binary(&expr, op, a, b),
            Node::Gradient(c) => self.lower_gradient(c),
            Node::Divergence(c) => self.lower_divergence(c),
            Node::Integral(c, var) => {
                let child_domains = self.pool.domains(c);
                let over = self.pool.spatial_info(var).domains.primary;
                if child_domains.primary != over {
                    let edges = self.lower_node(c)?;
                    if edges.location == Location::Edges {
                        // Fluxes averaged over an outer level stay on the edges.
                        let (n_primary, _, n_tertiary) = level_sizes(&self.mesh, &child_domains)?;
                        let secondary = self.mesh.combined(&child_domains.secondary)?;
                        let matrix = fv::integral_secondary(&secondary, n_primary + 1, n_tertiary);
                        return Ok(DiscreteSymbol {
                            len: matrix.nrows(),
                            root: self.graph.matrix(matrix, edges.root),
                            location: Location::Edges,
                        });
                    }
                }
                let child = self.lower_full_nodes(c)?;
                let matrix = if child_domains.primary == over {
                    let sub = self.mesh.combined(&child_domains.primary)?;
                    fv::integral_primary(&sub, outer_size(&self.mesh, &child_domains)?)
                } else {
                    let (n_primary, _, n_tertiary) = level_sizes(&self.mesh, &child_domains)?;
                    let secondary = self.mesh.combined(&child_domains.secondary)?;
                    fv::integral_secondary(&secondary, n_primary, n_tertiary)
                };
                let len = matrix.nrows();
                Ok(DiscreteSymbol::nodes(self.graph.matrix(matrix, child.root), len))
            }
            Node::PrimaryBroadcast(c, new) => {
                let child = self.lower_full_nodes(c)?;
                let n_new = self.mesh.level_size(&new)?;
                let root = self
                    .graph
                    .matrix(fv::primary_broadcast(child.len, n_new), child.root);
                Ok(DiscreteSymbol::nodes(root, child.len * n_new))
            }
            Node::SecondaryBroadcast(c, new) => {
                let child = self.lower_full_nodes(c)?;
                let child_domains = self.pool.domains(c);
                let (n_primary, n_outer, n_tertiary) = level_sizes(&self.mesh, &child_domains)?;
                let n_new = self.mesh.level_size(&new)?;
                let matrix = fv::secondary_broadcast(n_primary, n_new, n_outer * n_tertiary);
                let len = matrix.nrows();
                Ok(DiscreteSymbol::nodes(self.graph.matrix(matrix, child.root), len))
            }
            Node::FullBroadcast(c, target) => {
                let child = self.lower_node(c)?;
                let len = total_size(&self.mesh, &target)?;
                if child.len != 1 {
                    return Err(ModelError::shape(expr.label(), &target, 1, child.len));
                }
                Ok(DiscreteSymbol::nodes(
                    self.graph.matrix(fv::ones(len), child.root),
                    len,
                ))
            }
            Node::BoundaryValue(c, side) => self.lower_boundary_value(c, side),
            Node::Concatenation(parts) => {
                let n_total = self.mesh.level_size(&domains.primary)?;
                let repeats = outer_size(&self.mesh, &domains)?;
                let mut offset = 0;
                let mut sum: Option<NodeIndex> = None;
                for part in parts {
                    let lowered = self.lower_full_nodes(part)?;
                    let n_part = self.mesh.level_size(&self.pool.domains(part).primary)?;
                    let scatter = fv::concatenation_scatter(n_part, offset, n_total, repeats);
                    let placed = self.graph.matrix(scatter, lowered.root);
                    sum = Some(match sum {
                        Some(acc) => self.graph.binary(BinaryOp::Add, acc, placed),
                        None => placed,
                    });
                    offset += n_part;
                }
                let root = match sum {
                    Some(root) if offset == n_total => root,
                    _ => {
                        return Err(ModelError::shape(
                            expr.label(),
                            &domains,
                            n_total * repeats,
                            offset * repeats,
                        ))
                    }
                };
                Ok(DiscreteSymbol::nodes(root, n_total * repeats))
            }
            Node::Reduce(op, c) => {
                let child = self.lower_node(c)?;
                Ok(DiscreteSymbol::nodes(self.graph.reduce(op, child.root), 1))
            }
        }
    }

    /// Interpolate a node-valued operand onto the edges of its partner.
    fn align(&mut self, symbol: DiscreteSymbol, id: NodeId, target: Location) -> Result<DiscreteSymbol, ModelError> {
        if symbol.location != Location::Nodes || target == Location::Nodes || symbol.len == 1 {
            return Ok(symbol);
        }
        let domains = self.pool.domains(id);
        let sub = self.mesh.combined(&domains.primary)?;
        let repeats = outer_size(&self.mesh, &domains)?;
        let matrix = match target {
            Location::Edges => fv::node_to_edge(&sub, repeats),
            _ => fv::node_to_interior_edge(&sub, repeats),
        };
        let len = matrix.nrows();
        Ok(DiscreteSymbol {
            root: self.graph.matrix(matrix, symbol.root),
            len,
            location: target,
        })
    }

    fn lower_binary(&mut self, expr: &Expr, op: BinaryOp, a: NodeId, b: NodeId) -> Result<DiscreteSymbol, ModelError> {
        let la = self.lower_node(a)?;
        let lb = self.lower_node(b)?;
        let la = self.align(la, a, lb.location)?;
        let lb = self.align(lb, b, la.location)?;
        let scalar = |s: &DiscreteSymbol| s.len == 1 && s.location == Location::Nodes;
        let mismatch = if scalar(&la) || scalar(&lb) {
            false
        } else {
            la.len != lb.len || la.location != lb.location
        };
        if mismatch {
            return Err(ModelError::shape(
                expr.label(),
                expr.domains(),
                la.len.max(lb.len),
                la.len.min(lb.len),
            ));
        }
        let location = if scalar(&la) { lb.location } else { la.location };
        Ok(DiscreteSymbol {
            root: self.graph.binary(op, la.root, lb.root),
            len: la.len.max(lb.len),
            location,
        })
    }

    /// One boundary value per primary slice.
    fn boundary_data(&mut self, value: &Expr, repeats: usize, target: &Expr) -> Result<NodeIndex, ModelError> {
        let symbol = self.lower_node(value.id())?;
        if symbol.len == repeats {
            Ok(symbol.root)
        } else if symbol.len == 1 {
            Ok(self.graph.matrix(fv::ones(repeats), symbol.root))
        } else {
            Err(ModelError::shape(
                target.label(),
                target.domains().drop_primary(),
                repeats,
                symbol.len,
            ))
        }
    }

    fn lower_gradient(&mut self, c: NodeId) -> Result<DiscreteSymbol, ModelError> {
        let field = self.lower_full_nodes(c)?;
        let child = self.pool.expr(c);
        let domains = child.domains();
        let sub = self.mesh.combined(&domains.primary)?;
        let repeats = outer_size(&self.mesh, &domains)?;
        let n = sub.npts();
        let interior = self
            .graph
            .matrix(fv::gradient_interior(&sub, repeats), field.root);

        let Some(conditions) = self.bcs.find_for(&child).filter(|b| b.is_complete()).cloned() else {
            return Ok(DiscreteSymbol {
                root: interior,
                len: (n - 1) * repeats,
                location: Location::InteriorEdges,
            });
        };
        let mut full = self.graph.matrix(fv::interior_to_edges(n, repeats), interior);
        for side in [Side::Left, Side::Right] {
            let Some(bc) = conditions.get(side) else {
                continue;
            };
            let value = self.boundary_data(&bc.value, repeats, &child)?;
            let slope = match bc.kind {
                BoundaryKind::Neumann => value,
                BoundaryKind::Dirichlet => {
                    let near = self
                        .graph
                        .matrix(fv::boundary_node_select(n, side, repeats), field.root);
                    let h = self.graph.scalar(fv::boundary_half_width(&sub, side));
                    let diff = match side {
                        Side::Left => self.graph.binary(BinaryOp::Sub, near, value),
                        Side::Right => self.graph.binary(BinaryOp::Sub, value, near),
                    };
                    self.graph.binary(BinaryOp::Div, diff, h)
                }
            };
            let placed = self
                .graph
                .matrix(fv::boundary_edge_scatter(n, side, repeats), slope);
            full = self.graph.binary(BinaryOp::Add, full, placed);
        }
        Ok(DiscreteSymbol {
            root: full,
            len: (n + 1) * repeats,
            location: Location::Edges,
        })
    }

    fn lower_divergence(&mut self, c: NodeId) -> Result<DiscreteSymbol, ModelError> {
        let flux = self.lower_node(c)?;
        let child = self.pool.expr(c);
        let domains = child.domains();
        let sub = self.mesh.combined(&domains.primary)?;
        let repeats = outer_size(&self.mesh, &domains)?;
        let n = sub.npts();
        let edges = match flux.location {
            Location::Edges => flux.root,
            Location::Nodes => {
                return Err(ModelError::domain(format!(
                    "cannot take the divergence of node-valued `{child}`"
                )))
            }
            Location::InteriorEdges => {
                let conditions = match self.bcs.find_for(&child) {
                    Some(b) if b.is_complete() => b.clone(),
                    own => {
                        let field = transported_field(&child);
                        let registered = self.bcs.find_for(&field).or(own);
                        return Err(ModelError::MissingBoundaryCondition {
                            variable: field.label(),
                            side: describe_missing(registered),
                        });
                    }
                };
                let mut full = self.graph.matrix(fv::interior_to_edges(n, repeats), flux.root);
                for side in [Side::Left, Side::Right] {
                    let Some(bc) = conditions.get(side) else {
                        continue;
                    };
                    if bc.kind == BoundaryKind::Dirichlet {
                        return Err(ModelError::Configuration(format!(
                            "flux `{}` needs a Neumann condition on the {side}, found Dirichlet",
                            child.label()
                        )));
                    }
                    let value = self.boundary_data(&bc.value, repeats, &child)?;
                    let placed = self
                        .graph
                        .matrix(fv::boundary_edge_scatter(n, side, repeats), value);
                    full = self.graph.binary(BinaryOp::Add, full, placed);
                }
                full
            }
        };
        let root = self.graph.matrix(fv::divergence(&sub, repeats), edges);
        Ok(DiscreteSymbol::nodes(root, n * repeats))
    }

    fn lower_boundary_value(&mut self, c: NodeId, side: Side) -> Result<DiscreteSymbol, ModelError> {
        let field = self.lower_full_nodes(c)?;
        let child = self.pool.expr(c);
        let domains = child.domains();
        let sub = self.mesh.combined(&domains.primary)?;
        let repeats = outer_size(&self.mesh, &domains)?;
        let dirichlet = self
            .bcs
            .find_for(&child)
            .and_then(|b| b.get(side))
            .filter(|bc| bc.kind == BoundaryKind::Dirichlet)
            .map(|bc| bc.value.clone());
        let root = match dirichlet {
            Some(value) => self.boundary_data(&value, repeats, &child)?,
            None => self
                .graph
                .matrix(fv::extrapolate_boundary(&sub, side, repeats), field.root),
        };
        Ok(DiscreteSymbol::nodes(root, repeats))
    }
}

/// The operand of the first gradient inside a flux, or the flux itself when
/// it has none.
fn transported_field(flux: &Expr) -> Expr {
    let mut stack = vec![flux.clone()];
    while let Some(e) = stack.pop() {
        if let Node::Gradient(_) = e.node() {
            if let Some(field) = e.children().into_iter().next() {
                return field;
            }
        }
        stack.extend(e.children());
    }
    flux.clone()
}

/// Position of one state variable in the flattened state vector.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSlice {
    pub name: String,
    pub variable: VariableId,
    pub domains: Domains,
    pub range: Range<usize>,
    pub differential: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiscreteEvent {
    pub name: String,
    pub kind: EventKind,
    root: NodeIndex,
}

/// The solver-facing form of a model: pure functions of `(t, y)`.
///
/// Differential states come first in `y`, algebraic states after them.
#[derive(Clone)]
pub struct DiscretizedModel {
    name: String,
    lowering: Lowering,
    slices: Vec<StateSlice>,
    n_states: usize,
    n_differential: usize,
    rhs_roots: Vec<NodeIndex>,
    algebraic_roots: Vec<NodeIndex>,
    initial_state: DVector<f64>,
    bounds: (DVector<f64>, DVector<f64>),
    events: Vec<DiscreteEvent>,
    outputs: IndexMap<Key, DiscreteSymbol>,
}

impl DiscretizedModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.n_states
    }

    pub fn is_empty(&self) -> bool {
        self.n_states == 0
    }

    pub fn n_differential(&self) -> usize {
        self.n_differential
    }

    pub fn n_algebraic(&self) -> usize {
        self.n_states - self.n_differential
    }

    pub fn state_slices(&self) -> &[StateSlice] {
        &self.slices
    }

    pub fn slice(&self, name: &str) -> Option<&StateSlice> {
        self.slices.iter().find(|s| s.name == name)
    }

    pub fn mesh(&self) -> &Mesh {
        &self.lowering.mesh
    }

    pub fn graph(&self) -> &DiscreteGraph {
        &self.lowering.graph
    }

    pub fn initial_state(&self) -> &DVector<f64> {
        &self.initial_state
    }

    /// Lower and upper bounds of every state entry.
    pub fn bounds(&self) -> (&DVector<f64>, &DVector<f64>) {
        (&self.bounds.0, &self.bounds.1)
    }

    /// Diagonal mass matrix: one on differential states, zero on algebraic ones.
    pub fn mass_matrix(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.n_states, self.n_states);
        for i in 0..self.n_differential {
            coo.push(i, i, 1.0);
        }
        CsrMatrix::from(&coo)
    }

    /// Differential right-hand sides followed by algebraic residuals.
    pub fn rhs_algebraic<T>(&self, t: f64, y: &DVector<T>) -> DVector<T>
    where
        T: nalgebra::Scalar + DualNum<f64> + num_traits::Zero,
    {
        let roots: Vec<NodeIndex> = self
            .rhs_roots
            .iter()
            .chain(&self.algebraic_roots)
            .copied()
            .collect();
        let values = self.lowering.graph.evaluate(&roots, t, y);
        DVector::from_iterator(
            self.n_states,
            values.iter().flat_map(|v| v.iter().cloned().collect::<Vec<_>>()),
        )
    }

    pub fn rhs(&self, t: f64, y: &DVector<f64>) -> DVector<f64> {
        let values = self.lowering.graph.evaluate(&self.rhs_roots, t, y);
        DVector::from_iterator(
            self.n_differential,
            values.iter().flat_map(|v| v.iter().copied()),
        )
    }

    pub fn algebraic(&self, t: f64, y: &DVector<f64>) -> DVector<f64> {
        let values = self.lowering.graph.evaluate(&self.algebraic_roots, t, y);
        DVector::from_iterator(
            self.n_algebraic(),
            values.iter().flat_map(|v| v.iter().copied()),
        )
    }

    /// Implicit residual `M ydot - F(t, y)` with the sign of the algebraic
    /// block kept as registered.
    pub fn residual(&self, t: f64, y: &DVector<f64>, ydot: &DVector<f64>) -> DVector<f64> {
        let f = self.rhs_algebraic(t, y);
        DVector::from_iterator(
            self.n_states,
            (0..self.n_states).map(|i| {
                if i < self.n_differential {
                    ydot[i] - f[i]
                } else {
                    f[i]
                }
            }),
        )
    }

    /// Dense Jacobian of [`DiscretizedModel::rhs_algebraic`] with respect to `y`.
    pub fn jacobian(&self, t: f64, y: &DVector<f64>) -> DMatrix<f64> {
        let (_, jac) = jacobian(
            |arg: DVector<DualDVec64>| self.rhs_algebraic(t, &arg),
            y.clone(),
        );
        jac
    }

    /// Jacobian with structural zeros dropped.
    pub fn jacobian_sparse(&self, t: f64, y: &DVector<f64>) -> CsrMatrix<f64> {
        let dense = self.jacobian(t, y);
        let mut coo = CooMatrix::new(dense.nrows(), dense.ncols());
        for j in 0..dense.ncols() {
            for i in 0..dense.nrows() {
                let v = dense[(i, j)];
                if v != 0.0 {
                    coo.push(i, j, v);
                }
            }
        }
        CsrMatrix::from(&coo)
    }

    pub fn events(&self) -> &[DiscreteEvent] {
        &self.events
    }

    /// Value of every event expression, in registration order.
    pub fn event_values(&self, t: f64, y: &DVector<f64>) -> Vec<f64> {
        let roots: Vec<NodeIndex> = self.events.iter().map(|e| e.root).collect();
        self.lowering
            .graph
            .evaluate(&roots, t, y)
            .into_iter()
            .map(|v| v[0])
            .collect()
    }

    pub fn output_keys(&self) -> impl Iterator<Item = &Key> {
        self.outputs.keys()
    }

    /// Evaluate a registered model variable.
    pub fn output(&self, key: Key, t: f64, y: &DVector<f64>) -> Result<DVector<f64>, ModelError> {
        let symbol = self
            .outputs
            .get(&key)
            .ok_or_else(|| ModelError::DependencyLookup {
                key: key.to_string(),
                requested_by: "output".to_string(),
            })?;
        Ok(self.evaluate(symbol, t, y))
    }

    /// Lower an additional expression built on the model's pool.
    pub fn process_symbol(&mut self, expr: &Expr) -> Result<DiscreteSymbol, ModelError> {
        self.lowering.lower(expr)
    }

    pub fn evaluate(&self, symbol: &DiscreteSymbol, t: f64, y: &DVector<f64>) -> DVector<f64> {
        self.lowering.graph.evaluate(&[symbol.root], t, y).remove(0)
    }

    pub fn evaluate_symbol(&mut self, expr: &Expr, t: f64, y: &DVector<f64>) -> Result<DVector<f64>, ModelError> {
        let symbol = self.process_symbol(expr)?;
        Ok(self.evaluate(&symbol, t, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::domain::*;
    use crate::expression::{div, grad, integral};
    use approx::assert_relative_eq;
    use generator::SubMeshType;
    use geometry::CoordSys;
    use mesh::SubMesh;

    fn line_mesh(n: usize, coord_sys: CoordSys) -> Mesh {
        let sub = SubMeshType::Uniform.generate((0.0, 1.0), n, coord_sys).unwrap();
        Mesh::from_submeshes([(Domain::new(NEGATIVE_PARTICLE), sub)])
    }

    fn lowering(mesh: Mesh, pool: &ExprPool, states: &[(VariableId, Range<usize>)], bcs: BCRegistry) -> Lowering {
        Lowering {
            mesh,
            pool: pool.clone(),
            graph: DiscreteGraph::new(),
            memo: HashMap::new(),
            active: HashSet::new(),
            states: states.iter().cloned().collect(),
            bcs,
            simplify: false,
        }
    }

    #[test]
    fn neumann_gradient_spans_every_edge() {
        let pool = ExprPool::new();
        let c = pool
            .variable("c", Domains::primary(&[NEGATIVE_PARTICLE]))
            .unwrap();
        let mut bcs = BCRegistry::new();
        bcs.add(
            c.expr(),
            BoundaryConditions::new(
                BoundaryCondition::neumann(pool.scalar(0.0)),
                BoundaryCondition::neumann(pool.scalar(2.0)),
            ),
        )
        .unwrap();
        let mut low = lowering(line_mesh(4, CoordSys::Cartesian), &pool, &[(c.id(), 0..4)], bcs);
        let g = low.lower(&grad(c.expr()).unwrap()).unwrap();
        assert_eq!(g.location, Location::Edges);
        assert_eq!(g.len, 5);
        let y = DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let out = low.graph.evaluate(&[g.root], 0.0, &y).remove(0);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[2], 4.0, epsilon = 1e-12);
        assert_relative_eq!(out[4], 2.0);
    }

    #[test]
    fn dirichlet_gradient_uses_the_half_cell() {
        let pool = ExprPool::new();
        let c = pool
            .variable("c", Domains::primary(&[NEGATIVE_PARTICLE]))
            .unwrap();
        let mut bcs = BCRegistry::new();
        bcs.add(
            c.expr(),
            BoundaryConditions::new(
                BoundaryCondition::dirichlet(pool.scalar(0.0)),
                BoundaryCondition::dirichlet(pool.scalar(1.0)),
            ),
        )
        .unwrap();
        let mut low = lowering(line_mesh(4, CoordSys::Cartesian), &pool, &[(c.id(), 0..4)], bcs);
        let g = low.lower(&grad(c.expr()).unwrap()).unwrap();
        // u = x sampled at the nodes has unit slope everywhere.
        let y = DVector::from_vec(vec![0.125, 0.375, 0.625, 0.875]);
        let out = low.graph.evaluate(&[g.root], 0.0, &y).remove(0);
        for v in out.iter() {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn divergence_of_interior_flux_needs_flux_conditions() {
        let pool = ExprPool::new();
        let c = pool
            .variable("c", Domains::primary(&[NEGATIVE_PARTICLE]))
            .unwrap();
        let flux = -grad(c.expr()).unwrap();
        let mut low = lowering(
            line_mesh(4, CoordSys::Cartesian),
            &pool,
            &[(c.id(), 0..4)],
            BCRegistry::new(),
        );
        let err = low.lower(&div(&flux).unwrap()).unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingBoundaryCondition {
                variable: "c".into(),
                side: "left and right".into(),
            }
        );

        let mut left_only = BCRegistry::new();
        left_only
            .add(
                c.expr(),
                BoundaryConditions {
                    left: Some(BoundaryCondition::neumann(pool.scalar(0.0))),
                    right: None,
                },
            )
            .unwrap();
        let mut low = lowering(
            line_mesh(4, CoordSys::Cartesian),
            &pool,
            &[(c.id(), 0..4)],
            left_only,
        );
        let err = low.lower(&div(&flux).unwrap()).unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingBoundaryCondition {
                variable: "c".into(),
                side: "right".into(),
            }
        );

        let mut bcs = BCRegistry::new();
        bcs.add(
            &flux,
            BoundaryConditions::new(
                BoundaryCondition::neumann(pool.scalar(0.0)),
                BoundaryCondition::neumann(pool.scalar(0.0)),
            ),
        )
        .unwrap();
        let mut low = lowering(line_mesh(4, CoordSys::Cartesian), &pool, &[(c.id(), 0..4)], bcs);
        let d = low.lower(&div(&flux).unwrap()).unwrap();
        let y = DVector::from_element(4, 0.3);
        let out = low.graph.evaluate(&[d.root], 0.0, &y).remove(0);
        assert!(out.iter().all(|v| v.abs() < 1e-14));
    }

    #[test]
    fn spherical_integral_of_a_constant_is_the_ball_volume() {
        let pool = ExprPool::new();
        let domains = Domains::primary(&[NEGATIVE_PARTICLE]);
        let c = pool.variable("c", domains.clone()).unwrap();
        let r = pool.spatial_variable("r_n", domains).unwrap();
        let mut low = lowering(
            line_mesh(10, CoordSys::SphericalPolar),
            &pool,
            &[(c.id(), 0..10)],
            BCRegistry::new(),
        );
        let i = low.lower(&integral(c.expr(), &r).unwrap()).unwrap();
        let out = low
            .graph
            .evaluate(&[i.root], 0.0, &DVector::from_element(10, 1.0))
            .remove(0);
        assert_relative_eq!(out[0], 4.0 * std::f64::consts::PI / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn secondary_sizes_multiply_into_the_layout() {
        let pool = ExprPool::new();
        let sub = SubMeshType::Uniform
            .generate((0.0, 1.0), 3, CoordSys::SphericalPolar)
            .unwrap();
        let mesh = Mesh::from_submeshes([
            (Domain::new(POSITIVE_PARTICLE), sub),
            (Domain::new(CURRENT_COLLECTOR), SubMesh::point()),
        ]);
        let domains = Domains::of(&[POSITIVE_PARTICLE], &[CURRENT_COLLECTOR], &[]).unwrap();
        assert_eq!(total_size(&mesh, &domains).unwrap(), 3);
        let c = pool.variable("c", domains).unwrap();
        let mut low = lowering(mesh, &pool, &[(c.id(), 0..2)], BCRegistry::new());
        assert!(matches!(
            low.lower(c.expr()),
            Err(ModelError::Shape { expected: 3, found: 2, .. })
        ));
    }
}
