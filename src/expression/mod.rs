//! Symbolic expression DAG.
//!
//! Nodes live in an [`ExprPool`] arena and are addressed by [`NodeId`] handles.
//! Structurally identical nodes are interned once, so a subexpression shared by
//! several equations is a single node. Nodes are never mutated after creation.
//!
//! Domain rules are checked when a node is built: an operator whose operand
//! lives on the wrong domain fails immediately with [`ModelError::Domain`].

pub mod domain;
mod ops;
pub mod simplify;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub use domain::{domain_list, Domain, Domains};
pub use ops::ExprResult;

use crate::error::ModelError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpatialVariableId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Sinh,
    Cosh,
    Tanh,
    Arcsinh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Minimum,
    Maximum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// One node of the DAG. Children are handles into the same pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    /// Stored as raw bits so that nodes can be hashed.
    Scalar(u64),
    Time,
    Variable(VariableId),
    SpatialVariable(SpatialVariableId),
    Unary(UnaryOp, NodeId),
    Binary(BinaryOp, NodeId, NodeId),
    Gradient(NodeId),
    Divergence(NodeId),
    Integral(NodeId, SpatialVariableId),
    PrimaryBroadcast(NodeId, Vec<Domain>),
    SecondaryBroadcast(NodeId, Vec<Domain>),
    FullBroadcast(NodeId, Domains),
    BoundaryValue(NodeId, Side),
    Concatenation(Vec<NodeId>),
    Reduce(ReduceOp, NodeId),
}

impl Node {
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Node::Scalar(_) | Node::Time | Node::Variable(_) | Node::SpatialVariable(_) => {
                Vec::new()
            }
            Node::Unary(_, c)
            | Node::Gradient(c)
            | Node::Divergence(c)
            | Node::Integral(c, _)
            | Node::PrimaryBroadcast(c, _)
            | Node::SecondaryBroadcast(c, _)
            | Node::FullBroadcast(c, _)
            | Node::BoundaryValue(c, _)
            | Node::Reduce(_, c) => vec![*c],
            Node::Binary(_, a, b) => vec![*a, *b],
            Node::Concatenation(parts) => parts.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VariableInfo {
    pub name: String,
    pub domains: Domains,
    pub bounds: (f64, f64),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpatialVariableInfo {
    pub name: String,
    pub domains: Domains,
}

struct NodeEntry {
    node: Node,
    domains: Domains,
}

#[derive(Default)]
struct PoolInner {
    nodes: Vec<NodeEntry>,
    index: HashMap<Node, NodeId>,
    variables: Vec<VariableInfo>,
    spatial: Vec<SpatialVariableInfo>,
}

/// Arena owning every expression node of one model build.
///
/// Cloning the pool clones the handle, not the nodes.
#[derive(Clone, Default)]
pub struct ExprPool {
    inner: Rc<RefCell<PoolInner>>,
}

impl ExprPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same_pool(&self, other: &ExprPool) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn intern(&self, node: Node, domains: Domains) -> Expr {
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = inner.index.get(&node) {
            return Expr {
                id: *id,
                pool: self.clone(),
            };
        }
        let id = NodeId(inner.nodes.len() as u32);
        inner.index.insert(node.clone(), id);
        inner.nodes.push(NodeEntry { node, domains });
        Expr {
            id,
            pool: self.clone(),
        }
    }

    pub(crate) fn expr(&self, id: NodeId) -> Expr {
        Expr {
            id,
            pool: self.clone(),
        }
    }

    pub fn scalar(&self, value: f64) -> Expr {
        self.intern(Node::Scalar(value.to_bits()), Domains::empty())
    }

    pub fn time(&self) -> Expr {
        self.intern(Node::Time, Domains::empty())
    }

    /// Declare a new state variable. Every call creates a distinct identity,
    /// even when the name repeats.
    pub fn variable(&self, name: impl Into<String>, domains: Domains) -> Result<Variable, ModelError> {
        self.bounded_variable(name, domains, (f64::NEG_INFINITY, f64::INFINITY))
    }

    pub fn bounded_variable(
        &self,
        name: impl Into<String>,
        domains: Domains,
        bounds: (f64, f64),
    ) -> Result<Variable, ModelError> {
        domains.validate()?;
        let name = name.into();
        if bounds.0 > bounds.1 {
            return Err(ModelError::domain(format!(
                "variable `{name}` has empty bounds {bounds:?}"
            )));
        }
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = VariableId(inner.variables.len() as u32);
            inner.variables.push(VariableInfo {
                name,
                domains: domains.clone(),
                bounds,
            });
            id
        };
        let expr = self.intern(Node::Variable(id), domains);
        Ok(Variable { id, expr })
    }

    /// Coordinate along the primary domain of `domains`.
    pub fn spatial_variable(&self, name: impl Into<String>, domains: Domains) -> Result<Expr, ModelError> {
        let name = name.into();
        if domains.is_empty() {
            return Err(ModelError::domain(format!(
                "spatial variable `{name}` needs a primary domain"
            )));
        }
        domains.validate()?;
        let info = SpatialVariableInfo {
            name,
            domains: domains.clone(),
        };
        let id = {
            let mut inner = self.inner.borrow_mut();
            match inner.spatial.iter().position(|s| *s == info) {
                Some(pos) => SpatialVariableId(pos as u32),
                None => {
                    inner.spatial.push(info);
                    SpatialVariableId(inner.spatial.len() as u32 - 1)
                }
            }
        };
        Ok(self.intern(Node::SpatialVariable(id), domains))
    }

    pub fn node(&self, id: NodeId) -> Node {
        self.inner.borrow().nodes[id.index()].node.clone()
    }

    pub fn domains(&self, id: NodeId) -> Domains {
        self.inner.borrow().nodes[id.index()].domains.clone()
    }

    pub fn variable_info(&self, id: VariableId) -> VariableInfo {
        self.inner.borrow().variables[id.0 as usize].clone()
    }

    pub fn spatial_info(&self, id: SpatialVariableId) -> SpatialVariableInfo {
        self.inner.borrow().spatial[id.0 as usize].clone()
    }

    /// The expression node standing for a declared variable.
    pub fn variable_expr(&self, id: VariableId) -> Expr {
        let info = self.variable_info(id);
        self.intern(Node::Variable(id), info.domains)
    }
}

/// Handle to an interned node.
#[derive(Clone)]
pub struct Expr {
    id: NodeId,
    pool: ExprPool,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.pool.same_pool(&other.pool)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr#{}({})", self.id.0, self)
    }
}

impl Expr {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn pool(&self) -> &ExprPool {
        &self.pool
    }

    pub fn node(&self) -> Node {
        self.pool.node(self.id)
    }

    pub fn domains(&self) -> Domains {
        self.pool.domains(self.id)
    }

    pub fn children(&self) -> Vec<Expr> {
        self.node()
            .children()
            .into_iter()
            .map(|c| self.pool.expr(c))
            .collect()
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self.node() {
            Node::Scalar(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<VariableId> {
        match self.node() {
            Node::Variable(id) => Some(id),
            _ => None,
        }
    }

    /// Every state variable reachable from this node.
    pub fn variables(&self) -> BTreeSet<VariableId> {
        let mut found = BTreeSet::new();
        self.walk(|node| {
            if let Node::Variable(id) = node {
                found.insert(*id);
            }
        });
        found
    }

    /// Visit every reachable node exactly once, in no particular order.
    pub fn walk(&self, mut visit: impl FnMut(&Node)) {
        let mut seen = HashSet::new();
        let mut stack = vec![self.id];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.pool.node(id);
            visit(&node);
            stack.extend(node.children());
        }
    }

    /// Human-readable name used in diagnostics: the variable name for a
    /// variable node, the printed form otherwise.
    pub fn label(&self) -> String {
        match self.node() {
            Node::Variable(id) => self.pool.variable_info(id).name,
            _ => self.to_string(),
        }
    }

    fn same_pool_as(&self, other: &Expr) -> Result<(), ModelError> {
        if self.pool.same_pool(&other.pool) {
            Ok(())
        } else {
            Err(ModelError::Configuration(format!(
                "`{self}` and `{other}` belong to different expression pools"
            )))
        }
    }

    pub(crate) fn unary(&self, op: UnaryOp) -> Expr {
        self.pool
            .intern(Node::Unary(op, self.id), self.domains())
    }

    pub(crate) fn binary(&self, op: BinaryOp, rhs: &Expr) -> Result<Expr, ModelError> {
        self.same_pool_as(rhs)?;
        let domains = Domains::combine(&self.domains(), &rhs.domains())?;
        Ok(self
            .pool
            .intern(Node::Binary(op, self.id, rhs.id), domains))
    }

    pub fn abs(&self) -> Expr {
        self.unary(UnaryOp::Abs)
    }

    pub fn exp(&self) -> Expr {
        self.unary(UnaryOp::Exp)
    }

    pub fn ln(&self) -> Expr {
        self.unary(UnaryOp::Log)
    }

    pub fn sqrt(&self) -> Expr {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn sinh(&self) -> Expr {
        self.unary(UnaryOp::Sinh)
    }

    pub fn cosh(&self) -> Expr {
        self.unary(UnaryOp::Cosh)
    }

    pub fn tanh(&self) -> Expr {
        self.unary(UnaryOp::Tanh)
    }

    pub fn arcsinh(&self) -> Expr {
        self.unary(UnaryOp::Arcsinh)
    }

    pub fn pow(&self, exponent: impl Into<Operand>) -> ExprResult {
        let exponent = exponent.into().resolve(&self.pool);
        self.binary(BinaryOp::Pow, &exponent)
    }
}

/// Right-hand operand accepted by the fallible helpers: an expression or a
/// plain number.
pub enum Operand {
    Expr(Expr),
    Number(f64),
}

impl Operand {
    fn resolve(self, pool: &ExprPool) -> Expr {
        match self {
            Operand::Expr(e) => e,
            Operand::Number(v) => pool.scalar(v),
        }
    }
}

impl From<Expr> for Operand {
    fn from(e: Expr) -> Self {
        Operand::Expr(e)
    }
}

impl From<&Expr> for Operand {
    fn from(e: &Expr) -> Self {
        Operand::Expr(e.clone())
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Number(v)
    }
}

/// A declared state variable: identity plus its expression node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variable {
    id: VariableId,
    expr: Expr,
}

impl Variable {
    pub fn id(&self) -> VariableId {
        self.id
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn name(&self) -> String {
        self.expr.pool.variable_info(self.id).name
    }

    pub fn domains(&self) -> Domains {
        self.expr.domains()
    }

    pub fn bounds(&self) -> (f64, f64) {
        self.expr.pool.variable_info(self.id).bounds
    }
}

impl From<&Variable> for Expr {
    fn from(v: &Variable) -> Self {
        v.expr.clone()
    }
}

impl From<Variable> for Expr {
    fn from(v: Variable) -> Self {
        v.expr
    }
}

fn level(domains: impl IntoIterator<Item = Domain>) -> Vec<Domain> {
    domains.into_iter().collect()
}

/// Spatial gradient. The operand must live on a spatial domain.
pub fn grad(expr: &Expr) -> ExprResult {
    let domains = expr.domains();
    if domains.is_empty() {
        return Err(ModelError::domain(format!(
            "cannot take the gradient of `{expr}`, which has no spatial domain"
        )));
    }
    Ok(expr.pool.intern(Node::Gradient(expr.id), domains))
}

/// Spatial divergence. The operand must live on a spatial domain.
pub fn div(expr: &Expr) -> ExprResult {
    let domains = expr.domains();
    if domains.is_empty() {
        return Err(ModelError::domain(format!(
            "cannot take the divergence of `{expr}`, which has no spatial domain"
        )));
    }
    Ok(expr.pool.intern(Node::Divergence(expr.id), domains))
}

/// Definite integral of `expr` over the domain spanned by `var`.
///
/// `var` must be a spatial variable whose primary domain matches either the
/// primary or the secondary domain of `expr`. The integrated level is removed.
pub fn integral(expr: &Expr, var: &Expr) -> ExprResult {
    expr.same_pool_as(var)?;
    let Node::SpatialVariable(var_id) = var.node() else {
        return Err(ModelError::domain(format!(
            "integration variable `{var}` is not a spatial variable"
        )));
    };
    let over = expr.pool.spatial_info(var_id).domains.primary;
    let domains = expr.domains();
    let reduced = if domains.primary == over {
        domains.drop_primary()
    } else if !domains.secondary.is_empty() && domains.secondary == over {
        domains.drop_secondary()
    } else {
        return Err(ModelError::domain(format!(
            "cannot integrate `{expr}` on {domains} with respect to `{var}` on {:?}",
            over.iter().map(|d| d.name()).collect::<Vec<_>>()
        )));
    };
    Ok(expr
        .pool
        .intern(Node::Integral(expr.id, var_id), reduced))
}

/// Replicate `expr` across a new innermost domain.
pub fn primary_broadcast(expr: &Expr, domain: impl IntoIterator<Item = Domain>) -> ExprResult {
    let new = level(domain);
    let domains = expr.domains().primary_broadcast(new.clone())?;
    Ok(expr
        .pool
        .intern(Node::PrimaryBroadcast(expr.id, new), domains))
}

/// Replicate `expr` across a new secondary domain, keeping its primary domain.
pub fn secondary_broadcast(expr: &Expr, domain: impl IntoIterator<Item = Domain>) -> ExprResult {
    let new = level(domain);
    let domains = expr.domains().secondary_broadcast(new.clone())?;
    Ok(expr
        .pool
        .intern(Node::SecondaryBroadcast(expr.id, new), domains))
}

/// Replicate a domain-free expression over a complete hierarchy.
pub fn full_broadcast(expr: &Expr, domains: Domains) -> ExprResult {
    if !expr.domains().is_empty() {
        return Err(ModelError::domain(format!(
            "full broadcast needs a domain-free operand, `{expr}` lives on {}",
            expr.domains()
        )));
    }
    if domains.is_empty() {
        return Err(ModelError::domain("full broadcast onto an empty domain"));
    }
    domains.validate()?;
    Ok(expr
        .pool
        .intern(Node::FullBroadcast(expr.id, domains.clone()), domains))
}

/// Value of `expr` on one boundary of its primary domain.
pub fn boundary_value(expr: &Expr, side: Side) -> ExprResult {
    let domains = expr.domains();
    if domains.is_empty() {
        return Err(ModelError::domain(format!(
            "cannot take the boundary value of `{expr}`, which has no spatial domain"
        )));
    }
    Ok(expr
        .pool
        .intern(Node::BoundaryValue(expr.id, side), domains.drop_primary()))
}

/// Surface value, i.e. the right boundary of the primary domain.
pub fn surf(expr: &Expr) -> ExprResult {
    boundary_value(expr, Side::Right)
}

/// Join expressions living on adjacent primary domains with identical outer levels.
pub fn concatenation(parts: &[Expr]) -> ExprResult {
    let Some(first) = parts.first() else {
        return Err(ModelError::domain("cannot concatenate zero expressions"));
    };
    let first_domains = first.domains();
    let mut primary = Vec::new();
    for part in parts {
        first.same_pool_as(part)?;
        let d = part.domains();
        if d.is_empty() {
            return Err(ModelError::domain(format!(
                "cannot concatenate `{part}`, which has no domain"
            )));
        }
        if d.secondary != first_domains.secondary || d.tertiary != first_domains.tertiary {
            return Err(ModelError::domain(format!(
                "concatenated parts disagree on outer domains: {d} vs {first_domains}"
            )));
        }
        primary.extend(d.primary.iter().cloned());
    }
    let domains = Domains::new(
        primary,
        first_domains.secondary.clone(),
        first_domains.tertiary.clone(),
    )?;
    let ids = parts.iter().map(|p| p.id).collect();
    Ok(first.pool.intern(Node::Concatenation(ids), domains))
}

/// Smallest entry of `expr`, as a domain-free scalar.
pub fn min(expr: &Expr) -> Expr {
    expr.pool
        .intern(Node::Reduce(ReduceOp::Min, expr.id), Domains::empty())
}

/// Largest entry of `expr`, as a domain-free scalar.
pub fn max(expr: &Expr) -> Expr {
    expr.pool
        .intern(Node::Reduce(ReduceOp::Max, expr.id), Domains::empty())
}

/// Elementwise minimum.
pub fn minimum(a: &Expr, b: impl Into<Operand>) -> ExprResult {
    let b = b.into().resolve(&a.pool);
    a.binary(BinaryOp::Minimum, &b)
}

/// Elementwise maximum.
pub fn maximum(a: &Expr, b: impl Into<Operand>) -> ExprResult {
    let b = b.into().resolve(&a.pool);
    a.binary(BinaryOp::Maximum, &b)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let child = |id: NodeId| self.pool.expr(id);
        match self.node() {
            Node::Scalar(bits) => write!(f, "{}", f64::from_bits(bits)),
            Node::Time => f.write_str("t"),
            Node::Variable(id) => f.write_str(&self.pool.variable_info(id).name),
            Node::SpatialVariable(id) => f.write_str(&self.pool.spatial_info(id).name),
            Node::Unary(op, c) => {
                let name = match op {
                    UnaryOp::Neg => return write!(f, "-{}", child(c)),
                    UnaryOp::Abs => "abs",
                    UnaryOp::Exp => "exp",
                    UnaryOp::Log => "log",
                    UnaryOp::Sqrt => "sqrt",
                    UnaryOp::Sinh => "sinh",
                    UnaryOp::Cosh => "cosh",
                    UnaryOp::Tanh => "tanh",
                    UnaryOp::Arcsinh => "arcsinh",
                };
                write!(f, "{name}({})", child(c))
            }
            Node::Binary(op, a, b) => {
                let symbol = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Pow => "**",
                    BinaryOp::Minimum => {
                        return write!(f, "minimum({}, {})", child(a), child(b))
                    }
                    BinaryOp::Maximum => {
                        return write!(f, "maximum({}, {})", child(a), child(b))
                    }
                };
                write!(f, "({} {symbol} {})", child(a), child(b))
            }
            Node::Gradient(c) => write!(f, "grad({})", child(c)),
            Node::Divergence(c) => write!(f, "div({})", child(c)),
            Node::Integral(c, var) => {
                write!(f, "integral({}, d{})", child(c), self.pool.spatial_info(var).name)
            }
            Node::PrimaryBroadcast(c, _) => write!(f, "broadcast({})", child(c)),
            Node::SecondaryBroadcast(c, _) => write!(f, "secondary_broadcast({})", child(c)),
            Node::FullBroadcast(c, _) => write!(f, "full_broadcast({})", child(c)),
            Node::BoundaryValue(c, side) => write!(f, "boundary_value({}, {side})", child(c)),
            Node::Concatenation(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| child(*p).to_string()).collect();
                write!(f, "concatenation({})", parts.join(", "))
            }
            Node::Reduce(ReduceOp::Min, c) => write!(f, "min({})", child(c)),
            Node::Reduce(ReduceOp::Max, c) => write!(f, "max({})", child(c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::domain::*;
    use super::*;
    use crate::error::ModelError;

    fn particle_domains() -> Domains {
        Domains::of(&[POSITIVE_PARTICLE], &[CURRENT_COLLECTOR], &[]).unwrap()
    }

    #[test]
    fn identical_subexpressions_are_interned_once() {
        let pool = ExprPool::new();
        let c = pool.variable("c", particle_domains()).unwrap();
        let a = grad(c.expr()).unwrap();
        let b = grad(c.expr()).unwrap();
        assert_eq!(a, b);
        let before = pool.len();
        let _ = (c.expr() * 2.0).unwrap();
        let _ = (c.expr() * 2.0).unwrap();
        assert_eq!(pool.len(), before + 2);
    }

    #[test]
    fn variables_with_the_same_name_are_distinct() {
        let pool = ExprPool::new();
        let a = pool.variable("c", particle_domains()).unwrap();
        let b = pool.variable("c", particle_domains()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.expr(), b.expr());
    }

    #[test]
    fn gradient_of_a_scalar_fails_at_construction() {
        let pool = ExprPool::new();
        let s = pool.scalar(1.0);
        assert!(matches!(grad(&s), Err(ModelError::Domain(_))));
        assert!(matches!(div(&s), Err(ModelError::Domain(_))));
    }

    #[test]
    fn integral_removes_the_integrated_level() {
        let pool = ExprPool::new();
        let c = pool.variable("c", particle_domains()).unwrap();
        let r = pool
            .spatial_variable("r_p", particle_domains())
            .unwrap();
        let avg = integral(c.expr(), &r).unwrap();
        assert_eq!(avg.domains(), Domains::primary(&[CURRENT_COLLECTOR]));

        let x = pool
            .spatial_variable("x_p", Domains::primary(&[POSITIVE_ELECTRODE]))
            .unwrap();
        assert!(integral(c.expr(), &x).is_err());
    }

    #[test]
    fn broadcasts_preserve_the_variable_set() {
        let pool = ExprPool::new();
        let c = pool
            .variable("c", Domains::primary(&[CURRENT_COLLECTOR]))
            .unwrap();
        let a = primary_broadcast(c.expr(), domain_list([POSITIVE_PARTICLE])).unwrap();
        let a = secondary_broadcast(&a, domain_list([POSITIVE_ELECTRODE])).unwrap();
        assert_eq!(
            a.domains(),
            Domains::of(
                &[POSITIVE_PARTICLE],
                &[POSITIVE_ELECTRODE],
                &[CURRENT_COLLECTOR]
            )
            .unwrap()
        );
        assert_eq!(a.variables(), BTreeSet::from([c.id()]));
    }

    #[test]
    fn concatenation_joins_primary_domains() {
        let pool = ExprPool::new();
        let parts: Vec<Expr> = [NEGATIVE_ELECTRODE, SEPARATOR, POSITIVE_ELECTRODE]
            .iter()
            .map(|d| {
                full_broadcast(
                    &pool.scalar(1.0),
                    Domains::of(&[d], &[CURRENT_COLLECTOR], &[]).unwrap(),
                )
                .unwrap()
            })
            .collect();
        let joined = concatenation(&parts).unwrap();
        assert_eq!(joined.domains().primary.len(), 3);
    }

    #[test]
    fn display_is_readable() {
        let pool = ExprPool::new();
        let c = pool.variable("c", particle_domains()).unwrap();
        let n = (-(c.expr()) * grad(c.expr())).unwrap();
        assert_eq!(n.to_string(), "(-c * grad(c))");
    }
}
