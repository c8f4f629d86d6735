//! Algebraic simplification of expression DAGs.
//!
//! The rewrite never changes the domains of a node, so a simplified tree can be
//! discretised exactly like the original and evaluates to the same values.

use std::collections::HashMap;

use super::{BinaryOp, Expr, ExprPool, Node, NodeId, ReduceOp, UnaryOp};

/// Return a simplified copy of `expr`. Shared subexpressions stay shared.
pub fn simplify(expr: &Expr) -> Expr {
    let mut memo = HashMap::new();
    let id = simplify_node(expr.pool(), expr.id(), &mut memo);
    expr.pool().expr(id)
}

fn simplify_node(pool: &ExprPool, id: NodeId, memo: &mut HashMap<NodeId, NodeId>) -> NodeId {
    if let Some(done) = memo.get(&id) {
        return *done;
    }
    let node = pool.node(id);
    let domains = pool.domains(id);
    let mut child = |c: NodeId| simplify_node(pool, c, memo);

    let out = match node {
        Node::Scalar(_) | Node::Time | Node::Variable(_) | Node::SpatialVariable(_) => id,
        Node::Unary(op, c) => {
            let c = child(c);
            unary(pool, op, c).unwrap_or_else(|| pool.intern(Node::Unary(op, c), domains).id())
        }
        Node::Binary(op, a, b) => {
            let (a, b) = (child(a), child(b));
            binary(pool, op, a, b)
                .unwrap_or_else(|| pool.intern(Node::Binary(op, a, b), domains).id())
        }
        Node::Reduce(op, c) => {
            let c = child(c);
            match scalar(pool, c) {
                Some(_) => c,
                None => pool.intern(Node::Reduce(op, c), domains).id(),
            }
        }
        Node::Gradient(c) => {
            let c = child(c);
            pool.intern(Node::Gradient(c), domains).id()
        }
        Node::Divergence(c) => {
            let c = child(c);
            pool.intern(Node::Divergence(c), domains).id()
        }
        Node::Integral(c, var) => {
            let c = child(c);
            pool.intern(Node::Integral(c, var), domains).id()
        }
        Node::PrimaryBroadcast(c, d) => {
            let c = child(c);
            pool.intern(Node::PrimaryBroadcast(c, d), domains).id()
        }
        Node::SecondaryBroadcast(c, d) => {
            let c = child(c);
            pool.intern(Node::SecondaryBroadcast(c, d), domains).id()
        }
        Node::FullBroadcast(c, d) => {
            let c = child(c);
            pool.intern(Node::FullBroadcast(c, d), domains).id()
        }
        Node::BoundaryValue(c, side) => {
            let c = child(c);
            pool.intern(Node::BoundaryValue(c, side), domains).id()
        }
        Node::Concatenation(parts) => {
            let parts = parts.into_iter().map(&mut child).collect();
            pool.intern(Node::Concatenation(parts), domains).id()
        }
    };
    memo.insert(id, out);
    out
}

fn scalar(pool: &ExprPool, id: NodeId) -> Option<f64> {
    match pool.node(id) {
        Node::Scalar(bits) => Some(f64::from_bits(bits)),
        _ => None,
    }
}

fn is_domain_free(pool: &ExprPool, id: NodeId) -> bool {
    pool.domains(id).is_empty()
}

pub(crate) fn apply_unary(op: UnaryOp, x: f64) -> f64 {
    match op {
        UnaryOp::Neg => -x,
        UnaryOp::Abs => x.abs(),
        UnaryOp::Exp => x.exp(),
        UnaryOp::Log => x.ln(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Sinh => x.sinh(),
        UnaryOp::Cosh => x.cosh(),
        UnaryOp::Tanh => x.tanh(),
        UnaryOp::Arcsinh => x.asinh(),
    }
}

pub(crate) fn apply_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Pow => a.powf(b),
        BinaryOp::Minimum => a.min(b),
        BinaryOp::Maximum => a.max(b),
    }
}

fn unary(pool: &ExprPool, op: UnaryOp, c: NodeId) -> Option<NodeId> {
    if let Some(v) = scalar(pool, c) {
        return Some(pool.scalar(apply_unary(op, v)).id());
    }
    match (op, pool.node(c)) {
        (UnaryOp::Neg, Node::Unary(UnaryOp::Neg, inner)) => Some(inner),
        _ => None,
    }
}

fn binary(pool: &ExprPool, op: BinaryOp, a: NodeId, b: NodeId) -> Option<NodeId> {
    let (sa, sb) = (scalar(pool, a), scalar(pool, b));
    if let (Some(x), Some(y)) = (sa, sb) {
        return Some(pool.scalar(apply_binary(op, x, y)).id());
    }
    let zero = |v: Option<f64>| v == Some(0.0);
    let one = |v: Option<f64>| v == Some(1.0);
    match op {
        BinaryOp::Add if zero(sa) => Some(b),
        BinaryOp::Add | BinaryOp::Sub if zero(sb) => Some(a),
        BinaryOp::Sub if zero(sa) => Some(pool.expr(b).unary(UnaryOp::Neg).id()),
        BinaryOp::Mul if one(sa) => Some(b),
        BinaryOp::Mul | BinaryOp::Div if one(sb) => Some(a),
        // Folding 0 * x would drop the domains of x.
        BinaryOp::Mul if zero(sa) && is_domain_free(pool, b) => Some(a),
        BinaryOp::Mul if zero(sb) && is_domain_free(pool, a) => Some(b),
        BinaryOp::Pow if one(sb) => Some(a),
        BinaryOp::Pow if zero(sb) && is_domain_free(pool, a) => Some(pool.scalar(1.0).id()),
        _ => None,
    }
}

/// Numerically evaluate a domain-free, variable-free expression.
pub fn evaluate_constant(expr: &Expr, t: f64) -> Option<f64> {
    let pool = expr.pool();
    match expr.node() {
        Node::Scalar(bits) => Some(f64::from_bits(bits)),
        Node::Time => Some(t),
        Node::Unary(op, c) => Some(apply_unary(op, evaluate_constant(&pool.expr(c), t)?)),
        Node::Binary(op, a, b) => Some(apply_binary(
            op,
            evaluate_constant(&pool.expr(a), t)?,
            evaluate_constant(&pool.expr(b), t)?,
        )),
        Node::Reduce(ReduceOp::Min | ReduceOp::Max, c) => evaluate_constant(&pool.expr(c), t),
        _ => None,
    }
}
