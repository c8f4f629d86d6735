//! Lowered computation graph.
//!
//! The discretisation engine turns the symbolic DAG into a flat list of
//! [`DiscreteNode`]s in which every child has a smaller index than its parent.
//! Evaluation is generic over the scalar type so the same graph produces plain
//! residuals (`f64`) and Jacobians through dual numbers.

use std::ops::Range;
use std::rc::Rc;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use num_dual::DualNum;

use crate::expression::simplify::{apply_binary, apply_unary};
use crate::expression::{BinaryOp, ReduceOp, UnaryOp};

pub type NodeIndex = usize;

#[derive(Clone, Debug)]
pub enum DiscreteNode {
    Constant(DVector<f64>),
    StateVector(Range<usize>),
    Time,
    Matrix(Rc<CsrMatrix<f64>>, NodeIndex),
    Unary(UnaryOp, NodeIndex),
    Binary(BinaryOp, NodeIndex, NodeIndex),
    Reduce(ReduceOp, NodeIndex),
}

impl DiscreteNode {
    fn children(&self) -> Vec<NodeIndex> {
        match self {
            DiscreteNode::Constant(_) | DiscreteNode::StateVector(_) | DiscreteNode::Time => {
                Vec::new()
            }
            DiscreteNode::Matrix(_, c) | DiscreteNode::Unary(_, c) | DiscreteNode::Reduce(_, c) => {
                vec![*c]
            }
            DiscreteNode::Binary(_, a, b) => vec![*a, *b],
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DiscreteGraph {
    nodes: Vec<DiscreteNode>,
    lens: Vec<usize>,
}

impl DiscreteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_len(&self, id: NodeIndex) -> usize {
        self.lens[id]
    }

    pub fn node(&self, id: NodeIndex) -> &DiscreteNode {
        &self.nodes[id]
    }

    pub fn constant_value(&self, id: NodeIndex) -> Option<&DVector<f64>> {
        match &self.nodes[id] {
            DiscreteNode::Constant(v) => Some(v),
            _ => None,
        }
    }

    fn push(&mut self, node: DiscreteNode, len: usize) -> NodeIndex {
        self.nodes.push(node);
        self.lens.push(len);
        self.nodes.len() - 1
    }

    pub fn constant(&mut self, value: DVector<f64>) -> NodeIndex {
        let len = value.len();
        self.push(DiscreteNode::Constant(value), len)
    }

    pub fn scalar(&mut self, value: f64) -> NodeIndex {
        self.constant(DVector::from_element(1, value))
    }

    pub fn state_vector(&mut self, range: Range<usize>) -> NodeIndex {
        let len = range.len();
        self.push(DiscreteNode::StateVector(range), len)
    }

    pub fn time(&mut self) -> NodeIndex {
        self.push(DiscreteNode::Time, 1)
    }

    /// Apply a linear operator. Constant operands are folded immediately.
    pub fn matrix(&mut self, matrix: CsrMatrix<f64>, child: NodeIndex) -> NodeIndex {
        debug_assert_eq!(matrix.ncols(), self.lens[child]);
        if let Some(value) = self.constant_value(child) {
            let folded = csr_mul(&matrix, value);
            return self.constant(folded);
        }
        let len = matrix.nrows();
        self.push(DiscreteNode::Matrix(Rc::new(matrix), child), len)
    }

    pub fn unary(&mut self, op: UnaryOp, child: NodeIndex) -> NodeIndex {
        if let Some(value) = self.constant_value(child) {
            let folded = value.map(|x| apply_unary(op, x));
            return self.constant(folded);
        }
        let len = self.lens[child];
        self.push(DiscreteNode::Unary(op, child), len)
    }

    /// Elementwise binary operator. Operands must have equal length, or one of
    /// them length one.
    pub fn binary(&mut self, op: BinaryOp, a: NodeIndex, b: NodeIndex) -> NodeIndex {
        let len = self.lens[a].max(self.lens[b]);
        if let (Some(x), Some(y)) = (self.constant_value(a), self.constant_value(b)) {
            let folded = zip_broadcast(x, y, |p, q| apply_binary(op, *p, *q));
            return self.constant(folded);
        }
        self.push(DiscreteNode::Binary(op, a, b), len)
    }

    pub fn reduce(&mut self, op: ReduceOp, child: NodeIndex) -> NodeIndex {
        self.push(DiscreteNode::Reduce(op, child), 1)
    }

    /// Evaluate every node reachable from `roots` and return the root values.
    pub fn evaluate<T>(&self, roots: &[NodeIndex], t: f64, y: &DVector<T>) -> Vec<DVector<T>>
    where
        T: nalgebra::Scalar + DualNum<f64> + num_traits::Zero,
    {
        let mut needed = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeIndex> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if !needed[id] {
                needed[id] = true;
                stack.extend(self.nodes[id].children());
            }
        }

        let mut values: Vec<Option<DVector<T>>> = vec![None; self.nodes.len()];
        for id in (0..self.nodes.len()).filter(|id| needed[*id]) {
            let value = {
                let get = |c: NodeIndex| -> &DVector<T> {
                    values[c]
                        .as_ref()
                        .unwrap_or_else(|| unreachable!("child {c} evaluated before parent {id}"))
                };
                match &self.nodes[id] {
                    DiscreteNode::Constant(v) => v.map(|x| T::from(x)),
                    DiscreteNode::StateVector(range) => y.rows(range.start, range.len()).into_owned(),
                    DiscreteNode::Time => DVector::from_element(1, T::from(t)),
                    DiscreteNode::Matrix(m, c) => csr_mul(m, get(*c)),
                    DiscreteNode::Unary(op, c) => get(*c).map(|x| unary_t(*op, &x)),
                    DiscreteNode::Binary(op, a, b) => {
                        if let (BinaryOp::Pow, Some(exponent)) = (op, self.scalar_constant(*b)) {
                            get(*a).map(|x| x.powf(exponent))
                        } else {
                            zip_broadcast(get(*a), get(*b), |p, q| binary_t(*op, p, q))
                        }
                    }
                    DiscreteNode::Reduce(op, c) => {
                        let v = get(*c);
                        let pick = v.iter().cloned().reduce(|acc, x| match op {
                            ReduceOp::Min if x.re() < acc.re() => x,
                            ReduceOp::Max if x.re() > acc.re() => x,
                            _ => acc,
                        });
                        DVector::from_element(1, pick.unwrap_or_else(T::zero))
                    }
                }
            };
            values[id] = Some(value);
        }

        roots
            .iter()
            .map(|r| values[*r].clone().unwrap_or_else(|| DVector::zeros(self.lens[*r])))
            .collect()
    }

    fn scalar_constant(&self, id: NodeIndex) -> Option<f64> {
        match self.constant_value(id) {
            Some(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

/// Sparse matrix times dense vector over any scalar type.
pub fn csr_mul<T>(m: &CsrMatrix<f64>, x: &DVector<T>) -> DVector<T>
where
    T: nalgebra::Scalar + DualNum<f64> + num_traits::Zero,
{
    DVector::from_iterator(
        m.nrows(),
        m.row_iter().map(|row| {
            row.col_indices()
                .iter()
                .zip(row.values())
                .fold(T::zero(), |acc, (j, v)| acc + x[*j].clone() * T::from(*v))
        }),
    )
}

fn zip_broadcast<A, B, T, F>(a: &DVector<A>, b: &DVector<B>, f: F) -> DVector<T>
where
    A: nalgebra::Scalar,
    B: nalgebra::Scalar,
    T: nalgebra::Scalar,
    F: Fn(&A, &B) -> T,
{
    let len = a.len().max(b.len());
    let ia = |i: usize| if a.len() == 1 { 0 } else { i };
    let ib = |i: usize| if b.len() == 1 { 0 } else { i };
    DVector::from_iterator(len, (0..len).map(|i| f(&a[ia(i)], &b[ib(i)])))
}

fn unary_t<T: DualNum<f64> + num_traits::Zero>(op: UnaryOp, x: &T) -> T {
    match op {
        UnaryOp::Neg => T::zero() - x.clone(),
        UnaryOp::Abs => {
            if x.re() < 0.0 {
                T::zero() - x.clone()
            } else {
                x.clone()
            }
        }
        UnaryOp::Exp => x.exp(),
        UnaryOp::Log => x.ln(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Sinh => x.sinh(),
        UnaryOp::Cosh => x.cosh(),
        UnaryOp::Tanh => x.tanh(),
        UnaryOp::Arcsinh => x.asinh(),
    }
}

fn binary_t<T: DualNum<f64>>(op: BinaryOp, a: &T, b: &T) -> T {
    match op {
        BinaryOp::Add => a.clone() + b.clone(),
        BinaryOp::Sub => a.clone() - b.clone(),
        BinaryOp::Mul => a.clone() * b.clone(),
        BinaryOp::Div => a.clone() / b.clone(),
        BinaryOp::Pow => a.powd(b.clone()),
        BinaryOp::Minimum => {
            if b.re() < a.re() {
                b.clone()
            } else {
                a.clone()
            }
        }
        BinaryOp::Maximum => {
            if b.re() > a.re() {
                b.clone()
            } else {
                a.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::finite_volume::ones;
    use approx::assert_relative_eq;
    use num_dual::{jacobian, DualDVec64};

    #[test]
    fn constants_fold_through_operators() {
        let mut g = DiscreteGraph::new();
        let a = g.scalar(2.0);
        let b = g.matrix(ones(3), a);
        let c = g.unary(UnaryOp::Exp, b);
        assert!(g.constant_value(c).is_some());
        assert_eq!(g.node_len(c), 3);
    }

    #[test]
    fn evaluates_state_dependent_expressions() {
        let mut g = DiscreteGraph::new();
        let y = g.state_vector(0..3);
        let two = g.scalar(2.0);
        let sq = g.binary(BinaryOp::Pow, y, two);
        let m = g.reduce(ReduceOp::Max, sq);
        let state = DVector::from_vec(vec![1.0, -3.0, 2.0]);
        let out = g.evaluate(&[sq, m], 0.0, &state);
        assert_eq!(out[0].as_slice(), &[1.0, 9.0, 4.0]);
        assert_eq!(out[1][0], 9.0);
    }

    #[test]
    fn dual_evaluation_gives_the_jacobian() {
        let mut g = DiscreteGraph::new();
        let y = g.state_vector(0..2);
        let e = g.unary(UnaryOp::Exp, y);
        let t = g.time();
        let out = g.binary(BinaryOp::Mul, e, t);
        let y0 = DVector::from_vec(vec![0.0, 1.0]);
        let (value, jac) = jacobian(
            |arg: DVector<DualDVec64>| g.evaluate(&[out], 2.0, &arg).remove(0),
            y0,
        );
        assert_relative_eq!(value[1], 2.0 * 1f64.exp(), epsilon = 1e-12);
        assert_relative_eq!(jac[(0, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(jac[(0, 1)], 0.0);
        assert_relative_eq!(jac[(1, 1)], 2.0 * 1f64.exp(), epsilon = 1e-12);
    }
}
