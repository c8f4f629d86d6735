use indexmap::IndexMap;

use crate::error::ModelError;
use crate::expression::{Expr, Side};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// The value of the field on the boundary.
    Dirichlet,
    /// The outward gradient (or, for a flux, its value) on the boundary.
    Neumann,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryCondition {
    pub value: Expr,
    pub kind: BoundaryKind,
}

impl BoundaryCondition {
    pub fn dirichlet(value: Expr) -> Self {
        Self {
            value,
            kind: BoundaryKind::Dirichlet,
        }
    }

    pub fn neumann(value: Expr) -> Self {
        Self {
            value,
            kind: BoundaryKind::Neumann,
        }
    }
}

/// Conditions on the two ends of the primary domain of one expression.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundaryConditions {
    pub left: Option<BoundaryCondition>,
    pub right: Option<BoundaryCondition>,
}

impl BoundaryConditions {
    pub fn new(left: BoundaryCondition, right: BoundaryCondition) -> Self {
        Self {
            left: Some(left),
            right: Some(right),
        }
    }

    pub fn get(&self, side: Side) -> Option<&BoundaryCondition> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    pub fn missing_sides(&self) -> Vec<Side> {
        [Side::Left, Side::Right]
            .into_iter()
            .filter(|side| self.get(*side).is_none())
            .collect()
    }
}

/// Human-readable list of the sides `conditions` leaves open.
pub fn describe_missing(conditions: Option<&BoundaryConditions>) -> String {
    let sides = conditions.map_or_else(|| vec![Side::Left, Side::Right], |b| b.missing_sides());
    sides
        .iter()
        .map(Side::to_string)
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Boundary conditions keyed by the expression they constrain.
#[derive(Clone, Debug, Default)]
pub struct BCRegistry {
    rules: IndexMap<Expr, BoundaryConditions>,
}

impl BCRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register both sides for `target`. Values must live on the outer
    /// domains of `target` or be domain-free.
    pub fn add(&mut self, target: &Expr, conditions: BoundaryConditions) -> Result<(), ModelError> {
        let expected = target.domains().drop_primary();
        for side in [Side::Left, Side::Right] {
            if let Some(bc) = conditions.get(side) {
                let found = bc.value.domains();
                if !found.is_empty() && found != expected {
                    return Err(ModelError::domain(format!(
                        "{side} boundary value of `{}` lives on {found}, expected {expected}",
                        target.label()
                    )));
                }
            }
        }
        let entry = self.rules.entry(target.clone()).or_default();
        for side in [Side::Left, Side::Right] {
            if let Some(bc) = conditions.get(side) {
                if entry.get(side).is_some() {
                    return Err(ModelError::Configuration(format!(
                        "{side} boundary condition for `{}` registered twice",
                        target.label()
                    )));
                }
                match side {
                    Side::Left => entry.left = Some(bc.clone()),
                    Side::Right => entry.right = Some(bc.clone()),
                }
            }
        }
        Ok(())
    }

    pub fn find_for(&self, target: &Expr) -> Option<&BoundaryConditions> {
        self.rules.get(target)
    }

    pub fn merge(&mut self, other: BCRegistry) -> Result<(), ModelError> {
        for (target, conditions) in other.rules {
            self.add(&target, conditions)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Expr, &BoundaryConditions)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::domain::*;
    use crate::expression::{Domains, ExprPool};

    #[test]
    fn select_bc_by_expression_and_side() {
        let pool = ExprPool::new();
        let c = pool
            .variable(
                "c",
                Domains::of(&[POSITIVE_PARTICLE], &[CURRENT_COLLECTOR], &[]).unwrap(),
            )
            .unwrap();
        let mut reg = BCRegistry::new();
        reg.add(
            c.expr(),
            BoundaryConditions::new(
                BoundaryCondition::neumann(pool.scalar(0.0)),
                BoundaryCondition::dirichlet(pool.scalar(1.0)),
            ),
        )
        .unwrap();
        let rule = reg.find_for(c.expr()).expect("rule not found");
        assert_eq!(rule.get(Side::Right).unwrap().kind, BoundaryKind::Dirichlet);
        assert!(rule.is_complete());
    }

    #[test]
    fn boundary_values_must_live_on_outer_domains() {
        let pool = ExprPool::new();
        let c = pool
            .variable(
                "c",
                Domains::of(&[POSITIVE_PARTICLE], &[CURRENT_COLLECTOR], &[]).unwrap(),
            )
            .unwrap();
        let wrong = pool
            .variable("d", Domains::primary(&[POSITIVE_ELECTRODE]))
            .unwrap();
        let mut reg = BCRegistry::new();
        let err = reg.add(
            c.expr(),
            BoundaryConditions::new(
                BoundaryCondition::neumann(pool.scalar(0.0)),
                BoundaryCondition::neumann(wrong.expr().clone()),
            ),
        );
        assert!(matches!(err, Err(ModelError::Domain(_))));
    }

    #[test]
    fn a_side_cannot_be_set_twice() {
        let pool = ExprPool::new();
        let c = pool
            .variable("c", Domains::primary(&[SEPARATOR]))
            .unwrap();
        let mut reg = BCRegistry::new();
        let left = BoundaryConditions {
            left: Some(BoundaryCondition::neumann(pool.scalar(0.0))),
            right: None,
        };
        reg.add(c.expr(), left.clone()).unwrap();
        assert_eq!(reg.find_for(c.expr()).unwrap().missing_sides(), vec![Side::Right]);
        assert!(reg.add(c.expr(), left).is_err());
    }
}
