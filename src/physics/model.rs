use super::bc::BCRegistry;
use super::event::Event;
use super::variables::Variables;
use super::Equations;
use crate::expression::{ExprPool, Variable};

/// A frozen, assembled model. Only [`super::assembly::assemble`] creates one.
#[derive(Clone)]
pub struct Model {
    pub(crate) name: String,
    pub(crate) pool: ExprPool,
    pub(crate) variables: Variables,
    pub(crate) rhs: Equations,
    pub(crate) algebraic: Equations,
    pub(crate) boundary_conditions: BCRegistry,
    pub(crate) initial_conditions: Equations,
    pub(crate) events: Vec<Event>,
    pub(crate) submodel_order: Vec<String>,
    pub(crate) citations: Vec<String>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &ExprPool {
        &self.pool
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn rhs(&self) -> &Equations {
        &self.rhs
    }

    pub fn algebraic(&self) -> &Equations {
        &self.algebraic
    }

    pub fn boundary_conditions(&self) -> &BCRegistry {
        &self.boundary_conditions
    }

    pub fn initial_conditions(&self) -> &Equations {
        &self.initial_conditions
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Order in which the coupled stages ran.
    pub fn submodel_order(&self) -> &[String] {
        &self.submodel_order
    }

    pub fn citations(&self) -> &[String] {
        &self.citations
    }

    /// State variables, differential ones first.
    pub fn states(&self) -> impl Iterator<Item = &Variable> {
        self.rhs.keys().chain(self.algebraic.keys())
    }

    pub fn is_dae(&self) -> bool {
        !self.algebraic.is_empty()
    }
}
