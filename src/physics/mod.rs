pub mod assembly;
pub mod bc;
pub mod context;
pub mod event;
pub mod model;
pub mod parameters;
pub mod variables;

use indexmap::IndexMap;

use crate::error::ModelError;
use crate::expression::{Expr, Variable};
use bc::BCRegistry;
use event::Event;
use variables::{Key, Variables};

/// Governing equations or initial conditions, keyed by variable identity.
pub type Equations = IndexMap<Variable, Expr>;

/// Defines the contract for one physical submodel.
///
/// Assembly calls every method of every submodel in a fixed order: all
/// fundamental stages first, then the coupled stages in dependency order,
/// then equations, boundary conditions, initial conditions and events. The
/// default implementations contribute nothing.
pub trait Submodel {
    fn name(&self) -> &str;

    /// Keys read by [`Submodel::get_coupled_variables`].
    fn requires(&self) -> Vec<Key> {
        Vec::new()
    }

    /// Keys registered by [`Submodel::get_coupled_variables`].
    fn provides(&self) -> Vec<Key> {
        Vec::new()
    }

    /// Declare this submodel's own state variables. Must not read anything
    /// registered by other submodels.
    fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
        Ok(Variables::new())
    }

    /// Derive intermediate quantities from everything registered so far.
    fn get_coupled_variables(&mut self, _variables: &Variables) -> Result<Variables, ModelError> {
        Ok(Variables::new())
    }

    fn set_rhs(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        Ok(Equations::new())
    }

    fn set_algebraic(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        Ok(Equations::new())
    }

    fn set_boundary_conditions(&self, _variables: &Variables) -> Result<BCRegistry, ModelError> {
        Ok(BCRegistry::new())
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> Result<Equations, ModelError> {
        Ok(Equations::new())
    }

    fn set_events(&self, _variables: &Variables) -> Result<Vec<Event>, ModelError> {
        Ok(Vec::new())
    }
}

/// Fetch the variable handle stored by a fundamental stage.
pub(crate) fn declared<'a>(slot: &'a Option<Variable>, owner: &str) -> Result<&'a Variable, ModelError> {
    slot.as_ref().ok_or_else(|| {
        ModelError::Configuration(format!(
            "`{owner}` was asked for equations before declaring its variables"
        ))
    })
}
