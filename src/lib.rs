//! Symbolic battery models lowered onto finite-volume discretisations.
//!
//! A model is built from submodels ([`physics::Submodel`]) that register
//! variables and equations on a shared expression pool, assembled into a
//! frozen [`physics::model::Model`], and lowered by
//! [`discretization::Discretization`] into residual, Jacobian and event
//! functions of the flattened state vector.

pub mod config;
pub mod discretization;
pub mod error;
pub mod expression;
pub mod models;
pub mod numerics;
pub mod physics;
pub mod processing;

pub use error::ModelError;
