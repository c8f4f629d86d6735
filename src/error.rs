use thiserror::Error;

/// Build-time failures. Every variant surfaces before time stepping starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// An operator was applied to an operand living on an incompatible domain.
    #[error("domain error: {0}")]
    Domain(String),

    /// A discretised array does not have the length the mesh implies.
    #[error("shape mismatch for `{name}` on {domain}: expected {expected} entries, found {found}")]
    Shape {
        name: String,
        domain: String,
        expected: usize,
        found: usize,
    },

    #[error("missing {side} boundary condition for `{variable}`")]
    MissingBoundaryCondition { variable: String, side: String },

    /// A coupled variable was read before any submodel registered it.
    #[error("`{requested_by}` requires `{key}`, which has not been registered")]
    DependencyLookup { key: String, requested_by: String },

    #[error("cyclic dependency between submodels: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("`{0}` has more than one governing equation")]
    DuplicateEquation(String),

    #[error("`{0}` appears in the model equations but has no governing equation")]
    UndeterminedVariable(String),

    #[error("no initial condition for `{0}`")]
    MissingInitialCondition(String),

    #[error("mesh error: {0}")]
    Mesh(String),

    #[error("missing parameter `{0}`")]
    MissingParameter(String),

    #[error("invalid model configuration: {0}")]
    Configuration(String),
}

impl ModelError {
    pub(crate) fn domain(msg: impl Into<String>) -> Self {
        ModelError::Domain(msg.into())
    }

    pub(crate) fn shape(
        name: impl Into<String>,
        domain: impl ToString,
        expected: usize,
        found: usize,
    ) -> Self {
        ModelError::Shape {
            name: name.into(),
            domain: domain.to_string(),
            expected,
            found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_dependency_lists_the_chain() {
        let err = ModelError::CyclicDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(
            err.to_string(),
            "cyclic dependency between submodels: a -> b -> a"
        );
    }

    #[test]
    fn shape_error_names_the_offender() {
        let err = ModelError::shape("c_s", "['positive particle']", 20, 19);
        let msg = err.to_string();
        assert!(msg.contains("`c_s`"));
        assert!(msg.contains("positive particle"));
        assert!(msg.contains("expected 20"));
    }
}
