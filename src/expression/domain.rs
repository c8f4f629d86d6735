use std::fmt;
use std::sync::Arc;

use crate::error::ModelError;

pub const NEGATIVE_ELECTRODE: &str = "negative electrode";
pub const SEPARATOR: &str = "separator";
pub const POSITIVE_ELECTRODE: &str = "positive electrode";
pub const NEGATIVE_PARTICLE: &str = "negative particle";
pub const POSITIVE_PARTICLE: &str = "positive particle";
pub const NEGATIVE_PARTICLE_SIZE: &str = "negative particle size";
pub const POSITIVE_PARTICLE_SIZE: &str = "positive particle size";
pub const CURRENT_COLLECTOR: &str = "current collector";
pub const WHOLE_CELL: &str = "whole cell";

/// Named spatial region, stored as a shared runtime string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(pub Arc<str>);

impl Domain {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build a domain list from anything iterable over names.
pub fn domain_list<I, S>(names: I) -> Vec<Domain>
where
    I: IntoIterator<Item = S>,
    S: Into<Arc<str>>,
{
    names.into_iter().map(Domain::new).collect()
}

/// The domain hierarchy of an expression.
///
/// `primary` is the innermost (finest) level. `secondary` and `tertiary` index
/// repeated copies of the primary structure, e.g. one particle per electrode
/// location per current-collector point. Each level may be a list of adjacent
/// domains (the whole cell is `[negative electrode, separator, positive electrode]`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Domains {
    pub primary: Vec<Domain>,
    pub secondary: Vec<Domain>,
    pub tertiary: Vec<Domain>,
}

impl Domains {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Construct and validate a hierarchy.
    pub fn new(
        primary: Vec<Domain>,
        secondary: Vec<Domain>,
        tertiary: Vec<Domain>,
    ) -> Result<Self, ModelError> {
        let domains = Self {
            primary,
            secondary,
            tertiary,
        };
        domains.validate()?;
        Ok(domains)
    }

    pub fn primary(names: &[&str]) -> Self {
        Self {
            primary: domain_list(names.iter().copied()),
            ..Self::default()
        }
    }

    /// Shorthand for a validated hierarchy given as string slices.
    pub fn of(primary: &[&str], secondary: &[&str], tertiary: &[&str]) -> Result<Self, ModelError> {
        Self::new(
            domain_list(primary.iter().copied()),
            domain_list(secondary.iter().copied()),
            domain_list(tertiary.iter().copied()),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    fn levels(&self) -> [&Vec<Domain>; 3] {
        [&self.primary, &self.secondary, &self.tertiary]
    }

    pub fn contains(&self, domain: &Domain) -> bool {
        self.levels().iter().any(|level| level.contains(domain))
    }

    /// A level may only be populated if every finer level is, and no domain
    /// may appear twice in the hierarchy.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.primary.is_empty() && !self.secondary.is_empty() {
            return Err(ModelError::domain(format!(
                "secondary domain {:?} without a primary domain",
                names(&self.secondary)
            )));
        }
        if self.secondary.is_empty() && !self.tertiary.is_empty() {
            return Err(ModelError::domain(format!(
                "tertiary domain {:?} without a secondary domain",
                names(&self.tertiary)
            )));
        }
        let mut seen: Vec<&Domain> = Vec::new();
        for domain in self.levels().into_iter().flatten() {
            if seen.contains(&domain) {
                return Err(ModelError::domain(format!(
                    "domain '{domain}' appears more than once in {self}"
                )));
            }
            seen.push(domain);
        }
        Ok(())
    }

    /// Domains of `a op b` for an elementwise operator. Domain-free operands
    /// broadcast; otherwise both sides must agree exactly.
    pub fn combine(a: &Domains, b: &Domains) -> Result<Domains, ModelError> {
        if a.is_empty() {
            return Ok(b.clone());
        }
        if b.is_empty() || a == b {
            return Ok(a.clone());
        }
        Err(ModelError::domain(format!(
            "cannot combine operands on {a} and {b}"
        )))
    }

    /// `PrimaryBroadcast`: `new` becomes the innermost level and every existing
    /// level moves one step outward.
    pub fn primary_broadcast(&self, new: Vec<Domain>) -> Result<Domains, ModelError> {
        if new.is_empty() {
            return Err(ModelError::domain("primary broadcast onto an empty domain"));
        }
        if !self.tertiary.is_empty() {
            return Err(ModelError::domain(format!(
                "cannot primary-broadcast {self}: at most three domain levels are supported"
            )));
        }
        Domains::new(new, self.primary.clone(), self.secondary.clone())
    }

    /// `SecondaryBroadcast`: `new` is inserted between the primary level and
    /// the existing secondary level.
    pub fn secondary_broadcast(&self, new: Vec<Domain>) -> Result<Domains, ModelError> {
        if new.is_empty() {
            return Err(ModelError::domain("secondary broadcast onto an empty domain"));
        }
        if self.primary.is_empty() {
            return Err(ModelError::domain(
                "secondary broadcast needs an operand with a primary domain",
            ));
        }
        if !self.tertiary.is_empty() {
            return Err(ModelError::domain(format!(
                "cannot secondary-broadcast {self}: at most three domain levels are supported"
            )));
        }
        Domains::new(self.primary.clone(), new, self.secondary.clone())
    }

    /// Domains left after collapsing the primary level (integration over it,
    /// or evaluation at one of its boundaries).
    pub fn drop_primary(&self) -> Domains {
        Domains {
            primary: self.secondary.clone(),
            secondary: self.tertiary.clone(),
            tertiary: Vec::new(),
        }
    }

    /// Domains left after collapsing the secondary level.
    pub fn drop_secondary(&self) -> Domains {
        Domains {
            primary: self.primary.clone(),
            secondary: self.tertiary.clone(),
            tertiary: Vec::new(),
        }
    }
}

fn names(level: &[Domain]) -> Vec<&str> {
    level.iter().map(|d| d.name()).collect()
}

impl fmt::Display for Domains {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no domain");
        }
        write!(f, "{:?}", names(&self.primary))?;
        if !self.secondary.is_empty() {
            write!(f, " / {:?}", names(&self.secondary))?;
        }
        if !self.tertiary.is_empty() {
            write!(f, " / {:?}", names(&self.tertiary))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_broadcast_pushes_levels_outward() {
        let base = Domains::of(&[POSITIVE_ELECTRODE], &[CURRENT_COLLECTOR], &[]).unwrap();
        let out = base
            .primary_broadcast(domain_list([POSITIVE_PARTICLE]))
            .unwrap();
        assert_eq!(out.primary, domain_list([POSITIVE_PARTICLE]));
        assert_eq!(out.secondary, domain_list([POSITIVE_ELECTRODE]));
        assert_eq!(out.tertiary, domain_list([CURRENT_COLLECTOR]));
    }

    #[test]
    fn secondary_broadcast_keeps_primary() {
        let base = Domains::of(&[POSITIVE_PARTICLE], &[CURRENT_COLLECTOR], &[]).unwrap();
        let out = base
            .secondary_broadcast(domain_list([POSITIVE_ELECTRODE]))
            .unwrap();
        assert_eq!(out.primary, domain_list([POSITIVE_PARTICLE]));
        assert_eq!(out.secondary, domain_list([POSITIVE_ELECTRODE]));
        assert_eq!(out.tertiary, domain_list([CURRENT_COLLECTOR]));
    }

    #[test]
    fn fourth_level_is_rejected() {
        let full = Domains::of(
            &[POSITIVE_PARTICLE],
            &[POSITIVE_PARTICLE_SIZE],
            &[CURRENT_COLLECTOR],
        )
        .unwrap();
        assert!(matches!(
            full.secondary_broadcast(domain_list([POSITIVE_ELECTRODE])),
            Err(ModelError::Domain(_))
        ));
    }

    #[test]
    fn repeated_domain_is_invalid() {
        assert!(Domains::of(&[POSITIVE_PARTICLE], &[POSITIVE_PARTICLE], &[]).is_err());
        assert!(Domains::of(&[], &[CURRENT_COLLECTOR], &[]).is_err());
    }

    #[test]
    fn combine_broadcasts_domain_free_operands() {
        let a = Domains::primary(&[SEPARATOR]);
        assert_eq!(Domains::combine(&Domains::empty(), &a).unwrap(), a);
        assert!(Domains::combine(&a, &Domains::primary(&[POSITIVE_ELECTRODE])).is_err());
    }
}
