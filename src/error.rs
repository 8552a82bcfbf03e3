use crate::prelude::*;
use thiserror::Error;

/// Adapter-level failure. Individual unparseable rows are skipped where they
/// are read; anything that surfaces here aborts the resolution wholesale.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("metadata database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The backtracking signal: a constraint set that admits no candidate. Parent
/// frames catch this and move on to their next candidate; only a Conflict
/// that escapes the root frame is reported to the caller.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub package: PackageName,
    pub constraint: Option<Specifiers>,
    pub message: String,
    pub cause: Option<Box<Conflict>>,
}

impl Conflict {
    pub fn no_versions(package: &PackageName, constraint: &Specifiers) -> Conflict {
        Conflict {
            message: format!(
                "no versions of '{}' are compatible with '{}'",
                package.canonical(),
                constraint
            ),
            package: package.clone(),
            constraint: Some(constraint.clone()),
            cause: None,
        }
    }

    pub fn incompatible_pin(
        package: &PackageName,
        version: &Version,
        dep: &PackageName,
        dep_spec: &Specifiers,
        pinned: &Version,
    ) -> Conflict {
        Conflict {
            message: format!(
                "{} {} requires {} ({}), but {} is already pinned to {}",
                package.canonical(),
                version,
                dep.canonical(),
                dep_spec,
                dep.canonical(),
                pinned
            ),
            package: dep.clone(),
            constraint: Some(dep_spec.clone()),
            cause: None,
        }
    }

    pub fn exhausted(
        package: &PackageName,
        constraint: &Specifiers,
        tried: usize,
        cause: Option<Conflict>,
    ) -> Conflict {
        Conflict {
            message: format!(
                "could not resolve '{}': all {} candidate versions failed",
                package.canonical(),
                tried
            ),
            package: package.clone(),
            constraint: Some(constraint.clone()),
            cause: cause.map(Box::new),
        }
    }
}

impl Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, "; caused by: {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for Conflict {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// Everything that can come out of the engine. Conflicts are the only variant
/// the search recovers from internally.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Conflict(#[from] Conflict),
    #[error("resolution cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Spec(eyre::Report),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_conflict_chain_rendering() {
        let b: PackageName = "B".try_into().unwrap();
        let a: PackageName = "A".try_into().unwrap();
        let leaf = Conflict::no_versions(&b, &"< 2".try_into().unwrap());
        let root = Conflict::exhausted(&a, &Specifiers::any(), 2, Some(leaf));

        insta::assert_snapshot!(
            root.to_string(),
            @"could not resolve 'a': all 2 candidate versions failed; caused by: no versions of 'b' are compatible with '< 2'"
        );
    }

    #[test]
    fn test_conflict_source_chain() {
        use std::error::Error;

        let b: PackageName = "B".try_into().unwrap();
        let a: PackageName = "A".try_into().unwrap();
        let leaf = Conflict::no_versions(&b, &"< 2".try_into().unwrap());
        let root = Conflict::exhausted(&a, &Specifiers::any(), 1, Some(leaf));

        let source = root.source().expect("cause should be exposed as source");
        assert!(source.to_string().contains("no versions of 'b'"));

        let standalone = Conflict::no_versions(&b, &Specifiers::any());
        assert!(standalone.source().is_none());
    }
}
