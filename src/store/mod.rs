use crate::error::StoreError;
use crate::prelude::*;

mod sqlite;

pub use self::sqlite::SqliteStore;

/// Read-only interface over the release metadata table. All name arguments
/// are already canonicalized by the caller; implementations must treat empty
/// strings and the literal token "null" in metadata cells as absent.
pub trait MetadataStore {
    /// Every version string recorded for a package, in no particular order.
    fn available_versions(&self, name: &PackageName) -> Result<Vec<String>, StoreError>;

    /// Raw requirement strings for one exact release. An absent release
    /// yields an empty list.
    fn dependencies(
        &self,
        name: &PackageName,
        version: &str,
    ) -> Result<Vec<String>, StoreError>;

    fn requires_python(
        &self,
        name: &PackageName,
        version: &str,
    ) -> Result<Option<Specifiers>, StoreError>;

    fn yanked(&self, name: &PackageName, version: &str) -> Result<bool, StoreError>;

    /// Risk signal used only for candidate ordering. No query populates this
    /// in the current snapshot format, so the default is zero.
    fn vulnerabilities(
        &self,
        _name: &PackageName,
        _version: &str,
    ) -> Result<u32, StoreError> {
        Ok(0)
    }

    /// True iff at least one recorded version is contained in the set. The
    /// empty set matches any existing package, parseable versions or not.
    fn exists(
        &self,
        name: &PackageName,
        specifiers: &Specifiers,
    ) -> Result<bool, StoreError> {
        let versions = self.available_versions(name)?;
        if specifiers.is_any() {
            return Ok(!versions.is_empty());
        }
        for version_str in &versions {
            let version = match Version::try_from(version_str.as_str()) {
                Ok(version) => version,
                Err(_) => continue,
            };
            if specifiers.satisfied_by(&version).unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
