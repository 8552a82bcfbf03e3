use crate::prelude::*;

/// A package name paired with its canonical form: lower-cased, with runs of
/// `-`, `_`, `.` collapsed to a single `-` (PEP 503). Identity (Eq/Hash) is
/// the canonical form only, so "Foo_Bar" and "foo-bar" collide by design.
#[derive(Debug, Clone, DeserializeFromStr, Derivative)]
#[derivative(Hash, PartialEq, Eq)]
pub struct PackageName {
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    raw: String,
    canonical: String,
}

impl PackageName {
    /// The name exactly as it appeared in the input.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The PEP 503 normalized name. All store lookups and map keys use this.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl TryFrom<&str> for PackageName {
    type Error = eyre::Report;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        static NAME_VALIDATE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(?-u)^[A-Za-z0-9_.\-]+$").unwrap());
        // https://www.python.org/dev/peps/pep-0503/#normalized-names
        static NAME_NORMALIZE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"[-_.]+").unwrap());

        if !NAME_VALIDATE.is_match(raw) {
            return Err(eyre!("invalid package name {:?}", raw));
        }

        let mut canonical = NAME_NORMALIZE.replace_all(raw, "-").to_string();
        canonical.make_ascii_lowercase();

        Ok(PackageName {
            raw: raw.to_owned(),
            canonical,
        })
    }
}

try_from_str_boilerplate!(PackageName);
