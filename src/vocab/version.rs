use crate::prelude::*;

// Parsing, normalization, and the PEP 440 total order all come from the
// 'pep440' crate; this newtype is where the handful of extra helpers the
// resolver needs get to live.

#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Debug,
    Hash,
    SerializeDisplay,
    DeserializeFromStr,
)]
pub struct Version(pub pep440::Version);

pub static VERSION_ZERO: Lazy<Version> = Lazy::new(|| "0a0.dev0".try_into().unwrap());

// A stand-in for the top of the order, which PEP 440 doesn't actually have.
// Nothing published to a real index sorts above this.
pub static VERSION_INFINITY: Lazy<Version> = Lazy::new(|| {
    Version(pep440::Version {
        epoch: u32::MAX,
        release: vec![u32::MAX, u32::MAX, u32::MAX],
        pre: None,
        post: Some(u32::MAX),
        dev: None,
        local: vec![],
    })
});

impl Version {
    pub fn is_prerelease(&self) -> bool {
        // .devN suffixes sort below their release just like alphas and betas
        // do, so they count as pre-releases here too
        matches!(
            (&self.0.pre, &self.0.dev),
            (Some(_), _) | (_, Some(_))
        )
    }

    /// The `python_version` marker binding: the first two release segments.
    pub fn x_y(&self) -> String {
        self.0
            .release
            .iter()
            .take(2)
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The immediate successor in the PEP 440 order, used to express the
    /// comparison operators as half-open ranges.
    ///
    /// PEP 440's suffix grammar (see the "summary of permitted suffixes and
    /// relative ordering" section) pins this down: a `.devN` admits nothing
    /// before `.dev(N+1)`, a bare `.postN` admits nothing before
    /// `.post(N+1)`, and every other form admits a `.post0.dev0` tacked
    /// directly onto it.
    pub fn next(&self) -> Version {
        let mut bumped = self.0.clone();
        if let Some(dev) = bumped.dev {
            bumped.dev = Some(dev + 1);
        } else if let Some(post) = bumped.post {
            bumped.post = Some(post + 1);
        } else {
            bumped.post = Some(0);
            bumped.dev = Some(0);
        }
        Version(bumped)
    }
}

impl TryFrom<&str> for Version {
    type Error = eyre::Report;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match pep440::Version::parse(value) {
            Some(parsed) => Ok(Version(parsed)),
            None => Err(eyre!("not a valid PEP 440 version: {:?}", value)),
        }
    }
}

try_from_str_boilerplate!(Version);

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(s: &str) -> Version {
        s.try_into().unwrap()
    }

    #[test]
    fn test_ordering() {
        assert!(v("1.0") < v("1.1"));
        assert!(v("1.0a1") < v("1.0b1"));
        assert!(v("1.0b1") < v("1.0rc1"));
        assert!(v("1.0rc1") < v("1.0"));
        assert!(v("1.0.dev1") < v("1.0a1"));
        assert!(v("1.0") < v("1.0.post1"));
        assert!(v("2.0") < v("1!0.5"));
    }

    #[test]
    fn test_equality_is_normalized() {
        assert_eq!(v("1.0"), v("1.00"));
        assert_eq!(v("01.0"), v("1.0"));
        assert_ne!(v("1.0"), v("1.0.post0"));
    }

    #[test]
    fn test_prerelease() {
        assert!(v("1.0a1").is_prerelease());
        assert!(v("1.0.dev3").is_prerelease());
        assert!(!v("1.0").is_prerelease());
        assert!(!v("1.0.post1").is_prerelease());
    }

    #[test]
    fn test_next_is_strictly_between() {
        for s in ["1.0", "1.0.post0", "1.0a1", "1.0.dev0"] {
            let version = v(s);
            assert!(version < version.next(), "{}", s);
        }
        // 1.0 < 1.0.post0.dev0 < 1.0.post0
        assert!(v("1.0").next() < v("1.0.post0"));
    }

    #[test]
    fn test_x_y() {
        assert_eq!(v("3.10.2").x_y(), "3.10");
        assert_eq!(v("3.10").x_y(), "3.10");
        assert_eq!(v("3").x_y(), "3");
    }

    #[test]
    fn test_bounds() {
        assert!(*VERSION_ZERO < v("0"));
        assert!(v("999999.999999") < *VERSION_INFINITY);
    }
}
