use elsa::FrozenMap;

use crate::error::ResolveError;
use crate::prelude::*;
use crate::store::MetadataStore;

/// A release admitted for a constraint context, decorated with the two
/// signals the ordering heuristic cares about.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: PackageName,
    pub version: Version,
    pub version_str: String,
    pub yanked: bool,
    pub vulnerabilities: u32,
}

/// The fixed environment one resolution runs against: the optional target
/// interpreter (with its derived marker bindings) and the top-level
/// pre-release allowance.
#[derive(Debug, Clone, Default)]
pub struct Env {
    python: Option<Version>,
    marker_vars: Option<HashMap<String, String>>,
    allow_prereleases: bool,
}

impl Env {
    pub fn new(python: Option<Version>, allow_prereleases: bool) -> Env {
        let marker_vars = python.as_ref().map(|python| {
            HashMap::from([
                ("python_version".to_owned(), python.x_y()),
                ("python_full_version".to_owned(), python.to_string()),
            ])
        });
        Env {
            python,
            marker_vars,
            allow_prereleases,
        }
    }

    pub fn python(&self) -> Option<&Version> {
        self.python.as_ref()
    }

    pub fn allow_prereleases(&self) -> bool {
        self.allow_prereleases
    }

    /// None means universal mode: no interpreter to judge markers against.
    pub fn marker_vars(&self) -> Option<&HashMap<String, String>> {
        self.marker_vars.as_ref()
    }
}

fn get_or_fill<'a, K, V, F>(
    map: &'a FrozenMap<K, V>,
    key: &K,
    f: F,
) -> Result<&'a V::Target, ResolveError>
where
    K: Eq + std::hash::Hash + Clone,
    F: FnOnce() -> Result<V, ResolveError>,
    V: stable_deref_trait::StableDeref,
{
    if let Some(v) = map.get(key) {
        Ok(v)
    } else {
        Ok(map.insert(key.clone(), f()?))
    }
}

/// Answers "which releases could satisfy this constraint set, in what
/// order". Results are memoized for the lifetime of one resolve call, since
/// MRV scoring asks the same question over and over.
pub struct CandidateProvider<'a> {
    store: &'a dyn MetadataStore,
    env: &'a Env,
    cap: Option<usize>,
    cached: FrozenMap<(PackageName, String), Box<Vec<Candidate>>>,
}

impl<'a> CandidateProvider<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        env: &'a Env,
        cap: Option<usize>,
    ) -> CandidateProvider<'a> {
        CandidateProvider {
            store,
            env,
            cap,
            cached: FrozenMap::new(),
        }
    }

    pub fn env(&self) -> &Env {
        self.env
    }

    pub fn candidates(
        &self,
        name: &PackageName,
        required: &Specifiers,
    ) -> Result<&[Candidate], ResolveError> {
        let key = (name.clone(), required.to_string());
        let candidates = get_or_fill(&self.cached, &key, || {
            self.fetch_candidates(name, required).map(Box::new)
        })?;
        Ok(candidates.as_slice())
    }

    fn fetch_candidates(
        &self,
        name: &PackageName,
        required: &Specifiers,
    ) -> Result<Vec<Candidate>, ResolveError> {
        let raw_versions = self.store.available_versions(name)?;
        trace!(
            "{}: {} recorded versions",
            name.canonical(),
            raw_versions.len()
        );

        let mut candidates = Vec::new();
        for version_str in raw_versions {
            let version = match Version::try_from(version_str.as_str()) {
                Ok(version) => version,
                Err(_) => {
                    warn!(
                        "ignoring unparseable version {:?} of {}",
                        version_str,
                        name.canonical()
                    );
                    continue;
                }
            };
            match required.contains(&version, self.env.allow_prereleases) {
                Ok(true) => {}
                Ok(false) => {
                    trace!("{} {}: rejected by '{}'", name.canonical(), version, required);
                    continue;
                }
                Err(err) => return Err(ResolveError::Spec(err)),
            }
            if let Some(python) = self.env.python() {
                if let Some(requires_python) =
                    self.store.requires_python(name, &version_str)?
                {
                    match requires_python.satisfied_by(python) {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!(
                                "{} {}: requires_python '{}' excludes python {}",
                                name.canonical(),
                                version,
                                requires_python,
                                python
                            );
                            continue;
                        }
                        Err(err) => {
                            // can't judge it, so don't filter on it
                            warn!(
                                "cannot evaluate requires_python of {} {}: {:#}",
                                name.canonical(),
                                version,
                                err
                            );
                        }
                    }
                }
            }
            let yanked = self.store.yanked(name, &version_str)?;
            let vulnerabilities = self.store.vulnerabilities(name, &version_str)?;
            candidates.push(Candidate {
                name: name.clone(),
                version,
                version_str,
                yanked,
                vulnerabilities,
            });
        }

        // newest first, with yanked and risky releases pushed to the back
        candidates.sort_by(|a, b| {
            (a.yanked, a.vulnerabilities > 0, std::cmp::Reverse(&a.version)).cmp(&(
                b.yanked,
                b.vulnerabilities > 0,
                std::cmp::Reverse(&b.version),
            ))
        });

        if let Some(cap) = self.cap {
            candidates.truncate(cap);
        }
        Ok(candidates)
    }

    /// The marker-surviving dependencies of one exact release, parsed and
    /// canonicalized. Unparseable or ill-formed entries are bad metadata
    /// rows: skipped, not fatal.
    pub fn dependencies(
        &self,
        name: &PackageName,
        version: &str,
    ) -> Result<Vec<(PackageName, Specifiers)>, ResolveError> {
        let raw_requirements = self.store.dependencies(name, version)?;
        let mut dependencies = Vec::new();
        for raw in &raw_requirements {
            let requirement = match Requirement::parse(raw) {
                Ok(requirement) => requirement,
                Err(err) => {
                    warn!(
                        "skipping unparseable requirement {:?} of {} {}: {:#}",
                        raw,
                        name.canonical(),
                        version,
                        err
                    );
                    continue;
                }
            };
            if !requirement.extras.is_empty() {
                debug!(
                    "ignoring extras {:?} on {}",
                    requirement.extras,
                    requirement.name.raw()
                );
            }
            if let Err(err) = requirement.specifiers.check() {
                warn!(
                    "skipping ill-formed requirement {:?} of {} {}: {:#}",
                    raw,
                    name.canonical(),
                    version,
                    err
                );
                continue;
            }
            if let Some(marker_expr) = &requirement.env_marker {
                match self.env.marker_vars() {
                    // universal mode: no interpreter to judge against, so
                    // markers are ignored and everything is kept
                    None => {}
                    Some(vars) => {
                        if !marker_expr.eval(vars).unwrap_or(false) {
                            debug!(
                                "dropping {:?} of {} {}: marker is false here",
                                raw,
                                name.canonical(),
                                version
                            );
                            continue;
                        }
                    }
                }
            }
            dependencies.push((requirement.name, requirement.specifiers));
        }
        Ok(dependencies)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{store_with, TestRelease};

    fn name(raw: &str) -> PackageName {
        raw.try_into().unwrap()
    }

    fn any() -> Specifiers {
        Specifiers::any()
    }

    fn version_strings(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.version_str.as_str()).collect()
    }

    #[test]
    fn test_newest_first() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0"),
            TestRelease::new("a", "3.0"),
            TestRelease::new("a", "2.0"),
        ]);
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let candidates = provider.candidates(&name("a"), &any()).unwrap();
        assert_eq!(version_strings(candidates), vec!["3.0", "2.0", "1.0"]);
    }

    #[test]
    fn test_yanked_demoted_but_not_dropped() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0").yanked(),
            TestRelease::new("a", "0.9"),
            TestRelease::new("a", "0.8").yanked(),
        ]);
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let candidates = provider.candidates(&name("a"), &any()).unwrap();
        assert_eq!(version_strings(candidates), vec!["0.9", "1.0", "0.8"]);
    }

    #[test]
    fn test_specifier_filter() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0"),
            TestRelease::new("a", "2.0"),
            TestRelease::new("a", "3.0"),
        ]);
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let required: Specifiers = "< 3, != 1.0".try_into().unwrap();
        let candidates = provider.candidates(&name("a"), &required).unwrap();
        assert_eq!(version_strings(candidates), vec!["2.0"]);
    }

    #[test]
    fn test_interpreter_filter() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0").python(">=3.11"),
            TestRelease::new("a", "0.9").python(">=3.8"),
            TestRelease::new("a", "0.5"),
        ]);
        let env = Env::new(Some("3.10".try_into().unwrap()), false);
        let provider = CandidateProvider::new(&store, &env, None);
        let candidates = provider.candidates(&name("a"), &any()).unwrap();
        assert_eq!(version_strings(candidates), vec!["0.9", "0.5"]);

        // universal mode keeps everything
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let candidates = provider.candidates(&name("a"), &any()).unwrap();
        assert_eq!(version_strings(candidates), vec!["1.0", "0.9", "0.5"]);
    }

    #[test]
    fn test_prerelease_gate() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0a1"),
            TestRelease::new("a", "0.9"),
        ]);
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let candidates = provider.candidates(&name("a"), &any()).unwrap();
        assert_eq!(version_strings(candidates), vec!["0.9"]);

        let env = Env::new(None, true);
        let provider = CandidateProvider::new(&store, &env, None);
        let candidates = provider.candidates(&name("a"), &any()).unwrap();
        assert_eq!(version_strings(candidates), vec!["1.0a1", "0.9"]);

        // a constraint naming a pre-release opts in without the global flag
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let required: Specifiers = ">= 1.0a1".try_into().unwrap();
        let candidates = provider.candidates(&name("a"), &required).unwrap();
        assert_eq!(version_strings(candidates), vec!["1.0a1"]);
    }

    #[test]
    fn test_cap_truncates_after_ordering() {
        let store = store_with(vec![
            TestRelease::new("a", "1.0"),
            TestRelease::new("a", "2.0"),
            TestRelease::new("a", "3.0"),
        ]);
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, Some(2));
        let candidates = provider.candidates(&name("a"), &any()).unwrap();
        assert_eq!(version_strings(candidates), vec!["3.0", "2.0"]);
    }

    #[test]
    fn test_unparseable_versions_skipped() {
        let conn = crate::test_util::blank_connection();
        crate::test_util::insert_raw(&conn, "a", "1.0", None, None, 0);
        crate::test_util::insert_raw(&conn, "a", "best-version-ever", None, None, 0);
        let store = crate::store::SqliteStore::from_connection(conn);
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let candidates = provider.candidates(&name("a"), &any()).unwrap();
        assert_eq!(version_strings(candidates), vec!["1.0"]);
    }

    #[test]
    fn test_dependencies_marker_filtering() {
        let store = store_with(vec![TestRelease::new("a", "1.0")
            .dep("b >= 2")
            .dep("c; python_version < '3'")
            .dep("d; python_version >= '3'")
            .dep("e; extra == 'test'")
            .dep("?!not a requirement")]);

        let env = Env::new(Some("3.10".try_into().unwrap()), false);
        let provider = CandidateProvider::new(&store, &env, None);
        let deps = provider.dependencies(&name("a"), "1.0").unwrap();
        let dep_names: Vec<&str> = deps.iter().map(|(n, _)| n.canonical()).collect();
        assert_eq!(dep_names, vec!["b", "d"]);

        // universal mode ignores markers wholesale
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let deps = provider.dependencies(&name("a"), "1.0").unwrap();
        let dep_names: Vec<&str> = deps.iter().map(|(n, _)| n.canonical()).collect();
        assert_eq!(dep_names, vec!["b", "c", "d", "e"]);
    }

    #[test]
    fn test_candidates_memoized() {
        let store = store_with(vec![TestRelease::new("a", "1.0")]);
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let first = provider.candidates(&name("a"), &any()).unwrap().as_ptr();
        let second = provider.candidates(&name("a"), &any()).unwrap().as_ptr();
        assert_eq!(first, second);
    }
}
