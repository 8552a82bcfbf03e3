use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::candidates::{Candidate, CandidateProvider};
use crate::error::{Conflict, ResolveError};
use crate::prelude::*;

/// Search counters: steps once per recursive entry, backtracks once per
/// frame that returns without a solution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub steps: u64,
    pub backtracks: u64,
}

/// Caller-initiated abort: an explicit flag, an optional wall-clock
/// deadline, or both. Checked on every recursive entry.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn with_deadline(budget: Duration) -> CancelToken {
        CancelToken {
            flag: Arc::default(),
            deadline: Some(Instant::now() + budget),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }
}

/// The (partial or complete) mapping from packages to chosen releases.
/// Insertion order is what makes the emitted plan deterministic.
pub type Assignment = IndexMap<PackageName, Candidate>;

#[derive(Debug)]
pub enum Outcome {
    Solved(Assignment),
    Conflict(Conflict),
}

#[derive(Debug)]
pub struct Resolution {
    pub outcome: Outcome,
    pub stats: Stats,
}

/// Depth-first backtracking search over (package -> chosen release), with
/// constraint accumulation and MRV variable selection. Each frame works on
/// value snapshots; a failed child leaves its parent untouched.
pub struct Resolver<'a> {
    provider: &'a CandidateProvider<'a>,
    cancel: CancelToken,
    stats: Stats,
}

impl<'a> Resolver<'a> {
    pub fn new(provider: &'a CandidateProvider<'a>, cancel: CancelToken) -> Resolver<'a> {
        Resolver {
            provider,
            cancel,
            stats: Stats::default(),
        }
    }

    /// Runs the search to completion. A conflict that escapes the root frame
    /// is a normal outcome; cancellation and store failures are not.
    pub fn resolve(
        mut self,
        requirements: &IndexMap<PackageName, Specifiers>,
    ) -> Result<Resolution, ResolveError> {
        let constraints: HashMap<PackageName, Specifiers> = requirements
            .iter()
            .map(|(name, specifiers)| (name.clone(), specifiers.clone()))
            .collect();
        let open: Vec<PackageName> = requirements.keys().cloned().collect();

        match self.step(Assignment::new(), constraints, open) {
            Ok(assignment) => Ok(Resolution {
                outcome: Outcome::Solved(assignment),
                stats: self.stats,
            }),
            Err(ResolveError::Conflict(conflict)) => Ok(Resolution {
                outcome: Outcome::Conflict(conflict),
                stats: self.stats,
            }),
            Err(other) => Err(other),
        }
    }

    fn step(
        &mut self,
        assignment: Assignment,
        constraints: HashMap<PackageName, Specifiers>,
        open: Vec<PackageName>,
    ) -> Result<Assignment, ResolveError> {
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        self.stats.steps += 1;

        if open.is_empty() {
            return Ok(assignment);
        }

        let package = self.select_mrv(&open, &constraints)?;
        let remaining: Vec<PackageName> = open
            .iter()
            .filter(|name| **name != package)
            .cloned()
            .collect();

        let universal = Specifiers::any();
        let required = constraints.get(&package).unwrap_or(&universal).clone();

        let candidates = self.provider.candidates(&package, &required)?.to_vec();
        if candidates.is_empty() {
            self.stats.backtracks += 1;
            trace!(
                "dead end: nothing satisfies {} '{}'",
                package.canonical(),
                required
            );
            return Err(Conflict::no_versions(&package, &required).into());
        }

        let mut last_error: Option<Conflict> = None;
        for candidate in &candidates {
            trace!("trying {} {}", package.canonical(), candidate.version);
            match self.try_candidate(&package, candidate, &assignment, &constraints, &remaining)
            {
                Ok(solution) => return Ok(solution),
                Err(ResolveError::Conflict(conflict)) => {
                    trace!(
                        "{} {} failed: {}",
                        package.canonical(),
                        candidate.version,
                        conflict
                    );
                    last_error = Some(conflict);
                }
                Err(other) => return Err(other),
            }
        }

        self.stats.backtracks += 1;
        Err(Conflict::exhausted(&package, &required, candidates.len(), last_error).into())
    }

    fn try_candidate(
        &mut self,
        package: &PackageName,
        candidate: &Candidate,
        assignment: &Assignment,
        constraints: &HashMap<PackageName, Specifiers>,
        remaining: &[PackageName],
    ) -> Result<Assignment, ResolveError> {
        let dependencies = self.provider.dependencies(package, &candidate.version_str)?;

        let mut child_constraints = constraints.clone();
        let mut discovered: Vec<PackageName> = Vec::new();
        for (dep_name, dep_spec) in dependencies {
            // a previously chosen release must not be contradicted
            if let Some(pinned) = assignment.get(&dep_name) {
                let compatible = dep_spec
                    .contains(&pinned.version, self.provider.env().allow_prereleases())
                    .map_err(ResolveError::Spec)?;
                if !compatible {
                    return Err(Conflict::incompatible_pin(
                        package,
                        &candidate.version,
                        &dep_name,
                        &dep_spec,
                        &pinned.version,
                    )
                    .into());
                }
            }
            match child_constraints.get(&dep_name) {
                Some(current) => {
                    let merged = current.intersect(&dep_spec);
                    child_constraints.insert(dep_name.clone(), merged);
                }
                None => {
                    child_constraints.insert(dep_name.clone(), dep_spec);
                    if !assignment.contains_key(&dep_name) {
                        discovered.push(dep_name);
                    }
                }
            }
        }

        let mut child_assignment = assignment.clone();
        child_assignment.insert(package.clone(), candidate.clone());

        let mut child_open = remaining.to_vec();
        for dep_name in discovered {
            if !child_open.contains(&dep_name) {
                child_open.push(dep_name);
            }
        }

        self.step(child_assignment, child_constraints, child_open)
    }

    /// Minimum remaining values: the open package with the fewest viable
    /// candidates goes next, ties broken by canonical name. A zero count
    /// wins immediately so the conflict surfaces at the shallowest frame.
    fn select_mrv(
        &self,
        open: &[PackageName],
        constraints: &HashMap<PackageName, Specifiers>,
    ) -> Result<PackageName, ResolveError> {
        let universal = Specifiers::any();
        let mut best: Option<(usize, &PackageName)> = None;
        for name in open {
            let required = constraints.get(name).unwrap_or(&universal);
            let count = self.provider.candidates(name, required)?.len();
            if count == 0 {
                return Ok(name.clone());
            }
            let better = match best {
                None => true,
                Some((best_count, best_name)) => {
                    count < best_count
                        || (count == best_count && name.canonical() < best_name.canonical())
                }
            };
            if better {
                best = Some((count, name));
            }
        }
        // the caller only asks when `open` is non-empty
        Ok(best.map(|(_, name)| name.clone()).unwrap())
    }
}
