use crate::candidates::CandidateProvider;
use crate::error::ResolveError;
use crate::prelude::*;
use crate::resolve::Assignment;

/// One line of the install plan, in install order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub package: String,
    pub version: String,
    pub yanked: bool,
    pub vulnerabilities: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    OnStack,
    Done,
}

/// Orders the solved assignment so every dependency precedes its dependents,
/// over the solution-restricted dependency graph. Mutual dependencies do
/// happen on PyPI; an edge back into the DFS stack is dropped, which breaks
/// the cycle and leaves its members in first-visit order.
pub fn install_plan(
    provider: &CandidateProvider,
    assignment: &Assignment,
) -> Result<Vec<PlanEntry>, ResolveError> {
    let index: HashMap<&PackageName, usize> = assignment
        .keys()
        .enumerate()
        .map(|(position, name)| (name, position))
        .collect();

    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); assignment.len()];
    for (position, (name, candidate)) in assignment.iter().enumerate() {
        for (dep_name, _) in provider.dependencies(name, &candidate.version_str)? {
            // dependencies outside the assignment were marker- or
            // extras-conditional and never chosen
            if let Some(&dep_position) = index.get(&dep_name) {
                edges[position].push(dep_position);
            }
        }
    }

    let mut color = vec![Color::Unvisited; assignment.len()];
    let mut order = Vec::with_capacity(assignment.len());
    for root in 0..assignment.len() {
        if color[root] != Color::Unvisited {
            continue;
        }
        color[root] = Color::OnStack;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        loop {
            let (node, next) = match stack.last_mut() {
                None => break,
                Some(frame) => {
                    let node = frame.0;
                    match edges[node].get(frame.1) {
                        Some(&dep) => {
                            frame.1 += 1;
                            (node, Some(dep))
                        }
                        None => (node, None),
                    }
                }
            };
            match next {
                Some(dep) => {
                    if color[dep] == Color::Unvisited {
                        color[dep] = Color::OnStack;
                        stack.push((dep, 0));
                    }
                }
                None => {
                    color[node] = Color::Done;
                    order.push(node);
                    stack.pop();
                }
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|position| {
            // positions all come from the enumeration above
            let (_, candidate) = assignment.get_index(position).unwrap();
            PlanEntry {
                package: candidate.name.canonical().to_owned(),
                version: candidate.version_str.clone(),
                yanked: candidate.yanked,
                vulnerabilities: candidate.vulnerabilities,
            }
        })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::candidates::Env;
    use crate::resolve::{CancelToken, Outcome, Resolver};
    use crate::store::SqliteStore;
    use crate::test_util::{store_with, TestRelease};

    fn solve(store: &SqliteStore, env: &Env, targets: &[&str]) -> Vec<PlanEntry> {
        let provider = CandidateProvider::new(store, env, None);
        let requirements: IndexMap<PackageName, Specifiers> = targets
            .iter()
            .map(|raw| {
                let name: PackageName = (*raw).try_into().unwrap();
                (name, Specifiers::any())
            })
            .collect();
        let resolution = Resolver::new(&provider, CancelToken::new())
            .resolve(&requirements)
            .unwrap();
        match resolution.outcome {
            Outcome::Solved(assignment) => {
                install_plan(&provider, &assignment).unwrap()
            }
            Outcome::Conflict(conflict) => panic!("unexpected conflict: {}", conflict),
        }
    }

    fn packages(plan: &[PlanEntry]) -> Vec<&str> {
        plan.iter().map(|entry| entry.package.as_str()).collect()
    }

    fn position(plan: &[PlanEntry], package: &str) -> usize {
        plan.iter()
            .position(|entry| entry.package == package)
            .unwrap_or_else(|| panic!("{} missing from plan", package))
    }

    #[test]
    fn test_chain_is_bottom_up() {
        let store = store_with(vec![
            TestRelease::new("A", "1.0").dep("B"),
            TestRelease::new("B", "1.0").dep("C"),
            TestRelease::new("C", "1.0"),
        ]);
        let env = Env::new(None, false);
        let plan = solve(&store, &env, &["A"]);
        assert_eq!(packages(&plan), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_diamond_dependencies_precede_dependents() {
        let store = store_with(vec![
            TestRelease::new("A", "1.0").dep("B").dep("C"),
            TestRelease::new("B", "1.0").dep("D"),
            TestRelease::new("C", "1.0").dep("D"),
            TestRelease::new("D", "1.0"),
        ]);
        let env = Env::new(None, false);
        let plan = solve(&store, &env, &["A"]);
        assert_eq!(plan.len(), 4);
        for (dependent, dependency) in
            [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]
        {
            assert!(
                position(&plan, dependency) < position(&plan, dependent),
                "{} should precede {}",
                dependency,
                dependent
            );
        }
    }

    #[test]
    fn test_cycle_is_broken_deterministically() {
        let store = store_with(vec![
            TestRelease::new("A", "1.0").dep("B"),
            TestRelease::new("B", "1.0").dep("A"),
        ]);
        let env = Env::new(None, false);
        let plan = solve(&store, &env, &["A"]);
        // A is visited first, so the back-edge B -> A is the one dropped
        assert_eq!(packages(&plan), vec!["b", "a"]);
        let again = solve(&store, &env, &["A"]);
        assert_eq!(plan, again);
    }

    #[test]
    fn test_plan_carries_release_flags() {
        let store = store_with(vec![TestRelease::new("A", "1.0").yanked()]);
        let env = Env::new(None, false);
        let provider = CandidateProvider::new(&store, &env, None);
        let requirements: IndexMap<PackageName, Specifiers> =
            [("A".try_into().unwrap(), "== 1.0".try_into().unwrap())]
                .into_iter()
                .collect();
        let resolution = Resolver::new(&provider, CancelToken::new())
            .resolve(&requirements)
            .unwrap();
        let assignment = match resolution.outcome {
            Outcome::Solved(assignment) => assignment,
            Outcome::Conflict(conflict) => panic!("unexpected conflict: {}", conflict),
        };
        let plan = install_plan(&provider, &assignment).unwrap();
        assert_eq!(
            plan,
            vec![PlanEntry {
                package: "a".to_owned(),
                version: "1.0".to_owned(),
                yanked: true,
                vulnerabilities: 0,
            }]
        );
    }
}
