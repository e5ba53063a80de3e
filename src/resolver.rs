//! C8: dependency resolver (spec.md §4.9). A backtracking solver over a
//! partial `name -> version` mapping: fail-first variable ordering
//! (fewest remaining candidates first), newest-candidate-first trial,
//! conflict backtracking, loop detection via the call stack.
//!
//! No teacher grounding (the teacher has no resolver); the general shape
//! of "walk a dependency graph against version constraints, backtracking
//! on conflict" is generalized from
//! `other_examples/2e685202_kpcyrd-cargo-debstatus__src-main.rs.rs`.

use crate::errors::{EmberError, ErrorKind, Result};
use crate::index_client::IndexClient;
use crate::version::{ConstraintSet, Version};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: Version,
    pub wheel_url: String,
    pub sha256: Option<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone)]
struct Requirement {
    name: String,
    constraints: ConstraintSet,
}

/// A frame on the resolver's explicit call stack, used for loop
/// detection (spec.md §4.9: "Loop detection via the call stack"): a
/// package that's already an ancestor of the current worklist item can't
/// be re-entered without forming a cycle.
struct Frame {
    worklist: Vec<Requirement>,
    assignment: BTreeMap<String, Version>,
    ancestry: Vec<String>,
}

pub struct Resolver<'a> {
    index: &'a IndexClient,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a IndexClient) -> Self {
        Resolver { index }
    }

    /// Resolves `roots` into a flat locked set. Requirement order must
    /// not affect the result (spec.md §8 scenario 4: "swapping requirement
    /// order must not change the result") - guaranteed here because the
    /// fail-first heuristic always picks the same next variable
    /// regardless of worklist insertion order, and ties are broken by
    /// name so the choice is deterministic.
    pub fn resolve(&self, roots: &[(&str, &str)]) -> Result<Vec<ResolvedPackage>> {
        let worklist = roots
            .iter()
            .map(|(name, constraint)| {
                Ok(Requirement {
                    name: (*name).to_string(),
                    constraints: ConstraintSet::parse(constraint)
                        .map_err(|e| EmberError::new(ErrorKind::Resolution, e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let frame = Frame {
            worklist,
            assignment: BTreeMap::new(),
            ancestry: Vec::new(),
        };
        let assignment = self.solve(frame)?;

        let mut resolved = Vec::new();
        for (name, version) in &assignment {
            let metadata = self.index.fetch_metadata(name)?;
            let release = metadata
                .releases
                .iter()
                .find(|r| Version::parse(&r.version).ok().as_ref() == Some(version))
                .ok_or_else(|| {
                    EmberError::new(
                        ErrorKind::Resolution,
                        format!("{name} {version} disappeared from the index between solving and fetch"),
                    )
                })?;
            resolved.push(ResolvedPackage {
                name: name.clone(),
                version: version.clone(),
                wheel_url: release.wheel_url.clone(),
                sha256: release.sha256.clone(),
                dependencies: release.dependencies.clone(),
            });
        }
        Ok(resolved)
    }

    fn solve(&self, mut frame: Frame) -> Result<BTreeMap<String, Version>> {
        // Merge duplicate requirements for the same package into one
        // constraint set before picking the next variable, so two
        // requirements on the same name (e.g. a root requirement and a
        // transitive one) are solved together rather than racing.
        let mut merged: BTreeMap<String, ConstraintSet> = BTreeMap::new();
        for req in &frame.worklist {
            if frame.assignment.contains_key(&req.name) {
                continue;
            }
            merged
                .entry(req.name.clone())
                .or_default()
                .constraints
                .extend(req.constraints.constraints.clone());
        }
        if merged.is_empty() {
            return Ok(frame.assignment);
        }

        // Fail-first: pick the unassigned requirement with the fewest
        // remaining candidates.
        let mut best: Option<(String, ConstraintSet, Vec<Version>)> = None;
        for (name, constraints) in &merged {
            let metadata = self.index.fetch_metadata(name)?;
            let mut candidates: Vec<Version> = metadata
                .releases
                .iter()
                .filter_map(|r| Version::parse(&r.version).ok())
                .filter(|v| constraints.matches(v))
                .collect();
            candidates.sort_by(|a, b| b.cmp(a)); // newest first
            let is_better = match &best {
                None => true,
                Some((_, _, existing)) => candidates.len() < existing.len(),
            };
            if is_better {
                best = Some((name.clone(), constraints.clone(), candidates));
            }
        }
        let (name, constraints, candidates) = best.expect("merged is non-empty");

        if frame.ancestry.contains(&name) {
            return Err(EmberError::new(
                ErrorKind::Resolution,
                format!("dependency cycle detected while resolving {name}"),
            ));
        }
        if candidates.is_empty() {
            return Err(EmberError::new(
                ErrorKind::Resolution,
                format!("no version of {name} satisfies the requirement chain"),
            ));
        }

        for candidate in &candidates {
            let mut assignment = frame.assignment.clone();
            assignment.insert(name.clone(), candidate.clone());

            let metadata = self.index.fetch_metadata(&name)?;
            let release = metadata
                .releases
                .iter()
                .find(|r| Version::parse(&r.version).ok().as_ref() == Some(candidate));
            let mut worklist: Vec<Requirement> = frame
                .worklist
                .iter()
                .filter(|r| r.name != name)
                .cloned()
                .collect();
            if let Some(release) = release {
                for dep in &release.dependencies {
                    worklist.push(parse_dependency_spec(dep)?);
                }
            }

            let mut ancestry = frame.ancestry.clone();
            ancestry.push(name.clone());

            let next = Frame { worklist, assignment, ancestry };
            match self.solve(next) {
                Ok(result) => return Ok(result),
                Err(_) => continue, // backtrack to the next-newest candidate
            }
        }

        Err(EmberError::new(
            ErrorKind::Resolution,
            format!("every candidate version of {name} conflicts with the requirement chain"),
        ))
    }
}

/// Dependency strings declared by a release are `name constraint`, e.g.
/// `"A<1.1"` or `"A>=1,<2"`.
fn parse_dependency_spec(spec: &str) -> Result<Requirement> {
    let split_at = spec
        .find(|c: char| "=!<>~".contains(c))
        .unwrap_or(spec.len());
    let (name, constraint) = spec.split_at(split_at);
    Ok(Requirement {
        name: name.trim().to_string(),
        constraints: ConstraintSet::parse(constraint)
            .map_err(|e| EmberError::new(ErrorKind::Resolution, e.to_string()))?,
    })
}

impl ConstraintSet {
    fn extend(&mut self, more: impl IntoIterator<Item = crate::version::Constraint>) {
        self.constraints.extend(more);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_client::{PackageMetadata, PackageRelease};
    use std::time::Duration;

    fn write_package(dir: &std::path::Path, name: &str, releases: &[(&str, &[&str])]) {
        let metadata = PackageMetadata {
            name: name.to_string(),
            summary: None,
            releases: releases
                .iter()
                .map(|(version, deps)| PackageRelease {
                    version: version.to_string(),
                    wheel_url: format!("https://example/{name}-{version}.whl"),
                    sha256: Some("deadbeef".into()),
                    dependencies: deps.iter().map(|d| d.to_string()).collect(),
                })
                .collect(),
        };
        std::fs::create_dir_all(dir).unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let envelope = serde_json::json!({
            "fetched_at_secs": now,
            "body": metadata,
        });
        std::fs::write(dir.join(format!("{name}.json")), envelope.to_string()).unwrap();
    }

    #[test]
    fn resolver_is_deterministic_regardless_of_requirement_order() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "A", &[("1.0", &[]), ("1.1", &[])]);
        write_package(dir.path(), "B", &[("1.0", &["A<1.1"])]);
        let index = IndexClient::new("https://index.example", dir.path().to_path_buf(), Duration::from_secs(86400));
        let resolver = Resolver::new(&index);

        let forward = resolver.resolve(&[("A", ">=1"), ("B", "")]).unwrap();
        let backward = resolver.resolve(&[("B", ""), ("A", ">=1")]).unwrap();

        let pick = |result: &[ResolvedPackage], name: &str| {
            result.iter().find(|p| p.name == name).unwrap().version.clone()
        };
        assert_eq!(pick(&forward, "A"), Version::parse("1.0").unwrap());
        assert_eq!(pick(&backward, "A"), Version::parse("1.0").unwrap());
    }

    #[test]
    fn unsatisfiable_chain_surfaces_a_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "A", &[("2.0", &[])]);
        let index = IndexClient::new("https://index.example", dir.path().to_path_buf(), Duration::from_secs(86400));
        let resolver = Resolver::new(&index);
        let err = resolver.resolve(&[("A", "<2.0")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Resolution);
    }
}
