/// Update planning: which versions must be combined to reach a target.
///
/// Planning is pure: it reads the version graph and the caller's view of what
/// is available locally, and performs no I/O. Every graph inconsistency is
/// detected here, before anything on disk is touched.
use domain::{Domain, DomainVersion, GraphError, VersionNumber};
use std::collections::BTreeSet;
use std::fmt;

/// A base version followed by the deltas to apply on top of it, oldest first.
///
/// Applying `base` then every entry of `deltas` in order yields the target,
/// which is the last delta (or the base itself when `deltas` is empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub base: DomainVersion,
    pub deltas: Vec<DomainVersion>,
}

impl UpdatePlan {
    /// The base followed by the deltas, in application order.
    pub fn versions(&self) -> impl Iterator<Item = &DomainVersion> {
        std::iter::once(&self.base).chain(self.deltas.iter())
    }

    #[must_use]
    pub fn version_numbers(&self) -> Vec<VersionNumber> {
        self.versions().map(|v| v.number).collect()
    }

    /// The version the plan produces.
    #[must_use]
    pub fn target(&self) -> &DomainVersion {
        self.deltas.last().unwrap_or(&self.base)
    }
}

impl fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "base v{}", self.base.number)?;
        if !self.deltas.is_empty() {
            let deltas: Vec<String> = self.deltas.iter().map(|d| format!("v{}", d.number)).collect();
            write!(f, " + deltas [{}]", deltas.join(", "))?;
        }
        Ok(())
    }
}

/// Computes the shortest chain of versions needed to bring a partition to `target`.
///
/// Walks from `target` towards its root through parent pointers and stops at
/// the first version that is already usable locally:
///
/// - the partition's `current` version: it becomes the base, unless it *is*
///   the target, in which case there is nothing to do (`Ok(None)`);
/// - a member of `cached_bases`: it becomes the base;
/// - a version with no parent: the walk ends there naturally.
///
/// Defunct versions are stepped over: they never enter the plan, but their
/// parent pointer is still followed.
///
/// # Errors
///
/// - [`GraphError::OpenVersion`] if a non-defunct version on the walk is still open.
/// - [`GraphError::UnknownParent`] if a parent pointer does not resolve.
/// - [`GraphError::NoValidBase`] if the walk ends on a version that cannot
///   serve as a base (e.g. a delta whose only ancestors are defunct).
pub fn compute_update_plan(
    domain: &Domain,
    current: Option<&DomainVersion>,
    cached_bases: &BTreeSet<VersionNumber>,
    target: &DomainVersion,
) -> Result<Option<UpdatePlan>, GraphError> {
    let current_number = current.map(|v| v.number);

    // target-to-root order
    let mut chain: Vec<&DomainVersion> = Vec::new();
    let mut next = Some(target);

    while let Some(v) = next {
        if !v.is_defunct() {
            if !v.is_closed() {
                return Err(GraphError::OpenVersion {
                    domain: domain.name().to_string(),
                    version: v.number,
                });
            }
            if current_number == Some(v.number) {
                if chain.is_empty() {
                    return Ok(None);
                }
                chain.push(v);
                break;
            }
            chain.push(v);
            if cached_bases.contains(&v.number) {
                break;
            }
        }
        next = domain.parent_of(v)?;
    }

    let Some(base) = chain.pop() else {
        return Ok(None);
    };

    let usable = base.parent().is_none()
        || cached_bases.contains(&base.number)
        || current_number == Some(base.number);
    if !usable {
        return Err(GraphError::NoValidBase {
            domain: domain.name().to_string(),
            target: target.number,
            reached: base.number,
        });
    }

    chain.reverse();
    Ok(Some(UpdatePlan {
        base: base.clone(),
        deltas: chain.into_iter().cloned().collect(),
    }))
}
