use crate::{
    cache::{ReferenceOrigin, ResolutionCache},
    classfile::{ConstantPool, ConstantTag},
};

/// Decides which resolutions may be persisted with an archived class.
///
/// A resolution is deterministic when every run of the program would produce the same result,
/// for instance a field of a class from the same archive. Anything else must be resolved again
/// after the archive is loaded.
pub trait ArchivePolicy {
    /// True if the resolution of the entry at `cp_index` may be archived
    fn is_resolution_deterministic(&self, pool: &ConstantPool, cp_index: u16) -> bool;
}

impl<F> ArchivePolicy for F
where
    F: Fn(&ConstantPool, u16) -> bool,
{
    fn is_resolution_deterministic(&self, pool: &ConstantPool, cp_index: u16) -> bool {
        self(pool, cp_index)
    }
}

/// Outcome of [`ResolutionCache::prepare_for_archiving`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Resolved field rows kept
    pub fields_archived: usize,
    /// Resolved field rows reverted
    pub fields_reverted: usize,
    /// Resolved method rows kept
    pub methods_archived: usize,
    /// Resolved method rows reverted
    pub methods_reverted: usize,
    /// Linked call sites kept
    pub call_sites_archived: usize,
    /// Linked or failed call sites reverted
    pub call_sites_reverted: usize,
    /// Reference slots cleared
    pub references_cleared: usize,
}

impl ResolutionCache {
    /// Strip resolutions that must not be persisted.
    ///
    /// Resolved entries whose constant is judged deterministic by `policy` are kept. Everything
    /// else returns to the unresolved state; call sites additionally lose their appendix and any
    /// cached failure. Constant-backed reference slots follow the same rule, except strings,
    /// which are always deterministic. Cached errors are never archived.
    pub fn prepare_for_archiving<P>(&mut self, policy: &P) -> ArchiveReport
    where
        P: ArchivePolicy + ?Sized,
    {
        let mut report = ArchiveReport::default();
        let pool = self.pool().clone();

        if let Some(fields) = self.fields.as_deref_mut() {
            for entry in fields.iter_mut() {
                if entry.get_code() == 0 && entry.put_code() == 0 {
                    continue;
                }
                if policy.is_resolution_deterministic(&pool, entry.constant_pool_index()) {
                    report.fields_archived += 1;
                } else {
                    entry.reset();
                    report.fields_reverted += 1;
                }
            }
        }

        let mut cleared = Vec::new();
        if let Some(methods) = self.methods.as_deref_mut() {
            for entry in methods.iter_mut() {
                if !entry.is_any_resolved() {
                    continue;
                }
                if policy.is_resolution_deterministic(&pool, entry.constant_pool_index()) {
                    report.methods_archived += 1;
                } else {
                    if let Some(slot) = entry.appendix_slot() {
                        cleared.push(usize::from(slot));
                    }
                    entry.reset();
                    report.methods_reverted += 1;
                }
            }
        }

        if let Some(indys) = self.indys.as_deref_mut() {
            for entry in indys.iter_mut() {
                if !entry.is_resolved() && !entry.resolution_failed() {
                    continue;
                }
                if entry.is_resolved()
                    && policy.is_resolution_deterministic(&pool, entry.constant_pool_index())
                {
                    report.call_sites_archived += 1;
                } else {
                    cleared.push(usize::from(entry.resolved_references_index()));
                    entry.reset();
                    report.call_sites_reverted += 1;
                }
            }
        }

        let constants: Vec<(usize, u16)> = self
            .references
            .origins()
            .filter_map(|(slot, origin)| match origin {
                ReferenceOrigin::Constant(cp_index) => Some((slot, cp_index)),
                _ => None,
            })
            .collect();
        for (slot, cp_index) in constants {
            if self.references.get(slot).is_none() {
                continue;
            }
            let keep = matches!(pool.tag_at(cp_index), Ok(ConstantTag::String))
                || policy.is_resolution_deterministic(&pool, cp_index);
            if !keep {
                cleared.push(slot);
            }
        }

        for slot in cleared {
            if self.references.get(slot).is_some() {
                report.references_cleared += 1;
            }
            self.references.clear(slot);
        }
        self.errors.clear();

        log::info!(
            "archived resolution cache: fields {}/{}, methods {}/{}, call sites {}/{} (kept/reverted), {} references cleared",
            report.fields_archived,
            report.fields_reverted,
            report.methods_archived,
            report.methods_reverted,
            report.call_sites_archived,
            report.call_sites_reverted,
            report.references_cleared
        );
        report
    }
}
