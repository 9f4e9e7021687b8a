use crate::{
    cache::{ErrorKey, ResolutionCache},
    resolution::MethodRc,
};

/// What became of a method when its class was redefined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodReplacement {
    /// The method is unaffected
    Unchanged,
    /// The method was superseded by a new body
    Replaced(MethodRc),
    /// The method no longer exists; entries bound to it must resolve again
    Deleted,
}

/// Counts of entries touched by [`ResolutionCache::adjust_method_entries`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustReport {
    /// Method rows repointed at a new body
    pub methods_replaced: usize,
    /// Method rows reset to unresolved
    pub methods_reset: usize,
    /// Call sites repointed at a new adapter
    pub call_sites_replaced: usize,
    /// Call sites reset to unresolved
    pub call_sites_reset: usize,
}

impl ResolutionCache {
    /// Patch resolved method references after class redefinition.
    ///
    /// Exclusive access stands for the global pause during which no thread executes bytecode of
    /// the affected classes. `replacement` is consulted for every method currently bound by a
    /// method row or published as a call-site adapter.
    ///
    /// Reset entries keep their constant-pool index and reserved reference slot; a reset call
    /// site also loses its appendix so the next execution links it afresh.
    pub fn adjust_method_entries<F>(&mut self, replacement: F) -> AdjustReport
    where
        F: Fn(&MethodRc) -> MethodReplacement,
    {
        let mut report = AdjustReport::default();

        if let Some(methods) = self.methods.as_deref_mut() {
            for entry in methods.iter_mut() {
                let Some(current) = entry.method() else {
                    continue;
                };
                match replacement(current) {
                    MethodReplacement::Unchanged => {}
                    MethodReplacement::Replaced(method) => {
                        entry.replace_method(method);
                        report.methods_replaced += 1;
                    }
                    MethodReplacement::Deleted => {
                        if let Some(slot) = entry.appendix_slot() {
                            self.references.clear(usize::from(slot));
                        }
                        entry.reset();
                        report.methods_reset += 1;
                    }
                }
            }
        }

        if let Some(indys) = self.indys.as_deref_mut() {
            for (row, entry) in indys.iter_mut().enumerate() {
                let Some(current) = entry.adapter() else {
                    continue;
                };
                match replacement(current) {
                    MethodReplacement::Unchanged => {}
                    MethodReplacement::Replaced(method) => {
                        entry.replace_method(method);
                        report.call_sites_replaced += 1;
                    }
                    MethodReplacement::Deleted => {
                        self.references
                            .clear(usize::from(entry.resolved_references_index()));
                        if let Ok(row) = u32::try_from(row) {
                            self.errors.remove(&ErrorKey::CallSite(row));
                        }
                        entry.reset();
                        report.call_sites_reset += 1;
                    }
                }
            }
        }

        log::debug!(
            "adjusted method entries: {} replaced, {} reset, {} call sites replaced, {} reset",
            report.methods_replaced,
            report.methods_reset,
            report.call_sites_replaced,
            report.call_sites_reset
        );
        report
    }
}
