use std::{
    fmt,
    sync::{
        atomic::{AtomicU16, AtomicU8, Ordering},
        OnceLock,
    },
};

use bitflags::bitflags;

use crate::{
    classfile::ResultType,
    resolution::{MethodRc, RuntimeMethod},
};

bitflags! {
    /// Flags recorded on an invokedynamic entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IndyEntryFlags: u8 {
        /// The adapter takes the appendix stored in the entry's reference slot
        const HAS_APPENDIX = 0x01;
        /// Linking failed; the error is cached and rethrown on every execution
        const RESOLUTION_FAILED = 0x02;
    }
}

/// Resolution state of one invokedynamic call site.
///
/// Each `invokedynamic` instruction owns a private entry, even when several sites share one
/// `InvokeDynamic` constant. The adapter method is the publication flag; the appendix lives in
/// the resolved-reference slot fixed at rewrite time.
#[derive(Debug)]
pub struct ResolvedIndyEntry {
    method: OnceLock<MethodRc>,
    resolved_references_index: u16,
    cp_index: u16,
    parameter_size: AtomicU16,
    result_type: AtomicU8,
    flags: AtomicU8,
}

impl ResolvedIndyEntry {
    /// An unresolved call site for the `InvokeDynamic` at `cp_index`, with its appendix slot
    #[must_use]
    pub fn new(resolved_references_index: u16, cp_index: u16) -> Self {
        ResolvedIndyEntry {
            method: OnceLock::new(),
            resolved_references_index,
            cp_index,
            parameter_size: AtomicU16::new(0),
            result_type: AtomicU8::new(0),
            flags: AtomicU8::new(0),
        }
    }

    /// The `InvokeDynamic` constant this site was created for
    #[must_use]
    pub fn constant_pool_index(&self) -> u16 {
        self.cp_index
    }

    /// Slot in the resolved references reserved for the appendix
    #[must_use]
    pub fn resolved_references_index(&self) -> u16 {
        self.resolved_references_index
    }

    /// Acquire-probe: the published adapter, if linked
    #[must_use]
    pub fn adapter(&self) -> Option<&MethodRc> {
        self.method.get()
    }

    /// True once an adapter is published
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.method.get().is_some()
    }

    /// Current flags, acquire-loaded so a set failure flag implies a visible cached error
    #[must_use]
    pub fn flags(&self) -> IndyEntryFlags {
        IndyEntryFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// True once linking has failed
    #[must_use]
    pub fn resolution_failed(&self) -> bool {
        self.flags().contains(IndyEntryFlags::RESOLUTION_FAILED)
    }

    /// True if the adapter takes an appendix
    #[must_use]
    pub fn has_appendix(&self) -> bool {
        self.flags().contains(IndyEntryFlags::HAS_APPENDIX)
    }

    /// Argument slots of the adapter
    #[must_use]
    pub fn parameter_size(&self) -> u16 {
        self.parameter_size.load(Ordering::Relaxed)
    }

    /// Return kind of the call site
    #[must_use]
    pub fn result_type(&self) -> ResultType {
        ResultType::from_byte(self.result_type.load(Ordering::Relaxed)).unwrap_or(ResultType::Void)
    }

    /// Publish a linked adapter. Must run inside the per-class critical section, after the
    /// appendix has been stored. Returns false if another adapter was already published.
    pub(crate) fn fill_in(&self, adapter: &MethodRc, has_appendix: bool) -> bool {
        self.parameter_size
            .store(adapter.parameter_size, Ordering::Relaxed);
        self.result_type
            .store(adapter.result_type as u8, Ordering::Relaxed);
        if has_appendix {
            self.flags
                .fetch_or(IndyEntryFlags::HAS_APPENDIX.bits(), Ordering::Relaxed);
        }
        self.method.set(adapter.clone()).is_ok()
    }

    /// Record a terminal failure. The error itself must already be visible in the cache's error
    /// table.
    pub(crate) fn set_failed(&self) {
        self.flags
            .fetch_or(IndyEntryFlags::RESOLUTION_FAILED.bits(), Ordering::Release);
    }

    pub(crate) fn replace_method(&mut self, method: MethodRc) {
        self.method = OnceLock::from(method);
    }

    /// Return to the unresolved state, keeping the constant-pool index and reference slot
    pub(crate) fn reset(&mut self) {
        *self = ResolvedIndyEntry::new(self.resolved_references_index, self.cp_index);
    }

    fn describe_adapter(method: &RuntimeMethod) -> String {
        format!("{}{}", method.name, method.descriptor)
    }
}

impl fmt::Display for ResolvedIndyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "indy #{} ref={}",
            self.cp_index, self.resolved_references_index
        )?;
        if let Some(adapter) = self.adapter() {
            write!(
                f,
                " -> {} params={} type={:?}",
                Self::describe_adapter(adapter),
                self.parameter_size(),
                self.result_type()
            )?;
            if self.has_appendix() {
                f.write_str(" +appendix")?;
            }
            Ok(())
        } else if self.resolution_failed() {
            f.write_str(" failed")
        } else {
            f.write_str(" unresolved")
        }
    }
}
