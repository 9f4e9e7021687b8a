//! The per-class resolution cache.
//!
//! After rewriting, every field access, invoke, invokedynamic and reference-typed `ldc`
//! instruction carries an index into one of the tables owned by a [`ResolutionCache`]:
//!
//! - [`ResolvedFieldEntry`] rows, one per `Fieldref`
//! - [`ResolvedMethodEntry`] rows, one per `Methodref`/`InterfaceMethodref`, plus one private row
//!   per `InterfaceMethodref` used by `invokespecial`
//! - [`ResolvedIndyEntry`] rows, one per `invokedynamic` instruction
//! - [`ResolvedReferences`] slots for constants and appendices
//!
//! The shape of the cache is frozen when it is assembled. Entries move from unresolved to
//! resolved (or, for call sites and some constants, to a cached failure) through the protocol in
//! [`crate::resolution`]. Only redefinition and archiving, which take `&mut self`, can move an
//! entry back.
//!
//! # Thread Safety
//!
//! [`ResolutionCache`] is `Send + Sync`. Resolution publishes with release stores and probes with
//! acquire loads; the per-class mutex is only taken for call sites and appendix-bearing entries.

mod archive;
mod builder;
mod field;
mod indy;
mod method;
mod redefinition;
mod references;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Condvar, Mutex},
    thread::ThreadId,
};

use dashmap::DashMap;

pub use archive::{ArchivePolicy, ArchiveReport};
pub use builder::EntryStore;
pub use field::{FieldEntryFlags, ResolvedField, ResolvedFieldEntry};
pub use indy::{IndyEntryFlags, ResolvedIndyEntry};
pub use method::{MethodEntryFlags, MethodPayload, ResolvedMethod, ResolvedMethodEntry};
pub use redefinition::{AdjustReport, MethodReplacement};
pub use references::{ReferenceOrigin, ResolvedReferences};

use crate::{bytecode::CacheOperand, classfile::ConstantPool, resolution::LinkageError};

/// Key of a cached resolution failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKey {
    /// A `MethodHandle`, `MethodType` or `Dynamic` constant, by constant-pool index
    Constant(u16),
    /// An invokedynamic call site, by indy row
    CallSite(u32),
}

/// Call sites currently being linked, and by whom
#[derive(Debug, Default)]
pub(crate) struct LinkingState {
    pub(crate) in_progress: HashMap<u32, ThreadId>,
}

/// Maps rewritten operands back to the constant-pool indices they replaced.
///
/// Implemented by the scratch [`EntryStore`] used while rewriting and by the installed
/// [`ResolutionCache`]; both drive the reverse traversal that restores original bytecode.
pub trait OperandMap {
    /// Constant-pool index of field row `row`
    fn field_cp_index(&self, row: u16) -> Option<u16>;
    /// Constant-pool index of method row `row`
    fn method_cp_index(&self, row: u16) -> Option<u16>;
    /// Constant-pool index of invokedynamic row `row`
    fn indy_cp_index(&self, row: u32) -> Option<u16>;
    /// Constant-pool index of a constant-backed reference slot
    fn reference_cp_index(&self, slot: u16) -> Option<u16>;

    /// Constant-pool index behind any rewritten operand. Never resolves anything.
    fn constant_pool_index_of(&self, operand: CacheOperand) -> Option<u16> {
        match operand {
            CacheOperand::Field(row) => self.field_cp_index(row),
            CacheOperand::Method(row) => self.method_cp_index(row),
            CacheOperand::Indy(row) => self.indy_cp_index(row),
            CacheOperand::Reference(slot) => self.reference_cp_index(slot),
        }
    }
}

/// Resolution state shared by all executions of one class's bytecode.
#[derive(Debug)]
pub struct ResolutionCache {
    pool: Arc<ConstantPool>,
    pub(crate) fields: Option<Box<[ResolvedFieldEntry]>>,
    pub(crate) methods: Option<Box<[ResolvedMethodEntry]>>,
    pub(crate) indys: Option<Box<[ResolvedIndyEntry]>>,
    pub(crate) references: ResolvedReferences,
    pub(crate) errors: DashMap<ErrorKey, Arc<LinkageError>>,
    pub(crate) linking: Mutex<LinkingState>,
    pub(crate) linked: Condvar,
}

impl ResolutionCache {
    pub(crate) fn new(
        pool: Arc<ConstantPool>,
        fields: Option<Box<[ResolvedFieldEntry]>>,
        methods: Option<Box<[ResolvedMethodEntry]>>,
        indys: Option<Box<[ResolvedIndyEntry]>>,
        references: ResolvedReferences,
    ) -> Self {
        ResolutionCache {
            pool,
            fields,
            methods,
            indys,
            references,
            errors: DashMap::new(),
            linking: Mutex::new(LinkingState::default()),
            linked: Condvar::new(),
        }
    }

    /// The constant pool this cache belongs to
    #[must_use]
    pub fn pool(&self) -> &Arc<ConstantPool> {
        &self.pool
    }

    /// The field table, `None` if the class references no fields
    #[must_use]
    pub fn field_entries(&self) -> Option<&[ResolvedFieldEntry]> {
        self.fields.as_deref()
    }

    /// The method table, `None` if the class references no methods
    #[must_use]
    pub fn method_entries(&self) -> Option<&[ResolvedMethodEntry]> {
        self.methods.as_deref()
    }

    /// The invokedynamic table, `None` if the class has no call sites
    #[must_use]
    pub fn indy_entries(&self) -> Option<&[ResolvedIndyEntry]> {
        self.indys.as_deref()
    }

    /// The resolved references
    #[must_use]
    pub fn references(&self) -> &ResolvedReferences {
        &self.references
    }

    /// Field row `row`
    #[must_use]
    pub fn field_entry(&self, row: usize) -> Option<&ResolvedFieldEntry> {
        self.fields.as_deref()?.get(row)
    }

    /// Method row `row`
    #[must_use]
    pub fn method_entry(&self, row: usize) -> Option<&ResolvedMethodEntry> {
        self.methods.as_deref()?.get(row)
    }

    /// Invokedynamic row `row`
    #[must_use]
    pub fn indy_entry(&self, row: usize) -> Option<&ResolvedIndyEntry> {
        self.indys.as_deref()?.get(row)
    }

    /// Number of field rows
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.as_deref().map_or(0, <[_]>::len)
    }

    /// Number of method rows
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.as_deref().map_or(0, <[_]>::len)
    }

    /// Number of invokedynamic rows
    #[must_use]
    pub fn indy_count(&self) -> usize {
        self.indys.as_deref().map_or(0, <[_]>::len)
    }

    /// True if `operand` addresses an existing row or slot
    #[must_use]
    pub fn contains(&self, operand: CacheOperand) -> bool {
        match operand {
            CacheOperand::Field(row) => usize::from(row) < self.field_count(),
            CacheOperand::Method(row) => usize::from(row) < self.method_count(),
            CacheOperand::Indy(row) => {
                usize::try_from(row).is_ok_and(|row| row < self.indy_count())
            }
            CacheOperand::Reference(slot) => usize::from(slot) < self.references.len(),
        }
    }

    /// The cached failure for `key`, if any
    #[must_use]
    pub fn cached_error(&self, key: ErrorKey) -> Option<Arc<LinkageError>> {
        self.errors.get(&key).map(|entry| entry.value().clone())
    }
}

impl OperandMap for ResolutionCache {
    fn field_cp_index(&self, row: u16) -> Option<u16> {
        self.field_entry(usize::from(row))
            .map(ResolvedFieldEntry::constant_pool_index)
    }

    fn method_cp_index(&self, row: u16) -> Option<u16> {
        self.method_entry(usize::from(row))
            .map(ResolvedMethodEntry::constant_pool_index)
    }

    fn indy_cp_index(&self, row: u32) -> Option<u16> {
        self.indy_entry(usize::try_from(row).ok()?)
            .map(ResolvedIndyEntry::constant_pool_index)
    }

    fn reference_cp_index(&self, slot: u16) -> Option<u16> {
        self.references.constant_pool_index(usize::from(slot))
    }
}

impl fmt::Display for ResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "resolution cache: {} fields, {} methods, {} call sites, {} references",
            self.field_count(),
            self.method_count(),
            self.indy_count(),
            self.references.len()
        )?;
        for (row, entry) in self.fields.iter().flat_map(|t| t.iter()).enumerate() {
            writeln!(f, "  F{:<4} {}", row, entry)?;
        }
        for (row, entry) in self.methods.iter().flat_map(|t| t.iter()).enumerate() {
            writeln!(f, "  M{:<4} {}", row, entry)?;
        }
        for (row, entry) in self.indys.iter().flat_map(|t| t.iter()).enumerate() {
            writeln!(f, "  I{:<4} {}", row, entry)?;
        }
        for (slot, origin) in self.references.origins() {
            let state = if self.references.get(slot).is_some() {
                "set"
            } else {
                "empty"
            };
            writeln!(f, "  R{:<4} {:?} {}", slot, origin, state)?;
        }
        Ok(())
    }
}
