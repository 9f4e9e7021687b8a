//! Placeholder tables filled while rewriting, and their assembly into a frozen cache.
//!
//! Row counts are only known after the scanner has visited every method: invokedynamic sites,
//! interface `invokespecial` rows and `invokehandle` appendix slots are discovered on the way.
//! The [`EntryStore`] therefore grows freely during rewriting and is turned into fixed-size
//! tables in one step by [`EntryStore::assemble`].

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use crate::{
    cache::{
        OperandMap, ReferenceOrigin, ResolutionCache, ResolvedFieldEntry, ResolvedIndyEntry,
        ResolvedMethodEntry, ResolvedReferences,
    },
    classfile::ConstantPool,
    resolution::ObjectRef,
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MethodPlaceholder {
    cp_index: u16,
    appendix_slot: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndyPlaceholder {
    cp_index: u16,
    reference: u16,
}

/// Growable placeholder tables populated by the two rewriting passes.
#[derive(Debug, Default)]
pub struct EntryStore {
    fields: Vec<u16>,
    methods: Vec<MethodPlaceholder>,
    indys: Vec<IndyPlaceholder>,
    references: Vec<ReferenceOrigin>,
    invokespecial_rows: HashMap<u16, u16>,
}

fn next_row(len: usize, table: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        Error::RewriteOverflow(format!(
            "{} table exceeds {} entries",
            table,
            usize::from(u16::MAX) + 1
        ))
    })
}

impl EntryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unresolved field row for the `Fieldref` at `cp_index`
    ///
    /// # Errors
    /// Returns [`Error::RewriteOverflow`] once the table exceeds two-byte indices.
    pub fn add_field(&mut self, cp_index: u16) -> Result<u16> {
        let row = next_row(self.fields.len(), "field")?;
        self.fields.push(cp_index);
        Ok(row)
    }

    /// Add an unresolved method row for the method reference at `cp_index`
    ///
    /// # Errors
    /// Returns [`Error::RewriteOverflow`] once the table exceeds two-byte indices.
    pub fn add_method(&mut self, cp_index: u16) -> Result<u16> {
        let row = next_row(self.methods.len(), "method")?;
        self.methods.push(MethodPlaceholder {
            cp_index,
            appendix_slot: None,
        });
        Ok(row)
    }

    /// Reserve a resolved-reference slot
    ///
    /// # Errors
    /// Returns [`Error::RewriteOverflow`] once the array exceeds two-byte indices.
    pub fn add_reference(&mut self, origin: ReferenceOrigin) -> Result<u16> {
        let slot = next_row(self.references.len(), "resolved reference")?;
        self.references.push(origin);
        Ok(slot)
    }

    /// Row for an `invokespecial` of the `InterfaceMethodref` at `cp_index`.
    ///
    /// These rows are separate from the row the first pass assigned, so `invokeinterface`
    /// resolution of the same reference never shares state with them. All `invokespecial`
    /// instructions of one reference share a single extra row.
    ///
    /// # Errors
    /// Returns [`Error::RewriteOverflow`] once the method table exceeds two-byte indices.
    pub fn add_invokespecial_row(&mut self, cp_index: u16) -> Result<u16> {
        if let Some(row) = self.invokespecial_rows.get(&cp_index) {
            return Ok(*row);
        }

        let row = next_row(self.methods.len(), "method")?;
        self.methods.push(MethodPlaceholder {
            cp_index,
            appendix_slot: None,
        });
        self.invokespecial_rows.insert(cp_index, row);
        Ok(row)
    }

    /// Allocate a call-site row for an `invokedynamic` of the constant at `cp_index`,
    /// reserving its appendix slot.
    ///
    /// # Errors
    /// Returns [`Error::RewriteOverflow`] if the appendix slot index does not fit two bytes.
    pub fn add_indy(&mut self, cp_index: u16) -> Result<u32> {
        let row = u32::try_from(self.indys.len())
            .map_err(|_| Error::RewriteOverflow("invokedynamic table overflow".to_string()))?;
        let reference = self.add_reference(ReferenceOrigin::CallSite(row))?;
        self.indys.push(IndyPlaceholder {
            cp_index,
            reference,
        });
        Ok(row)
    }

    /// Reserve (once) the appendix slot of an `invokehandle` method row
    ///
    /// # Errors
    /// Returns [`Error::RewriteOverflow`] if the slot index does not fit two bytes, and
    /// [`crate::Error::OutOfBounds`] for unknown rows.
    pub fn reserve_appendix(&mut self, row: u16) -> Result<u16> {
        let index = usize::from(row);
        let Some(existing) = self.methods.get(index).map(|m| m.appendix_slot) else {
            return Err(Error::OutOfBounds);
        };
        if let Some(slot) = existing {
            return Ok(slot);
        }

        let slot = self.add_reference(ReferenceOrigin::Appendix(row))?;
        self.methods[index].appendix_slot = Some(slot);
        Ok(slot)
    }

    /// Rows in the field table
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Rows in the method table
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Rows in the invokedynamic table
    #[must_use]
    pub fn indy_count(&self) -> usize {
        self.indys.len()
    }

    /// Slots in the resolved references
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Bytes the assembled cache tables will occupy
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.fields.len() * std::mem::size_of::<ResolvedFieldEntry>()
            + self.methods.len() * std::mem::size_of::<ResolvedMethodEntry>()
            + self.indys.len() * std::mem::size_of::<ResolvedIndyEntry>()
            + self.references.len()
                * (std::mem::size_of::<OnceLock<ObjectRef>>()
                    + std::mem::size_of::<ReferenceOrigin>())
    }

    /// Freeze the placeholder tables into a [`ResolutionCache`].
    ///
    /// Empty tables become `None`. The store itself is left untouched so the caller can still
    /// use it to restore bytecode if assembly fails.
    ///
    /// # Errors
    /// Returns [`Error::AllocationFailure`] if the footprint exceeds `limit` or the allocator
    /// refuses any of the arrays.
    pub fn assemble(
        &self,
        pool: Arc<ConstantPool>,
        limit: Option<usize>,
    ) -> Result<ResolutionCache> {
        let footprint = self.footprint();
        if let Some(limit) = limit {
            if footprint > limit {
                return Err(Error::AllocationFailure(format!(
                    "resolution cache needs {} bytes, limit is {}",
                    footprint, limit
                )));
            }
        }

        let fields = allocate_table(&self.fields, "field table", |cp_index| {
            ResolvedFieldEntry::new(*cp_index)
        })?;
        let methods = allocate_table(&self.methods, "method table", |m| match m.appendix_slot {
            Some(slot) => ResolvedMethodEntry::with_appendix_slot(m.cp_index, slot),
            None => ResolvedMethodEntry::new(m.cp_index),
        })?;
        let indys = allocate_table(&self.indys, "invokedynamic table", |i| {
            ResolvedIndyEntry::new(i.reference, i.cp_index)
        })?;

        let mut origins = Vec::new();
        origins
            .try_reserve_exact(self.references.len())
            .map_err(|e| Error::AllocationFailure(format!("resolved references: {}", e)))?;
        origins.extend_from_slice(&self.references);

        log::debug!(
            "assembled resolution cache: {} field, {} method, {} indy rows, {} references ({} bytes)",
            self.fields.len(),
            self.methods.len(),
            self.indys.len(),
            self.references.len(),
            footprint
        );

        Ok(ResolutionCache::new(
            pool,
            fields,
            methods,
            indys,
            ResolvedReferences::new(origins.into_boxed_slice()),
        ))
    }
}

fn allocate_table<P, T>(
    placeholders: &[P],
    what: &str,
    make: impl Fn(&P) -> T,
) -> Result<Option<Box<[T]>>> {
    if placeholders.is_empty() {
        return Ok(None);
    }

    let mut table = Vec::new();
    table
        .try_reserve_exact(placeholders.len())
        .map_err(|e| Error::AllocationFailure(format!("{}: {}", what, e)))?;
    table.extend(placeholders.iter().map(make));
    Ok(Some(table.into_boxed_slice()))
}

impl OperandMap for EntryStore {
    fn field_cp_index(&self, row: u16) -> Option<u16> {
        self.fields.get(usize::from(row)).copied()
    }

    fn method_cp_index(&self, row: u16) -> Option<u16> {
        self.methods.get(usize::from(row)).map(|m| m.cp_index)
    }

    fn indy_cp_index(&self, row: u32) -> Option<u16> {
        self.indys
            .get(usize::try_from(row).ok()?)
            .map(|i| i.cp_index)
    }

    fn reference_cp_index(&self, slot: u16) -> Option<u16> {
        match self.references.get(usize::from(slot))? {
            ReferenceOrigin::Constant(cp_index) => Some(*cp_index),
            _ => None,
        }
    }
}
