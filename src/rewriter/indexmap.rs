//! First rewriting pass: dense cache slots for constant-pool entries.

use crate::{
    cache::{EntryStore, ReferenceOrigin},
    classfile::{ConstantPool, ConstantTag, MemberRef},
    Result,
};

const METHOD_HANDLE: &str = "java/lang/invoke/MethodHandle";
const VAR_HANDLE: &str = "java/lang/invoke/VarHandle";

const METHOD_HANDLE_INVOKERS: &[&str] = &["invoke", "invokeExact", "invokeBasic"];

const VAR_HANDLE_ACCESS_MODES: &[&str] = &[
    "get",
    "set",
    "getVolatile",
    "setVolatile",
    "getAcquire",
    "setRelease",
    "getOpaque",
    "setOpaque",
    "compareAndSet",
    "compareAndExchange",
    "compareAndExchangeAcquire",
    "compareAndExchangeRelease",
    "weakCompareAndSetPlain",
    "weakCompareAndSet",
    "weakCompareAndSetAcquire",
    "weakCompareAndSetRelease",
    "getAndSet",
    "getAndSetAcquire",
    "getAndSetRelease",
    "getAndAdd",
    "getAndAddAcquire",
    "getAndAddRelease",
    "getAndBitwiseOr",
    "getAndBitwiseOrRelease",
    "getAndBitwiseOrAcquire",
    "getAndBitwiseAnd",
    "getAndBitwiseAndRelease",
    "getAndBitwiseAndAcquire",
    "getAndBitwiseXor",
    "getAndBitwiseXorRelease",
    "getAndBitwiseXorAcquire",
];

/// True if `member` names a signature-polymorphic instance method, whose call sites are linked
/// through an adapter rather than the named method itself.
#[must_use]
pub fn is_signature_polymorphic(member: &MemberRef<'_>) -> bool {
    match member.class_name {
        METHOD_HANDLE => METHOD_HANDLE_INVOKERS.contains(&member.name),
        VAR_HANDLE => VAR_HANDLE_ACCESS_MODES.contains(&member.name),
        _ => false,
    }
}

/// Constant-pool index to cache slot, one lookup per table kind.
///
/// Scratch data of a single rewrite. Invokedynamic entries are absent: their rows belong to
/// call sites and are allocated by the scanner.
#[derive(Debug, Default)]
pub struct IndexMap {
    field_rows: Vec<Option<u16>>,
    method_rows: Vec<Option<u16>>,
    reference_slots: Vec<Option<u16>>,
}

impl IndexMap {
    /// Walk `pool` once, assigning rows in constant-pool order and recording the matching
    /// placeholders in `store`.
    ///
    /// Every `Dynamic` constant gets a reference slot, primitive ones included, so the
    /// constant-backed prefix of the resolved references stays in pool order.
    ///
    /// # Errors
    /// Returns [`crate::Error::RewriteOverflow`] if any table outgrows two-byte indices.
    pub fn build(pool: &ConstantPool, store: &mut EntryStore) -> Result<Self> {
        let mut map = IndexMap {
            field_rows: vec![None; pool.len()],
            method_rows: vec![None; pool.len()],
            reference_slots: vec![None; pool.len()],
        };

        for (cp_index, entry) in pool.iter() {
            let at = usize::from(cp_index);
            match entry.tag() {
                ConstantTag::Fieldref => {
                    map.field_rows[at] = Some(store.add_field(cp_index)?);
                }
                ConstantTag::Methodref | ConstantTag::InterfaceMethodref => {
                    map.method_rows[at] = Some(store.add_method(cp_index)?);
                }
                tag if tag.is_reference_constant() => {
                    map.reference_slots[at] =
                        Some(store.add_reference(ReferenceOrigin::Constant(cp_index))?);
                }
                _ => {}
            }
        }

        log::trace!(
            "index map: {} fields, {} methods, {} reference constants",
            store.field_count(),
            store.method_count(),
            store.reference_count()
        );
        Ok(map)
    }

    /// Field row assigned to the `Fieldref` at `cp_index`
    #[must_use]
    pub fn field_row(&self, cp_index: u16) -> Option<u16> {
        self.field_rows.get(usize::from(cp_index)).copied().flatten()
    }

    /// Method row assigned to the method reference at `cp_index`
    #[must_use]
    pub fn method_row(&self, cp_index: u16) -> Option<u16> {
        self.method_rows.get(usize::from(cp_index)).copied().flatten()
    }

    /// Reference slot assigned to the constant at `cp_index`
    #[must_use]
    pub fn reference_slot(&self, cp_index: u16) -> Option<u16> {
        self.reference_slots
            .get(usize::from(cp_index))
            .copied()
            .flatten()
    }
}
