use std::{
    fmt,
    sync::{
        atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering},
        OnceLock,
    },
};

use bitflags::bitflags;

use crate::{
    bytecode::{instructions::name, opcodes},
    classfile::ResultType,
    resolution::{ClassId, MethodLink, MethodRc, MethodTarget},
    Error, Result,
};

bitflags! {
    /// Flags recorded on a method entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodEntryFlags: u8 {
        /// `invokevirtual` binds directly to the stored method
        const FINAL = 0x01;
        /// `invokeinterface` of a root-class method, dispatched as `invokevirtual`
        const FORCED_VIRTUAL = 0x02;
        /// The call passes an appendix from the resolved references
        const HAS_APPENDIX = 0x04;
        /// The adapter's signature differs from the symbolic one
        const HAS_LOCAL_SIGNATURE = 0x08;
        /// A resolved-reference slot was reserved for this entry at rewrite time
        const HAS_RESOLVED_REF = 0x10;
    }
}

/// The mutually exclusive per-kind datum of a method entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodPayload {
    /// Nothing recorded
    None,
    /// Declaring interface, for `invokeinterface`
    Interface(ClassId),
    /// Resolved-reference slot holding the appendix, for `invokehandle`
    AppendixSlot(u16),
    /// Virtual table index, for non-final `invokevirtual`
    TableIndex(u16),
}

const PAYLOAD_NONE: u8 = 0;
const PAYLOAD_INTERFACE: u8 = 1;
const PAYLOAD_APPENDIX: u8 = 2;
const PAYLOAD_TABLE_INDEX: u8 = 3;

impl MethodPayload {
    fn encode(self) -> (u8, u32) {
        match self {
            MethodPayload::None => (PAYLOAD_NONE, 0),
            MethodPayload::Interface(class) => (PAYLOAD_INTERFACE, class.0),
            MethodPayload::AppendixSlot(slot) => (PAYLOAD_APPENDIX, u32::from(slot)),
            MethodPayload::TableIndex(index) => (PAYLOAD_TABLE_INDEX, u32::from(index)),
        }
    }

    fn decode(kind: u8, value: u32) -> Self {
        // Slot and table values were widened from u16 by `encode`
        let narrow = u16::try_from(value).unwrap_or(u16::MAX);
        match kind {
            PAYLOAD_INTERFACE => MethodPayload::Interface(ClassId(value)),
            PAYLOAD_APPENDIX => MethodPayload::AppendixSlot(narrow),
            PAYLOAD_TABLE_INDEX => MethodPayload::TableIndex(narrow),
            _ => MethodPayload::None,
        }
    }
}

/// A consistent snapshot of a resolved method entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    /// The bound method. A virtual call dispatched through the table index leaves it `None`,
    /// unless a direct call on the same row has already bound one; dispatch then still goes
    /// through the [`MethodPayload::TableIndex`].
    pub method: Option<MethodRc>,
    /// Per-kind datum
    pub payload: MethodPayload,
    /// Entry flags
    pub flags: MethodEntryFlags,
    /// Argument slots, including the receiver
    pub parameter_size: u16,
    /// Return kind
    pub result_type: ResultType,
}

/// Resolution state of one method row.
///
/// A row is shared by every invoke of its `Methodref`/`InterfaceMethodref`, except that
/// `invokespecial` of an `InterfaceMethodref` gets a private row. `invokespecial` and
/// `invokevirtual` may alias one row: the former publishes through `bytecode1` and the latter
/// through `bytecode2`.
#[derive(Debug)]
pub struct ResolvedMethodEntry {
    method: OnceLock<MethodRc>,
    payload_kind: AtomicU8,
    payload_value: AtomicU32,
    cp_index: u16,
    parameter_size: AtomicU16,
    result_type: AtomicU8,
    flags: AtomicU8,
    bytecode1: AtomicU8,
    bytecode2: AtomicU8,
}

impl ResolvedMethodEntry {
    /// An unresolved entry for the method reference at `cp_index`
    #[must_use]
    pub fn new(cp_index: u16) -> Self {
        ResolvedMethodEntry {
            method: OnceLock::new(),
            payload_kind: AtomicU8::new(PAYLOAD_NONE),
            payload_value: AtomicU32::new(0),
            cp_index,
            parameter_size: AtomicU16::new(0),
            result_type: AtomicU8::new(0),
            flags: AtomicU8::new(0),
            bytecode1: AtomicU8::new(0),
            bytecode2: AtomicU8::new(0),
        }
    }

    /// An unresolved entry that owns the resolved-reference slot `appendix_slot`
    #[must_use]
    pub fn with_appendix_slot(cp_index: u16, appendix_slot: u16) -> Self {
        let entry = Self::new(cp_index);
        let (kind, value) = MethodPayload::AppendixSlot(appendix_slot).encode();
        entry.payload_kind.store(kind, Ordering::Relaxed);
        entry.payload_value.store(value, Ordering::Relaxed);
        entry
            .flags
            .store(MethodEntryFlags::HAS_RESOLVED_REF.bits(), Ordering::Relaxed);
        entry
    }

    /// The method reference this row was created for
    #[must_use]
    pub fn constant_pool_index(&self) -> u16 {
        self.cp_index
    }

    /// The resolved-reference slot reserved for this row's appendix, if any
    #[must_use]
    pub fn appendix_slot(&self) -> Option<u16> {
        if !self.flags().contains(MethodEntryFlags::HAS_RESOLVED_REF) {
            return None;
        }
        match self.payload() {
            MethodPayload::AppendixSlot(slot) => Some(slot),
            _ => None,
        }
    }

    /// Opcode published through the first slot, 0 while unresolved
    #[must_use]
    pub fn bytecode1(&self) -> u8 {
        self.bytecode1.load(Ordering::Acquire)
    }

    /// Opcode published through the second slot, 0 while unresolved
    #[must_use]
    pub fn bytecode2(&self) -> u8 {
        self.bytecode2.load(Ordering::Acquire)
    }

    /// Current flags
    #[must_use]
    pub fn flags(&self) -> MethodEntryFlags {
        MethodEntryFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    /// Current payload
    #[must_use]
    pub fn payload(&self) -> MethodPayload {
        MethodPayload::decode(
            self.payload_kind.load(Ordering::Relaxed),
            self.payload_value.load(Ordering::Relaxed),
        )
    }

    /// The stored method, without checking publication
    #[must_use]
    pub fn method(&self) -> Option<&MethodRc> {
        self.method.get()
    }

    /// True if `bytecode` may use this row without resolving
    #[must_use]
    pub fn is_resolved(&self, bytecode: u8) -> bool {
        match bytecode {
            opcodes::INVOKEVIRTUAL => self.bytecode2() == bytecode,
            opcodes::INVOKESTATIC
            | opcodes::INVOKESPECIAL
            | opcodes::INVOKEINTERFACE
            | opcodes::INVOKEHANDLE => self.bytecode1() == bytecode,
            _ => false,
        }
    }

    /// Acquire-probe the row for `bytecode`
    #[must_use]
    pub fn probe(&self, bytecode: u8) -> Option<ResolvedMethod> {
        if self.is_resolved(bytecode) {
            Some(self.snapshot())
        } else {
            None
        }
    }

    fn snapshot(&self) -> ResolvedMethod {
        ResolvedMethod {
            method: self.method.get().cloned(),
            payload: self.payload(),
            flags: self.flags(),
            parameter_size: self.parameter_size.load(Ordering::Relaxed),
            result_type: ResultType::from_byte(self.result_type.load(Ordering::Relaxed))
                .unwrap_or(ResultType::Void),
        }
    }

    fn set_payload(&self, payload: MethodPayload) {
        let (kind, value) = payload.encode();
        self.payload_value.store(value, Ordering::Relaxed);
        self.payload_kind.store(kind, Ordering::Relaxed);
    }

    fn write_common(&self, method: &MethodRc, flags: MethodEntryFlags) {
        self.parameter_size
            .store(method.parameter_size, Ordering::Relaxed);
        self.result_type
            .store(method.result_type as u8, Ordering::Relaxed);
        self.flags.fetch_or(flags.bits(), Ordering::Relaxed);
    }

    /// Publish an ordinary invoke resolution for `bytecode`.
    ///
    /// The method and payload are written first, then flags, then the opcode slot with a release
    /// store. Racing threads publish identical content.
    ///
    /// # Errors
    /// Returns [`Error::InvariantViolation`] if the target kind cannot serve `bytecode`.
    pub(crate) fn fill_in(&self, bytecode: u8, link: &MethodLink) -> Result<()> {
        let method = &link.method;
        match (bytecode, link.target) {
            (opcodes::INVOKESTATIC | opcodes::INVOKESPECIAL, MethodTarget::Direct) => {
                let _ = self.method.set(method.clone());
                self.write_common(method, MethodEntryFlags::empty());
                self.bytecode1.store(bytecode, Ordering::Release);
            }
            (opcodes::INVOKEVIRTUAL, MethodTarget::VirtualFinal) => {
                let _ = self.method.set(method.clone());
                self.write_common(method, MethodEntryFlags::FINAL);
                self.bytecode2.store(bytecode, Ordering::Release);
            }
            (opcodes::INVOKEVIRTUAL, MethodTarget::Virtual { vtable_index }) => {
                self.set_payload(MethodPayload::TableIndex(vtable_index));
                self.write_common(method, MethodEntryFlags::empty());
                self.bytecode2.store(bytecode, Ordering::Release);
            }
            (opcodes::INVOKEINTERFACE, MethodTarget::Interface { interface }) => {
                self.set_payload(MethodPayload::Interface(interface));
                let _ = self.method.set(method.clone());
                self.write_common(method, MethodEntryFlags::empty());
                self.bytecode1.store(bytecode, Ordering::Release);
            }
            (opcodes::INVOKEINTERFACE, MethodTarget::ForcedVirtualFinal) => {
                let _ = self.method.set(method.clone());
                self.write_common(
                    method,
                    MethodEntryFlags::FORCED_VIRTUAL | MethodEntryFlags::FINAL,
                );
                self.bytecode1.store(bytecode, Ordering::Release);
                self.bytecode2
                    .store(opcodes::INVOKEVIRTUAL, Ordering::Release);
            }
            (opcodes::INVOKEINTERFACE, MethodTarget::ForcedVirtual { vtable_index }) => {
                self.set_payload(MethodPayload::TableIndex(vtable_index));
                self.write_common(method, MethodEntryFlags::FORCED_VIRTUAL);
                self.bytecode1.store(bytecode, Ordering::Release);
                self.bytecode2
                    .store(opcodes::INVOKEVIRTUAL, Ordering::Release);
            }
            (bytecode, target) => {
                return Err(Error::InvariantViolation(format!(
                    "{:?} cannot serve {} of method #{}",
                    target,
                    name(bytecode),
                    self.cp_index
                )))
            }
        }

        log::trace!("published {} for method #{}", name(bytecode), self.cp_index);
        Ok(())
    }

    /// Publish an `invokehandle` resolution. Must run inside the per-class critical section,
    /// after the appendix (if any) has been stored in the resolved references.
    pub(crate) fn fill_in_handle(&self, adapter: &MethodRc, has_appendix: bool) {
        let _ = self.method.set(adapter.clone());
        let mut flags = MethodEntryFlags::FINAL | MethodEntryFlags::HAS_LOCAL_SIGNATURE;
        flags.set(MethodEntryFlags::HAS_APPENDIX, has_appendix);
        self.write_common(adapter, flags);
        self.bytecode1
            .store(opcodes::INVOKEHANDLE, Ordering::Release);
        log::trace!("published invokehandle for method #{}", self.cp_index);
    }

    /// Repoint a resolved row at a superseding method body
    pub(crate) fn replace_method(&mut self, method: MethodRc) {
        self.method = OnceLock::from(method);
    }

    /// Return to the unresolved state. The constant-pool index and a reserved appendix slot
    /// survive.
    pub(crate) fn reset(&mut self) {
        *self = match self.appendix_slot() {
            Some(slot) => ResolvedMethodEntry::with_appendix_slot(self.cp_index, slot),
            None => ResolvedMethodEntry::new(self.cp_index),
        };
    }

    /// True if any opcode slot is published
    #[must_use]
    pub fn is_any_resolved(&self) -> bool {
        self.bytecode1() != 0 || self.bytecode2() != 0
    }
}

impl fmt::Display for ResolvedMethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method #{}", self.cp_index)?;
        if let Some(slot) = self.appendix_slot() {
            write!(f, " appendix-slot={}", slot)?;
        }
        if !self.is_any_resolved() {
            return f.write_str(" unresolved");
        }

        let (b1, b2) = (self.bytecode1(), self.bytecode2());
        if b1 != 0 {
            write!(f, " {}", name(b1))?;
        }
        if b2 != 0 {
            write!(f, " {}", name(b2))?;
        }
        if let Some(method) = self.method.get() {
            write!(f, " -> {}", method)?;
        }
        match self.payload() {
            MethodPayload::TableIndex(index) => write!(f, " vtable={}", index)?,
            MethodPayload::Interface(class) => write!(f, " interface={}", class)?,
            _ => {}
        }
        write!(f, " flags={:?}", self.flags())
    }
}
