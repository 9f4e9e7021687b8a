use std::{
    fmt,
    sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering},
};

use bitflags::bitflags;

use crate::{
    bytecode::{instructions::name, opcodes},
    classfile::ResultType,
    resolution::{ClassId, FieldLink},
};

bitflags! {
    /// Flags recorded on a resolved field entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldEntryFlags: u8 {
        /// The field is `final`
        const FINAL = 0x01;
        /// The field is `volatile`
        const VOLATILE = 0x02;
    }
}

/// A consistent snapshot of a resolved field entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    /// Declaring class
    pub holder: ClassId,
    /// Byte offset of the field
    pub offset: u32,
    /// Index in the holder's field list
    pub field_index: u16,
    /// Field type
    pub result_type: ResultType,
    /// Entry flags
    pub flags: FieldEntryFlags,
}

/// Resolution state of one `Fieldref` used by field access instructions.
///
/// The entry is published through its two opcode slots: `get_code` is set to `getfield` or
/// `getstatic` and `put_code` to `putfield` or `putstatic` once the corresponding access may skip
/// resolution. Every other field is written before the opcodes with relaxed stores and read after
/// an acquire load of the opcode.
#[derive(Debug)]
pub struct ResolvedFieldEntry {
    holder: AtomicU32,
    offset: AtomicU32,
    field_index: AtomicU16,
    result_type: AtomicU8,
    flags: AtomicU8,
    get_code: AtomicU8,
    put_code: AtomicU8,
    cp_index: u16,
}

impl ResolvedFieldEntry {
    /// An unresolved entry for the `Fieldref` at `cp_index`
    #[must_use]
    pub fn new(cp_index: u16) -> Self {
        ResolvedFieldEntry {
            holder: AtomicU32::new(0),
            offset: AtomicU32::new(0),
            field_index: AtomicU16::new(0),
            result_type: AtomicU8::new(0),
            flags: AtomicU8::new(0),
            get_code: AtomicU8::new(0),
            put_code: AtomicU8::new(0),
            cp_index,
        }
    }

    /// The `Fieldref` this entry was created for
    #[must_use]
    pub fn constant_pool_index(&self) -> u16 {
        self.cp_index
    }

    /// The published get opcode, 0 while unresolved
    #[must_use]
    pub fn get_code(&self) -> u8 {
        self.get_code.load(Ordering::Acquire)
    }

    /// The published put opcode, 0 while unresolved
    #[must_use]
    pub fn put_code(&self) -> u8 {
        self.put_code.load(Ordering::Acquire)
    }

    fn code_slot(&self, bytecode: u8) -> Option<&AtomicU8> {
        match bytecode {
            opcodes::GETFIELD | opcodes::GETSTATIC => Some(&self.get_code),
            opcodes::PUTFIELD | opcodes::PUTSTATIC => Some(&self.put_code),
            _ => None,
        }
    }

    /// True if `bytecode` may use this entry without resolving
    #[must_use]
    pub fn is_resolved(&self, bytecode: u8) -> bool {
        self.code_slot(bytecode)
            .is_some_and(|slot| slot.load(Ordering::Acquire) == bytecode)
    }

    /// Acquire-probe the entry for `bytecode`. Returns the resolved state only once it is
    /// published for that access kind.
    #[must_use]
    pub fn probe(&self, bytecode: u8) -> Option<ResolvedField> {
        if self.is_resolved(bytecode) {
            Some(self.read_fields())
        } else {
            None
        }
    }

    fn read_fields(&self) -> ResolvedField {
        ResolvedField {
            holder: ClassId(self.holder.load(Ordering::Relaxed)),
            offset: self.offset.load(Ordering::Relaxed),
            field_index: self.field_index.load(Ordering::Relaxed),
            result_type: ResultType::from_byte(self.result_type.load(Ordering::Relaxed))
                .unwrap_or(ResultType::Void),
            flags: FieldEntryFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed)),
        }
    }

    /// Publish a resolution. Fields first, then flags, then the opcodes with release stores.
    ///
    /// A `None` opcode leaves that slot untouched so the access keeps resolving.
    pub(crate) fn fill_in(&self, link: &FieldLink, get_code: Option<u8>, put_code: Option<u8>) {
        self.holder.store(link.holder.0, Ordering::Relaxed);
        self.offset.store(link.offset, Ordering::Relaxed);
        self.field_index.store(link.field_index, Ordering::Relaxed);
        self.result_type
            .store(link.result_type as u8, Ordering::Relaxed);

        let mut flags = FieldEntryFlags::empty();
        flags.set(FieldEntryFlags::FINAL, link.is_final);
        flags.set(FieldEntryFlags::VOLATILE, link.is_volatile);
        self.flags.store(flags.bits(), Ordering::Relaxed);

        if let Some(code) = get_code {
            self.get_code.store(code, Ordering::Release);
        }
        if let Some(code) = put_code {
            self.put_code.store(code, Ordering::Release);
        }
    }

    /// Return to the unresolved state, keeping the constant-pool index
    pub(crate) fn reset(&mut self) {
        *self = ResolvedFieldEntry::new(self.cp_index);
    }
}

impl fmt::Display for ResolvedFieldEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field #{}", self.cp_index)?;
        let (get, put) = (self.get_code(), self.put_code());
        if get == 0 && put == 0 {
            return f.write_str(" unresolved");
        }

        let fields = self.read_fields();
        write!(
            f,
            " holder={} offset={} index={} type={:?} flags={:?}",
            fields.holder, fields.offset, fields.field_index, fields.result_type, fields.flags
        )?;
        if get != 0 {
            write!(f, " get={}", name(get))?;
        }
        if put != 0 {
            write!(f, " put={}", name(put))?;
        }
        Ok(())
    }
}
