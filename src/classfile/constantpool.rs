//! Constant pool model and builder.
//!
//! The pool is produced by an external class-file parser and is immutable once built. The
//! rewriter reads it to classify entries and the resolution cache keeps a shared handle to it so
//! every cache row can be traced back to the symbolic reference it was created for.
//!
//! # Examples
//!
//! ```rust
//! use classlink::classfile::{ConstantPoolBuilder, ConstantTag};
//!
//! let mut builder = ConstantPoolBuilder::new();
//! let field = builder.add_fieldref("demo/Point", "x", "I")?;
//! let pool = builder.build();
//!
//! assert_eq!(pool.tag_at(field)?, ConstantTag::Fieldref);
//! let member = pool.member_ref_at(field)?;
//! assert_eq!(member.class_name, "demo/Point");
//! # Ok::<(), classlink::Error>(())
//! ```

use std::collections::HashMap;

use strum::{EnumCount, EnumIter, FromRepr};

use crate::{classfile::descriptor::is_reference_descriptor, Result};

/// Tag byte of a constant pool entry, as defined by the class file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, FromRepr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConstantTag {
    /// Index 0 and the slot following a `Long` or `Double`
    Invalid = 0,
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    Fieldref = 9,
    Methodref = 10,
    InterfaceMethodref = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

impl ConstantTag {
    /// True for the tags whose entries are resolved into the shared reference array.
    #[must_use]
    pub fn is_reference_constant(self) -> bool {
        matches!(
            self,
            ConstantTag::String
                | ConstantTag::MethodHandle
                | ConstantTag::MethodType
                | ConstantTag::Dynamic
        )
    }
}

/// A single constant pool entry.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ConstantPoolEntry {
    /// Index 0 and the second slot of a `Long` or `Double`
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
}

impl ConstantPoolEntry {
    /// The tag byte of this entry
    #[must_use]
    pub fn tag(&self) -> ConstantTag {
        match self {
            ConstantPoolEntry::Unusable => ConstantTag::Invalid,
            ConstantPoolEntry::Utf8(_) => ConstantTag::Utf8,
            ConstantPoolEntry::Integer(_) => ConstantTag::Integer,
            ConstantPoolEntry::Float(_) => ConstantTag::Float,
            ConstantPoolEntry::Long(_) => ConstantTag::Long,
            ConstantPoolEntry::Double(_) => ConstantTag::Double,
            ConstantPoolEntry::Class { .. } => ConstantTag::Class,
            ConstantPoolEntry::String { .. } => ConstantTag::String,
            ConstantPoolEntry::Fieldref { .. } => ConstantTag::Fieldref,
            ConstantPoolEntry::Methodref { .. } => ConstantTag::Methodref,
            ConstantPoolEntry::InterfaceMethodref { .. } => ConstantTag::InterfaceMethodref,
            ConstantPoolEntry::NameAndType { .. } => ConstantTag::NameAndType,
            ConstantPoolEntry::MethodHandle { .. } => ConstantTag::MethodHandle,
            ConstantPoolEntry::MethodType { .. } => ConstantTag::MethodType,
            ConstantPoolEntry::Dynamic { .. } => ConstantTag::Dynamic,
            ConstantPoolEntry::InvokeDynamic { .. } => ConstantTag::InvokeDynamic,
            ConstantPoolEntry::Module { .. } => ConstantTag::Module,
            ConstantPoolEntry::Package { .. } => ConstantTag::Package,
        }
    }
}

/// A symbolic member reference (`Fieldref`, `Methodref` or `InterfaceMethodref`) with all
/// indirections followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the class the member is declared against
    pub class_name: &'a str,
    /// Member name
    pub name: &'a str,
    /// Field or method descriptor
    pub descriptor: &'a str,
}

/// An immutable, parsed constant pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolEntry>,
}

impl ConstantPool {
    /// Create a pool from raw entries. Index 0 must be [`ConstantPoolEntry::Unusable`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is empty, slot 0 is used or the pool holds
    /// more entries than a two-byte index can address.
    pub fn new(entries: Vec<ConstantPoolEntry>) -> Result<Self> {
        match entries.first() {
            Some(ConstantPoolEntry::Unusable) => {}
            _ => return Err(malformed_error!("Constant pool slot 0 must be unusable")),
        }

        if entries.len() > usize::from(u16::MAX) {
            return Err(malformed_error!(
                "Constant pool too large - {} entries",
                entries.len()
            ));
        }

        Ok(ConstantPool { entries })
    }

    /// Number of slots, including the unusable slot 0
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the pool has no usable entry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterate over `(index, entry)` pairs, skipping slot 0
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantPoolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(index, entry)| u16::try_from(index).ok().map(|index| (index, entry)))
    }

    /// Fetch the entry at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for indices past the end of the pool.
    pub fn get(&self, index: u16) -> Result<&ConstantPoolEntry> {
        self.entries
            .get(usize::from(index))
            .ok_or(crate::Error::OutOfBounds)
    }

    /// Tag of the entry at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for indices past the end of the pool.
    pub fn tag_at(&self, index: u16) -> Result<ConstantTag> {
        Ok(self.get(index)?.tag())
    }

    /// The string stored in the `Utf8` entry at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not `Utf8`.
    pub fn utf8_at(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Utf8(value) => Ok(value),
            other => Err(malformed_error!(
                "Expected Utf8 at #{}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// The internal class name referenced by the `Class` entry at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a `Class`.
    pub fn klass_name_at(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Class { name_index } => self.utf8_at(*name_index),
            other => Err(malformed_error!(
                "Expected Class at #{}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Name and descriptor of the `NameAndType` entry at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a `NameAndType`.
    pub fn name_and_type_at(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8_at(*name_index)?, self.utf8_at(*descriptor_index)?)),
            other => Err(malformed_error!(
                "Expected NameAndType at #{}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve the symbolic member reference at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a member reference.
    pub fn member_ref_at(&self, index: u16) -> Result<MemberRef<'_>> {
        match self.get(index)? {
            ConstantPoolEntry::Fieldref {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolEntry::Methodref {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type_at(*name_and_type_index)?;
                Ok(MemberRef {
                    class_name: self.klass_name_at(*class_index)?,
                    name,
                    descriptor,
                })
            }
            other => Err(malformed_error!(
                "Expected member reference at #{}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Name and descriptor of the `Dynamic` or `InvokeDynamic` entry at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is neither.
    pub fn dynamic_name_and_type_at(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            ConstantPoolEntry::Dynamic {
                name_and_type_index,
                ..
            }
            | ConstantPoolEntry::InvokeDynamic {
                name_and_type_index,
                ..
            } => self.name_and_type_at(*name_and_type_index),
            other => Err(malformed_error!(
                "Expected dynamic constant at #{}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// True if the entry at `index` is a `Dynamic` constant of object or array type.
    ///
    /// Dynamic constants of primitive type are not cached in the reference array.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not `Dynamic`.
    pub fn is_reference_dynamic(&self, index: u16) -> Result<bool> {
        match self.get(index)? {
            ConstantPoolEntry::Dynamic { .. } => {
                let (_, descriptor) = self.dynamic_name_and_type_at(index)?;
                Ok(is_reference_descriptor(descriptor))
            }
            other => Err(malformed_error!(
                "Expected Dynamic at #{}, found {:?}",
                index,
                other.tag()
            )),
        }
    }
}

/// Incremental constructor for [`ConstantPool`].
///
/// `Utf8`, `Class` and `NameAndType` entries are de-duplicated. Member references are always
/// appended, so a pool may carry several identical references at distinct indices, as class
/// files produced by some compilers do.
#[derive(Debug, Default)]
pub struct ConstantPoolBuilder {
    entries: Vec<ConstantPoolEntry>,
    utf8: HashMap<String, u16>,
    classes: HashMap<u16, u16>,
    name_and_types: HashMap<(u16, u16), u16>,
}

impl ConstantPoolBuilder {
    /// Create an empty builder. Slot 0 is reserved automatically.
    #[must_use]
    pub fn new() -> Self {
        ConstantPoolBuilder {
            entries: vec![ConstantPoolEntry::Unusable],
            ..Default::default()
        }
    }

    /// Append a raw entry and return its index. `Long` and `Double` take two slots.
    ///
    /// # Errors
    /// Returns [`crate::Error::RewriteOverflow`] once the pool would exceed two-byte indices.
    pub fn push(&mut self, entry: ConstantPoolEntry) -> Result<u16> {
        let wide = matches!(
            entry,
            ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_)
        );
        let needed = if wide { 2 } else { 1 };
        if self.entries.len() + needed > usize::from(u16::MAX) {
            return Err(crate::Error::RewriteOverflow(format!(
                "constant pool exceeds {} entries",
                u16::MAX
            )));
        }

        let index = u16::try_from(self.entries.len())
            .map_err(|_| malformed_error!("Constant pool index overflow"))?;
        self.entries.push(entry);
        if wide {
            self.entries.push(ConstantPoolEntry::Unusable);
        }
        Ok(index)
    }

    /// Add (or reuse) a `Utf8` entry
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        if let Some(index) = self.utf8.get(value) {
            return Ok(*index);
        }

        let index = self.push(ConstantPoolEntry::Utf8(value.to_string()))?;
        self.utf8.insert(value.to_string(), index);
        Ok(index)
    }

    /// Add (or reuse) a `Class` entry for an internal class name
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        if let Some(index) = self.classes.get(&name_index) {
            return Ok(*index);
        }

        let index = self.push(ConstantPoolEntry::Class { name_index })?;
        self.classes.insert(name_index, index);
        Ok(index)
    }

    /// Add (or reuse) a `NameAndType` entry
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        if let Some(index) = self.name_and_types.get(&(name_index, descriptor_index)) {
            return Ok(*index);
        }

        let index = self.push(ConstantPoolEntry::NameAndType {
            name_index,
            descriptor_index,
        })?;
        self.name_and_types
            .insert((name_index, descriptor_index), index);
        Ok(index)
    }

    /// Add a `String` constant
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.add_utf8(value)?;
        self.push(ConstantPoolEntry::String { string_index })
    }

    /// Add an `Integer` constant
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.push(ConstantPoolEntry::Integer(value))
    }

    /// Add a `Long` constant, occupying two slots
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.push(ConstantPoolEntry::Long(value))
    }

    /// Add a `Fieldref`
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.push(ConstantPoolEntry::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    /// Add a `Methodref`
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_methodref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.push(ConstantPoolEntry::Methodref {
            class_index,
            name_and_type_index,
        })
    }

    /// Add an `InterfaceMethodref`
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_interface_methodref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.push(ConstantPoolEntry::InterfaceMethodref {
            class_index,
            name_and_type_index,
        })
    }

    /// Add a `MethodHandle` for an existing member reference
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_method_handle(&mut self, reference_kind: u8, reference_index: u16) -> Result<u16> {
        self.push(ConstantPoolEntry::MethodHandle {
            reference_kind,
            reference_index,
        })
    }

    /// Add a `MethodType`
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_method_type(&mut self, descriptor: &str) -> Result<u16> {
        let descriptor_index = self.add_utf8(descriptor)?;
        self.push(ConstantPoolEntry::MethodType { descriptor_index })
    }

    /// Add a `Dynamic` constant
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> Result<u16> {
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.push(ConstantPoolEntry::Dynamic {
            bootstrap_method_attr_index: bootstrap,
            name_and_type_index,
        })
    }

    /// Add an `InvokeDynamic` call site specifier
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_invokedynamic(
        &mut self,
        bootstrap: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.push(ConstantPoolEntry::InvokeDynamic {
            bootstrap_method_attr_index: bootstrap,
            name_and_type_index,
        })
    }

    /// Number of slots allocated so far, including slot 0
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing but slot 0 has been allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Finish the pool
    #[must_use]
    pub fn build(self) -> ConstantPool {
        ConstantPool {
            entries: self.entries,
        }
    }
}
