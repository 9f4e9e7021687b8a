//! Method bodies as seen by class preparation.

use bitflags::bitflags;

bitflags! {
    /// Access flags of a method, as stored in the class file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAccessFlags: u16 {
        /// Declared `public`
        const PUBLIC = 0x0001;
        /// Declared `private`
        const PRIVATE = 0x0002;
        /// Declared `protected`
        const PROTECTED = 0x0004;
        /// Declared `static`
        const STATIC = 0x0008;
        /// Declared `final`
        const FINAL = 0x0010;
        /// Declared `synchronized`
        const SYNCHRONIZED = 0x0020;
        /// A bridge method, generated by the compiler
        const BRIDGE = 0x0040;
        /// Declared with variable number of arguments
        const VARARGS = 0x0080;
        /// Declared `native`
        const NATIVE = 0x0100;
        /// Declared `abstract`
        const ABSTRACT = 0x0400;
        /// Declared `strictfp`
        const STRICT = 0x0800;
        /// Not present in the source code
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Facts about a method body collected while its bytecode is rewritten.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u8 {
        /// Contains `jsr` or `jsr_w`; a later stack-map driven pass has to inline subroutines
        const HAS_JSR = 0x01;
        /// Contains `monitorenter` or `monitorexit`
        const HAS_MONITOR_BYTECODES = 0x02;
    }
}

/// Name of instance initialisers
pub const OBJECT_INITIALIZER_NAME: &str = "<init>";

/// A method and its mutable code buffer.
///
/// The code buffer is owned by the method and patched in place during rewriting. Bytecode
/// indices (bci) are offsets from the start of this buffer; `tableswitch` and `lookupswitch`
/// padding is computed relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCode {
    /// Method name, e.g. `<init>`
    pub name: String,
    /// Method descriptor, e.g. `(I)V`
    pub descriptor: String,
    /// Access flags
    pub access: MethodAccessFlags,
    /// Number of local variable slots
    pub max_locals: u16,
    /// The bytecode
    pub code: Vec<u8>,
    flags: MethodFlags,
}

impl MethodCode {
    /// Create a new method with the given bytecode
    pub fn new(
        name: impl Into<String>,
        descriptor: impl Into<String>,
        access: MethodAccessFlags,
        code: Vec<u8>,
    ) -> Self {
        MethodCode {
            name: name.into(),
            descriptor: descriptor.into(),
            access,
            max_locals: 0,
            code,
            flags: MethodFlags::empty(),
        }
    }

    /// Builder-style setter for `max_locals`
    #[must_use]
    pub fn with_max_locals(mut self, max_locals: u16) -> Self {
        self.max_locals = max_locals;
        self
    }

    /// True for `<init>` methods
    #[must_use]
    pub fn is_object_initializer(&self) -> bool {
        self.name == OBJECT_INITIALIZER_NAME
    }

    /// True if the method is `static`
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    /// Bookkeeping flags gathered during rewriting
    #[must_use]
    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    /// Contains `jsr`/`jsr_w`
    #[must_use]
    pub fn has_jsr(&self) -> bool {
        self.flags.contains(MethodFlags::HAS_JSR)
    }

    /// Contains `monitorenter`/`monitorexit`
    #[must_use]
    pub fn has_monitor_bytecodes(&self) -> bool {
        self.flags.contains(MethodFlags::HAS_MONITOR_BYTECODES)
    }

    pub(crate) fn set_flags(&mut self, flags: MethodFlags) {
        self.flags = flags;
    }
}
