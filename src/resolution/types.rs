use std::{fmt, sync::Arc};

use crate::{
    classfile::{descriptor::parameter_slots, MethodAccessFlags, ResultType},
    Result,
};

/// Opaque identity of a loaded class inside the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class@{}", self.0)
    }
}

/// A method as known to the runtime after resolution.
///
/// Cache entries hold these through [`MethodRc`]; identity (pointer equality) distinguishes a
/// redefined method from the body that superseded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeMethod {
    /// Declaring class
    pub holder: ClassId,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Access flags
    pub access: MethodAccessFlags,
    /// Argument slots, including the receiver for instance methods
    pub parameter_size: u16,
    /// Kind of the returned value
    pub result_type: ResultType,
}

impl RuntimeMethod {
    /// Create a method, deriving its parameter size and result type from the descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for invalid descriptors.
    pub fn new(
        holder: ClassId,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        access: MethodAccessFlags,
    ) -> Result<Self> {
        let descriptor = descriptor.into();
        let parameter_size =
            parameter_slots(&descriptor, !access.contains(MethodAccessFlags::STATIC))?;
        let result_type = ResultType::of_method_return(&descriptor)?;
        Ok(RuntimeMethod {
            holder,
            name: name.into(),
            descriptor,
            access,
            parameter_size,
            result_type,
        })
    }

    /// Shorthand returning the method already wrapped in an [`Arc`]
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for invalid descriptors.
    pub fn shared(
        holder: ClassId,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        access: MethodAccessFlags,
    ) -> Result<MethodRc> {
        Ok(Arc::new(Self::new(holder, name, descriptor, access)?))
    }
}

impl fmt::Display for RuntimeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.holder, self.name, self.descriptor)
    }
}

/// Shared handle to a resolved method
pub type MethodRc = Arc<RuntimeMethod>;

/// A heap object stored in the resolved references.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeObject {
    /// An interned string
    String(String),
    /// A `java.lang.invoke.MethodType`
    MethodType(String),
    /// A `java.lang.invoke.MethodHandle`
    MethodHandle {
        /// Reference kind (1..=9)
        kind: u8,
        /// Referenced member, for diagnostics
        member: String,
    },
    /// Result of a dynamic constant's bootstrap
    Constant(String),
    /// An appendix produced when linking an invokedynamic or invokehandle site
    Appendix(String),
}

/// Shared handle to an object in the resolved references
pub type ObjectRef = Arc<RuntimeObject>;

/// Outcome of resolving a `Fieldref` for a field access instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLink {
    /// Declaring class
    pub holder: ClassId,
    /// Byte offset within the instance or static block
    pub offset: u32,
    /// Index of the field in its holder's field list
    pub field_index: u16,
    /// Field type
    pub result_type: ResultType,
    /// The field is `static`
    pub is_static: bool,
    /// The field is `final`
    pub is_final: bool,
    /// The field is `volatile`
    pub is_volatile: bool,
    /// For static fields: the holder has finished initialisation. Entries for static fields of
    /// uninitialised classes are not published, so the next access re-resolves.
    pub holder_initialized: bool,
    /// The resolving instruction may update a `final` field (it sits in the field's initialiser)
    pub final_update_allowed: bool,
}

/// How an invoke binds to its target once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodTarget {
    /// `invokestatic` and `invokespecial`: the method itself
    Direct,
    /// `invokevirtual` of a method that cannot be overridden
    VirtualFinal,
    /// `invokevirtual` through the receiver's virtual table
    Virtual {
        /// Virtual table slot
        vtable_index: u16,
    },
    /// `invokeinterface` through the receiver's interface tables
    Interface {
        /// The interface declaring the method
        interface: ClassId,
    },
    /// `invokeinterface` of a method inherited from the root class; dispatched as a final call
    ForcedVirtualFinal,
    /// `invokeinterface` of a method inherited from the root class; dispatched virtually
    ForcedVirtual {
        /// Virtual table slot
        vtable_index: u16,
    },
}

/// Outcome of resolving a `Methodref`/`InterfaceMethodref` for an invoke instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLink {
    /// The selected method
    pub method: MethodRc,
    /// Dispatch kind
    pub target: MethodTarget,
}

/// Outcome of linking an invokedynamic call site or a signature-polymorphic invoke.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSiteLink {
    /// The adapter method invoked in place of the site
    pub adapter: MethodRc,
    /// Extra trailing argument passed to the adapter
    pub appendix: Option<ObjectRef>,
}

/// Category of a [`LinkageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkageErrorKind {
    /// Class could not be found
    NoClassDefFound,
    /// Field could not be found
    NoSuchField,
    /// Method could not be found
    NoSuchMethod,
    /// Member is not accessible from the referencing class
    IllegalAccess,
    /// Member kind contradicts the instruction
    IncompatibleClassChange,
    /// A bootstrap method failed or returned an unusable result
    BootstrapMethod,
    /// Anything else
    Other,
}

impl fmt::Display for LinkageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkageErrorKind::NoClassDefFound => "NoClassDefFoundError",
            LinkageErrorKind::NoSuchField => "NoSuchFieldError",
            LinkageErrorKind::NoSuchMethod => "NoSuchMethodError",
            LinkageErrorKind::IllegalAccess => "IllegalAccessError",
            LinkageErrorKind::IncompatibleClassChange => "IncompatibleClassChangeError",
            LinkageErrorKind::BootstrapMethod => "BootstrapMethodError",
            LinkageErrorKind::Other => "LinkageError",
        };
        f.write_str(name)
    }
}

/// A failure to link a symbolic reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkageError {
    kind: LinkageErrorKind,
    message: String,
}

impl LinkageError {
    /// Create a new linkage error
    pub fn new(kind: LinkageErrorKind, message: impl Into<String>) -> Self {
        LinkageError {
            kind,
            message: message.into(),
        }
    }

    /// The error category
    #[must_use]
    pub fn kind(&self) -> LinkageErrorKind {
        self.kind
    }

    /// Human readable detail
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LinkageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for LinkageError {}
