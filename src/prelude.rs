//! # classlink Prelude
//!
//! The types needed to prepare a class and to resolve its cache entries, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classlink operations
pub use crate::Error;

/// The result type used throughout classlink
pub use crate::Result;

// ================================================================================================
// Class Model
// ================================================================================================

/// Constant pool and its construction
pub use crate::classfile::{ConstantPool, ConstantPoolBuilder, ConstantPoolEntry, ConstantTag};

/// Methods and classes under preparation
pub use crate::classfile::{LoadedClass, MethodAccessFlags, MethodCode, MethodFlags, ResultType};

// ================================================================================================
// Bytecode
// ================================================================================================

/// Opcode constants
pub use crate::bytecode::opcodes;

/// Decoding helpers
pub use crate::bytecode::{
    cache_operand, decode_stream, instruction_length, CacheOperand, Instruction, LookupSwitch,
};

// ================================================================================================
// Preparation
// ================================================================================================

/// Rewriting entry points and configuration
pub use crate::rewriter::{
    restore_bytecodes, rewrite, rewrite_and_link, rewrite_classes, RewriterConfig,
};

// ================================================================================================
// Resolution Cache
// ================================================================================================

/// The per-class cache and its entries
pub use crate::cache::{
    ErrorKey, OperandMap, ResolutionCache, ResolvedField, ResolvedFieldEntry, ResolvedIndyEntry,
    ResolvedMethod, ResolvedMethodEntry, ResolvedReferences,
};

/// Redefinition and archiving
pub use crate::cache::{
    AdjustReport, ArchivePolicy, ArchiveReport, MethodReplacement, ReferenceOrigin,
};

// ================================================================================================
// Resolution
// ================================================================================================

/// The runtime's side of resolution
pub use crate::resolution::{
    CallSiteLink, ClassId, FieldLink, LinkResolver, LinkageError, LinkageErrorKind, MethodLink,
    MethodRc, MethodTarget, ObjectRef, RuntimeMethod, RuntimeObject,
};
