//! Class model consumed by preparation.
//!
//! Parsing a class file is the job of an external loader. This module holds the parsed result in
//! the shape the rewriter needs: an immutable [`ConstantPool`], a list of [`MethodCode`] bodies
//! with mutable code buffers, and the [`LoadedClass`] that ties them together with its resolution
//! cache.
//!
//! # Key Types
//!
//! - [`ConstantPool`] / [`ConstantPoolBuilder`] - the symbolic constants of a class
//! - [`ConstantTag`] - class-file tag bytes
//! - [`MethodCode`] - a method body and its bookkeeping [`MethodFlags`]
//! - [`LoadedClass`] - a class and its optional [`crate::cache::ResolutionCache`]
//! - [`ResultType`] - the stack result kind derived from descriptors

mod class;
mod constantpool;
pub mod descriptor;
pub mod io;
mod method;

pub use class::LoadedClass;
pub use constantpool::{
    ConstantPool, ConstantPoolBuilder, ConstantPoolEntry, ConstantTag, MemberRef,
};
pub use descriptor::ResultType;
pub use method::{MethodAccessFlags, MethodCode, MethodFlags, OBJECT_INITIALIZER_NAME};
