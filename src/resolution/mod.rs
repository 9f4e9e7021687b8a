//! Entry resolution protocol.
//!
//! Symbolic lookup is the business of the runtime and is reached through the [`LinkResolver`]
//! trait. This module decides *when* the resolver runs and *how* its result becomes visible to
//! other threads executing the same bytecode:
//!
//! - Field and method rows are resolved without locking. Racing threads run the idempotent lookup
//!   independently and publish identical content. A [`LinkageError`] is returned to the caller
//!   and not cached, so the next execution tries again.
//! - `invokehandle` rows that carry an appendix publish it under the per-class critical section.
//!   The first thread to get there wins; everyone else adopts its adapter and appendix.
//! - Invokedynamic call sites are linked exactly once. The first thread claims the site, other
//!   threads wait for its outcome, and both success and failure are cached permanently.
//! - Reference constants (`ldc`) publish first-writer-wins into the resolved references; failures
//!   of method handle, method type and dynamic constants are cached.
//!
//! # Examples
//!
//! ```rust,ignore
//! use classlink::{bytecode::{cache_operand, CacheOperand}, prelude::*};
//!
//! if let Some(CacheOperand::Field(row)) = cache_operand(&method.code, bci)? {
//!     let field = cache.resolve_field(row, opcodes::GETFIELD, &resolver)?;
//!     println!("offset {}", field.offset);
//! }
//! ```

mod protocol;
mod types;

pub use types::{
    CallSiteLink, ClassId, FieldLink, LinkageError, LinkageErrorKind, MethodLink, MethodRc,
    MethodTarget, ObjectRef, RuntimeMethod, RuntimeObject,
};

use crate::{classfile::ConstantPool, Result};

/// Symbolic lookup supplied by the runtime.
///
/// Implementations must be idempotent for field and method references: resolving the same
/// constant twice must produce equal results, since racing threads may both call in. Call-site
/// bootstraps are only invoked once per site.
pub trait LinkResolver {
    /// Resolve the `Fieldref` at `cp_index` for the access instruction `bytecode`
    ///
    /// # Errors
    /// Returns [`crate::Error::Linkage`] if the field cannot be linked.
    fn resolve_field(&self, pool: &ConstantPool, cp_index: u16, bytecode: u8) -> Result<FieldLink>;

    /// Resolve the method reference at `cp_index` for the invoke instruction `bytecode`
    ///
    /// # Errors
    /// Returns [`crate::Error::Linkage`] if the method cannot be linked.
    fn resolve_method(&self, pool: &ConstantPool, cp_index: u16, bytecode: u8)
        -> Result<MethodLink>;

    /// Link a signature-polymorphic invoke of the `Methodref` at `cp_index`
    ///
    /// # Errors
    /// Returns [`crate::Error::Linkage`] if no adapter can be produced.
    fn resolve_invokehandle(&self, pool: &ConstantPool, cp_index: u16) -> Result<CallSiteLink>;

    /// Run the bootstrap of the invokedynamic site `site`, whose specifier is at `cp_index`
    ///
    /// # Errors
    /// Any error is cached as the site's permanent failure.
    fn resolve_invokedynamic(
        &self,
        pool: &ConstantPool,
        cp_index: u16,
        site: u32,
    ) -> Result<CallSiteLink>;

    /// Produce the object for a `String`, `MethodHandle`, `MethodType` or `Dynamic` constant
    ///
    /// # Errors
    /// Returns [`crate::Error::Linkage`] if the constant cannot be produced.
    fn resolve_constant(&self, pool: &ConstantPool, cp_index: u16) -> Result<ObjectRef>;
}
