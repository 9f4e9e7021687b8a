// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # classlink
//!
//! Bytecode rewriting and resolution caching for JVM-style interpreters.
//!
//! When a class is prepared for execution, `classlink` rewrites its bytecode in place:
//! operands that indexed the constant pool are replaced by indices into per-class
//! resolution-cache tables, and a few instructions are replaced by faster internal variants.
//! At run time the same cache governs how each entry moves from unresolved to resolved when
//! several threads execute the instruction for the first time at once.
//!
//! ## Features
//!
//! - **Reversible rewriting** - every transformation can be undone byte for byte, and a failed
//!   preparation never leaves a half-rewritten class behind
//! - **Lock-free publication** - field and method resolution publish with release/acquire
//!   ordering; repeat executions never take a lock
//! - **Exactly-once call sites** - each `invokedynamic` site runs its bootstrap once, and a
//!   failure is cached and observed identically by every later attempt
//! - **Redefinition and archiving** - resolved entries can be repointed, reset or stripped
//!   during an exclusive pause
//!
//! ## Quick Start
//!
//! ```rust
//! use classlink::prelude::*;
//!
//! let mut builder = ConstantPoolBuilder::new();
//! let field = builder.add_fieldref("demo/Counter", "value", "I")?;
//! let [hi, lo] = field.to_be_bytes();
//!
//! let mut class = LoadedClass::new(
//!     "demo/Counter",
//!     builder.build(),
//!     vec![MethodCode::new(
//!         "get",
//!         "()I",
//!         MethodAccessFlags::PUBLIC,
//!         vec![opcodes::ALOAD_0, opcodes::GETFIELD, hi, lo, opcodes::IRETURN],
//!     )],
//! );
//!
//! rewrite(&mut class, &RewriterConfig::default())?;
//!
//! let cache = class.cache().ok_or(classlink::Error::OutOfBounds)?;
//! assert_eq!(cache.field_count(), 1);
//! assert_eq!(
//!     cache.constant_pool_index_of(CacheOperand::Field(0)),
//!     Some(field)
//! );
//! # Ok::<(), classlink::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`classfile`] - constant pool, method code buffers and the loaded class
//! - [`bytecode`] - opcode table and the length-computing decoder shared by every traversal
//! - [`rewriter`] - the two rewriting passes, cache assembly and reversal
//! - [`cache`] - the per-class resolution cache and its entry types
//! - [`resolution`] - the publish/probe protocol and the [`resolution::LinkResolver`] seam
//! - [`Error`] and [`Result`] - error handling
//!
//! The crate never installs a logger. Diagnostics go through the [`log`] facade.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use classlink::prelude::*;
///
/// let config = RewriterConfig::new();
/// assert_eq!(config.binary_switch_threshold, 5);
/// ```
pub mod prelude;

/// Opcode definitions and the instruction decoder
///
/// One table describes every standard and internal opcode: its name, its fixed length (or
/// that it is variable) and the standard opcode it stands for. The decoder built on it walks
/// bytecode in any state, original or rewritten.
///
/// # Key Types
///
/// - [`bytecode::Instruction`] - a decoded instruction
/// - [`bytecode::LookupSwitch`] - read-only view of a switch table
/// - [`bytecode::CacheOperand`] - the cache index carried by a rewritten instruction
pub mod bytecode;

/// Resolution-cache tables and their lifecycle
pub mod cache;

/// The class model consumed by the rewriter
///
/// - [`classfile::ConstantPool`] and [`classfile::ConstantPoolBuilder`]
/// - [`classfile::MethodCode`] - a method's mutable bytecode buffer
/// - [`classfile::LoadedClass`] - a class under preparation, owning its installed cache
pub mod classfile;

/// Entry resolution under concurrent first use
pub mod resolution;

/// Bytecode rewriting and class preparation
pub mod rewriter;

/// `classlink` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classlink` Error type
///
/// # Examples
///
/// ```rust
/// use classlink::{prelude::*, Error};
///
/// let mut builder = ConstantPoolBuilder::new();
/// let text = builder.add_string("not a field")?;
/// let [hi, lo] = text.to_be_bytes();
/// let method = MethodCode::new(
///     "f",
///     "()V",
///     MethodAccessFlags::STATIC,
///     vec![opcodes::GETSTATIC, hi, lo, opcodes::RETURN],
/// );
/// let mut class = LoadedClass::new("demo/Bad", builder.build(), vec![method]);
///
/// match rewrite(&mut class, &RewriterConfig::default()) {
///     Err(Error::Malformed { message, .. }) => println!("rejected: {}", message),
///     other => panic!("unexpected {:?}", other),
/// }
/// assert!(!class.is_rewritten());
/// # Ok::<(), classlink::Error>(())
/// ```
pub use error::Error;
