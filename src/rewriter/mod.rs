//! Class preparation: bytecode rewriting and cache installation.
//!
//! Rewriting runs once per class, single-threaded, before any other thread can execute the
//! class's bytecode. It proceeds in three steps:
//!
//! 1. [`IndexMap::build`] walks the constant pool and assigns a dense field row, method row or
//!    reference slot to every entry that needs one.
//! 2. The scanner walks every method and replaces constant-pool operands with those indices,
//!    allocating call-site rows, interface `invokespecial` rows and appendix slots on the way.
//! 3. The collected placeholders are assembled into a [`crate::cache::ResolutionCache`] and
//!    installed on the class.
//!
//! Every step is reversible. If anything fails, including a later preparation step run through
//! [`rewrite_and_link`], the original bytecode is restored byte for byte and the class is left
//! without a cache.
//!
//! # Examples
//!
//! ```rust
//! use classlink::prelude::*;
//!
//! let mut builder = ConstantPoolBuilder::new();
//! let field = builder.add_fieldref("demo/Point", "x", "I")?;
//! let [hi, lo] = field.to_be_bytes();
//!
//! let getter = MethodCode::new(
//!     "x",
//!     "()I",
//!     MethodAccessFlags::PUBLIC,
//!     vec![opcodes::ALOAD_0, opcodes::GETFIELD, hi, lo, opcodes::IRETURN],
//! );
//! let mut class = LoadedClass::new("demo/Point", builder.build(), vec![getter]);
//!
//! rewrite(&mut class, &RewriterConfig::default())?;
//! assert!(class.is_rewritten());
//! assert_eq!(
//!     cache_operand(&class.methods()[0].code, 1)?,
//!     Some(CacheOperand::Field(0))
//! );
//! # Ok::<(), classlink::Error>(())
//! ```

mod config;
mod indexmap;
mod scanner;

pub use config::RewriterConfig;
pub use indexmap::{is_signature_polymorphic, IndexMap};

use rayon::prelude::*;

use crate::{
    cache::{EntryStore, OperandMap},
    classfile::{LoadedClass, MethodCode, MethodFlags},
    rewriter::scanner::{scan, validate_root_initializer, Interrupted, RewriteContext, ScanMode},
    Error, Result,
};

/// Rewrite the bytecode of `class` and install its resolution cache.
///
/// Does nothing if the class is already rewritten.
///
/// # Errors
/// - [`Error::Malformed`] for undecodable bytecode, internal opcodes in the input, or operands of
///   the wrong constant kind
/// - [`Error::RewriteOverflow`] if a cache index outgrows its operand
/// - [`Error::InvariantViolation`] if the root class constructor stores to local 0
/// - [`Error::AllocationFailure`] if the cache exceeds [`RewriterConfig::metadata_limit`]
///
/// On error the bytecode is exactly as it was before the call and no cache is installed.
pub fn rewrite(class: &mut LoadedClass, config: &RewriterConfig) -> Result<()> {
    if class.is_rewritten() {
        return Ok(());
    }

    let pool = class.pool().clone();
    let mut store = EntryStore::new();
    let map = IndexMap::build(&pool, &mut store)?;

    let register_finalizers =
        config.register_finalizers_at_init && class.name() == config.root_class_name;
    if register_finalizers {
        for method in class.methods() {
            if method.is_object_initializer() {
                validate_root_initializer(class.name(), &method.code)?;
            }
        }
    }

    let mut failure = None;
    for (index, method) in class.methods_mut().iter_mut().enumerate() {
        let mut mode = ScanMode::Rewrite(RewriteContext {
            pool: &pool,
            map: &map,
            store: &mut store,
            config,
            root_initializer: register_finalizers && method.is_object_initializer(),
        });
        let end = method.code.len();
        match scan(&mut method.code, &mut mode, end) {
            Ok(flags) => method.set_flags(flags),
            Err(interrupted) => {
                failure = Some((index, interrupted));
                break;
            }
        }
    }

    if let Some((index, Interrupted { bci, error })) = failure {
        log::warn!(
            "rewriting {} failed in {} at bci {}, restoring bytecode: {}",
            class.name(),
            class.methods()[index].name,
            bci,
            error
        );
        let methods = class.methods_mut();
        restore_methods(&mut methods[..=index], &store, Some(bci))?;
        return Err(error);
    }

    match store.assemble(pool, config.metadata_limit) {
        Ok(cache) => {
            log::debug!(
                "rewrote {}: {} methods, {} field rows, {} method rows, {} call sites, {} references",
                class.name(),
                class.methods().len(),
                cache.field_count(),
                cache.method_count(),
                cache.indy_count(),
                cache.references().len()
            );
            class.install_cache(cache);
            Ok(())
        }
        Err(error) => {
            log::warn!(
                "assembling the cache of {} failed, restoring bytecode: {}",
                class.name(),
                error
            );
            restore_methods(class.methods_mut(), &store, None)?;
            Err(error)
        }
    }
}

/// Rewrite `class`, then run the remaining preparation step `link` against it.
///
/// If `link` fails, the bytecode is restored and the cache detached before its error is
/// returned, so the class can be prepared again later.
///
/// # Errors
/// Returns the error of [`rewrite`] or of `link`.
pub fn rewrite_and_link<F>(class: &mut LoadedClass, config: &RewriterConfig, link: F) -> Result<()>
where
    F: FnOnce(&mut LoadedClass) -> Result<()>,
{
    rewrite(class, config)?;
    if let Err(error) = link(class) {
        log::warn!(
            "linking {} failed, restoring bytecode: {}",
            class.name(),
            error
        );
        restore_bytecodes(class)?;
        return Err(error);
    }

    Ok(())
}

/// Undo [`rewrite`]: restore the original bytecode and detach the resolution cache.
///
/// Does nothing for classes that are not rewritten. On error the class is left untouched,
/// cache included.
///
/// # Errors
/// Returns [`Error::InvariantViolation`] if a rewritten operand no longer matches the cache.
pub fn restore_bytecodes(class: &mut LoadedClass) -> Result<()> {
    let Some(cache) = class.cache() else {
        return Ok(());
    };

    let mut methods = class.methods().to_vec();
    restore_methods(&mut methods, cache, None)?;
    class.methods_mut().swap_with_slice(&mut methods);
    class.detach_cache();
    log::debug!("restored bytecode of {}", class.name());
    Ok(())
}

/// Prepare independent classes in parallel.
///
/// Each class is rewritten on its own; one failure does not affect the others. Results are
/// returned in input order.
pub fn rewrite_classes(classes: &mut [LoadedClass], config: &RewriterConfig) -> Vec<Result<()>> {
    classes
        .par_iter_mut()
        .map(|class| rewrite(class, config))
        .collect()
}

/// Restore `methods` through `map`. With `partial`, the last method was only scanned up to
/// that bci.
fn restore_methods(
    methods: &mut [MethodCode],
    map: &dyn OperandMap,
    partial: Option<usize>,
) -> Result<()> {
    let last = methods.len().saturating_sub(1);
    for (index, method) in methods.iter_mut().enumerate().rev() {
        let end = match partial {
            Some(bci) if index == last => bci,
            _ => method.code.len(),
        };
        let mut mode = ScanMode::Restore(map);
        scan(&mut method.code, &mut mode, end).map_err(|Interrupted { bci, error }| {
            Error::InvariantViolation(format!(
                "cannot restore {}{} at bci {}: {}",
                method.name, method.descriptor, bci, error
            ))
        })?;
        method.set_flags(MethodFlags::empty());
    }

    Ok(())
}
