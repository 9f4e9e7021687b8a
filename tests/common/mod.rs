//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use classlink::prelude::*;

pub fn linkage(kind: LinkageErrorKind, message: impl Into<String>) -> Error {
    Error::Linkage(Arc::new(LinkageError::new(kind, message)))
}

/// Offset every field of `cp_index` resolves to
pub fn expected_offset(cp_index: u16) -> u32 {
    16 + 8 * u32::from(cp_index)
}

/// A resolver driven entirely by the symbolic names in the pool.
///
/// - fields named in upper case are static, names starting with `final` are final
/// - members named `missing*` do not exist
/// - dynamic constants named `failing*` throw from their bootstrap
/// - call sites fail when `fail_bootstrap` is set
#[derive(Default)]
pub struct NameResolver {
    pub fail_bootstrap: bool,
    pub delay: Option<Duration>,
    pub bootstraps: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl NameResolver {
    pub fn failing() -> Self {
        NameResolver {
            fail_bootstrap: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        NameResolver {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
    }
}

impl LinkResolver for NameResolver {
    fn resolve_field(
        &self,
        pool: &ConstantPool,
        cp_index: u16,
        _bytecode: u8,
    ) -> Result<FieldLink> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.pause();
        let member = pool.member_ref_at(cp_index)?;
        if member.name.starts_with("missing") {
            return Err(linkage(LinkageErrorKind::NoSuchField, member.name));
        }

        Ok(FieldLink {
            holder: ClassId(7),
            offset: expected_offset(cp_index),
            field_index: cp_index,
            result_type: ResultType::of_field(member.descriptor)?,
            is_static: member.name.chars().all(|c| c.is_ascii_uppercase()),
            is_final: member.name.starts_with("final"),
            is_volatile: false,
            holder_initialized: true,
            final_update_allowed: false,
        })
    }

    fn resolve_method(
        &self,
        pool: &ConstantPool,
        cp_index: u16,
        bytecode: u8,
    ) -> Result<MethodLink> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.pause();
        let member = pool.member_ref_at(cp_index)?;
        if member.name.starts_with("missing") {
            return Err(linkage(LinkageErrorKind::NoSuchMethod, member.name));
        }

        let access = if bytecode == opcodes::INVOKESTATIC {
            MethodAccessFlags::STATIC
        } else {
            MethodAccessFlags::PUBLIC
        };
        let target = match bytecode {
            opcodes::INVOKEVIRTUAL => MethodTarget::VirtualFinal,
            opcodes::INVOKEINTERFACE => MethodTarget::Interface {
                interface: ClassId(8),
            },
            _ => MethodTarget::Direct,
        };
        Ok(MethodLink {
            method: RuntimeMethod::shared(ClassId(7), member.name, member.descriptor, access)?,
            target,
        })
    }

    fn resolve_invokehandle(&self, pool: &ConstantPool, cp_index: u16) -> Result<CallSiteLink> {
        self.pause();
        let member = pool.member_ref_at(cp_index)?;
        Ok(CallSiteLink {
            adapter: RuntimeMethod::shared(
                ClassId(9),
                "invoker",
                member.descriptor,
                MethodAccessFlags::STATIC,
            )?,
            appendix: Some(Arc::new(RuntimeObject::Appendix(member.name.to_string()))),
        })
    }

    fn resolve_invokedynamic(
        &self,
        pool: &ConstantPool,
        cp_index: u16,
        site: u32,
    ) -> Result<CallSiteLink> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        self.pause();
        if self.fail_bootstrap {
            return Err(linkage(
                LinkageErrorKind::BootstrapMethod,
                format!("bootstrap for site {} threw", site),
            ));
        }

        let (name, descriptor) = pool.dynamic_name_and_type_at(cp_index)?;
        Ok(CallSiteLink {
            adapter: RuntimeMethod::shared(
                ClassId(9),
                name,
                descriptor,
                MethodAccessFlags::STATIC,
            )?,
            appendix: Some(Arc::new(RuntimeObject::Appendix(format!("site {}", site)))),
        })
    }

    fn resolve_constant(&self, pool: &ConstantPool, cp_index: u16) -> Result<ObjectRef> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let object = match pool.get(cp_index)? {
            ConstantPoolEntry::String { string_index } => {
                RuntimeObject::String(pool.utf8_at(*string_index)?.to_string())
            }
            ConstantPoolEntry::MethodType { descriptor_index } => {
                RuntimeObject::MethodType(pool.utf8_at(*descriptor_index)?.to_string())
            }
            ConstantPoolEntry::MethodHandle {
                reference_kind,
                reference_index,
            } => RuntimeObject::MethodHandle {
                kind: *reference_kind,
                member: pool.member_ref_at(*reference_index)?.name.to_string(),
            },
            ConstantPoolEntry::Dynamic { .. } => {
                let (name, _) = pool.dynamic_name_and_type_at(cp_index)?;
                if name.starts_with("failing") {
                    return Err(linkage(LinkageErrorKind::BootstrapMethod, name));
                }
                RuntimeObject::Constant(name.to_string())
            }
            other => {
                return Err(Error::Error(format!(
                    "{:?} is not a reference constant",
                    other.tag()
                )))
            }
        };
        Ok(Arc::new(object))
    }
}

/// Two-byte big-endian operand
pub fn be(index: u16) -> [u8; 2] {
    index.to_be_bytes()
}

/// A `lookupswitch` at `bci` with `npairs` sorted keys, encoded as in a class file
pub fn lookupswitch(bci: usize, npairs: i32) -> Vec<u8> {
    let mut code = vec![opcodes::LOOKUPSWITCH];
    code.extend(std::iter::repeat(0).take((4 - (bci + 1) % 4) % 4));
    code.extend_from_slice(&100i32.to_be_bytes());
    code.extend_from_slice(&npairs.to_be_bytes());
    for key in 0..npairs {
        code.extend_from_slice(&(key * 3).to_be_bytes());
        code.extend_from_slice(&(200 + key).to_be_bytes());
    }
    code
}

pub fn instance_method(name: &str, descriptor: &str, code: Vec<u8>) -> MethodCode {
    MethodCode::new(name, descriptor, MethodAccessFlags::PUBLIC, code).with_max_locals(4)
}

pub fn static_method(name: &str, descriptor: &str, code: Vec<u8>) -> MethodCode {
    MethodCode::new(
        name,
        descriptor,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        code,
    )
    .with_max_locals(4)
}

/// Snapshot of every method's bytecode
pub fn code_of(class: &LoadedClass) -> Vec<Vec<u8>> {
    class.methods().iter().map(|m| m.code.clone()).collect()
}
