use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::{
    bytecode::opcodes,
    cache::{EntryStore, ResolutionCache},
    classfile::{
        ConstantPool, ConstantPoolBuilder, ConstantPoolEntry, ConstantTag, MethodAccessFlags,
        ResultType,
    },
    resolution::{
        CallSiteLink, ClassId, FieldLink, LinkResolver, MethodLink, MethodTarget, ObjectRef,
        RuntimeMethod, RuntimeObject,
    },
    rewriter::IndexMap,
    Error, Result,
};

/// Constant-pool indices of the pool built by [`create_sample_pool`]
pub struct SamplePool {
    pub pool: Arc<ConstantPool>,
    pub instance_field: u16,
    pub static_field: u16,
    pub final_field: u16,
    pub missing_field: u16,
    pub virtual_method: u16,
    pub static_method: u16,
    pub interface_method: u16,
    pub invoke_exact: u16,
    pub string: u16,
    pub method_type: u16,
    pub failing_condy: u16,
    pub indy: u16,
}

// Helper function to create a pool covering every resolvable constant kind
pub fn create_sample_pool() -> SamplePool {
    let mut builder = ConstantPoolBuilder::new();
    let instance_field = builder.add_fieldref("demo/A", "count", "I").unwrap();
    let static_field = builder.add_fieldref("demo/A", "INSTANCES", "J").unwrap();
    let final_field = builder.add_fieldref("demo/A", "finalName", "Ljava/lang/String;").unwrap();
    let missing_field = builder.add_fieldref("demo/A", "missing", "I").unwrap();
    let virtual_method = builder.add_methodref("demo/A", "run", "(I)V").unwrap();
    let static_method = builder.add_methodref("demo/A", "make", "()Ldemo/A;").unwrap();
    let interface_method = builder
        .add_interface_methodref("demo/I", "apply", "(Ljava/lang/Object;)Z")
        .unwrap();
    let invoke_exact = builder
        .add_methodref("java/lang/invoke/MethodHandle", "invokeExact", "(I)I")
        .unwrap();
    let string = builder.add_string("hello").unwrap();
    let method_type = builder.add_method_type("(I)V").unwrap();
    let failing_condy = builder
        .add_dynamic(0, "failing", "Ljava/lang/Object;")
        .unwrap();
    let indy = builder.add_invokedynamic(1, "apply", "()Ldemo/I;").unwrap();

    SamplePool {
        pool: Arc::new(builder.build()),
        instance_field,
        static_field,
        final_field,
        missing_field,
        virtual_method,
        static_method,
        interface_method,
        invoke_exact,
        string,
        method_type,
        failing_condy,
        indy,
    }
}

// Helper function to create a cache over the sample pool, with an appendix slot for the
// `invokeExact` row and `call_sites` invokedynamic rows
pub fn create_sample_cache(sample: &SamplePool, call_sites: u32) -> ResolutionCache {
    let mut store = EntryStore::new();
    let map = IndexMap::build(&sample.pool, &mut store).unwrap();
    let handle_row = map.method_row(sample.invoke_exact).unwrap();
    store.reserve_appendix(handle_row).unwrap();
    for _ in 0..call_sites {
        store.add_indy(sample.indy).unwrap();
    }
    store.assemble(sample.pool.clone(), None).unwrap()
}

/// Deterministic resolver over the symbolic names in a pool.
///
/// Members whose name starts with `missing` fail with a linkage error, as do dynamic constants
/// named `failing*`. Call sites fail when `fail_bootstrap` is set.
#[derive(Default)]
pub struct StubResolver {
    pub fail_bootstrap: bool,
    pub bootstrap_delay: Option<Duration>,
    pub uninitialized_statics: bool,
    pub bootstrap_calls: AtomicUsize,
    pub field_calls: AtomicUsize,
    pub constant_calls: AtomicUsize,
}

impl StubResolver {
    // Helper function to create a resolver whose bootstraps fail
    pub fn failing_bootstrap() -> Self {
        StubResolver {
            fail_bootstrap: true,
            ..Self::default()
        }
    }

    pub fn bootstraps(&self) -> usize {
        self.bootstrap_calls.load(Ordering::SeqCst)
    }
}

impl LinkResolver for StubResolver {
    fn resolve_field(
        &self,
        pool: &ConstantPool,
        cp_index: u16,
        _bytecode: u8,
    ) -> Result<FieldLink> {
        self.field_calls.fetch_add(1, Ordering::SeqCst);
        let member = pool.member_ref_at(cp_index)?;
        if member.name.starts_with("missing") {
            return Err(linkage_error!(NoSuchField, "{}.{}", member.class_name, member.name));
        }

        let is_static = member.name.chars().all(|c| c.is_ascii_uppercase());
        Ok(FieldLink {
            holder: ClassId(1),
            offset: 12 + 4 * u32::from(cp_index),
            field_index: cp_index,
            result_type: ResultType::of_field(member.descriptor)?,
            is_static,
            is_final: member.name.starts_with("final"),
            is_volatile: false,
            holder_initialized: !self.uninitialized_statics,
            final_update_allowed: false,
        })
    }

    fn resolve_method(
        &self,
        pool: &ConstantPool,
        cp_index: u16,
        bytecode: u8,
    ) -> Result<MethodLink> {
        let member = pool.member_ref_at(cp_index)?;
        if member.name.starts_with("missing") {
            return Err(linkage_error!(NoSuchMethod, "{}.{}", member.class_name, member.name));
        }

        let access = if bytecode == opcodes::INVOKESTATIC {
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC
        } else {
            MethodAccessFlags::PUBLIC
        };
        let method = RuntimeMethod::shared(ClassId(1), member.name, member.descriptor, access)?;
        let target = match bytecode {
            opcodes::INVOKEVIRTUAL => MethodTarget::Virtual {
                vtable_index: cp_index,
            },
            opcodes::INVOKEINTERFACE => MethodTarget::Interface {
                interface: ClassId(2),
            },
            _ => MethodTarget::Direct,
        };
        Ok(MethodLink { method, target })
    }

    fn resolve_invokehandle(&self, pool: &ConstantPool, cp_index: u16) -> Result<CallSiteLink> {
        let member = pool.member_ref_at(cp_index)?;
        Ok(CallSiteLink {
            adapter: RuntimeMethod::shared(
                ClassId(9),
                "linkToTargetMethod",
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
        self.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.bootstrap_delay {
            thread::sleep(delay);
        }
        if self.fail_bootstrap {
            return Err(linkage_error!(BootstrapMethod, "bootstrap of site {} threw", site));
        }

        let (name, descriptor) = pool.dynamic_name_and_type_at(cp_index)?;
        Ok(CallSiteLink {
            adapter: RuntimeMethod::shared(
                ClassId(9),
                name,
                descriptor,
                MethodAccessFlags::STATIC,
            )?,
            appendix: Some(Arc::new(RuntimeObject::Appendix(format!("site{}", site)))),
        })
    }

    fn resolve_constant(&self, pool: &ConstantPool, cp_index: u16) -> Result<ObjectRef> {
        self.constant_calls.fetch_add(1, Ordering::SeqCst);
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
            entry if entry.tag() == ConstantTag::Dynamic => {
                let (name, _) = pool.dynamic_name_and_type_at(cp_index)?;
                if name.starts_with("failing") {
                    return Err(linkage_error!(BootstrapMethod, "condy {} threw", name));
                }
                RuntimeObject::Constant(name.to_string())
            }
            other => {
                return Err(Error::InvariantViolation(format!(
                    "{:?} is not a reference constant",
                    other.tag()
                )))
            }
        };
        Ok(Arc::new(object))
    }
}
