//! Concurrent resolution against a rewritten class.

mod common;

use std::{
    sync::{Arc, Barrier},
    thread,
    time::Duration,
};

use classlink::{cache::MethodEntryFlags, prelude::*};
use common::*;

struct Prepared {
    class: LoadedClass,
    count: u16,
    instances: u16,
    final_name: u16,
    run: u16,
    make: u16,
    greeting: u16,
    failing: u16,
}

// Field rows 0..4 and method rows 0..3 follow pool order
const COUNT_ROW: u16 = 0;
const INSTANCES_ROW: u16 = 1;
const FINAL_NAME_ROW: u16 = 2;
const MISSING_ROW: u16 = 3;
const RUN_ROW: u16 = 0;
const MAKE_ROW: u16 = 1;
const EXACT_ROW: u16 = 2;

fn prepared() -> Result<Prepared> {
    let mut builder = ConstantPoolBuilder::new();
    let count = builder.add_fieldref("demo/Counter", "count", "I")?;
    let instances = builder.add_fieldref("demo/Counter", "INSTANCES", "J")?;
    let final_name = builder.add_fieldref("demo/Counter", "finalName", "Ljava/lang/String;")?;
    builder.add_fieldref("demo/Counter", "missing", "I")?;
    let run = builder.add_methodref("demo/Counter", "run", "()V")?;
    let make = builder.add_methodref("demo/Counter", "make", "()Ldemo/Counter;")?;
    let exact = builder.add_methodref("java/lang/invoke/MethodHandle", "invokeExact", "(I)I")?;
    let greeting = builder.add_string("hello")?;
    let failing = builder.add_dynamic(0, "failing", "Ljava/lang/Object;")?;
    let indy = builder.add_invokedynamic(0, "get", "()Ljava/util/function/Supplier;")?;

    let [eh, el] = be(exact);
    let [ih, il] = be(indy);
    let code = vec![
        opcodes::ALOAD_0,
        opcodes::ICONST_1,
        opcodes::INVOKEVIRTUAL,
        eh,
        el,
        opcodes::POP,
        opcodes::INVOKEDYNAMIC,
        ih,
        il,
        0,
        0,
        opcodes::POP,
        opcodes::RETURN,
    ];

    let mut class = LoadedClass::new(
        "demo/Counter",
        builder.build(),
        vec![instance_method("work", "()V", code)],
    );
    rewrite(&mut class, &RewriterConfig::default())?;

    Ok(Prepared {
        class,
        count,
        instances,
        final_name,
        run,
        make,
        greeting,
        failing,
    })
}

fn cache_of(prepared: &Prepared) -> Result<&ResolutionCache> {
    prepared.class.cache().ok_or(Error::OutOfBounds)
}

#[test]
fn rows_map_back_to_pool() -> Result<()> {
    let prepared = prepared()?;
    let cache = cache_of(&prepared)?;

    assert_eq!(cache.constant_pool_index_of(CacheOperand::Field(COUNT_ROW)), Some(prepared.count));
    assert_eq!(
        cache.constant_pool_index_of(CacheOperand::Field(INSTANCES_ROW)),
        Some(prepared.instances)
    );
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Method(RUN_ROW)), Some(prepared.run));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Method(MAKE_ROW)), Some(prepared.make));
    assert_eq!(prepared.class.methods()[0].code[2], opcodes::INVOKEHANDLE);
    assert_eq!(cache.indy_count(), 1);
    Ok(())
}

#[test]
fn concurrent_field_resolution_publishes_complete_entries() -> Result<()> {
    let prepared = prepared()?;
    let cache = cache_of(&prepared)?;
    let resolver = NameResolver::slow(Duration::from_millis(1));
    let accesses = [
        (COUNT_ROW, opcodes::GETFIELD, prepared.count),
        (COUNT_ROW, opcodes::PUTFIELD, prepared.count),
        (INSTANCES_ROW, opcodes::GETSTATIC, prepared.instances),
        (FINAL_NAME_ROW, opcodes::GETFIELD, prepared.final_name),
    ];

    thread::scope(|scope| {
        for worker in 0..16 {
            let resolver = &resolver;
            let accesses = &accesses;
            scope.spawn(move || {
                for round in 0..20 {
                    let (row, bytecode, cp_index) = accesses[(worker + round) % accesses.len()];
                    if let Some(field) = cache.probe_field(row, bytecode) {
                        assert_eq!(field.offset, expected_offset(cp_index));
                        assert_eq!(field.field_index, cp_index);
                    }

                    let field = cache
                        .resolve_field(row, bytecode, resolver)
                        .expect("field resolves");
                    assert_eq!(field.offset, expected_offset(cp_index));
                }
            });
        }
    });

    for (row, bytecode, cp_index) in accesses {
        let field = cache.probe_field(row, bytecode).expect("published");
        assert_eq!(field.offset, expected_offset(cp_index));
    }
    // A final field is never published for puts
    assert!(cache.probe_field(FINAL_NAME_ROW, opcodes::PUTFIELD).is_none());
    Ok(())
}

#[test]
fn field_failures_are_not_cached() -> Result<()> {
    let prepared = prepared()?;
    let cache = cache_of(&prepared)?;
    let resolver = NameResolver::default();

    for _ in 0..3 {
        let error = cache
            .resolve_field(MISSING_ROW, opcodes::GETFIELD, &resolver)
            .unwrap_err();
        let linkage = error.as_linkage().expect("linkage error");
        assert_eq!(linkage.kind(), LinkageErrorKind::NoSuchField);
    }
    assert_eq!(resolver.lookups.load(std::sync::atomic::Ordering::SeqCst), 3);

    // Static access to an instance field is rejected
    let error = cache
        .resolve_field(COUNT_ROW, opcodes::GETSTATIC, &resolver)
        .unwrap_err();
    assert_eq!(
        error.as_linkage().map(|e| e.kind()),
        Some(LinkageErrorKind::IncompatibleClassChange)
    );
    assert!(cache.probe_field(COUNT_ROW, opcodes::GETFIELD).is_none());
    Ok(())
}

#[test]
fn concurrent_method_resolution() -> Result<()> {
    let prepared = prepared()?;
    let cache = cache_of(&prepared)?;
    let resolver = NameResolver::slow(Duration::from_millis(1));

    let appendices: Vec<ObjectRef> = thread::scope(|scope| {
        let handles: Vec<_> = (0..12)
            .map(|_| {
                scope.spawn(|| {
                    let run = cache
                        .resolve_method(RUN_ROW, opcodes::INVOKEVIRTUAL, &resolver)
                        .expect("run resolves");
                    assert_eq!(run.method.as_ref().map(|m| m.name.as_str()), Some("run"));

                    let make = cache
                        .resolve_method(MAKE_ROW, opcodes::INVOKESTATIC, &resolver)
                        .expect("make resolves");
                    assert_eq!(make.parameter_size, 0);

                    let handle = cache
                        .resolve_method(EXACT_ROW, opcodes::INVOKEHANDLE, &resolver)
                        .expect("invokeExact links");
                    assert!(handle.flags.contains(MethodEntryFlags::HAS_APPENDIX));
                    cache.method_appendix(EXACT_ROW).cloned().expect("appendix")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker"))
            .collect()
    });

    let first = &appendices[0];
    assert!(appendices.iter().all(|appendix| Arc::ptr_eq(appendix, first)));

    // Only the invoke kinds that resolved are published
    let run = cache.probe_method(RUN_ROW, opcodes::INVOKEVIRTUAL).expect("published");
    assert!(run.flags.contains(MethodEntryFlags::FINAL));
    assert!(cache.probe_method(RUN_ROW, opcodes::INVOKESPECIAL).is_none());
    Ok(())
}

#[test]
fn failing_call_site_fails_once_for_everyone() -> Result<()> {
    let prepared = prepared()?;
    let cache = cache_of(&prepared)?;
    let resolver = NameResolver {
        fail_bootstrap: true,
        delay: Some(Duration::from_millis(50)),
        ..NameResolver::default()
    };

    let racing: Vec<Arc<LinkageError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| cache.resolve_invokedynamic(0, &resolver)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                let error = handle.join().expect("worker").unwrap_err();
                error.as_linkage().cloned().expect("linkage error")
            })
            .collect()
    });
    let later = cache.resolve_invokedynamic(0, &resolver).unwrap_err();
    let later = later.as_linkage().cloned().expect("linkage error");

    assert_eq!(resolver.bootstrap_count(), 1);
    assert!(Arc::ptr_eq(&racing[0], &racing[1]));
    assert!(Arc::ptr_eq(&racing[0], &later));
    assert_eq!(later.kind(), LinkageErrorKind::BootstrapMethod);

    let cached = cache.cached_error(ErrorKey::CallSite(0)).expect("cached");
    assert!(Arc::ptr_eq(&cached, &later));
    assert!(matches!(cache.probe_invokedynamic(0), Some(Err(_))));
    Ok(())
}

#[test]
fn thousand_threads_share_one_failure() -> Result<()> {
    let prepared = prepared()?;
    let cache = cache_of(&prepared)?;
    let resolver = NameResolver::failing();
    let barrier = Barrier::new(1000);

    let errors: Vec<Arc<LinkageError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..1000)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let error = cache.resolve_invokedynamic(0, &resolver).unwrap_err();
                    error.as_linkage().cloned().expect("linkage error")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker"))
            .collect()
    });

    assert_eq!(resolver.bootstrap_count(), 1);
    assert!(errors.iter().all(|error| Arc::ptr_eq(error, &errors[0])));
    Ok(())
}

#[test]
fn linked_call_site_is_shared() -> Result<()> {
    let prepared = prepared()?;
    let cache = cache_of(&prepared)?;
    let resolver = NameResolver::slow(Duration::from_millis(20));

    let links: Vec<CallSiteLink> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| cache.resolve_invokedynamic(0, &resolver)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker").expect("site links"))
            .collect()
    });

    assert_eq!(resolver.bootstrap_count(), 1);
    let first = &links[0];
    for link in &links {
        assert!(Arc::ptr_eq(&link.adapter, &first.adapter));
        match (&link.appendix, &first.appendix) {
            (Some(a), Some(b)) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("missing appendix: {:?}", other),
        }
    }
    assert_eq!(first.adapter.name, "get");
    Ok(())
}

#[test]
fn reference_constants() -> Result<()> {
    let prepared = prepared()?;
    let cache = cache_of(&prepared)?;
    let resolver = NameResolver::default();

    let objects: Vec<ObjectRef> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| cache.resolve_constant(prepared.greeting, &resolver)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker").expect("string resolves"))
            .collect()
    });
    assert!(objects.iter().all(|o| Arc::ptr_eq(o, &objects[0])));
    assert_eq!(*objects[0], RuntimeObject::String("hello".to_string()));

    let first = cache.resolve_constant(prepared.failing, &resolver).unwrap_err();
    let second = cache.resolve_constant(prepared.failing, &resolver).unwrap_err();
    match (first.as_linkage(), second.as_linkage()) {
        (Some(a), Some(b)) => assert!(Arc::ptr_eq(a, b)),
        other => panic!("expected cached linkage errors, got {:?}", other),
    }
    assert!(cache.cached_error(ErrorKey::Constant(prepared.failing)).is_some());
    Ok(())
}

#[test]
fn redefinition_repoints_and_resets() -> Result<()> {
    let mut prepared = prepared()?;
    let resolver = NameResolver::default();
    {
        let cache = cache_of(&prepared)?;
        cache.resolve_method(RUN_ROW, opcodes::INVOKEVIRTUAL, &resolver)?;
        cache.resolve_method(MAKE_ROW, opcodes::INVOKESTATIC, &resolver)?;
        cache.resolve_invokedynamic(0, &resolver)?;
    }

    let replacement = RuntimeMethod::shared(ClassId(7), "run", "()V", MethodAccessFlags::PUBLIC)?;
    let report = {
        let cache = prepared.class.cache_mut().ok_or(Error::OutOfBounds)?;
        let replacement = replacement.clone();
        cache.adjust_method_entries(move |method| match method.name.as_str() {
            "run" => MethodReplacement::Replaced(replacement.clone()),
            "make" | "get" => MethodReplacement::Deleted,
            _ => MethodReplacement::Unchanged,
        })
    };
    assert_eq!(
        report,
        AdjustReport {
            methods_replaced: 1,
            methods_reset: 1,
            call_sites_replaced: 0,
            call_sites_reset: 1,
        }
    );

    let cache = cache_of(&prepared)?;
    let run = cache.probe_method(RUN_ROW, opcodes::INVOKEVIRTUAL).expect("still resolved");
    assert!(run.method.is_some_and(|m| Arc::ptr_eq(&m, &replacement)));
    assert!(cache.probe_method(MAKE_ROW, opcodes::INVOKESTATIC).is_none());
    assert!(cache.probe_invokedynamic(0).is_none());

    cache.resolve_invokedynamic(0, &resolver)?;
    assert_eq!(resolver.bootstrap_count(), 2);
    Ok(())
}

#[test]
fn archiving_keeps_only_deterministic_resolutions() -> Result<()> {
    let mut prepared = prepared()?;
    let resolver = NameResolver::default();
    {
        let cache = cache_of(&prepared)?;
        cache.resolve_field(COUNT_ROW, opcodes::GETFIELD, &resolver)?;
        cache.resolve_method(RUN_ROW, opcodes::INVOKEVIRTUAL, &resolver)?;
        cache.resolve_constant(prepared.greeting, &resolver)?;
        cache.resolve_invokedynamic(0, &resolver)?;
        let _ = cache.resolve_constant(prepared.failing, &resolver);
    }

    let policy = |pool: &ConstantPool, cp_index: u16| {
        matches!(pool.tag_at(cp_index), Ok(ConstantTag::Fieldref))
    };
    let report = prepared
        .class
        .cache_mut()
        .ok_or(Error::OutOfBounds)?
        .prepare_for_archiving(&policy);

    assert_eq!(report.fields_archived, 1);
    assert_eq!(report.fields_reverted, 0);
    assert_eq!(report.methods_archived, 0);
    assert_eq!(report.methods_reverted, 1);
    assert_eq!(report.call_sites_archived, 0);
    assert_eq!(report.call_sites_reverted, 1);
    assert_eq!(report.references_cleared, 1);

    let cache = cache_of(&prepared)?;
    assert!(cache.probe_field(COUNT_ROW, opcodes::GETFIELD).is_some());
    assert!(cache.probe_method(RUN_ROW, opcodes::INVOKEVIRTUAL).is_none());
    assert!(cache.probe_invokedynamic(0).is_none());
    assert!(cache.cached_error(ErrorKey::Constant(prepared.failing)).is_none());

    let slot = cache
        .references()
        .slot_for_constant(prepared.greeting)
        .expect("string slot");
    assert!(cache.references().get(slot).is_some());
    Ok(())
}
