//! Rewriting and reversal of whole classes through the public API.

mod common;

use classlink::prelude::*;
use common::*;

/// A class touching every rewritten instruction kind, plus the pool indices it uses.
struct Fixture {
    class: LoadedClass,
    x: u16,
    y: u16,
    run: u16,
    area: u16,
    greeting: u16,
    shape_type: u16,
    indy: u16,
}

#[rustfmt::skip]
fn fixture() -> Result<Fixture> {
    let mut builder = ConstantPoolBuilder::new();
    let x = builder.add_fieldref("demo/Point", "x", "I")?;
    let y = builder.add_fieldref("demo/Point", "y", "I")?;
    let run = builder.add_methodref("demo/Point", "run", "()V")?;
    let area = builder.add_interface_methodref("demo/Shape", "area", "()I")?;
    let greeting = builder.add_string("hello")?;
    let shape_type = builder.add_method_type("()Ldemo/Shape;")?;
    let indy = builder.add_invokedynamic(0, "get", "()Ljava/util/function/Supplier;")?;

    let [xh, xl] = be(x);
    let [yh, yl] = be(y);
    let [rh, rl] = be(run);
    let [ah, al] = be(area);
    let [th, tl] = be(shape_type);
    let [ih, il] = be(indy);
    let greeting_byte = u8::try_from(greeting).map_err(|_| Error::OutOfBounds)?;

    let sum = vec![
        opcodes::ALOAD_0,
        opcodes::GETFIELD, xh, xl,
        opcodes::ALOAD_0,
        opcodes::GETFIELD, yh, yl,
        opcodes::IADD,
        opcodes::IRETURN,
    ];
    let calls = vec![
        opcodes::ALOAD_0,
        opcodes::INVOKEVIRTUAL, rh, rl,
        opcodes::ALOAD_0,
        opcodes::INVOKEINTERFACE, ah, al, 1, 0,
        opcodes::POP,
        opcodes::ALOAD_0,
        opcodes::INVOKESPECIAL, ah, al,
        opcodes::POP,
        opcodes::RETURN,
    ];
    let mut mixed = vec![
        opcodes::LDC, greeting_byte,
        opcodes::POP,
        opcodes::LDC_W, th, tl,
        opcodes::POP,
        opcodes::INVOKEDYNAMIC, ih, il, 0, 0,
        opcodes::POP,
        opcodes::WIDE, opcodes::ILOAD, 0, 2,
    ];
    mixed.extend(lookupswitch(mixed.len(), 3));
    mixed.extend_from_slice(&[
        opcodes::ALOAD_0,
        opcodes::MONITORENTER,
        opcodes::ALOAD_0,
        opcodes::MONITOREXIT,
        opcodes::RETURN,
    ]);

    let class = LoadedClass::new(
        "demo/Point",
        builder.build(),
        vec![
            instance_method("sum", "()I", sum),
            instance_method("calls", "()V", calls),
            instance_method("mixed", "(I)V", mixed),
        ],
    );
    Ok(Fixture {
        class,
        x,
        y,
        run,
        area,
        greeting,
        shape_type,
        indy,
    })
}

#[test]
fn field_operands_become_rows() -> Result<()> {
    let Fixture { mut class, x, y, .. } = fixture()?;
    let original = code_of(&class);

    rewrite(&mut class, &RewriterConfig::default())?;
    let cache = class.cache().ok_or(Error::OutOfBounds)?;
    let code = &class.methods()[0].code;

    assert_eq!(cache_operand(code, 1)?, Some(CacheOperand::Field(0)));
    assert_eq!(cache_operand(code, 5)?, Some(CacheOperand::Field(1)));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Field(0)), Some(x));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Field(1)), Some(y));

    restore_bytecodes(&mut class)?;
    assert_eq!(code_of(&class), original);
    assert!(class.cache().is_none());
    Ok(())
}

#[test]
fn interface_invokespecial_gets_its_own_row() -> Result<()> {
    let Fixture {
        mut class, run, area, ..
    } = fixture()?;

    rewrite(&mut class, &RewriterConfig::default())?;
    let cache = class.cache().ok_or(Error::OutOfBounds)?;
    let code = &class.methods()[1].code;

    let virtual_row = cache_operand(code, 1)?;
    let interface_row = cache_operand(code, 5)?;
    let special_row = cache_operand(code, 12)?;
    assert_eq!(virtual_row, Some(CacheOperand::Method(0)));
    assert_eq!(interface_row, Some(CacheOperand::Method(1)));
    assert_eq!(special_row, Some(CacheOperand::Method(2)));

    assert_eq!(cache.constant_pool_index_of(CacheOperand::Method(0)), Some(run));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Method(1)), Some(area));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Method(2)), Some(area));

    // The count and zero bytes of invokeinterface are untouched
    assert_eq!(&code[8..10], &[1, 0]);

    restore_bytecodes(&mut class)?;
    let code = &class.methods()[1].code;
    assert_eq!(&code[6..8], &be(area));
    assert_eq!(&code[13..15], &be(area));
    Ok(())
}

#[rustfmt::skip]
#[test]
fn invokespecial_rows_are_shared_per_interface_method() -> Result<()> {
    let mut builder = ConstantPoolBuilder::new();
    let area = builder.add_interface_methodref("demo/Shape", "area", "()I")?;
    let perimeter = builder.add_interface_methodref("demo/Shape", "perimeter", "()I")?;
    let [ah, al] = be(area);
    let [ph, pl] = be(perimeter);

    let code = vec![
        opcodes::ALOAD_0, opcodes::INVOKEVIRTUAL, ah, al, opcodes::POP,
        opcodes::ALOAD_0, opcodes::INVOKESPECIAL, ah, al, opcodes::POP,
        opcodes::ALOAD_0, opcodes::INVOKESPECIAL, ah, al, opcodes::POP,
        opcodes::ALOAD_0, opcodes::INVOKESPECIAL, ph, pl, opcodes::POP,
        opcodes::RETURN,
    ];
    let mut class = LoadedClass::new(
        "demo/Square",
        builder.build(),
        vec![instance_method("measure", "()V", code.clone())],
    );

    rewrite(&mut class, &RewriterConfig::default())?;
    let cache = class.cache().ok_or(Error::OutOfBounds)?;
    let rewritten = &class.methods()[0].code;

    assert_eq!(cache_operand(rewritten, 1)?, Some(CacheOperand::Method(0)));
    assert_eq!(cache_operand(rewritten, 6)?, Some(CacheOperand::Method(2)));
    assert_eq!(cache_operand(rewritten, 11)?, Some(CacheOperand::Method(2)));
    assert_eq!(cache_operand(rewritten, 16)?, Some(CacheOperand::Method(3)));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Method(0)), Some(area));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Method(2)), Some(area));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Method(3)), Some(perimeter));
    assert!(!cache.contains(CacheOperand::Method(4)));

    restore_bytecodes(&mut class)?;
    assert_eq!(class.methods()[0].code, code);
    Ok(())
}

#[test]
fn lookupswitch_variant_follows_threshold() -> Result<()> {
    let pool = ConstantPoolBuilder::new().build();
    let mut small = vec![opcodes::ILOAD_0];
    small.extend(lookupswitch(1, 3));
    small.push(opcodes::RETURN);
    let mut large = vec![opcodes::ILOAD_0];
    large.extend(lookupswitch(1, 50));
    large.push(opcodes::RETURN);

    let mut class = LoadedClass::new(
        "demo/Switches",
        pool,
        vec![
            static_method("small", "(I)V", small.clone()),
            static_method("large", "(I)V", large.clone()),
        ],
    );
    rewrite(&mut class, &RewriterConfig::default())?;

    for (method, original, expected) in [
        (0, &small, opcodes::FAST_LINEARSWITCH),
        (1, &large, opcodes::FAST_BINARYSWITCH),
    ] {
        let code = &class.methods()[method].code;
        assert_eq!(code[1], expected);

        let before = LookupSwitch::at(original, 1)?;
        let after = LookupSwitch::at(code, 1)?;
        assert_eq!(after.default_offset()?, before.default_offset()?);
        assert_eq!(after.pairs()?, before.pairs()?);
        assert_eq!(&code[2..], &original[2..]);
    }

    restore_bytecodes(&mut class)?;
    assert_eq!(class.methods()[0].code, small);
    assert_eq!(class.methods()[1].code, large);
    Ok(())
}

#[test]
fn switch_threshold_is_configurable() -> Result<()> {
    let mut code = vec![opcodes::ILOAD_0];
    code.extend(lookupswitch(1, 3));
    code.push(opcodes::RETURN);
    let mut class = LoadedClass::new(
        "demo/Switches",
        ConstantPoolBuilder::new().build(),
        vec![static_method("small", "(I)V", code)],
    );

    let config = RewriterConfig {
        binary_switch_threshold: 2,
        ..RewriterConfig::default()
    };
    rewrite(&mut class, &config)?;
    assert_eq!(class.methods()[0].code[1], opcodes::FAST_BINARYSWITCH);
    Ok(())
}

#[test]
fn root_initializer_registers_finalizer() -> Result<()> {
    let init = || instance_method("<init>", "()V", vec![opcodes::RETURN]);
    let empty = || ConstantPoolBuilder::new().build();
    let mut root = LoadedClass::new("java/lang/Object", empty(), vec![init()]);
    let mut other = LoadedClass::new("demo/Other", empty(), vec![init()]);

    rewrite(&mut root, &RewriterConfig::default())?;
    rewrite(&mut other, &RewriterConfig::default())?;
    assert_eq!(root.methods()[0].code, vec![opcodes::RETURN_REGISTER_FINALIZER]);
    assert_eq!(other.methods()[0].code, vec![opcodes::RETURN]);

    restore_bytecodes(&mut root)?;
    assert_eq!(root.methods()[0].code, vec![opcodes::RETURN]);

    let mut plain = LoadedClass::new("java/lang/Object", empty(), vec![init()]);
    rewrite(&mut plain, &RewriterConfig::without_intrinsics())?;
    assert_eq!(plain.methods()[0].code, vec![opcodes::RETURN]);
    Ok(())
}

#[test]
fn root_initializer_must_not_store_receiver() {
    let code = vec![opcodes::ACONST_NULL, opcodes::ASTORE_0, opcodes::RETURN];
    let mut class = LoadedClass::new(
        "java/lang/Object",
        ConstantPoolBuilder::new().build(),
        vec![instance_method("<init>", "()V", code.clone())],
    );

    let result = rewrite(&mut class, &RewriterConfig::default());
    assert!(matches!(result, Err(Error::InvariantViolation(_))));
    assert!(!class.is_rewritten());
    assert_eq!(class.methods()[0].code, code);
}

#[test]
fn full_round_trip_restores_every_byte() -> Result<()> {
    let Fixture {
        mut class,
        greeting,
        shape_type,
        indy,
        ..
    } = fixture()?;
    let original = code_of(&class);

    rewrite(&mut class, &RewriterConfig::default())?;
    let cache = class.cache().ok_or(Error::OutOfBounds)?;
    let mixed = &class.methods()[2];

    assert_eq!(mixed.code[0], opcodes::FAST_ALDC);
    assert_eq!(mixed.code[3], opcodes::FAST_ALDC_W);
    assert_eq!(
        cache_operand(&mixed.code, 0)?.and_then(|op| cache.constant_pool_index_of(op)),
        Some(greeting)
    );
    assert_eq!(
        cache_operand(&mixed.code, 3)?.and_then(|op| cache.constant_pool_index_of(op)),
        Some(shape_type)
    );
    assert_eq!(cache_operand(&mixed.code, 7)?, Some(CacheOperand::Indy(0)));
    assert_eq!(cache.constant_pool_index_of(CacheOperand::Indy(0)), Some(indy));
    assert!(mixed.has_monitor_bytecodes());
    assert!(!mixed.has_jsr());

    restore_bytecodes(&mut class)?;
    assert_eq!(code_of(&class), original);
    assert!(class.methods().iter().all(|m| m.flags().is_empty()));
    Ok(())
}

#[test]
fn rewritten_operands_are_in_range() -> Result<()> {
    let Fixture { mut class, .. } = fixture()?;
    rewrite(&mut class, &RewriterConfig::default())?;
    let cache = class.cache().ok_or(Error::OutOfBounds)?;

    let mut operands = 0;
    for method in class.methods() {
        for instruction in decode_stream(&method.code)? {
            if instruction.wide {
                continue;
            }
            if let Some(operand) = cache_operand(&method.code, instruction.bci)? {
                assert!(cache.contains(operand), "{:?} out of range", operand);
                operands += 1;
            }
        }
    }
    assert_eq!(operands, 8);
    Ok(())
}

#[test]
fn constant_pool_indices_survive_repeated_rewrites() -> Result<()> {
    let Fixture { mut class, .. } = fixture()?;

    let snapshot = |class: &LoadedClass| -> Result<Vec<(usize, usize, Option<u16>)>> {
        let cache = class.cache().ok_or(Error::OutOfBounds)?;
        let mut seen = Vec::new();
        for (index, method) in class.methods().iter().enumerate() {
            for instruction in decode_stream(&method.code)? {
                if instruction.wide {
                    continue;
                }
                if let Some(operand) = cache_operand(&method.code, instruction.bci)? {
                    seen.push((index, instruction.bci, cache.constant_pool_index_of(operand)));
                }
            }
        }
        Ok(seen)
    };

    rewrite(&mut class, &RewriterConfig::default())?;
    let first_code = code_of(&class);
    let first = snapshot(&class)?;

    restore_bytecodes(&mut class)?;
    rewrite(&mut class, &RewriterConfig::default())?;
    assert_eq!(code_of(&class), first_code);
    assert_eq!(snapshot(&class)?, first);
    assert!(first.iter().all(|(_, _, cp)| cp.is_some()));
    Ok(())
}

#[test]
fn failed_link_restores_bytecode() -> Result<()> {
    let Fixture { mut class, .. } = fixture()?;
    let original = code_of(&class);

    let result = rewrite_and_link(&mut class, &RewriterConfig::default(), |class| {
        assert!(class.is_rewritten());
        Err(linkage(LinkageErrorKind::IncompatibleClassChange, "verification failed"))
    });
    assert!(matches!(result, Err(Error::Linkage(_))));
    assert!(!class.is_rewritten());
    assert_eq!(code_of(&class), original);

    rewrite_and_link(&mut class, &RewriterConfig::default(), |_| Ok(()))?;
    assert!(class.is_rewritten());
    Ok(())
}

#[test]
fn metadata_limit_restores_bytecode() -> Result<()> {
    let Fixture { mut class, .. } = fixture()?;
    let original = code_of(&class);

    let config = RewriterConfig {
        metadata_limit: Some(8),
        ..RewriterConfig::default()
    };
    let result = rewrite(&mut class, &config);
    assert!(matches!(result, Err(Error::AllocationFailure(_))));
    assert!(!class.is_rewritten());
    assert_eq!(code_of(&class), original);
    assert!(class.methods().iter().all(|m| m.flags().is_empty()));
    Ok(())
}

#[test]
fn too_many_call_sites_overflow() -> Result<()> {
    let mut builder = ConstantPoolBuilder::new();
    let indy = builder.add_invokedynamic(0, "get", "()Ljava/lang/Object;")?;
    let [hi, lo] = be(indy);

    let mut code = Vec::new();
    for _ in 0..70_000 {
        code.extend_from_slice(&[opcodes::INVOKEDYNAMIC, hi, lo, 0, 0, opcodes::POP]);
    }
    code.push(opcodes::RETURN);
    let mut class = LoadedClass::new(
        "demo/Sites",
        builder.build(),
        vec![static_method("many", "()V", code.clone())],
    );

    let result = rewrite(&mut class, &RewriterConfig::default());
    assert!(matches!(result, Err(Error::RewriteOverflow(_))));
    assert!(!class.is_rewritten());
    assert_eq!(class.methods()[0].code, code);
    Ok(())
}

#[test]
fn too_many_method_rows_overflow() -> Result<()> {
    let mut builder = ConstantPoolBuilder::new();
    let class_index = builder.add_class("demo/I")?;
    let name_and_type_index = builder.add_name_and_type("m", "()V")?;

    let mut code = Vec::new();
    for _ in 0..33_000 {
        let reference = builder.push(ConstantPoolEntry::InterfaceMethodref {
            class_index,
            name_and_type_index,
        })?;
        let [hi, lo] = be(reference);
        code.extend_from_slice(&[opcodes::ALOAD_0, opcodes::INVOKESPECIAL, hi, lo]);
    }
    code.push(opcodes::RETURN);
    let mut class = LoadedClass::new(
        "demo/Defaults",
        builder.build(),
        vec![instance_method("all", "()V", code.clone())],
    );

    let result = rewrite(&mut class, &RewriterConfig::default());
    assert!(matches!(result, Err(Error::RewriteOverflow(_))));
    assert_eq!(class.methods()[0].code, code);
    Ok(())
}

#[test]
fn classes_rewrite_in_parallel() -> Result<()> {
    let mut classes = Vec::new();
    for index in 0..8 {
        let Fixture { class, .. } = fixture()?;
        if index == 5 {
            let bad = LoadedClass::new(
                "demo/Broken",
                ConstantPoolBuilder::new().build(),
                vec![static_method("f", "()V", vec![opcodes::GETSTATIC, 0, 1, opcodes::RETURN])],
            );
            classes.push(bad);
        } else {
            classes.push(class);
        }
    }

    let results = rewrite_classes(&mut classes, &RewriterConfig::default());
    assert_eq!(results.len(), 8);
    for (index, (result, class)) in results.iter().zip(&classes).enumerate() {
        if index == 5 {
            assert!(result.is_err());
            assert!(!class.is_rewritten());
        } else {
            assert!(result.is_ok());
            assert!(class.is_rewritten());
        }
    }
    Ok(())
}

#[test]
fn internal_opcodes_in_input_are_rejected() {
    for code in [
        vec![opcodes::NOP, opcodes::RETURN_REGISTER_FINALIZER],
        vec![opcodes::INVOKEHANDLE, 0x12, 0x34, opcodes::RETURN],
        vec![opcodes::FAST_ALDC, 1, opcodes::POP, opcodes::RETURN],
    ] {
        let mut class = LoadedClass::new(
            "demo/NotRoot",
            ConstantPoolBuilder::new().build(),
            vec![static_method("f", "()V", code.clone())],
        );

        let result = rewrite(&mut class, &RewriterConfig::default());
        assert!(matches!(result, Err(Error::Malformed { .. })), "{:?}", code);
        assert!(!class.is_rewritten());
        assert_eq!(class.methods()[0].code, code);
    }
}

#[test]
fn failed_restore_keeps_class_rewritten() -> Result<()> {
    let Fixture { mut class, .. } = fixture()?;
    rewrite(&mut class, &RewriterConfig::default())?;

    // the second getfield of `sum` now names a field row that does not exist
    class.methods_mut()[0].code[6..8].copy_from_slice(&u16::MAX.to_ne_bytes());
    let damaged = code_of(&class);

    let result = restore_bytecodes(&mut class);
    assert!(matches!(result, Err(Error::InvariantViolation(_))));
    assert!(class.is_rewritten());
    assert_eq!(code_of(&class), damaged);
    Ok(())
}

#[rustfmt::skip]
#[test]
fn subroutines_set_jsr_flag() -> Result<()> {
    let code = vec![
        opcodes::JSR, 0, 9,
        opcodes::JSR_W, 0, 0, 0, 6,
        opcodes::RETURN,
        opcodes::ASTORE_1,
        opcodes::RET, 1,
    ];
    let mut class = LoadedClass::new(
        "demo/Legacy",
        ConstantPoolBuilder::new().build(),
        vec![
            static_method("finally", "()V", code.clone()),
            static_method("plain", "()V", vec![opcodes::RETURN]),
        ],
    );

    rewrite(&mut class, &RewriterConfig::default())?;
    assert!(class.methods()[0].has_jsr());
    assert!(!class.methods()[1].has_jsr());
    assert_eq!(class.methods()[0].code, code);

    restore_bytecodes(&mut class)?;
    assert!(class.methods().iter().all(|m| m.flags().is_empty()));
    assert_eq!(class.methods()[0].code, code);
    Ok(())
}

#[rustfmt::skip]
#[test]
fn primitive_dynamic_constants_stay_on_slow_path() -> Result<()> {
    let mut builder = ConstantPoolBuilder::new();
    let answer = builder.add_dynamic(0, "answer", "I")?;
    let shape = builder.add_dynamic(0, "shape", "Ldemo/Shape;")?;
    let answer_byte = u8::try_from(answer).map_err(|_| Error::OutOfBounds)?;
    let shape_byte = u8::try_from(shape).map_err(|_| Error::OutOfBounds)?;
    let [nh, nl] = be(answer);
    let [sh, sl] = be(shape);

    let code = vec![
        opcodes::LDC, answer_byte, opcodes::POP,
        opcodes::LDC_W, nh, nl, opcodes::POP,
        opcodes::LDC, shape_byte, opcodes::POP,
        opcodes::LDC_W, sh, sl, opcodes::POP,
        opcodes::RETURN,
    ];
    let mut class = LoadedClass::new(
        "demo/Constants",
        builder.build(),
        vec![static_method("load", "()V", code.clone())],
    );

    rewrite(&mut class, &RewriterConfig::default())?;
    let cache = class.cache().ok_or(Error::OutOfBounds)?;
    let rewritten = &class.methods()[0].code;

    assert_eq!(&rewritten[..7], &code[..7]);
    assert_eq!(rewritten[7], opcodes::FAST_ALDC);
    assert_eq!(rewritten[10], opcodes::FAST_ALDC_W);
    assert_eq!(
        cache_operand(rewritten, 7)?.and_then(|op| cache.constant_pool_index_of(op)),
        Some(shape)
    );
    assert_eq!(
        cache_operand(rewritten, 10)?.and_then(|op| cache.constant_pool_index_of(op)),
        Some(shape)
    );

    restore_bytecodes(&mut class)?;
    assert_eq!(class.methods()[0].code, code);
    Ok(())
}
