//! Second rewriting pass: the reversible in-place bytecode traversal.
//!
//! A single walk serves both directions. In [`ScanMode::Rewrite`] constant-pool operands are
//! replaced by cache indices and some opcodes by their internal variants; in
//! [`ScanMode::Restore`] the same walk maps every index back through an [`OperandMap`]. Each
//! forward step validates everything it needs before it touches the buffer, so a scan that
//! stops at bci `n` leaves exactly `[0, n)` rewritten and can be undone by restoring up to `n`.

use crate::{
    bytecode::{opcodes::*, Instruction, LookupSwitch},
    cache::{EntryStore, OperandMap},
    classfile::{
        io::{read_be, read_ne, write_be, write_ne},
        ConstantPool, ConstantTag, MethodFlags,
    },
    rewriter::{
        indexmap::{is_signature_polymorphic, IndexMap},
        RewriterConfig,
    },
    Error, Result,
};

/// Everything a forward scan reads and allocates into
pub(crate) struct RewriteContext<'a> {
    pub(crate) pool: &'a ConstantPool,
    pub(crate) map: &'a IndexMap,
    pub(crate) store: &'a mut EntryStore,
    pub(crate) config: &'a RewriterConfig,
    /// The method is the root class constructor and registers finalizers on return
    pub(crate) root_initializer: bool,
}

/// Direction of a scan
pub(crate) enum ScanMode<'a> {
    Rewrite(RewriteContext<'a>),
    Restore(&'a dyn OperandMap),
}

/// A scan stopped at `bci`; everything before it was processed
#[derive(Debug)]
pub(crate) struct Interrupted {
    pub(crate) bci: usize,
    pub(crate) error: Error,
}

/// Walk `code` from the start up to (excluding) the instruction at `end`.
///
/// Returns the bookkeeping flags gathered by a forward scan; a restoring scan returns empty
/// flags.
pub(crate) fn scan(
    code: &mut [u8],
    mode: &mut ScanMode<'_>,
    end: usize,
) -> std::result::Result<MethodFlags, Interrupted> {
    let mut flags = MethodFlags::empty();
    let mut bci = 0;
    while bci < end.min(code.len()) {
        let step = Instruction::decode(code, bci).and_then(|instruction| {
            match mode {
                ScanMode::Rewrite(context) => {
                    context.rewrite_instruction(code, &instruction, &mut flags)?
                }
                ScanMode::Restore(map) => restore_instruction(code, &instruction, *map)?,
            }
            Ok(instruction.length)
        });

        match step {
            Ok(length) => bci += length,
            Err(error) => return Err(Interrupted { bci, error }),
        }
    }

    Ok(flags)
}

/// Reject stores to local 0 in the root class constructor.
///
/// Runs over the whole method before any instruction is rewritten.
///
/// # Errors
/// Returns [`Error::InvariantViolation`] naming the offending bci.
pub(crate) fn validate_root_initializer(class_name: &str, code: &[u8]) -> Result<()> {
    let mut bci = 0;
    while bci < code.len() {
        let instruction = Instruction::decode(code, bci)?;
        let operand = instruction.operand_offset();
        let overwrites_receiver = match instruction.opcode {
            ISTORE_0 | LSTORE_0 | FSTORE_0 | DSTORE_0 | ASTORE_0 => true,
            ISTORE | LSTORE | FSTORE | DSTORE | ASTORE if instruction.wide => {
                read_be::<u16>(code, operand)? == 0
            }
            ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => code[operand] == 0,
            _ => false,
        };
        if overwrites_receiver {
            return Err(Error::InvariantViolation(format!(
                "{}.<init> overwrites local 0 with {} at bci {}",
                class_name,
                instruction.mnemonic(),
                bci
            )));
        }
        bci += instruction.length;
    }

    Ok(())
}

impl RewriteContext<'_> {
    fn rewrite_instruction(
        &mut self,
        code: &mut [u8],
        instruction: &Instruction,
        flags: &mut MethodFlags,
    ) -> Result<()> {
        let bci = instruction.bci;
        if instruction.java_code() != instruction.opcode {
            return Err(malformed_error!(
                "internal opcode {} at bci {} in original bytecode",
                instruction.mnemonic(),
                bci
            ));
        }
        if instruction.wide {
            return Ok(());
        }

        match instruction.opcode {
            GETFIELD | PUTFIELD | GETSTATIC | PUTSTATIC => {
                let cp_index: u16 = read_be(code, bci + 1)?;
                let row = self.map.field_row(cp_index).ok_or_else(|| {
                    malformed_error!(
                        "{} at bci {} references #{}, not a Fieldref",
                        instruction.mnemonic(),
                        bci,
                        cp_index
                    )
                })?;
                write_ne(code, bci + 1, row)?;
            }
            INVOKEVIRTUAL => {
                let cp_index: u16 = read_be(code, bci + 1)?;
                let row = self.method_row(instruction, cp_index)?;
                if self.config.rewrite_invokehandle
                    && self.pool.tag_at(cp_index)? == ConstantTag::Methodref
                    && is_signature_polymorphic(&self.pool.member_ref_at(cp_index)?)
                {
                    self.store.reserve_appendix(row)?;
                    code[bci] = INVOKEHANDLE;
                }
                write_ne(code, bci + 1, row)?;
            }
            INVOKESPECIAL => {
                let cp_index: u16 = read_be(code, bci + 1)?;
                let row = if self.pool.tag_at(cp_index)? == ConstantTag::InterfaceMethodref {
                    self.store.add_invokespecial_row(cp_index)?
                } else {
                    self.method_row(instruction, cp_index)?
                };
                write_ne(code, bci + 1, row)?;
            }
            INVOKESTATIC | INVOKEINTERFACE => {
                let cp_index: u16 = read_be(code, bci + 1)?;
                let row = self.method_row(instruction, cp_index)?;
                write_ne(code, bci + 1, row)?;
            }
            INVOKEDYNAMIC => {
                let cp_index: u16 = read_be(code, bci + 1)?;
                let trailing: u16 = read_be(code, bci + 3)?;
                if trailing != 0 {
                    return Err(malformed_error!(
                        "invokedynamic at bci {} has non-zero trailing operand bytes",
                        bci
                    ));
                }
                if self.pool.tag_at(cp_index)? != ConstantTag::InvokeDynamic {
                    return Err(malformed_error!(
                        "invokedynamic at bci {} references #{}, not an InvokeDynamic",
                        bci,
                        cp_index
                    ));
                }
                let row = self.store.add_indy(cp_index)?;
                write_ne(code, bci + 1, row)?;
            }
            LDC => {
                let cp_index = u16::from(code[bci + 1]);
                if let Some(slot) = self.fast_reference_slot(cp_index)? {
                    let slot = u8::try_from(slot).map_err(|_| {
                        Error::RewriteOverflow(format!(
                            "ldc at bci {} needs reference slot {}, beyond its one-byte operand",
                            bci, slot
                        ))
                    })?;
                    code[bci] = FAST_ALDC;
                    code[bci + 1] = slot;
                }
            }
            LDC_W => {
                let cp_index: u16 = read_be(code, bci + 1)?;
                if let Some(slot) = self.fast_reference_slot(cp_index)? {
                    write_ne(code, bci + 1, slot)?;
                    code[bci] = FAST_ALDC_W;
                }
            }
            LOOKUPSWITCH => {
                let npairs = LookupSwitch::at(code, bci)?.npairs();
                code[bci] = if npairs < self.config.binary_switch_threshold {
                    FAST_LINEARSWITCH
                } else {
                    FAST_BINARYSWITCH
                };
            }
            RETURN if self.root_initializer => code[bci] = RETURN_REGISTER_FINALIZER,
            JSR | JSR_W => flags.insert(MethodFlags::HAS_JSR),
            MONITORENTER | MONITOREXIT => flags.insert(MethodFlags::HAS_MONITOR_BYTECODES),
            _ => {}
        }

        Ok(())
    }

    fn method_row(&self, instruction: &Instruction, cp_index: u16) -> Result<u16> {
        self.map.method_row(cp_index).ok_or_else(|| {
            malformed_error!(
                "{} at bci {} references #{}, not a method reference",
                instruction.mnemonic(),
                instruction.bci,
                cp_index
            )
        })
    }

    /// Reference slot of an `ldc` target that takes the fast path. Primitive dynamic
    /// constants and non-reference constants stay on the slow path.
    fn fast_reference_slot(&self, cp_index: u16) -> Result<Option<u16>> {
        let Some(slot) = self.map.reference_slot(cp_index) else {
            return Ok(None);
        };
        if self.pool.tag_at(cp_index)? == ConstantTag::Dynamic
            && !self.pool.is_reference_dynamic(cp_index)?
        {
            return Ok(None);
        }

        Ok(Some(slot))
    }
}

fn unmapped(instruction: &Instruction, index: impl std::fmt::Display) -> Error {
    Error::InvariantViolation(format!(
        "{} at bci {} carries unknown cache index {}",
        instruction.mnemonic(),
        instruction.bci,
        index
    ))
}

fn restore_instruction(
    code: &mut [u8],
    instruction: &Instruction,
    map: &dyn OperandMap,
) -> Result<()> {
    if instruction.wide {
        return Ok(());
    }

    let bci = instruction.bci;
    match instruction.opcode {
        GETFIELD | PUTFIELD | GETSTATIC | PUTSTATIC => {
            let row: u16 = read_ne(code, bci + 1)?;
            let cp_index = map
                .field_cp_index(row)
                .ok_or_else(|| unmapped(instruction, row))?;
            write_be(code, bci + 1, cp_index)?;
        }
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE | INVOKEHANDLE => {
            let row: u16 = read_ne(code, bci + 1)?;
            let cp_index = map
                .method_cp_index(row)
                .ok_or_else(|| unmapped(instruction, row))?;
            write_be(code, bci + 1, cp_index)?;
            if instruction.opcode == INVOKEHANDLE {
                code[bci] = INVOKEVIRTUAL;
            }
        }
        INVOKEDYNAMIC => {
            let row: u32 = read_ne(code, bci + 1)?;
            let cp_index = map
                .indy_cp_index(row)
                .ok_or_else(|| unmapped(instruction, row))?;
            write_be(code, bci + 1, cp_index)?;
            write_be(code, bci + 3, 0u16)?;
        }
        FAST_ALDC => {
            let slot = u16::from(code[bci + 1]);
            let cp_index = map
                .reference_cp_index(slot)
                .and_then(|cp_index| u8::try_from(cp_index).ok())
                .ok_or_else(|| unmapped(instruction, slot))?;
            code[bci] = LDC;
            code[bci + 1] = cp_index;
        }
        FAST_ALDC_W => {
            let slot: u16 = read_ne(code, bci + 1)?;
            let cp_index = map
                .reference_cp_index(slot)
                .ok_or_else(|| unmapped(instruction, slot))?;
            write_be(code, bci + 1, cp_index)?;
            code[bci] = LDC_W;
        }
        FAST_LINEARSWITCH | FAST_BINARYSWITCH => code[bci] = LOOKUPSWITCH,
        RETURN_REGISTER_FINALIZER => code[bci] = RETURN,
        _ => {}
    }

    Ok(())
}
