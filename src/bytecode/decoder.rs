//! Length-computing instruction decoder.
//!
//! One decoder serves every consumer of method bytecode: the rewriter in both directions, the
//! read-only tracing helpers and the interpreter's dispatcher. It understands the standard
//! instruction set as well as the internal opcodes produced by rewriting, so it can walk a method
//! in any state.
//!
//! # Switch alignment
//!
//! `tableswitch` and the `lookupswitch` family pad their operands so the first 4-byte field
//! starts at a multiple of four from the start of the code buffer:
//!
//! ```text
//! pad = (4 - (bci + 1) % 4) % 4
//! tableswitch  = 1 + pad + 12 + 4 * (high - low + 1)
//! lookupswitch = 1 + pad +  8 + 8 * npairs
//! ```
//!
//! # Examples
//!
//! ```rust
//! use classlink::bytecode::{decode_stream, opcodes};
//!
//! let code = [opcodes::ICONST_1, opcodes::ISTORE, 4, opcodes::RETURN];
//! let instructions = decode_stream(&code)?;
//!
//! assert_eq!(instructions.len(), 3);
//! assert_eq!(instructions[1].bci, 1);
//! assert_eq!(instructions[1].length, 2);
//! assert_eq!(instructions[2].mnemonic(), "return");
//! # Ok::<(), classlink::Error>(())
//! ```

use std::fmt;

use crate::{
    bytecode::{
        instructions::{info, is_lookupswitch, java_code, name},
        opcodes::*,
    },
    classfile::io::{read_be, read_ne},
    Error::OutOfBounds,
    Result,
};

/// Number of padding bytes after a switch opcode at `bci`
#[must_use]
pub fn switch_padding(bci: usize) -> usize {
    (4 - (bci + 1) % 4) % 4
}

/// Computes the length of the instruction starting at `bci`.
///
/// Handles `wide`-prefixed instructions, `tableswitch` and the `lookupswitch` family, and
/// verifies that the complete instruction lies within `code`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for undefined opcodes or invalid switch tables, and
/// [`crate::Error::OutOfBounds`] for truncated instructions.
pub fn instruction_length(code: &[u8], bci: usize) -> Result<usize> {
    let Some(&opcode) = code.get(bci) else {
        return Err(OutOfBounds);
    };

    let entry = info(opcode);
    if !entry.is_defined() {
        return Err(malformed_error!(
            "Invalid opcode {:#04x} at bci {}",
            opcode,
            bci
        ));
    }

    let length = match opcode {
        WIDE => {
            let Some(&widened) = code.get(bci + 1) else {
                return Err(OutOfBounds);
            };
            match info(widened).wide_length {
                0 => {
                    return Err(malformed_error!(
                        "Opcode {} cannot follow wide at bci {}",
                        name(widened),
                        bci
                    ))
                }
                length => usize::from(length),
            }
        }
        TABLESWITCH => {
            let base = bci + 1 + switch_padding(bci);
            let low: i32 = read_be(code, base + 4)?;
            let high: i32 = read_be(code, base + 8)?;
            if high < low {
                return Err(malformed_error!(
                    "tableswitch at bci {} has high {} below low {}",
                    bci,
                    high,
                    low
                ));
            }
            let cases = usize::try_from(i64::from(high) - i64::from(low) + 1)
                .map_err(|_| malformed_error!("tableswitch case count overflow"))?;
            (1 + switch_padding(bci) + 12)
                .checked_add(cases.checked_mul(4).ok_or(OutOfBounds)?)
                .ok_or(OutOfBounds)?
        }
        op if is_lookupswitch(op) => {
            let base = bci + 1 + switch_padding(bci);
            let npairs: i32 = read_be(code, base + 4)?;
            let npairs = usize::try_from(npairs).map_err(|_| {
                malformed_error!("lookupswitch at bci {} has negative pair count", bci)
            })?;
            (1 + switch_padding(bci) + 8)
                .checked_add(npairs.checked_mul(8).ok_or(OutOfBounds)?)
                .ok_or(OutOfBounds)?
        }
        _ => usize::from(entry.length),
    };

    match bci.checked_add(length) {
        Some(end) if end <= code.len() => Ok(length),
        _ => Err(OutOfBounds),
    }
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the first byte (the opcode, or the `wide` prefix)
    pub bci: usize,
    /// The opcode; for `wide` instructions this is the widened opcode
    pub opcode: u8,
    /// Total length in bytes, including any `wide` prefix
    pub length: usize,
    /// Set for `wide`-prefixed instructions
    pub wide: bool,
}

impl Instruction {
    /// Decode the instruction at `bci`
    ///
    /// # Errors
    /// Returns an error if the instruction is invalid or truncated.
    pub fn decode(code: &[u8], bci: usize) -> Result<Self> {
        let length = instruction_length(code, bci)?;
        let wide = code[bci] == WIDE;
        let opcode = if wide { code[bci + 1] } else { code[bci] };
        Ok(Instruction {
            bci,
            opcode,
            length,
            wide,
        })
    }

    /// Offset of the first operand byte, after the opcode (and `wide` prefix)
    #[must_use]
    pub fn operand_offset(&self) -> usize {
        self.bci + if self.wide { 2 } else { 1 }
    }

    /// Mnemonic of the opcode
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        name(self.opcode)
    }

    /// The standard opcode this instruction corresponds to
    #[must_use]
    pub fn java_code(&self) -> u8 {
        java_code(self.opcode)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wide {
            write!(f, "{:>5}: wide {}", self.bci, self.mnemonic())
        } else {
            write!(f, "{:>5}: {}", self.bci, self.mnemonic())
        }
    }
}

/// Decode all instructions of a method body
///
/// # Errors
/// Returns the first decoding error encountered.
pub fn decode_stream(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut bci = 0;
    while bci < code.len() {
        let instruction = Instruction::decode(code, bci)?;
        bci += instruction.length;
        instructions.push(instruction);
    }

    Ok(instructions)
}

/// Read-only view of a `lookupswitch` (or fast variant) table
#[derive(Debug, Clone, Copy)]
pub struct LookupSwitch<'a> {
    code: &'a [u8],
    base: usize,
    npairs: usize,
}

impl<'a> LookupSwitch<'a> {
    /// Create a view over the switch at `bci`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no lookupswitch starts at `bci`.
    pub fn at(code: &'a [u8], bci: usize) -> Result<Self> {
        match code.get(bci) {
            Some(&op) if is_lookupswitch(op) => {}
            _ => return Err(malformed_error!("No lookupswitch at bci {}", bci)),
        }

        instruction_length(code, bci)?;
        let base = bci + 1 + switch_padding(bci);
        let npairs: i32 = read_be(code, base + 4)?;
        Ok(LookupSwitch {
            code,
            base,
            npairs: usize::try_from(npairs).map_err(|_| OutOfBounds)?,
        })
    }

    /// Relative jump offset of the default case
    ///
    /// # Errors
    /// Returns an error on truncated tables.
    pub fn default_offset(&self) -> Result<i32> {
        read_be(self.code, self.base)
    }

    /// Number of match/offset pairs
    #[must_use]
    pub fn npairs(&self) -> usize {
        self.npairs
    }

    /// The `(match, offset)` pair at `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the last pair.
    pub fn pair(&self, index: usize) -> Result<(i32, i32)> {
        if index >= self.npairs {
            return Err(OutOfBounds);
        }

        let at = self.base + 8 + index * 8;
        Ok((read_be(self.code, at)?, read_be(self.code, at + 4)?))
    }

    /// All pairs in table order
    ///
    /// # Errors
    /// Returns an error on truncated tables.
    pub fn pairs(&self) -> Result<Vec<(i32, i32)>> {
        (0..self.npairs).map(|index| self.pair(index)).collect()
    }
}

/// A rewritten operand, decoded as an index into one of the resolution-cache tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperand {
    /// Row in the field table
    Field(u16),
    /// Row in the method table
    Method(u16),
    /// Row in the invokedynamic table
    Indy(u32),
    /// Slot in the resolved references
    Reference(u16),
}

/// Decode the cache index carried by a rewritten instruction at `bci`.
///
/// Returns `None` for instructions that do not carry a cache index. Must only be used on
/// bytecode that has been rewritten; on original bytecode the operand is a constant-pool index.
///
/// # Errors
/// Returns an error for truncated instructions.
pub fn cache_operand(code: &[u8], bci: usize) -> Result<Option<CacheOperand>> {
    let Some(&opcode) = code.get(bci) else {
        return Err(OutOfBounds);
    };

    Ok(match opcode {
        GETFIELD | PUTFIELD | GETSTATIC | PUTSTATIC => {
            Some(CacheOperand::Field(read_ne(code, bci + 1)?))
        }
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE | INVOKEHANDLE => {
            Some(CacheOperand::Method(read_ne(code, bci + 1)?))
        }
        INVOKEDYNAMIC => Some(CacheOperand::Indy(read_ne(code, bci + 1)?)),
        FAST_ALDC => match code.get(bci + 1) {
            Some(&slot) => Some(CacheOperand::Reference(u16::from(slot))),
            None => return Err(OutOfBounds),
        },
        FAST_ALDC_W => Some(CacheOperand::Reference(read_ne(code, bci + 1)?)),
        _ => None,
    })
}
