//! Instruction set description and the shared decoder.
//!
//! # Key Components
//!
//! - [`opcodes`] - opcode byte constants, including the internal rewritten forms
//! - [`instructions`] - the static opcode table ([`BYTECODES`])
//! - [`instruction_length`] / [`decode_stream`] - length-computing decoder
//! - [`cache_operand`] - read the cache index a rewritten instruction carries

mod decoder;
pub mod instructions;
pub mod opcodes;

pub use decoder::{
    cache_operand, decode_stream, instruction_length, switch_padding, CacheOperand, Instruction,
    LookupSwitch,
};
pub use instructions::{BytecodeInfo, BYTECODES};
