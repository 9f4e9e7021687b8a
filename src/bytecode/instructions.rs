//! Static description of every opcode.
//!
//! [`BYTECODES`] is indexed directly by the opcode byte. Fixed-length instructions record their
//! length; `tableswitch`, `lookupswitch` (and its fast variants) and `wide` are marked variable
//! and measured by [`crate::bytecode::instruction_length`].

use crate::bytecode::opcodes::*;

/// Static properties of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytecodeInfo {
    /// Mnemonic, empty for undefined opcodes
    pub name: &'static str,
    /// Instruction length in bytes, 0 for variable-length instructions
    pub length: u8,
    /// Length when prefixed by `wide` (including the prefix), 0 if it cannot be widened
    pub wide_length: u8,
    /// The standard opcode this one stands for; equal to itself for standard opcodes
    pub java_code: u8,
    defined: bool,
}

impl BytecodeInfo {
    const UNDEFINED: BytecodeInfo = BytecodeInfo {
        name: "",
        length: 0,
        wide_length: 0,
        java_code: 0,
        defined: false,
    };

    const fn standard(name: &'static str, length: u8, wide_length: u8) -> Self {
        BytecodeInfo {
            name,
            length,
            wide_length,
            java_code: 0,
            defined: true,
        }
    }

    const fn internal(name: &'static str, java_code: u8, length: u8) -> Self {
        BytecodeInfo {
            name,
            length,
            wide_length: 0,
            java_code,
            defined: true,
        }
    }

    /// True if this opcode exists
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        self.defined
    }

    /// True for variable-length instructions
    #[must_use]
    pub const fn is_variable_length(&self) -> bool {
        self.length == 0
    }
}

const fn build_table() -> [BytecodeInfo; 256] {
    let mut t = [BytecodeInfo::UNDEFINED; 256];

    t[NOP as usize] = BytecodeInfo::standard("nop", 1, 0);
    t[ACONST_NULL as usize] = BytecodeInfo::standard("aconst_null", 1, 0);
    t[ICONST_M1 as usize] = BytecodeInfo::standard("iconst_m1", 1, 0);
    t[ICONST_0 as usize] = BytecodeInfo::standard("iconst_0", 1, 0);
    t[ICONST_1 as usize] = BytecodeInfo::standard("iconst_1", 1, 0);
    t[ICONST_2 as usize] = BytecodeInfo::standard("iconst_2", 1, 0);
    t[ICONST_3 as usize] = BytecodeInfo::standard("iconst_3", 1, 0);
    t[ICONST_4 as usize] = BytecodeInfo::standard("iconst_4", 1, 0);
    t[ICONST_5 as usize] = BytecodeInfo::standard("iconst_5", 1, 0);
    t[LCONST_0 as usize] = BytecodeInfo::standard("lconst_0", 1, 0);
    t[LCONST_1 as usize] = BytecodeInfo::standard("lconst_1", 1, 0);
    t[FCONST_0 as usize] = BytecodeInfo::standard("fconst_0", 1, 0);
    t[FCONST_1 as usize] = BytecodeInfo::standard("fconst_1", 1, 0);
    t[FCONST_2 as usize] = BytecodeInfo::standard("fconst_2", 1, 0);
    t[DCONST_0 as usize] = BytecodeInfo::standard("dconst_0", 1, 0);
    t[DCONST_1 as usize] = BytecodeInfo::standard("dconst_1", 1, 0);
    t[BIPUSH as usize] = BytecodeInfo::standard("bipush", 2, 0);
    t[SIPUSH as usize] = BytecodeInfo::standard("sipush", 3, 0);
    t[LDC as usize] = BytecodeInfo::standard("ldc", 2, 0);
    t[LDC_W as usize] = BytecodeInfo::standard("ldc_w", 3, 0);
    t[LDC2_W as usize] = BytecodeInfo::standard("ldc2_w", 3, 0);
    t[ILOAD as usize] = BytecodeInfo::standard("iload", 2, 4);
    t[LLOAD as usize] = BytecodeInfo::standard("lload", 2, 4);
    t[FLOAD as usize] = BytecodeInfo::standard("fload", 2, 4);
    t[DLOAD as usize] = BytecodeInfo::standard("dload", 2, 4);
    t[ALOAD as usize] = BytecodeInfo::standard("aload", 2, 4);
    t[ILOAD_0 as usize] = BytecodeInfo::standard("iload_0", 1, 0);
    t[ILOAD_1 as usize] = BytecodeInfo::standard("iload_1", 1, 0);
    t[ILOAD_2 as usize] = BytecodeInfo::standard("iload_2", 1, 0);
    t[ILOAD_3 as usize] = BytecodeInfo::standard("iload_3", 1, 0);
    t[LLOAD_0 as usize] = BytecodeInfo::standard("lload_0", 1, 0);
    t[LLOAD_1 as usize] = BytecodeInfo::standard("lload_1", 1, 0);
    t[LLOAD_2 as usize] = BytecodeInfo::standard("lload_2", 1, 0);
    t[LLOAD_3 as usize] = BytecodeInfo::standard("lload_3", 1, 0);
    t[FLOAD_0 as usize] = BytecodeInfo::standard("fload_0", 1, 0);
    t[FLOAD_1 as usize] = BytecodeInfo::standard("fload_1", 1, 0);
    t[FLOAD_2 as usize] = BytecodeInfo::standard("fload_2", 1, 0);
    t[FLOAD_3 as usize] = BytecodeInfo::standard("fload_3", 1, 0);
    t[DLOAD_0 as usize] = BytecodeInfo::standard("dload_0", 1, 0);
    t[DLOAD_1 as usize] = BytecodeInfo::standard("dload_1", 1, 0);
    t[DLOAD_2 as usize] = BytecodeInfo::standard("dload_2", 1, 0);
    t[DLOAD_3 as usize] = BytecodeInfo::standard("dload_3", 1, 0);
    t[ALOAD_0 as usize] = BytecodeInfo::standard("aload_0", 1, 0);
    t[ALOAD_1 as usize] = BytecodeInfo::standard("aload_1", 1, 0);
    t[ALOAD_2 as usize] = BytecodeInfo::standard("aload_2", 1, 0);
    t[ALOAD_3 as usize] = BytecodeInfo::standard("aload_3", 1, 0);
    t[IALOAD as usize] = BytecodeInfo::standard("iaload", 1, 0);
    t[LALOAD as usize] = BytecodeInfo::standard("laload", 1, 0);
    t[FALOAD as usize] = BytecodeInfo::standard("faload", 1, 0);
    t[DALOAD as usize] = BytecodeInfo::standard("daload", 1, 0);
    t[AALOAD as usize] = BytecodeInfo::standard("aaload", 1, 0);
    t[BALOAD as usize] = BytecodeInfo::standard("baload", 1, 0);
    t[CALOAD as usize] = BytecodeInfo::standard("caload", 1, 0);
    t[SALOAD as usize] = BytecodeInfo::standard("saload", 1, 0);
    t[ISTORE as usize] = BytecodeInfo::standard("istore", 2, 4);
    t[LSTORE as usize] = BytecodeInfo::standard("lstore", 2, 4);
    t[FSTORE as usize] = BytecodeInfo::standard("fstore", 2, 4);
    t[DSTORE as usize] = BytecodeInfo::standard("dstore", 2, 4);
    t[ASTORE as usize] = BytecodeInfo::standard("astore", 2, 4);
    t[ISTORE_0 as usize] = BytecodeInfo::standard("istore_0", 1, 0);
    t[ISTORE_1 as usize] = BytecodeInfo::standard("istore_1", 1, 0);
    t[ISTORE_2 as usize] = BytecodeInfo::standard("istore_2", 1, 0);
    t[ISTORE_3 as usize] = BytecodeInfo::standard("istore_3", 1, 0);
    t[LSTORE_0 as usize] = BytecodeInfo::standard("lstore_0", 1, 0);
    t[LSTORE_1 as usize] = BytecodeInfo::standard("lstore_1", 1, 0);
    t[LSTORE_2 as usize] = BytecodeInfo::standard("lstore_2", 1, 0);
    t[LSTORE_3 as usize] = BytecodeInfo::standard("lstore_3", 1, 0);
    t[FSTORE_0 as usize] = BytecodeInfo::standard("fstore_0", 1, 0);
    t[FSTORE_1 as usize] = BytecodeInfo::standard("fstore_1", 1, 0);
    t[FSTORE_2 as usize] = BytecodeInfo::standard("fstore_2", 1, 0);
    t[FSTORE_3 as usize] = BytecodeInfo::standard("fstore_3", 1, 0);
    t[DSTORE_0 as usize] = BytecodeInfo::standard("dstore_0", 1, 0);
    t[DSTORE_1 as usize] = BytecodeInfo::standard("dstore_1", 1, 0);
    t[DSTORE_2 as usize] = BytecodeInfo::standard("dstore_2", 1, 0);
    t[DSTORE_3 as usize] = BytecodeInfo::standard("dstore_3", 1, 0);
    t[ASTORE_0 as usize] = BytecodeInfo::standard("astore_0", 1, 0);
    t[ASTORE_1 as usize] = BytecodeInfo::standard("astore_1", 1, 0);
    t[ASTORE_2 as usize] = BytecodeInfo::standard("astore_2", 1, 0);
    t[ASTORE_3 as usize] = BytecodeInfo::standard("astore_3", 1, 0);
    t[IASTORE as usize] = BytecodeInfo::standard("iastore", 1, 0);
    t[LASTORE as usize] = BytecodeInfo::standard("lastore", 1, 0);
    t[FASTORE as usize] = BytecodeInfo::standard("fastore", 1, 0);
    t[DASTORE as usize] = BytecodeInfo::standard("dastore", 1, 0);
    t[AASTORE as usize] = BytecodeInfo::standard("aastore", 1, 0);
    t[BASTORE as usize] = BytecodeInfo::standard("bastore", 1, 0);
    t[CASTORE as usize] = BytecodeInfo::standard("castore", 1, 0);
    t[SASTORE as usize] = BytecodeInfo::standard("sastore", 1, 0);
    t[POP as usize] = BytecodeInfo::standard("pop", 1, 0);
    t[POP2 as usize] = BytecodeInfo::standard("pop2", 1, 0);
    t[DUP as usize] = BytecodeInfo::standard("dup", 1, 0);
    t[DUP_X1 as usize] = BytecodeInfo::standard("dup_x1", 1, 0);
    t[DUP_X2 as usize] = BytecodeInfo::standard("dup_x2", 1, 0);
    t[DUP2 as usize] = BytecodeInfo::standard("dup2", 1, 0);
    t[DUP2_X1 as usize] = BytecodeInfo::standard("dup2_x1", 1, 0);
    t[DUP2_X2 as usize] = BytecodeInfo::standard("dup2_x2", 1, 0);
    t[SWAP as usize] = BytecodeInfo::standard("swap", 1, 0);
    t[IADD as usize] = BytecodeInfo::standard("iadd", 1, 0);
    t[LADD as usize] = BytecodeInfo::standard("ladd", 1, 0);
    t[FADD as usize] = BytecodeInfo::standard("fadd", 1, 0);
    t[DADD as usize] = BytecodeInfo::standard("dadd", 1, 0);
    t[ISUB as usize] = BytecodeInfo::standard("isub", 1, 0);
    t[LSUB as usize] = BytecodeInfo::standard("lsub", 1, 0);
    t[FSUB as usize] = BytecodeInfo::standard("fsub", 1, 0);
    t[DSUB as usize] = BytecodeInfo::standard("dsub", 1, 0);
    t[IMUL as usize] = BytecodeInfo::standard("imul", 1, 0);
    t[LMUL as usize] = BytecodeInfo::standard("lmul", 1, 0);
    t[FMUL as usize] = BytecodeInfo::standard("fmul", 1, 0);
    t[DMUL as usize] = BytecodeInfo::standard("dmul", 1, 0);
    t[IDIV as usize] = BytecodeInfo::standard("idiv", 1, 0);
    t[LDIV as usize] = BytecodeInfo::standard("ldiv", 1, 0);
    t[FDIV as usize] = BytecodeInfo::standard("fdiv", 1, 0);
    t[DDIV as usize] = BytecodeInfo::standard("ddiv", 1, 0);
    t[IREM as usize] = BytecodeInfo::standard("irem", 1, 0);
    t[LREM as usize] = BytecodeInfo::standard("lrem", 1, 0);
    t[FREM as usize] = BytecodeInfo::standard("frem", 1, 0);
    t[DREM as usize] = BytecodeInfo::standard("drem", 1, 0);
    t[INEG as usize] = BytecodeInfo::standard("ineg", 1, 0);
    t[LNEG as usize] = BytecodeInfo::standard("lneg", 1, 0);
    t[FNEG as usize] = BytecodeInfo::standard("fneg", 1, 0);
    t[DNEG as usize] = BytecodeInfo::standard("dneg", 1, 0);
    t[ISHL as usize] = BytecodeInfo::standard("ishl", 1, 0);
    t[LSHL as usize] = BytecodeInfo::standard("lshl", 1, 0);
    t[ISHR as usize] = BytecodeInfo::standard("ishr", 1, 0);
    t[LSHR as usize] = BytecodeInfo::standard("lshr", 1, 0);
    t[IUSHR as usize] = BytecodeInfo::standard("iushr", 1, 0);
    t[LUSHR as usize] = BytecodeInfo::standard("lushr", 1, 0);
    t[IAND as usize] = BytecodeInfo::standard("iand", 1, 0);
    t[LAND as usize] = BytecodeInfo::standard("land", 1, 0);
    t[IOR as usize] = BytecodeInfo::standard("ior", 1, 0);
    t[LOR as usize] = BytecodeInfo::standard("lor", 1, 0);
    t[IXOR as usize] = BytecodeInfo::standard("ixor", 1, 0);
    t[LXOR as usize] = BytecodeInfo::standard("lxor", 1, 0);
    t[IINC as usize] = BytecodeInfo::standard("iinc", 3, 6);
    t[I2L as usize] = BytecodeInfo::standard("i2l", 1, 0);
    t[I2F as usize] = BytecodeInfo::standard("i2f", 1, 0);
    t[I2D as usize] = BytecodeInfo::standard("i2d", 1, 0);
    t[L2I as usize] = BytecodeInfo::standard("l2i", 1, 0);
    t[L2F as usize] = BytecodeInfo::standard("l2f", 1, 0);
    t[L2D as usize] = BytecodeInfo::standard("l2d", 1, 0);
    t[F2I as usize] = BytecodeInfo::standard("f2i", 1, 0);
    t[F2L as usize] = BytecodeInfo::standard("f2l", 1, 0);
    t[F2D as usize] = BytecodeInfo::standard("f2d", 1, 0);
    t[D2I as usize] = BytecodeInfo::standard("d2i", 1, 0);
    t[D2L as usize] = BytecodeInfo::standard("d2l", 1, 0);
    t[D2F as usize] = BytecodeInfo::standard("d2f", 1, 0);
    t[I2B as usize] = BytecodeInfo::standard("i2b", 1, 0);
    t[I2C as usize] = BytecodeInfo::standard("i2c", 1, 0);
    t[I2S as usize] = BytecodeInfo::standard("i2s", 1, 0);
    t[LCMP as usize] = BytecodeInfo::standard("lcmp", 1, 0);
    t[FCMPL as usize] = BytecodeInfo::standard("fcmpl", 1, 0);
    t[FCMPG as usize] = BytecodeInfo::standard("fcmpg", 1, 0);
    t[DCMPL as usize] = BytecodeInfo::standard("dcmpl", 1, 0);
    t[DCMPG as usize] = BytecodeInfo::standard("dcmpg", 1, 0);
    t[IFEQ as usize] = BytecodeInfo::standard("ifeq", 3, 0);
    t[IFNE as usize] = BytecodeInfo::standard("ifne", 3, 0);
    t[IFLT as usize] = BytecodeInfo::standard("iflt", 3, 0);
    t[IFGE as usize] = BytecodeInfo::standard("ifge", 3, 0);
    t[IFGT as usize] = BytecodeInfo::standard("ifgt", 3, 0);
    t[IFLE as usize] = BytecodeInfo::standard("ifle", 3, 0);
    t[IF_ICMPEQ as usize] = BytecodeInfo::standard("if_icmpeq", 3, 0);
    t[IF_ICMPNE as usize] = BytecodeInfo::standard("if_icmpne", 3, 0);
    t[IF_ICMPLT as usize] = BytecodeInfo::standard("if_icmplt", 3, 0);
    t[IF_ICMPGE as usize] = BytecodeInfo::standard("if_icmpge", 3, 0);
    t[IF_ICMPGT as usize] = BytecodeInfo::standard("if_icmpgt", 3, 0);
    t[IF_ICMPLE as usize] = BytecodeInfo::standard("if_icmple", 3, 0);
    t[IF_ACMPEQ as usize] = BytecodeInfo::standard("if_acmpeq", 3, 0);
    t[IF_ACMPNE as usize] = BytecodeInfo::standard("if_acmpne", 3, 0);
    t[GOTO as usize] = BytecodeInfo::standard("goto", 3, 0);
    t[JSR as usize] = BytecodeInfo::standard("jsr", 3, 0);
    t[RET as usize] = BytecodeInfo::standard("ret", 2, 4);
    t[TABLESWITCH as usize] = BytecodeInfo::standard("tableswitch", 0, 0);
    t[LOOKUPSWITCH as usize] = BytecodeInfo::standard("lookupswitch", 0, 0);
    t[IRETURN as usize] = BytecodeInfo::standard("ireturn", 1, 0);
    t[LRETURN as usize] = BytecodeInfo::standard("lreturn", 1, 0);
    t[FRETURN as usize] = BytecodeInfo::standard("freturn", 1, 0);
    t[DRETURN as usize] = BytecodeInfo::standard("dreturn", 1, 0);
    t[ARETURN as usize] = BytecodeInfo::standard("areturn", 1, 0);
    t[RETURN as usize] = BytecodeInfo::standard("return", 1, 0);
    t[GETSTATIC as usize] = BytecodeInfo::standard("getstatic", 3, 0);
    t[PUTSTATIC as usize] = BytecodeInfo::standard("putstatic", 3, 0);
    t[GETFIELD as usize] = BytecodeInfo::standard("getfield", 3, 0);
    t[PUTFIELD as usize] = BytecodeInfo::standard("putfield", 3, 0);
    t[INVOKEVIRTUAL as usize] = BytecodeInfo::standard("invokevirtual", 3, 0);
    t[INVOKESPECIAL as usize] = BytecodeInfo::standard("invokespecial", 3, 0);
    t[INVOKESTATIC as usize] = BytecodeInfo::standard("invokestatic", 3, 0);
    t[INVOKEINTERFACE as usize] = BytecodeInfo::standard("invokeinterface", 5, 0);
    t[INVOKEDYNAMIC as usize] = BytecodeInfo::standard("invokedynamic", 5, 0);
    t[NEW as usize] = BytecodeInfo::standard("new", 3, 0);
    t[NEWARRAY as usize] = BytecodeInfo::standard("newarray", 2, 0);
    t[ANEWARRAY as usize] = BytecodeInfo::standard("anewarray", 3, 0);
    t[ARRAYLENGTH as usize] = BytecodeInfo::standard("arraylength", 1, 0);
    t[ATHROW as usize] = BytecodeInfo::standard("athrow", 1, 0);
    t[CHECKCAST as usize] = BytecodeInfo::standard("checkcast", 3, 0);
    t[INSTANCEOF as usize] = BytecodeInfo::standard("instanceof", 3, 0);
    t[MONITORENTER as usize] = BytecodeInfo::standard("monitorenter", 1, 0);
    t[MONITOREXIT as usize] = BytecodeInfo::standard("monitorexit", 1, 0);
    t[WIDE as usize] = BytecodeInfo::standard("wide", 0, 0);
    t[MULTIANEWARRAY as usize] = BytecodeInfo::standard("multianewarray", 4, 0);
    t[IFNULL as usize] = BytecodeInfo::standard("ifnull", 3, 0);
    t[IFNONNULL as usize] = BytecodeInfo::standard("ifnonnull", 3, 0);
    t[GOTO_W as usize] = BytecodeInfo::standard("goto_w", 5, 0);
    t[JSR_W as usize] = BytecodeInfo::standard("jsr_w", 5, 0);
    t[BREAKPOINT as usize] = BytecodeInfo::standard("breakpoint", 1, 0);
    let mut op = 0;
    while op < 256 {
        if t[op].defined {
            t[op].java_code = op as u8;
        }
        op += 1;
    }

    t[FAST_LINEARSWITCH as usize] = BytecodeInfo::internal("fast_linearswitch", LOOKUPSWITCH, 0);
    t[FAST_BINARYSWITCH as usize] = BytecodeInfo::internal("fast_binaryswitch", LOOKUPSWITCH, 0);
    t[FAST_ALDC as usize] = BytecodeInfo::internal("fast_aldc", LDC, 2);
    t[FAST_ALDC_W as usize] = BytecodeInfo::internal("fast_aldc_w", LDC_W, 3);
    t[RETURN_REGISTER_FINALIZER as usize] =
        BytecodeInfo::internal("return_register_finalizer", RETURN, 1);
    t[INVOKEHANDLE as usize] = BytecodeInfo::internal("invokehandle", INVOKEVIRTUAL, 3);

    t
}

/// Opcode table, indexed by opcode byte
pub static BYTECODES: [BytecodeInfo; 256] = build_table();

/// Table entry for `opcode`
#[must_use]
pub fn info(opcode: u8) -> &'static BytecodeInfo {
    &BYTECODES[usize::from(opcode)]
}

/// Mnemonic of `opcode`, or `"<illegal>"`
#[must_use]
pub fn name(opcode: u8) -> &'static str {
    let info = info(opcode);
    if info.is_defined() {
        info.name
    } else {
        "<illegal>"
    }
}

/// Maps an internal opcode back to the standard opcode it replaced
#[must_use]
pub fn java_code(opcode: u8) -> u8 {
    info(opcode).java_code
}

/// True for the lookupswitch family, whose layout is shared by all three opcodes
#[must_use]
pub fn is_lookupswitch(opcode: u8) -> bool {
    matches!(opcode, LOOKUPSWITCH | FAST_LINEARSWITCH | FAST_BINARYSWITCH)
}
