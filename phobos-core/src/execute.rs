//! Instruction execution.
//!
//! [`Executor`] borrows the hart, guest memory and host shim side by side and applies one decoded
//! instruction to them. Execution never fails: decode already rejected malformed encodings, and
//! memory misses degrade to zero reads / dropped writes (reported by [`crate::memory`]).

use crate::hart::Hart;
use crate::host::Host;
use crate::instruction::{
    AmoOp, BranchCondition, CsrOp, CsrSource, FmaOp, FpCondition, FpFormat, FpRegRegOp,
    Instruction, IntConvWidth, LoadWidth, MemWidth, MulDiv32Op, MulDivOp, RegImmOp, RegReg32Op,
    RegRegOp, RegShiftImmOp, StoreWidth,
};
use crate::memory::SparseMemory;
use crate::registers::Specifier;

/// Executes decoded instructions against the architectural state.
#[derive(Debug)]
pub struct Executor<'a> {
    pub hart: &'a mut Hart,
    pub memory: &'a mut SparseMemory,
    pub host: &'a mut Host,
    /// Encoded length in bytes of the instruction being executed: 2 for a compressed parcel,
    /// 4 otherwise. Sequential instructions advance PC by this, and jumps link `pc + size`.
    pub size: u64,
}

impl Executor<'_> {
    /// Applies `instruction` to the hart, advancing PC.
    pub fn execute(&mut self, instruction: &Instruction) {
        match *instruction {
            Instruction::Lui { dest, immediate } => self.lui(dest, immediate),
            Instruction::Auipc { dest, immediate } => self.auipc(dest, immediate),
            Instruction::Jal { dest, offset } => self.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => self.jalr(dest, base, offset),
            Instruction::Branch { condition, src1, src2, offset } => {
                self.branch(condition, src1, src2, offset)
            }
            Instruction::Load { width, dest, base, offset } => self.load(width, dest, base, offset),
            Instruction::Store { width, src, base, offset } => self.store(width, src, base, offset),
            Instruction::OpImm { op, dest, src, immediate } => self.op_imm(op, dest, src, immediate),
            Instruction::OpShiftImm { op, dest, src, shift_amount_u6 } => {
                self.op_shift_imm(op, dest, src, shift_amount_u6)
            }
            Instruction::OpImm32 { dest, src, immediate } => self.addiw(dest, src, immediate),
            Instruction::OpShiftImm32 { op, dest, src, shift_amount_u5 } => {
                self.op_shift_imm32(op, dest, src, shift_amount_u5)
            }
            Instruction::Op { op, dest, src1, src2 } => self.op(op, dest, src1, src2),
            Instruction::Op32 { op, dest, src1, src2 } => self.op32(op, dest, src1, src2),
            Instruction::MulDiv { op, dest, src1, src2 } => self.mul_div(op, dest, src1, src2),
            Instruction::MulDiv32 { op, dest, src1, src2 } => self.mul_div32(op, dest, src1, src2),
            Instruction::LoadReserved { width, dest, addr, .. } => {
                self.load_reserved(width, dest, addr)
            }
            Instruction::StoreConditional { width, dest, addr, src, .. } => {
                self.store_conditional(width, dest, addr, src)
            }
            Instruction::Amo { op, width, dest, addr, src, .. } => {
                self.amo(op, width, dest, addr, src)
            }
            Instruction::LoadFp { format, dest, base, offset } => {
                self.load_fp(format, dest, base, offset)
            }
            Instruction::StoreFp { format, src, base, offset } => {
                self.store_fp(format, src, base, offset)
            }
            Instruction::OpFp { op, format, dest, src1, src2 } => {
                self.op_fp(op, format, dest, src1, src2)
            }
            Instruction::FpSqrt { format, dest, src } => self.fp_sqrt(format, dest, src),
            Instruction::FpCompare { condition, format, dest, src1, src2 } => {
                self.fp_compare(condition, format, dest, src1, src2)
            }
            Instruction::FpClass { format, dest, src } => self.fp_class(format, dest, src),
            Instruction::FpCvtToInt { format, target, dest, src } => {
                self.fp_cvt_to_int(format, target, dest, src)
            }
            Instruction::FpCvtFromInt { format, source, dest, src } => {
                self.fp_cvt_from_int(format, source, dest, src)
            }
            Instruction::FpCvtFormat { to, dest, src } => self.fp_cvt_format(to, dest, src),
            Instruction::FpMvToInt { format, dest, src } => self.fp_mv_to_int(format, dest, src),
            Instruction::FpMvFromInt { format, dest, src } => {
                self.fp_mv_from_int(format, dest, src)
            }
            Instruction::FusedMulAdd { op, format, dest, src1, src2, src3 } => {
                self.fused_mul_add(op, format, dest, src1, src2, src3)
            }
            // Memory ordering is trivial on a single synchronous hart.
            Instruction::Fence { .. } | Instruction::FenceI => self.advance_pc(),
            Instruction::Ecall => self.ecall(),
            // EBREAK has no debugger attached to trap to.
            Instruction::Ebreak => self.advance_pc(),
            Instruction::Csr { op, dest, source, csr } => self.csr(op, dest, source, csr),
        }
    }

    fn advance_pc(&mut self) {
        self.hart.inc_pc(self.size as i64);
    }

    fn reg_imm_op(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i64,
        op: impl FnOnce(u64, i64) -> u64,
    ) {
        let result = op(self.hart.x(src), immediate);
        self.hart.set_x(dest, result);
        self.advance_pc();
    }

    fn reg_reg_op(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: impl FnOnce(u64, u64) -> u64,
    ) {
        let result = op(self.hart.x(src1), self.hart.x(src2));
        self.hart.set_x(dest, result);
        self.advance_pc();
    }

    /// > LUI (load upper immediate) is used to build 32-bit constants. LUI places the 32-bit
    /// > U-immediate value into register rd, filling in the lowest 12 bits with zeros. The 32-bit
    /// > result is sign-extended to 64 bits.
    fn lui(&mut self, dest: Specifier, immediate: i64) {
        self.hart.set_x(dest, immediate as u64);
        self.advance_pc();
    }

    /// > AUIPC (add upper immediate to pc) is used to build pc-relative addresses. AUIPC forms a
    /// > 32-bit offset from the U-immediate, sign-extends the result to 64 bits, adds it to the
    /// > address of the AUIPC instruction, then places the result in register rd.
    fn auipc(&mut self, dest: Specifier, immediate: i64) {
        let result = self.hart.pc().wrapping_add_signed(immediate);
        self.hart.set_x(dest, result);
        self.advance_pc();
    }

    /// The link value is `pc + size`, so a compressed jump-and-link returns past its own 2-byte
    /// parcel.
    fn jal(&mut self, dest: Specifier, offset: i64) {
        let pc = self.hart.pc();
        self.hart.set_x(dest, pc.wrapping_add(self.size));
        self.hart.set_pc(pc.wrapping_add_signed(offset));
    }

    /// > The target address is obtained by adding the sign-extended 12-bit I-immediate to the
    /// > register rs1, then setting the least-significant bit of the result to zero.
    fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i64) {
        // Read the base first; dest may alias it.
        let target = self.hart.x(base).wrapping_add_signed(offset) & !1;
        let link = self.hart.pc().wrapping_add(self.size);
        self.hart.set_x(dest, link);
        self.hart.set_pc(target);
    }

    fn branch(
        &mut self,
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: i64,
    ) {
        let a = self.hart.x(src1);
        let b = self.hart.x(src2);
        let taken = match condition {
            BranchCondition::Beq => a == b,
            BranchCondition::Bne => a != b,
            BranchCondition::Blt => (a as i64) < (b as i64),
            BranchCondition::Bge => (a as i64) >= (b as i64),
            BranchCondition::Bltu => a < b,
            BranchCondition::Bgeu => a >= b,
        };
        if taken {
            self.hart.inc_pc(offset);
        } else {
            self.advance_pc();
        }
    }

    fn load(&mut self, width: LoadWidth, dest: Specifier, base: Specifier, offset: i64) {
        let ea = self.hart.x(base).wrapping_add_signed(offset);
        let raw = self.hart.read_mem(self.memory, ea, width.size());
        let value = match width {
            LoadWidth::Lb => raw as u8 as i8 as i64 as u64,
            LoadWidth::Lh => raw as u16 as i16 as i64 as u64,
            LoadWidth::Lw => raw as u32 as i32 as i64 as u64,
            LoadWidth::Ld | LoadWidth::Lbu | LoadWidth::Lhu | LoadWidth::Lwu => raw,
        };
        self.hart.set_x(dest, value);
        self.advance_pc();
    }

    fn store(&mut self, width: StoreWidth, src: Specifier, base: Specifier, offset: i64) {
        let ea = self.hart.x(base).wrapping_add_signed(offset);
        let value = self.hart.x(src);
        self.hart.write_mem(self.memory, ea, width.size(), value);
        self.advance_pc();
    }

    fn op_imm(&mut self, op: RegImmOp, dest: Specifier, src: Specifier, immediate: i64) {
        match op {
            RegImmOp::Addi => self.reg_imm_op(dest, src, immediate, |s, imm| {
                s.wrapping_add_signed(imm)
            }),
            RegImmOp::Slti => {
                self.reg_imm_op(dest, src, immediate, |s, imm| ((s as i64) < imm) as u64)
            }
            RegImmOp::Sltiu => {
                self.reg_imm_op(dest, src, immediate, |s, imm| (s < imm as u64) as u64)
            }
            RegImmOp::Xori => self.reg_imm_op(dest, src, immediate, |s, imm| s ^ imm as u64),
            RegImmOp::Ori => self.reg_imm_op(dest, src, immediate, |s, imm| s | imm as u64),
            RegImmOp::Andi => self.reg_imm_op(dest, src, immediate, |s, imm| s & imm as u64),
        }
    }

    /// RV64 immediate shifts take a 6-bit shift amount straight from the encoding.
    fn op_shift_imm(&mut self, op: RegShiftImmOp, dest: Specifier, src: Specifier, shamt: u32) {
        let s = self.hart.x(src);
        let result = match op {
            RegShiftImmOp::Slli => s << shamt,
            RegShiftImmOp::Srli => s >> shamt,
            RegShiftImmOp::Srai => ((s as i64) >> shamt) as u64,
        };
        self.hart.set_x(dest, result);
        self.advance_pc();
    }

    /// > ADDIW is an RV64I instruction that adds the sign-extended 12-bit immediate to register
    /// > rs1 and produces the proper sign extension of a 32-bit result in rd. Overflows are
    /// > ignored and the result is the low 32 bits of the result sign-extended to 64 bits.
    fn addiw(&mut self, dest: Specifier, src: Specifier, immediate: i64) {
        self.reg_imm_op(dest, src, immediate, |s, imm| {
            s.wrapping_add_signed(imm) as u32 as i32 as i64 as u64
        })
    }

    /// Word shifts operate on the low 32 bits and sign-extend their 32-bit result.
    fn op_shift_imm32(&mut self, op: RegShiftImmOp, dest: Specifier, src: Specifier, shamt: u32) {
        let s = self.hart.x(src) as u32;
        let result = match op {
            RegShiftImmOp::Slli => (s << shamt) as i32,
            RegShiftImmOp::Srli => (s >> shamt) as i32,
            RegShiftImmOp::Srai => (s as i32) >> shamt,
        };
        self.hart.set_x(dest, result as i64 as u64);
        self.advance_pc();
    }

    /// Register-register shifts use the low 6 bits of rs2 as the shift amount. A masked amount of
    /// 63 or more yields 0 for logical shifts and all-sign-bits for arithmetic ones.
    fn op(&mut self, op: RegRegOp, dest: Specifier, src1: Specifier, src2: Specifier) {
        match op {
            RegRegOp::Add => self.reg_reg_op(dest, src1, src2, |a, b| a.wrapping_add(b)),
            RegRegOp::Sub => self.reg_reg_op(dest, src1, src2, |a, b| a.wrapping_sub(b)),
            RegRegOp::Slt => {
                self.reg_reg_op(dest, src1, src2, |a, b| ((a as i64) < (b as i64)) as u64)
            }
            RegRegOp::Sltu => self.reg_reg_op(dest, src1, src2, |a, b| (a < b) as u64),
            RegRegOp::Xor => self.reg_reg_op(dest, src1, src2, |a, b| a ^ b),
            RegRegOp::Or => self.reg_reg_op(dest, src1, src2, |a, b| a | b),
            RegRegOp::And => self.reg_reg_op(dest, src1, src2, |a, b| a & b),
            RegRegOp::Sll => self.reg_reg_op(dest, src1, src2, |a, b| {
                let amount = b & 0x3F;
                if amount < 63 {
                    a << amount
                } else {
                    0
                }
            }),
            RegRegOp::Srl => self.reg_reg_op(dest, src1, src2, |a, b| {
                let amount = b & 0x3F;
                if amount < 63 {
                    a >> amount
                } else {
                    0
                }
            }),
            RegRegOp::Sra => self.reg_reg_op(dest, src1, src2, |a, b| {
                let amount = b & 0x3F;
                if amount < 63 {
                    ((a as i64) >> amount) as u64
                } else if (a as i64) < 0 {
                    u64::MAX
                } else {
                    0
                }
            }),
        }
    }

    fn op32(&mut self, op: RegReg32Op, dest: Specifier, src1: Specifier, src2: Specifier) {
        let widen = |w: u32| w as i32 as i64 as u64;
        match op {
            RegReg32Op::Addw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                widen((a as u32).wrapping_add(b as u32))
            }),
            RegReg32Op::Subw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                widen((a as u32).wrapping_sub(b as u32))
            }),
            RegReg32Op::Sllw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                widen((a as u32) << (b & 0x1F))
            }),
            RegReg32Op::Srlw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                widen((a as u32) >> (b & 0x1F))
            }),
            RegReg32Op::Sraw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                widen(((a as i32) >> (b & 0x1F)) as u32)
            }),
        }
    }

    /// The MULH family returns the upper 64 bits of the full 128-bit product, with each operand
    /// signed or unsigned per the variant. Division follows the RISC-V defined results: division
    /// by zero yields all-ones (unsigned) or −1 (signed) with the remainder equal to the
    /// dividend, and signed overflow wraps.
    fn mul_div(&mut self, op: MulDivOp, dest: Specifier, src1: Specifier, src2: Specifier) {
        match op {
            MulDivOp::Mul => self.reg_reg_op(dest, src1, src2, |a, b| a.wrapping_mul(b)),
            MulDivOp::Mulh => self.reg_reg_op(dest, src1, src2, |a, b| {
                (((a as i64 as i128) * (b as i64 as i128)) >> 64) as u64
            }),
            MulDivOp::Mulhsu => self.reg_reg_op(dest, src1, src2, |a, b| {
                (((a as i64 as i128) * (b as i128)) >> 64) as u64
            }),
            MulDivOp::Mulhu => self.reg_reg_op(dest, src1, src2, |a, b| {
                (((a as u128) * (b as u128)) >> 64) as u64
            }),
            MulDivOp::Div => self.reg_reg_op(dest, src1, src2, |a, b| {
                if b == 0 {
                    u64::MAX
                } else {
                    (a as i64).wrapping_div(b as i64) as u64
                }
            }),
            MulDivOp::Divu => {
                self.reg_reg_op(dest, src1, src2, |a, b| if b == 0 { u64::MAX } else { a / b })
            }
            MulDivOp::Rem => self.reg_reg_op(dest, src1, src2, |a, b| {
                if b == 0 {
                    a
                } else {
                    (a as i64).wrapping_rem(b as i64) as u64
                }
            }),
            MulDivOp::Remu => {
                self.reg_reg_op(dest, src1, src2, |a, b| if b == 0 { a } else { a % b })
            }
        }
    }

    fn mul_div32(&mut self, op: MulDiv32Op, dest: Specifier, src1: Specifier, src2: Specifier) {
        let widen = |w: i32| w as i64 as u64;
        match op {
            MulDiv32Op::Mulw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                widen((a as i32).wrapping_mul(b as i32))
            }),
            MulDiv32Op::Divw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                let (a, b) = (a as i32, b as i32);
                widen(if b == 0 { -1 } else { a.wrapping_div(b) })
            }),
            MulDiv32Op::Divuw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                let (a, b) = (a as u32, b as u32);
                widen(if b == 0 { -1 } else { (a / b) as i32 })
            }),
            MulDiv32Op::Remw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                let (a, b) = (a as i32, b as i32);
                widen(if b == 0 { a } else { a.wrapping_rem(b) })
            }),
            MulDiv32Op::Remuw => self.reg_reg_op(dest, src1, src2, move |a, b| {
                let (a, b) = (a as u32, b as u32);
                widen(if b == 0 { a as i32 } else { (a % b) as i32 })
            }),
        }
    }

    /// The reservation monitor is not modeled: LR is a plain load.
    fn load_reserved(&mut self, width: MemWidth, dest: Specifier, addr: Specifier) {
        let ea = self.hart.x(addr);
        let raw = self.hart.read_mem(self.memory, ea, width.size());
        let value = match width {
            MemWidth::Word => raw as u32 as i32 as i64 as u64,
            MemWidth::Doubleword => raw,
        };
        self.hart.set_x(dest, value);
        self.advance_pc();
    }

    /// SC always succeeds on the single hart: a plain store, then 0 in `dest`.
    fn store_conditional(&mut self, width: MemWidth, dest: Specifier, addr: Specifier, src: Specifier) {
        let ea = self.hart.x(addr);
        let value = self.hart.x(src);
        self.hart.write_mem(self.memory, ea, width.size(), value);
        self.hart.set_x(dest, 0);
        self.advance_pc();
    }

    /// > The atomic memory operation instructions perform read-modify-write operations for
    /// > multiprocessor synchronization. These AMO instructions atomically load a data value from
    /// > the address in rs1, place the value into register rd, apply a binary operator to the
    /// > loaded value and the original value in rs2, then store the result back to the address in
    /// > rs1.
    ///
    /// Word variants operate on 32-bit values and sign-extend the loaded value into `rd`.
    fn amo(&mut self, op: AmoOp, width: MemWidth, dest: Specifier, addr: Specifier, src: Specifier) {
        let ea = self.hart.x(addr);
        let loaded = self.hart.read_mem(self.memory, ea, width.size());
        let operand = self.hart.x(src);
        let stored = match width {
            MemWidth::Word => {
                let (a, b) = (loaded as u32, operand as u32);
                let result = match op {
                    AmoOp::Add => a.wrapping_add(b),
                    AmoOp::Swap => b,
                    AmoOp::Xor => a ^ b,
                    AmoOp::Or => a | b,
                    AmoOp::And => a & b,
                    AmoOp::Min => (a as i32).min(b as i32) as u32,
                    AmoOp::Max => (a as i32).max(b as i32) as u32,
                    AmoOp::Minu => a.min(b),
                    AmoOp::Maxu => a.max(b),
                };
                result as u64
            }
            MemWidth::Doubleword => match op {
                AmoOp::Add => loaded.wrapping_add(operand),
                AmoOp::Swap => operand,
                AmoOp::Xor => loaded ^ operand,
                AmoOp::Or => loaded | operand,
                AmoOp::And => loaded & operand,
                AmoOp::Min => (loaded as i64).min(operand as i64) as u64,
                AmoOp::Max => (loaded as i64).max(operand as i64) as u64,
                AmoOp::Minu => loaded.min(operand),
                AmoOp::Maxu => loaded.max(operand),
            },
        };
        self.hart.write_mem(self.memory, ea, width.size(), stored);
        let value = match width {
            MemWidth::Word => loaded as u32 as i32 as i64 as u64,
            MemWidth::Doubleword => loaded,
        };
        self.hart.set_x(dest, value);
        self.advance_pc();
    }

    /// FLW NaN-boxes the loaded bit pattern; FLD replaces the whole register.
    fn load_fp(&mut self, format: FpFormat, dest: Specifier, base: Specifier, offset: i64) {
        let ea = self.hart.x(base).wrapping_add_signed(offset);
        match format {
            FpFormat::Single => {
                let raw = self.hart.read_mem(self.memory, ea, 4);
                self.hart
                    .fregisters
                    .set_bits(dest, 0xFFFF_FFFF_0000_0000 | raw);
            }
            FpFormat::Double => {
                let raw = self.hart.read_mem(self.memory, ea, 8);
                self.hart.fregisters.set_bits(dest, raw);
            }
        }
        self.advance_pc();
    }

    fn store_fp(&mut self, format: FpFormat, src: Specifier, base: Specifier, offset: i64) {
        let ea = self.hart.x(base).wrapping_add_signed(offset);
        let bits = self.hart.fregisters.bits(src);
        match format {
            FpFormat::Single => self.hart.write_mem(self.memory, ea, 4, bits & 0xFFFF_FFFF),
            FpFormat::Double => self.hart.write_mem(self.memory, ea, 8, bits),
        }
        self.advance_pc();
    }

    fn op_fp(
        &mut self,
        op: FpRegRegOp,
        format: FpFormat,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) {
        match op {
            FpRegRegOp::Sgnj | FpRegRegOp::Sgnjn | FpRegRegOp::Sgnjx => {
                return self.fp_sign_inject(op, format, dest, src1, src2);
            }
            _ => {}
        }
        match format {
            FpFormat::Single => {
                let a = self.hart.fregisters.single(src1);
                let b = self.hart.fregisters.single(src2);
                let result = match op {
                    FpRegRegOp::Add => a + b,
                    FpRegRegOp::Sub => a - b,
                    FpRegRegOp::Mul => a * b,
                    FpRegRegOp::Div => a / b,
                    FpRegRegOp::Min => a.min(b),
                    FpRegRegOp::Max => a.max(b),
                    _ => unreachable!(),
                };
                self.hart.fregisters.set_single(dest, result);
            }
            FpFormat::Double => {
                let a = self.hart.fregisters.double(src1);
                let b = self.hart.fregisters.double(src2);
                let result = match op {
                    FpRegRegOp::Add => a + b,
                    FpRegRegOp::Sub => a - b,
                    FpRegRegOp::Mul => a * b,
                    FpRegRegOp::Div => a / b,
                    FpRegRegOp::Min => a.min(b),
                    FpRegRegOp::Max => a.max(b),
                    _ => unreachable!(),
                };
                self.hart.fregisters.set_double(dest, result);
            }
        }
        self.advance_pc();
    }

    /// > Sign-injection instructions produce a result that takes all bits except the sign bit
    /// > from rs1. For FSGNJ, the result's sign bit is rs2's sign bit; for FSGNJN, the result's
    /// > sign bit is the opposite of rs2's sign bit; and for FSGNJX, the sign bit is the XOR of
    /// > the sign bits of rs1 and rs2.
    ///
    /// Operates on raw bit patterns: no NaN is quieted, no exception raised.
    fn fp_sign_inject(
        &mut self,
        op: FpRegRegOp,
        format: FpFormat,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) {
        match format {
            FpFormat::Single => {
                let a = self.hart.fregisters.bits(src1) as u32;
                let b = self.hart.fregisters.bits(src2) as u32;
                let sign = match op {
                    FpRegRegOp::Sgnj => b & 0x8000_0000,
                    FpRegRegOp::Sgnjn => !b & 0x8000_0000,
                    FpRegRegOp::Sgnjx => (a ^ b) & 0x8000_0000,
                    _ => unreachable!(),
                };
                let bits = (a & 0x7FFF_FFFF) | sign;
                self.hart
                    .fregisters
                    .set_bits(dest, 0xFFFF_FFFF_0000_0000 | bits as u64);
            }
            FpFormat::Double => {
                let a = self.hart.fregisters.bits(src1);
                let b = self.hart.fregisters.bits(src2);
                let sign = match op {
                    FpRegRegOp::Sgnj => b & 0x8000_0000_0000_0000,
                    FpRegRegOp::Sgnjn => !b & 0x8000_0000_0000_0000,
                    FpRegRegOp::Sgnjx => (a ^ b) & 0x8000_0000_0000_0000,
                    _ => unreachable!(),
                };
                self.hart
                    .fregisters
                    .set_bits(dest, (a & 0x7FFF_FFFF_FFFF_FFFF) | sign);
            }
        }
        self.advance_pc();
    }

    fn fp_sqrt(&mut self, format: FpFormat, dest: Specifier, src: Specifier) {
        match format {
            FpFormat::Single => {
                let result = self.hart.fregisters.single(src).sqrt();
                self.hart.fregisters.set_single(dest, result);
            }
            FpFormat::Double => {
                let result = self.hart.fregisters.double(src).sqrt();
                self.hart.fregisters.set_double(dest, result);
            }
        }
        self.advance_pc();
    }

    /// Comparisons with a NaN operand are false, which is what host IEEE comparisons give.
    fn fp_compare(
        &mut self,
        condition: FpCondition,
        format: FpFormat,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) {
        let result = match format {
            FpFormat::Single => {
                let a = self.hart.fregisters.single(src1);
                let b = self.hart.fregisters.single(src2);
                match condition {
                    FpCondition::Eq => a == b,
                    FpCondition::Lt => a < b,
                    FpCondition::Le => a <= b,
                }
            }
            FpFormat::Double => {
                let a = self.hart.fregisters.double(src1);
                let b = self.hart.fregisters.double(src2);
                match condition {
                    FpCondition::Eq => a == b,
                    FpCondition::Lt => a < b,
                    FpCondition::Le => a <= b,
                }
            }
        };
        self.hart.set_x(dest, result as u64);
        self.advance_pc();
    }

    /// > The FCLASS instruction examines the value in floating-point register rs1 and writes to
    /// > integer register rd a 10-bit mask that indicates the class of the floating-point number.
    fn fp_class(&mut self, format: FpFormat, dest: Specifier, src: Specifier) {
        let mask = match format {
            FpFormat::Single => fclass(self.hart.fregisters.single(src) as f64),
            FpFormat::Double => fclass(self.hart.fregisters.double(src)),
        };
        self.hart.set_x(dest, mask);
        self.advance_pc();
    }

    /// Word-sized conversion results are sign-extended to 64 bits, including FCVT.WU.
    fn fp_cvt_to_int(
        &mut self,
        format: FpFormat,
        target: IntConvWidth,
        dest: Specifier,
        src: Specifier,
    ) {
        let value = match format {
            FpFormat::Single => self.hart.fregisters.single(src) as f64,
            FpFormat::Double => self.hart.fregisters.double(src),
        };
        let result = match target {
            IntConvWidth::W => value as i32 as i64 as u64,
            IntConvWidth::Wu => value as u32 as i32 as i64 as u64,
            IntConvWidth::L => value as i64 as u64,
            IntConvWidth::Lu => value as u64,
        };
        self.hart.set_x(dest, result);
        self.advance_pc();
    }

    fn fp_cvt_from_int(
        &mut self,
        format: FpFormat,
        source: IntConvWidth,
        dest: Specifier,
        src: Specifier,
    ) {
        let raw = self.hart.x(src);
        let value = match source {
            IntConvWidth::W => raw as u32 as i32 as f64,
            IntConvWidth::Wu => raw as u32 as f64,
            IntConvWidth::L => raw as i64 as f64,
            IntConvWidth::Lu => raw as f64,
        };
        match format {
            // Integer-to-single may round: convert through the target precision.
            FpFormat::Single => {
                let single = match source {
                    IntConvWidth::W => raw as u32 as i32 as f32,
                    IntConvWidth::Wu => raw as u32 as f32,
                    IntConvWidth::L => raw as i64 as f32,
                    IntConvWidth::Lu => raw as f32,
                };
                self.hart.fregisters.set_single(dest, single);
            }
            FpFormat::Double => self.hart.fregisters.set_double(dest, value),
        }
        self.advance_pc();
    }

    fn fp_cvt_format(&mut self, to: FpFormat, dest: Specifier, src: Specifier) {
        match to {
            FpFormat::Single => {
                let value = self.hart.fregisters.double(src) as f32;
                self.hart.fregisters.set_single(dest, value);
            }
            FpFormat::Double => {
                let value = self.hart.fregisters.single(src) as f64;
                self.hart.fregisters.set_double(dest, value);
            }
        }
        self.advance_pc();
    }

    /// FMV.X.W sign-extends the 32-bit pattern; FMV.X.D copies all 64 bits.
    fn fp_mv_to_int(&mut self, format: FpFormat, dest: Specifier, src: Specifier) {
        let bits = self.hart.fregisters.bits(src);
        let value = match format {
            FpFormat::Single => bits as u32 as i32 as i64 as u64,
            FpFormat::Double => bits,
        };
        self.hart.set_x(dest, value);
        self.advance_pc();
    }

    fn fp_mv_from_int(&mut self, format: FpFormat, dest: Specifier, src: Specifier) {
        let value = self.hart.x(src);
        match format {
            FpFormat::Single => self
                .hart
                .fregisters
                .set_bits(dest, 0xFFFF_FFFF_0000_0000 | (value & 0xFFFF_FFFF)),
            FpFormat::Double => self.hart.fregisters.set_bits(dest, value),
        }
        self.advance_pc();
    }

    /// The four sign patterns of `±(src1 · src2) ± src3`, computed fused (a single rounding).
    fn fused_mul_add(
        &mut self,
        op: FmaOp,
        format: FpFormat,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        src3: Specifier,
    ) {
        match format {
            FpFormat::Single => {
                let a = self.hart.fregisters.single(src1);
                let b = self.hart.fregisters.single(src2);
                let c = self.hart.fregisters.single(src3);
                let result = match op {
                    FmaOp::Madd => a.mul_add(b, c),
                    FmaOp::Msub => a.mul_add(b, -c),
                    FmaOp::Nmsub => (-a).mul_add(b, c),
                    FmaOp::Nmadd => (-a).mul_add(b, -c),
                };
                self.hart.fregisters.set_single(dest, result);
            }
            FpFormat::Double => {
                let a = self.hart.fregisters.double(src1);
                let b = self.hart.fregisters.double(src2);
                let c = self.hart.fregisters.double(src3);
                let result = match op {
                    FmaOp::Madd => a.mul_add(b, c),
                    FmaOp::Msub => a.mul_add(b, -c),
                    FmaOp::Nmsub => (-a).mul_add(b, c),
                    FmaOp::Nmadd => (-a).mul_add(b, -c),
                };
                self.hart.fregisters.set_double(dest, result);
            }
        }
        self.advance_pc();
    }

    /// ECALL dispatches on `x17` to the host shim, then falls through to the next instruction.
    fn ecall(&mut self) {
        self.host.syscall(self.hart, self.memory);
        self.advance_pc();
    }

    /// > The CSRRW (Atomic Read/Write CSR) instruction atomically swaps values in the CSRs and
    /// > integer registers. CSRRS and CSRRC read the CSR and set or clear the bits given by the
    /// > rs1 mask; if rs1 = x0 (or the immediate is zero), the instruction does not write to the
    /// > CSR at all.
    fn csr(&mut self, op: CsrOp, dest: Specifier, source: CsrSource, csr: crate::csr::CsrSpecifier) {
        let (mask, writes) = match source {
            CsrSource::Register(reg) => (self.hart.x(reg), reg != Specifier::X0),
            CsrSource::Immediate(imm) => (imm as u64, imm != 0),
        };
        let old = self.hart.csr(csr);
        match op {
            CsrOp::ReadWrite => self.hart.set_csr(csr, mask),
            CsrOp::ReadSet => {
                if writes {
                    self.hart.set_csr(csr, old | mask);
                }
            }
            CsrOp::ReadClear => {
                if writes {
                    self.hart.set_csr(csr, old & !mask);
                }
            }
        }
        self.hart.set_x(dest, old);
        self.advance_pc();
    }
}

/// Computes the RISC-V FCLASS 10-bit category mask.
fn fclass(value: f64) -> u64 {
    use std::num::FpCategory;
    let negative = value.is_sign_negative();
    let bit = match (value.classify(), negative) {
        (FpCategory::Infinite, true) => 0,
        (FpCategory::Normal, true) => 1,
        (FpCategory::Subnormal, true) => 2,
        (FpCategory::Zero, true) => 3,
        (FpCategory::Zero, false) => 4,
        (FpCategory::Subnormal, false) => 5,
        (FpCategory::Normal, false) => 6,
        (FpCategory::Infinite, false) => 7,
        // The signaling/quiet distinction is not tracked; report quiet NaN.
        (FpCategory::Nan, _) => 9,
    };
    1 << bit
}
