#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
}

impl Op {
    fn reads_operand(self) -> bool {
        matches!(
            self,
            Op::Adc
                | Op::And
                | Op::Asl
                | Op::Bit
                | Op::Cmp
                | Op::Cpx
                | Op::Cpy
                | Op::Dec
                | Op::Eor
                | Op::Inc
                | Op::Lda
                | Op::Ldx
                | Op::Ldy
                | Op::Lsr
                | Op::Ora
                | Op::Rol
                | Op::Ror
                | Op::Sbc
        )
    }
}

// Addressing modes. The `*Write` variants are the store/read-modify-write
// encodings, which always pay the indexing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteXWrite,
    AbsoluteY,
    AbsoluteYWrite,
    Indirect,
    IndexedIndirect,
    IndirectIndexed,
    IndirectIndexedWrite,
    Relative,
}

impl Mode {
    pub fn operand_len(self) -> u16 {
        match self {
            Mode::Implied | Mode::Accumulator => 0,
            Mode::Absolute
            | Mode::AbsoluteX
            | Mode::AbsoluteXWrite
            | Mode::AbsoluteY
            | Mode::AbsoluteYWrite
            | Mode::Indirect => 2,
            _ => 1,
        }
    }

    fn has_memory_operand(self) -> bool {
        !matches!(
            self,
            Mode::Implied | Mode::Accumulator | Mode::Immediate | Mode::Relative
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub mode: Mode,
    pub cycles: u8,
}

impl Instruction {
    pub fn needs_memory_read(&self) -> bool {
        self.op.reads_operand() && self.mode.has_memory_operand()
    }
}

const fn inst(op: Op, mode: Mode, cycles: u8) -> Option<Instruction> {
    Some(Instruction { op, mode, cycles })
}

pub fn decode(opcode: u8) -> Option<Instruction> {
    use Mode::*;
    use Op::*;

    match opcode {
        0x69 => inst(Adc, Immediate, 2),
        0x65 => inst(Adc, ZeroPage, 3),
        0x75 => inst(Adc, ZeroPageX, 4),
        0x6D => inst(Adc, Absolute, 4),
        0x7D => inst(Adc, AbsoluteX, 4),
        0x79 => inst(Adc, AbsoluteY, 4),
        0x61 => inst(Adc, IndexedIndirect, 6),
        0x71 => inst(Adc, IndirectIndexed, 5),

        0x29 => inst(And, Immediate, 2),
        0x25 => inst(And, ZeroPage, 3),
        0x35 => inst(And, ZeroPageX, 4),
        0x2D => inst(And, Absolute, 4),
        0x3D => inst(And, AbsoluteX, 4),
        0x39 => inst(And, AbsoluteY, 4),
        0x21 => inst(And, IndexedIndirect, 6),
        0x31 => inst(And, IndirectIndexed, 5),

        0x0A => inst(Asl, Accumulator, 2),
        0x06 => inst(Asl, ZeroPage, 5),
        0x16 => inst(Asl, ZeroPageX, 6),
        0x0E => inst(Asl, Absolute, 6),
        0x1E => inst(Asl, AbsoluteXWrite, 7),

        0x90 => inst(Bcc, Relative, 2),
        0xB0 => inst(Bcs, Relative, 2),
        0xF0 => inst(Beq, Relative, 2),
        0x30 => inst(Bmi, Relative, 2),
        0xD0 => inst(Bne, Relative, 2),
        0x10 => inst(Bpl, Relative, 2),
        0x50 => inst(Bvc, Relative, 2),
        0x70 => inst(Bvs, Relative, 2),

        0x24 => inst(Bit, ZeroPage, 3),
        0x2C => inst(Bit, Absolute, 4),

        0x00 => inst(Brk, Implied, 7),

        0x18 => inst(Clc, Implied, 2),
        0xD8 => inst(Cld, Implied, 2),
        0x58 => inst(Cli, Implied, 2),
        0xB8 => inst(Clv, Implied, 2),

        0xC9 => inst(Cmp, Immediate, 2),
        0xC5 => inst(Cmp, ZeroPage, 3),
        0xD5 => inst(Cmp, ZeroPageX, 4),
        0xCD => inst(Cmp, Absolute, 4),
        0xDD => inst(Cmp, AbsoluteX, 4),
        0xD9 => inst(Cmp, AbsoluteY, 4),
        0xC1 => inst(Cmp, IndexedIndirect, 6),
        0xD1 => inst(Cmp, IndirectIndexed, 5),

        0xE0 => inst(Cpx, Immediate, 2),
        0xE4 => inst(Cpx, ZeroPage, 3),
        0xEC => inst(Cpx, Absolute, 4),

        0xC0 => inst(Cpy, Immediate, 2),
        0xC4 => inst(Cpy, ZeroPage, 3),
        0xCC => inst(Cpy, Absolute, 4),

        0xC6 => inst(Dec, ZeroPage, 5),
        0xD6 => inst(Dec, ZeroPageX, 6),
        0xCE => inst(Dec, Absolute, 6),
        0xDE => inst(Dec, AbsoluteXWrite, 7),
        0xCA => inst(Dex, Implied, 2),
        0x88 => inst(Dey, Implied, 2),

        0x49 => inst(Eor, Immediate, 2),
        0x45 => inst(Eor, ZeroPage, 3),
        0x55 => inst(Eor, ZeroPageX, 4),
        0x4D => inst(Eor, Absolute, 4),
        0x5D => inst(Eor, AbsoluteX, 4),
        0x59 => inst(Eor, AbsoluteY, 4),
        0x41 => inst(Eor, IndexedIndirect, 6),
        0x51 => inst(Eor, IndirectIndexed, 5),

        0xE6 => inst(Inc, ZeroPage, 5),
        0xF6 => inst(Inc, ZeroPageX, 6),
        0xEE => inst(Inc, Absolute, 6),
        0xFE => inst(Inc, AbsoluteXWrite, 7),
        0xE8 => inst(Inx, Implied, 2),
        0xC8 => inst(Iny, Implied, 2),

        0x4C => inst(Jmp, Absolute, 3),
        0x6C => inst(Jmp, Indirect, 5),
        0x20 => inst(Jsr, Absolute, 6),

        0xA9 => inst(Lda, Immediate, 2),
        0xA5 => inst(Lda, ZeroPage, 3),
        0xB5 => inst(Lda, ZeroPageX, 4),
        0xAD => inst(Lda, Absolute, 4),
        0xBD => inst(Lda, AbsoluteX, 4),
        0xB9 => inst(Lda, AbsoluteY, 4),
        0xA1 => inst(Lda, IndexedIndirect, 6),
        0xB1 => inst(Lda, IndirectIndexed, 5),

        0xA2 => inst(Ldx, Immediate, 2),
        0xA6 => inst(Ldx, ZeroPage, 3),
        0xB6 => inst(Ldx, ZeroPageY, 4),
        0xAE => inst(Ldx, Absolute, 4),
        0xBE => inst(Ldx, AbsoluteY, 4),

        0xA0 => inst(Ldy, Immediate, 2),
        0xA4 => inst(Ldy, ZeroPage, 3),
        0xB4 => inst(Ldy, ZeroPageX, 4),
        0xAC => inst(Ldy, Absolute, 4),
        0xBC => inst(Ldy, AbsoluteX, 4),

        0x4A => inst(Lsr, Accumulator, 2),
        0x46 => inst(Lsr, ZeroPage, 5),
        0x56 => inst(Lsr, ZeroPageX, 6),
        0x4E => inst(Lsr, Absolute, 6),
        0x5E => inst(Lsr, AbsoluteXWrite, 7),

        0xEA => inst(Nop, Implied, 2),

        0x09 => inst(Ora, Immediate, 2),
        0x05 => inst(Ora, ZeroPage, 3),
        0x15 => inst(Ora, ZeroPageX, 4),
        0x0D => inst(Ora, Absolute, 4),
        0x1D => inst(Ora, AbsoluteX, 4),
        0x19 => inst(Ora, AbsoluteY, 4),
        0x01 => inst(Ora, IndexedIndirect, 6),
        0x11 => inst(Ora, IndirectIndexed, 5),

        0x48 => inst(Pha, Implied, 3),
        0x08 => inst(Php, Implied, 3),
        0x68 => inst(Pla, Implied, 4),
        0x28 => inst(Plp, Implied, 4),

        0x2A => inst(Rol, Accumulator, 2),
        0x26 => inst(Rol, ZeroPage, 5),
        0x36 => inst(Rol, ZeroPageX, 6),
        0x2E => inst(Rol, Absolute, 6),
        0x3E => inst(Rol, AbsoluteXWrite, 7),

        0x6A => inst(Ror, Accumulator, 2),
        0x66 => inst(Ror, ZeroPage, 5),
        0x76 => inst(Ror, ZeroPageX, 6),
        0x6E => inst(Ror, Absolute, 6),
        0x7E => inst(Ror, AbsoluteXWrite, 7),

        0x40 => inst(Rti, Implied, 6),
        0x60 => inst(Rts, Implied, 6),

        0xE9 => inst(Sbc, Immediate, 2),
        0xE5 => inst(Sbc, ZeroPage, 3),
        0xF5 => inst(Sbc, ZeroPageX, 4),
        0xED => inst(Sbc, Absolute, 4),
        0xFD => inst(Sbc, AbsoluteX, 4),
        0xF9 => inst(Sbc, AbsoluteY, 4),
        0xE1 => inst(Sbc, IndexedIndirect, 6),
        0xF1 => inst(Sbc, IndirectIndexed, 5),

        0x38 => inst(Sec, Implied, 2),
        0xF8 => inst(Sed, Implied, 2),
        0x78 => inst(Sei, Implied, 2),

        0x85 => inst(Sta, ZeroPage, 3),
        0x95 => inst(Sta, ZeroPageX, 4),
        0x8D => inst(Sta, Absolute, 4),
        0x9D => inst(Sta, AbsoluteXWrite, 5),
        0x99 => inst(Sta, AbsoluteYWrite, 5),
        0x81 => inst(Sta, IndexedIndirect, 6),
        0x91 => inst(Sta, IndirectIndexedWrite, 6),

        0x86 => inst(Stx, ZeroPage, 3),
        0x96 => inst(Stx, ZeroPageY, 4),
        0x8E => inst(Stx, Absolute, 4),

        0x84 => inst(Sty, ZeroPage, 3),
        0x94 => inst(Sty, ZeroPageX, 4),
        0x8C => inst(Sty, Absolute, 4),

        0xAA => inst(Tax, Implied, 2),
        0xA8 => inst(Tay, Implied, 2),
        0xBA => inst(Tsx, Implied, 2),
        0x8A => inst(Txa, Implied, 2),
        0x9A => inst(Txs, Implied, 2),
        0x98 => inst(Tya, Implied, 2),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn official_opcode_table_is_complete() {
        let count = (0..=255u8).filter(|&op| decode(op).is_some()).count();
        assert_eq!(count, 151);
    }

    #[test]
    fn stores_never_read_their_operand() {
        for opcode in [0x85, 0x9D, 0x91, 0x86, 0x8C] {
            let inst = decode(opcode).unwrap();
            assert!(!inst.needs_memory_read(), "opcode {opcode:02X}");
        }
        assert!(decode(0x1E).unwrap().needs_memory_read());
        assert!(!decode(0x0A).unwrap().needs_memory_read());
        assert!(!decode(0xA9).unwrap().needs_memory_read());
    }

    #[test]
    fn unofficial_opcodes_do_not_decode() {
        for opcode in [0x02, 0x1A, 0x80, 0xA7, 0xEB, 0xFF] {
            assert_eq!(decode(opcode), None);
        }
    }
}
