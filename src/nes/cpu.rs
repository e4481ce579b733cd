use serde::Serialize;

use super::error::Fault;
use super::interrupt::Interrupt;
use super::opcodes::{Instruction, Mode, Op, decode};

pub const FLAG_CARRY: u8 = 0x01;
pub const FLAG_ZERO: u8 = 0x02;
pub const FLAG_INTERRUPT: u8 = 0x04;
pub const FLAG_DECIMAL: u8 = 0x08;
pub const FLAG_BREAK: u8 = 0x10;
pub const FLAG_UNUSED: u8 = 0x20;
pub const FLAG_OVERFLOW: u8 = 0x40;
pub const FLAG_NEGATIVE: u8 = 0x80;

pub const STACK_PAGE: u16 = 0x0100;
pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// The memory and interrupt lines the CPU is wired to.
pub trait Bus {
    fn read_byte(&mut self, addr: u16) -> u8;
    fn write_byte(&mut self, addr: u16, value: u8);
    fn raise_interrupt(&mut self, kind: Interrupt);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub pc: u16,
}

#[derive(Debug, Clone)]
pub struct Cpu {
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    sp: u8,
    pc: u16,

    // Scratch filled in by the addressing mode for the instruction body.
    address: u16,
    operand: u8,

    break_pending: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: FLAG_INTERRUPT | FLAG_UNUSED,
            sp: 0xFD,
            pc: 0,
            address: 0,
            operand: 0,
            break_pending: false,
        }
    }

    pub fn registers(&self) -> Registers {
        Registers {
            a: self.a,
            x: self.x,
            y: self.y,
            p: self.p | FLAG_UNUSED,
            sp: self.sp,
            pc: self.pc,
        }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn power_up(&mut self, bus: &mut dyn Bus) {
        *self = Self::new();
        self.pc = read_u16(bus, RESET_VECTOR);
    }

    pub fn reset(&mut self, bus: &mut dyn Bus) {
        self.sp = self.sp.wrapping_sub(3);
        self.set_flag(FLAG_INTERRUPT, true);
        self.break_pending = false;
        self.pc = read_u16(bus, RESET_VECTOR);
    }

    pub fn nmi(&mut self, bus: &mut dyn Bus) {
        self.enter_interrupt(bus, NMI_VECTOR);
    }

    /// Services an IRQ/BRK. Hardware IRQs are dropped while the I flag is set;
    /// a BRK is always taken. Returns whether the CPU vectored.
    pub fn irq(&mut self, bus: &mut dyn Bus) -> bool {
        if !self.break_pending && self.get_flag(FLAG_INTERRUPT) {
            return false;
        }
        self.enter_interrupt(bus, IRQ_VECTOR);
        true
    }

    pub fn step(&mut self, bus: &mut dyn Bus) -> Result<u32, Fault> {
        let pc = self.pc;
        let opcode = bus.read_byte(pc);
        let inst = decode(opcode).ok_or(Fault::UnknownOpcode { opcode, pc })?;

        self.resolve_operand(inst.mode, bus);
        if inst.needs_memory_read() {
            self.operand = bus.read_byte(self.address);
        }
        self.execute(inst, bus);

        Ok(inst.cycles as u32)
    }

    fn resolve_operand(&mut self, mode: Mode, bus: &mut dyn Bus) {
        let arg = self.pc.wrapping_add(1);
        self.pc = self.pc.wrapping_add(1 + mode.operand_len());

        match mode {
            Mode::Implied | Mode::Accumulator => {}
            Mode::Immediate => self.operand = bus.read_byte(arg),
            Mode::ZeroPage => self.address = bus.read_byte(arg) as u16,
            Mode::ZeroPageX => self.address = bus.read_byte(arg).wrapping_add(self.x) as u16,
            Mode::ZeroPageY => self.address = bus.read_byte(arg).wrapping_add(self.y) as u16,
            Mode::Absolute => self.address = read_u16(bus, arg),
            Mode::AbsoluteX | Mode::AbsoluteXWrite => {
                self.address = read_u16(bus, arg).wrapping_add(self.x as u16);
            }
            Mode::AbsoluteY | Mode::AbsoluteYWrite => {
                self.address = read_u16(bus, arg).wrapping_add(self.y as u16);
            }
            Mode::Indirect => {
                let pointer = read_u16(bus, arg);
                self.address = read_u16_page_wrapped(bus, pointer);
            }
            Mode::IndexedIndirect => {
                let zp = bus.read_byte(arg).wrapping_add(self.x);
                self.address = read_u16_page_wrapped(bus, zp as u16);
            }
            Mode::IndirectIndexed | Mode::IndirectIndexedWrite => {
                let zp = bus.read_byte(arg);
                self.address = read_u16_page_wrapped(bus, zp as u16).wrapping_add(self.y as u16);
            }
            Mode::Relative => {
                let offset = bus.read_byte(arg) as i8;
                self.address = self.pc.wrapping_add(offset as i16 as u16);
            }
        }
    }

    fn execute(&mut self, inst: Instruction, bus: &mut dyn Bus) {
        let value = self.operand;
        match inst.op {
            Op::Adc => self.adc(value),
            Op::Sbc => self.sbc(value),
            Op::And => {
                self.a &= value;
                self.update_zn(self.a);
            }
            Op::Ora => {
                self.a |= value;
                self.update_zn(self.a);
            }
            Op::Eor => {
                self.a ^= value;
                self.update_zn(self.a);
            }
            Op::Bit => {
                self.set_flag(FLAG_ZERO, (self.a & value) == 0);
                self.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
                self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
            }
            Op::Cmp => self.compare(self.a, value),
            Op::Cpx => self.compare(self.x, value),
            Op::Cpy => self.compare(self.y, value),

            Op::Asl => self.modify(inst.mode, bus, Self::asl),
            Op::Lsr => self.modify(inst.mode, bus, Self::lsr),
            Op::Rol => self.modify(inst.mode, bus, Self::rol),
            Op::Ror => self.modify(inst.mode, bus, Self::ror),
            Op::Inc => {
                let result = value.wrapping_add(1);
                self.update_zn(result);
                bus.write_byte(self.address, result);
            }
            Op::Dec => {
                let result = value.wrapping_sub(1);
                self.update_zn(result);
                bus.write_byte(self.address, result);
            }
            Op::Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
            }
            Op::Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
            }
            Op::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
            }
            Op::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
            }

            Op::Bcc => self.branch(!self.get_flag(FLAG_CARRY)),
            Op::Bcs => self.branch(self.get_flag(FLAG_CARRY)),
            Op::Beq => self.branch(self.get_flag(FLAG_ZERO)),
            Op::Bne => self.branch(!self.get_flag(FLAG_ZERO)),
            Op::Bmi => self.branch(self.get_flag(FLAG_NEGATIVE)),
            Op::Bpl => self.branch(!self.get_flag(FLAG_NEGATIVE)),
            Op::Bvc => self.branch(!self.get_flag(FLAG_OVERFLOW)),
            Op::Bvs => self.branch(self.get_flag(FLAG_OVERFLOW)),

            Op::Brk => {
                // Skip the padding byte; the handler returns past it.
                self.pc = self.pc.wrapping_add(1);
                self.break_pending = true;
                bus.raise_interrupt(Interrupt::IrqBrk);
            }
            Op::Jmp => self.pc = self.address,
            Op::Jsr => {
                self.push_u16(bus, self.pc.wrapping_sub(1));
                self.pc = self.address;
            }
            Op::Rts => self.pc = self.pop_u16(bus).wrapping_add(1),
            Op::Rti => {
                let status = self.pop(bus);
                self.p = (status & !FLAG_BREAK) | FLAG_UNUSED;
                self.pc = self.pop_u16(bus);
            }

            Op::Clc => self.set_flag(FLAG_CARRY, false),
            Op::Cld => self.set_flag(FLAG_DECIMAL, false),
            Op::Cli => self.set_flag(FLAG_INTERRUPT, false),
            Op::Clv => self.set_flag(FLAG_OVERFLOW, false),
            Op::Sec => self.set_flag(FLAG_CARRY, true),
            Op::Sed => self.set_flag(FLAG_DECIMAL, true),
            Op::Sei => self.set_flag(FLAG_INTERRUPT, true),

            Op::Lda => {
                self.a = value;
                self.update_zn(self.a);
            }
            Op::Ldx => {
                self.x = value;
                self.update_zn(self.x);
            }
            Op::Ldy => {
                self.y = value;
                self.update_zn(self.y);
            }
            Op::Sta => bus.write_byte(self.address, self.a),
            Op::Stx => bus.write_byte(self.address, self.x),
            Op::Sty => bus.write_byte(self.address, self.y),

            Op::Pha => self.push(bus, self.a),
            Op::Php => self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED),
            Op::Pla => {
                self.a = self.pop(bus);
                self.update_zn(self.a);
            }
            Op::Plp => {
                let status = self.pop(bus);
                self.p = (status & !FLAG_BREAK) | FLAG_UNUSED;
            }

            Op::Tax => {
                self.x = self.a;
                self.update_zn(self.x);
            }
            Op::Tay => {
                self.y = self.a;
                self.update_zn(self.y);
            }
            Op::Tsx => {
                self.x = self.sp;
                self.update_zn(self.x);
            }
            Op::Txa => {
                self.a = self.x;
                self.update_zn(self.a);
            }
            Op::Txs => self.sp = self.x,
            Op::Tya => {
                self.a = self.y;
                self.update_zn(self.a);
            }

            Op::Nop => {}
        }
    }

    fn enter_interrupt(&mut self, bus: &mut dyn Bus, vector: u16) {
        let brk = if self.break_pending { FLAG_BREAK } else { 0 };
        self.push_u16(bus, self.pc);
        self.push(bus, (self.p & !FLAG_BREAK) | FLAG_UNUSED | brk);
        self.set_flag(FLAG_INTERRUPT, true);
        self.break_pending = false;
        self.pc = read_u16(bus, vector);
    }

    fn modify(&mut self, mode: Mode, bus: &mut dyn Bus, op: fn(&mut Self, u8) -> u8) {
        if mode == Mode::Accumulator {
            let value = self.a;
            self.a = op(self, value);
        } else {
            let value = self.operand;
            let result = op(self, value);
            bus.write_byte(self.address, result);
        }
    }

    fn branch(&mut self, condition: bool) {
        if condition {
            self.pc = self.address;
        }
    }

    fn push(&mut self, bus: &mut dyn Bus, value: u8) {
        bus.write_byte(STACK_PAGE | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut dyn Bus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read_byte(STACK_PAGE | self.sp as u16)
    }

    fn push_u16(&mut self, bus: &mut dyn Bus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_u16(&mut self, bus: &mut dyn Bus) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
        self.p |= FLAG_UNUSED;
    }

    fn get_flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.set_flag(FLAG_CARRY, register >= value);
        self.update_zn(result);
    }

    fn adc(&mut self, value: u8) {
        let carry_in = self.get_flag(FLAG_CARRY) as u16;
        let result = self.a as u16 + value as u16 + carry_in;
        let out = result as u8;

        self.set_flag(FLAG_CARRY, result > 0xFF);
        // Operands agree in sign but the result does not.
        self.set_flag(
            FLAG_OVERFLOW,
            ((self.a ^ value) & 0x80) == 0 && ((self.a ^ out) & 0x80) != 0,
        );

        self.a = out;
        self.update_zn(self.a);
    }

    fn sbc(&mut self, value: u8) {
        self.adc(value ^ 0xFF);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.get_flag(FLAG_CARRY) as u8;
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = (self.get_flag(FLAG_CARRY) as u8) << 7;
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }
}

fn read_u16(bus: &mut dyn Bus, addr: u16) -> u16 {
    let lo = bus.read_byte(addr) as u16;
    let hi = bus.read_byte(addr.wrapping_add(1)) as u16;
    (hi << 8) | lo
}

// Reads a pointer whose high byte comes from the same page as the low byte
// (JMP indirect and zero-page pointer wrap).
fn read_u16_page_wrapped(bus: &mut dyn Bus, addr: u16) -> u16 {
    let lo = bus.read_byte(addr) as u16;
    let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
    let hi = bus.read_byte(hi_addr) as u16;
    (hi << 8) | lo
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatBus {
        mem: Vec<u8>,
        raised: Vec<Interrupt>,
    }

    impl Bus for FlatBus {
        fn read_byte(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }

        fn write_byte(&mut self, addr: u16, value: u8) {
            self.mem[addr as usize] = value;
        }

        fn raise_interrupt(&mut self, kind: Interrupt) {
            self.raised.push(kind);
        }
    }

    fn boot(program: &[u8]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus {
            mem: vec![0; 0x10000],
            raised: Vec::new(),
        };
        bus.mem[0x8000..0x8000 + program.len()].copy_from_slice(program);
        bus.mem[RESET_VECTOR as usize] = 0x00;
        bus.mem[RESET_VECTOR as usize + 1] = 0x80;
        bus.mem[IRQ_VECTOR as usize] = 0x00;
        bus.mem[IRQ_VECTOR as usize + 1] = 0x90;
        bus.mem[NMI_VECTOR as usize] = 0x00;
        bus.mem[NMI_VECTOR as usize + 1] = 0xA0;

        let mut cpu = Cpu::new();
        cpu.power_up(&mut bus);
        (cpu, bus)
    }

    fn run(cpu: &mut Cpu, bus: &mut FlatBus, steps: usize) {
        for _ in 0..steps {
            cpu.step(bus).unwrap();
        }
    }

    #[test]
    fn power_up_loads_reset_vector() {
        let (cpu, _) = boot(&[]);
        let regs = cpu.registers();
        assert_eq!(regs.pc, 0x8000);
        assert_eq!(regs.sp, 0xFD);
        assert_eq!(regs.p, FLAG_INTERRUPT | FLAG_UNUSED);
    }

    #[test]
    fn adc_and_sbc_flags_match_signed_arithmetic() {
        let mut cpu = Cpu::new();
        for a in 0..=255u8 {
            for m in 0..=255u8 {
                for carry in [false, true] {
                    cpu.a = a;
                    cpu.set_flag(FLAG_CARRY, carry);
                    cpu.adc(m);
                    let r = cpu.a;
                    let signed = a as i8 as i16 + m as i8 as i16 + carry as i16;
                    let same_sign = ((a ^ m) & 0x80) == 0;
                    assert_eq!(r, a.wrapping_add(m).wrapping_add(carry as u8));
                    assert_eq!(cpu.get_flag(FLAG_OVERFLOW), !(-128..=127).contains(&signed));
                    assert_eq!(
                        cpu.get_flag(FLAG_OVERFLOW),
                        same_sign && ((a ^ r) & 0x80) != 0
                    );
                    assert_eq!(
                        cpu.get_flag(FLAG_CARRY),
                        a as u16 + m as u16 + carry as u16 > 0xFF
                    );

                    cpu.a = a;
                    cpu.set_flag(FLAG_CARRY, carry);
                    cpu.sbc(m);
                    let borrow = !carry as i16;
                    let signed = a as i8 as i16 - m as i8 as i16 - borrow;
                    assert_eq!(cpu.a, a.wrapping_sub(m).wrapping_sub(borrow as u8));
                    assert_eq!(cpu.get_flag(FLAG_OVERFLOW), !(-128..=127).contains(&signed));
                    assert_eq!(
                        cpu.get_flag(FLAG_CARRY),
                        a as i16 - m as i16 - borrow >= 0
                    );
                    assert_eq!(cpu.get_flag(FLAG_ZERO), cpu.a == 0);
                }
            }
        }
    }

    #[test]
    fn pha_pla_round_trip() {
        // LDA #$5A; PHA; LDA #$00; PLA
        let (mut cpu, mut bus) = boot(&[0xA9, 0x5A, 0x48, 0xA9, 0x00, 0x68]);
        run(&mut cpu, &mut bus, 3);
        assert_eq!(cpu.registers().a, 0x00);
        assert_eq!(cpu.registers().sp, 0xFC);
        assert_eq!(bus.mem[0x01FD], 0x5A);

        run(&mut cpu, &mut bus, 1);
        let regs = cpu.registers();
        assert_eq!(regs.a, 0x5A);
        assert_eq!(regs.sp, 0xFD);
        assert_eq!(regs.p & (FLAG_ZERO | FLAG_NEGATIVE), 0);
    }

    #[test]
    fn php_plp_round_trip_ignores_break_bit() {
        // SEC; SED; LDA #$80; PHP; CLC; CLD; LDA #$00; PLP
        let program = [0x38, 0xF8, 0xA9, 0x80, 0x08, 0x18, 0xD8, 0xA9, 0x00, 0x28];
        let (mut cpu, mut bus) = boot(&program);
        run(&mut cpu, &mut bus, 4);
        let pushed_from = cpu.registers().p;
        assert_eq!(bus.mem[0x01FD], pushed_from | FLAG_BREAK);

        run(&mut cpu, &mut bus, 4);
        assert_eq!(cpu.registers().p, pushed_from);
        assert_eq!(cpu.registers().p & FLAG_BREAK, 0);
    }

    #[test]
    fn jsr_rts_returns_to_following_instruction() {
        let mut program = vec![0x20, 0x10, 0x80, 0xEA];
        program.resize(0x10, 0xEA);
        program.push(0x60);
        let (mut cpu, mut bus) = boot(&program);

        assert_eq!(cpu.step(&mut bus).unwrap(), 6);
        assert_eq!(cpu.pc(), 0x8010);
        // Return address minus one, high byte first.
        assert_eq!(bus.mem[0x01FD], 0x80);
        assert_eq!(bus.mem[0x01FC], 0x02);

        run(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.pc(), 0x8003);
        assert_eq!(cpu.registers().sp, 0xFD);
    }

    #[test]
    fn branch_uses_signed_offset_and_flat_cost() {
        // LDX #$03; DEX; BNE -3
        let (mut cpu, mut bus) = boot(&[0xA2, 0x03, 0xCA, 0xD0, 0xFD]);
        run(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);
        assert_eq!(cpu.pc(), 0x8002);
        run(&mut cpu, &mut bus, 4);
        assert_eq!(cpu.registers().x, 0);
        assert_eq!(cpu.pc(), 0x8005);
    }

    #[test]
    fn indirect_jump_wraps_within_page() {
        let (mut cpu, mut bus) = boot(&[0x6C, 0xFF, 0x02]);
        bus.mem[0x02FF] = 0x34;
        bus.mem[0x0200] = 0x12;
        bus.mem[0x0300] = 0x56;
        run(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.pc(), 0x1234);
    }

    #[test]
    fn zero_page_indexing_wraps() {
        // LDX #$02; LDA $FF,X; LDY #$01; LDA ($FF),Y
        let (mut cpu, mut bus) = boot(&[0xA2, 0x02, 0xB5, 0xFF, 0xA0, 0x01, 0xB1, 0xFF]);
        bus.mem[0x0001] = 0x77;
        bus.mem[0x00FF] = 0x00;
        bus.mem[0x0000] = 0x03;
        bus.mem[0x0301] = 0x99;
        run(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.registers().a, 0x77);
        run(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.registers().a, 0x99);
    }

    #[test]
    fn shifts_chain_through_carry() {
        // LDA #$81; ASL A; ROL A; ROR $10; LSR $10
        let (mut cpu, mut bus) = boot(&[0xA9, 0x81, 0x0A, 0x2A, 0x66, 0x10, 0x46, 0x10]);
        bus.mem[0x0010] = 0x01;
        run(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.registers().a, 0x02);
        assert!(cpu.get_flag(FLAG_CARRY));
        run(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.registers().a, 0x05);
        assert!(!cpu.get_flag(FLAG_CARRY));
        run(&mut cpu, &mut bus, 1);
        assert_eq!(bus.mem[0x0010], 0x00);
        assert!(cpu.get_flag(FLAG_CARRY));
        assert!(cpu.get_flag(FLAG_ZERO));
        run(&mut cpu, &mut bus, 1);
        assert_eq!(bus.mem[0x0010], 0x00);
        assert!(!cpu.get_flag(FLAG_CARRY));
    }

    #[test]
    fn compare_sets_carry_zero_negative() {
        // LDA #$40; CMP #$40; CMP #$41; CPX #$00
        let (mut cpu, mut bus) = boot(&[0xA9, 0x40, 0xC9, 0x40, 0xC9, 0x41, 0xE0, 0x00]);
        run(&mut cpu, &mut bus, 2);
        assert!(cpu.get_flag(FLAG_CARRY) && cpu.get_flag(FLAG_ZERO));
        run(&mut cpu, &mut bus, 1);
        assert!(!cpu.get_flag(FLAG_CARRY) && cpu.get_flag(FLAG_NEGATIVE));
        run(&mut cpu, &mut bus, 1);
        assert!(cpu.get_flag(FLAG_CARRY) && cpu.get_flag(FLAG_ZERO));
    }

    #[test]
    fn stores_and_read_modify_write_hit_memory() {
        // LDX #$01; LDA #$AB; STA $0200,X; INC $0201,X; DEC $10
        let program = [0xA2, 0x01, 0xA9, 0xAB, 0x9D, 0x00, 0x02, 0xFE, 0x01, 0x02, 0xC6, 0x10];
        let (mut cpu, mut bus) = boot(&program);
        run(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
        assert_eq!(bus.mem[0x0201], 0xAB);
        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(bus.mem[0x0202], 0x01);
        assert_eq!(bus.mem[0x0201], 0xAB);
        run(&mut cpu, &mut bus, 1);
        assert_eq!(bus.mem[0x0010], 0xFF);
        assert!(cpu.get_flag(FLAG_NEGATIVE));
    }

    #[test]
    fn stack_pointer_wraps_within_page() {
        let (mut cpu, mut bus) = boot(&[0x48, 0x68]);
        cpu.sp = 0x00;
        cpu.a = 0x42;
        run(&mut cpu, &mut bus, 1);
        assert_eq!(bus.mem[0x0100], 0x42);
        assert_eq!(cpu.registers().sp, 0xFF);
        run(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.registers().sp, 0x00);
    }

    #[test]
    fn unknown_opcode_is_a_fault() {
        let (mut cpu, mut bus) = boot(&[0xEA, 0x02]);
        run(&mut cpu, &mut bus, 1);
        assert_eq!(
            cpu.step(&mut bus),
            Err(Fault::UnknownOpcode {
                opcode: 0x02,
                pc: 0x8001
            })
        );
    }

    #[test]
    fn brk_raises_interrupt_and_pushes_break_flag() {
        let (mut cpu, mut bus) = boot(&[0x00, 0xFF, 0xEA]);
        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(bus.raised, vec![Interrupt::IrqBrk]);
        assert_eq!(cpu.pc(), 0x8002);

        // BRK is taken even with I set.
        assert!(cpu.irq(&mut bus));
        assert_eq!(cpu.pc(), 0x9000);
        assert_eq!(bus.mem[0x01FD], 0x80);
        assert_eq!(bus.mem[0x01FC], 0x02);
        assert_ne!(bus.mem[0x01FB] & FLAG_BREAK, 0);
        assert!(cpu.get_flag(FLAG_INTERRUPT));
    }

    #[test]
    fn rti_restores_status_and_pc() {
        // CLI; then NMI handler at $A000 is RTI.
        let (mut cpu, mut bus) = boot(&[0x58, 0xEA]);
        bus.mem[0xA000] = 0x40;
        run(&mut cpu, &mut bus, 1);
        cpu.nmi(&mut bus);
        assert_eq!(cpu.pc(), 0xA000);
        assert_eq!(bus.mem[0x01FB] & FLAG_BREAK, 0);
        run(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.pc(), 0x8001);
        assert!(!cpu.get_flag(FLAG_INTERRUPT));
    }

    #[test]
    fn masked_irq_is_dropped() {
        let (mut cpu, mut bus) = boot(&[0xEA]);
        assert!(!cpu.irq(&mut bus));
        assert_eq!(cpu.pc(), 0x8000);
    }

    #[test]
    fn reset_reloads_vector_and_drops_stack_pointer() {
        let (mut cpu, mut bus) = boot(&[0x58, 0xEA]);
        run(&mut cpu, &mut bus, 2);
        cpu.reset(&mut bus);
        assert_eq!(cpu.pc(), 0x8000);
        assert_eq!(cpu.registers().sp, 0xFA);
        assert!(cpu.get_flag(FLAG_INTERRUPT));
    }
}
