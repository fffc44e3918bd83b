use super::{
    Bus, FLAG_BREAK, FLAG_CARRY, FLAG_DECIMAL, FLAG_INTERRUPT, FLAG_NEGATIVE, FLAG_OVERFLOW,
    FLAG_UNUSED, FLAG_ZERO,
};

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

/// Addressing modes. Instruction length follows from the mode; the
/// indexed modes may add a cycle when the effective address crosses a
/// page and the instruction's penalty bit is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Implied,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Relative,
    IndirectX,
    IndirectY,
    Indirect,
    Absolute,
    AbsoluteX,
    AbsoluteY,
}

/// Opcode tags. Undocumented opcodes are marked with a '*' in the table
/// mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Adc, Alr, Anc, And, Ahx, Arr, Asl, Axs, Bcc, Bcs, Beq, Bit, Bmi, Bne,
    Bpl, Brk, Bvc, Bvs, Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dcp, Dec, Dex,
    Dey, Eor, Inc, Inx, Iny, Isc, Jmp, Jsr, Las, Lax, Lda, Ldx, Ldy, Lsr,
    Nop, Ora, Pha, Php, Pla, Plp, Rla, Rol, Ror, Rra, Rti, Rts, Sax, Sbc,
    Sec, Sed, Sei, Shx, Shy, Slo, Sre, Sta, Stp, Stx, Sty, Tas, Tax, Tay,
    Tsx, Txa, Txs, Tya, Xaa,
}

struct Instruction {
    mnemonic: &'static str,
    op: Op,
    mode: Mode,
    /// Base cycle count; bit 7 marks the page-crossing penalty.
    cycles: u8,
}

const fn ins(mnemonic: &'static str, op: Op, mode: Mode, cycles: u8) -> Instruction {
    Instruction {
        mnemonic,
        op,
        mode,
        cycles,
    }
}

#[rustfmt::skip]
static INSTRUCTIONS: [Instruction; 256] = {
    use Mode::*;
    use Op::*;
    [
        ins("BRK", Brk, Implied,   0x07), // 00
        ins("ORA", Ora, IndirectX, 0x06), // 01
        ins("STP", Stp, Implied,   0x00), // 02
        ins("SLO", Slo, IndirectX, 0x08), // 03
        ins("NOP", Nop, ZeroPage,  0x03), // 04
        ins("ORA", Ora, ZeroPage,  0x03), // 05
        ins("ASL", Asl, ZeroPage,  0x05), // 06
        ins("SLO", Slo, ZeroPage,  0x05), // 07
        ins("PHP", Php, Implied,   0x03), // 08
        ins("ORA", Ora, Immediate, 0x02), // 09
        ins("ASL", Asl, Implied,   0x02), // 0A
        ins("ANC", Anc, Immediate, 0x02), // 0B
        ins("NOP", Nop, Absolute,  0x04), // 0C
        ins("ORA", Ora, Absolute,  0x04), // 0D
        ins("ASL", Asl, Absolute,  0x06), // 0E
        ins("SLO", Slo, Absolute,  0x06), // 0F
        ins("BPL", Bpl, Relative,  0x02), // 10
        ins("ORA", Ora, IndirectY, 0x85), // 11
        ins("STP", Stp, Implied,   0x00), // 12
        ins("SLO", Slo, IndirectY, 0x08), // 13
        ins("NOP", Nop, ZeroPageX, 0x04), // 14
        ins("ORA", Ora, ZeroPageX, 0x04), // 15
        ins("ASL", Asl, ZeroPageX, 0x06), // 16
        ins("SLO", Slo, ZeroPageX, 0x06), // 17
        ins("CLC", Clc, Implied,   0x02), // 18
        ins("ORA", Ora, AbsoluteY, 0x84), // 19
        ins("NOP", Nop, Implied,   0x02), // 1A
        ins("SLO", Slo, AbsoluteY, 0x07), // 1B
        ins("NOP", Nop, AbsoluteX, 0x84), // 1C
        ins("ORA", Ora, AbsoluteX, 0x84), // 1D
        ins("ASL", Asl, AbsoluteX, 0x07), // 1E
        ins("SLO", Slo, AbsoluteX, 0x07), // 1F
        ins("JSR", Jsr, Absolute,  0x06), // 20
        ins("AND", And, IndirectX, 0x06), // 21
        ins("STP", Stp, Implied,   0x00), // 22
        ins("RLA", Rla, IndirectX, 0x08), // 23
        ins("BIT", Bit, ZeroPage,  0x03), // 24
        ins("AND", And, ZeroPage,  0x03), // 25
        ins("ROL", Rol, ZeroPage,  0x05), // 26
        ins("RLA", Rla, ZeroPage,  0x05), // 27
        ins("PLP", Plp, Implied,   0x04), // 28
        ins("AND", And, Immediate, 0x02), // 29
        ins("ROL", Rol, Implied,   0x02), // 2A
        ins("ANC", Anc, Immediate, 0x02), // 2B
        ins("BIT", Bit, Absolute,  0x04), // 2C
        ins("AND", And, Absolute,  0x04), // 2D
        ins("ROL", Rol, Absolute,  0x06), // 2E
        ins("RLA", Rla, Absolute,  0x06), // 2F
        ins("BMI", Bmi, Relative,  0x02), // 30
        ins("AND", And, IndirectY, 0x85), // 31
        ins("STP", Stp, Implied,   0x00), // 32
        ins("RLA", Rla, IndirectY, 0x08), // 33
        ins("NOP", Nop, ZeroPageX, 0x04), // 34
        ins("AND", And, ZeroPageX, 0x04), // 35
        ins("ROL", Rol, ZeroPageX, 0x06), // 36
        ins("RLA", Rla, ZeroPageX, 0x06), // 37
        ins("SEC", Sec, Implied,   0x02), // 38
        ins("AND", And, AbsoluteY, 0x84), // 39
        ins("NOP", Nop, Implied,   0x02), // 3A
        ins("RLA", Rla, AbsoluteY, 0x07), // 3B
        ins("NOP", Nop, AbsoluteX, 0x84), // 3C
        ins("AND", And, AbsoluteX, 0x84), // 3D
        ins("ROL", Rol, AbsoluteX, 0x07), // 3E
        ins("RLA", Rla, AbsoluteX, 0x07), // 3F
        ins("RTI", Rti, Implied,   0x06), // 40
        ins("EOR", Eor, IndirectX, 0x06), // 41
        ins("STP", Stp, Implied,   0x00), // 42
        ins("SRE", Sre, IndirectX, 0x08), // 43
        ins("NOP", Nop, ZeroPage,  0x03), // 44
        ins("EOR", Eor, ZeroPage,  0x03), // 45
        ins("LSR", Lsr, ZeroPage,  0x05), // 46
        ins("SRE", Sre, ZeroPage,  0x05), // 47
        ins("PHA", Pha, Implied,   0x03), // 48
        ins("EOR", Eor, Immediate, 0x02), // 49
        ins("LSR", Lsr, Implied,   0x02), // 4A
        ins("ALR", Alr, Immediate, 0x02), // 4B
        ins("JMP", Jmp, Absolute,  0x03), // 4C
        ins("EOR", Eor, Absolute,  0x04), // 4D
        ins("LSR", Lsr, Absolute,  0x06), // 4E
        ins("SRE", Sre, Absolute,  0x06), // 4F
        ins("BVC", Bvc, Relative,  0x02), // 50
        ins("EOR", Eor, IndirectY, 0x85), // 51
        ins("STP", Stp, Implied,   0x00), // 52
        ins("SRE", Sre, IndirectY, 0x08), // 53
        ins("NOP", Nop, ZeroPageX, 0x04), // 54
        ins("EOR", Eor, ZeroPageX, 0x04), // 55
        ins("LSR", Lsr, ZeroPageX, 0x06), // 56
        ins("SRE", Sre, ZeroPageX, 0x06), // 57
        ins("CLI", Cli, Implied,   0x02), // 58
        ins("EOR", Eor, AbsoluteY, 0x84), // 59
        ins("NOP", Nop, Implied,   0x02), // 5A
        ins("SRE", Sre, AbsoluteY, 0x07), // 5B
        ins("NOP", Nop, AbsoluteX, 0x84), // 5C
        ins("EOR", Eor, AbsoluteX, 0x84), // 5D
        ins("LSR", Lsr, AbsoluteX, 0x07), // 5E
        ins("SRE", Sre, AbsoluteX, 0x07), // 5F
        ins("RTS", Rts, Implied,   0x06), // 60
        ins("ADC", Adc, IndirectX, 0x06), // 61
        ins("STP", Stp, Implied,   0x00), // 62
        ins("RRA", Rra, IndirectX, 0x08), // 63
        ins("NOP", Nop, ZeroPage,  0x03), // 64
        ins("ADC", Adc, ZeroPage,  0x03), // 65
        ins("ROR", Ror, ZeroPage,  0x05), // 66
        ins("RRA", Rra, ZeroPage,  0x05), // 67
        ins("PLA", Pla, Implied,   0x04), // 68
        ins("ADC", Adc, Immediate, 0x02), // 69
        ins("ROR", Ror, Implied,   0x02), // 6A
        ins("ARR", Arr, Immediate, 0x02), // 6B
        ins("JMP", Jmp, Indirect,  0x05), // 6C
        ins("ADC", Adc, Absolute,  0x04), // 6D
        ins("ROR", Ror, Absolute,  0x06), // 6E
        ins("RRA", Rra, Absolute,  0x06), // 6F
        ins("BVS", Bvs, Relative,  0x02), // 70
        ins("ADC", Adc, IndirectY, 0x85), // 71
        ins("STP", Stp, Implied,   0x00), // 72
        ins("RRA", Rra, IndirectY, 0x08), // 73
        ins("NOP", Nop, ZeroPageX, 0x04), // 74
        ins("ADC", Adc, ZeroPageX, 0x04), // 75
        ins("ROR", Ror, ZeroPageX, 0x06), // 76
        ins("RRA", Rra, ZeroPageX, 0x06), // 77
        ins("SEI", Sei, Implied,   0x02), // 78
        ins("ADC", Adc, AbsoluteY, 0x84), // 79
        ins("NOP", Nop, Implied,   0x02), // 7A
        ins("RRA", Rra, AbsoluteY, 0x07), // 7B
        ins("NOP", Nop, AbsoluteX, 0x84), // 7C
        ins("ADC", Adc, AbsoluteX, 0x84), // 7D
        ins("ROR", Ror, AbsoluteX, 0x07), // 7E
        ins("RRA", Rra, AbsoluteX, 0x07), // 7F
        ins("NOP", Nop, Immediate, 0x02), // 80
        ins("STA", Sta, IndirectX, 0x06), // 81
        ins("NOP", Nop, Immediate, 0x02), // 82
        ins("SAX", Sax, IndirectX, 0x06), // 83
        ins("STY", Sty, ZeroPage,  0x03), // 84
        ins("STA", Sta, ZeroPage,  0x03), // 85
        ins("STX", Stx, ZeroPage,  0x03), // 86
        ins("SAX", Sax, ZeroPage,  0x03), // 87
        ins("DEY", Dey, Implied,   0x02), // 88
        ins("NOP", Nop, Immediate, 0x02), // 89
        ins("TXA", Txa, Implied,   0x02), // 8A
        ins("XAA", Xaa, Immediate, 0x02), // 8B
        ins("STY", Sty, Absolute,  0x04), // 8C
        ins("STA", Sta, Absolute,  0x04), // 8D
        ins("STX", Stx, Absolute,  0x04), // 8E
        ins("SAX", Sax, Absolute,  0x04), // 8F
        ins("BCC", Bcc, Relative,  0x02), // 90
        ins("STA", Sta, IndirectY, 0x06), // 91
        ins("STP", Stp, Implied,   0x00), // 92
        ins("AHX", Ahx, IndirectY, 0x06), // 93
        ins("STY", Sty, ZeroPageX, 0x04), // 94
        ins("STA", Sta, ZeroPageX, 0x04), // 95
        ins("STX", Stx, ZeroPageY, 0x04), // 96
        ins("SAX", Sax, ZeroPageY, 0x04), // 97
        ins("TYA", Tya, Implied,   0x02), // 98
        ins("STA", Sta, AbsoluteY, 0x05), // 99
        ins("TXS", Txs, Implied,   0x02), // 9A
        ins("TAS", Tas, AbsoluteY, 0x05), // 9B
        ins("SHY", Shy, AbsoluteX, 0x05), // 9C
        ins("STA", Sta, AbsoluteX, 0x05), // 9D
        ins("SHX", Shx, AbsoluteY, 0x05), // 9E
        ins("AHX", Ahx, AbsoluteY, 0x05), // 9F
        ins("LDY", Ldy, Immediate, 0x02), // A0
        ins("LDA", Lda, IndirectX, 0x06), // A1
        ins("LDX", Ldx, Immediate, 0x02), // A2
        ins("LAX", Lax, IndirectX, 0x06), // A3
        ins("LDY", Ldy, ZeroPage,  0x03), // A4
        ins("LDA", Lda, ZeroPage,  0x03), // A5
        ins("LDX", Ldx, ZeroPage,  0x03), // A6
        ins("LAX", Lax, ZeroPage,  0x03), // A7
        ins("TAY", Tay, Implied,   0x02), // A8
        ins("LDA", Lda, Immediate, 0x02), // A9
        ins("TAX", Tax, Implied,   0x02), // AA
        ins("LAX", Lax, Immediate, 0x02), // AB
        ins("LDY", Ldy, Absolute,  0x04), // AC
        ins("LDA", Lda, Absolute,  0x04), // AD
        ins("LDX", Ldx, Absolute,  0x04), // AE
        ins("LAX", Lax, Absolute,  0x04), // AF
        ins("BCS", Bcs, Relative,  0x02), // B0
        ins("LDA", Lda, IndirectY, 0x85), // B1
        ins("STP", Stp, Implied,   0x00), // B2
        ins("LAX", Lax, IndirectY, 0x85), // B3
        ins("LDY", Ldy, ZeroPageX, 0x04), // B4
        ins("LDA", Lda, ZeroPageX, 0x04), // B5
        ins("LDX", Ldx, ZeroPageY, 0x04), // B6
        ins("LAX", Lax, ZeroPageY, 0x04), // B7
        ins("CLV", Clv, Implied,   0x02), // B8
        ins("LDA", Lda, AbsoluteY, 0x84), // B9
        ins("TSX", Tsx, Implied,   0x02), // BA
        ins("LAS", Las, AbsoluteY, 0x84), // BB
        ins("LDY", Ldy, AbsoluteX, 0x84), // BC
        ins("LDA", Lda, AbsoluteX, 0x84), // BD
        ins("LDX", Ldx, AbsoluteY, 0x84), // BE
        ins("LAX", Lax, AbsoluteY, 0x84), // BF
        ins("CPY", Cpy, Immediate, 0x02), // C0
        ins("CMP", Cmp, IndirectX, 0x06), // C1
        ins("NOP", Nop, Immediate, 0x02), // C2
        ins("DCP", Dcp, IndirectX, 0x08), // C3
        ins("CPY", Cpy, ZeroPage,  0x03), // C4
        ins("CMP", Cmp, ZeroPage,  0x03), // C5
        ins("DEC", Dec, ZeroPage,  0x05), // C6
        ins("DCP", Dcp, ZeroPage,  0x05), // C7
        ins("INY", Iny, Implied,   0x02), // C8
        ins("CMP", Cmp, Immediate, 0x02), // C9
        ins("DEX", Dex, Implied,   0x02), // CA
        ins("AXS", Axs, Immediate, 0x02), // CB
        ins("CPY", Cpy, Absolute,  0x04), // CC
        ins("CMP", Cmp, Absolute,  0x04), // CD
        ins("DEC", Dec, Absolute,  0x06), // CE
        ins("DCP", Dcp, Absolute,  0x06), // CF
        ins("BNE", Bne, Relative,  0x02), // D0
        ins("CMP", Cmp, IndirectY, 0x85), // D1
        ins("STP", Stp, Implied,   0x00), // D2
        ins("DCP", Dcp, IndirectY, 0x08), // D3
        ins("NOP", Nop, ZeroPageX, 0x04), // D4
        ins("CMP", Cmp, ZeroPageX, 0x04), // D5
        ins("DEC", Dec, ZeroPageX, 0x06), // D6
        ins("DCP", Dcp, ZeroPageX, 0x06), // D7
        ins("CLD", Cld, Implied,   0x02), // D8
        ins("CMP", Cmp, AbsoluteY, 0x84), // D9
        ins("NOP", Nop, Implied,   0x02), // DA
        ins("DCP", Dcp, AbsoluteY, 0x07), // DB
        ins("NOP", Nop, AbsoluteX, 0x84), // DC
        ins("CMP", Cmp, AbsoluteX, 0x84), // DD
        ins("DEC", Dec, AbsoluteX, 0x07), // DE
        ins("DCP", Dcp, AbsoluteX, 0x07), // DF
        ins("CPX", Cpx, Immediate, 0x02), // E0
        ins("SBC", Sbc, IndirectX, 0x06), // E1
        ins("NOP", Nop, Immediate, 0x02), // E2
        ins("ISC", Isc, IndirectX, 0x08), // E3
        ins("CPX", Cpx, ZeroPage,  0x03), // E4
        ins("SBC", Sbc, ZeroPage,  0x03), // E5
        ins("INC", Inc, ZeroPage,  0x05), // E6
        ins("ISC", Isc, ZeroPage,  0x05), // E7
        ins("INX", Inx, Implied,   0x02), // E8
        ins("SBC", Sbc, Immediate, 0x02), // E9
        ins("NOP", Nop, Implied,   0x02), // EA
        ins("SBC", Sbc, Immediate, 0x02), // EB
        ins("CPX", Cpx, Absolute,  0x04), // EC
        ins("SBC", Sbc, Absolute,  0x04), // ED
        ins("INC", Inc, Absolute,  0x06), // EE
        ins("ISC", Isc, Absolute,  0x06), // EF
        ins("BEQ", Beq, Relative,  0x02), // F0
        ins("SBC", Sbc, IndirectY, 0x85), // F1
        ins("STP", Stp, Implied,   0x00), // F2
        ins("ISC", Isc, IndirectY, 0x08), // F3
        ins("NOP", Nop, ZeroPageX, 0x04), // F4
        ins("SBC", Sbc, ZeroPageX, 0x04), // F5
        ins("INC", Inc, ZeroPageX, 0x06), // F6
        ins("ISC", Isc, ZeroPageX, 0x06), // F7
        ins("SED", Sed, Implied,   0x02), // F8
        ins("SBC", Sbc, AbsoluteY, 0x84), // F9
        ins("NOP", Nop, Implied,   0x02), // FA
        ins("ISC", Isc, AbsoluteY, 0x07), // FB
        ins("NOP", Nop, AbsoluteX, 0x84), // FC
        ins("SBC", Sbc, AbsoluteX, 0x84), // FD
        ins("INC", Inc, AbsoluteX, 0x07), // FE
        ins("ISC", Isc, AbsoluteX, 0x07), // FF
    ]
};

/// Register snapshot for debuggers and trace harnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuState {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: u8,
    pub stopped: bool,
}

/// The 2A03 core: table-driven fetch/decode/execute with cycle
/// accounting. All instruction effects land at the fetch clock; the
/// remaining clocks only burn the counted cycles.
pub struct Cpu {
    pub(crate) pc: u16,
    pub(crate) a: u8,
    pub(crate) x: u8,
    pub(crate) y: u8,
    pub(crate) s: u8,
    pub(crate) p: u8,
    pub(crate) stopped: bool,

    pub(crate) nmi_pending: bool,
    pub(crate) irq_line: bool,

    cycles: u64,
    cycles_remaining: u16,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            pc: 0,
            a: 0,
            x: 0,
            y: 0,
            s: 0xFD,
            p: 0x34,
            stopped: false,
            nmi_pending: false,
            irq_line: false,
            cycles: 0,
            cycles_remaining: 0,
        }
    }

    pub fn reset(&mut self, bus: &mut Bus, coldstart: bool) {
        self.pc = self.read_word(bus, RESET_VECTOR);
        self.stopped = false;

        if coldstart {
            self.p = 0x34;
            self.a = 0;
            self.x = 0;
            self.y = 0;
            self.s = 0xFD;
        } else {
            self.s = self.s.wrapping_sub(3);
            self.p |= FLAG_INTERRUPT;
        }

        self.nmi_pending = false;
        self.irq_line = false;
        self.cycles = 0;
        self.cycles_remaining = 6;
    }

    /// Force the register file, for instance to enter a test ROM's
    /// automation section. The cycle counter aligns with the
    /// conventional post-reset count reference traces start from.
    pub(crate) fn force_state(&mut self, pc: u16, a: u8, x: u8, y: u8, s: u8, p: u8) {
        self.pc = pc;
        self.a = a;
        self.x = x;
        self.y = y;
        self.s = s;
        self.p = p;
        self.stopped = false;
        self.cycles = 7;
        self.cycles_remaining = 0;
    }

    pub fn state(&self) -> CpuState {
        CpuState {
            pc: self.pc,
            a: self.a,
            x: self.x,
            y: self.y,
            s: self.s,
            p: self.p,
            stopped: self.stopped,
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycles
    }

    pub(crate) fn at_instruction_boundary(&self) -> bool {
        self.cycles_remaining == 0
    }

    pub fn clock(&mut self, bus: &mut Bus) {
        if self.stopped {
            return;
        }

        self.cycles += 1;

        if self.cycles_remaining == 0 {
            if let Some(page) = bus.take_dma_request() {
                self.run_oam_dma(bus, page);
            } else if self.nmi_pending {
                self.nmi_pending = false;
                self.interrupt(bus, NMI_VECTOR);
            } else if self.irq_line && !self.flag(FLAG_INTERRUPT) {
                self.interrupt(bus, IRQ_VECTOR);
            } else {
                let opcode = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.exec(bus, opcode);
            }
        }

        self.cycles_remaining = self.cycles_remaining.saturating_sub(1);
    }

    /// Run clocks until the current instruction completes.
    pub fn step(&mut self, bus: &mut Bus) {
        if self.stopped {
            return;
        }

        if self.cycles_remaining == 0 {
            self.clock(bus);
        }

        while self.cycles_remaining > 0 && !self.stopped {
            self.clock(bus);
        }
    }

    // Suspend for 513 cycles (514 when the transfer starts on an odd
    // cycle) while 256 bytes stream from CPU memory into OAM.
    fn run_oam_dma(&mut self, bus: &mut Bus, page: u8) {
        let base = (page as u16) << 8;
        for i in 0..256u16 {
            let value = bus.read(base | i);
            bus.write(0x2004, value);
        }
        // self.cycles already counts the current clock; parity is taken
        // from the cycle the transfer starts on
        let start_parity = (self.cycles - 1) & 1;
        self.cycles_remaining = 513 + start_parity as u16;
    }

    fn interrupt(&mut self, bus: &mut Bus, vector: u16) {
        self.push_word(bus, self.pc);
        self.push(bus, (self.p & !FLAG_BREAK) | FLAG_UNUSED);
        self.set_flag(FLAG_INTERRUPT, true);
        self.pc = self.read_word(bus, vector);
        self.cycles_remaining = 7;
    }

    fn flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
        self.p |= FLAG_UNUSED;
    }

    fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }

    fn fetch(&mut self, bus: &mut Bus) -> u8 {
        let value = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch_word(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch(bus) as u16;
        let hi = self.fetch(bus) as u16;
        (hi << 8) | lo
    }

    fn read_word(&mut self, bus: &mut Bus, addr: u16) -> u16 {
        let lo = bus.read(addr) as u16;
        let hi = bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    // 16-bit read that wraps within the page when the pointer sits at
    // $xxFF (the documented JMP (ind) silicon bug, shared by the
    // zero-page indirect modes).
    fn read_word_wrapped(&mut self, bus: &mut Bus, addr: u16) -> u16 {
        let lo = bus.read(addr) as u16;
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = bus.read(hi_addr) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut Bus, value: u8) {
        bus.write(0x0100 | self.s as u16, value);
        self.s = self.s.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut Bus) -> u8 {
        self.s = self.s.wrapping_add(1);
        bus.read(0x0100 | self.s as u16)
    }

    fn push_word(&mut self, bus: &mut Bus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_word(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    // Effective address for the decoded mode. The page-crossing penalty
    // is added straight into cycles_remaining, matching the base-cycles
    // table encoding.
    fn operand_address(&mut self, bus: &mut Bus, mode: Mode, penalty: bool) -> u16 {
        match mode {
            Mode::Implied => 0,
            Mode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                addr
            }
            Mode::ZeroPage => self.fetch(bus) as u16,
            Mode::ZeroPageX => {
                let base = self.fetch(bus);
                base.wrapping_add(self.x) as u16
            }
            Mode::ZeroPageY => {
                let base = self.fetch(bus);
                base.wrapping_add(self.y) as u16
            }
            Mode::Relative => {
                let offset = self.fetch(bus) as i8;
                self.pc.wrapping_add(offset as u16)
            }
            Mode::Absolute => self.fetch_word(bus),
            Mode::AbsoluteX => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(self.x as u16);
                if penalty && (addr & 0xFF00) != (base & 0xFF00) {
                    self.cycles_remaining += 1;
                }
                addr
            }
            Mode::AbsoluteY => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(self.y as u16);
                if penalty && (addr & 0xFF00) != (base & 0xFF00) {
                    self.cycles_remaining += 1;
                }
                addr
            }
            Mode::Indirect => {
                let ptr = self.fetch_word(bus);
                self.read_word_wrapped(bus, ptr)
            }
            Mode::IndirectX => {
                let ptr = self.fetch(bus).wrapping_add(self.x);
                self.read_word_wrapped(bus, ptr as u16)
            }
            Mode::IndirectY => {
                let ptr = self.fetch(bus);
                let base = self.read_word_wrapped(bus, ptr as u16);
                let addr = base.wrapping_add(self.y as u16);
                if penalty && (addr & 0xFF00) != (base & 0xFF00) {
                    self.cycles_remaining += 1;
                }
                addr
            }
        }
    }

    fn branch(&mut self, taken: bool, addr: u16) {
        if taken {
            self.cycles_remaining += if (addr & 0xFF00) == (self.pc & 0xFF00) {
                1
            } else {
                2
            };
            self.pc = addr;
        }
    }

    fn adc(&mut self, value: u8) {
        let sum = self.a as u16 + value as u16 + self.flag(FLAG_CARRY) as u16;
        let out = sum as u8;
        self.set_flag(FLAG_CARRY, sum > 0xFF);
        self.set_flag(FLAG_OVERFLOW, ((self.a ^ out) & (value ^ out) & 0x80) != 0);
        self.a = out;
        self.update_zn(self.a);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.set_flag(FLAG_CARRY, register >= value);
        self.update_zn(register.wrapping_sub(value));
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let out = value << 1;
        self.update_zn(out);
        out
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let out = value >> 1;
        self.update_zn(out);
        out
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.flag(FLAG_CARRY) as u8;
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let out = (value << 1) | carry_in;
        self.update_zn(out);
        out
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = (self.flag(FLAG_CARRY) as u8) << 7;
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let out = (value >> 1) | carry_in;
        self.update_zn(out);
        out
    }

    fn pull_status(&mut self, value: u8) {
        self.p = (value & !FLAG_BREAK) | FLAG_UNUSED;
    }

    fn exec(&mut self, bus: &mut Bus, opcode: u8) {
        let instruction = &INSTRUCTIONS[opcode as usize];
        let penalty = (instruction.cycles & 0x80) != 0;
        let accumulator = instruction.mode == Mode::Implied;

        self.cycles_remaining = (instruction.cycles & 0x7F) as u16;
        let addr = self.operand_address(bus, instruction.mode, penalty);

        match instruction.op {
            Op::Adc => {
                let value = bus.read(addr);
                self.adc(value);
            }
            Op::And => {
                self.a &= bus.read(addr);
                self.update_zn(self.a);
            }
            Op::Asl => {
                if accumulator {
                    self.a = self.asl(self.a);
                } else {
                    let value = bus.read(addr);
                    let out = self.asl(value);
                    bus.write(addr, out);
                }
            }
            Op::Bcc => self.branch(!self.flag(FLAG_CARRY), addr),
            Op::Bcs => self.branch(self.flag(FLAG_CARRY), addr),
            Op::Beq => self.branch(self.flag(FLAG_ZERO), addr),
            Op::Bit => {
                let value = bus.read(addr);
                self.set_flag(FLAG_ZERO, (self.a & value) == 0);
                self.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
                self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
            }
            Op::Bmi => self.branch(self.flag(FLAG_NEGATIVE), addr),
            Op::Bne => self.branch(!self.flag(FLAG_ZERO), addr),
            Op::Bpl => self.branch(!self.flag(FLAG_NEGATIVE), addr),
            Op::Brk => {
                // Padding byte after the opcode is consumed
                self.pc = self.pc.wrapping_add(1);
                self.push_word(bus, self.pc);
                self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED);
                self.set_flag(FLAG_INTERRUPT, true);
                self.pc = self.read_word(bus, IRQ_VECTOR);
            }
            Op::Bvc => self.branch(!self.flag(FLAG_OVERFLOW), addr),
            Op::Bvs => self.branch(self.flag(FLAG_OVERFLOW), addr),
            Op::Clc => self.set_flag(FLAG_CARRY, false),
            Op::Cld => self.set_flag(FLAG_DECIMAL, false),
            Op::Cli => self.set_flag(FLAG_INTERRUPT, false),
            Op::Clv => self.set_flag(FLAG_OVERFLOW, false),
            Op::Cmp => {
                let value = bus.read(addr);
                self.compare(self.a, value);
            }
            Op::Cpx => {
                let value = bus.read(addr);
                self.compare(self.x, value);
            }
            Op::Cpy => {
                let value = bus.read(addr);
                self.compare(self.y, value);
            }
            Op::Dec => {
                let value = bus.read(addr).wrapping_sub(1);
                self.update_zn(value);
                bus.write(addr, value);
            }
            Op::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
            }
            Op::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
            }
            Op::Eor => {
                self.a ^= bus.read(addr);
                self.update_zn(self.a);
            }
            Op::Inc => {
                let value = bus.read(addr).wrapping_add(1);
                self.update_zn(value);
                bus.write(addr, value);
            }
            Op::Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
            }
            Op::Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
            }
            Op::Jmp => self.pc = addr,
            Op::Jsr => {
                self.push_word(bus, self.pc.wrapping_sub(1));
                self.pc = addr;
            }
            Op::Lda => {
                self.a = bus.read(addr);
                self.update_zn(self.a);
            }
            Op::Ldx => {
                self.x = bus.read(addr);
                self.update_zn(self.x);
            }
            Op::Ldy => {
                self.y = bus.read(addr);
                self.update_zn(self.y);
            }
            Op::Lsr => {
                if accumulator {
                    self.a = self.lsr(self.a);
                } else {
                    let value = bus.read(addr);
                    let out = self.lsr(value);
                    bus.write(addr, out);
                }
            }
            Op::Nop => {}
            Op::Ora => {
                self.a |= bus.read(addr);
                self.update_zn(self.a);
            }
            Op::Pha => self.push(bus, self.a),
            Op::Php => self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED),
            Op::Pla => {
                self.a = self.pop(bus);
                self.update_zn(self.a);
            }
            Op::Plp => {
                let value = self.pop(bus);
                self.pull_status(value);
            }
            Op::Rol => {
                if accumulator {
                    self.a = self.rol(self.a);
                } else {
                    let value = bus.read(addr);
                    let out = self.rol(value);
                    bus.write(addr, out);
                }
            }
            Op::Ror => {
                if accumulator {
                    self.a = self.ror(self.a);
                } else {
                    let value = bus.read(addr);
                    let out = self.ror(value);
                    bus.write(addr, out);
                }
            }
            Op::Rti => {
                let value = self.pop(bus);
                self.pull_status(value);
                self.pc = self.pop_word(bus);
            }
            Op::Rts => self.pc = self.pop_word(bus).wrapping_add(1),
            Op::Sbc => {
                let value = bus.read(addr) ^ 0xFF;
                self.adc(value);
            }
            Op::Sec => self.set_flag(FLAG_CARRY, true),
            Op::Sed => self.set_flag(FLAG_DECIMAL, true),
            Op::Sei => self.set_flag(FLAG_INTERRUPT, true),
            Op::Sta => bus.write(addr, self.a),
            Op::Stx => bus.write(addr, self.x),
            Op::Sty => bus.write(addr, self.y),
            Op::Tax => {
                self.x = self.a;
                self.update_zn(self.x);
            }
            Op::Tay => {
                self.y = self.a;
                self.update_zn(self.y);
            }
            Op::Tsx => {
                self.x = self.s;
                self.update_zn(self.x);
            }
            Op::Txa => {
                self.a = self.x;
                self.update_zn(self.a);
            }
            Op::Txs => self.s = self.x,
            Op::Tya => {
                self.a = self.y;
                self.update_zn(self.a);
            }

            // Undocumented opcodes
            Op::Alr => {
                self.a &= bus.read(addr);
                self.a = self.lsr(self.a);
            }
            Op::Anc => {
                self.a &= bus.read(addr);
                self.update_zn(self.a);
                self.set_flag(FLAG_CARRY, (self.a & 0x80) != 0);
            }
            Op::Arr => {
                self.a &= bus.read(addr);
                let carry_in = (self.flag(FLAG_CARRY) as u8) << 7;
                self.a = (self.a >> 1) | carry_in;
                self.update_zn(self.a);
                self.set_flag(FLAG_CARRY, (self.a & 0x40) != 0);
                self.set_flag(
                    FLAG_OVERFLOW,
                    (((self.a >> 6) ^ (self.a >> 5)) & 0x01) != 0,
                );
            }
            Op::Axs => {
                let value = bus.read(addr);
                let and = self.a & self.x;
                self.set_flag(FLAG_CARRY, and >= value);
                self.x = and.wrapping_sub(value);
                self.update_zn(self.x);
            }
            Op::Dcp => {
                let value = bus.read(addr).wrapping_sub(1);
                bus.write(addr, value);
                self.compare(self.a, value);
            }
            Op::Isc => {
                let value = bus.read(addr).wrapping_add(1);
                bus.write(addr, value);
                self.adc(value ^ 0xFF);
            }
            Op::Lax => {
                let value = bus.read(addr);
                self.a = value;
                self.x = value;
                self.update_zn(value);
            }
            Op::Rla => {
                let value = bus.read(addr);
                let out = self.rol(value);
                bus.write(addr, out);
                self.a &= out;
                self.update_zn(self.a);
            }
            Op::Rra => {
                let value = bus.read(addr);
                let out = self.ror(value);
                bus.write(addr, out);
                self.adc(out);
            }
            Op::Sax => bus.write(addr, self.a & self.x),
            Op::Slo => {
                let value = bus.read(addr);
                let out = self.asl(value);
                bus.write(addr, out);
                self.a |= out;
                self.update_zn(self.a);
            }
            Op::Sre => {
                let value = bus.read(addr);
                let out = self.lsr(value);
                bus.write(addr, out);
                self.a ^= out;
                self.update_zn(self.a);
            }
            Op::Stp => self.stopped = true,

            // Unstable subset: decoded and cycle-accounted, executed as NOP
            Op::Ahx | Op::Las | Op::Shx | Op::Shy | Op::Tas | Op::Xaa => {}
        }
    }

    /// Format the instruction at `addr` without disturbing bus state.
    pub fn disassemble(&self, bus: &Bus, addr: u16) -> String {
        let opcode = bus.peek(addr);
        let instruction = &INSTRUCTIONS[opcode as usize];
        let mnemonic = instruction.mnemonic;
        let b1 = bus.peek(addr.wrapping_add(1));
        let b2 = bus.peek(addr.wrapping_add(2));
        let word = ((b2 as u16) << 8) | b1 as u16;

        match instruction.mode {
            Mode::Implied => format!("{opcode:02X}        {mnemonic}"),
            Mode::Immediate => format!("{opcode:02X} {b1:02X}     {mnemonic} #${b1:02X}"),
            Mode::ZeroPage => format!("{opcode:02X} {b1:02X}     {mnemonic} ${b1:02X}"),
            Mode::ZeroPageX => format!("{opcode:02X} {b1:02X}     {mnemonic} ${b1:02X},X"),
            Mode::ZeroPageY => format!("{opcode:02X} {b1:02X}     {mnemonic} ${b1:02X},Y"),
            Mode::Relative => {
                let target = addr.wrapping_add(2).wrapping_add(b1 as i8 as u16);
                format!("{opcode:02X} {b1:02X}     {mnemonic} ${target:04X}")
            }
            Mode::IndirectX => format!("{opcode:02X} {b1:02X}     {mnemonic} (${b1:02X},X)"),
            Mode::IndirectY => format!("{opcode:02X} {b1:02X}     {mnemonic} (${b1:02X}),Y"),
            Mode::Indirect => format!("{opcode:02X} {b1:02X} {b2:02X}  {mnemonic} (${word:04X})"),
            Mode::Absolute => format!("{opcode:02X} {b1:02X} {b2:02X}  {mnemonic} ${word:04X}"),
            Mode::AbsoluteX => format!("{opcode:02X} {b1:02X} {b2:02X}  {mnemonic} ${word:04X},X"),
            Mode::AbsoluteY => format!("{opcode:02X} {b1:02X} {b2:02X}  {mnemonic} ${word:04X},Y"),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
