use crate::traits::BusInterface;
use rvnum_core::{alu, mdu, shifter, Bits};

/// `jal x0, 0`: an instruction that jumps to itself, treated as a halt.
pub const HALT_INSTRUCTION: u32 = 0x0000_006F;

const OPCODE_OP: u32 = 0x33;
const OPCODE_OP_IMM: u32 = 0x13;
const OPCODE_LOAD: u32 = 0x03;
const OPCODE_STORE: u32 = 0x23;
const OPCODE_BRANCH: u32 = 0x63;
const OPCODE_JAL: u32 = 0x6F;
const OPCODE_JALR: u32 = 0x67;
const OPCODE_LUI: u32 = 0x37;
const OPCODE_AUIPC: u32 = 0x17;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "bincode", derive(bincode::Encode, bincode::Decode))]
pub struct Registers {
    x: [u32; 32],
    pub pc: u32,
}

impl Registers {
    pub fn new() -> Self {
        Self { x: [0; 32], pc: 0 }
    }

    /// x0 is hardwired to zero.
    pub fn read(&self, index: usize) -> u32 {
        if index == 0 { 0 } else { self.x[index] }
    }

    pub fn write(&mut self, index: usize, value: u32) {
        if index != 0 {
            self.x[index] = value;
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "bincode", derive(bincode::Encode, bincode::Decode))]
pub struct Rv32Cpu {
    registers: Registers,
    running: bool,
    step_count: u64,
}

impl Rv32Cpu {
    pub fn new() -> Self {
        Self { registers: Registers::new(), running: true, step_count: 0 }
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Fetch, decode, and execute one instruction.
    pub fn step<B: BusInterface>(&mut self, bus: &mut B) {
        let instruction = bus.fetch(self.registers.pc);
        self.step_count += 1;

        if instruction == 0 || instruction == HALT_INSTRUCTION {
            log::trace!("halt at pc={:08X}", self.registers.pc);
            self.running = false;
            return;
        }

        let fields = decode_fields(instruction);
        log::trace!(
            "pc={:08X} instruction={instruction:08X} opcode={:02X}",
            self.registers.pc,
            fields.opcode
        );

        let mut next_pc = self.registers.pc.wrapping_add(4);
        let rs1_value = self.registers.read(fields.rs1);
        let rs2_value = self.registers.read(fields.rs2);

        match fields.opcode {
            OPCODE_OP => {
                let result =
                    execute_register_op(fields.funct3, fields.funct7, rs1_value, rs2_value);
                match result {
                    Some(value) => self.registers.write(fields.rd, value),
                    None => log::warn!("unimplemented R-type instruction {instruction:08X}"),
                }
            }
            OPCODE_OP_IMM => {
                let imm = imm_i(instruction);
                let result = execute_immediate_op(fields.funct3, instruction, rs1_value, imm);
                match result {
                    Some(value) => self.registers.write(fields.rd, value),
                    None => log::warn!("unimplemented I-type instruction {instruction:08X}"),
                }
            }
            OPCODE_LOAD => {
                // Only LW in this subset.
                if fields.funct3 == 0x2 {
                    let address = rs1_value.wrapping_add(imm_i(instruction));
                    self.registers.write(fields.rd, bus.load_word(address));
                }
            }
            OPCODE_STORE => {
                if fields.funct3 == 0x2 {
                    let address = rs1_value.wrapping_add(imm_s(instruction));
                    bus.store_word(address, rs2_value);
                }
            }
            OPCODE_BRANCH => {
                let taken = match fields.funct3 {
                    0x0 => rs1_value == rs2_value,
                    0x1 => rs1_value != rs2_value,
                    _ => false,
                };
                if taken {
                    next_pc = self.registers.pc.wrapping_add(imm_b(instruction));
                }
            }
            OPCODE_JAL => {
                self.registers.write(fields.rd, self.registers.pc.wrapping_add(4));
                next_pc = self.registers.pc.wrapping_add(imm_j(instruction));
            }
            OPCODE_JALR => {
                self.registers.write(fields.rd, self.registers.pc.wrapping_add(4));
                next_pc = rs1_value.wrapping_add(imm_i(instruction)) & !1;
            }
            OPCODE_LUI => {
                self.registers.write(fields.rd, imm_u(instruction));
            }
            OPCODE_AUIPC => {
                self.registers.write(fields.rd, self.registers.pc.wrapping_add(imm_u(instruction)));
            }
            _ => {
                log::warn!("unknown opcode {:02X}; stopping", fields.opcode);
                self.running = false;
            }
        }

        self.registers.pc = next_pc;
    }

    /// Run until halt or `max_steps` instructions, whichever comes first.
    pub fn run<B: BusInterface>(&mut self, bus: &mut B, max_steps: u64) {
        while self.running && self.step_count < max_steps {
            self.step(bus);
        }
    }
}

impl Default for Rv32Cpu {
    fn default() -> Self {
        Self::new()
    }
}

fn execute_register_op(funct3: u32, funct7: u32, rs1: u32, rs2: u32) -> Option<u32> {
    let a = to_bits(rs1);
    let b = to_bits(rs2);
    let shamt = (rs2 & 0x1F) as usize;

    let result = match (funct3, funct7) {
        (0x0, 0x00) => from_bits(&alu::alu_add(&a, &b).0),
        (0x0, 0x20) => from_bits(&alu::alu_sub(&a, &b).0),
        (0x1, 0x00) => from_bits(&shifter::sll(&a, shamt)),
        (0x5, 0x00) => from_bits(&shifter::srl(&a, shamt)),
        (0x5, 0x20) => from_bits(&shifter::sra(&a, shamt)),
        (0x4, 0x00) => rs1 ^ rs2,
        (0x6, 0x00) => rs1 | rs2,
        (0x7, 0x00) => rs1 & rs2,
        // M extension: the MDU does the heavy lifting.
        (0x0, 0x01) => from_bits(&mdu::mul_low(&a, &b).0),
        (0x1, 0x01) => from_bits(&mdu::mulh(&a, &b)),
        (0x2, 0x01) => from_bits(&mdu::mulhsu(&a, &b)),
        (0x3, 0x01) => from_bits(&mdu::mulhu(&a, &b)),
        (0x4, 0x01) => from_bits(&mdu::div(&a, &b).0),
        (0x5, 0x01) => from_bits(&mdu::divu(&a, &b).0),
        (0x6, 0x01) => from_bits(&mdu::rem(&a, &b).0),
        (0x7, 0x01) => from_bits(&mdu::remu(&a, &b).0),
        _ => return None,
    };
    Some(result)
}

fn execute_immediate_op(funct3: u32, instruction: u32, rs1: u32, imm: u32) -> Option<u32> {
    let a = to_bits(rs1);
    let shamt = (imm & 0x1F) as usize;

    let result = match funct3 {
        0x0 => from_bits(&alu::alu_add(&a, &to_bits(imm)).0),
        0x4 => rs1 ^ imm,
        0x6 => rs1 | imm,
        0x7 => rs1 & imm,
        0x1 => from_bits(&shifter::sll(&a, shamt)),
        0x5 => match (instruction >> 30) & 0x1 {
            0 => from_bits(&shifter::srl(&a, shamt)),
            _ => from_bits(&shifter::sra(&a, shamt)),
        },
        _ => return None,
    };
    Some(result)
}

struct Fields {
    opcode: u32,
    rd: usize,
    funct3: u32,
    rs1: usize,
    rs2: usize,
    funct7: u32,
}

fn decode_fields(instruction: u32) -> Fields {
    Fields {
        opcode: instruction & 0x7F,
        rd: ((instruction >> 7) & 0x1F) as usize,
        funct3: (instruction >> 12) & 0x7,
        rs1: ((instruction >> 15) & 0x1F) as usize,
        rs2: ((instruction >> 20) & 0x1F) as usize,
        funct7: (instruction >> 25) & 0x7F,
    }
}

fn sign_extend(value: u32, bits: u32) -> u32 {
    let sign_bit = 1 << (bits - 1);
    if value & sign_bit != 0 { value | !((1 << bits) - 1) } else { value }
}

fn imm_i(instruction: u32) -> u32 {
    sign_extend((instruction >> 20) & 0xFFF, 12)
}

fn imm_s(instruction: u32) -> u32 {
    let low = (instruction >> 7) & 0x1F;
    let high = (instruction >> 25) & 0x7F;
    sign_extend((high << 5) | low, 12)
}

fn imm_b(instruction: u32) -> u32 {
    let bit_11 = (instruction >> 7) & 0x1;
    let bits_4_1 = (instruction >> 8) & 0xF;
    let bits_10_5 = (instruction >> 25) & 0x3F;
    let bit_12 = (instruction >> 31) & 0x1;
    sign_extend((bit_12 << 12) | (bit_11 << 11) | (bits_10_5 << 5) | (bits_4_1 << 1), 13)
}

fn imm_u(instruction: u32) -> u32 {
    instruction & 0xFFFF_F000
}

fn imm_j(instruction: u32) -> u32 {
    let bit_20 = (instruction >> 31) & 0x1;
    let bits_10_1 = (instruction >> 21) & 0x3FF;
    let bit_11 = (instruction >> 20) & 0x1;
    let bits_19_12 = (instruction >> 12) & 0xFF;
    sign_extend((bit_20 << 20) | (bits_19_12 << 12) | (bit_11 << 11) | (bits_10_1 << 1), 21)
}

fn to_bits(value: u32) -> Bits {
    let mut bits = Bits::zeros(32);
    for i in 0..32 {
        bits.set_bit(31 - i, ((value >> i) & 1) as u8);
    }
    bits
}

fn from_bits(bits: &Bits) -> u32 {
    bits.as_slice().iter().fold(0, |acc, &b| (acc << 1) | u32::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32) -> u32 {
        (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | OPCODE_OP
    }

    fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (((imm as u32) & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0x0, rd, OPCODE_OP_IMM)
    }

    fn s_type(rs2: u32, rs1: u32, imm: i32) -> u32 {
        let imm = (imm as u32) & 0xFFF;
        ((imm >> 5) << 25) | (rs2 << 20) | (rs1 << 15) | (0x2 << 12) | ((imm & 0x1F) << 7)
            | OPCODE_STORE
    }

    fn run_program(program: Vec<u32>) -> (Rv32Cpu, InMemoryBus) {
        let mut bus = InMemoryBus::new(program);
        let mut cpu = Rv32Cpu::new();
        cpu.run(&mut bus, 10_000);
        (cpu, bus)
    }

    #[test]
    fn add_and_sub_through_the_alu() {
        let (cpu, _) = run_program(vec![
            addi(1, 0, 5),
            addi(2, 0, 7),
            r_type(0x00, 2, 1, 0x0, 3), // add x3, x1, x2
            r_type(0x20, 2, 3, 0x0, 4), // sub x4, x3, x2
            HALT_INSTRUCTION,
        ]);
        assert_eq!(cpu.registers().read(3), 12);
        assert_eq!(cpu.registers().read(4), 5);
    }

    #[test]
    fn addi_sign_extends_negative_immediates() {
        let (cpu, _) = run_program(vec![addi(1, 0, -7), HALT_INSTRUCTION]);
        assert_eq!(cpu.registers().read(1), 0xFFFF_FFF9);
    }

    #[test]
    fn x0_ignores_writes() {
        let (cpu, _) = run_program(vec![addi(0, 0, 123), HALT_INSTRUCTION]);
        assert_eq!(cpu.registers().read(0), 0);
    }

    #[test]
    fn shifts_match_the_core_shifter() {
        let (cpu, _) = run_program(vec![
            addi(1, 0, -1),                       // x1 = 0xFFFFFFFF
            i_type(4, 1, 0x1, 2, OPCODE_OP_IMM),  // slli x2, x1, 4
            i_type(4, 1, 0x5, 3, OPCODE_OP_IMM),  // srli x3, x1, 4
            i_type(0x404, 1, 0x5, 4, OPCODE_OP_IMM), // srai x4, x1, 4
            HALT_INSTRUCTION,
        ]);
        assert_eq!(cpu.registers().read(2), 0xFFFF_FFF0);
        assert_eq!(cpu.registers().read(3), 0x0FFF_FFFF);
        assert_eq!(cpu.registers().read(4), 0xFFFF_FFFF);
    }

    #[test]
    fn m_extension_delegates_to_the_mdu() {
        let (cpu, _) = run_program(vec![
            addi(1, 0, -7),
            addi(2, 0, 3),
            r_type(0x01, 2, 1, 0x0, 3), // mul x3, x1, x2
            r_type(0x01, 2, 1, 0x4, 4), // div x4, x1, x2
            r_type(0x01, 2, 1, 0x6, 5), // rem x5, x1, x2
            HALT_INSTRUCTION,
        ]);
        assert_eq!(cpu.registers().read(3), 0xFFFF_FFEB); // -21
        assert_eq!(cpu.registers().read(4), 0xFFFF_FFFE); // -2
        assert_eq!(cpu.registers().read(5), 0xFFFF_FFFF); // -1
    }

    #[test]
    fn divide_by_zero_follows_riscv_semantics() {
        let (cpu, _) = run_program(vec![
            addi(1, 0, 42),
            r_type(0x01, 0, 1, 0x4, 2), // div x2, x1, x0
            r_type(0x01, 0, 1, 0x6, 3), // rem x3, x1, x0
            HALT_INSTRUCTION,
        ]);
        assert_eq!(cpu.registers().read(2), 0xFFFF_FFFF);
        assert_eq!(cpu.registers().read(3), 42);
    }

    #[test]
    fn load_store_round_trip() {
        let (cpu, bus) = run_program(vec![
            addi(1, 0, 0x100),
            addi(2, 0, 77),
            s_type(2, 1, 8),                    // sw x2, 8(x1)
            i_type(8, 1, 0x2, 3, OPCODE_LOAD),  // lw x3, 8(x1)
            HALT_INSTRUCTION,
        ]);
        assert_eq!(cpu.registers().read(3), 77);
        assert_eq!(bus.data_region(0x108, 1), vec![(0x108, 77)]);
    }

    #[test]
    fn branch_skips_when_taken() {
        // beq x1, x1 forward over the addi that would set x2.
        let beq = (0x0 << 25) | (1 << 20) | (1 << 15) | (0x0 << 12) | (8 << 7) | OPCODE_BRANCH;
        let (cpu, _) = run_program(vec![
            addi(1, 0, 1),
            beq,
            addi(2, 0, 99),
            HALT_INSTRUCTION,
        ]);
        assert_eq!(cpu.registers().read(2), 0);
    }

    #[test]
    fn jal_links_and_jumps() {
        // jal x1, +8 skips one instruction.
        let jal = 0x0080_0000 | (1 << 7) | OPCODE_JAL;
        let (cpu, _) = run_program(vec![
            jal,
            addi(2, 0, 99),
            HALT_INSTRUCTION,
        ]);
        assert_eq!(cpu.registers().read(1), 4);
        assert_eq!(cpu.registers().read(2), 0);
    }

    #[test]
    fn lui_and_auipc() {
        let lui = (0x12345 << 12) | (1 << 7) | OPCODE_LUI;
        let auipc = (0x1 << 12) | (2 << 7) | OPCODE_AUIPC;
        let (cpu, _) = run_program(vec![lui, auipc, HALT_INSTRUCTION]);
        assert_eq!(cpu.registers().read(1), 0x1234_5000);
        assert_eq!(cpu.registers().read(2), 0x0000_1004);
    }

    #[test]
    fn halts_on_zero_word() {
        let (cpu, _) = run_program(vec![addi(1, 0, 1)]);
        assert!(!cpu.is_running());
        assert_eq!(cpu.registers().read(1), 1);
    }
}
