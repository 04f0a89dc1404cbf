use std::convert::TryFrom;
use std::error;
use std::fmt;

use crate::memory::{Byte, Memory, MemoryError, Word};
use log::*;
use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

/// Register index reserved for the stack pointer
pub const SP: usize = 7;
/// Initial stack pointer value; the stack grows toward lower addresses
pub const SP_INIT: Byte = 0xF4;

/// Flag bit set by CMP when reg[a] < reg[b]
pub const FL_LT: Byte = 0b100;
/// Flag bit set by CMP when reg[a] > reg[b]
pub const FL_GT: Byte = 0b010;
/// Flag bit set by CMP when reg[a] == reg[b]
pub const FL_EQ: Byte = 0b001;

/// A terminal execution fault. The machine has no supervisor to trap to,
/// so every fault ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The byte at PC is not an assigned opcode
    UnknownOpcode { opcode: Byte, address: Word },
    /// An operand named a register outside the register file
    Register { index: Byte },
    /// An address left the 0..256 range
    Memory(MemoryError),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnknownOpcode { opcode, address } => write!(
                f,
                "unknown instruction 0b{:08b} at address 0x{:02x}",
                opcode, address
            ),
            Fault::Register { index } => write!(f, "no register R{}", index),
            Fault::Memory(err) => err.fmt(f),
        }
    }
}

impl error::Error for Fault {}

impl From<MemoryError> for Fault {
    fn from(err: MemoryError) -> Self {
        Fault::Memory(err)
    }
}

/// Operations the ALU implements. CMP lives here because it reads both
/// register operands like the arithmetic ops, writing FL instead of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Mul,
    Cmp,
}

/// Emulates the LS-8 CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Processor {
    /// Program counter
    pub pc: Word,
    /// Flags register, written only by CMP
    pub fl: Byte,
    /// General-purpose registers; reg[SP] holds the stack pointer
    pub reg: [Byte; 8],
    /// Cleared by HLT. The run loop's condition.
    pub running: bool,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor {
    /// Initializes a new CPU with PC at address 0
    pub fn new() -> Self {
        let mut reg = [0; 8];
        reg[SP] = SP_INIT;
        Self {
            pc: 0,
            fl: 0,
            reg,
            running: true,
        }
    }

    fn reg(&self, index: Byte) -> Result<Byte, Fault> {
        self.reg
            .get(index as usize)
            .copied()
            .ok_or(Fault::Register { index })
    }

    fn reg_mut(&mut self, index: Byte) -> Result<&mut Byte, Fault> {
        self.reg
            .get_mut(index as usize)
            .ok_or(Fault::Register { index })
    }

    fn push<const S: usize>(&mut self, value: Byte, memory: &mut Memory<S>) -> Result<(), Fault> {
        self.reg[SP] = self.reg[SP].wrapping_sub(1);
        memory.write_byte(self.reg[SP] as Word, value)?;
        Ok(())
    }

    fn pop<const S: usize>(&mut self, memory: &Memory<S>) -> Result<Byte, Fault> {
        let value = memory.read_byte(self.reg[SP] as Word)?;
        self.reg[SP] = self.reg[SP].wrapping_add(1);
        Ok(value)
    }

    /// Performs an ALU operation on two register operands. Arithmetic
    /// results wrap modulo 256; CMP sets exactly one flag bit.
    pub fn alu(&mut self, op: AluOp, a: Byte, b: Byte) -> Result<(), Fault> {
        let lhs = self.reg(a)?;
        let rhs = self.reg(b)?;

        match op {
            AluOp::Add => *self.reg_mut(a)? = lhs.wrapping_add(rhs),
            AluOp::Mul => *self.reg_mut(a)? = lhs.wrapping_mul(rhs),
            AluOp::Cmp => {
                self.fl = if lhs < rhs {
                    FL_LT
                } else if lhs > rhs {
                    FL_GT
                } else {
                    FL_EQ
                };
            }
        }

        Ok(())
    }

    /// Executes a single decoded instruction. Instructions whose opcode
    /// carries the sets-PC bit leave PC at the next address themselves;
    /// for all others [`Processor::step`] performs the standard advance.
    pub fn execute_instruction<const S: usize>(
        &mut self,
        instruction: Instruction,
        operands: [Byte; 2],
        memory: &mut Memory<S>,
    ) -> Result<(), Fault> {
        let [a, b] = operands;

        match instruction {
            Instruction::HLT => {
                self.running = false;

                debug!("HLT");
            }
            Instruction::LDI => {
                *self.reg_mut(a)? = b;

                debug!("LDI R{} {}", a, b);
            }
            Instruction::PRN => {
                let value = self.reg(a)?;
                println!("{}", value);

                debug!("PRN R{}", a);
            }
            Instruction::ADD => {
                self.alu(AluOp::Add, a, b)?;

                debug!("ADD R{} R{}: {}", a, b, self.reg[a as usize]);
            }
            Instruction::MUL => {
                self.alu(AluOp::Mul, a, b)?;

                debug!("MUL R{} R{}: {}", a, b, self.reg[a as usize]);
            }
            Instruction::CMP => {
                self.alu(AluOp::Cmp, a, b)?;

                debug!("CMP R{} R{}: FL={:03b}", a, b, self.fl);
            }
            Instruction::PUSH => {
                let value = self.reg(a)?;
                self.push(value, memory)?;

                debug!("PUSH R{} ({})", a, value);
            }
            Instruction::POP => {
                let value = self.pop(memory)?;
                *self.reg_mut(a)? = value;

                debug!("POP R{} ({})", a, value);
            }
            Instruction::CALL => {
                let ret = self.pc + 2;
                let ret = Byte::try_from(ret).map_err(|_| {
                    Fault::Memory(MemoryError {
                        address: ret as usize,
                    })
                })?;
                self.push(ret, memory)?;
                self.pc = self.reg(a)? as Word;

                debug!("CALL R{} -> 0x{:02x}", a, self.pc);
            }
            Instruction::RET => {
                self.pc = self.pop(memory)? as Word;

                debug!("RET -> 0x{:02x}", self.pc);
            }
            Instruction::JMP => {
                self.pc = self.reg(a)? as Word;

                debug!("JMP -> 0x{:02x}", self.pc);
            }
            Instruction::JEQ => {
                // CMP sets exactly one flag bit, so "equal" is the EQ bit
                // being set and nothing else needs consulting
                if self.fl & FL_EQ != 0 {
                    self.pc = self.reg(a)? as Word;
                    debug!("JEQ taken -> 0x{:02x}", self.pc);
                } else {
                    self.pc += 2;
                    debug!("JEQ not taken");
                }
            }
            Instruction::JNE => {
                // "not equal" is the EQ bit being clear; there is no
                // dedicated not-equal bit
                if self.fl & FL_EQ == 0 {
                    self.pc = self.reg(a)? as Word;
                    debug!("JNE taken -> 0x{:02x}", self.pc);
                } else {
                    self.pc += 2;
                    debug!("JNE not taken");
                }
            }
        }

        Ok(())
    }

    /// Runs one fetch-decode-execute step
    pub fn step<const S: usize>(&mut self, memory: &mut Memory<S>) -> Result<(), Fault> {
        self.trace(memory);

        let pc = self.pc;
        let opcode = memory.read_byte(pc)?;
        let instruction = Instruction::try_from(opcode)
            .map_err(|_| Fault::UnknownOpcode { opcode, address: pc })?;

        // Fixed operand buffer; only the bytes the opcode declares are fetched
        let mut operands = [0; 2];
        for (offset, operand) in operands
            .iter_mut()
            .enumerate()
            .take(instruction.operands() as usize)
        {
            *operand = memory.read_byte(pc + 1 + offset as Word)?;
        }

        self.execute_instruction(instruction, operands, memory)?;

        if !instruction.sets_pc() {
            self.pc = pc + 1 + instruction.operands() as Word;
        }

        Ok(())
    }

    /// Runs the program until HLT clears the running flag or a step faults
    pub fn run<const S: usize>(&mut self, memory: &mut Memory<S>) -> Result<(), Fault> {
        while self.running {
            self.step(memory)?;
        }

        debug!("program halted at 0x{:02x}", self.pc);

        Ok(())
    }

    /// Logs one line of machine state: PC, the three bytes at PC and the
    /// register file, all in hex. Reads past the end of memory show as zero
    /// so tracing the last instruction cannot itself fault.
    pub fn trace<const S: usize>(&self, memory: &Memory<S>) {
        debug!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} | {:02X} {:02X} {:02X} {:02X} {:02X} {:02X} {:02X} {:02X}",
            self.pc,
            memory.peek(self.pc),
            memory.peek(self.pc + 1),
            memory.peek(self.pc + 2),
            self.reg[0],
            self.reg[1],
            self.reg[2],
            self.reg[3],
            self.reg[4],
            self.reg[5],
            self.reg[6],
            self.reg[7],
        );
    }
}

macro_rules! instructions {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal , )+ ) => {
        /// The LS-8 instruction set. The opcode byte encodes the
        /// instruction's shape: bits 7-6 are the operand count, bit 5 marks
        /// ALU-family operations, bit 4 marks instructions that set PC
        /// themselves, and bits 3-0 identify the instruction.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Instruction {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Instruction {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }
        }

        impl ::std::fmt::Display for Instruction {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( Self::$name => f.write_str(stringify!($name)) , )+
                }
            }
        }
    }
}

instructions! {
    /// Stop execution
    HLT = 0b00000001,
    /// Pop a return address into PC
    RET = 0b00010001,
    /// Load an immediate value into a register
    /// @param a The target register
    /// @param b The value
    LDI = 0b10000010,
    /// Push a register onto the stack
    /// @param a The source register
    PUSH = 0b01000101,
    /// Pop the top of the stack into a register
    /// @param a The target register
    POP = 0b01000110,
    /// Print a register's value in decimal
    /// @param a The source register
    PRN = 0b01000111,
    /// Push the return address and jump to the address in a register
    /// @param a The register holding the subroutine address
    CALL = 0b01010000,
    /// Jump to the address in a register
    /// @param a The register holding the target address
    JMP = 0b01010100,
    /// Jump if the equal flag is set
    /// @param a The register holding the target address
    JEQ = 0b01010101,
    /// Jump if the equal flag is clear
    /// @param a The register holding the target address
    JNE = 0b01010110,
    /// Add two registers into the first (mod 256)
    /// @param a The target register
    /// @param b The other operand register
    ADD = 0b10100000,
    /// Multiply two registers into the first (mod 256)
    /// @param a The target register
    /// @param b The other operand register
    MUL = 0b10100010,
    /// Compare two registers and set FL
    /// @param a The left operand register
    /// @param b The right operand register
    CMP = 0b10100111,
}

impl Instruction {
    /// Number of operand bytes following the opcode (bits 7-6)
    pub fn operands(self) -> Byte {
        (u8::from(self) >> 6) & 0b11
    }

    /// Whether dispatch routes through the ALU family (bit 5)
    pub fn is_alu(self) -> bool {
        u8::from(self) & 0b0010_0000 != 0
    }

    /// Whether the instruction sets PC itself, suppressing the standard
    /// advance (bit 4)
    pub fn sets_pc(self) -> bool {
        u8::from(self) & 0b0001_0000 != 0
    }
}
