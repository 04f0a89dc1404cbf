use std::error;
use std::fmt;

pub mod parse;

pub type Byte = u8; // 1 byte
pub type Word = u16; // addresses

/// The LS-8 address space: 256 byte-wide cells
pub type Ls8Mem = Memory<256>;

/// Access outside the address space. Carries the offending address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryError {
    pub address: usize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "address 0x{:02x} is outside memory", self.address)
    }
}

impl error::Error for MemoryError {}

/// Emulates memory for use with the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memory<const S: usize> {
    /// The actual data of the memory
    pub data: [Byte; S],
}

impl<const S: usize> Default for Memory<S> {
    /// Initializes the memory, all cells zeroed
    fn default() -> Self {
        Memory { data: [0; S] }
    }
}

impl<const S: usize> Memory<S> {
    /// Reads a byte from the memory
    pub fn read_byte(&self, position: Word) -> Result<Byte, MemoryError> {
        self.data
            .get(position as usize)
            .copied()
            .ok_or(MemoryError {
                address: position as usize,
            })
    }

    /// Writes a byte to the memory
    pub fn write_byte(&mut self, position: Word, value: Byte) -> Result<(), MemoryError> {
        match self.data.get_mut(position as usize) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(MemoryError {
                address: position as usize,
            }),
        }
    }

    /// Reads a byte without faulting; out-of-range reads yield zero.
    /// Only for diagnostics.
    pub fn peek(&self, position: Word) -> Byte {
        self.data.get(position as usize).copied().unwrap_or(0)
    }

    /// Writes an array of bytes to the memory
    pub fn write_array(&mut self, position: Word, data: &[Byte]) -> Result<(), MemoryError> {
        let start = position as usize;
        let end = start + data.len();
        if end > S {
            return Err(MemoryError { address: end - 1 });
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Copies a program image verbatim into memory starting at address 0
    pub fn load_image(&mut self, image: &[Byte]) -> Result<(), MemoryError> {
        self.write_array(0, image)
    }

    /// Dumps the populated prefix of memory to the log
    pub fn dump(&self) {
        let used = self
            .data
            .iter()
            .rposition(|&byte| byte != 0)
            .map_or(0, |i| i + 1);
        for (address, byte) in self.data[..used].iter().enumerate() {
            log::debug!("0x{:02x}: {:08b}", address, byte);
        }
    }
}

/// Writes a block of instructions directly into the memory
#[macro_export]
macro_rules! write_instructions {
    ( $mem:ident : $pos:expr => $( $byte:expr ),+ $(,)? ) => {
        $mem.write_array($pos, &[
            $(
                $byte as $crate::memory::Byte,
            )+
        ])
    };
}

#[cfg(test)]
mod tests {
    use crate::processor::Instruction;

    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_read_byte() -> Result<()> {
        let mut mem = Ls8Mem::default();
        mem.data[0x2] = 0x12;
        assert_eq!(mem.read_byte(0x2)?, 0x12);

        Ok(())
    }

    #[test]
    fn test_write_byte() -> Result<()> {
        let mut mem = Ls8Mem::default();
        mem.write_byte(0x44, 12)?;
        assert_eq!(mem.data[0x44], 12);

        Ok(())
    }

    #[test]
    fn test_read_out_of_range() {
        let mem = Ls8Mem::default();
        assert_eq!(mem.read_byte(256), Err(MemoryError { address: 256 }));
    }

    #[test]
    fn test_write_out_of_range() {
        let mut mem = Ls8Mem::default();
        assert_eq!(mem.write_byte(300, 1), Err(MemoryError { address: 300 }));
    }

    #[test]
    fn test_peek_never_faults() {
        let mem = Ls8Mem::default();
        assert_eq!(mem.peek(0xFFFF), 0);
    }

    #[test]
    fn test_write_array() -> Result<()> {
        let mut mem = Ls8Mem::default();
        mem.write_array(0x44, &[0x12, 0x34, 0x56, 0x78])?;
        assert_eq!(mem.data[0x44], 0x12);
        assert_eq!(mem.data[0x45], 0x34);
        assert_eq!(mem.data[0x46], 0x56);
        assert_eq!(mem.data[0x47], 0x78);

        Ok(())
    }

    #[test]
    fn test_write_array_past_end() {
        let mut mem = Ls8Mem::default();
        assert_eq!(
            mem.write_array(0xFE, &[1, 2, 3]),
            Err(MemoryError { address: 0x100 })
        );
    }

    #[test]
    fn test_load_image() -> Result<()> {
        let mut mem = Ls8Mem::default();
        mem.load_image(&[0b10000010, 0, 8])?;
        assert_eq!(mem.data[0], 0b10000010);
        assert_eq!(mem.data[1], 0);
        assert_eq!(mem.data[2], 8);

        Ok(())
    }

    #[test]
    fn test_load_image_too_large() {
        let mut mem: Memory<4> = Memory::default();
        assert!(mem.load_image(&[0; 5]).is_err());
    }

    #[test]
    fn test_write_instructions() -> Result<()> {
        let mut mem = Ls8Mem::default();

        mem.write_array(
            0,
            &[
                Instruction::LDI as Byte,
                0,
                8,
                Instruction::PRN as Byte,
                0,
                Instruction::HLT as Byte,
            ],
        )?;

        let mut mem2 = Ls8Mem::default();
        use crate::processor::Instruction::*;
        write_instructions!(mem2 : 0 => LDI, 0, 8, PRN, 0, HLT)?;

        assert_eq!(mem, mem2);

        Ok(())
    }
}
