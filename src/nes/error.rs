use thiserror::Error;

/// Reasons a cartridge image (or the console configuration) is rejected
/// before emulation starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("invalid iNES header magic, expected NES<EOF>")]
    BadSignature,
    #[error("ROM image holds only a header and no PRG/CHR data")]
    HeaderOnly,
    #[error("ROM length mismatch: header describes {expected} bytes, image has {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("mapper {0} is not supported")]
    UnsupportedMapper(u8),
    #[error("no PRG-ROM found: mapper needs at least {required} 8KB pages, image has {found}")]
    MissingPrg { required: usize, found: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Fatal conditions hit while the console is running. Emulation halts on
/// the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("unknown opcode ${opcode:02X} at ${pc:04X}")]
    UnknownOpcode { opcode: u8, pc: u16 },
    #[error("read from unmapped address ${0:04X}")]
    UnmappedRead(u16),
    #[error("write of ${value:02X} to unmapped address ${addr:04X}")]
    UnmappedWrite { addr: u16, value: u8 },
    #[error("read from write-only PPU register ${0:04X}")]
    WriteOnlyRegister(u16),
    #[error("write of ${value:02X} to CHR-ROM at ${addr:04X}")]
    ChrRomWrite { addr: u16, value: u8 },
    #[error("{kind} bank {page} selected but cartridge only has {available} pages")]
    BankOutOfRange {
        kind: &'static str,
        page: usize,
        available: usize,
    },
    #[error("no cartridge loaded")]
    NoCartridge,
}
