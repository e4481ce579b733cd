use log::{debug, trace};

use super::cartridge::{CHR_PAGE_SIZE, Cartridge};
use super::error::{Fault, LoadError};

pub const SRAM_SIZE: usize = 0x2000;
const CHR_RAM_PAGES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    OneScreenLower,
    OneScreenUpper,
}

impl Mirroring {
    pub fn nametable_offset(self, addr: u16) -> usize {
        let table = match self {
            Mirroring::Horizontal => (addr >> 11) & 1,
            Mirroring::Vertical => (addr >> 10) & 1,
            Mirroring::OneScreenLower => 0,
            Mirroring::OneScreenUpper => 1,
        };
        ((table as usize) << 10) | (addr as usize & 0x03FF)
    }
}

pub fn mapper_name(number: u8) -> &'static str {
    match number {
        0 => "NROM",
        1 => "MMC1",
        2 => "UxROM",
        3 => "CNROM",
        4 => "MMC3",
        _ => "Unsupported",
    }
}

#[derive(Debug, Clone)]
struct Mmc1 {
    shift_register: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
}

impl Mmc1 {
    fn new() -> Self {
        Self {
            shift_register: 0x10,
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
        }
    }

    fn write(&mut self, addr: u16, value: u8) -> bool {
        if (value & 0x80) != 0 {
            self.shift_register = 0x10;
            self.control |= 0x0C;
            return true;
        }

        let commit = (self.shift_register & 0x01) != 0;
        self.shift_register >>= 1;
        self.shift_register |= (value & 0x01) << 4;

        if !commit {
            return false;
        }

        let data = self.shift_register;
        match addr {
            0x8000..=0x9FFF => self.control = data,
            0xA000..=0xBFFF => self.chr_bank0 = data,
            0xC000..=0xDFFF => self.chr_bank1 = data,
            _ => self.prg_bank = data & 0x0F,
        }
        self.shift_register = 0x10;
        true
    }

    fn mirroring(&self) -> Mirroring {
        match self.control & 0x03 {
            0 => Mirroring::OneScreenLower,
            1 => Mirroring::OneScreenUpper,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    fn layout(&self, last_prg: usize, chr_ram: bool) -> ([usize; 4], [usize; 8]) {
        let bank = self.prg_bank as usize * 2;
        let prg = match (self.control >> 2) & 0x03 {
            0 | 1 => consecutive((self.prg_bank & 0x0E) as usize * 2),
            2 => [0, 1, bank, bank + 1],
            _ => [bank, bank + 1, last_prg - 1, last_prg],
        };

        // CHR-RAM boards reuse the upper CHR bank lines for PRG/RAM selection.
        let (lo, hi) = if chr_ram {
            (self.chr_bank0 & 0x01, self.chr_bank1 & 0x01)
        } else {
            (self.chr_bank0, self.chr_bank1)
        };
        let chr = if (self.control & 0x10) == 0 {
            consecutive((lo & 0x1E) as usize * 4)
        } else {
            let low: [usize; 4] = consecutive(lo as usize * 4);
            let high: [usize; 4] = consecutive(hi as usize * 4);
            join(low, high)
        };
        (prg, chr)
    }
}

#[derive(Debug, Clone)]
struct Mmc3 {
    bank_select: u8,
    bank_regs: [u8; 8],
    mirroring: Mirroring,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
}

impl Mmc3 {
    fn new(mirroring: Mirroring) -> Self {
        Self {
            bank_select: 0,
            bank_regs: [0; 8],
            mirroring,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        let even = (addr & 1) == 0;
        match (addr, even) {
            (0x8000..=0x9FFF, true) => self.bank_select = value,
            (0x8000..=0x9FFF, false) => {
                let target = (self.bank_select & 0x07) as usize;
                self.bank_regs[target] = if target >= 6 { value & 0x3F } else { value };
            }
            (0xA000..=0xBFFF, true) => {
                self.mirroring = if (value & 1) == 0 {
                    Mirroring::Vertical
                } else {
                    Mirroring::Horizontal
                };
            }
            // PRG-RAM protect; SRAM stays open.
            (0xA000..=0xBFFF, false) => {}
            (0xC000..=0xDFFF, true) => self.irq_latch = value,
            (0xC000..=0xDFFF, false) => {
                self.irq_counter = 0;
                self.irq_reload = true;
            }
            (_, true) => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            (_, false) => self.irq_enabled = true,
        }
    }

    fn layout(&self, last_prg: usize) -> ([usize; 4], [usize; 8]) {
        let reg = |i: usize| self.bank_regs[i] as usize;
        let second_last = last_prg - 1;
        let prg = if (self.bank_select & 0x40) == 0 {
            [reg(6), reg(7), second_last, last_prg]
        } else {
            [second_last, reg(7), reg(6), last_prg]
        };

        let r0 = reg(0) & !1;
        let r1 = reg(1) & !1;
        let two_k = [r0, r0 + 1, r1, r1 + 1];
        let one_k = [reg(2), reg(3), reg(4), reg(5)];
        let chr = if (self.bank_select & 0x80) == 0 {
            join(two_k, one_k)
        } else {
            join(one_k, two_k)
        };
        (prg, chr)
    }

    fn clock_irq_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }

        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }
}

#[derive(Debug, Clone)]
enum Board {
    Nrom,
    Mmc1(Mmc1),
    Uxrom { bank: u8 },
    Cnrom { bank: u8 },
    Mmc3(Mmc3),
}

fn consecutive<const N: usize>(base: usize) -> [usize; N] {
    std::array::from_fn(|i| base + i)
}

fn join(low: [usize; 4], high: [usize; 4]) -> [usize; 8] {
    std::array::from_fn(|i| if i < 4 { low[i] } else { high[i - 4] })
}

/// Cartridge banking logic: four 8KB PRG windows and eight 1KB CHR windows,
/// each an index into the cartridge's pages.
#[derive(Debug, Clone)]
pub struct Mapper {
    cart: Cartridge,
    chr_ram: Option<Vec<u8>>,
    sram: Vec<u8>,
    prg_windows: [usize; 4],
    chr_windows: [usize; 8],
    board: Board,
}

impl Mapper {
    pub fn new(cart: Cartridge) -> Result<Self, LoadError> {
        let board = match cart.mapper_number() {
            0 => Board::Nrom,
            1 => Board::Mmc1(Mmc1::new()),
            2 => Board::Uxrom { bank: 0 },
            3 => Board::Cnrom { bank: 0 },
            4 => Board::Mmc3(Mmc3::new(cart.mirroring())),
            other => return Err(LoadError::UnsupportedMapper(other)),
        };

        let prg_pages = cart.prg_page_count();
        if prg_pages < 2 {
            return Err(LoadError::MissingPrg {
                required: 2,
                found: prg_pages,
            });
        }

        let chr_ram = if cart.chr_page_count() == 0 {
            Some(vec![0; CHR_RAM_PAGES * CHR_PAGE_SIZE])
        } else {
            None
        };

        debug!(
            "mapper {} ({}): {} PRG pages, {} CHR pages{}",
            cart.mapper_number(),
            mapper_name(cart.mapper_number()),
            prg_pages,
            cart.chr_page_count(),
            if chr_ram.is_some() { " (CHR-RAM)" } else { "" }
        );

        Ok(Self {
            prg_windows: [0, 1, prg_pages - 2, prg_pages - 1],
            chr_windows: consecutive(0),
            chr_ram,
            sram: vec![0; SRAM_SIZE],
            board,
            cart,
        })
    }

    pub fn number(&self) -> u8 {
        self.cart.mapper_number()
    }

    pub fn name(&self) -> &'static str {
        mapper_name(self.cart.mapper_number())
    }

    pub fn mirroring(&self) -> Mirroring {
        match &self.board {
            Board::Mmc1(mmc1) => mmc1.mirroring(),
            Board::Mmc3(mmc3) => mmc3.mirroring,
            _ => self.cart.mirroring(),
        }
    }

    pub fn prg_windows(&self) -> [usize; 4] {
        self.prg_windows
    }

    pub fn chr_windows(&self) -> [usize; 8] {
        self.chr_windows
    }

    fn chr_page_count(&self) -> usize {
        if self.chr_ram.is_some() {
            CHR_RAM_PAGES
        } else {
            self.cart.chr_page_count()
        }
    }

    pub fn read_prg(&self, addr: u16) -> u8 {
        let page = self.prg_windows[(addr as usize >> 13) & 0x03];
        self.cart.prg_page(page)[addr as usize & 0x1FFF]
    }

    pub fn read_chr(&self, addr: u16) -> u8 {
        let page = self.chr_windows[(addr as usize >> 10) & 0x07];
        let offset = addr as usize & 0x03FF;
        match &self.chr_ram {
            Some(ram) => ram[page * CHR_PAGE_SIZE + offset],
            None => self.cart.chr_page(page)[offset],
        }
    }

    pub fn write_chr(&mut self, addr: u16, value: u8) -> Result<(), Fault> {
        let page = self.chr_windows[(addr as usize >> 10) & 0x07];
        match &mut self.chr_ram {
            Some(ram) => {
                ram[page * CHR_PAGE_SIZE + (addr as usize & 0x03FF)] = value;
                Ok(())
            }
            None => Err(Fault::ChrRomWrite { addr, value }),
        }
    }

    pub fn read_sram(&self, addr: u16) -> u8 {
        self.sram[addr as usize & (SRAM_SIZE - 1)]
    }

    pub fn write_sram(&mut self, addr: u16, value: u8) {
        self.sram[addr as usize & (SRAM_SIZE - 1)] = value;
    }

    pub fn write_register(&mut self, addr: u16, value: u8) -> Result<(), Fault> {
        match &mut self.board {
            Board::Nrom => {
                trace!("ignoring NROM write ${value:02X} -> ${addr:04X}");
                return Ok(());
            }
            Board::Mmc1(mmc1) => {
                if !mmc1.write(addr, value) {
                    return Ok(());
                }
            }
            Board::Uxrom { bank } | Board::Cnrom { bank } => *bank = value,
            Board::Mmc3(mmc3) => mmc3.write(addr, value),
        }
        self.remap()
    }

    fn remap(&mut self) -> Result<(), Fault> {
        let prg_count = self.cart.prg_page_count();
        let last_prg = prg_count - 1;
        let (prg, chr) = match &self.board {
            Board::Nrom => return Ok(()),
            Board::Mmc1(mmc1) => mmc1.layout(last_prg, self.chr_ram.is_some()),
            Board::Uxrom { bank } => {
                let base = *bank as usize * 2;
                ([base, base + 1, last_prg - 1, last_prg], self.chr_windows)
            }
            Board::Cnrom { bank } => (self.prg_windows, consecutive(*bank as usize * 8)),
            Board::Mmc3(mmc3) => mmc3.layout(last_prg),
        };

        if let Some(&page) = prg.iter().find(|&&page| page >= prg_count) {
            return Err(Fault::BankOutOfRange {
                kind: "PRG",
                page,
                available: prg_count,
            });
        }
        let chr_count = self.chr_page_count();
        if let Some(&page) = chr.iter().find(|&&page| page >= chr_count) {
            return Err(Fault::BankOutOfRange {
                kind: "CHR",
                page,
                available: chr_count,
            });
        }

        self.prg_windows = prg;
        self.chr_windows = chr;
        Ok(())
    }

    pub fn clock_scanline(&mut self) {
        if let Board::Mmc3(mmc3) = &mut self.board {
            mmc3.clock_irq_counter();
        }
    }

    pub fn irq_pending(&self) -> bool {
        match &self.board {
            Board::Mmc3(mmc3) => mmc3.irq_pending,
            _ => false,
        }
    }

    pub fn debug_state(&self) -> String {
        format!(
            "{} prg={:?} chr={:?} mirroring={:?}",
            self.name(),
            self.prg_windows,
            self.chr_windows,
            self.mirroring()
        )
    }
}
