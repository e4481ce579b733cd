use log::{trace, warn};

use super::apu::Apu;
use super::config::Timing;
use super::cpu::Bus;
use super::error::Fault;
use super::interrupt::{Interrupt, InterruptLatch};
use super::mapper::Mapper;
use super::ppu::Ppu;

pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;
pub const BUTTON_UP: u8 = 0x10;
pub const BUTTON_DOWN: u8 = 0x20;
pub const BUTTON_LEFT: u8 = 0x40;
pub const BUTTON_RIGHT: u8 = 0x80;

const RAM_SIZE: usize = 0x800;
const OAM_DMA_CYCLES: u64 = 513;
const DMC_FETCH_CYCLES: u64 = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct Controller {
    buttons: u8,
    shift: u8,
    reads: u8,
    strobe: bool,
}

impl Controller {
    pub fn set_buttons(&mut self, buttons: u8) {
        self.buttons = buttons;
        if self.strobe {
            self.latch();
        }
    }

    pub fn buttons(&self) -> u8 {
        self.buttons
    }

    fn write_strobe(&mut self, value: u8) {
        self.strobe = (value & 0x01) != 0;
        if self.strobe {
            self.latch();
        }
    }

    fn latch(&mut self) {
        self.shift = self.buttons;
        self.reads = 0;
    }

    // Bit 0 carries the button; the upper bits are open bus.
    fn read(&mut self) -> u8 {
        let bit = if self.strobe {
            self.buttons & 0x01
        } else if self.reads >= 8 {
            0x01
        } else {
            let out = self.shift & 0x01;
            self.shift >>= 1;
            self.reads += 1;
            out
        };
        0x40 | bit
    }
}

pub struct SystemBus {
    ram: [u8; RAM_SIZE],
    pub(crate) ppu: Ppu,
    pub(crate) apu: Apu,
    pub(crate) mapper: Mapper,
    pub(crate) interrupts: InterruptLatch,
    controllers: [Controller; 2],

    stall_cycles: u64,
    fault: Option<Fault>,
    pub(crate) oam_dma_count: u64,
    pub(crate) dmc_fetch_count: u64,
}

impl SystemBus {
    pub fn new(mapper: Mapper, timing: &Timing) -> Self {
        Self {
            ram: [0; RAM_SIZE],
            ppu: Ppu::new(timing),
            apu: Apu::new(),
            mapper,
            interrupts: InterruptLatch::default(),
            controllers: [Controller::default(); 2],
            stall_cycles: 0,
            fault: None,
            oam_dma_count: 0,
            dmc_fetch_count: 0,
        }
    }

    pub fn set_controller(&mut self, port: usize, buttons: u8) {
        match self.controllers.get_mut(port) {
            Some(controller) => controller.set_buttons(buttons),
            None => warn!("ignoring input for controller port {port}"),
        }
    }

    pub fn peek_ram(&self, addr: u16) -> u8 {
        self.ram[addr as usize & (RAM_SIZE - 1)]
    }

    pub fn take_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    pub fn take_stall_cycles(&mut self) -> u64 {
        std::mem::take(&mut self.stall_cycles)
    }

    pub fn tick_ppu(&mut self) {
        self.ppu.tick(&mut self.mapper, &mut self.interrupts);
    }

    pub fn tick_apu(&mut self) {
        self.apu.tick();
        if let Some(addr) = self.apu.pending_dmc_fetch() {
            let value = self.read_byte(addr);
            self.apu.complete_dmc_fetch(value);
            self.stall_cycles += DMC_FETCH_CYCLES;
            self.dmc_fetch_count = self.dmc_fetch_count.wrapping_add(1);
        }
    }

    pub fn poll_irq_lines(&mut self) {
        if self.apu.irq_pending() || self.mapper.irq_pending() {
            self.interrupts.raise(Interrupt::IrqBrk);
        }
    }

    fn record_fault(&mut self, fault: Fault) {
        if self.fault.is_none() {
            warn!("bus fault: {fault}");
            self.fault = Some(fault);
        }
    }

    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        let mut bytes = [0u8; 256];
        for (offset, slot) in bytes.iter_mut().enumerate() {
            *slot = self.read_byte(base.wrapping_add(offset as u16));
        }
        self.ppu.write_oam_dma(&bytes);
        self.stall_cycles += OAM_DMA_CYCLES;
        self.oam_dma_count = self.oam_dma_count.wrapping_add(1);
        trace!("OAM DMA from ${base:04X}");
    }
}

impl Bus for SystemBus {
    fn read_byte(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[addr as usize & (RAM_SIZE - 1)],
            0x2000..=0x3FFF => {
                match self
                    .ppu
                    .cpu_read_register(addr, &self.mapper, &mut self.interrupts)
                {
                    Ok(value) => value,
                    Err(fault) => {
                        self.record_fault(fault);
                        0
                    }
                }
            }
            0x4015 => self.apu.read_status(),
            0x4016 => self.controllers[0].read(),
            0x4017 => self.controllers[1].read(),
            0x4000..=0x401F => 0,
            0x4020..=0x5FFF => {
                self.record_fault(Fault::UnmappedRead(addr));
                0
            }
            0x6000..=0x7FFF => self.mapper.read_sram(addr),
            0x8000..=0xFFFF => self.mapper.read_prg(addr),
        }
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        let result = match addr {
            0x0000..=0x1FFF => {
                self.ram[addr as usize & (RAM_SIZE - 1)] = value;
                Ok(())
            }
            0x2000..=0x3FFF => {
                self.ppu
                    .cpu_write_register(addr, value, &mut self.mapper, &mut self.interrupts)
            }
            0x4014 => {
                self.oam_dma(value);
                Ok(())
            }
            0x4016 => {
                for controller in &mut self.controllers {
                    controller.write_strobe(value);
                }
                Ok(())
            }
            0x4000..=0x4013 | 0x4015 | 0x4017 => {
                self.apu.write_register(addr, value);
                Ok(())
            }
            0x4018..=0x5FFF => Err(Fault::UnmappedWrite { addr, value }),
            0x6000..=0x7FFF => {
                self.mapper.write_sram(addr, value);
                Ok(())
            }
            0x8000..=0xFFFF => self.mapper.write_register(addr, value),
        };
        if let Err(fault) = result {
            self.record_fault(fault);
        }
    }

    fn raise_interrupt(&mut self, kind: Interrupt) {
        self.interrupts.raise(kind);
    }
}
