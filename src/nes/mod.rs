pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod config;
pub mod cpu;
pub mod error;
pub mod interrupt;
pub mod mapper;
pub mod opcodes;
pub mod ppu;

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;

use bus::SystemBus;
use cartridge::Cartridge;
use config::{Config, Timing};
use cpu::{Cpu, Registers};
use interrupt::Interrupt;
use mapper::Mapper;
use ppu::PpuDebugCounters;

pub use bus::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP,
};
pub use error::{Fault, LoadError};

const MAX_DEBUG_EVENTS: usize = 512;
const MAX_QUEUED_AUDIO_BATCHES: usize = 32;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NesDebugCounters {
    pub instructions: u64,
    pub cpu_cycles: u64,
    pub stall_cycles: u64,
    pub frames: u64,
    pub nmis_serviced: u64,
    pub irqs_serviced: u64,
    pub irqs_masked: u64,
    pub resets: u64,
    pub oam_dmas: u64,
    pub dmc_fetches: u64,
    pub audio_batches: u64,
    pub audio_batches_dropped: u64,
}

/// The console: CPU plus everything on its bus, advanced one instruction at a time.
pub struct Nes {
    cpu: Cpu,
    bus: SystemBus,
    timing: Timing,
    sample_rate: u64,
    audio_batch_len: usize,

    // Master-clock remainders carried between steps.
    ppu_cycles: u64,
    apu_cycles: u64,
    sample_cycles: u64,
    // Charged to the next step (interrupt entry).
    pending_master_cycles: u64,

    frame_ready: bool,
    audio_batch: Vec<f32>,
    audio_batches: VecDeque<Vec<f32>>,
    halted: Option<Fault>,
    debug: NesDebugCounters,
    debug_events: VecDeque<String>,
}

impl Nes {
    pub fn new(cart: Cartridge, config: &Config) -> Result<Self, LoadError> {
        config.validate()?;
        let timing = config.timing();
        let mapper = Mapper::new(cart)?;
        let mapper_label = format!("{} (mapper {})", mapper.name(), mapper.number());

        let mut bus = SystemBus::new(mapper, &timing);
        let mut cpu = Cpu::new();
        cpu.power_up(&mut bus);

        let mut nes = Self {
            cpu,
            bus,
            timing,
            sample_rate: config.sample_rate as u64,
            audio_batch_len: config.audio_batch_len,
            ppu_cycles: 0,
            apu_cycles: 0,
            sample_cycles: 0,
            pending_master_cycles: 0,
            frame_ready: false,
            audio_batch: Vec::with_capacity(config.audio_batch_len),
            audio_batches: VecDeque::new(),
            halted: None,
            debug: NesDebugCounters::default(),
            debug_events: VecDeque::with_capacity(MAX_DEBUG_EVENTS),
        };
        info!("loaded {mapper_label}, {:?} timing", config.region);
        nes.push_debug_event(format!(
            "power up: {mapper_label}, PC=${:04X}",
            nes.cpu.pc()
        ));
        Ok(nes)
    }

    pub fn from_rom(image: Vec<u8>, config: &Config) -> Result<Self, LoadError> {
        let cart = Cartridge::from_bytes(image)?;
        Self::new(cart, config)
    }

    /// Executes one CPU instruction and runs the PPU/APU for the time it took.
    /// Returns the CPU cycles consumed, stalls included.
    pub fn step(&mut self) -> Result<u32, Fault> {
        if let Some(fault) = &self.halted {
            return Err(fault.clone());
        }

        let cycles = match self.cpu.step(&mut self.bus) {
            Ok(cycles) => cycles,
            Err(fault) => return Err(self.halt(fault)),
        };
        if let Some(fault) = self.bus.take_fault() {
            return Err(self.halt(fault));
        }

        let stall = self.bus.take_stall_cycles();
        let cpu_cycles = cycles as u64 + stall;
        let master = cpu_cycles * self.timing.cpu_divider
            + std::mem::take(&mut self.pending_master_cycles);
        self.debug.instructions = self.debug.instructions.wrapping_add(1);
        self.debug.cpu_cycles = self.debug.cpu_cycles.wrapping_add(cpu_cycles);
        self.debug.stall_cycles = self.debug.stall_cycles.wrapping_add(stall);

        self.advance(master);
        if let Some(fault) = self.bus.take_fault() {
            return Err(self.halt(fault));
        }

        self.resolve_interrupt();
        Ok(cpu_cycles as u32)
    }

    pub fn run_frame(&mut self) -> Result<(), Fault> {
        self.frame_ready = false;
        while !self.frame_ready {
            self.step()?;
        }
        Ok(())
    }

    pub fn run_until_audio_batch(&mut self) -> Result<Vec<f32>, Fault> {
        loop {
            if let Some(batch) = self.audio_batches.pop_front() {
                return Ok(batch);
            }
            self.step()?;
        }
    }

    pub fn take_audio_batch(&mut self) -> Option<Vec<f32>> {
        self.audio_batches.pop_front()
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.ppu.frame_buffer()
    }

    pub fn set_controller_state(&mut self, port: usize, buttons: u8) {
        self.bus.set_controller(port, buttons);
    }

    pub fn request_reset(&mut self) {
        self.bus.interrupts.raise(Interrupt::Reset);
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.halted.as_ref()
    }

    pub fn registers(&self) -> Registers {
        self.cpu.registers()
    }

    pub fn peek_ram(&self, addr: u16) -> u8 {
        self.bus.peek_ram(addr)
    }

    pub fn mapper_name(&self) -> &'static str {
        self.bus.mapper.name()
    }

    pub fn debug_mapper_state(&self) -> String {
        self.bus.mapper.debug_state()
    }

    pub fn debug_ppu_position(&self) -> (i16, i16) {
        self.bus.ppu.position()
    }

    pub fn debug_ppu_regs(&self) -> (u8, u8, u8) {
        self.bus.ppu.debug_regs()
    }

    pub fn debug_counters(&self) -> NesDebugCounters {
        let mut counters = self.debug;
        counters.oam_dmas = self.bus.oam_dma_count;
        counters.dmc_fetches = self.bus.dmc_fetch_count;
        counters
    }

    pub fn debug_ppu_counters(&self) -> PpuDebugCounters {
        self.bus.ppu.debug_counters()
    }

    pub fn debug_recent_events(&self, limit: usize) -> Vec<String> {
        self.debug_events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    fn push_debug_event<S: Into<String>>(&mut self, event: S) {
        let event = event.into();
        debug!("{event}");
        if self.debug_events.len() >= MAX_DEBUG_EVENTS {
            self.debug_events.pop_front();
        }
        self.debug_events.push_back(event);
    }

    fn halt(&mut self, fault: Fault) -> Fault {
        warn!("emulation halted: {fault}");
        self.push_debug_event(format!(
            "halted at PC=${:04X}: {fault}",
            self.cpu.pc()
        ));
        self.halted = Some(fault.clone());
        fault
    }

    fn advance(&mut self, master: u64) {
        self.ppu_cycles += master;
        while self.ppu_cycles >= self.timing.ppu_divider {
            self.ppu_cycles -= self.timing.ppu_divider;
            self.bus.tick_ppu();
            if self.bus.ppu.take_frame_ready() {
                self.frame_ready = true;
                self.debug.frames = self.debug.frames.wrapping_add(1);
            }
        }

        self.apu_cycles += master;
        while self.apu_cycles >= self.timing.apu_divider {
            self.apu_cycles -= self.timing.apu_divider;
            self.bus.tick_apu();
        }
        self.bus.poll_irq_lines();

        self.sample_cycles += master * self.sample_rate;
        while self.sample_cycles >= self.timing.master_clock_hz {
            self.sample_cycles -= self.timing.master_clock_hz;
            self.push_audio_sample();
        }
    }

    fn push_audio_sample(&mut self) {
        let sample = self.bus.apu.output() as f32 / 128.0 - 1.0;
        self.audio_batch.push(sample);
        if self.audio_batch.len() < self.audio_batch_len {
            return;
        }

        let batch = std::mem::replace(
            &mut self.audio_batch,
            Vec::with_capacity(self.audio_batch_len),
        );
        if self.audio_batches.len() >= MAX_QUEUED_AUDIO_BATCHES {
            self.audio_batches.pop_front();
            self.debug.audio_batches_dropped = self.debug.audio_batches_dropped.wrapping_add(1);
        }
        self.audio_batches.push_back(batch);
        self.debug.audio_batches = self.debug.audio_batches.wrapping_add(1);
    }

    fn resolve_interrupt(&mut self) {
        match self.bus.interrupts.take() {
            Interrupt::Reset => {
                self.cpu.reset(&mut self.bus);
                self.bus.apu.reset();
                self.debug.resets = self.debug.resets.wrapping_add(1);
                self.push_debug_event(format!("reset, PC=${:04X}", self.cpu.pc()));
            }
            Interrupt::Nmi => {
                self.cpu.nmi(&mut self.bus);
                self.pending_master_cycles += self.timing.nmi_entry_cycles * self.timing.cpu_divider;
                self.debug.nmis_serviced = self.debug.nmis_serviced.wrapping_add(1);
            }
            Interrupt::IrqBrk => {
                if self.cpu.irq(&mut self.bus) {
                    self.debug.irqs_serviced = self.debug.irqs_serviced.wrapping_add(1);
                } else {
                    self.debug.irqs_masked = self.debug.irqs_masked.wrapping_add(1);
                }
            }
            Interrupt::None | Interrupt::CancelNmi => {}
        }
    }
}
