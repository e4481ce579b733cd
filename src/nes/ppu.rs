use log::trace;
use serde::Serialize;

use super::config::Timing;
use super::error::Fault;
use super::interrupt::{Interrupt, InterruptLatch};
use super::mapper::Mapper;

pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;
pub const PIXELS_PER_SCANLINE: i16 = 341;
const FRAME_PIXELS: usize = FRAME_WIDTH * FRAME_HEIGHT;

const CTRL_NMI_ENABLE: u8 = 0x80;
const CTRL_VRAM_INC_32: u8 = 0x04;
const CTRL_SPRITE_TABLE: u8 = 0x08;
const CTRL_BG_TABLE: u8 = 0x10;
const CTRL_SPRITE_SIZE_16: u8 = 0x20;

const MASK_SHOW_BG_LEFT: u8 = 0x02;
const MASK_SHOW_SPRITE_LEFT: u8 = 0x04;
const MASK_SHOW_BG: u8 = 0x08;
const MASK_SHOW_SPRITES: u8 = 0x10;
const MASK_RENDERING: u8 = MASK_SHOW_BG | MASK_SHOW_SPRITES;

const STATUS_SPRITE_OVERFLOW: u8 = 0x20;
const STATUS_SPRITE_ZERO_HIT: u8 = 0x40;
const STATUS_VBLANK: u8 = 0x80;

// Sprite pixel buffer bits on top of the 4-bit palette index.
const SPRITE_ZERO_STENCIL: u8 = 0x40;
const SPRITE_BEHIND_BG: u8 = 0x80;

const MMC3_CLOCK_PIXEL: i16 = 260;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PpuDebugCounters {
    pub ticks: u64,
    pub frames: u64,
    pub vblank_entries: u64,
    pub nmi_raised: u64,
    pub nmi_cancelled: u64,
    pub vblank_suppressed: u64,
    pub sprite0_hits: u64,
    pub sprite_overflows: u64,
    pub status_reads: u64,
}

pub struct Ppu {
    ctrl: u8,
    mask: u8,
    in_vblank: bool,
    sprite_zero_hit: bool,
    sprite_overflow: bool,
    nmi_inhibit: bool,

    oam_addr: u8,
    oam: [u8; 256],
    nametables: [u8; 0x800],
    palette: [u8; 32],

    v: u16,
    t: u16,
    write_toggle: bool,
    read_buffer: u8,
    fine_x: u8,
    fine_y: u8,
    temp_fine_x: u8,
    temp_fine_y: u8,

    scanline: i16,
    pixel: i16,
    frame_count: u64,
    total_scanlines: i16,
    vblank_scanline: i16,
    odd_frame_skip: bool,

    sprite_pixels: Box<[u8; FRAME_PIXELS]>,
    sprites_per_line: [u8; FRAME_HEIGHT],
    attribute_cache: [u8; 0x800],

    screen: Box<[u8; FRAME_PIXELS]>,
    frame_ready: bool,

    debug: PpuDebugCounters,
}

impl Ppu {
    pub fn new(timing: &Timing) -> Self {
        Self {
            ctrl: 0,
            mask: 0,
            in_vblank: false,
            sprite_zero_hit: false,
            sprite_overflow: false,
            nmi_inhibit: false,
            oam_addr: 0,
            oam: [0; 256],
            nametables: [0; 0x800],
            palette: [0; 32],
            v: 0,
            t: 0,
            write_toggle: false,
            read_buffer: 0,
            fine_x: 0,
            fine_y: 0,
            temp_fine_x: 0,
            temp_fine_y: 0,
            scanline: timing.vblank_scanline,
            pixel: 0,
            frame_count: 0,
            total_scanlines: timing.total_scanlines,
            vblank_scanline: timing.vblank_scanline,
            odd_frame_skip: timing.odd_frame_skip,
            sprite_pixels: Box::new([0; FRAME_PIXELS]),
            sprites_per_line: [0; FRAME_HEIGHT],
            attribute_cache: [0; 0x800],
            screen: Box::new([0; FRAME_PIXELS]),
            frame_ready: false,
            debug: PpuDebugCounters::default(),
        }
    }

    /// Palette indices (0-63), row-major.
    pub fn frame_buffer(&self) -> &[u8] {
        &self.screen[..]
    }

    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn position(&self) -> (i16, i16) {
        (self.scanline, self.pixel)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn in_vblank(&self) -> bool {
        self.in_vblank
    }

    pub fn debug_regs(&self) -> (u8, u8, u8) {
        (self.ctrl, self.mask, self.status_bits())
    }

    pub fn debug_counters(&self) -> PpuDebugCounters {
        self.debug
    }

    fn rendering_enabled(&self) -> bool {
        (self.mask & MASK_RENDERING) != 0
    }

    fn status_bits(&self) -> u8 {
        let mut status = 0;
        if self.in_vblank {
            status |= STATUS_VBLANK;
        }
        if self.sprite_zero_hit {
            status |= STATUS_SPRITE_ZERO_HIT;
        }
        if self.sprite_overflow {
            status |= STATUS_SPRITE_OVERFLOW;
        }
        status
    }

    pub fn cpu_read_register(
        &mut self,
        addr: u16,
        mapper: &Mapper,
        interrupts: &mut InterruptLatch,
    ) -> Result<u8, Fault> {
        match 0x2000 | (addr & 0x0007) {
            0x2002 => Ok(self.read_status(interrupts)),
            0x2004 => Ok(self.oam[self.oam_addr as usize]),
            0x2007 => Ok(self.read_data(mapper)),
            reg => Err(Fault::WriteOnlyRegister(reg)),
        }
    }

    fn read_status(&mut self, interrupts: &mut InterruptLatch) -> u8 {
        self.debug.status_reads = self.debug.status_reads.wrapping_add(1);

        if self.scanline == self.vblank_scanline - 1 && self.pixel == PIXELS_PER_SCANLINE - 1 {
            // One dot early: the flag reads clear and will not be set this frame.
            self.in_vblank = false;
            self.nmi_inhibit = true;
            self.debug.vblank_suppressed = self.debug.vblank_suppressed.wrapping_add(1);
        } else if self.scanline == self.vblank_scanline && self.pixel <= 1 && !self.nmi_inhibit {
            self.in_vblank = true;
            self.nmi_inhibit = true;
            if self.pixel == 1 {
                interrupts.raise(Interrupt::CancelNmi);
                self.debug.nmi_cancelled = self.debug.nmi_cancelled.wrapping_add(1);
            }
        }

        let status = self.status_bits();
        self.in_vblank = false;
        self.write_toggle = false;
        status
    }

    fn read_data(&mut self, mapper: &Mapper) -> u8 {
        let addr = self.v & 0x3FFF;
        let value = if addr >= 0x3F00 {
            // Palette reads bypass the buffer, which picks up the nametable byte underneath.
            self.read_buffer = self.nametables[mapper.mirroring().nametable_offset(addr)];
            self.palette[palette_index(addr)]
        } else {
            let buffered = self.read_buffer;
            self.read_buffer = self.read_vram(addr, mapper);
            buffered
        };
        self.increment_vram_address();
        value
    }

    fn read_vram(&self, addr: u16, mapper: &Mapper) -> u8 {
        match addr & 0x3FFF {
            0x0000..=0x1FFF => mapper.read_chr(addr),
            0x2000..=0x3EFF => self.nametables[mapper.mirroring().nametable_offset(addr)],
            other => self.palette[palette_index(other)],
        }
    }

    pub fn cpu_write_register(
        &mut self,
        addr: u16,
        value: u8,
        mapper: &mut Mapper,
        interrupts: &mut InterruptLatch,
    ) -> Result<(), Fault> {
        match 0x2000 | (addr & 0x0007) {
            0x2000 => self.write_ctrl(value, interrupts),
            0x2001 => self.mask = value,
            0x2002 => trace!("ignoring write ${value:02X} to PPU status"),
            0x2003 => self.oam_addr = value,
            0x2004 => {
                self.oam[self.oam_addr as usize] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            0x2005 => {
                if !self.write_toggle {
                    self.t = (self.t & 0xFFE0) | (value as u16 >> 3);
                    self.temp_fine_x = value & 0x07;
                } else {
                    self.t = (self.t & 0xFC1F) | ((value as u16 & 0xF8) << 2);
                    self.temp_fine_y = value & 0x07;
                }
                self.write_toggle = !self.write_toggle;
            }
            0x2006 => {
                if !self.write_toggle {
                    self.t = (self.t & 0x00FF) | ((value as u16 & 0x3F) << 8);
                } else {
                    self.t = (self.t & 0xFF00) | value as u16;
                    self.v = self.t & 0x3FFF;
                }
                self.write_toggle = !self.write_toggle;
            }
            _ => {
                self.write_data(value, mapper)?;
            }
        }
        Ok(())
    }

    fn write_ctrl(&mut self, value: u8, interrupts: &mut InterruptLatch) {
        let enabling = (value & CTRL_NMI_ENABLE) != 0 && (self.ctrl & CTRL_NMI_ENABLE) == 0;
        // Enabling NMI inside VBlank fires one, except on the final dot of VBlank.
        let last_vblank_dot =
            self.scanline == self.total_scanlines - 2 && self.pixel == PIXELS_PER_SCANLINE - 1;
        if enabling && self.in_vblank && !last_vblank_dot && !self.nmi_inhibit {
            interrupts.raise(Interrupt::Nmi);
            self.debug.nmi_raised = self.debug.nmi_raised.wrapping_add(1);
        }
        if (value & CTRL_NMI_ENABLE) == 0 && self.scanline == self.vblank_scanline && self.pixel == 1
        {
            interrupts.raise(Interrupt::CancelNmi);
            self.debug.nmi_cancelled = self.debug.nmi_cancelled.wrapping_add(1);
        }

        self.ctrl = value;
        self.t = (self.t & 0xF3FF) | ((value as u16 & 0x03) << 10);
    }

    fn write_data(&mut self, value: u8, mapper: &mut Mapper) -> Result<(), Fault> {
        let addr = self.v & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => mapper.write_chr(addr, value)?,
            0x2000..=0x3EFF => {
                self.nametables[mapper.mirroring().nametable_offset(addr)] = value;
            }
            _ => self.palette[palette_index(addr)] = value,
        }
        self.increment_vram_address();
        Ok(())
    }

    fn increment_vram_address(&mut self) {
        let step = if (self.ctrl & CTRL_VRAM_INC_32) != 0 {
            32
        } else {
            1
        };
        self.v = self.v.wrapping_add(step) & 0x3FFF;
    }

    pub fn write_oam_dma(&mut self, bytes: &[u8; 256]) {
        for (i, &byte) in bytes.iter().enumerate() {
            let index = self.oam_addr.wrapping_add(i as u8);
            self.oam[index as usize] = byte;
        }
    }

    pub fn tick(&mut self, mapper: &mut Mapper, interrupts: &mut InterruptLatch) {
        self.debug.ticks = self.debug.ticks.wrapping_add(1);

        if self.scanline == self.vblank_scanline && self.pixel == 0 && !self.nmi_inhibit {
            self.in_vblank = true;
            self.debug.vblank_entries = self.debug.vblank_entries.wrapping_add(1);
            if (self.ctrl & CTRL_NMI_ENABLE) != 0 {
                interrupts.raise(Interrupt::Nmi);
                self.debug.nmi_raised = self.debug.nmi_raised.wrapping_add(1);
            }
            self.frame_ready = true;
            self.debug.frames = self.debug.frames.wrapping_add(1);
        }

        if (0..FRAME_HEIGHT as i16).contains(&self.scanline) && self.pixel < FRAME_WIDTH as i16 {
            if self.pixel == 0 {
                self.begin_scanline();
            }
            let color = self.render_pixel(mapper);
            let index = self.scanline as usize * FRAME_WIDTH + self.pixel as usize;
            self.screen[index] = color;
        }

        if self.pixel == MMC3_CLOCK_PIXEL
            && self.scanline < FRAME_HEIGHT as i16
            && self.rendering_enabled()
        {
            mapper.clock_scanline();
        }

        self.pixel += 1;
        if self.odd_frame_skip
            && self.pixel == 337
            && self.scanline == -1
            && (self.frame_count & 1) == 0
            && (self.mask & MASK_SHOW_BG) != 0
        {
            self.pixel += 1;
        }
        if self.pixel >= PIXELS_PER_SCANLINE {
            self.pixel = 0;
            self.scanline += 1;
            if self.scanline == self.total_scanlines - 1 {
                self.scanline = -1;
            }
        }

        if self.scanline == -1 && self.pixel == 0 {
            self.end_vblank(mapper);
        }
    }

    fn end_vblank(&mut self, mapper: &Mapper) {
        self.in_vblank = false;
        self.sprite_zero_hit = false;
        self.sprite_overflow = false;
        self.nmi_inhibit = false;
        self.prepare_sprites(mapper);
        self.frame_count = self.frame_count.wrapping_add(1);

        if self.rendering_enabled() {
            self.v = self.t;
        }
    }

    fn begin_scanline(&mut self) {
        if !self.rendering_enabled() {
            return;
        }

        self.v = (self.v & 0xFBE0) | (self.t & 0x041F);
        self.fine_x = self.temp_fine_x;
        if self.scanline == 0 {
            self.fine_y = self.temp_fine_y;
            self.expand_attribute_table();
        }

        if !self.sprite_overflow && self.sprites_per_line[self.scanline as usize] > 8 {
            self.sprite_overflow = true;
            self.debug.sprite_overflows = self.debug.sprite_overflows.wrapping_add(1);
        }
    }

    fn render_pixel(&mut self, mapper: &Mapper) -> u8 {
        if !self.rendering_enabled() {
            return self.palette[0] & 0x3F;
        }

        let x = self.pixel as usize;
        let sprite = if (self.mask & MASK_SHOW_SPRITES) != 0
            && (x >= 8 || (self.mask & MASK_SHOW_SPRITE_LEFT) != 0)
        {
            self.sprite_pixels[self.scanline as usize * FRAME_WIDTH + x]
        } else {
            0
        };
        let background = if (self.mask & MASK_SHOW_BG) != 0
            && (x >= 8 || (self.mask & MASK_SHOW_BG_LEFT) != 0)
        {
            self.background_pixel(mapper)
        } else {
            0
        };

        let sprite_opaque = (sprite & 0x03) != 0;
        let background_opaque = (background & 0x03) != 0;
        let index = match (background_opaque, sprite_opaque) {
            (true, true) => {
                if (sprite & SPRITE_ZERO_STENCIL) != 0 && x != 255 && !self.sprite_zero_hit {
                    self.sprite_zero_hit = true;
                    self.debug.sprite0_hits = self.debug.sprite0_hits.wrapping_add(1);
                }
                if (sprite & SPRITE_BEHIND_BG) != 0 {
                    background as usize
                } else {
                    0x10 | (sprite & 0x0F) as usize
                }
            }
            (false, true) => 0x10 | (sprite & 0x0F) as usize,
            (true, false) => background as usize,
            (false, false) => 0,
        };

        if (self.mask & MASK_SHOW_BG) != 0 {
            self.advance_scroll();
        }

        self.palette[index] & 0x3F
    }

    fn background_pixel(&self, mapper: &Mapper) -> u8 {
        let offset = mapper
            .mirroring()
            .nametable_offset(0x2000 | (self.v & 0x0FFF));
        let tile = self.nametables[offset] as u16;
        let table = if (self.ctrl & CTRL_BG_TABLE) != 0 {
            0x1000
        } else {
            0
        };
        let addr = table + tile * 16 + self.fine_y as u16;
        let shift = 7 - self.fine_x;
        let low = (mapper.read_chr(addr) >> shift) & 0x01;
        let high = (mapper.read_chr(addr + 8) >> shift) & 0x01;
        let color = low | (high << 1);
        if color == 0 {
            0
        } else {
            self.attribute_cache[offset] | color
        }
    }

    fn advance_scroll(&mut self) {
        if self.fine_x == 7 {
            self.fine_x = 0;
            if (self.v & 0x001F) == 31 {
                self.v &= !0x001F;
                self.v ^= 0x0400;
            } else {
                self.v += 1;
            }
        } else {
            self.fine_x += 1;
        }

        if self.pixel != FRAME_WIDTH as i16 - 1 {
            return;
        }
        if self.fine_y < 7 {
            self.fine_y += 1;
            return;
        }
        self.fine_y = 0;
        let mut coarse_y = (self.v & 0x03E0) >> 5;
        if coarse_y == 29 {
            coarse_y = 0;
            self.v ^= 0x0800;
        } else if coarse_y == 31 {
            coarse_y = 0;
        } else {
            coarse_y += 1;
        }
        self.v = (self.v & !0x03E0) | (coarse_y << 5);
    }

    fn expand_attribute_table(&mut self) {
        for table in 0..2 {
            let base = table * 0x400;
            for row in 0..30 {
                for col in 0..32 {
                    let attr = self.nametables[base + 0x3C0 + (row / 4) * 8 + col / 4];
                    let shift = ((row & 0x02) << 1) | (col & 0x02);
                    self.attribute_cache[base + row * 32 + col] = ((attr >> shift) & 0x03) << 2;
                }
            }
        }
    }

    // Lowest OAM index is drawn last so it wins.
    fn prepare_sprites(&mut self, mapper: &Mapper) {
        self.sprite_pixels.fill(0);
        self.sprites_per_line = [0; FRAME_HEIGHT];

        let height = if (self.ctrl & CTRL_SPRITE_SIZE_16) != 0 {
            16
        } else {
            8
        };
        let table_8x8 = if (self.ctrl & CTRL_SPRITE_TABLE) != 0 {
            0x1000u16
        } else {
            0
        };

        for sprite in (0..64).rev() {
            let entry = &self.oam[sprite * 4..sprite * 4 + 4];
            let top = entry[0] as usize + 1;
            let tile = entry[1];
            let attr = entry[2];
            let left = entry[3] as usize;
            if top >= FRAME_HEIGHT {
                continue;
            }

            for row in 0..height {
                let line = top + row;
                if line >= FRAME_HEIGHT {
                    break;
                }
                self.sprites_per_line[line] = self.sprites_per_line[line].saturating_add(1);

                let src_row = if (attr & 0x80) != 0 {
                    height - 1 - row
                } else {
                    row
                };
                let (table, tile_index) = if height == 16 {
                    let table = if (tile & 0x01) != 0 { 0x1000 } else { 0 };
                    (table, (tile & 0xFE) as u16 + (src_row >= 8) as u16)
                } else {
                    (table_8x8, tile as u16)
                };
                let addr = table + tile_index * 16 + (src_row & 0x07) as u16;
                let plane0 = mapper.read_chr(addr);
                let plane1 = mapper.read_chr(addr + 8);

                for col in 0..8 {
                    let x = left + col;
                    if x >= FRAME_WIDTH {
                        break;
                    }
                    let bit = if (attr & 0x40) != 0 { col } else { 7 - col };
                    let color = ((plane0 >> bit) & 0x01) | (((plane1 >> bit) & 0x01) << 1);
                    if color == 0 {
                        continue;
                    }

                    let mut value = color | ((attr << 2) & 0x0C);
                    if (attr & 0x20) != 0 {
                        value |= SPRITE_BEHIND_BG;
                    }
                    if sprite == 0 {
                        value |= SPRITE_ZERO_STENCIL;
                    }
                    self.sprite_pixels[line * FRAME_WIDTH + x] = value;
                }
            }
        }
    }
}

fn palette_index(addr: u16) -> usize {
    let index = (addr & 0x1F) as usize;
    // $3F10/$14/$18/$1C mirror the background entries.
    if (index & 0x13) == 0x10 {
        index & 0x0F
    } else {
        index
    }
}
