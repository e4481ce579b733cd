use log::trace;

const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

// The triangle sequencer steps once per CPU cycle on hardware; at the APU rate every other
// entry of the 32-step ramp is visible.
const TRIANGLE_TABLE: [u8; 16] = [15, 13, 11, 9, 7, 5, 3, 1, 0, 2, 4, 6, 8, 10, 12, 14];

// Periods in APU cycles.
const NOISE_PERIOD_TABLE: [u16; 16] = [
    2, 4, 8, 16, 32, 48, 64, 80, 101, 127, 190, 254, 381, 508, 1017, 2034,
];

const DMC_RATE_TABLE: [u16; 16] = [
    214, 190, 170, 160, 143, 127, 113, 107, 95, 80, 71, 64, 53, 42, 36, 27,
];

const PULSE_MIX_TABLE: [u16; 31] = [
    0, 3, 6, 9, 12, 14, 17, 19, 22, 25, 27, 29, 32, 34, 36, 38, 41, 43, 45, 47, 49, 51, 53, 55, 56,
    58, 60, 62, 63, 65, 67,
];

// Indexed by `3 * triangle + 2 * noise + dmc`.
const OTHER_MIX_TABLE: [u16; 203] = [
    0, 2, 3, 5, 7, 8, 10, 11, 13, 14, 16, 18, 19, 21, 22, 24, 25, 27, 28, 29, 31, 32, 34, 35, 37,
    38, 39, 41, 42, 43, 45, 46, 47, 49, 50, 51, 53, 54, 55, 56, 58, 59, 60, 61, 62, 64, 65, 66, 67,
    68, 70, 71, 72, 73, 74, 75, 76, 78, 79, 80, 81, 82, 83, 84, 85, 86, 87, 88, 89, 90, 91, 92, 94,
    95, 96, 97, 98, 99, 99, 100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 110, 111, 112, 113,
    114, 114, 115, 116, 117, 118, 119, 120, 121, 121, 122, 123, 124, 125, 126, 126, 127, 128, 129,
    130, 130, 131, 132, 133, 134, 134, 135, 136, 137, 137, 138, 139, 140, 141, 141, 142, 143, 143,
    144, 145, 146, 146, 147, 148, 149, 149, 150, 151, 151, 152, 153, 153, 154, 155, 155, 156, 157,
    157, 158, 159, 159, 160, 161, 161, 162, 163, 163, 164, 164, 165, 166, 166, 167, 168, 168, 169,
    169, 170, 171, 171, 172, 172, 173, 174, 174, 175, 175, 176, 176, 177, 178, 178, 179, 179, 180,
    180, 181, 181, 182, 183, 183, 184, 184, 185, 185, 186, 186, 187, 187, 188,
];

const SEQ_STEP1: u16 = 3_728;
const SEQ_STEP2: u16 = 7_456;
const SEQ_STEP3: u16 = 11_185;
const SEQ_STEP4: u16 = 14_914;
const SEQ_STEP5: u16 = 18_640;

/// Capability set shared by the five sound generators.
pub trait Channel {
    fn tick(&mut self);
    fn output(&self) -> u8;
    fn enable(&mut self);
    fn disable(&mut self);
    fn nonzero_counter(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
struct LengthCounter {
    enabled: bool,
    halted: bool,
    value: u8,
}

impl LengthCounter {
    fn reload(&mut self, register: u8) {
        if self.enabled {
            self.value = LENGTH_TABLE[(register >> 3) as usize];
        }
    }

    fn clock(&mut self) {
        if !self.halted && self.value > 0 {
            self.value -= 1;
        }
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    // Disabling clears the counter, not just gates it.
    fn disable(&mut self) {
        self.enabled = false;
        self.value = 0;
    }

    fn is_nonzero(&self) -> bool {
        self.value > 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Envelope {
    start: bool,
    constant_volume: bool,
    looping: bool,
    period: u8,
    divider: u8,
    decay: u8,
}

impl Envelope {
    fn write_control(&mut self, value: u8) {
        self.looping = (value & 0x20) != 0;
        self.constant_volume = (value & 0x10) != 0;
        self.period = value & 0x0F;
    }

    fn restart(&mut self) {
        self.start = true;
    }

    fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.period;
            return;
        }

        if self.divider == 0 {
            self.divider = self.period;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        } else {
            self.divider -= 1;
        }
    }

    fn volume(&self) -> u8 {
        if self.constant_volume {
            self.period
        } else {
            self.decay
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Timer {
    period: u16,
    counter: u16,
}

impl Timer {
    fn set_low(&mut self, value: u8) {
        self.period = (self.period & 0xFF00) | value as u16;
    }

    fn set_high(&mut self, value: u8) {
        self.period = (self.period & 0x00FF) | (((value & 0x07) as u16) << 8);
    }

    fn clock(&mut self) -> bool {
        if self.counter == 0 {
            self.counter = self.period;
            true
        } else {
            self.counter -= 1;
            false
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Sweep {
    enabled: bool,
    period: u8,
    negate: bool,
    shift: u8,
    reload: bool,
    divider: u8,
}

#[derive(Debug, Clone)]
pub struct Pulse {
    ones_complement: bool,
    length: LengthCounter,
    envelope: Envelope,
    timer: Timer,
    sweep: Sweep,
    duty: u8,
    duty_step: u8,
}

impl Pulse {
    fn new(ones_complement: bool) -> Self {
        Self {
            ones_complement,
            length: LengthCounter::default(),
            envelope: Envelope::default(),
            timer: Timer::default(),
            sweep: Sweep::default(),
            duty: 0,
            duty_step: 0,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.duty = (value >> 6) & 0x03;
        self.length.halted = (value & 0x20) != 0;
        self.envelope.write_control(value);
    }

    fn write_sweep(&mut self, value: u8) {
        self.sweep.enabled = (value & 0x80) != 0;
        self.sweep.period = (value >> 4) & 0x07;
        self.sweep.negate = (value & 0x08) != 0;
        self.sweep.shift = value & 0x07;
        self.sweep.reload = true;
    }

    fn write_timer_low(&mut self, value: u8) {
        self.timer.set_low(value);
    }

    fn write_timer_high(&mut self, value: u8) {
        self.timer.set_high(value);
        self.length.reload(value);
        self.envelope.restart();
        self.duty_step = 0;
    }

    fn clock_envelope(&mut self) {
        self.envelope.clock();
    }

    fn clock_length_and_sweep(&mut self) {
        self.length.clock();

        if self.sweep.divider == 0
            && self.sweep.enabled
            && self.sweep.shift > 0
            && !self.muted()
        {
            self.timer.period = self.sweep_target();
        }
        if self.sweep.divider == 0 || self.sweep.reload {
            self.sweep.divider = self.sweep.period;
            self.sweep.reload = false;
        } else {
            self.sweep.divider -= 1;
        }
    }

    // Pulse 1 subtracts the one's complement of the change, pulse 2 the two's complement.
    fn sweep_target(&self) -> u16 {
        let period = self.timer.period;
        let change = period >> self.sweep.shift;
        if self.sweep.negate {
            let extra = u16::from(self.ones_complement);
            period.saturating_sub(change + extra)
        } else {
            period + change
        }
    }

    fn muted(&self) -> bool {
        self.timer.period < 8 || self.sweep_target() > 0x07FF
    }
}

impl Channel for Pulse {
    fn tick(&mut self) {
        if self.timer.clock() {
            self.duty_step = (self.duty_step + 1) & 0x07;
        }
    }

    fn output(&self) -> u8 {
        if !self.length.is_nonzero()
            || DUTY_TABLE[self.duty as usize][self.duty_step as usize] == 0
            || self.muted()
        {
            return 0;
        }
        self.envelope.volume()
    }

    fn enable(&mut self) {
        self.length.enable();
    }

    fn disable(&mut self) {
        self.length.disable();
    }

    fn nonzero_counter(&self) -> bool {
        self.length.is_nonzero()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Triangle {
    length: LengthCounter,
    timer: Timer,
    control: bool,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    step: u8,
}

impl Triangle {
    fn write_linear(&mut self, value: u8) {
        self.control = (value & 0x80) != 0;
        self.length.halted = self.control;
        self.linear_reload_value = value & 0x7F;
    }

    fn write_timer_low(&mut self, value: u8) {
        self.timer.set_low(value);
    }

    fn write_timer_high(&mut self, value: u8) {
        self.timer.set_high(value);
        self.length.reload(value);
        self.linear_reload = true;
    }

    fn clock_linear_counter(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control {
            self.linear_reload = false;
        }
    }

    fn clock_length(&mut self) {
        self.length.clock();
    }
}

impl Channel for Triangle {
    fn tick(&mut self) {
        if self.timer.clock() && self.length.is_nonzero() && self.linear_counter > 0 {
            self.step = (self.step + 1) & 0x0F;
        }
    }

    fn output(&self) -> u8 {
        if !self.length.is_nonzero() || self.linear_counter == 0 || self.timer.period < 2 {
            0
        } else {
            TRIANGLE_TABLE[self.step as usize]
        }
    }

    fn enable(&mut self) {
        self.length.enable();
    }

    fn disable(&mut self) {
        self.length.disable();
    }

    fn nonzero_counter(&self) -> bool {
        self.length.is_nonzero()
    }
}

#[derive(Debug, Clone)]
pub struct Noise {
    length: LengthCounter,
    envelope: Envelope,
    timer: Timer,
    short_mode: bool,
    shift_register: u16,
}

impl Noise {
    fn new() -> Self {
        Self {
            length: LengthCounter::default(),
            envelope: Envelope::default(),
            timer: Timer {
                period: NOISE_PERIOD_TABLE[0] - 1,
                counter: 0,
            },
            short_mode: false,
            shift_register: 1,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.length.halted = (value & 0x20) != 0;
        self.envelope.write_control(value);
    }

    fn write_period(&mut self, value: u8) {
        self.short_mode = (value & 0x80) != 0;
        self.timer.period = NOISE_PERIOD_TABLE[(value & 0x0F) as usize] - 1;
    }

    fn write_length(&mut self, value: u8) {
        self.length.reload(value);
        self.envelope.restart();
    }

    fn clock_envelope(&mut self) {
        self.envelope.clock();
    }

    fn clock_length(&mut self) {
        self.length.clock();
    }
}

impl Channel for Noise {
    fn tick(&mut self) {
        if self.timer.clock() {
            let tap = if self.short_mode { 6 } else { 1 };
            let feedback = (self.shift_register ^ (self.shift_register >> tap)) & 0x0001;
            self.shift_register = (self.shift_register >> 1) | (feedback << 14);
        }
    }

    fn output(&self) -> u8 {
        if !self.length.is_nonzero() || (self.shift_register & 0x0001) != 0 {
            0
        } else {
            self.envelope.volume()
        }
    }

    fn enable(&mut self) {
        self.length.enable();
    }

    fn disable(&mut self) {
        self.length.disable();
    }

    fn nonzero_counter(&self) -> bool {
        self.length.is_nonzero()
    }
}

#[derive(Debug, Clone)]
pub struct Dmc {
    irq_enabled: bool,
    irq_flag: bool,
    looping: bool,
    timer: Timer,
    output_level: u8,
    sample_addr: u16,
    sample_length: u16,
    current_addr: u16,
    bytes_remaining: u16,
    sample_buffer: Option<u8>,
    shift_register: u8,
    bits_remaining: u8,
    silence: bool,
}

impl Dmc {
    fn new() -> Self {
        Self {
            irq_enabled: false,
            irq_flag: false,
            looping: false,
            timer: Timer {
                period: DMC_RATE_TABLE[0] - 1,
                counter: 0,
            },
            output_level: 0,
            sample_addr: 0xC000,
            sample_length: 1,
            current_addr: 0xC000,
            bytes_remaining: 0,
            sample_buffer: None,
            shift_register: 0,
            bits_remaining: 8,
            silence: true,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.irq_enabled = (value & 0x80) != 0;
        if !self.irq_enabled {
            self.irq_flag = false;
        }
        self.looping = (value & 0x40) != 0;
        self.timer.period = DMC_RATE_TABLE[(value & 0x0F) as usize] - 1;
    }

    fn write_output_level(&mut self, value: u8) {
        self.output_level = value & 0x7F;
    }

    // Address and length only take effect on the next restart.
    fn write_sample_addr(&mut self, value: u8) {
        self.sample_addr = 0xC000 | ((value as u16) << 6);
    }

    fn write_sample_length(&mut self, value: u8) {
        self.sample_length = ((value as u16) << 4) | 0x0001;
    }

    fn restart(&mut self) {
        self.current_addr = self.sample_addr;
        self.bytes_remaining = self.sample_length;
    }

    fn pending_fetch(&self) -> Option<u16> {
        if self.sample_buffer.is_none() && self.bytes_remaining > 0 {
            Some(self.current_addr)
        } else {
            None
        }
    }

    fn load_sample(&mut self, byte: u8) {
        self.sample_buffer = Some(byte);
        self.current_addr = if self.current_addr == 0xFFFF {
            0x8000
        } else {
            self.current_addr + 1
        };
        self.bytes_remaining = self.bytes_remaining.saturating_sub(1);

        if self.bytes_remaining == 0 {
            if self.looping {
                self.restart();
            } else if self.irq_enabled {
                self.irq_flag = true;
            }
        }
    }

    fn clock_output_unit(&mut self) {
        if !self.silence {
            if (self.shift_register & 0x01) != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }

        self.shift_register >>= 1;
        self.bits_remaining -= 1;
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.sample_buffer.take() {
                Some(sample) => {
                    self.shift_register = sample;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }
}

impl Channel for Dmc {
    fn tick(&mut self) {
        if self.timer.clock() {
            self.clock_output_unit();
        }
    }

    fn output(&self) -> u8 {
        self.output_level
    }

    fn enable(&mut self) {
        if self.bytes_remaining == 0 {
            self.restart();
        }
    }

    fn disable(&mut self) {
        self.bytes_remaining = 0;
    }

    fn nonzero_counter(&self) -> bool {
        self.bytes_remaining > 0
    }
}

pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,

    sequencer_counter: u16,
    sequencer_five_step: bool,
    frame_irq_inhibit: bool,
    frame_irq_flag: bool,
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Apu {
    pub fn new() -> Self {
        Self {
            pulse1: Pulse::new(true),
            pulse2: Pulse::new(false),
            triangle: Triangle::default(),
            noise: Noise::new(),
            dmc: Dmc::new(),
            sequencer_counter: 0,
            sequencer_five_step: false,
            frame_irq_inhibit: false,
            frame_irq_flag: false,
        }
    }

    pub fn reset(&mut self) {
        self.write_status(0);
        self.dmc.irq_flag = false;
        self.frame_irq_flag = false;
        self.sequencer_counter = 0;
    }

    pub fn write_register(&mut self, addr: u16, value: u8) {
        match addr {
            0x4000 => self.pulse1.write_control(value),
            0x4001 => self.pulse1.write_sweep(value),
            0x4002 => self.pulse1.write_timer_low(value),
            0x4003 => self.pulse1.write_timer_high(value),

            0x4004 => self.pulse2.write_control(value),
            0x4005 => self.pulse2.write_sweep(value),
            0x4006 => self.pulse2.write_timer_low(value),
            0x4007 => self.pulse2.write_timer_high(value),

            0x4008 => self.triangle.write_linear(value),
            0x400A => self.triangle.write_timer_low(value),
            0x400B => self.triangle.write_timer_high(value),

            0x400C => self.noise.write_control(value),
            0x400E => self.noise.write_period(value),
            0x400F => self.noise.write_length(value),

            0x4010 => self.dmc.write_control(value),
            0x4011 => self.dmc.write_output_level(value),
            0x4012 => self.dmc.write_sample_addr(value),
            0x4013 => self.dmc.write_sample_length(value),

            0x4015 => self.write_status(value),
            0x4017 => self.write_frame_counter(value),
            _ => trace!("apu: ignored write {value:02X} to {addr:04X}"),
        }
    }

    /// $4015 read. Clears the frame IRQ flag.
    pub fn read_status(&mut self) -> u8 {
        let mut status = 0u8;
        for (bit, channel) in self.channels().iter().enumerate() {
            if channel.nonzero_counter() {
                status |= 1 << bit;
            }
        }
        if self.frame_irq_flag {
            status |= 0x40;
        }
        if self.dmc.irq_flag {
            status |= 0x80;
        }

        self.frame_irq_flag = false;
        status
    }

    pub fn irq_pending(&self) -> bool {
        self.frame_irq_flag || self.dmc.irq_flag
    }

    pub fn tick(&mut self) {
        self.pulse1.tick();
        self.pulse2.tick();
        self.triangle.tick();
        self.noise.tick();
        self.dmc.tick();

        self.clock_sequencer();
    }

    pub fn pending_dmc_fetch(&self) -> Option<u16> {
        self.dmc.pending_fetch()
    }

    pub fn complete_dmc_fetch(&mut self, value: u8) {
        self.dmc.load_sample(value);
    }

    pub fn output(&self) -> u16 {
        let pulse = (self.pulse1.output() + self.pulse2.output()) as usize;
        let other = 3 * self.triangle.output() as usize
            + 2 * self.noise.output() as usize
            + self.dmc.output() as usize;
        PULSE_MIX_TABLE[pulse] + OTHER_MIX_TABLE[other]
    }

    /// Channels in $4015 bit order: pulse 1, pulse 2, triangle, noise, DMC.
    pub fn channels(&self) -> [&dyn Channel; 5] {
        [
            &self.pulse1,
            &self.pulse2,
            &self.triangle,
            &self.noise,
            &self.dmc,
        ]
    }

    fn channels_mut(&mut self) -> [&mut dyn Channel; 5] {
        [
            &mut self.pulse1,
            &mut self.pulse2,
            &mut self.triangle,
            &mut self.noise,
            &mut self.dmc,
        ]
    }

    fn write_status(&mut self, value: u8) {
        for (bit, channel) in self.channels_mut().into_iter().enumerate() {
            if value & (1 << bit) != 0 {
                channel.enable();
            } else {
                channel.disable();
            }
        }
        self.dmc.irq_flag = false;
    }

    fn write_frame_counter(&mut self, value: u8) {
        self.sequencer_five_step = (value & 0x80) != 0;
        self.frame_irq_inhibit = (value & 0x40) != 0;
        if self.frame_irq_inhibit {
            self.frame_irq_flag = false;
        }
        self.sequencer_counter = 0;
        trace!(
            "apu: frame sequencer {}-step, irq inhibit {}",
            if self.sequencer_five_step { 5 } else { 4 },
            self.frame_irq_inhibit
        );
        if self.sequencer_five_step {
            self.clock_quarter_frame();
            self.clock_half_frame();
        }
    }

    fn clock_sequencer(&mut self) {
        self.sequencer_counter += 1;

        match (self.sequencer_five_step, self.sequencer_counter) {
            (_, SEQ_STEP1) | (_, SEQ_STEP3) => self.clock_quarter_frame(),
            (_, SEQ_STEP2) => {
                self.clock_quarter_frame();
                self.clock_half_frame();
            }
            (false, SEQ_STEP4) => {
                self.clock_quarter_frame();
                self.clock_half_frame();
                if !self.frame_irq_inhibit {
                    self.frame_irq_flag = true;
                }
                self.sequencer_counter = 0;
            }
            (true, SEQ_STEP5) => {
                self.clock_quarter_frame();
                self.clock_half_frame();
                self.sequencer_counter = 0;
            }
            _ => {}
        }
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.clock_envelope();
        self.pulse2.clock_envelope();
        self.triangle.clock_linear_counter();
        self.noise.clock_envelope();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.clock_length_and_sweep();
        self.pulse2.clock_length_and_sweep();
        self.triangle.clock_length();
        self.noise.clock_length();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(apu: &Apu) -> [bool; 5] {
        apu.channels().map(|channel| channel.nonzero_counter())
    }

    fn load_all_lengths(apu: &mut Apu) {
        apu.write_register(0x4003, 0x08);
        apu.write_register(0x4007, 0x08);
        apu.write_register(0x400B, 0x08);
        apu.write_register(0x400F, 0x08);
    }

    #[test]
    fn length_counters_follow_enable_bits() {
        let mut apu = Apu::new();
        apu.write_register(0x4013, 0x02);
        apu.write_register(0x4015, 0x1F);
        load_all_lengths(&mut apu);
        assert_eq!(counters(&apu), [true; 5]);

        apu.write_register(0x4015, 0x07);
        assert_eq!(counters(&apu), [true, true, true, false, false]);

        // Loads into a disabled channel are dropped.
        load_all_lengths(&mut apu);
        assert_eq!(counters(&apu), [true, true, true, false, false]);

        apu.write_register(0x4015, 0x80);
        assert_eq!(counters(&apu), [false; 5]);
        assert_eq!(apu.read_status() & 0x1F, 0);
    }

    #[test]
    fn length_table_value_counts_down_on_half_frames() {
        let mut apu = Apu::new();
        apu.write_register(0x4015, 0x01);
        // Index 1 loads 254.
        apu.write_register(0x4003, 0x08);
        assert_eq!(apu.pulse1.length.value, 254);
        for _ in 0..SEQ_STEP4 {
            apu.tick();
        }
        assert_eq!(apu.pulse1.length.value, 252);
    }

    #[test]
    fn halted_length_counter_holds() {
        let mut apu = Apu::new();
        apu.write_register(0x4015, 0x08);
        apu.write_register(0x400C, 0x20);
        apu.write_register(0x400F, 0x00);
        for _ in 0..SEQ_STEP4 * 3 {
            apu.tick();
        }
        assert_eq!(apu.noise.length.value, 10);
    }

    #[test]
    fn four_step_sequence_raises_frame_irq() {
        let mut apu = Apu::new();
        for _ in 0..SEQ_STEP4 - 1 {
            apu.tick();
        }
        assert!(!apu.irq_pending());
        apu.tick();
        assert!(apu.irq_pending());

        let status = apu.read_status();
        assert_eq!(status & 0x40, 0x40);
        assert!(!apu.irq_pending());
        assert_eq!(apu.read_status() & 0x40, 0);
    }

    #[test]
    fn irq_inhibit_and_five_step_mode_never_raise() {
        let mut apu = Apu::new();
        apu.write_register(0x4017, 0x40);
        for _ in 0..SEQ_STEP4 * 2 {
            apu.tick();
        }
        assert!(!apu.irq_pending());

        apu.write_register(0x4017, 0x80);
        for _ in 0..SEQ_STEP5 * 2 {
            apu.tick();
        }
        assert!(!apu.irq_pending());
    }

    #[test]
    fn inhibit_write_clears_pending_frame_irq() {
        let mut apu = Apu::new();
        for _ in 0..SEQ_STEP4 {
            apu.tick();
        }
        assert!(apu.irq_pending());
        apu.write_register(0x4017, 0x40);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn five_step_write_clocks_half_frame_immediately() {
        let mut apu = Apu::new();
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4003, 0x08);
        apu.write_register(0x4017, 0x80);
        assert_eq!(apu.pulse1.length.value, 253);
    }

    #[test]
    fn envelope_decays_and_loops() {
        let mut envelope = Envelope::default();
        envelope.write_control(0x20);
        envelope.restart();
        envelope.clock();
        assert_eq!(envelope.volume(), 15);
        for _ in 0..15 {
            envelope.clock();
        }
        assert_eq!(envelope.volume(), 0);
        envelope.clock();
        assert_eq!(envelope.volume(), 15);

        envelope.write_control(0x17);
        assert_eq!(envelope.volume(), 7);
    }

    #[test]
    fn pulse_one_sweep_uses_ones_complement() {
        let mut pulse1 = Pulse::new(true);
        let mut pulse2 = Pulse::new(false);
        for pulse in [&mut pulse1, &mut pulse2] {
            pulse.write_timer_low(0x00);
            pulse.write_timer_high(0x01);
            pulse.write_sweep(0x89);
        }
        assert_eq!(pulse1.sweep_target(), 0x100 - 0x80 - 1);
        assert_eq!(pulse2.sweep_target(), 0x100 - 0x80);
    }

    #[test]
    fn pulse_is_muted_by_low_period_or_overflowing_target() {
        let mut apu = Apu::new();
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4000, 0xBF);
        apu.write_register(0x4002, 0x05);
        apu.write_register(0x4003, 0x08);
        assert!(apu.pulse1.muted());

        apu.write_register(0x4002, 0xFF);
        apu.write_register(0x4003, 0x0F);
        apu.write_register(0x4001, 0x81);
        assert!(apu.pulse1.muted());

        // Shift 0 still doubles the target, so only periods below $400 are audible.
        apu.write_register(0x4001, 0x00);
        assert!(apu.pulse1.muted());
        apu.write_register(0x4003, 0x0B);
        assert!(!apu.pulse1.muted());
    }

    #[test]
    fn dmc_fetches_sample_and_raises_irq_at_end() {
        let mut apu = Apu::new();
        apu.write_register(0x4010, 0x80);
        apu.write_register(0x4012, 0xFF);
        apu.write_register(0x4013, 0x00);
        apu.write_register(0x4015, 0x10);

        assert_eq!(apu.pending_dmc_fetch(), Some(0xFFC0));
        apu.complete_dmc_fetch(0xAA);
        assert_eq!(apu.pending_dmc_fetch(), None);
        assert!(!apu.channels()[4].nonzero_counter());
        assert!(apu.irq_pending());
        assert_eq!(apu.read_status() & 0x80, 0x80);

        apu.write_register(0x4015, 0x00);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn dmc_address_wraps_to_8000_and_loops() {
        let mut dmc = Dmc::new();
        dmc.write_control(0x40);
        dmc.write_sample_addr(0xFF);
        dmc.write_sample_length(0x04);
        dmc.restart();
        dmc.current_addr = 0xFFFF;
        dmc.load_sample(0);
        assert_eq!(dmc.current_addr, 0x8000);

        dmc.bytes_remaining = 1;
        dmc.load_sample(0);
        assert_eq!(dmc.bytes_remaining, 0x41);
        assert_eq!(dmc.current_addr, 0xFFC0);
        assert!(!dmc.irq_flag);
    }

    #[test]
    fn dmc_output_level_steps_by_two_within_bounds() {
        let mut dmc = Dmc::new();
        dmc.write_output_level(0xFF);
        assert_eq!(dmc.output(), 0x7F);

        dmc.silence = false;
        dmc.shift_register = 0xFF;
        dmc.clock_output_unit();
        assert_eq!(dmc.output(), 0x7F);

        dmc.write_output_level(1);
        dmc.shift_register = 0x00;
        dmc.clock_output_unit();
        assert_eq!(dmc.output(), 1);
    }

    #[test]
    fn noise_shift_register_starts_at_one_and_stays_nonzero() {
        let mut noise = Noise::new();
        noise.write_period(0x00);
        for _ in 0..10_000 {
            noise.tick();
            assert_ne!(noise.shift_register, 0);
        }
    }

    #[test]
    fn triangle_needs_linear_counter_to_step() {
        let mut apu = Apu::new();
        apu.write_register(0x4015, 0x04);
        apu.write_register(0x4008, 0x7F);
        apu.write_register(0x400A, 0x10);
        apu.write_register(0x400B, 0x08);
        assert_eq!(apu.triangle.output(), 0);

        for _ in 0..SEQ_STEP1 {
            apu.tick();
        }
        assert_eq!(apu.triangle.linear_counter, 0x7F);
        let before = apu.triangle.step;
        for _ in 0..0x11 {
            apu.tick();
        }
        assert_ne!(apu.triangle.step, before);
    }

    #[test]
    fn mixer_is_silent_at_rest_and_bounded() {
        let apu = Apu::new();
        assert_eq!(apu.output(), 0);
        assert_eq!(PULSE_MIX_TABLE[30] + OTHER_MIX_TABLE[202], 255);
    }
}
