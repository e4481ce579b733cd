use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use super::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Ntsc,
    Pal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub master_clock_hz: u64,
    pub cpu_divider: u64,
    pub ppu_divider: u64,
    pub apu_divider: u64,
    pub total_scanlines: i16,
    pub vblank_scanline: i16,
    pub nmi_entry_cycles: u64,
    // Pre-render line drops one dot on odd frames while the background is on.
    pub odd_frame_skip: bool,
}

impl Timing {
    pub const NTSC: Timing = Timing {
        master_clock_hz: 21_477_272,
        cpu_divider: 12,
        ppu_divider: 4,
        apu_divider: 24,
        total_scanlines: 262,
        vblank_scanline: 241,
        nmi_entry_cycles: 7,
        odd_frame_skip: true,
    };

    pub const PAL: Timing = Timing {
        master_clock_hz: 26_601_712,
        cpu_divider: 16,
        ppu_divider: 5,
        apu_divider: 32,
        total_scanlines: 312,
        vblank_scanline: 241,
        nmi_entry_cycles: 7,
        odd_frame_skip: false,
    };
}

impl Region {
    pub fn timing(self) -> Timing {
        match self {
            Region::Ntsc => Timing::NTSC,
            Region::Pal => Timing::PAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub region: Region,
    pub sample_rate: u32,
    // Samples per delivered audio batch (one 60Hz frame at 44.1kHz).
    pub audio_batch_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: Region::Ntsc,
            sample_rate: 44_100,
            audio_batch_len: 735,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text).context("invalid config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.sample_rate == 0 {
            return Err(LoadError::InvalidConfig("sample_rate must be non-zero".into()));
        }
        if self.audio_batch_len == 0 {
            return Err(LoadError::InvalidConfig(
                "audio_batch_len must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        self.region.timing()
    }
}
