use anyhow::{Context, Result};
use std::{fs, path::Path};

use super::error::LoadError;
use super::mapper::Mirroring;

pub const HEADER_SIZE: usize = 0x10;
pub const PRG_PAGE_SIZE: usize = 0x2000;
pub const CHR_PAGE_SIZE: usize = 0x0400;

const MAGIC: &[u8; 4] = b"NES\x1A";

#[derive(Debug, Clone)]
pub struct Cartridge {
    image: Vec<u8>,
    prg_pages: usize,
    chr_pages: usize,
    mirroring: Mirroring,
    has_sram: bool,
    mapper_number: u8,
}

impl Cartridge {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read ROM: {}", path.display()))?;
        let cart = Self::from_bytes(bytes)
            .with_context(|| format!("failed to parse ROM: {}", path.display()))?;
        Ok(cart)
    }

    pub fn from_bytes(image: Vec<u8>) -> Result<Self, LoadError> {
        if image.len() < HEADER_SIZE || &image[0..4] != MAGIC {
            return Err(LoadError::BadSignature);
        }
        if image.len() == HEADER_SIZE {
            return Err(LoadError::HeaderOnly);
        }

        // Header counts are in 16KB / 8KB units; pages here are 8KB / 1KB.
        let prg_pages = image[4] as usize * 2;
        let chr_pages = image[5] as usize * 8;
        let expected = HEADER_SIZE + prg_pages * PRG_PAGE_SIZE + chr_pages * CHR_PAGE_SIZE;
        if image.len() != expected {
            return Err(LoadError::LengthMismatch {
                expected,
                actual: image.len(),
            });
        }

        let flags6 = image[6];
        let flags7 = image[7];
        let mirroring = if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        Ok(Self {
            prg_pages,
            chr_pages,
            mirroring,
            has_sram: (flags6 & 0x02) != 0,
            mapper_number: (flags6 >> 4) | (flags7 & 0xF0),
            image,
        })
    }

    pub fn mapper_number(&self) -> u8 {
        self.mapper_number
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    pub fn has_sram(&self) -> bool {
        self.has_sram
    }

    pub fn prg_page_count(&self) -> usize {
        self.prg_pages
    }

    pub fn chr_page_count(&self) -> usize {
        self.chr_pages
    }

    pub fn prg_page(&self, page: usize) -> &[u8] {
        let start = HEADER_SIZE + page * PRG_PAGE_SIZE;
        &self.image[start..start + PRG_PAGE_SIZE]
    }

    pub fn chr_page(&self, page: usize) -> &[u8] {
        let start = HEADER_SIZE + self.prg_pages * PRG_PAGE_SIZE + page * CHR_PAGE_SIZE;
        &self.image[start..start + CHR_PAGE_SIZE]
    }
}
