use log::info;

use crate::nes::config::Config;
use crate::nes::{Fault, LoadError, Nes};

/// Synchronous host boundary: cartridge loading, input and pacing.
///
/// A console with no cartridge is valid; running it reports
/// [`Fault::NoCartridge`]. Loading a new image tears down the old machine.
pub struct Console {
    config: Config,
    nes: Option<Nes>,
    controllers: [u8; 2],
}

impl Default for Console {
    fn default() -> Self {
        Self {
            config: Config::default(),
            nes: None,
            controllers: [0; 2],
        }
    }
}

impl Console {
    pub fn new(config: Config) -> Result<Self, LoadError> {
        config.validate()?;
        Ok(Self {
            config,
            nes: None,
            controllers: [0; 2],
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the running machine. On error the previous cartridge stays unloaded.
    pub fn load_cartridge(&mut self, image: Vec<u8>) -> Result<(), LoadError> {
        self.nes = None;
        let mut nes = Nes::from_rom(image, &self.config)?;
        for (port, &buttons) in self.controllers.iter().enumerate() {
            nes.set_controller_state(port, buttons);
        }
        info!("cartridge loaded: {}", nes.mapper_name());
        self.nes = Some(nes);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.nes.is_some()
    }

    pub fn set_controller_state(&mut self, port: usize, buttons: u8) {
        if let Some(slot) = self.controllers.get_mut(port) {
            *slot = buttons;
        }
        if let Some(nes) = self.nes.as_mut() {
            nes.set_controller_state(port, buttons);
        }
    }

    pub fn request_reset(&mut self) {
        if let Some(nes) = self.nes.as_mut() {
            nes.request_reset();
        }
    }

    pub fn step(&mut self) -> Result<u32, Fault> {
        self.machine()?.step()
    }

    pub fn run_until_audio_buffer_full(&mut self) -> Result<Vec<f32>, Fault> {
        self.machine()?.run_until_audio_batch()
    }

    /// Runs to the next VBlank and returns the finished picture.
    pub fn run_frame(&mut self) -> Result<&[u8], Fault> {
        let nes = self.machine()?;
        nes.run_frame()?;
        Ok(nes.frame_buffer())
    }

    pub fn frame(&self) -> Option<&[u8]> {
        self.nes.as_ref().map(Nes::frame_buffer)
    }

    pub fn nes(&self) -> Option<&Nes> {
        self.nes.as_ref()
    }

    fn machine(&mut self) -> Result<&mut Nes, Fault> {
        self.nes.as_mut().ok_or(Fault::NoCartridge)
    }
}
