pub mod console;
pub mod nes;

pub use console::Console;
