use famicore::Console;
use famicore::nes::config::{Config, Region};
use famicore::nes::{BUTTON_A, BUTTON_START, Fault, LoadError};

const HEADER: usize = 16;
const PRG_8K: usize = 0x2000;
const CHR_1K: usize = 0x400;

/// Mapper-0 image with two 8KB PRG pages and one 8KB CHR bank.
/// `program` lands at $E000 (start of the last PRG page), which the reset vector points at.
fn nrom_image(program: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; HEADER + 2 * PRG_8K + 8 * CHR_1K];
    image[0..4].copy_from_slice(b"NES\x1A");
    image[4] = 1;
    image[5] = 1;

    let last_page = HEADER + PRG_8K;
    image[last_page..last_page + program.len()].copy_from_slice(program);
    image[last_page + 0x1FFC] = 0x00;
    image[last_page + 0x1FFD] = 0xE0;
    image
}

fn loaded(program: &[u8]) -> Console {
    let mut console = Console::default();
    console.load_cartridge(nrom_image(program)).unwrap();
    console
}

#[test]
fn reset_vector_comes_from_the_last_prg_page() {
    let console = loaded(&[0xEA]);
    let nes = console.nes().unwrap();
    assert_eq!(nes.registers().pc, 0xE000);
    assert_eq!(nes.mapper_name(), "NROM");
}

#[test]
fn one_step_executes_the_opcode_at_the_reset_vector() {
    // LDX #$42
    let mut console = loaded(&[0xA2, 0x42]);
    assert_eq!(console.step(), Ok(2));
    let regs = console.nes().unwrap().registers();
    assert_eq!(regs.x, 0x42);
    assert_eq!(regs.pc, 0xE002);
    assert_eq!(console.nes().unwrap().debug_counters().cpu_cycles, 2);
}

#[test]
fn bad_rom_and_crash_are_distinct() {
    let mut console = Console::default();

    let mut short = nrom_image(&[]);
    short.pop();
    assert!(matches!(
        console.load_cartridge(short),
        Err(LoadError::LengthMismatch { .. })
    ));
    assert_eq!(
        console.load_cartridge(nrom_image(&[])[..HEADER].to_vec()),
        Err(LoadError::HeaderOnly)
    );
    assert_eq!(console.step(), Err(Fault::NoCartridge));

    // $02 is not an official opcode.
    console.load_cartridge(nrom_image(&[0x02])).unwrap();
    let fault = console.step().unwrap_err();
    assert_eq!(
        fault,
        Fault::UnknownOpcode {
            opcode: 0x02,
            pc: 0xE000
        }
    );
    assert_eq!(console.step(), Err(fault));

    // A fresh image brings the console back.
    console.load_cartridge(nrom_image(&[0xEA])).unwrap();
    assert_eq!(console.step(), Ok(2));
}

#[test]
fn controller_state_survives_a_cartridge_swap() {
    // LDA #$01; STA $4016; LDA #$00; STA $4016; LDA $4016; STA $10; LDA $4016; STA $11;
    // LDA $4016; STA $12; LDA $4016; STA $13; JMP $E01E
    let program = [
        0xA9, 0x01, 0x8D, 0x16, 0x40, 0xA9, 0x00, 0x8D, 0x16, 0x40, 0xAD, 0x16, 0x40, 0x85, 0x10,
        0xAD, 0x16, 0x40, 0x85, 0x11, 0xAD, 0x16, 0x40, 0x85, 0x12, 0xAD, 0x16, 0x40, 0x85, 0x13,
        0x4C, 0x1E, 0xE0,
    ];
    let mut console = Console::default();
    console.set_controller_state(0, BUTTON_A | BUTTON_START);
    console.load_cartridge(nrom_image(&program)).unwrap();
    for _ in 0..12 {
        console.step().unwrap();
    }

    let nes = console.nes().unwrap();
    let bits: Vec<u8> = (0x10..0x14).map(|addr| nes.peek_ram(addr) & 0x01).collect();
    assert_eq!(bits, [1, 0, 0, 1]);
}

#[test]
fn frames_and_audio_are_delivered() {
    // JMP $E000
    let mut console = loaded(&[0x4C, 0x00, 0xE0]);
    let frame = console.run_frame().unwrap();
    assert_eq!(frame.len(), 256 * 240);
    console.run_frame().unwrap();
    assert_eq!(console.nes().unwrap().debug_counters().frames, 2);

    let batch = console.run_until_audio_buffer_full().unwrap();
    assert_eq!(batch.len(), console.config().audio_batch_len);
}

#[test]
fn pal_config_uses_the_longer_frame() {
    let config = Config {
        region: Region::Pal,
        ..Config::default()
    };
    let mut console = Console::new(config).unwrap();
    console.load_cartridge(nrom_image(&[0x4C, 0x00, 0xE0])).unwrap();
    console.run_frame().unwrap();
    let before = console.nes().unwrap().debug_counters().cpu_cycles;
    console.run_frame().unwrap();
    let cycles = console.nes().unwrap().debug_counters().cpu_cycles - before;
    // 312 lines * 341 dots / 3.2 dots per CPU cycle.
    assert!((33_240..=33_260).contains(&cycles), "{cycles}");
}

#[test]
fn soft_reset_restarts_at_the_vector() {
    let mut console = loaded(&[0xEA, 0xEA, 0xEA, 0x4C, 0x00, 0xE0]);
    console.step().unwrap();
    console.step().unwrap();
    console.request_reset();
    console.step().unwrap();
    assert_eq!(console.nes().unwrap().registers().pc, 0xE000);
}
