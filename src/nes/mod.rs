pub mod cartridge;
pub mod cpu;
pub mod mapper;
pub mod palette;
pub mod ppu;

use log::info;
use std::path::Path;

use cartridge::{Cartridge, LoadError};
use cpu::{Cpu, CpuState};
use mapper::GamePak;
use ppu::Ppu;

// Controller bit layout, MSB first: A, B, Select, Start, Up, Down,
// Left, Right
pub const BUTTON_A: u8 = 0x80;
pub const BUTTON_B: u8 = 0x40;
pub const BUTTON_SELECT: u8 = 0x20;
pub const BUTTON_START: u8 = 0x10;
pub const BUTTON_UP: u8 = 0x08;
pub const BUTTON_DOWN: u8 = 0x04;
pub const BUTTON_LEFT: u8 = 0x02;
pub const BUTTON_RIGHT: u8 = 0x01;

pub(crate) const FLAG_CARRY: u8 = 0x01;
pub(crate) const FLAG_ZERO: u8 = 0x02;
pub(crate) const FLAG_INTERRUPT: u8 = 0x04;
pub(crate) const FLAG_DECIMAL: u8 = 0x08;
pub(crate) const FLAG_BREAK: u8 = 0x10;
pub(crate) const FLAG_UNUSED: u8 = 0x20;
pub(crate) const FLAG_OVERFLOW: u8 = 0x40;
pub(crate) const FLAG_NEGATIVE: u8 = 0x80;

#[derive(Default)]
struct Controller {
    buttons: u8,
    latch: u8,
}

/// CPU-visible address space: 2 KiB work RAM mirrored through $1FFF, the
/// PPU register window mirrored through $3FFF, the OAM-DMA port, two
/// controller latches, and the cartridge from $4020 up. Unmapped reads
/// return 0; unmapped writes are discarded.
pub struct Bus {
    ram: [u8; 0x800],
    pub(crate) ppu: Ppu,
    pub(crate) game_pak: Option<GamePak>,
    controllers: [Controller; 2],
    strobe: bool,
    dma_request: Option<u8>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            ram: [0; 0x800],
            ppu: Ppu::new(),
            game_pak: None,
            controllers: [Controller::default(), Controller::default()],
            strobe: false,
            dma_request: None,
        }
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x2000..=0x3FFF => self.ppu.cpu_read(addr, &mut self.game_pak),
            0x4016 => self.read_controller(0),
            0x4017 => self.read_controller(1),
            0x4020..=0xFFFF => match self.game_pak.as_ref() {
                Some(pak) => pak.cpu_read(addr),
                None => 0,
            },
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize] = value,
            0x2000..=0x3FFF => self.ppu.cpu_write(addr, value, &mut self.game_pak),
            0x4014 => self.dma_request = Some(value),
            0x4016 => {
                // Falling edge of the strobe bit samples both pads
                let high = (value & 0x01) != 0;
                if self.strobe && !high {
                    self.controllers[0].latch = self.controllers[0].buttons;
                    self.controllers[1].latch = self.controllers[1].buttons;
                }
                self.strobe = high;
            }
            0x4020..=0xFFFF => {
                if let Some(pak) = self.game_pak.as_mut() {
                    pak.cpu_write(addr, value);
                }
            }
            _ => {}
        }
    }

    /// Side-effect-free read for debuggers and the disassembler. PPU
    /// registers and controller ports read as 0 rather than disturbing
    /// their latches.
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x4020..=0xFFFF => match self.game_pak.as_ref() {
                Some(pak) => pak.cpu_read(addr),
                None => 0,
            },
            _ => 0,
        }
    }

    fn read_controller(&mut self, port: usize) -> u8 {
        let controller = &mut self.controllers[port];
        let bit = (controller.latch & 0x80) >> 7;
        controller.latch <<= 1;
        bit
    }

    pub(crate) fn take_dma_request(&mut self) -> Option<u8> {
        self.dma_request.take()
    }

    fn clock_ppu(&mut self) {
        self.ppu.clock(&mut self.game_pak);
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

/// The console: CPU, PPU, bus and cartridge under one master clock. The
/// PPU runs every tick, the CPU every third; NMI and mapper IRQ levels
/// are carried across at tick boundaries.
pub struct Nes {
    cpu: Cpu,
    bus: Bus,
    master_clock: u64,
}

impl Nes {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            master_clock: 0,
        }
    }

    /// Parse an iNES image, install its mapper and cold-start.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        let cart = Cartridge::from_bytes(bytes)?;
        let pak = GamePak::new(cart);
        info!("cartridge installed: {}", pak.mapper_name());
        self.bus.game_pak = Some(pak);
        self.reset(true);
        Ok(())
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let cart = Cartridge::from_file(path)?;
        let pak = GamePak::new(cart);
        info!("cartridge installed: {}", pak.mapper_name());
        self.bus.game_pak = Some(pak);
        self.reset(true);
        Ok(())
    }

    pub fn reset(&mut self, coldstart: bool) {
        if let Some(pak) = self.bus.game_pak.as_mut() {
            pak.reset(coldstart);
        }
        self.bus.ppu.reset(coldstart);
        self.bus.strobe = false;
        self.bus.dma_request = None;
        self.bus.controllers[0].latch = 0;
        self.bus.controllers[1].latch = 0;
        self.cpu.reset(&mut self.bus, coldstart);
        self.master_clock = 0;
    }

    /// One master clock: the PPU always, the CPU on every third tick,
    /// then interrupt plumbing.
    pub fn tick(&mut self) {
        self.master_clock += 1;
        self.bus.clock_ppu();

        if self.master_clock % 3 == 0 {
            self.cpu.clock(&mut self.bus);
        }

        if self.bus.ppu.take_nmi() {
            self.cpu.nmi_pending = true;
        }

        self.cpu.irq_line = self
            .bus
            .game_pak
            .as_ref()
            .is_some_and(|pak| pak.irq_pending());
    }

    /// Run master clocks until the PPU finishes the current frame.
    pub fn step_frame(&mut self) {
        let frame = self.bus.ppu.frame_number();
        while self.bus.ppu.frame_number() == frame {
            self.tick();
        }
    }

    /// Run master clocks until the CPU completes one instruction.
    pub fn step_instruction(&mut self) {
        let start = self.cpu.cycle_count();
        loop {
            self.tick();
            if self.cpu.state().stopped {
                break;
            }
            if self.cpu.cycle_count() > start && self.cpu.at_instruction_boundary() {
                break;
            }
        }
    }

    /// 256x240 framebuffer of NTSC palette indices (0x00-0x3F).
    pub fn frame(&self) -> &[u8; ppu::FRAME_WIDTH * ppu::FRAME_HEIGHT] {
        self.bus.ppu.screen()
    }

    pub fn frame_number(&self) -> u32 {
        self.bus.ppu.frame_number()
    }

    pub fn master_clock(&self) -> u64 {
        self.master_clock
    }

    pub fn set_controller(&mut self, port: usize, buttons: u8) {
        self.bus.controllers[port & 1].buttons = buttons;
    }

    pub fn cpu_state(&self) -> CpuState {
        self.cpu.state()
    }

    /// Overwrite the CPU registers, for trace harnesses that enter at a
    /// fixed address (the nestest automation entry point, for one).
    pub fn set_cpu_state(&mut self, pc: u16, a: u8, x: u8, y: u8, s: u8, p: u8) {
        self.cpu.force_state(pc, a, x, y, s, p);
    }

    pub fn cpu_cycles(&self) -> u64 {
        self.cpu.cycle_count()
    }

    pub fn disassemble_at(&self, addr: u16) -> String {
        self.cpu.disassemble(&self.bus, addr)
    }

    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    pub fn mapper_name(&self) -> Option<&'static str> {
        self.bus.game_pak.as_ref().map(|pak| pak.mapper_name())
    }

    pub fn ppu_scanline_cycle(&self) -> (i16, u16) {
        self.bus.ppu.scanline_cycle()
    }

    pub fn ppu_status_bits(&self) -> u8 {
        self.bus.ppu.status_bits()
    }

    /// Pattern-table inspector view (128x128 palette indices).
    pub fn debug_pattern_table(&mut self, table: u8, palette: u8) -> Vec<u8> {
        let Bus { ppu, game_pak, .. } = &mut self.bus;
        ppu.pattern_table(game_pak, table, palette)
    }

    /// Palette inspector view.
    pub fn debug_palette(&mut self, palette: u8) -> [u8; 4] {
        let Bus { ppu, game_pak, .. } = &mut self.bus;
        ppu.palette_colors(game_pak, palette)
    }

    /// OAM inspector view.
    pub fn debug_oam(&self, index: u8) -> u8 {
        self.bus.ppu.oam()[index as usize]
    }
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartridge::Mirroring;

    fn nrom_bus() -> Bus {
        let mut bus = Bus::new();
        let mut prg = vec![0u8; 0x8000];
        prg[0x1000] = 0x5A;
        bus.game_pak = Some(GamePak::new(Cartridge {
            mapper_id: 0,
            mirroring: Mirroring::Horizontal,
            prg_rom: prg,
            chr: vec![0; 0x2000],
            chr_is_ram: false,
            prg_banks: 2,
            chr_banks: 1,
        }));
        bus
    }

    #[test]
    fn work_ram_mirrors_every_2k() {
        let mut bus = Bus::new();
        bus.write(0x0001, 0x42);
        assert_eq!(bus.read(0x0801), 0x42);
        assert_eq!(bus.read(0x1001), 0x42);
        assert_eq!(bus.read(0x1801), 0x42);
    }

    #[test]
    fn ppu_registers_mirror_every_8_bytes() {
        let mut bus = Bus::new();
        // OAMADDR via a mirror, then OAMDATA via another mirror
        bus.write(0x2003, 0x10);
        bus.write(0x3FFC, 0x77);
        bus.write(0x2003, 0x10);
        assert_eq!(bus.read(0x3FFC), 0x77);
    }

    #[test]
    fn cartridge_claims_high_addresses() {
        let mut bus = nrom_bus();
        assert_eq!(bus.read(0x9000), 0x5A);
        assert_eq!(bus.peek(0x9000), 0x5A);
    }

    #[test]
    fn unmapped_reads_return_zero() {
        let mut bus = Bus::new();
        assert_eq!(bus.read(0x4000), 0);
        assert_eq!(bus.read(0x5000), 0);
        bus.write(0x4000, 0xFF); // discarded
    }

    #[test]
    fn controller_latch_shifts_msb_first() {
        let mut bus = Bus::new();
        bus.controllers[0].buttons = BUTTON_A | BUTTON_SELECT;

        bus.write(0x4016, 1);
        bus.write(0x4016, 0);

        let bits: Vec<u8> = (0..8).map(|_| bus.read(0x4016) & 1).collect();
        assert_eq!(bits, vec![1, 0, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn controller_latch_requires_strobe_edge() {
        let mut bus = Bus::new();
        bus.controllers[0].buttons = 0xFF;

        // A lone 0 write never latches
        bus.write(0x4016, 0);
        assert_eq!(bus.read(0x4016) & 1, 0);
    }

    #[test]
    fn second_controller_reads_its_own_latch() {
        let mut bus = Bus::new();
        bus.controllers[1].buttons = BUTTON_START;

        bus.write(0x4016, 1);
        bus.write(0x4016, 0);

        let bits: Vec<u8> = (0..8).map(|_| bus.read(0x4017) & 1).collect();
        assert_eq!(bits, vec![0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn oam_dma_copies_a_page_and_stalls_513_or_514() {
        // Zero or one 3-cycle LDA $00 pads flip the start-cycle parity
        for pads in [0u16, 1] {
            let mut bus = nrom_bus();
            let mut cpu = Cpu::new();

            for i in 0..256u16 {
                bus.write(0x0200 + i, i as u8);
            }

            let mut pc = 0x0000u16;
            for _ in 0..pads {
                bus.write(pc, 0xA5);
                bus.write(pc + 1, 0x00);
                pc += 2;
            }
            bus.write(pc, 0x8D); // STA $4014
            bus.write(pc + 1, 0x14);
            bus.write(pc + 2, 0x40);

            cpu.pc = 0x0000;
            for _ in 0..pads {
                cpu.step(&mut bus);
            }
            cpu.a = 0x02;
            cpu.step(&mut bus); // STA latches the request

            let before = cpu.cycle_count();
            let parity_odd = (before & 1) != 0;
            cpu.step(&mut bus); // the DMA itself
            let stall = cpu.cycle_count() - before;

            assert_eq!(stall, if parity_odd { 514 } else { 513 });
            assert_eq!(bus.ppu.oam(), &{
                let mut expected = [0u8; 256];
                for (i, slot) in expected.iter_mut().enumerate() {
                    *slot = i as u8;
                }
                expected
            });
        }
    }
}
