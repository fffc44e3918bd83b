use log::debug;

use super::cartridge::{Cartridge, Mirroring};

/// The five supported bank-switching circuits as a tagged sum. Each
/// variant owns its private banking registers and RAM; dispatch is a
/// plain match, no heap polymorphism.
pub enum Mapper {
    Nrom(Nrom),
    Mmc1(Mmc1),
    Uxrom(Uxrom),
    Cnrom(Cnrom),
    Mmc3(Mmc3),
}

impl Mapper {
    pub fn new(cart: Cartridge) -> Self {
        debug!("creating mapper {}", cart.mapper_id);
        match cart.mapper_id {
            1 => Mapper::Mmc1(Mmc1::new(cart)),
            2 => Mapper::Uxrom(Uxrom::new(cart)),
            3 => Mapper::Cnrom(Cnrom::new(cart)),
            4 => Mapper::Mmc3(Mmc3::new(cart)),
            _ => Mapper::Nrom(Nrom::new(cart)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mapper::Nrom(_) => "NROM",
            Mapper::Mmc1(_) => "MMC1",
            Mapper::Uxrom(_) => "UxROM",
            Mapper::Cnrom(_) => "CNROM",
            Mapper::Mmc3(_) => "MMC3",
        }
    }

    pub fn reset(&mut self, coldstart: bool) {
        match self {
            Mapper::Nrom(_) => {}
            Mapper::Mmc1(m) => m.reset(coldstart),
            Mapper::Uxrom(m) => m.reset(coldstart),
            Mapper::Cnrom(m) => m.reset(coldstart),
            Mapper::Mmc3(m) => m.reset(coldstart),
        }
    }

    pub fn cpu_read(&self, addr: u16) -> u8 {
        match self {
            Mapper::Nrom(m) => m.cpu_read(addr),
            Mapper::Mmc1(m) => m.cpu_read(addr),
            Mapper::Uxrom(m) => m.cpu_read(addr),
            Mapper::Cnrom(m) => m.cpu_read(addr),
            Mapper::Mmc3(m) => m.cpu_read(addr),
        }
    }

    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        match self {
            Mapper::Nrom(_) => {}
            Mapper::Mmc1(m) => m.cpu_write(addr, value),
            Mapper::Uxrom(m) => m.cpu_write(addr, value),
            Mapper::Cnrom(m) => m.cpu_write(addr, value),
            Mapper::Mmc3(m) => m.cpu_write(addr, value),
        }
    }

    /// Pattern-table reads return `Some`; nametable addresses are left to
    /// the caller's RAM. `ppu_clocks` feeds the MMC3 A12 edge filter.
    pub fn ppu_read(&mut self, addr: u16, ppu_clocks: u64) -> Option<u8> {
        match self {
            Mapper::Nrom(m) => m.ppu_read(addr),
            Mapper::Mmc1(m) => m.ppu_read(addr),
            Mapper::Uxrom(m) => m.ppu_read(addr),
            Mapper::Cnrom(m) => m.ppu_read(addr),
            Mapper::Mmc3(m) => m.ppu_read(addr, ppu_clocks),
        }
    }

    /// Returns true when the mapper claimed the write.
    pub fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        match self {
            Mapper::Nrom(m) => m.ppu_write(addr, value),
            Mapper::Mmc1(m) => m.ppu_write(addr, value),
            Mapper::Uxrom(m) => m.ppu_write(addr, value),
            Mapper::Cnrom(m) => m.ppu_write(addr, value),
            Mapper::Mmc3(m) => m.ppu_write(addr, value),
        }
    }

    /// Mapper-controlled nametable mirroring, applied before the game pak
    /// falls back to the header default. `Some` claims the address.
    pub fn ppu_remap_address(&self, addr: u16) -> Option<u16> {
        match self {
            Mapper::Mmc1(m) => m.ppu_remap_address(addr),
            Mapper::Mmc3(m) => m.ppu_remap_address(addr),
            _ => None,
        }
    }

    pub fn irq_pending(&self) -> bool {
        match self {
            Mapper::Mmc3(m) => m.irq_pending,
            _ => false,
        }
    }
}

// Horizontal arrangement: $2000/$2400 share a table, $2800/$2C00 the
// other. Expressed as bit rewrites so the 2 KiB RAM is hit at exactly two
// unique 1 KiB offsets.
fn remap_horizontal(addr: u16) -> u16 {
    (addr & !0x0C00) | ((addr & 0x0800) >> 1)
}

// Vertical arrangement: $2000/$2800 share, $2400/$2C00 share.
fn remap_vertical(addr: u16) -> u16 {
    addr & !0x0800
}

/// Mapper 0: no banking. 16 KiB carts mirror into the $C000 window.
pub struct Nrom {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
}

impl Nrom {
    fn new(cart: Cartridge) -> Self {
        Self {
            prg_rom: cart.prg_rom,
            chr: cart.chr,
            chr_is_ram: cart.chr_is_ram,
        }
    }

    fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0xFFFF => {
                let mut idx = (addr as usize) - 0x8000;
                if self.prg_rom.len() == 0x4000 {
                    idx &= 0x3FFF;
                }
                self.prg_rom[idx % self.prg_rom.len()]
            }
            _ => 0,
        }
    }

    fn ppu_read(&self, addr: u16) -> Option<u8> {
        if addr < 0x2000 {
            Some(self.chr[(addr as usize) % self.chr.len()])
        } else {
            None
        }
    }

    fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        if addr < 0x2000 {
            if self.chr_is_ram {
                let idx = (addr as usize) % self.chr.len();
                self.chr[idx] = value;
            }
            true
        } else {
            false
        }
    }
}

/// Mapper 1: serial shift register loads four 5-bit registers selected by
/// CPU address bits 13-14. Mirroring comes from the control register.
pub struct Mmc1 {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    prg_ram: Vec<u8>,

    load: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
}

// Shift register sentinel: bit 4 starts set and reaches bit 0 on the
// fifth write, marking the register commit.
const MMC1_LOAD_EMPTY: u8 = 0x10;

impl Mmc1 {
    fn new(cart: Cartridge) -> Self {
        Self {
            prg_rom: cart.prg_rom,
            chr: cart.chr,
            chr_is_ram: cart.chr_is_ram,
            prg_ram: vec![0; 8 * 1024],
            load: MMC1_LOAD_EMPTY,
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
        }
    }

    fn reset(&mut self, _coldstart: bool) {
        self.load = MMC1_LOAD_EMPTY;
        self.control |= 0x0C;
    }

    fn prg_bank_count(&self) -> usize {
        (self.prg_rom.len() / 0x4000).max(1)
    }

    fn chr_bank_count_4k(&self) -> usize {
        (self.chr.len() / 0x1000).max(1)
    }

    fn read_prg_16k(&self, bank: usize, offset: usize) -> u8 {
        let bank = bank % self.prg_bank_count();
        self.prg_rom[(bank * 0x4000 + offset) % self.prg_rom.len()]
    }

    fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr as usize) & 0x1FFF],
            0x8000..=0xFFFF => {
                let offset = (addr as usize) & 0x3FFF;
                let bank = (self.prg_bank & 0x0F) as usize;
                match (self.control >> 2) & 0x03 {
                    0 | 1 => {
                        // 32 KiB switch, low bank bit ignored
                        let idx = (bank & !1) * 0x4000 + ((addr as usize) - 0x8000);
                        self.prg_rom[idx % self.prg_rom.len()]
                    }
                    2 => {
                        if addr < 0xC000 {
                            self.read_prg_16k(0, offset)
                        } else {
                            self.read_prg_16k(bank, offset)
                        }
                    }
                    _ => {
                        if addr < 0xC000 {
                            self.read_prg_16k(bank, offset)
                        } else {
                            self.read_prg_16k(self.prg_bank_count() - 1, offset)
                        }
                    }
                }
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr as usize) & 0x1FFF] = value,
            0x8000..=0xFFFF => self.write_shift_register(addr, value),
            _ => {}
        }
    }

    fn write_shift_register(&mut self, addr: u16, value: u8) {
        if (value & 0x80) != 0 {
            self.load = MMC1_LOAD_EMPTY;
            self.control |= 0x0C;
            return;
        }

        let commit = (self.load & 0x01) != 0;
        self.load = (self.load >> 1) | ((value & 0x01) << 4);

        if commit {
            let data = self.load & 0x1F;
            match (addr >> 13) & 0x03 {
                0 => self.control = data,
                1 => self.chr_bank0 = data,
                2 => self.chr_bank1 = data,
                _ => self.prg_bank = data,
            }
            self.load = MMC1_LOAD_EMPTY;
        }
    }

    fn chr_index(&self, addr: u16) -> usize {
        let addr = addr as usize;
        if (self.control & 0x10) == 0 {
            // One 8 KiB bank, low bank bit ignored
            let bank = (self.chr_bank0 as usize & 0x1E) % self.chr_bank_count_4k();
            (bank * 0x1000 + addr) % self.chr.len()
        } else if addr < 0x1000 {
            let bank = (self.chr_bank0 as usize) % self.chr_bank_count_4k();
            (bank * 0x1000 + addr) % self.chr.len()
        } else {
            let bank = (self.chr_bank1 as usize) % self.chr_bank_count_4k();
            (bank * 0x1000 + (addr - 0x1000)) % self.chr.len()
        }
    }

    fn ppu_read(&self, addr: u16) -> Option<u8> {
        if addr < 0x2000 {
            Some(self.chr[self.chr_index(addr)])
        } else {
            None
        }
    }

    fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        if addr < 0x2000 {
            if self.chr_is_ram {
                let idx = self.chr_index(addr);
                self.chr[idx] = value;
            }
            true
        } else {
            false
        }
    }

    fn ppu_remap_address(&self, addr: u16) -> Option<u16> {
        if !(0x2000..0x3000).contains(&addr) {
            return None;
        }

        Some(match self.control & 0x03 {
            0 => 0x2000 | (addr & 0x03FF),
            1 => 0x2400 | (addr & 0x03FF),
            2 => remap_vertical(addr),
            _ => remap_horizontal(addr),
        })
    }
}

/// Mapper 2: switchable 16 KiB window at $8000, last bank fixed at
/// $C000, 8 KiB of CHR-RAM.
pub struct Uxrom {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    bank_select: u8,
}

impl Uxrom {
    fn new(cart: Cartridge) -> Self {
        Self {
            prg_rom: cart.prg_rom,
            chr: cart.chr,
            chr_is_ram: cart.chr_is_ram,
            bank_select: 0,
        }
    }

    fn reset(&mut self, _coldstart: bool) {
        self.bank_select = 0;
    }

    fn prg_bank_count(&self) -> usize {
        (self.prg_rom.len() / 0x4000).max(1)
    }

    fn read_prg_16k(&self, bank: usize, offset: usize) -> u8 {
        let bank = bank % self.prg_bank_count();
        self.prg_rom[(bank * 0x4000 + offset) % self.prg_rom.len()]
    }

    fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0xBFFF => {
                self.read_prg_16k(self.bank_select as usize, (addr as usize) - 0x8000)
            }
            0xC000..=0xFFFF => {
                self.read_prg_16k(self.prg_bank_count() - 1, (addr as usize) - 0xC000)
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.bank_select = value & 0x0F;
        }
    }

    fn ppu_read(&self, addr: u16) -> Option<u8> {
        if addr < 0x2000 {
            Some(self.chr[(addr as usize) % self.chr.len()])
        } else {
            None
        }
    }

    fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        if addr < 0x2000 {
            if self.chr_is_ram {
                let idx = (addr as usize) % self.chr.len();
                self.chr[idx] = value;
            }
            true
        } else {
            false
        }
    }
}

/// Mapper 3: fixed PRG, single switchable 8 KiB CHR bank.
pub struct Cnrom {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    chr_bank: u8,
}

impl Cnrom {
    fn new(cart: Cartridge) -> Self {
        Self {
            prg_rom: cart.prg_rom,
            chr: cart.chr,
            chr_is_ram: cart.chr_is_ram,
            chr_bank: 0,
        }
    }

    fn reset(&mut self, _coldstart: bool) {
        self.chr_bank = 0;
    }

    fn chr_bank_count(&self) -> usize {
        (self.chr.len() / 0x2000).max(1)
    }

    fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0xFFFF => {
                let mut idx = (addr as usize) - 0x8000;
                if self.prg_rom.len() == 0x4000 {
                    idx &= 0x3FFF;
                }
                self.prg_rom[idx % self.prg_rom.len()]
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.chr_bank = value % self.chr_bank_count() as u8;
        }
    }

    fn chr_index(&self, addr: u16) -> usize {
        let bank = (self.chr_bank as usize) % self.chr_bank_count();
        (bank * 0x2000 + ((addr as usize) & 0x1FFF)) % self.chr.len()
    }

    fn ppu_read(&self, addr: u16) -> Option<u8> {
        if addr < 0x2000 {
            Some(self.chr[self.chr_index(addr)])
        } else {
            None
        }
    }

    fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        if addr < 0x2000 {
            if self.chr_is_ram {
                let idx = self.chr_index(addr);
                self.chr[idx] = value;
            }
            true
        } else {
            false
        }
    }
}

/// Mapper 4: eight bank-data registers behind a select port, PRG/CHR mode
/// flags, runtime mirroring, and the scanline IRQ counter clocked by
/// filtered A12 rising edges on the PPU address bus.
pub struct Mmc3 {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    prg_ram: Vec<u8>,
    four_screen: bool,

    bank_select: u8,
    bank_regs: [u8; 8],
    mirroring_horizontal: bool,

    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,

    last_a12_addr: u16,
    last_a12_clock: u64,
}

impl Mmc3 {
    fn new(cart: Cartridge) -> Self {
        Self {
            prg_rom: cart.prg_rom,
            chr: cart.chr,
            chr_is_ram: cart.chr_is_ram,
            prg_ram: vec![0; 8 * 1024],
            four_screen: cart.mirroring == Mirroring::FourScreen,
            bank_select: 0,
            bank_regs: [0; 8],
            mirroring_horizontal: cart.mirroring == Mirroring::Horizontal,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
            last_a12_addr: 0xFFFF,
            last_a12_clock: 0,
        }
    }

    fn reset(&mut self, _coldstart: bool) {
        self.bank_select = 0;
        self.bank_regs = [0; 8];
        self.irq_latch = 0;
        self.irq_counter = 0;
        self.irq_reload = false;
        self.irq_enabled = false;
        self.irq_pending = false;
        self.last_a12_addr = 0xFFFF;
        self.last_a12_clock = 0;
    }

    fn prg_bank_count(&self) -> usize {
        (self.prg_rom.len() / 0x2000).max(1)
    }

    fn chr_bank_count(&self) -> usize {
        (self.chr.len() / 0x0400).max(1)
    }

    fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr as usize) & 0x1FFF],
            0x8000..=0xFFFF => {
                let last = self.prg_bank_count() - 1;
                let second_last = self.prg_bank_count().saturating_sub(2);
                let swap = (self.bank_select & 0x40) != 0;

                let bank = match addr {
                    0x8000..=0x9FFF => {
                        if swap {
                            second_last
                        } else {
                            (self.bank_regs[6] & 0x3F) as usize
                        }
                    }
                    0xA000..=0xBFFF => (self.bank_regs[7] & 0x3F) as usize,
                    0xC000..=0xDFFF => {
                        if swap {
                            (self.bank_regs[6] & 0x3F) as usize
                        } else {
                            second_last
                        }
                    }
                    _ => last,
                };

                let bank = bank % self.prg_bank_count();
                let idx = bank * 0x2000 + ((addr as usize) & 0x1FFF);
                self.prg_rom[idx % self.prg_rom.len()]
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr as usize) & 0x1FFF] = value,
            0x8000..=0x9FFF => {
                if (addr & 1) == 0 {
                    self.bank_select = value;
                } else {
                    self.bank_regs[(self.bank_select & 0x07) as usize] = value;
                }
            }
            0xA000..=0xBFFF => {
                if (addr & 1) == 0 {
                    self.mirroring_horizontal = (value & 0x01) != 0;
                }
                // Odd: PRG-RAM protect, accepted but not enforced
            }
            0xC000..=0xDFFF => {
                if (addr & 1) == 0 {
                    self.irq_latch = value;
                } else {
                    self.irq_reload = true;
                }
            }
            0xE000..=0xFFFF => {
                if (addr & 1) == 0 {
                    self.irq_enabled = false;
                    self.irq_pending = false;
                } else {
                    self.irq_enabled = true;
                }
            }
            _ => {}
        }
    }

    fn chr_index(&self, addr: u16) -> usize {
        let r0 = self.bank_regs[0] & 0xFE;
        let r1 = self.bank_regs[1] & 0xFE;
        let [r2, r3, r4, r5] = [
            self.bank_regs[2],
            self.bank_regs[3],
            self.bank_regs[4],
            self.bank_regs[5],
        ];

        // The 2 KiB windows (R0/R1) and the four 1 KiB windows (R2-R5)
        // swap pattern-table halves when bank_select bit 7 is set.
        let banks = if (self.bank_select & 0x80) == 0 {
            [r0, r0 | 1, r1, r1 | 1, r2, r3, r4, r5]
        } else {
            [r2, r3, r4, r5, r0, r0 | 1, r1, r1 | 1]
        };

        let slot = (addr as usize >> 10) & 0x07;
        let bank = (banks[slot] as usize) % self.chr_bank_count();
        (bank * 0x0400 + ((addr as usize) & 0x03FF)) % self.chr.len()
    }

    // IRQ counter clocks on A12 rising edges, low-pass filtered: edges
    // are only sampled when more than three PPU cycles have elapsed since
    // the previous sample.
    fn observe_a12(&mut self, addr: u16, ppu_clocks: u64) {
        if ppu_clocks.wrapping_sub(self.last_a12_clock) > 3 {
            let was_low = (self.last_a12_addr & 0x1000) == 0;
            let is_high = (addr & 0x1000) != 0;

            self.last_a12_clock = ppu_clocks;
            self.last_a12_addr = addr;

            if was_low && is_high {
                self.clock_irq_counter();
            }
        }
    }

    fn clock_irq_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }

        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }

    fn ppu_read(&mut self, addr: u16, ppu_clocks: u64) -> Option<u8> {
        if addr < 0x2000 {
            self.observe_a12(addr, ppu_clocks);
            Some(self.chr[self.chr_index(addr)])
        } else {
            None
        }
    }

    fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        if addr < 0x2000 {
            if self.chr_is_ram {
                let idx = self.chr_index(addr);
                self.chr[idx] = value;
            }
            true
        } else {
            false
        }
    }

    fn ppu_remap_address(&self, addr: u16) -> Option<u16> {
        if !(0x2000..0x3000).contains(&addr) || self.four_screen {
            return None;
        }

        Some(if self.mirroring_horizontal {
            remap_horizontal(addr)
        } else {
            remap_vertical(addr)
        })
    }
}

/// Owns the loaded image and the active mapper; routes bus accesses and
/// applies the header-default nametable mirroring when the mapper does
/// not claim the address.
pub struct GamePak {
    mapper: Mapper,
    mirroring: Mirroring,
}

impl GamePak {
    pub fn new(cart: Cartridge) -> Self {
        let mirroring = cart.mirroring;
        Self {
            mapper: Mapper::new(cart),
            mirroring,
        }
    }

    pub fn mapper_name(&self) -> &'static str {
        self.mapper.name()
    }

    pub fn reset(&mut self, coldstart: bool) {
        self.mapper.reset(coldstart);
    }

    pub fn cpu_read(&self, addr: u16) -> u8 {
        self.mapper.cpu_read(addr)
    }

    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        self.mapper.cpu_write(addr, value);
    }

    pub fn ppu_read(&mut self, addr: u16, ppu_clocks: u64) -> Option<u8> {
        self.mapper.ppu_read(addr, ppu_clocks)
    }

    pub fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        self.mapper.ppu_write(addr, value)
    }

    pub fn ppu_remap_address(&self, addr: u16) -> u16 {
        if let Some(claimed) = self.mapper.ppu_remap_address(addr) {
            return claimed;
        }

        if (0x2000..0x3000).contains(&addr) && self.mirroring != Mirroring::FourScreen {
            match self.mirroring {
                Mirroring::Horizontal => remap_horizontal(addr),
                _ => remap_vertical(addr),
            }
        } else {
            addr
        }
    }

    pub fn irq_pending(&self) -> bool {
        self.mapper.irq_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned_banks(total_size: usize, bank_size: usize) -> Vec<u8> {
        let mut data = vec![0u8; total_size];
        for (bank, chunk) in data.chunks_mut(bank_size).enumerate() {
            chunk.fill((bank as u8).wrapping_add(1));
        }
        data
    }

    fn make_cart(mapper_id: u8, prg_rom: Vec<u8>, chr: Vec<u8>, chr_is_ram: bool) -> Cartridge {
        let prg_banks = (prg_rom.len() / 0x4000) as u8;
        let chr_banks = if chr_is_ram {
            0
        } else {
            (chr.len() / 0x2000) as u8
        };
        Cartridge {
            mapper_id,
            mirroring: Mirroring::Horizontal,
            prg_rom,
            chr,
            chr_is_ram,
            prg_banks,
            chr_banks,
        }
    }

    fn mmc1_write_bits(mapper: &mut Mmc1, addr: u16, bits: [u8; 5]) {
        for bit in bits {
            mapper.cpu_write(addr, bit);
        }
    }

    #[test]
    fn nrom_mirrors_16k_prg_into_both_windows() {
        let mut prg = vec![0u8; 0x4000];
        prg[0x1234] = 0x42;
        let mut mapper = Nrom::new(make_cart(0, prg, vec![0; 0x2000], false));

        assert_eq!(mapper.cpu_read(0x9234), 0x42);
        assert_eq!(mapper.cpu_read(0xD234), 0x42);
        mapper.ppu_write(0x0000, 0xAA);
        assert_eq!(mapper.ppu_read(0x0000), Some(0x00));
    }

    #[test]
    fn nrom_chr_ram_accepts_writes() {
        let mut mapper = Nrom::new(make_cart(0, vec![0; 0x8000], vec![0; 0x2000], true));
        mapper.ppu_write(0x01FF, 0x5A);
        assert_eq!(mapper.ppu_read(0x01FF), Some(0x5A));
    }

    #[test]
    fn mmc1_assembles_five_serial_writes() {
        let prg = patterned_banks(4 * 0x4000, 0x4000);
        let mut mapper = Mmc1::new(make_cart(1, prg, vec![0; 0x2000], false));

        // control := 0b01100 (fixed-last PRG mode, LSB first)
        mmc1_write_bits(&mut mapper, 0x8000, [0, 0, 1, 1, 0]);
        assert_eq!(mapper.control, 0x0C);

        // prg := 0b00011
        mmc1_write_bits(&mut mapper, 0xE000, [1, 1, 0, 0, 0]);
        assert_eq!(mapper.prg_bank, 0x03);

        // Fixed-last mode: the switched bank sits at $8000, the last bank
        // at $C000
        mmc1_write_bits(&mut mapper, 0xE000, [0, 1, 0, 0, 0]);
        assert_eq!(mapper.cpu_read(0x8000), 3);
        assert_eq!(mapper.cpu_read(0xC000), 4);
    }

    #[test]
    fn mmc1_bit7_write_resets_shifter_and_forces_fixed_last() {
        let prg = patterned_banks(4 * 0x4000, 0x4000);
        let mut mapper = Mmc1::new(make_cart(1, prg, vec![0; 0x2000], false));

        mmc1_write_bits(&mut mapper, 0x8000, [0, 0, 0, 0, 0]);
        assert_eq!(mapper.control, 0x00);

        mapper.cpu_write(0x8000, 0x80);
        assert_eq!(mapper.control & 0x0C, 0x0C);
        assert_eq!(mapper.load, MMC1_LOAD_EMPTY);
    }

    #[test]
    fn mmc1_one_screen_mirroring_claims_nametables() {
        let prg = patterned_banks(2 * 0x4000, 0x4000);
        let mut mapper = Mmc1::new(make_cart(1, prg, vec![0; 0x2000], false));

        // control := 0 (one-screen lower)
        mmc1_write_bits(&mut mapper, 0x8000, [0, 0, 0, 0, 0]);
        assert_eq!(mapper.ppu_remap_address(0x2C05), Some(0x2005));

        // control := 1 (one-screen upper)
        mmc1_write_bits(&mut mapper, 0x8000, [1, 0, 0, 0, 0]);
        assert_eq!(mapper.ppu_remap_address(0x2C05), Some(0x2405));
    }

    #[test]
    fn uxrom_switches_low_window_and_fixes_last() {
        let prg = patterned_banks(3 * 0x4000, 0x4000);
        let mut mapper = Uxrom::new(make_cart(2, prg, vec![0; 0x2000], true));

        mapper.cpu_write(0x8000, 1);
        assert_eq!(mapper.cpu_read(0x8000), 2);
        assert_eq!(mapper.cpu_read(0xC000), 3);
    }

    #[test]
    fn cnrom_selects_chr_bank_masked_by_bank_count() {
        let prg = patterned_banks(0x8000, 0x4000);
        let chr = patterned_banks(2 * 0x2000, 0x2000);
        let mut mapper = Cnrom::new(make_cart(3, prg, chr, false));

        mapper.cpu_write(0x8000, 1);
        assert_eq!(mapper.ppu_read(0x0000), Some(2));

        // Selecting past the declared bank count wraps
        mapper.cpu_write(0x8000, 2);
        assert_eq!(mapper.ppu_read(0x0000), Some(1));
    }

    #[test]
    fn mmc3_prg_fixed_banks_follow_mode_flag() {
        let prg = patterned_banks(8 * 0x2000, 0x2000);
        let chr = patterned_banks(8 * 0x0400, 0x0400);
        let mut mapper = Mmc3::new(make_cart(4, prg, chr, false));

        mapper.cpu_write(0x8000, 6);
        mapper.cpu_write(0x8001, 2);
        mapper.cpu_write(0x8000, 7);
        mapper.cpu_write(0x8001, 3);

        assert_eq!(mapper.cpu_read(0x8000), 3);
        assert_eq!(mapper.cpu_read(0xA000), 4);
        assert_eq!(mapper.cpu_read(0xC000), 7);
        assert_eq!(mapper.cpu_read(0xE000), 8);

        // PRG mode bit 6 moves R6 to $C000 and the fixed (-2) bank to $8000
        mapper.cpu_write(0x8000, 0x40 | 6);
        assert_eq!(mapper.cpu_read(0x8000), 7);
        assert_eq!(mapper.cpu_read(0xC000), 3);
    }

    #[test]
    fn mmc3_chr_mode_transposes_windows() {
        let prg = patterned_banks(4 * 0x2000, 0x2000);
        let chr = patterned_banks(8 * 0x0400, 0x0400);
        let mut mapper = Mmc3::new(make_cart(4, prg, chr, false));

        for (reg, bank) in [(0u8, 4u8), (1, 6), (2, 0), (3, 1), (4, 2), (5, 3)] {
            mapper.cpu_write(0x8000, reg);
            mapper.cpu_write(0x8001, bank);
        }

        // Mode 0: R0 spans $0000-$07FF, R2 at $1000
        assert_eq!(mapper.ppu_read(0x0000, 100), Some(5));
        assert_eq!(mapper.ppu_read(0x0400, 200), Some(6));
        assert_eq!(mapper.ppu_read(0x1000, 300), Some(1));

        // Mode 1: transposed
        mapper.cpu_write(0x8000, 0x80);
        assert_eq!(mapper.ppu_read(0x0000, 400), Some(1));
        assert_eq!(mapper.ppu_read(0x1000, 500), Some(5));
        assert_eq!(mapper.ppu_read(0x1400, 600), Some(6));
    }

    #[test]
    fn mmc3_irq_counts_filtered_a12_edges() {
        let prg = patterned_banks(4 * 0x2000, 0x2000);
        let chr = patterned_banks(8 * 0x0400, 0x0400);
        let mut mapper = Mmc3::new(make_cart(4, prg, chr, false));

        mapper.cpu_write(0xC000, 1); // latch
        mapper.cpu_write(0xC001, 0); // reload on next clock
        mapper.cpu_write(0xE001, 0); // enable

        let mut clock = 0u64;
        let mut edge = |mapper: &mut Mmc3| {
            clock += 8;
            mapper.ppu_read(0x0000, clock);
            clock += 8;
            mapper.ppu_read(0x1000, clock);
        };

        // First edge reloads the counter with the latch, second counts to
        // zero and asserts.
        edge(&mut mapper);
        assert!(!mapper.irq_pending);
        edge(&mut mapper);
        assert!(mapper.irq_pending);

        // Disable acknowledges the line
        mapper.cpu_write(0xE000, 0);
        assert!(!mapper.irq_pending);
    }

    #[test]
    fn mmc3_a12_filter_ignores_fast_toggles() {
        let prg = patterned_banks(4 * 0x2000, 0x2000);
        let chr = patterned_banks(8 * 0x0400, 0x0400);
        let mut mapper = Mmc3::new(make_cart(4, prg, chr, false));

        mapper.cpu_write(0xC000, 0);
        mapper.cpu_write(0xC001, 0);
        mapper.cpu_write(0xE001, 0);

        // Consecutive-cycle toggles never pass the filter
        for clock in 0..32u64 {
            let addr = if clock & 1 == 0 { 0x0000 } else { 0x1000 };
            mapper.ppu_read(addr, 10 + clock);
        }
        assert!(!mapper.irq_pending);
    }

    #[test]
    fn mmc3_mirroring_register_switches_arrangement() {
        let prg = patterned_banks(4 * 0x2000, 0x2000);
        let chr = patterned_banks(8 * 0x0400, 0x0400);
        let mut mapper = Mmc3::new(make_cart(4, prg, chr, false));

        mapper.cpu_write(0xA000, 0); // vertical
        assert_eq!(mapper.ppu_remap_address(0x2800), Some(0x2000));
        mapper.cpu_write(0xA000, 1); // horizontal
        assert_eq!(mapper.ppu_remap_address(0x2800), Some(0x2400));
    }

    #[test]
    fn game_pak_applies_header_mirroring_when_unclaimed() {
        let prg = patterned_banks(2 * 0x4000, 0x4000);
        let pak = GamePak::new(make_cart(0, prg, vec![0; 0x2000], false));

        // Horizontal header: $2400 folds onto $2000, $2800 onto $2400
        assert_eq!(pak.ppu_remap_address(0x2401), 0x2001);
        assert_eq!(pak.ppu_remap_address(0x2801), 0x2401);
        assert_eq!(pak.ppu_remap_address(0x2C01), 0x2401);
    }
}
