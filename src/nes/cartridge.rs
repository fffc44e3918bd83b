use log::{debug, info};
use std::{fs, io, path::Path};
use thiserror::Error;

/// Load-time failures. Runtime has no recoverable errors: unknown opcodes
/// halt the CPU, unmapped accesses read 0 / discard writes.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("missing iNES magic, expected NES<EOF>")]
    BadMagic,
    #[error("NES 2.0 images are not supported")]
    Nes2Unsupported,
    #[error("image ends before the {0} payload is complete")]
    ShortRead(&'static str),
    #[error("mapper {0} is not supported (supported: 0, 1, 2, 3, 4)")]
    UnsupportedMapper(u8),
    #[error("failed to read image")]
    Io(#[from] io::Error),
}

/// Header-declared nametable arrangement. MMC1 and MMC3 override this at
/// runtime; everything else uses the header bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

/// A parsed iNES image: raw PRG/CHR payloads plus the header fields the
/// core consumes. Read-mostly after load; CHR is writable when the header
/// declared zero CHR banks (CHR-RAM carts).
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub mapper_id: u8,
    pub mirroring: Mirroring,
    pub prg_rom: Vec<u8>,
    pub chr: Vec<u8>,
    pub chr_is_ram: bool,
    pub prg_banks: u8,
    pub chr_banks: u8,
}

const PRG_BANK_SIZE: usize = 16 * 1024;
const CHR_BANK_SIZE: usize = 8 * 1024;
const TRAINER_SIZE: usize = 512;

impl Cartridge {
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let bytes = fs::read(path)?;
        info!("loaded {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < 16 {
            return Err(LoadError::ShortRead("header"));
        }
        if &bytes[0..4] != b"NES\x1A" {
            return Err(LoadError::BadMagic);
        }

        let flags6 = bytes[6];
        let flags7 = bytes[7];

        // Flags 7 bits 2-3 are the format discriminator; 0b10 marks NES 2.0.
        if (flags7 & 0x0C) == 0x08 {
            return Err(LoadError::Nes2Unsupported);
        }

        let mapper_id = (flags6 >> 4) | (flags7 & 0xF0);
        if mapper_id > 4 {
            return Err(LoadError::UnsupportedMapper(mapper_id));
        }

        let mirroring = if (flags6 & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let prg_banks = bytes[4];
        let chr_banks = bytes[5];
        let prg_size = prg_banks as usize * PRG_BANK_SIZE;
        let chr_size = chr_banks as usize * CHR_BANK_SIZE;

        let mut cursor = 16usize;
        if (flags6 & 0x04) != 0 {
            debug!("skipping 512-byte trainer");
            cursor += TRAINER_SIZE;
            if bytes.len() < cursor {
                return Err(LoadError::ShortRead("trainer"));
            }
        }

        if bytes.len() < cursor + prg_size {
            return Err(LoadError::ShortRead("PRG ROM"));
        }
        let prg_rom = bytes[cursor..cursor + prg_size].to_vec();
        cursor += prg_size;

        // Zero declared CHR banks means the cart carries 8 KiB of CHR-RAM
        // instead of CHR-ROM.
        let (chr, chr_is_ram) = if chr_banks == 0 {
            (vec![0; CHR_BANK_SIZE], true)
        } else {
            if bytes.len() < cursor + chr_size {
                return Err(LoadError::ShortRead("CHR ROM"));
            }
            (bytes[cursor..cursor + chr_size].to_vec(), false)
        };

        debug!(
            "iNES image: mapper {mapper_id}, {prg_banks}x16K PRG, {chr_banks}x8K CHR{}, {mirroring:?}",
            if chr_is_ram { " (RAM)" } else { "" }
        );

        Ok(Self {
            mapper_id,
            mirroring,
            prg_rom,
            chr,
            chr_is_ram,
            prg_banks,
            chr_banks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(prg_banks: u8, chr_banks: u8, flags6: u8, flags7: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 16];
        bytes[0..4].copy_from_slice(b"NES\x1A");
        bytes[4] = prg_banks;
        bytes[5] = chr_banks;
        bytes[6] = flags6;
        bytes[7] = flags7;
        bytes.resize(
            16 + prg_banks as usize * 0x4000 + chr_banks as usize * 0x2000,
            0,
        );
        bytes
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = image(1, 1, 0, 0);
        bytes[3] = 0;
        assert!(matches!(
            Cartridge::from_bytes(&bytes),
            Err(LoadError::BadMagic)
        ));
    }

    #[test]
    fn rejects_nes2_discriminator() {
        let bytes = image(1, 1, 0, 0x08);
        assert!(matches!(
            Cartridge::from_bytes(&bytes),
            Err(LoadError::Nes2Unsupported)
        ));
    }

    #[test]
    fn rejects_unsupported_mapper() {
        let bytes = image(1, 1, 0x50, 0);
        assert!(matches!(
            Cartridge::from_bytes(&bytes),
            Err(LoadError::UnsupportedMapper(5))
        ));
    }

    #[test]
    fn rejects_truncated_prg() {
        let mut bytes = image(2, 1, 0, 0);
        bytes.truncate(16 + 0x4000);
        assert!(matches!(
            Cartridge::from_bytes(&bytes),
            Err(LoadError::ShortRead("PRG ROM"))
        ));
    }

    #[test]
    fn chr_banks_zero_allocates_chr_ram() {
        let bytes = image(1, 0, 0, 0);
        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert!(cart.chr_is_ram);
        assert_eq!(cart.chr.len(), 8 * 1024);
    }

    #[test]
    fn trainer_is_skipped() {
        let mut bytes = vec![0u8; 16];
        bytes[0..4].copy_from_slice(b"NES\x1A");
        bytes[4] = 1;
        bytes[5] = 1;
        bytes[6] = 0x04;
        bytes.resize(16 + 512, 0xEE);
        let mut prg = vec![0u8; 0x4000];
        prg[0] = 0xAB;
        bytes.extend_from_slice(&prg);
        bytes.extend_from_slice(&vec![0u8; 0x2000]);

        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert_eq!(cart.prg_rom[0], 0xAB);
    }

    #[test]
    fn mapper_number_combines_both_nibbles() {
        let bytes = image(1, 1, 0x40, 0x00);
        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert_eq!(cart.mapper_id, 4);
    }
}
