//! Cartridge loading: reads a ROM image from disk, parses its header, and exposes the
//! no-MBC read/write semantics this core supports (§6 Non-goals: bank-switching
//! controllers beyond the fixed 32 KiB case are out of scope).

pub mod header;

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::EmuError;
use header::CartridgeHeader;

const MIN_ROM_LEN: usize = 0x0150;
const ROM_ONLY_LEN: usize = 0x8000;

pub struct Cartridge {
    pub header: CartridgeHeader,
    rom: Vec<u8>,
}

impl Cartridge {
    /// Load a ROM image from `path`, parse its header, and warn (never fail) on a
    /// header checksum mismatch.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EmuError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| EmuError::RomRead {
            path: path.to_path_buf(),
            source,
        })?;

        if bytes.len() < MIN_ROM_LEN {
            return Err(EmuError::RomTooSmall {
                path: path.to_path_buf(),
                len: bytes.len(),
            });
        }

        let header = CartridgeHeader::parse(&bytes)
            .expect("length already checked above against MIN_ROM_LEN");

        if !header.header_checksum_valid {
            warn!(
                "cartridge {:?}: header checksum mismatch (stored {:#04x})",
                header.title, header.header_checksum
            );
        }

        info!(
            "loaded cartridge {:?} ({} bytes, type {:?})",
            header.title,
            bytes.len(),
            header.cartridge_type()
        );

        Ok(Self { header, rom: bytes })
    }

    /// Build a cartridge directly from an in-memory image, used for test ROMs and the
    /// `--testing` CLI path where no MBC0 padding guarantee is made by the source file.
    pub fn from_bytes(rom: Vec<u8>) -> Result<Self, EmuError> {
        if rom.len() < MIN_ROM_LEN {
            return Err(EmuError::RomTooSmall {
                path: Path::new("<memory>").to_path_buf(),
                len: rom.len(),
            });
        }
        let header = CartridgeHeader::parse(&rom)
            .expect("length already checked above against MIN_ROM_LEN");
        Ok(Self { header, rom })
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    /// Read a byte from `0000-7FFF`. Addresses beyond the loaded image (a ROM shorter
    /// than the documented 32 KiB no-MBC size) read as `0xFF`, matching an unmapped bus.
    pub fn read8(&self, addr: u16) -> u8 {
        self.rom.get(addr as usize).copied().unwrap_or(0xFF)
    }

    /// Writes to ROM are discarded; no-MBC cartridges have no bank-select registers to
    /// hit.
    pub fn write8(&mut self, _addr: u16, _value: u8) {}

    pub fn rom_len(&self) -> usize {
        self.rom.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_only_image(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len.max(MIN_ROM_LEN)];
        bytes[0x0134..0x0139].copy_from_slice(b"GAME\0");
        bytes[0x0147] = 0x00; // ROM ONLY
        bytes
    }

    #[test]
    fn loads_from_bytes_and_exposes_title() {
        let cart = Cartridge::from_bytes(rom_only_image(ROM_ONLY_LEN)).unwrap();
        assert_eq!(cart.title(), "GAME");
    }

    #[test]
    fn reads_within_bounds_return_stored_bytes() {
        let mut image = rom_only_image(ROM_ONLY_LEN);
        image[0x4000] = 0xAB;
        let cart = Cartridge::from_bytes(image).unwrap();
        assert_eq!(cart.read8(0x4000), 0xAB);
    }

    #[test]
    fn reads_past_image_end_return_0xff() {
        let cart = Cartridge::from_bytes(rom_only_image(MIN_ROM_LEN)).unwrap();
        assert_eq!(cart.read8(0x7FFF), 0xFF);
    }

    #[test]
    fn writes_to_rom_are_discarded() {
        let mut cart = Cartridge::from_bytes(rom_only_image(ROM_ONLY_LEN)).unwrap();
        cart.write8(0x2000, 0x01);
        assert_eq!(cart.read8(0x2000), 0x00);
    }

    #[test]
    fn too_short_image_is_rejected() {
        let err = Cartridge::from_bytes(vec![0u8; 16]).unwrap_err();
        assert!(matches!(err, EmuError::RomTooSmall { .. }));
    }
}
