//! Cartridge mappers and banking.
//!
//! The 6507 sees 4K of cartridge space; anything larger is bank-switched
//! by "hot spot" addresses inside the ROM area. Supported formats:
//!
//! | Size | Scheme | Hot spots        | Notes                         |
//! |------|--------|------------------|-------------------------------|
//! | 2KB  | Rom2k  | none             | mirrored into both halves     |
//! | 4KB  | Rom4k  | none             |                               |
//! | 8KB  | F8     | $1FF8-$1FF9      | optional Superchip RAM        |
//! | 12KB | FA     | $1FF8-$1FFA      | 256 bytes of onboard RAM      |
//! | 16KB | F6     | $1FF6-$1FF9      | optional Superchip RAM        |
//! | 32KB | F4     | $1FF4-$1FFB      | optional Superchip RAM        |
//!
//! Hot spots trigger on *any* access, reads included. The bus also feeds
//! every address through [`Cartridge::listen`] and clocks
//! [`Cartridge::step`] once per CPU cycle; the schemes implemented here
//! ignore both, but the hooks are part of the mapper contract because some
//! schemes bank on non-cartridge accesses or run their own clocks.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vcs_core::logging::{log, LogCategory, LogLevel};

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("cartridge file error: {0}")]
    FileError(String),
    #[error("unsupported cartridge format ({0} bytes)")]
    Unsupported(usize),
    #[error("no cartridge attached")]
    Missing,
    #[error("no such bank {bank} (cartridge has {banks})")]
    NoSuchBank { bank: usize, banks: usize },
    #[error("patch offset {0:#06x} outside cartridge image")]
    PatchOutOfRange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankingScheme {
    Rom2k,
    Rom4k,
    F8,
    FA,
    F6,
    F4,
}

impl BankingScheme {
    fn from_size(size: usize) -> Result<Self, CartridgeError> {
        match size {
            2048 => Ok(BankingScheme::Rom2k),
            4096 => Ok(BankingScheme::Rom4k),
            8192 => Ok(BankingScheme::F8),
            12288 => Ok(BankingScheme::FA),
            16384 => Ok(BankingScheme::F6),
            32768 => Ok(BankingScheme::F4),
            _ => Err(CartridgeError::Unsupported(size)),
        }
    }

    /// (first hot spot offset, bank count) within the 4K window.
    fn hotspots(self) -> Option<(u16, usize)> {
        match self {
            BankingScheme::Rom2k | BankingScheme::Rom4k => None,
            BankingScheme::F8 => Some((0xFF8, 2)),
            BankingScheme::FA => Some((0xFF8, 3)),
            BankingScheme::F6 => Some((0xFF6, 4)),
            BankingScheme::F4 => Some((0xFF4, 8)),
        }
    }

    fn supports_superchip(self) -> bool {
        matches!(self, BankingScheme::F8 | BankingScheme::F6 | BankingScheme::F4)
    }
}

/// Location of onboard cartridge RAM within the 4K window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RamInfo {
    pub label: &'static str,
    pub write_origin: u16,
    pub write_memtop: u16,
    pub read_origin: u16,
    pub read_memtop: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cartridge {
    rom: Vec<u8>,
    scheme: BankingScheme,
    bank: usize,
    /// Superchip (128 bytes) or FA (256 bytes) onboard RAM
    ram: Option<Vec<u8>>,
}

impl Cartridge {
    /// Attach a ROM image, inferring the banking scheme from its size and
    /// probing for a Superchip.
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        let scheme = BankingScheme::from_size(rom.len())?;

        let ram = if scheme == BankingScheme::FA {
            Some(vec![0; 256])
        } else if scheme.supports_superchip() && probe_superchip(&rom) {
            log(LogCategory::Cart, LogLevel::Info, || {
                "superchip RAM detected".to_string()
            });
            Some(vec![0; 128])
        } else {
            None
        };

        Ok(Self {
            rom,
            scheme,
            bank: 0,
            ram,
        })
    }

    /// Attach with an explicit scheme and RAM fitment, bypassing detection.
    pub fn with_scheme(
        rom: Vec<u8>,
        scheme: BankingScheme,
        superchip: bool,
    ) -> Result<Self, CartridgeError> {
        let mut cart = Self::new(rom)?;
        cart.scheme = scheme;
        if superchip && cart.ram.is_none() {
            cart.ram = Some(vec![0; 128]);
        }
        Ok(cart)
    }

    pub fn scheme(&self) -> BankingScheme {
        self.scheme
    }

    pub fn size(&self) -> usize {
        self.rom.len()
    }

    pub fn num_banks(&self) -> usize {
        match self.scheme.hotspots() {
            Some((_, banks)) => banks,
            None => 1,
        }
    }

    /// The bank currently mapped at `addr` (one bank for every scheme
    /// implemented here, but the signature admits segmented mappers).
    pub fn bank(&self, _addr: u16) -> usize {
        self.bank
    }

    pub fn set_bank(&mut self, _addr: u16, bank: usize) -> Result<(), CartridgeError> {
        if bank >= self.num_banks() {
            return Err(CartridgeError::NoSuchBank {
                bank,
                banks: self.num_banks(),
            });
        }
        self.bank = bank;
        Ok(())
    }

    fn check_hotspot(&mut self, offset: u16) {
        if let Some((first, banks)) = self.scheme.hotspots() {
            if offset >= first && offset < first + banks as u16 {
                self.bank = (offset - first) as usize;
            }
        }
    }

    /// RAM window decode: (ram_index, is_read_port).
    fn ram_window(&self, offset: u16) -> Option<(usize, bool)> {
        let ram_len = self.ram.as_ref()?.len() as u16;
        if offset < ram_len {
            Some((offset as usize, false))
        } else if offset < ram_len * 2 {
            Some(((offset - ram_len) as usize, true))
        } else {
            None
        }
    }

    /// CPU read. `addr` is the offset into the 4K cartridge window.
    pub fn read(&mut self, addr: u16) -> u8 {
        let offset = addr & 0xFFF;
        self.check_hotspot(offset);

        if let Some((idx, is_read)) = self.ram_window(offset) {
            if let Some(ram) = &self.ram {
                if is_read {
                    return ram[idx];
                }
                // reading the write port deposits garbage on hardware;
                // returning the cell is the tamest approximation
                return ram[idx];
            }
        }

        match self.scheme {
            BankingScheme::Rom2k => self.rom[(offset & 0x7FF) as usize],
            BankingScheme::Rom4k => self.rom[offset as usize],
            _ => self.rom[self.bank * 4096 + offset as usize],
        }
    }

    /// CPU write: hot spots and onboard RAM.
    pub fn write(&mut self, addr: u16, data: u8) {
        let offset = addr & 0xFFF;
        self.check_hotspot(offset);

        if let Some((idx, false)) = self.ram_window(offset) {
            if let Some(ram) = &mut self.ram {
                ram[idx] = data;
            }
        }
    }

    /// Every bus access, cartridge area or not. The schemes here have no
    /// use for it.
    pub fn listen(&mut self, _addr: u16, _data: u8) {}

    /// One CPU cycle for mappers with independent clocks.
    pub fn step(&mut self) {}

    /// Debugger write into the currently selected bank, bypassing the bus.
    pub fn poke(&mut self, addr: u16, data: u8) -> Result<(), CartridgeError> {
        let offset = (addr & 0xFFF) as usize;
        let base = match self.scheme {
            BankingScheme::Rom2k => offset & 0x7FF,
            BankingScheme::Rom4k => offset,
            _ => self.bank * 4096 + offset,
        };
        match self.rom.get_mut(base) {
            Some(cell) => {
                *cell = data;
                Ok(())
            }
            None => Err(CartridgeError::PatchOutOfRange(base)),
        }
    }

    /// Patch a byte of the ROM image itself, as though the file on disk
    /// had been edited.
    pub fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartridgeError> {
        match self.rom.get_mut(offset) {
            Some(cell) => {
                *cell = data;
                Ok(())
            }
            None => Err(CartridgeError::PatchOutOfRange(offset)),
        }
    }

    /// Onboard RAM layout, if the cartridge carries any.
    pub fn ram_info(&self) -> Option<RamInfo> {
        let ram = self.ram.as_ref()?;
        let len = ram.len() as u16;
        Some(RamInfo {
            label: if len == 256 { "CBS RAM Plus" } else { "Superchip" },
            write_origin: 0x1000,
            write_memtop: 0x1000 + len - 1,
            read_origin: 0x1000 + len,
            read_memtop: 0x1000 + len * 2 - 1,
        })
    }

    pub fn ram(&self) -> Option<&[u8]> {
        self.ram.as_deref()
    }
}

/// Superchip heuristic: carts with the extra RAM can't place code in the
/// first 256 bytes of a bank (they decode as the RAM ports), so images pad
/// the region with repeated filler.
fn probe_superchip(rom: &[u8]) -> bool {
    rom.chunks(4096)
        .all(|bank| bank.len() == 4096 && bank[..128] == bank[128..256])
}
