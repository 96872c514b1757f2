//! Single-record [`Storage`] in the last flash sector.
//!
//! # Flash Layout
//!
//! ```text
//! [Firmware]        0x000000 - 0x1FF000  (memory.x FLASH region)
//! [Storage sector]  0x1FF000 - 0x200000  (4 KB, this module)
//! ```
//!
//! The sector holds one record at its start, written as a single page:
//!
//! ```text
//! magic "PADK" | key_len: u8 | data_len: u16 LE | key | data | 0xFF padding
//! ```
//!
//! Only the most recent key survives a write. The controller stores a single
//! calibration blob, so one record is all it needs.

use embassy_rp::flash::{Blocking, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use pad_core::{Storage, StorageError};

/// Total flash size of the board.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Offset of the storage sector (last 4 KB).
pub const STORAGE_OFFSET: u32 = (FLASH_SIZE - ERASE_SIZE) as u32;

const MAGIC: [u8; 4] = *b"PADK";
const HEADER_SIZE: usize = MAGIC.len() + 1 + 2;
const PAGE_SIZE: usize = 256;

/// Blocking flash driver for the board.
pub type BoardFlash = Flash<'static, FLASH, Blocking, FLASH_SIZE>;

/// Record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    key_len: usize,
    data_len: usize,
}

impl Header {
    fn parse(bytes: &[u8; HEADER_SIZE]) -> Option<Self> {
        if bytes[..MAGIC.len()] != MAGIC {
            return None;
        }
        let key_len = usize::from(bytes[4]);
        let data_len = usize::from(u16::from_le_bytes([bytes[5], bytes[6]]));
        // An erased or torn record can carry lengths past the page
        if HEADER_SIZE + key_len + data_len > PAGE_SIZE {
            return None;
        }
        Some(Self { key_len, data_len })
    }
}

/// Encode one record into a page, padded with the erased value.
fn encode_record(key: &str, value: &[u8]) -> Result<[u8; PAGE_SIZE], StorageError> {
    let key = key.as_bytes();
    let total = HEADER_SIZE + key.len() + value.len();
    if key.len() > usize::from(u8::MAX) || total > PAGE_SIZE {
        return Err(StorageError::TooLarge);
    }

    let mut page = [0xFFu8; PAGE_SIZE];
    page[..MAGIC.len()].copy_from_slice(&MAGIC);
    page[4] = key.len() as u8;
    page[5..HEADER_SIZE].copy_from_slice(&(value.len() as u16).to_le_bytes());
    page[HEADER_SIZE..HEADER_SIZE + key.len()].copy_from_slice(key);
    page[HEADER_SIZE + key.len()..total].copy_from_slice(value);
    Ok(page)
}

/// [`Storage`] over the on-board QSPI flash.
pub struct FlashStorage {
    flash: BoardFlash,
}

impl FlashStorage {
    #[must_use]
    pub fn new(flash: BoardFlash) -> Self {
        Self { flash }
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.flash
            .blocking_read(STORAGE_OFFSET + offset as u32, buf)
            .map_err(|err| {
                defmt::error!("Flash read failed: {}", err);
                StorageError::Io
            })
    }
}

impl Storage for FlashStorage {
    fn get_bytes(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StorageError> {
        let mut raw = [0u8; HEADER_SIZE];
        self.read(0, &mut raw)?;
        let Some(header) = Header::parse(&raw) else {
            return Ok(None);
        };

        let mut stored_key = [0u8; u8::MAX as usize];
        let stored_key = &mut stored_key[..header.key_len];
        self.read(HEADER_SIZE, stored_key)?;
        if stored_key != key.as_bytes() {
            return Ok(None);
        }

        let out = buf
            .get_mut(..header.data_len)
            .ok_or(StorageError::BufferTooSmall)?;
        self.read(HEADER_SIZE + header.key_len, out)?;
        Ok(Some(header.data_len))
    }

    fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let page = encode_record(key, value)?;

        self.flash
            .blocking_erase(STORAGE_OFFSET, STORAGE_OFFSET + ERASE_SIZE as u32)
            .map_err(|err| {
                defmt::error!("Flash erase failed: {}", err);
                StorageError::Io
            })?;
        self.flash
            .blocking_write(STORAGE_OFFSET, &page)
            .map_err(|err| {
                defmt::error!("Flash write failed: {}", err);
                StorageError::Io
            })?;

        defmt::debug!("Stored {} bytes under {}", value.len(), key);
        Ok(())
    }
}
