//! Key-value persistence port.
//!
//! Components persist through this trait only; the NVS adapter (and the
//! in-memory host backend) live in `adapters::nvs`. Methods take `&self`
//! because flash is one physical resource shared by every counter and FSM
//! block — implementations serialize access internally, so callers can
//! hold a shared `Arc<dyn Storage>` without an outer lock.
//!
//! Absence is not failure: reading or erasing a key that was never
//! written yields [`Error::NoData`], which callers treat as "start from
//! scratch".

use std::sync::Arc;

use crate::error::{Error, Result};

/// NVS limits keys to 15 bytes; longer ids are clipped at this length.
pub const MAX_KEY_LEN: usize = 15;

pub trait Storage: Send + Sync {
    /// Reads the value at `key` into `buf`, returning the number of bytes
    /// copied. `Err(NoData)` when the key is absent.
    fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize>;

    /// Writes `data` at `key`, replacing any previous value.
    fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Removes `key`. `Err(NoData)` when nothing was stored there.
    fn erase(&self, key: &str) -> Result<()>;
}

/// Clips an id to [`MAX_KEY_LEN`] bytes, respecting char boundaries.
pub fn clip_key(id: &str) -> heapless::String<MAX_KEY_LEN> {
    let mut end = id.len().min(MAX_KEY_LEN);
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    let mut key = heapless::String::new();
    let _ = key.push_str(&id[..end]);
    key
}

/// Reads a little-endian `u64` cell. Short or absent cells are `NoData`.
pub fn read_u64(storage: &Arc<dyn Storage>, key: &str) -> Result<u64> {
    let mut buf = [0u8; 8];
    let read = storage.read(key, &mut buf)?;
    if read != buf.len() {
        return Err(Error::NoData);
    }
    Ok(u64::from_le_bytes(buf))
}

/// Writes a little-endian `u64` cell.
pub fn write_u64(storage: &Arc<dyn Storage>, key: &str, value: u64) -> Result<()> {
    storage.write(key, &value.to_le_bytes())
}
