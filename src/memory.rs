//! Typed, bounds-checked access to guest linear memory.
//!
//! Host functions obtain the raw memory slice from wasmtime
//! (`Memory::data_and_store_mut`) and wrap it in a [`MemoryView`] for the
//! duration of one intrinsic. Pointers arriving from the guest are `i32`
//! and are reinterpreted as unsigned offsets; any access outside the
//! current memory size is fatal to the action.

use crate::errors::HostError;
use anyhow::Result;

pub struct MemoryView<'a> {
    data: &'a mut [u8],
}

impl<'a> MemoryView<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        MemoryView { data }
    }

    fn range(&self, ptr: i32, len: usize) -> Result<std::ops::Range<usize>> {
        let start = ptr as u32 as usize;
        let end = start.checked_add(len).ok_or(HostError::MemoryAccess {
            offset: start as u64,
            len: len as u64,
            size: self.data.len() as u64,
        })?;
        if end > self.data.len() {
            return Err(HostError::MemoryAccess {
                offset: start as u64,
                len: len as u64,
                size: self.data.len() as u64,
            }
            .into());
        }
        Ok(start..end)
    }

    pub fn slice(&self, ptr: i32, len: u32) -> Result<&[u8]> {
        let r = self.range(ptr, len as usize)?;
        Ok(&self.data[r])
    }

    pub fn write(&mut self, ptr: i32, bytes: &[u8]) -> Result<()> {
        let r = self.range(ptr, bytes.len())?;
        self.data[r].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_array<const N: usize>(&self, ptr: i32) -> Result<[u8; N]> {
        let r = self.range(ptr, N)?;
        Ok(self.data[r].try_into().unwrap())
    }

    pub fn read_u32(&self, ptr: i32) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array(ptr)?))
    }

    pub fn read_u64(&self, ptr: i32) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array(ptr)?))
    }

    /// 128-bit values cross the boundary as (low 64, high 64) little-endian.
    pub fn read_u128(&self, ptr: i32) -> Result<u128> {
        Ok(u128::from_le_bytes(self.read_array(ptr)?))
    }

    pub fn read_i128(&self, ptr: i32) -> Result<i128> {
        Ok(i128::from_le_bytes(self.read_array(ptr)?))
    }

    pub fn read_f64(&self, ptr: i32) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array(ptr)?))
    }

    pub fn write_u32(&mut self, ptr: i32, value: u32) -> Result<()> {
        self.write(ptr, &value.to_le_bytes())
    }

    pub fn write_u64(&mut self, ptr: i32, value: u64) -> Result<()> {
        self.write(ptr, &value.to_le_bytes())
    }

    pub fn write_u128(&mut self, ptr: i32, value: u128) -> Result<()> {
        self.write(ptr, &value.to_le_bytes())
    }

    /// UTF-8 string of exactly `len` bytes (invalid sequences are replaced).
    pub fn read_str(&self, ptr: i32, len: u32) -> Result<String> {
        Ok(String::from_utf8_lossy(self.slice(ptr, len)?).into_owned())
    }

    /// NUL-terminated string starting at `ptr`. The terminator must lie
    /// within the current memory size.
    pub fn read_cstr(&self, ptr: i32) -> Result<String> {
        let start = ptr as u32 as usize;
        if start > self.data.len() {
            return Err(HostError::MemoryAccess {
                offset: start as u64,
                len: 1,
                size: self.data.len() as u64,
            }
            .into());
        }
        let rest = &self.data[start..];
        let end = rest.iter().position(|&b| b == 0).ok_or(HostError::MemoryAccess {
            offset: start as u64,
            len: rest.len() as u64 + 1,
            size: self.data.len() as u64,
        })?;
        Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
    }

    /// Lowercase hex rendering of `len` bytes at `ptr`.
    pub fn read_hex(&self, ptr: i32, len: u32) -> Result<String> {
        Ok(hex::encode(self.slice(ptr, len)?))
    }

    /// Raw access for the compiler-rt byte intrinsics.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_enforced() {
        let mut buf = vec![0u8; 16];
        let view = MemoryView::new(&mut buf);
        assert!(view.slice(8, 8).is_ok());
        assert!(view.slice(9, 8).is_err());
        assert!(view.slice(-1, 1).is_err());
        assert!(view.read_u64(12).is_err());
    }

    #[test]
    fn little_endian_reads() {
        let mut buf = vec![0u8; 24];
        buf[..8].copy_from_slice(&0xdead_beef_u64.to_le_bytes());
        buf[8..24].copy_from_slice(&(-7i128).to_le_bytes());
        let view = MemoryView::new(&mut buf);
        assert_eq!(view.read_u64(0).unwrap(), 0xdead_beef);
        assert_eq!(view.read_i128(8).unwrap(), -7);
    }

    #[test]
    fn cstr_requires_terminator() {
        let mut buf = b"hello\0world".to_vec();
        let view = MemoryView::new(&mut buf);
        assert_eq!(view.read_cstr(0).unwrap(), "hello");
        let mut buf = b"no terminator".to_vec();
        let view = MemoryView::new(&mut buf);
        assert!(view.read_cstr(0).is_err());
    }
}
