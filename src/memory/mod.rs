//! Linear memory shared between the host and instances.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::interpreter::Trap;
use crate::types::MemoryType;

pub const PAGE_SIZE: usize = 65536;

/// Hard upper bound for a 32-bit memory, in pages.
pub const MAX_PAGES: u32 = 65536;

struct MemoryData {
    bytes: Vec<u8>,
    maximum: Option<u32>,
}

/// A handle to a linear memory.
///
/// Cloning the handle shares the underlying bytes: a memory handed to a
/// [`Linker`](crate::Linker) is read and written by both the host and
/// every instance that imports it. Nothing synchronises those accesses;
/// when several instances share one memory, ordering their writes is up
/// to the caller.
#[derive(Clone)]
pub struct Memory {
    inner: Rc<RefCell<MemoryData>>,
}

impl Memory {
    /// Allocate a zeroed memory of `ty.initial` pages.
    pub fn new(ty: MemoryType) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemoryData {
                bytes: vec![0; ty.initial as usize * PAGE_SIZE],
                maximum: ty.maximum,
            })),
        }
    }

    pub fn ty(&self) -> MemoryType {
        let data = self.inner.borrow();
        MemoryType {
            initial: (data.bytes.len() / PAGE_SIZE) as u32,
            maximum: data.maximum,
        }
    }

    /// Current size in pages.
    pub fn size(&self) -> u32 {
        (self.inner.borrow().bytes.len() / PAGE_SIZE) as u32
    }

    /// Current size in bytes.
    pub fn data_size(&self) -> usize {
        self.inner.borrow().bytes.len()
    }

    /// Grow by `delta` pages. Returns the previous size in pages, or
    /// `None` if the maximum would be exceeded.
    pub fn grow(&self, delta: u32) -> Option<u32> {
        let mut data = self.inner.borrow_mut();
        let old = (data.bytes.len() / PAGE_SIZE) as u32;
        let new = old.checked_add(delta)?;
        if new > data.maximum.unwrap_or(MAX_PAGES).min(MAX_PAGES) {
            return None;
        }
        data.bytes.resize(new as usize * PAGE_SIZE, 0);
        Some(old)
    }

    pub fn data(&self) -> Ref<'_, [u8]> {
        Ref::map(self.inner.borrow(), |data| data.bytes.as_slice())
    }

    pub fn data_mut(&self) -> RefMut<'_, [u8]> {
        RefMut::map(self.inner.borrow_mut(), |data| data.bytes.as_mut_slice())
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), Trap> {
        let data = self.inner.borrow();
        let end = offset
            .checked_add(buf.len())
            .ok_or(Trap::MemoryOutOfBounds)?;
        let src = data.bytes.get(offset..end).ok_or(Trap::MemoryOutOfBounds)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    /// Copy `bytes` into memory starting at `offset`.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), Trap> {
        let mut data = self.inner.borrow_mut();
        let end = offset
            .checked_add(bytes.len())
            .ok_or(Trap::MemoryOutOfBounds)?;
        let dst = data
            .bytes
            .get_mut(offset..end)
            .ok_or(Trap::MemoryOutOfBounds)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Decode `len` bytes at `offset` as UTF-8, replacing invalid
    /// sequences.
    pub fn read_utf8(&self, offset: usize, len: usize) -> Result<String, Trap> {
        let mut buf = vec![0; len];
        self.read(offset, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    #[inline]
    pub(crate) fn load<const N: usize>(&self, addr: u64) -> Result<[u8; N], Trap> {
        let mut buf = [0u8; N];
        let addr = usize::try_from(addr).map_err(|_| Trap::MemoryOutOfBounds)?;
        self.read(addr, &mut buf)?;
        Ok(buf)
    }

    #[inline]
    pub(crate) fn store(&self, addr: u64, bytes: &[u8]) -> Result<(), Trap> {
        let addr = usize::try_from(addr).map_err(|_| Trap::MemoryOutOfBounds)?;
        self.write(addr, bytes)
    }

    /// Whether two handles refer to the same memory.
    pub fn ptr_eq(&self, other: &Memory) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ty = self.ty();
        f.debug_struct("Memory")
            .field("pages", &ty.initial)
            .field("maximum", &ty.maximum)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_page(maximum: Option<u32>) -> Memory {
        Memory::new(MemoryType {
            initial: 1,
            maximum,
        })
    }

    #[test]
    fn clones_share_bytes() {
        let mem = one_page(None);
        let alias = mem.clone();
        alias.write(10, b"hi").unwrap();
        assert_eq!(mem.read_utf8(10, 2).unwrap(), "hi");
        assert!(mem.ptr_eq(&alias));
    }

    #[test]
    fn out_of_bounds_access_traps() {
        let mem = one_page(None);
        assert_eq!(
            mem.write(PAGE_SIZE - 1, b"ab"),
            Err(Trap::MemoryOutOfBounds)
        );
        let mut buf = [0u8; 4];
        assert_eq!(mem.read(usize::MAX, &mut buf), Err(Trap::MemoryOutOfBounds));
        assert_eq!(mem.load::<4>(u64::MAX), Err(Trap::MemoryOutOfBounds));
    }

    #[test]
    fn grow_respects_maximum() {
        let mem = one_page(Some(2));
        assert_eq!(mem.grow(1), Some(1));
        assert_eq!(mem.size(), 2);
        assert_eq!(mem.grow(1), None);
        assert_eq!(mem.data_size(), 2 * PAGE_SIZE);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mem = one_page(None);
        mem.write(0, &[0x68, 0xFF]).unwrap();
        assert_eq!(mem.read_utf8(0, 2).unwrap(), "h\u{FFFD}");
    }
}
