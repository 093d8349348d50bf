//! Simulated device memory.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use atomprobe_core::device::DeviceBuffer;
use atomprobe_core::error::{ProbeError, Result};

/// Allocation accounting shared by a device and all of its buffers.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    live_buffers: AtomicUsize,
    live_words: AtomicUsize,
    allocations: AtomicU64,
}

impl MemoryLedger {
    /// Buffers not yet released.
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::Acquire)
    }

    /// Words not yet released.
    pub fn live_words(&self) -> usize {
        self.live_words.load(Ordering::Acquire)
    }

    /// Allocation attempts so far, failed ones included.
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Acquire)
    }

    /// Count an allocation attempt and return its 1-based ordinal.
    pub(crate) fn next_ordinal(&self) -> u64 {
        self.allocations.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn acquire(&self, words: usize) {
        self.live_buffers.fetch_add(1, Ordering::AcqRel);
        self.live_words.fetch_add(words, Ordering::AcqRel);
    }

    fn release(&self, words: usize) {
        self.live_buffers.fetch_sub(1, Ordering::AcqRel);
        self.live_words.fetch_sub(words, Ordering::AcqRel);
    }
}

struct Allocation {
    label: String,
    len: usize,
    data: Mutex<Vec<u32>>,
    ledger: Arc<MemoryLedger>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.ledger.release(self.len);
    }
}

/// Buffer of simulated device memory.
///
/// Clones share storage; the allocation is released when the last clone is
/// dropped.
#[derive(Clone)]
pub struct SimBuffer {
    inner: Arc<Allocation>,
}

impl SimBuffer {
    pub(crate) fn new(len: usize, label: &str, ledger: Arc<MemoryLedger>) -> Self {
        ledger.acquire(len);
        Self {
            inner: Arc::new(Allocation {
                label: label.to_string(),
                len,
                data: Mutex::new(vec![0; len]),
                ledger,
            }),
        }
    }

    /// Lock the contents for a kernel body.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Vec<u32>> {
        self.inner.data.lock()
    }

    /// True when both handles refer to the same allocation.
    pub fn same_allocation(&self, other: &SimBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for SimBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBuffer")
            .field("label", &self.inner.label)
            .field("len", &self.inner.len)
            .finish()
    }
}

impl DeviceBuffer for SimBuffer {
    fn len(&self) -> usize {
        self.inner.len
    }

    fn label(&self) -> &str {
        &self.inner.label
    }

    fn write(&self, offset: usize, data: &[u32]) -> Result<()> {
        let end = offset + data.len();
        if end > self.inner.len {
            return Err(ProbeError::BufferOverflow {
                required: end,
                available: self.inner.len,
            });
        }
        self.lock()[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&self) -> Result<Vec<u32>> {
        Ok(self.lock().clone())
    }

    fn clear(&self) -> Result<()> {
        self.lock().fill(0);
        Ok(())
    }

    fn load(&self, index: usize) -> Result<u32> {
        self.lock()
            .get(index)
            .copied()
            .ok_or(ProbeError::BufferOverflow {
                required: index + 1,
                available: self.inner.len,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_on_last_clone() {
        let ledger = Arc::new(MemoryLedger::default());
        let a = SimBuffer::new(16, "a", Arc::clone(&ledger));
        let b = a.clone();
        assert_eq!(ledger.live_buffers(), 1);
        assert_eq!(ledger.live_words(), 16);

        drop(a);
        assert_eq!(ledger.live_buffers(), 1);
        drop(b);
        assert_eq!(ledger.live_buffers(), 0);
        assert_eq!(ledger.live_words(), 0);
    }

    #[test]
    fn test_write_read_clear() {
        let ledger = Arc::new(MemoryLedger::default());
        let buf = SimBuffer::new(4, "buf", ledger);
        buf.write(1, &[7, 8]).unwrap();
        assert_eq!(buf.read().unwrap(), vec![0, 7, 8, 0]);
        assert_eq!(buf.load(2).unwrap(), 8);

        buf.clear().unwrap();
        assert_eq!(buf.read().unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_write_out_of_bounds() {
        let ledger = Arc::new(MemoryLedger::default());
        let buf = SimBuffer::new(2, "buf", ledger);
        let err = buf.write(1, &[1, 2]).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::BufferOverflow {
                required: 3,
                available: 2
            }
        ));
        assert!(buf.load(5).is_err());
    }
}
