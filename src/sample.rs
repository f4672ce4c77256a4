use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const RGBA_STRIDE: usize = 4;

#[derive(Debug, Default)]
pub struct BufferLedger {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl BufferLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn outstanding(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }
}

/// Released exactly once, through [`SampleBuffer::release`] or on drop.
#[derive(Debug)]
pub struct SampleBuffer {
    bytes: Vec<u8>,
    stride: usize,
    ledger: Arc<BufferLedger>,
}

impl SampleBuffer {
    pub fn acquire(bytes: Vec<u8>, stride: usize, ledger: &Arc<BufferLedger>) -> Self {
        ledger.acquired.fetch_add(1, Ordering::Relaxed);
        Self {
            bytes,
            stride: stride.max(1),
            ledger: Arc::clone(ledger),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn element_count(&self) -> usize {
        self.bytes.len() / self.stride
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SampleBuffer {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_counted_once() {
        let ledger = BufferLedger::new();
        let buffer = SampleBuffer::acquire(vec![0; 16], RGBA_STRIDE, &ledger);
        assert_eq!(buffer.bytes().len(), 16);
        assert_eq!(buffer.element_count(), 4);
        assert_eq!(ledger.outstanding(), 1);

        buffer.release();
        assert_eq!(ledger.acquired(), 1);
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn early_return_still_releases() {
        fn consume(ledger: &Arc<BufferLedger>) -> anyhow::Result<()> {
            let buffer = SampleBuffer::acquire(vec![1, 2, 3, 4], RGBA_STRIDE, ledger);
            if buffer.bytes().len() == 4 {
                anyhow::bail!("sink refused the buffer");
            }
            buffer.release();
            Ok(())
        }

        let ledger = BufferLedger::new();
        assert!(consume(&ledger).is_err());
        assert_eq!(ledger.acquired(), 1);
        assert_eq!(ledger.released(), 1);
    }
}
