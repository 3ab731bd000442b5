use core::cmp;

use heapless::{Deque, Vec};

use crate::{config::MAX_BATCH, engine::Callback, send_buffer::SendBuffer};

/// Shape of one queued bus transaction: an optional write phase followed by
/// an optional read phase, each split into batches.
#[derive(Debug, Clone, Copy)]
pub struct Transfer<'a> {
    pub address: u8,
    /// First write batch.
    pub write: &'a [u8],
    pub write_count: usize,
    pub write_batch: usize,
    pub read_count: usize,
    pub read_batch: usize,
}

impl<'a> Transfer<'a> {
    pub fn write(address: u8, data: &'a [u8]) -> Self {
        Self {
            address,
            write: data,
            write_count: data.len(),
            write_batch: data.len(),
            read_count: 0,
            read_batch: 0,
        }
    }

    pub fn read(address: u8, write: &'a [u8], read_count: usize) -> Self {
        Self {
            address,
            write,
            write_count: write.len(),
            write_batch: write.len(),
            read_count,
            read_batch: read_count,
        }
    }

    /// Writes `total` bytes in batches, `first` being the first one.
    pub fn write_batched(address: u8, first: &'a [u8], total: usize, batch: usize) -> Self {
        Self {
            address,
            write: first,
            write_count: total,
            write_batch: batch,
            read_count: 0,
            read_batch: 0,
        }
    }

    pub fn with_read_batch(mut self, batch: usize) -> Self {
        self.read_batch = batch;
        self
    }

    pub(crate) fn validate(&self) {
        assert!(self.address <= 0x7F, "10-bit addresses are not supported");
        assert!(
            self.write_count != 0 || self.read_count != 0,
            "Transfer moves no data"
        );

        if self.write_count != 0 {
            assert!(
                (1..=MAX_BATCH).contains(&self.write_batch),
                "Write batch size must be between 1 and MAX_BATCH"
            );
            assert!(
                self.write.len() == cmp::min(self.write_batch, self.write_count),
                "First write batch does not match the batch size"
            );
        }

        if self.read_count != 0 {
            assert!(
                (1..=MAX_BATCH).contains(&self.read_batch),
                "Read batch size must be between 1 and MAX_BATCH"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Width {
    Byte,
    Word,
}

/// Bytes a multi-batch composite write still has to send.
pub(crate) enum Source {
    Bytes(Vec<u8, MAX_BATCH>),
    /// Host-order words sent big-endian.
    WordsBe(Vec<u16, { MAX_BATCH / 2 }>),
}

impl Source {
    pub fn len(&self) -> usize {
        match self {
            Source::Bytes(bytes) => bytes.len(),
            Source::WordsBe(words) => words.len() * 2,
        }
    }

    pub fn byte(&self, idx: usize) -> u8 {
        match self {
            Source::Bytes(bytes) => bytes[idx],
            Source::WordsBe(words) => words[idx / 2].to_be_bytes()[idx % 2],
        }
    }
}

/// Register-level operation a command belongs to.
pub(crate) enum Composite {
    Plain,
    ModifyRead {
        register: u8,
        mask: u16,
        value: u16,
        width: Width,
    },
    ModifyWrite,
    Stream {
        source: Source,
        cursor: usize,
    },
    Read16Be,
}

pub(crate) struct Command<H, C, const N: usize> {
    pub address: u8,
    pub write: SendBuffer<MAX_BATCH>,
    pub write_count: usize,
    pub write_batch: usize,
    pub read_count: usize,
    pub read_batch: usize,
    pub callback: Option<Callback<H, C, N>>,
    pub context: C,
    pub composite: Composite,
}

impl<H, C, const N: usize> Command<H, C, N> {
    pub fn new(
        transfer: Transfer<'_>,
        callback: Option<Callback<H, C, N>>,
        context: C,
        composite: Composite,
    ) -> Self {
        transfer.validate();

        let mut write = SendBuffer::new();
        write.write(transfer.write);

        Self {
            address: transfer.address,
            write,
            write_count: transfer.write_count,
            write_batch: transfer.write_batch,
            read_count: transfer.read_count,
            read_batch: cmp::min(transfer.read_batch, transfer.read_count),
            callback,
            context,
            composite,
        }
    }

    /// Size of the write batch that follows the one in flight.
    pub fn next_write_batch(&self) -> usize {
        cmp::min(
            self.write_batch,
            self.write_count.saturating_sub(self.write_batch),
        )
    }
}

/// Ring of pending commands. The head is the active one.
///
/// One slot is kept free so a full ring never looks empty to the cursors,
/// which leaves `N - 1` usable entries.
pub(crate) struct CommandQueue<T, const N: usize> {
    slots: Deque<T, N>,
}

impl<T, const N: usize> CommandQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            slots: Deque::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() + 1 >= N
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.slots.push_back(item)
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.slots.front_mut()
    }

    pub fn pop(&mut self) -> Option<T> {
        self.slots.pop_front()
    }
}
