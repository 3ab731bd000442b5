//! Register-level operations layered on engine commands.
//!
//! Each one fires its callback exactly once with the final status. Batch
//! notifications of the underlying commands are consumed here.

use core::cmp;

use heapless::Vec;

use crate::{
    command::{Command, Composite, Source, Transfer, Width},
    config::MAX_BATCH,
    engine::{Callback, Engine},
    hal::{I2cMaster, InterruptLine},
    Rejected, Status,
};

impl<H: I2cMaster + InterruptLine, C: Copy, const N: usize> Engine<H, C, N> {
    /// Sets `register` to `(old & mask) | value`.
    ///
    /// A zero mask keeps none of the old bits, so the register is written
    /// without being read first.
    pub fn read_modify_write8(
        &mut self,
        address: u8,
        register: u8,
        mask: u8,
        value: u8,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        self.read_modify_write(
            address,
            register,
            mask as u16,
            value as u16,
            Width::Byte,
            callback,
            context,
        )
    }

    /// 16-bit read-modify-write of a little-endian register pair.
    pub fn read_modify_write16_le(
        &mut self,
        address: u8,
        register: u8,
        mask: u16,
        value: u16,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        self.read_modify_write(
            address,
            register,
            mask,
            value,
            Width::Word,
            callback,
            context,
        )
    }

    /// 16-bit read-modify-write of a big-endian register pair.
    pub fn read_modify_write16_be(
        &mut self,
        address: u8,
        register: u8,
        mask: u16,
        value: u16,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        self.read_modify_write16_le(
            address,
            register,
            mask.swap_bytes(),
            value.swap_bytes(),
            callback,
            context,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn read_modify_write(
        &mut self,
        address: u8,
        register: u8,
        mask: u16,
        value: u16,
        width: Width,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        if mask == 0 {
            let (buf, len) = modified_register(register, value, width);
            let transfer = Transfer::write(address, &buf[..len]);
            return self.enqueue(Command::new(
                transfer,
                callback,
                context,
                Composite::ModifyWrite,
            ));
        }

        let read_count = match width {
            Width::Byte => 1,
            Width::Word => 2,
        };
        let composite = Composite::ModifyRead {
            register,
            mask,
            value,
            width,
        };
        self.enqueue(Command::new(
            Transfer::read(address, &[register], read_count),
            callback,
            context,
            composite,
        ))
    }

    /// Writes `data` to consecutive registers starting at `register`.
    ///
    /// The register address and the data go out in one transfer, refilled
    /// two bytes at a time. At most `MAX_BATCH` data bytes.
    pub fn write8(
        &mut self,
        address: u8,
        register: u8,
        data: &[u8],
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        let mut bytes: Vec<u8, MAX_BATCH> = Vec::new();
        if bytes.extend_from_slice(data).is_err() {
            warn!("write8 of {=usize} bytes rejected", data.len());
            return Err(Rejected::TooLong);
        }
        self.stream(address, register, Source::Bytes(bytes), callback, context)
    }

    /// Writes host-order `values` as big-endian 16-bit registers. At most
    /// `MAX_BATCH / 2` values.
    pub fn write16_be(
        &mut self,
        address: u8,
        register: u8,
        values: &[u16],
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        let mut words: Vec<u16, { MAX_BATCH / 2 }> = Vec::new();
        if words.extend_from_slice(values).is_err() {
            warn!("write16_be of {=usize} words rejected", values.len());
            return Err(Rejected::TooLong);
        }
        self.stream(address, register, Source::WordsBe(words), callback, context)
    }

    fn stream(
        &mut self,
        address: u8,
        register: u8,
        source: Source,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        let total = source.len() + 1;
        let mut first = [register, 0];
        let cursor = cmp::min(source.len(), 1);
        if cursor == 1 {
            first[1] = source.byte(0);
        }

        let transfer = Transfer::write_batched(address, &first[..cursor + 1], total, 2);
        self.enqueue(Command::new(
            transfer,
            callback,
            context,
            Composite::Stream { source, cursor },
        ))
    }

    /// Reads `count` big-endian 16-bit registers. The callback receives them
    /// as little-endian byte pairs.
    ///
    /// Reads longer than `MAX_BATCH` bytes are delivered in chunks: every
    /// full chunk comes with [`Status::BatchReady`] and the read carries on
    /// by itself, the last one comes with the final status.
    pub fn read16_be(
        &mut self,
        address: u8,
        register: u8,
        count: usize,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        assert!(count != 0, "Read16BE needs at least one register");

        self.enqueue(Command::new(
            Transfer::read(address, &[register], count * 2).with_read_batch(MAX_BATCH),
            callback,
            context,
            Composite::Read16Be,
        ))
    }

    /// A write batch of the head command went out.
    pub(crate) fn batch_done(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return;
        };

        if let Composite::Stream { source, cursor } = &mut cmd.composite {
            let needed = cmd.write_batch.min(cmd.write_count - cmd.write_batch);
            let mut next = [0u8; 2];
            for (i, byte) in next.iter_mut().enumerate().take(needed) {
                *byte = source.byte(*cursor + i);
            }
            *cursor += needed;
            cmd.write.write(&next[..needed]);

            self.resumed = true;
            self.hw.trigger();
            return;
        }

        let (callback, context) = (cmd.callback, cmd.context);
        if let Some(callback) = callback {
            callback(self, context, Status::BatchDone, &[]);
        }
    }

    /// A read batch of the head command arrived.
    pub(crate) fn batch_ready(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return;
        };

        let (callback, context) = (cmd.callback, cmd.context);
        let words = matches!(cmd.composite, Composite::Read16Be);

        let mut data = self.take_received();
        if words {
            swap_pairs(&mut data);
            self.resumed = true;
            self.hw.trigger();
        }

        if let Some(callback) = callback {
            callback(self, context, Status::BatchReady, &data);
        }
    }

    /// Reports a retired command, chaining the second half of a
    /// read-modify-write.
    pub(crate) fn complete(&mut self, cmd: Command<H, C, N>, status: Status, data: &[u8]) {
        let Command {
            address,
            callback,
            context,
            composite,
            ..
        } = cmd;

        match composite {
            Composite::Plain => notify(self, callback, context, status, data),
            Composite::ModifyWrite | Composite::Stream { .. } => {
                notify(self, callback, context, status, &[])
            }
            Composite::Read16Be => {
                let mut swapped: Vec<u8, MAX_BATCH> = Vec::new();
                let _ = swapped.extend_from_slice(data);
                if status.is_success() {
                    swap_pairs(&mut swapped);
                }
                notify(self, callback, context, status, &swapped);
            }
            Composite::ModifyRead {
                register,
                mask,
                value,
                width,
            } => {
                if !status.is_success() {
                    return notify(self, callback, context, status, &[]);
                }

                let old = match (width, data) {
                    (Width::Byte, [lo, ..]) => *lo as u16,
                    (Width::Word, [lo, hi, ..]) => u16::from_le_bytes([*lo, *hi]),
                    _ => return notify(self, callback, context, Status::Error, &[]),
                };

                let (buf, len) = modified_register(register, (old & mask) | value, width);
                let write = Command::new(
                    Transfer::write(address, &buf[..len]),
                    callback,
                    context,
                    Composite::ModifyWrite,
                );

                // The slot of the finished read is free, so this only fails
                // if the queue has no slots at all.
                if self.enqueue(write).is_err() {
                    notify(self, callback, context, Status::Error, &[]);
                }
            }
        }
    }
}

fn notify<H, C: Copy, const N: usize>(
    engine: &mut Engine<H, C, N>,
    callback: Option<Callback<H, C, N>>,
    context: C,
    status: Status,
    data: &[u8],
) {
    if let Some(callback) = callback {
        callback(engine, context, status, data);
    }
}

fn swap_pairs(data: &mut [u8]) {
    for pair in data.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

fn modified_register(register: u8, value: u16, width: Width) -> ([u8; 3], usize) {
    let [lo, hi] = value.to_le_bytes();
    match width {
        Width::Byte => ([register, lo, 0], 2),
        Width::Word => ([register, lo, hi], 3),
    }
}
