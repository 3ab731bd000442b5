/// Bytes of the read batch in flight.
pub struct ReceiveBuffer<const BUFSIZE: usize> {
    buf: [u8; BUFSIZE],
    size: usize,
}

impl<const BUFSIZE: usize> ReceiveBuffer<BUFSIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [0; BUFSIZE],
            size: 0,
        }
    }

    /// Fails once the batch is full; the byte is dropped.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), ()> {
        if self.size == BUFSIZE {
            return Err(());
        }
        self.buf[self.size] = byte;
        self.size += 1;
        Ok(())
    }

    pub fn get_size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.size]
    }

    pub fn reset(&mut self) {
        self.size = 0;
    }
}
