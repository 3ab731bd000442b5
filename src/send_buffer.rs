/// The write batch of a command, handed to the peripheral one byte per
/// interrupt.
#[derive(Clone)]
pub struct SendBuffer<const BUFSIZE: usize> {
    buf: [u8; BUFSIZE],
    pos: usize,
    end: usize,
}

impl<const BUFSIZE: usize> SendBuffer<BUFSIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [0; BUFSIZE],
            pos: 0,
            end: 0,
        }
    }

    /// Loads the next batch and rewinds. Bytes past `BUFSIZE` are returned.
    pub fn write<'a>(&mut self, batch: &'a [u8]) -> &'a [u8] {
        let take = core::cmp::min(batch.len(), BUFSIZE);
        self.buf[..take].copy_from_slice(&batch[..take]);

        self.pos = 0;
        self.end = take;

        &batch[take..]
    }

    /// Bytes of the current batch already on the bus.
    pub fn bytes_sent(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.pos
    }
}

impl<const BUFSIZE: usize> Iterator for SendBuffer<BUFSIZE> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        self.pos += 1;
        Some(self.buf[self.pos - 1])
    }
}
