use crc::{Crc, CRC_8_SMBUS};

const SMBUS_PEC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Continues a CRC-8 (x^8 + x^2 + x + 1) over `data` starting from `seed`.
///
/// The algorithm has no reflection and no final xor, so feeding the running
/// value back in one byte at a time gives the same result as one pass over
/// the whole packet.
pub fn crc8(seed: u8, data: &[u8]) -> u8 {
    data.iter()
        .fold(seed, |crc, &byte| SMBUS_PEC.checksum(&[crc ^ byte]))
}
