//! CRC-16/Modbus checksum
//!
//! The link checksums every payload with CRC-16/Modbus and puts it on the wire
//! low byte first. The total-length field is big-endian, so the two 16-bit
//! fields in a frame use opposite byte orders.

/// Reflected polynomial (0x8005 bit-reversed)
const POLY: u16 = 0xA001;

/// Initial register value
const SEED: u16 = 0xFFFF;

/// Size of the checksum on the wire
pub const CHECKSUM_LEN: usize = 2;

/// CRC-16/Modbus over `data[offset..offset + length]`
///
/// # Panics
///
/// Panics if the range is out of bounds for `data`.
pub fn checksum(data: &[u8], offset: usize, length: usize) -> u16 {
    crc16_modbus(&data[offset..offset + length])
}

/// Checksum of `data[offset..offset + length]` as it appears on the wire (low byte first)
///
/// # Panics
///
/// Panics if the range is out of bounds for `data`.
pub fn checksum_bytes_le(data: &[u8], offset: usize, length: usize) -> [u8; CHECKSUM_LEN] {
    checksum(data, offset, length).to_le_bytes()
}

/// CRC-16/Modbus over a whole slice
/// Polynomial: 0x8005, Init: 0xFFFF, RefIn: true, RefOut: true, XorOut: 0x0000
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc = SEED;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}
