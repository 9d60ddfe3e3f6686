//! Stateless CRC primitives.
//!
//! CRC-16 is CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, MSB first, no
//! final XOR). Persisted flash records depend on these exact parameters.

const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xFFFF;
const CRC32_POLY_REFLECTED: u32 = 0xEDB8_8320;

/// Incremental CRC-16/CCITT-FALSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    pub const fn new() -> Self {
        Self { value: CRC16_INIT }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.value ^= (b as u16) << 8;
            for _ in 0..8 {
                if (self.value & 0x8000) != 0 {
                    self.value = (self.value << 1) ^ CRC16_POLY;
                } else {
                    self.value <<= 1;
                }
            }
        }
    }

    pub const fn finish(self) -> u16 {
        self.value
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-16/CCITT-FALSE over `bytes`.
pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update(bytes);
    crc.finish()
}

/// CRC-32 (IEEE 802.3, reflected) over `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        crc ^= b as u32;
        for _ in 0..8 {
            if (crc & 1) != 0 {
                crc = (crc >> 1) ^ CRC32_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}
