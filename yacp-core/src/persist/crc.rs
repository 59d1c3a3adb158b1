//! CRC-32 for the persisted override image
//!
//! Bitwise, table-free reflected CRC. The polynomial and the init/xorout
//! constants are parameters so a device can match whatever an existing
//! tool expects; the default is IEEE 802.3.

/// Reflected CRC-32 parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc32 {
    /// Reflected polynomial
    pub poly: u32,
    pub init: u32,
    pub xorout: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::IEEE
    }
}

impl Crc32 {
    /// IEEE 802.3 (zlib, PNG)
    pub const IEEE: Self = Self {
        poly: 0xEDB8_8320,
        init: 0xFFFF_FFFF,
        xorout: 0xFFFF_FFFF,
    };

    /// Castagnoli (iSCSI)
    pub const CASTAGNOLI: Self = Self {
        poly: 0x82F6_3B78,
        init: 0xFFFF_FFFF,
        xorout: 0xFFFF_FFFF,
    };

    /// Start an incremental computation
    pub fn digest(&self) -> Digest {
        Digest {
            params: *self,
            crc: self.init,
        }
    }

    /// CRC of a complete buffer
    pub fn checksum(&self, data: &[u8]) -> u32 {
        let mut digest = self.digest();
        digest.update(data);
        digest.finalize()
    }
}

/// Incremental CRC state
#[derive(Debug, Clone, Copy)]
pub struct Digest {
    params: Crc32,
    crc: u32,
}

impl Digest {
    pub fn update(&mut self, data: &[u8]) {
        let poly = self.params.poly;
        let mut crc = self.crc;

        for &byte in data {
            crc ^= byte as u32;
            for _ in 0..8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ poly;
                } else {
                    crc >>= 1;
                }
            }
        }

        self.crc = crc;
    }

    pub fn finalize(self) -> u32 {
        self.crc ^ self.params.xorout
    }
}
