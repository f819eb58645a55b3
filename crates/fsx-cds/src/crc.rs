//! CRC service
//!
//! `calculate_crc` is the single entry point. CRC-16 is the reflected
//! 0xA001 polynomial (CRC-16/ARC); CRC-32 is the reflected 0xEDB88320
//! polynomial with pre- and post-inversion (the IEEE 802.3 variant).
//! Empty input returns the seed unchanged for both.

use serde::{Deserialize, Serialize};

/// Selectable CRC algorithms
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrcAlgorithm {
    /// 16-bit, reflected 0xA001
    #[default]
    Crc16,
    /// 32-bit, reflected 0xEDB88320
    Crc32,
}

const fn reflected_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ poly } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC16_TABLE: [u32; 256] = reflected_table(0xA001);
static CRC32_TABLE: [u32; 256] = reflected_table(0xEDB8_8320);

/// Compute the CRC of `data`, continuing from `seed`.
///
/// # Arguments
/// * `data` - Bytes to checksum
/// * `seed` - Starting value (the result of a previous call to chain buffers, else 0)
/// * `algorithm` - Which CRC to compute
///
/// # Returns
/// The CRC, or `seed` if `data` is empty. CRC-16 results occupy the low 16 bits.
pub fn calculate_crc(data: &[u8], seed: u32, algorithm: CrcAlgorithm) -> u32 {
    if data.is_empty() {
        return seed;
    }

    match algorithm {
        CrcAlgorithm::Crc16 => data.iter().fold(seed & 0xFFFF, |crc, &byte| {
            (crc >> 8) ^ CRC16_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
        }),
        CrcAlgorithm::Crc32 => !data.iter().fold(!seed, |crc, &byte| {
            (crc >> 8) ^ CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
        }),
    }
}
