// SPDX-License-Identifier: GPL-3.0-only

//! Cantor pairing between display lines and depth-buffer slots

use super::types::LineKey;

/// Map a line key to its depth-buffer slot
///
/// `(k1 + k2)(k1 + k2 + 1) / 2 + k2`
#[inline]
pub fn cantor_pair(key: LineKey) -> usize {
    let k1 = key.k1 as usize;
    let k2 = key.k2 as usize;
    let s = k1 + k2;
    s * (s + 1) / 2 + k2
}

/// Recover the line key of a depth-buffer slot
pub fn cantor_inverse(slot: usize) -> LineKey {
    // f64 sqrt is exact enough to land within one of the true diagonal
    let mut w = ((((8 * slot + 1) as f64).sqrt() - 1.0) / 2.0) as usize;
    while w * (w + 1) / 2 > slot {
        w -= 1;
    }
    while (w + 1) * (w + 2) / 2 <= slot {
        w += 1;
    }
    let t = w * (w + 1) / 2;
    let k2 = slot - t;
    let k1 = w - k2;
    LineKey::new(k1 as u32, k2 as u32)
}
