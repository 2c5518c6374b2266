/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use rand::{rngs::OsRng, RngCore};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// 26 chars: 48-bit millisecond timestamp then 80 random bits, Crockford base32.
/// Lexicographic order follows creation time at millisecond resolution.
pub fn new_id() -> String {
    new_id_at(now_ms())
}

pub fn new_id_at(ts_ms: i64) -> String {
    let ts = (ts_ms.max(0) as u128) & 0xFFFF_FFFF_FFFF;
    let mut rnd = [0u8; 10];
    OsRng.fill_bytes(&mut rnd);
    let mut value: u128 = ts << 80;
    for (i, b) in rnd.iter().enumerate() {
        value |= (*b as u128) << (8 * (9 - i));
    }
    let mut out = [0u8; 26];
    for i in (0..26).rev() {
        out[i] = CROCKFORD[(value & 0x1F) as usize];
        value >>= 5;
    }
    out.iter().map(|c| *c as char).collect()
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn rfc3339_ms(ts_ms: i64) -> String {
    let nanos = (ts_ms as i128).saturating_mul(1_000_000);
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}
