// SPDX-FileCopyrightText: 2019-2022 Heiko Schaefer <heiko@schaefer.name>
// SPDX-License-Identifier: GPL-3.0-or-later
//
// This file is part of OpenPGP CA
// https://gitlab.com/openpgp-ca/openpgp-ca

//! Pure helpers used by the ingestion pipeline (§4.5, §8). No state, no
//! I/O — kept separate so they're trivially unit-testable.

/// CRC-32/IEEE of `content`, reinterpreted as signed 32-bit per the
/// schema contract in §3/§9.
pub fn crc32_signed(content: &[u8]) -> i32 {
    crc32fast::hash(content) as i32
}

const SCRUB_RANGES: [(u32, u32); 3] = [(0x00, 0x08), (0x0B, 0x0C), (0x0E, 0x1F)];

/// Replace control characters in the scrub ranges with ASCII space,
/// preserving TAB/LF/CR (§4.5 step 3).
pub fn scrub_control_chars(s: &str) -> String {
    s.chars()
        .map(|c| {
            let cp = c as u32;
            if SCRUB_RANGES.iter().any(|&(lo, hi)| cp >= lo && cp <= hi) {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// Latin-1 fallback decoding (§4.5 step 2): every byte maps 1:1 onto the
/// Unicode codepoint of the same value, so no external codec crate is
/// needed for this leg of the encoding detection.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode a UTF-16LE byte stream (BOM already stripped by the caller).
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Decode `bytes` per §4.5 step 2's two-step contract: strict UTF-8
/// first, Latin-1 fallback otherwise. No guess-chain — a UTF-16LE BOM is
/// a `.zip`/phase-1 extraction concern (`archive::extract_zip`), not
/// something this step re-detects, so bytes opening with one are either
/// valid UTF-8 (kept as-is, BOM included) or fall straight to Latin-1.
pub fn decode_utf8_or_latin1(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => decode_latin1(bytes),
    }
}

const SHORTENCMD_MAX_LEN: usize = 31;

/// Turn an arbitrary command line (the first line of a `commands/`
/// archive member, §4.5) into the deterministic, filesystem/column-safe
/// `filename` stored for it (§8's testable property).
pub fn shortencmd(cmd: &str) -> String {
    let sanitized: String = cmd
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut result = if sanitized.len() <= SHORTENCMD_MAX_LEN {
        sanitized
    } else {
        let hash = format!("{:08x}", crc32fast::hash(cmd.as_bytes()));
        let prefix_len = SHORTENCMD_MAX_LEN.saturating_sub(hash.len() + 1);
        format!("{}_{}", &sanitized[..prefix_len.min(sanitized.len())], hash)
    };

    if result.chars().all(|c| c.is_ascii_hexdigit()) {
        if result.len() >= SHORTENCMD_MAX_LEN {
            result.truncate(SHORTENCMD_MAX_LEN - 1);
        }
        result.push('_');
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_round_trips_through_signed_reinterpretation() {
        let content = b"the quick brown fox";
        let unsigned = crc32fast::hash(content);
        let signed = crc32_signed(content);
        assert_eq!(signed as u32, unsigned);
    }

    #[test]
    fn scrub_preserves_tab_lf_cr() {
        let s = "a\tb\nc\rd";
        assert_eq!(scrub_control_chars(s), s);
    }

    #[test]
    fn scrub_replaces_nul_and_other_controls() {
        let s = "a\u{0}b\u{1}c\u{1f}d";
        assert_eq!(scrub_control_chars(s), "a b c d");
    }

    #[test]
    fn shortencmd_is_deterministic() {
        let cmd = "/usr/bin/systemctl --no-pager list-units";
        assert_eq!(shortencmd(cmd), shortencmd(cmd));
    }

    #[test]
    fn shortencmd_stays_within_bounds_and_charset() {
        let cmd = "/usr/bin/very/long/command/with/lots/of/path/segments --flag value --another-flag";
        let out = shortencmd(cmd);
        assert!(out.len() <= SHORTENCMD_MAX_LEN);
        assert!(out.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn shortencmd_never_looks_like_bare_hex() {
        let out = shortencmd("deadbeef");
        assert!(!out.chars().all(|c| c.is_ascii_hexdigit()) || out.ends_with('_'));
    }

    #[test]
    fn decode_utf8_or_latin1_handles_plain_utf8() {
        assert_eq!(decode_utf8_or_latin1("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn decode_utf8_or_latin1_falls_back_to_latin1() {
        let bytes = [0xE9, 0x20, 0x61]; // Latin-1 'é a', not valid UTF-8
        assert_eq!(decode_utf8_or_latin1(&bytes), "é a");
    }

    #[test]
    fn decode_utf8_or_latin1_preserves_a_utf8_bom_rather_than_stripping_it() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"hi");
        assert_eq!(decode_utf8_or_latin1(&bytes), "\u{FEFF}hi");
    }

    #[test]
    fn decode_utf8_or_latin1_treats_a_utf16le_bom_as_latin1_not_utf16() {
        // Valid Latin-1 bytes that happen to start like a UTF-16LE BOM;
        // the two-step contract must not guess UTF-16 here.
        let bytes = [0xFF, 0xFE, b'h', b'i'];
        assert_eq!(decode_utf8_or_latin1(&bytes), "\u{FF}\u{FE}hi");
    }
}
