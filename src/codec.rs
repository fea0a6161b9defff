/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// How raw payload bytes are turned into display/export text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Lowercase hex, two digits per byte, no separator. Never fails.
    Hex,
    /// Strict UTF-8. Invalid sequences have no renderable text.
    Utf8,
}

/// Decode a payload under the given mode.
///
/// Returns `None` only in [`DecodeMode::Utf8`] when the bytes are not valid
/// UTF-8. Callers skip such records when concatenating text but must still
/// account for them wherever per-record rows exist, otherwise the byte
/// counters shown to the user stop matching the transcript.
pub fn decode_payload(payload: &[u8], mode: DecodeMode) -> Option<String> {
    match mode {
        DecodeMode::Hex => Some(hex::encode(payload)),
        DecodeMode::Utf8 => std::str::from_utf8(payload).ok().map(str::to_owned),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_always_decodes() {
        assert_eq!(
            decode_payload(&[0x00, 0x0a, 0xff], DecodeMode::Hex),
            Some("000aff".to_string())
        );
        assert_eq!(decode_payload(&[], DecodeMode::Hex), Some(String::new()));
    }

    #[test]
    fn hex_is_injective() {
        let a = decode_payload(&[0x01, 0x23], DecodeMode::Hex).unwrap();
        let b = decode_payload(&[0x12, 0x30], DecodeMode::Hex).unwrap();
        assert_ne!(a, b);
        // Fixed width means distinct lengths stay distinct too.
        let c = decode_payload(&[0x01], DecodeMode::Hex).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn utf8_strict() {
        assert_eq!(
            decode_payload(b"hello", DecodeMode::Utf8),
            Some("hello".to_string())
        );
        assert_eq!(decode_payload(&[0xff, 0xfe], DecodeMode::Utf8), None);
        // Truncated multi-byte sequence is invalid, not replaced.
        assert_eq!(decode_payload(&[0xe2, 0x82], DecodeMode::Utf8), None);
    }
}
