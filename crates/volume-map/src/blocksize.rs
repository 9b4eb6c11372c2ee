// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
//! Parses `dd`-style block-size strings (`1M`, `512`, `4K`) and computes the
//! `count` argument for a fixed-size copy, per the grounding source's
//! `volume_dd_blocksize` handling.

const DEFAULT_BLOCKSIZE: &str = "1M";

/// Validates a block-size string: rejects a leading `-`, a leading `0`, or
/// an embedded `.`, falling back to [`DEFAULT_BLOCKSIZE`] on any of those.
pub fn sanitize_blocksize(raw: &str) -> String {
    if raw.is_empty() || raw.starts_with('-') || raw.starts_with('0') || raw.contains('.') {
        return DEFAULT_BLOCKSIZE.to_string();
    }
    if parse_bytes(raw).is_none() {
        return DEFAULT_BLOCKSIZE.to_string();
    }
    raw.to_string()
}

/// Parses a `dd`-style size suffix (`K`/`M`/`G`, binary multiples) into a
/// byte count.
fn parse_bytes(raw: &str) -> Option<u64> {
    let (digits, multiplier) = match raw.chars().last() {
        Some('K') | Some('k') => (&raw[..raw.len() - 1], 1024u64),
        Some('M') | Some('m') => (&raw[..raw.len() - 1], 1024 * 1024),
        Some('G') | Some('g') => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };
    let value: u64 = digits.parse().ok()?;
    Some(value * multiplier)
}

/// Computes the `count` for `dd bs=<blocksize> count=<count>` needed to copy
/// `size_mib` mebibytes, rounding up so the copy never falls short.
pub fn calculate_count(blocksize: &str, size_mib: u64) -> (String, u64) {
    let sanitized = sanitize_blocksize(blocksize);
    let block_bytes = parse_bytes(&sanitized).unwrap_or(1024 * 1024);
    let total_bytes = size_mib * 1024 * 1024;
    let count = (total_bytes + block_bytes - 1) / block_bytes;
    (sanitized, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_leading_dash() {
        assert_eq!(sanitize_blocksize("-1M"), DEFAULT_BLOCKSIZE);
    }

    #[test]
    fn rejects_leading_zero() {
        assert_eq!(sanitize_blocksize("01M"), DEFAULT_BLOCKSIZE);
    }

    #[test]
    fn rejects_embedded_dot() {
        assert_eq!(sanitize_blocksize("1.5M"), DEFAULT_BLOCKSIZE);
    }

    #[test]
    fn accepts_plain_size() {
        assert_eq!(sanitize_blocksize("4K"), "4K");
        assert_eq!(sanitize_blocksize("512"), "512");
    }

    #[test]
    fn calculate_count_rounds_up() {
        let (bs, count) = calculate_count("1M", 10);
        assert_eq!(bs, "1M");
        assert_eq!(count, 10);
    }

    #[test]
    fn calculate_count_rounds_up_partial_block() {
        let (_, count) = calculate_count("4K", 1);
        // 1 MiB / 4 KiB = 256 exactly.
        assert_eq!(count, 256);
    }

    #[test]
    fn garbage_blocksize_falls_back_to_default() {
        let (bs, _) = calculate_count("not-a-size", 5);
        assert_eq!(bs, DEFAULT_BLOCKSIZE);
    }
}
