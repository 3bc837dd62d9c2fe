//! Sync marker search over a captured byte sequence.
//!
//! SmartPort precedes every packet with the 6-byte marker
//! [`SYNC_MARKER`](crate::consts::SYNC_MARKER). The match is exact: a capture
//! that is off by even one bit of alignment will not produce the marker, and
//! that is reported as "not found" rather than guessed at.

use crate::consts::{SYNC_MARKER, SYNC_MARKER_LEN};

/// Finds the leftmost exact occurrence of `pattern` in `haystack`.
///
/// Returns `None` if `pattern` is empty, longer than `haystack`, or absent.
pub fn find_pattern(haystack: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() || haystack.len() < pattern.len() {
        return None;
    }
    haystack
        .windows(pattern.len())
        .position(|window| window == pattern)
}

/// Finds the leftmost sync marker in `buffer`.
///
/// # Returns
/// - `Some(offset)`: index of the first marker byte
/// - `None`: buffer shorter than the marker, or no exact match
pub fn find_sync(buffer: &[u8]) -> Option<usize> {
    if buffer.len() < SYNC_MARKER_LEN {
        return None;
    }
    find_pattern(buffer, &SYNC_MARKER)
}

/// Finds the next sync marker at or after `start`.
///
/// Useful for walking several packets in one capture. Returns an absolute offset.
pub fn find_sync_from(buffer: &[u8], start: usize) -> Option<usize> {
    buffer
        .get(start..)
        .and_then(find_sync)
        .map(|offset| start + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_buffers_never_match() {
        for len in 0..SYNC_MARKER_LEN {
            assert_eq!(find_sync(&SYNC_MARKER[..len]), None);
        }
    }

    #[test]
    fn test_exact_marker_at_start() {
        assert_eq!(find_sync(&SYNC_MARKER), Some(0));
    }

    #[test]
    fn test_leftmost_after_partial_run() {
        // A partial marker (first four bytes) followed by the full marker.
        let buffer = [
            0x00, 0xFF, 0x3F, 0xCF, 0xF3, 0x00, 0xFF, 0x3F, 0xCF, 0xF3, 0xFC, 0xFF, 0xC3,
        ];
        assert_eq!(find_sync(&buffer), Some(6));
    }

    #[test]
    fn test_leftmost_of_two_markers() {
        let mut buffer = [0u8; 20];
        buffer[2..8].copy_from_slice(&SYNC_MARKER);
        buffer[12..18].copy_from_slice(&SYNC_MARKER);
        assert_eq!(find_sync(&buffer), Some(2));
        assert_eq!(find_sync_from(&buffer, 3), Some(12));
        assert_eq!(find_sync_from(&buffer, 13), None);
        assert_eq!(find_sync_from(&buffer, 40), None);
    }

    #[test]
    fn test_no_fuzzy_match() {
        // One bit off in the last byte.
        let buffer = [0xFF, 0x3F, 0xCF, 0xF3, 0xFC, 0xFE];
        assert_eq!(find_sync(&buffer), None);
    }

    #[test]
    fn test_find_pattern_edge_cases() {
        assert_eq!(find_pattern(&[1, 2, 3], &[]), None);
        assert_eq!(find_pattern(&[1, 2, 3], &[2, 3]), Some(1));
        assert_eq!(find_pattern(&[1, 2], &[1, 2, 3]), None);
    }
}
