//! Dotted-quad pattern matching with word-boundary checks.

use std::ops::Range;

use regex_automata::meta::Regex;
use regex_syntax::hir::Hir;

use crate::error::Result;

/// Longest possible dotted-quad token, `255.255.255.255`.
pub const MAX_TOKEN_LEN: usize = 15;

/// Four octets of `25[0-5] | 2[0-4][0-9] | [01]?[0-9][0-9]?`.
///
/// regex-automata has no look-around, so the boundary rules live in
/// [`PatternMatcher::find_iter`].
static IPV4_PATTERN: &str = r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";

/// Which ends of a buffer are the real ends of the stream it came from.
///
/// A match that touches a buffer end which is *not* a stream end cannot have
/// its boundary checked, so it is held back for the neighbouring chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edges {
    pub stream_start: bool,
    pub stream_end: bool,
}

impl Edges {
    /// The buffer is the whole stream.
    pub const COMPLETE: Edges = Edges {
        stream_start: true,
        stream_end: true,
    };
}

impl Default for Edges {
    fn default() -> Self {
        Edges::COMPLETE
    }
}

/// Scans bytes for dotted-quad candidates.
#[derive(Clone, Debug)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    /// Compile the dotted-quad pattern.
    pub fn new() -> Result<Self> {
        let hir: Hir = regex_syntax::Parser::new()
            .parse(IPV4_PATTERN)
            .map_err(Box::new)?;

        let regex = Regex::builder()
            .configure(
                Regex::config()
                    .auto_prefilter(true)
                    .match_kind(regex_automata::MatchKind::LeftmostFirst),
            )
            .build_from_hir(&hir)?;

        Ok(PatternMatcher { regex })
    }

    /// Return the byte ranges of every bounded dotted-quad in `haystack`.
    ///
    /// Matches are greedy, left to right and never overlap. Candidates are
    /// only shape-checked here; octet formatting and address class are the
    /// classifier's job.
    #[inline]
    pub fn find_iter<'a>(
        &'a self,
        haystack: &'a [u8],
        edges: Edges,
    ) -> impl Iterator<Item = Range<usize>> + 'a {
        self.regex.find_iter(haystack).filter_map(move |m| {
            let range = m.range();
            if left_bounded(haystack, range.start, edges) && right_bounded(haystack, range.end, edges)
            {
                Some(range)
            } else {
                None
            }
        })
    }
}

/// Bytes that would glue onto a token from the left.
#[inline(always)]
fn extends_left(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Bytes that would glue onto a token from the right. A lone trailing dot is
/// handled separately so that sentence endings still match.
#[inline(always)]
fn extends_right(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[inline]
fn left_bounded(haystack: &[u8], start: usize, edges: Edges) -> bool {
    match start.checked_sub(1) {
        Some(prev) => !extends_left(haystack[prev]),
        None => edges.stream_start,
    }
}

#[inline]
fn right_bounded(haystack: &[u8], end: usize, edges: Edges) -> bool {
    match haystack.get(end) {
        None => edges.stream_end,
        // "1.2.3.4." ends a sentence, "1.2.3.4.5" is something else
        Some(b'.') => match haystack.get(end + 1) {
            None => edges.stream_end,
            Some(next) => !next.is_ascii_digit(),
        },
        Some(&next) => !extends_right(next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(haystack: &[u8], edges: Edges) -> Vec<String> {
        let matcher = PatternMatcher::new().unwrap();
        matcher
            .find_iter(haystack, edges)
            .map(|r| String::from_utf8_lossy(&haystack[r]).into_owned())
            .collect()
    }

    #[test]
    fn finds_plain_addresses() {
        assert_eq!(
            matches(b"from 192.168.1.1 to 8.8.8.8", Edges::COMPLETE),
            ["192.168.1.1", "8.8.8.8"]
        );
    }

    #[test]
    fn rejects_glued_tokens() {
        for hay in [
            &b"abc1.2.3.4"[..],
            b"1.2.3.4abc",
            b"1.2.3.4_",
            b"_1.2.3.4",
            b"1.2.3.4.5",
            b"v.1.2.3.4",
            b"11111.2.3.4",
            b"1.2.3.4444",
        ] {
            assert!(matches(hay, Edges::COMPLETE).is_empty(), "{hay:?}");
        }
    }

    #[test]
    fn sentence_ending_dot_is_allowed() {
        assert_eq!(matches(b"seen at 10.0.0.1.", Edges::COMPLETE), ["10.0.0.1"]);
        assert_eq!(matches(b"10.0.0.1. Next", Edges::COMPLETE), ["10.0.0.1"]);
    }

    #[test]
    fn out_of_range_octets_do_not_match() {
        assert!(matches(b"x 999.1.1.1 y 300.1.1.1 z 1.2.3.256", Edges::COMPLETE).is_empty());
    }

    #[test]
    fn leading_zero_shapes_reach_the_classifier() {
        // the grammar allows them; parse_dotted_quad rejects them later
        assert_eq!(matches(b"at 01.2.3.4 now", Edges::COMPLETE), ["01.2.3.4"]);
    }

    #[test]
    fn open_edges_hold_back_touching_matches() {
        let open = Edges {
            stream_start: false,
            stream_end: false,
        };
        assert!(matches(b"1.2.3.4 tail", open).is_empty());
        assert!(matches(b"head 1.2.3.4", open).is_empty());
        // a trailing dot needs one more byte to be decided
        assert!(matches(b"head 1.2.3.4.", open).is_empty());
        assert_eq!(matches(b"head 1.2.3.4. ", open), ["1.2.3.4"]);
        assert_eq!(matches(b" 1.2.3.4 ", open), ["1.2.3.4"]);
    }

    #[test]
    fn non_ascii_neighbours_are_boundaries() {
        assert_eq!(
            matches("→8.8.4.4←".as_bytes(), Edges::COMPLETE),
            ["8.8.4.4"]
        );
    }
}
