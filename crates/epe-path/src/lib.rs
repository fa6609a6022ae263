// SPDX-License-Identifier: Apache-2.0
//! Dotted hierarchical path parsing and validation.
//!
//! A [`Path`] is an ordered sequence of non-empty segments, addressed as a
//! `.`-joined string such as `user.profile.email`. The empty path denotes the
//! root. Parsing never allocates beyond the segment storage itself and never
//! panics on malformed input — every rejection is a [`PathError`].

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default cap on a single segment's byte length.
pub const DEFAULT_MAX_SEGMENT_BYTES: usize = 256;
/// Default cap on path depth (number of segments).
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Errors produced while parsing or validating a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// A segment was empty (e.g. leading/trailing/doubled `.`).
    #[error("path contains an empty segment")]
    EmptySegment,
    /// A segment exceeded the configured maximum byte length.
    #[error("segment {segment:?} is {len} bytes, exceeds max {max}")]
    SegmentTooLong {
        /// The offending segment.
        segment: String,
        /// Its length in bytes.
        len: usize,
        /// The configured maximum.
        max: usize,
    },
    /// The path exceeded the configured maximum depth.
    #[error("path depth {depth} exceeds max {max}")]
    DepthExceeded {
        /// The observed depth.
        depth: usize,
        /// The configured maximum.
        max: usize,
    },
    /// The input bytes were not valid UTF-8.
    #[error("path bytes are not valid UTF-8")]
    NotUtf8,
}

/// Configurable limits enforced while parsing a [`Path`].
///
/// Defaults match spec: 256-byte segments, depth 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathLimits {
    /// Maximum byte length of a single segment.
    pub max_segment_bytes: usize,
    /// Maximum number of segments in a path.
    pub max_depth: usize,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// An ordered sequence of non-empty segments addressing a node in the policy
/// trie. Two paths are equal iff their segment sequences are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The empty path, denoting the root.
    #[must_use]
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a dotted path string using [`PathLimits::default`].
    pub fn parse(input: &str) -> Result<Self, PathError> {
        Self::parse_with_limits(input, &PathLimits::default())
    }

    /// Parse a dotted path string, enforcing the given limits.
    ///
    /// Splits on `.` with no escape processing; an empty path string denotes
    /// the root. Any empty segment (leading/trailing/doubled separator) is
    /// rejected.
    pub fn parse_with_limits(input: &str, limits: &PathLimits) -> Result<Self, PathError> {
        if input.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for raw in input.split('.') {
            if raw.is_empty() {
                return Err(PathError::EmptySegment);
            }
            if raw.len() > limits.max_segment_bytes {
                return Err(PathError::SegmentTooLong {
                    segment: raw.to_string(),
                    len: raw.len(),
                    max: limits.max_segment_bytes,
                });
            }
            segments.push(raw.to_string());
        }
        if segments.len() > limits.max_depth {
            return Err(PathError::DepthExceeded {
                depth: segments.len(),
                max: limits.max_depth,
            });
        }
        Ok(Self { segments })
    }

    /// Parse raw bytes as UTF-8 then as a dotted path.
    pub fn parse_bytes(input: &[u8], limits: &PathLimits) -> Result<Self, PathError> {
        let text = std::str::from_utf8(input).map_err(|_| PathError::NotUtf8)?;
        Self::parse_with_limits(text, limits)
    }

    /// Build a path directly from already-validated segments, skipping the
    /// separator-splitting parse. Still rejects empty segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment);
        }
        Ok(Self { segments })
    }

    /// The path's segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// `true` for the root path (zero segments).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments (depth) in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            None
        } else {
            Some(Self {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }

    /// Render as a dotted string (empty string for the root).
    #[must_use]
    pub fn to_dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted())
    }
}

impl TryFrom<&str> for Path {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Path {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_dotted())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Path {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Path::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_path() {
        let p = Path::parse("user.profile.email").unwrap();
        assert_eq!(p.segments(), &["user", "profile", "email"]);
        assert_eq!(p.to_dotted(), "user.profile.email");
    }

    #[test]
    fn empty_string_is_root() {
        let p = Path::parse("").unwrap();
        assert!(p.is_root());
        assert_eq!(p.to_dotted(), "");
    }

    #[test]
    fn rejects_doubled_separator() {
        assert_eq!(Path::parse("a..b").unwrap_err(), PathError::EmptySegment);
    }

    #[test]
    fn rejects_leading_and_trailing_dot() {
        assert_eq!(Path::parse(".a").unwrap_err(), PathError::EmptySegment);
        assert_eq!(Path::parse("a.").unwrap_err(), PathError::EmptySegment);
    }

    #[test]
    fn enforces_depth_limit() {
        let limits = PathLimits {
            max_segment_bytes: 256,
            max_depth: 2,
        };
        assert!(Path::parse_with_limits("a.b", &limits).is_ok());
        assert!(matches!(
            Path::parse_with_limits("a.b.c", &limits),
            Err(PathError::DepthExceeded { depth: 3, max: 2 })
        ));
    }

    #[test]
    fn enforces_segment_length() {
        let limits = PathLimits {
            max_segment_bytes: 3,
            max_depth: 32,
        };
        assert!(Path::parse_with_limits("ab.cd", &limits).is_err());
        assert!(Path::parse_with_limits("ab.cde", &limits).is_ok());
    }

    #[test]
    fn child_and_parent_roundtrip() {
        let root = Path::root();
        let a = root.child("a");
        let ab = a.child("b");
        assert_eq!(ab.to_dotted(), "a.b");
        assert_eq!(ab.parent(), Some(a.clone()));
        assert_eq!(a.parent(), Some(root));
    }

    #[test]
    fn rejects_non_utf8_bytes() {
        let limits = PathLimits::default();
        let bytes = [0x61, 0xFF, 0x62];
        assert_eq!(
            Path::parse_bytes(&bytes, &limits).unwrap_err(),
            PathError::NotUtf8
        );
    }
}
