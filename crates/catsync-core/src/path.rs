//! Materialized category paths.
//!
//! A [`CategoryPath`] is the full ancestry of a category, root first. Paths
//! compare segment by segment, so a parent always sorts immediately before
//! its descendants and siblings sort by their own segment. The serialized
//! form joins segments with [`PATH_SEPARATOR`] (`"doors.interior.oak"`) and
//! is what the database indexes for prefix queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const PATH_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("category path must have at least one segment")]
    Empty,
    #[error("invalid path segment {segment:?}: only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidSegment { segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CategoryPath {
    segments: Vec<String>,
}

impl CategoryPath {
    /// Builds a path from already label-safe segments.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Empty`] for an empty segment list and
    /// [`PathError::InvalidSegment`] if any segment contains characters
    /// outside `[A-Za-z0-9_-]`.
    pub fn new<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    /// A single-segment path for a root category.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidSegment`] if `segment` is not label-safe.
    pub fn root(segment: impl Into<String>) -> Result<Self, PathError> {
        Self::new([segment.into()])
    }

    /// Returns this path with `segment` appended.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidSegment`] if `segment` is not label-safe.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, PathError> {
        let segment = segment.into();
        validate_segment(&segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    /// The parent path, or `None` for a root path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments; roots have depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Returns `true` when `self` is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.segments.len() < other.segments.len() && other.segments.starts_with(&self.segments)
    }

    /// Returns `true` when `self` equals `other` or lies underneath it.
    #[must_use]
    pub fn is_self_or_descendant_of(&self, other: &Self) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Encodes an arbitrary external identifier into a label-safe segment.
    ///
    /// ASCII letters, digits and `-` pass through, `_` is doubled, and every
    /// other byte becomes `_` followed by two lowercase hex digits. The
    /// encoding is injective, so distinct identifiers never collide.
    #[must_use]
    pub fn encode_segment(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        for byte in raw.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => out.push(char::from(byte)),
                b'_' => out.push_str("__"),
                other => {
                    out.push('_');
                    out.push_str(&format!("{other:02x}"));
                }
            }
        }
        if out.is_empty() {
            out.push_str("_00");
        }
        out
    }
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    let ok = !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(PathError::InvalidSegment {
            segment: segment.to_string(),
        })
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for CategoryPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        Self::new(s.split(PATH_SEPARATOR))
    }
}

impl Serialize for CategoryPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CategoryPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
