use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A pre-parsed, dot-separated address into the state document.
///
/// Paths are parsed once at the API edge and carried as structured segments
/// afterwards, so the store never re-splits strings on the hot path. A
/// segment that parses as an unsigned integer indexes into an array when the
/// value being walked is one; otherwise it is an object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatePath(Vec<String>);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("empty segment in path: {0}")]
    EmptySegment(String),
}

impl StatePath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.trim().is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }
        Ok(Self(segments))
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn root(&self) -> &str {
        &self.0[0]
    }

    /// Returns a new path with `segment` appended.
    pub fn child<S: Into<String>>(&self, segment: S) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Concatenates another path onto this one.
    pub fn join(&self, other: &StatePath) -> Self {
        let mut segments = self.0.clone();
        segments.extend_from_slice(&other.0);
        Self(segments)
    }
}

impl FromStr for StatePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_roundtrip() {
        let path = StatePath::parse("workspace.stateByAgent.scraper.status").unwrap();
        assert_eq!(path.segments().len(), 4);
        assert_eq!(path.to_string(), "workspace.stateByAgent.scraper.status");
        assert_eq!(path.root(), "workspace");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(StatePath::parse(""), Err(PathError::Empty));
        assert_eq!(StatePath::parse("  "), Err(PathError::Empty));
        assert!(matches!(
            StatePath::parse("a..b"),
            Err(PathError::EmptySegment(_))
        ));
    }

    #[test]
    fn child_and_join() {
        let base = StatePath::parse("workspace.artifacts").unwrap();
        let indexed = base.child("0").join(&StatePath::parse("data.email").unwrap());
        assert_eq!(indexed.to_string(), "workspace.artifacts.0.data.email");
    }
}
