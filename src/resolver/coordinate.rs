//! Artifact coordinates (`group:artifact:version`) and the repository layout derived from them.

use crate::error::ResolutionError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// File extension of script module artifacts.
pub const ARTIFACT_EXTENSION: &str = "rhai";

/// A dependency coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl Coordinate {
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
        }
    }

    /// Relative directory of this coordinate: `<group as path>/<artifact>/<version>`.
    pub fn sub_dir(&self) -> PathBuf {
        let mut dir = PathBuf::new();
        for segment in self.group.split('.') {
            dir.push(segment);
        }
        dir.push(&self.artifact);
        dir.push(&self.version);
        dir
    }

    /// Artifact file name: `<artifact>-<version>.rhai`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.{}", self.artifact, self.version, ARTIFACT_EXTENSION)
    }

    /// Relative path of the artifact in a repository or in the cache.
    pub fn relative_path(&self) -> PathBuf {
        self.sub_dir().join(self.file_name())
    }

    /// URL path of the artifact below a repository base URL (always `/`-separated).
    pub fn url_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.file_name()
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        && !segment.split('.').any(|part| part.is_empty() || part == "..")
}

impl FromStr for Coordinate {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            [group, artifact, version]
                if valid_segment(group) && valid_segment(artifact) && valid_segment(version) =>
            {
                Ok(Coordinate::new(*group, *artifact, *version))
            }
            _ => Err(ResolutionError::InvalidCoordinate(s.to_string())),
        }
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
