//! Data structures shared by the migration engine.
//!
//! Images are described the same way on every daemon: an opaque content
//! identifier plus the `repository:tag` names pointing at it.  Everything
//! here is produced fresh per invocation; nothing is cached across runs.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// One entry of a daemon's image listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub tags: Vec<String>,
}

impl ImageRecord {
    pub fn new(id: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            id: id.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Image identifier → tags that matched the selection pattern.
///
/// Every value is non-empty: images without a matching tag are left out.
pub type SelectionResult = HashMap<String, Vec<String>>;

/// An image and its matched tags, saved and broadcast as one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    pub id: String,
    pub tags: Vec<String>,
}

impl MigrationUnit {
    pub fn new(id: String, tags: Vec<String>) -> Self {
        Self { id, tags }
    }

    /// Names handed to the save call: the tags first, then the bare id.
    ///
    /// Saving by tag is what makes the destination recreate the tags on load;
    /// the id keeps the image itself in the archive.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids = self.tags.clone();
        ids.push(self.id.clone());
        ids
    }
}

/// One decoded message of the status stream a daemon returns from a load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadMessage {
    pub fn stream(text: impl Into<String>) -> Self {
        Self {
            stream: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            error: Some(text.into()),
            ..Default::default()
        }
    }
}

impl fmt::Display for LoadMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .error
            .as_deref()
            .or(self.stream.as_deref())
            .or(self.status.as_deref())
            .unwrap_or_default();
        write!(f, "{}", text.trim_end())
    }
}

/// Result of loading one archive into one destination.
#[derive(Debug)]
pub struct DestinationOutcome {
    /// Position of the destination in the list the broadcast was given.
    pub index: usize,
    /// Host the destination handle was built from.
    pub destination: String,
    pub error: Option<MigrateError>,
}

impl DestinationOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of migrating one selected image.
///
/// `Err` means the archive never reached the broadcast step; otherwise every
/// destination has its own outcome.
#[derive(Debug)]
pub struct ImageOutcome {
    pub id: String,
    pub tags: Vec<String>,
    pub result: Result<Vec<DestinationOutcome>, MigrateError>,
}

impl ImageOutcome {
    pub fn is_success(&self) -> bool {
        match &self.result {
            Ok(outcomes) => outcomes.iter().all(DestinationOutcome::is_success),
            Err(_) => false,
        }
    }
}

/// Aggregate of one `migrate` invocation.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub images: Vec<ImageOutcome>,
}

impl MigrationReport {
    /// Number of images that did not reach every destination.
    pub fn failed_images(&self) -> usize {
        self.images.iter().filter(|i| !i.is_success()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_images() > 0
    }

    /// Every failure in the report, tagged with its image and, when the
    /// failure happened during a load, its destination.
    pub fn errors(&self) -> Vec<(&str, Option<&str>, &MigrateError)> {
        let mut errors = Vec::new();
        for image in &self.images {
            match &image.result {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        if let Some(err) = &outcome.error {
                            errors.push((image.id.as_str(), Some(outcome.destination.as_str()), err));
                        }
                    }
                }
                Err(err) => errors.push((image.id.as_str(), None, err)),
            }
        }
        errors
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for image in &self.images {
            write!(f, "image {} ({})", image.id, image.tags.join(", "))?;
            match &image.result {
                Ok(outcomes) => {
                    writeln!(f)?;
                    for outcome in outcomes {
                        match &outcome.error {
                            None => writeln!(f, "  {}: ok", outcome.destination)?,
                            Some(err) => writeln!(f, "  {}: failed: {}", outcome.destination, err)?,
                        }
                    }
                }
                Err(err) => writeln!(f, ": failed: {}", err)?,
            }
        }
        write!(
            f,
            "{} image(s) migrated, {} failed",
            self.images.len() - self.failed_images(),
            self.failed_images()
        )
    }
}
