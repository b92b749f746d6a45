//! Migration engine.
//!
//! An invocation lists the source once, then handles each selected image as
//! its own unit: the source saves the image into a single archive which is
//! buffered in memory and loaded into every destination concurrently.  Units
//! run one after another so only one archive is resident at a time.
//!
//! A single deadline, fixed when [`Migrator::migrate`] starts, bounds the
//! listing, every save and every load.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use regex::Regex;
use tokio::time::{timeout_at, Instant};

use crate::error::{MigrateError, RuntimeError};
use crate::matcher::matching_tags;
use crate::runtime::ImageDaemon;
use crate::types::{DestinationOutcome, ImageOutcome, MigrationReport, MigrationUnit, SelectionResult};

/// How long a broadcast waits past the deadline for load tasks to report.
pub const BROADCAST_GRACE: Duration = Duration::from_secs(1);

/// Stand-in deadline when the configured timeout cannot be represented.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The instant `timeout` from now, saturating to [`FAR_FUTURE`].
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Lists every image of `source` and keeps those with a tag matching `pattern`.
pub async fn select(source: &dyn ImageDaemon, pattern: &str) -> Result<SelectionResult, MigrateError> {
    let re = Regex::new(pattern)?;
    select_matching(source, &re).await
}

async fn select_matching(source: &dyn ImageDaemon, re: &Regex) -> Result<SelectionResult, MigrateError> {
    let images = source
        .list_images(true)
        .await
        .map_err(MigrateError::SourceUnreachable)?;
    debug!("{} listed {} images", source.name(), images.len());

    let mut selected = SelectionResult::new();
    for image in images {
        let tags = matching_tags(re, &image.tags);
        if !tags.is_empty() {
            selected.insert(image.id, tags);
        }
    }
    Ok(selected)
}

/// Saves `ids` from `source` into one archive and reads it fully into memory.
///
/// A stream that fails before yielding anything means the save call itself
/// failed; a failure after that is a broken transfer.
pub async fn produce(source: &dyn ImageDaemon, ids: &[String]) -> Result<Bytes, MigrateError> {
    let mut stream = source.save_images(ids);
    let mut archive = BytesMut::new();
    let mut received = false;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                received = true;
                archive.extend_from_slice(&chunk);
            }
            Err(e) if !received => return Err(MigrateError::SourceUnreachable(e)),
            Err(e) => return Err(MigrateError::ArchiveRead(e)),
        }
    }

    if archive.is_empty() {
        return Err(MigrateError::ArchiveRead(RuntimeError::Other(
            "source returned an empty archive".into(),
        )));
    }
    Ok(archive.freeze())
}

/// Loads `archive` into every destination at once and waits for all of them.
///
/// Returns exactly one outcome per destination, in the order given.  A
/// destination still running `BROADCAST_GRACE` after the deadline is
/// aborted and reported as timed out.
pub async fn broadcast(
    archive: Bytes,
    destinations: &[Arc<dyn ImageDaemon>],
    deadline: Instant,
) -> Vec<DestinationOutcome> {
    let handles: Vec<_> = destinations
        .iter()
        .map(|destination| {
            let destination = Arc::clone(destination);
            let archive = archive.clone();
            tokio::spawn(async move {
                match timeout_at(deadline, load_into(destination.as_ref(), archive)).await {
                    Ok(result) => result.err(),
                    Err(_) => Some(MigrateError::deadline(format!("load into {}", destination.name()))),
                }
            })
        })
        .collect();
    drop(archive);

    let join_deadline = deadline.checked_add(BROADCAST_GRACE).unwrap_or(deadline);
    let mut outcomes = Vec::with_capacity(destinations.len());
    for (index, (destination, mut handle)) in destinations.iter().zip(handles).enumerate() {
        let name = destination.name().to_string();
        let error = match timeout_at(join_deadline, &mut handle).await {
            Ok(Ok(error)) => error,
            Ok(Err(join_error)) => Some(MigrateError::DestinationLoad {
                destination: name.clone(),
                message: format!("load task failed: {}", join_error),
            }),
            Err(_) => {
                handle.abort();
                Some(MigrateError::deadline(format!("load into {} (never completed)", name)))
            }
        };

        match &error {
            None => info!("Loaded archive into {}", name),
            Some(e) => warn!("{}", e),
        }
        outcomes.push(DestinationOutcome {
            index,
            destination: name,
            error,
        });
    }
    outcomes
}

async fn load_into(destination: &dyn ImageDaemon, archive: Bytes) -> Result<(), MigrateError> {
    let load_error = |message: String| MigrateError::DestinationLoad {
        destination: destination.name().to_string(),
        message,
    };

    let messages = destination
        .load_images(archive)
        .await
        .map_err(|e| load_error(e.to_string()))?;

    for msg in &messages {
        info!("{}: {}", destination.name(), msg);
    }
    // Some daemons report a rejected archive inside an otherwise successful
    // response.
    match messages.into_iter().find_map(|msg| msg.error) {
        Some(message) => Err(load_error(message)),
        None => Ok(()),
    }
}

/// Moves images from one source daemon to any number of destinations.
pub struct Migrator {
    source: Arc<dyn ImageDaemon>,
    destinations: Vec<Arc<dyn ImageDaemon>>,
    timeout: Duration,
}

impl Migrator {
    pub fn new(source: Arc<dyn ImageDaemon>, destinations: Vec<Arc<dyn ImageDaemon>>, timeout: Duration) -> Self {
        Self {
            source,
            destinations,
            timeout,
        }
    }

    /// Migrates every image with a tag matching `pattern`.
    ///
    /// Fails only when the pattern is invalid or the source cannot be
    /// listed.  Per-image and per-destination failures end up in the report.
    pub async fn migrate(&self, pattern: &str) -> Result<MigrationReport, MigrateError> {
        let deadline = deadline_after(self.timeout);
        let re = Regex::new(pattern)?;

        if self.destinations.is_empty() {
            info!("No destination daemons given, nothing to migrate");
            return Ok(MigrationReport::default());
        }

        let selected = timeout_at(deadline, select_matching(self.source.as_ref(), &re))
            .await
            .map_err(|_| MigrateError::deadline("image listing"))??;
        info!(
            "Selected {} images on {} matching `{}`",
            selected.len(),
            self.source.name(),
            pattern
        );

        let mut units: Vec<MigrationUnit> = selected
            .into_iter()
            .map(|(id, tags)| MigrationUnit::new(id, tags))
            .collect();
        units.sort_by(|a, b| a.id.cmp(&b.id));

        let mut report = MigrationReport::default();
        for unit in units {
            info!("Migrating {} ({})", unit.id, unit.tags.join(", "));
            let result = self.migrate_unit(&unit, deadline).await;
            if let Err(e) = &result {
                error!("Failed to migrate {}: {}", unit.id, e);
            }
            report.images.push(ImageOutcome {
                id: unit.id,
                tags: unit.tags,
                result,
            });
        }
        Ok(report)
    }

    async fn migrate_unit(
        &self,
        unit: &MigrationUnit,
        deadline: Instant,
    ) -> Result<Vec<DestinationOutcome>, MigrateError> {
        if Instant::now() >= deadline {
            return Err(MigrateError::deadline(format!("migration of {}", unit.id)));
        }

        let ids = unit.identifiers();
        let archive = timeout_at(deadline, produce(self.source.as_ref(), &ids))
            .await
            .map_err(|_| MigrateError::deadline(format!("save of {}", unit.id)))??;
        debug!("Archive for {} is {} bytes", unit.id, archive.len());

        Ok(broadcast(archive, &self.destinations, deadline).await)
    }
}
