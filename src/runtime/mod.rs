use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::RuntimeError;
use crate::types::{ImageRecord, LoadMessage};

pub mod docker;
pub use docker::{ConnectOptions, DockerDaemon, HostSpec};

/// Archive bytes as the source daemon streams them.
pub type ArchiveStream<'a> = BoxStream<'a, Result<Bytes, RuntimeError>>;

/// An already connected container daemon.
///
/// The engine only borrows handles; building and dropping them is the
/// caller's business.
#[async_trait]
pub trait ImageDaemon: Send + Sync {
    /// Host the handle was built from, used to name it in reports.
    fn name(&self) -> &str;

    /// Lists images, including intermediate ones when `all` is set.
    async fn list_images(&self, all: bool) -> Result<Vec<ImageRecord>, RuntimeError>;

    /// Streams one archive holding every image named in `ids`.
    fn save_images<'a>(&'a self, ids: &'a [String]) -> ArchiveStream<'a>;

    /// Loads an archive and drains the daemon's status messages.
    async fn load_images(&self, archive: Bytes) -> Result<Vec<LoadMessage>, RuntimeError>;
}
