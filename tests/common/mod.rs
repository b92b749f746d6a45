// In-memory daemon used by the integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use docker_migrate::runtime::{ArchiveStream, ImageDaemon};
use docker_migrate::types::{ImageRecord, LoadMessage};
use docker_migrate::RuntimeError;
use futures_util::stream::{self, StreamExt};

pub const ALPINE_ID: &str = "e66264b98777";
pub const GOLANG_ID: &str = "759ab1463be2";

#[derive(Clone)]
pub enum Save {
    /// Yield these chunks
    Chunks(Vec<&'static [u8]>),
    /// Fail before any byte
    Refuse,
    /// Yield some bytes then break
    Truncate,
}

#[derive(Clone)]
pub enum Load {
    Accept,
    Refuse(&'static str),
    /// Succeed at transport level but report an error in the status stream
    ReportError(&'static str),
    Hang,
}

pub struct FakeDaemon {
    name: String,
    images: Vec<ImageRecord>,
    list_fails: bool,
    save: Save,
    load: Load,
    pub list_calls: AtomicUsize,
    pub save_calls: Mutex<Vec<Vec<String>>>,
    pub loaded: Mutex<Vec<Bytes>>,
}

impl FakeDaemon {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            images: Vec::new(),
            list_fails: false,
            save: Save::Chunks(vec![&b"archive-"[..], &b"bytes"[..]]),
            load: Load::Accept,
            list_calls: AtomicUsize::new(0),
            save_calls: Mutex::new(Vec::new()),
            loaded: Mutex::new(Vec::new()),
        }
    }

    /// Source holding the alpine and golang images.
    pub fn source() -> Self {
        Self::new("tcp://source:2375").with_images(vec![
            ImageRecord::new(ALPINE_ID, &["alpine:latest", "alpine:3.16"]),
            ImageRecord::new(GOLANG_ID, &["golang:latest"]),
            ImageRecord::new("1b2c3d4e5f60", &[]),
        ])
    }

    pub fn with_images(mut self, images: Vec<ImageRecord>) -> Self {
        self.images = images;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.list_fails = true;
        self
    }

    pub fn with_save(mut self, save: Save) -> Self {
        self.save = save;
        self
    }

    pub fn with_load(mut self, load: Load) -> Self {
        self.load = load;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.save_calls.lock().unwrap().len()
    }

    pub fn load_count(&self) -> usize {
        self.loaded.lock().unwrap().len()
    }
}

fn refused(name: &str) -> RuntimeError {
    RuntimeError::Other(format!("Cannot connect to the Docker daemon at {}", name))
}

#[async_trait]
impl ImageDaemon for FakeDaemon {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_images(&self, all: bool) -> Result<Vec<ImageRecord>, RuntimeError> {
        assert!(all, "selection must list intermediate images too");
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.list_fails {
            return Err(refused(&self.name));
        }
        Ok(self.images.clone())
    }

    fn save_images<'a>(&'a self, ids: &'a [String]) -> ArchiveStream<'a> {
        self.save_calls.lock().unwrap().push(ids.to_vec());
        let items: Vec<Result<Bytes, RuntimeError>> = match &self.save {
            Save::Chunks(chunks) => chunks.iter().map(|c| Ok(Bytes::from_static(*c))).collect(),
            Save::Refuse => vec![Err(refused(&self.name))],
            Save::Truncate => vec![
                Ok(Bytes::from_static(b"partial")),
                Err(RuntimeError::Other("unexpected EOF".into())),
            ],
        };
        stream::iter(items).boxed()
    }

    async fn load_images(&self, archive: Bytes) -> Result<Vec<LoadMessage>, RuntimeError> {
        match &self.load {
            Load::Accept => {
                self.loaded.lock().unwrap().push(archive);
                Ok(vec![LoadMessage::stream("Loaded image: alpine:latest\n")])
            }
            Load::Refuse(msg) => Err(RuntimeError::Other(msg.to_string())),
            Load::ReportError(msg) => Ok(vec![LoadMessage::error(*msg)]),
            Load::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}
