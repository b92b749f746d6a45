use super::{ArchiveStream, ImageDaemon};
use crate::error::RuntimeError;
use crate::types::{ImageRecord, LoadMessage};
use async_trait::async_trait;
use bollard::image::{ImportImageOptions, ListImagesOptions};
use bollard::models::BuildInfo;
use bollard::{ClientVersion, Docker};
use bytes::Bytes;
use futures_util::stream::{StreamExt, TryStreamExt};
use log::debug;
use std::env;
use std::path::PathBuf;

/// How to reach a daemon, parsed from a host string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSpec {
    /// `tcp://host:port`
    Tcp { addr: String },
    /// `tcp://host:port,ca=...,cert=...,key=...`
    Tls {
        addr: String,
        ca: PathBuf,
        cert: PathBuf,
        key: PathBuf,
    },
    /// `unix:///path/to/docker.sock`
    Unix { path: String },
}

impl HostSpec {
    pub fn parse(host: &str) -> Result<Self, RuntimeError> {
        let invalid = || RuntimeError::InvalidHost(host.to_string());
        let host = host.trim();

        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(HostSpec::Unix {
                path: path.to_string(),
            });
        }

        let rest = host.strip_prefix("tcp://").ok_or_else(invalid)?;
        let mut parts = rest.split(',');
        let addr = parts.next().unwrap_or_default();
        match addr.rsplit_once(':') {
            Some((name, port)) if !name.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(invalid()),
        }

        let (mut ca, mut cert, mut key) = (None, None, None);
        for part in parts {
            let (k, v) = part.split_once('=').ok_or_else(invalid)?;
            let slot = match k.trim() {
                "ca" => &mut ca,
                "cert" => &mut cert,
                "key" => &mut key,
                _ => return Err(invalid()),
            };
            *slot = Some(expand_home(v.trim()));
        }

        let addr = format!("tcp://{}", addr);
        match (ca, cert, key) {
            (None, None, None) => Ok(HostSpec::Tcp { addr }),
            (Some(ca), Some(cert), Some(key)) => Ok(HostSpec::Tls {
                addr,
                ca,
                cert,
                key,
            }),
            _ => Err(invalid()),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Settings shared by every daemon connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Docker API version, e.g. `1.41`.
    pub api_version: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            api_version: "1.41".into(),
            timeout_secs: 10,
        }
    }
}

fn parse_api_version(version: &str) -> Result<ClientVersion, RuntimeError> {
    let invalid = || RuntimeError::InvalidApiVersion(version.to_string());
    let (major, minor) = version.trim().split_once('.').ok_or_else(invalid)?;
    Ok(ClientVersion {
        major_version: major.parse().map_err(|_| invalid())?,
        minor_version: minor.parse().map_err(|_| invalid())?,
    })
}

/// A daemon reached through the Docker Engine API.
pub struct DockerDaemon {
    host: String,
    docker: Docker,
}

impl DockerDaemon {
    /// Builds a client for `host`.  No request is made until first use.
    pub fn connect(host: &str, options: &ConnectOptions) -> Result<Self, RuntimeError> {
        let version = parse_api_version(&options.api_version)?;
        let docker = match HostSpec::parse(host)? {
            HostSpec::Tcp { addr } => Docker::connect_with_http(&addr, options.timeout_secs, &version)?,
            HostSpec::Tls {
                addr,
                ca,
                cert,
                key,
            } => Docker::connect_with_ssl(&addr, &key, &cert, &ca, options.timeout_secs, &version)?,
            HostSpec::Unix { path } => Docker::connect_with_unix(&path, options.timeout_secs, &version)?,
        };
        debug!("Built Docker client for {}", host);

        Ok(Self {
            host: host.trim().to_string(),
            docker,
        })
    }
}

#[async_trait]
impl ImageDaemon for DockerDaemon {
    fn name(&self) -> &str {
        &self.host
    }

    async fn list_images(&self, all: bool) -> Result<Vec<ImageRecord>, RuntimeError> {
        let opts = ListImagesOptions::<String> {
            all,
            ..Default::default()
        };
        let images = self.docker.list_images(Some(opts)).await?;

        Ok(images
            .into_iter()
            .map(|image| ImageRecord {
                id: image.id,
                tags: image.repo_tags,
            })
            .collect())
    }

    fn save_images<'a>(&'a self, ids: &'a [String]) -> ArchiveStream<'a> {
        let names: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.docker
            .export_images(&names)
            .map_err(RuntimeError::from)
            .boxed()
    }

    async fn load_images(&self, archive: Bytes) -> Result<Vec<LoadMessage>, RuntimeError> {
        let opts = ImportImageOptions { quiet: false };
        let mut stream = self.docker.import_image(opts, archive, None);

        let mut messages = Vec::new();
        while let Some(msg) = stream.next().await {
            messages.push(LoadMessage::from(msg?));
        }
        Ok(messages)
    }
}

impl From<BuildInfo> for LoadMessage {
    fn from(info: BuildInfo) -> Self {
        let error = info
            .error
            .or_else(|| info.error_detail.and_then(|detail| detail.message));
        LoadMessage {
            stream: info.stream,
            status: info.status,
            error,
        }
    }
}
