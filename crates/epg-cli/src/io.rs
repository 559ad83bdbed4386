//! Channel sources and XMLTV sinks of the TV system being fed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use epg::{Channel, EpgError, Result};
use serde::Deserialize;
use tracing::info;

/// Where channel names come from and where the XMLTV document goes.
#[async_trait]
pub(crate) trait TvSystem: Send + Sync {
    /// Names of the channels to grab.
    async fn channel_names(&self) -> Result<Vec<String>>;

    /// Deliver the XMLTV document.
    async fn write_xmltv(&self, data: &[u8]) -> Result<()>;
}

fn backend_err(message: impl Into<String>) -> EpgError {
    EpgError::Backend(message.into())
}

/// TVHeadend: channels from its HTTP API, XMLTV into its grabber socket.
#[derive(Debug)]
pub(crate) struct TvheadendIo {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    socket_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    entries: Vec<ChannelListEntry>,
}

#[derive(Debug, Deserialize)]
struct ChannelListEntry {
    val: String,
}

/// Extracts channel names from a TVHeadend `/api/channel/list` body.
fn parse_channel_list(body: &str) -> Result<Vec<String>> {
    let list: ChannelListResponse = serde_json::from_str(body).map_err(|e| {
        backend_err(format!(
            "The TVHeadend channel list was not structured properly: {}",
            e
        ))
    })?;
    Ok(list.entries.into_iter().map(|e| e.val).collect())
}

impl TvheadendIo {
    pub(crate) fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
        socket_path: PathBuf,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EpgError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
            username,
            password,
            socket_path,
        })
    }
}

#[async_trait]
impl TvSystem for TvheadendIo {
    async fn channel_names(&self) -> Result<Vec<String>> {
        info!("Requesting known channel list from TVHeadend...");
        let url = format!("{}/api/channel/list", self.base_url);

        let mut request = self.client.get(&url);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request.send().await.map_err(|e| {
            backend_err(format!("Could not connect to TVHeadend on {}: {}", self.base_url, e))
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(backend_err(
                "TVHeadend refused the credentials; enable basic authentication or use file mode",
            ));
        }
        if !status.is_success() {
            return Err(backend_err(format!(
                "Error getting channel list from TVHeadend. The status code was: {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| backend_err(format!("Error reading TVHeadend channel list: {}", e)))?;
        parse_channel_list(&body)
    }

    #[cfg(unix)]
    async fn write_xmltv(&self, data: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        info!("Writing XMLTV directly to TVHeadend...");
        let fail = |e: std::io::Error| {
            backend_err(format!(
                "Error writing XMLTV to '{}': {}. Is TVHeadend running and is the XMLTV grabber enabled?",
                self.socket_path.display(),
                e
            ))
        };

        let mut stream = tokio::net::UnixStream::connect(&self.socket_path)
            .await
            .map_err(fail)?;
        stream.write_all(data).await.map_err(fail)?;
        stream.shutdown().await.map_err(fail)
    }

    #[cfg(not(unix))]
    async fn write_xmltv(&self, _data: &[u8]) -> Result<()> {
        Err(backend_err(format!(
            "Cannot write to '{}': unix sockets are not supported on this platform, use file mode",
            self.socket_path.display()
        )))
    }
}

async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data).await.map_err(|e| {
        backend_err(format!(
            "Error writing '{}': {}. Is the path correct and is it writable?",
            path.display(),
            e
        ))
    })
}

/// Channel names from a text file, XMLTV into a file.
#[derive(Debug)]
pub(crate) struct FileIo {
    channel_file: PathBuf,
    xmltv_file: PathBuf,
}

impl FileIo {
    pub(crate) const fn new(channel_file: PathBuf, xmltv_file: PathBuf) -> Self {
        Self {
            channel_file,
            xmltv_file,
        }
    }
}

#[async_trait]
impl TvSystem for FileIo {
    async fn channel_names(&self) -> Result<Vec<String>> {
        info!(
            "Reading known channel list from '{}'...",
            self.channel_file.display()
        );
        let text = tokio::fs::read_to_string(&self.channel_file)
            .await
            .map_err(|e| {
                backend_err(format!(
                    "Error reading '{}': {}. Does the file exist and is it readable?",
                    self.channel_file.display(),
                    e
                ))
            })?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn write_xmltv(&self, data: &[u8]) -> Result<()> {
        info!("Writing XMLTV to '{}'...", self.xmltv_file.display());
        write_file(&self.xmltv_file, data).await
    }
}

/// Channel names given on the command line, XMLTV into a file.
#[derive(Debug)]
pub(crate) struct ChannelListIo {
    channels: Vec<String>,
    xmltv_file: PathBuf,
}

impl ChannelListIo {
    pub(crate) const fn new(channels: Vec<String>, xmltv_file: PathBuf) -> Self {
        Self {
            channels,
            xmltv_file,
        }
    }
}

#[async_trait]
impl TvSystem for ChannelListIo {
    async fn channel_names(&self) -> Result<Vec<String>> {
        Ok(self
            .channels
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }

    async fn write_xmltv(&self, data: &[u8]) -> Result<()> {
        info!("Writing XMLTV to '{}'...", self.xmltv_file.display());
        write_file(&self.xmltv_file, data).await
    }
}

/// Writes one channel name per line, replacing `path`.
pub(crate) async fn write_channel_list(path: &Path, channels: &[Channel]) -> Result<()> {
    info!("Writing channel list to '{}'", path.display());
    let mut text = String::new();
    for channel in channels {
        text.push_str(&channel.name);
        text.push('\n');
    }
    write_file(path, text.as_bytes()).await
}
