/// Streaming download of a single recording.
///
/// The body is written to disk in blocks of at most `BLOCK_SIZE` bytes, a
/// progress event is emitted after each block, and the final byte count is
/// checked against the declared content length.
use futures_util::{Stream, StreamExt};
use reqwest::header::COOKIE;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use playon_shared::errors::{PlayOnError, PlayOnResult};
use playon_shared::models::{DownloadDescriptor, DownloadEvent, LibraryItem};

/// Bytes written per block.
pub const BLOCK_SIZE: usize = 1024;

/// Default extension for downloaded recordings.
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Sending half of a progress sink. A dropped receiver never affects a transfer.
pub type ProgressSender = mpsc::UnboundedSender<DownloadEvent>;

/// Replace characters that are path separators or invalid on common filesystems.
pub fn sanitize_file_stem(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Name a recording is saved under. Titles that sanitizing would alter get
/// the item ID appended, so two titles never share a file.
pub fn destination_name(item: &LibraryItem) -> String {
    let title = item.title();
    if sanitize_file_stem(&title) == title {
        title
    } else {
        format!("{} [{}]", title, item.id)
    }
}

/// Copy a byte stream into `writer`, block by block.
///
/// `expected` is the declared content length; `None` or `Some(0)` disables the
/// length check. Returns the number of bytes written.
pub async fn copy_stream<S, B, E, W>(
    stream: S,
    expected: Option<u64>,
    writer: &mut W,
    progress: Option<&ProgressSender>,
) -> PlayOnResult<u64>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    PlayOnError: From<E>,
    W: AsyncWrite + Unpin,
{
    let total = expected.filter(|&n| n > 0);
    let emit = |event: DownloadEvent| {
        if let Some(tx) = progress {
            let _ = tx.send(event);
        }
    };

    emit(DownloadEvent::Started { total });

    let mut stream = std::pin::pin!(stream);
    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for block in chunk.as_ref().chunks(BLOCK_SIZE) {
            writer.write_all(block).await?;
            downloaded += block.len() as u64;
            emit(DownloadEvent::Advanced { downloaded, total });
        }
    }
    writer.flush().await?;

    if let Some(expected) = total {
        if downloaded != expected {
            return Err(PlayOnError::TransferIncomplete {
                expected,
                received: downloaded,
            });
        }
    }

    emit(DownloadEvent::Finished { downloaded });
    Ok(downloaded)
}

/// Downloads resolved descriptors into an output directory.
pub struct DownloadExecutor {
    http: Client,
    output_dir: PathBuf,
    extension: String,
}

impl DownloadExecutor {
    pub fn new(http: Client, output_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            http,
            output_dir: output_dir.into(),
            extension: extension.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Destination path for a recording titled `title`.
    pub fn destination(&self, title: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", sanitize_file_stem(title), self.extension))
    }

    /// Stream `descriptor` to `<output_dir>/<title>.<ext>` and return the path.
    ///
    /// A non-success status fails before the file is created. On any later
    /// failure the partial file is left in place.
    pub async fn download(
        &self,
        descriptor: &DownloadDescriptor,
        title: &str,
        progress: Option<&ProgressSender>,
    ) -> PlayOnResult<PathBuf> {
        let path = self.destination(title);

        let mut request = self.http.get(&descriptor.url);
        if let Some(cookie) = descriptor.cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlayOnError::HttpStatus {
                status: status.as_u16(),
                url: descriptor.url.clone(),
            });
        }

        let expected = response.content_length();
        debug!(
            "Streaming {} ({} bytes declared) to {}",
            title,
            expected.map(|n| n.to_string()).unwrap_or_else(|| "unknown".into()),
            path.display()
        );

        if !self.output_dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&self.output_dir).await?;
        }
        if tokio::fs::try_exists(&path).await? {
            warn!("Replacing existing file {}", path.display());
        }
        let mut file = tokio::fs::File::create(&path).await?;

        let written = copy_stream(response.bytes_stream(), expected, &mut file, progress).await?;
        file.sync_all().await?;
        drop(file);

        info!("Downloaded {} ({} bytes)", path.display(), written);
        Ok(path)
    }
}
