// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote file retrieval.
//!
//! Everything chroma pulls from the network goes through the [`Fetch`] trait.
//! Requests are blocking and run one at a time. There is no retry: a failed
//! request aborts the current command.

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::{
    fs::{create_dir_all, remove_file, rename, write, File},
    io::{copy, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Layer of indirection for remote file retrieval.
pub trait Fetch {
    /// Fetch full body of target URL.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Fetch target URL straight into a file.
    ///
    /// Parent directories of the destination are created as needed.
    fn download(&self, url: &str, dst: &Path) -> Result<()> {
        let body = self.fetch(url)?;
        ensure_parent(dst)?;
        write(dst, body).map_err(|err| FetchError::Write {
            source: err,
            path: dst.to_path_buf(),
        })
    }
}

/// Remote file retrieval over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    progress: bool,
}

impl HttpFetcher {
    /// Construct new HTTP fetcher.
    ///
    /// Download progress is drawn only if `progress` is set.
    ///
    /// # Errors
    ///
    /// - Return [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new(progress: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("chroma/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, progress })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::Request {
                source: err,
                url: url.into(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.into(),
            });
        }

        Ok(response)
    }

    fn progress_bar(&self, len: Option<u64>, url: &str) -> Result<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }

        let bar = match len {
            Some(len) => ProgressBar::new(len).with_style(
                ProgressStyle::with_template(
                    "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}] {bytes}/{total_bytes}",
                )?
                .progress_chars("-Cco."),
            ),
            None => ProgressBar::new_spinner()
                .with_style(ProgressStyle::with_template("{spinner} {msg} {bytes}")?),
        };
        bar.set_message(short_url(url).to_string());

        Ok(bar)
    }
}

impl Fetch for HttpFetcher {
    #[instrument(skip(self), level = "debug")]
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let body = self.get(url)?.bytes().map_err(|err| FetchError::Request {
            source: err,
            url: url.into(),
        })?;
        debug!("fetched {} bytes", body.len());

        Ok(body.to_vec())
    }

    /// Stream target URL into a file.
    ///
    /// The body lands in a `.part` sibling first, and is only moved into place
    /// once complete. A failed download leaves nothing behind at `dst`.
    #[instrument(skip(self, dst), level = "debug")]
    fn download(&self, url: &str, dst: &Path) -> Result<()> {
        ensure_parent(dst)?;
        let part = part_path(dst);

        let result = self.stream_to(url, &part);
        if result.is_err() {
            let _ = remove_file(&part);
            return result;
        }

        rename(&part, dst).map_err(|err| FetchError::Write {
            source: err,
            path: dst.to_path_buf(),
        })
    }
}

impl HttpFetcher {
    fn stream_to(&self, url: &str, path: &Path) -> Result<()> {
        let response = self.get(url)?;
        let bar = self.progress_bar(response.content_length(), url)?;

        let write_err = |err| FetchError::Write {
            source: err,
            path: path.to_path_buf(),
        };
        let mut file = BufWriter::new(File::create(path).map_err(write_err)?);
        let written = copy(&mut bar.wrap_read(response), &mut file).map_err(write_err)?;
        file.flush().map_err(write_err)?;
        bar.finish_and_clear();
        debug!("downloaded {written} bytes to {:?}", path.display());

        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|err| FetchError::Write {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".into());
    path.with_file_name(format!("{name}.part"))
}

/// Shorten URL to its last three path components for display.
pub fn short_url(url: &str) -> &str {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    match trimmed.rmatch_indices('/').nth(2) {
        Some((idx, _)) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Remote retrieval error types.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP client could not be set up.
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),

    /// Request could not be completed.
    #[error("failed to fetch {url}")]
    Request {
        #[source]
        source: reqwest::Error,
        url: String,
    },

    /// Server answered with a non-success status.
    #[error("failed to fetch {url}: server responded with status {status}")]
    Status { status: u16, url: String },

    /// Fetched content could not be written.
    #[error("failed to write download to {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = FetchError> = std::result::Result<T, E>;
