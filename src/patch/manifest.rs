// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Patch series manifest.
//!
//! Each distribution publishes a __patch series__ file: a newline-delimited
//! list of patch paths relative to the series file itself, in apply order.
//! The position of a patch in that list becomes the numeric prefix of its
//! local file name, so downstream apply order is preserved by a plain sort.

use crate::fetch::{Fetch, FetchError};

use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};
use url::Url;

/// Ordered list of patch entries for one distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    url: Url,
    entries: Vec<String>,
}

impl Manifest {
    /// Load manifest, fetching it into the patch set directory if needed.
    ///
    /// The series file is cached verbatim under its remote file name. A
    /// cached copy is always preferred over fetching again.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Url`] if the manifest URL is invalid.
    /// - Return [`ManifestError::Fetch`] if the series file cannot be fetched.
    /// - Return [`ManifestError::Read`] if the cached copy cannot be read.
    #[instrument(skip(patch_set_dir, fetcher), level = "debug")]
    pub fn load(
        patch_set_dir: impl AsRef<Path>,
        manifest_url: &str,
        fetcher: &impl Fetch,
    ) -> Result<Self> {
        let url = parse_url(manifest_url)?;
        let cached = patch_set_dir.as_ref().join(cache_name(&url));

        if !cached.exists() {
            info!("downloading patch order file {manifest_url}");
            fetcher.download(url.as_str(), &cached)?;
        }

        let content = read_to_string(&cached).map_err(|err| ManifestError::Read {
            source: err,
            path: cached.clone(),
        })?;

        Ok(Self::parse(url, &content))
    }

    /// Load manifest without caching it.
    ///
    /// Uses the cached copy if one exists, but never writes one.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Url`] if the manifest URL is invalid.
    /// - Return [`ManifestError::Fetch`] if the series file cannot be fetched.
    /// - Return [`ManifestError::Read`] if the cached copy cannot be read.
    pub fn peek(
        patch_set_dir: impl AsRef<Path>,
        manifest_url: &str,
        fetcher: &impl Fetch,
    ) -> Result<Self> {
        let url = parse_url(manifest_url)?;
        let cached = patch_set_dir.as_ref().join(cache_name(&url));
        if cached.exists() {
            return Self::load(patch_set_dir, manifest_url, fetcher);
        }

        Self::fetch(manifest_url, fetcher)
    }

    /// Fetch manifest straight from its remote, ignoring any cached copy.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Url`] if the manifest URL is invalid.
    /// - Return [`ManifestError::Fetch`] if the series file cannot be fetched.
    pub fn fetch(manifest_url: &str, fetcher: &impl Fetch) -> Result<Self> {
        let url = parse_url(manifest_url)?;
        let body = fetcher.fetch(url.as_str())?;
        Ok(Self::parse(url, &String::from_utf8_lossy(&body)))
    }

    /// Parse series content published at target URL.
    ///
    /// Blank lines are dropped, everything else is kept in order.
    pub fn parse(url: Url, content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        Self { url, entries }
    }

    /// Patch entries in apply order.
    pub fn entries(&self) -> &[String] {
        self.entries.as_slice()
    }

    /// Local name of patch entry at target position.
    ///
    /// Zero-padded position, a dash, then the entry's base name.
    pub fn patch_name(index: usize, entry: &str) -> String {
        let base = entry.rsplit('/').next().unwrap_or(entry);
        format!("{index:02}-{base}")
    }

    /// Remote location of patch entry.
    ///
    /// Entries are relative to the directory holding the series file.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Url`] if the entry does not form a valid URL.
    pub fn patch_url(&self, entry: &str) -> Result<Url> {
        self.url.join(entry).map_err(|err| ManifestError::Url {
            source: err,
            url: entry.into(),
        })
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|err| ManifestError::Url {
        source: err,
        url: url.into(),
    })
}

fn cache_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or("series")
        .to_string()
}

/// Patch series manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// URL cannot be parsed or joined.
    #[error("invalid patch url {url:?}")]
    Url {
        #[source]
        source: url::ParseError,
        url: String,
    },

    /// Series file cannot be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Cached series file cannot be read.
    #[error("failed to read patch order file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;
