// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Browser extension bundling.
//!
//! Chromium can load extensions that live outside the Web Store through
//! __external extension preference files__. For every bundled extension the
//! package ships two files:
//!
//! - `src/extensions/<name>.crx`: the extension package itself, fetched from
//!   the Chrome Web Store update endpoint.
//! - `src/extensions/<id>.json`: the preference file pointing Chromium at the
//!   installed package and pinning its version.
//!
//! Both files are only produced when missing. Fetching an extension whose
//! package and preference file already exist makes no network requests.
//!
//! # See Also
//!
//! - [Alternative extension distribution options](https://developer.chrome.com/docs/extensions/how-to/distribute/install-extensions)

pub mod crx;

use crate::{
    extension::crx::{CrxError, Unpack},
    fetch::{Fetch, FetchError},
};

use serde::{Deserialize, Serialize};
use std::{
    fs::{create_dir_all, read_to_string, remove_dir_all, write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use url::Url;

/// Chrome Web Store update endpoint serving CRX packages.
pub const WEBSTORE_URL: &str = "https://clients2.google.com/service/update2/crx";

/// Name of scratch directory used while unpacking packages.
pub const SCRATCH_DIR: &str = "_tmp";

/// Build Web Store download URL of target extension.
///
/// # Errors
///
/// - Return [`ExtensionError::Url`] if the URL cannot be formed.
pub fn webstore_url(id: &str, chromium_version: &str) -> Result<Url> {
    let x = format!("id={id}&installsource=ondemand&uc");
    Url::parse_with_params(
        WEBSTORE_URL,
        &[
            ("response", "redirect"),
            ("os", "linux"),
            ("prodversion", chromium_version),
            ("x", x.as_str()),
        ],
    )
    .map_err(ExtensionError::Url)
}

/// External extension preference file layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExternalExtension {
    /// Path to installed CRX package on the target system.
    pub external_crx: String,

    /// Version of the packaged extension.
    pub external_version: String,
}

/// What fetching an extension would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionPlan {
    /// Package must be downloaded.
    pub download: bool,

    /// Preference file must be generated.
    pub preferences: bool,
}

/// Fetch extensions and generate their preference files.
#[derive(Debug)]
pub struct ExtensionFetcher<'a, F, U>
where
    F: Fetch,
    U: Unpack,
{
    extensions_dir: PathBuf,
    install_dir: PathBuf,
    chromium_version: &'a str,
    fetcher: &'a F,
    unpacker: U,
}

impl<'a, F, U> ExtensionFetcher<'a, F, U>
where
    F: Fetch,
    U: Unpack,
{
    /// Construct new extension fetcher.
    ///
    /// Packages and preference files go into `extensions_dir`. Preference
    /// files point at `install_dir`, the location packages end up in on the
    /// target system.
    pub fn new(
        extensions_dir: impl Into<PathBuf>,
        install_dir: impl Into<PathBuf>,
        chromium_version: &'a str,
        fetcher: &'a F,
        unpacker: U,
    ) -> Self {
        Self {
            extensions_dir: extensions_dir.into(),
            install_dir: install_dir.into(),
            chromium_version,
            fetcher,
            unpacker,
        }
    }

    /// Ready extensions directory.
    ///
    /// Wipes it first if `clean` is set.
    ///
    /// # Errors
    ///
    /// - Return [`ExtensionError::Clean`] if directory cannot be removed.
    /// - Return [`ExtensionError::Write`] if directory cannot be created.
    pub fn prepare(&self, clean: bool) -> Result<()> {
        if clean && self.extensions_dir.exists() {
            info!(
                "removing all files in local extensions dir {:?}",
                self.extensions_dir.display()
            );
            remove_dir_all(&self.extensions_dir).map_err(|err| ExtensionError::Clean {
                source: err,
                path: self.extensions_dir.clone(),
            })?;
        }

        create_dir_all(&self.extensions_dir).map_err(|err| ExtensionError::Write {
            source: err,
            path: self.extensions_dir.clone(),
        })
    }

    /// Path of downloaded package.
    pub fn package_path(&self, name: &str) -> PathBuf {
        self.extensions_dir.join(format!("{name}.crx"))
    }

    /// Path of generated preference file.
    pub fn preferences_path(&self, id: &str) -> PathBuf {
        self.extensions_dir.join(format!("{id}.json"))
    }

    /// Determine what fetching target extension would do.
    pub fn plan(&self, name: &str, id: &str) -> ExtensionPlan {
        ExtensionPlan {
            download: !self.package_path(name).exists(),
            preferences: !self.preferences_path(id).exists(),
        }
    }

    /// Determine what fetching would do after an optional wipe.
    ///
    /// With `clean` set, existing files are ignored since the wipe would
    /// remove them.
    pub fn preview(&self, name: &str, id: &str, clean: bool) -> ExtensionPlan {
        if clean {
            return ExtensionPlan {
                download: true,
                preferences: true,
            };
        }

        self.plan(name, id)
    }

    /// Fetch extension and generate its preference file.
    ///
    /// Each artifact is produced only if missing.
    ///
    /// # Errors
    ///
    /// - Return [`ExtensionError::Fetch`] if package cannot be downloaded.
    /// - Return [`ExtensionError::Unpack`] if package cannot be unpacked.
    /// - Return [`ExtensionError::Manifest`] if extension manifest is invalid.
    /// - Return [`ExtensionError::MissingVersion`] if extension manifest has
    ///   no version.
    /// - Return [`ExtensionError::Write`] if preference file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn fetch(&self, name: &str, id: &str) -> Result<ExtensionPlan> {
        let plan = self.plan(name, id);
        let package = self.package_path(name);

        if plan.download {
            let url = webstore_url(id, self.chromium_version)?;
            info!("downloading extension {name}:{id} => {}", package.display());
            self.fetcher.download(url.as_str(), &package)?;
        }

        if !plan.preferences {
            debug!("extension {name}:{id} preferences already exist");
            return Ok(plan);
        }

        info!("unpacking extension {name}:{id}");
        let version = self.unpacked_version(&package)?;

        let preferences = ExternalExtension {
            external_crx: self
                .install_dir
                .join(format!("{name}.crx"))
                .to_string_lossy()
                .into_owned(),
            external_version: version,
        };
        let path = self.preferences_path(id);
        info!(
            "generating extension preferences {} for version {}",
            path.display(),
            preferences.external_version
        );
        let mut content = serde_json::to_string_pretty(&preferences)?;
        content.push('\n');
        write(&path, content).map_err(|err| ExtensionError::Write { source: err, path })?;

        Ok(plan)
    }

    fn unpacked_version(&self, package: &Path) -> Result<String> {
        let scratch = self.extensions_dir.join(SCRATCH_DIR);
        self.remove_scratch(&scratch)?;

        let manifest = scratch.join("manifest.json");
        let version = self
            .unpacker
            .unpack(package, &scratch)
            .map_err(ExtensionError::from)
            .and_then(|_| {
                read_to_string(&manifest).map_err(|err| ExtensionError::Read {
                    source: err,
                    path: manifest.clone(),
                })
            })
            .and_then(|content| manifest_version(&content));

        // INVARIANT: Scratch directory never outlives a fetch.
        self.remove_scratch(&scratch)?;

        version
    }

    fn remove_scratch(&self, scratch: &Path) -> Result<()> {
        if scratch.exists() {
            remove_dir_all(scratch).map_err(|err| ExtensionError::Clean {
                source: err,
                path: scratch.to_path_buf(),
            })?;
        }

        Ok(())
    }
}

/// Extract declared version from extension manifest content.
///
/// # Errors
///
/// - Return [`ExtensionError::Manifest`] if content is not valid JSON.
/// - Return [`ExtensionError::MissingVersion`] if version is absent, empty,
///   or not a string.
pub fn manifest_version(content: &str) -> Result<String> {
    // Some packagers prefix the manifest with a byte order mark.
    let content = content.trim_start_matches('\u{feff}');
    let manifest: serde_json::Value = serde_json::from_str(content)?;

    manifest
        .get("version")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .map(str::to_owned)
        .ok_or(ExtensionError::MissingVersion)
}

/// Extension bundling error types.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// Web Store URL cannot be formed.
    #[error("invalid web store url")]
    Url(#[source] url::ParseError),

    /// Package cannot be downloaded.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Package cannot be unpacked.
    #[error(transparent)]
    Unpack(#[from] CrxError),

    /// Extension manifest cannot be read.
    #[error("failed to read extension manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Extension manifest is not valid JSON.
    #[error("failed to parse extension manifest")]
    Manifest(#[from] serde_json::Error),

    /// Extension manifest does not declare a version.
    #[error("extension manifest does not declare a version")]
    MissingVersion,

    /// Directory cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Clean {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File or directory cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ExtensionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn build_webstore_url() -> anyhow::Result<()> {
        let url = webstore_url("cjpalhdlnbpafiamejdnhcphjbkeiagm", "121.0.6167.85")?;
        assert_eq!(
            url.as_str().split('?').next(),
            Some("https://clients2.google.com/service/update2/crx")
        );

        let query = url.query_pairs().into_owned().collect::<HashMap<_, _>>();
        let expect = HashMap::from([
            ("response".to_string(), "redirect".to_string()),
            ("os".to_string(), "linux".to_string()),
            ("prodversion".to_string(), "121.0.6167.85".to_string()),
            (
                "x".to_string(),
                "id=cjpalhdlnbpafiamejdnhcphjbkeiagm&installsource=ondemand&uc".to_string(),
            ),
        ]);
        assert_eq!(query, expect);

        Ok(())
    }

    #[test]
    fn read_manifest_version() -> anyhow::Result<()> {
        let content = indoc! {r#"
            {
                "manifest_version": 3,
                "name": "uBlock Origin",
                "version": "1.55.0"
            }
        "#};
        assert_eq!(manifest_version(content)?, "1.55.0");
        assert_eq!(manifest_version("\u{feff}{\"version\": \"2.0\"}")?, "2.0");

        Ok(())
    }

    #[test]
    fn reject_manifest_without_version() {
        assert!(matches!(
            manifest_version(r#"{"name": "x"}"#),
            Err(ExtensionError::MissingVersion)
        ));
        assert!(matches!(
            manifest_version(r#"{"version": ""}"#),
            Err(ExtensionError::MissingVersion)
        ));
        assert!(matches!(
            manifest_version(r#"{"version": 3}"#),
            Err(ExtensionError::MissingVersion)
        ));
        assert!(matches!(
            manifest_version("not json"),
            Err(ExtensionError::Manifest(_))
        ));
    }

    #[test]
    fn preference_file_layout() -> anyhow::Result<()> {
        let preferences = ExternalExtension {
            external_crx: "/usr/share/chromium/extensions/ublock-origin.crx".into(),
            external_version: "1.55.0".into(),
        };
        let expect = indoc! {r#"
            {
              "external_crx": "/usr/share/chromium/extensions/ublock-origin.crx",
              "external_version": "1.55.0"
            }"#};
        assert_eq!(serde_json::to_string_pretty(&preferences)?, expect);

        Ok(())
    }
}
