// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that drives chroma. Every
//! piece of operator-curated data lives here: which distributions we pull
//! patches from, which of their patches are actually used, and which browser
//! extensions get bundled with the package.
//!
//! # General Layout
//!
//! ```toml
//! version = 1
//! install_dir = "/usr/share/chromium/extensions"
//!
//! [distro.debian]
//! manifest_url = "https://example.org/debian/patches/series"
//!
//! [distro.debian.patches]
//! "00-fix-build.patch" = true
//! "01-disable-thing.patch" = false
//!
//! [extensions]
//! ublock-origin = "cjpalhdlnbpafiamejdnhcphjbkeiagm"
//! ```
//!
//! The configuration is read once per invocation and never mutated. File I/O
//! for discovery is kept in [`Config::discover`], everything else is plain
//! parsing and lookup.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Schema version this build understands.
pub const CONFIG_VERSION: u32 = 1;

/// Name of configuration file looked up in the package root.
pub const CONFIG_FILE_NAME: &str = "chroma.toml";

const BUILTIN_CONFIG: &str = include_str!("../chroma.toml");

/// Chroma configuration.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Schema version of configuration file.
    pub version: u32,

    /// Directory the packaged extensions get installed to on the target
    /// system. Written into each extension preference file.
    pub install_dir: PathBuf,

    /// Known patch distributions by name.
    #[serde(default, rename = "distro")]
    pub distros: BTreeMap<String, Distro>,

    /// Extension registry of human name to Web Store ID.
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl Config {
    /// Configuration compiled into the binary.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if the embedded configuration is invalid.
    pub fn builtin() -> Result<Self> {
        BUILTIN_CONFIG.parse()
    }

    /// Locate and load configuration.
    ///
    /// An explicit path must exist. Otherwise the package root, then the
    /// user's configuration directory are tried before falling back to the
    /// built-in configuration.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if a configuration file cannot be read.
    /// - Return [`ConfigError`] if its contents are invalid.
    #[instrument(skip(explicit, root, user), level = "debug")]
    pub fn discover(
        explicit: Option<&Path>,
        root: impl AsRef<Path>,
        user: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let candidates = [Some(root.as_ref().join(CONFIG_FILE_NAME)), user];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Self::load(path);
            }
        }

        debug!("no configuration file found, using built-in configuration");
        Self::builtin()
    }

    /// Load configuration from target file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError`] if its contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load configuration {:?}", path.display());
        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Look up a distribution by name.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownDistro`] if no such distribution exists.
    pub fn distro(&self, name: &str) -> Result<&Distro> {
        self.distros
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDistro(name.into()))
    }

    /// Classification table for target distribution.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownDistro`] if no such distribution exists.
    pub fn classification<'a>(&'a self, name: &'a str) -> Result<ClassificationTable<'a>> {
        let distro = self.distro(name)?;
        Ok(ClassificationTable {
            distro: name,
            patches: &distro.patches,
        })
    }

    /// Select extensions from the registry.
    ///
    /// An empty selection means every registered extension.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownExtension`] if a name is not registered.
    pub fn select_extensions<'a>(
        &'a self,
        names: &'a [String],
    ) -> Result<Vec<(&'a str, &'a str)>> {
        if names.is_empty() {
            return Ok(self
                .extensions
                .iter()
                .map(|(name, id)| (name.as_str(), id.as_str()))
                .collect());
        }

        names
            .iter()
            .map(|name| {
                self.extensions
                    .get(name)
                    .map(|id| (name.as_str(), id.as_str()))
                    .ok_or_else(|| ConfigError::UnknownExtension(name.clone()))
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }

        for (name, id) in &self.extensions {
            if !is_extension_id(id) {
                return Err(ConfigError::InvalidExtensionId {
                    name: name.clone(),
                    id: id.clone(),
                });
            }
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::from_str(data).map_err(ConfigError::Deserialize)?;
        config.validate()?;

        // INVARIANT: Perform shell expansion on install directory.
        config.install_dir = PathBuf::from(
            shellexpand::full(config.install_dir.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Patch distribution.
///
/// Binds one upstream patch series to the classification of its patches.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Distro {
    /// URL of the patch series file listing patches in apply order.
    pub manifest_url: String,

    /// Patch name to "used" flag.
    #[serde(default)]
    pub patches: BTreeMap<String, bool>,
}

/// Read-only view of one distribution's patch classification.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationTable<'a> {
    distro: &'a str,
    patches: &'a BTreeMap<String, bool>,
}

impl<'a> ClassificationTable<'a> {
    /// Whether target patch belongs in the active directory.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnclassifiedPatch`] if the table has no entry
    ///   for the patch.
    pub fn is_used(&self, patch: &str) -> Result<bool> {
        self.patches
            .get(patch)
            .copied()
            .ok_or_else(|| ConfigError::UnclassifiedPatch {
                distro: self.distro.into(),
                patch: patch.into(),
            })
    }

    /// Iterate over every classified patch in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, bool)> + 'a {
        self.patches.iter().map(|(name, used)| (name.as_str(), *used))
    }

    /// Name of distribution this table belongs to.
    pub fn distro(&self) -> &'a str {
        self.distro
    }
}

fn is_extension_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|byte| (b'a'..=b'p').contains(&byte))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Configuration was written for another schema version.
    #[error("unsupported configuration version {0}, expected {CONFIG_VERSION}")]
    UnsupportedVersion(u32),

    /// Extension ID is not a valid Web Store ID.
    #[error("extension {name:?} has invalid Web Store ID {id:?}")]
    InvalidExtensionId { name: String, id: String },

    /// Distribution is not configured.
    #[error("unknown distribution {0:?}")]
    UnknownDistro(String),

    /// Extension is not registered.
    #[error("unknown extension {0:?}")]
    UnknownExtension(String),

    /// Manifest lists a patch the classification table does not know about.
    #[error("patch {patch:?} of distribution {distro:?} is not classified")]
    UnclassifiedPatch { distro: String, patch: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
