// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the chromium package lives, and which Chromium version it
//! builds. All of this is gathered once at the start of a command into a
//! [`Workspace`] that gets passed along explicitly afterwards.
//!
//! # Package Layout
//!
//! ```text
//! <root>/PKGBUILD
//! <root>/patches/<distro>/NN-name.patch
//! <root>/patches/<distro>/not-used/NN-name.patch
//! <root>/src/extensions/<name>.crx
//! <root>/src/extensions/<id>.json
//! ```

use crate::config::CONFIG_FILE_NAME;

use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Name of directory holding patch sets in the package root.
pub const PATCHES_DIR: &str = "patches";

/// Name of PKGBUILD file in the package root.
pub const PKGBUILD: &str = "PKGBUILD";

/// Prepared chromium package workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    pkgbuild: PathBuf,
    chromium_version: String,
}

impl Workspace {
    /// Prepare workspace for command execution.
    ///
    /// If a PKGBUILD path is given, then its parent directory becomes the
    /// package root. Otherwise the PKGBUILD is expected at the top-level of
    /// the given root. The Chromium version is read from the `pkgver=` line.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::MissingPkgbuild`] if PKGBUILD does not exist.
    /// - Return [`WorkspaceError::ReadPkgbuild`] if PKGBUILD cannot be read.
    /// - Return [`WorkspaceError::MissingVersion`] if PKGBUILD has no usable
    ///   `pkgver=` line.
    #[instrument(skip(root, pkgbuild), level = "debug")]
    pub fn prepare(root: impl Into<PathBuf>, pkgbuild: Option<PathBuf>) -> Result<Self> {
        let (root, pkgbuild) = match pkgbuild {
            Some(pkgbuild) => {
                let root = pkgbuild
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                (root, pkgbuild)
            }
            None => {
                let root = root.into();
                let pkgbuild = root.join(PKGBUILD);
                (root, pkgbuild)
            }
        };

        if !pkgbuild.is_file() {
            return Err(WorkspaceError::MissingPkgbuild { pkgbuild });
        }

        let content = read_to_string(&pkgbuild).map_err(|err| WorkspaceError::ReadPkgbuild {
            source: err,
            pkgbuild: pkgbuild.clone(),
        })?;
        let chromium_version = parse_pkgver(&content)
            .ok_or_else(|| WorkspaceError::MissingVersion {
                pkgbuild: pkgbuild.clone(),
            })?
            .to_string();
        debug!("chromium version {chromium_version} from {:?}", pkgbuild.display());

        Ok(Self {
            root,
            pkgbuild,
            chromium_version,
        })
    }

    /// Package root directory.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Path to PKGBUILD.
    pub fn pkgbuild(&self) -> &Path {
        self.pkgbuild.as_path()
    }

    /// Chromium version the package builds.
    pub fn chromium_version(&self) -> &str {
        self.chromium_version.as_str()
    }

    /// Directory holding every distribution's patch set.
    pub fn patches_dir(&self) -> PathBuf {
        self.root.join(PATCHES_DIR)
    }

    /// Directory holding downloaded extensions and their preference files.
    pub fn extensions_dir(&self) -> PathBuf {
        self.root.join("src").join("extensions")
    }
}

/// Extract version from PKGBUILD content.
///
/// Uses the first line that starts with `pkgver=`. Surrounding quotes are
/// dropped.
pub fn parse_pkgver(content: &str) -> Option<&str> {
    content
        .lines()
        .find(|line| line.starts_with("pkgver="))
        .and_then(|line| line.trim().rsplit('=').next())
        .map(|version| version.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|version| !version.is_empty())
}

/// Determine default absolute path to user's chroma configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/chroma/chroma.toml`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf, NoWayHome> {
    dirs::config_dir()
        .map(|path| path.join("chroma").join(CONFIG_FILE_NAME))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Workspace preparation error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// PKGBUILD could not be found.
    #[error("chromium PKGBUILD could not be found at {:?}", pkgbuild.display())]
    MissingPkgbuild { pkgbuild: PathBuf },

    /// PKGBUILD could not be read.
    #[error("failed to read chromium PKGBUILD at {:?}", pkgbuild.display())]
    ReadPkgbuild {
        #[source]
        source: std::io::Error,
        pkgbuild: PathBuf,
    },

    /// PKGBUILD does not declare a version.
    #[error("chromium PKGBUILD at {:?} has no pkgver line", pkgbuild.display())]
    MissingVersion { pkgbuild: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, write};

    #[test_case("pkgver=120.0.6099.71\n", Some("120.0.6099.71"); "plain")]
    #[test_case("pkgver='120.0.6099.71'\n", Some("120.0.6099.71"); "single quoted")]
    #[test_case("pkgver=\"120.0.6099.71\"  \n", Some("120.0.6099.71"); "double quoted")]
    #[test_case("pkgname=chromium\n", None; "missing")]
    #[test_case("pkgver=\n", None; "empty")]
    #[test_case("  pkgver=1.0\n", None; "indented is not a declaration")]
    #[test]
    fn pkgver_parsing(content: &str, expect: Option<&str>) {
        assert_eq!(parse_pkgver(content), expect);
    }

    #[test]
    fn pkgver_first_declaration_wins() {
        let content = indoc! {r#"
            pkgname=chromium
            pkgver=121.0.6167.85
            pkgrel=1
            pkgver=1.0.0
        "#};
        assert_eq!(parse_pkgver(content), Some("121.0.6167.85"));
    }

    #[sealed_test]
    fn prepare_from_root() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        write(root.join(PKGBUILD), "pkgname=chromium\npkgver=121.0.6167.85\n")?;

        let workspace = Workspace::prepare(&root, None)?;
        assert_eq!(workspace.root(), root.as_path());
        assert_eq!(workspace.pkgbuild(), root.join(PKGBUILD).as_path());
        assert_eq!(workspace.chromium_version(), "121.0.6167.85");
        assert_eq!(workspace.patches_dir(), root.join("patches"));
        assert_eq!(workspace.extensions_dir(), root.join("src/extensions"));

        Ok(())
    }

    #[sealed_test]
    fn prepare_from_pkgbuild_path() -> anyhow::Result<()> {
        let root = std::env::current_dir()?.join("aur/chromium");
        create_dir_all(&root)?;
        write(root.join(PKGBUILD), "pkgver=121.0.6167.85\n")?;

        let workspace = Workspace::prepare("/ignored", Some(root.join(PKGBUILD)))?;
        assert_eq!(workspace.root(), root.as_path());
        assert_eq!(workspace.patches_dir(), root.join("patches"));

        Ok(())
    }

    #[sealed_test]
    fn prepare_rejects_missing_pkgbuild() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let result = Workspace::prepare(&root, None);
        assert!(matches!(result, Err(WorkspaceError::MissingPkgbuild { .. })));

        Ok(())
    }

    #[sealed_test]
    fn prepare_rejects_missing_version() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        write(root.join(PKGBUILD), "pkgname=chromium\n")?;
        let result = Workspace::prepare(&root, None);
        assert!(matches!(result, Err(WorkspaceError::MissingVersion { .. })));

        Ok(())
    }
}
