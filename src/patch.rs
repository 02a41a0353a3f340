// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Patch set management.
//!
//! A __patch set__ is the local copy of one distribution's patch series. Each
//! patch in it rests in exactly one of two places:
//!
//! - `patches/<distro>/NN-name.patch` if the patch is __used__, or
//! - `patches/<distro>/not-used/NN-name.patch` if it is not.
//!
//! Where a patch belongs is decided by the distribution's classification
//! table in the configuration file, never by looking at the patch itself.
//! Chroma only ever moves a patch between the two places, or fetches it into
//! the right place when it is missing from both.
//!
//! # Relocation
//!
//! For each patch, exactly one of the following happens:
//!
//! | used  | active exists | inactive exists | action                  |
//! |-------|---------------|-----------------|-------------------------|
//! | false | yes           | any             | move active to inactive |
//! | true  | any           | yes             | move inactive to active |
//! | any   | no            | no              | fetch into place        |
//! | true  | yes           | no              | nothing                 |
//! | false | no            | yes             | nothing                 |
//!
//! Rows are evaluated top to bottom. Running relocation twice in a row with
//! an unchanged table never moves anything the second time.

pub mod manifest;

use crate::{
    config::{ClassificationTable, Config, ConfigError},
    fetch::{Fetch, FetchError},
    patch::manifest::{Manifest, ManifestError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{create_dir_all, remove_dir_all, rename},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use url::Url;

/// Name of directory holding unused patches inside a patch set.
pub const NOT_USED_DIR: &str = "not-used";

/// What relocation does with a single patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Move patch from active to inactive directory.
    Disable,

    /// Move patch from inactive to active directory.
    Enable,

    /// Fetch patch into the directory matching its classification.
    Download { used: bool },

    /// Patch already rests in the right place.
    Keep,
}

impl Action {
    /// Decide action from classification and current file system state.
    pub fn decide(used: bool, active_exists: bool, inactive_exists: bool) -> Self {
        match (used, active_exists, inactive_exists) {
            (false, true, _) => Self::Disable,
            (true, _, true) => Self::Enable,
            (used, false, false) => Self::Download { used },
            _ => Self::Keep,
        }
    }

    /// Whether action moves an existing file.
    pub fn is_move(&self) -> bool {
        matches!(self, Self::Disable | Self::Enable)
    }
}

/// Planned relocation of one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// Local patch name, e.g., `02-libcxx.patch`.
    pub name: String,

    /// Remote location of the patch, if known.
    pub url: Option<Url>,

    /// Action to take.
    pub action: Action,
}

impl Display for Relocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.action {
            Action::Disable => write!(fmt, "disable {}", self.name),
            Action::Enable => write!(fmt, "enable {}", self.name),
            Action::Download { used: true } => write!(fmt, "download {}", self.name),
            Action::Download { used: false } => {
                write!(fmt, "download {} into {NOT_USED_DIR}", self.name)
            }
            Action::Keep => write!(fmt, "keep {}", self.name),
        }
    }
}

/// Local patch set of one distribution.
#[derive(Debug, Clone)]
pub struct PatchSet<'a> {
    manifest_url: &'a str,
    table: ClassificationTable<'a>,
    active_dir: PathBuf,
    inactive_dir: PathBuf,
}

impl<'a> PatchSet<'a> {
    /// Construct new patch set for target distribution.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Config`] if distribution is not configured.
    pub fn new(patches_dir: impl AsRef<Path>, config: &'a Config, distro: &'a str) -> Result<Self> {
        let manifest_url = config.distro(distro)?.manifest_url.as_str();
        let table = config.classification(distro)?;
        let active_dir = patches_dir.as_ref().join(distro);
        let inactive_dir = active_dir.join(NOT_USED_DIR);

        Ok(Self {
            manifest_url,
            table,
            active_dir,
            inactive_dir,
        })
    }

    /// Name of distribution.
    pub fn distro(&self) -> &'a str {
        self.table.distro()
    }

    /// Directory of used patches.
    pub fn active_dir(&self) -> &Path {
        self.active_dir.as_path()
    }

    /// Directory of unused patches.
    pub fn inactive_dir(&self) -> &Path {
        self.inactive_dir.as_path()
    }

    /// Ready patch set directories.
    ///
    /// Wipes the entire patch set first if `clean` is set.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Clean`] if patch set cannot be removed.
    /// - Return [`PatchError::CreateDir`] if directories cannot be created.
    pub fn prepare(&self, clean: bool) -> Result<()> {
        if clean && self.active_dir.exists() {
            info!("removing all files in local patch set {:?}", self.active_dir.display());
            remove_dir_all(&self.active_dir).map_err(|err| PatchError::Clean {
                source: err,
                path: self.active_dir.clone(),
            })?;
        }

        create_dir_all(&self.inactive_dir).map_err(|err| PatchError::CreateDir {
            source: err,
            path: self.inactive_dir.clone(),
        })
    }

    /// Load series manifest of distribution.
    ///
    /// With `dry_run` set, a missing series file is fetched but not cached.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Manifest`] if manifest cannot be loaded.
    pub fn manifest(&self, fetcher: &impl Fetch, dry_run: bool) -> Result<Manifest> {
        if dry_run {
            return Ok(Manifest::peek(&self.active_dir, self.manifest_url, fetcher)?);
        }

        Ok(Manifest::load(&self.active_dir, self.manifest_url, fetcher)?)
    }

    /// Plan relocation of manifest entry at target position.
    ///
    /// Looks at the file system, but never touches it.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Config`] if patch is not classified.
    /// - Return [`PatchError::Manifest`] if patch URL is invalid.
    pub fn plan(&self, manifest: &Manifest, index: usize, entry: &str) -> Result<Relocation> {
        let name = Manifest::patch_name(index, entry);
        let used = self.table.is_used(&name)?;
        let action = Action::decide(
            used,
            self.active_path(&name).exists(),
            self.inactive_path(&name).exists(),
        );

        Ok(Relocation {
            name,
            url: Some(manifest.patch_url(entry)?),
            action,
        })
    }

    /// Carry out planned relocation.
    ///
    /// Performs at most one move, or one download.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Move`] if patch cannot be moved.
    /// - Return [`PatchError::Fetch`] if patch cannot be downloaded.
    /// - Return [`PatchError::MissingSource`] if a download has no URL.
    pub fn apply(&self, relocation: &Relocation, fetcher: &impl Fetch) -> Result<()> {
        let name = relocation.name.as_str();
        match relocation.action {
            Action::Disable | Action::Enable => self.apply_move(relocation),
            Action::Download { used } => {
                let url = relocation
                    .url
                    .as_ref()
                    .ok_or_else(|| PatchError::MissingSource(name.into()))?;
                let dst = if used {
                    self.active_path(name)
                } else {
                    self.inactive_path(name)
                };
                info!("downloading patch {url} => {}", dst.display());
                Ok(fetcher.download(url.as_str(), &dst)?)
            }
            Action::Keep => {
                debug!("patch {name} already in place");
                Ok(())
            }
        }
    }

    /// Relocate manifest entry at target position.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError`] if planning or applying fails.
    pub fn relocate(
        &self,
        manifest: &Manifest,
        index: usize,
        entry: &str,
        fetcher: &impl Fetch,
    ) -> Result<Action> {
        let relocation = self.plan(manifest, index, entry)?;
        self.apply(&relocation, fetcher)?;
        Ok(relocation.action)
    }

    /// Bring every manifest entry into its classified place.
    ///
    /// Entries are handled in manifest order, and the first failure aborts
    /// the rest. With `dry_run` set, relocations are only planned.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError`] if any relocation fails.
    #[instrument(skip(self, manifest, fetcher), fields(distro = self.distro()), level = "debug")]
    pub fn sync(
        &self,
        manifest: &Manifest,
        fetcher: &impl Fetch,
        dry_run: bool,
    ) -> Result<Vec<Relocation>> {
        let mut relocations = Vec::with_capacity(manifest.entries().len());
        for (index, entry) in manifest.entries().iter().enumerate() {
            let relocation = self.plan(manifest, index, entry)?;
            if dry_run {
                info!("would {relocation}");
            } else {
                self.apply(&relocation, fetcher)?;
            }
            relocations.push(relocation);
        }

        Ok(relocations)
    }

    /// Plan a sync as if the patch set had just been wiped.
    ///
    /// The series file is fetched fresh and every entry is planned as a
    /// download into its classified place. Nothing on disk is read or
    /// touched.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Manifest`] if the series file cannot be fetched.
    /// - Return [`PatchError::Config`] if a patch is not classified.
    #[instrument(skip(self, fetcher), fields(distro = self.distro()), level = "debug")]
    pub fn preview_clean(&self, fetcher: &impl Fetch) -> Result<Vec<Relocation>> {
        info!("would remove all files in local patch set {:?}", self.active_dir.display());
        let manifest = Manifest::fetch(self.manifest_url, fetcher)?;

        manifest
            .entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| -> Result<Relocation> {
                let name = Manifest::patch_name(index, entry);
                let used = self.table.is_used(&name)?;
                let relocation = Relocation {
                    name,
                    url: Some(manifest.patch_url(entry)?),
                    action: Action::decide(used, false, false),
                };
                info!("would {relocation}");
                Ok(relocation)
            })
            .collect()
    }

    /// Re-apply classification to patches already on disk.
    ///
    /// Only moves patches between active and inactive directories. Patches
    /// that have not been downloaded yet are skipped. Returns the moves made.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Move`] if a patch cannot be moved.
    #[instrument(skip(self), fields(distro = self.distro()), level = "debug")]
    pub fn sort(&self, dry_run: bool) -> Result<Vec<Relocation>> {
        let mut moves = Vec::new();
        for (name, used) in self.table.iter() {
            let action = Action::decide(
                used,
                self.active_path(name).exists(),
                self.inactive_path(name).exists(),
            );
            if !action.is_move() {
                continue;
            }

            let relocation = Relocation {
                name: name.into(),
                url: None,
                action,
            };
            if dry_run {
                info!("would {relocation}");
            } else {
                self.apply_move(&relocation)?;
            }
            moves.push(relocation);
        }

        Ok(moves)
    }

    /// Path of patch in active directory.
    pub fn active_path(&self, name: &str) -> PathBuf {
        self.active_dir.join(name)
    }

    /// Path of patch in inactive directory.
    pub fn inactive_path(&self, name: &str) -> PathBuf {
        self.inactive_dir.join(name)
    }

    fn apply_move(&self, relocation: &Relocation) -> Result<()> {
        let name = relocation.name.as_str();
        match relocation.action {
            Action::Disable => {
                info!("disabling patch {name} => {}", self.inactive_dir.display());
                self.move_patch(self.active_path(name), self.inactive_path(name))
            }
            Action::Enable => {
                info!("enabling patch {name} => {}", self.active_dir.display());
                self.move_patch(self.inactive_path(name), self.active_path(name))
            }
            _ => Ok(()),
        }
    }

    fn move_patch(&self, from: PathBuf, to: PathBuf) -> Result<()> {
        if let Some(parent) = to.parent() {
            create_dir_all(parent).map_err(|err| PatchError::CreateDir {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        rename(&from, &to).map_err(|err| PatchError::Move { source: err, from, to })
    }
}

/// Patch set error types.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Distribution or patch classification is missing.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Series manifest cannot be loaded.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Patch cannot be downloaded.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Patch needs downloading, but its remote location is unknown.
    #[error("no remote location known for patch {0:?}")]
    MissingSource(String),

    /// Patch set cannot be wiped.
    #[error("failed to remove patch set at {:?}", path.display())]
    Clean {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Patch set directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Patch cannot be moved.
    #[error("failed to move patch {:?} to {:?}", from.display(), to.display())]
    Move {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PatchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(false, true, false, Action::Disable; "unused patch in active dir")]
    #[test_case(false, true, true, Action::Disable; "unused patch in both dirs")]
    #[test_case(true, false, true, Action::Enable; "used patch in inactive dir")]
    #[test_case(true, true, true, Action::Enable; "used patch in both dirs")]
    #[test_case(true, false, false, Action::Download { used: true }; "missing used patch")]
    #[test_case(false, false, false, Action::Download { used: false }; "missing unused patch")]
    #[test_case(true, true, false, Action::Keep; "used patch in place")]
    #[test_case(false, false, true, Action::Keep; "unused patch in place")]
    #[test]
    fn decide_action(used: bool, active: bool, inactive: bool, expect: Action) {
        assert_eq!(Action::decide(used, active, inactive), expect);
    }

    #[test]
    fn only_enable_and_disable_move() {
        assert!(Action::Disable.is_move());
        assert!(Action::Enable.is_move());
        assert!(!Action::Download { used: true }.is_move());
        assert!(!Action::Keep.is_move());
    }

    #[test]
    fn describe_relocation() {
        let relocation = Relocation {
            name: "00-x.patch".into(),
            url: None,
            action: Action::Download { used: false },
        };
        assert_eq!(relocation.to_string(), "download 00-x.patch into not-used");
    }
}
