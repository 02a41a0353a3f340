// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Automation for chromium package patches and extensions.
//!
//! Chroma maintains two things inside a chromium package tree:
//!
//! 1. __Patch sets__ pulled from other distributions' chromium packaging,
//!    filed into used and unused directories according to a classification
//!    table curated by the packager. See [`patch`].
//! 2. __Bundled extensions__ fetched from the Chrome Web Store, along with
//!    the preference files Chromium needs to load them. See [`extension`].
//!
//! All curated data comes from a single [`config::Config`], and all package
//! paths from a single [`path::Workspace`]. Both are prepared once, up front,
//! and handed to whatever needs them.

pub mod config;
pub mod extension;
pub mod fetch;
pub mod patch;
pub mod path;

pub use config::{Config, ConfigError};
pub use extension::{crx::CrxUnpacker, ExtensionError, ExtensionFetcher};
pub use fetch::{Fetch, FetchError, HttpFetcher};
pub use patch::{manifest::Manifest, Action, PatchError, PatchSet, Relocation};
pub use path::{Workspace, WorkspaceError};
