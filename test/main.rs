// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use chroma::{
    config::{Config, Distro, CONFIG_VERSION},
    extension::crx::{CrxError, Unpack},
    fetch::{Fetch, FetchError},
};

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fs::{create_dir_all, write},
    path::Path,
};

pub(crate) const SERIES_URL: &str = "https://blah.org/debian/patches/series";
pub(crate) const UBLOCK_ID: &str = "cjpalhdlnbpafiamejdnhcphjbkeiagm";
pub(crate) const INSTALL_DIR: &str = "/usr/share/chromium/extensions";

/// Serve canned responses and remember every requested URL.
#[derive(Debug, Default)]
pub(crate) struct FakeFetcher {
    responses: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: impl Into<String>, body: impl AsRef<[u8]>) -> Self {
        self.responses.insert(url.into(), body.as_ref().to_vec());
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub(crate) fn forget_requests(&self) {
        self.requests.borrow_mut().clear();
    }
}

impl Fetch for FakeFetcher {
    fn fetch(&self, url: &str) -> chroma::fetch::Result<Vec<u8>> {
        self.requests.borrow_mut().push(url.into());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                status: 404,
                url: url.into(),
            })
    }
}

/// Pretend to unpack a package by writing a fixed extension manifest.
#[derive(Debug, Clone)]
pub(crate) struct FakeUnpacker {
    manifest: String,
}

impl FakeUnpacker {
    pub(crate) fn new(manifest: impl Into<String>) -> Self {
        Self {
            manifest: manifest.into(),
        }
    }
}

impl Unpack for FakeUnpacker {
    fn unpack(&self, _archive: &Path, dst: &Path) -> chroma::extension::crx::Result<()> {
        create_dir_all(dst).map_err(|err| CrxError::Write {
            source: err,
            path: dst.to_path_buf(),
        })?;

        let manifest = dst.join("manifest.json");
        write(&manifest, &self.manifest).map_err(|err| CrxError::Write {
            source: err,
            path: manifest,
        })
    }
}

/// Configuration with a single `debian` distribution using target table.
pub(crate) fn config_fixture(patches: &[(&str, bool)]) -> Config {
    let distro = Distro {
        manifest_url: SERIES_URL.into(),
        patches: patches
            .iter()
            .map(|(name, used)| (name.to_string(), *used))
            .collect(),
    };

    Config {
        version: CONFIG_VERSION,
        install_dir: INSTALL_DIR.into(),
        distros: BTreeMap::from([("debian".to_string(), distro)]),
        extensions: BTreeMap::from([("ublock-origin".to_string(), UBLOCK_ID.to_string())]),
    }
}

/// Fetcher serving the `debian` series of two patches and their content.
pub(crate) fn series_fetcher() -> FakeFetcher {
    FakeFetcher::new()
        .with(SERIES_URL, "a.patch\n\nfixes/b.patch\n")
        .with("https://blah.org/debian/patches/a.patch", "patch a")
        .with("https://blah.org/debian/patches/fixes/b.patch", "patch b")
}

/// Wrap single-file zip archive holding `manifest.json` in a CRX3 envelope.
///
/// Entries are stored uncompressed so `unzip` can read them back.
pub(crate) fn crx3_fixture(manifest: &str) -> Vec<u8> {
    let name = b"manifest.json";
    let data = manifest.as_bytes();
    let crc = crc32(data);
    let size = data.len() as u32;

    let mut zip = Vec::new();
    zip.extend(0x04034b50u32.to_le_bytes());
    zip.extend(20u16.to_le_bytes());
    zip.extend([0u8; 4]); // flags, method
    zip.extend(0u16.to_le_bytes()); // time
    zip.extend(0x21u16.to_le_bytes()); // 1980-01-01
    zip.extend(crc.to_le_bytes());
    zip.extend(size.to_le_bytes());
    zip.extend(size.to_le_bytes());
    zip.extend((name.len() as u16).to_le_bytes());
    zip.extend(0u16.to_le_bytes());
    zip.extend(name);
    zip.extend(data);

    let central_offset = zip.len() as u32;
    let mut central = Vec::new();
    central.extend(0x02014b50u32.to_le_bytes());
    central.extend(20u16.to_le_bytes());
    central.extend(20u16.to_le_bytes());
    central.extend([0u8; 4]); // flags, method
    central.extend(0u16.to_le_bytes());
    central.extend(0x21u16.to_le_bytes());
    central.extend(crc.to_le_bytes());
    central.extend(size.to_le_bytes());
    central.extend(size.to_le_bytes());
    central.extend((name.len() as u16).to_le_bytes());
    central.extend([0u8; 8]); // extra, comment, disk, internal attributes
    central.extend(0u32.to_le_bytes());
    central.extend(0u32.to_le_bytes());
    central.extend(name);
    zip.extend(&central);

    zip.extend(0x06054b50u32.to_le_bytes());
    zip.extend([0u8; 4]); // disk numbers
    zip.extend(1u16.to_le_bytes());
    zip.extend(1u16.to_le_bytes());
    zip.extend((central.len() as u32).to_le_bytes());
    zip.extend(central_offset.to_le_bytes());
    zip.extend(0u16.to_le_bytes());

    let header = [0xabu8; 16];
    let mut crx = b"Cr24".to_vec();
    crx.extend(3u32.to_le_bytes());
    crx.extend((header.len() as u32).to_le_bytes());
    crx.extend(header);
    crx.extend(zip);
    crx
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for byte in data {
        crc ^= u32::from(*byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb88320 & mask);
        }
    }
    !crc
}
