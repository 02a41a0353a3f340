// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! CRX package unpacking.
//!
//! A CRX file is a zip archive wrapped in a small envelope that carries the
//! publisher's key and signature:
//!
//! ```text
//! CRX2: "Cr24" | version=2 (u32 LE) | key_len (u32 LE) | sig_len (u32 LE) | key | sig | zip
//! CRX3: "Cr24" | version=3 (u32 LE) | header_len (u32 LE) | header | zip
//! ```
//!
//! Chroma does not verify signatures. It only needs the zip payload to read
//! the extension manifest.
//!
//! # See Also
//!
//! - [CRX3 file format](https://chromium.googlesource.com/chromium/src/+/main/components/crx_file/crx3.proto)

use std::{
    ffi::OsStr,
    fs::{create_dir_all, read, remove_file, write},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

const CRX_MAGIC: &[u8; 4] = b"Cr24";
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Layer of indirection for extension package unpacking.
pub trait Unpack {
    /// Unpack package at `archive` into directory `dst`.
    fn unpack(&self, archive: &Path, dst: &Path) -> Result<()>;
}

/// Unpack CRX packages through the system `unzip` binary.
#[derive(Debug, Default, Clone)]
pub struct CrxUnpacker;

impl CrxUnpacker {
    /// Construct new CRX unpacker.
    pub fn new() -> Self {
        Self
    }
}

impl Unpack for CrxUnpacker {
    #[instrument(skip(self, archive, dst), level = "debug")]
    fn unpack(&self, archive: &Path, dst: &Path) -> Result<()> {
        let data = read(archive).map_err(|err| CrxError::Read {
            source: err,
            path: archive.to_path_buf(),
        })?;
        let offset = zip_offset(&data)?;
        debug!("zip payload of {:?} starts at byte {offset}", archive.display());

        create_dir_all(dst).map_err(|err| CrxError::Write {
            source: err,
            path: dst.to_path_buf(),
        })?;

        let payload = dst.with_extension("zip");
        write(&payload, &data[offset..]).map_err(|err| CrxError::Write {
            source: err,
            path: payload.clone(),
        })?;

        let result = syscall_non_interactive(
            "unzip",
            [
                OsStr::new("-q"),
                OsStr::new("-o"),
                payload.as_os_str(),
                OsStr::new("-d"),
                dst.as_os_str(),
            ],
        );
        let _ = remove_file(&payload);

        result
    }
}

/// Locate start of zip payload inside a CRX package.
///
/// Plain zip archives are accepted as is.
///
/// # Errors
///
/// - Return [`CrxError::Format`] if the envelope is malformed or of an
///   unknown version.
pub fn zip_offset(data: &[u8]) -> Result<usize> {
    if data.starts_with(ZIP_MAGIC) {
        return Ok(0);
    }

    if !data.starts_with(CRX_MAGIC) {
        return Err(CrxError::Format("missing Cr24 magic number".into()));
    }

    let offset = match read_u32(data, 4)? {
        2 => {
            let key_len = read_u32(data, 8)? as usize;
            let sig_len = read_u32(data, 12)? as usize;
            16usize
                .checked_add(key_len)
                .and_then(|offset| offset.checked_add(sig_len))
        }
        3 => {
            let header_len = read_u32(data, 8)? as usize;
            12usize.checked_add(header_len)
        }
        version => return Err(CrxError::Format(format!("unsupported crx version {version}"))),
    }
    .filter(|offset| *offset <= data.len())
    .ok_or_else(|| CrxError::Format("header extends past end of file".into()))?;

    if !data[offset..].starts_with(ZIP_MAGIC) {
        return Err(CrxError::Format("no zip payload after header".into()));
    }

    Ok(offset)
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| CrxError::Format("truncated header".into()))
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<()> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .output()
        .map_err(|err| CrxError::Syscall {
            source: err,
            cmd: cmd.as_ref().to_string_lossy().into_owned(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(output.stderr.as_slice());
        return Err(CrxError::Unzip {
            status: output.status.to_string(),
            message: stderr.trim().to_string(),
        });
    }

    Ok(())
}

/// CRX unpacking error types.
#[derive(Debug, thiserror::Error)]
pub enum CrxError {
    /// Package cannot be read.
    #[error("failed to read extension package at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Unpacked content cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Package envelope is malformed.
    #[error("malformed crx package: {0}")]
    Format(String),

    /// External command cannot be started.
    #[error("failed to run {cmd:?}")]
    Syscall {
        #[source]
        source: std::io::Error,
        cmd: String,
    },

    /// Zip payload cannot be extracted.
    #[error("unzip failed with {status}: {message}")]
    Unzip { status: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = CrxError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn crx2(key: &[u8], sig: &[u8], zip: &[u8]) -> Vec<u8> {
        let mut data = CRX_MAGIC.to_vec();
        data.extend(2u32.to_le_bytes());
        data.extend((key.len() as u32).to_le_bytes());
        data.extend((sig.len() as u32).to_le_bytes());
        data.extend(key);
        data.extend(sig);
        data.extend(zip);
        data
    }

    fn crx3(header: &[u8], zip: &[u8]) -> Vec<u8> {
        let mut data = CRX_MAGIC.to_vec();
        data.extend(3u32.to_le_bytes());
        data.extend((header.len() as u32).to_le_bytes());
        data.extend(header);
        data.extend(zip);
        data
    }

    #[test]
    fn plain_zip_has_no_envelope() -> anyhow::Result<()> {
        assert_eq!(zip_offset(b"PK\x03\x04rest")?, 0);
        Ok(())
    }

    #[test]
    fn crx2_payload_follows_key_and_signature() -> anyhow::Result<()> {
        let data = crx2(b"keykey", b"sig", b"PK\x03\x04payload");
        assert_eq!(zip_offset(&data)?, 16 + 6 + 3);
        Ok(())
    }

    #[test]
    fn crx3_payload_follows_header() -> anyhow::Result<()> {
        let data = crx3(&[0xab; 42], b"PK\x03\x04payload");
        assert_eq!(zip_offset(&data)?, 12 + 42);
        Ok(())
    }

    #[test]
    fn reject_malformed_envelopes() {
        assert!(matches!(zip_offset(b"nope"), Err(CrxError::Format(_))));
        assert!(matches!(zip_offset(b"Cr24\x03\x00"), Err(CrxError::Format(_))));

        let mut unknown = CRX_MAGIC.to_vec();
        unknown.extend(9u32.to_le_bytes());
        unknown.extend(0u32.to_le_bytes());
        assert!(matches!(zip_offset(&unknown), Err(CrxError::Format(msg)) if msg.contains("version 9")));

        let mut oversized = CRX_MAGIC.to_vec();
        oversized.extend(3u32.to_le_bytes());
        oversized.extend(u32::MAX.to_le_bytes());
        assert!(matches!(zip_offset(&oversized), Err(CrxError::Format(_))));

        let no_zip = crx3(b"header", b"not a zip");
        assert!(matches!(zip_offset(&no_zip), Err(CrxError::Format(_))));
    }

    #[sealed_test]
    fn failed_unzip_cleans_payload() -> anyhow::Result<()> {
        write("broken.crx", crx3(b"header", b"PK\x03\x04truncated"))?;

        let result = CrxUnpacker::new().unpack(Path::new("broken.crx"), Path::new("out"));
        assert!(matches!(result, Err(CrxError::Unzip { .. })));
        assert!(!Path::new("out.zip").exists());

        Ok(())
    }
}
