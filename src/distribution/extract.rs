//! Archive extraction, dispatched by file extension.
//!
//! Supports `.zip`/`.jar`, `.tar`, `.tar.gz`/`.tgz` and `.tar.zst`. Leading
//! path components can be dropped, which is how the runtime zip (rooted at
//! `wlp/`) is unpacked straight into a layer.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::debug;

use crate::error::ProvisionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarZst,
}

fn archive_kind(path: &Path) -> Option<ArchiveKind> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".zip") || name.ends_with(".jar") {
        Some(ArchiveKind::Zip)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveKind::TarGz)
    } else if name.ends_with(".tar.zst") {
        Some(ArchiveKind::TarZst)
    } else if name.ends_with(".tar") {
        Some(ArchiveKind::Tar)
    } else {
        None
    }
}

/// Unpack `archive` into `dest`, dropping the first `strip` path components.
pub fn extract(archive: &Path, dest: &Path, strip: usize) -> Result<()> {
    let kind =
        archive_kind(archive).ok_or_else(|| ProvisionError::UnsupportedArchive(archive.into()))?;

    fs::create_dir_all(dest)
        .with_context(|| format!("creating extraction directory '{}'", dest.display()))?;
    let file =
        File::open(archive).with_context(|| format!("opening archive '{}'", archive.display()))?;
    let reader = BufReader::new(file);

    let unpacked = match kind {
        ArchiveKind::Zip => unpack_zip(reader, dest, strip),
        ArchiveKind::Tar => unpack_tar(reader, dest, strip),
        ArchiveKind::TarGz => unpack_tar(GzDecoder::new(reader), dest, strip),
        ArchiveKind::TarZst => {
            let decoder = zstd::stream::Decoder::with_buffer(reader)
                .with_context(|| format!("opening zstd stream '{}'", archive.display()))?;
            unpack_tar(decoder, dest, strip)
        }
    };
    unpacked.with_context(|| {
        format!(
            "extracting '{}' into '{}'",
            archive.display(),
            dest.display()
        )
    })?;

    debug!(archive = %archive.display(), dest = %dest.display(), "extracted archive");
    Ok(())
}

/// Drop `strip` leading components; `None` for entries that vanish or escape.
fn stripped_path(path: &Path, strip: usize) -> Option<PathBuf> {
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return None;
    }
    let stripped: PathBuf = path.components().skip(strip).collect();
    if stripped.as_os_str().is_empty() {
        None
    } else {
        Some(stripped)
    }
}

fn unpack_tar<R: Read>(reader: R, dest: &Path, strip: usize) -> Result<()> {
    let mut archive = Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(relative) = stripped_path(&path, strip) else {
            continue;
        };
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .with_context(|| format!("unpacking '{}'", path.display()))?;
    }
    Ok(())
}

fn unpack_zip<R: Read + std::io::Seek>(reader: R, dest: &Path, strip: usize) -> Result<()> {
    let mut archive = zip::ZipArchive::new(reader).context("reading zip directory")?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .with_context(|| format!("reading zip entry {i}"))?;
        let Some(path) = file.enclosed_name() else {
            continue;
        };
        let Some(relative) = stripped_path(&path, strip) else {
            continue;
        };
        let target = dest.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("creating '{}'", target.display()))?;
        std::io::copy(&mut file, &mut out)
            .with_context(|| format!("writing '{}'", target.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}
