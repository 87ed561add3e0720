//! Portable export bundles.
//!
//! An archive is a zip holding `posts.json` (the pretty-printed export
//! set) and a `media/` directory with every referenced asset file by
//! its export-time filename. Partial artifacts are removed on failure.

use crate::error::{SyncError, SyncResult};
use contentsync_protocol::ExportSet;
use contentsync_store::PostStore;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Manifest entry name inside an archive.
pub const MANIFEST_ENTRY: &str = "posts.json";

/// Media directory prefix inside an archive.
pub const MEDIA_PREFIX: &str = "media/";

/// Asset bytes of a transfer, keyed by export-time filename.
pub type MediaBag = BTreeMap<String, Vec<u8>>;

/// Writes an export set and its asset files into a zip archive.
///
/// Asset bytes are read from the exporting node's store by the
/// relative path each unit recorded. Any failure removes the partial
/// archive before returning.
pub fn write_archive(set: &ExportSet, store: &dyn PostStore, path: &Path) -> SyncResult<()> {
    match write_archive_inner(set, store, path) {
        Ok(()) => Ok(()),
        Err(error) => {
            let _ = std::fs::remove_file(path);
            Err(error)
        }
    }
}

fn write_archive_inner(set: &ExportSet, store: &dyn PostStore, path: &Path) -> SyncResult<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let manifest = serde_json::to_string_pretty(set)?;
    zip.start_file(MANIFEST_ENTRY, options)?;
    zip.write_all(manifest.as_bytes())?;

    for unit in set.iter() {
        let Some(asset) = &unit.asset else {
            continue;
        };
        let bytes = store.asset_bytes(&asset.relative_path)?.ok_or_else(|| {
            SyncError::Store(contentsync_store::StoreError::MissingAsset {
                path: asset.relative_path.clone(),
            })
        })?;
        zip.start_file(format!("{MEDIA_PREFIX}{}", asset.file_name), options)?;
        zip.write_all(&bytes)?;
    }

    zip.finish()?;
    Ok(())
}

/// Reads an export set and its media back out of an archive.
pub fn read_archive(path: &Path) -> SyncResult<(ExportSet, MediaBag)> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut manifest = String::new();
    archive.by_name(MANIFEST_ENTRY)?.read_to_string(&mut manifest)?;
    let set: ExportSet = serde_json::from_str(&manifest)?;

    let mut media = MediaBag::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let Some(file_name) = name.strip_prefix(MEDIA_PREFIX) else {
            continue;
        };
        if file_name.is_empty() {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        media.insert(file_name.to_string(), bytes);
    }

    Ok((set, media))
}
