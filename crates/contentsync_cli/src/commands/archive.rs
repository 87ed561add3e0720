//! Archive export and inspection commands.

use crate::fixture::Fixture;
use contentsync_engine::{read_archive, write_archive, ContentPreparer, ExportEngine};
use contentsync_protocol::ExportConfig;
use std::path::Path;
use tracing::info;

/// Exports a root object from a node fixture into a zip archive.
pub fn export(
    fixture_path: &Path,
    root: u64,
    out: &Path,
    append_nested: bool,
    resolve_menus: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading fixture {:?}", fixture_path);
    let fixture = Fixture::load(fixture_path)?;
    let settings = fixture.settings();
    let store = fixture.build_store()?;

    let config = ExportConfig::default()
        .with_append_nested(append_nested)
        .with_resolve_menus(resolve_menus);

    let preparer = ContentPreparer::for_node(&settings)?;
    let set = ExportEngine::new(&preparer, &store).export(root, &config)?;

    info!("Writing archive {:?}", out);
    write_archive(&set, &store, out)?;

    println!("success::exported {} units to {:?}", set.len(), out);
    for unit in set.iter() {
        let marker = if unit.is_root { " (root)" } else { "" };
        println!("  {} {} [{}]{}", unit.source_id, unit.name, unit.object_type, marker);
    }

    Ok(())
}

/// Lists the contents of an export archive.
pub fn inspect(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (set, media) = read_archive(path)?;

    println!("success::archive {:?}", path);
    println!("Units: {}", set.len());
    for unit in set.iter() {
        let marker = if unit.is_root { " (root)" } else { "" };
        println!(
            "  {} {} [{}] gid={}{}",
            unit.source_id, unit.name, unit.object_type, unit.gid, marker
        );
        if let Some(asset) = &unit.asset {
            println!("      asset: {} ({})", asset.file_name, asset.relative_path);
        }
    }

    println!("Media files: {}", media.len());
    for (file_name, bytes) in &media {
        println!("  {} ({} bytes)", file_name, bytes.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_fixture() -> String {
        r#"{
            "node": { "id": 1, "site_url": "https://one.example" },
            "objects": [
                {
                    "id": 7,
                    "name": "photo",
                    "title": "Photo",
                    "object_type": "attachment",
                    "status": "publish",
                    "body": "",
                    "created_at_ms": 0,
                    "modified_at_ms": 0,
                    "asset": {
                        "file_name": "photo.jpg",
                        "relative_path": "2024/photo.jpg",
                        "url": "https://one.example/media/2024/photo.jpg"
                    }
                },
                {
                    "id": 10,
                    "name": "hello",
                    "title": "Hello",
                    "object_type": "post",
                    "status": "publish",
                    "body": "<img class=\"media-7\">",
                    "created_at_ms": 0,
                    "modified_at_ms": 0
                }
            ],
            "assets": { "2024/photo.jpg": "AQID" }
        }"#
        .to_string()
    }

    #[test]
    fn export_then_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let fixture_path = dir.path().join("node.json");
        fs::write(&fixture_path, sample_fixture()).unwrap();
        let out = dir.path().join("bundle.zip");

        export(&fixture_path, 10, &out, true, false).unwrap();
        assert!(out.exists());

        let (set, media) = read_archive(&out).unwrap();
        assert_eq!(set.source_ids(), vec![10, 7]);
        assert!(set.get(10).unwrap().body.contains("{{7}}"));
        assert_eq!(media.get("photo.jpg"), Some(&vec![1, 2, 3]));

        inspect(&out).unwrap();
    }

    #[test]
    fn export_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fixture_path = dir.path().join("node.json");
        fs::write(&fixture_path, sample_fixture()).unwrap();
        let out = dir.path().join("bundle.zip");

        assert!(export(&fixture_path, 99, &out, true, false).is_err());
        assert!(!out.exists());
    }
}
