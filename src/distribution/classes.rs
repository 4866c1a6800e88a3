//! Class counting for the JVM class-data-sharing size hint.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use walkdir::WalkDir;

/// Count `.class` files under `root` plus `.class` entries inside every
/// `.jar` found there. Symlinks are not followed.
pub fn count_classes(root: &Path) -> Result<u64> {
    let mut count = 0u64;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry =
            entry.with_context(|| format!("walking runtime tree '{}'", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.path().extension().and_then(|ext| ext.to_str()) {
            Some("class") => count += 1,
            Some("jar") => count += count_jar_classes(entry.path())?,
            _ => {}
        }
    }

    Ok(count)
}

fn count_jar_classes(jar: &Path) -> Result<u64> {
    let file = File::open(jar).with_context(|| format!("opening jar '{}'", jar.display()))?;
    let archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("reading jar '{}'", jar.display()))?;
    Ok(archive
        .file_names()
        .filter(|name| name.ends_with(".class"))
        .count() as u64)
}
