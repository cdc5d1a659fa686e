//! Writing tests out as script files, zip archives and suite files

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::prompt::suite_filename;
use crate::types::Test;

/// Default name of an exported archive
pub const ARCHIVE_NAME: &str = "playwright-tests.zip";

#[derive(Serialize)]
struct TestMetadata<'a> {
    description: &'a str,
    url: &'a str,
    timestamp: DateTime<Utc>,
}

/// Serializes generated tests into files and archives
#[derive(Debug, Clone, Default)]
pub struct ExportPackager {
    include_metadata: bool,
}

impl ExportPackager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `metadata.json` next to each test in archives
    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    /// Write one test as a raw script file named after its stored filename
    pub fn write_test_file(&self, test: &Test, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(safe_filename(&test.filename));
        fs::write(&path, &test.body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Write every test into `dir`, suffixing duplicate filenames
    pub fn export_to_directory(&self, tests: &[Test], dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let mut taken = HashSet::new();
        let mut written = Vec::with_capacity(tests.len());
        for test in tests {
            let name = unique_name(&safe_filename(&test.filename), &mut taken);
            let path = dir.join(name);
            fs::write(&path, &test.body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
        info!("Exported {} test(s) to {}", written.len(), dir.display());
        Ok(written)
    }

    /// Build an archive with one directory per test
    pub fn write_archive<W: Write + Seek>(&self, tests: &[Test], writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut taken = HashSet::new();

        for test in tests {
            let dir = unique_name(&archive_dir_name(&test.filename), &mut taken);

            zip.start_file(format!("{}/{}", dir, script_entry_name(&test.filename)), options)
                .context("Failed to start test entry")?;
            zip.write_all(test.body.as_bytes())
                .context("Failed to write test entry")?;

            if self.include_metadata {
                let metadata = TestMetadata {
                    description: &test.description,
                    url: &test.url,
                    timestamp: test.timestamp,
                };
                zip.start_file(format!("{}/metadata.json", dir), options)
                    .context("Failed to start metadata entry")?;
                zip.write_all(serde_json::to_string_pretty(&metadata)?.as_bytes())
                    .context("Failed to write metadata entry")?;
            }
        }

        zip.finish().context("Failed to finalize zip archive")
    }

    /// Write the archive to `path`
    pub fn export_archive(&self, tests: &[Test], path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_archive(tests, file)?;
        info!("Archived {} test(s) into {}", tests.len(), path.display());
        Ok(path.to_path_buf())
    }

    /// Write a consolidated suite script named after the suite
    pub fn write_suite_file(&self, suite_name: &str, script: &str, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(suite_filename(suite_name));
        fs::write(&path, script)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote suite file {}", path.display());
        Ok(path)
    }
}

/// Last path component of a stored filename
fn safe_filename(filename: &str) -> String {
    Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("test.spec.js")
        .to_string()
}

/// Entry name inside a test's archive directory
fn script_entry_name(filename: &str) -> &'static str {
    if filename.trim().ends_with(".ts") {
        "test.ts"
    } else {
        "test.js"
    }
}

/// Archive directory for a test: its filename without script extensions
fn archive_dir_name(filename: &str) -> String {
    let name = safe_filename(filename);
    let mut stem = name.as_str();
    for suffix in [".js", ".ts", ".spec", ".test"] {
        stem = stem.strip_suffix(suffix).unwrap_or(stem);
    }
    if stem.is_empty() {
        "test".to_string()
    } else {
        stem.to_string()
    }
}

/// `name`, or `name` with a numeric suffix before its extension if taken
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.find('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
