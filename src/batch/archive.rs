//! Container walkers: recursive ZIP traversal and RAR extraction.
//!
//! Nested ZIPs recurse through an in-memory buffer; nested RARs are spooled
//! to a scoped temp file first. RAR archives themselves are unpacked with
//! the external `unar` tool into a temporary directory that is removed on
//! every exit path, then walked with the standard extension routing.

use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use log::{debug, error, warn};
use regex::Regex;
use tempfile::{NamedTempFile, TempDir};
use zip::ZipArchive;

use super::{BatchProcessor, normalized};
use crate::error::{Error, Result};

/// `name.partN.rar` naming scheme; volume number in the first capture.
static PART_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.part(\d+)\.rar$").expect("valid regex"));

/// `name.rNN` continuation scheme.
static SPLIT_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.r\d{2}$").expect("valid regex"));

impl BatchProcessor<'_> {
    /// Walk a ZIP archive. Each entry fails in isolation: an unreadable or
    /// encrypted entry is logged and skipped, a document that fails the
    /// pipeline is preserved in the failure bucket, and the walk goes on.
    pub(super) fn process_zip<R: Read + Seek>(&mut self, reader: R) -> Result<()> {
        self.stats.archives += 1;

        let mut archive = match ZipArchive::new(reader) {
            Ok(archive) => archive,
            Err(err) => {
                error!("unreadable zip archive: {err}");
                return Ok(());
            }
        };

        for index in 0..archive.len() {
            let (file_name, modified, bytes) = {
                let mut entry = match archive.by_index(index) {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("skipping archive entry {index}: {err}");
                        continue;
                    }
                };
                if entry.is_dir() {
                    continue;
                }
                let file_name = entry_file_name(entry.name());
                let modified = entry
                    .last_modified()
                    .and_then(local_datetime)
                    .unwrap_or_else(Local::now);
                let mut bytes = Vec::new();
                if let Err(err) = entry.read_to_end(&mut bytes) {
                    warn!("skipping archive entry '{file_name}': {err}");
                    continue;
                }
                (file_name, modified, bytes)
            };

            let (stem, extension) = match file_name.rsplit_once('.') {
                Some((stem, extension)) => (stem, extension),
                None => (file_name.as_str(), ""),
            };

            if extension.eq_ignore_ascii_case("zip") {
                self.process_zip(Cursor::new(bytes))?;
            } else if extension.eq_ignore_ascii_case("rar") {
                match spool_to_temp(&bytes) {
                    Ok(temp) => self.process_rar(temp.path())?,
                    Err(err) => warn!("cannot spool archive entry '{file_name}': {err}"),
                }
            } else if extension.eq_ignore_ascii_case("fb2") {
                self.handle_document(&bytes, stem, modified)?;
            }
        }

        Ok(())
    }

    /// Extract a RAR archive and walk the extracted tree. Extraction
    /// failure, password-protected archives included, abandons the archive
    /// with a log entry and the batch continues.
    pub(super) fn process_rar(&mut self, path: &Path) -> Result<()> {
        self.stats.archives += 1;

        let extracted = match extract_rar(path) {
            Ok(staging) => staging,
            Err(err) => {
                error!("abandoning rar archive '{}': {err}", path.display());
                return Ok(());
            }
        };
        self.walk_directory(extracted.path(), true)
    }

    /// Register multi-volume continuation siblings of `path` in the
    /// exclusion set so they are not later scanned as independent inputs.
    pub(super) fn exclude_volume_siblings(&mut self, path: &Path) {
        let Some(parent) = path.parent() else { return };
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return;
        };
        let Some(base) = volume_base(file_name) else { return };

        let Ok(entries) = fs::read_dir(parent) else { return };
        for entry in entries.flatten() {
            let sibling = entry.path();
            let Some(name) = sibling.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if name.eq_ignore_ascii_case(file_name) {
                continue;
            }
            let Some(prefix) = name.get(..base.len()) else { continue };
            if !prefix.eq_ignore_ascii_case(base) || name.as_bytes().get(base.len()) != Some(&b'.')
            {
                continue;
            }
            if PART_VOLUME.is_match(name) || SPLIT_VOLUME.is_match(name) {
                debug!("excluding volume continuation '{}'", sibling.display());
                self.exclusions.insert(normalized(&sibling));
            }
        }
    }
}

/// Whether a file is a continuation volume rather than the first volume of
/// a multi-part RAR set: `.partN.rar` with N > 1, or any `.rNN`.
pub(super) fn is_continuation_volume(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    if let Some(captures) = PART_VOLUME.captures(name) {
        return captures
            .get(1)
            .and_then(|number| number.as_str().parse::<u32>().ok())
            .is_some_and(|number| number > 1);
    }
    SPLIT_VOLUME.is_match(name)
}

/// Archive base name without the volume suffix, used to match sibling
/// volumes of the same set.
fn volume_base(file_name: &str) -> Option<&str> {
    if let Some(found) = PART_VOLUME.find(file_name) {
        return Some(&file_name[..found.start()]);
    }
    let path = Path::new(file_name);
    if path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("rar"))
    {
        return file_name.get(..file_name.len() - 4);
    }
    None
}

fn extract_rar(path: &Path) -> Result<TempDir> {
    let staging = tempfile::tempdir()?;

    let output = Command::new("unar")
        .arg("-quiet")
        .arg("-output-directory")
        .arg(staging.path())
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| Error::Archive(format!("unar unavailable: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() { stdout } else { stderr };
        return Err(Error::Archive(format!(
            "unar failed on '{}': {}",
            path.display(),
            detail.trim()
        )));
    }

    Ok(staging)
}

fn spool_to_temp(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut temp = NamedTempFile::new()?;
    temp.write_all(bytes)?;
    temp.flush()?;
    Ok(temp)
}

/// Last path component of an archive entry name, tolerating backslash
/// separators from archives built on other systems.
fn entry_file_name(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    normalized.rsplit('/').next().unwrap_or("").to_string()
}

fn local_datetime(stamp: zip::DateTime) -> Option<DateTime<Local>> {
    let date = NaiveDate::from_ymd_opt(
        i32::from(stamp.year()),
        u32::from(stamp.month()),
        u32::from(stamp.day()),
    )?;
    let time = NaiveTime::from_hms_opt(
        u32::from(stamp.hour()),
        u32::from(stamp.minute()),
        u32::from(stamp.second()),
    )?;
    Local
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::super::{BatchOptions, BatchProcessor};
    use super::*;
    use crate::writer::WriterOptions;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0">
<description>
<title-info>
<book-title>Test</book-title>
</title-info>
</description>
<body><section><p>Hello</p></section></body>
</FictionBook>"#;

    fn plain_options(root: &Path) -> BatchOptions {
        BatchOptions {
            output_root: root.to_path_buf(),
            compress: false,
            writer: WriterOptions::default(),
            ..BatchOptions::default()
        }
    }

    #[test]
    fn test_entry_file_name_components() {
        assert_eq!(entry_file_name("book.fb2"), "book.fb2");
        assert_eq!(entry_file_name("dir/sub/book.fb2"), "book.fb2");
        assert_eq!(entry_file_name(r"dir\book.fb2"), "book.fb2");
    }

    #[test]
    fn test_continuation_volume_detection() {
        assert!(is_continuation_volume(Path::new("set.part2.rar")));
        assert!(is_continuation_volume(Path::new("set.PART10.RAR")));
        assert!(is_continuation_volume(Path::new("set.r00")));
        assert!(is_continuation_volume(Path::new("set.r17")));
        assert!(!is_continuation_volume(Path::new("set.part1.rar")));
        assert!(!is_continuation_volume(Path::new("set.part01.rar")));
        assert!(!is_continuation_volume(Path::new("set.rar")));
        assert!(!is_continuation_volume(Path::new("set.fb2")));
    }

    #[test]
    fn test_volume_siblings_join_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["set.part1.rar", "set.part2.rar", "set.part3.rar", "other.rar"] {
            fs::write(dir.path().join(name), b"stub").unwrap();
        }

        let output = tempfile::tempdir().unwrap();
        let mut processor = BatchProcessor::new(plain_options(output.path()));
        processor.exclude_volume_siblings(&dir.path().join("set.part1.rar"));

        assert!(processor.excluded(&dir.path().join("set.part2.rar")));
        assert!(processor.excluded(&dir.path().join("set.part3.rar")));
        assert!(!processor.excluded(&dir.path().join("set.part1.rar")));
        assert!(!processor.excluded(&dir.path().join("other.rar")));
    }

    #[test]
    fn test_split_volume_siblings_of_plain_rar() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["set.rar", "set.r00", "set.r01", "set2.r00"] {
            fs::write(dir.path().join(name), b"stub").unwrap();
        }

        let output = tempfile::tempdir().unwrap();
        let mut processor = BatchProcessor::new(plain_options(output.path()));
        processor.exclude_volume_siblings(&dir.path().join("set.rar"));

        assert!(processor.excluded(&dir.path().join("set.r00")));
        assert!(processor.excluded(&dir.path().join("set.r01")));
        // A different set's volume shares the prefix but not the base name.
        assert!(!processor.excluded(&dir.path().join("set2.r00")));
    }

    #[test]
    fn test_zip_entries_fail_in_isolation() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let file = File::create(input.path().join("books.zip")).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer.start_file("good.fb2", options).unwrap();
        writer.write_all(SAMPLE.as_bytes()).unwrap();
        writer.start_file("bad.fb2", options).unwrap();
        writer.write_all(b"garbage").unwrap();
        writer.start_file("ignored.txt", options).unwrap();
        writer.write_all(b"not a book").unwrap();
        writer.finish().unwrap();

        let mut processor = BatchProcessor::new(plain_options(output.path()));
        let stats = processor.process([input.path()]).unwrap();

        assert_eq!(stats.archives, 1);
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.saved, 1);
        assert_eq!(stats.failed, 1);
        assert!(output.path().join("Good").join("good.fb2").exists());
        assert_eq!(
            fs::read(output.path().join("Bad").join("bad.fb2")).unwrap(),
            b"garbage"
        );
    }

    #[test]
    fn test_nested_zip_recursed_in_memory() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let mut inner = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        inner.start_file("inner.fb2", options).unwrap();
        inner.write_all(SAMPLE.as_bytes()).unwrap();
        let inner_bytes = inner.finish().unwrap().into_inner();

        let file = File::create(input.path().join("outer.zip")).unwrap();
        let mut outer = ZipWriter::new(file);
        outer.start_file("nested/inner.zip", options).unwrap();
        outer.write_all(&inner_bytes).unwrap();
        outer.finish().unwrap();

        let mut processor = BatchProcessor::new(plain_options(output.path()));
        let stats = processor.process([input.path()]).unwrap();

        assert_eq!(stats.archives, 2);
        assert_eq!(stats.saved, 1);
        assert!(output.path().join("Good").join("inner.fb2").exists());
    }

    #[test]
    fn test_zip_directory_entries_skipped() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let file = File::create(input.path().join("books.zip")).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .add_directory("shelf/", SimpleFileOptions::default())
            .unwrap();
        writer
            .start_file("shelf/book.fb2", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(SAMPLE.as_bytes()).unwrap();
        writer.finish().unwrap();

        let mut processor = BatchProcessor::new(plain_options(output.path()));
        let stats = processor.process([input.path()]).unwrap();

        assert_eq!(stats.documents, 1);
        assert_eq!(stats.saved, 1);
        assert!(output.path().join("Good").join("book.fb2").exists());
    }
}
