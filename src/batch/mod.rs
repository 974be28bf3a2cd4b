//! Unattended batch processing of FB2 collections.
//!
//! The processor walks input files and directories, routes entries by
//! extension (`.fb2` documents, `.zip` and `.rar` containers, anything else
//! ignored) and repairs every document it finds. Results land in three
//! buckets under the output root: `Good` for repaired documents, `Bad` for
//! verbatim copies of inputs that failed, `NonValid` for documents a schema
//! validator rejected. One broken entry never aborts the run; only losing
//! the output location does.

mod archive;

use std::collections::HashSet;
use std::fs::{self, File, FileTimes};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use encoding_rs::Encoding;
use log::{debug, error, info, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::encoding::{self, EncodingPlan};
use crate::error::{Error, Result};
use crate::genres::GenreTable;
use crate::model::FictionBook;
use crate::naming::{self, NamePattern, NamingOptions};
use crate::repair::{self, RepairOptions};
use crate::schema::{ElementCatalog, SchemaValidator};
use crate::writer::{self, WriterOptions};

/// Traversal-wide policies.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Root under which the `Good`, `Bad` and `NonValid` buckets live.
    pub output_root: PathBuf,
    /// Files and directories never scanned as inputs.
    pub excludes: Vec<PathBuf>,
    /// Descend into subdirectories of directory inputs.
    pub recurse: bool,
    /// Repackage each output as a single-entry ZIP.
    pub compress: bool,
    /// Forced output encoding; `None` keeps each document's own.
    pub preferred: Option<&'static Encoding>,
    pub writer: WriterOptions,
    pub naming: NamingOptions,
    pub regenerate_id: bool,
    pub increment_version: bool,
    /// Re-repair documents already stamped as processed.
    pub force: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            excludes: Vec::new(),
            recurse: true,
            compress: true,
            preferred: None,
            writer: WriterOptions {
                indent_header: true,
                indent_body: false,
            },
            naming: NamingOptions {
                translify: true,
                replace_char: Some('_'),
                ..NamingOptions::default()
            },
            regenerate_id: false,
            increment_version: true,
            force: false,
        }
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    /// Documents the pipeline attempted.
    pub documents: u64,
    /// Documents repaired and stored in `Good`.
    pub saved: u64,
    /// Documents redirected to `NonValid` by the schema validator.
    pub invalid: u64,
    /// Documents preserved verbatim in `Bad`.
    pub failed: u64,
    /// Containers walked, nested ones included.
    pub archives: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Good,
    Bad,
    NonValid,
}

struct Buckets {
    good: PathBuf,
    bad: PathBuf,
    non_valid: PathBuf,
}

/// Walks inputs, repairs documents and allocates output files.
pub struct BatchProcessor<'a> {
    options: BatchOptions,
    genres: Option<&'a GenreTable>,
    catalog: ElementCatalog,
    validator: Option<&'a dyn SchemaValidator>,
    pattern: Option<&'a dyn NamePattern>,
    exclusions: HashSet<PathBuf>,
    buckets: Buckets,
    stats: BatchStats,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(options: BatchOptions) -> Self {
        let buckets = Buckets {
            good: options.output_root.join("Good"),
            bad: options.output_root.join("Bad"),
            non_valid: options.output_root.join("NonValid"),
        };

        let mut exclusions: HashSet<PathBuf> =
            options.excludes.iter().map(|path| normalized(path)).collect();
        exclusions.insert(normalized(&buckets.good));
        exclusions.insert(normalized(&buckets.bad));
        exclusions.insert(normalized(&buckets.non_valid));

        Self {
            options,
            genres: None,
            catalog: ElementCatalog::fb2(),
            validator: None,
            pattern: None,
            exclusions,
            buckets,
            stats: BatchStats::default(),
        }
    }

    /// Remap genre codes through this table during repair.
    pub fn with_genres(mut self, genres: &'a GenreTable) -> Self {
        self.genres = Some(genres);
        self
    }

    /// Validate each serialized document; failures go to `NonValid`.
    pub fn with_validator(mut self, validator: &'a dyn SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Derive output names from document metadata instead of source stems.
    pub fn with_pattern(mut self, pattern: &'a dyn NamePattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Process every input path. Directories are expanded (files before
    /// subdirectories), plain files routed by extension, anything else
    /// reported and skipped. Returns the accumulated counters.
    pub fn process<I, P>(&mut self, inputs: I) -> Result<BatchStats>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for input in inputs {
            let path = input.as_ref();
            if path.is_dir() {
                self.walk_directory(path, self.options.recurse)?;
            } else if path.is_file() {
                self.process_file(path)?;
            } else {
                error!("'{}' is not a valid file or directory", path.display());
            }
        }
        Ok(self.stats)
    }

    fn walk_directory(&mut self, directory: &Path, recurse: bool) -> Result<()> {
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("cannot list '{}': {err}", directory.display());
                return Ok(());
            }
        };

        let mut files = Vec::new();
        let mut subdirectories = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("unreadable entry under '{}': {err}", directory.display());
                    continue;
                }
            };
            let path = entry.path();
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => subdirectories.push(path),
                Ok(_) => files.push(path),
                Err(err) => warn!("cannot inspect '{}': {err}", path.display()),
            }
        }
        files.sort();
        subdirectories.sort();

        for file in files {
            if !self.excluded(&file) {
                self.process_file(&file)?;
            }
        }

        if recurse {
            for subdirectory in subdirectories {
                if !self.excluded(&subdirectory) {
                    self.walk_directory(&subdirectory, recurse)?;
                }
            }
        }

        Ok(())
    }

    fn process_file(&mut self, path: &Path) -> Result<()> {
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().into_owned())
            .unwrap_or_default();

        if extension.eq_ignore_ascii_case("zip") {
            info!("processing archive '{}'", path.display());
            let file = match File::open(path) {
                Ok(file) => file,
                Err(err) => {
                    error!("cannot open '{}': {err}", path.display());
                    return Ok(());
                }
            };
            self.process_zip(file)
        } else if extension.eq_ignore_ascii_case("rar") {
            self.exclude_volume_siblings(path);
            if archive::is_continuation_volume(path) {
                debug!("skipping continuation volume '{}'", path.display());
                return Ok(());
            }
            info!("processing archive '{}'", path.display());
            self.process_rar(path)
        } else if extension.eq_ignore_ascii_case("fb2") {
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let provenance = fs::metadata(path)
                .and_then(|meta| meta.modified())
                .map(DateTime::<Local>::from)
                .unwrap_or_else(|_| Local::now());
            let bytes = match read_input(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    error!("cannot read '{}': {err}", path.display());
                    return Ok(());
                }
            };
            self.handle_document(&bytes, &stem, provenance)
        } else {
            Ok(())
        }
    }

    /// Run one document through the pipeline, isolating its failure from
    /// the batch: anything short of losing the output location is logged,
    /// the input preserved in `Bad`, and the run continues.
    fn handle_document(
        &mut self,
        bytes: &[u8],
        stem: &str,
        provenance: DateTime<Local>,
    ) -> Result<()> {
        self.stats.documents += 1;
        match self.process_document(bytes, stem, provenance) {
            Ok(()) => Ok(()),
            Err(Error::Resource(err)) => Err(Error::Resource(err)),
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::PermissionDenied => {
                warn!("access denied while writing '{stem}', skipping");
                Ok(())
            }
            Err(Error::Io(err)) => Err(Error::Io(err)),
            Err(err) => {
                error!("'{stem}': {err}");
                self.stats.failed += 1;
                if let Err(preserve) = self.copy_to_bad(bytes, stem) {
                    match preserve {
                        Error::Resource(_) => return Err(preserve),
                        other => error!("could not preserve '{stem}': {other}"),
                    }
                }
                Ok(())
            }
        }
    }

    fn process_document(
        &mut self,
        bytes: &[u8],
        stem: &str,
        provenance: DateTime<Local>,
    ) -> Result<()> {
        info!("processing fb2 document '{stem}'");

        let decoded = encoding::decode(bytes);
        let mut book = FictionBook::parse(&decoded.text)?;

        let repair_options = RepairOptions {
            genres: self.genres,
            catalog: Some(&self.catalog),
            regenerate_id: self.options.regenerate_id,
            increment_version: self.options.increment_version,
            force: self.options.force,
        };
        repair::repair(&mut book, &repair_options)?;

        // Untouched documents keep their source modification time as the
        // container date; repaired ones stay stamped with the current run.
        if book.modifications().is_empty() {
            book.set_container_date(provenance);
        }

        let plan = EncodingPlan::choose(
            self.options.preferred,
            decoded.encoding,
            book.tree().text_len(),
        );
        let payload = writer::encode_document(&book, &plan, &self.options.writer)?;

        let valid = match self.validator {
            Some(validator) => {
                let text = writer::serialize(&book, plan.label(), &self.options.writer);
                match validator.validate(&text) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("'{stem}': {err}");
                        false
                    }
                }
            }
            None => true,
        };

        let candidate = match self.pattern {
            Some(pattern) => pattern.render(&book),
            None => stem.to_string(),
        };
        let shaped = naming::shape_name(&candidate, &self.options.naming);
        let relative = PathBuf::from(&shaped);
        let file_name = relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        // A rejected document keeps its shaped file name but lands flat in
        // NonValid; pattern subdirectories apply only under Good.
        let directory = if valid {
            let base = self.ensure_bucket(Bucket::Good)?.to_path_buf();
            match relative.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => base.join(parent),
                _ => base,
            }
        } else {
            self.ensure_bucket(Bucket::NonValid)?.to_path_buf()
        };

        self.save_document(&directory, &file_name, &book, &payload)?;
        if valid {
            self.stats.saved += 1;
        } else {
            self.stats.invalid += 1;
        }
        Ok(())
    }

    /// Write the payload under `directory`, deleting the partial file on
    /// every error path before the error propagates.
    fn save_document(
        &self,
        directory: &Path,
        name: &str,
        book: &FictionBook,
        payload: &[u8],
    ) -> Result<()> {
        fs::create_dir_all(directory)?;

        let extension = if self.options.compress { ".zip" } else { ".fb2" };
        let path = naming::unique_path(directory, name, extension, self.options.naming.max_length);

        if let Err(err) = self.write_output(&path, name, book, payload) {
            if path.exists() {
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!("could not remove partial output '{}': {cleanup}", path.display());
                }
            }
            return Err(err);
        }
        Ok(())
    }

    fn write_output(&self, path: &Path, name: &str, book: &FictionBook, payload: &[u8]) -> Result<()> {
        if self.options.compress {
            let file = File::create(path)?;
            let mut archive = ZipWriter::new(file);
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .last_modified_time(zip_datetime(book.container_date()));
            archive.start_file(format!("{name}.fb2"), options)?;
            archive.write_all(payload)?;
            archive.finish()?;
        } else {
            fs::write(path, payload)?;
        }

        let stamp = provenance_timestamp(book.container_date());
        let file = File::options().write(true).open(path)?;
        file.set_times(FileTimes::new().set_accessed(stamp).set_modified(stamp))?;
        Ok(())
    }

    fn copy_to_bad(&mut self, bytes: &[u8], stem: &str) -> Result<()> {
        let name = naming::dirify(stem, false);
        let directory = self.ensure_bucket(Bucket::Bad)?.to_path_buf();
        let path = naming::unique_path(&directory, &name, ".fb2", self.options.naming.max_length);
        fs::write(&path, bytes)?;
        Ok(())
    }

    /// Create the bucket directory on first need. Failure here is fatal to
    /// the batch. The realized path joins the exclusion set so a later walk
    /// of the output root never rescans it.
    fn ensure_bucket(&mut self, bucket: Bucket) -> Result<&Path> {
        let path = match bucket {
            Bucket::Good => &self.buckets.good,
            Bucket::Bad => &self.buckets.bad,
            Bucket::NonValid => &self.buckets.non_valid,
        };
        if !path.exists() {
            fs::create_dir_all(path).map_err(Error::Resource)?;
            self.exclusions.insert(normalized(path));
        }
        Ok(path)
    }

    fn excluded(&self, path: &Path) -> bool {
        self.exclusions.contains(&normalized(path))
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|err| {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Error::AccessDenied(path.display().to_string())
        } else {
            Error::Io(err)
        }
    })
}

fn normalized(path: &Path) -> PathBuf {
    match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(_) => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// Output timestamp tied to the container date: one hour earlier when the
/// date falls outside daylight-saving time, so repeated runs against the
/// same sources produce identical stamps year-round.
fn provenance_timestamp(date: DateTime<Local>) -> SystemTime {
    let adjusted = if is_daylight_saving(&date) {
        date
    } else {
        date - chrono::TimeDelta::hours(1)
    };
    SystemTime::from(adjusted)
}

fn is_daylight_saving(date: &DateTime<Local>) -> bool {
    let year = date.year();
    let offset_at = |month: u32| {
        Local
            .with_ymd_and_hms(year, month, 1, 12, 0, 0)
            .single()
            .map(|probe| probe.offset().local_minus_utc())
    };
    let current = date.offset().local_minus_utc();
    match (offset_at(1), offset_at(7)) {
        (Some(january), Some(july)) => current > january.min(july),
        _ => false,
    }
}

fn zip_datetime(date: DateTime<Local>) -> zip::DateTime {
    zip::DateTime::from_date_and_time(
        date.year().clamp(1980, 2107) as u16,
        date.month() as u8,
        date.day() as u8,
        date.hour() as u8,
        date.minute() as u8,
        date.second() as u8,
    )
    .unwrap_or_default()
}
