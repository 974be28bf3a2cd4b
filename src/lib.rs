//! # fb2mend
//!
//! Batch repair and re-encoding for FictionBook (FB2) e-book collections.
//!
//! ## Features
//!
//! - Lenient XML parsing that recovers from broken markup
//! - Header completion: genres, authors, language, document-info synthesis
//! - Control-character scrubbing and nested-paragraph flattening
//! - Encoding-preserving output with numeric-reference fallback and a
//!   one-shot UTF-8 retry
//! - Recursive traversal of directories, ZIP and RAR containers
//! - `Good`/`Bad`/`NonValid` output buckets with collision-free naming
//!
//! ## Quick Start
//!
//! ```no_run
//! use fb2mend::{BatchOptions, BatchProcessor};
//!
//! let mut processor = BatchProcessor::new(BatchOptions {
//!     output_root: "out".into(),
//!     ..BatchOptions::default()
//! });
//! let stats = processor.process(["library"])?;
//! println!("repaired {} of {} documents", stats.saved, stats.documents);
//! # Ok::<(), fb2mend::Error>(())
//! ```
//!
//! ## Repairing a single document
//!
//! ```
//! use fb2mend::{FictionBook, RepairOptions, repair};
//!
//! let source = r#"<FictionBook><description><title-info>
//! <book-title>Example</book-title>
//! </title-info></description><body><p>text</p></body></FictionBook>"#;
//!
//! let mut book = FictionBook::parse(source)?;
//! repair(&mut book, &RepairOptions::default())?;
//! assert_eq!(book.title_info.lang.as_deref(), Some("ru"));
//! # Ok::<(), fb2mend::Error>(())
//! ```

pub mod batch;
pub mod encoding;
pub mod error;
pub mod genres;
pub mod model;
pub mod naming;
pub mod repair;
pub mod schema;
pub mod tree;
pub mod writer;

pub use batch::{BatchOptions, BatchProcessor, BatchStats};
pub use encoding::{EncodingPlan, decode};
pub use error::{Error, Result};
pub use genres::GenreTable;
pub use model::{FictionBook, ModificationKind, ProcessingStatus};
pub use naming::{CaseFolding, NamePattern, NamingOptions};
pub use repair::{RepairOptions, repair};
pub use schema::{ElementCatalog, SchemaValidator};
pub use writer::{WriterOptions, encode_document, serialize};
