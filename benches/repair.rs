//! Benchmarks for the document repair pipeline.
//!
//! Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use encoding_rs::{UTF_8, WINDOWS_1251};

use fb2mend::{
    ElementCatalog, EncodingPlan, FictionBook, RepairOptions, WriterOptions, encode_document,
    repair, serialize,
};

/// A mid-sized Russian novel stand-in: a complete header and one section of
/// repetitive paragraphs. No document-info, so repair synthesizes one.
fn synthetic_document(paragraphs: usize) -> String {
    let mut body = String::new();
    for index in 0..paragraphs {
        body.push_str(&format!(
            "<p>Абзац номер {index}, немного текста для объёма и пара слов в запас.</p>"
        ));
    }
    format!(
        "<FictionBook><description>\
         <title-info>\
         <genre>prose</genre>\
         <author><first-name>Иван</first-name><last-name>Петров</last-name></author>\
         <book-title>Пример</book-title>\
         <lang>ru</lang>\
         </title-info>\
         </description><body><section>{body}</section></body></FictionBook>"
    )
}

// ============================================================================
// Parse and Repair Benchmarks
// ============================================================================

fn bench_parse(c: &mut Criterion) {
    let source = synthetic_document(500);

    c.bench_function("parse", |b| {
        b.iter(|| FictionBook::parse(&source).unwrap());
    });
}

fn bench_parse_and_repair(c: &mut Criterion) {
    let source = synthetic_document(500);
    let catalog = ElementCatalog::fb2();
    let options = RepairOptions {
        catalog: Some(&catalog),
        ..RepairOptions::default()
    };

    c.bench_function("parse_and_repair", |b| {
        b.iter(|| {
            let mut book = FictionBook::parse(&source).unwrap();
            repair(&mut book, &options).unwrap();
            book
        });
    });
}

// ============================================================================
// Output Benchmarks
// ============================================================================

fn bench_serialize(c: &mut Criterion) {
    let source = synthetic_document(500);
    let mut book = FictionBook::parse(&source).unwrap();
    repair(&mut book, &RepairOptions::default()).unwrap();

    c.bench_function("serialize", |b| {
        b.iter(|| serialize(&book, "UTF-8", &WriterOptions::default()));
    });
}

fn bench_encode_windows_1251(c: &mut Criterion) {
    let source = synthetic_document(500);
    let mut book = FictionBook::parse(&source).unwrap();
    repair(&mut book, &RepairOptions::default()).unwrap();
    let plan = EncodingPlan::choose(Some(WINDOWS_1251), UTF_8, book.tree().text_len());

    c.bench_function("encode_windows_1251", |b| {
        b.iter(|| encode_document(&book, &plan, &WriterOptions::default()).unwrap());
    });
}

criterion_group!(
    benches,
    // Parse / repair
    bench_parse,
    bench_parse_and_repair,
    // Output
    bench_serialize,
    bench_encode_windows_1251,
);
criterion_main!(benches);
