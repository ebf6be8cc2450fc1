//! Compressed sinks: the decompressed stream must equal the raw framing.

use std::fs::{self, File};
use std::io::Read;

use recout::{InOptions, Lz4BlockSize, Out, OutOptions, RecordFormat, RecordInput};
use tempfile::TempDir;

fn collect(input: &mut RecordInput) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    while let Some(rec) = input.next().unwrap() {
        records.push(rec.bytes.to_vec());
    }
    records
}

// ─────────────────────────────────────────────────────────────────────────────
// LZ4 frame sink
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn lz4_sink_produces_standard_frame() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.lz4");

    let mut out = Out::create(&path, OutOptions::default()).unwrap();
    out.write_record(&[0x41u8; 1000]).unwrap();
    out.finish().unwrap();

    // A stock LZ4 frame decoder must recover the prefix-framed payload.
    let mut decoder = lz4::Decoder::new(File::open(&path).unwrap()).unwrap();
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).unwrap();

    let mut expected = 1000u32.to_le_bytes().to_vec();
    expected.extend_from_slice(&[0x41u8; 1000]);
    assert_eq!(decoded, expected);
}

#[test]
fn lz4_sink_with_checksums_and_large_blocks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.lz4");

    let opts = OutOptions::default().lz4(1, Lz4BlockSize::Kb256, true, true);
    let mut out = Out::create(&path, opts).unwrap();
    let mut expected = Vec::new();
    for i in 0..5000u32 {
        let rec = format!("record-{i:08}");
        out.write_record(rec.as_bytes()).unwrap();
        expected.push(rec.into_bytes());
    }
    out.finish().unwrap();

    let mut input = RecordInput::open(&path, InOptions::default()).unwrap();
    assert_eq!(collect(&mut input), expected);
}

#[test]
#[should_panic]
fn lz4_append_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.lz4");
    let _ = Out::create(&path, OutOptions::default().append_mode());
}

// ─────────────────────────────────────────────────────────────────────────────
// Gzip sink
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn gz_sink_produces_standard_stream() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.gz");

    let opts = OutOptions::default().format(RecordFormat::Delimited(b'\n'));
    let mut out = Out::create(&path, opts).unwrap();
    out.write_record(b"alpha").unwrap();
    out.write_record(b"beta").unwrap();
    out.finish().unwrap();

    let mut decoder = flate2::read::MultiGzDecoder::new(File::open(&path).unwrap());
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, b"alpha\nbeta\n");
}

#[test]
fn gz_append_adds_a_member() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.gz");

    let opts = OutOptions::default().format(RecordFormat::Delimited(b'\n'));
    let mut out = Out::create(&path, opts.clone()).unwrap();
    out.write_record(b"first").unwrap();
    out.finish().unwrap();

    let mut out = Out::create(&path, opts.clone().append_mode()).unwrap();
    out.write_record(b"second").unwrap();
    out.finish().unwrap();

    let in_opts = InOptions::default().format(RecordFormat::Delimited(b'\n'));
    let mut input = RecordInput::open(&path, in_opts).unwrap();
    assert_eq!(collect(&mut input), vec![b"first".to_vec(), b"second".to_vec()]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw append
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn raw_append_extends_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out");

    let mut out = Out::create(&path, OutOptions::default()).unwrap();
    out.write_record(b"one").unwrap();
    out.finish().unwrap();

    let mut out = Out::create(&path, OutOptions::default().append_mode()).unwrap();
    out.write_record(b"two").unwrap();
    out.finish().unwrap();

    let mut input = RecordInput::open(&path, InOptions::default()).unwrap();
    assert_eq!(collect(&mut input), vec![b"one".to_vec(), b"two".to_vec()]);
    assert!(fs::metadata(&path).unwrap().len() > 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Writer over an already-open file
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn writer_over_open_file_selects_codec_from_options() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("anonymous");

    let file = File::create(&path).unwrap();
    let mut out = Out::from_file(file, OutOptions::default().gz(6)).unwrap();
    out.write_record(b"payload").unwrap();
    // No filename: nothing to reopen.
    assert!(out.into_input().unwrap().is_none());

    let mut decoder = flate2::read::MultiGzDecoder::new(File::open(&path).unwrap());
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, &[0x07, 0x00, 0x00, 0x00, b'p', b'a', b'y', b'l', b'o', b'a', b'd']);
}
