//! Partitioned outputs: routing, per-partition sorting, degenerate counts.

use std::fs;
use std::path::Path;

use recout::{partition_filename, ExtOptions, InOptions, Out, OutOptions, RecordInput};
use tempfile::TempDir;

fn collect(input: &mut RecordInput) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    while let Some(rec) = input.next().unwrap() {
        records.push(rec.bytes.to_vec());
    }
    records
}

fn read_partition(base: &Path, i: usize) -> Vec<Vec<u8>> {
    let name = partition_filename(&base.to_string_lossy(), i);
    let mut input = RecordInput::open(&name, InOptions::default()).unwrap();
    collect(&mut input)
}

fn leftover_temps(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains("_tmp") || n.contains("_gtmp") || n.contains("_unsorted_"))
        .collect()
}

const RECORDS: [&[u8]; 10] = [
    b"a", b"bb", b"ccc", b"dddd", b"e", b"ff", b"ggg", b"hhhh", b"i", b"jj",
];

fn by_len_mod(n: usize) -> ExtOptions {
    ExtOptions::default()
        .partition(|rec, parts| rec.bytes.len() % parts)
        .num_partitions(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Post-close sorted partitions (worker pool)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn partition_then_sort_with_workers() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let ext = by_len_mod(4)
        .compare(|a, b| a.bytes.cmp(b.bytes))
        .num_sort_threads(2);
    let mut out = Out::create_ext(&base, OutOptions::default(), ext).unwrap();
    for rec in RECORDS {
        out.write_record(rec).unwrap();
    }
    out.finish().unwrap();

    let mut seen = Vec::new();
    for i in 0..4 {
        let part = read_partition(&base, i);
        assert!(
            part.iter().all(|r| r.len() % 4 == i),
            "partition {i} contains only its own records"
        );
        assert!(part.windows(2).all(|w| w[0] <= w[1]), "partition {i} is sorted");
        seen.extend(part);
    }
    seen.sort();
    let mut expected: Vec<Vec<u8>> = RECORDS.iter().map(|r| r.to_vec()).collect();
    expected.sort();
    assert_eq!(seen, expected, "partitions cover exactly the input");

    assert!(leftover_temps(dir.path()).is_empty(), "unsorted spills are removed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Inline sorting while partitioning
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sort_while_partitioning_writes_final_files_directly() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let ext = by_len_mod(3)
        .compare(|a, b| a.bytes.cmp(b.bytes))
        .sort_while_partitioning();
    let mut out = Out::create_ext(&base, OutOptions::default(), ext).unwrap();
    for rec in RECORDS {
        out.write_record(rec).unwrap();
    }
    out.finish().unwrap();

    let mut total = 0;
    for i in 0..3 {
        let part = read_partition(&base, i);
        assert!(part.iter().all(|r| r.len() % 3 == i));
        assert!(part.windows(2).all(|w| w[0] <= w[1]));
        total += part.len();
    }
    assert_eq!(total, RECORDS.len());
    assert!(leftover_temps(dir.path()).is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Unsorted partitioning
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn plain_partitioning_preserves_arrival_order() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let mut out = Out::create_ext(&base, OutOptions::default(), by_len_mod(2)).unwrap();
    for rec in RECORDS {
        out.write_record(rec).unwrap();
    }
    out.finish().unwrap();

    for i in 0..2 {
        let part = read_partition(&base, i);
        let expected: Vec<Vec<u8>> = RECORDS
            .iter()
            .filter(|r| r.len() % 2 == i)
            .map(|r| r.to_vec())
            .collect();
        assert_eq!(part, expected, "partition {i} keeps production order");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sort first, then partition the sorted stream
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sort_before_partitioning_partitions_sorted_stream() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let opts = OutOptions::default().buffer_size(8 * 1024);
    let ext = by_len_mod(2)
        .compare(|a, b| a.bytes.cmp(b.bytes))
        .sort_before_partitioning();
    let mut out = Out::create_ext(&base, opts, ext).unwrap();
    // Enough records to force spills ahead of the final partition pass.
    let mut expected = Vec::new();
    for i in (0..2_000u32).rev() {
        let rec = format!("{i:06}{}", "x".repeat((i % 5) as usize)).into_bytes();
        expected.push(rec.clone());
        out.write_record(&rec).unwrap();
    }
    out.finish().unwrap();
    expected.sort();

    let mut seen = Vec::new();
    for i in 0..2 {
        let part = read_partition(&base, i);
        assert!(part.iter().all(|r| r.len() % 2 == i));
        assert!(
            part.windows(2).all(|w| w[0] <= w[1]),
            "a partition of a sorted stream is sorted"
        );
        seen.extend(part);
    }
    seen.sort();
    assert_eq!(seen, expected);
    assert!(leftover_temps(dir.path()).is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Degenerate partition counts and routing failures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn zero_partitions_degrades_to_plain_writer() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let ext = ExtOptions::default()
        .partition(|rec, n| rec.bytes.len() % n)
        .num_partitions(0);
    let mut out = Out::create_ext(&base, OutOptions::default(), ext).unwrap();
    out.write_record(b"solo").unwrap();
    out.finish().unwrap();

    assert!(base.exists(), "no suffix without partitioning");
}

#[test]
fn one_partition_keeps_the_suffix_convention() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let ext = ExtOptions::default()
        .partition(|rec, n| rec.bytes.len() % n)
        .num_partitions(1);
    let mut out = Out::create_ext(&base, OutOptions::default(), ext).unwrap();
    out.write_record(b"solo").unwrap();
    out.finish().unwrap();

    assert!(dir.path().join("out_0").exists());
    assert!(!base.exists());
}

#[test]
fn out_of_range_partition_fails_the_record_only() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let ext = ExtOptions::default()
        .partition(|rec, _| if rec.bytes == b"bad" { 99 } else { 0 })
        .num_partitions(2);
    let mut out = Out::create_ext(&base, OutOptions::default(), ext).unwrap();
    out.write_record(b"ok-1").unwrap();
    assert!(out.write_record(b"bad").is_err());
    out.write_record(b"ok-2").unwrap();
    out.finish().unwrap();

    assert_eq!(
        read_partition(&base, 0),
        vec![b"ok-1".to_vec(), b"ok-2".to_vec()],
        "rejected record does not disturb the others"
    );
}

#[test]
fn partitioned_writer_yields_no_input() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("out");

    let mut out = Out::create_ext(&base, OutOptions::default(), by_len_mod(2)).unwrap();
    for rec in RECORDS {
        out.write_record(rec).unwrap();
    }
    // Conversion still finalizes the partitions.
    assert!(out.into_input().unwrap().is_none());
    assert!(dir.path().join("out_0").exists());
    assert!(dir.path().join("out_1").exists());
}
