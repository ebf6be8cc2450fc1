//! `recout` — a record-oriented output engine.
//!
//! A producer hands the engine an unbounded stream of variable-length byte
//! records; the engine buffers them, optionally compresses them (gzip or
//! LZ4 frame), and — when asked — externally sorts and/or partitions the
//! stream before materializing the result. A finished output can be handed
//! straight back as a [`RecordInput`] so pipeline stages compose without
//! reopening files by name.
//!
//! ```no_run
//! use recout::{ExtOptions, Out, OutOptions};
//!
//! fn main() -> std::io::Result<()> {
//!     let ext = ExtOptions::default()
//!         .compare(|a, b| a.bytes.cmp(b.bytes))
//!         .use_extra_thread();
//!     let mut out = Out::create_ext("keys.lz4", OutOptions::default(), ext)?;
//!     out.write_record(b"delta")?;
//!     out.write_record(b"alpha")?;
//!
//!     let mut sorted = out.into_input()?.expect("records were written");
//!     while let Some(rec) = sorted.next()? {
//!         println!("{}", String::from_utf8_lossy(rec.bytes));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Sorting and partitioning compose: a sorted output with a partition
//! function partitions the sorted stream (`sort_before_partitioning`), a
//! partitioned output with a comparator sorts each partition — inline
//! (`sort_while_partitioning`) or with a pool of post-close sort workers.

pub mod display;
pub mod format;
pub mod input;
pub mod options;
pub mod out;
pub mod path_util;
pub mod record;

mod pool;
mod sink;

// ── Primary API ──────────────────────────────────────────────────────────────

/// The writer handle for all output variants.
pub use out::Out;

/// Per-output options: buffering, framing, compression, publication.
pub use options::OutOptions;

/// Sorting and partitioning options.
pub use options::ExtOptions;

/// LZ4 frame block sizes.
pub use options::Lz4BlockSize;

/// Record framing formats.
pub use format::RecordFormat;

/// Borrowed view of one record.
pub use record::RecordView;

/// Callback signatures for comparators, partitioners, and reducers.
pub use record::{CompareFn, PartitionFn, ReduceFn};

// ── Input side ───────────────────────────────────────────────────────────────

/// A stream of records read back from an output (or an opened file).
pub use input::RecordInput;

/// Options for opening a record input.
pub use input::InOptions;

// ── Support ──────────────────────────────────────────────────────────────────

/// Global stderr-diagnostic verbosity.
pub use display::set_notification_level;

/// Name of partition `id` of a partitioned output.
pub use path_util::partition_filename;
