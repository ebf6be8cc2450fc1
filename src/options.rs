//! Writer configuration.
//!
//! [`OutOptions`] configures a single output file: buffering, framing,
//! compression, and publication behavior. [`ExtOptions`] adds the sorting
//! and partitioning controls. Both are plain value types with chainable
//! setters and sensible defaults:
//!
//! ```
//! use recout::{ExtOptions, OutOptions, RecordFormat};
//!
//! let opts = OutOptions::default()
//!     .buffer_size(1 << 20)
//!     .format(RecordFormat::Delimited(b'\n'))
//!     .safe_mode();
//! let ext = ExtOptions::default()
//!     .compare(|a, b| a.bytes.cmp(b.bytes))
//!     .use_extra_thread();
//! # let _ = (opts, ext);
//! ```

use std::cmp::Ordering;
use std::sync::Arc;

use crate::format::RecordFormat;
use crate::record::{CompareFn, PartitionFn, RecordView, ReduceFn};

/// Default primary buffer size (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// LZ4 frame block sizes supported by the codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lz4BlockSize {
    Kb64,
    Kb256,
    Mb1,
    Mb4,
}

impl Default for Lz4BlockSize {
    fn default() -> Self {
        Lz4BlockSize::Kb64
    }
}

impl Lz4BlockSize {
    /// Uncompressed size of one block.
    pub fn bytes(self) -> usize {
        match self {
            Lz4BlockSize::Kb64 => 64 * 1024,
            Lz4BlockSize::Kb256 => 256 * 1024,
            Lz4BlockSize::Mb1 => 1024 * 1024,
            Lz4BlockSize::Mb4 => 4 * 1024 * 1024,
        }
    }

    pub(crate) fn to_codec(self) -> lz4::liblz4::BlockSize {
        match self {
            Lz4BlockSize::Kb64 => lz4::liblz4::BlockSize::Max64KB,
            Lz4BlockSize::Kb256 => lz4::liblz4::BlockSize::Max256KB,
            Lz4BlockSize::Mb1 => lz4::liblz4::BlockSize::Max1MB,
            Lz4BlockSize::Mb4 => lz4::liblz4::BlockSize::Max4MB,
        }
    }
}

/// Options for a single output.
#[derive(Clone, Debug)]
pub struct OutOptions {
    pub(crate) buffer_size: usize,
    pub(crate) append_mode: bool,
    pub(crate) safe_mode: bool,
    pub(crate) write_ack_file: bool,
    pub(crate) abort_on_error: bool,
    pub(crate) format: RecordFormat,
    pub(crate) gz: bool,
    pub(crate) lz4: bool,
    pub(crate) level: u32,
    pub(crate) block_size: Lz4BlockSize,
    pub(crate) block_checksum: bool,
    pub(crate) content_checksum: bool,
}

impl Default for OutOptions {
    fn default() -> Self {
        OutOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
            append_mode: false,
            safe_mode: false,
            write_ack_file: false,
            abort_on_error: false,
            format: RecordFormat::Prefix,
            gz: false,
            lz4: false,
            level: 1,
            block_size: Lz4BlockSize::default(),
            block_checksum: false,
            content_checksum: false,
        }
    }
}

impl OutOptions {
    /// Size of the in-memory write buffer (default 64 KiB). Sorted outputs
    /// use this as the total sort-buffer budget.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Record framing for the final output (default prefix).
    pub fn format(mut self, format: RecordFormat) -> Self {
        self.format = format;
        self
    }

    /// Escalate the first write failure to `std::process::abort`.
    pub fn abort_on_error(mut self) -> Self {
        self.abort_on_error = true;
        self
    }

    /// Append to the output instead of truncating it. Incompatible with
    /// safe mode and with LZ4 outputs.
    pub fn append_mode(mut self) -> Self {
        self.append_mode = true;
        self
    }

    /// Write to `<name>-safe` and rename to `<name>` on successful close,
    /// so the final name only ever refers to complete output.
    pub fn safe_mode(mut self) -> Self {
        self.safe_mode = true;
        self
    }

    /// Create an empty `<name>.ack` after the output is fully published.
    pub fn write_ack_file(mut self) -> Self {
        self.write_ack_file = true;
        self
    }

    /// Compress with gzip at the given level (0-9). Only consulted when
    /// the output has no filename; a `.gz` filename selects gzip on its
    /// own, using the level set here.
    pub fn gz(mut self, level: u32) -> Self {
        self.gz = true;
        self.level = level;
        self
    }

    /// Compress with the LZ4 frame format. Only consulted when the output
    /// has no filename; a `.lz4` filename selects LZ4 on its own, using
    /// the parameters set here.
    pub fn lz4(
        mut self,
        level: u32,
        block_size: Lz4BlockSize,
        block_checksum: bool,
        content_checksum: bool,
    ) -> Self {
        self.lz4 = true;
        self.level = level;
        self.block_size = block_size;
        self.block_checksum = block_checksum;
        self.content_checksum = content_checksum;
        self
    }
}

/// Sorting and partitioning options, layered on top of [`OutOptions`] by
/// [`Out::create_ext`](crate::Out::create_ext).
#[derive(Clone)]
pub struct ExtOptions {
    pub(crate) partition: Option<PartitionFn>,
    pub(crate) num_partitions: usize,
    pub(crate) compare: Option<CompareFn>,
    pub(crate) reducer: Option<ReduceFn>,
    pub(crate) int_compare: Option<CompareFn>,
    pub(crate) int_reducer: Option<ReduceFn>,
    pub(crate) num_per_group: usize,
    pub(crate) num_sort_threads: usize,
    pub(crate) use_extra_thread: bool,
    pub(crate) sort_before_partitioning: bool,
    pub(crate) sort_while_partitioning: bool,
    pub(crate) lz4_tmp: bool,
}

impl Default for ExtOptions {
    fn default() -> Self {
        ExtOptions {
            partition: None,
            num_partitions: 0,
            compare: None,
            reducer: None,
            int_compare: None,
            int_reducer: None,
            num_per_group: 0,
            num_sort_threads: 0,
            use_extra_thread: false,
            sort_before_partitioning: false,
            sort_while_partitioning: false,
            lz4_tmp: true,
        }
    }
}

impl ExtOptions {
    /// Route records across `num_partitions` sibling outputs with `f`.
    pub fn partition<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordView, usize) -> usize + Send + Sync + 'static,
    {
        self.partition = Some(Arc::new(f));
        self
    }

    /// Number of partitions fanned out to. 0 disables partitioning; 1
    /// produces a single `_0`-suffixed output.
    pub fn num_partitions(mut self, num_partitions: usize) -> Self {
        self.num_partitions = num_partitions;
        self
    }

    /// Sort the output with this comparator.
    pub fn compare<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordView, &RecordView) -> Ordering + Send + Sync + 'static,
    {
        self.compare = Some(Arc::new(f));
        self
    }

    /// Collapse groups of equal records in the final output with `f`.
    pub fn reducer<F>(mut self, f: F) -> Self
    where
        F: Fn(&[RecordView]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.reducer = Some(Arc::new(f));
        self
    }

    /// Comparator for intermediate spill runs; defaults to the final
    /// comparator.
    pub fn intermediate_compare<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordView, &RecordView) -> Ordering + Send + Sync + 'static,
    {
        self.int_compare = Some(Arc::new(f));
        self
    }

    /// Reducer for intermediate spill runs; defaults to the final reducer.
    pub fn intermediate_reducer<F>(mut self, f: F) -> Self
    where
        F: Fn(&[RecordView]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.int_reducer = Some(Arc::new(f));
        self
    }

    /// Merge every `num_per_group` spill runs into one larger run, bounding
    /// the fan-in (and open file descriptors) of the final merge. 0
    /// disables grouping.
    pub fn intermediate_group_size(mut self, num_per_group: usize) -> Self {
        self.num_per_group = num_per_group;
        self
    }

    /// Worker threads for the post-close sort of unsorted partitions.
    /// 0 selects one thread per available CPU; either way the count is
    /// clamped to the number of partitions.
    pub fn num_sort_threads(mut self, num_sort_threads: usize) -> Self {
        self.num_sort_threads = num_sort_threads;
        self
    }

    /// Pipeline sorting: split the sort buffer in two and spill one half
    /// on a background thread while the producer fills the other.
    pub fn use_extra_thread(mut self) -> Self {
        self.use_extra_thread = true;
        self
    }

    /// Sort the whole stream first, then partition the sorted stream.
    pub fn sort_before_partitioning(mut self) -> Self {
        self.sort_before_partitioning = true;
        self
    }

    /// Sort each partition as it is written instead of post-sorting the
    /// partition files on close.
    pub fn sort_while_partitioning(mut self) -> Self {
        self.sort_while_partitioning = true;
        self
    }

    /// Keep spill files uncompressed. By default they are LZ4-compressed.
    pub fn dont_compress_tmp(mut self) -> Self {
        self.lz4_tmp = false;
        self
    }

    /// Copies with the intermediate comparator/reducer defaulted from the
    /// final ones.
    pub(crate) fn with_intermediate_defaults(mut self) -> Self {
        if self.int_compare.is_none() {
            self.int_compare = self.compare.clone();
        }
        if self.int_reducer.is_none() {
            self.int_reducer = self.reducer.clone();
        }
        self
    }
}
