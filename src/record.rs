//! The record view handed to callbacks and returned by inputs.

use std::cmp::Ordering;
use std::sync::Arc;

/// A borrowed view of one record.
///
/// `bytes` is the raw payload (framing is never included). `tag` is a
/// caller-assigned integer carried alongside the payload while records sit
/// in memory; once a record stream has been merged from several on-disk
/// runs, the tag of each record is the index of the run it came from.
#[derive(Clone, Copy, Debug)]
pub struct RecordView<'a> {
    pub bytes: &'a [u8],
    pub tag: i32,
}

/// Total order over records, used for sorting and merging.
pub type CompareFn = Arc<dyn Fn(&RecordView, &RecordView) -> Ordering + Send + Sync>;

/// Routes a record to one of `n` partitions; must return a value in
/// `[0, n)`.
pub type PartitionFn = Arc<dyn Fn(&RecordView, usize) -> usize + Send + Sync>;

/// Collapses a group of two or more records that compare equal into a
/// single replacement payload. The group is passed in merge order; the
/// result inherits the first record's tag.
pub type ReduceFn = Arc<dyn Fn(&[RecordView]) -> Vec<u8> + Send + Sync>;

/// In-memory record descriptor: where a buffered record's payload lives
/// inside its slab.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RecDesc {
    pub offset: usize,
    pub len: u32,
    pub tag: i32,
}
