//! Partitioned output: fan-out across N sibling writers.
//!
//! Each record is routed by the partition function to one of N children.
//! With `sort_while_partitioning` (or when no comparator is configured)
//! every child writes its final `<base>_<i>` file directly. Otherwise the
//! children stream prefix-framed records into `<base>_unsorted_<i>`
//! files, and close launches a pool of sort workers that rewrite each
//! partition into its final sorted form before the unsorted files are
//! removed.
//!
//! Degenerate partition counts collapse to a simpler writer: 0 drops
//! partitioning entirely, 1 keeps only the `_0` filename convention.

use std::fs;
use std::io;

use crate::format::RecordFormat;
use crate::input::{InOptions, RecordInput};
use crate::options::{ExtOptions, OutOptions};
use crate::out::{Out, OutKind};
use crate::path_util::{partition_filename, unsorted_filename};
use crate::pool::{run_sort_workers, worker_count};
use crate::record::{PartitionFn, RecordView};

pub(crate) struct PartitionedOut {
    filename: String,
    options: OutOptions,
    ext: ExtOptions,
    part_options: OutOptions,
    part_ext: ExtOptions,
    children: Vec<Out>,
    partition: PartitionFn,
    unsorted: bool,
}

impl PartitionedOut {
    pub(crate) fn create(path: &str, options: OutOptions, ext: ExtOptions) -> io::Result<Out> {
        match ext.num_partitions {
            0 => {
                // No partitions requested: drop the partition function and
                // build whatever the remaining options call for.
                let mut ext = ext;
                ext.partition = None;
                Out::create_ext_inner(path, options, ext)
            }
            1 => {
                // A single partition still gets the `_0` suffix so
                // consumers can treat every partition count uniformly.
                let mut ext = ext;
                ext.partition = None;
                let name = partition_filename(path, 0);
                Out::create_ext_inner(&name, options, ext)
            }
            n => {
                let partition = ext
                    .partition
                    .clone()
                    .expect("partitioned output requires a partition function");

                let mut part_options = options.clone();
                part_options.buffer_size = options.buffer_size / n;
                let mut part_ext = ext.clone();
                part_ext.partition = None;

                let sorted_inline = ext.sort_while_partitioning || ext.compare.is_none();
                if !sorted_inline {
                    // Unsorted spill files must be re-readable, so force
                    // prefix framing; the user format is restored when the
                    // sort workers write the final files.
                    part_options.format = RecordFormat::Prefix;
                    part_options.write_ack_file = false;
                }

                let mut children = Vec::with_capacity(n);
                for i in 0..n {
                    let child = if sorted_inline {
                        Out::create_ext_inner(
                            &partition_filename(path, i),
                            part_options.clone(),
                            part_ext.clone(),
                        )?
                    } else {
                        Out::create(
                            unsorted_filename(path, i, ext.lz4_tmp),
                            part_options.clone(),
                        )?
                    };
                    children.push(child);
                }

                Ok(Out {
                    kind: OutKind::Partitioned(PartitionedOut {
                        filename: path.to_string(),
                        options,
                        ext,
                        part_options,
                        part_ext,
                        children,
                        partition,
                        unsorted: !sorted_inline,
                    }),
                })
            }
        }
    }

    pub(crate) fn write_record(&mut self, bytes: &[u8]) -> io::Result<()> {
        let view = RecordView { bytes, tag: 0 };
        let n = self.children.len();
        let idx = (self.partition)(&view, n);
        if idx >= n {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("partition function returned {idx} for {n} partitions"),
            ));
        }
        self.children[idx].write_record(bytes)
    }

    pub(crate) fn finish(mut self) -> io::Result<()> {
        let mut first_err: Option<io::Error> = None;
        for child in self.children.drain(..) {
            if let Err(e) = child.finish() {
                first_err.get_or_insert(e);
            }
        }

        if self.unsorted {
            let n = self.ext.num_partitions;
            let workers = worker_count(self.ext.num_sort_threads, n);

            // Split the parent buffer across workers, half for the input
            // side and half for the output side of each.
            let buffer_size = (self.options.buffer_size / (workers * 2)).max(1);
            let mut out_options = self.part_options.clone();
            out_options.buffer_size = buffer_size;
            out_options.format = self.options.format;
            let mut out_ext = self.part_ext.clone();
            out_ext.use_extra_thread = false;
            let in_opts = InOptions::default()
                .buffer_size(buffer_size)
                .format(RecordFormat::Prefix);

            let filename = &self.filename;
            let lz4_tmp = self.ext.lz4_tmp;
            let result = run_sort_workers(workers, n, |i| {
                sort_one_partition(
                    filename,
                    i,
                    lz4_tmp,
                    in_opts,
                    out_options.clone(),
                    out_ext.clone(),
                )
            });

            for i in 0..n {
                let _ = fs::remove_file(unsorted_filename(filename, i, lz4_tmp));
            }
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// One sort-worker task: stream partition `i`'s unsorted spill file
/// through a sorted writer over the final partition name.
fn sort_one_partition(
    filename: &str,
    i: usize,
    lz4_tmp: bool,
    in_opts: InOptions,
    out_options: OutOptions,
    out_ext: ExtOptions,
) -> io::Result<()> {
    let mut input = RecordInput::open(unsorted_filename(filename, i, lz4_tmp), in_opts)?;
    let mut out = Out::create_ext_inner(&partition_filename(filename, i), out_options, out_ext)?;
    while let Some(r) = input.next()? {
        out.write_record(r.bytes)?;
    }
    out.finish()
}
