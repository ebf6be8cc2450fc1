//! Sorted output: in-memory run formation, spill, and k-way merge.
//!
//! Records accumulate in a contiguous sort buffer used from both ends:
//! descriptors grow up from the base while payload bytes (each followed by
//! a NUL so plain string comparators can run in place) grow down from the
//! top. When the cursors meet, the buffer is sorted by the intermediate
//! comparator and spilled as a prefix-framed run file. With
//! `use_extra_thread` two half-size buffers alternate: the producer fills
//! one while a background thread spills the other, exchanged under a join
//! barrier so the buffers are never shared.
//!
//! With a group size G, spills land in the group-run namespace; every G of
//! them are merged into one flat run, bounding the fan-in (and open file
//! descriptors) of the final merge. Finalization drains the tail of the
//! buffer, then either returns a zero-copy input over the in-memory
//! records (nothing ever spilled) or a k-way merging input over all runs.
//! Closing instead streams that merged input through a writer built from
//! the *remaining* extended options — which is how a sort-then-partition
//! pipeline hands the sorted stream to a partitioned writer.
//!
//! The writer owns its temp files and auxiliary resources until
//! finalization hands them to the returned input; either way they are
//! released exactly once, success or failure.

use std::io;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::input::merge::MergedInput;
use crate::input::{desc_view, Cleanup, Extra, FramedReader, InOptions, MemoryInput, Probe, RecordInput};
use crate::options::{ExtOptions, OutOptions};
use crate::out::{poisoned, Out};
use crate::path_util::{group_filename, run_filename, split_compression_suffix};
use crate::record::{CompareFn, RecDesc, RecordView, ReduceFn};

/// Write-buffer size for spill-run writers.
const SPILL_WRITE_BUFFER: usize = 10 * 1024 * 1024;

/// Per-record buffer overhead: the descriptor, the NUL terminator, and
/// slack for the run file's length prefix.
const RECORD_OVERHEAD: usize = mem::size_of::<RecDesc>() + 5;

// ---------------------------------------------------------------------------
// Sort buffer
// ---------------------------------------------------------------------------

pub(crate) struct SortBuffer {
    slab: Box<[u8]>,
    descs: Vec<RecDesc>,
    /// Payload cursor: record bytes occupy `slab[ep..]`.
    ep: usize,
}

impl SortBuffer {
    fn new(size: usize) -> SortBuffer {
        SortBuffer {
            slab: vec![0u8; size].into_boxed_slice(),
            descs: Vec::new(),
            ep: size,
        }
    }

    fn hollow() -> SortBuffer {
        SortBuffer {
            slab: Box::new([]),
            descs: Vec::new(),
            ep: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    fn fits(&self, len: usize) -> bool {
        self.descs.len() * mem::size_of::<RecDesc>() + len + RECORD_OVERHEAD <= self.ep
    }

    fn push(&mut self, bytes: &[u8], tag: i32) {
        let len = bytes.len();
        self.ep -= 1;
        self.slab[self.ep] = 0;
        self.ep -= len;
        self.slab[self.ep..self.ep + len].copy_from_slice(bytes);
        self.descs.push(RecDesc {
            offset: self.ep,
            len: len as u32,
            tag,
        });
    }

    fn clear(&mut self) {
        self.descs.clear();
        self.ep = self.slab.len();
    }

    fn sort_by(&mut self, compare: &CompareFn) {
        let SortBuffer { slab, descs, .. } = self;
        descs.sort_by(|a, b| compare(&desc_view(slab, a), &desc_view(slab, b)));
    }
}

// ---------------------------------------------------------------------------
// Run accounting and spill configuration
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default)]
struct RunCounters {
    num_written: usize,
    num_group_written: usize,
}

/// Everything a spill needs, shared with the background thread.
struct SpillCfg {
    stem: String,
    lz4_tmp: bool,
    num_per_group: usize,
    int_compare: CompareFn,
    int_reducer: Option<ReduceFn>,
    compare: CompareFn,
    reducer: Option<ReduceFn>,
}

fn tmp_out_options() -> OutOptions {
    OutOptions::default().buffer_size(SPILL_WRITE_BUFFER)
}

/// Claims the next run filename: the group namespace while grouping is
/// active, the flat namespace otherwise.
fn next_run_path(runs: &mut RunCounters, cfg: &SpillCfg, group_size: usize) -> String {
    if group_size > 0 {
        let path = group_filename(&cfg.stem, runs.num_group_written, cfg.lz4_tmp);
        runs.num_group_written += 1;
        path
    } else {
        let path = run_filename(&cfg.stem, runs.num_written, cfg.lz4_tmp);
        runs.num_written += 1;
        path
    }
}

/// Streams the (sorted) buffer to `out`, collapsing equal-record groups
/// through the intermediate reducer when one is configured.
fn stream_buffer(buf: &SortBuffer, cfg: &SpillCfg, out: &mut Out) -> io::Result<()> {
    let SortBuffer { slab, descs, .. } = buf;
    let mut i = 0;
    while i < descs.len() {
        if let Some(red) = &cfg.int_reducer {
            let mut j = i + 1;
            while j < descs.len()
                && (cfg.int_compare)(&desc_view(slab, &descs[i]), &desc_view(slab, &descs[j]))
                    == std::cmp::Ordering::Equal
            {
                j += 1;
            }
            if j - i > 1 {
                let views: Vec<RecordView> =
                    descs[i..j].iter().map(|d| desc_view(slab, d)).collect();
                let reduced = red(&views);
                out.write_record(&reduced)?;
            } else {
                out.write_record(desc_view(slab, &descs[i]).bytes)?;
            }
            i = j;
        } else {
            out.write_record(desc_view(slab, &descs[i]).bytes)?;
            i += 1;
        }
    }
    Ok(())
}

/// Sorts and writes one buffer as a run file, then merges the pending
/// group if it reached `group_size`.
fn spill_buffer(
    buf: &mut SortBuffer,
    runs: &mut RunCounters,
    cfg: &SpillCfg,
    group_size: usize,
) -> io::Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    buf.sort_by(&cfg.int_compare);
    let path = next_run_path(runs, cfg, group_size);
    let mut out = Out::create(&path, tmp_out_options())?;
    stream_buffer(buf, cfg, &mut out)?;
    out.finish()?;
    if group_size > 0 {
        check_for_merge(runs, cfg, group_size)?;
    }
    Ok(())
}

/// Merges the `num_group_written` group runs into one flat run using the
/// final comparator/reducer, then resets the group counter. Stale group
/// files are left for the close-time sweep; their ids are reused by the
/// next group.
fn check_for_merge(runs: &mut RunCounters, cfg: &SpillCfg, group_size: usize) -> io::Result<()> {
    if runs.num_group_written < group_size {
        return Ok(());
    }
    let out_path = run_filename(&cfg.stem, runs.num_written, cfg.lz4_tmp);
    runs.num_written += 1;
    let mut out = Out::create(&out_path, tmp_out_options())?;
    let mut children = Vec::with_capacity(runs.num_group_written);
    for i in 0..runs.num_group_written {
        children.push(FramedReader::open(
            &group_filename(&cfg.stem, i, cfg.lz4_tmp),
            InOptions::default(),
        )?);
    }
    let mut merged = MergedInput::new(children, cfg.compare.clone(), cfg.reducer.clone());
    while let Some(r) = merged.next()? {
        out.write_record(r.bytes)?;
    }
    out.finish()?;
    runs.num_group_written = 0;
    Ok(())
}

// ---------------------------------------------------------------------------
// SortedOut
// ---------------------------------------------------------------------------

pub(crate) struct SortedOut {
    stem: String,
    suffix: &'static str,
    options: OutOptions,
    /// Extended options minus the comparator: what the final output writer
    /// is built from (a surviving partition function partitions the sorted
    /// stream).
    partition_ext: ExtOptions,
    cfg: Arc<SpillCfg>,
    use_extra_thread: bool,
    num_per_group: usize,
    /// Size of one sort buffer (half the budget when double-buffered).
    sort_buffer_size: usize,
    front: SortBuffer,
    spare: Option<SortBuffer>,
    pending: Option<JoinHandle<(SortBuffer, RunCounters, io::Result<()>)>>,
    runs: RunCounters,
    tag: i32,
    cleanup: Option<Cleanup>,
    failed: bool,
}

impl SortedOut {
    pub(crate) fn create(path: &str, options: OutOptions, ext: ExtOptions) -> SortedOut {
        let (stem, suffix) = split_compression_suffix(path);
        let stem = stem.to_string();

        let compare = ext
            .compare
            .clone()
            .expect("sorted output requires a comparator");
        let int_compare = ext.int_compare.clone().unwrap_or_else(|| compare.clone());
        let cfg = Arc::new(SpillCfg {
            stem: stem.clone(),
            lz4_tmp: ext.lz4_tmp,
            num_per_group: ext.num_per_group,
            int_compare,
            int_reducer: ext.int_reducer.clone(),
            compare,
            reducer: ext.reducer.clone(),
        });

        let mut partition_ext = ext.clone();
        partition_ext.compare = None;

        let total = options.buffer_size;
        let (per_buffer, spare) = if ext.use_extra_thread {
            (total / 2, Some(SortBuffer::new(total / 2)))
        } else {
            (total, None)
        };

        SortedOut {
            cleanup: Some(Cleanup::new(
                Some(Probe {
                    stem: stem.clone(),
                    lz4_tmp: ext.lz4_tmp,
                }),
                Vec::new(),
            )),
            stem,
            suffix,
            options,
            partition_ext,
            cfg,
            use_extra_thread: ext.use_extra_thread,
            num_per_group: ext.num_per_group,
            sort_buffer_size: per_buffer,
            front: SortBuffer::new(per_buffer),
            spare,
            pending: None,
            runs: RunCounters::default(),
            tag: 0,
            failed: false,
        }
    }

    pub(crate) fn set_tag(&mut self, tag: i32) {
        self.tag = tag;
    }

    pub(crate) fn add_extra(&mut self, extra: Extra) {
        if let Some(cleanup) = &mut self.cleanup {
            cleanup.extras.push(extra);
        }
    }

    pub(crate) fn take_cleanup(&mut self) -> Option<Cleanup> {
        self.cleanup.take()
    }

    /// Joins the in-flight spill, reclaiming its buffer and the updated
    /// run counters.
    fn wait_on_thread(&mut self) -> io::Result<()> {
        if let Some(handle) = self.pending.take() {
            let (buf, runs, result) = handle.join().map_err(|_| {
                self.failed = true;
                io::Error::new(io::ErrorKind::Other, "spill thread panicked")
            })?;
            self.spare = Some(buf);
            self.runs = runs;
            if let Err(e) = result {
                self.failed = true;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Spills the front buffer: inline, or on a fresh background thread
    /// after swapping in the idle buffer.
    fn spill(&mut self) -> io::Result<()> {
        if self.front.is_empty() {
            return Ok(());
        }
        self.wait_on_thread()?;
        if self.use_extra_thread {
            let idle = self.spare.take().expect("idle sort buffer missing after join");
            let full = mem::replace(&mut self.front, idle);
            let cfg = Arc::clone(&self.cfg);
            let runs = self.runs;
            self.pending = Some(thread::spawn(move || {
                let mut buf = full;
                let mut runs = runs;
                let result = spill_buffer(&mut buf, &mut runs, &cfg, cfg.num_per_group);
                buf.clear();
                (buf, runs, result)
            }));
        } else {
            let cfg = Arc::clone(&self.cfg);
            let result = spill_buffer(&mut self.front, &mut self.runs, &cfg, self.num_per_group);
            self.front.clear();
            if let Err(e) = result {
                self.failed = true;
                return Err(e);
            }
        }
        Ok(())
    }

    /// A record too large for an empty sort buffer becomes its own
    /// single-record run, bypassing the buffer entirely.
    fn write_one_record(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.wait_on_thread()?;
        let cfg = Arc::clone(&self.cfg);
        let mut runs = self.runs;
        let result = (|| -> io::Result<()> {
            let path = next_run_path(&mut runs, &cfg, cfg.num_per_group);
            let mut out = Out::create(&path, tmp_out_options())?;
            out.write_record(bytes)?;
            out.finish()?;
            if cfg.num_per_group > 0 {
                check_for_merge(&mut runs, &cfg, cfg.num_per_group)?;
            }
            Ok(())
        })();
        self.runs = runs;
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    pub(crate) fn write_record(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.failed {
            return Err(poisoned());
        }
        if bytes.len() > u32::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record length exceeds the 32-bit framing limit",
            ));
        }
        if !self.front.fits(bytes.len()) {
            self.spill()?;
            if !self.front.fits(bytes.len()) {
                return self.write_one_record(bytes);
            }
        }
        self.front.push(bytes, self.tag);
        Ok(())
    }

    /// Drains everything into a single record stream: a zero-copy
    /// in-memory input when nothing ever spilled, otherwise a k-way merge
    /// over every flat run plus any unmerged group runs. `None` when no
    /// record was ever written.
    pub(crate) fn take_input(&mut self) -> io::Result<Option<RecordInput>> {
        if self.failed {
            return Err(poisoned());
        }
        self.wait_on_thread()?;

        if self.runs.num_written == 0 && self.runs.num_group_written == 0 {
            self.spare = None;
            let mut buf = mem::replace(&mut self.front, SortBuffer::hollow());
            if buf.is_empty() {
                return Ok(None);
            }
            buf.sort_by(&self.cfg.int_compare);
            let reduce = self
                .cfg
                .int_reducer
                .clone()
                .map(|r| (self.cfg.int_compare.clone(), r));
            let SortBuffer { slab, descs, .. } = buf;
            return Ok(Some(RecordInput::from_memory(MemoryInput::new(
                slab, descs, reduce,
            ))));
        }

        if !self.front.is_empty() {
            // Tail spill, inline. Clamp the group threshold to what is
            // pending so the final partial group still merges.
            let group_size = if self.num_per_group > 0 {
                self.runs.num_group_written.max(1)
            } else {
                0
            };
            let cfg = Arc::clone(&self.cfg);
            let result = spill_buffer(&mut self.front, &mut self.runs, &cfg, group_size);
            self.front.clear();
            if let Err(e) = result {
                self.failed = true;
                return Err(e);
            }
        }
        self.front = SortBuffer::hollow();
        self.spare = None;

        let per_input = (self.sort_buffer_size / 10).max(1);
        let in_opts = InOptions::default().buffer_size(per_input);
        let mut children =
            Vec::with_capacity(self.runs.num_written + self.runs.num_group_written);
        for i in 0..self.runs.num_written {
            children.push(FramedReader::open(
                &run_filename(&self.cfg.stem, i, self.cfg.lz4_tmp),
                in_opts,
            )?);
        }
        for i in 0..self.runs.num_group_written {
            children.push(FramedReader::open(
                &group_filename(&self.cfg.stem, i, self.cfg.lz4_tmp),
                in_opts,
            )?);
        }
        let merged = MergedInput::new(children, self.cfg.compare.clone(), self.cfg.reducer.clone());
        Ok(Some(RecordInput::from_merged(merged)))
    }

    /// Materializes the final output: streams the merged records through a
    /// writer over `<stem><suffix>` built from the remaining extended
    /// options, then sweeps temps, closes attached inputs, removes
    /// attached files, and touches ack files. Writing no records at all
    /// produces no output file.
    pub(crate) fn finish_inner(mut self) -> io::Result<()> {
        let input = self.take_input();
        let cleanup = self.take_cleanup();
        let input = match input {
            Ok(input) => input,
            Err(e) => {
                drop(cleanup);
                return Err(e);
            }
        };
        let result = match input {
            Some(mut input) => (|| -> io::Result<()> {
                let final_path = format!("{}{}", self.stem, self.suffix);
                let mut out = Out::create_ext_inner(
                    &final_path,
                    self.options.clone(),
                    self.partition_ext.clone(),
                )?;
                while let Some(r) = input.next()? {
                    out.write_record(r.bytes)?;
                }
                out.finish()
            })(),
            None => Ok(()),
        };
        drop(cleanup);
        result
    }
}

impl Drop for SortedOut {
    fn drop(&mut self) {
        // A still-running spill owns run files the cleanup sweep must see
        // completed (or not at all).
        if let Some(handle) = self.pending.take() {
            let _ = handle.join();
        }
        // `cleanup`, if not transferred, drops after this body and sweeps
        // the temp namespaces.
    }
}
