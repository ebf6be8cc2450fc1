//! Record output writers.
//!
//! [`Out`] is the single handle for all three writer variants:
//!
//! - **normal** — one buffered (optionally compressed) file;
//! - **partitioned** — fans records out across N sibling writers;
//! - **sorted** — buffers, spills, and merges records into sorted output.
//!
//! [`Out::create`] always builds a normal writer; [`Out::create_ext`]
//! selects the variant from the extended options: a partition function
//! yields a partitioned writer (fanning out first unless
//! `sort_before_partitioning`), a comparator alone yields a sorted writer.
//!
//! Construction rejects invalid combinations by panicking — those are
//! programming errors, not runtime conditions: safe mode with append mode,
//! append into an LZ4 frame, and (for writers over an already-open file)
//! append, safe mode, or ack files, all of which need a filename.
//!
//! A writer must be consumed by [`Out::finish`], which flushes, publishes
//! (safe-mode rename, ack file), and releases every owned resource — or by
//! [`Out::into_input`], which instead reopens the produced records as a
//! [`RecordInput`] for the next pipeline stage. Ownership makes the
//! conversion single-shot: there is no second `into_input` to guard
//! against.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process;

use crate::format::RecordFormat;
use crate::input::{Cleanup, Extra, InOptions, RecordInput};
use crate::options::{ExtOptions, OutOptions};
use crate::path_util::{ack_name, safe_name};
use crate::sink::Sink;

pub(crate) mod partitioned;
pub(crate) mod sorted;

use partitioned::PartitionedOut;
use sorted::SortedOut;

pub(crate) enum OutKind {
    Normal(NormalOut),
    Partitioned(PartitionedOut),
    Sorted(SortedOut),
}

/// A record output writer.
pub struct Out {
    pub(crate) kind: OutKind,
}

fn unsupported(op: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{op} is only valid on a normal (unsorted, unpartitioned) writer"),
    )
}

pub(crate) fn poisoned() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "writer poisoned by an earlier failure",
    )
}

/// Escalates construction failures when `abort_on_error` is set.
fn guard<T>(r: io::Result<T>, opts: &OutOptions) -> io::Result<T> {
    if r.is_err() && opts.abort_on_error {
        process::abort();
    }
    r
}

impl Out {
    /// Creates a normal writer over `path`. The extension picks the sink:
    /// `.lz4`, `.gz`, or raw bytes.
    pub fn create<P: AsRef<Path>>(path: P, options: OutOptions) -> io::Result<Out> {
        let filename = path.as_ref().to_string_lossy().into_owned();
        assert!(
            !(options.safe_mode && options.append_mode),
            "safe mode and append mode are mutually exclusive"
        );
        let physical = if options.safe_mode {
            safe_name(&filename)
        } else {
            filename.clone()
        };
        let sink = guard(Sink::create(Some(&physical), None, &options), &options)?;
        Ok(Out {
            kind: OutKind::Normal(NormalOut {
                sink,
                filename: Some(filename),
                physical: Some(physical),
                options,
            }),
        })
    }

    /// Creates a normal writer over an already-open file. The `lz4`/`gz`
    /// options pick the sink; modes that need a filename (append, safe
    /// mode, ack file) are rejected.
    pub fn from_file(file: File, options: OutOptions) -> io::Result<Out> {
        assert!(!options.append_mode, "append mode requires a filename");
        assert!(
            !options.safe_mode && !options.write_ack_file,
            "safe mode and ack files require a filename"
        );
        let sink = guard(Sink::create(None, Some(file), &options), &options)?;
        Ok(Out {
            kind: OutKind::Normal(NormalOut {
                sink,
                filename: None,
                physical: None,
                options,
            }),
        })
    }

    /// Creates a writer with sorting/partitioning behavior per `ext`.
    pub fn create_ext<P: AsRef<Path>>(
        path: P,
        options: OutOptions,
        ext: ExtOptions,
    ) -> io::Result<Out> {
        let filename = path.as_ref().to_string_lossy().into_owned();
        let ext = ext.with_intermediate_defaults();
        Out::create_ext_inner(&filename, options, ext)
    }

    pub(crate) fn create_ext_inner(
        path: &str,
        options: OutOptions,
        ext: ExtOptions,
    ) -> io::Result<Out> {
        if ext.partition.is_some() && !ext.sort_before_partitioning {
            PartitionedOut::create(path, options, ext)
        } else if ext.compare.is_some() {
            Ok(Out {
                kind: OutKind::Sorted(SortedOut::create(path, options, ext)),
            })
        } else if ext.partition.is_some() {
            PartitionedOut::create(path, options, ext)
        } else {
            Out::create(path, options)
        }
    }

    /// Writes raw bytes, uninterpreted. Valid only on a normal writer; an
    /// empty slice is a no-op.
    pub fn write(&mut self, d: &[u8]) -> io::Result<()> {
        match &mut self.kind {
            OutKind::Normal(n) => n.write_bytes(d),
            _ => Err(unsupported("write")),
        }
    }

    /// Writes one record, framed per the configured format.
    pub fn write_record(&mut self, d: &[u8]) -> io::Result<()> {
        match &mut self.kind {
            OutKind::Normal(n) => n.write_record(d),
            OutKind::Partitioned(p) => p.write_record(d),
            OutKind::Sorted(s) => s.write_record(d),
        }
    }

    /// Writes one record with prefix framing regardless of the configured
    /// format. Valid only on a normal writer.
    pub fn write_prefixed(&mut self, d: &[u8]) -> io::Result<()> {
        match &mut self.kind {
            OutKind::Normal(n) => n.write_prefixed(d),
            _ => Err(unsupported("write_prefixed")),
        }
    }

    /// Writes one record with delimiter framing regardless of the
    /// configured format. Valid only on a normal writer.
    pub fn write_delimited(&mut self, d: &[u8], delim: u8) -> io::Result<()> {
        match &mut self.kind {
            OutKind::Normal(n) => n.write_delimited(d, delim),
            _ => Err(unsupported("write_delimited")),
        }
    }

    /// Sets the tag recorded with subsequently buffered records of a
    /// sorted writer. A no-op on other variants.
    pub fn set_tag(&mut self, tag: i32) {
        if let OutKind::Sorted(s) = &mut self.kind {
            s.set_tag(tag);
        }
    }

    /// Attaches an input to be closed when this sorted writer (or the
    /// input it turns into) is done. A no-op on other variants.
    pub fn add_input(&mut self, input: RecordInput) {
        if let OutKind::Sorted(s) = &mut self.kind {
            s.add_extra(Extra::Input(input));
        }
    }

    /// Attaches a file to unlink when this sorted writer (or the input it
    /// turns into) is done. A no-op on other variants.
    pub fn add_file_to_remove<P: AsRef<Path>>(&mut self, path: P) {
        if let OutKind::Sorted(s) = &mut self.kind {
            s.add_extra(Extra::FileToRemove(
                path.as_ref().to_string_lossy().into_owned(),
            ));
        }
    }

    /// Attaches an ack file to create (empty) when this sorted writer (or
    /// the input it turns into) is done. A no-op on other variants.
    pub fn add_ack_file<P: AsRef<Path>>(&mut self, path: P) {
        if let OutKind::Sorted(s) = &mut self.kind {
            s.add_extra(Extra::AckFile(
                path.as_ref().to_string_lossy().into_owned(),
            ));
        }
    }

    /// Finalizes the writer and reopens what it produced as a record
    /// input, so a pipeline can keep flowing without naming the file
    /// twice. The input owns the file's lifetime — for a normal writer
    /// the file is unlinked when the input is dropped, and for a sorted
    /// writer the input owns the spill runs (merging happens while
    /// reading, and no separate output file is materialized).
    ///
    /// Returns `None` when there is nothing to read back: a writer over a
    /// raw file handle, a sorted writer that never received a record, or a
    /// partitioned writer (its partitions are finalized exactly as by
    /// [`finish`](Self::finish)).
    pub fn into_input(self) -> io::Result<Option<RecordInput>> {
        match self.kind {
            OutKind::Normal(n) => n.into_input(),
            OutKind::Partitioned(p) => {
                p.finish()?;
                Ok(None)
            }
            OutKind::Sorted(mut s) => {
                let input = s.take_input();
                let cleanup = s.take_cleanup();
                match input {
                    Ok(Some(mut input)) => {
                        if let Some(cleanup) = cleanup {
                            input.set_cleanup(cleanup);
                        }
                        Ok(Some(input))
                    }
                    Ok(None) => Ok(None),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Flushes, publishes, and closes the writer. For a sorted writer this
    /// runs the final merge into the output file; for a partitioned writer
    /// it finalizes every partition (post-sorting them when configured).
    /// Temporary files are removed on success and failure alike.
    pub fn finish(self) -> io::Result<()> {
        match self.kind {
            OutKind::Normal(n) => n.finish(),
            OutKind::Partitioned(p) => p.finish(),
            OutKind::Sorted(s) => s.finish_inner(),
        }
    }
}

// ---------------------------------------------------------------------------
// NormalOut — one sink, framed record encoding
// ---------------------------------------------------------------------------

pub(crate) struct NormalOut {
    sink: Sink,
    filename: Option<String>,
    physical: Option<String>,
    options: OutOptions,
}

impl NormalOut {
    pub(crate) fn write_bytes(&mut self, d: &[u8]) -> io::Result<()> {
        if d.is_empty() {
            return Ok(());
        }
        self.sink.write(d)
    }

    pub(crate) fn write_record(&mut self, d: &[u8]) -> io::Result<()> {
        match self.options.format {
            RecordFormat::Prefix => self.write_prefixed(d),
            RecordFormat::Delimited(delim) | RecordFormat::Csv(delim) => {
                self.write_delimited(d, delim)
            }
            RecordFormat::Fixed(w) => {
                assert!(
                    d.len() == w as usize,
                    "fixed-width writer expects {w}-byte records, got {}",
                    d.len()
                );
                self.write_bytes(d)
            }
        }
    }

    pub(crate) fn write_prefixed(&mut self, d: &[u8]) -> io::Result<()> {
        if d.len() > u32::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record length exceeds the 32-bit framing limit",
            ));
        }
        let len = (d.len() as u32).to_le_bytes();
        self.sink.write(&len)?;
        self.write_bytes(d)
    }

    pub(crate) fn write_delimited(&mut self, d: &[u8], delim: u8) -> io::Result<()> {
        self.write_bytes(d)?;
        self.sink.write(&[delim])
    }

    fn close(&mut self) -> io::Result<()> {
        let r = self.sink.finish();
        if r.is_err() && self.options.abort_on_error {
            process::abort();
        }
        r
    }

    pub(crate) fn finish(mut self) -> io::Result<()> {
        self.close()?;
        if self.options.safe_mode {
            if let (Some(physical), Some(filename)) = (&self.physical, &self.filename) {
                fs::rename(physical, filename)?;
            }
        }
        if self.options.write_ack_file {
            if let Some(filename) = &self.filename {
                File::create(ack_name(filename))?;
            }
        }
        Ok(())
    }

    /// Closes the writer and reopens the produced file (the safe-mode
    /// staging file is read as staged; it is not published). The file is
    /// treated as transient: it is unlinked when the input is dropped.
    pub(crate) fn into_input(mut self) -> io::Result<Option<RecordInput>> {
        self.close()?;
        let physical = match self.physical.take() {
            Some(p) => p,
            None => return Ok(None),
        };
        let opts = InOptions::default()
            .buffer_size(self.options.buffer_size)
            .format(self.options.format);
        let mut input = RecordInput::open(&physical, opts)?;
        input.set_cleanup(Cleanup::new(None, vec![Extra::FileToRemove(physical)]));
        Ok(Some(input))
    }
}
