//! Record input streams.
//!
//! The read-side counterpart the output engine needs to compose pipelines:
//! spill runs are read back during merges, finished outputs can be handed
//! to the next stage without reopening, and partition files are re-read by
//! the post-close sort workers.
//!
//! A [`RecordInput`] is one of:
//!
//! - a framed reader over a file (raw, gzip, or LZ4, decided by
//!   extension), unframing records per [`RecordFormat`];
//! - an in-memory input over a sorted record slab;
//! - a k-way merge over several framed readers (see [`merge`]).
//!
//! An input may also own cleanup obligations — files to unlink, ack files
//! to touch, other inputs to close — which run when it is dropped, so a
//! consumed pipeline stage leaves nothing behind.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::format::RecordFormat;
use crate::options::DEFAULT_BUFFER_SIZE;
use crate::path_util::{group_filename, has_extension, run_filename};
use crate::record::{CompareFn, RecDesc, RecordView, ReduceFn};

pub(crate) mod merge;

use merge::MergedInput;

/// Options for opening a record input.
#[derive(Clone, Copy, Debug)]
pub struct InOptions {
    pub(crate) buffer_size: usize,
    pub(crate) format: RecordFormat,
}

impl Default for InOptions {
    fn default() -> Self {
        InOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
            format: RecordFormat::Prefix,
        }
    }
}

impl InOptions {
    /// Read-buffer size (default 64 KiB).
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Record framing to expect (default prefix).
    pub fn format(mut self, format: RecordFormat) -> Self {
        self.format = format;
        self
    }
}

// ---------------------------------------------------------------------------
// Byte-level helpers
// ---------------------------------------------------------------------------

/// Reads as many bytes as possible into `buf`, stopping early only at end
/// of stream. Returns the number of bytes read.
fn read_full_or_eof<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

fn truncated(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("truncated {what}"))
}

// ---------------------------------------------------------------------------
// FramedReader — one file, unframed record by record
// ---------------------------------------------------------------------------

pub(crate) struct FramedReader {
    rdr: Box<dyn BufRead + Send>,
    format: RecordFormat,
    rec: Vec<u8>,
    tag: i32,
    eof: bool,
}

impl FramedReader {
    pub(crate) fn open(path: &str, opts: InOptions) -> io::Result<FramedReader> {
        let file = File::open(path)?;
        let cap = opts.buffer_size.max(1);
        let rdr: Box<dyn BufRead + Send> = if has_extension(path, "lz4") {
            let dec = lz4::Decoder::new(BufReader::new(file))?;
            Box::new(BufReader::with_capacity(cap, dec))
        } else if has_extension(path, "gz") {
            let dec = MultiGzDecoder::new(BufReader::new(file));
            Box::new(BufReader::with_capacity(cap, dec))
        } else {
            Box::new(BufReader::with_capacity(cap, file))
        };
        Ok(FramedReader {
            rdr,
            format: opts.format,
            rec: Vec::new(),
            tag: 0,
            eof: false,
        })
    }

    /// Reads the next record into the internal buffer. Returns `false` at
    /// end of stream.
    pub(crate) fn advance(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        match self.format {
            RecordFormat::Prefix => {
                let mut len_buf = [0u8; 4];
                match read_full_or_eof(&mut self.rdr, &mut len_buf)? {
                    0 => {
                        self.eof = true;
                        return Ok(false);
                    }
                    4 => {}
                    _ => return Err(truncated("record length prefix")),
                }
                let len = u32::from_le_bytes(len_buf) as usize;
                self.rec.resize(len, 0);
                if read_full_or_eof(&mut self.rdr, &mut self.rec)? != len {
                    return Err(truncated("record payload"));
                }
            }
            RecordFormat::Delimited(d) | RecordFormat::Csv(d) => {
                self.rec.clear();
                if self.rdr.read_until(d, &mut self.rec)? == 0 {
                    self.eof = true;
                    return Ok(false);
                }
                if self.rec.last() == Some(&d) {
                    self.rec.pop();
                }
            }
            RecordFormat::Fixed(w) => {
                let w = w as usize;
                self.rec.resize(w, 0);
                match read_full_or_eof(&mut self.rdr, &mut self.rec)? {
                    0 => {
                        self.eof = true;
                        return Ok(false);
                    }
                    n if n == w => {}
                    _ => return Err(truncated("fixed-width record")),
                }
            }
        }
        Ok(true)
    }

    pub(crate) fn current(&self) -> RecordView<'_> {
        RecordView {
            bytes: &self.rec,
            tag: self.tag,
        }
    }

    pub(crate) fn set_tag(&mut self, tag: i32) {
        self.tag = tag;
    }
}

// ---------------------------------------------------------------------------
// MemoryInput — sorted in-memory records, optionally reduced
// ---------------------------------------------------------------------------

enum Cur {
    None,
    Desc(usize),
    Scratch(i32),
}

pub(crate) struct MemoryInput {
    slab: Box<[u8]>,
    descs: Vec<RecDesc>,
    pos: usize,
    reduce: Option<(CompareFn, ReduceFn)>,
    scratch: Vec<u8>,
    cur: Cur,
}

pub(crate) fn desc_view<'a>(slab: &'a [u8], d: &RecDesc) -> RecordView<'a> {
    RecordView {
        bytes: &slab[d.offset..d.offset + d.len as usize],
        tag: d.tag,
    }
}

impl MemoryInput {
    /// `descs` must already be in output order (sorted by the caller).
    pub(crate) fn new(
        slab: Box<[u8]>,
        descs: Vec<RecDesc>,
        reduce: Option<(CompareFn, ReduceFn)>,
    ) -> MemoryInput {
        MemoryInput {
            slab,
            descs,
            pos: 0,
            reduce,
            scratch: Vec::new(),
            cur: Cur::None,
        }
    }

    pub(crate) fn advance(&mut self) -> bool {
        let MemoryInput {
            slab,
            descs,
            pos,
            reduce,
            scratch,
            cur,
        } = self;
        let i = *pos;
        if i >= descs.len() {
            *cur = Cur::None;
            return false;
        }
        if let Some((cmp, red)) = reduce {
            let mut j = i + 1;
            while j < descs.len()
                && cmp(&desc_view(slab, &descs[i]), &desc_view(slab, &descs[j]))
                    == std::cmp::Ordering::Equal
            {
                j += 1;
            }
            if j - i > 1 {
                let views: Vec<RecordView> = descs[i..j].iter().map(|d| desc_view(slab, d)).collect();
                let reduced = red(&views);
                drop(views);
                *scratch = reduced;
                *cur = Cur::Scratch(descs[i].tag);
                *pos = j;
                return true;
            }
        }
        *cur = Cur::Desc(i);
        *pos = i + 1;
        true
    }

    pub(crate) fn current(&self) -> RecordView<'_> {
        match self.cur {
            Cur::Desc(i) => desc_view(&self.slab, &self.descs[i]),
            Cur::Scratch(tag) => RecordView {
                bytes: &self.scratch,
                tag,
            },
            Cur::None => RecordView { bytes: &[], tag: 0 },
        }
    }
}

// ---------------------------------------------------------------------------
// Cleanup — obligations owned by an input (or a writer being torn down)
// ---------------------------------------------------------------------------

pub(crate) enum Extra {
    /// An input to close (dropped) during cleanup.
    Input(RecordInput),
    /// A file to unlink during cleanup.
    FileToRemove(String),
    /// An empty marker file to create during cleanup.
    AckFile(String),
}

/// Temp-run namespaces to sweep: `<stem>_<i>_tmp[.lz4]` and
/// `<stem>_<i>_gtmp[.lz4]`, probing ids upward until four consecutive
/// misses.
pub(crate) struct Probe {
    pub stem: String,
    pub lz4_tmp: bool,
}

pub(crate) struct Cleanup {
    pub probe: Option<Probe>,
    pub extras: Vec<Extra>,
}

impl Cleanup {
    pub(crate) fn new(probe: Option<Probe>, extras: Vec<Extra>) -> Cleanup {
        Cleanup { probe, extras }
    }
}

fn probe_remove(name: impl Fn(usize) -> String) {
    let mut misses = 0;
    let mut id = 0;
    while misses < 4 {
        let path = name(id);
        if Path::new(&path).exists() {
            let _ = fs::remove_file(&path);
            misses = 0;
        } else {
            misses += 1;
        }
        id += 1;
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if let Some(probe) = self.probe.take() {
            probe_remove(|id| run_filename(&probe.stem, id, probe.lz4_tmp));
            probe_remove(|id| group_filename(&probe.stem, id, probe.lz4_tmp));
        }
        // Close attached inputs before unlinking, then touch acks last so
        // a marker never precedes the state it acknowledges.
        self.extras.retain(|e| !matches!(e, Extra::Input(_)));
        for extra in &self.extras {
            if let Extra::FileToRemove(path) = extra {
                let _ = fs::remove_file(path);
            }
        }
        for extra in &self.extras {
            if let Extra::AckFile(path) = extra {
                let _ = File::create(path);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RecordInput — the public record stream
// ---------------------------------------------------------------------------

enum InputKind {
    Framed(FramedReader),
    Memory(MemoryInput),
    Merged(MergedInput),
}

/// A stream of records, produced by [`RecordInput::open`] or by turning a
/// writer into its own output via [`Out::into_input`](crate::Out::into_input).
pub struct RecordInput {
    kind: InputKind,
    cleanup: Option<Cleanup>,
}

impl RecordInput {
    /// Opens `path` as a record input. Compression is inferred from the
    /// extension (`.lz4`, `.gz`, otherwise raw); framing comes from
    /// `opts.format`.
    pub fn open<P: AsRef<Path>>(path: P, opts: InOptions) -> io::Result<RecordInput> {
        let path = path.as_ref().to_string_lossy().into_owned();
        Ok(RecordInput {
            kind: InputKind::Framed(FramedReader::open(&path, opts)?),
            cleanup: None,
        })
    }

    pub(crate) fn from_memory(mem: MemoryInput) -> RecordInput {
        RecordInput {
            kind: InputKind::Memory(mem),
            cleanup: None,
        }
    }

    pub(crate) fn from_merged(merged: MergedInput) -> RecordInput {
        RecordInput {
            kind: InputKind::Merged(merged),
            cleanup: None,
        }
    }

    pub(crate) fn set_cleanup(&mut self, cleanup: Cleanup) {
        self.cleanup = Some(cleanup);
    }

    /// Returns the next record, or `None` at end of stream. The returned
    /// view is valid until the next call.
    pub fn next(&mut self) -> io::Result<Option<RecordView<'_>>> {
        match &mut self.kind {
            InputKind::Framed(r) => {
                if r.advance()? {
                    Ok(Some(r.current()))
                } else {
                    Ok(None)
                }
            }
            InputKind::Memory(m) => {
                if m.advance() {
                    Ok(Some(m.current()))
                } else {
                    Ok(None)
                }
            }
            InputKind::Merged(m) => m.next(),
        }
    }
}
