//! Buffered byte sink over a raw, gzip, or LZ4 destination.
//!
//! The sink owns the output file handle, a primary buffer, and the write
//! loop shared by every writer variant:
//!
//! - a write that fits leaves bytes in the buffer;
//! - a write that overflows tops the buffer up, flushes it, and then either
//!   writes the remainder straight through (when it is at least a full
//!   buffer) or restarts the buffer with it;
//! - an empty write is the explicit-flush signal.
//!
//! A failed write closes the destination and poisons the sink: every
//! subsequent write fails fast. When the failure is `ENOSPC` a single
//! disk-full diagnostic is emitted to stderr first. With `abort_on_error`
//! the first failure terminates the process instead.
//!
//! Construction decides the destination from the filename extension
//! (`.lz4`, `.gz`, anything else raw); without a filename the `lz4`/`gz`
//! options decide. Safe-mode staging, the close-time rename, and ack-file
//! emission are handled by the owning writer — the sink only knows which
//! physical path it writes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::path::Path;
use std::process;

use flate2::write::GzEncoder;
use flate2::Compression;
use lz4::liblz4::{BlockChecksum, ContentChecksum};
use lz4::{Encoder, EncoderBuilder};

use crate::display::notification_level;
use crate::options::OutOptions;
use crate::path_util::has_extension;

/// Largest byte count handed to a single underlying `write` call.
const MAX_WRITE: usize = 0x7FFF_FFFF;

/// Minimum buffer size for gzip destinations.
const MIN_GZ_BUFFER: usize = 64 * 1024;

enum Dest {
    Raw(File),
    Gz(GzEncoder<File>),
    Lz4(Box<Encoder<File>>),
}

pub(crate) struct Sink {
    dest: Option<Dest>,
    buf: Vec<u8>,
    cap: usize,
    abort_on_error: bool,
}

/// Writes all of `p`, retrying short writes and capping individual calls
/// at [`MAX_WRITE`]. Emits the disk-full diagnostic on `ENOSPC`.
fn write_full<W: Write>(w: &mut W, mut p: &[u8]) -> io::Result<()> {
    while !p.is_empty() {
        let n = p.len().min(MAX_WRITE);
        match w.write(&p[..n]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "destination accepted no bytes",
                ));
            }
            Ok(written) => p = &p[written..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                if e.raw_os_error() == Some(libc::ENOSPC) && notification_level() >= 1 {
                    eprintln!("recout: ERROR DISK FULL");
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

fn poisoned() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "output poisoned by an earlier write failure",
    )
}

impl Sink {
    /// Opens a sink for `physical` (the staging path in safe mode), or
    /// wraps an already-open `file`. Exactly one of the two must be given;
    /// the construction invariants are enforced by the caller.
    pub(crate) fn create(
        physical: Option<&str>,
        file: Option<File>,
        opts: &OutOptions,
    ) -> io::Result<Sink> {
        let want_lz4 = match physical {
            Some(p) => has_extension(p, "lz4"),
            None => opts.lz4,
        };
        let want_gz = match physical {
            Some(p) => has_extension(p, "gz"),
            None => opts.gz,
        };

        if want_lz4 {
            // Appending to an LZ4 frame is unsupported: a finished frame's
            // trailer (and any content checksum) cannot be extended.
            assert!(!opts.append_mode, "append mode is not supported for LZ4 outputs");
            let file = match file {
                Some(f) => f,
                None => {
                    let path = physical.unwrap();
                    ensure_parent(path)?;
                    File::create(path)?
                }
            };
            let encoder = EncoderBuilder::new()
                .level(opts.level)
                .block_size(opts.block_size.to_codec())
                .block_checksum(if opts.block_checksum {
                    BlockChecksum::BlockChecksumEnabled
                } else {
                    BlockChecksum::NoBlockChecksum
                })
                .checksum(if opts.content_checksum {
                    ContentChecksum::ChecksumEnabled
                } else {
                    ContentChecksum::NoChecksum
                })
                .build(file)?;
            Ok(Sink::new(
                Dest::Lz4(Box::new(encoder)),
                opts.block_size.bytes(),
                opts.abort_on_error,
            ))
        } else if want_gz {
            let file = match (file, physical) {
                (Some(f), _) => f,
                (None, Some(p)) => open_raw(p, opts.append_mode)?,
                (None, None) => unreachable!(),
            };
            let level = Compression::new(opts.level.min(9));
            Ok(Sink::new(
                Dest::Gz(GzEncoder::new(file, level)),
                opts.buffer_size.max(MIN_GZ_BUFFER),
                opts.abort_on_error,
            ))
        } else {
            let file = match (file, physical) {
                (Some(f), _) => f,
                (None, Some(p)) => open_raw(p, opts.append_mode)?,
                (None, None) => unreachable!(),
            };
            Ok(Sink::new(Dest::Raw(file), opts.buffer_size, opts.abort_on_error))
        }
    }

    fn new(dest: Dest, cap: usize, abort_on_error: bool) -> Sink {
        let cap = cap.max(1);
        Sink {
            dest: Some(dest),
            buf: Vec::with_capacity(cap),
            cap,
            abort_on_error,
        }
    }

    /// Appends `d`; an empty `d` flushes instead.
    pub(crate) fn write(&mut self, d: &[u8]) -> io::Result<()> {
        if d.is_empty() {
            return self.flush();
        }
        if self.buf.len() + d.len() < self.cap {
            self.buf.extend_from_slice(d);
            return Ok(());
        }
        let take = self.cap - self.buf.len();
        self.buf.extend_from_slice(&d[..take]);
        self.flush()?;
        let rest = &d[take..];
        if rest.len() >= self.cap {
            self.write_out(rest)
        } else {
            self.buf.extend_from_slice(rest);
            Ok(())
        }
    }

    /// Drains the primary buffer to the destination.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let buf = mem::take(&mut self.buf);
        let r = self.write_out(&buf);
        self.buf = buf;
        self.buf.clear();
        r
    }

    fn write_out(&mut self, data: &[u8]) -> io::Result<()> {
        let dest = match self.dest.as_mut() {
            Some(d) => d,
            None => return Err(poisoned()),
        };
        let r = match dest {
            Dest::Raw(f) => write_full(f, data),
            Dest::Gz(g) => write_full(g, data),
            Dest::Lz4(e) => write_full(e, data),
        };
        if r.is_err() {
            self.dest = None;
            if self.abort_on_error {
                process::abort();
            }
        }
        r
    }

    /// Flushes, finalizes the codec stream (gzip trailer, LZ4 frame end),
    /// and closes the destination.
    pub(crate) fn finish(&mut self) -> io::Result<()> {
        self.flush()?;
        match self.dest.take() {
            Some(Dest::Raw(mut f)) => f.flush(),
            Some(Dest::Gz(g)) => g.finish().map(drop),
            Some(Dest::Lz4(e)) => {
                let (_file, r) = e.finish();
                r
            }
            None => Err(poisoned()),
        }
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        // Best-effort: an unfinished sink still drains what it buffered,
        // but never publishes (rename/ack stay with the owning writer).
        if self.dest.is_some() {
            let _ = self.finish();
        }
    }
}

/// Creates missing parent directories so a deep output path is valid.
fn ensure_parent(path: &str) -> io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn open_raw(path: &str, append: bool) -> io::Result<File> {
    ensure_parent(path)?;
    if append {
        OpenOptions::new().write(true).create(true).append(true).open(path)
    } else {
        File::create(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_boundaries() {
        // Writes that straddle the buffer must come out byte-identical.
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("boundary").to_string_lossy().into_owned();
        let opts = OutOptions::default().buffer_size(8);
        let mut sink = Sink::create(Some(&path), None, &opts).unwrap();
        sink.write(b"0123456").unwrap(); // fits (7 < 8)
        sink.write(b"89abcdef").unwrap(); // overflow, remainder restarts the buffer
        sink.write(b"g").unwrap();
        sink.finish().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"012345689abcdefg");
    }
}
