//! Record framing formats.
//!
//! A record on disk is framed one of three ways:
//!
//! - [`RecordFormat::Prefix`]    — 4-byte little-endian length, then payload.
//! - [`RecordFormat::Delimited`] — payload, then a single delimiter byte.
//! - [`RecordFormat::Fixed`]     — exactly `w` payload bytes, no framing.
//!
//! [`RecordFormat::Csv`] is a variant of `Delimited` signalling that the
//! caller quotes/escapes fields before `write_record`; the engine itself
//! still frames with the delimiter byte and does no quoting of its own.
//!
//! Prefix framing is the canonical format for every intermediate or
//! temporary file the engine creates, regardless of the format chosen for
//! the final output, so that spill files can always be read back by length.
//!
//! The formats carry a compact integer encoding (see [`RecordFormat::code`])
//! for configuration surfaces that store the format as a single number:
//! `0` is prefix, a negative value `-(d+1)` is delimited on byte `d`
//! (offset by a further 256 for the CSV flavor), and a positive value `w`
//! is fixed width `w`.

/// How individual records are framed in the output byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordFormat {
    /// 4-byte little-endian length prefix followed by the payload.
    Prefix,
    /// Payload followed by the given delimiter byte.
    Delimited(u8),
    /// Same on-disk framing as `Delimited`; the caller performs CSV
    /// quoting before handing the record over.
    Csv(u8),
    /// Every record is exactly this many bytes; no framing bytes at all.
    /// Writing a record of any other length is a contract violation.
    Fixed(u32),
}

impl Default for RecordFormat {
    fn default() -> Self {
        RecordFormat::Prefix
    }
}

impl RecordFormat {
    /// Integer encoding of the format: `0` = prefix, `-(d+1)` = delimited
    /// on byte `d` (minus a further 256 for CSV), `w > 0` = fixed width.
    pub fn code(self) -> i64 {
        match self {
            RecordFormat::Prefix => 0,
            RecordFormat::Delimited(d) => -(i64::from(d) + 1),
            RecordFormat::Csv(d) => -(i64::from(d) + 1 + 256),
            RecordFormat::Fixed(w) => i64::from(w),
        }
    }

    /// Inverse of [`code`](Self::code).
    ///
    /// # Panics
    ///
    /// Panics when `code` does not denote any format (a negative value
    /// beyond the two delimiter ranges).
    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            RecordFormat::Prefix
        } else if code > 0 {
            RecordFormat::Fixed(code as u32)
        } else {
            let d = -code - 1;
            if d >= 512 {
                panic!("invalid record format code {code}");
            } else if d >= 256 {
                RecordFormat::Csv((d - 256) as u8)
            } else {
                RecordFormat::Delimited(d as u8)
            }
        }
    }

    /// The delimiter byte for the two delimited flavors.
    #[inline]
    pub(crate) fn delimiter(self) -> Option<u8> {
        match self {
            RecordFormat::Delimited(d) | RecordFormat::Csv(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        for f in [
            RecordFormat::Prefix,
            RecordFormat::Delimited(0),
            RecordFormat::Delimited(b'\n'),
            RecordFormat::Delimited(255),
            RecordFormat::Csv(b','),
            RecordFormat::Fixed(1),
            RecordFormat::Fixed(4096),
        ] {
            assert_eq!(RecordFormat::from_code(f.code()), f);
        }
    }

    #[test]
    fn delimited_codes_are_negative() {
        assert_eq!(RecordFormat::Delimited(b'\t').code(), -10);
        assert_eq!(RecordFormat::Csv(b'\t').code(), -266);
        assert_eq!(RecordFormat::Prefix.code(), 0);
    }

    #[test]
    #[should_panic]
    fn from_code_rejects_out_of_range() {
        let _ = RecordFormat::from_code(-600);
    }
}
