//! Filename conventions.
//!
//! Every file the engine creates besides the user-named output derives its
//! name from the user path by fixed rules, so that related files sort
//! together and cleanup can find strays:
//!
//! - safe-mode staging:    `<stem>-safe<ext>`, renamed to the real name on
//!   successful close
//! - completion marker:    `<name>.ack`
//! - partition `i`:        `<stem>_<i><ext>`
//! - unsorted partition:   `<stem>_unsorted_<i>[.lz4]`
//! - sort spill run `i`:   `<stem>_<i>_tmp[.lz4]`
//! - merged group run `i`: `<stem>_<i>_gtmp[.lz4]`
//!
//! `<ext>` is one of `.lz4`, `.gz`, or empty; a `.gz` base whose temporary
//! files are LZ4-compressed swaps the extension to `.lz4` for those files.

/// Returns `true` when `name` ends in `.` + `ext`.
pub(crate) fn has_extension(name: &str, ext: &str) -> bool {
    let n = name.as_bytes();
    let e = ext.as_bytes();
    n.len() > e.len() + 1
        && n[n.len() - e.len() - 1] == b'.'
        && &n[n.len() - e.len()..] == e
}

/// Splits a compression extension off `name`: `("out", ".lz4")`,
/// `("out", ".gz")`, or `(name, "")`.
pub(crate) fn split_compression_suffix(name: &str) -> (&str, &'static str) {
    if has_extension(name, "lz4") {
        (&name[..name.len() - 4], ".lz4")
    } else if has_extension(name, "gz") {
        (&name[..name.len() - 3], ".gz")
    } else {
        (name, "")
    }
}

/// The safe-mode staging name: `-safe` spliced in ahead of the compression
/// extension.
pub(crate) fn safe_name(name: &str) -> String {
    let (stem, ext) = split_compression_suffix(name);
    format!("{stem}-safe{ext}")
}

/// The completion-marker name for `name`.
pub(crate) fn ack_name(name: &str) -> String {
    format!("{name}.ack")
}

/// Splices `[_extra]_<id>` in ahead of the compression extension. With
/// `use_lz4`, the result always carries `.lz4` (replacing `.gz` if the base
/// had it).
pub(crate) fn suffixed_name(name: &str, id: usize, extra: Option<&str>, use_lz4: bool) -> String {
    let (stem, ext) = split_compression_suffix(name);
    let ext = if use_lz4 { ".lz4" } else { ext };
    match extra {
        Some(extra) => format!("{stem}_{extra}_{id}{ext}"),
        None => format!("{stem}_{id}{ext}"),
    }
}

/// The name of partition `id` of a partitioned output named `name`.
pub fn partition_filename(name: &str, id: usize) -> String {
    suffixed_name(name, id, None, false)
}

/// The name of the unsorted spill file for partition `id`.
pub(crate) fn unsorted_filename(name: &str, id: usize, use_lz4: bool) -> String {
    suffixed_name(name, id, Some("unsorted"), use_lz4)
}

/// The name of sort spill run `id` for an output whose stripped stem is
/// `stem`.
pub(crate) fn run_filename(stem: &str, id: usize, use_lz4: bool) -> String {
    let ext = if use_lz4 { ".lz4" } else { "" };
    format!("{stem}_{id}_tmp{ext}")
}

/// The name of group run `id` for an output whose stripped stem is `stem`.
pub(crate) fn group_filename(stem: &str, id: usize, use_lz4: bool) -> String {
    let ext = if use_lz4 { ".lz4" } else { "" };
    format!("{stem}_{id}_gtmp{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_probe() {
        assert!(has_extension("a/b/out.lz4", "lz4"));
        assert!(has_extension("out.gz", "gz"));
        assert!(!has_extension("outlz4", "lz4"));
        assert!(!has_extension(".lz4", "lz4"));
        assert!(!has_extension("out.lz", "lz4"));
    }

    #[test]
    fn safe_names_keep_compression_extension() {
        assert_eq!(safe_name("out"), "out-safe");
        assert_eq!(safe_name("out.lz4"), "out-safe.lz4");
        assert_eq!(safe_name("dir/out.gz"), "dir/out-safe.gz");
    }

    #[test]
    fn partition_names() {
        assert_eq!(partition_filename("out", 3), "out_3");
        assert_eq!(partition_filename("out.lz4", 0), "out_0.lz4");
        assert_eq!(partition_filename("out.gz", 2), "out_2.gz");
    }

    #[test]
    fn unsorted_names_swap_gz_for_lz4() {
        assert_eq!(unsorted_filename("out.gz", 1, true), "out_unsorted_1.lz4");
        assert_eq!(unsorted_filename("out.gz", 1, false), "out_unsorted_1.gz");
        assert_eq!(unsorted_filename("out", 1, false), "out_unsorted_1");
    }

    #[test]
    fn run_names() {
        assert_eq!(run_filename("out", 7, true), "out_7_tmp.lz4");
        assert_eq!(run_filename("out", 7, false), "out_7_tmp");
        assert_eq!(group_filename("out", 0, true), "out_0_gtmp.lz4");
    }
}
