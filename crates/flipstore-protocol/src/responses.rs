//! Response parsing for the storage CLI.
//!
//! Successful payloads and device failures share the same line format, so
//! every first response line goes through [`classify`] before it is read
//! as a size, digest or status:
//! - Error: any line containing `Storage error`, message after the first `": "`
//! - Listing lines: `[D] <name>`, `[F] <name> <size>`, or `Empty`
//! - Size report: `<label>: <size>`
//! - Stat: `File, size: <n>b`, `Directory`, `Storage, ...`

use log::{trace, warn};
use serde::Serialize;

use crate::constants::{
    CLI_EOL, DIR_TAG, EMPTY_LISTING, FIELD_SEPARATOR, FILE_TAG, STORAGE_ERROR_MARKER,
};
use crate::error::{ErrorReport, StorageError, StorageResult};

/// A single response line after error classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Ordinary payload text (trimmed).
    Payload(String),
    /// A device-reported failure.
    Error(ErrorReport),
}

impl Line {
    /// Check if this is an error line.
    pub fn is_error(&self) -> bool {
        matches!(self, Line::Error(_))
    }

    /// Convert into the payload, or the error report as a `StorageError`.
    pub fn into_result(self) -> StorageResult<String> {
        match self {
            Line::Payload(text) => Ok(text),
            Line::Error(report) => Err(StorageError::Device(report)),
        }
    }
}

/// Classify a response line as payload or device error.
pub fn classify(text: &str) -> Line {
    match error_report(text) {
        Some(report) => Line::Error(report),
        None => Line::Payload(text.trim().to_string()),
    }
}

/// Extract the error report if the line carries the error marker.
pub fn error_report(text: &str) -> Option<ErrorReport> {
    if !text.contains(STORAGE_ERROR_MARKER) {
        return None;
    }
    let message = match text.split_once(FIELD_SEPARATOR) {
        Some((_, message)) => message.trim(),
        None => text.trim(),
    };
    Some(ErrorReport::new(message))
}

/// Parse a `<label>: <size>` line into the size.
pub fn parse_size_report(text: &str) -> StorageResult<u64> {
    let (_, value) = text
        .split_once(FIELD_SEPARATOR)
        .ok_or_else(|| StorageError::Parse(format!("missing size field: {}", text.trim())))?;
    value
        .trim()
        .parse()
        .map_err(|_| StorageError::Parse(format!("invalid size: {}", value.trim())))
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingLine {
    /// A subdirectory.
    Directory(String),
    /// A file with its size in bytes.
    File {
        /// File name.
        name: String,
        /// Size in bytes.
        size: u64,
    },
    /// The directory exists but has no children.
    Empty,
    /// The device could not list this directory.
    Error(ErrorReport),
}

impl ListingLine {
    /// Parse a decoded listing line.
    ///
    /// Returns `Ok(None)` for blank lines. The type tag is split off at the
    /// first space; a file's size is split off at the last one, so names may
    /// contain spaces.
    pub fn parse(text: &str) -> StorageResult<Option<ListingLine>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        if let Some(report) = error_report(text) {
            return Ok(Some(ListingLine::Error(report)));
        }

        if text == EMPTY_LISTING {
            return Ok(Some(ListingLine::Empty));
        }

        let (tag, rest) = text
            .split_once(' ')
            .ok_or_else(|| StorageError::Parse(format!("unexpected listing line: {}", text)))?;

        match tag {
            DIR_TAG => Ok(Some(ListingLine::Directory(rest.to_string()))),
            FILE_TAG => {
                let (name, size) = rest.rsplit_once(' ').ok_or_else(|| {
                    StorageError::Parse(format!("file entry without size: {}", text))
                })?;
                let size = parse_byte_count(size).ok_or_else(|| {
                    StorageError::Parse(format!("invalid file size: {}", size))
                })?;
                Ok(Some(ListingLine::File {
                    name: name.to_string(),
                    size,
                }))
            }
            _ => Err(StorageError::Parse(format!(
                "unknown listing tag: {}",
                tag
            ))),
        }
    }
}

/// Kind of a storage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

/// A direct child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (no separators).
    pub name: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes (files only).
    pub size: Option<u64>,
}

/// The parsed output of one `list` command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
    /// Entries in device order.
    pub entries: Vec<DirEntry>,
    /// Set when the device reported an error; no entries follow it.
    pub error: Option<ErrorReport>,
}

impl Listing {
    /// Parse the raw bytes of a listing (everything up to the prompt).
    ///
    /// Lines that are not valid text are skipped, since the device emits raw
    /// bytes for names it cannot encode. Malformed lines are skipped with a
    /// warning. The first error line ends the listing.
    pub fn parse(raw: &[u8]) -> Listing {
        let mut listing = Listing::default();

        for line in split_lines(raw) {
            let Ok(text) = std::str::from_utf8(line) else {
                trace!("skipping undecodable listing line ({} bytes)", line.len());
                continue;
            };

            match ListingLine::parse(text) {
                Ok(None) | Ok(Some(ListingLine::Empty)) => {}
                Ok(Some(ListingLine::Directory(name))) => listing.entries.push(DirEntry {
                    name,
                    kind: EntryKind::Directory,
                    size: None,
                }),
                Ok(Some(ListingLine::File { name, size })) => listing.entries.push(DirEntry {
                    name,
                    kind: EntryKind::File,
                    size: Some(size),
                }),
                Ok(Some(ListingLine::Error(report))) => {
                    listing.error = Some(report);
                    break;
                }
                Err(e) => warn!("skipping listing line: {}", e),
            }
        }

        listing
    }

    /// Check if the directory had no entries and no error.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.error.is_none()
    }
}

/// Split raw output on the end-of-line marker.
pub(crate) fn split_lines(raw: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = raw;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.windows(CLI_EOL.len()).position(|w| w == CLI_EOL) {
            Some(pos) => {
                let line = &rest[..pos];
                rest = &rest[pos + CLI_EOL.len()..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = &[];
                Some(line)
            }
        }
    })
}

/// Parse a byte count, tolerating the `b` suffix some firmware prints.
fn parse_byte_count(text: &str) -> Option<u64> {
    text.trim().trim_end_matches('b').parse().ok()
}

/// Result of a `stat` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatInfo {
    /// A regular file.
    File {
        /// Size in bytes.
        size: u64,
    },
    /// A directory.
    Directory,
    /// A storage root (`/ext`, `/int`); the description carries capacity.
    Storage {
        /// Free-form capacity description.
        description: String,
    },
}

impl StatInfo {
    /// Parse a `stat` payload line.
    pub fn parse(text: &str) -> StorageResult<StatInfo> {
        let text = text.trim();

        if text == "Directory" {
            return Ok(StatInfo::Directory);
        }

        if let Some(rest) = text.strip_prefix("File") {
            let size = rest
                .split_once("size:")
                .and_then(|(_, size)| parse_byte_count(size))
                .ok_or_else(|| StorageError::Parse(format!("invalid file stat: {}", text)))?;
            return Ok(StatInfo::File { size });
        }

        if let Some(rest) = text.strip_prefix("Storage") {
            let description = rest.trim_start_matches(',').trim().to_string();
            return Ok(StatInfo::Storage { description });
        }

        Err(StorageError::Parse(format!("unexpected stat response: {}", text)))
    }

    /// Check if this is a directory (storage roots count as directories).
    pub fn is_dir(&self) -> bool {
        matches!(self, StatInfo::Directory | StatInfo::Storage { .. })
    }

    /// Get the file size if this is a file.
    pub fn file_size(&self) -> Option<u64> {
        match self {
            StatInfo::File { size } => Some(*size),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error() {
        let line = classify("Storage error: no such file");
        assert_eq!(line, Line::Error(ErrorReport::new("no such file")));
        assert!(line.is_error());
    }

    #[test]
    fn test_classify_error_keeps_later_separators() {
        let line = classify("Storage error: internal: 5");
        assert_eq!(line, Line::Error(ErrorReport::new("internal: 5")));
    }

    #[test]
    fn test_classify_error_without_separator() {
        let line = classify("Storage error");
        assert_eq!(line, Line::Error(ErrorReport::new("Storage error")));
    }

    #[test]
    fn test_classify_payload() {
        let line = classify("  d41d8cd98f00b204e9800998ecf8427e ");
        assert_eq!(
            line.into_result().unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_parse_size_report() {
        assert_eq!(parse_size_report("Size: 1000").unwrap(), 1000);
        assert!(matches!(
            parse_size_report("Size 1000"),
            Err(StorageError::Parse(_))
        ));
        assert!(matches!(
            parse_size_report("Size: lots"),
            Err(StorageError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_listing_directory() {
        let line = ListingLine::parse("\t[D] My Apps").unwrap();
        assert_eq!(line, Some(ListingLine::Directory("My Apps".to_string())));
    }

    #[test]
    fn test_parse_listing_file_with_spaces() {
        let line = ListingLine::parse("[F] a file name.txt 1234b").unwrap();
        assert_eq!(
            line,
            Some(ListingLine::File {
                name: "a file name.txt".to_string(),
                size: 1234,
            })
        );
    }

    #[test]
    fn test_parse_listing_empty_and_blank() {
        assert_eq!(ListingLine::parse("Empty").unwrap(), Some(ListingLine::Empty));
        assert_eq!(ListingLine::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_listing_error() {
        let line = ListingLine::parse("Storage error: internal error").unwrap();
        assert_eq!(
            line,
            Some(ListingLine::Error(ErrorReport::new("internal error")))
        );
    }

    #[test]
    fn test_parse_listing_bad_size() {
        assert!(ListingLine::parse("[F] name big").is_err());
        assert!(ListingLine::parse("[X] what").is_err());
    }

    #[test]
    fn test_parse_stat() {
        assert_eq!(
            StatInfo::parse("File, size: 120b").unwrap(),
            StatInfo::File { size: 120 }
        );
        assert_eq!(StatInfo::parse("Directory").unwrap(), StatInfo::Directory);
        let storage = StatInfo::parse("Storage, 7812KiB total, 7700KiB free").unwrap();
        assert!(storage.is_dir());
        assert_eq!(
            storage,
            StatInfo::Storage {
                description: "7812KiB total, 7700KiB free".to_string()
            }
        );
        assert!(StatInfo::parse("Gizmo").is_err());
    }

    #[test]
    fn test_listing_parse_mixed() {
        let raw = b"\t[D] apps\r\n\t[F] notes.txt 12b\r\n\r\n";
        let listing = Listing::parse(raw);
        assert_eq!(listing.error, None);
        assert_eq!(
            listing.entries,
            vec![
                DirEntry {
                    name: "apps".to_string(),
                    kind: EntryKind::Directory,
                    size: None,
                },
                DirEntry {
                    name: "notes.txt".to_string(),
                    kind: EntryKind::File,
                    size: Some(12),
                },
            ]
        );
    }

    #[test]
    fn test_listing_parse_empty() {
        let listing = Listing::parse(b"\tEmpty\r\n\r\n");
        assert!(listing.is_empty());
    }

    #[test]
    fn test_listing_skips_undecodable_lines() {
        let raw = b"[F] \xff\xfe.bin 3\r\n[F] ok.bin 4\r\n";
        let listing = Listing::parse(raw);
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].name, "ok.bin");
    }

    #[test]
    fn test_listing_stops_at_error() {
        let raw = b"[D] a\r\nStorage error: internal error\r\n[D] b\r\n";
        let listing = Listing::parse(raw);
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.error, Some(ErrorReport::new("internal error")));
    }
}
