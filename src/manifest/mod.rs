//! # Manifest codec
//!
//! The **manifest** is the archive's metadata authority: a single JSON
//! document, `ArchiveMetaData.json`, naming the library version tag the
//! archive was written with, the on-disk format version, and the
//! [`crate::field_table::FieldTable`] in full.
//!
//! Unlike a WAL-backed manifest, this document has no incremental log: the
//! in-memory [`FieldTable`](crate::field_table::FieldTable) is always
//! authoritative, and [`ManifestDocument::write`] rewrites the whole file on
//! every flush (see [`crate::archive`]'s "manifest flush" step). There is
//! exactly one writer per archive directory, so a truncate-then-write is
//! sufficient; it is not crash-safe, and is not meant to be (see the crate's
//! design notes on overwrite semantics).


use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tracing::{info, warn};

use crate::field_table::{FieldOffsetTable, FieldTable, FileOffset};
use crate::{CURRENT_ARCHIVE_VERSION, LIBRARY_VERSION};

/// Fixed filename of the manifest within an archive directory.
pub const MANIFEST_FILENAME: &str = "ArchiveMetaData.json";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised while encoding/decoding or reading/writing the manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying filesystem failure while reading or writing the manifest file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The document is not valid JSON, or a required key is missing / has the
    /// wrong shape.
    #[error("manifest format error: {0}")]
    Format(String),

    /// A value was present but had the wrong JSON shape (e.g. a string where
    /// an integer was expected).
    #[error("manifest type error: {0}")]
    Type(String),

    /// `serialbox_version` or `binary_archive_version` disagrees with this
    /// build of the crate.
    #[error(
        "manifest version mismatch: found serialbox_version={found_serialbox} \
         binary_archive_version={found_archive}, expected serialbox_version={expected_serialbox} \
         binary_archive_version={expected_archive}"
    )]
    VersionMismatch {
        found_serialbox: u32,
        found_archive: u32,
        expected_serialbox: u32,
        expected_archive: u32,
    },
}

// ------------------------------------------------------------------------------------------------
// Wire schema
// ------------------------------------------------------------------------------------------------

/// The literal on-disk JSON shape (see `spec.md` §6.2). Kept private: callers
/// go through [`ManifestDocument`], which owns the [`FieldTable`] type rather
/// than the wire-level `Vec<(u64, String)>` pairs.
#[derive(Debug, Serialize, Deserialize)]
struct WireManifest {
    serialbox_version: u32,
    binary_archive_version: u32,
    fields_table: BTreeMap<String, Vec<(u64, String)>>,
}

// ------------------------------------------------------------------------------------------------
// ManifestDocument
// ------------------------------------------------------------------------------------------------

/// The in-memory form of the manifest: version tags plus a [`FieldTable`].
///
/// [`ManifestDocument::encode`]/[`ManifestDocument::decode`] convert to and
/// from the JSON text; [`ManifestDocument::read`]/[`ManifestDocument::write`]
/// additionally perform the filesystem I/O.
#[derive(Debug, Clone)]
pub struct ManifestDocument {
    /// `100*MAJOR + 10*MINOR + PATCH` of the crate that wrote this manifest.
    pub serialbox_version: u32,
    /// On-disk archive format version.
    pub binary_archive_version: u32,
    /// The field index as of the last flush.
    pub field_table: FieldTable,
}

impl ManifestDocument {
    /// Builds a manifest document stamped with this build's version tags.
    pub fn new(field_table: FieldTable) -> Self {
        Self {
            serialbox_version: LIBRARY_VERSION,
            binary_archive_version: CURRENT_ARCHIVE_VERSION,
            field_table,
        }
    }

    /// Serializes to the pretty-printed JSON text described in `spec.md`
    /// §6.2 (4-space indent, `fields_table` as a mapping to arrays of
    /// `[offset, checksum]` pairs in id order).
    pub fn encode(&self) -> Result<String, ManifestError> {
        let wire = WireManifest {
            serialbox_version: self.serialbox_version,
            binary_archive_version: self.binary_archive_version,
            fields_table: self
                .field_table
                .as_map()
                .iter()
                .map(|(name, entries)| {
                    let pairs = entries
                        .iter()
                        .map(|e| (e.offset, e.checksum.clone()))
                        .collect();
                    (name.clone(), pairs)
                })
                .collect(),
        };

        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        wire.serialize(&mut ser)
            .map_err(|e| ManifestError::Format(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| ManifestError::Format(e.to_string()))
    }

    /// Parses `text` and validates both version tags against this build's
    /// [`LIBRARY_VERSION`] and [`CURRENT_ARCHIVE_VERSION`].
    ///
    /// Fails with [`ManifestError::Format`] if the document isn't valid JSON
    /// or a required key is missing, [`ManifestError::Type`] if a present
    /// value has the wrong shape, and [`ManifestError::VersionMismatch`] if
    /// either version tag disagrees with this build.
    pub fn decode(text: &str) -> Result<Self, ManifestError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ManifestError::Format(e.to_string()))?;

        let obj = value
            .as_object()
            .ok_or_else(|| ManifestError::Format("manifest root is not a JSON object".into()))?;

        let serialbox_version = obj
            .get("serialbox_version")
            .ok_or_else(|| ManifestError::Format("missing key `serialbox_version`".into()))?
            .as_u64()
            .ok_or_else(|| {
                ManifestError::Type("`serialbox_version` is not an unsigned integer".into())
            })? as u32;

        let binary_archive_version = obj
            .get("binary_archive_version")
            .ok_or_else(|| ManifestError::Format("missing key `binary_archive_version`".into()))?
            .as_u64()
            .ok_or_else(|| {
                ManifestError::Type("`binary_archive_version` is not an unsigned integer".into())
            })? as u32;

        if serialbox_version != LIBRARY_VERSION
            || binary_archive_version != CURRENT_ARCHIVE_VERSION
        {
            return Err(ManifestError::VersionMismatch {
                found_serialbox: serialbox_version,
                found_archive: binary_archive_version,
                expected_serialbox: LIBRARY_VERSION,
                expected_archive: CURRENT_ARCHIVE_VERSION,
            });
        }

        let fields_table_value = obj
            .get("fields_table")
            .ok_or_else(|| ManifestError::Format("missing key `fields_table`".into()))?
            .as_object()
            .ok_or_else(|| ManifestError::Type("`fields_table` is not an object".into()))?;

        let mut entries = BTreeMap::new();
        for (name, raw_table) in fields_table_value {
            let raw_array = raw_table
                .as_array()
                .ok_or_else(|| ManifestError::Type(format!("field {name:?} is not an array")))?;

            let mut table: FieldOffsetTable = Vec::with_capacity(raw_array.len());
            for raw_entry in raw_array {
                let pair = raw_entry.as_array().ok_or_else(|| {
                    ManifestError::Type(format!("entry in field {name:?} is not a 2-tuple"))
                })?;
                if pair.len() != 2 {
                    return Err(ManifestError::Type(format!(
                        "entry in field {name:?} does not have exactly 2 elements"
                    )));
                }
                let offset = pair[0].as_u64().ok_or_else(|| {
                    ManifestError::Type(format!("offset in field {name:?} is not a u64"))
                })?;
                let checksum = pair[1]
                    .as_str()
                    .ok_or_else(|| {
                        ManifestError::Type(format!("checksum in field {name:?} is not a string"))
                    })?
                    .to_string();
                table.push(FileOffset { offset, checksum });
            }
            entries.insert(name.clone(), table);
        }

        Ok(Self {
            serialbox_version,
            binary_archive_version,
            field_table: FieldTable::from_map(entries),
        })
    }

    /// Reads and decodes the manifest at `<directory>/ArchiveMetaData.json`.
    pub fn read(directory: &Path) -> Result<Self, ManifestError> {
        let path = directory.join(MANIFEST_FILENAME);
        let text = fs::read_to_string(&path)?;
        let doc = Self::decode(&text)?;
        info!(path = %path.display(), fields = doc.field_table.field_count(), "loaded manifest");
        Ok(doc)
    }

    /// Encodes and rewrites the manifest file at
    /// `<directory>/ArchiveMetaData.json`.
    ///
    /// This is a truncate-then-write, not a write-to-temp-then-rename: the
    /// archive is single-writer, so there is no concurrent reader to race,
    /// and crash safety across this write is explicitly out of scope (see
    /// `spec.md` §9).
    pub fn write(&self, directory: &Path) -> Result<(), ManifestError> {
        let path = directory.join(MANIFEST_FILENAME);
        let text = self.encode()?;
        let mut file = File::create(&path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        info!(path = %path.display(), fields = self.field_table.field_count(), "flushed manifest");
        Ok(())
    }
}

/// Attempts to read an existing manifest, tolerating the common "directory
/// exists but has no manifest yet" case for `Append` mode.
///
/// Returns `Ok(None)` if the manifest file is simply absent; propagates any
/// other I/O or parse error.
pub(crate) fn read_if_present(
    directory: &Path,
) -> Result<Option<ManifestDocument>, ManifestError> {
    let path = directory.join(MANIFEST_FILENAME);
    match fs::metadata(&path) {
        Ok(_) => ManifestDocument::read(directory).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "no manifest found, starting with an empty field table");
            Ok(None)
        }
        Err(e) => Err(ManifestError::Io(e)),
    }
}
