//! # BinaryArchive engine
//!
//! The open/read/write/append state machine that owns one archive
//! directory: a fixed-name JSON manifest plus one `<field>.dat` file per
//! field, holding the raw concatenated bytes of every snapshot ever written
//! of that field.
//!
//! ## Mode-dependent open semantics
//!
//! | mode   | directory precondition                | action on open                       |
//! |--------|----------------------------------------|---------------------------------------|
//! | Read   | exists and is a directory              | load manifest (must exist)            |
//! | Write  | either absent or exists AND is empty   | ensure directory exists; empty table  |
//! | Append | may or may not exist                   | create if absent; load if present     |
//!
//! ## Concurrency
//!
//! Single-writer, single-reader per directory, not internally thread-safe:
//! the archive is meant to be owned by one actor, with no cooperative
//! suspension and no cached file handles — every `read`/`write` opens and
//! closes its data file, and the manifest is opened only during a flush.

#[cfg(test)]
mod tests;

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::digest::digest;
use crate::field_table::{FieldId, FieldTable, FieldTableError, FileOffset};
use crate::manifest::{self, ManifestDocument, ManifestError};
use crate::storage_view::StorageView;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised by [`BinaryArchive`] operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// [`ArchiveMode::Read`] was requested but `directory` does not exist.
    #[error("no such directory: {0}")]
    NoSuchDirectory(PathBuf),

    /// [`ArchiveMode::Write`] was requested but `directory` exists and is not empty.
    #[error("directory is not empty: {0}")]
    DirectoryNotEmpty(PathBuf),

    /// Underlying filesystem failure not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Manifest failed to load or encode.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// `write` was called on a [`ArchiveMode::Read`] archive, or `read` on a
    /// [`ArchiveMode::Write`]/[`ArchiveMode::Append`] archive.
    #[error("operation not permitted in current mode {mode:?}")]
    WrongMode { mode: ArchiveMode },

    /// `read` was called for a field name that has never been written.
    #[error("unknown field {0:?}")]
    UnknownField(String),

    /// A snapshot id was out of range for the field's current length.
    #[error("invalid snapshot id: {0}")]
    InvalidId(#[from] FieldTableError),

    /// A read's computed digest did not match the digest recorded at write
    /// time: the bytes on disk are not the bytes that were written.
    #[error("checksum mismatch for field {name:?} id {id}")]
    ChecksumMismatch { name: String, id: u64 },

    /// An overwrite (`write` to an existing id) used a different byte count
    /// than the snapshot already on disk at that offset.
    #[error(
        "size mismatch overwriting field {name:?} id {id}: existing snapshot is {existing} \
         bytes, new snapshot is {new} bytes"
    )]
    SizeMismatch {
        name: String,
        id: u64,
        existing: u64,
        new: u64,
    },
}

// ------------------------------------------------------------------------------------------------
// Mode
// ------------------------------------------------------------------------------------------------

/// The archive's only real configuration axis: what the session is allowed
/// to do with the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveMode {
    /// Read-only; `directory` must already exist with a valid manifest.
    Read,
    /// Fresh write; `directory` must be empty (or absent — it is created).
    Write,
    /// Write onto a possibly-existing archive, preserving prior snapshots.
    Append,
}

impl ArchiveMode {
    fn can_write(self) -> bool {
        matches!(self, ArchiveMode::Write | ArchiveMode::Append)
    }

    fn can_read(self) -> bool {
        matches!(self, ArchiveMode::Read)
    }
}

// ------------------------------------------------------------------------------------------------
// BinaryArchive
// ------------------------------------------------------------------------------------------------

/// A persistent, content-addressed store for named fields' snapshot
/// sequences, rooted at one directory.
///
/// Created by [`BinaryArchive::open`]; mutated only by [`BinaryArchive::write`];
/// finalized by [`BinaryArchive::close`] (also run, best-effort, from `Drop`).
pub struct BinaryArchive {
    mode: ArchiveMode,
    directory: PathBuf,
    field_table: FieldTable,
    manifest_dirty: bool,
    closed: bool,
}

impl BinaryArchive {
    /// Opens (or creates) an archive rooted at `directory` under `mode`.
    ///
    /// See the module-level table for the mode-dependent preconditions and
    /// what this does to the directory and field table.
    pub fn open(directory: impl AsRef<Path>, mode: ArchiveMode) -> Result<Self, ArchiveError> {
        let directory = directory.as_ref().to_path_buf();

        let (field_table, manifest_dirty) = match mode {
            ArchiveMode::Read => {
                if !directory.is_dir() {
                    return Err(ArchiveError::NoSuchDirectory(directory));
                }
                let doc = ManifestDocument::read(&directory)?;
                (doc.field_table, false)
            }
            ArchiveMode::Write => {
                if directory.exists() {
                    if !directory.is_dir() {
                        return Err(ArchiveError::DirectoryNotEmpty(directory));
                    }
                    let has_entries = fs::read_dir(&directory)?.next().is_some();
                    if has_entries {
                        return Err(ArchiveError::DirectoryNotEmpty(directory));
                    }
                } else {
                    fs::create_dir_all(&directory)?;
                }
                // No manifest exists yet for a fresh Write session: flush one
                // on close even without an intervening write, so a reader
                // can still open this (empty) archive in Read mode.
                (FieldTable::new(), true)
            }
            ArchiveMode::Append => {
                if !directory.exists() {
                    fs::create_dir_all(&directory)?;
                }
                match manifest::read_if_present(&directory)? {
                    Some(doc) => (doc.field_table, false),
                    None => (FieldTable::new(), true),
                }
            }
        };

        info!(
            directory = %directory.display(),
            mode = ?mode,
            fields = field_table.field_count(),
            "opened archive"
        );

        Ok(Self {
            mode,
            directory,
            field_table,
            manifest_dirty,
            closed: false,
        })
    }

    /// The directory this archive is rooted at.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The mode this archive was opened with.
    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.dat"))
    }

    /// Writes one snapshot of `view` under `field_id`.
    ///
    /// Fails with [`ArchiveError::WrongMode`] unless the archive is open in
    /// [`ArchiveMode::Write`] or [`ArchiveMode::Append`]. See the module
    /// doc's algorithm summary for the fresh/append/overwrite position
    /// decision.
    pub fn write(
        &mut self,
        view: &impl StorageView,
        field_id: &FieldId,
    ) -> Result<(), ArchiveError> {
        if !self.mode.can_write() {
            return Err(ArchiveError::WrongMode { mode: self.mode });
        }

        let n = view.size_in_bytes();
        let mut buffer = vec![0u8; n];
        view.copy_into(&mut buffer);
        let checksum = digest(&buffer);

        let existing_len = self.field_table.len_of(&field_id.name);

        if field_id.id > existing_len as u64 {
            return Err(ArchiveError::InvalidId(FieldTableError::InvalidId {
                name: field_id.name.clone(),
                id: field_id.id,
                len: existing_len,
            }));
        }

        let path = self.data_path(&field_id.name);

        if field_id.id == existing_len as u64 {
            // Fresh field or append: grow the file, append a new table entry.
            let offset = if existing_len == 0 {
                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)?;
                file.write_all(&buffer)?;
                file.sync_all()?;
                0
            } else {
                let mut file = OpenOptions::new().append(true).open(&path)?;
                let offset = file.metadata()?.len();
                file.write_all(&buffer)?;
                file.sync_all()?;
                offset
            };

            self.field_table
                .append(&field_id.name, FileOffset { offset, checksum });
        } else {
            // Overwrite an existing snapshot in place.
            let existing_entry = self.field_table.lookup(&field_id.name).unwrap()[field_id.id as usize]
                .clone();

            let file_len = fs::metadata(&path)?.len();
            let existing_size = next_entry_boundary(
                self.field_table.lookup(&field_id.name).unwrap(),
                field_id.id,
                file_len,
            ) - existing_entry.offset;

            if existing_size != n as u64 {
                return Err(ArchiveError::SizeMismatch {
                    name: field_id.name.clone(),
                    id: field_id.id,
                    existing: existing_size,
                    new: n as u64,
                });
            }

            let mut file = OpenOptions::new().write(true).open(&path)?;
            file.seek(SeekFrom::Start(existing_entry.offset))?;
            file.write_all(&buffer)?;
            file.sync_all()?;

            self.field_table.replace(
                &field_id.name,
                field_id.id,
                FileOffset {
                    offset: existing_entry.offset,
                    checksum,
                },
            )?;
        }

        self.manifest_dirty = true;
        self.flush_manifest()?;

        Ok(())
    }

    /// Reads one snapshot into `view`.
    ///
    /// Fails with [`ArchiveError::WrongMode`] unless the archive is open in
    /// [`ArchiveMode::Read`].
    pub fn read(
        &self,
        view: &mut impl StorageView,
        field_id: &FieldId,
    ) -> Result<(), ArchiveError> {
        if !self.mode.can_read() {
            return Err(ArchiveError::WrongMode { mode: self.mode });
        }

        let table = self
            .field_table
            .lookup(&field_id.name)
            .ok_or_else(|| ArchiveError::UnknownField(field_id.name.clone()))?;

        let entry = table
            .get(field_id.id as usize)
            .ok_or_else(|| {
                ArchiveError::InvalidId(FieldTableError::InvalidId {
                    name: field_id.name.clone(),
                    id: field_id.id,
                    len: table.len(),
                })
            })?
            .clone();

        let n = view.size_in_bytes();
        let mut buffer = vec![0u8; n];

        let path = self.data_path(&field_id.name);
        let mut file = OpenOptions::new().read(true).open(&path)?;
        file.seek(SeekFrom::Start(entry.offset))?;
        file.read_exact(&mut buffer)?;

        let actual = digest(&buffer);
        if actual != entry.checksum {
            warn!(
                field = %field_id.name,
                id = field_id.id,
                expected = %entry.checksum,
                actual = %actual,
                "checksum mismatch on read"
            );
            return Err(ArchiveError::ChecksumMismatch {
                name: field_id.name.clone(),
                id: field_id.id,
            });
        }

        view.copy_from(&buffer);
        Ok(())
    }

    fn flush_manifest(&mut self) -> Result<(), ArchiveError> {
        if !self.manifest_dirty {
            return Ok(());
        }
        let doc = ManifestDocument::new(self.field_table.clone());
        doc.write(&self.directory)?;
        self.manifest_dirty = false;
        Ok(())
    }

    /// Flushes the manifest if dirty, then marks this archive closed.
    /// Idempotent: calling more than once is a no-op after the first call.
    pub fn close(&mut self) -> Result<(), ArchiveError> {
        if self.closed {
            return Ok(());
        }
        self.flush_manifest()?;
        self.closed = true;
        info!(directory = %self.directory.display(), "closed archive");
        Ok(())
    }

    /// Human-readable dump of this archive's directory, mode, and field
    /// table, for diagnostics.
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "BinaryArchive {{ directory: {:?}, mode: {:?}, fields: {} }}\n",
            self.directory,
            self.mode,
            self.field_table.field_count()
        );
        for name in self.field_table.field_names() {
            let entries = self.field_table.lookup(name).unwrap();
            out.push_str(&format!("  {name}: {} snapshot(s)\n", entries.len()));
            for (id, entry) in entries.iter().enumerate() {
                out.push_str(&format!(
                    "    [{id}] offset={} checksum={}\n",
                    entry.offset, entry.checksum
                ));
            }
        }
        out
    }
}

impl Drop for BinaryArchive {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!(directory = %self.directory.display(), error = %e, "failed to flush manifest on drop");
            }
        }
    }
}

/// Returns the byte offset one past the end of the byte-run recorded for
/// entry `id` in `table`: either the next entry's offset, or (for the last
/// entry) the file's total length.
fn next_entry_boundary(table: &[FileOffset], id: u64, file_len: u64) -> u64 {
    table
        .get(id as usize + 1)
        .map(|next| next.offset)
        .unwrap_or(file_len)
}
