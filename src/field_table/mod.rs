//! In-memory index mapping field name → ordered sequence of snapshot
//! `(offset, checksum)` entries.
//!
//! [`FieldTable`] is the single source of truth the [`crate::archive`]
//! engine consults before every disk access. It never touches the
//! filesystem itself — it is purely in-memory bookkeeping, persisted
//! verbatim into the [`crate::manifest`] document on flush.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use thiserror::Error;

/// Identifies one snapshot: a field `name` and the `id` (sequence number)
/// of the snapshot within that field's history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldId {
    /// Selects the field.
    pub name: String,
    /// Selects the snapshot within the field's ordered sequence.
    pub id: u64,
}

impl FieldId {
    /// Builds a `FieldId` from a field name and snapshot id.
    pub fn new(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

/// Where one snapshot lives on disk, and the digest that proves its bytes
/// have not been silently corrupted.
///
/// Invariant: for a given `(name, id)`, `offset` points to the first byte of
/// a byte-run of length `size_in_bytes(name)` in `name + ".dat"`, and
/// `checksum` is [`crate::digest::digest`] of exactly that byte-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOffset {
    /// Byte position in the field's data file.
    pub offset: u64,
    /// Lowercase hex SHA-256 digest of the byte-run at `offset`.
    pub checksum: String,
}

/// Ordered sequence of [`FileOffset`], indexed by snapshot id.
///
/// Entries at indices `0..len-1` are all valid; `id == len` is the only
/// position at which a new entry may be appended (see [`FieldTable::append`]).
pub type FieldOffsetTable = Vec<FileOffset>;

/// Errors raised by [`FieldTable`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldTableError {
    /// `replace` was called with an `id` that is not a valid existing index.
    #[error("invalid snapshot id {id} for field {name:?} (table has {len} entries)")]
    InvalidId { name: String, id: u64, len: usize },
}

/// Mapping from field name to its [`FieldOffsetTable`].
///
/// Keys are unique. A [`BTreeMap`] is used rather than an insertion-ordered
/// map so that iteration — and therefore manifest encoding (see
/// [`crate::manifest`]) — is always sorted by name, making manifest writes
/// deterministic without a separate sort step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTable {
    entries: BTreeMap<String, FieldOffsetTable>,
}

impl FieldTable {
    /// Builds an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no field has ever been written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct field names tracked.
    pub fn field_count(&self) -> usize {
        self.entries.len()
    }

    /// Field names in deterministic (sorted) order, for diagnostics such as
    /// [`crate::archive::BinaryArchive::to_text`].
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Looks up the offset table for `name`, if the field is known.
    pub fn lookup(&self, name: &str) -> Option<&FieldOffsetTable> {
        self.entries.get(name)
    }

    /// Number of snapshots recorded for `name` (`0` if the field is unknown).
    pub fn len_of(&self, name: &str) -> usize {
        self.entries.get(name).map_or(0, Vec::len)
    }

    /// Appends `offset` as a new snapshot entry for `name`, creating the
    /// field's table if this is its first snapshot.
    ///
    /// Returns the id of the newly appended entry (`= len` before the call).
    pub fn append(&mut self, name: &str, offset: FileOffset) -> u64 {
        let table = self.entries.entry(name.to_string()).or_default();
        let id = table.len() as u64;
        table.push(offset);
        id
    }

    /// Replaces the entry at `id` for `name` in place (offset is unchanged
    /// by convention of the caller; this method replaces whatever is given).
    ///
    /// Fails with [`FieldTableError::InvalidId`] if `id >= len`.
    pub fn replace(
        &mut self,
        name: &str,
        id: u64,
        offset: FileOffset,
    ) -> Result<(), FieldTableError> {
        let table = self
            .entries
            .get_mut(name)
            .ok_or_else(|| FieldTableError::InvalidId {
                name: name.to_string(),
                id,
                len: 0,
            })?;
        let index = usize::try_from(id).map_err(|_| FieldTableError::InvalidId {
            name: name.to_string(),
            id,
            len: table.len(),
        })?;
        let slot = table
            .get_mut(index)
            .ok_or_else(|| FieldTableError::InvalidId {
                name: name.to_string(),
                id,
                len: table.len(),
            })?;
        *slot = offset;
        Ok(())
    }

    /// Returns a reference to the raw `name -> entries` map, for manifest
    /// encoding.
    pub(crate) fn as_map(&self) -> &BTreeMap<String, FieldOffsetTable> {
        &self.entries
    }

    /// Rebuilds a `FieldTable` from a decoded `name -> entries` map (used by
    /// [`crate::manifest`] on load).
    pub(crate) fn from_map(entries: BTreeMap<String, FieldOffsetTable>) -> Self {
        Self { entries }
    }
}
