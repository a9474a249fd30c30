//! The adapter trait bridging a caller's strided field layout to the
//! contiguous byte buffer the archive writes to and reads from disk.
//!
//! `spec.md` §6.4 defines `StorageView` as an external collaborator,
//! consumed only through its contract: total byte size, a constant element
//! width, and a stable iteration order. This module declares that contract
//! as a Rust trait — the shape the archive *requires*, not an
//! implementation of the simulation-side field storage itself — plus one
//! concrete, contiguous `Vec<u8>`-backed implementation ([`RawBuffer`]) used
//! by this crate's own tests and as the reference adapter a real binding
//! would model its own strided view after.


/// What [`crate::archive::BinaryArchive`] requires of a caller's field view.
///
/// Implementations expose a field's elements in a single, stable iteration
/// order; the archive makes no assumption about the view's internal
/// strides, only that the same logical field shape iterates in the same
/// order on write and on read.
pub trait StorageView {
    /// Total size of the field's byte representation.
    fn size_in_bytes(&self) -> usize;

    /// Constant width, in bytes, of one element. Must evenly divide
    /// [`Self::size_in_bytes`].
    fn bytes_per_element(&self) -> usize;

    /// Copies every element's bytes into `dst` in canonical iteration order,
    /// one `bytes_per_element`-sized run per element. `dst.len()` is exactly
    /// [`Self::size_in_bytes`].
    fn copy_into(&self, dst: &mut [u8]);

    /// Copies `bytes_per_element`-sized runs out of `src`, in canonical
    /// iteration order, back into the view's elements. `src.len()` is
    /// exactly [`Self::size_in_bytes`].
    fn copy_from(&mut self, src: &[u8]);
}

/// A simple contiguous byte buffer implementing [`StorageView`] as a flat
/// run of fixed-width elements.
///
/// This is the reference adapter: real simulation bindings back their own
/// strided multi-dimensional arrays with a type implementing [`StorageView`]
/// directly, copying from/to their native layout; `RawBuffer` exists so this
/// crate's tests (and `spec.md` §8's literal scenarios) have something
/// concrete to write and read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    bytes: Vec<u8>,
    bytes_per_element: usize,
}

impl RawBuffer {
    /// Wraps `bytes` as a view with the given constant element width.
    ///
    /// # Panics
    /// Panics if `bytes_per_element` is zero or does not evenly divide
    /// `bytes.len()` — both are programming errors in a test fixture, not
    /// recoverable archive-level conditions.
    pub fn new(bytes: Vec<u8>, bytes_per_element: usize) -> Self {
        assert!(bytes_per_element > 0, "bytes_per_element must be nonzero");
        assert!(
            bytes.len() % bytes_per_element == 0,
            "buffer length {} is not a multiple of bytes_per_element {}",
            bytes.len(),
            bytes_per_element
        );
        Self {
            bytes,
            bytes_per_element,
        }
    }

    /// Builds an all-zero buffer of `len` bytes, ready to receive a
    /// [`crate::archive::BinaryArchive::read`].
    pub fn zeroed(len: usize, bytes_per_element: usize) -> Self {
        Self::new(vec![0u8; len], bytes_per_element)
    }

    /// Consumes the view, returning its underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Borrows the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl StorageView for RawBuffer {
    fn size_in_bytes(&self) -> usize {
        self.bytes.len()
    }

    fn bytes_per_element(&self) -> usize {
        self.bytes_per_element
    }

    fn copy_into(&self, dst: &mut [u8]) {
        dst.copy_from_slice(&self.bytes);
    }

    fn copy_from(&mut self, src: &[u8]) {
        self.bytes.copy_from_slice(src);
    }
}
