use core::slice;

/// A span of executable memory, viewed in place.
///
/// The region is neither owned nor copied. The resolver reads it in place, and
/// the patch engine later writes single bytes inside it through
/// [`PatchSite`](crate::PatchSite) values derived from it. Because of those
/// writes there is no public way to borrow the region's bytes:
///
/// ```compile_fail
/// let code = [0x90u8; 8];
/// let region = unsafe { dmpatch::CodeRegion::from_raw_parts(code.as_ptr() as usize, code.len()) };
/// let view: &[u8] = region.bytes();
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeRegion {
    base: usize,
    len: usize,
}

impl CodeRegion {
    /// Create a view over `len` bytes of code starting at `base`.
    ///
    /// # Safety
    ///
    /// `base..base + len` must be readable memory for as long as the region
    /// (or any patch site derived from it) is in use, and must not be
    /// deallocated or remapped while it is. Applying or restoring sites
    /// derived from the region writes into it, so no reference to that memory
    /// may be live across those calls.
    pub unsafe fn from_raw_parts(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The absolute address of the byte at `offset`, or `None` if `offset` is
    /// outside the region.
    pub fn address_at(&self, offset: usize) -> Option<usize> {
        if offset < self.len {
            Some(self.base + offset)
        } else {
            None
        }
    }

    /// The code bytes of this region.
    ///
    /// Only for scans that finish before anything is written to the region.
    pub(crate) fn bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // Validity of the span is the contract of `from_raw_parts`.
        unsafe { slice::from_raw_parts(self.base as *const u8, self.len) }
    }
}
