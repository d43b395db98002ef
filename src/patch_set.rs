use arrayvec::ArrayVec;

use crate::error::CapacityError;
use crate::permission::page_base;

/// Upper bound on the number of sites tracked for one code region.
pub const MAX_PATCH_SITES: usize = 4;

/// The address of one mutable opcode byte, with the values it takes when
/// unpatched and patched.
///
/// Only the resolver creates these, so every site points into a code region
/// that was validated and scanned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchSite {
    address: usize,
    original: u8,
    patched: u8,
}

impl PatchSite {
    pub(crate) fn new(address: usize, original: u8, patched: u8) -> Self {
        Self {
            address,
            original,
            patched,
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn original(&self) -> u8 {
        self.original
    }

    pub fn patched(&self) -> u8 {
        self.patched
    }

    /// Base address of the page holding this site.
    pub fn page(&self, page_size: usize) -> usize {
        page_base(self.address, page_size)
    }
}

/// The patch sites found in one code region, in scan order.
///
/// Capacity is fixed at [`MAX_PATCH_SITES`]; [`PatchSet::try_push`] refuses
/// to grow past it instead of dropping sites.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatchSet {
    sites: ArrayVec<PatchSite, MAX_PATCH_SITES>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_push(&mut self, site: PatchSite) -> Result<(), CapacityError> {
        self.sites.try_push(site).map_err(|_| CapacityError)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sites.is_full()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, PatchSite> {
        self.sites.iter()
    }

    pub fn as_slice(&self) -> &[PatchSite] {
        &self.sites
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a PatchSite;
    type IntoIter = core::slice::Iter<'a, PatchSite>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
