use crate::cfi::{bracket, CfiGuard};
use crate::error::Error;
use crate::patch_set::{PatchSet, PatchSite};
use crate::permission::{PagePermissions, PermissionWindow};

/// The only component that writes to code memory.
///
/// Every byte write happens inside its own [`PermissionWindow`], and every
/// pass over a set of sites runs with branch tracking suspended through the
/// engine's [`CfiGuard`].
pub struct PatchEngine<P: PagePermissions, C: CfiGuard> {
    permissions: P,
    cfi: C,
    page_size: usize,
}

/// Outcome of a restore pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub failed: usize,
    pub first_error: Option<Error>,
}

impl RestoreReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl<P: PagePermissions, C: CfiGuard> PatchEngine<P, C> {
    pub fn new(permissions: P, cfi: C, page_size: usize) -> Self {
        Self {
            permissions,
            cfi,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn permissions(&self) -> &P {
        &self.permissions
    }

    pub fn cfi(&self) -> &C {
        &self.cfi
    }

    pub fn into_parts(self) -> (P, C) {
        (self.permissions, self.cfi)
    }

    /// Write the patched byte at every site of `set`.
    ///
    /// Stops at the first site whose page cannot be made writable. Sites
    /// already written in this call stay patched; [`PatchEngine::restore_all`]
    /// is expected to clean them up.
    pub fn apply(&mut self, set: &PatchSet) -> Result<(), Error> {
        let Self {
            permissions,
            cfi,
            page_size,
        } = self;
        bracket(cfi, || {
            set.iter()
                .try_for_each(|site| write_site(permissions, *page_size, site, site.patched()))
        })
    }

    /// Write the original byte back at `site`. Not bracketed; use
    /// [`PatchEngine::restore_all`] for a full pass.
    pub fn restore(&mut self, site: &PatchSite) -> Result<(), Error> {
        write_site(&mut self.permissions, self.page_size, site, site.original())
    }

    /// Restore every site in `sites`, continuing past failures.
    pub fn restore_all<'a, I>(&mut self, sites: I) -> RestoreReport
    where
        I: IntoIterator<Item = &'a PatchSite>,
    {
        let Self {
            permissions,
            cfi,
            page_size,
        } = self;
        bracket(cfi, || {
            let mut report = RestoreReport::default();
            for site in sites {
                match write_site(permissions, *page_size, site, site.original()) {
                    Ok(()) => report.restored += 1,
                    Err(err) => {
                        report.failed += 1;
                        report.first_error.get_or_insert(err);
                    }
                }
            }
            report
        })
    }
}

fn write_site<P: PagePermissions>(
    permissions: &mut P,
    page_size: usize,
    site: &PatchSite,
    value: u8,
) -> Result<(), Error> {
    let page = site.page(page_size);
    let mut window = PermissionWindow::open(permissions, page).map_err(|err| {
        log::error!(
            "set_memory_rw failed for page 0x{:x} ({}), site 0x{:x} left untouched",
            err.page,
            err.code,
            site.address()
        );
        Error::PermissionFailure { page }
    })?;
    // The site was produced by the resolver from a scanned code region and the
    // window makes its page writable.
    unsafe { window.write_byte(site.address(), value) };
    log::debug!("wrote 0x{:02x} at 0x{:x}", value, site.address());
    Ok(())
}
