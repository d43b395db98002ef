use core::marker::PhantomData;

use crate::arch::Arch;
use crate::cfi::CfiGuard;
use crate::code_region::CodeRegion;
use crate::config::{default_version_gate, PatchConfig};
use crate::engine::{PatchEngine, RestoreReport};
use crate::error::Error;
use crate::patch_set::PatchSet;
use crate::permission::PagePermissions;
use crate::resolver::resolve;
use crate::signature::SignatureStyle;

/// Symbol the acquire region is taken from.
pub const ACQUIRE_SYMBOL: &str = "dm_get_table_device";

/// Symbol the release region is taken from.
pub const RELEASE_SYMBOL: &str = "dm_put_table_device";

const ACQUIRE_EXPECTED: usize = 2;
const ACQUIRE_ALTERNATE_EXPECTED: usize = 1;
const RELEASE_EXPECTED: usize = 1;

/// Load/unload state for one patching session.
///
/// Sets are tracked as soon as they are resolved, before they are applied,
/// so that [`Patcher::unload`] also undoes a partially applied set. Call
/// `unload` even after a failed load.
pub struct Patcher<P: PagePermissions, C: CfiGuard, A: Arch> {
    engine: PatchEngine<P, C>,
    config: PatchConfig,
    acquire: Option<PatchSet>,
    release: Option<PatchSet>,
    _arch: PhantomData<A>,
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl<P: PagePermissions, C: CfiGuard> Patcher<P, C, crate::ArchNative> {
    pub fn new(permissions: P, cfi: C, config: PatchConfig) -> Self {
        Self::with_arch(permissions, cfi, config)
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl
    Patcher<
        crate::host::HostServices,
        Option<crate::cfi::NativeCfi>,
        crate::ArchNative,
    >
{
    /// Validate `params`, hook up the host logger and resolve the host entry
    /// points. Fails before touching any code if the block is invalid.
    ///
    /// # Safety
    ///
    /// Must run in the host kernel, with `params` filled in by the loader:
    /// the entry points must be valid and the code regions mapped.
    pub unsafe fn from_params(params: &crate::config::PatchParams) -> Result<Self, Error> {
        crate::host::PrintkLogger::install(params.printk_addr);
        log::debug!("dmpatch_init start pagesize={} ...", { params.page_size });

        let config = params.to_config()?;
        let host = crate::host::HostServices::from_params(params);
        let cfi = if config.cfi_enabled {
            Some(crate::cfi::native_guard())
        } else {
            None
        };
        Ok(Self::new(host, cfi, config))
    }
}

impl<P: PagePermissions, C: CfiGuard, A: Arch> Patcher<P, C, A> {
    pub fn with_arch(permissions: P, cfi: C, config: PatchConfig) -> Self {
        Self {
            engine: PatchEngine::new(permissions, cfi, config.page_size),
            config,
            acquire: None,
            release: None,
            _arch: PhantomData,
        }
    }

    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    pub fn engine(&self) -> &PatchEngine<P, C> {
        &self.engine
    }

    pub fn acquire_sites(&self) -> Option<&PatchSet> {
        self.acquire.as_ref()
    }

    pub fn release_sites(&self) -> Option<&PatchSet> {
        self.release.as_ref()
    }

    /// Patch both regions, gating the alternate acquire signature on
    /// [`default_version_gate`].
    pub fn load(&mut self) -> Result<(), Error> {
        self.load_with_gate(default_version_gate)
    }

    /// Patch the acquire region, then the release region.
    ///
    /// If the primary acquire signature does not match and `gate` accepts the
    /// host kernel version, the alternate signature is tried instead.
    pub fn load_with_gate<G>(&mut self, gate: G) -> Result<(), Error>
    where
        G: Fn(usize) -> bool,
    {
        let acquire = self.config.acquire;
        let set = match resolve_region::<A>(
            ACQUIRE_SYMBOL,
            &acquire,
            SignatureStyle::A,
            ACQUIRE_EXPECTED,
        ) {
            Ok(set) => set,
            Err(err) if gate(self.config.kernel_major) => {
                log::info!("new patch {}... ({})", ACQUIRE_SYMBOL, err);
                resolve_region::<A>(
                    ACQUIRE_SYMBOL,
                    &acquire,
                    SignatureStyle::B,
                    ACQUIRE_ALTERNATE_EXPECTED,
                )?
            }
            Err(err) => return Err(err),
        };
        let set = self.acquire.insert(set);
        self.engine.apply(set)?;
        log::info!("patch {} success", ACQUIRE_SYMBOL);

        let release = self.config.release;
        let set = resolve_region::<A>(
            RELEASE_SYMBOL,
            &release,
            SignatureStyle::A,
            RELEASE_EXPECTED,
        )?;
        let set = self.release.insert(set);
        self.engine.apply(set)?;
        log::info!("patch {} success", RELEASE_SYMBOL);

        log::info!("#####################################");
        log::info!("######## dm patch success ###########");
        log::info!("#####################################");
        Ok(())
    }

    /// Restore every tracked site in both regions and end the session.
    ///
    /// Keeps going past sites that fail to restore.
    pub fn unload(self) -> RestoreReport {
        self.unload_into_parts().0
    }

    /// Like [`Patcher::unload`], but also hands back the permission toggle
    /// and CFI guard.
    pub fn unload_into_parts(self) -> (RestoreReport, P, C) {
        let Self {
            mut engine,
            acquire,
            release,
            ..
        } = self;
        let report = engine.restore_all(acquire.iter().chain(release.iter()).flatten());
        if report.is_success() {
            log::info!("dmpatch_exit success");
        } else {
            log::error!(
                "dmpatch_exit: {} sites restored, {} failed",
                report.restored,
                report.failed
            );
        }
        let (permissions, cfi) = engine.into_parts();
        (report, permissions, cfi)
    }
}

fn resolve_region<A: Arch>(
    name: &str,
    region: &CodeRegion,
    style: SignatureStyle,
    expected_count: usize,
) -> Result<PatchSet, Error> {
    log::debug!(
        "patch for {} style[{}] 0x{:x} {} ({})",
        name,
        style,
        region.base(),
        region.len(),
        A::NAME
    );
    resolve::<A>(region, style, expected_count)
}
