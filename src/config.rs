//! The parameter block filled in by the host loader, and its validated form.

use core::mem::size_of;

use crate::code_region::CodeRegion;
use crate::error::{ConfigError, Error};

/// Marks the start of a [`PatchParams`] block so the loader can find it.
pub const PARAMS_MAGIC: [u8; 16] = [
    0xb0, 0xb1, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf,
];

/// `ibt_marker` value that turns on branch-tracking suspension.
pub const IBT_MARKER: usize = 0x8888;

/// Parameter block shared with the host loader. Field order and widths are
/// part of the loader contract.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct PatchParams {
    pub magic: [u8; 16],
    /// Must equal `size_of::<PatchParams>()`.
    pub struct_size: usize,
    pub page_size: usize,
    pub printk_addr: usize,
    pub set_memory_ro_addr: usize,
    pub set_memory_rw_addr: usize,
    pub register_kprobe_addr: usize,
    pub unregister_kprobe_addr: usize,
    /// `dm_get_table_device`
    pub acquire_addr: usize,
    pub acquire_size: usize,
    /// `dm_put_table_device`
    pub release_addr: usize,
    pub release_size: usize,
    pub kernel_major: usize,
    pub ibt_marker: usize,
    pub padding: [usize; 1],
}

impl Default for PatchParams {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchParams {
    /// An empty block carrying the magic and the expected size.
    pub const fn new() -> Self {
        Self {
            magic: PARAMS_MAGIC,
            struct_size: size_of::<Self>(),
            page_size: 0,
            printk_addr: 0,
            set_memory_ro_addr: 0,
            set_memory_rw_addr: 0,
            register_kprobe_addr: 0,
            unregister_kprobe_addr: 0,
            acquire_addr: 0,
            acquire_size: 0,
            release_addr: 0,
            release_size: 0,
            kernel_major: 0,
            ibt_marker: 0,
            padding: [0],
        }
    }

    /// Check the block without looking at any of the memory it points to.
    pub fn check(&self) -> Result<(), Error> {
        let magic = self.magic;
        if magic != PARAMS_MAGIC {
            return Err(ConfigError::BadMagic.into());
        }

        let declared = self.struct_size;
        let expected = size_of::<Self>();
        if declared != expected {
            log::error!("Invalid struct size {} {}", declared, expected);
            return Err(ConfigError::SizeMismatch { declared, expected }.into());
        }

        let required = [
            ("acquire_addr", self.acquire_addr),
            ("release_addr", self.release_addr),
            ("set_memory_ro_addr", self.set_memory_ro_addr),
            ("set_memory_rw_addr", self.set_memory_rw_addr),
        ];
        for (name, address) in required {
            if address == 0 {
                log::error!("{} is null", name);
                return Err(ConfigError::NullAddress(name).into());
            }
        }

        let page_size = self.page_size;
        if !page_size.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize(page_size).into());
        }

        if self.acquire_size == 0 {
            return Err(ConfigError::EmptyRegion("acquire_size").into());
        }
        if self.release_size == 0 {
            return Err(ConfigError::EmptyRegion("release_size").into());
        }

        Ok(())
    }

    /// Validate the block and build the view the patcher works with.
    ///
    /// # Safety
    ///
    /// The acquire and release spans must be mapped kernel text that stays
    /// loaded while the returned config (or anything derived from it) is used.
    pub unsafe fn to_config(&self) -> Result<PatchConfig, Error> {
        self.check()?;
        Ok(PatchConfig {
            page_size: self.page_size,
            acquire: CodeRegion::from_raw_parts(self.acquire_addr, self.acquire_size),
            release: CodeRegion::from_raw_parts(self.release_addr, self.release_size),
            kernel_major: self.kernel_major,
            cfi_enabled: self.ibt_marker == IBT_MARKER,
        })
    }
}

/// Validated patcher configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchConfig {
    pub page_size: usize,
    pub acquire: CodeRegion,
    pub release: CodeRegion,
    pub kernel_major: usize,
    pub cfi_enabled: bool,
}

/// Decides whether the alternate acquire signature may be tried, given the
/// host kernel's major version.
pub type VersionGate = fn(usize) -> bool;

/// The alternate encoding only shows up on 5.x and later kernels.
pub fn default_version_gate(kernel_major: usize) -> bool {
    kernel_major >= 5
}
