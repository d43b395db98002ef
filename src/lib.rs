//! Signature-driven single-byte patching of compiled kernel functions.
//!
//! Given the address and length of a compiled function, `dmpatch` scans its
//! machine code for a known 4-byte instruction template, locates the opcode
//! byte that sets a flag in front of a conditional check, and overwrites it so
//! the check always passes. Unloading writes the original bytes back.
//!
//! The pieces, leaves first:
//!
//! - [`find_matches`] scans a byte buffer for the template of a [`SignatureStyle`].
//! - [`resolve`] turns matches inside a [`CodeRegion`] into a [`PatchSet`], and
//!   refuses anything but the exact expected number of matches.
//! - [`PatchEngine`] writes the bytes, each inside its own
//!   [`PermissionWindow`], with branch tracking suspended by a [`CfiGuard`]
//!   for the whole pass.
//! - [`Patcher`] runs the engine over the acquire and release regions named
//!   in a [`PatchParams`] block.
//!
//! Templates are per architecture ([`x86_64::ArchX86_64`], [`x86::ArchX86`]);
//! [`ArchNative`] is the one for the target being compiled for.
#![cfg_attr(not(feature = "std"), no_std)]

mod arch;
pub mod cfi;
mod code_region;
pub mod config;
mod engine;
mod error;
pub mod host;
mod patch_set;
mod patcher;
mod permission;
mod resolver;
mod signature;

pub mod x86;
pub mod x86_64;

pub use arch::Arch;
pub use cfi::{CfiGuard, CfiSaveState, IbtGuard, MsrAccess, NoCfi};
pub use code_region::CodeRegion;
pub use config::{PatchConfig, PatchParams};
pub use engine::{PatchEngine, RestoreReport};
pub use error::{CapacityError, ConfigError, Error};
pub use patch_set::{PatchSet, PatchSite, MAX_PATCH_SITES};
pub use patcher::{Patcher, ACQUIRE_SYMBOL, RELEASE_SYMBOL};
pub use permission::{page_base, PagePermissions, PermissionError, PermissionWindow};
pub use resolver::resolve;
pub use signature::{find_matches, Matches, Signature, SignatureStyle};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub type ArchNative = x86_64::ArchX86_64;
    } else if #[cfg(target_arch = "x86")] {
        pub type ArchNative = x86::ArchX86;
    }
}
