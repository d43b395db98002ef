use crate::signature::{Signature, SignatureStyle};

/// Per-architecture byte templates for the patched branch idiom.
///
/// Architecture selection is a compile-time choice of the implementing type;
/// see [`ArchNative`](crate::ArchNative).
pub trait Arch {
    const NAME: &'static str;

    /// Primary encoding of the idiom.
    const STYLE_A: Signature;

    /// Alternate encoding emitted by newer compilers for the acquire path.
    const STYLE_B: Signature;

    /// Replacement for the mutable byte. Turns the flag-setting `or` into a
    /// no-op so the guarded check always passes.
    const PATCHED_BYTE: u8 = 0x00;

    fn signature(style: SignatureStyle) -> Signature {
        match style {
            SignatureStyle::A => Self::STYLE_A,
            SignatureStyle::B => Self::STYLE_B,
        }
    }
}
