use core::fmt;
use core::iter::{Enumerate, FusedIterator};
use core::slice::Windows;

use crate::arch::Arch;

const TEMPLATE_LEN: usize = 4;

/// Which of the known encodings of the branch idiom to scan for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureStyle {
    A,
    B,
}

impl fmt::Display for SignatureStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureStyle::A => f.write_str("A"),
            SignatureStyle::B => f.write_str("B"),
        }
    }
}

/// A fixed 4-byte instruction template plus the position of the opcode byte
/// inside it that gets rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    pub template: [u8; TEMPLATE_LEN],
    pub patch_offset: usize,
}

impl Signature {
    pub const LEN: usize = TEMPLATE_LEN;

    /// The byte found at the patch offset in unmodified code.
    pub fn original_byte(&self) -> u8 {
        self.template[self.patch_offset]
    }

    /// Scan `buffer` for this template. See [`find_matches`].
    pub fn find_in<'a>(&self, buffer: &'a [u8]) -> Matches<'a> {
        Matches {
            windows: buffer.windows(Self::LEN).enumerate(),
            template: self.template,
        }
    }
}

/// Return the offsets in `buffer` where the `style` template of `A` starts.
///
/// Every start offset from 0 to `buffer.len() - 4` is checked independently
/// and in ascending order, so overlapping matches are all reported. A buffer
/// shorter than the template yields nothing.
pub fn find_matches<A: Arch>(buffer: &[u8], style: SignatureStyle) -> Matches<'_> {
    A::signature(style).find_in(buffer)
}

/// Iterator over template start offsets, produced by [`find_matches`].
#[derive(Clone, Debug)]
pub struct Matches<'a> {
    windows: Enumerate<Windows<'a, u8>>,
    template: [u8; TEMPLATE_LEN],
}

impl Iterator for Matches<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let template = self.template;
        self.windows
            .find(|(_, window)| *window == template)
            .map(|(offset, _)| offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.windows.size_hint().1)
    }
}

impl FusedIterator for Matches<'_> {}
