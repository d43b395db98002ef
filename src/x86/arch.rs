use crate::arch::Arch;
use crate::signature::Signature;

// 80 ca 80       or dl, 0x80
// e8 ..          call
const OR_DL_THEN_CALL: Signature = Signature {
    template: [0x80, 0xca, 0x80, 0xe8],
    patch_offset: 2,
};

/// 32-bit x86. Both styles use the same template; the compiler has not been
/// seen emitting a second form here.
pub struct ArchX86;
impl Arch for ArchX86 {
    const NAME: &'static str = "x86";
    const STYLE_A: Signature = OR_DL_THEN_CALL;
    const STYLE_B: Signature = OR_DL_THEN_CALL;
}
