use crate::arch::Arch;
use crate::signature::Signature;

pub struct ArchX86_64;
impl Arch for ArchX86_64 {
    const NAME: &'static str = "x86_64";

    // 40 80 ce 80    or sil, 0x80
    const STYLE_A: Signature = Signature {
        template: [0x40, 0x80, 0xce, 0x80],
        patch_offset: 3,
    };

    // 0c 80          or al, 0x80
    // 89 c6          mov esi, eax
    const STYLE_B: Signature = Signature {
        template: [0x0c, 0x80, 0x89, 0xc6],
        patch_offset: 1,
    };
}
