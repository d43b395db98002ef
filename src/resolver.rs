use crate::arch::Arch;
use crate::code_region::CodeRegion;
use crate::error::{CapacityError, Error};
use crate::patch_set::{PatchSet, PatchSite};
use crate::signature::{find_matches, SignatureStyle};

/// Find the patch sites for `style` in `region`.
///
/// Succeeds only if exactly `expected_count` matches are found and they fit in
/// a [`PatchSet`] without filling it. Any other count means the compiled code
/// does not look the way we expect, and nothing must be patched. This never
/// writes to the region.
pub fn resolve<A: Arch>(
    region: &CodeRegion,
    style: SignatureStyle,
    expected_count: usize,
) -> Result<PatchSet, Error> {
    let signature = A::signature(style);
    let mut set = PatchSet::new();
    let mut found = 0;

    for offset in find_matches::<A>(region.bytes(), style) {
        found += 1;
        let address = region
            .address_at(offset + signature.patch_offset)
            .ok_or(Error::PatchMismatch {
                found,
                expected: expected_count,
            })?;
        let site = PatchSite::new(address, signature.original_byte(), A::PATCHED_BYTE);
        // Past capacity only the count matters; it fails the check below.
        if let Err(CapacityError) = set.try_push(site) {
            log::debug!("patch set full, dropping site 0x{:x}", address);
        }
    }

    if found != expected_count || set.is_full() {
        log::error!("patch error: cnt={} expect={}", found, expected_count);
        return Err(Error::PatchMismatch {
            found,
            expected: expected_count,
        });
    }

    Ok(set)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patch_set::MAX_PATCH_SITES;
    use crate::x86::ArchX86;
    use crate::x86_64::ArchX86_64;

    const OR_SIL_80: [u8; 4] = [0x40, 0x80, 0xce, 0x80];

    fn code_with_style_a_at(len: usize, offsets: &[usize]) -> Vec<u8> {
        let mut code = vec![0x90; len];
        for &offset in offsets {
            code[offset..offset + 4].copy_from_slice(&OR_SIL_80);
        }
        code
    }

    fn region_of(code: &[u8]) -> CodeRegion {
        unsafe { CodeRegion::from_raw_parts(code.as_ptr() as usize, code.len()) }
    }

    #[test]
    fn test_resolve_exact_count() {
        let code = code_with_style_a_at(32, &[3, 19]);
        let region = region_of(&code);
        let set = resolve::<ArchX86_64>(&region, SignatureStyle::A, 2).unwrap();
        let addresses: Vec<usize> = set.iter().map(PatchSite::address).collect();
        assert_eq!(
            addresses,
            vec![region.base() + 3 + 3, region.base() + 19 + 3]
        );
        assert!(set.iter().all(|site| site.original() == 0x80 && site.patched() == 0x00));
    }

    #[test]
    fn test_resolve_wrong_count() {
        let code = code_with_style_a_at(32, &[3, 19]);
        let region = region_of(&code);
        for expected in [0, 1, 3] {
            assert_eq!(
                resolve::<ArchX86_64>(&region, SignatureStyle::A, expected),
                Err(Error::PatchMismatch { found: 2, expected })
            );
        }
    }

    #[test]
    fn test_resolve_refuses_to_truncate() {
        let code = code_with_style_a_at(64, &[0, 8, 16, 24, 32]);
        let region = region_of(&code);
        assert_eq!(
            resolve::<ArchX86_64>(&region, SignatureStyle::A, 5),
            Err(Error::PatchMismatch {
                found: 5,
                expected: 5
            })
        );
    }

    #[test]
    fn test_resolve_full_set_is_rejected() {
        let code = code_with_style_a_at(64, &[0, 8, 16, 24]);
        let region = region_of(&code);
        assert_eq!(
            resolve::<ArchX86_64>(&region, SignatureStyle::A, MAX_PATCH_SITES),
            Err(Error::PatchMismatch {
                found: MAX_PATCH_SITES,
                expected: MAX_PATCH_SITES
            })
        );
    }

    #[test]
    fn test_resolve_counts_past_capacity() {
        let code = code_with_style_a_at(64, &[0, 8, 16, 24, 32, 40]);
        let region = region_of(&code);
        for expected in [MAX_PATCH_SITES, 6] {
            assert_eq!(
                resolve::<ArchX86_64>(&region, SignatureStyle::A, expected),
                Err(Error::PatchMismatch { found: 6, expected })
            );
        }
    }

    #[test]
    fn test_resolve_x86() {
        // 80 ca 80    or dl, 0x80
        // e8 ...      call dm_get_device
        let code = [0x89, 0xd8, 0x80, 0xca, 0x80, 0xe8, 0x10, 0x20, 0x30, 0x40];
        let region = region_of(&code);
        let set = resolve::<ArchX86>(&region, SignatureStyle::A, 1).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].address(), region.base() + 4);
    }

    #[test]
    fn test_resolve_does_not_write() {
        let code = code_with_style_a_at(16, &[4]);
        let before = code.clone();
        let region = region_of(&code);
        resolve::<ArchX86_64>(&region, SignatureStyle::A, 1).unwrap();
        assert_eq!(code, before);
    }
}
