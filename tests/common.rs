#![allow(dead_code)]

use dmpatch::cfi::{CET_ENDBR_EN, MSR_IA32_S_CET};
use dmpatch::*;

// 40 80 ce 80    or sil, 0x80
pub const STYLE_A_X86_64: [u8; 4] = [0x40, 0x80, 0xce, 0x80];
// 0c 80 89 c6    or al, 0x80; mov esi, eax
pub const STYLE_B_X86_64: [u8; 4] = [0x0c, 0x80, 0x89, 0xc6];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Writable(usize),
    ReadOnly(usize),
}

/// Records every toggle and refuses to make the listed pages writable.
#[derive(Debug, Default)]
pub struct RecordingPermissions {
    pub events: Vec<Event>,
    pub refused_pages: Vec<usize>,
}

impl PagePermissions for RecordingPermissions {
    fn make_writable(&mut self, page: usize) -> Result<(), PermissionError> {
        if self.refused_pages.contains(&page) {
            return Err(PermissionError { page, code: -1 });
        }
        self.events.push(Event::Writable(page));
        Ok(())
    }

    fn make_read_only(&mut self, page: usize) -> Result<(), PermissionError> {
        self.events.push(Event::ReadOnly(page));
        Ok(())
    }
}

/// An `IA32_S_CET` register in memory.
#[derive(Debug, Default)]
pub struct SimulatedMsr {
    pub s_cet: u64,
    pub writes: Vec<u64>,
}

unsafe impl MsrAccess for SimulatedMsr {
    fn read(&mut self, msr: u32) -> u64 {
        assert_eq!(msr, MSR_IA32_S_CET);
        self.s_cet
    }

    fn write(&mut self, msr: u32, value: u64) {
        assert_eq!(msr, MSR_IA32_S_CET);
        self.s_cet = value;
        self.writes.push(value);
    }
}

pub fn ibt_guard(s_cet: u64) -> IbtGuard<SimulatedMsr> {
    IbtGuard::new(SimulatedMsr {
        s_cet,
        writes: Vec::new(),
    })
}

pub fn endbr_set(guard: &IbtGuard<SimulatedMsr>) -> bool {
    guard.msr().s_cet & CET_ENDBR_EN != 0
}

/// `len` bytes of `int3` with `template` copied in at each offset.
pub fn code_with(len: usize, template: [u8; 4], offsets: &[usize]) -> Vec<u8> {
    let mut code = vec![0xcc; len];
    for &offset in offsets {
        code[offset..offset + 4].copy_from_slice(&template);
    }
    code
}

pub fn region_of(code: &mut [u8]) -> CodeRegion {
    unsafe { CodeRegion::from_raw_parts(code.as_mut_ptr() as usize, code.len()) }
}

pub fn config_for(
    acquire: &mut [u8],
    release: &mut [u8],
    kernel_major: usize,
    page_size: usize,
) -> PatchConfig {
    PatchConfig {
        page_size,
        acquire: region_of(acquire),
        release: region_of(release),
        kernel_major,
        cfi_enabled: true,
    }
}
