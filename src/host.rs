//! Host kernel entry points, resolved from the addresses in [`PatchParams`].

use core::ffi::{c_char, c_int, c_ulong, c_void};
use core::fmt::{self, Write};
use core::mem::transmute;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arrayvec::ArrayString;

use crate::config::PatchParams;
use crate::permission::{PagePermissions, PermissionError};

pub type PrintkFn = unsafe extern "C" fn(fmt: *const c_char, ...) -> c_int;
pub type SetMemoryAttrFn = unsafe extern "C" fn(addr: c_ulong, numpages: c_int) -> c_int;
pub type RegisterKprobeFn = unsafe extern "C" fn(probe: *mut c_void) -> c_int;
pub type UnregisterKprobeFn = unsafe extern "C" fn(probe: *mut c_void);

/// Entry points the patcher calls into.
///
/// The kprobe entry points are resolved for completeness; patching does not
/// use them.
#[derive(Clone, Copy)]
pub struct HostServices {
    pub printk: Option<PrintkFn>,
    pub set_memory_ro: SetMemoryAttrFn,
    pub set_memory_rw: SetMemoryAttrFn,
    pub register_kprobe: Option<RegisterKprobeFn>,
    pub unregister_kprobe: Option<UnregisterKprobeFn>,
}

impl HostServices {
    /// # Safety
    ///
    /// `params` must have passed [`PatchParams::check`], and every non-zero
    /// entry point address must be a function with the matching signature.
    pub unsafe fn from_params(params: &PatchParams) -> Self {
        Self {
            printk: optional(params.printk_addr).map(|addr| transmute::<usize, PrintkFn>(addr)),
            set_memory_ro: transmute::<usize, SetMemoryAttrFn>(params.set_memory_ro_addr),
            set_memory_rw: transmute::<usize, SetMemoryAttrFn>(params.set_memory_rw_addr),
            register_kprobe: optional(params.register_kprobe_addr)
                .map(|addr| transmute::<usize, RegisterKprobeFn>(addr)),
            unregister_kprobe: optional(params.unregister_kprobe_addr)
                .map(|addr| transmute::<usize, UnregisterKprobeFn>(addr)),
        }
    }
}

fn optional(address: usize) -> Option<usize> {
    if address == 0 {
        None
    } else {
        Some(address)
    }
}

impl PagePermissions for HostServices {
    fn make_writable(&mut self, page: usize) -> Result<(), PermissionError> {
        let code = unsafe { (self.set_memory_rw)(page as c_ulong, 1) };
        if code != 0 {
            return Err(PermissionError { page, code });
        }
        Ok(())
    }

    fn make_read_only(&mut self, page: usize) -> Result<(), PermissionError> {
        let code = unsafe { (self.set_memory_ro)(page as c_ulong, 1) };
        if code != 0 {
            return Err(PermissionError { page, code });
        }
        Ok(())
    }
}

/// Longest message forwarded to printk; longer ones are cut off.
pub const MAX_LINE: usize = 192;

// KERN_ERR "dmpatch: %s\n"
const PRINTK_FORMAT: &[u8] = b"\x013dmpatch: %s\n\0";

static PRINTK_ADDR: AtomicUsize = AtomicUsize::new(0);
static LOGGER: PrintkLogger = PrintkLogger;
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// `log` backend that forwards records to the host's printk.
///
/// With no printk address installed, records are dropped.
pub struct PrintkLogger;

impl PrintkLogger {
    /// Route `log` records to the printk at `printk_addr` (0 disables output).
    ///
    /// # Safety
    ///
    /// `printk_addr` must be 0 or the address of a printk-compatible variadic
    /// function that stays valid for the rest of the program.
    pub unsafe fn install(printk_addr: usize) {
        PRINTK_ADDR.store(printk_addr, Ordering::Release);
        if log::set_logger(&LOGGER).is_ok() {
            INSTALLED.store(true, Ordering::Release);
        }
        // Another logger may already be set, e.g. in tests; leave its level alone.
        if INSTALLED.load(Ordering::Acquire) {
            log::set_max_level(if printk_addr == 0 {
                log::LevelFilter::Off
            } else {
                log::LevelFilter::Debug
            });
        }
    }

    fn printk() -> Option<PrintkFn> {
        optional(PRINTK_ADDR.load(Ordering::Acquire))
            .map(|addr| unsafe { transmute::<usize, PrintkFn>(addr) })
    }
}

impl log::Log for PrintkLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        PRINTK_ADDR.load(Ordering::Relaxed) != 0
    }

    fn log(&self, record: &log::Record) {
        let Some(printk) = Self::printk() else {
            return;
        };
        let line = render_line(*record.args());
        unsafe {
            printk(
                PRINTK_FORMAT.as_ptr() as *const c_char,
                line.as_ptr() as *const c_char,
            );
        }
    }

    fn flush(&self) {}
}

/// Writes as much of the input as fits, dropping the rest.
struct Truncating(ArrayString<MAX_LINE>);

impl Write for Truncating {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.try_push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Format `args` into a NUL-terminated buffer.
fn render_line(args: fmt::Arguments<'_>) -> [u8; MAX_LINE + 1] {
    let mut text = Truncating(ArrayString::new());
    let _ = text.write_fmt(args);
    let mut line = [0u8; MAX_LINE + 1];
    // Interior NULs would end the string early on the C side.
    for (dst, src) in line.iter_mut().zip(text.0.bytes()) {
        *dst = if src == 0 { b'?' } else { src };
    }
    line
}

#[cfg(test)]
mod test {
    use super::*;

    static RW_CALLS: AtomicUsize = AtomicUsize::new(0);
    static RO_CALLS: AtomicUsize = AtomicUsize::new(0);
    static LAST_PAGE: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn fake_set_memory_rw(addr: c_ulong, numpages: c_int) -> c_int {
        assert_eq!(numpages, 1);
        RW_CALLS.fetch_add(1, Ordering::SeqCst);
        LAST_PAGE.store(addr as usize, Ordering::SeqCst);
        0
    }

    unsafe extern "C" fn fake_set_memory_ro(_addr: c_ulong, _numpages: c_int) -> c_int {
        RO_CALLS.fetch_add(1, Ordering::SeqCst);
        -22
    }

    fn line_str(line: &[u8]) -> &str {
        let end = line.iter().position(|&b| b == 0).unwrap();
        std::str::from_utf8(&line[..end]).unwrap()
    }

    #[test]
    fn test_render_line() {
        let line = render_line(format_args!("patch for {} style[{}]", "dm_get_table_device", "A"));
        assert_eq!(line_str(&line), "patch for dm_get_table_device style[A]");
    }

    #[test]
    fn test_render_line_truncates() {
        let long = "x".repeat(MAX_LINE * 2);
        let line = render_line(format_args!("{}", long));
        assert_eq!(line_str(&line).len(), MAX_LINE);
        assert_eq!(line[MAX_LINE], 0);
    }

    #[test]
    fn test_host_permissions() {
        let params = PatchParams {
            set_memory_rw_addr: fake_set_memory_rw as usize,
            set_memory_ro_addr: fake_set_memory_ro as usize,
            ..PatchParams::new()
        };
        let mut host = unsafe { HostServices::from_params(&params) };
        assert!(host.printk.is_none());
        assert!(host.register_kprobe.is_none());

        assert_eq!(host.make_writable(0x7000), Ok(()));
        assert_eq!(RW_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(LAST_PAGE.load(Ordering::SeqCst), 0x7000);

        assert_eq!(
            host.make_read_only(0x7000),
            Err(PermissionError {
                page: 0x7000,
                code: -22
            })
        );
        assert_eq!(RO_CALLS.load(Ordering::SeqCst), 1);
    }
}
