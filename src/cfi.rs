//! Indirect-branch-tracking suspension around code mutation.
//!
//! With kernel IBT enabled, patching and then running patched code can fault
//! unless `ENDBR_EN` is cleared in `IA32_S_CET` first. A [`CfiGuard`] saves the
//! enforcement state, turns it off, and later puts back exactly the bit that
//! was saved. Without the `ibt` feature the native guard is [`NoCfi`].

/// Kernel-mode CET configuration register.
pub const MSR_IA32_S_CET: u32 = 0x6a2;

/// Enforce ENDBR landing pads on indirect branches.
pub const CET_ENDBR_EN: u64 = 1 << 2;

/// Opaque enforcement state captured by [`CfiGuard::save`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CfiSaveState(u64);

impl CfiSaveState {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn endbr_enabled(self) -> bool {
        self.0 & CET_ENDBR_EN != 0
    }
}

pub trait CfiGuard {
    /// Capture the current enforcement state and disable enforcement.
    fn save(&mut self) -> CfiSaveState;

    /// Put back the enforcement flag captured in `state`.
    fn restore(&mut self, state: CfiSaveState);
}

/// Guard for builds or hosts without branch tracking.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCfi;

impl CfiGuard for NoCfi {
    fn save(&mut self) -> CfiSaveState {
        CfiSaveState::default()
    }

    fn restore(&mut self, _state: CfiSaveState) {}
}

/// `None` means bracketing is disabled by configuration.
impl<G: CfiGuard> CfiGuard for Option<G> {
    fn save(&mut self) -> CfiSaveState {
        match self {
            Some(guard) => guard.save(),
            None => CfiSaveState::default(),
        }
    }

    fn restore(&mut self, state: CfiSaveState) {
        if let Some(guard) = self {
            guard.restore(state);
        }
    }
}

impl<G: CfiGuard + ?Sized> CfiGuard for &mut G {
    fn save(&mut self) -> CfiSaveState {
        (**self).save()
    }

    fn restore(&mut self, state: CfiSaveState) {
        (**self).restore(state)
    }
}

/// Run `f` with enforcement suspended. The saved state is restored whatever
/// `f` returns.
pub fn bracket<C, T, F>(guard: &mut C, f: F) -> T
where
    C: CfiGuard + ?Sized,
    F: FnOnce() -> T,
{
    let state = guard.save();
    let result = f();
    guard.restore(state);
    result
}

/// Model-specific register access.
///
/// # Safety
///
/// Implementations are trusted to read and write the register they are asked
/// for. Any type that touches real hardware must only be constructible in a
/// context allowed to execute `rdmsr`/`wrmsr`.
pub unsafe trait MsrAccess {
    fn read(&mut self, msr: u32) -> u64;
    fn write(&mut self, msr: u32, value: u64);
}

/// Suspends ENDBR enforcement through `IA32_S_CET`.
#[derive(Debug)]
pub struct IbtGuard<M: MsrAccess> {
    msr: M,
}

impl<M: MsrAccess> IbtGuard<M> {
    pub fn new(msr: M) -> Self {
        Self { msr }
    }

    pub fn msr(&self) -> &M {
        &self.msr
    }
}

impl<M: MsrAccess> CfiGuard for IbtGuard<M> {
    fn save(&mut self) -> CfiSaveState {
        let saved = self.msr.read(MSR_IA32_S_CET);
        self.msr.write(MSR_IA32_S_CET, saved & !CET_ENDBR_EN);
        CfiSaveState(saved)
    }

    fn restore(&mut self, state: CfiSaveState) {
        // Other CET bits may have changed in between; only ENDBR_EN is ours.
        let current = self.msr.read(MSR_IA32_S_CET);
        let value = (current & !CET_ENDBR_EN) | (state.0 & CET_ENDBR_EN);
        self.msr.write(MSR_IA32_S_CET, value);
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(feature = "ibt", any(target_arch = "x86", target_arch = "x86_64")))] {
        /// `rdmsr`/`wrmsr` on the current CPU.
        #[derive(Debug)]
        pub struct NativeMsr(());

        impl NativeMsr {
            /// # Safety
            ///
            /// Must only be used at CPL 0 on a CPU that implements the
            /// registers it is asked to access.
            pub unsafe fn new() -> Self {
                NativeMsr(())
            }
        }

        unsafe impl MsrAccess for NativeMsr {
            fn read(&mut self, msr: u32) -> u64 {
                let low: u32;
                let high: u32;
                unsafe {
                    core::arch::asm!(
                        "rdmsr",
                        in("ecx") msr,
                        out("eax") low,
                        out("edx") high,
                        options(nomem, nostack, preserves_flags)
                    );
                }
                ((high as u64) << 32) | (low as u64)
            }

            fn write(&mut self, msr: u32, value: u64) {
                let low = value as u32;
                let high = (value >> 32) as u32;
                unsafe {
                    core::arch::asm!(
                        "wrmsr",
                        in("ecx") msr,
                        in("eax") low,
                        in("edx") high,
                        options(nostack, preserves_flags)
                    );
                }
            }
        }

        pub type NativeCfi = IbtGuard<NativeMsr>;

        /// # Safety
        ///
        /// See [`NativeMsr::new`].
        pub unsafe fn native_guard() -> NativeCfi {
            IbtGuard::new(NativeMsr::new())
        }
    } else {
        pub type NativeCfi = NoCfi;

        /// # Safety
        ///
        /// Always safe in this configuration; kept `unsafe` to match the
        /// `ibt` build.
        pub unsafe fn native_guard() -> NativeCfi {
            NoCfi
        }
    }
}
