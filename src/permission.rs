/// The page-permission toggling error returned by a [`PagePermissions`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionError {
    pub page: usize,
    pub code: i32,
}

/// Host capability to flip a single page of code between read-only and
/// writable.
///
/// `page` is always page-aligned (see [`page_base`]).
pub trait PagePermissions {
    fn make_writable(&mut self, page: usize) -> Result<(), PermissionError>;
    fn make_read_only(&mut self, page: usize) -> Result<(), PermissionError>;
}

impl<P: PagePermissions + ?Sized> PagePermissions for &mut P {
    fn make_writable(&mut self, page: usize) -> Result<(), PermissionError> {
        (**self).make_writable(page)
    }

    fn make_read_only(&mut self, page: usize) -> Result<(), PermissionError> {
        (**self).make_read_only(page)
    }
}

/// Round `address` down to the start of its page.
pub fn page_base(address: usize, page_size: usize) -> usize {
    address / page_size * page_size
}

/// A page that is writable for as long as this value lives.
///
/// Dropping the window makes the page read-only again.
pub struct PermissionWindow<'p, P: PagePermissions> {
    permissions: &'p mut P,
    page: usize,
}

impl<'p, P: PagePermissions> PermissionWindow<'p, P> {
    pub fn open(permissions: &'p mut P, page: usize) -> Result<Self, PermissionError> {
        permissions.make_writable(page)?;
        Ok(Self { permissions, page })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Write one byte inside the window's page.
    ///
    /// # Safety
    ///
    /// `address` must be a mapped code byte inside this window's page and no
    /// other thread may be executing the instruction it belongs to.
    pub unsafe fn write_byte(&mut self, address: usize, value: u8) {
        debug_assert!(address >= self.page);
        core::ptr::write_volatile(address as *mut u8, value);
    }
}

impl<P: PagePermissions> Drop for PermissionWindow<'_, P> {
    fn drop(&mut self) {
        if let Err(err) = self.permissions.make_read_only(self.page) {
            log::warn!(
                "could not restore read-only protection on page 0x{:x} ({})",
                err.page,
                err.code
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(&'static str, usize)>,
        refuse: bool,
    }

    impl PagePermissions for Recorder {
        fn make_writable(&mut self, page: usize) -> Result<(), PermissionError> {
            self.calls.push(("rw", page));
            if self.refuse {
                return Err(PermissionError { page, code: -13 });
            }
            Ok(())
        }

        fn make_read_only(&mut self, page: usize) -> Result<(), PermissionError> {
            self.calls.push(("ro", page));
            Ok(())
        }
    }

    #[test]
    fn test_page_base() {
        assert_eq!(page_base(0x1fff, 0x1000), 0x1000);
        assert_eq!(page_base(0x2000, 0x1000), 0x2000);
        assert_eq!(page_base(0x2001, 0x4000), 0x0);
    }

    #[test]
    fn test_window_releases_on_drop() {
        let mut recorder = Recorder::default();
        {
            let window = PermissionWindow::open(&mut recorder, 0x3000).unwrap();
            assert_eq!(window.page(), 0x3000);
        }
        assert_eq!(recorder.calls, vec![("rw", 0x3000), ("ro", 0x3000)]);
    }

    #[test]
    fn test_failed_open_does_not_release() {
        let mut recorder = Recorder {
            refuse: true,
            ..Default::default()
        };
        let result = PermissionWindow::open(&mut recorder, 0x3000);
        assert_eq!(
            result.err(),
            Some(PermissionError {
                page: 0x3000,
                code: -13
            })
        );
        assert_eq!(recorder.calls, vec![("rw", 0x3000)]);
    }
}
