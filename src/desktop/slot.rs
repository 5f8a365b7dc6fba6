//! Per-thread cache for the desktop a thread is attached to

/// Holds the desktop handle the owning thread is currently attached to.
///
/// `H` closes itself on drop. A desktop cannot be closed while a thread of
/// the process is still attached to it, so [`DesktopSlot::cycle`] attaches
/// the thread to the new handle first and only then releases the old one.
/// One slot belongs to exactly one thread; sharing a slot would let a thread
/// close a handle another thread is attached to.
#[derive(Debug)]
pub struct DesktopSlot<H> {
    current: Option<H>,
}

impl<H> DesktopSlot<H> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Open a fresh handle, attach the thread to it, release the previous
    /// handle and then activate the new one.
    ///
    /// If `open` or `attach` fails the new handle is closed and the previous
    /// one is kept, since the thread is still attached to it. Once `attach`
    /// succeeds the new handle is cached even if `activate` fails.
    pub fn cycle<E>(
        &mut self,
        open: impl FnOnce() -> Result<H, E>,
        attach: impl FnOnce(&H) -> Result<(), E>,
        activate: impl FnOnce(&H) -> Result<(), E>,
    ) -> Result<(), E> {
        let handle = open()?;
        attach(&handle)?;

        let handle = self.current.insert(handle);
        activate(handle)
    }

    /// Number of handles currently held (0 or 1)
    pub fn open_handles(&self) -> usize {
        usize::from(self.current.is_some())
    }

    /// The cached handle, if any
    pub fn current(&self) -> Option<&H> {
        self.current.as_ref()
    }

    /// Close the cached handle. The thread must have been detached from it.
    pub fn clear(&mut self) {
        self.current = None;
    }
}

impl<H> Default for DesktopSlot<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Fake desktop handle that records when it is closed
    struct FakeDesktop {
        id: u32,
        log: Log,
    }

    impl Drop for FakeDesktop {
        fn drop(&mut self) {
            self.log.borrow_mut().push(format!("close {}", self.id));
        }
    }

    /// Records the OS calls a switcher would make
    struct FakeSwitcher {
        slot: DesktopSlot<FakeDesktop>,
        next_id: u32,
        log: Log,
        fail_attach: bool,
        fail_switch: bool,
    }

    impl FakeSwitcher {
        fn new() -> Self {
            Self {
                slot: DesktopSlot::new(),
                next_id: 1,
                log: Log::default(),
                fail_attach: false,
                fail_switch: false,
            }
        }

        fn switch(&mut self) -> Result<(), &'static str> {
            let id = self.next_id;
            self.next_id += 1;
            let log = self.log.clone();
            let (fail_attach, fail_switch) = (self.fail_attach, self.fail_switch);

            self.slot.cycle(
                || {
                    log.borrow_mut().push(format!("open {id}"));
                    Ok(FakeDesktop { id, log: log.clone() })
                },
                |desk| {
                    log.borrow_mut().push(format!("attach {}", desk.id));
                    if fail_attach {
                        Err("attach")
                    } else {
                        Ok(())
                    }
                },
                |desk| {
                    log.borrow_mut().push(format!("switch {}", desk.id));
                    if fail_switch {
                        Err("switch")
                    } else {
                        Ok(())
                    }
                },
            )
        }

        fn take_log(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.borrow_mut())
        }
    }

    #[test]
    fn test_old_handle_closed_after_attach_to_new() {
        let mut switcher = FakeSwitcher::new();
        switcher.switch().unwrap();
        assert_eq!(switcher.take_log(), ["open 1", "attach 1", "switch 1"]);

        switcher.switch().unwrap();
        assert_eq!(switcher.take_log(), ["open 2", "attach 2", "close 1", "switch 2"]);
        assert_eq!(switcher.slot.current().map(|d| d.id), Some(2));
    }

    #[test]
    fn test_repeated_switches_close_every_previous_handle() {
        let mut switcher = FakeSwitcher::new();
        for _ in 0..1_000 {
            switcher.switch().unwrap();
        }

        let log = switcher.take_log();
        let opened = log.iter().filter(|e| e.starts_with("open")).count();
        let closed = log.iter().filter(|e| e.starts_with("close")).count();
        assert_eq!(opened, 1_000);
        assert_eq!(closed, 999);
        assert_eq!(switcher.slot.open_handles(), 1);
    }

    #[test]
    fn test_failed_attach_keeps_attached_handle() {
        let mut switcher = FakeSwitcher::new();
        switcher.switch().unwrap();
        switcher.take_log();

        switcher.fail_attach = true;
        assert_eq!(switcher.switch(), Err("attach"));

        // the thread is still on desktop 1, so only the new handle is released
        assert_eq!(switcher.take_log(), ["open 2", "attach 2", "close 2"]);
        assert_eq!(switcher.slot.current().map(|d| d.id), Some(1));
    }

    #[test]
    fn test_failed_switch_keeps_new_handle() {
        let mut switcher = FakeSwitcher::new();
        switcher.switch().unwrap();
        switcher.take_log();

        switcher.fail_switch = true;
        assert_eq!(switcher.switch(), Err("switch"));
        assert_eq!(switcher.take_log(), ["open 2", "attach 2", "close 1", "switch 2"]);
        assert_eq!(switcher.slot.current().map(|d| d.id), Some(2));
    }

    #[test]
    fn test_clear() {
        let mut switcher = FakeSwitcher::new();
        switcher.switch().unwrap();
        switcher.take_log();

        switcher.slot.clear();

        assert_eq!(switcher.take_log(), ["close 1"]);
        assert_eq!(switcher.slot.open_handles(), 0);
    }
}
