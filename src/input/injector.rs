//! Input worker pool
//!
//! # Architecture
//!
//! ```text
//! enqueue_*() ──> [crossbeam unbounded FIFO] ──> input-worker-0..N
//!                                                    │ (dispatch lock: one at a time)
//!                                                    ├─> DesktopSwitch::switch_to_input_desktop
//!                                                    └─> InputSink::send / caller closure
//! ```
//!
//! Workers take turns on a dispatch lock that covers both dequeue and
//! execution, so operations run strictly in the order they were enqueued even
//! with several workers. The pool exists so a worker stuck in a slow OS call
//! never leaves the queue without a consumer once it returns, and so the
//! desktop switch happens on a thread that owns no windows.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::coordinates::CoordinateMapper;
use super::error::{InputError, Result};
use super::events::{wheel_delta, MouseButton, SyntheticInput};
use crate::desktop::DesktopSwitch;

/// Default number of input workers
pub const DEFAULT_WORKERS: usize = 4;

/// How often an idle worker re-checks cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Delivers one synthetic event to the OS
pub trait InputSink: Send + Sync {
    /// Inject `input` into the calling thread's desktop
    fn send(&self, input: &SyntheticInput) -> Result<()>;
}

impl<T: InputSink + ?Sized> InputSink for Arc<T> {
    fn send(&self, input: &SyntheticInput) -> Result<()> {
        (**self).send(input)
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInputSink;

impl InputSink for NullInputSink {
    fn send(&self, input: &SyntheticInput) -> Result<()> {
        trace!(?input, "Discarding input event");
        Ok(())
    }
}

/// Injection counters
#[derive(Debug, Default)]
pub struct InputStats {
    executed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl InputStats {
    /// Operations that ran to completion
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Operations that returned an error or panicked
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Operations rejected while input was disabled
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Serialised input injection on a fixed worker pool
pub struct InputInjector {
    queue: Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    input_enabled: AtomicBool,
    switcher: Arc<dyn DesktopSwitch>,
    sink: Arc<dyn InputSink>,
    stats: Arc<InputStats>,
}

impl InputInjector {
    /// Start `workers` threads (at least one)
    pub fn new(workers: usize, switcher: Arc<dyn DesktopSwitch>, sink: Arc<dyn InputSink>) -> Result<Self> {
        let workers = workers.max(1);
        let (queue, receiver) = crossbeam_channel::unbounded::<Job>();
        let dispatch = Arc::new(Mutex::new(()));
        let cancel = CancellationToken::new();
        let stats = Arc::new(InputStats::default());

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let receiver = receiver.clone();
            let dispatch = Arc::clone(&dispatch);
            let cancel_worker = cancel.clone();
            let stats = Arc::clone(&stats);

            let spawned = thread::Builder::new()
                .name(format!("input-worker-{index}"))
                .spawn(move || worker_loop(receiver, dispatch, cancel_worker, stats));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    cancel.cancel();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(InputError::WorkerSpawn(e.to_string()));
                }
            }
        }

        info!("Input injector started with {} workers", workers);

        Ok(Self {
            queue,
            workers: Mutex::new(handles),
            cancel,
            input_enabled: AtomicBool::new(true),
            switcher,
            sink,
            stats,
        })
    }

    /// Queue a caller-supplied operation; a desktop switch runs before it.
    ///
    /// Never blocks. Returns false when the operation was dropped (input
    /// disabled or injector stopped).
    pub fn enqueue<F>(&self, operation: F) -> bool
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return false;
        }
        if !self.input_enabled.load(Ordering::Acquire) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Input disabled, dropping operation");
            return false;
        }

        let switcher = Arc::clone(&self.switcher);
        let job: Job = Box::new(move || {
            switcher.switch_to_input_desktop();
            operation()
        });
        self.queue.send(job).is_ok()
    }

    /// Queue one synthetic event for the sink
    pub fn enqueue_input(&self, input: SyntheticInput) -> bool {
        let sink = Arc::clone(&self.sink);
        self.enqueue(move || sink.send(&input))
    }

    /// Move the pointer to a position given as fractions of the selected screen
    pub fn enqueue_mouse_move(&self, mapper: &CoordinateMapper, x: f64, y: f64) -> bool {
        let (x, y) = mapper.to_absolute(x, y);
        self.enqueue_input(SyntheticInput::MouseMove { x, y })
    }

    /// Move to the position then press or release the button.
    ///
    /// Unknown button codes are ignored.
    pub fn enqueue_mouse_button(&self, mapper: &CoordinateMapper, x: f64, y: f64, button_code: u8, pressed: bool) -> bool {
        let button = match MouseButton::from_code(button_code) {
            Ok(button) => button,
            Err(e) => {
                debug!("Ignoring mouse button event: {}", e);
                return false;
            }
        };

        let (x, y) = mapper.to_absolute(x, y);
        let sink = Arc::clone(&self.sink);
        self.enqueue(move || {
            sink.send(&SyntheticInput::MouseMove { x, y })?;
            sink.send(&SyntheticInput::MouseButton { button, pressed })
        })
    }

    /// One wheel notch in the direction of `delta`; zero is a no-op
    pub fn enqueue_mouse_wheel(&self, delta: f64) -> bool {
        match wheel_delta(delta) {
            Some(delta) => self.enqueue_input(SyntheticInput::MouseWheel { delta }),
            None => false,
        }
    }

    /// Press or release a virtual key
    pub fn enqueue_key(&self, virtual_key: u16, pressed: bool) -> bool {
        self.enqueue_input(SyntheticInput::Key { virtual_key, pressed })
    }

    /// View-only toggle; while false every new operation is dropped
    pub fn set_input_enabled(&self, enabled: bool) {
        let previous = self.input_enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(enabled, "Remote input toggled");
        }
    }

    /// Whether new operations are accepted
    pub fn input_enabled(&self) -> bool {
        self.input_enabled.load(Ordering::Acquire)
    }

    /// Operations waiting for a worker
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Counters
    pub fn stats(&self) -> &InputStats {
        &self.stats
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Signal cancellation and join the workers.
    ///
    /// An operation already running completes; queued ones are discarded.
    pub fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }

        for handle in handles {
            if handle.join().is_err() {
                warn!("Input worker exited by panic");
            }
        }
        debug!(discarded = self.queue.len(), "Input injector stopped");
    }
}

impl Drop for InputInjector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(receiver: Receiver<Job>, dispatch: Arc<Mutex<()>>, cancel: CancellationToken, stats: Arc<InputStats>) {
    let name = thread::current().name().unwrap_or("input-worker").to_string();
    trace!(worker = %name, "Input worker running");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let _turn = dispatch.lock();
        if cancel.is_cancelled() {
            break;
        }

        let job = match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        run_job(job, &stats);
    }

    trace!(worker = %name, "Input worker exiting");
}

fn run_job(job: Job, stats: &InputStats) {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => {
            stats.executed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!("Input operation failed: {}", e);
        }
        Err(_) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!("Input operation panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ScreenRect;
    use crate::desktop::NullDesktopSwitcher;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<SyntheticInput>>,
    }

    impl InputSink for RecordingSink {
        fn send(&self, input: &SyntheticInput) -> Result<()> {
            self.events.lock().push(*input);
            Ok(())
        }
    }

    struct CountingSwitcher(AtomicUsize);

    impl DesktopSwitch for CountingSwitcher {
        fn switch_to_input_desktop(&self) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn current_desktop_name(&self) -> Option<String> {
            Some("Default".into())
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn injector(sink: Arc<RecordingSink>) -> InputInjector {
        InputInjector::new(4, Arc::new(NullDesktopSwitcher), sink).unwrap()
    }

    #[test]
    fn test_operations_run_in_enqueue_order() {
        let sink = Arc::new(RecordingSink::default());
        let injector = injector(Arc::clone(&sink));

        for vk in 0..200u16 {
            assert!(injector.enqueue_key(vk, true));
        }
        assert!(wait_until(|| injector.stats().executed() == 200));

        let keys: Vec<u16> = sink
            .events
            .lock()
            .iter()
            .map(|e| match e {
                SyntheticInput::Key { virtual_key, .. } => *virtual_key,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(keys, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_disabled_input_drops_everything() {
        let sink = Arc::new(RecordingSink::default());
        let injector = injector(Arc::clone(&sink));

        injector.set_input_enabled(false);
        assert!(!injector.enqueue_key(0x41, true));
        assert!(!injector.enqueue_mouse_wheel(10.0));
        thread::sleep(Duration::from_millis(100));

        assert_eq!(injector.stats().executed(), 0);
        assert_eq!(injector.stats().dropped(), 2);
        assert!(sink.events.lock().is_empty());

        injector.set_input_enabled(true);
        assert!(injector.enqueue_key(0x41, true));
        assert!(wait_until(|| injector.stats().executed() == 1));
    }

    #[test]
    fn test_failure_does_not_stop_worker() {
        let sink = Arc::new(RecordingSink::default());
        let injector = InputInjector::new(1, Arc::new(NullDesktopSwitcher), sink.clone()).unwrap();

        injector.enqueue(|| Err(InputError::InjectionFailed("blocked".into())));
        injector.enqueue(|| panic!("boom"));
        injector.enqueue_key(0x0D, true);

        assert!(wait_until(|| injector.stats().executed() == 1));
        assert_eq!(injector.stats().failed(), 2);
        assert_eq!(sink.events.lock().len(), 1);
    }

    #[test]
    fn test_desktop_switch_precedes_each_operation() {
        let switcher = Arc::new(CountingSwitcher(AtomicUsize::new(0)));
        let injector = InputInjector::new(2, switcher.clone(), Arc::new(NullInputSink)).unwrap();

        for _ in 0..10 {
            injector.enqueue_key(0x20, true);
        }
        assert!(wait_until(|| injector.stats().executed() == 10));
        assert_eq!(switcher.0.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_button_moves_then_clicks() {
        let sink = Arc::new(RecordingSink::default());
        let injector = injector(Arc::clone(&sink));
        let screen = ScreenRect::new(0, 0, 1000, 1000);
        let mapper = CoordinateMapper::new(screen, screen).unwrap();

        assert!(injector.enqueue_mouse_button(&mapper, 0.0, 1.0, 2, true));
        assert!(!injector.enqueue_mouse_button(&mapper, 0.0, 1.0, 9, true));
        assert!(wait_until(|| injector.stats().executed() == 1));

        assert_eq!(
            *sink.events.lock(),
            vec![
                SyntheticInput::MouseMove { x: 0, y: 65535 },
                SyntheticInput::MouseButton {
                    button: MouseButton::Right,
                    pressed: true
                },
            ]
        );
    }

    #[test]
    fn test_zero_wheel_is_ignored() {
        let injector = injector(Arc::new(RecordingSink::default()));
        assert!(!injector.enqueue_mouse_wheel(0.0));
        assert_eq!(injector.pending(), 0);
    }

    #[test]
    fn test_stop_rejects_new_work() {
        let injector = injector(Arc::new(RecordingSink::default()));
        injector.stop();
        assert!(injector.is_stopped());
        assert!(!injector.enqueue_key(0x41, true));
        // second stop is a no-op
        injector.stop();
    }
}
