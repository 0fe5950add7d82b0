//! Frame source (producer) thread
//!
//! The source owns a [`CaptureDevice`] on a dedicated thread, pushes every
//! frame it reads into the [`FrameQueue`] and keeps a copy as the latest
//! frame for previews.
//!
//! # State machine
//!
//! ```text
//!            start()            open ok
//! Stopped ──────────► Opening ──────────► Capturing ◄──┐
//!    ▲                   │                   │  pause()│resume()
//!    │   retries spent   │                   ▼         │
//!    └───────────────────┘                 Paused ─────┘
//!    ▲
//!    └── stop() from any state
//! ```
//!
//! # Failure policy
//!
//! - Opening makes up to `max_retries` attempts with `retry_delay` between
//!   them. When they are all spent the source reports
//!   [`EngineEvent::DeviceUnavailable`] and exits.
//! - A failed read releases the device and goes back to Opening with the same
//!   policy. After `max_read_failures` consecutive failed reads the device is
//!   declared unavailable even if it still opens.
//!
//! Control requests go through a mutex/condvar pair. Every wait in the loop
//! (retry delay, pause, frame pacing) is a condvar wait, so `stop()` takes
//! effect without waiting out a sleep.

use super::device::CaptureDevice;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink};
use crate::frame::Frame;
use crate::queue::FrameQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lifecycle state of a [`FrameSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Stopped,
    Opening,
    Capturing,
    Paused,
}

impl std::fmt::Display for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceState::Stopped => "stopped",
            SourceState::Opening => "opening",
            SourceState::Capturing => "capturing",
            SourceState::Paused => "paused",
        };
        write!(f, "{}", name)
    }
}

/// Why the capture thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceExit {
    /// `stop()` was called
    Stopped,
    /// The device could not be (re)acquired
    DeviceUnavailable { device_index: u32, attempts: u32 },
}

impl SourceExit {
    /// The error this exit represents, if any
    pub fn error(&self) -> Option<EngineError> {
        match *self {
            SourceExit::Stopped => None,
            SourceExit::DeviceUnavailable { device_index, attempts } => {
                Some(EngineError::DeviceUnavailable { device_index, attempts })
            }
        }
    }
}

/// Read pacing used unless configured otherwise (about 30 frames per second)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Frame source settings
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub device_index: u32,
    /// Total open attempts per acquisition (at least 1)
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Consecutive failed reads before the device is declared unavailable
    pub max_read_failures: u32,
    /// Minimum time between reads; `None` reads as fast as the device allows,
    /// which for the synthetic device means a busy loop
    pub frame_interval: Option<Duration>,
    /// Bounded wait while paused
    pub pause_poll: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            max_read_failures: 10,
            frame_interval: Some(DEFAULT_FRAME_INTERVAL),
            pause_poll: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
struct Control {
    state: SourceState,
    stop: bool,
    paused: bool,
    target_index: u32,
    switch_pending: bool,
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    latest: Mutex<Option<Frame>>,
    frames_captured: AtomicU64,
    read_failures: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: SourceState, events: &EventSink) {
        let mut control = self.control.lock();
        if control.state != state {
            tracing::info!("Frame source {} -> {}", control.state, state);
            control.state = state;
            events.emit(EngineEvent::SourceState(state));
        }
    }

    fn stop_requested(&self) -> bool {
        self.control.lock().stop
    }

    /// Wait until `deadline` unless stop is requested first; returns true on stop
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut control = self.control.lock();
        while !control.stop {
            if self.wake.wait_until(&mut control, deadline).timed_out() {
                break;
            }
        }
        control.stop
    }
}

type CaptureThread = JoinHandle<(Box<dyn CaptureDevice>, SourceExit)>;

/// Producer that owns the capture device and feeds the frame queue
pub struct FrameSource {
    config: SourceConfig,
    shared: Arc<Shared>,
    queue: Arc<FrameQueue>,
    events: EventSink,
    /// Parked here while no capture thread is running
    device: Option<Box<dyn CaptureDevice>>,
    thread: Option<CaptureThread>,
    last_exit: Option<SourceExit>,
}

impl FrameSource {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        queue: Arc<FrameQueue>,
        config: SourceConfig,
        events: EventSink,
    ) -> Self {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                state: SourceState::Stopped,
                stop: false,
                paused: false,
                target_index: config.device_index,
                switch_pending: false,
            }),
            wake: Condvar::new(),
            latest: Mutex::new(None),
            frames_captured: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
        });
        Self {
            config,
            shared,
            queue,
            events,
            device: Some(device),
            thread: None,
            last_exit: None,
        }
    }

    /// Spawn the capture thread
    ///
    /// A source whose thread already exited (for example after the device
    /// became unavailable) can be started again.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning("frame source"));
        }
        self.reap()?;

        let device = self
            .device
            .take()
            .ok_or_else(|| EngineError::ThreadPanicked("capture device was lost".to_string()))?;

        let device_index = {
            let mut control = self.shared.control.lock();
            control.stop = false;
            control.paused = false;
            control.switch_pending = false;
            control.target_index
        };

        let mut worker = CaptureLoop {
            device,
            device_index,
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            queue: Arc::clone(&self.queue),
            events: self.events.clone(),
        };
        let handle = std::thread::Builder::new()
            .name("frame-source".to_string())
            .spawn(move || {
                let exit = worker.run();
                (worker.device, exit)
            })?;

        tracing::info!("Frame source started on device {}", device_index);
        self.thread = Some(handle);
        self.last_exit = None;
        Ok(())
    }

    /// Stop capturing and join the thread; idempotent
    ///
    /// The device is released inside the thread before this returns.
    pub fn stop(&mut self) -> Result<Option<SourceExit>> {
        {
            let mut control = self.shared.control.lock();
            control.stop = true;
        }
        self.shared.wake.notify_all();
        self.reap()?;
        Ok(self.last_exit.clone())
    }

    fn reap(&mut self) -> Result<()> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok((device, exit)) => {
                tracing::info!("Frame source thread exited: {:?}", exit);
                self.device = Some(device);
                self.last_exit = Some(exit);
                Ok(())
            }
            Err(_) => {
                self.shared.set_state(SourceState::Stopped, &self.events);
                Err(EngineError::ThreadPanicked("frame source".to_string()))
            }
        }
    }

    /// Stop delivering frames, keeping the device open
    pub fn pause(&self) {
        self.shared.control.lock().paused = true;
        self.shared.wake.notify_all();
    }

    pub fn resume(&self) {
        self.shared.control.lock().paused = false;
        self.shared.wake.notify_all();
    }

    /// Move capture to another device index
    ///
    /// The running loop releases the current device and acquires the new one
    /// on its next cycle. A stopped source will use it on the next `start`.
    pub fn switch_device(&self, index: u32) {
        {
            let mut control = self.shared.control.lock();
            control.target_index = index;
            control.switch_pending = true;
            control.paused = false;
        }
        tracing::info!("Switching frame source to device {}", index);
        self.shared.wake.notify_all();
    }

    pub fn state(&self) -> SourceState {
        self.shared.control.lock().state
    }

    /// Whether the capture thread is alive
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Copy of the most recently captured frame
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared.latest.lock().clone()
    }

    /// Device index the source is (or will be) capturing from
    pub fn device_index(&self) -> u32 {
        self.shared.control.lock().target_index
    }

    pub fn frames_captured(&self) -> u64 {
        self.shared.frames_captured.load(Ordering::Relaxed)
    }

    pub fn read_failures(&self) -> u64 {
        self.shared.read_failures.load(Ordering::Relaxed)
    }

    /// Exit reason of the last capture thread, once it has been joined
    pub fn last_exit(&self) -> Option<&SourceExit> {
        self.last_exit.as_ref()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                tracing::error!("Frame source did not stop cleanly: {}", e);
            }
        }
    }
}

enum Acquire {
    Opened,
    Stopped,
    Exhausted(u32),
}

/// State owned by the capture thread
struct CaptureLoop {
    device: Box<dyn CaptureDevice>,
    device_index: u32,
    config: SourceConfig,
    shared: Arc<Shared>,
    queue: Arc<FrameQueue>,
    events: EventSink,
}

impl CaptureLoop {
    fn run(&mut self) -> SourceExit {
        let exit = self.capture();
        self.device.release();
        self.shared.set_state(SourceState::Stopped, &self.events);
        exit
    }

    fn capture(&mut self) -> SourceExit {
        let mut consecutive_failures = 0u32;

        loop {
            // Control requests
            let paused = {
                let mut control = self.shared.control.lock();
                if control.stop {
                    return SourceExit::Stopped;
                }
                if control.switch_pending {
                    control.switch_pending = false;
                    self.device_index = control.target_index;
                    drop(control);
                    self.device.release();
                    consecutive_failures = 0;
                    continue;
                }
                control.paused
            };

            if !self.device.is_open() {
                match self.acquire() {
                    Acquire::Opened => {}
                    Acquire::Stopped => return SourceExit::Stopped,
                    Acquire::Exhausted(attempts) => {
                        return self.unavailable(attempts);
                    }
                }
                continue;
            }

            if paused {
                self.shared.set_state(SourceState::Paused, &self.events);
                let mut control = self.shared.control.lock();
                if control.paused && !control.stop && !control.switch_pending {
                    self.shared.wake.wait_for(&mut control, self.config.pause_poll);
                }
                continue;
            }
            self.shared.set_state(SourceState::Capturing, &self.events);

            let started = Instant::now();
            match self.device.read_frame() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    tracing::trace!("Captured frame {} ({}x{})", frame.sequence(), frame.width(), frame.height());
                    *self.shared.latest.lock() = Some(frame.clone());
                    self.queue.push(frame);
                    self.shared.frames_captured.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    self.shared.read_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Read from device {} failed ({}/{}): {}",
                        self.device_index,
                        consecutive_failures,
                        self.config.max_read_failures,
                        e
                    );
                    self.events.emit(EngineEvent::DeviceFault {
                        device_index: self.device_index,
                        message: e.to_string(),
                    });
                    if consecutive_failures >= self.config.max_read_failures.max(1) {
                        return self.unavailable(consecutive_failures);
                    }
                    // Reacquire on the next cycle
                    self.device.release();
                    continue;
                }
            }

            if let Some(interval) = self.config.frame_interval {
                if self.shared.wait_until(started + interval) {
                    return SourceExit::Stopped;
                }
            }
        }
    }

    fn acquire(&mut self) -> Acquire {
        self.shared.set_state(SourceState::Opening, &self.events);
        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            if self.shared.stop_requested() {
                return Acquire::Stopped;
            }
            match self.device.open(self.device_index) {
                Ok(()) => {
                    tracing::info!(
                        "Opened {} device {} (attempt {}/{})",
                        self.device.name(),
                        self.device_index,
                        attempt,
                        max_attempts
                    );
                    return Acquire::Opened;
                }
                Err(e) => {
                    tracing::warn!(
                        "Opening device {} failed (attempt {}/{}): {}",
                        self.device_index,
                        attempt,
                        max_attempts,
                        e
                    );
                    self.events.emit(EngineEvent::DeviceFault {
                        device_index: self.device_index,
                        message: e.to_string(),
                    });
                    if attempt < max_attempts
                        && self.shared.wait_until(Instant::now() + self.config.retry_delay)
                    {
                        return Acquire::Stopped;
                    }
                }
            }
        }
        Acquire::Exhausted(max_attempts)
    }

    fn unavailable(&mut self, attempts: u32) -> SourceExit {
        tracing::error!(
            "Device {} unavailable after {} attempt(s), stopping capture",
            self.device_index,
            attempts
        );
        self.events.emit(EngineEvent::DeviceUnavailable {
            device_index: self.device_index,
            attempts,
        });
        SourceExit::DeviceUnavailable {
            device_index: self.device_index,
            attempts,
        }
    }
}
