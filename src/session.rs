//! Keyboard lighting session.
//!
//! A [`Session`] exclusively owns the raw HID handle of one keyboard. All operations are
//! synchronous and take `&mut self`, so sharing a session between threads requires wrapping it
//! in a mutex. Separate processes driving the same keyboard are not coordinated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hidapi::HidDevice;
use tracing::{debug, error, info};

use crate::board::BoardProfile;
use crate::color::{ColorModel, ColorSpec, Rgb};
use crate::error::{Error, Result};
use crate::locator::DeviceLocator;
use crate::protocol::{self, LightState, Mode, Zone};
use crate::transport::{Framing, HidTransport};

/// Default time to wait for the state query response.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Granularity of cancellation checks while holding a notification.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared flag to abort notifications and animations early.
#[derive(Default, Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning `false` if cancelled before it elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }

            thread::sleep(remaining.min(CANCEL_POLL_INTERVAL));
        }
    }
}

/// Session settings derived from the board and configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub framing: Framing,
    pub read_timeout: Duration,
    pub led_count: u16,
    pub colors: ColorModel,
}

impl From<&BoardProfile> for SessionOptions {
    fn from(board: &BoardProfile) -> Self {
        Self {
            framing: Framing::new(board.frame_size),
            read_timeout: DEFAULT_READ_TIMEOUT,
            led_count: board.led_count(),
            colors: ColorModel::default(),
        }
    }
}

/// Open connection to a keyboard.
pub struct Session<T: HidTransport = HidDevice> {
    handle: Option<T>,
    options: SessionOptions,
}

impl Session<HidDevice> {
    /// Locate the keyboard and open a session on it.
    pub fn open(locator: &DeviceLocator, options: SessionOptions) -> Result<Self> {
        let device = locator.find()?;
        Ok(Self::new(device, options))
    }
}

impl<T: HidTransport> Session<T> {
    pub fn new(handle: T, options: SessionOptions) -> Self {
        Self { handle: Some(handle), options }
    }

    pub fn colors(&self) -> &ColorModel {
        &self.options.colors
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Release the keyboard handle.
    pub fn close(&mut self) -> Result<()> {
        let handle = self.handle.take().ok_or(Error::SessionClosed)?;
        handle.close();
        debug!("Closed keyboard session");
        Ok(())
    }

    /// Read the persistent light state.
    pub fn get_state(&mut self) -> Result<LightState> {
        self.send(&protocol::encode_query_state())?;

        let timeout = self.options.read_timeout;
        let mut buf = vec![0; self.options.framing.frame_size];
        let len = self.handle()?.read_report(&mut buf, timeout)?;
        if len == 0 {
            return Err(Error::ReadTimeout);
        }

        let state = LightState::from_report(buf[0])?;
        debug!("Current light state: {state}");

        Ok(state)
    }

    /// Change the persistent light state.
    pub fn set_state(&mut self, state: LightState) -> Result<()> {
        self.send(&protocol::encode_set_state(state))
    }

    /// Switch to the next firmware animation.
    pub fn next_animation(&mut self) -> Result<()> {
        self.set_state(LightState::NextAnimation)
    }

    /// Color a region until the next state change.
    pub fn set_color(&mut self, mode: Mode, color: Rgb) -> Result<()> {
        self.send(&protocol::encode_notify(mode, color))
    }

    /// Color a single LED.
    pub fn set_single_led(&mut self, index: u16, color: Rgb) -> Result<()> {
        let count = self.options.led_count;
        let index = match u8::try_from(index) {
            Ok(led) if index < count => led,
            _ => return Err(Error::InvalidLedIndex { index, count }),
        };

        self.send(&protocol::encode_set_led(index, color))
    }

    /// Color a row or underglow edge.
    pub fn set_zone(&mut self, zone: Zone, color: Rgb) -> Result<()> {
        self.send(&protocol::encode_set_zone(zone, color)?)
    }

    /// Flash a region in a color for `duration`, then restore the previous light state.
    ///
    /// Holding the color ends early once `cancel` fires. The previous light state is restored on
    /// every exit path.
    pub fn notify(
        &mut self,
        mode: Mode,
        color: Rgb,
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<()> {
        let previous = self.get_state()?;
        info!("Notification: {mode} {color} for {duration:?}");

        let guard = RestoreState::new(self, previous);
        guard.session.set_color(mode, color)?;

        if !cancel.sleep(duration) {
            info!("Notification cancelled");
        }

        guard.restore()
    }

    /// Resolve a color request, then run `op` unless the policy skips the write.
    fn with_color<F>(&mut self, color: &ColorSpec, op: F) -> Result<()>
    where
        F: FnOnce(&mut Self, Rgb) -> Result<()>,
    {
        self.handle()?;

        match self.options.colors.resolve(color)? {
            Some(rgb) => op(self, rgb),
            None => Ok(()),
        }
    }

    /// [`Session::set_color`] with an unvalidated color.
    pub fn set_color_with(&mut self, mode: Mode, color: &ColorSpec) -> Result<()> {
        self.with_color(color, |session, rgb| session.set_color(mode, rgb))
    }

    /// [`Session::set_single_led`] with an unvalidated color.
    pub fn set_single_led_with(&mut self, index: u16, color: &ColorSpec) -> Result<()> {
        self.with_color(color, |session, rgb| session.set_single_led(index, rgb))
    }

    /// [`Session::set_zone`] with an unvalidated color.
    pub fn set_zone_with(&mut self, zone: Zone, color: &ColorSpec) -> Result<()> {
        self.with_color(color, |session, rgb| session.set_zone(zone, rgb))
    }

    /// [`Session::notify`] with an unvalidated color.
    pub fn notify_with(
        &mut self,
        mode: Mode,
        color: &ColorSpec,
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.with_color(color, |session, rgb| {
            session.notify(mode, rgb, duration, cancel)
        })
    }

    /// Pad and write a command payload.
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let frame = self.options.framing.frame(payload)?;
        debug!("Sending {:02x?}", payload);

        let written = self.handle()?.write_report(&frame)?;
        if written < frame.len() {
            return Err(Error::Transport(format!(
                "short write: {written} of {} bytes",
                frame.len()
            )));
        }

        Ok(())
    }

    fn handle(&mut self) -> Result<&mut T> {
        self.handle.as_mut().ok_or(Error::SessionClosed)
    }
}

impl<T: HidTransport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }
}

/// Restores a light state when going out of scope.
struct RestoreState<'a, T: HidTransport> {
    session: &'a mut Session<T>,
    state: LightState,
    armed: bool,
}

impl<'a, T: HidTransport> RestoreState<'a, T> {
    fn new(session: &'a mut Session<T>, state: LightState) -> Self {
        Self { session, state, armed: true }
    }

    /// Restore the state, reporting failure to the caller.
    fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.session.set_state(self.state)
    }
}

impl<T: HidTransport> Drop for RestoreState<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        if let Err(err) = self.session.set_state(self.state) {
            error!("Unable to restore light state {}: {err}", self.state);
        }
    }
}
