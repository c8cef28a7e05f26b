//! Canned light scripts.
//!
//! Each animation is a plain sequence of LED writes with short pauses in between. The board is
//! switched back to [`LightState::AllOn`] afterwards, also when cancelled.

use std::time::Duration;

use clap::ValueEnum;
use tracing::info;

use crate::board::BoardProfile;
use crate::color::{ColorSpec, WHITE};
use crate::error::Result;
use crate::protocol::LightState;
use crate::session::{CancelToken, Session};
use crate::transport::HidTransport;

/// Default pause between two animation steps.
pub const DEFAULT_STEP: Duration = Duration::from_millis(25);

/// Number of LEDs the ripple spreads in each direction, including the center.
const RIPPLE_RADIUS: u16 = 8;

/// Hue increase between two adjacent LEDs of the full rainbow.
const RAINBOW_HUE_STEP: f64 = 3.5;

/// Hue increase between two adjacent LEDs of the underglow rainbow.
const UNDERGLOW_RAINBOW_HUE_STEP: f64 = 5.;

/// Available animations.
#[derive(ValueEnum, PartialEq, Eq, Debug, Copy, Clone)]
pub enum Animation {
    /// Run a color around the underglow.
    GoAround,
    /// Spread colors outwards from the center of the front edge.
    Ripple,
    /// Rainbow across every LED.
    Rainbow,
    /// Rainbow across the underglow.
    BottomRainbow,
}

/// Plays animations on a session.
pub struct Animator<'a> {
    board: &'a BoardProfile,
    step: Duration,
    cancel: &'a CancelToken,
}

impl<'a> Animator<'a> {
    pub fn new(board: &'a BoardProfile, step: Duration, cancel: &'a CancelToken) -> Self {
        Self { board, step, cancel }
    }

    /// Play an animation once for every color, or once in white if no color was given.
    pub fn play<T: HidTransport>(
        &self,
        session: &mut Session<T>,
        animation: Animation,
        colors: &[ColorSpec],
    ) -> Result<()> {
        info!("Playing {animation:?} on {}", self.board.name);

        let white = [ColorSpec::Hex(WHITE)];
        let colors = if colors.is_empty() { &white[..] } else { colors };

        match animation {
            Animation::GoAround => {
                colors.iter().try_for_each(|color| self.go_around(session, color))?
            },
            Animation::Ripple => colors.iter().try_for_each(|color| self.ripple(session, color))?,
            Animation::Rainbow => self.rainbow(session, 0..=self.led_max(), RAINBOW_HUE_STEP)?,
            Animation::BottomRainbow => {
                let underglow = &self.board.underglow_leds;
                let leds = u16::from(*underglow.start())..=u16::from(*underglow.end());
                self.rainbow(session, leds, UNDERGLOW_RAINBOW_HUE_STEP)?
            },
        }

        session.set_state(LightState::AllOn)
    }

    fn go_around<T>(&self, session: &mut Session<T>, color: &ColorSpec) -> Result<()>
    where
        T: HidTransport,
    {
        for led in self.board.underglow_leds.clone() {
            session.set_single_led_with(led.into(), color)?;
            if !self.pause() {
                break;
            }
        }
        Ok(())
    }

    fn ripple<T: HidTransport>(&self, session: &mut Session<T>, color: &ColorSpec) -> Result<()> {
        let center = u16::from(self.board.underglow_center);
        let underglow = &self.board.underglow_leds;

        for offset in 0..RIPPLE_RADIUS {
            let leds = [Some(center + offset), center.checked_sub(offset)];
            for led in leds.into_iter().flatten().filter_map(|led| u8::try_from(led).ok()) {
                if underglow.contains(&led) {
                    session.set_single_led_with(led.into(), color)?;
                }
            }

            if !self.pause() {
                break;
            }
        }
        Ok(())
    }

    fn rainbow<T, I>(&self, session: &mut Session<T>, leds: I, hue_step: f64) -> Result<()>
    where
        T: HidTransport,
        I: IntoIterator<Item = u16>,
    {
        for led in leds {
            let hue = f64::from(led) * hue_step;
            session.set_single_led_with(led, &ColorSpec::Hsv(hue, 100., 100.))?;
            if !self.pause() {
                break;
            }
        }
        Ok(())
    }

    fn led_max(&self) -> u16 {
        self.board.led_count() - 1
    }

    /// Wait for the next step, `false` if cancelled.
    fn pause(&self) -> bool {
        self.cancel.sleep(self.step)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::board::KeyboardModel;
    use crate::color::Rgb;
    use crate::session::SessionOptions;
    use crate::transport::mock::{MockLog, MockTransport};

    fn setup() -> (BoardProfile, Session<MockTransport>, Rc<RefCell<MockLog>>) {
        let board = BoardProfile::from(KeyboardModel::Alt.board().as_ref());
        let (transport, log) = MockTransport::new();
        let session = Session::new(transport, SessionOptions::from(&board));
        (board, session, log)
    }

    /// LED indices of all single LED writes.
    fn leds(log: &Rc<RefCell<MockLog>>) -> Vec<u8> {
        let log = log.borrow();
        log.writes.iter().filter(|frame| frame[..2] == [0x04, 0x01]).map(|frame| frame[2]).collect()
    }

    #[test]
    fn go_around_covers_underglow() {
        let (board, mut session, log) = setup();
        let cancel = CancelToken::new();
        let animator = Animator::new(&board, Duration::ZERO, &cancel);

        let aqua = [ColorSpec::Name("aqua".into())];
        animator.play(&mut session, Animation::GoAround, &aqua).unwrap();

        assert_eq!(leds(&log), (67..=104).collect::<Vec<u8>>());
        let log = log.borrow();
        assert_eq!(&log.writes[0][3..6], &[0, 200, 50]);
        assert_eq!(&log.writes.last().unwrap()[..2], &[0x01, 0x01]);
    }

    #[test]
    fn ripple_spreads_from_center() {
        let (board, mut session, log) = setup();
        let cancel = CancelToken::new();
        let animator = Animator::new(&board, Duration::ZERO, &cancel);

        let colors = [ColorSpec::Hex(WHITE), ColorSpec::Hex(Rgb::new(255, 50, 0))];
        animator.play(&mut session, Animation::Ripple, &colors).unwrap();

        let leds = leds(&log);
        assert_eq!(leds.len(), 32);
        assert_eq!(&leds[..4], &[74, 74, 75, 73]);
        assert_eq!(&leds[14..16], &[81, 67]);
        assert_eq!(&log.borrow().writes[16][3..6], &[255, 50, 0]);
    }

    #[test]
    fn rainbow_hues() {
        let (board, mut session, log) = setup();
        let cancel = CancelToken::new();
        let animator = Animator::new(&board, Duration::ZERO, &cancel);

        animator.play(&mut session, Animation::Rainbow, &[]).unwrap();

        assert_eq!(leds(&log), (0..=104).collect::<Vec<u8>>());
        assert_eq!(&log.borrow().writes[0][3..6], &[255, 0, 0]);
    }

    #[test]
    fn bottom_rainbow_only_underglow() {
        let (board, mut session, log) = setup();
        let cancel = CancelToken::new();
        let animator = Animator::new(&board, Duration::ZERO, &cancel);

        animator.play(&mut session, Animation::BottomRainbow, &[]).unwrap();

        assert_eq!(leds(&log), (67..=104).collect::<Vec<u8>>());
    }

    #[test]
    fn cancelled_animation_resets_state() {
        let (board, mut session, log) = setup();
        let cancel = CancelToken::new();
        cancel.cancel();
        let animator = Animator::new(&board, Duration::from_secs(60), &cancel);

        animator.play(&mut session, Animation::Rainbow, &[]).unwrap();

        let log = log.borrow();
        assert_eq!(log.writes.len(), 2);
        assert_eq!(&log.writes[1][..2], &[0x01, 0x01]);
    }

    #[test]
    fn invalid_color_aborts() {
        let (board, mut session, log) = setup();
        let cancel = CancelToken::new();
        let animator = Animator::new(&board, Duration::ZERO, &cancel);

        let colors = [ColorSpec::Name("purple".into())];
        assert!(animator.play(&mut session, Animation::Ripple, &colors).is_err());
        assert!(log.borrow().writes.is_empty());
    }
}
