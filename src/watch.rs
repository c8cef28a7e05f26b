//! Desktop notification watcher.
//!
//! Listens for `org.freedesktop.Notifications.Notify` calls on the session bus and flashes the
//! keyboard for every notification matching a configured rule.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::{CancelToken, Session};
use crate::transport::HidTransport;

/// Maps a notification to a light cue.
#[derive(Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct WatchRule {
    /// Application name of the notification sender, matched exactly.
    pub sender: String,
    /// Text the summary must contain, any summary matches if absent.
    pub summary_contains: Option<String>,
    pub mode: String,
    pub color: String,
}

impl WatchRule {
    pub fn matches(&self, sender: &str, summary: &str) -> bool {
        self.sender == sender
            && self.summary_contains.as_deref().map_or(true, |text| summary.contains(text))
    }
}

/// Desktop notification as delivered by the bus.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct NotificationEvent {
    pub sender: String,
    pub summary: String,
}

/// Turns notification events into keyboard notifications.
pub struct Watcher {
    rules: Vec<WatchRule>,
    duration: Duration,
    cancel: CancelToken,
}

impl Watcher {
    pub fn new(rules: Vec<WatchRule>, duration: Duration, cancel: CancelToken) -> Self {
        Self { rules, duration, cancel }
    }

    /// First rule matching a notification.
    pub fn rule_for(&self, event: &NotificationEvent) -> Option<&WatchRule> {
        self.rules.iter().find(|rule| rule.matches(&event.sender, &event.summary))
    }

    /// Flash the keyboard for a notification.
    ///
    /// A fresh session is opened for every matching event and closed afterwards. Returns whether
    /// any rule matched.
    pub fn handle<T, F>(&self, event: &NotificationEvent, open: F) -> Result<bool>
    where
        T: HidTransport,
        F: FnOnce() -> Result<Session<T>>,
    {
        let rule = match self.rule_for(event) {
            Some(rule) => rule,
            None => {
                debug!("Ignoring notification from '{}'", event.sender);
                return Ok(false);
            },
        };

        info!(
            "Notification from '{}' matched, flashing {} {}",
            event.sender, rule.mode, rule.color
        );

        let mut session = open()?;
        let result = self.flash(&mut session, rule);
        session.close()?;
        result?;

        Ok(true)
    }

    fn flash<T: HidTransport>(&self, session: &mut Session<T>, rule: &WatchRule) -> Result<()> {
        let mode = session.colors().resolve_mode(&rule.mode)?;
        let color = session.colors().parse(&rule.color)?;
        session.notify_with(mode, &color, self.duration, &self.cancel)
    }

    /// Handle events until the event source ends or the watcher is cancelled.
    ///
    /// Failures while flashing the keyboard are logged and skipped, bus errors end the watcher.
    pub fn run<T, F, E>(&self, mut next_event: E, open: F) -> Result<()>
    where
        T: HidTransport,
        F: Fn() -> Result<Session<T>>,
        E: FnMut() -> Option<Result<NotificationEvent>>,
    {
        while !self.cancel.is_cancelled() {
            let event = match next_event() {
                Some(event) => event?,
                None => break,
            };

            match self.handle(&event, &open) {
                Ok(_) => (),
                #[cfg(feature = "watch")]
                Err(err @ Error::Bus(_)) => return Err(err),
                Err(err) => warn!("Notification from '{}' failed: {err}", event.sender),
            }
        }

        Ok(())
    }
}

#[cfg(feature = "watch")]
pub mod bus {
    //! Session bus notification monitor.

    use std::collections::HashMap;
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
    use std::thread;
    use std::time::Duration;

    use tracing::{debug, info, warn};
    use zbus::blocking::fdo::MonitoringProxy;
    use zbus::blocking::{Connection, MessageIterator};
    use zbus::message::Type as MessageType;
    use zbus::zvariant::OwnedValue;
    use zbus::MatchRule;

    use super::NotificationEvent;
    use crate::error::{Error, Result};
    use crate::session::CancelToken;

    const NOTIFICATIONS_INTERFACE: &str = "org.freedesktop.Notifications";

    /// How often the event source wakes up to check for cancellation.
    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// `Notify(app_name, replaces_id, app_icon, summary, body, actions, hints, expire_timeout)`.
    type NotifyArgs =
        (String, u32, String, String, String, Vec<String>, HashMap<String, OwnedValue>, i32);

    /// Notifications observed on the session bus.
    pub struct NotificationMonitor {
        events: Receiver<Result<NotificationEvent>>,
        cancel: CancelToken,
    }

    impl NotificationMonitor {
        /// Start eavesdropping on the session bus.
        pub fn start(cancel: CancelToken) -> Result<Self> {
            let connection = Connection::session()?;

            let rule = MatchRule::builder()
                .msg_type(MessageType::MethodCall)
                .interface(NOTIFICATIONS_INTERFACE)?
                .member("Notify")?
                .build();
            MonitoringProxy::new(&connection)?.become_monitor(&[rule], 0)?;
            info!("Monitoring desktop notifications");

            let (tx, events) = mpsc::channel();
            thread::Builder::new()
                .name("notification-monitor".into())
                .spawn(move || {
                    for message in MessageIterator::from(connection) {
                        let event = message.map_err(Error::from).and_then(|message| {
                            let header = message.header();
                            if header.member().map(|member| member.as_str()) != Some("Notify") {
                                return Ok(None);
                            }

                            let args: NotifyArgs = message.body().deserialize()?;
                            Ok(Some(NotificationEvent { sender: args.0, summary: args.3 }))
                        });

                        let event = match event {
                            Ok(Some(event)) => Ok(event),
                            Ok(None) => continue,
                            Err(err) => {
                                warn!("Skipping malformed bus message: {err}");
                                continue;
                            },
                        };

                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    debug!("Notification monitor stopped");
                })
                .map_err(|err| Error::Bus(err.to_string()))?;

            Ok(Self { events, cancel })
        }

        /// Wait for the next notification, `None` once cancelled or disconnected.
        pub fn next_event(&self) -> Option<Result<NotificationEvent>> {
            loop {
                if self.cancel.is_cancelled() {
                    return None;
                }

                match self.events.recv_timeout(POLL_INTERVAL) {
                    Ok(event) => return Some(event),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Some(Err(Error::Bus("session bus connection closed".into())))
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::color::{ColorModel, Palette, Policy};
    use crate::session::SessionOptions;
    use crate::transport::mock::{MockLog, MockTransport};
    use crate::transport::Framing;

    fn rule(sender: &str, summary: Option<&str>, mode: &str, color: &str) -> WatchRule {
        WatchRule {
            sender: sender.into(),
            summary_contains: summary.map(Into::into),
            mode: mode.into(),
            color: color.into(),
        }
    }

    fn event(sender: &str, summary: &str) -> NotificationEvent {
        NotificationEvent { sender: sender.into(), summary: summary.into() }
    }

    fn watcher() -> Watcher {
        let rules = vec![
            rule("Telegram Desktop", Some("Cami"), "full", "aqua"),
            rule("Telegram Desktop", None, "under", "aqua"),
            rule("Thunderbird", None, "sideways", "0xff0000"),
        ];
        Watcher::new(rules, Duration::ZERO, CancelToken::new())
    }

    fn options(policy: Policy) -> SessionOptions {
        SessionOptions {
            framing: Framing::default(),
            read_timeout: Duration::ZERO,
            led_count: 105,
            colors: ColorModel::new(Palette::default(), policy),
        }
    }

    fn open_mock(state: u8, policy: Policy) -> (Session<MockTransport>, Rc<RefCell<MockLog>>) {
        let (transport, log) = MockTransport::new();
        (Session::new(transport.respond(&[state]), options(policy)), log)
    }

    #[test]
    fn first_matching_rule_wins() {
        let watcher = watcher();

        let rule = watcher.rule_for(&event("Telegram Desktop", "Cami: hi")).unwrap();
        assert_eq!(rule.mode, "full");

        let rule = watcher.rule_for(&event("Telegram Desktop", "Someone else")).unwrap();
        assert_eq!(rule.mode, "under");

        assert!(watcher.rule_for(&event("telegram desktop", "Cami")).is_none());
        assert!(watcher.rule_for(&event("Slack", "Cami")).is_none());
    }

    #[test]
    fn matched_event_flashes_and_closes() {
        let watcher = watcher();
        let (session, log) = open_mock(0x03, Policy::Strict);

        let matched = watcher.handle(&event("Telegram Desktop", "Cami"), || Ok(session)).unwrap();
        assert!(matched);

        let log = log.borrow();
        let payloads: Vec<_> = log.writes.iter().map(|frame| frame[..5].to_vec()).collect();
        assert_eq!(payloads, vec![
            vec![0x03, 0, 0, 0, 0],
            vec![0x02, 0x02, 0, 200, 50],
            vec![0x01, 0x03, 0, 0, 0],
        ]);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn unmatched_event_opens_nothing() {
        let watcher = watcher();
        let opened = Cell::new(false);

        let matched = watcher
            .handle(&event("Slack", "hello"), || -> Result<Session<MockTransport>> {
                opened.set(true);
                Err(Error::SessionClosed)
            })
            .unwrap();

        assert!(!matched);
        assert!(!opened.get());
    }

    #[test]
    fn invalid_rule_mode_follows_policy() {
        let watcher = watcher();

        let (session, log) = open_mock(0x01, Policy::Strict);
        let result = watcher.handle(&event("Thunderbird", "mail"), || Ok(session));
        assert!(matches!(result, Err(Error::InvalidMode(_))));
        assert!(log.borrow().writes.is_empty());
        assert_eq!(log.borrow().closes, 1);

        let (session, log) = open_mock(0x01, Policy::Lenient);
        assert!(watcher.handle(&event("Thunderbird", "mail"), || Ok(session)).unwrap());
        assert_eq!(&log.borrow().writes[1][..5], &[0x02, 0x02, 255, 0, 0]);
    }

    #[test]
    fn run_survives_missing_keyboard() {
        let watcher = watcher();
        let mut events: VecDeque<_> =
            vec![Ok(event("Telegram Desktop", "a")), Ok(event("Telegram Desktop", "b"))].into();
        let attempts = Cell::new(0);

        watcher
            .run(
                || events.pop_front(),
                || -> Result<Session<MockTransport>> {
                    attempts.set(attempts.get() + 1);
                    Err(Error::DeviceNotFound {
                        vendor_id: 0,
                        product_id: 0,
                        usage_page: 0,
                        usage_id: 0,
                    })
                },
            )
            .unwrap();

        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn run_survives_device_errors() {
        let watcher = watcher();
        let mut events: VecDeque<_> =
            vec![Ok(event("Telegram Desktop", "a")), Ok(event("Telegram Desktop", "b"))].into();

        // The first keyboard never answers the state query.
        let (silent, silent_log) = MockTransport::new();
        let (responsive, responsive_log) = open_mock(0x01, Policy::Strict);
        let sessions = RefCell::new(VecDeque::from([
            Session::new(silent, options(Policy::Strict)),
            responsive,
        ]));

        watcher
            .run(
                || events.pop_front(),
                || sessions.borrow_mut().pop_front().ok_or(Error::SessionClosed),
            )
            .unwrap();

        assert!(sessions.borrow().is_empty());
        assert_eq!(silent_log.borrow().writes.len(), 1);
        assert_eq!(silent_log.borrow().closes, 1);
        assert_eq!(responsive_log.borrow().writes.len(), 3);
        assert_eq!(responsive_log.borrow().closes, 1);
    }

    #[test]
    fn run_stops_when_cancelled() {
        let watcher = watcher();
        watcher.cancel.cancel();

        let polled = Cell::new(false);
        watcher
            .run(
                || {
                    polled.set(true);
                    None
                },
                || -> Result<Session<MockTransport>> { Err(Error::SessionClosed) },
            )
            .unwrap();

        assert!(!polled.get());
    }
}
