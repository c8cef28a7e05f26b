//! HID transport abstraction.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use hidapi::HidDevice;

use crate::error::{Error, Result};

/// Default raw HID report size.
pub const DEFAULT_FRAME_SIZE: usize = 64;

/// Raw HID channel to a keyboard.
pub trait HidTransport {
    /// Write one complete report, returning the number of bytes written.
    fn write_report(&mut self, report: &[u8]) -> Result<usize>;

    /// Read one report, returning `0` if nothing arrived within the timeout.
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Release the underlying handle.
    fn close(self);
}

impl HidTransport for HidDevice {
    fn write_report(&mut self, report: &[u8]) -> Result<usize> {
        Ok(self.write(report)?)
    }

    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let timeout = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        Ok(self.read_timeout(buf, timeout)?)
    }

    fn close(self) {
        // hidapi closes the device handle on drop.
        drop(self);
    }
}

/// Conversion from command payloads to fixed-size reports.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Framing {
    /// Report size, excluding the report ID.
    pub frame_size: usize,
    /// Report ID prepended to every frame, for HID stacks that expect one.
    pub report_id: Option<u8>,
}

impl Default for Framing {
    fn default() -> Self {
        Self { frame_size: DEFAULT_FRAME_SIZE, report_id: None }
    }
}

impl Framing {
    pub fn new(frame_size: usize) -> Self {
        Self { frame_size, ..Default::default() }
    }

    /// Zero-pad a payload to the frame size.
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes> {
        if payload.len() > self.frame_size {
            return Err(Error::PayloadTooLong { len: payload.len(), frame_size: self.frame_size });
        }

        let mut buf = BytesMut::with_capacity(self.frame_size + 1);

        if let Some(report_id) = self.report_id {
            buf.put_u8(report_id);
        }

        buf.put_slice(payload);
        buf.put_bytes(0, self.frame_size - payload.len());

        Ok(buf.freeze())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording transport for session tests.

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::Duration;

    use super::HidTransport;
    use crate::error::{Error, Result};

    /// Everything the mock saw, shared with the test after the session took the transport.
    #[derive(Default, Debug)]
    pub struct MockLog {
        pub writes: Vec<Vec<u8>>,
        pub reads: usize,
        pub closes: usize,
    }

    pub struct MockTransport {
        log: Rc<RefCell<MockLog>>,
        responses: VecDeque<Vec<u8>>,
        fail_write: Option<usize>,
    }

    impl MockTransport {
        pub fn new() -> (Self, Rc<RefCell<MockLog>>) {
            let log = Rc::new(RefCell::new(MockLog::default()));
            let transport =
                Self { log: Rc::clone(&log), responses: VecDeque::new(), fail_write: None };
            (transport, log)
        }

        /// Queue a report the next read returns; an empty report simulates a timeout.
        pub fn respond(mut self, report: &[u8]) -> Self {
            self.responses.push_back(report.to_vec());
            self
        }

        /// Fail the write with the given zero-based index.
        pub fn fail_write_at(mut self, index: usize) -> Self {
            self.fail_write = Some(index);
            self
        }
    }

    impl HidTransport for MockTransport {
        fn write_report(&mut self, report: &[u8]) -> Result<usize> {
            let mut log = self.log.borrow_mut();
            if self.fail_write == Some(log.writes.len()) {
                self.fail_write = None;
                return Err(Error::Transport("mock write failure".into()));
            }

            log.writes.push(report.to_vec());
            Ok(report.len())
        }

        fn read_report(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            self.log.borrow_mut().reads += 1;

            let report = self.responses.pop_front().unwrap_or_default();
            let len = report.len().min(buf.len());
            buf[..len].copy_from_slice(&report[..len]);
            Ok(len)
        }

        fn close(self) {
            self.log.borrow_mut().closes += 1;
        }
    }
}
