//! Keyboard discovery.

use std::fmt::{self, Display, Formatter};

use hidapi::{DeviceInfo, HidApi, HidDevice};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Identifiers of the raw HID interface, all of which must match exactly.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct DeviceIds {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage_id: u8,
}

impl DeviceIds {
    pub fn matches(&self, vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> bool {
        self.vendor_id == vendor_id
            && self.product_id == product_id
            && self.usage_page == usage_page
            && u16::from(self.usage_id) == usage
    }

    fn not_found(&self) -> Error {
        Error::DeviceNotFound {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            usage_page: self.usage_page,
            usage_id: u16::from(self.usage_id),
        }
    }
}

impl Display for DeviceIds {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (usage {:04x}:{:02x})",
            self.vendor_id, self.product_id, self.usage_page, self.usage_id
        )
    }
}

/// Enumerated HID interface.
pub trait Candidate {
    /// Vendor ID, product ID, usage page and usage.
    fn identity(&self) -> (u16, u16, u16, u16);
}

impl Candidate for &DeviceInfo {
    fn identity(&self) -> (u16, u16, u16, u16) {
        (self.vendor_id(), self.product_id(), self.usage_page(), self.usage())
    }
}

/// Open the first candidate matching all identifiers.
///
/// `open` is only called for the matching candidate.
pub fn find_in<C, T, I, F>(candidates: I, ids: &DeviceIds, open: F) -> Result<T>
where
    C: Candidate,
    I: IntoIterator<Item = C>,
    F: FnOnce(C) -> Result<T>,
{
    let candidate = candidates
        .into_iter()
        .find(|candidate| {
            let (vendor_id, product_id, usage_page, usage) = candidate.identity();
            debug!(
                "Found HID interface {vendor_id:04x}:{product_id:04x} (usage \
                 {usage_page:04x}:{usage:02x})"
            );
            ids.matches(vendor_id, product_id, usage_page, usage)
        })
        .ok_or_else(|| ids.not_found())?;

    open(candidate)
}

/// Finds the keyboard among all attached HID devices.
#[derive(Debug, Clone)]
pub struct DeviceLocator {
    ids: DeviceIds,
}

impl DeviceLocator {
    pub fn new(ids: DeviceIds) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &DeviceIds {
        &self.ids
    }

    /// Enumerate HID devices and open the matching raw HID interface.
    pub fn find(&self) -> Result<HidDevice> {
        let api = HidApi::new()?;

        let device = find_in(api.device_list(), &self.ids, |info| {
            debug!("Opening {:?}", info.path());
            Ok(info.open_device(&api)?)
        })?;

        info!("Opened keyboard {}", self.ids);

        Ok(device)
    }
}
