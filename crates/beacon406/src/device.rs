//! USB tuner detection and reset
//!
//! RTL283x DVB-T sticks occasionally wedge in a state where tuning
//! succeeds but no samples flow, and only a USB-level reset brings
//! them back. The adapter enumerates attached devices with `lsusb`,
//! finds the first known tuner, and hands its bus address to an
//! external reset helper. Everything here is best-effort: a missing
//! tuner, a failed listing, or a failed reset is logged and ignored.

use std::path::PathBuf;
use std::process::Command;

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

/// Vendor string of supported tuners
const TUNER_VENDOR: &str = "Realtek";

/// Product identifiers of known-good chipsets
const TUNER_PRODUCTS: [&str; 2] = ["2832", "2838"];

/// Issues a best-effort hardware reset of the tuner
pub trait TunerReset {
    /// Reset the tuner if one is attached
    ///
    /// Never fails and is safe to call repeatedly, including when no
    /// tuner is present.
    fn reset_if_present(&mut self);
}

/// Resets an attached RTL-SDR dongle via an external helper
pub struct UsbTunerReset {
    list_program: PathBuf,
    reset_program: PathBuf,
}

impl UsbTunerReset {
    /// Use `lsusb` and the `reset_usb` helper from the working
    /// directory
    pub fn new() -> Self {
        Self::with_programs("lsusb", "./reset_usb")
    }

    /// Use alternate executables
    pub fn with_programs<P, Q>(list_program: P, reset_program: Q) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self {
            list_program: list_program.into(),
            reset_program: reset_program.into(),
        }
    }
}

impl Default for UsbTunerReset {
    fn default() -> Self {
        Self::new()
    }
}

impl TunerReset for UsbTunerReset {
    fn reset_if_present(&mut self) {
        let listing = match Command::new(&self.list_program).output() {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
            Ok(out) => {
                debug!("device listing exited with {}", out.status);
                return;
            }
            Err(err) => {
                debug!("unable to list USB devices: {}", err);
                return;
            }
        };

        let Some(node) = tuner_device_node(&listing) else {
            debug!("no tuner attached, skipping reset");
            return;
        };

        debug!("resetting tuner at {}", node);
        match Command::new(&self.reset_program).arg(&node).status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("tuner reset exited with {}", status),
            Err(err) => warn!("unable to run tuner reset: {}", err),
        }
    }
}

// Find the device node of the first attached tuner in `lsusb` output.
//
// A matching line names the tuner vendor and carries an allow-listed
// product id:
//
// ```txt
// Bus 001 Device 004: ID 0bda:2838 Realtek Semiconductor Corp. RTL2838 DVB-T
// ```
fn tuner_device_node(listing: &str) -> Option<String> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^Bus (\d{3}) Device (\d{3}): ID ([0-9a-fA-F]{4}):([0-9a-fA-F]{4}) (.*)$")
                .expect("bad lsusb regexp");
    }

    for line in listing.lines() {
        let Some(caps) = RE.captures(line.trim()) else {
            continue;
        };
        if !caps[5].contains(TUNER_VENDOR) {
            continue;
        }
        let product = &caps[4];
        if TUNER_PRODUCTS.contains(&product) {
            return Some(format!("/dev/bus/usb/{}/{}", &caps[1], &caps[2]));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Bus 002 Device 001: ID 1d6b:0003 Linux Foundation 3.0 root hub
Bus 001 Device 004: ID 0bda:2838 Realtek Semiconductor Corp. RTL2838 DVB-T
Bus 001 Device 003: ID 8087:0024 Intel Corp. Integrated Rate Matching Hub
Bus 001 Device 001: ID 1d6b:0002 Linux Foundation 2.0 root hub";

    #[test]
    fn test_finds_tuner_node() {
        assert_eq!(
            tuner_device_node(LISTING).as_deref(),
            Some("/dev/bus/usb/001/004")
        );
    }

    #[test]
    fn test_ignores_other_realtek_products() {
        let listing = "Bus 001 Device 009: ID 0bda:8153 Realtek Semiconductor Corp. RTL8153 Gigabit Ethernet Adapter";
        assert_eq!(tuner_device_node(listing), None);
    }

    #[test]
    fn test_ignores_foreign_vendors() {
        let listing = "Bus 001 Device 005: ID 1234:2838 Some Other Vendor";
        assert_eq!(tuner_device_node(listing), None);
    }

    #[test]
    fn test_tolerates_garbage() {
        assert_eq!(tuner_device_node(""), None);
        assert_eq!(tuner_device_node("not an lsusb line at all"), None);
    }

    #[test]
    fn test_first_tuner_wins() {
        let listing = "\
Bus 001 Device 004: ID 0bda:2832 Realtek Semiconductor Corp. RTL2832U
Bus 001 Device 005: ID 0bda:2838 Realtek Semiconductor Corp. RTL2838 DVB-T";
        assert_eq!(
            tuner_device_node(listing).as_deref(),
            Some("/dev/bus/usb/001/004")
        );
    }
}
