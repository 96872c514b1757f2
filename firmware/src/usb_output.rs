//! USB HID gamepad transport.
//!
//! The control task stages button and axis changes through the
//! [`Transport`] trait; `send_report` publishes the staged state to a
//! [`Signal`] that the HID writer task drains ("latest value wins").

use defmt::Format;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_usb::class::hid::{HidWriter, State};
use embassy_usb::{Builder, Handler};
use pad_core::pad_proto::{Axis, Buttons, GamepadReport};
use pad_core::Transport;
use portable_atomic::{AtomicBool, Ordering};

/// HID writer for [`HidReport`]s on the RP2040 USB peripheral.
pub type GamepadWriter = HidWriter<'static, Driver<'static, USB>, { HidReport::SIZE }>;

/// Latest report waiting for the HID writer task.
pub type ReportSignal = Signal<CriticalSectionRawMutex, HidReport>;

/// Wire format of one input report.
///
/// Matches [`REPORT_DESCRIPTOR`]. Total size: 11 bytes (buttons: 3, axes: 4x2)
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Format)]
pub struct HidReport {
    /// Button bitfield, bit `n - 1` is button `n` (17 used)
    pub buttons: u32,
    /// X, Y, Z, Rz, each 0-65535
    pub axes: [u16; 4],
}

impl HidReport {
    /// Size of the report in bytes.
    pub const SIZE: usize = 11;

    /// Convert the report to bytes.
    #[must_use]
    pub fn as_bytes(&self) -> [u8; Self::SIZE] {
        let buttons = self.buttons.to_le_bytes();
        let mut out = [0u8; Self::SIZE];
        out[..3].copy_from_slice(&buttons[..3]);
        for (chunk, axis) in out[3..].chunks_exact_mut(2).zip(self.axes.iter()) {
            chunk.copy_from_slice(&axis.to_le_bytes());
        }
        out
    }
}

impl From<&GamepadReport> for HidReport {
    fn from(report: &GamepadReport) -> Self {
        Self {
            buttons: report.pressed.raw(),
            axes: Axis::ALL.map(|axis| report.axes.get(axis)),
        }
    }
}

/// HID report descriptor: 17 buttons and four 16-bit axes.
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Gamepad)
    0xA1, 0x01, // Collection (Application)
    //
    // --- Buttons (17 buttons) ---
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (Button 1)
    0x29, 0x11, //   Usage Maximum (Button 17)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x95, 0x11, //   Report Count (17)
    0x75, 0x01, //   Report Size (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Padding to a byte boundary ---
    0x95, 0x01, //   Report Count (1)
    0x75, 0x07, //   Report Size (7)
    0x81, 0x03, //   Input (Constant)
    //
    // --- Left stick (X/Y) and right stick (Z/Rz) ---
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x09, 0x30, //   Usage (X)
    0x09, 0x31, //   Usage (Y)
    0x09, 0x32, //   Usage (Z)
    0x09, 0x35, //   Usage (Rz)
    0x15, 0x00, //   Logical Minimum (0)
    0x27, 0xFF, 0xFF, 0x00, 0x00, //   Logical Maximum (65535)
    0x95, 0x04, //   Report Count (4)
    0x75, 0x10, //   Report Size (16)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    0xC0, // End Collection
];

/// Tracks whether the host has configured the device.
pub struct ConnectionHandler {
    connected: &'static AtomicBool,
}

impl ConnectionHandler {
    #[must_use]
    pub const fn new(connected: &'static AtomicBool) -> Self {
        Self { connected }
    }
}

impl Handler for ConnectionHandler {
    fn configured(&mut self, configured: bool) {
        defmt::info!("USB configured: {}", configured);
        self.connected.store(configured, Ordering::Release);
    }

    fn suspended(&mut self, suspended: bool) {
        if suspended {
            defmt::info!("USB suspended");
            self.connected.store(false, Ordering::Release);
        }
    }

    fn reset(&mut self) {
        self.connected.store(false, Ordering::Release);
    }
}

/// [`Transport`] over USB HID.
pub struct UsbHidTransport {
    staged: GamepadReport,
    signal: &'static ReportSignal,
    connected: &'static AtomicBool,
}

impl UsbHidTransport {
    #[must_use]
    pub fn new(signal: &'static ReportSignal, connected: &'static AtomicBool) -> Self {
        Self {
            staged: GamepadReport::neutral(),
            signal,
            connected,
        }
    }
}

impl Transport for UsbHidTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn press(&mut self, button: u8) {
        if let Some(bit) = Buttons::from_index(button) {
            self.staged.pressed.set(bit, true);
        }
    }

    fn release(&mut self, button: u8) {
        if let Some(bit) = Buttons::from_index(button) {
            self.staged.pressed.set(bit, false);
        }
    }

    fn set_axis(&mut self, axis: Axis, value: u16) {
        self.staged.axes.set(axis, value);
    }

    fn send_report(&mut self) {
        self.signal.signal(HidReport::from(&self.staged));
    }
}

/// Configure the USB HID class in the USB builder.
///
/// Returns the HID writer for use by the application.
pub fn configure_usb_hid(
    builder: &mut Builder<'static, Driver<'static, USB>>,
    state: &'static mut State<'static>,
) -> GamepadWriter {
    let config = embassy_usb::class::hid::Config {
        report_descriptor: REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: 1,
        max_packet_size: 16,
        hid_subclass: embassy_usb::class::hid::HidSubclass::No,
        hid_boot_protocol: embassy_usb::class::hid::HidBootProtocol::None,
    };

    HidWriter::new(builder, state, config)
}
