//! Battery-powered USB gamepad firmware for RP2040.
//!
//! This crate binds the platform-agnostic [`pad_core::Controller`] to the
//! RP2040: pin adapters, the USB HID transport, the calibration console on
//! a CDC-ACM port, flash persistence and watchdog-based deep sleep.
//!
//! # Architecture
//!
//! ```text
//! control task (1 ms ticker) ──Controller::poll──► UsbHidTransport ──Signal──► hid task ──► host
//!        ▲
//!        └──── Channel<Command> / Channel<Response> ◄──── console task ◄──── CDC-ACM ◄── host
//! ```
//!
//! See [`board`] for the pin map.
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development
//! - **`prod-panic`**: Use `panic-reset` for production (silent watchdog reset)

#![no_std]

pub mod board;
pub mod console;
pub mod flash_storage;
pub mod low_power;
pub mod usb_output;

pub use board::{
    AdcInput, AnalogFrontEnd, AnalogSource, ButtonPin, EmbassyClock, PwmLed, PwmMotor, RpBoard,
    VbusSense,
};
pub use console::{CommandChannel, ConsoleClass, ResponseChannel};
pub use flash_storage::{BoardFlash, FlashStorage};
pub use low_power::RpLowPower;
pub use usb_output::{
    configure_usb_hid, ConnectionHandler, GamepadWriter, HidReport, ReportSignal, UsbHidTransport,
};

/// The controller as wired on this board.
pub type PadController =
    pad_core::Controller<RpBoard, UsbHidTransport, FlashStorage, RpLowPower, EmbassyClock>;
