//! RP2040 pin adapters for the `pad-core` hardware traits.
//!
//! # Pin map
//!
//! | Function | GPIO | Notes |
//! |----------|------|-------|
//! | Buttons (17) | 0-16 | Active low, internal pull-ups, wiring order of [`BUTTON_MAP`](pad_core::config::BUTTON_MAP) |
//! | Connection LED | 17 | PWM0 B |
//! | Left motor | 18 | PWM1 A |
//! | Vibration LED | 19 | PWM1 B |
//! | Right motor | 20 | PWM2 A |
//! | Battery LED | 21 | PWM2 B |
//! | Charging LED | 22 | PWM3 A |
//! | Analog mux select | 23 | Low: right stick Y, high: battery divider |
//! | VBUS sense | 24 | High while USB power is present |
//! | Left stick X / Y | 26 / 27 | ADC0 / ADC1 |
//! | Right stick X | 28 | ADC2 |
//! | Right stick Y / battery | 29 | ADC3, shared through the mux |

use core::cell::RefCell;

use embassy_rp::adc::{Adc, Blocking, Channel};
use embassy_rp::gpio::{Input, Level, Output};
use embassy_time::{block_for, Duration, Instant};
use embedded_hal::pwm::SetDutyCycle;
use pad_core::config::LED_BRIGHTNESS;
use pad_core::pad_proto::RAW_CENTER;
use pad_core::{
    AnalogInput, Board, ChargeSense, ChargeStatus, Clock, DigitalInput, DigitalOutput, PwmOutput,
};

/// Settling time after switching the analog mux.
const MUX_SETTLE: Duration = Duration::from_micros(20);

/// The reference board.
pub struct RpBoard;

impl Board for RpBoard {
    type Button = ButtonPin;
    type Axis = AdcInput;
    type Battery = AdcInput;
    type Charge = VbusSense;
    type Led = PwmLed;
    type Motor = PwmMotor;
}

/// Millisecond clock over the embassy time driver.
#[derive(Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        // Truncation gives the wrapping u32 counter the core expects
        Instant::now().as_millis() as u32
    }
}

/// A button contact pulled up internally and shorted to ground when held.
///
/// Holds a shared reference so the low-power adapter can watch the wake
/// button too.
#[derive(Clone, Copy)]
pub struct ButtonPin(pub &'static Input<'static>);

impl DigitalInput for ButtonPin {
    fn is_active(&mut self) -> bool {
        self.0.is_low()
    }
}

/// Which signal an [`AdcInput`] samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AnalogSource {
    LeftX,
    LeftY,
    RightX,
    RightY,
    Battery,
}

impl AnalogSource {
    const fn index(self) -> usize {
        self as usize
    }
}

/// The ADC, its four channels and the mux in front of ADC3.
pub struct AnalogFrontEnd {
    adc: Adc<'static, Blocking>,
    left_x: Channel<'static>,
    left_y: Channel<'static>,
    right_x: Channel<'static>,
    shared: Channel<'static>,
    mux: Output<'static>,
    /// Last good reading per source, returned when a conversion fails.
    last: [u16; 5],
}

impl AnalogFrontEnd {
    #[must_use]
    pub fn new(
        adc: Adc<'static, Blocking>,
        left_x: Channel<'static>,
        left_y: Channel<'static>,
        right_x: Channel<'static>,
        shared: Channel<'static>,
        mux: Output<'static>,
    ) -> Self {
        Self {
            adc,
            left_x,
            left_y,
            right_x,
            shared,
            mux,
            last: [RAW_CENTER, RAW_CENTER, RAW_CENTER, RAW_CENTER, 0],
        }
    }

    fn read(&mut self, source: AnalogSource) -> u16 {
        let channel = match source {
            AnalogSource::LeftX => &mut self.left_x,
            AnalogSource::LeftY => &mut self.left_y,
            AnalogSource::RightX => &mut self.right_x,
            AnalogSource::RightY | AnalogSource::Battery => {
                let level = if source == AnalogSource::Battery {
                    Level::High
                } else {
                    Level::Low
                };
                if self.mux.get_output_level() != level {
                    self.mux.set_level(level);
                    block_for(MUX_SETTLE);
                }
                &mut self.shared
            }
        };

        match self.adc.blocking_read(channel) {
            Ok(value) => {
                self.last[source.index()] = value;
                value
            }
            Err(_) => {
                defmt::warn!("ADC read failed on {}", source);
                self.last[source.index()]
            }
        }
    }
}

/// One analog signal on the shared front end.
pub struct AdcInput {
    front_end: &'static RefCell<AnalogFrontEnd>,
    source: AnalogSource,
}

impl AdcInput {
    #[must_use]
    pub const fn new(front_end: &'static RefCell<AnalogFrontEnd>, source: AnalogSource) -> Self {
        Self { front_end, source }
    }
}

impl AnalogInput for AdcInput {
    fn read(&mut self) -> u16 {
        self.front_end.borrow_mut().read(self.source)
    }
}

/// USB power present means the charger is running.
pub struct VbusSense(pub Input<'static>);

impl ChargeSense for VbusSense {
    fn status(&mut self) -> ChargeStatus {
        if self.0.is_high() {
            ChargeStatus::Charging
        } else {
            ChargeStatus::NotCharging
        }
    }
}

/// An indicator LED on a PWM channel, lit at [`LED_BRIGHTNESS`].
pub struct PwmLed(pub embassy_rp::pwm::PwmOutput<'static>);

impl DigitalOutput for PwmLed {
    fn set_active(&mut self, active: bool) {
        let brightness = if active { LED_BRIGHTNESS } else { 0 };
        if self
            .0
            .set_duty_cycle_fraction(u16::from(brightness), 255)
            .is_err()
        {
            defmt::warn!("LED PWM write failed");
        }
    }
}

/// A vibration motor driver on a PWM channel.
pub struct PwmMotor(pub embassy_rp::pwm::PwmOutput<'static>);

impl PwmOutput for PwmMotor {
    fn set_duty(&mut self, duty: u8) {
        if self
            .0
            .set_duty_cycle_fraction(u16::from(duty), 255)
            .is_err()
        {
            defmt::warn!("Motor PWM write failed");
        }
    }
}
