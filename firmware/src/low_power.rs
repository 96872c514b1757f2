//! Deep sleep for the RP2040.
//!
//! Sleep is emulated: the core stops running the control loop and waits in
//! `wfi` with a level interrupt armed on the wake pin, then restarts through
//! the watchdog once the pin reaches its wake level. A magic value in a
//! watchdog scratch register survives that reset and tells the next boot it
//! was woken by the pin.

use embassy_rp::gpio::Input;
use embassy_rp::pac;
use embassy_rp::watchdog::Watchdog;
use pad_core::{wait_for_wake_press, LowPower, WakeCause, WakeLevel, WakeSourceError};

/// Scratch register carrying the wake marker across the reset.
const WAKE_SCRATCH: usize = 0;

/// "WAKE"
const WAKE_MAGIC: u32 = 0x5741_4B45;

/// [`LowPower`] using the watchdog for the wake restart.
pub struct RpLowPower {
    watchdog: Watchdog,
    wake_pin: &'static Input<'static>,
    /// GPIO number of `wake_pin`.
    gpio: u8,
    armed: Option<WakeLevel>,
    cause: WakeCause,
}

impl RpLowPower {
    /// Take the watchdog and read (then clear) the wake marker.
    ///
    /// `wake_pin` must be the input on GPIO `gpio`.
    #[must_use]
    pub fn new(mut watchdog: Watchdog, wake_pin: &'static Input<'static>, gpio: u8) -> Self {
        let cause = if watchdog.get_scratch(WAKE_SCRATCH) == WAKE_MAGIC {
            WakeCause::WakePin
        } else {
            WakeCause::PowerOn
        };
        watchdog.set_scratch(WAKE_SCRATCH, 0);

        Self {
            watchdog,
            wake_pin,
            gpio,
            armed: None,
            cause,
        }
    }

    fn at_level(&self, level: WakeLevel) -> bool {
        match level {
            WakeLevel::Low => self.wake_pin.is_low(),
            WakeLevel::High => self.wake_pin.is_high(),
        }
    }

    /// Arm a level interrupt for `level` on the wake pin and sleep until an
    /// interrupt is pending.
    ///
    /// The bank0 handler installed by embassy-rp disarms the pin when it
    /// fires, so every call re-arms.
    fn park_until(&self, level: WakeLevel) {
        let bank = usize::from(self.gpio / 8);
        let field = usize::from(self.gpio % 8);
        let inte = pac::IO_BANK0.int_proc(0).inte(bank);

        // Masked so an interrupt landing before `wfi` still wakes it
        cortex_m::interrupt::free(|_| {
            inte.write_clear(|w| {
                w.set_level_low(field, true);
                w.set_level_high(field, true);
            });
            inte.write_set(|w| match level {
                WakeLevel::Low => w.set_level_low(field, true),
                WakeLevel::High => w.set_level_high(field, true),
            });
            cortex_m::asm::wfi();
        });
    }
}

const fn opposite(level: WakeLevel) -> WakeLevel {
    match level {
        WakeLevel::Low => WakeLevel::High,
        WakeLevel::High => WakeLevel::Low,
    }
}

impl LowPower for RpLowPower {
    fn wake_cause(&self) -> WakeCause {
        self.cause
    }

    fn configure_wake_source(&mut self, pin: u8, level: WakeLevel) -> Result<(), WakeSourceError> {
        // Only the wake button's pin is handed to this adapter
        if pin != self.gpio {
            return Err(WakeSourceError::UnsupportedPin);
        }
        self.armed = Some(level);
        Ok(())
    }

    fn enter_deep_sleep(&mut self) {
        let Some(level) = self.armed else {
            defmt::error!("Deep sleep without a wake source");
            return;
        };

        wait_for_wake_press(
            || self.at_level(level),
            |asserted| {
                self.park_until(if asserted { level } else { opposite(level) });
            },
        );

        defmt::info!("Wake pin asserted, restarting");
        self.watchdog.set_scratch(WAKE_SCRATCH, WAKE_MAGIC);
        self.watchdog.trigger_reset();
        loop {
            cortex_m::asm::nop();
        }
    }
}
