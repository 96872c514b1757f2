#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{error, info, unwrap};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_rp::adc::{self, Adc};
use embassy_rp::bind_interrupts;
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::USB;
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::usb::Driver;
use embassy_rp::watchdog::Watchdog;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};
use embassy_usb::class::cdc_acm::{self, CdcAcmClass};
use embassy_usb::class::hid::State;
use embassy_usb::{Builder, Config as UsbConfig};
use pad_core::config::{
    DEVICE_MANUFACTURER, DEVICE_NAME, PRODUCT_ID, SERIAL_NUMBER, VENDOR_ID, WAKE_BUTTON_SLOT,
    WAKE_PIN,
};
use pad_core::{BoardIo, PollOutcome};
use pad_firmware::console::{self, PACKET_SIZE};
use pad_firmware::flash_storage::FLASH_SIZE;
use pad_firmware::{
    configure_usb_hid, AdcInput, AnalogFrontEnd, AnalogSource, ButtonPin, CommandChannel,
    ConnectionHandler, ConsoleClass, EmbassyClock, FlashStorage, GamepadWriter, PadController,
    PwmLed, PwmMotor, ReportSignal, ResponseChannel, RpBoard, RpLowPower, UsbHidTransport,
    VbusSense,
};
use portable_atomic::AtomicBool;
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

/// Latest report from the control task to the HID task.
static REPORT_SIGNAL: StaticCell<ReportSignal> = StaticCell::new();

/// Set by the USB handler while the host has the device configured.
static USB_CONNECTED: AtomicBool = AtomicBool::new(false);

/// Console requests and their answers, one in flight at a time.
static COMMANDS: CommandChannel = Channel::new();
static RESPONSES: ResponseChannel = Channel::new();

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// USB class state.
static HID_STATE: StaticCell<State> = StaticCell::new();
static CDC_STATE: StaticCell<cdc_acm::State> = StaticCell::new();
static USB_HANDLER: StaticCell<ConnectionHandler> = StaticCell::new();

/// Button pins, shared between the buttons and the wake logic.
static BUTTON_PINS: StaticCell<[Input<'static>; 17]> = StaticCell::new();

/// ADC, stick channels and the battery mux.
static ANALOG: StaticCell<RefCell<AnalogFrontEnd>> = StaticCell::new();

/// Control loop resolution; the controller gates its own tick rates.
const POLL_PERIOD: Duration = Duration::from_millis(1);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("{} starting...", DEVICE_NAME);

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    let signal = REPORT_SIGNAL.init(Signal::new());

    // --- Buttons (GPIO 0-16, active low) ---
    let pins: &'static [Input<'static>; 17] = BUTTON_PINS.init([
        Input::new(p.PIN_0, Pull::Up),
        Input::new(p.PIN_1, Pull::Up),
        Input::new(p.PIN_2, Pull::Up),
        Input::new(p.PIN_3, Pull::Up),
        Input::new(p.PIN_4, Pull::Up),
        Input::new(p.PIN_5, Pull::Up),
        Input::new(p.PIN_6, Pull::Up),
        Input::new(p.PIN_7, Pull::Up),
        Input::new(p.PIN_8, Pull::Up),
        Input::new(p.PIN_9, Pull::Up),
        Input::new(p.PIN_10, Pull::Up),
        Input::new(p.PIN_11, Pull::Up),
        Input::new(p.PIN_12, Pull::Up),
        Input::new(p.PIN_13, Pull::Up),
        Input::new(p.PIN_14, Pull::Up),
        Input::new(p.PIN_15, Pull::Up),
        Input::new(p.PIN_16, Pull::Up),
    ]);
    let buttons = core::array::from_fn(|slot| ButtonPin(&pins[slot]));

    // --- Analog: sticks on ADC0-2, ADC3 muxed between right stick Y and battery ---
    let adc = Adc::new_blocking(p.ADC, adc::Config::default());
    let analog: &'static RefCell<AnalogFrontEnd> = ANALOG.init(RefCell::new(AnalogFrontEnd::new(
        adc,
        adc::Channel::new_pin(p.PIN_26, Pull::None),
        adc::Channel::new_pin(p.PIN_27, Pull::None),
        adc::Channel::new_pin(p.PIN_28, Pull::None),
        adc::Channel::new_pin(p.PIN_29, Pull::None),
        Output::new(p.PIN_23, Level::Low),
    )));
    let axes = [
        AdcInput::new(analog, AnalogSource::LeftX),
        AdcInput::new(analog, AnalogSource::LeftY),
        AdcInput::new(analog, AnalogSource::RightX),
        AdcInput::new(analog, AnalogSource::RightY),
    ];

    // --- PWM: LEDs and motors ---
    let mut pwm_config = PwmConfig::default();
    pwm_config.top = 999; // 500 Hz @ 125 MHz
    pwm_config.divider = 250.into();

    let (_, connection_led) = Pwm::new_output_b(p.PWM_SLICE0, p.PIN_17, pwm_config.clone()).split();
    let (left_motor, vibration_led) =
        Pwm::new_output_ab(p.PWM_SLICE1, p.PIN_18, p.PIN_19, pwm_config.clone()).split();
    let (right_motor, battery_led) =
        Pwm::new_output_ab(p.PWM_SLICE2, p.PIN_20, p.PIN_21, pwm_config.clone()).split();
    let (charging_led, _) = Pwm::new_output_a(p.PWM_SLICE3, p.PIN_22, pwm_config).split();

    let io = BoardIo::<RpBoard> {
        buttons,
        axes,
        battery: AdcInput::new(analog, AnalogSource::Battery),
        charge: VbusSense(Input::new(p.PIN_24, Pull::None)),
        connection_led: PwmLed(unwrap!(connection_led)),
        vibration_led: PwmLed(unwrap!(vibration_led)),
        battery_led: PwmLed(unwrap!(battery_led)),
        charging_led: PwmLed(unwrap!(charging_led)),
        left_motor: PwmMotor(unwrap!(left_motor)),
        right_motor: PwmMotor(unwrap!(right_motor)),
    };

    // --- Storage and power ---
    let flash = Flash::<_, Blocking, FLASH_SIZE>::new_blocking(p.FLASH);
    let storage = FlashStorage::new(flash);
    let low_power =
        RpLowPower::new(Watchdog::new(p.WATCHDOG), &pins[WAKE_BUTTON_SLOT], WAKE_PIN);

    // --- USB Setup: HID gamepad + CDC-ACM console ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(VENDOR_ID, PRODUCT_ID);
    usb_config.manufacturer = Some(DEVICE_MANUFACTURER);
    usb_config.product = Some(DEVICE_NAME);
    usb_config.serial_number = Some(SERIAL_NUMBER);
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;
    // Composite device with interface association descriptors
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );
    builder.handler(USB_HANDLER.init(ConnectionHandler::new(&USB_CONNECTED)));

    let hid_state = HID_STATE.init(State::new());
    let hid_writer = configure_usb_hid(&mut builder, hid_state);

    let cdc_state = CDC_STATE.init(cdc_acm::State::new());
    let console_class = CdcAcmClass::new(&mut builder, cdc_state, PACKET_SIZE);

    let usb_device = builder.build();

    let transport = UsbHidTransport::new(signal, &USB_CONNECTED);
    let controller = PadController::new(io, transport, storage, low_power, EmbassyClock);

    // Spawn tasks (unwrap the SpawnToken, then spawn)
    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(hid_task(hid_writer, signal).unwrap());
    spawner.spawn(console_task(console_class).unwrap());
    spawner.spawn(control_task(controller).unwrap());

    info!("{} initialized", DEVICE_NAME);
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// HID task - waits for report signals and writes them to the host.
#[embassy_executor::task]
async fn hid_task(mut writer: GamepadWriter, signal: &'static ReportSignal) {
    writer.ready().await;
    info!("USB HID ready");

    loop {
        let report = signal.wait().await;
        if let Err(e) = writer.write(&report.as_bytes()).await {
            error!("HID write error: {:?}", e);
        }
    }
}

/// Console task - serves the calibration console whenever a host opens it.
#[embassy_executor::task]
async fn console_task(mut class: ConsoleClass) {
    loop {
        class.wait_connection().await;
        info!("Console connected");
        if let Err(e) = console::serve(&mut class, &COMMANDS, &RESPONSES).await {
            info!("Console disconnected: {:?}", e);
        }
    }
}

/// Control task - owns the controller and runs its loop.
#[embassy_executor::task]
async fn control_task(mut controller: PadController) {
    controller.on_cold_start();

    let mut ticker = Ticker::every(POLL_PERIOD);
    loop {
        match select(ticker.next(), COMMANDS.receive()).await {
            Either::First(()) => {
                if controller.poll() == PollOutcome::Sleeping {
                    // Only reached if deep sleep returned without a restart
                    error!("Controller asleep but still running, halting");
                    core::future::pending::<()>().await;
                }
            }
            Either::Second(command) => {
                let response = controller.handle_command(command);
                RESPONSES.send(response).await;
            }
        }
    }
}
