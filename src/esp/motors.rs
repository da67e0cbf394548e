use esp_idf_svc::hal::gpio::{
    AnyOutputPin, Gpio12, Gpio13, Gpio14, Gpio15, Gpio2, Gpio4, Output, OutputPin, PinDriver,
};
use esp_idf_svc::hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution, LEDC};
use esp_idf_svc::hal::units::Hertz;
use log::info;

use crate::config::DriveSettings;
use crate::drive::DriveController;

pub type EspDriveController =
    DriveController<PinDriver<'static, AnyOutputPin, Output>, LedcDriver<'static>>;

/// L298N-style wiring: IN1..IN4 set direction, ENA/ENB take the PWM.
pub struct MotorPins {
    pub in1: Gpio12,
    pub in2: Gpio13,
    pub in3: Gpio14,
    pub in4: Gpio15,
    pub ena: Gpio2,
    // GPIO16 is the PSRAM chip select on the ESP32-CAM.
    pub enb: Gpio4,
}

fn resolution(bits: u8) -> anyhow::Result<Resolution> {
    Ok(match bits {
        8 => Resolution::Bits8,
        10 => Resolution::Bits10,
        12 => Resolution::Bits12,
        13 => Resolution::Bits13,
        14 => Resolution::Bits14,
        other => anyhow::bail!("Unsupported PWM resolution: {} bits", other),
    })
}

fn output(pin: impl OutputPin + 'static) -> anyhow::Result<PinDriver<'static, AnyOutputPin, Output>> {
    let mut line = PinDriver::output(pin.downgrade_output())?;
    line.set_low()?;
    Ok(line)
}

/// Configure the direction lines and the two PWM channels, all idle.
pub fn start_motors(
    pins: MotorPins,
    ledc: LEDC,
    settings: &DriveSettings,
) -> anyhow::Result<EspDriveController> {
    let lines = [
        output(pins.in1)?,
        output(pins.in2)?,
        output(pins.in3)?,
        output(pins.in4)?,
    ];

    let timer_config = TimerConfig::new()
        .frequency(Hertz(settings.pwm_frequency_hz))
        .resolution(resolution(settings.resolution_bits)?);
    // Both channels share the timer for the life of the firmware.
    let timer = Box::leak(Box::new(LedcTimerDriver::new(ledc.timer0, &timer_config)?));

    let mut ena = LedcDriver::new(ledc.channel0, &*timer, pins.ena)?;
    let mut enb = LedcDriver::new(ledc.channel1, &*timer, pins.enb)?;
    ena.set_duty(0)?;
    enb.set_duty(0)?;

    info!(
        "Motors ready: {} Hz PWM, max duty {}",
        settings.pwm_frequency_hz,
        ena.get_max_duty()
    );
    Ok(DriveController::new(lines, [ena, enb], settings.duty))
}
