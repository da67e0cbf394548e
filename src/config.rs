//! Build-time configuration.
//!
//! Nothing is persisted on the device. Credentials and the few tunables are
//! baked in from `CAMBUGGY_*` environment variables at compile time, so they
//! stay out of the source tree.

use core::str::FromStr;

use log::warn;

use crate::camera::PixelFormat;
use crate::motion::DutyProfile;
use crate::stream::DEFAULT_JPEG_QUALITY;

// Limits of the ESP-IDF station config (`wifi_sta_config_t`).
const MAX_SSID_LEN: usize = 32;
const MAX_PASSWORD_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("http port {0} leaves no room for the control and stream ports")]
    PortOverflow(u16),
    #[error("http port must not be 0")]
    PortZero,
    #[error("JPEG quality {0} is outside 1..=100")]
    Quality(u8),
    #[error("WiFi SSID is longer than 32 bytes")]
    SsidTooLong,
    #[error("WiFi password is longer than 64 bytes")]
    PasswordTooLong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiSettings {
    pub ssid: String,
    /// Empty for an open network.
    pub password: String,
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self {
            ssid: "CamBuggy".into(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub port: u16,
    /// Also serve `/stream` from a second server on `port + 1`.
    pub stream_server: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            port: 80,
            stream_server: true,
        }
    }
}

impl HttpSettings {
    pub fn ctrl_port(&self) -> u16 {
        self.port.wrapping_add(1)
    }

    pub fn stream_port(&self) -> u16 {
        self.port.wrapping_add(1)
    }

    // Clear of the main server's ctrl port.
    pub fn stream_ctrl_port(&self) -> u16 {
        self.port.wrapping_add(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveSettings {
    pub pwm_frequency_hz: u32,
    pub resolution_bits: u8,
    pub duty: DutyProfile,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            pwm_frequency_hz: 5_000,
            resolution_bits: 8,
            duty: DutyProfile::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSize {
    Qvga,
    Vga,
    Svga,
    Xga,
    /// 1600x1200, single buffer only
    Uxga,
}

impl FromStr for FrameSize {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qvga" => Ok(FrameSize::Qvga),
            "vga" => Ok(FrameSize::Vga),
            "svga" => Ok(FrameSize::Svga),
            "xga" => Ok(FrameSize::Xga),
            "uxga" => Ok(FrameSize::Uxga),
            _ => Err(()),
        }
    }
}

fn parse_pixel_format(s: &str) -> Option<PixelFormat> {
    match s.to_ascii_lowercase().as_str() {
        "jpeg" => Some(PixelFormat::Jpeg),
        "rgb565" => Some(PixelFormat::Rgb565),
        "yuv422" => Some(PixelFormat::Yuv422),
        "grayscale" => Some(PixelFormat::Grayscale),
        "rgb888" => Some(PixelFormat::Rgb888),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSettings {
    /// Format the sensor delivers. Anything but JPEG is compressed per frame.
    pub pixel_format: PixelFormat,
    pub frame_size: FrameSize,
    /// Sensor-side JPEG quality, 0-63, lower is better.
    pub sensor_jpeg_quality: u8,
    /// Software conversion quality, 1-100.
    pub conversion_quality: u8,
    pub frame_buffers: u8,
    pub xclk_hz: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Jpeg,
            frame_size: FrameSize::Vga,
            sensor_jpeg_quality: 12,
            conversion_quality: DEFAULT_JPEG_QUALITY,
            frame_buffers: 2,
            xclk_hz: 20_000_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub wifi: WifiSettings,
    pub http: HttpSettings,
    pub drive: DriveSettings,
    pub camera: CameraSettings,
}

impl Config {
    /// Defaults overridden by the `CAMBUGGY_*` variables seen at build time.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_overrides(|name| match name {
            "CAMBUGGY_WIFI_SSID" => option_env!("CAMBUGGY_WIFI_SSID"),
            "CAMBUGGY_WIFI_PASS" => option_env!("CAMBUGGY_WIFI_PASS"),
            "CAMBUGGY_HTTP_PORT" => option_env!("CAMBUGGY_HTTP_PORT"),
            "CAMBUGGY_STREAM_SERVER" => option_env!("CAMBUGGY_STREAM_SERVER"),
            "CAMBUGGY_PIXEL_FORMAT" => option_env!("CAMBUGGY_PIXEL_FORMAT"),
            "CAMBUGGY_FRAME_SIZE" => option_env!("CAMBUGGY_FRAME_SIZE"),
            _ => None,
        });
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `var`. Unparsable values keep the default.
    pub fn with_overrides<'a>(mut self, var: impl Fn(&str) -> Option<&'a str>) -> Self {
        if let Some(ssid) = var("CAMBUGGY_WIFI_SSID") {
            self.wifi.ssid = ssid.to_owned();
        }
        if let Some(password) = var("CAMBUGGY_WIFI_PASS") {
            self.wifi.password = password.to_owned();
        }
        if let Some(port) = var("CAMBUGGY_HTTP_PORT") {
            match port.parse() {
                Ok(port) => self.http.port = port,
                Err(_) => warn!("Ignoring CAMBUGGY_HTTP_PORT={port}, not a port number"),
            }
        }
        if let Some(enabled) = var("CAMBUGGY_STREAM_SERVER") {
            match enabled {
                "1" | "true" | "yes" => self.http.stream_server = true,
                "0" | "false" | "no" => self.http.stream_server = false,
                other => warn!("Ignoring CAMBUGGY_STREAM_SERVER={other}"),
            }
        }
        if let Some(format) = var("CAMBUGGY_PIXEL_FORMAT") {
            match parse_pixel_format(format) {
                Some(format) => self.camera.pixel_format = format,
                None => warn!("Ignoring unknown CAMBUGGY_PIXEL_FORMAT={format}"),
            }
        }
        if let Some(size) = var("CAMBUGGY_FRAME_SIZE") {
            match size.parse() {
                Ok(size) => self.camera.frame_size = size,
                Err(()) => warn!("Ignoring unknown CAMBUGGY_FRAME_SIZE={size}"),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::PortZero);
        }
        if self.http.port.checked_add(2).is_none() {
            return Err(ConfigError::PortOverflow(self.http.port));
        }
        if !(1..=100).contains(&self.camera.conversion_quality) {
            return Err(ConfigError::Quality(self.camera.conversion_quality));
        }
        if self.wifi.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong);
        }
        if self.wifi.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong);
        }
        Ok(())
    }
}
