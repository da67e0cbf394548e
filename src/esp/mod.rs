//! ESP32 board glue: camera driver, motor peripherals, WiFi and HTTP servers.

pub mod camera;
pub mod motors;
pub mod server;
pub mod wifi;
