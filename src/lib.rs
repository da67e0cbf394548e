//! CamBuggy: WiFi camera car firmware.
//!
//! The command dispatcher ([`drive`]) and the MJPEG publisher ([`stream`]) are
//! written against `embedded-hal` / `embedded-io` traits and [`camera`]'s
//! `FrameSource`, so they run in host unit tests. The [`esp`] module binds them
//! to the ESP32 peripherals and is only built for ESP-IDF targets.

pub mod camera;
pub mod config;
pub mod drive;
pub mod motion;
pub mod page;
pub mod query;
pub mod stream;

#[cfg(target_os = "espidf")]
pub mod esp;
