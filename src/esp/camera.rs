use core::ptr::{self, NonNull};

use esp_idf_svc::sys::camera::{
    camera_config_t, camera_fb_t, esp_camera_fb_get, esp_camera_fb_return, esp_camera_init,
    frame2jpg,

    // Pixel Formats
    pixformat_t, pixformat_t_PIXFORMAT_GRAYSCALE, pixformat_t_PIXFORMAT_JPEG,
    pixformat_t_PIXFORMAT_RGB565, pixformat_t_PIXFORMAT_RGB888, pixformat_t_PIXFORMAT_YUV422,

    // Frame Sizes (Resolutions)
    framesize_t, framesize_t_FRAMESIZE_QVGA, framesize_t_FRAMESIZE_SVGA,
    framesize_t_FRAMESIZE_UXGA, framesize_t_FRAMESIZE_VGA, framesize_t_FRAMESIZE_XGA,

    // Buffering
    camera_fb_location_t_CAMERA_FB_IN_PSRAM, camera_grab_mode_t_CAMERA_GRAB_LATEST,
    camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY,

    // XCLK Timer/Channel, clear of the motor PWM on timer 0 / channels 0-1
    ledc_channel_t_LEDC_CHANNEL_2, ledc_timer_t_LEDC_TIMER_1,
    ESP_OK,
};
use log::info;

use crate::camera::{Frame, FrameSource, PixelFormat};
use crate::config::{CameraSettings, FrameSize};

// AI-THINKER ESP32-CAM PINOUT
mod pinout {
    pub const PWDN: i32 = 32;
    pub const RESET: i32 = -1;
    pub const XCLK: i32 = 0;
    pub const SIOD: i32 = 26;
    pub const SIOC: i32 = 27;
    pub const Y9: i32 = 35;
    pub const Y8: i32 = 34;
    pub const Y7: i32 = 39;
    pub const Y6: i32 = 36;
    pub const Y5: i32 = 21;
    pub const Y4: i32 = 19;
    pub const Y3: i32 = 18;
    pub const Y2: i32 = 5;
    pub const VSYNC: i32 = 25;
    pub const HREF: i32 = 23;
    pub const PCLK: i32 = 22;
}

fn to_pixformat(format: PixelFormat) -> pixformat_t {
    match format {
        PixelFormat::Jpeg => pixformat_t_PIXFORMAT_JPEG,
        PixelFormat::Rgb565 => pixformat_t_PIXFORMAT_RGB565,
        PixelFormat::Yuv422 => pixformat_t_PIXFORMAT_YUV422,
        PixelFormat::Grayscale => pixformat_t_PIXFORMAT_GRAYSCALE,
        PixelFormat::Rgb888 => pixformat_t_PIXFORMAT_RGB888,
        PixelFormat::Raw(code) => code,
    }
}

#[allow(non_upper_case_globals)]
fn from_pixformat(format: pixformat_t) -> PixelFormat {
    match format {
        pixformat_t_PIXFORMAT_JPEG => PixelFormat::Jpeg,
        pixformat_t_PIXFORMAT_RGB565 => PixelFormat::Rgb565,
        pixformat_t_PIXFORMAT_YUV422 => PixelFormat::Yuv422,
        pixformat_t_PIXFORMAT_GRAYSCALE => PixelFormat::Grayscale,
        pixformat_t_PIXFORMAT_RGB888 => PixelFormat::Rgb888,
        other => PixelFormat::Raw(other),
    }
}

fn to_framesize(size: FrameSize) -> framesize_t {
    match size {
        FrameSize::Qvga => framesize_t_FRAMESIZE_QVGA,
        FrameSize::Vga => framesize_t_FRAMESIZE_VGA,
        FrameSize::Svga => framesize_t_FRAMESIZE_SVGA,
        FrameSize::Xga => framesize_t_FRAMESIZE_XGA,
        FrameSize::Uxga => framesize_t_FRAMESIZE_UXGA,
    }
}

/// Initialise the esp32-camera driver.
///
/// The driver is global, so the returned handle is only a token that the
/// driver is up. Copies of it can be handed to several servers.
pub fn start_camera(settings: &CameraSettings) -> anyhow::Result<EspCamera> {
    let mut camera_config = camera_config_t::default();

    camera_config.pin_pwdn = pinout::PWDN;
    camera_config.pin_reset = pinout::RESET;
    camera_config.pin_xclk = pinout::XCLK;
    camera_config.pin_d7 = pinout::Y9;
    camera_config.pin_d6 = pinout::Y8;
    camera_config.pin_d5 = pinout::Y7;
    camera_config.pin_d4 = pinout::Y6;
    camera_config.pin_d3 = pinout::Y5;
    camera_config.pin_d2 = pinout::Y4;
    camera_config.pin_d1 = pinout::Y3;
    camera_config.pin_d0 = pinout::Y2;
    camera_config.pin_vsync = pinout::VSYNC;
    camera_config.pin_href = pinout::HREF;
    camera_config.pin_pclk = pinout::PCLK;

    camera_config.xclk_freq_hz = settings.xclk_hz as i32;
    camera_config.ledc_timer = ledc_timer_t_LEDC_TIMER_1;
    camera_config.ledc_channel = ledc_channel_t_LEDC_CHANNEL_2;

    camera_config.pixel_format = to_pixformat(settings.pixel_format);
    camera_config.frame_size = to_framesize(settings.frame_size);
    camera_config.jpeg_quality = settings.sensor_jpeg_quality.clamp(4, 63) as i32;

    camera_config.fb_count = settings.frame_buffers.max(1) as usize;
    camera_config.fb_location = camera_fb_location_t_CAMERA_FB_IN_PSRAM;
    // With a single buffer, waiting for an empty one avoids stale frames.
    camera_config.grab_mode = if settings.frame_buffers > 1 {
        camera_grab_mode_t_CAMERA_GRAB_LATEST
    } else {
        camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY
    };

    unsafe {
        // Union assignments MUST be inside unsafe
        camera_config.__bindgen_anon_1.pin_sccb_sda = pinout::SIOD;
        camera_config.__bindgen_anon_2.pin_sccb_scl = pinout::SIOC;

        let err = esp_camera_init(&camera_config);
        if err != ESP_OK {
            anyhow::bail!("Camera init failed with error: {}", err);
        }
    }

    info!(
        "Camera ready: {:?} {:?}, {} frame buffer(s)",
        settings.pixel_format, settings.frame_size, camera_config.fb_count
    );
    Ok(EspCamera { _driver: () })
}

/// Handle to the initialised camera driver.
#[derive(Clone, Copy)]
pub struct EspCamera {
    _driver: (),
}

/// Frame buffer owned by the driver until dropped.
pub struct CameraFrame {
    fb: NonNull<camera_fb_t>,
}

impl Frame for CameraFrame {
    fn format(&self) -> PixelFormat {
        // Unaligned read: the struct embeds a packed timestamp
        let format = unsafe { ptr::addr_of!((*self.fb.as_ptr()).format).read_unaligned() };
        from_pixformat(format)
    }

    fn data(&self) -> &[u8] {
        unsafe {
            let fb = self.fb.as_ptr();
            let buf = ptr::addr_of!((*fb).buf).read_unaligned();
            let len = ptr::addr_of!((*fb).len).read_unaligned();
            core::slice::from_raw_parts(buf, len as usize)
        }
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        unsafe { esp_camera_fb_return(self.fb.as_ptr()) }
    }
}

/// JPEG produced by `frame2jpg`, heap allocated by the converter.
pub struct JpegBuffer {
    buf: NonNull<u8>,
    len: usize,
}

impl AsRef<[u8]> for JpegBuffer {
    fn as_ref(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.buf.as_ptr(), self.len) }
    }
}

impl Drop for JpegBuffer {
    fn drop(&mut self) {
        unsafe { esp_idf_svc::sys::free(self.buf.as_ptr().cast()) }
    }
}

impl FrameSource for EspCamera {
    type Frame = CameraFrame;
    type Jpeg = JpegBuffer;

    fn acquire(&mut self) -> Option<CameraFrame> {
        NonNull::new(unsafe { esp_camera_fb_get() }).map(|fb| CameraFrame { fb })
    }

    fn encode_jpeg(&mut self, frame: &CameraFrame, quality: u8) -> Option<JpegBuffer> {
        let mut buf: *mut u8 = ptr::null_mut();
        let mut len: usize = 0;

        let converted = unsafe { frame2jpg(frame.fb.as_ptr(), quality, &mut buf, &mut len) };
        if !converted {
            return None;
        }
        NonNull::new(buf).map(|buf| JpegBuffer { buf, len })
    }
}
