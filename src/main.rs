#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use cambuggy::config::Config;
    use cambuggy::esp::{camera, motors, server, wifi};
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::info;

    // Basic ESP-IDF setup
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let config = Config::from_build_env()?;

    // 1. Take peripherals
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    // Takes care of erasing and re-initialising a full or outdated partition
    let nvs = EspDefaultNvsPartition::take()?;

    // 2. Setup WiFi
    let _wifi = wifi::connect(peripherals.modem, sys_loop, nvs, &config.wifi)?;

    // 3. Setup motors
    let pins = peripherals.pins;
    let drive = motors::start_motors(
        motors::MotorPins {
            in1: pins.gpio12,
            in2: pins.gpio13,
            in3: pins.gpio14,
            in4: pins.gpio15,
            ena: pins.gpio2,
            enb: pins.gpio4,
        },
        peripherals.ledc,
        &config.drive,
    )?;

    // 4. Setup camera
    let camera = camera::start_camera(&config.camera)?;

    // 5. Start HTTP servers
    let _servers = server::start(
        &config.http,
        Arc::new(Mutex::new(drive)),
        camera,
        config.camera.conversion_quality,
    )?;

    info!("Server ready!");

    // Keep main thread alive
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!(
        "cambuggy is ESP32 firmware: build with --target xtensa-esp32-espidf. \
         Run `cargo test --lib` for the host tests."
    );
    std::process::exit(1);
}
