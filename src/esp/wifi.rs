use anyhow::anyhow;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::info;

use crate::config::WifiSettings;

/// Join the configured network in station mode and wait for an address.
///
/// There is no retry. A failed join is returned to the caller.
pub fn connect(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    settings: &WifiSettings,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;

    let auth_method = if settings.password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: settings
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("SSID too long: {}", settings.ssid))?,
        password: settings
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("WiFi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("Connecting to {}...", settings.ssid);
    wifi.connect()?;
    wifi.wait_netif_up()?;

    info!("Wifi connected! IP: {}", wifi.wifi().sta_netif().get_ip_info()?.ip);
    Ok(wifi)
}
