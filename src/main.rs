use esp_idf_svc::eventloop::EspSystemEventLoop;

use espconnect::esp::{EspRadio, EspRouteHost, NvsStore};
use espconnect::{
    ProvisioningController, SystemClock, UdpDnsSocket, DEFAULT_CONNECTION_TIMEOUT_MS,
    DEFAULT_PORTAL_TIMEOUT_MS,
};

/// 按住 BOOT 键这么久就清除保存的凭据
const ERASE_HOLD_SECS: u64 = 2;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    let peripherals = esp_idf_svc::hal::prelude::Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;

    // Configures the button
    let mut button = esp_idf_svc::hal::gpio::PinDriver::input(peripherals.pins.gpio0)?;
    button.set_pull(esp_idf_svc::hal::gpio::Pull::Up)?;

    let radio = EspRadio::new(peripherals.modem, sysloop, Some(partition.clone()))?;
    let mac_suffix = radio.mac_suffix()?;
    let store = NvsStore::new(partition)?;
    let host = EspRouteHost::new()?;

    let mut portal =
        ProvisioningController::new(radio, store, host, UdpDnsSocket::new(), SystemClock::new());
    portal.auto_connect(
        &format!("ESPConnect-{}", mac_suffix),
        "",
        DEFAULT_PORTAL_TIMEOUT_MS,
    );

    if button.is_low() {
        let start = std::time::Instant::now();
        while button.is_low() && start.elapsed().as_secs() < ERASE_HOLD_SECS {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        if button.is_low() {
            log::info!("Long press detected, erasing WiFi credentials");
            portal.erase();
        }
    }

    log::info!("Configured: {}", portal.is_configured());
    log_heap();

    if !portal.begin(DEFAULT_CONNECTION_TIMEOUT_MS) {
        log::warn!("Provisioning timed out, restarting");
        unsafe { esp_idf_svc::sys::esp_restart() }
    }
    log::info!("Connected to {:?}", portal.ssid());
    log_heap();

    loop {
        std::thread::sleep(std::time::Duration::from_secs(10));
        if !portal.is_connected() {
            log::warn!("WiFi link lost");
        }
    }
}

pub fn log_heap() {
    unsafe {
        use esp_idf_svc::sys::{heap_caps_get_free_size, MALLOC_CAP_INTERNAL};

        log::info!(
            "Free INTERNAL heap size: {}KB",
            heap_caps_get_free_size(MALLOC_CAP_INTERNAL) / 1024
        );
    }
}
