//! Device identity and platform facts.
//!
//! The factory MAC is the bridge's stable identity towards the backend and
//! the device-info endpoint. Heap and chip queries feed the status report;
//! `restart` is the single choke point for the two deliberate reboot causes
//! (completed OTA, credential clear).

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Colon-separated uppercase MAC text, e.g. `DE:AD:BE:EF:CA:FE`.
pub type MacString = heapless::String<20>;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Render a MAC in the standard colon notation.
pub fn mac_string(mac: &MacAddress) -> MacString {
    use core::fmt::Write;
    let mut s = MacString::new();
    let _ = write!(
        s,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    s
}

/// Free heap in bytes.
#[cfg(target_os = "espidf")]
pub fn free_heap_bytes() -> u32 {
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}

#[cfg(not(target_os = "espidf"))]
pub fn free_heap_bytes() -> u32 {
    0
}

/// Marketing name of the SoC the bridge runs on.
#[cfg(target_os = "espidf")]
pub fn chip_model() -> &'static str {
    "ESP32-S3"
}

#[cfg(not(target_os = "espidf"))]
pub fn chip_model() -> &'static str {
    "host-sim"
}

/// Soft reset. Only a completed OTA update and an explicit credential clear
/// are allowed to end up here.
#[cfg(target_os = "espidf")]
pub fn restart() -> ! {
    log::warn!("sysinfo: restarting");
    unsafe {
        esp_idf_svc::sys::esp_restart();
    }
    unreachable!("esp_restart returned")
}

#[cfg(not(target_os = "espidf"))]
pub fn restart() -> ! {
    panic!("restart requested (simulation — no real hardware reset)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_text_format() {
        let mac = [0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC];
        assert_eq!(mac_string(&mac).as_str(), "00:11:22:AA:BB:CC");
    }

    #[test]
    fn sim_mac_deterministic() {
        assert_eq!(read_mac(), read_mac());
        assert_eq!(mac_string(&read_mac()).as_str(), "DE:AD:BE:EF:CA:FE");
    }
}
