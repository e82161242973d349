//! Non-volatile credential storage.
//!
//! The bridge persists exactly one secret: the uplink WiFi credentials
//! (SSID + passphrase), stored as a postcard blob in its own NVS namespace.
//! They are read once at startup, written only by an explicit save action,
//! and erased by an explicit clear action (which the caller follows with a
//! restart).
//!
//! - **`target_os = "espidf"`** — raw `nvs_*` calls against the default
//!   partition; commits are atomic per `nvs_commit()`.
//! - **all other targets** — in-memory map for host tests.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Error;

const CRED_NAMESPACE: &str = "uplink";
const CRED_KEY: &str = "creds";

/// Stored uplink credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Credentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, Error> {
        Ok(Self {
            ssid: heapless::String::try_from(ssid)
                .map_err(|_| Error::Config("SSID longer than 32 bytes"))?,
            password: heapless::String::try_from(password)
                .map_err(|_| Error::Config("passphrase longer than 64 bytes"))?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }
}

pub struct CredentialStore {
    #[cfg(not(target_os = "espidf"))]
    blob: core::cell::RefCell<Option<Vec<u8>>>,
}

impl CredentialStore {
    /// Open the store, initialising NVS flash if needed. On first boot or a
    /// partition version mismatch the partition is erased and recreated.
    pub fn new() -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        espidf::init_flash()?;

        #[cfg(not(target_os = "espidf"))]
        info!("nvs: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            blob: core::cell::RefCell::new(None),
        })
    }

    /// Load stored credentials; `None` when nothing was ever saved.
    pub fn load(&self) -> Option<Credentials> {
        let blob = self.read_blob()?;
        match postcard::from_bytes::<Credentials>(&blob) {
            Ok(creds) if !creds.is_empty() => {
                info!("nvs: loaded credentials for '{}'", creds.ssid);
                Some(creds)
            }
            Ok(_) => None,
            Err(_) => {
                // Blob from an incompatible firmware; treat as unprovisioned.
                log::warn!("nvs: stored credentials unreadable, ignoring");
                None
            }
        }
    }

    /// Persist credentials. Atomic: either the whole blob lands or nothing.
    pub fn save(&self, creds: &Credentials) -> Result<(), Error> {
        let blob = postcard::to_allocvec(creds)
            .map_err(|_| Error::Config("credential encode failed"))?;
        self.write_blob(&blob)?;
        info!("nvs: saved credentials for '{}'", creds.ssid);
        Ok(())
    }

    /// Erase stored credentials. The caller forces a restart afterwards.
    pub fn clear(&self) -> Result<(), Error> {
        self.erase_blob()?;
        info!("nvs: credentials cleared");
        Ok(())
    }

    // ── Platform-specific blob I/O ────────────────────────────

    #[cfg(target_os = "espidf")]
    fn read_blob(&self) -> Option<Vec<u8>> {
        espidf::read(CRED_NAMESPACE, CRED_KEY)
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&self, blob: &[u8]) -> Result<(), Error> {
        espidf::write(CRED_NAMESPACE, CRED_KEY, blob)
    }

    #[cfg(target_os = "espidf")]
    fn erase_blob(&self) -> Result<(), Error> {
        espidf::erase(CRED_NAMESPACE, CRED_KEY)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self) -> Option<Vec<u8>> {
        self.blob.borrow().clone()
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_blob(&self, blob: &[u8]) -> Result<(), Error> {
        *self.blob.borrow_mut() = Some(blob.to_vec());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn erase_blob(&self) -> Result<(), Error> {
        *self.blob.borrow_mut() = None;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod espidf {
    use esp_idf_svc::sys::*;
    use log::warn;

    use crate::error::Error;

    pub fn init_flash() -> Result<(), Error> {
        // SAFETY: nvs_flash_init / nvs_flash_erase run from the single main
        // task before any other NVS access.
        let ret = unsafe { nvs_flash_init() };
        if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
            warn!("nvs: erasing and re-initialising flash partition");
            if unsafe { nvs_flash_erase() } != ESP_OK {
                return Err(Error::Config("NVS erase failed"));
            }
            if unsafe { nvs_flash_init() } != ESP_OK {
                return Err(Error::Config("NVS re-init failed"));
            }
        } else if ret != ESP_OK {
            return Err(Error::Config("NVS init failed"));
        }
        Ok(())
    }

    /// Open a namespace, run `f` with the handle, close it again.
    fn with_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = key.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    pub fn read(namespace: &str, key: &str) -> Option<Vec<u8>> {
        let key = key_buf(key);
        with_handle(namespace, false, |handle| {
            let mut len: usize = 0;
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, core::ptr::null_mut(), &mut len)
            };
            if ret != ESP_OK || len == 0 {
                return Err(ret);
            }
            let mut blob = vec![0u8; len];
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, blob.as_mut_ptr() as *mut _, &mut len)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(blob)
        })
        .ok()
    }

    pub fn write(namespace: &str, key: &str, blob: &[u8]) -> Result<(), Error> {
        let key = key_buf(key);
        with_handle(namespace, true, |handle| {
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr() as *const _, blob.as_ptr() as *const _, blob.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|_| Error::Config("NVS write failed"))
    }

    pub fn erase(namespace: &str, key: &str) -> Result<(), Error> {
        let key = key_buf(key);
        with_handle(namespace, true, |handle| {
            let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|_| Error::Config("NVS erase failed"))
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn empty_store_loads_nothing() {
        let store = CredentialStore::new().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn save_load_roundtrip() {
        let store = CredentialStore::new().unwrap();
        let creds = Credentials::new("HomeNet", "hunter22").unwrap();
        store.save(&creds).unwrap();
        assert_eq!(store.load().unwrap(), creds);
    }

    #[test]
    fn clear_removes_credentials() {
        let store = CredentialStore::new().unwrap();
        store.save(&Credentials::new("HomeNet", "hunter22").unwrap()).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn oversized_ssid_is_a_config_error() {
        let long = "x".repeat(40);
        assert!(matches!(
            Credentials::new(&long, "pw"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn corrupt_blob_treated_as_unprovisioned() {
        let store = CredentialStore::new().unwrap();
        store.write_blob(&[0xFF; 3]).unwrap();
        assert!(store.load().is_none());
    }
}
