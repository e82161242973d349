//! Flash-partition firmware sink — backed by the `esp-ota` crate.
//!
//! The `esp-ota` crate wraps the ESP-IDF OTA partition API in safe Rust, so
//! this adapter carries no unsafe FFI. Dropping an unfinished `OtaUpdate`
//! aborts it, which is exactly the `abandon` semantics the pipeline wants.

#[cfg(target_os = "espidf")]
pub use espidf_impl::PartitionSink;

#[cfg(target_os = "espidf")]
mod espidf_impl {
    use log::{info, warn};

    use crate::error::OtaError;
    use crate::ota::FirmwareSink;

    /// Writes image bytes into the inactive OTA partition.
    pub struct PartitionSink {
        update: Option<esp_ota::OtaUpdate>,
    }

    impl PartitionSink {
        pub fn new() -> Self {
            Self { update: None }
        }
    }

    impl Default for PartitionSink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FirmwareSink for PartitionSink {
        fn begin(&mut self, expected: Option<u32>) -> Result<(), OtaError> {
            if self.update.is_some() {
                return Err(OtaError::BeginFailed);
            }
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {e:?}");
                OtaError::BeginFailed
            })?;
            self.update = Some(update);
            info!("flash: partition opened ({expected:?} bytes expected)");
            Ok(())
        }

        fn write(&mut self, chunk: &[u8]) -> Result<usize, OtaError> {
            let update = self.update.as_mut().ok_or(OtaError::WriteFailed)?;
            update.write(chunk).map_err(|e| {
                warn!("esp-ota write failed: {e:?}");
                OtaError::WriteFailed
            })?;
            Ok(chunk.len())
        }

        fn commit(&mut self) -> Result<(), OtaError> {
            let update = self.update.take().ok_or(OtaError::VerifyFailed)?;
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {e:?}");
                OtaError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {e:?}");
                OtaError::VerifyFailed
            })?;
            info!("flash: new image set as boot partition");
            Ok(())
        }

        fn abandon(&mut self) {
            // esp-ota aborts automatically when OtaUpdate is dropped.
            self.update.take();
            warn!("flash: partial image dropped");
        }
    }
}

/// Mark the running firmware valid on startup.
///
/// Without this, the rollback watchdog reverts to the previous firmware
/// after three consecutive failed boots.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => log::info!("flash: firmware marked valid (rollback cancelled)"),
        Err(e) => log::warn!("flash: mark_app_valid failed: {e:?}"),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    log::info!("flash: rollback check (simulation): skipped");
}
