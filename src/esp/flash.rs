// Update partition sink over the raw esp_ota_* API

use core::ffi::c_void;
use esp_idf_sys::{
    esp_ota_abort, esp_ota_begin, esp_ota_end, esp_ota_get_next_update_partition,
    esp_ota_handle_t, esp_ota_set_boot_partition, esp_ota_write, esp_partition_t, ESP_OK,
};
use log::{info, warn};

use crate::sink::{FlashSink, SinkError, ERR_NOT_STARTED, ERR_NO_SPACE};

pub struct EspFlashSink {
    update_partition: *const esp_partition_t,
    ota_handle: Option<esp_ota_handle_t>,
    complete: bool,
    last_error: i32,
}

impl EspFlashSink {
    pub fn new() -> Result<Self, SinkError> {
        // Next OTA slot after the running one
        let update_partition = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };
        if update_partition.is_null() {
            return Err(SinkError::Unavailable);
        }

        Ok(Self {
            update_partition,
            ota_handle: None,
            complete: false,
            last_error: 0,
        })
    }

    pub fn partition_size(&self) -> usize {
        unsafe { (*self.update_partition).size as usize }
    }

    fn fail(&mut self, code: i32) -> i32 {
        self.last_error = code;
        code
    }
}

impl FlashSink for EspFlashSink {
    fn reserve(&mut self, size: usize) -> Result<(), SinkError> {
        self.abort();
        self.complete = false;
        self.last_error = 0;

        if size == 0 || size > self.partition_size() {
            self.fail(ERR_NO_SPACE);
            return Err(SinkError::InvalidSize(size));
        }

        let mut handle: esp_ota_handle_t = 0;
        let result = unsafe { esp_ota_begin(self.update_partition, size as _, &mut handle) };
        if result != ESP_OK {
            return Err(SinkError::BeginFailed(self.fail(result)));
        }

        info!("OTA partition reserved for {} bytes", size);
        self.ota_handle = Some(handle);
        Ok(())
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let handle = match self.ota_handle {
            Some(handle) => handle,
            None => {
                self.fail(ERR_NOT_STARTED);
                return Err(SinkError::NotStarted);
            }
        };

        let result = unsafe { esp_ota_write(handle, data.as_ptr() as *const c_void, data.len() as _) };
        if result != ESP_OK {
            return Err(SinkError::WriteFailed(self.fail(result)));
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        let handle = match self.ota_handle.take() {
            Some(handle) => handle,
            None => {
                self.fail(ERR_NOT_STARTED);
                return Err(SinkError::NotStarted);
            }
        };

        // Validates the image and releases the handle either way
        let result = unsafe { esp_ota_end(handle) };
        if result != ESP_OK {
            return Err(SinkError::ValidationFailed(self.fail(result)));
        }

        let result = unsafe { esp_ota_set_boot_partition(self.update_partition) };
        if result != ESP_OK {
            return Err(SinkError::BootPartitionFailed(self.fail(result)));
        }

        self.complete = true;
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn last_error_code(&self) -> i32 {
        self.last_error
    }

    fn abort(&mut self) {
        if let Some(handle) = self.ota_handle.take() {
            let result = unsafe { esp_ota_abort(handle) };
            if result != ESP_OK {
                warn!("esp_ota_abort failed: {}", result);
            }
        }
    }
}

impl Drop for EspFlashSink {
    fn drop(&mut self) {
        self.abort();
    }
}
