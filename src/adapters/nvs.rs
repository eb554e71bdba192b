//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements the [`Storage`] port over one NVS namespace.
//!
//! - **`target_os = "espidf"`** — blobs in the NVS flash partition;
//!   each write commits, so a snapshot is durable once `write` returns.
//! - **`not(target_os = "espidf")`** — a `Mutex<HashMap>` simulation
//!   backend, also used by the test suite.
//!
//! Keys are clipped to the 15-byte NVS key limit in both backends so
//! host tests see the same key space as the device.

use log::info;

use crate::error::{Error, Result};
use crate::storage::{Storage, clip_key};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;
#[cfg(not(target_os = "espidf"))]
use std::sync::Mutex;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub struct NvsStorage {
    #[cfg(target_os = "espidf")]
    namespace: heapless::String<15>,
    #[cfg(not(target_os = "espidf"))]
    store: Mutex<HashMap<String, Vec<u8>>>,
}

impl NvsStorage {
    /// Opens (and on device, initialises) the backing NVS partition for
    /// `namespace`. On first boot or after an NVS version mismatch the
    /// partition is erased and re-initialised.
    pub fn open(namespace: &str) -> Result<Self> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                log::warn!("nvs: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(Error::Failed);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(Error::Failed);
                }
            } else if ret != ESP_OK {
                return Err(Error::Failed);
            }
            info!("nvs: namespace={namespace} on flash");
            let mut ns = heapless::String::new();
            let _ = ns.push_str(&namespace[..namespace.len().min(15)]);
            Ok(Self { namespace: ns })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("nvs: namespace={namespace} on simulation backend");
            Ok(Self {
                store: Mutex::new(HashMap::new()),
            })
        }
    }

    /// Opens an NVS handle, runs `f`, then closes the handle.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(&self, write: bool, f: F) -> core::result::Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> core::result::Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = self.namespace.as_bytes();
        ns_buf[..ns_bytes.len()].copy_from_slice(ns_bytes);

        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let mut handle: nvs_handle_t = 0;
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

    #[cfg(target_os = "espidf")]
    fn key_buf(key: &str) -> [u8; 16] {
        let clipped = clip_key(key);
        let mut buf = [0u8; 16];
        buf[..clipped.len()].copy_from_slice(clipped.as_bytes());
        buf
    }
}

impl Storage for NvsStorage {
    fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        let key = clip_key(key);

        #[cfg(not(target_os = "espidf"))]
        {
            let store = self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match store.get(key.as_str()) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(Error::NoData),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = Self::key_buf(&key);
            let result = self.with_nvs_handle(false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(Error::NoData),
                Err(_) => Err(Error::Failed),
            }
        }
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let key = clip_key(key);

        #[cfg(not(target_os = "espidf"))]
        {
            let mut store = self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            store.insert(key.as_str().to_owned(), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = Self::key_buf(&key);
            let result = self.with_nvs_handle(true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| Error::Failed)
        }
    }

    fn erase(&self, key: &str) -> Result<()> {
        let key = clip_key(key);

        #[cfg(not(target_os = "espidf"))]
        {
            let mut store = self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match store.remove(key.as_str()) {
                Some(_) => Ok(()),
                None => Err(Error::NoData),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = Self::key_buf(&key);
            let result = self.with_nvs_handle(true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => Ok(()),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(Error::NoData),
                Err(_) => Err(Error::Failed),
            }
        }
    }
}
