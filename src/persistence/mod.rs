//! Key/value persistence (§6) — namespaced byte storage with typed helpers
//! layered on top via `postcard`.
//!
//! Grounded in the teacher's `adapters::nvs::NvsAdapter`: raw `read`/`write`/
//! `delete`/`exists` over `(namespace, key)` pairs, backed by ESP-IDF NVS on
//! `target_os = "espidf"` and an in-process `HashMap` everywhere else.
//! Namespaces used here: `wifi_config`, `mqtt_config`, `fusion_cfg`,
//! `power_cfg`, and `cadence`/`enabled` (keyed by [`crate::sensors::SensorId::as_str`]).

use log::warn;

use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const MAX_BLOB_SIZE: usize = 4_000;

/// Raw namespaced byte storage. Every subsystem's persisted value is
/// serialised with `postcard` and stored under `(namespace, key)`.
pub trait StoragePort {
    fn read_raw(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;
    fn write_raw(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError>;
    fn exists(&self, namespace: &str, key: &str) -> bool;

    fn get_u32(&self, namespace: &str, key: &str) -> Result<Option<u32>, StorageError> {
        get_typed(self, namespace, key)
    }

    fn set_u32(&self, namespace: &str, key: &str, value: u32) -> Result<(), StorageError> {
        set_typed(self, namespace, key, &value)
    }

    fn get_bool(&self, namespace: &str, key: &str) -> Result<Option<bool>, StorageError> {
        get_typed(self, namespace, key)
    }

    fn set_bool(&self, namespace: &str, key: &str, value: bool) -> Result<(), StorageError> {
        set_typed(self, namespace, key, &value)
    }

    fn get_f32(&self, namespace: &str, key: &str) -> Result<Option<f32>, StorageError> {
        get_typed(self, namespace, key)
    }

    fn set_f32(&self, namespace: &str, key: &str, value: f32) -> Result<(), StorageError> {
        set_typed(self, namespace, key, &value)
    }
}

fn get_typed<T: serde::de::DeserializeOwned>(
    port: &(impl StoragePort + ?Sized),
    namespace: &str,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let mut buf = [0u8; 64];
    match port.read_raw(namespace, key, &mut buf) {
        Ok(len) => postcard::from_bytes(&buf[..len])
            .map(Some)
            .map_err(|_| StorageError::Corrupted),
        Err(StorageError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

fn set_typed<T: serde::Serialize>(
    port: &(impl StoragePort + ?Sized),
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let mut buf = [0u8; 64];
    let encoded = postcard::to_slice(value, &mut buf).map_err(|_| StorageError::Full)?;
    port.write_raw(namespace, key, encoded)
}

pub struct NvsStorage {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsStorage {
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any concurrent
            // NVS access begins.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("persistence: erasing and re-initialising NVS partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
        }
        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }

    #[cfg(target_os = "espidf")]
    fn with_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

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
        unsafe { nvs_close(handle) };
        result
    }
}

impl StoragePort for NvsStorage {
    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let composite = Self::composite_key(namespace, key);
        match self.store.borrow().get(&composite) {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Err(StorageError::NotFound),
        }
    }

    #[cfg(target_os = "espidf")]
    fn read_raw(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let result = Self::with_handle(namespace, false, |handle| {
            let mut key_buf = [0u8; 16];
            let kb = key.as_bytes();
            let kl = kb.len().min(15);
            key_buf[..kl].copy_from_slice(&kb[..kl]);
            let mut size = buf.len();
            let ret = unsafe {
                nvs_get_blob(handle, key_buf.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret == ESP_ERR_NVS_NOT_FOUND {
                return Err(ESP_ERR_NVS_NOT_FOUND);
            }
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(size)
        });
        match result {
            Ok(size) => Ok(size),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            Err(_) => Err(StorageError::IoError),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_raw(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        let composite = Self::composite_key(namespace, key);
        self.store.borrow_mut().insert(composite, data.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn write_raw(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        let result = Self::with_handle(namespace, true, |handle| {
            let mut key_buf = [0u8; 16];
            let kb = key.as_bytes();
            let kl = kb.len().min(15);
            key_buf[..kl].copy_from_slice(&kb[..kl]);
            let ret = unsafe {
                nvs_set_blob(handle, key_buf.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
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
        result.map_err(|_| StorageError::IoError)
    }

    #[cfg(not(target_os = "espidf"))]
    fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let composite = Self::composite_key(namespace, key);
        self.store.borrow_mut().remove(&composite);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let result = Self::with_handle(namespace, true, |handle| {
            let mut key_buf = [0u8; 16];
            let kb = key.as_bytes();
            let kl = kb.len().min(15);
            key_buf[..kl].copy_from_slice(&kb[..kl]);
            let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|_| StorageError::IoError)
    }

    #[cfg(not(target_os = "espidf"))]
    fn exists(&self, namespace: &str, key: &str) -> bool {
        let composite = Self::composite_key(namespace, key);
        self.store.borrow().contains_key(&composite)
    }

    #[cfg(target_os = "espidf")]
    fn exists(&self, namespace: &str, key: &str) -> bool {
        let result = Self::with_handle(namespace, false, |handle| {
            let mut key_buf = [0u8; 16];
            let kb = key.as_bytes();
            let kl = kb.len().min(15);
            key_buf[..kl].copy_from_slice(&kb[..kl]);
            let ret = unsafe { nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut()) };
            Ok(ret == ESP_OK)
        });
        result.unwrap_or(false)
    }
}

impl Default for NvsStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_roundtrip() {
        let nvs = NvsStorage::new().unwrap();
        nvs.set_u32("cadence", "pm", 4_000).unwrap();
        assert_eq!(nvs.get_u32("cadence", "pm").unwrap(), Some(4_000));
    }

    #[test]
    fn missing_key_returns_none() {
        let nvs = NvsStorage::new().unwrap();
        assert_eq!(nvs.get_u32("cadence", "nope").unwrap(), None);
    }

    #[test]
    fn namespace_isolation() {
        let nvs = NvsStorage::new().unwrap();
        nvs.set_bool("enabled", "pm", false).unwrap();
        nvs.set_bool("enabled", "co2", true).unwrap();
        assert_eq!(nvs.get_bool("enabled", "pm").unwrap(), Some(false));
        assert_eq!(nvs.get_bool("enabled", "co2").unwrap(), Some(true));
    }

    #[test]
    fn delete_clears_key() {
        let nvs = NvsStorage::new().unwrap();
        nvs.set_u32("cadence", "gas", 1_000).unwrap();
        nvs.delete("cadence", "gas").unwrap();
        assert!(!nvs.exists("cadence", "gas"));
    }
}
