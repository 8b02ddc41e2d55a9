use std::cell::RefCell;
use std::rc::Rc;

use crate::{Error, Result};

/// The `localStorage`-shaped primitive score history lives in.
///
/// Reads never fail: an unavailable store reads as empty. Writes report quota
/// and availability problems as [`Error::Storage`].
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, index: usize) -> Option<String>;

    /// Read-modify-write of a single key.
    ///
    /// The default is a plain `get_item` followed by `set_item`, so two writers
    /// sharing a backend through separate handles can still lose an update
    /// (last write wins). Implementations that can do better override it.
    fn update_item(&self, key: &str, update: &mut dyn FnMut(Option<&str>) -> String) -> Result<()> {
        let current = self.get_item(key);
        let next = update(current.as_deref());
        self.set_item(key, &next)
    }
}

#[derive(Debug, Default)]
struct StorageArea {
    pairs: Vec<(String, String)>,
    // Measured in UTF-16 code units over keys and values, as browsers do.
    quota: Option<usize>,
    disabled: bool,
}

impl StorageArea {
    fn check_writable(&self) -> Result<()> {
        if self.disabled {
            return Err(Error::Storage("localStorage is not available".into()));
        }
        Ok(())
    }

    fn usage_with(&self, key: &str, value: &str) -> usize {
        let others: usize = self
            .pairs
            .iter()
            .filter(|(name, _)| name != key)
            .map(|(name, stored)| utf16_len(name) + utf16_len(stored))
            .sum();
        others + utf16_len(key) + utf16_len(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        if let Some(quota) = self.quota {
            let usage = self.usage_with(key, value);
            if usage > quota {
                return Err(Error::Storage(format!(
                    "QuotaExceededError: setting {key:?} needs {usage} units, quota is {quota}"
                )));
            }
        }
        if let Some((_, stored)) = self.pairs.iter_mut().find(|(name, _)| name == key) {
            *stored = value.to_string();
        } else {
            self.pairs.push((key.to_string(), value.to_string()));
        }
        Ok(())
    }
}

fn utf16_len(value: &str) -> usize {
    value.encode_utf16().count()
}

/// In-process `localStorage`. Clones are handles to the same storage area,
/// which is how every page opened in one [`Browser`](crate::Browser) sees the
/// same data.
#[derive(Debug, Clone, Default)]
pub struct LocalStorage {
    area: Rc<RefCell<StorageArea>>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        let storage = Self::new();
        {
            let mut area = storage.area.borrow_mut();
            for (key, value) in entries {
                if let Some((_, stored)) = area.pairs.iter_mut().find(|(name, _)| name == key) {
                    *stored = (*value).to_string();
                } else {
                    area.pairs.push(((*key).to_string(), (*value).to_string()));
                }
            }
        }
        storage
    }

    /// Limits the total size of keys and values; `None` removes the limit.
    pub fn set_quota(&self, quota: Option<usize>) {
        self.area.borrow_mut().quota = quota;
    }

    /// Simulates storage being switched off (private mode, policy): writes fail
    /// and reads see nothing.
    pub fn set_disabled(&self, disabled: bool) {
        self.area.borrow_mut().disabled = disabled;
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        let area = self.area.borrow();
        if area.disabled {
            return Vec::new();
        }
        area.pairs.clone()
    }

    pub fn shares_area_with(&self, other: &LocalStorage) -> bool {
        Rc::ptr_eq(&self.area, &other.area)
    }
}

impl KeyValueStore for LocalStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let area = self.area.borrow();
        if area.disabled {
            return None;
        }
        area.pairs
            .iter()
            .find_map(|(name, value)| (name == key).then(|| value.clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.area.borrow_mut().set(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut area = self.area.borrow_mut();
        area.check_writable()?;
        area.pairs.retain(|(name, _)| name != key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut area = self.area.borrow_mut();
        area.check_writable()?;
        area.pairs.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        let area = self.area.borrow();
        if area.disabled { 0 } else { area.pairs.len() }
    }

    fn key(&self, index: usize) -> Option<String> {
        let area = self.area.borrow();
        if area.disabled {
            return None;
        }
        area.pairs.get(index).map(|(name, _)| name.clone())
    }

    // The whole read-modify-write runs under one borrow, so no other handle can
    // interleave a write.
    fn update_item(&self, key: &str, update: &mut dyn FnMut(Option<&str>) -> String) -> Result<()> {
        let mut area = self.area.borrow_mut();
        area.check_writable()?;
        let current = area
            .pairs
            .iter()
            .find_map(|(name, value)| (name == key).then(|| value.clone()));
        let next = update(current.as_deref());
        area.set(key, &next)
    }
}
