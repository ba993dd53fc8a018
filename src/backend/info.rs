use std::collections::BTreeMap;

use crate::device::Device;

/// Descriptive information about one device of a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device: Device,
    pub name: String,
    pub vendor: String,
    pub version: String,
    /// Size of the device's main memory in bytes.
    pub global_memory: u64,
    pub properties: BTreeMap<String, String>,
}

impl DeviceInfo {
    pub fn new(device: Device, name: impl Into<String>) -> Self {
        Self {
            device,
            name: name.into(),
            vendor: String::new(),
            version: String::new(),
            global_memory: 0,
            properties: BTreeMap::new(),
        }
    }

    /// Insert a property unless one with the same name exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) -> bool {
        use std::collections::btree_map::Entry;

        match self.properties.entry(name.into()) {
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}
