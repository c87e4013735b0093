//! DRM object property cache.

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_int;

use kmsdrm_sys as sys;

use crate::error::{kernel_error, Error};

/// One cached property: its kernel id, name, and last-known value.
#[derive(Clone, Debug)]
pub struct Property {
    pub id: u32,
    pub name: String,
    pub value: u64,
}

/// All properties of one DRM object, captured at `acquire` time.
///
/// The raw `drmModeObjectProperties`/`drmModePropertyRes` pointers are
/// copied into this owned record and freed immediately inside
/// [`PropertyCache::acquire`]; nothing here borrows libdrm memory, so
/// teardown is an ordinary `Drop` (the struct's `Vec`/`String` fields
/// free themselves) rather than a second explicit free pass.
#[derive(Clone, Debug)]
pub struct PropertyRecord {
    pub object_type: u32,
    pub properties: Vec<Property>,
}

impl PropertyRecord {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }
}

/// Maps DRM object id -> its [`PropertyRecord`].
#[derive(Default)]
pub struct PropertyCache {
    records: HashMap<u32, PropertyRecord>,
}

impl PropertyCache {
    pub fn new() -> Self {
        PropertyCache {
            records: HashMap::new(),
        }
    }

    /// Fetches `object_id`'s properties and caches them. Idempotent:
    /// re-acquiring replaces the cached record. An object reporting
    /// zero properties is left uncached (non-fatal).
    pub fn acquire(&mut self, fd: c_int, object_id: u32, object_type: u32) -> Result<(), Error> {
        let raw = unsafe { sys::drmModeObjectGetProperties(fd, object_id, object_type) };
        if raw.is_null() {
            return Err(kernel_error("drmModeObjectGetProperties"));
        }

        let count = unsafe { (*raw).count_props } as usize;
        if count == 0 {
            unsafe { sys::drmModeFreeObjectProperties(raw) };
            return Ok(());
        }

        let ids = unsafe { std::slice::from_raw_parts((*raw).props, count) };
        let values = unsafe { std::slice::from_raw_parts((*raw).prop_values, count) };

        let mut properties = Vec::with_capacity(count);
        for (&id, &value) in ids.iter().zip(values.iter()) {
            let prop = unsafe { sys::drmModeGetProperty(fd, id) };
            if prop.is_null() {
                continue;
            }
            let name = unsafe { CStr::from_ptr((*prop).name.as_ptr()) }
                .to_string_lossy()
                .into_owned();
            unsafe { sys::drmModeFreeProperty(prop) };
            properties.push(Property { id, name, value });
        }

        unsafe { sys::drmModeFreeObjectProperties(raw) };

        self.records.insert(
            object_id,
            PropertyRecord {
                object_type,
                properties,
            },
        );
        Ok(())
    }

    /// Looks up a property id by name on a previously-acquired object.
    pub fn lookup_id(&self, object_id: u32, name: &str) -> Result<u32, Error> {
        self.records
            .get(&object_id)
            .and_then(|record| record.index_of(name))
            .map(|idx| self.records[&object_id].properties[idx].id)
            .ok_or(Error::Unsupported)
    }

    /// Returns the cached current value of `name` on `object_id`.
    pub fn get_value(&self, object_id: u32, name: &str) -> Result<u64, Error> {
        self.records
            .get(&object_id)
            .and_then(|record| record.index_of(name))
            .map(|idx| self.records[&object_id].properties[idx].value)
            .ok_or(Error::Unsupported)
    }

    /// Whether `name` exists on `object_id` at all (used for the
    /// `FB_DAMAGE_CLIPS` capability probe).
    pub fn has_property(&self, object_id: u32, name: &str) -> bool {
        self.records
            .get(&object_id)
            .map(|record| record.index_of(name).is_some())
            .unwrap_or(false)
    }

    pub fn record(&self, object_id: u32) -> Option<&PropertyRecord> {
        self.records.get(&object_id)
    }

    /// Drops every cached record (used by `VideoQuit`).
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(props: &[(&str, u32, u64)]) -> PropertyRecord {
        PropertyRecord {
            object_type: sys::DRM_MODE_OBJECT_PLANE,
            properties: props
                .iter()
                .map(|&(name, id, value)| Property {
                    id,
                    name: name.to_string(),
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn lookup_and_value_round_trip_through_cache() {
        let mut cache = PropertyCache::new();
        cache.records.insert(
            1,
            record(&[("type", 10, 1), ("FB_ID", 11, 42), ("CRTC_ID", 12, 0)]),
        );

        assert_eq!(cache.lookup_id(1, "FB_ID").unwrap(), 11);
        assert_eq!(cache.get_value(1, "FB_ID").unwrap(), 42);
        assert!(cache.lookup_id(1, "nonexistent").is_err());
        assert!(cache.lookup_id(99, "FB_ID").is_err());
    }

    #[test]
    fn has_property_reflects_cache_contents() {
        let mut cache = PropertyCache::new();
        cache
            .records
            .insert(1, record(&[("FB_DAMAGE_CLIPS", 20, 0)]));
        assert!(cache.has_property(1, "FB_DAMAGE_CLIPS"));
        assert!(!cache.has_property(1, "GAMMA_LUT"));
        assert!(!cache.has_property(2, "FB_DAMAGE_CLIPS"));
    }

    #[test]
    fn clear_empties_every_record() {
        let mut cache = PropertyCache::new();
        cache.records.insert(1, record(&[("a", 1, 0)]));
        cache.records.insert(2, record(&[("b", 2, 0)]));
        cache.clear();
        assert!(cache.record(1).is_none());
        assert!(cache.record(2).is_none());
    }
}
