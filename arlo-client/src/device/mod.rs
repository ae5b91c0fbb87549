//! The device registry. Interprets the device listing and event
//! payloads through the key catalog and reduces them to typed
//! attribute changes.

use crate::{constant, payload::DeviceData};
use arlo_api::device::Value;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

mod debounce;
use debounce::Debounce;

/// The device classes the service can report. Everything else in the
/// listing (bridges, chimes we can't drive, ...) is skipped.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    BaseStation,
    Camera,
    Doorbell,
    Light,
}

impl Kind {
    pub fn from_device_type(s: &str) -> Option<Kind> {
        match s {
            "basestation" => Some(Kind::BaseStation),
            "camera" | "arloq" | "arloqs" => Some(Kind::Camera),
            "doorbell" => Some(Kind::Doorbell),
            "lights" => Some(Kind::Light),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::BaseStation => "base_station",
            Kind::Camera => "camera",
            Kind::Doorbell => "doorbell",
            Kind::Light => "light",
        }
    }
}

/// Extracts the device id from an event resource such as
/// `cameras/ABCD1234`. Collection-level resources (`modes`,
/// `devices`) have no id.

pub fn resource_device_id(resource: &str) -> Option<&str> {
    resource
        .split_once('/')
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty())
}

fn int_value(v: i64) -> Value {
    i32::try_from(v).map(Value::Int).unwrap_or(Value::Flt(v as f64))
}

/// One discovered device and its attribute table.

pub struct Device {
    pub device_id: String,
    pub name: String,
    pub kind: Kind,
    pub unique_id: Option<String>,
    pub parent_id: Option<String>,
    pub x_cloud_id: Option<String>,

    attrs: HashMap<&'static str, Value>,
    motion: Debounce,
    ding: Debounce,
    last_capture: Option<SystemTime>,
}

impl Device {
    fn new(data: DeviceData, kind: Kind) -> Self {
        let mut attrs = HashMap::new();

        if let Some(count) = data.media_object_count {
            attrs.insert(constant::MEDIA_COUNT_KEY, int_value(count));
        }

        match &data.presigned_last_image_url {
            Some(url) => {
                attrs.insert(
                    constant::LAST_IMAGE_KEY,
                    Value::Str(url.clone()),
                );
            }
            None if kind == Kind::Camera || kind == Kind::Doorbell => {
                // A camera that has never captured anything still
                // needs a thumbnail to show.

                attrs.insert(
                    constant::LAST_IMAGE_DATA_KEY,
                    Value::Str(String::from(constant::BLANK_IMAGE)),
                );
            }
            None => (),
        }

        Device {
            device_id: data.device_id,
            name: data.device_name,
            kind,
            unique_id: data.unique_id,
            parent_id: data.parent_id,
            x_cloud_id: data.x_cloud_id,
            attrs,
            motion: Debounce::new(),
            ding: Debounce::new(),
            last_capture: None,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Stores an attribute, reporting whether the stored value
    /// actually changed.

    pub fn set_attr(&mut self, key: &'static str, value: Value) -> bool {
        if self.attrs.get(key) == Some(&value) {
            false
        } else {
            self.attrs.insert(key, value);
            true
        }
    }

    /// Records a library capture for the recent-activity window.

    pub fn note_capture(&mut self, at: SystemTime) {
        if self.last_capture.map(|prev| at > prev).unwrap_or(true) {
            self.last_capture = Some(at)
        }
    }

    /// A device is "recently active" while its newest capture is
    /// younger than the configured window.

    pub fn recent_activity(&self, window: Duration, now: SystemTime) -> bool {
        self.last_capture
            .and_then(|at| now.duration_since(at).ok())
            .map(|age| age < window)
            .unwrap_or(false)
    }

    // Applies a property bag from a poll or the event stream. Only
    // cataloged keys enter the attribute table; detection pulses go
    // through their debounce first.

    fn apply_properties(
        &mut self,
        props: &serde_json::Value,
        motion_window: Duration,
        ding_window: Duration,
        now: SystemTime,
    ) -> Vec<(&'static str, Value)> {
        let mut changes = vec![];
        let props = match props.as_object() {
            Some(v) => v,
            None => return changes,
        };

        // Media-upload notifications ride the same property bags as
        // state updates, so both key groups are scanned.

        for key in
            constant::RESOURCE_KEYS.iter().chain(constant::MEDIA_UPLOAD_KEYS)
        {
            let key: &'static str = *key;
            let raw = match props.get(key) {
                Some(v) => v,
                None => continue,
            };

            match key {
                constant::MOTION_DETECTED_KEY => {
                    if let Some(change) = self.apply_pulse(
                        Pulse::Motion,
                        raw,
                        motion_window,
                        now,
                    ) {
                        changes.push((key, change))
                    }
                }

                constant::BUTTON_PRESSED_KEY => {
                    if let Some(change) =
                        self.apply_pulse(Pulse::Ding, raw, ding_window, now)
                    {
                        changes.push((key, change))
                    }
                }

                _ => match Value::from_json(raw) {
                    Some(value) => {
                        if self.set_attr(key, value.clone()) {
                            changes.push((key, value))
                        }
                    }
                    None => {
                        debug!("ignoring structured value for '{}'", key)
                    }
                },
            }
        }
        changes
    }

    fn apply_pulse(
        &mut self,
        which: Pulse,
        raw: &serde_json::Value,
        window: Duration,
        now: SystemTime,
    ) -> Option<Value> {
        let state = match which {
            Pulse::Motion => &mut self.motion,
            Pulse::Ding => &mut self.ding,
        };
        let key = which.key();

        match raw.as_bool() {
            // A trigger only reports on the idle-to-held edge.
            Some(true) => {
                if state.trigger(window, now) {
                    self.attrs.insert(key, Value::Bool(true));
                    return Some(Value::Bool(true));
                }
            }

            // A polled `false` while the hold window is open is the
            // service racing our debounce; the release comes from
            // expiry instead.
            Some(false) => {
                if !state.is_held()
                    && self.set_attr(key, Value::Bool(false))
                {
                    return Some(Value::Bool(false));
                }
            }

            None => warn!("'{}' was not a boolean", key),
        }
        None
    }

    // Lapses the debounce windows, reporting any releases.

    fn expire(&mut self, now: SystemTime) -> Vec<(&'static str, Value)> {
        let mut changes = vec![];

        if self.motion.expire(now) {
            self.attrs
                .insert(constant::MOTION_DETECTED_KEY, Value::Bool(false));
            changes.push((constant::MOTION_DETECTED_KEY, Value::Bool(false)))
        }

        if self.ding.expire(now) {
            self.attrs
                .insert(constant::BUTTON_PRESSED_KEY, Value::Bool(false));
            changes.push((constant::BUTTON_PRESSED_KEY, Value::Bool(false)))
        }
        changes
    }
}

#[derive(Clone, Copy)]
enum Pulse {
    Motion,
    Ding,
}

impl Pulse {
    fn key(&self) -> &'static str {
        match self {
            Pulse::Motion => constant::MOTION_DETECTED_KEY,
            Pulse::Ding => constant::BUTTON_PRESSED_KEY,
        }
    }
}

/// An attribute change, addressed by device.

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub device_id: String,
    pub key: &'static str,
    pub value: Value,
}

/// Every device the account knows about, keyed by device id.

pub struct Registry {
    motion_window: Duration,
    ding_window: Duration,
    devices: HashMap<String, Device>,
}

impl Registry {
    pub fn new(motion_window: Duration, ding_window: Duration) -> Self {
        Registry {
            motion_window,
            ding_window,
            devices: HashMap::new(),
        }
    }

    /// Folds a device listing in. Devices already known keep their
    /// attribute tables; the listing only refreshes their identity
    /// fields. Returns how many devices were newly added.

    pub fn update_from_listing(&mut self, listing: Vec<DeviceData>) -> usize {
        let mut added = 0;

        for data in listing {
            if let Some(state) = &data.state {
                if state != "provisioned" {
                    debug!(
                        "skipping {} in state '{}'",
                        &data.device_id, state
                    );
                    continue;
                }
            }

            let kind = match Kind::from_device_type(&data.device_type) {
                Some(kind) => kind,
                None => {
                    warn!(
                        "skipping unsupported device type '{}' ({})",
                        &data.device_type, &data.device_name
                    );
                    continue;
                }
            };

            if let Some(dev) = self.devices.get_mut(&data.device_id) {
                dev.name = data.device_name;
                dev.unique_id = data.unique_id;
                dev.parent_id = data.parent_id;
                dev.x_cloud_id = data.x_cloud_id;
            } else {
                added += 1;
                self.devices.insert(
                    data.device_id.clone(),
                    Device::new(data, kind),
                );
            }
        }
        added
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.get_mut(device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.values_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Applies an event-stream property bag to the device named by
    /// the resource. Events for devices we skipped at discovery are
    /// dropped.

    pub fn apply_event(
        &mut self,
        resource: &str,
        props: &serde_json::Value,
        now: SystemTime,
    ) -> Vec<Update> {
        let (motion, ding) = (self.motion_window, self.ding_window);

        if let Some(id) = resource_device_id(resource) {
            if let Some(dev) = self.devices.get_mut(id) {
                return dev
                    .apply_properties(props, motion, ding, now)
                    .into_iter()
                    .map(|(key, value)| Update {
                        device_id: String::from(id),
                        key,
                        value,
                    })
                    .collect();
            }
            debug!("event for unknown device {}", id);
        }
        vec![]
    }

    /// Lapses every debounce window. Driven from the client's fast
    /// tick.

    pub fn expire_all(&mut self, now: SystemTime) -> Vec<Update> {
        let mut updates = vec![];

        for dev in self.devices.values_mut() {
            for (key, value) in dev.expire(now) {
                updates.push(Update {
                    device_id: dev.device_id.clone(),
                    key,
                    value,
                })
            }
        }
        updates
    }

    /// Counts of the exposed device classes.

    pub fn totals(&self) -> (usize, usize, usize) {
        let mut cameras = 0;
        let mut bells = 0;
        let mut lights = 0;

        for dev in self.devices.values() {
            match dev.kind {
                Kind::Camera => cameras += 1,
                Kind::Doorbell => bells += 1,
                Kind::Light => lights += 1,
                Kind::BaseStation => (),
            }
        }
        (cameras, bells, lights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::UNIX_EPOCH;

    fn mk_time(secs: u64) -> SystemTime {
        UNIX_EPOCH.checked_add(Duration::from_secs(secs)).unwrap()
    }

    fn mk_listing() -> Vec<DeviceData> {
        serde_json::from_value(json!([
            {
                "deviceId": "BASE0001",
                "deviceName": "Home",
                "deviceType": "basestation",
                "uniqueId": "USER-BASE0001"
            },
            {
                "deviceId": "CAM00001",
                "deviceName": "Front Door",
                "deviceType": "camera",
                "parentId": "BASE0001",
                "mediaObjectCount": 3,
                "presignedLastImageUrl": "https://cdn.example.com/last.jpg"
            },
            {
                "deviceId": "CAM00002",
                "deviceName": "Garage",
                "deviceType": "camera",
                "parentId": "BASE0001"
            },
            {
                "deviceId": "BELL0001",
                "deviceName": "Porch",
                "deviceType": "doorbell",
                "parentId": "BASE0001"
            },
            {
                "deviceId": "GONE0001",
                "deviceName": "Old Camera",
                "deviceType": "camera",
                "state": "removed"
            },
            {
                "deviceId": "HUB00001",
                "deviceName": "Bridge",
                "deviceType": "arlobridge"
            }
        ]))
        .unwrap()
    }

    fn mk_registry() -> Registry {
        let mut reg =
            Registry::new(Duration::from_secs(30), Duration::from_secs(10));

        reg.update_from_listing(mk_listing());
        reg
    }

    #[test]
    fn test_listing() {
        let mut reg = mk_registry();

        // The removed camera and the unsupported bridge are skipped.

        assert_eq!(reg.len(), 4);
        assert_eq!(reg.totals(), (2, 1, 0));

        let cam = reg.get("CAM00001").unwrap();

        assert_eq!(cam.kind, Kind::Camera);
        assert_eq!(cam.parent_id.as_deref(), Some("BASE0001"));
        assert_eq!(cam.attr(constant::MEDIA_COUNT_KEY), Some(&Value::Int(3)));
        assert!(cam.attr(constant::LAST_IMAGE_DATA_KEY).is_none());

        // A camera with no media gets the placeholder thumbnail.

        assert_eq!(
            reg.get("CAM00002").unwrap().attr(constant::LAST_IMAGE_DATA_KEY),
            Some(&Value::Str(String::from(constant::BLANK_IMAGE)))
        );

        // Re-discovery refreshes names but keeps attribute state.

        reg.get_mut("CAM00001")
            .unwrap()
            .set_attr(constant::BATTERY_KEY, Value::Int(80));

        let added = reg.update_from_listing(
            serde_json::from_value(json!([{
                "deviceId": "CAM00001",
                "deviceName": "Front Porch",
                "deviceType": "camera"
            }]))
            .unwrap(),
        );

        assert_eq!(added, 0);

        let cam = reg.get("CAM00001").unwrap();

        assert_eq!(cam.name, "Front Porch");
        assert_eq!(cam.attr(constant::BATTERY_KEY), Some(&Value::Int(80)));
    }

    #[test]
    fn test_resource_routing() {
        assert_eq!(resource_device_id("cameras/CAM00001"), Some("CAM00001"));
        assert_eq!(resource_device_id("modes"), None);
        assert_eq!(resource_device_id("cameras/"), None);
    }

    #[test]
    fn test_event_updates() {
        let mut reg = mk_registry();

        let updates = reg.apply_event(
            "cameras/CAM00001",
            &json!({ "batteryLevel": 91, "signalStrength": 4 }),
            mk_time(0),
        );

        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.device_id == "CAM00001"));
        assert_eq!(
            reg.get("CAM00001").unwrap().attr(constant::BATTERY_KEY),
            Some(&Value::Int(91))
        );

        // Re-reporting the same value is not a change.

        let updates = reg.apply_event(
            "cameras/CAM00001",
            &json!({ "batteryLevel": 91 }),
            mk_time(1),
        );

        assert!(updates.is_empty());

        // Uncataloged and structured fields never land in the table.

        let updates = reg.apply_event(
            "cameras/CAM00001",
            &json!({ "blargh": 1, "activityZones": [1, 2] }),
            mk_time(2),
        );

        assert!(updates.is_empty());
        assert!(reg.get("CAM00001").unwrap().attr("blargh").is_none());

        // Events for devices we never registered are dropped.

        assert!(reg
            .apply_event(
                "cameras/NOPE",
                &json!({ "batteryLevel": 1 }),
                mk_time(3)
            )
            .is_empty());
    }

    #[test]
    fn test_motion_debounce() {
        let mut reg = mk_registry();
        let motion = json!({ "motionDetected": true });

        // First pulse reports; the repeat only re-arms.

        let updates =
            reg.apply_event("cameras/CAM00001", &motion, mk_time(0));

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].key, constant::MOTION_DETECTED_KEY);
        assert_eq!(updates[0].value, Value::Bool(true));

        assert!(reg
            .apply_event("cameras/CAM00001", &motion, mk_time(20))
            .is_empty());

        // A polled `false` inside the hold window is swallowed.

        assert!(reg
            .apply_event(
                "cameras/CAM00001",
                &json!({ "motionDetected": false }),
                mk_time(25)
            )
            .is_empty());

        // The re-armed window releases at t=50, not t=30.

        assert!(reg.expire_all(mk_time(45)).is_empty());

        let updates = reg.expire_all(mk_time(50));

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].device_id, "CAM00001");
        assert_eq!(updates[0].value, Value::Bool(false));
        assert_eq!(
            reg.get("CAM00001").unwrap().attr(constant::MOTION_DETECTED_KEY),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn test_ding_debounce() {
        let mut reg = mk_registry();

        let updates = reg.apply_event(
            "doorbells/BELL0001",
            &json!({ "buttonPressed": true }),
            mk_time(0),
        );

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].key, constant::BUTTON_PRESSED_KEY);

        // The ding window is shorter than the motion window.

        let updates = reg.expire_all(mk_time(10));

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].value, Value::Bool(false));
    }

    #[test]
    fn test_recent_activity() {
        let mut reg = mk_registry();
        let window = Duration::from_secs(600);

        let cam = reg.get_mut("CAM00001").unwrap();

        assert!(!cam.recent_activity(window, mk_time(1000)));

        cam.note_capture(mk_time(900));
        assert!(cam.recent_activity(window, mk_time(1000)));
        assert!(!cam.recent_activity(window, mk_time(1500)));

        // An older capture never replaces a newer one.

        cam.note_capture(mk_time(100));
        assert!(cam.recent_activity(window, mk_time(1000)));
    }
}
