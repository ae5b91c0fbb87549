//! The catalog of cloud API paths and JSON field names used to
//! interpret payloads from the service. Everything the transport,
//! device registry, and media library know about the wire format is
//! collected here.

pub const DEFAULT_HOST: &str = "https://my.arlo.com";

pub const DEVICES_PATH: &str = "/hmsweb/users/devices";
pub const DEFINITIONS_PATH: &str = "/hmsweb/users/automation/definitions";
pub const AUTOMATION_PATH: &str = "/hmsweb/users/devices/automation/active";
pub const LIBRARY_PATH: &str = "/hmsweb/users/library";
pub const LOGIN_PATH: &str = "/hmsweb/login/v2";
pub const LOGOUT_PATH: &str = "/hmsweb/logout";
pub const NOTIFY_PATH: &str = "/hmsweb/users/devices/notify/";
pub const SUBSCRIBE_PATH: &str = "/hmsweb/client/subscribe?token=";
pub const UNSUBSCRIBE_PATH: &str = "/hmsweb/client/unsubscribe";
pub const RECORD_START_PATH: &str = "/hmsweb/users/devices/startRecord";
pub const RECORD_STOP_PATH: &str = "/hmsweb/users/devices/stopRecord";
pub const STREAM_SNAPSHOT_PATH: &str = "/hmsweb/users/devices/takeSnapshot";
pub const STREAM_START_PATH: &str = "/hmsweb/users/devices/startStream";
pub const IDLE_SNAPSHOT_PATH: &str =
    "/hmsweb/users/devices/fullFrameSnapshot";
pub const TRANSID_PREFIX: &str = "web";

/// How far back, in days, the media library is primed on startup.
pub const PRELOAD_DAYS: u64 = 30;

// Start up delays, in seconds.

pub const REFRESH_CAMERA_DELAY: u64 = 5;
pub const INITIAL_REFRESH_DELAY: u64 = REFRESH_CAMERA_DELAY + 3;
pub const MEDIA_LIBRARY_DELAY: u64 = 15;
pub const CAMERA_MEDIA_DELAY: u64 = MEDIA_LIBRARY_DELAY + 10;

// Update intervals, in seconds.

pub const FAST_REFRESH_INTERVAL: u64 = 60;
pub const SLOW_REFRESH_INTERVAL: u64 = 10 * 60;
pub const EVENT_STREAM_TIMEOUT: u64 = (FAST_REFRESH_INTERVAL * 2) + 5;

// Identity personas offered to the service. The cloud endpoint tailors
// stream formats to the reported platform.

pub const APPLE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 11_1_2 \
     like Mac OS X) AppleWebKit/604.3.5 (KHTML, like Gecko) Mobile/15B202 \
     NETGEAR/v1 (iOS Vuezone)";
pub const LINUX_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/72.0.3626.81 Safari/537.36";

// Update keys.

pub const ACTIVITY_STATE_KEY: &str = "activityState";
pub const AIR_QUALITY_KEY: &str = "airQuality";
pub const AUDIO_DETECTED_KEY: &str = "audioDetected";
pub const BATTERY_KEY: &str = "batteryLevel";
pub const BATTERY_TECH_KEY: &str = "batteryTech";
pub const BRIGHTNESS_KEY: &str = "brightness";
pub const BUTTON_PRESSED_KEY: &str = "buttonPressed";
pub const CHARGER_KEY: &str = "chargerTech";
pub const CHARGING_KEY: &str = "chargingState";
pub const CONNECTION_KEY: &str = "connectionState";
pub const FLIP_KEY: &str = "flip";
pub const HUMIDITY_KEY: &str = "humidity";
pub const LAMP_STATE_KEY: &str = "lampState";
pub const MIRROR_KEY: &str = "mirror";
pub const MOTION_DETECTED_KEY: &str = "motionDetected";
pub const MOTION_ENABLED_KEY: &str = "motionSetupModeEnabled";
pub const MOTION_SENS_KEY: &str = "motionSetupModeSensitivity";
pub const POWER_SAVE_KEY: &str = "powerSaveMode";
pub const PRIVACY_KEY: &str = "privacyActive";
pub const SIGNAL_STR_KEY: &str = "signalStrength";
pub const SIREN_STATE_KEY: &str = "sirenState";
pub const TEMPERATURE_KEY: &str = "temperature";

// We can get these from the resource; doorbell is a subset.

pub const RESOURCE_KEYS: &[&str] = &[
    ACTIVITY_STATE_KEY,
    AIR_QUALITY_KEY,
    AUDIO_DETECTED_KEY,
    BATTERY_KEY,
    BATTERY_TECH_KEY,
    BRIGHTNESS_KEY,
    BUTTON_PRESSED_KEY,
    CONNECTION_KEY,
    CHARGER_KEY,
    CHARGING_KEY,
    FLIP_KEY,
    HUMIDITY_KEY,
    LAMP_STATE_KEY,
    MIRROR_KEY,
    MOTION_DETECTED_KEY,
    MOTION_ENABLED_KEY,
    MOTION_SENS_KEY,
    POWER_SAVE_KEY,
    PRIVACY_KEY,
    SIGNAL_STR_KEY,
    SIREN_STATE_KEY,
    TEMPERATURE_KEY,
];

pub const RESOURCE_UPDATE_KEYS: &[&str] = &[
    ACTIVITY_STATE_KEY,
    AIR_QUALITY_KEY,
    AUDIO_DETECTED_KEY,
    BATTERY_KEY,
    BATTERY_TECH_KEY,
    BUTTON_PRESSED_KEY,
    CHARGER_KEY,
    CHARGING_KEY,
    CONNECTION_KEY,
    LAMP_STATE_KEY,
    HUMIDITY_KEY,
    MOTION_DETECTED_KEY,
    PRIVACY_KEY,
    SIGNAL_STR_KEY,
    SIREN_STATE_KEY,
    TEMPERATURE_KEY,
];

// Device keys.

pub const DEVICE_ID_KEY: &str = "deviceId";
pub const DEVICE_NAME_KEY: &str = "deviceName";
pub const DEVICE_TYPE_KEY: &str = "deviceType";
pub const MEDIA_COUNT_KEY: &str = "mediaObjectCount";
pub const PARENT_ID_KEY: &str = "parentId";
pub const UNIQUE_ID_KEY: &str = "uniqueId";
pub const USER_ID_KEY: &str = "userId";
pub const LAST_IMAGE_KEY: &str = "presignedLastImageUrl";
pub const SNAPSHOT_KEY: &str = "presignedFullFrameSnapshotUrl";
pub const STREAM_SNAPSHOT_KEY: &str = "presignedContentUrl";
pub const XCLOUD_ID_KEY: &str = "xCloudId";

pub const DEVICE_KEYS: &[&str] = &[
    DEVICE_ID_KEY,
    DEVICE_NAME_KEY,
    DEVICE_TYPE_KEY,
    MEDIA_COUNT_KEY,
    PARENT_ID_KEY,
    UNIQUE_ID_KEY,
    USER_ID_KEY,
    LAST_IMAGE_KEY,
    SNAPSHOT_KEY,
    XCLOUD_ID_KEY,
];

pub const MEDIA_UPLOAD_KEYS: &[&str] = &[MEDIA_COUNT_KEY, LAST_IMAGE_KEY];

// Synthesized keys. These never arrive on the wire; the client
// computes them from the media library and mode catalog.

pub const CAPTURED_TODAY_KEY: &str = "capturedToday";
pub const LAST_CAPTURE_KEY: &str = "lastCapture";
pub const RECENT_ACTIVITY_KEY: &str = "recentActivity";
pub const MODE_KEY: &str = "activeMode";
pub const MODES_KEY: &str = "configuredMode";
pub const LAST_IMAGE_DATA_KEY: &str = "presignedLastImageData";
pub const LAST_IMAGE_SRC_KEY: &str = "lastImageSource";
pub const MODE_NAME_TO_ID_KEY: &str = "modeNameToId";
pub const MODE_ID_TO_NAME_KEY: &str = "modeIdToName";
pub const MODE_IS_SCHEDULE_KEY: &str = "modeIsSchedule";
pub const SCHEDULE_KEY: &str = "activeSchedule";
pub const TOTAL_BELLS_KEY: &str = "totalDoorBells";
pub const TOTAL_CAMERAS_KEY: &str = "totalCameras";
pub const TOTAL_LIGHTS_KEY: &str = "totalLights";

/// Placeholder thumbnail (a 160x90 PNG) used for cameras that have
/// never captured media.
pub const BLANK_IMAGE: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAKAAAABaCAQAAACVz5XZAAAAh0lEQVR42u3QMQ0AAAgDMOZf9BDB\
     RdJKaNrhIAIFChQoEIECBQpEoECBAhEoUKBABAoUKBCBAgUKRKBAgQIRKFCgQAQKFCgQgQIFCkSg\
     QIECBSJQoECBCBQoUCACBQoUiECBAgUiUKBAgQgUKFAgAgUKFIhAgQIFIlCgQIEIFChQoECBAgV+\
     tivOs6f/QsrFAAAAAElFTkSuQmCC";

/// Mode ids every base station understands even before its automation
/// definitions have been fetched.
pub const DEFAULT_MODES: &[(&str, &str)] =
    &[("disarmed", "mode0"), ("armed", "mode1")];

/// Resource types re-polled during a full refresh.
pub const DEFAULT_RESOURCES: &[&str] =
    &["modes", "siren", "doorbells", "lights", "cameras"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_groups() {
        // Everything that can arrive on the event stream must also be
        // a key we accept from a full resource poll.

        for key in RESOURCE_UPDATE_KEYS {
            assert!(
                RESOURCE_KEYS.contains(key),
                "{} missing from RESOURCE_KEYS",
                key
            )
        }

        assert!(DEVICE_KEYS.contains(&DEVICE_ID_KEY));
        assert!(DEVICE_KEYS.contains(&UNIQUE_ID_KEY));

        for key in MEDIA_UPLOAD_KEYS {
            assert!(
                DEVICE_KEYS.contains(key),
                "{} missing from DEVICE_KEYS",
                key
            )
        }
    }
}
