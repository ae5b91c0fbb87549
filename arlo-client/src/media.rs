//! The recording library. Primes a window of recent recordings from
//! the cloud, answers per-camera capture questions, and optionally
//! mirrors new recordings into the storage directory.

use crate::{backend::Backend, constant, payload};
use arlo_api::{Error, Result};
use chrono::{Days, Local, NaiveDate};
use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

// Renders the inclusive date range the library endpoint expects.

fn date_range(today: NaiveDate, days: u64) -> (String, String) {
    let from = today.checked_sub_days(Days::new(days)).unwrap_or(today);

    (
        from.format("%Y%m%d").to_string(),
        today.format("%Y%m%d").to_string(),
    )
}

/// Fetches the recording library for the last `days` days, newest
/// first.

pub async fn fetch(
    backend: &Backend,
    days: u64,
) -> Result<Vec<payload::Recording>> {
    let (date_from, date_to) = date_range(Local::now().date_naive(), days);
    let body = serde_json::json!({
        "dateFrom": date_from,
        "dateTo": date_to,
    });
    let data = backend.post(constant::LIBRARY_PATH, &body).await?;
    let mut recordings: Vec<payload::Recording> =
        serde_json::from_value(data).map_err(|e| {
            Error::ProtocolError(format!("bad library reply -- {}", e))
        })?;

    recordings.sort_by_key(|rec| std::cmp::Reverse(rec.local_created_date));

    debug!("library holds {} recordings", recordings.len());
    Ok(recordings)
}

/// The primed library, with per-camera accessors.

#[derive(Default)]
pub struct Library {
    recordings: Vec<payload::Recording>,
}

impl Library {
    pub fn new(mut recordings: Vec<payload::Recording>) -> Self {
        recordings
            .sort_by_key(|rec| std::cmp::Reverse(rec.local_created_date));
        Library { recordings }
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &payload::Recording> {
        self.recordings.iter()
    }

    /// How many recordings a camera captured on the given day
    /// (`YYYYMMDD`, camera-local).

    pub fn captured_on(&self, device_id: &str, date: &str) -> usize {
        self.recordings
            .iter()
            .filter(|rec| {
                rec.device_id == device_id && rec.created_date == date
            })
            .count()
    }

    pub fn captured_today(&self, device_id: &str) -> usize {
        let today = Local::now().format("%Y%m%d").to_string();

        self.captured_on(device_id, &today)
    }

    /// The instant of a camera's newest recording.

    pub fn last_capture(&self, device_id: &str) -> Option<SystemTime> {
        self.recordings
            .iter()
            .filter(|rec| rec.device_id == device_id)
            .map(|rec| rec.local_created_date)
            .max()
            .and_then(|ms| u64::try_from(ms).ok())
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms))
    }

    /// The newest capture rendered with the user's display format.
    /// A format string the formatter can't render yields `None`
    /// rather than an error.

    pub fn last_capture_display(
        &self,
        device_id: &str,
        format: &str,
    ) -> Option<String> {
        use chrono::TimeZone;

        let ms = self
            .recordings
            .iter()
            .filter(|rec| rec.device_id == device_id)
            .map(|rec| rec.local_created_date)
            .max()?;
        let when = Local.timestamp_millis_opt(ms).single()?;
        let mut out = String::new();

        if write!(out, "{}", when.format(format)).is_ok() {
            Some(out)
        } else {
            warn!("can't render timestamp with format '{}'", format);
            None
        }
    }
}

// The name a recording caches under. The capture instant keeps names
// unique per camera; the extension follows the content type.

fn cache_name(rec: &payload::Recording) -> String {
    let ext = match rec.content_type.as_deref() {
        Some("video/mp4") => "mp4",
        Some("image/jpg") | Some("image/jpeg") => "jpg",
        _ => "bin",
    };

    format!("{}_{}.{}", rec.device_id, rec.local_created_date, ext)
}

/// Mirrors recordings into `dir`, skipping anything already present.
/// Returns how many files were written.

pub async fn cache_to(
    backend: &Backend,
    dir: &Path,
    recordings: &[payload::Recording],
) -> Result<usize> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        Error::OperationError(format!(
            "can't create video cache {} -- {}",
            dir.display(),
            e
        ))
    })?;

    let mut written = 0;

    for rec in recordings {
        let url = match rec.presigned_content_url.as_deref() {
            Some(url) => url,
            None => continue,
        };
        let target = dir.join(cache_name(rec));

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            continue;
        }

        match backend.download(url).await {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&target, bytes).await {
                    warn!("can't cache {} -- {}", target.display(), e)
                } else {
                    written += 1
                }
            }
            Err(e) => warn!("can't download {} -- {}", url, e),
        }
    }

    debug!("cached {} new recordings", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mk_library() -> Library {
        Library::new(
            serde_json::from_value(json!([
                {
                    "deviceId": "CAM00001",
                    "createdDate": "20190416",
                    "localCreatedDate": 1555447293000i64,
                    "contentType": "video/mp4",
                    "presignedContentUrl": "https://cdn.example.com/a.mp4"
                },
                {
                    "deviceId": "CAM00001",
                    "createdDate": "20190416",
                    "localCreatedDate": 1555450000000i64,
                    "contentType": "video/mp4"
                },
                {
                    "deviceId": "CAM00002",
                    "createdDate": "20190415",
                    "localCreatedDate": 1555360000000i64,
                    "contentType": "image/jpg"
                }
            ]))
            .unwrap(),
        )
    }

    #[test]
    fn test_date_range() {
        let today = NaiveDate::from_ymd_opt(2019, 4, 16).unwrap();

        assert_eq!(
            date_range(today, 30),
            (String::from("20190317"), String::from("20190416"))
        );

        // The range crosses year boundaries without help.

        let today = NaiveDate::from_ymd_opt(2019, 1, 5).unwrap();

        assert_eq!(date_range(today, 30).0, "20181206");

        // A zero-day window is just today.

        assert_eq!(date_range(today, 0).0, "20190105");
    }

    #[test]
    fn test_captured_counts() {
        let lib = mk_library();

        assert_eq!(lib.len(), 3);
        assert_eq!(lib.captured_on("CAM00001", "20190416"), 2);
        assert_eq!(lib.captured_on("CAM00002", "20190416"), 0);
        assert_eq!(lib.captured_on("CAM00002", "20190415"), 1);
        assert_eq!(lib.captured_on("NOPE", "20190416"), 0);
    }

    #[test]
    fn test_last_capture() {
        let lib = mk_library();

        assert_eq!(
            lib.last_capture("CAM00001"),
            Some(UNIX_EPOCH + Duration::from_millis(1555450000000))
        );
        assert_eq!(lib.last_capture("NOPE"), None);

        // Newest first, across cameras.

        assert_eq!(lib.iter().next().unwrap().local_created_date, 1555450000000);
    }

    #[test]
    fn test_last_capture_display() {
        let lib = mk_library();

        // April 2019 renders the same year in any timezone.

        assert_eq!(
            lib.last_capture_display("CAM00001", "%Y").as_deref(),
            Some("2019")
        );
        assert_eq!(lib.last_capture_display("NOPE", "%Y"), None);
    }

    #[test]
    fn test_cache_name() {
        let lib = mk_library();
        let names: Vec<String> = lib.iter().map(cache_name).collect();

        assert_eq!(names[0], "CAM00001_1555450000000.mp4");
        assert_eq!(names[2], "CAM00002_1555360000000.jpg");

        // Names stay unique even for same-day captures.

        assert_ne!(names[0], names[1]);
    }
}
