//! The client proper. Owns the transport, the device registry, the
//! mode catalogs, and the media library; multiplexes the event
//! stream with the periodic work and reduces all of it to a single
//! sequence of attribute updates for the caller.

use crate::{
    backend::Backend,
    config::ClientOptions,
    constant, device, media, modes, payload, stream,
};
use arlo_api::{device::Value, Error, Result};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, Interval};
use tracing::{debug, info, warn};

// The routing fields every camera command carries.

fn action_body(dev: &device::Device) -> serde_json::Value {
    serde_json::json!({
        "deviceId": dev.device_id,
        "parentId": dev.parent_id.as_deref().unwrap_or(&dev.device_id),
        "xcloudId": dev.x_cloud_id,
    })
}

// Pulls the stream URL out of a start-stream reply. The service
// hands out an rtsps link; most players want the plain scheme.

fn stream_url(data: &serde_json::Value) -> Result<String> {
    data.get("url")
        .and_then(|v| v.as_str())
        .map(|url| url.replacen("rtsps://", "rtsp://", 1))
        .ok_or_else(|| {
            Error::ProtocolError(String::from("no stream url in reply"))
        })
}

async fn fetch_devices(backend: &Backend) -> Result<Vec<payload::DeviceData>> {
    let data = backend.get(constant::DEVICES_PATH).await?;

    serde_json::from_value(data).map_err(|e| {
        Error::ProtocolError(format!("bad device listing -- {}", e))
    })
}

// Builds the per-station mode catalogs. Definition and active-mode
// fetch failures degrade to the stock catalog rather than fail the
// whole connect.

async fn build_catalogs(
    backend: &Backend,
    registry: &device::Registry,
) -> HashMap<String, modes::ModeCatalog> {
    let stations: Vec<(String, Option<String>)> = registry
        .iter()
        .filter(|dev| dev.kind == device::Kind::BaseStation)
        .map(|dev| (dev.device_id.clone(), dev.unique_id.clone()))
        .collect();
    let mut catalogs = HashMap::new();

    if stations.is_empty() {
        return catalogs;
    }

    let defs = match modes::fetch_definitions(backend).await {
        Ok(defs) => defs,
        Err(e) => {
            warn!("couldn't fetch automation definitions -- {}", e);
            HashMap::new()
        }
    };

    for (station_id, unique_id) in &stations {
        let catalog = unique_id
            .as_ref()
            .and_then(|u| defs.get(u))
            .map(modes::ModeCatalog::from_definition)
            .unwrap_or_else(modes::ModeCatalog::stock);

        catalogs.insert(station_id.clone(), catalog);
    }

    match modes::fetch_active(backend).await {
        Ok(actives) => {
            for active in actives {
                let station = stations.iter().find(|(_, u)| {
                    u.as_deref() == Some(active.unique_id.as_str())
                });

                if let Some((station_id, _)) = station {
                    if let Some(catalog) = catalogs.get_mut(station_id) {
                        catalog.set_active(
                            active.active_modes.first().cloned(),
                            active.active_schedules.first().cloned(),
                        )
                    }
                }
            }
        }
        Err(e) => warn!("couldn't fetch active automations -- {}", e),
    }

    catalogs
}

// Waits on a timer that may not be configured. `None` parks forever,
// which lets `select!` treat a disabled feature as a branch that never
// fires.

async fn tick_opt(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

// What woke the client up.

enum Wake {
    Event(payload::StreamEvent),
    Fast,
    Slow,
    Rediscover,
    StreamFailed(String),
}

pub struct ArloClient {
    opts: ClientOptions,
    backend: Arc<Backend>,
    registry: device::Registry,
    library: media::Library,
    catalogs: HashMap<String, modes::ModeCatalog>,
    events: mpsc::Receiver<payload::StreamEvent>,
    stream_task: JoinHandle<Result<Infallible>>,
    stream_dead: bool,
    media_refresh_at: Option<Instant>,
    pending: VecDeque<device::Update>,
    fast: Interval,
    slow: Interval,
    rediscover: Option<Interval>,
}

impl ArloClient {
    /// Authenticates, discovers devices and modes, and starts the
    /// event stream. Connection problems (timeouts, HTTP errors,
    /// rejected credentials) surface here so the caller can report
    /// them and give up.

    pub async fn connect(opts: ClientOptions) -> Result<Self> {
        opts.validate()?;

        let backend = Arc::new(Backend::new(&opts)?);

        backend.login().await?;

        let mut registry =
            device::Registry::new(opts.motion_debounce, opts.ding_debounce);
        let added = registry.update_from_listing(fetch_devices(&backend).await?);

        let (cameras, bells, lights) = registry.totals();

        info!(
            "discovered {} devices ({} cameras, {} doorbells, {} lights)",
            added, cameras, bells, lights
        );

        let catalogs = build_catalogs(&backend, &registry).await;

        let (tx, rx) = mpsc::channel(100);
        let stream_task = stream::start(
            backend.clone(),
            stream::StreamConfig::from_options(&opts),
            tx,
        );

        let fast = interval_at(
            Instant::now()
                + Duration::from_secs(constant::INITIAL_REFRESH_DELAY),
            opts.scan_interval,
        );
        let slow = interval_at(
            Instant::now()
                + Duration::from_secs(constant::MEDIA_LIBRARY_DELAY),
            Duration::from_secs(constant::SLOW_REFRESH_INTERVAL),
        );
        let rediscover = if opts.refresh_devices_every > 0 {
            let period =
                Duration::from_secs(opts.refresh_devices_every * 3600);

            Some(interval_at(Instant::now() + period, period))
        } else {
            None
        };

        let mut client = ArloClient {
            opts,
            backend,
            registry,
            library: media::Library::default(),
            catalogs,
            events: rx,
            stream_task,
            stream_dead: false,
            media_refresh_at: None,
            pending: VecDeque::new(),
            fast,
            slow,
            rediscover,
        };

        client.apply_totals();
        client.apply_active_modes();
        Ok(client)
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_logged_in() && !self.stream_dead
    }

    pub fn devices(&self) -> impl Iterator<Item = &device::Device> {
        self.registry.iter()
    }

    pub fn totals(&self) -> (usize, usize, usize) {
        self.registry.totals()
    }

    /// The modes a base station understands, by name.

    pub fn mode_catalog(&self, station_id: &str) -> Option<&modes::ModeCatalog> {
        self.catalogs.get(station_id)
    }

    /// Yields the next attribute change. This is also where all the
    /// client's periodic work happens, so the caller should stay
    /// parked here whenever it has nothing else to do. Returns an
    /// error only when the session is beyond repair.

    pub async fn next_update(&mut self) -> Result<device::Update> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Ok(update);
            }

            match self.wait().await {
                Wake::Event(ev) => self.handle_event(ev),

                Wake::Fast => {
                    let now = SystemTime::now();
                    let updates = self.registry.expire_all(now);

                    self.pending.extend(updates);
                    self.refresh_recent(now);

                    if self
                        .media_refresh_at
                        .map(|at| Instant::now() >= at)
                        .unwrap_or(false)
                    {
                        self.media_refresh_at = None;

                        if let Err(e) = self.refresh_media().await {
                            warn!("media refresh failed -- {}", e)
                        }
                    }
                }

                Wake::Slow => {
                    if let Err(e) = self.refresh_modes().await {
                        warn!("mode refresh failed -- {}", e)
                    }

                    if let Err(e) = self.refresh_media().await {
                        warn!("media refresh failed -- {}", e)
                    }

                    if self.opts.no_media_upload {
                        self.refresh_snapshots().await
                    }
                }

                Wake::Rediscover => {
                    if let Err(e) = self.rediscover_devices().await {
                        warn!("device rediscovery failed -- {}", e)
                    }
                }

                Wake::StreamFailed(detail) => {
                    self.stream_dead = true;
                    return Err(Error::OperationError(format!(
                        "event stream failed -- {}",
                        detail
                    )));
                }
            }
        }
    }

    async fn wait(&mut self) -> Wake {
        let stream_alive = !self.stream_dead;
        let Self {
            events,
            fast,
            slow,
            rediscover,
            stream_task,
            ..
        } = self;

        tokio::select! {
            ev = events.recv() => match ev {
                Some(ev) => Wake::Event(ev),
                None => Wake::StreamFailed(String::from("channel closed")),
            },

            _ = fast.tick() => Wake::Fast,

            _ = slow.tick() => Wake::Slow,

            _ = tick_opt(rediscover.as_mut()) => Wake::Rediscover,

            res = stream_task, if stream_alive => {
                Wake::StreamFailed(match res {
                    Ok(Ok(_)) => unreachable!(),
                    Ok(Err(e)) => format!("{}", e),
                    Err(e) => format!("task died -- {}", e),
                })
            }
        }
    }

    // Routes one event-stream message. Mode changes go to the
    // catalog; everything else goes through the registry.

    fn handle_event(&mut self, ev: payload::StreamEvent) {
        let resource = match &ev.resource {
            Some(resource) => resource.clone(),
            None => return,
        };
        let props = ev.properties.unwrap_or(serde_json::Value::Null);

        if resource == "modes" {
            if let Some(station_id) = ev.from.as_deref() {
                self.handle_mode_event(station_id, &props)
            }
            return;
        }

        let updates =
            self.registry.apply_event(&resource, &props, SystemTime::now());

        if updates.iter().any(|u| {
            u.key == constant::MEDIA_COUNT_KEY
                || u.key == constant::LAST_IMAGE_KEY
        }) && self.media_refresh_at.is_none()
        {
            // The recording behind a media notification takes a while
            // to land in the library; refetch after the settle delay.

            self.media_refresh_at = Some(
                Instant::now()
                    + Duration::from_secs(constant::CAMERA_MEDIA_DELAY),
            )
        }

        self.pending.extend(updates);
    }

    fn handle_mode_event(
        &mut self,
        station_id: &str,
        props: &serde_json::Value,
    ) {
        let mode_id = match props.get("active").and_then(|v| v.as_str()) {
            Some(id) => String::from(id),
            None => return,
        };
        let catalog = self
            .catalogs
            .entry(String::from(station_id))
            .or_insert_with(modes::ModeCatalog::stock);

        if catalog.is_schedule(&mode_id) {
            catalog.set_active(None, Some(mode_id.clone()));
            self.pending.push_back(device::Update {
                device_id: String::from(station_id),
                key: constant::SCHEDULE_KEY,
                value: Value::Str(mode_id),
            })
        } else {
            let name = catalog
                .mode_name(&mode_id)
                .map(String::from)
                .unwrap_or_else(|| mode_id.clone());

            catalog.set_active(Some(mode_id), None);
            self.pending.push_back(device::Update {
                device_id: String::from(station_id),
                key: constant::MODE_KEY,
                value: Value::Str(name),
            })
        }
    }

    // Seeds the per-station roll-up counts.

    fn apply_totals(&mut self) {
        let (cameras, bells, lights) = self.registry.totals();
        let stations: Vec<String> = self
            .registry
            .iter()
            .filter(|dev| dev.kind == device::Kind::BaseStation)
            .map(|dev| dev.device_id.clone())
            .collect();

        for station_id in stations {
            if let Some(dev) = self.registry.get_mut(&station_id) {
                for (key, count) in [
                    (constant::TOTAL_CAMERAS_KEY, cameras),
                    (constant::TOTAL_BELLS_KEY, bells),
                    (constant::TOTAL_LIGHTS_KEY, lights),
                ] {
                    if dev.set_attr(key, Value::Int(count as i32)) {
                        self.pending.push_back(device::Update {
                            device_id: station_id.clone(),
                            key,
                            value: Value::Int(count as i32),
                        })
                    }
                }
            }
        }
    }

    // Reports the initially active mode of every station.

    fn apply_active_modes(&mut self) {
        let actives: Vec<(String, String)> = self
            .catalogs
            .iter()
            .filter_map(|(station_id, catalog)| {
                catalog.active_mode().map(|id| {
                    (
                        station_id.clone(),
                        catalog
                            .mode_name(id)
                            .unwrap_or(id)
                            .to_string(),
                    )
                })
            })
            .collect();

        for (station_id, name) in actives {
            self.pending.push_back(device::Update {
                device_id: station_id,
                key: constant::MODE_KEY,
                value: Value::Str(name),
            })
        }
    }

    async fn refresh_modes(&mut self) -> Result<()> {
        let actives = modes::fetch_active(&self.backend).await?;
        let stations: Vec<(String, Option<String>)> = self
            .registry
            .iter()
            .filter(|dev| dev.kind == device::Kind::BaseStation)
            .map(|dev| (dev.device_id.clone(), dev.unique_id.clone()))
            .collect();

        for active in actives {
            let station = stations.iter().find(|(_, u)| {
                u.as_deref() == Some(active.unique_id.as_str())
            });
            let station_id = match station {
                Some((id, _)) => id.clone(),
                None => continue,
            };
            let mode_id = active.active_modes.first().cloned();
            let changed = {
                let catalog = self
                    .catalogs
                    .entry(station_id.clone())
                    .or_insert_with(modes::ModeCatalog::stock);
                let changed =
                    catalog.active_mode() != mode_id.as_deref();

                catalog.set_active(
                    mode_id.clone(),
                    active.active_schedules.first().cloned(),
                );
                changed
            };

            if changed {
                if let Some(mode_id) = mode_id {
                    self.handle_mode_report(&station_id, &mode_id)
                }
            }
        }
        Ok(())
    }

    fn handle_mode_report(&mut self, station_id: &str, mode_id: &str) {
        let name = self
            .catalogs
            .get(station_id)
            .and_then(|c| c.mode_name(mode_id))
            .unwrap_or(mode_id)
            .to_string();

        self.pending.push_back(device::Update {
            device_id: String::from(station_id),
            key: constant::MODE_KEY,
            value: Value::Str(name),
        })
    }

    // Re-primes the library and updates the per-camera capture
    // attributes. Skipped entirely when the account blocks media
    // uploads.

    async fn refresh_media(&mut self) -> Result<()> {
        if self.opts.no_media_upload {
            return Ok(());
        }

        let recordings =
            media::fetch(&self.backend, constant::PRELOAD_DAYS).await?;

        if self.opts.cache_videos {
            let dir = self.opts.storage_dir.join("videos");

            media::cache_to(&self.backend, &dir, &recordings).await?;
        }

        self.library = media::Library::new(recordings);

        let mut updates = vec![];

        for dev in self.registry.iter_mut() {
            if dev.kind != device::Kind::Camera
                && dev.kind != device::Kind::Doorbell
            {
                continue;
            }

            let captured = self.library.captured_today(&dev.device_id);

            if dev.set_attr(
                constant::CAPTURED_TODAY_KEY,
                Value::Int(captured as i32),
            ) {
                updates.push(device::Update {
                    device_id: dev.device_id.clone(),
                    key: constant::CAPTURED_TODAY_KEY,
                    value: Value::Int(captured as i32),
                })
            }

            if let Some(at) = self.library.last_capture(&dev.device_id) {
                dev.note_capture(at)
            }

            if let Some(display) = self
                .library
                .last_capture_display(&dev.device_id, &self.opts.last_format)
            {
                if dev.set_attr(
                    constant::LAST_CAPTURE_KEY,
                    Value::Str(display.clone()),
                ) {
                    updates.push(device::Update {
                        device_id: dev.device_id.clone(),
                        key: constant::LAST_CAPTURE_KEY,
                        value: Value::Str(display),
                    })
                }
            }
        }

        self.pending.extend(updates);
        Ok(())
    }

    // Recomputes the recent-activity flags. A capture marks its
    // camera active until the configured window ages out, so this
    // runs on every fast tick, not just when media arrives.

    fn refresh_recent(&mut self, now: SystemTime) {
        let window = self.opts.recent_window;
        let mut updates = vec![];

        for dev in self.registry.iter_mut() {
            if dev.kind != device::Kind::Camera
                && dev.kind != device::Kind::Doorbell
            {
                continue;
            }

            let recent = dev.recent_activity(window, now);

            if dev
                .set_attr(constant::RECENT_ACTIVITY_KEY, Value::Bool(recent))
            {
                updates.push(device::Update {
                    device_id: dev.device_id.clone(),
                    key: constant::RECENT_ACTIVITY_KEY,
                    value: Value::Bool(recent),
                })
            }
        }

        self.pending.extend(updates);
    }

    // With media uploads blocked, thumbnails only move when we ask
    // each camera for a fresh snapshot.

    async fn refresh_snapshots(&mut self) {
        let cameras: Vec<serde_json::Value> = self
            .registry
            .iter()
            .filter(|dev| dev.kind == device::Kind::Camera)
            .map(action_body)
            .collect();

        for body in cameras {
            if let Err(e) = self
                .backend
                .post(constant::IDLE_SNAPSHOT_PATH, &body)
                .await
            {
                warn!("snapshot request failed -- {}", e)
            }
        }
    }

    async fn rediscover_devices(&mut self) -> Result<()> {
        let added = self
            .registry
            .update_from_listing(fetch_devices(&self.backend).await?);

        if added > 0 {
            info!("rediscovery added {} devices", added)
        }

        self.catalogs =
            build_catalogs(&self.backend, &self.registry).await;
        self.apply_totals();
        Ok(())
    }

    /// Switches a base station to the named mode (or mode id).

    pub async fn set_mode(
        &mut self,
        station_id: &str,
        mode: &str,
    ) -> Result<()> {
        let station = self
            .registry
            .get(station_id)
            .ok_or(Error::NotFound)?;

        if station.kind != device::Kind::BaseStation {
            return Err(Error::InvArgument(format!(
                "{} is not a base station",
                station_id
            )));
        }

        let unique_id = station.unique_id.clone();
        let x_cloud_id = station.x_cloud_id.clone();
        let catalog = self
            .catalogs
            .entry(String::from(station_id))
            .or_insert_with(modes::ModeCatalog::stock);
        let mode_id = catalog
            .mode_id(mode)
            .map(String::from)
            .ok_or_else(|| {
                Error::InvArgument(format!("unknown mode '{}'", mode))
            })?;
        let api =
            modes::select_api(self.opts.mode_api, unique_id.as_deref());

        modes::set_active_mode(
            &self.backend,
            api,
            station_id,
            unique_id.as_deref(),
            x_cloud_id.as_deref(),
            &mode_id,
        )
        .await?;

        if let Some(catalog) = self.catalogs.get_mut(station_id) {
            catalog.set_active(Some(mode_id.clone()), None)
        }
        self.handle_mode_report(station_id, &mode_id);
        Ok(())
    }

    /// Asks a camera for a fresh snapshot. An idle camera takes a
    /// full-frame capture; one that's already streaming grabs a frame
    /// from the stream. The new thumbnail arrives later, over the
    /// event stream.

    pub async fn request_snapshot(&mut self, device_id: &str) -> Result<()> {
        let camera = self.camera(device_id)?;
        let streaming = matches!(
            camera.attr(constant::ACTIVITY_STATE_KEY),
            Some(Value::Str(state))
                if state == "userStreamActive"
                    || state == "alertStreamActive"
                    || state == "recording"
        );
        let path = if streaming {
            constant::STREAM_SNAPSHOT_PATH
        } else {
            constant::IDLE_SNAPSHOT_PATH
        };
        let body = action_body(camera);

        self.backend.post(path, &body).await.map(|_| ())
    }

    pub async fn start_recording(&mut self, device_id: &str) -> Result<()> {
        let body = self.camera_body(device_id)?;

        self.backend
            .post(constant::RECORD_START_PATH, &body)
            .await
            .map(|_| ())
    }

    pub async fn stop_recording(&mut self, device_id: &str) -> Result<()> {
        let body = self.camera_body(device_id)?;

        self.backend
            .post(constant::RECORD_STOP_PATH, &body)
            .await
            .map(|_| ())
    }

    /// Starts a user stream and returns its URL. The stream itself
    /// is the caller's problem.

    pub async fn start_stream(&mut self, device_id: &str) -> Result<String> {
        let camera = self.camera(device_id)?;
        let parent = camera
            .parent_id
            .clone()
            .unwrap_or_else(|| camera.device_id.clone());
        let body = serde_json::json!({
            "to": parent,
            "from": format!("{}_web", self.backend.user_id()?),
            "resource": format!("cameras/{}", device_id),
            "action": "set",
            "publishResponse": true,
            "transId": self.backend.next_trans_id(),
            "properties": {
                "activityState": "startUserStream",
                "cameraId": device_id,
            },
        });
        let data = self
            .backend
            .post(constant::STREAM_START_PATH, &body)
            .await?;

        stream_url(&data)
    }

    fn camera(&self, device_id: &str) -> Result<&device::Device> {
        let dev = self.registry.get(device_id).ok_or(Error::NotFound)?;

        if dev.kind == device::Kind::Camera
            || dev.kind == device::Kind::Doorbell
        {
            Ok(dev)
        } else {
            Err(Error::InvArgument(format!(
                "{} is not a camera",
                device_id
            )))
        }
    }

    fn camera_body(&self, device_id: &str) -> Result<serde_json::Value> {
        self.camera(device_id).map(action_body)
    }

    /// Ends the session: stops the event stream and logs out.

    pub async fn disconnect(&mut self) {
        self.stream_task.abort();
        self.stream_dead = true;
        self.backend.unsubscribe().await;
        self.backend.logout().await;
        debug!("disconnected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::Duration;

    fn mk_registry() -> device::Registry {
        let mut reg = device::Registry::new(
            Duration::from_secs(30),
            Duration::from_secs(10),
        );

        reg.update_from_listing(
            serde_json::from_value(json!([
                {
                    "deviceId": "BASE0001",
                    "deviceName": "Home",
                    "deviceType": "basestation",
                    "uniqueId": "USER-BASE0001",
                    "xCloudId": "XC-1"
                },
                {
                    "deviceId": "CAM00001",
                    "deviceName": "Front Door",
                    "deviceType": "camera",
                    "parentId": "BASE0001",
                    "xCloudId": "XC-1"
                }
            ]))
            .unwrap(),
        );
        reg
    }

    #[test]
    fn test_action_body() {
        let reg = mk_registry();
        let body = action_body(reg.get("CAM00001").unwrap());

        assert_eq!(body["deviceId"], "CAM00001");
        assert_eq!(body["parentId"], "BASE0001");
        assert_eq!(body["xcloudId"], "XC-1");

        // A base station is its own parent.

        let body = action_body(reg.get("BASE0001").unwrap());

        assert_eq!(body["parentId"], "BASE0001");
    }

    #[test]
    fn test_stream_url() {
        let url = stream_url(&json!({
            "url": "rtsps://stream.example.com/cam?egressToken=abc"
        }))
        .unwrap();

        assert_eq!(url, "rtsp://stream.example.com/cam?egressToken=abc");

        // An already-plain scheme passes through.

        assert_eq!(
            stream_url(&json!({ "url": "rtsp://h/c" })).unwrap(),
            "rtsp://h/c"
        );

        assert!(stream_url(&json!({})).is_err());
    }
}
