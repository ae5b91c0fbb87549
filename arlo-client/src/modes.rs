//! The mode catalog and the two protocols for switching a base
//! station's active mode. Older stations are driven through the
//! notify protocol (v1); newer ones through the automation endpoints
//! (v2).

use crate::{backend::Backend, config::ModeApi, constant, payload};
use arlo_api::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// The modes and schedules one base station understands, with
/// name/id lookup in both directions.

#[derive(Debug, Clone, Default)]
pub struct ModeCatalog {
    name_to_id: HashMap<String, String>,
    id_to_name: HashMap<String, String>,
    schedules: HashMap<String, String>,
    active_mode: Option<String>,
    active_schedule: Option<String>,
}

impl ModeCatalog {
    /// The catalog every station understands before (or without) its
    /// automation definitions: `disarmed` and `armed`.

    pub fn stock() -> Self {
        let mut catalog = ModeCatalog::default();

        for &(name, id) in constant::DEFAULT_MODES {
            catalog.insert_mode(name, id)
        }
        catalog
    }

    /// Builds a catalog from fetched automation definitions, then
    /// backfills the stock modes so `disarmed`/`armed` always
    /// resolve.

    pub fn from_definition(def: &payload::AutomationDefinition) -> Self {
        let mut catalog = ModeCatalog::default();

        for mode in &def.modes {
            // User-defined modes carry a name; the built-in ones only
            // a type.

            let name = mode
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .or(mode.mode_type.as_deref())
                .unwrap_or(&mode.id);

            catalog.insert_mode(name, &mode.id)
        }

        for &(name, id) in constant::DEFAULT_MODES {
            if !catalog.id_to_name.contains_key(id) {
                catalog.insert_mode(name, id)
            }
        }

        for schedule in &def.schedules {
            catalog.schedules.insert(
                schedule.id.clone(),
                schedule
                    .name
                    .clone()
                    .unwrap_or_else(|| schedule.id.clone()),
            );
        }
        catalog
    }

    fn insert_mode(&mut self, name: &str, id: &str) {
        self.name_to_id
            .insert(name.to_lowercase(), String::from(id));
        self.id_to_name
            .insert(String::from(id), String::from(name));
    }

    /// Resolves a user-supplied mode, by name (case-insensitive) or
    /// directly by id.

    pub fn mode_id(&self, name: &str) -> Option<&str> {
        self.name_to_id
            .get(&name.to_lowercase())
            .map(String::as_str)
            .or_else(|| {
                self.id_to_name
                    .get_key_value(name)
                    .map(|(id, _)| id.as_str())
            })
    }

    pub fn mode_name(&self, id: &str) -> Option<&str> {
        self.id_to_name.get(id).map(String::as_str)
    }

    pub fn is_schedule(&self, id: &str) -> bool {
        self.schedules.contains_key(id)
    }

    /// Records the station's currently active mode and schedule, as
    /// reported by the active-automation listing or a mode event.

    pub fn set_active(
        &mut self,
        mode: Option<String>,
        schedule: Option<String>,
    ) {
        self.active_mode = mode;
        self.active_schedule = schedule;
    }

    pub fn active_mode(&self) -> Option<&str> {
        self.active_mode.as_deref()
    }

    pub fn active_mode_name(&self) -> Option<&str> {
        self.active_mode.as_deref().and_then(|id| self.mode_name(id))
    }

    pub fn active_schedule(&self) -> Option<&str> {
        self.active_schedule.as_deref()
    }
}

/// Resolves the configured mode api against one station. `Auto`
/// drives stations that report a unique id through the automation
/// protocol; everything older through notify.

pub fn select_api(cfg: ModeApi, unique_id: Option<&str>) -> ModeApi {
    match cfg {
        ModeApi::Auto => {
            if unique_id.is_some() {
                ModeApi::V2
            } else {
                ModeApi::V1
            }
        }
        explicit => explicit,
    }
}

pub async fn fetch_definitions(
    backend: &Backend,
) -> Result<HashMap<String, payload::AutomationDefinition>> {
    let data = backend.get(constant::DEFINITIONS_PATH).await?;

    serde_json::from_value(data).map_err(|e| {
        Error::ProtocolError(format!("bad automation definitions -- {}", e))
    })
}

pub async fn fetch_active(
    backend: &Backend,
) -> Result<Vec<payload::AutomationActive>> {
    let data = backend.get(constant::AUTOMATION_PATH).await?;

    serde_json::from_value(data).map_err(|e| {
        Error::ProtocolError(format!("bad active automations -- {}", e))
    })
}

// The v1 command published to a base station.

fn notify_body(
    user_id: &str,
    station_id: &str,
    mode_id: &str,
    trans_id: &str,
) -> serde_json::Value {
    serde_json::json!({
        "action": "set",
        "resource": "modes",
        "publishResponse": true,
        "from": user_id,
        "to": station_id,
        "transId": trans_id,
        "properties": { "active": mode_id },
    })
}

// The v2 replacement of a station's active automations.

fn automation_body(unique_id: &str, mode_id: &str) -> serde_json::Value {
    serde_json::json!({
        "activeAutomations": [{
            "uniqueId": unique_id,
            "activeModes": [mode_id],
            "activeSchedules": [],
        }],
    })
}

/// Switches a base station's active mode. `api` must already be
/// resolved through `select_api()`.

pub async fn set_active_mode(
    backend: &Backend,
    api: ModeApi,
    station_id: &str,
    unique_id: Option<&str>,
    x_cloud_id: Option<&str>,
    mode_id: &str,
) -> Result<()> {
    debug!("switching {} to mode {}", station_id, mode_id);

    match api {
        ModeApi::V1 | ModeApi::Auto => {
            let body = notify_body(
                &backend.user_id()?,
                station_id,
                mode_id,
                &backend.next_trans_id(),
            );

            backend.notify(station_id, x_cloud_id, &body).await.map(|_| ())
        }

        ModeApi::V2 => {
            let unique_id = unique_id.ok_or_else(|| {
                Error::InvArgument(String::from(
                    "station has no unique id for the automation protocol",
                ))
            })?;

            backend
                .post(
                    constant::AUTOMATION_PATH,
                    &automation_body(unique_id, mode_id),
                )
                .await
                .map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mk_catalog() -> ModeCatalog {
        let def: payload::AutomationDefinition =
            serde_json::from_value(json!({
                "modes": [
                    { "id": "mode0", "type": "disarmed" },
                    { "id": "mode1", "type": "armed" },
                    { "id": "mode2", "name": "Night" }
                ],
                "schedules": [ { "id": "schedule.1", "name": "Week" } ]
            }))
            .unwrap();

        ModeCatalog::from_definition(&def)
    }

    #[test]
    fn test_stock_catalog() {
        let catalog = ModeCatalog::stock();

        assert_eq!(catalog.mode_id("disarmed"), Some("mode0"));
        assert_eq!(catalog.mode_id("Armed"), Some("mode1"));
        assert_eq!(catalog.mode_name("mode1"), Some("armed"));
        assert_eq!(catalog.mode_id("night"), None);
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = mk_catalog();

        // By name, case-insensitively, and directly by id.

        assert_eq!(catalog.mode_id("night"), Some("mode2"));
        assert_eq!(catalog.mode_id("NIGHT"), Some("mode2"));
        assert_eq!(catalog.mode_id("mode2"), Some("mode2"));
        assert_eq!(catalog.mode_id("armed"), Some("mode1"));
        assert_eq!(catalog.mode_name("mode2"), Some("Night"));

        assert!(catalog.is_schedule("schedule.1"));
        assert!(!catalog.is_schedule("mode1"));
    }

    #[test]
    fn test_active_tracking() {
        let mut catalog = mk_catalog();

        assert_eq!(catalog.active_mode_name(), None);

        catalog.set_active(
            Some(String::from("mode2")),
            Some(String::from("schedule.1")),
        );

        assert_eq!(catalog.active_mode(), Some("mode2"));
        assert_eq!(catalog.active_mode_name(), Some("Night"));
        assert_eq!(catalog.active_schedule(), Some("schedule.1"));
    }

    #[test]
    fn test_select_api() {
        assert_eq!(select_api(ModeApi::V1, Some("u")), ModeApi::V1);
        assert_eq!(select_api(ModeApi::V2, None), ModeApi::V2);
        assert_eq!(select_api(ModeApi::Auto, Some("u")), ModeApi::V2);
        assert_eq!(select_api(ModeApi::Auto, None), ModeApi::V1);
    }

    #[test]
    fn test_command_bodies() {
        let body = notify_body("USER", "BASE0001", "mode1", "web!1!123");

        assert_eq!(body["action"], "set");
        assert_eq!(body["resource"], "modes");
        assert_eq!(body["from"], "USER");
        assert_eq!(body["to"], "BASE0001");
        assert_eq!(body["transId"], "web!1!123");
        assert_eq!(body["properties"]["active"], "mode1");

        let body = automation_body("USER-BASE0001", "mode2");
        let auto = &body["activeAutomations"][0];

        assert_eq!(auto["uniqueId"], "USER-BASE0001");
        assert_eq!(auto["activeModes"], json!(["mode2"]));
        assert_eq!(auto["activeSchedules"], json!([]));
    }
}
