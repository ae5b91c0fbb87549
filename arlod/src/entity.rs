//! Maps discovered devices onto host entities and narrates their
//! state. There's no entity framework behind this: an entity is an
//! identifier, a table of timestamped readings, and a log line per
//! change.

use arlo_api::{
    device::{Id, Reading},
    Result,
};
use arlo_client::{
    device::{Kind, Update},
    ArloClient,
};
use std::collections::{HashMap, HashSet};
use std::time::SystemTime;
use tracing::{info, warn};

// Assigns a stable entity id to each device. Users can name two
// cameras identically in the vendor app, so a colliding slug gets
// the device id folded in.

fn assign_ids<'a>(
    devices: impl Iterator<Item = (&'a str, &'a str, &'a str)>,
) -> HashMap<String, Id> {
    let mut by_device = HashMap::new();
    let mut used: HashSet<Id> = HashSet::new();

    for (kind, name, device_id) in devices {
        let id = Id::from_device_name(kind, name)
            .filter(|id| !used.contains(id))
            .or_else(|| {
                Id::from_device_name(kind, &format!("{} {}", name, device_id))
            });

        match id {
            Some(id) if !used.contains(&id) => {
                used.insert(id.clone());
                by_device.insert(String::from(device_id), id);
            }
            _ => warn!("can't build an entity id for '{}'", name),
        }
    }
    by_device
}

struct Table {
    ids: HashMap<String, Id>,
    state: HashMap<String, HashMap<&'static str, Reading>>,
}

impl Table {
    fn build(client: &ArloClient) -> Self {
        let ids = assign_ids(client.devices().map(|dev| {
            (dev.kind.as_str(), dev.name.as_str(), dev.device_id.as_str())
        }));

        Table {
            ids,
            state: HashMap::new(),
        }
    }

    fn announce(&self, client: &ArloClient) {
        let (cameras, bells, lights) = client.totals();

        info!(
            "exposing {} entities ({} cameras, {} doorbells, {} lights)",
            self.ids.len(),
            cameras,
            bells,
            lights
        );

        for dev in client.devices() {
            if let Some(id) = self.ids.get(&dev.device_id) {
                info!("{} <- {} \"{}\"", id, dev.kind.as_str(), dev.name);

                if dev.kind == Kind::BaseStation {
                    if let Some(mode) = client
                        .mode_catalog(&dev.device_id)
                        .and_then(|catalog| catalog.active_mode_name())
                    {
                        info!("{}: active mode \"{}\"", id, mode)
                    }
                }
            }
        }
    }

    fn apply(&mut self, update: Update) {
        let id = match self.ids.get(&update.device_id) {
            Some(id) => id,
            // Updates can arrive for devices that never got an
            // entity (unsupported types, id collisions).
            None => return,
        };
        let reading = Reading {
            ts: SystemTime::now(),
            value: update.value,
        };

        info!("{}: {} -> {}", id, update.key, &reading.value);

        self.state
            .entry(update.device_id)
            .or_default()
            .insert(update.key, reading);
    }
}

/// Consumes the client's update stream until the session dies or the
/// daemon is told to stop.

pub async fn run(mut client: ArloClient) -> Result<()> {
    let mut table = Table::build(&client);

    table.announce(&client);

    loop {
        tokio::select! {
            update = client.next_update() => match update {
                Ok(update) => table.apply(update),
                Err(e) => return Err(e),
            },

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                client.disconnect().await;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arlo_api::device::Value;

    #[test]
    fn test_assign_ids() {
        let devices = [
            ("camera", "Front Door", "CAM00001"),
            ("camera", "Front Door", "CAM00002"),
            ("doorbell", "Front Door", "BELL0001"),
            ("camera", "!!!", "CAM00003"),
        ];
        let ids = assign_ids(devices.iter().copied());

        assert_eq!(
            ids["CAM00001"].to_string(),
            "camera_front_door"
        );

        // The twin camera folds its device id into the slug; the
        // doorbell never collides because the kind leads the id.

        assert_eq!(
            ids["CAM00002"].to_string(),
            "camera_front_door_cam00002"
        );
        assert_eq!(
            ids["BELL0001"].to_string(),
            "doorbell_front_door"
        );

        // A name with no usable characters leaves just the kind.

        assert_eq!(ids["CAM00003"].to_string(), "camera");
    }

    #[test]
    fn test_table_apply() {
        let mut table = Table {
            ids: assign_ids(
                [("camera", "Front Door", "CAM00001")].iter().copied(),
            ),
            state: HashMap::new(),
        };

        table.apply(Update {
            device_id: String::from("CAM00001"),
            key: "batteryLevel",
            value: Value::Int(91),
        });

        assert_eq!(
            table.state["CAM00001"]["batteryLevel"].value,
            Value::Int(91)
        );

        // Updates for unknown devices are dropped, not recorded.

        table.apply(Update {
            device_id: String::from("NOPE"),
            key: "batteryLevel",
            value: Value::Int(1),
        });

        assert!(!table.state.contains_key("NOPE"));
    }
}
