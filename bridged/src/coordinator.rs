//! The Coordinator (spec §4.4): reconciles cloud device state with the
//! accessory protocol, translates accessory-protocol events into cloud
//! commands, and owns the device registry and state map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use hvac_accessory::{AccessoryAdapter, AccessoryCache, Cooldown, HookOutcome, ProposedState, ThermostatEvent};
use hvac_cloud::{CloudClient, commands};
use hvac_core::capability::ThermostatCapabilities as C;
use hvac_core::model::{Device, DeviceId, DeviceState, OperatingMode, PowerState};
use hvac_core::storage::{CoordinatorStateFile, CoordinatorStateStore};
use tokio::sync::{Mutex, RwLock};

use crate::plugins::PluginDispatcher;

struct CoordinatorInner {
    paired: Vec<DeviceId>,
    devices: HashMap<DeviceId, Device>,
    states: HashMap<DeviceId, DeviceState>,
}

pub struct Coordinator {
    cloud: Arc<CloudClient>,
    dispatcher: Arc<PluginDispatcher>,
    accessory: Arc<dyn AccessoryAdapter>,
    accessory_cache: Mutex<AccessoryCache>,
    cooldown: Cooldown,
    state_store: CoordinatorStateStore,
    inner: RwLock<CoordinatorInner>,
}

impl Coordinator {
    pub fn new(
        cloud: Arc<CloudClient>,
        dispatcher: Arc<PluginDispatcher>,
        accessory: Arc<dyn AccessoryAdapter>,
        accessory_cache: AccessoryCache,
        cooldown: Cooldown,
        state_store: CoordinatorStateStore,
    ) -> Self {
        Self {
            cloud,
            dispatcher,
            accessory,
            accessory_cache: Mutex::new(accessory_cache),
            cooldown,
            state_store,
            inner: RwLock::new(CoordinatorInner { paired: Vec::new(), devices: HashMap::new(), states: HashMap::new() }),
        }
    }

    /// Rehydrates the last-persisted paired set and state map. Device
    /// metadata (capabilities) is not persisted and is repopulated by
    /// the next [`Self::reload`].
    pub async fn load(&self) -> Result<()> {
        self.accessory_cache.lock().await.load().await?;
        if let Some(file) = self.state_store.load().await? {
            let (paired, states, _avg, _mode) = file.into_parts();
            let mut inner = self.inner.write().await;
            inner.paired = paired;
            inner.states = states;
        }
        Ok(())
    }

    /// Fetches the full device list, splits hvac/non-hvac via the
    /// thermostat-like predicate, diffs against the current paired set,
    /// and adds/removes accessories accordingly. Metadata is stored for
    /// every returned device, not just paired ones, since plugins need
    /// capability info for non-HVAC devices too.
    pub async fn reload(&self) -> Result<()> {
        let devices = self.cloud.list_devices().await?;
        let device_by_id: HashMap<DeviceId, Device> = devices.into_iter().map(|d| (d.id.clone(), d)).collect();
        let new_paired: Vec<DeviceId> =
            device_by_id.values().filter(|d| d.is_thermostat_like()).map(|d| d.id.clone()).collect();

        let old_paired = { self.inner.read().await.paired.clone() };
        let old_set: std::collections::BTreeSet<&DeviceId> = old_paired.iter().collect();
        let new_set: std::collections::BTreeSet<&DeviceId> = new_paired.iter().collect();

        for id in old_set.difference(&new_set) {
            if let Err(err) = self.accessory.unpublish_accessory(id).await {
                tracing::warn!(device_id = %id, error = %err, "failed to unpublish dropped accessory");
            }
            if let Err(err) = self.accessory_cache.lock().await.remove(id).await {
                tracing::warn!(device_id = %id, error = %err, "failed to drop cached accessory identity");
            }
        }

        for id in new_set.difference(&old_set) {
            let Some(device) = device_by_id.get(*id) else { continue };
            let identity = match self.accessory_cache.lock().await.get_or_create(device).await {
                Ok(identity) => identity,
                Err(err) => {
                    tracing::warn!(device_id = %id, error = %err, "failed to assign accessory identity");
                    continue;
                }
            };
            if let Err(err) = self.accessory.publish_accessory(device, &identity).await {
                tracing::warn!(device_id = %id, error = %err, "failed to publish new accessory");
            }
        }

        {
            let mut inner = self.inner.write().await;
            inner.states.retain(|id, _| new_paired.contains(id));
            inner.paired = new_paired;
            inner.devices = device_by_id;
        }

        self.persist().await
    }

    /// One polling tick: fetch status for every paired device — issued in
    /// parallel and awaited together (spec §4.4) — then, serially, run
    /// the pre-HomeKit hook chain and push materially-different state to
    /// the accessory (cooldown-gated), then run the poll-cycle hooks.
    pub async fn poll_cycle(&self) -> Result<()> {
        let (paired, devices) = {
            let inner = self.inner.read().await;
            (inner.paired.clone(), inner.devices.clone())
        };

        let fetches = paired
            .iter()
            .filter_map(|id| devices.get(id).map(|device| async move { (id.clone(), self.cloud.get_status(device).await) }));
        let fetched_states = futures::future::join_all(fetches).await;

        for (id, result) in fetched_states {
            let Some(device) = devices.get(&id) else { continue };
            let fetched = match result {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(device_id = %id, error = %err, "status poll failed");
                    continue;
                }
            };

            let proposed = ProposedState {
                mode: Some(fetched.mode),
                heating_setpoint_f: fetched.heating_setpoint_f,
                cooling_setpoint_f: fetched.cooling_setpoint_f,
            };
            let proposed = match self.dispatcher.run_before_homekit_state(device, proposed).await {
                HookOutcome::Cancel => continue,
                HookOutcome::Modified(p) => p,
            };

            let mut reported = fetched;
            if let Some(mode) = proposed.mode {
                reported.mode = mode;
            }

            let old_state = { self.inner.read().await.states.get(&id).cloned() };
            let material = old_state.as_ref().is_none_or(|old| old.differs_materially(&reported));

            {
                let mut inner = self.inner.write().await;
                inner.states.insert(id.clone(), reported.clone());
            }

            if material && self.cooldown.allow(&id, Instant::now()).await {
                match self.accessory.push_state(&id, &reported).await {
                    Ok(()) => self.dispatcher.run_after_device_update(device, &reported, old_state.as_ref()).await,
                    Err(err) => tracing::warn!(device_id = %id, error = %err, "accessory push failed"),
                }
            }
        }

        let all_devices: Vec<Device> = devices.into_values().collect();
        self.dispatcher.run_on_poll_cycle(&all_devices).await;

        self.persist().await
    }

    /// Translates a user-intent accessory event into cloud commands and
    /// mirrors the result locally. A hook chain cancellation aborts the
    /// write entirely.
    pub async fn handle_thermostat_event(&self, event: ThermostatEvent) -> Result<()> {
        let device = { self.inner.read().await.devices.get(&event.device_id).cloned() };
        let Some(device) = device else {
            tracing::warn!(device_id = %event.device_id, "thermostat event for unknown device, ignoring");
            return Ok(());
        };

        let proposed = ProposedState {
            mode: event.mode,
            heating_setpoint_f: event.heating_setpoint_f,
            cooling_setpoint_f: event.cooling_setpoint_f,
        };
        let proposed = match self.dispatcher.run_before_smartthings_state(&device, proposed).await {
            HookOutcome::Cancel => {
                tracing::debug!(device_id = %device.id, "thermostat event cancelled by a plugin hook");
                return Ok(());
            }
            HookOutcome::Modified(p) => p,
        };

        let mut cloud_commands = Vec::new();
        if let Some(mode) = proposed.mode {
            cloud_commands.extend(commands::translate_set_mode(&device.capabilities, mode));
        }
        if let Some(heat_sp) = proposed.heating_setpoint_f {
            if device.capabilities.contains(C::THERMOSTAT_HEATING_SETPOINT) {
                cloud_commands.push(commands::translate_set_heating_setpoint(heat_sp));
            } else if device.capabilities.contains(C::AIR_CONDITIONER_MODE) {
                // Vendor has a single setpoint under this capability model.
                cloud_commands.push(commands::translate_set_cooling_setpoint(heat_sp));
            }
        }
        if let Some(cool_sp) = proposed.cooling_setpoint_f {
            if device.capabilities.contains(C::THERMOSTAT_COOLING_SETPOINT) {
                cloud_commands.push(commands::translate_set_cooling_setpoint(cool_sp));
            }
        }

        if cloud_commands.is_empty() {
            return Ok(());
        }
        self.cloud.execute_commands(&device, cloud_commands).await?;

        let mut mirrored = {
            self.inner.read().await.states.get(&device.id).cloned().unwrap_or_else(|| DeviceState {
                current_temperature_f: None,
                heating_setpoint_f: None,
                cooling_setpoint_f: None,
                effective_setpoint_f: None,
                mode: OperatingMode::Off,
                power: PowerState::On,
                display_light_on: None,
                last_refreshed: Utc::now(),
            })
        };
        if let Some(mode) = proposed.mode {
            mirrored.mode = mode;
        }
        if let Some(heat_sp) = proposed.heating_setpoint_f {
            mirrored.heating_setpoint_f = Some(heat_sp);
        }
        if let Some(cool_sp) = proposed.cooling_setpoint_f {
            mirrored.cooling_setpoint_f = Some(cool_sp);
        }
        mirrored.effective_setpoint_f = match mirrored.mode {
            OperatingMode::Cool => mirrored.cooling_setpoint_f,
            _ => mirrored.heating_setpoint_f.or(mirrored.cooling_setpoint_f),
        };
        mirrored.last_refreshed = Utc::now();

        {
            let mut inner = self.inner.write().await;
            inner.states.insert(device.id.clone(), mirrored);
        }
        self.persist().await
    }

    /// A defensive snapshot of every known device paired with its last
    /// known state, for plugins that need it (spec §5: "reads from
    /// plugin hooks receive defensive snapshots").
    pub async fn device_and_state_snapshot(&self) -> Vec<(Device, DeviceState)> {
        let inner = self.inner.read().await;
        inner.states.iter().filter_map(|(id, state)| inner.devices.get(id).map(|d| (d.clone(), state.clone()))).collect()
    }

    /// The display-light monitor's sweep (spec §4.6): fetches *fresh*
    /// status for every thermostat-like device — not the cached snapshot
    /// `poll_cycle` maintains, which can be stale between polls — and
    /// turns off any display light reported on.
    pub async fn sweep_display_lights(&self) -> Result<()> {
        let devices: Vec<Device> = {
            let inner = self.inner.read().await;
            inner.devices.values().filter(|d| d.is_thermostat_like()).cloned().collect()
        };

        for device in &devices {
            let fetched = match self.cloud.get_status(device).await {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(device_id = %device.id, error = %err, "display-light status fetch failed");
                    continue;
                }
            };
            if fetched.display_light_on == Some(true) {
                if let Err(err) = self.cloud.set_display_light(device, false).await {
                    tracing::warn!(device_id = %device.id, error = %err, "display-light suppression failed");
                }
            }
        }
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let inner = self.inner.read().await;
        let average = average_temperature(&inner.states);
        let mode = derive_global_mode(&inner.states);
        let file = CoordinatorStateFile::from_parts(inner.paired.clone(), &inner.states, average, mode);
        drop(inner);
        self.state_store.save(&file).await?;
        Ok(())
    }
}

fn average_temperature(states: &HashMap<DeviceId, DeviceState>) -> Option<f64> {
    let temps: Vec<f64> = states.values().filter_map(|s| s.current_temperature_f).collect();
    if temps.is_empty() { None } else { Some(temps.iter().sum::<f64>() / temps.len() as f64) }
}

/// Majority vote over paired devices' live modes, ties broken in
/// heat/cool/auto/off order. An empty state map derives `off`.
fn derive_global_mode(states: &HashMap<DeviceId, DeviceState>) -> OperatingMode {
    if states.is_empty() {
        return OperatingMode::Off;
    }
    let mut counts = [0u32; 4];
    for state in states.values() {
        let idx = match state.mode {
            OperatingMode::Heat => 0,
            OperatingMode::Cool => 1,
            OperatingMode::Auto => 2,
            OperatingMode::Off => 3,
        };
        counts[idx] += 1;
    }
    let modes = [OperatingMode::Heat, OperatingMode::Cool, OperatingMode::Auto, OperatingMode::Off];
    let (winner, _) = counts.iter().enumerate().max_by_key(|&(_, c)| *c).expect("counts is non-empty");
    modes[winner]
}

#[cfg(test)]
mod tests {
    use hvac_accessory::LoggingAccessoryAdapter;
    use hvac_cloud::AuthManager;
    use hvac_core::capability::CapabilitySet;

    use super::*;

    fn sample_device(id: &str) -> Device {
        Device { id: DeviceId::from(id), name: "Bedroom AC".to_string(), manufacturer: None, capabilities: CapabilitySet::default() }
    }

    fn sample_state(mode: OperatingMode, temperature: f64) -> DeviceState {
        DeviceState {
            current_temperature_f: Some(temperature),
            heating_setpoint_f: None,
            cooling_setpoint_f: None,
            effective_setpoint_f: None,
            mode,
            power: PowerState::On,
            display_light_on: None,
            last_refreshed: Utc::now(),
        }
    }

    /// An `AuthManager` that was never given a token. `CloudClient` methods
    /// gated on `ensure_valid_token` short-circuit to their empty/`None`
    /// fallback without making a network call, so a `Coordinator` built on
    /// top of one is fully exercisable offline.
    fn unauthenticated_coordinator(dir: &tempfile::TempDir) -> Coordinator {
        let http = reqwest::Client::new();
        let auth = Arc::new(AuthManager::new(http.clone(), "https://example.invalid/token", "id", "secret", dir.path().join("token.json")));
        let cloud = Arc::new(CloudClient::new(http, "https://example.invalid".to_string(), auth));
        let dispatcher = Arc::new(PluginDispatcher::new(vec![]));
        let accessory = Arc::new(LoggingAccessoryAdapter) as Arc<dyn AccessoryAdapter>;
        let accessory_cache = AccessoryCache::new(dir.path().join("accessories.json"));
        let cooldown = Cooldown::default();
        let state_store = CoordinatorStateStore::new(dir.path().join("coordinator.json"));
        Coordinator::new(cloud, dispatcher, accessory, accessory_cache, cooldown, state_store)
    }

    #[test]
    fn average_temperature_is_none_for_an_empty_state_map() {
        assert_eq!(average_temperature(&HashMap::new()), None);
    }

    #[test]
    fn average_temperature_averages_across_devices() {
        let mut states = HashMap::new();
        states.insert(DeviceId::from("a"), sample_state(OperatingMode::Cool, 70.0));
        states.insert(DeviceId::from("b"), sample_state(OperatingMode::Cool, 74.0));
        assert_eq!(average_temperature(&states), Some(72.0));
    }

    #[test]
    fn derive_global_mode_defaults_to_off_when_empty() {
        assert_eq!(derive_global_mode(&HashMap::new()), OperatingMode::Off);
    }

    #[test]
    fn derive_global_mode_picks_the_majority() {
        let mut states = HashMap::new();
        states.insert(DeviceId::from("a"), sample_state(OperatingMode::Cool, 70.0));
        states.insert(DeviceId::from("b"), sample_state(OperatingMode::Cool, 71.0));
        states.insert(DeviceId::from("c"), sample_state(OperatingMode::Heat, 68.0));
        assert_eq!(derive_global_mode(&states), OperatingMode::Cool);
    }

    #[test]
    fn derive_global_mode_breaks_ties_heat_over_cool() {
        let mut states = HashMap::new();
        states.insert(DeviceId::from("a"), sample_state(OperatingMode::Cool, 70.0));
        states.insert(DeviceId::from("b"), sample_state(OperatingMode::Heat, 68.0));
        assert_eq!(derive_global_mode(&states), OperatingMode::Heat);
    }

    #[tokio::test]
    async fn reload_against_an_unauthenticated_cloud_yields_an_empty_paired_set() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = unauthenticated_coordinator(&dir);

        coordinator.reload().await.unwrap();

        assert!(coordinator.device_and_state_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn handle_thermostat_event_for_an_unknown_device_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = unauthenticated_coordinator(&dir);

        let event = ThermostatEvent {
            device_id: DeviceId::from("ghost"),
            mode: Some(OperatingMode::Cool),
            heating_setpoint_f: None,
            cooling_setpoint_f: None,
        };

        // No device is known, so this must return early without ever
        // reaching the (network-calling) cloud command path.
        coordinator.handle_thermostat_event(event).await.unwrap();
        assert!(coordinator.device_and_state_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn device_and_state_snapshot_reflects_directly_inserted_state() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = unauthenticated_coordinator(&dir);
        let device = sample_device("dev-1");

        {
            let mut inner = coordinator.inner.write().await;
            inner.paired.push(device.id.clone());
            inner.devices.insert(device.id.clone(), device.clone());
            inner.states.insert(device.id.clone(), sample_state(OperatingMode::Cool, 70.0));
        }

        let snapshot = coordinator.device_and_state_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0.id, device.id);
        assert_eq!(snapshot[0].1.mode, OperatingMode::Cool);
    }

    #[tokio::test]
    async fn persist_round_trips_through_the_state_store() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = unauthenticated_coordinator(&dir);
        let device = sample_device("dev-1");

        {
            let mut inner = coordinator.inner.write().await;
            inner.paired.push(device.id.clone());
            inner.devices.insert(device.id.clone(), device.clone());
            inner.states.insert(device.id.clone(), sample_state(OperatingMode::Heat, 68.0));
        }
        coordinator.persist().await.unwrap();

        let reloaded = CoordinatorStateStore::new(dir.path().join("coordinator.json")).load().await.unwrap().unwrap();
        assert_eq!(reloaded.paired_devices, vec![device.id.clone()]);
        assert_eq!(reloaded.current_mode, OperatingMode::Heat);
        assert_eq!(reloaded.average_temperature, Some(68.0));
    }
}
