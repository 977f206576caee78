//! Weighted-demand Auto-Mode Controller (spec §4.5): decides the shared
//! compressor's global mode from per-device demand, guarded by
//! hysteresis, dominance thresholds, and three timing locks.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hvac_core::model::DeviceId;

use crate::state::{
    AutoModeStateFile, AutoModeStateStore, DeviceBreakdown, DeviceView, EvaluationResult, GlobalMode, epoch_zero,
};

#[derive(Debug, Clone, Copy)]
pub struct AutoModeConfig {
    pub heat_hysteresis_f: f64,
    pub flip_guard_f: f64,
    pub relative_dominance_threshold: f64,
    pub absolute_dominance_threshold_f: f64,
    pub min_off: Duration,
    pub min_on: Duration,
    pub min_lock: Duration,
    pub freeze_threshold_f: f64,
    pub high_temp_threshold_f: f64,
}

impl Default for AutoModeConfig {
    fn default() -> Self {
        Self {
            heat_hysteresis_f: 0.7,
            flip_guard_f: 2.0,
            relative_dominance_threshold: 0.25,
            absolute_dominance_threshold_f: 2.0,
            min_off: Duration::from_secs(300),
            min_on: Duration::from_secs(600),
            min_lock: Duration::from_secs(1800),
            freeze_threshold_f: 50.0,
            high_temp_threshold_f: 90.0,
        }
    }
}

pub struct AutoModeController {
    config: AutoModeConfig,
    store: AutoModeStateStore,
    current_mode: GlobalMode,
    last_switch_time: DateTime<Utc>,
    last_on_time: DateTime<Utc>,
    last_off_time: DateTime<Utc>,
    enrolled: BTreeSet<DeviceId>,
}

impl AutoModeController {
    pub fn new(path: impl Into<std::path::PathBuf>, config: AutoModeConfig) -> Self {
        Self {
            config,
            store: AutoModeStateStore::new(path),
            current_mode: GlobalMode::Off,
            last_switch_time: epoch_zero(),
            last_on_time: epoch_zero(),
            last_off_time: epoch_zero(),
            enrolled: BTreeSet::new(),
        }
    }

    pub async fn load(&mut self) -> Result<(), hvac_core::CoreError> {
        if let Some(file) = self.store.load().await? {
            self.current_mode = file.current_mode;
            self.last_switch_time = file.last_switch_time;
            self.last_on_time = file.last_on_time;
            self.last_off_time = file.last_off_time;
            self.enrolled = file.enrolled_device_ids;
        }
        Ok(())
    }

    async fn save(&self) -> Result<(), hvac_core::CoreError> {
        let file = AutoModeStateFile {
            current_mode: self.current_mode,
            last_switch_time: self.last_switch_time,
            last_on_time: self.last_on_time,
            last_off_time: self.last_off_time,
            enrolled_device_ids: self.enrolled.clone(),
        };
        self.store.save(&file).await
    }

    pub fn current_mode(&self) -> GlobalMode {
        self.current_mode
    }

    pub fn is_enrolled(&self, id: &DeviceId) -> bool {
        self.enrolled.contains(id)
    }

    pub fn enrolled_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.enrolled.iter()
    }

    /// Enrollment is idempotent; persists only when it actually changes
    /// the set, matching the "persisted state file I/O is not on every
    /// no-op" shape of the rest of the workspace.
    pub async fn enroll(&mut self, id: DeviceId) -> Result<bool, hvac_core::CoreError> {
        let inserted = self.enrolled.insert(id);
        if inserted {
            self.save().await?;
        }
        Ok(inserted)
    }

    pub async fn unenroll(&mut self, id: &DeviceId) -> Result<bool, hvac_core::CoreError> {
        let removed = self.enrolled.remove(id);
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }

    /// Pure decision function: inspects `devices` against the controller's
    /// current persisted mode and timing state, but does not mutate
    /// anything. Call [`Self::apply_decision`] to commit the result.
    pub fn evaluate(&self, devices: &[DeviceView], now: DateTime<Utc>) -> EvaluationResult {
        let mut breakdown = Vec::with_capacity(devices.len());
        let mut total_heat = 0.0;
        let mut total_cool = 0.0;
        let mut freeze: Option<(&DeviceView, f64)> = None;
        let mut high_temp: Option<(&DeviceView, f64)> = None;

        for d in devices {
            let Some(t) = d.current_temperature_f else { continue };
            if freeze.is_none() && t < self.config.freeze_threshold_f {
                freeze = Some((d, t));
            }
            if high_temp.is_none() && t > self.config.high_temp_threshold_f {
                high_temp = Some((d, t));
            }

            let raw_heat = (d.lower_bound_f - t).max(0.0);
            let raw_cool = (t - d.upper_bound_f).max(0.0);
            let (raw_heat, raw_cool) = self.apply_flip_guard(raw_heat, raw_cool, d, t);
            let heat_demand = d.weight * raw_heat;
            let cool_demand = d.weight * raw_cool;
            total_heat += heat_demand;
            total_cool += cool_demand;
            breakdown.push(DeviceBreakdown { id: d.id.clone(), name: d.name.clone(), heat_demand, cool_demand });
        }

        if let Some((d, t)) = freeze {
            return EvaluationResult {
                desired_mode: GlobalMode::Heat,
                total_heat,
                total_cool,
                per_device_breakdown: breakdown,
                human_reason: format!("freeze protection: {} at {t:.1}\u{b0}F", d.name),
                suppressed: false,
                seconds_until_allowed: None,
            };
        }
        if let Some((d, t)) = high_temp {
            return EvaluationResult {
                desired_mode: GlobalMode::Cool,
                total_heat,
                total_cool,
                per_device_breakdown: breakdown,
                human_reason: format!("high-temperature protection: {} at {t:.1}\u{b0}F", d.name),
                suppressed: false,
                seconds_until_allowed: None,
            };
        }

        let desired = self.decide(total_heat, total_cool);
        self.apply_timing_locks(desired, now, total_heat, total_cool, breakdown)
    }

    /// Commits an evaluation: a no-op if the mode didn't change or the
    /// decision was suppressed. Returns whether the mode actually changed.
    pub async fn apply_decision(
        &mut self,
        decision: &EvaluationResult,
        now: DateTime<Utc>,
    ) -> Result<bool, hvac_core::CoreError> {
        if decision.suppressed || decision.desired_mode == self.current_mode {
            return Ok(false);
        }
        let previous = self.current_mode;
        self.current_mode = decision.desired_mode;
        self.last_switch_time = now;
        match (previous, decision.desired_mode) {
            (GlobalMode::Off, _) => self.last_on_time = now,
            (_, GlobalMode::Off) => self.last_off_time = now,
            _ => {}
        }
        self.save().await?;
        Ok(true)
    }

    /// Flip guard: a demand direction opposing the currently running mode
    /// only counts once it clears hysteresis plus the flip-guard margin.
    fn apply_flip_guard(&self, raw_heat: f64, raw_cool: f64, d: &DeviceView, t: f64) -> (f64, f64) {
        match self.current_mode {
            GlobalMode::Cool => {
                let threshold = d.lower_bound_f - self.config.heat_hysteresis_f - self.config.flip_guard_f;
                if t < threshold { (raw_heat, raw_cool) } else { (0.0, raw_cool) }
            }
            GlobalMode::Heat => {
                let threshold = d.upper_bound_f + self.config.heat_hysteresis_f + self.config.flip_guard_f;
                if t > threshold { (raw_heat, raw_cool) } else { (raw_heat, 0.0) }
            }
            GlobalMode::Off => (raw_heat, raw_cool),
        }
    }

    fn decide(&self, total_heat: f64, total_cool: f64) -> GlobalMode {
        if total_heat <= 0.0 && total_cool <= 0.0 {
            return GlobalMode::Off;
        }
        if total_heat > 0.0 && total_cool <= 0.0 {
            return GlobalMode::Heat;
        }
        if total_cool > 0.0 && total_heat <= 0.0 {
            return GlobalMode::Cool;
        }
        let (winner, winner_total, loser_total) = if total_heat >= total_cool {
            (GlobalMode::Heat, total_heat, total_cool)
        } else {
            (GlobalMode::Cool, total_cool, total_heat)
        };
        let relative_dominant = winner_total >= loser_total * (1.0 + self.config.relative_dominance_threshold);
        let absolute_dominant = winner_total - loser_total >= self.config.absolute_dominance_threshold_f;
        if relative_dominant || absolute_dominant { winner } else { self.current_mode }
    }

    fn apply_timing_locks(
        &self,
        desired: GlobalMode,
        now: DateTime<Utc>,
        total_heat: f64,
        total_cool: f64,
        breakdown: Vec<DeviceBreakdown>,
    ) -> EvaluationResult {
        if desired == self.current_mode {
            return EvaluationResult {
                desired_mode: desired,
                total_heat,
                total_cool,
                per_device_breakdown: breakdown,
                human_reason: "no change".to_string(),
                suppressed: false,
                seconds_until_allowed: None,
            };
        }

        let mut guards = Vec::new();
        if self.current_mode == GlobalMode::Off {
            guards.push(remaining(self.config.min_off, self.last_off_time, now));
        }
        if desired == GlobalMode::Off {
            guards.push(remaining(self.config.min_on, self.last_on_time, now));
        }
        if self.current_mode != GlobalMode::Off && desired != GlobalMode::Off {
            guards.push(remaining(self.config.min_on, self.last_on_time, now));
            guards.push(remaining(self.config.min_lock, self.last_switch_time, now));
        }

        match guards.into_iter().filter(|d| !d.is_zero()).max() {
            Some(remaining) => EvaluationResult {
                desired_mode: self.current_mode,
                total_heat,
                total_cool,
                per_device_breakdown: breakdown,
                human_reason: format!(
                    "timing lock: {}s remaining before switching to {desired:?}",
                    remaining.as_secs()
                ),
                suppressed: true,
                seconds_until_allowed: Some(remaining.as_secs()),
            },
            None => EvaluationResult {
                desired_mode: desired,
                total_heat,
                total_cool,
                per_device_breakdown: breakdown,
                human_reason: format!("switching to {desired:?}"),
                suppressed: false,
                seconds_until_allowed: None,
            },
        }
    }
}

fn remaining(min: Duration, since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
    min.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn view(id: &str, t: f64, lower: f64, upper: f64) -> DeviceView {
        DeviceView {
            id: DeviceId::from(id),
            name: id.to_string(),
            current_temperature_f: Some(t),
            lower_bound_f: lower,
            upper_bound_f: upper,
            weight: 1.0,
        }
    }

    fn controller(dir: &tempfile::TempDir) -> AutoModeController {
        AutoModeController::new(dir.path().join("auto-mode.json"), AutoModeConfig::default())
    }

    #[test]
    fn freeze_protection_forces_heat_regardless_of_timing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        ctrl.current_mode = GlobalMode::Off;
        ctrl.last_off_time = now() - chrono::Duration::minutes(10);

        let devices = [view("living-room", 45.0, 68.0, 72.0)];
        let result = ctrl.evaluate(&devices, now());

        assert_eq!(result.desired_mode, GlobalMode::Heat);
        assert!(result.human_reason.contains("freeze"));
        assert!(!result.suppressed);
    }

    #[test]
    fn min_on_lock_holds_current_mode_and_reports_remaining_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        ctrl.current_mode = GlobalMode::Heat;
        ctrl.last_on_time = now() - chrono::Duration::seconds(120);
        ctrl.last_switch_time = ctrl.last_on_time;

        let devices = [view("living-room", 70.0, 68.0, 72.0)];
        let result = ctrl.evaluate(&devices, now());

        assert_eq!(result.desired_mode, GlobalMode::Heat);
        assert!(result.suppressed);
        assert_eq!(result.seconds_until_allowed, Some(480));
    }

    #[test]
    fn flip_guard_suppresses_heat_demand_just_past_hysteresis() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        ctrl.current_mode = GlobalMode::Cool;
        ctrl.last_switch_time = now() - chrono::Duration::seconds(10_000);
        ctrl.last_on_time = ctrl.last_switch_time;

        let devices = [view("bedroom", 67.5, 68.0, 72.0)];
        let result = ctrl.evaluate(&devices, now());

        assert_eq!(result.total_heat, 0.0);
        assert_eq!(result.desired_mode, GlobalMode::Cool);
    }

    #[test]
    fn dominance_tie_breaks_toward_larger_relatively_dominant_demand() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        ctrl.current_mode = GlobalMode::Off;
        ctrl.last_off_time = now() - chrono::Duration::seconds(10_000);

        let devices = [view("a", 66.0, 68.0, 72.0), view("b", 73.0, 68.0, 72.0)];
        let result = ctrl.evaluate(&devices, now());

        assert_eq!(result.total_heat, 2.0);
        assert_eq!(result.total_cool, 1.0);
        assert_eq!(result.desired_mode, GlobalMode::Heat);
        assert!(!result.suppressed);
    }

    #[tokio::test]
    async fn apply_decision_is_a_no_op_when_mode_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        ctrl.current_mode = GlobalMode::Cool;
        let switch_before = ctrl.last_switch_time;

        let decision = EvaluationResult {
            desired_mode: GlobalMode::Cool,
            total_heat: 0.0,
            total_cool: 1.0,
            per_device_breakdown: vec![],
            human_reason: "no change".to_string(),
            suppressed: false,
            seconds_until_allowed: None,
        };
        let changed = ctrl.apply_decision(&decision, now()).await.unwrap();

        assert!(!changed);
        assert_eq!(ctrl.last_switch_time, switch_before);
    }

    #[tokio::test]
    async fn enrollment_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        let id = DeviceId::from("dev-1");
        assert!(ctrl.enroll(id.clone()).await.unwrap());
        assert!(!ctrl.enroll(id.clone()).await.unwrap());
        assert!(ctrl.is_enrolled(&id));
    }
}
