//! Scheduling constants from SPEC_FULL.md §6, with the literal values there as defaults.
//!
//! These are plain, `Deserialize`-able data so the root binary's config loader (mirroring the
//! workspace's existing `Config::load` TOML+environment pattern) can override any of them
//! without the engine itself knowing anything about file formats or environment variables.

use chrono::NaiveTime;
use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid literal time constant")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub scheduling_window_days: i64,
    pub max_core_per_day: u32,
    pub max_core_per_week: u32,
    pub min_days_to_due: i64,
    pub max_bumps_per_event: u32,
    pub rescue_pass_urgent_days: i64,
    /// IANA timezone name used for "today" and all local-date arithmetic.
    pub external_timezone: String,
    pub juicer_production_time: NaiveTime,
    pub juicer_survey_time: NaiveTime,
    pub freeosk_time: NaiveTime,
    pub other_time: NaiveTime,
    pub supervisor_time: NaiveTime,
    /// Eight shift-block arrive times, used round-robin for Core assignments Mon-Sat.
    pub core_time_slots: Vec<NaiveTime>,
    /// Reduced Core slot set used on Sundays.
    pub core_time_slots_sunday: Vec<NaiveTime>,
    pub digital_setup_refresh_slots: Vec<NaiveTime>,
    pub digital_teardown_slots: Vec<NaiveTime>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            scheduling_window_days: 3,
            max_core_per_day: 1,
            max_core_per_week: 6,
            min_days_to_due: 2,
            max_bumps_per_event: 3,
            rescue_pass_urgent_days: 7,
            external_timezone: "America/Indiana/Indianapolis".to_string(),
            juicer_production_time: time(9, 0),
            juicer_survey_time: time(17, 0),
            freeosk_time: time(10, 0),
            other_time: time(11, 0),
            supervisor_time: time(12, 0),
            core_time_slots: vec![
                time(10, 15),
                time(10, 15),
                time(10, 45),
                time(10, 45),
                time(11, 15),
                time(11, 15),
                time(11, 45),
                time(11, 45),
            ],
            core_time_slots_sunday: vec![time(10, 45), time(11, 15)],
            digital_setup_refresh_slots: vec![time(10, 15), time(10, 30), time(10, 45), time(11, 0)],
            digital_teardown_slots: vec![
                time(18, 0),
                time(18, 15),
                time(18, 30),
                time(18, 45),
                time(19, 0),
                time(19, 15),
                time(19, 30),
                time(19, 45),
            ],
        }
    }
}

impl SchedulerConfig {
    pub fn timezone(&self) -> chrono_tz::Tz {
        self.external_timezone
            .parse()
            .unwrap_or(chrono_tz::America::Indiana::Indianapolis)
    }

    /// Core slots for a given weekday, honoring the reduced Sunday set (§4.4.2).
    pub fn core_slots_for(&self, weekday: chrono::Weekday) -> &[NaiveTime] {
        if weekday == chrono::Weekday::Sun {
            &self.core_time_slots_sunday
        } else {
            &self.core_time_slots
        }
    }

    /// Loads constants from `config/scheduler.toml` (optional), an optional caller-supplied
    /// override file, and `SCHEDULER__*` environment variables, layered over [`SchedulerConfig::default`].
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigLoader::builder()
            .add_source(ConfigLoader::try_from(&SchedulerConfig::default())?)
            .add_source(File::with_name("config/scheduler").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        builder
            .add_source(Environment::with_prefix("SCHEDULER").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = SchedulerConfig::default();
        assert_eq!(config.scheduling_window_days, 3);
        assert_eq!(config.max_core_per_day, 1);
        assert_eq!(config.max_core_per_week, 6);
        assert_eq!(config.min_days_to_due, 2);
        assert_eq!(config.max_bumps_per_event, 3);
        assert_eq!(config.core_time_slots.len(), 8);
        assert_eq!(config.core_time_slots_sunday.len(), 2);
        assert_eq!(config.digital_setup_refresh_slots.len(), 4);
        assert_eq!(config.digital_teardown_slots.len(), 8);
    }

    #[test]
    fn unparsable_timezone_falls_back_to_default() {
        let mut config = SchedulerConfig::default();
        config.external_timezone = "Not/AZone".to_string();
        assert_eq!(config.timezone(), chrono_tz::America::Indiana::Indianapolis);
    }

    #[test]
    fn load_with_no_file_matches_defaults() {
        let config = SchedulerConfig::load(None).unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn load_applies_environment_override_over_defaults() {
        // SAFETY: no other test in this process reads or writes this variable.
        unsafe { std::env::set_var("SCHEDULER__SCHEDULING_WINDOW_DAYS", "9") };
        let config = SchedulerConfig::load(None).unwrap();
        unsafe { std::env::remove_var("SCHEDULER__SCHEDULING_WINDOW_DAYS") };
        assert_eq!(config.scheduling_window_days, 9);
    }
}
