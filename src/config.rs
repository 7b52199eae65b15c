//! Environment-driven configuration (spec §6 "Environment").
//!
//! Mirrors the teacher's `SyncConfig::from_env` shape: a plain struct with
//! an `from_env()` constructor and documented fallback defaults. CLI flags
//! are layered on top by the caller, never read here.

use std::path::PathBuf;

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct Config {
    pub calbridge_base: String,
    pub ollama_base: String,
    pub ollama_model: String,
    pub timezone: Tz,
    pub db_path: PathBuf,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub min_gap_minutes: u32,
    pub max_tasks_per_day: Option<u32>,
    pub holidays_calendar_title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calbridge_base: "http://localhost:8787".to_string(),
            ollama_base: "http://localhost:11434".to_string(),
            ollama_model: "qwen2.5:7b".to_string(),
            timezone: chrono_tz::America::New_York,
            db_path: PathBuf::from("calscribe.db"),
            work_start_hour: 6,
            work_end_hour: 23,
            min_gap_minutes: 0,
            max_tasks_per_day: None,
            holidays_calendar_title: "Holidays".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            calbridge_base: std::env::var("CALBRIDGE_BASE")
                .unwrap_or(defaults.calbridge_base),
            ollama_base: std::env::var("OLLAMA_BASE").unwrap_or(defaults.ollama_base),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            timezone: std::env::var("TIMEZONE")
                .ok()
                .and_then(|s| s.parse::<Tz>().ok())
                .unwrap_or(defaults.timezone),
            ..defaults
        }
    }
}
