use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use super::progress_info::{BarColor, ProgressInfo, StartOptions};

/// Configuration from ProgressBox.yaml
///
/// Every section falls back to its defaults when missing, so an empty file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxConfig {
    pub defaults: BoxDefaults,
    pub cancel_fan_out: CancelFanOut,
    pub logging: LoggingSettings,
}

/// Initial values for every new session of a progress box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxDefaults {
    pub caption: String,
    pub message: String,
    pub lower_bound: i32,
    pub upper_bound: i32,
    pub bar_color: BarColor,
    pub start_options: StartOptions,
    pub marquee_interval: u32,
}

impl Default for BoxDefaults {
    fn default() -> Self {
        Self {
            caption: "Progress".to_string(),
            message: String::new(),
            lower_bound: 0,
            upper_bound: 100,
            bar_color: BarColor::SystemDefault,
            start_options: StartOptions::empty(),
            marquee_interval: 0,
        }
    }
}

impl BoxDefaults {
    /// Seed the shared state of a fresh session.
    pub fn initial_state(&self) -> ProgressInfo {
        ProgressInfo {
            caption: self.caption.clone(),
            message: self.message.clone(),
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            position: self.lower_bound,
            options: self.start_options,
            marquee_interval: self.marquee_interval,
            bar_color: self.bar_color,
            ..ProgressInfo::default()
        }
    }
}

/// How a cancel request travels through the subscriber list once someone vetoes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelFanOut {
    /// Stop notifying at the first veto.
    #[default]
    StopAtVeto,
    /// Notify every subscriber; a veto still cannot be undone by later ones.
    NotifyAll,
}

/// Where and how verbosely to log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub directory: Utf8PathBuf,
    pub file_prefix: String,
    pub debug: bool,
    pub console: bool,
    /// Write the log file as JSON lines instead of text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: Utf8PathBuf::from("logs"),
            file_prefix: "progressbox".to_string(),
            debug: false,
            console: true,
            json: false,
        }
    }
}
