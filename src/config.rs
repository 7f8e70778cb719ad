use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// File name of the configuration inside the mod directory.
pub const CONFIG_FILE: &str = "Config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    /// Dictionary file or directory of `*.json` files, relative to the mod directory.
    #[serde(default = "default_translation_file")]
    pub translation_file: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_scan_interval_frames")]
    pub scan_interval_frames: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_attempt_delay_ms")]
    pub attempt_delay_ms: u64,
    #[serde(default = "default_early_fallback_attempt")]
    pub early_fallback_attempt: u32,
    #[serde(default = "default_background_retry_delays_ms")]
    pub background_retry_delays_ms: Vec<u64>,
    #[serde(default = "default_primary_types")]
    pub primary_types: Vec<String>,
    #[serde(default = "default_preferred_assemblies")]
    pub preferred_assemblies: Vec<String>,
    #[serde(default = "default_widget_types")]
    pub widget_types: Vec<String>,
    #[serde(default = "default_overload_types")]
    pub overload_types: Vec<String>,
    #[serde(default = "default_scan_type_patterns")]
    pub scan_type_patterns: Vec<String>,
}

fn default_translation_file() -> String {
    "translation.json".to_string()
}
fn default_log_filter() -> String {
    "info".to_string()
}
fn default_scan_interval_frames() -> u32 {
    30
}
fn default_max_attempts() -> u32 {
    30
}
fn default_attempt_delay_ms() -> u64 {
    1000
}
fn default_early_fallback_attempt() -> u32 {
    5
}
fn default_background_retry_delays_ms() -> Vec<u64> {
    vec![0, 1000, 3000, 10000]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_primary_types() -> Vec<String> {
    strings(&["Il2Cpp.Scriptable_String", "Scriptable_String"])
}
fn default_preferred_assemblies() -> Vec<String> {
    strings(&[
        "Assembly-CSharp",
        "Il2Cpp__Generated",
        "GameAssembly",
        "Assembly-CSharp-firstpass",
        "Il2Cpp",
    ])
}
fn default_widget_types() -> Vec<String> {
    strings(&[
        "Il2CppTMPro.TextMeshProUGUI",
        "TMPro.TextMeshProUGUI",
        "Il2CppTMPro.TMP_Text",
        "TMPro.TMP_Text",
        "TMPro.TextMeshPro",
        "UnityEngine.UI.Text",
        "TextMeshProUGUI",
        "TextMeshPro",
        "TMP_Text",
        "UnityEngine.UI",
    ])
}
fn default_overload_types() -> Vec<String> {
    strings(&[
        "Il2CppTMPro.TMP_Text",
        "TMPro.TMP_Text",
        "Il2CppTMPro.TextMeshProUGUI",
        "TMPro.TextMeshProUGUI",
    ])
}
fn default_scan_type_patterns() -> Vec<String> {
    strings(&["TextMeshProUGUI", "TMP_Text", "UnityEngine.UI.Text"])
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            translation_file: default_translation_file(),
            log_filter: default_log_filter(),
            scan_interval_frames: default_scan_interval_frames(),
            max_attempts: default_max_attempts(),
            attempt_delay_ms: default_attempt_delay_ms(),
            early_fallback_attempt: default_early_fallback_attempt(),
            background_retry_delays_ms: default_background_retry_delays_ms(),
            primary_types: default_primary_types(),
            preferred_assemblies: default_preferred_assemblies(),
            widget_types: default_widget_types(),
            overload_types: default_overload_types(),
            scan_type_patterns: default_scan_type_patterns(),
        }
    }
}

impl AppConfig {
    /// Load config from file, or create default if not exists
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if !path.as_ref().exists() {
            let default_config = Self::default();
            default_config.save_to_file(&path)?;
            return Ok(default_config);
        }
        Self::load_from_file(path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    fn validate(&mut self) {
        if self.scan_interval_frames < 1 {
            self.scan_interval_frames = 1;
        }
        if self.max_attempts < 1 {
            self.max_attempts = 1;
        }
        self.early_fallback_attempt = self.early_fallback_attempt.clamp(1, self.max_attempts);
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let commented = format!(
            "translation_file = {:?}     # Dictionary file, or a directory of *.json files\n\
             log_filter = {:?}                   # Log level filter, overridden by RUST_LOG\n\
             scan_interval_frames = {}           # Frames between widget rescans\n\n\
             # Discovery timing\n\
             max_attempts = {}                   # Primary search attempts before falling back\n\
             attempt_delay_ms = {}             # Delay between primary attempts (ms)\n\
             early_fallback_attempt = {}          # Attempt that also tries UI setters\n\
             background_retry_delays_ms = {:?}   # Fallback retry schedule (ms)\n\n\
             # Type names searched in the host\n\
             primary_types = {:?}\n\
             preferred_assemblies = {:?}\n\
             widget_types = {:?}\n\
             overload_types = {:?}\n\
             scan_type_patterns = {:?}     # Substrings of widget types the rescanner visits\n",
            self.translation_file,
            self.log_filter,
            self.scan_interval_frames,
            self.max_attempts,
            self.attempt_delay_ms,
            self.early_fallback_attempt,
            self.background_retry_delays_ms,
            self.primary_types,
            self.preferred_assemblies,
            self.widget_types,
            self.overload_types,
            self.scan_type_patterns,
        );

        fs::write(path, commented)?;
        Ok(())
    }
}
