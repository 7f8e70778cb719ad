//! Missing-key collector.
//!
//! Development-time harvest of source strings that have no translation. The
//! collector only activates when the enable marker exists in the mod
//! directory; client installs never carry the marker and stay side-effect
//! free.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::error::ReportWriteFailure;

/// Marker file that enables collection. Optional content: export directory.
pub const ENABLE_MARKER: &str = "collect_untranslated.enabled";
/// Deprecated export directory override, read when the marker is empty.
pub const LEGACY_EXPORT_PATH: &str = "collect_untranslated.exportpath";
/// Name of the miss report inside the export directory.
pub const REPORT_FILE: &str = "untranslated.json";

/// Sink for lookups that found no translation.
pub trait MissReporter: Send + Sync {
    /// Records a miss. Must never block the caller for long or fail visibly.
    fn report_miss(&self, normalized_key: &str, original: &str);
}

/// Collects missing keys and rewrites the full report on each new key.
pub struct UntranslatedCollector {
    report_path: PathBuf,
    keys: scc::HashSet<String>,
    /// Serializes report rewrites.
    write_lock: Mutex<()>,
}

impl UntranslatedCollector {
    /// Activates the collector if the enable marker exists in `mod_dir`.
    ///
    /// Returns `None` when collection is disabled.
    pub fn from_marker<P: AsRef<Path>>(mod_dir: P) -> Option<Self> {
        let mod_dir = mod_dir.as_ref();
        let marker = mod_dir.join(ENABLE_MARKER);
        if !marker.is_file() {
            debug!("Missing-key collection disabled ({} not found)", marker.display());
            return None;
        }

        let export_dir = export_dir_override(mod_dir, &marker).unwrap_or_else(|| mod_dir.to_path_buf());
        let collector = Self::new(export_dir.join(REPORT_FILE));
        info!(
            "Missing-key collection enabled, writing to {}",
            collector.report_path.display()
        );
        Some(collector)
    }

    /// Creates a collector writing to `report_path`, continuing from any
    /// keys already stored there.
    pub fn new<P: Into<PathBuf>>(report_path: P) -> Self {
        let collector = Self {
            report_path: report_path.into(),
            keys: scc::HashSet::new(),
            write_lock: Mutex::new(()),
        };

        match read_report(&collector.report_path) {
            Ok(existing) => {
                let count = existing.len();
                for key in existing {
                    let _ = collector.keys.insert_sync(key);
                }
                if count > 0 {
                    info!("Continuing collection with {} existing keys", count);
                }
            }
            Err(e) => warn!(
                "Failed to read existing report {}: {}",
                collector.report_path.display(),
                e
            ),
        }
        collector
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Number of distinct keys collected, including ones loaded at startup.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Adds a key. Returns true when the key was new and the report was
    /// rewritten successfully.
    pub fn collect(&self, key: &str) -> Result<bool, ReportWriteFailure> {
        if key.is_empty() {
            return Ok(false);
        }
        if self.keys.insert_sync(key.to_string()).is_err() {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    /// Rewrites the report with every key collected so far.
    pub fn flush(&self) -> Result<(), ReportWriteFailure> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut snapshot = BTreeSet::new();
        self.keys.iter_sync(|key| {
            snapshot.insert(key.clone());
            true
        });
        write_report(&self.report_path, &snapshot)
    }

    /// Sorted snapshot of collected keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.keys.len());
        self.keys.iter_sync(|key| {
            keys.push(key.clone());
            true
        });
        keys.sort();
        keys
    }
}

impl MissReporter for UntranslatedCollector {
    fn report_miss(&self, normalized_key: &str, original: &str) {
        match self.collect(normalized_key) {
            Ok(true) => debug!("Collected untranslated key {:?} (from {:?})", normalized_key, original),
            Ok(false) => {}
            Err(e) => warn!("Failed to persist untranslated key {:?}: {}", normalized_key, e),
        }
    }
}

/// Resolves the export directory from the marker content, then from the
/// deprecated export path file.
fn export_dir_override(mod_dir: &Path, marker: &Path) -> Option<PathBuf> {
    let from_marker = first_line(marker);
    let (target, source) = match from_marker {
        Some(dir) => (dir, ENABLE_MARKER),
        None => (first_line(&mod_dir.join(LEGACY_EXPORT_PATH))?, LEGACY_EXPORT_PATH),
    };

    let dir = PathBuf::from(target);
    match fs::create_dir_all(&dir) {
        Ok(()) => {
            info!("Using export directory {} (from {})", dir.display(), source);
            Some(dir)
        }
        Err(e) => {
            warn!("Cannot use export directory {} from {}: {}", dir.display(), source, e);
            None
        }
    }
}

fn first_line(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Reads a miss report. A missing file is an empty set.
pub fn read_report<P: AsRef<Path>>(path: P) -> anyhow::Result<BTreeSet<String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let content = fs::read_to_string(path)?;
    let keys: BTreeSet<String> = serde_json::from_str(&content)?;
    Ok(keys)
}

/// Writes a miss report as a sorted, pretty-printed JSON array.
pub fn write_report<P: AsRef<Path>>(path: P, keys: &BTreeSet<String>) -> Result<(), ReportWriteFailure> {
    let path = path.as_ref();
    let io_err = |source| ReportWriteFailure::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(keys)?;
    fs::write(path, json).map_err(io_err)
}
