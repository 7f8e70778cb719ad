//! Periodic rescanner.
//!
//! Some widgets get their text without passing through any bound call site
//! (serialized scene text, direct field writes). Every `interval` frames the
//! rescanner walks the live text widgets and rewrites any whose text has a
//! translation. It runs on the frame thread only.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::boundary::contain;
use crate::error::HostError;
use crate::host::{ObjectHandle, SceneGraph};
use crate::service::TranslationService;
use crate::util::{contains_ignore_case, likely};

/// Counts from one rescanner pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Objects matching a scan pattern.
    pub examined: usize,
    /// Objects whose text was rewritten.
    pub translated: usize,
    /// Objects whose text could not be read or written.
    pub failed: usize,
}

pub struct Rescanner {
    service: Arc<TranslationService>,
    interval: u32,
    counter: u32,
    patterns: Vec<String>,
}

impl Rescanner {
    pub fn new(service: Arc<TranslationService>, interval: u32, patterns: Vec<String>) -> Self {
        Self {
            service,
            interval: interval.max(1),
            counter: 0,
            patterns,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Advances the frame counter. Runs a pass every `interval` frames and
    /// returns its report.
    pub fn tick<G: SceneGraph + ?Sized>(&mut self, scene: &G) -> Option<ScanReport> {
        self.counter += 1;
        if likely(self.counter < self.interval) {
            return None;
        }
        self.counter = 0;
        Some(self.scan(scene))
    }

    fn matches(&self, object: &ObjectHandle) -> bool {
        self.patterns
            .iter()
            .any(|p| contains_ignore_case(&object.type_name, p))
    }

    /// One pass over every live widget. A failing widget never stops the pass.
    pub fn scan<G: SceneGraph + ?Sized>(&self, scene: &G) -> ScanReport {
        let mut report = ScanReport::default();
        let objects = match scene.live_objects() {
            Ok(objects) => objects,
            Err(e) => {
                warn!("Rescan skipped: {}", e);
                return report;
            }
        };

        for object in objects.iter().filter(|o| self.matches(o)) {
            report.examined += 1;
            match contain("rescan object", || self.rescan_object(scene, object)) {
                Some(Ok(true)) => report.translated += 1,
                Some(Ok(false)) => {}
                Some(Err(e)) => {
                    debug!("Rescan of object {} ({}) failed: {}", object.id, object.type_name, e);
                    report.failed += 1;
                }
                None => report.failed += 1,
            }
        }

        if report.translated > 0 || report.failed > 0 {
            debug!(
                "Rescan: {} examined, {} translated, {} failed",
                report.examined, report.translated, report.failed
            );
        }
        report
    }

    fn rescan_object<G: SceneGraph + ?Sized>(
        &self,
        scene: &G,
        object: &ObjectHandle,
    ) -> Result<bool, HostError> {
        let Some(text) = scene.read_text(object)? else {
            return Ok(false);
        };
        if text.is_empty() {
            return Ok(false);
        }
        match self.service.substitute(&text) {
            Some(translated) => {
                scene.write_text(object, &translated)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
