//! Translation service shared by every invocation path.

use std::sync::Arc;

use crate::collector::MissReporter;
use crate::dictionary::Dictionary;
use crate::normalize::normalize;
use crate::util::unlikely;

/// Owns the dictionary and the optional miss reporter.
///
/// Built once at startup and handed out as `Arc<TranslationService>` to the
/// interceptor, its wrappers and the rescanner.
pub struct TranslationService {
    dictionary: Dictionary,
    reporter: Option<Arc<dyn MissReporter>>,
}

impl TranslationService {
    pub fn new(dictionary: Dictionary, reporter: Option<Arc<dyn MissReporter>>) -> Self {
        Self { dictionary, reporter }
    }

    /// Service that never reports misses.
    pub fn without_reporter(dictionary: Dictionary) -> Self {
        Self::new(dictionary, None)
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn is_reporting(&self) -> bool {
        self.reporter.is_some()
    }

    /// Looks `text` up, reporting a miss when it has no translation.
    ///
    /// Blank text is neither looked up nor reported. Text that already is a
    /// known translation is not reported either.
    pub fn translate(&self, text: &str) -> Option<&str> {
        let key = normalize(text);
        if unlikely(key.is_empty()) {
            return None;
        }
        if let Some(translated) = self.dictionary.lookup_normalized(&key) {
            return Some(translated);
        }
        if self.dictionary.is_translation(&key) {
            return None;
        }
        if let Some(reporter) = &self.reporter {
            reporter.report_miss(&key, text);
        }
        None
    }

    /// Replacement text for `text`, only when it differs from the input.
    pub fn substitute(&self, text: &str) -> Option<String> {
        match self.translate(text) {
            Some(translated) if !translated.is_empty() && translated != text => {
                Some(translated.to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        misses: Mutex<Vec<(String, String)>>,
    }

    impl MissReporter for RecordingReporter {
        fn report_miss(&self, normalized_key: &str, original: &str) {
            self.misses
                .lock()
                .unwrap()
                .push((normalized_key.to_string(), original.to_string()));
        }
    }

    fn service() -> (TranslationService, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let dictionary = Dictionary::from_pairs([("Hello", "Привет"), ("Same", "Same")]);
        (TranslationService::new(dictionary, Some(reporter.clone())), reporter)
    }

    #[test]
    fn test_translate_hit() {
        let (service, reporter) = service();
        assert_eq!(service.translate("Hello"), Some("Привет"));
        assert_eq!(service.translate(" Hello\n"), Some("Привет"));
        assert!(reporter.misses.lock().unwrap().is_empty());
    }

    #[test]
    fn test_translate_miss_reports_normalized_key() {
        let (service, reporter) = service();
        assert_eq!(service.translate("Good  bye"), None);
        assert_eq!(
            *reporter.misses.lock().unwrap(),
            vec![("Good bye".to_string(), "Good  bye".to_string())]
        );
    }

    #[test]
    fn test_blank_and_translated_text_not_reported() {
        let (service, reporter) = service();
        assert_eq!(service.translate("   "), None);
        assert_eq!(service.translate("Привет"), None);
        assert!(reporter.misses.lock().unwrap().is_empty());
    }

    #[test]
    fn test_substitute_only_when_different() {
        let (service, _) = service();
        assert_eq!(service.substitute("Hello"), Some("Привет".to_string()));
        assert_eq!(service.substitute("Same"), None);
        assert_eq!(service.substitute("Unknown"), None);
    }
}
