//! Interception layer.
//!
//! Turns discovered call sites into installed wrappers. Wrappers consult the
//! shared [`TranslationService`] and rewrite the returned value (postfix) or
//! the first argument (prefix). A wrapper never alters control flow: when
//! anything goes wrong the original value passes through.

use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, info, warn};

use crate::boundary::contain;
use crate::discovery::CallSiteSink;
use crate::error::{BindError, TranslationLookupFailure};
use crate::host::{CallShape, CallSiteKey, CandidateCallSite, Hook, HostValue, Patcher};
use crate::service::TranslationService;
use crate::util::unlikely;

/// Which side of the original call a binding runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookSide {
    Before,
    After,
}

/// A call site with an installed wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionBinding {
    pub site: CandidateCallSite,
    pub side: HookSide,
}

/// Binding progress of one call site.
#[derive(Debug, Clone)]
enum Slot {
    /// Claimed; the host is installing the wrapper.
    Pending,
    Installed(InterceptionBinding),
}

/// Installs wrappers and remembers which sites are bound.
pub struct Interceptor<P: Patcher + ?Sized> {
    patcher: Arc<P>,
    service: Arc<TranslationService>,
    slots: scc::HashMap<CallSiteKey, Slot>,
    /// Wakes binders waiting on a pending install.
    settled: (Mutex<()>, Condvar),
}

impl<P: Patcher + ?Sized> Interceptor<P> {
    pub fn new(patcher: Arc<P>, service: Arc<TranslationService>) -> Self {
        Self {
            patcher,
            service,
            slots: scc::HashMap::new(),
            settled: (Mutex::new(()), Condvar::new()),
        }
    }

    /// Binds a wrapper to `site`.
    ///
    /// Returns `Ok(None)` if the site is already bound. Safe to call from any
    /// thread; concurrent binds of the same site install exactly one wrapper.
    /// A bind racing a pending install waits for it, and claims the site
    /// itself if that install fails.
    pub fn bind(&self, site: &CandidateCallSite) -> Result<Option<InterceptionBinding>, BindError> {
        check_shape(site)?;

        let binding = InterceptionBinding {
            site: site.clone(),
            side: match site.shape {
                CallShape::RawCallback => HookSide::Before,
                CallShape::SingleString | CallShape::StringArray => HookSide::After,
            },
        };

        let key = site.key();
        if !self.claim(&key) {
            debug!("{} is already bound", site);
            return Ok(None);
        }

        let hook = hook_for(site.shape, self.service.clone());
        let installed = self.patcher.install(site, hook);
        match &installed {
            Ok(()) => {
                self.slots
                    .update_sync(&key, |_, slot| *slot = Slot::Installed(binding.clone()));
            }
            Err(_) => {
                self.slots.remove_sync(&key);
            }
        }
        self.notify_settled();

        if let Err(source) = installed {
            return Err(BindError::Install {
                site: site.to_string(),
                source,
            });
        }
        info!("Bound {:?} wrapper to {}", site.shape, site);
        Ok(Some(binding))
    }

    /// Claims `key` for installing. Returns false once the site is installed.
    fn claim(&self, key: &CallSiteKey) -> bool {
        let (lock, settled) = &self.settled;
        loop {
            if self.slots.insert_sync(key.clone(), Slot::Pending).is_ok() {
                return true;
            }
            let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                match self.slots.read_sync(key, |_, slot| matches!(slot, Slot::Installed(_))) {
                    Some(true) => return false,
                    // Install failed and the claim was released; try again.
                    None => break,
                    Some(false) => {
                        guard = settled.wait(guard).unwrap_or_else(|e| e.into_inner());
                    }
                }
            }
        }
    }

    fn notify_settled(&self) {
        let (lock, settled) = &self.settled;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        settled.notify_all();
    }

    /// True once a wrapper is installed on `site`.
    pub fn is_bound(&self, site: &CandidateCallSite) -> bool {
        self.slots
            .read_sync(&site.key(), |_, slot| matches!(slot, Slot::Installed(_)))
            .unwrap_or(false)
    }

    /// Number of installed wrappers.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.slots.iter_sync(|_, slot| {
            if matches!(slot, Slot::Installed(_)) {
                count += 1;
            }
            true
        });
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of installed bindings, ordered by site key.
    pub fn bindings(&self) -> Vec<InterceptionBinding> {
        let mut all = Vec::new();
        self.slots.iter_sync(|_, slot| {
            if let Slot::Installed(binding) = slot {
                all.push(binding.clone());
            }
            true
        });
        all.sort_by_key(|b| b.site.key());
        all
    }
}

impl<P: Patcher + ?Sized> CallSiteSink for Interceptor<P> {
    fn offer(&self, site: CandidateCallSite) -> bool {
        match self.bind(&site) {
            Ok(_) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }
}

fn check_shape(site: &CandidateCallSite) -> Result<(), BindError> {
    let member = &site.member;
    let fits = match site.shape {
        CallShape::SingleString => member.returns.is_string_like(),
        CallShape::StringArray => member.returns.is_string_array(),
        CallShape::RawCallback => member.first_param().is_some_and(|p| p.is_string_like()),
    };
    if fits {
        Ok(())
    } else {
        Err(BindError::ShapeMismatch {
            site: site.to_string(),
            shape: site.shape,
        })
    }
}

/// Builds the wrapper for a call shape. Every wrapper is its own failure
/// boundary.
pub fn hook_for(shape: CallShape, service: Arc<TranslationService>) -> Hook {
    match shape {
        CallShape::SingleString => Hook::Postfix(Arc::new(move |result: &mut HostValue| {
            let _ = contain("string postfix", || substitute_result(&service, result));
        })),
        CallShape::StringArray => Hook::Postfix(Arc::new(move |result: &mut HostValue| {
            let _ = contain("array postfix", || substitute_elements(&service, result));
        })),
        CallShape::RawCallback => Hook::Prefix(Arc::new(move |args: &mut [HostValue]| {
            let _ = contain("setter prefix", || substitute_first_argument(&service, args));
        })),
    }
}

/// Replaces a returned string with its translation.
pub fn substitute_result(service: &TranslationService, result: &mut HostValue) -> bool {
    let Some(original) = result.as_text() else {
        return false;
    };
    if unlikely(original.is_empty()) {
        return false;
    }
    match service.substitute(original) {
        Some(translated) => {
            *result = HostValue::Str(translated);
            true
        }
        None => false,
    }
}

/// Replaces every element of a returned string array independently.
/// Returns how many elements changed.
pub fn substitute_elements(service: &TranslationService, result: &mut HostValue) -> usize {
    let HostValue::StrArray(items) = result else {
        return 0;
    };
    let mut changed = 0;
    for item in items.iter_mut() {
        let Some(text) = item.as_deref() else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        if let Some(translated) = service.substitute(text) {
            *item = Some(translated);
            changed += 1;
        }
    }
    changed
}

/// Replaces the first argument of a setter call with its translation,
/// coercing wrapped host strings through their text rendering.
pub fn substitute_first_argument(service: &TranslationService, args: &mut [HostValue]) -> bool {
    let Some(first) = args.first_mut() else {
        return false;
    };
    let Some(original) = first.as_text() else {
        if !matches!(first, HostValue::Null) {
            debug!("{}", TranslationLookupFailure::NotText(first.type_name().to_string()));
        }
        return false;
    };
    if original.is_empty() {
        return false;
    }
    match service.substitute(original) {
        Some(translated) => {
            *first = HostValue::Str(translated);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::error::HostError;
    use crate::host::{MemberInfo, TypeRef};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> Arc<TranslationService> {
        Arc::new(TranslationService::without_reporter(Dictionary::from_pairs([
            ("Hello", "Привет"),
            ("Options", "Настройки"),
        ])))
    }

    #[derive(Default)]
    struct CountingPatcher {
        installs: AtomicUsize,
        hooks: Mutex<Vec<Hook>>,
        reject: bool,
    }

    impl Patcher for CountingPatcher {
        fn install(&self, site: &CandidateCallSite, hook: Hook) -> Result<(), HostError> {
            if self.reject {
                return Err(HostError::Patch {
                    site: site.to_string(),
                    reason: "read-only".to_string(),
                });
            }
            self.installs.fetch_add(1, Ordering::SeqCst);
            self.hooks.lock().unwrap().push(hook);
            Ok(())
        }
    }

    fn get_text_site() -> CandidateCallSite {
        CandidateCallSite::new(
            "Scriptable_String",
            MemberInfo::method(7, "GetText", &[TypeRef::Int], TypeRef::String),
            CallShape::SingleString,
        )
    }

    #[test]
    fn test_substitute_result() {
        let service = service();
        let mut value = HostValue::from("Hello");
        assert!(substitute_result(&service, &mut value));
        assert_eq!(value, HostValue::from("Привет"));

        let mut value = HostValue::from("Goodbye");
        assert!(!substitute_result(&service, &mut value));
        assert_eq!(value, HostValue::from("Goodbye"));

        let mut value = HostValue::Null;
        assert!(!substitute_result(&service, &mut value));
        assert_eq!(value, HostValue::Null);
    }

    #[test]
    fn test_substitute_elements_independently() {
        let service = service();
        let mut value = HostValue::StrArray(vec![
            Some("Hello".to_string()),
            Some("Goodbye".to_string()),
            None,
            Some(String::new()),
        ]);
        assert_eq!(substitute_elements(&service, &mut value), 1);
        assert_eq!(
            value,
            HostValue::StrArray(vec![
                Some("Привет".to_string()),
                Some("Goodbye".to_string()),
                None,
                Some(String::new()),
            ])
        );
    }

    #[test]
    fn test_substitute_first_argument_coerces_wrapped_strings() {
        let service = service();
        let mut args = vec![
            HostValue::Object {
                type_name: "Il2CppSystem.String".to_string(),
                text: Some("Options".to_string()),
            },
            HostValue::Int(1),
        ];
        assert!(substitute_first_argument(&service, &mut args));
        assert_eq!(args[0], HostValue::from("Настройки"));
        assert_eq!(args[1], HostValue::Int(1));

        let mut args = vec![HostValue::Int(5)];
        assert!(!substitute_first_argument(&service, &mut args));
        assert!(!substitute_first_argument(&service, &mut []));
    }

    #[test]
    fn test_bind_once_per_site() {
        let patcher = Arc::new(CountingPatcher::default());
        let interceptor = Interceptor::new(patcher.clone(), service());

        let first = interceptor.bind(&get_text_site()).expect("bind failed");
        assert_eq!(first.map(|b| b.side), Some(HookSide::After));
        assert!(interceptor.bind(&get_text_site()).expect("rebind failed").is_none());
        assert_eq!(patcher.installs.load(Ordering::SeqCst), 1);
        assert_eq!(interceptor.len(), 1);
    }

    #[test]
    fn test_bind_failure_releases_claim() {
        let patcher = Arc::new(CountingPatcher {
            reject: true,
            ..Default::default()
        });
        let interceptor = Interceptor::new(patcher, service());

        assert!(matches!(
            interceptor.bind(&get_text_site()),
            Err(BindError::Install { .. })
        ));
        assert!(!interceptor.is_bound(&get_text_site()));
        assert!(!interceptor.offer(get_text_site()));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let interceptor = Interceptor::new(Arc::new(CountingPatcher::default()), service());
        let site = CandidateCallSite::new(
            "Widget",
            MemberInfo::method(1, "SetColor", &[TypeRef::named("Color")], TypeRef::Void),
            CallShape::RawCallback,
        );
        assert!(matches!(
            interceptor.bind(&site),
            Err(BindError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_installed_hook_rewrites_value() {
        let patcher = Arc::new(CountingPatcher::default());
        let interceptor = Interceptor::new(patcher.clone(), service());
        interceptor.bind(&get_text_site()).expect("bind failed");

        let hooks = patcher.hooks.lock().unwrap();
        let Hook::Postfix(postfix) = &hooks[0] else {
            panic!("Expected postfix hook");
        };
        let mut value = HostValue::from("Hello");
        postfix(&mut value);
        assert_eq!(value, HostValue::from("Привет"));
    }

    /// Holds the first install open until released.
    struct GatedPatcher {
        entered: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
        calls: AtomicUsize,
        succeed: bool,
    }

    impl Patcher for GatedPatcher {
        fn install(&self, site: &CandidateCallSite, _hook: Hook) -> Result<(), HostError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = self.entered.send(());
                let _ = self.release.recv();
            }
            if self.succeed {
                Ok(())
            } else {
                Err(HostError::Patch {
                    site: site.to_string(),
                    reason: "read-only".to_string(),
                })
            }
        }
    }

    /// Starts a first offer that blocks inside install, then a racing offer.
    /// Returns both results once the first install is released.
    fn race_offers(succeed: bool) -> (bool, bool, Arc<Interceptor<GatedPatcher>>, Arc<GatedPatcher>) {
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let patcher = Arc::new(GatedPatcher {
            entered: entered_tx,
            release: release_rx,
            calls: AtomicUsize::new(0),
            succeed,
        });
        let interceptor = Arc::new(Interceptor::new(patcher.clone(), service()));

        let first = {
            let interceptor = interceptor.clone();
            std::thread::spawn(move || interceptor.offer(get_text_site()))
        };
        entered_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("first install did not start");

        let racer = {
            let interceptor = interceptor.clone();
            std::thread::spawn(move || interceptor.offer(get_text_site()))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!racer.is_finished(), "racing offer must wait for the pending install");
        assert!(!interceptor.is_bound(&get_text_site()));

        release_tx.send(()).expect("Failed to release install");
        let first = first.join().expect("first offer panicked");
        let racer = racer.join().expect("racing offer panicked");
        (first, racer, interceptor, patcher)
    }

    #[test]
    fn test_racing_offer_after_failed_install() {
        let (first, racer, interceptor, patcher) = race_offers(false);
        assert!(!first);
        assert!(!racer);
        assert!(!interceptor.is_bound(&get_text_site()));
        assert!(interceptor.is_empty());
        // The racer retried the install itself.
        assert_eq!(patcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_racing_offer_after_successful_install() {
        let (first, racer, interceptor, patcher) = race_offers(true);
        assert!(first);
        assert!(racer);
        assert!(interceptor.is_bound(&get_text_site()));
        assert_eq!(interceptor.len(), 1);
        assert_eq!(patcher.calls.load(Ordering::SeqCst), 1);
    }
}
