//! Lifecycle shell.
//!
//! The host calls [`TextSwap::initialize`] once and [`TextSwap::on_update`]
//! once per frame. Both are failure boundaries: whatever happens inside, the
//! host keeps running with text passing through untranslated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, unbounded};
use tracing::{info, warn};

use crate::boundary::contain;
use crate::collector::{MissReporter, UntranslatedCollector};
use crate::config::{AppConfig, CONFIG_FILE};
use crate::dictionary::Dictionary;
use crate::discovery::{DiscoveryEvent, DiscoveryPolicy, DiscoveryState, Scheduler, spawn_discovery};
use crate::error::DiscoveryFailure;
use crate::host::Host;
use crate::intercept::Interceptor;
use crate::logging;
use crate::rescan::{Rescanner, ScanReport};
use crate::service::TranslationService;

pub struct TextSwap<H: Host> {
    host: Arc<H>,
    config: AppConfig,
    service: Arc<TranslationService>,
    interceptor: Arc<Interceptor<H>>,
    collector: Option<Arc<UntranslatedCollector>>,
    rescanner: Rescanner,
    events: Receiver<DiscoveryEvent>,
    state: DiscoveryState,
    fallback_bound: usize,
    failure: Option<DiscoveryFailure>,
}

impl<H: Host> TextSwap<H> {
    /// Loads configuration, dictionary and reporter from `mod_dir` and starts
    /// discovery on `scheduler`. Returns `None` only if startup panicked.
    pub fn initialize(host: Arc<H>, mod_dir: &Path, scheduler: Arc<dyn Scheduler>) -> Option<Self> {
        contain("initialize", || Self::start(host, mod_dir, scheduler))
    }

    fn start(host: Arc<H>, mod_dir: &Path, scheduler: Arc<dyn Scheduler>) -> Self {
        let config_path = mod_dir.join(CONFIG_FILE);
        let loaded = AppConfig::load_or_create(&config_path);
        let config = match &loaded {
            Ok(config) => config.clone(),
            Err(_) => AppConfig::default(),
        };

        logging::init(&config.log_filter);
        if let Err(e) = loaded {
            warn!("Failed to load {}: {}; using defaults", config_path.display(), e);
        }
        info!("textswap {} starting in {}", env!("CARGO_PKG_VERSION"), mod_dir.display());

        let dictionary = Dictionary::load_or_empty(resolve(mod_dir, &config.translation_file));
        let collector = UntranslatedCollector::from_marker(mod_dir).map(Arc::new);
        let reporter = collector.clone().map(|c| c as Arc<dyn MissReporter>);
        let service = Arc::new(TranslationService::new(dictionary, reporter));

        let interceptor = Arc::new(Interceptor::new(host.clone(), service.clone()));
        let rescanner = Rescanner::new(
            service.clone(),
            config.scan_interval_frames,
            config.scan_type_patterns.clone(),
        );

        let (tx, events) = unbounded();
        spawn_discovery(
            host.clone(),
            interceptor.clone(),
            DiscoveryPolicy::from_config(&config),
            scheduler,
            Some(tx),
        );

        Self {
            host,
            config,
            service,
            interceptor,
            collector,
            rescanner,
            events,
            state: DiscoveryState::Searching { attempt: 1 },
            fallback_bound: 0,
            failure: None,
        }
    }

    /// Per-frame hook. Returns the rescanner report on frames that scanned.
    pub fn on_update(&mut self) -> Option<ScanReport> {
        contain("on_update", || {
            self.drain_events();
            self.rescanner.tick(self.host.as_ref())
        })
        .flatten()
    }

    fn drain_events(&mut self) {
        for event in self.events.try_iter() {
            match event {
                DiscoveryEvent::Transition(state) => self.state = state,
                DiscoveryEvent::FallbackBound { count } => self.fallback_bound += count,
                DiscoveryEvent::GaveUp(failure) => self.failure = Some(failure),
            }
        }
    }

    /// Last discovery state reported to the frame thread.
    pub fn discovery_state(&self) -> &DiscoveryState {
        &self.state
    }

    /// Setters bound by fallback rounds so far.
    pub fn fallback_bound(&self) -> usize {
        self.fallback_bound
    }

    pub fn discovery_failure(&self) -> Option<&DiscoveryFailure> {
        self.failure.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<TranslationService> {
        &self.service
    }

    pub fn interceptor(&self) -> &Interceptor<H> {
        &self.interceptor
    }

    pub fn collector(&self) -> Option<&UntranslatedCollector> {
        self.collector.as_deref()
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }
}

fn resolve(mod_dir: &Path, file: &str) -> PathBuf {
    let path = PathBuf::from(file);
    if path.is_absolute() {
        path
    } else {
        mod_dir.join(path)
    }
}
