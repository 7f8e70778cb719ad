//! Target discovery.
//!
//! Locates text-producing call sites in the host's type registry. Host types
//! may materialize late, so discovery runs on background workers with a
//! bounded retry budget and hands every site it finds to a [`CallSiteSink`].

pub mod engine;
pub mod fallback;
pub mod query;
pub mod schedule;

use std::time::Duration;

use smallvec::SmallVec;
use tracing::debug;

use crate::config::AppConfig;
use crate::host::{CandidateCallSite, TypeInfo, TypeRegistry};
use crate::util::{contains_ignore_case, short_type_name};

pub use engine::{DiscoveryEngine, DiscoveryEvent, DiscoveryState, spawn_discovery};
pub use fallback::{FallbackOutcome, run_fallback};
pub use query::{MemberQuery, PRIMARY_RANKING};
pub use schedule::{ManualScheduler, Scheduler, ThreadScheduler};

/// Receives call sites as discovery finds them.
pub trait CallSiteSink: Send + Sync {
    /// Returns true when the site is bound, either now or earlier.
    fn offer(&self, site: CandidateCallSite) -> bool;
}

/// Names and timings driving discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    /// String-table types searched by the primary pass, in order.
    pub primary_types: Vec<String>,
    /// Assembly name fragments searched when global lookup fails.
    pub preferred_assemblies: Vec<String>,
    /// UI widget types searched for text setters.
    pub widget_types: Vec<String>,
    /// Types whose every setter overload is bound.
    pub overload_types: Vec<String>,
    pub max_attempts: u32,
    pub attempt_delay: Duration,
    /// 1-based attempt after which the first fallback round runs.
    pub early_fallback_attempt: u32,
    /// Delays of background fallback retries.
    pub background_retry_delays: Vec<Duration>,
}

impl DiscoveryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            primary_types: config.primary_types.clone(),
            preferred_assemblies: config.preferred_assemblies.clone(),
            widget_types: config.widget_types.clone(),
            overload_types: config.overload_types.clone(),
            max_attempts: config.max_attempts,
            attempt_delay: Duration::from_millis(config.attempt_delay_ms),
            early_fallback_attempt: config.early_fallback_attempt,
            background_retry_delays: config
                .background_retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Resolves a type by name, then by searching loaded assemblies.
///
/// With `preferred` set, only assemblies whose name contains one of the
/// fragments are searched, each with the full name, the short name and
/// `<assembly>.<short name>`. Without it every assembly is searched with the
/// full name. Types are never enumerated wholesale.
pub(crate) fn lookup_type<R: TypeRegistry + ?Sized>(
    registry: &R,
    name: &str,
    preferred: Option<&[String]>,
) -> Option<TypeInfo> {
    match registry.find_type(name) {
        Ok(Some(ty)) => return Some(ty),
        Ok(None) => {}
        Err(e) => debug!("Lookup of {} failed: {}", name, e),
    }

    let short = short_type_name(name);
    for assembly in registry.assemblies() {
        let variants: SmallVec<[String; 3]> = match preferred {
            Some(fragments) => {
                if !fragments.iter().any(|f| contains_ignore_case(&assembly, f)) {
                    continue;
                }
                let mut variants = SmallVec::new();
                for variant in [name.to_string(), short.to_string(), format!("{}.{}", assembly, short)] {
                    if !variants.contains(&variant) {
                        variants.push(variant);
                    }
                }
                variants
            }
            None => SmallVec::from_iter([name.to_string()]),
        };

        for variant in &variants {
            match registry.find_type_in(&assembly, variant) {
                Ok(Some(ty)) => {
                    debug!("Found {} in assembly {} as {}", name, assembly, ty.full_name);
                    return Some(ty);
                }
                Ok(None) => {}
                Err(e) => debug!("Lookup of {} in {} failed: {}", variant, assembly, e),
            }
        }
    }
    None
}

/// Ranked primary candidates from the first primary type that has any.
pub fn primary_candidates<R: TypeRegistry + ?Sized>(
    registry: &R,
    policy: &DiscoveryPolicy,
) -> Vec<CandidateCallSite> {
    for name in &policy.primary_types {
        let Some(ty) = lookup_type(registry, name, Some(&policy.preferred_assemblies)) else {
            continue;
        };
        let ranked = query::ranked_matches(&ty, &PRIMARY_RANKING);
        debug!(
            "{} has {} members, {} text candidates",
            ty.full_name,
            ty.members.len(),
            ranked.len()
        );
        if ranked.is_empty() {
            continue;
        }
        return ranked
            .into_iter()
            .map(|(member, q)| CandidateCallSite::new(ty.full_name.clone(), member.clone(), q.shape))
            .collect();
    }
    Vec::new()
}
