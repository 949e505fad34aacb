//! Login event handler
//!
//! Drives one raw record through normalize, filter, classify, dedup and
//! format, then hands the alert body to the dispatcher. Every record ends in
//! exactly one [`Outcome`]; each drop path is logged with its reason tag.

use super::RdpClassifier;
use crate::alerts::{format_alert, AlertStyle};
use crate::collector::RecordHandler;
use crate::config::AppConfig;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::models::{is_available, AuditRecord, Classification, DropReason, Outcome, RawRecord};
use crate::normalizer::Normalizer;
use crate::notifier::AlertDispatcher;
use crate::state::{build_key, DedupCache};
use crate::utils::LogRateLimiter;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Target name for engine operational logs
const TARGET_ENGINE: &str = "engine";

const MALFORMED_LOG_WINDOW: Duration = Duration::from_secs(60);
const MALFORMED_LOG_KEY: &str = "malformed";

/// Monitored log and event code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFilter {
    pub log_name: String,
    pub event_id: u32,
}

impl TargetFilter {
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            log_name: cfg.log_name.clone(),
            event_id: cfg.event_id,
        }
    }

    /// Event code must match. The log name is compared case-insensitively
    /// when the source reported one.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        record.event_id == self.event_id
            && (!is_available(&record.log_name)
                || record.log_name.eq_ignore_ascii_case(&self.log_name))
    }
}

/// Snapshot of per-outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    pub received: u64,
    pub alerted: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub not_human: u64,
    pub not_remote: u64,
    pub duplicate: u64,
    pub fault: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    alerted: AtomicU64,
    malformed: AtomicU64,
    filtered: AtomicU64,
    not_human: AtomicU64,
    not_remote: AtomicU64,
    duplicate: AtomicU64,
    fault: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: Outcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Alerted => &self.alerted,
            Outcome::Dropped(DropReason::Malformed) => &self.malformed,
            Outcome::Dropped(DropReason::Filtered) => &self.filtered,
            Outcome::Dropped(DropReason::NotHuman) => &self.not_human,
            Outcome::Dropped(DropReason::NotRemote) => &self.not_remote,
            Outcome::Dropped(DropReason::Duplicate) => &self.duplicate,
            Outcome::Dropped(DropReason::Fault) => &self.fault,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HandlerStats {
        HandlerStats {
            received: self.received.load(Ordering::Relaxed),
            alerted: self.alerted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            not_human: self.not_human.load(Ordering::Relaxed),
            not_remote: self.not_remote.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            fault: self.fault.load(Ordering::Relaxed),
        }
    }
}

/// RDP login pipeline for a single record.
///
/// Safe to call from several tasks at once: the dedup cache is the only
/// shared mutable state and its check-then-insert is atomic.
pub struct LoginEventHandler {
    normalizer: Normalizer,
    classifier: RdpClassifier,
    filter: TargetFilter,
    cache: Arc<DedupCache>,
    dispatcher: AlertDispatcher,
    key_granularity_secs: u64,
    counters: Counters,
    malformed_log: Mutex<LogRateLimiter>,
}

impl LoginEventHandler {
    pub fn new(cfg: &AppConfig, cache: Arc<DedupCache>, dispatcher: AlertDispatcher) -> Self {
        Self {
            normalizer: Normalizer::new(&cfg.labels, cfg.monitor.event_id),
            classifier: RdpClassifier::new(
                &cfg.monitor.deny_users,
                cfg.monitor.deny_machine_accounts,
            ),
            filter: TargetFilter::from_config(&cfg.monitor),
            cache,
            dispatcher,
            key_granularity_secs: cfg.monitor.key_granularity_secs,
            counters: Counters::default(),
            malformed_log: Mutex::new(LogRateLimiter::new(MALFORMED_LOG_WINDOW)),
        }
    }

    /// Run one record through the pipeline. A panic is confined to this
    /// record and reported as [`DropReason::Fault`].
    pub fn handle(&self, raw: &RawRecord) -> Outcome {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.process(raw))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                error!(
                    target: TARGET_ENGINE,
                    reason = DropReason::Fault.as_str(),
                    panic = %panic_message(payload.as_ref()),
                    "Event pipeline panicked, record dropped"
                );
                Outcome::Dropped(DropReason::Fault)
            }
        };
        self.counters.record(outcome);
        outcome
    }

    pub fn stats(&self) -> HandlerStats {
        self.counters.snapshot()
    }

    fn process(&self, raw: &RawRecord) -> Outcome {
        let record = match self.normalizer.normalize(raw, self.cache.now()) {
            Ok(record) => record,
            Err(err) => {
                self.log_malformed(&err);
                return Outcome::Dropped(DropReason::Malformed);
            }
        };

        if !self.filter.matches(&record) {
            trace!(
                target: TARGET_ENGINE,
                reason = DropReason::Filtered.as_str(),
                event_id = record.event_id,
                log_name = %record.log_name,
                "Event dropped"
            );
            return Outcome::Dropped(DropReason::Filtered);
        }

        let classification = self.classifier.classify(&record);
        if tracing::enabled!(target: TARGET_ENGINE, tracing::Level::TRACE) {
            trace!(
                target: TARGET_ENGINE,
                classification = ?classification,
                signals = ?self.classifier.evaluate(&record),
                details = %format_alert(&record, AlertStyle::Debug),
                "Event classified"
            );
        }

        let reason = match classification {
            Classification::RemoteLogin => None,
            Classification::NotAHumanLogin => Some(DropReason::NotHuman),
            Classification::HumanButNotRemote => Some(DropReason::NotRemote),
        };
        if let Some(reason) = reason {
            debug!(
                target: TARGET_ENGINE,
                reason = reason.as_str(),
                user = %record.target_user,
                logon_type = %record.logon_type,
                "Event dropped"
            );
            return Outcome::Dropped(reason);
        }

        let key = build_key(&record, self.key_granularity_secs);
        if !self.cache.check_and_remember(&key) {
            debug!(
                target: TARGET_ENGINE,
                reason = DropReason::Duplicate.as_str(),
                key = %key,
                "Event dropped"
            );
            return Outcome::Dropped(DropReason::Duplicate);
        }

        info!(
            target: TARGET_ENGINE,
            key = %key,
            summary = %format_alert(&record, AlertStyle::Console),
            "RDP login detected"
        );

        // Sent outside the cache lock; the key stays remembered even if
        // delivery fails.
        self.dispatcher
            .dispatch(format_alert(&record, AlertStyle::Notification));
        Outcome::Alerted
    }

    fn log_malformed(&self, err: &MonitorError) {
        let decision = self
            .malformed_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_emit(MALFORMED_LOG_KEY);
        if decision.should_emit {
            warn!(
                target: TARGET_ENGINE,
                reason = DropReason::Malformed.as_str(),
                suppressed = decision.suppressed_since_last_emit,
                error = %err,
                "Event dropped"
            );
        }
    }
}

impl RecordHandler for LoginEventHandler {
    /// Decode one NDJSON line and run it through the pipeline.
    fn handle_line(&self, line: &str) -> Outcome {
        match serde_json::from_str::<RawRecord>(line) {
            Ok(raw) => self.handle(&raw),
            Err(err) => {
                self.log_malformed(&MonitorError::malformed(format!("invalid JSON: {err}")));
                let outcome = Outcome::Dropped(DropReason::Malformed);
                self.counters.record(outcome);
                outcome
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
