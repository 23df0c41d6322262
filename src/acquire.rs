//! Image acquisition pipeline.
//!
//! Walks the asset catalog in order and makes sure every descriptor ends the
//! run with a non-empty file in the [`AssetStore`]:
//!
//! ```text
//! exists?  ──yes──▶ exists
//!    │no
//! legacy variant (cover.png for cover.webp)?  ──converted──▶ saved
//!    │no / conversion failed
//! generate ─ok─▶ re-encode ─▶ write ─▶ saved ─▶ pace before the next one
//!    │failed
//!    ├─ attempts left ─▶ back off (rate limited: long, linear; else exponential) ─▶ generate
//!    └─ exhausted ─▶ placeholder ─▶ saved   (placeholder write failed ─▶ error)
//! ```
//!
//! The pipeline is strictly sequential: one descriptor finishes before the
//! next starts, and a run never writes the same filename twice at once.
//!
//! ## Explicit state
//!
//! [`RunState`] (status + attempt count per filename) is passed into
//! [`Acquirer::process`] and handed back at the end. Each generation attempt
//! produces an [`AttemptOutcome`]; [`RetryPolicy::decide`] maps it to a
//! [`Decision`]. Neither holds hidden state, so both are tested directly.
//!
//! ## Events
//!
//! Every status change, attempt, conversion, backoff and pacing pause is sent
//! as a [`PipelineEvent`] over an optional channel. The CLI prints them; the
//! server folds them into its status board. The pipeline never blocks on
//! observers, and a dropped receiver is ignored.
//!
//! ## Time
//!
//! All waiting goes through [`Clock`]. Production uses [`SystemClock`]; tests
//! use a clock that records requested sleeps and returns immediately.

use crate::assets::{AssetError, AssetStore};
use crate::config::{GuideConfig, RetryConfig};
use crate::generation::{ApiKey, FailureClass, GenerationError, ImageGenerator};
use crate::imaging::{CodecError, ImageCodec, PlaceholderError, render_placeholder};
use crate::types::{AssetDescriptor, AssetStatus};
use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("missing API key: set the {var} environment variable")]
    MissingCredential { var: String },
    #[error("failed to create generation client: {0}")]
    Client(#[from] GenerationError),
}

/// Why a single attempt failed.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("{0}")]
    Generation(#[from] GenerationError),
    #[error("re-encode failed: {0}")]
    Codec(#[from] CodecError),
    #[error("save failed: {0}")]
    Store(#[from] AssetError),
}

impl AttemptError {
    /// Only generator failures can be rate limits; a failed save is
    /// retried like any other transient error.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Generation(e) => e.class(),
            Self::Codec(_) | Self::Store(_) => FailureClass::Transient,
        }
    }
}

#[derive(Error, Debug)]
enum PlaceholderWriteError {
    #[error("{0}")]
    Render(#[from] PlaceholderError),
    #[error("{0}")]
    Codec(#[from] CodecError),
    #[error("{0}")]
    Store(#[from] AssetError),
}

// =============================================================================
// Retry policy
// =============================================================================

/// Result of one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Image generated, re-encoded and written; holds the stored bytes.
    Success(Vec<u8>),
    RateLimited { attempt: u32, error: String },
    TransientError { attempt: u32, error: String },
    /// The final allowed attempt failed.
    Exhausted { error: String },
}

/// What the pipeline does after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Done,
    Retry { delay: Duration },
    Placeholder,
}

/// Attempt budget and delay formulas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_base: Duration,
    pub rate_limit_step: Duration,
    pub backoff_base: Duration,
    pub inter_request: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            rate_limit_base: Duration::from_millis(config.rate_limit_base_ms),
            rate_limit_step: Duration::from_millis(config.rate_limit_step_ms),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            inter_request: config.inter_request_delay(),
        }
    }

    /// `base + attempt × step` (70 s, 80 s, 90 s… with defaults).
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.rate_limit_base + self.rate_limit_step.saturating_mul(attempt)
    }

    /// `base × 2^(attempt − 1)` (2 s, 4 s, 8 s… with defaults).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }

    /// Turn a failed attempt into its outcome.
    pub fn failure_outcome(&self, attempt: u32, error: &AttemptError) -> AttemptOutcome {
        let message = error.to_string();
        if attempt >= self.max_attempts {
            return AttemptOutcome::Exhausted { error: message };
        }
        match error.class() {
            FailureClass::RateLimited => AttemptOutcome::RateLimited {
                attempt,
                error: message,
            },
            FailureClass::Transient => AttemptOutcome::TransientError {
                attempt,
                error: message,
            },
        }
    }

    pub fn decide(&self, outcome: &AttemptOutcome) -> Decision {
        match outcome {
            AttemptOutcome::Success(_) => Decision::Done,
            AttemptOutcome::RateLimited { attempt, .. } => Decision::Retry {
                delay: self.rate_limit_delay(*attempt),
            },
            AttemptOutcome::TransientError { attempt, .. } => Decision::Retry {
                delay: self.backoff_delay(*attempt),
            },
            AttemptOutcome::Exhausted { .. } => Decision::Placeholder,
        }
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Source of elapsed time and the only way the pipeline waits.
pub trait Clock {
    /// Time since the run started.
    fn elapsed(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock; `sleep` blocks the calling thread.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// =============================================================================
// State and events
// =============================================================================

/// Per-run state: status and attempt count for every descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub statuses: BTreeMap<String, AssetStatus>,
    pub attempts: BTreeMap<String, u32>,
}

impl RunState {
    /// Fresh state with every descriptor `unknown` and zero attempts.
    pub fn new(descriptors: &[AssetDescriptor]) -> Self {
        let mut state = Self::default();
        for d in descriptors {
            state.statuses.insert(d.filename.clone(), AssetStatus::Unknown);
            state.attempts.insert(d.filename.clone(), 0);
        }
        state
    }

    pub fn status(&self, filename: &str) -> AssetStatus {
        self.statuses.get(filename).copied().unwrap_or_default()
    }

    pub fn attempts(&self, filename: &str) -> u32 {
        self.attempts.get(filename).copied().unwrap_or(0)
    }

    /// Filenames currently in `status`.
    pub fn with_status(&self, status: AssetStatus) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Something observable happened to one descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub elapsed: Duration,
    pub filename: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Status {
        from: AssetStatus,
        to: AssetStatus,
    },
    Attempt {
        number: u32,
        max: u32,
    },
    Converted {
        source: String,
    },
    ConversionFailed {
        source: String,
        reason: String,
    },
    Backoff {
        attempt: u32,
        class: FailureClass,
        delay: Duration,
        reason: String,
    },
    Paced {
        delay: Duration,
    },
    Placeholder {
        reason: String,
    },
    PlaceholderFailed {
        reason: String,
    },
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs the acquisition pipeline against a store, a codec and a clock.
pub struct Acquirer<'a, C, K> {
    descriptors: Vec<AssetDescriptor>,
    legacy_extensions: Vec<String>,
    policy: RetryPolicy,
    api_key_env: String,
    store: &'a AssetStore,
    codec: &'a C,
    clock: &'a K,
    events: Option<Sender<PipelineEvent>>,
}

impl<'a, C: ImageCodec, K: Clock> Acquirer<'a, C, K> {
    pub fn new(config: &GuideConfig, store: &'a AssetStore, codec: &'a C, clock: &'a K) -> Self {
        Self {
            descriptors: config.assets.clone(),
            legacy_extensions: config.images.legacy_extensions.clone(),
            policy: RetryPolicy::from_config(&config.retry),
            api_key_env: config.generation.api_key_env.clone(),
            store,
            codec,
            clock,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<Sender<PipelineEvent>>) -> Self {
        self.events = events;
        self
    }

    pub fn descriptors(&self) -> &[AssetDescriptor] {
        &self.descriptors
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Resolve the credential, build the generator and process the catalog.
    ///
    /// `lookup` reads environment variables; an unset or empty key fails
    /// before any descriptor is touched or any event is sent.
    pub fn run<G, L, F>(&self, force: bool, lookup: L, connect: F) -> Result<RunState, AcquireError>
    where
        G: ImageGenerator,
        L: Fn(&str) -> Option<String>,
        F: FnOnce(ApiKey) -> Result<G, GenerationError>,
    {
        let key = resolve_credential(&self.api_key_env, lookup)?;
        let generator = connect(key)?;
        let state = RunState::new(&self.descriptors);
        Ok(self.process(&generator, &self.descriptors, force, state))
    }

    /// Process `descriptors` in order, threading `state` through each one.
    pub fn process<G: ImageGenerator>(
        &self,
        generator: &G,
        descriptors: &[AssetDescriptor],
        force: bool,
        mut state: RunState,
    ) -> RunState {
        let count = descriptors.len();
        for (index, descriptor) in descriptors.iter().enumerate() {
            let is_last = index + 1 == count;
            self.acquire_one(generator, descriptor, force, is_last, &mut state);
        }
        state
    }

    fn acquire_one<G: ImageGenerator>(
        &self,
        generator: &G,
        descriptor: &AssetDescriptor,
        force: bool,
        is_last: bool,
        state: &mut RunState,
    ) {
        let filename = descriptor.filename.as_str();

        if !force {
            self.set_status(state, filename, AssetStatus::Checking);
            if self.store.exists(filename) {
                self.set_status(state, filename, AssetStatus::Exists);
                return;
            }
            if self.convert_legacy(descriptor, state) {
                return;
            }
        }

        let max = self.policy.max_attempts;
        loop {
            let attempt = state.attempts(filename) + 1;
            state.attempts.insert(filename.to_string(), attempt);
            self.set_status(state, filename, AssetStatus::Generating);
            self.emit(filename, EventKind::Attempt { number: attempt, max });

            let outcome = match self.attempt(generator, descriptor) {
                Ok(bytes) => AttemptOutcome::Success(bytes),
                Err(e) => self.policy.failure_outcome(attempt, &e),
            };

            match (self.policy.decide(&outcome), &outcome) {
                (Decision::Done, AttemptOutcome::Success(bytes)) => {
                    info!(filename, attempt, bytes = bytes.len(), "image saved");
                    self.set_status(state, filename, AssetStatus::Saved);
                    if !is_last {
                        let delay = self.policy.inter_request;
                        self.emit(filename, EventKind::Paced { delay });
                        self.clock.sleep(delay);
                    }
                    return;
                }
                (Decision::Retry { delay }, outcome) => {
                    let (class, reason) = match outcome {
                        AttemptOutcome::RateLimited { error, .. } => {
                            (FailureClass::RateLimited, error.clone())
                        }
                        AttemptOutcome::TransientError { error, .. } => {
                            (FailureClass::Transient, error.clone())
                        }
                        _ => (FailureClass::Transient, String::new()),
                    };
                    warn!(filename, attempt, %class, ?delay, %reason, "attempt failed, backing off");
                    self.emit(
                        filename,
                        EventKind::Backoff {
                            attempt,
                            class,
                            delay,
                            reason,
                        },
                    );
                    self.clock.sleep(delay);
                }
                (_, outcome) => {
                    let reason = match outcome {
                        AttemptOutcome::Exhausted { error } => error.clone(),
                        _ => "attempts exhausted".to_string(),
                    };
                    warn!(filename, attempts = attempt, %reason, "generation exhausted, writing placeholder");
                    self.write_placeholder(descriptor, reason, state);
                    return;
                }
            }
        }
    }

    /// Try each configured legacy extension in turn. True when one converted.
    fn convert_legacy(&self, descriptor: &AssetDescriptor, state: &mut RunState) -> bool {
        let filename = descriptor.filename.as_str();
        for ext in &self.legacy_extensions {
            let legacy = descriptor.with_extension(ext);
            if legacy == filename || !self.store.exists(&legacy) {
                continue;
            }
            let result = match (self.store.path(&legacy), self.store.path(filename)) {
                (Ok(source), Ok(target)) => self
                    .codec
                    .convert(&source, &target)
                    .map_err(|e| e.to_string()),
                (Err(e), _) | (_, Err(e)) => Err(e.to_string()),
            };
            match result {
                Ok(()) => {
                    self.emit(filename, EventKind::Converted { source: legacy });
                    self.set_status(state, filename, AssetStatus::Saved);
                    return true;
                }
                Err(reason) => {
                    warn!(filename, source = %legacy, %reason, "legacy conversion failed");
                    self.emit(
                        filename,
                        EventKind::ConversionFailed {
                            source: legacy,
                            reason,
                        },
                    );
                }
            }
        }
        false
    }

    /// One generation attempt: generate, re-encode for the target, write.
    fn attempt<G: ImageGenerator>(
        &self,
        generator: &G,
        descriptor: &AssetDescriptor,
    ) -> Result<Vec<u8>, AttemptError> {
        let image = generator.generate(&descriptor.prompt)?;
        let target = self.store.path(&descriptor.filename)?;
        let bytes = self.codec.encode_for(&image.bytes, &target)?;
        self.store.write(&descriptor.filename, &bytes)?;
        Ok(bytes)
    }

    fn write_placeholder(&self, descriptor: &AssetDescriptor, reason: String, state: &mut RunState) {
        let filename = descriptor.filename.as_str();
        match self.store_placeholder(filename) {
            Ok(()) => {
                self.emit(filename, EventKind::Placeholder { reason });
                self.set_status(state, filename, AssetStatus::Saved);
            }
            Err(e) => {
                warn!(filename, error = %e, "placeholder write failed");
                self.emit(
                    filename,
                    EventKind::PlaceholderFailed {
                        reason: e.to_string(),
                    },
                );
                self.set_status(state, filename, AssetStatus::Error);
            }
        }
    }

    fn store_placeholder(&self, filename: &str) -> Result<(), PlaceholderWriteError> {
        let png = render_placeholder(filename)?;
        let target = self.store.path(filename)?;
        let bytes = self.codec.encode_for(&png, &target)?;
        self.store.write(filename, &bytes)?;
        Ok(())
    }

    fn set_status(&self, state: &mut RunState, filename: &str, to: AssetStatus) {
        let from = state
            .statuses
            .insert(filename.to_string(), to)
            .unwrap_or_default();
        self.emit(filename, EventKind::Status { from, to });
    }

    fn emit(&self, filename: &str, kind: EventKind) {
        if let Some(tx) = &self.events {
            let _ = tx.send(PipelineEvent {
                elapsed: self.clock.elapsed(),
                filename: filename.to_string(),
                kind,
            });
        }
    }
}

/// Read the API key from `var`. Unset and empty are both missing.
pub fn resolve_credential<L>(var: &str, lookup: L) -> Result<ApiKey, AcquireError>
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => Ok(ApiKey::new(value.trim())),
        _ => Err(AcquireError::MissingCredential {
            var: var.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::codec::tests::MockCodec;
    use crate::imaging::is_placeholder;
    use crate::test_helpers::{RecordingClock, ScriptedGenerator, rate_limited, tiny_png, transient};
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn config_with(assets: Vec<AssetDescriptor>) -> GuideConfig {
        GuideConfig {
            assets,
            ..GuideConfig::default()
        }
    }

    fn two_assets() -> Vec<AssetDescriptor> {
        vec![
            AssetDescriptor::new("one.webp", "first prompt"),
            AssetDescriptor::new("two.webp", "second prompt"),
        ]
    }

    fn setup() -> (TempDir, AssetStore) {
        let tmp = TempDir::new().unwrap();
        let store = AssetStore::new(tmp.path().join("images"));
        (tmp, store)
    }

    fn collect(rx: mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        rx.try_iter().collect()
    }

    fn status_changes(events: &[PipelineEvent], filename: &str) -> Vec<AssetStatus> {
        events
            .iter()
            .filter(|e| e.filename == filename)
            .filter_map(|e| match e.kind {
                EventKind::Status { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    // =========================================================================
    // Retry policy
    // =========================================================================

    #[test]
    fn rate_limit_delays_grow_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_delay(1), Duration::from_secs(70));
        assert_eq!(policy.rate_limit_delay(2), Duration::from_secs(80));
        assert_eq!(policy.rate_limit_delay(3), Duration::from_secs(90));
    }

    #[test]
    fn transient_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::default();
        assert!(policy.backoff_delay(200) >= policy.backoff_delay(31));
    }

    #[test]
    fn decision_table() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(&AttemptOutcome::Success(vec![1])),
            Decision::Done
        );
        assert_eq!(
            policy.decide(&AttemptOutcome::RateLimited {
                attempt: 2,
                error: "429".into()
            }),
            Decision::Retry {
                delay: Duration::from_secs(80)
            }
        );
        assert_eq!(
            policy.decide(&AttemptOutcome::TransientError {
                attempt: 3,
                error: "boom".into()
            }),
            Decision::Retry {
                delay: Duration::from_secs(8)
            }
        );
        assert_eq!(
            policy.decide(&AttemptOutcome::Exhausted {
                error: "boom".into()
            }),
            Decision::Placeholder
        );
    }

    #[test]
    fn failure_on_last_attempt_is_exhausted() {
        let policy = RetryPolicy::default();
        let err = AttemptError::Generation(rate_limited());
        assert!(matches!(
            policy.failure_outcome(9, &err),
            AttemptOutcome::RateLimited { attempt: 9, .. }
        ));
        assert!(matches!(
            policy.failure_outcome(10, &err),
            AttemptOutcome::Exhausted { .. }
        ));
    }

    #[test]
    fn save_failures_are_transient() {
        let err = AttemptError::Store(AssetError::InvalidFilename("x".into()));
        assert_eq!(err.class(), FailureClass::Transient);
    }

    // =========================================================================
    // Credential
    // =========================================================================

    #[test]
    fn missing_credential_fails_before_any_event() {
        let (_tmp, store) = setup();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let config = config_with(two_assets());
        let (tx, rx) = mpsc::channel();
        let acquirer = Acquirer::new(&config, &store, &codec, &clock).with_events(Some(tx));

        let mut connected = false;
        let result = acquirer.run(false, |_| None, |_key| {
            connected = true;
            Ok(ScriptedGenerator::always_ok())
        });

        match result {
            Err(AcquireError::MissingCredential { var }) => assert_eq!(var, "GEMINI_API_KEY"),
            other => panic!("expected missing credential, got {other:?}"),
        }
        assert!(!connected);
        drop(acquirer);
        assert!(collect(rx).is_empty());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn empty_credential_is_missing() {
        assert!(matches!(
            resolve_credential("KEY", |_| Some("  ".to_string())),
            Err(AcquireError::MissingCredential { .. })
        ));
        let key = resolve_credential("KEY", |name| {
            assert_eq!(name, "KEY");
            Some("abc".to_string())
        })
        .unwrap();
        assert_eq!(key.expose(), "abc");
    }

    #[test]
    fn run_passes_key_to_connect() {
        let (_tmp, store) = setup();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer
            .run(false, |_| Some("k-123".to_string()), |key| {
                assert_eq!(key.expose(), "k-123");
                Ok(ScriptedGenerator::always_ok())
            })
            .unwrap();
        assert_eq!(state.status("one.webp"), AssetStatus::Saved);
    }

    // =========================================================================
    // Existence and legacy conversion
    // =========================================================================

    #[test]
    fn existing_asset_skips_generation() {
        let (_tmp, store) = setup();
        store.write("one.webp", b"already here").unwrap();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_ok();
        let config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer.process(&generator, &config.assets, false, RunState::new(&config.assets));

        assert_eq!(state.status("one.webp"), AssetStatus::Exists);
        assert_eq!(generator.call_count(), 0);
        assert_eq!(store.read("one.webp").unwrap(), b"already here");
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn empty_existing_file_is_regenerated() {
        let (_tmp, store) = setup();
        std::fs::create_dir_all(store.root()).unwrap();
        std::fs::write(store.root().join("one.webp"), b"").unwrap();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_ok();
        let config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer.process(&generator, &config.assets, false, RunState::new(&config.assets));

        assert_eq!(state.status("one.webp"), AssetStatus::Saved);
        assert_eq!(generator.call_count(), 1);
        assert!(store.exists("one.webp"));
    }

    #[test]
    fn legacy_asset_is_converted_without_generation() {
        let (_tmp, store) = setup();
        store.write("one.png", &tiny_png()).unwrap();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_ok();
        let config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        let (tx, rx) = mpsc::channel();
        let acquirer = Acquirer::new(&config, &store, &codec, &clock).with_events(Some(tx));

        let state = acquirer.process(&generator, &config.assets, false, RunState::new(&config.assets));

        assert_eq!(state.status("one.webp"), AssetStatus::Saved);
        assert_eq!(codec.convert_count(), 1);
        assert_eq!(generator.call_count(), 0);
        assert!(store.exists("one.webp"));
        drop(acquirer);
        let events = collect(rx);
        assert!(events.iter().any(|e| e.kind
            == EventKind::Converted {
                source: "one.png".into()
            }));
    }

    #[test]
    fn failed_conversion_falls_through_to_generation() {
        let (_tmp, store) = setup();
        store.write("one.png", b"legacy").unwrap();
        let codec = MockCodec::failing_convert();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_ok();
        let config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        let (tx, rx) = mpsc::channel();
        let acquirer = Acquirer::new(&config, &store, &codec, &clock).with_events(Some(tx));

        let state = acquirer.process(&generator, &config.assets, false, RunState::new(&config.assets));

        assert_eq!(state.status("one.webp"), AssetStatus::Saved);
        assert_eq!(generator.call_count(), 1);
        drop(acquirer);
        let events = collect(rx);
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::ConversionFailed { .. })));
    }

    #[test]
    fn force_skips_existence_and_legacy_checks() {
        let (_tmp, store) = setup();
        store.write("one.webp", b"old").unwrap();
        store.write("one.png", b"legacy").unwrap();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_ok();
        let config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer.process(&generator, &config.assets, true, RunState::new(&config.assets));

        assert_eq!(state.status("one.webp"), AssetStatus::Saved);
        assert_eq!(generator.call_count(), 1);
        assert_eq!(codec.convert_count(), 0);
        assert_ne!(store.read("one.webp").unwrap(), b"old");
    }

    // =========================================================================
    // Retry loop
    // =========================================================================

    #[test]
    fn two_item_scenario() {
        let (_tmp, store) = setup();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Ok(tiny_png()),
            Ok(tiny_png()),
        ]);
        let config = config_with(two_assets());
        let (tx, rx) = mpsc::channel();
        let acquirer = Acquirer::new(&config, &store, &codec, &clock).with_events(Some(tx));

        let state = acquirer.process(&generator, &config.assets, true, RunState::new(&config.assets));

        assert_eq!(
            status_changes(&collect(rx), "one.webp"),
            vec![
                AssetStatus::Generating,
                AssetStatus::Generating,
                AssetStatus::Generating,
                AssetStatus::Saved
            ]
        );
        assert_eq!(state.attempts("one.webp"), 3);
        assert_eq!(state.attempts("two.webp"), 1);
        assert_eq!(generator.prompts()[3], "second prompt");
        assert_eq!(state.status("two.webp"), AssetStatus::Saved);
        // two backoffs, one pacing pause after item 1, nothing after item 2
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(70),
                Duration::from_secs(80),
                Duration::from_secs(15),
            ]
        );
    }

    #[test]
    fn transient_failures_use_exponential_backoff() {
        let (_tmp, store) = setup();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator =
            ScriptedGenerator::new(vec![Err(transient()), Err(transient()), Ok(tiny_png())]);
        let config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer.process(&generator, &config.assets, true, RunState::new(&config.assets));

        assert_eq!(state.status("one.webp"), AssetStatus::Saved);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn exhaustion_writes_placeholder() {
        let (_tmp, store) = setup();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_failing(transient);
        let mut config = config_with(vec![AssetDescriptor::new("one.png", "p")]);
        config.retry.max_attempts = 3;
        let (tx, rx) = mpsc::channel();
        let acquirer = Acquirer::new(&config, &store, &codec, &clock).with_events(Some(tx));

        let state = acquirer.process(&generator, &config.assets, false, RunState::new(&config.assets));

        assert_eq!(state.status("one.png"), AssetStatus::Saved);
        assert_eq!(state.attempts("one.png"), 3);
        assert_eq!(generator.call_count(), 3);
        let bytes = store.read("one.png").unwrap();
        assert!(!bytes.is_empty());
        assert!(is_placeholder(&bytes));
        // backoff after attempts 1 and 2 only
        assert_eq!(clock.sleeps().len(), 2);
        drop(acquirer);
        assert!(collect(rx)
            .iter()
            .any(|e| matches!(e.kind, EventKind::Placeholder { .. })));
    }

    #[test]
    fn attempts_never_exceed_max() {
        let (_tmp, store) = setup();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_failing(rate_limited);
        let config = config_with(vec![AssetDescriptor::new("one.png", "p")]);
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer.process(&generator, &config.assets, true, RunState::new(&config.assets));

        assert_eq!(state.attempts("one.png"), 10);
        assert_eq!(generator.call_count(), 10);
        assert!(store.exists("one.png"));
    }

    #[test]
    fn placeholder_write_failure_marks_error() {
        let (_tmp, store) = setup();
        let codec = MockCodec::failing_encode();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_failing(transient);
        let mut config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        config.retry.max_attempts = 2;
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer.process(&generator, &config.assets, true, RunState::new(&config.assets));

        assert_eq!(state.status("one.webp"), AssetStatus::Error);
        assert!(!store.exists("one.webp"));
    }

    #[test]
    fn encode_failure_counts_as_failed_attempt() {
        let (_tmp, store) = setup();
        let codec = MockCodec::failing_encode();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::always_ok();
        let mut config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        config.retry.max_attempts = 2;
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer.process(&generator, &config.assets, true, RunState::new(&config.assets));

        assert_eq!(state.attempts("one.webp"), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn every_descriptor_ends_terminal_and_present() {
        let (_tmp, store) = setup();
        store.write("two.webp", b"present").unwrap();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::new(vec![Ok(tiny_png())]);
        let mut assets = two_assets();
        assets.push(AssetDescriptor::new("three.png", "third"));
        let mut config = config_with(assets);
        config.retry.max_attempts = 2;
        let acquirer = Acquirer::new(&config, &store, &codec, &clock);

        let state = acquirer.process(&generator, &config.assets, false, RunState::new(&config.assets));

        for d in &config.assets {
            assert!(state.status(&d.filename).is_terminal(), "{}", d.filename);
            assert!(store.exists(&d.filename), "{}", d.filename);
        }
        assert_eq!(state.with_status(AssetStatus::Exists), vec!["two.webp"]);
    }

    #[test]
    fn events_carry_clock_time() {
        let (_tmp, store) = setup();
        let codec = MockCodec::new();
        let clock = RecordingClock::new();
        let generator = ScriptedGenerator::new(vec![Err(transient()), Ok(tiny_png())]);
        let config = config_with(vec![AssetDescriptor::new("one.webp", "p")]);
        let (tx, rx) = mpsc::channel();
        let acquirer = Acquirer::new(&config, &store, &codec, &clock).with_events(Some(tx));

        acquirer.process(&generator, &config.assets, true, RunState::new(&config.assets));
        drop(acquirer);

        let events = collect(rx);
        let last = events.last().unwrap();
        assert_eq!(last.elapsed, Duration::from_secs(2));
        assert_eq!(
            last.kind,
            EventKind::Status {
                from: AssetStatus::Generating,
                to: AssetStatus::Saved
            }
        );
    }
}
