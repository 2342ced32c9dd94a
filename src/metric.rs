use std::time::{Duration, Instant};

use thiserror::Error;

use crate::payload::{AttributeValue, Attributes, MetricPayload, Resources};

const WHAT_ATTRIBUTE: &str = "what";
const METRIC_TYPE_ATTRIBUTE: &str = "metric_type";
const UNIT_ATTRIBUTE: &str = "unit";

/// Errors signalling timer misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    /// The timer was stopped without a measurement in progress.
    #[error("timer was stopped while not running")]
    NotRunning,
}

/// The per-variant discriminator carried in the `metric_type` attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MetricKind {
    Counter,
    Timer,
    Event,
}

impl MetricKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Timer => "timer",
            MetricKind::Event => "metric",
        }
    }
}

/// State shared by every metric variant: identity, value, and tags.
#[derive(Clone, Debug)]
pub(crate) struct MetricState {
    key: String,
    service: String,
    value: f64,
    attributes: Attributes,
    resources: Resources,
    tags: Vec<String>,
}

impl MetricState {
    pub(crate) fn new(key: impl Into<String>, service: impl Into<String>) -> Self {
        MetricState {
            key: key.into(),
            service: service.into(),
            value: 0.0,
            attributes: Attributes::new(),
            resources: Resources::new(),
            tags: Vec::new(),
        }
    }

    pub(crate) fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub(crate) fn extend_attributes(&mut self, attributes: Attributes) {
        self.attributes.extend(attributes);
    }

    pub(crate) fn extend_resources(&mut self, resources: Resources) {
        self.resources.extend(resources);
    }

    pub(crate) fn set_attribute_if_absent(&mut self, key: &str, value: AttributeValue) {
        self.attributes.entry(key.to_string()).or_insert(value);
    }

    /// Merges relay-level defaults into this metric. Entries already present
    /// on the metric win over defaults.
    pub(crate) fn merge_defaults(&mut self, attributes: &Attributes, resources: &Resources) {
        for (key, value) in attributes {
            self.attributes.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (key, value) in resources {
            self.resources.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Builds the wire payload for the current state.
    ///
    /// The `what` attribute is always the metric key; `metric_type` is filled
    /// from `kind` unless the caller set one explicitly.
    pub(crate) fn payload(&self, kind: MetricKind) -> MetricPayload {
        let mut attributes = self.attributes.clone();
        attributes
            .insert(WHAT_ATTRIBUTE.to_string(), AttributeValue::String(self.key.clone()));
        attributes
            .entry(METRIC_TYPE_ATTRIBUTE.to_string())
            .or_insert_with(|| AttributeValue::String(kind.as_str().to_string()));

        MetricPayload {
            key: self.service.clone(),
            value: self.value,
            attributes,
            resources: self.resources.clone(),
            tags: self.tags.clone(),
            record_type: "metric",
        }
    }
}

/// The contract shared by every metric variant.
///
/// `key` and `service` are fixed at construction; only the value (and, for
/// timers, the timing state) mutates afterwards.
pub trait Metric {
    /// Returns the metric name as reported upstream.
    fn key(&self) -> &str;

    /// Returns the owning service identifier.
    fn service(&self) -> &str;

    /// Returns the current value.
    fn value(&self) -> f64;

    /// Returns the metric's attributes.
    fn attributes(&self) -> &Attributes;

    /// Returns the metric's resource identifiers.
    fn resources(&self) -> &Resources;

    /// Builds the wire payload for the current state.
    ///
    /// A pure function of the metric's state; it neither mutates the metric
    /// nor touches any transport.
    fn payload(&self) -> MetricPayload;

    /// Builds the wire payload and hands it to `sender`.
    ///
    /// Decouples serialization from delivery, so metrics can be exercised
    /// without a real transport.
    fn flush<F>(&self, mut sender: F)
    where
        F: FnMut(MetricPayload),
        Self: Sized,
    {
        sender(self.payload());
    }
}

/// A metric holding an accumulating numeric value.
#[derive(Clone, Debug)]
pub struct Counter {
    state: MetricState,
}

impl Counter {
    /// Creates a counter with an initial value of 0.
    pub fn new(key: impl Into<String>, service: impl Into<String>) -> Self {
        Counter { state: MetricState::new(key, service) }
    }

    /// Creates a counter starting from `value`.
    pub fn with_value(key: impl Into<String>, service: impl Into<String>, value: f64) -> Self {
        let mut state = MetricState::new(key, service);
        state.set_value(value);
        Counter { state }
    }

    /// Adds the given attributes to the counter.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.state.extend_attributes(attributes);
        self
    }

    /// Adds the given resource identifiers to the counter.
    #[must_use]
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.state.extend_resources(resources);
        self
    }

    /// Increments the counter by 1.
    pub fn increment(&mut self) {
        self.increment_by(1.0);
    }

    /// Increments the counter by `delta`.
    ///
    /// Negative deltas decrement. Never fails for any finite delta.
    pub fn increment_by(&mut self, delta: f64) {
        self.state.value += delta;
    }

    pub(crate) fn merge_defaults(&mut self, attributes: &Attributes, resources: &Resources) {
        self.state.merge_defaults(attributes, resources);
    }
}

impl Metric for Counter {
    fn key(&self) -> &str {
        &self.state.key
    }

    fn service(&self) -> &str {
        &self.state.service
    }

    fn value(&self) -> f64 {
        self.state.value
    }

    fn attributes(&self) -> &Attributes {
        &self.state.attributes
    }

    fn resources(&self) -> &Resources {
        &self.state.resources
    }

    fn payload(&self) -> MetricPayload {
        self.state.payload(MetricKind::Counter)
    }
}

/// A metric measuring elapsed wall-clock duration, in seconds.
///
/// A timer is a small state machine: idle until [`start`](Timer::start),
/// running until [`stop`](Timer::stop), at which point the elapsed time
/// becomes its value. [`start_scoped`](Timer::start_scoped) ties the
/// measurement to a guard so the stop runs on every exit path, and
/// [`measure`](Timer::measure) wraps a closure the same way. Re-measuring
/// overwrites the previous value; there is no accumulation.
#[derive(Clone, Debug)]
pub struct Timer {
    state: MetricState,
    start: Option<Instant>,
}

impl Timer {
    /// Creates an idle timer with a value of 0.
    pub fn new(key: impl Into<String>, service: impl Into<String>) -> Self {
        let mut state = MetricState::new(key, service);
        state.set_attribute_if_absent(UNIT_ATTRIBUTE, AttributeValue::String("s".to_string()));
        Timer { state, start: None }
    }

    /// Adds the given attributes to the timer.
    ///
    /// A caller-provided `unit` attribute replaces the default `"s"`.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.state.extend_attributes(attributes);
        self
    }

    /// Adds the given resource identifiers to the timer.
    #[must_use]
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.state.extend_resources(resources);
        self
    }

    /// Starts a measurement.
    ///
    /// Starting an already-running timer restarts the measurement from now.
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
    }

    /// Stops the measurement, storing the elapsed time in seconds as the
    /// timer's value and returning the measured duration.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NotRunning`] if no measurement is in progress,
    /// which indicates a caller bug rather than a transport condition.
    pub fn stop(&mut self) -> Result<Duration, TimerError> {
        let start = self.start.take().ok_or(TimerError::NotRunning)?;
        let elapsed = start.elapsed();
        self.state.set_value(elapsed.as_secs_f64());
        Ok(elapsed)
    }

    /// Returns `true` while a measurement is in progress.
    pub fn is_running(&self) -> bool {
        self.start.is_some()
    }

    /// Starts a measurement scoped to the returned guard.
    ///
    /// The guard stops the timer when dropped, so the measurement completes
    /// on every exit path, including early returns and unwinding.
    pub fn start_scoped(&mut self) -> TimerGuard<'_> {
        self.start();
        TimerGuard { timer: self }
    }

    /// Runs `f` inside a scoped measurement and returns its result.
    pub fn measure<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _scope = self.start_scoped();
        f()
    }

    pub(crate) fn merge_defaults(&mut self, attributes: &Attributes, resources: &Resources) {
        self.state.merge_defaults(attributes, resources);
    }
}

impl Metric for Timer {
    fn key(&self) -> &str {
        &self.state.key
    }

    fn service(&self) -> &str {
        &self.state.service
    }

    fn value(&self) -> f64 {
        self.state.value
    }

    fn attributes(&self) -> &Attributes {
        &self.state.attributes
    }

    fn resources(&self) -> &Resources {
        &self.state.resources
    }

    fn payload(&self) -> MetricPayload {
        self.state.payload(MetricKind::Timer)
    }
}

/// Guard returned by [`Timer::start_scoped`]; stops the timer on drop.
pub struct TimerGuard<'a> {
    timer: &'a mut Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        // The guard started the timer, so the stop cannot signal misuse.
        let _ = self.timer.stop();
    }
}
