use std::collections::HashMap;

use crate::builder::MetricRelayBuilder;
use crate::forwarder::Forwarder;
use crate::metric::{Counter, Metric, MetricKind, MetricState, Timer};
use crate::payload::{Attributes, Resources};

/// Creates, stores, and sends metrics for one service.
///
/// The relay owns a named collection of counters and timers, hands out
/// get-or-create handles to them, and on [`flush`](MetricRelay::flush)
/// serializes every stored metric and passes it to the configured transport.
/// [`emit`](MetricRelay::emit) bypasses storage for one-off events.
///
/// All state is in memory; nothing survives the relay. The relay performs no
/// internal locking — concurrent use requires external synchronization.
pub struct MetricRelay {
    service: String,
    default_attributes: Attributes,
    default_resources: Resources,
    counters: HashMap<String, Counter>,
    timers: HashMap<String, Timer>,
    forwarder: Forwarder,
}

impl MetricRelay {
    /// Returns a builder for a relay owned by `service`.
    pub fn builder(service: impl Into<String>) -> MetricRelayBuilder {
        MetricRelayBuilder::new(service)
    }

    pub(crate) fn new(
        service: String,
        default_attributes: Attributes,
        default_resources: Resources,
        forwarder: Forwarder,
    ) -> Self {
        MetricRelay {
            service,
            default_attributes,
            default_resources,
            counters: HashMap::new(),
            timers: HashMap::new(),
            forwarder,
        }
    }

    /// Returns the owning service identifier.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Increments the counter stored under `name` by 1, creating it first if
    /// absent.
    pub fn incr(&mut self, name: &str) {
        self.incr_by(name, 1.0);
    }

    /// Increments the counter stored under `name` by `delta`, creating it
    /// first if absent. Creation never resets an existing counter.
    pub fn incr_by(&mut self, name: &str, delta: f64) {
        self.counter(name).increment_by(delta);
    }

    /// Returns the counter stored under `name`, creating one with the relay
    /// defaults if absent.
    pub fn counter(&mut self, name: &str) -> &mut Counter {
        self.counters.entry(name.to_string()).or_insert_with(|| {
            let mut counter = Counter::new(name, self.service.as_str());
            counter.merge_defaults(&self.default_attributes, &self.default_resources);
            counter
        })
    }

    /// Returns the timer stored under `name`, creating one with the relay
    /// defaults if absent. Intended to be used as a scoped region:
    ///
    /// ```no_run
    /// # let mut relay = ffwd_client::MetricRelay::builder("svc").build().unwrap();
    /// let _scope = relay.timer("request-latency").start_scoped();
    /// ```
    pub fn timer(&mut self, name: &str) -> &mut Timer {
        self.timers.entry(name.to_string()).or_insert_with(|| {
            let mut timer = Timer::new(name, self.service.as_str());
            timer.merge_defaults(&self.default_attributes, &self.default_resources);
            timer
        })
    }

    /// Stores `counter` under `name`, silently replacing any prior metric
    /// with that name. The relay defaults are merged in; the counter's own
    /// entries win on collision.
    pub fn set_counter(&mut self, name: impl Into<String>, mut counter: Counter) {
        counter.merge_defaults(&self.default_attributes, &self.default_resources);
        self.counters.insert(name.into(), counter);
    }

    /// Stores `timer` under `name`, with the same overwrite and merge
    /// semantics as [`set_counter`](MetricRelay::set_counter).
    pub fn set_timer(&mut self, name: impl Into<String>, mut timer: Timer) {
        timer.merge_defaults(&self.default_attributes, &self.default_resources);
        self.timers.insert(name.into(), timer);
    }

    /// Returns the counter stored under `name`, if any.
    pub fn get_counter(&self, name: &str) -> Option<&Counter> {
        self.counters.get(name)
    }

    /// Returns the timer stored under `name`, if any.
    pub fn get_timer(&self, name: &str) -> Option<&Timer> {
        self.timers.get(name)
    }

    /// Returns `true` iff `name` is a stored counter or timer.
    pub fn contains(&self, name: &str) -> bool {
        self.counters.contains_key(name) || self.timers.contains_key(name)
    }

    /// Sends a one-off metric immediately, bypassing stored state.
    pub fn emit(&self, key: &str, value: f64) {
        self.emit_with(key, value, Attributes::new(), Resources::new());
    }

    /// Sends a one-off metric with extra attributes and resources, merged
    /// over the relay defaults (the per-call entries win).
    pub fn emit_with(&self, key: &str, value: f64, attributes: Attributes, resources: Resources) {
        let mut state = MetricState::new(key, self.service.as_str());
        state.set_value(value);
        state.extend_attributes(attributes);
        state.extend_resources(resources);
        state.merge_defaults(&self.default_attributes, &self.default_resources);

        self.forwarder.send(&state.payload(MetricKind::Event));
    }

    /// Serializes every stored counter and timer and sends each through the
    /// transport.
    ///
    /// Stored metrics are not cleared: repeated flushes resend the last-known
    /// value of every metric until the caller resets or replaces it. Send
    /// failures are dropped at the transport boundary, so this always returns
    /// normally.
    pub fn flush(&self) {
        let mut payloads = Vec::with_capacity(self.counters.len() + self.timers.len());
        for counter in self.counters.values() {
            counter.flush(|payload| payloads.push(payload));
        }
        for timer in self.timers.values() {
            timer.flush(|payload| payloads.push(payload));
        }

        self.forwarder.send_batch(&payloads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::TimerError;
    use crate::payload::AttributeValue;

    fn test_relay() -> MetricRelay {
        // Datagram transport pointed at the default agent port; nothing needs
        // to be listening for state-level tests.
        MetricRelay::builder("test-service")
            .with_default_attribute("env", "test")
            .with_default_resource("pod", "gew1-abc")
            .build()
            .expect("build relay")
    }

    #[test]
    fn incr_creates_then_accumulates() {
        let mut relay = test_relay();
        assert!(!relay.contains("requests"));

        for _ in 0..4 {
            relay.incr("requests");
        }
        relay.incr_by("requests", 6.0);

        let counter = relay.get_counter("requests").expect("counter stored");
        assert_eq!(counter.value(), 10.0);
        assert!(relay.contains("requests"));
    }

    #[test]
    fn created_metrics_inherit_relay_defaults() {
        let mut relay = test_relay();
        relay.incr("requests");

        let counter = relay.get_counter("requests").expect("counter stored");
        assert_eq!(counter.attributes()["env"], AttributeValue::String("test".to_string()));
        assert_eq!(counter.resources()["pod"], "gew1-abc");
        assert_eq!(counter.service(), "test-service");
    }

    #[test]
    fn set_counter_overwrites_silently() {
        let mut relay = test_relay();
        relay.set_counter("requests", Counter::with_value("requests", "test-service", 5.0));
        relay.set_counter("requests", Counter::with_value("requests", "test-service", 2.0));

        let counter = relay.get_counter("requests").expect("counter stored");
        assert_eq!(counter.value(), 2.0);
    }

    #[test]
    fn set_counter_merges_defaults_without_clobbering() {
        let mut attributes = Attributes::new();
        attributes.insert("env".to_string(), "prod".into());

        let mut relay = test_relay();
        relay.set_counter(
            "requests",
            Counter::new("requests", "test-service").with_attributes(attributes),
        );

        let counter = relay.get_counter("requests").expect("counter stored");
        assert_eq!(counter.attributes()["env"], AttributeValue::String("prod".to_string()));
        assert_eq!(counter.resources()["pod"], "gew1-abc");
    }

    #[test]
    fn timer_handle_is_idempotent() {
        let mut relay = test_relay();
        relay.timer("latency").start();
        let elapsed = relay.timer("latency").stop();
        assert!(elapsed.is_ok());

        let recorded = relay.get_timer("latency").expect("timer stored").value();
        assert!(recorded >= 0.0);

        // A second handle must reach the same timer, not a fresh one.
        assert_eq!(relay.timer("latency").stop(), Err(TimerError::NotRunning));
        assert_eq!(relay.get_timer("latency").expect("timer stored").value(), recorded);
    }

    #[test]
    fn counters_and_timers_share_the_namespace_check() {
        let mut relay = test_relay();
        relay.incr("requests");
        relay.timer("latency");

        assert!(relay.contains("requests"));
        assert!(relay.contains("latency"));
        assert!(!relay.contains("never-referenced"));
    }

    #[test]
    fn emit_stores_nothing() {
        let relay = test_relay();
        relay.emit("deploy-finished", 1.0);
        assert!(!relay.contains("deploy-finished"));
    }
}
