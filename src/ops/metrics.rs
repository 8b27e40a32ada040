use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// pipeline layers as metric dimensions
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Layer {
    Capture,
    Recognition,
    Grid,
    Solver,
    Actions,
    Pathfinder,
    Ops,
}

/// what the alert callbacks are told
#[derive(Debug, Clone)]
pub struct Alert {
    pub layer: Layer,
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    ErrorRate,
    Latency,
    SuccessRate,
}

/// the observability surface the core reports into. the collector
/// below is the in-crate implementation; hosts may bring their own.
pub trait Observability: Send + Sync {
    fn record_operation(&self, layer: Layer, name: &str, duration: Duration, success: bool);
    fn increment_counter(&self, name: &str, value: f64);
    fn set_gauge(&self, name: &str, value: f64);
    fn record_histogram(&self, name: &str, value: f64);
}

/// sink that forgets everything, for hosts that do not care
#[derive(Debug, Default)]
pub struct NullObservability;

impl Observability for NullObservability {
    fn record_operation(&self, _: Layer, _: &str, _: Duration, _: bool) {}
    fn increment_counter(&self, _: &str, _: f64) {}
    fn set_gauge(&self, _: &str, _: f64) {}
    fn record_histogram(&self, _: &str, _: f64) {}
}

/// rolling per-layer health
#[derive(Debug, Clone, Default)]
pub struct LayerMetrics {
    pub operations: u64,
    pub failures: u64,
    pub average_latency: f64,
    pub peak_latency: f64,
}

impl LayerMetrics {
    pub fn success_rate(&self) -> f64 {
        match self.operations {
            0 => 1.0,
            n => 1.0 - self.failures as f64 / n as f64,
        }
    }
    pub fn error_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }

    fn update(&mut self, duration: Duration, success: bool) {
        self.operations += 1;
        if !success {
            self.failures += 1;
        }
        let secs = duration.as_secs_f64();
        // exponential moving average, smoothing 0.1
        self.average_latency = match self.operations {
            1 => secs,
            _ => 0.9 * self.average_latency + 0.1 * secs,
        };
        self.peak_latency = self.peak_latency.max(secs);
    }
}

type AlertCallback = Box<dyn Fn(&Alert) + Send + Sync>;

/// aggregates counters, gauges, histograms, and per-layer operation
/// stats, and samples alert thresholds at most every ten seconds.
/// everything sits behind one short lock; recording is cheap enough
/// that contention is not worth sharding.
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
    callbacks: Mutex<Vec<AlertCallback>>,
    error_rate_threshold: f64,
    latency_threshold: f64,
    success_rate_threshold: f64,
    alert_interval: Duration,
}

struct MetricsState {
    layers: HashMap<Layer, LayerMetrics>,
    counters: HashMap<String, f64>,
    gauges: HashMap<String, f64>,
    histograms: HashMap<String, Vec<f64>>,
    last_alert_scan: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(0.1, 1.0, 0.8, Duration::from_secs(10))
    }
}

impl MetricsCollector {
    pub fn new(
        error_rate_threshold: f64,
        latency_threshold: f64,
        success_rate_threshold: f64,
        alert_interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(MetricsState {
                layers: HashMap::new(),
                counters: HashMap::new(),
                gauges: HashMap::new(),
                histograms: HashMap::new(),
                last_alert_scan: Instant::now() - alert_interval,
            }),
            callbacks: Mutex::new(Vec::new()),
            error_rate_threshold,
            latency_threshold,
            success_rate_threshold,
            alert_interval,
        }
    }

    pub fn register_alert_callback(&self, callback: impl Fn(&Alert) + Send + Sync + 'static) {
        self.callbacks.lock().expect("callback lock").push(Box::new(callback));
    }

    pub fn layer(&self, layer: Layer) -> LayerMetrics {
        self.state
            .lock()
            .expect("metrics lock")
            .layers
            .get(&layer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn counter(&self, name: &str) -> f64 {
        self.state
            .lock()
            .expect("metrics lock")
            .counters
            .get(name)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.state.lock().expect("metrics lock").gauges.get(name).copied()
    }

    /// one line per layer for the shutdown summary
    pub fn summary(&self) -> Vec<(Layer, LayerMetrics)> {
        let state = self.state.lock().expect("metrics lock");
        let mut layers = state
            .layers
            .iter()
            .map(|(&l, m)| (l, m.clone()))
            .collect::<Vec<_>>();
        layers.sort_by_key(|(l, _)| format!("{:?}", l));
        layers
    }

    fn scan_alerts(&self, state: &mut MetricsState) {
        if state.last_alert_scan.elapsed() < self.alert_interval {
            return;
        }
        state.last_alert_scan = Instant::now();
        let mut alerts = Vec::new();
        for (&layer, metrics) in state.layers.iter() {
            if metrics.error_rate() > self.error_rate_threshold {
                alerts.push(Alert {
                    layer,
                    kind: AlertKind::ErrorRate,
                    value: metrics.error_rate(),
                    threshold: self.error_rate_threshold,
                });
            }
            if metrics.average_latency > self.latency_threshold {
                alerts.push(Alert {
                    layer,
                    kind: AlertKind::Latency,
                    value: metrics.average_latency,
                    threshold: self.latency_threshold,
                });
            }
            if metrics.operations > 0 && metrics.success_rate() < self.success_rate_threshold {
                alerts.push(Alert {
                    layer,
                    kind: AlertKind::SuccessRate,
                    value: metrics.success_rate(),
                    threshold: self.success_rate_threshold,
                });
            }
        }
        if alerts.is_empty() {
            return;
        }
        let callbacks = self.callbacks.lock().expect("callback lock");
        for alert in alerts.iter() {
            for callback in callbacks.iter() {
                callback(alert);
            }
        }
    }
}

impl Observability for MetricsCollector {
    fn record_operation(&self, layer: Layer, _name: &str, duration: Duration, success: bool) {
        let mut state = self.state.lock().expect("metrics lock");
        state.layers.entry(layer).or_default().update(duration, success);
        self.scan_alerts(&mut state);
    }

    fn increment_counter(&self, name: &str, value: f64) {
        let mut state = self.state.lock().expect("metrics lock");
        *state.counters.entry(name.into()).or_insert(0.0) += value;
    }

    fn set_gauge(&self, name: &str, value: f64) {
        let mut state = self.state.lock().expect("metrics lock");
        state.gauges.insert(name.into(), value);
    }

    fn record_histogram(&self, name: &str, value: f64) {
        let mut state = self.state.lock().expect("metrics lock");
        let series = state.histograms.entry(name.into()).or_default();
        series.push(value);
        // cap the series so a long session cannot grow without bound
        if series.len() > 10_000 {
            series.drain(..5_000);
        }
    }
}

/// shared handle the pipeline passes around
pub type Metrics = Arc<dyn Observability>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsCollector::default();
        metrics.increment_counter("ticks", 1.0);
        metrics.increment_counter("ticks", 2.0);
        assert!(metrics.counter("ticks") == 3.0);
        assert!(metrics.counter("absent") == 0.0);
    }

    #[test]
    fn layer_stats_track_failures() {
        let metrics = MetricsCollector::default();
        metrics.record_operation(Layer::Solver, "solve", Duration::from_millis(10), true);
        metrics.record_operation(Layer::Solver, "solve", Duration::from_millis(10), false);
        let layer = metrics.layer(Layer::Solver);
        assert!(layer.operations == 2);
        assert!(layer.failures == 1);
        assert!(layer.success_rate() == 0.5);
    }

    #[test]
    fn alerts_fire_on_error_rate() {
        let metrics = MetricsCollector::new(0.1, 10.0, 0.0, Duration::ZERO);
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        metrics.register_alert_callback(move |alert| {
            if alert.kind == AlertKind::ErrorRate {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        for _ in 0..5 {
            metrics.record_operation(Layer::Capture, "shot", Duration::from_millis(1), false);
        }
        assert!(fired.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn alert_scans_are_rate_limited() {
        let metrics = MetricsCollector::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        metrics.register_alert_callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..100 {
            metrics.record_operation(Layer::Capture, "shot", Duration::from_millis(1), false);
        }
        // one scan fires at most one alert per kind per layer
        assert!(fired.load(Ordering::SeqCst) <= 2);
    }
}
