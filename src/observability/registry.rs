//! Metrics registry and instrument types.
//!
//! Counters and histograms keep one series per label-value combination in a
//! `DashMap`. Every update runs under that shard's entry lock, so a scrape
//! never sees half of an observation. Gauges carry no labels and store an
//! `f64` bit pattern in an `AtomicU64`.
//!
//! Label values are stored in declaration order regardless of the order the
//! caller passes them in, and series are rendered sorted by those values so
//! the exposition output is deterministic.

use dashmap::DashMap;
use std::fmt::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors raised by the registry and its instruments.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("metric `{0}` is already registered")]
    DuplicateName(String),

    #[error("metric `{metric}` expects labels [{expected}], got [{got}]")]
    InvalidLabels {
        metric: String,
        expected: String,
        got: String,
    },

    #[error("metric `{metric}` rejected value {value}")]
    InvalidValue { metric: String, value: f64 },

    #[error("metric `{0}` has invalid bucket boundaries")]
    InvalidBuckets(String),

    #[error("failed to render metrics: {0}")]
    Render(#[from] fmt::Error),
}

/// Anything the registry can render.
pub trait Collector: Send + Sync {
    /// Metric family names this collector emits.
    fn names(&self) -> Vec<&str>;

    /// Append the exposition text for every family to `out`.
    fn render(&self, out: &mut String) -> fmt::Result;

    /// Drop accumulated values.
    fn reset(&self) {}
}

/// Name, help text and declared label names of an instrument.
#[derive(Debug, Clone)]
struct Desc {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl Desc {
    fn new(name: &str, help: &str, label_names: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Resolve caller labels into values ordered like `label_names`.
    fn series_key(&self, labels: &[(&str, &str)]) -> Result<Vec<String>, MetricsError> {
        let mismatch = || MetricsError::InvalidLabels {
            metric: self.name.clone(),
            expected: self.label_names.join(","),
            got: labels
                .iter()
                .map(|(k, _)| *k)
                .collect::<Vec<_>>()
                .join(","),
        };

        if labels.len() != self.label_names.len() {
            return Err(mismatch());
        }

        self.label_names
            .iter()
            .map(|name| {
                labels
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.to_string())
                    .ok_or_else(mismatch)
            })
            .collect()
    }

    fn write_header(&self, out: &mut String, kind: &str) -> fmt::Result {
        writeln!(out, "# HELP {} {}", self.name, escape_help(&self.help))?;
        writeln!(out, "# TYPE {} {}", self.name, kind)
    }

    fn pairs<'a>(&'a self, values: &'a [String]) -> Vec<(&'a str, &'a str)> {
        self.label_names
            .iter()
            .map(String::as_str)
            .zip(values.iter().map(String::as_str))
            .collect()
    }
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Shortest textual form of a sample value (`1`, `0.25`, `+Inf`).
pub(crate) fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

fn write_sample(out: &mut String, name: &str, pairs: &[(&str, &str)], value: f64) -> fmt::Result {
    out.write_str(name)?;
    if !pairs.is_empty() {
        out.write_char('{')?;
        for (i, (k, v)) in pairs.iter().enumerate() {
            if i > 0 {
                out.write_char(',')?;
            }
            write!(out, "{}=\"{}\"", k, escape_label(v))?;
        }
        out.write_char('}')?;
    }
    writeln!(out, " {}", format_value(value))
}

/// Write a single label-less sample with its HELP and TYPE lines.
pub(crate) fn write_family(
    out: &mut String,
    name: &str,
    help: &str,
    kind: &str,
    value: f64,
) -> fmt::Result {
    Desc::new(name, help, &[]).write_header(out, kind)?;
    write_sample(out, name, &[], value)
}

// ---------------------------------------------------------------------------
// Counter
// ---------------------------------------------------------------------------

/// Monotonic counter with optional labels.
#[derive(Clone)]
pub struct Counter {
    inner: Arc<CounterCore>,
}

struct CounterCore {
    desc: Desc,
    series: DashMap<Vec<String>, f64>,
}

impl Counter {
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> Self {
        Self {
            inner: Arc::new(CounterCore {
                desc: Desc::new(name, help, label_names),
                series: DashMap::new(),
            }),
        }
    }

    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        self.inc_by(labels, 1.0)
    }

    /// Increment by `amount`, which must be finite and non-negative.
    pub fn inc_by(&self, labels: &[(&str, &str)], amount: f64) -> Result<(), MetricsError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(MetricsError::InvalidValue {
                metric: self.inner.desc.name.clone(),
                value: amount,
            });
        }
        let key = self.inner.desc.series_key(labels)?;
        *self.inner.series.entry(key).or_insert(0.0) += amount;
        Ok(())
    }

    /// Current value for a label set; untouched series read as 0.
    pub fn get(&self, labels: &[(&str, &str)]) -> Result<f64, MetricsError> {
        let key = self.inner.desc.series_key(labels)?;
        Ok(self.inner.series.get(&key).map(|v| *v).unwrap_or(0.0))
    }
}

impl Collector for Counter {
    fn names(&self) -> Vec<&str> {
        vec![self.inner.desc.name.as_str()]
    }

    fn render(&self, out: &mut String) -> fmt::Result {
        let desc = &self.inner.desc;
        desc.write_header(out, "counter")?;

        let mut series: Vec<(Vec<String>, f64)> = self
            .inner
            .series
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));

        if series.is_empty() && desc.label_names.is_empty() {
            return write_sample(out, &desc.name, &[], 0.0);
        }
        for (values, value) in &series {
            write_sample(out, &desc.name, &desc.pairs(values), *value)?;
        }
        Ok(())
    }

    fn reset(&self) {
        self.inner.series.clear();
    }
}

// ---------------------------------------------------------------------------
// Gauge
// ---------------------------------------------------------------------------

/// Label-less gauge holding an arbitrary `f64`.
#[derive(Clone)]
pub struct Gauge {
    inner: Arc<GaugeCore>,
}

struct GaugeCore {
    desc: Desc,
    bits: AtomicU64,
    live: bool,
}

impl Gauge {
    pub fn new(name: &str, help: &str) -> Self {
        Self::build(name, help, false)
    }

    /// A gauge that mirrors live process state (in-flight work, a current
    /// mode). [`Collector::reset`] leaves its value alone.
    pub fn live(name: &str, help: &str) -> Self {
        Self::build(name, help, true)
    }

    fn build(name: &str, help: &str, live: bool) -> Self {
        Self {
            inner: Arc::new(GaugeCore {
                desc: Desc::new(name, help, &[]),
                bits: AtomicU64::new(0f64.to_bits()),
                live,
            }),
        }
    }

    pub fn set(&self, v: f64) {
        self.inner.bits.store(v.to_bits(), Ordering::SeqCst);
    }

    pub fn add(&self, delta: f64) {
        // The closure never returns None, so the update cannot fail.
        let _ = self
            .inner
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            });
    }

    pub fn sub(&self, delta: f64) {
        self.add(-delta);
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    pub fn dec(&self) {
        self.add(-1.0);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.inner.bits.load(Ordering::SeqCst))
    }
}

impl Collector for Gauge {
    fn names(&self) -> Vec<&str> {
        vec![self.inner.desc.name.as_str()]
    }

    fn render(&self, out: &mut String) -> fmt::Result {
        let desc = &self.inner.desc;
        desc.write_header(out, "gauge")?;
        write_sample(out, &desc.name, &[], self.get())
    }

    fn reset(&self) {
        if !self.inner.live {
            self.set(0.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// Point-in-time copy of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper bound, cumulative count)` per configured boundary.
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

struct HistogramSeries {
    cumulative: Vec<u64>,
    sum: f64,
    count: u64,
}

/// Histogram with fixed, ascending bucket boundaries.
#[derive(Clone)]
pub struct Histogram {
    inner: Arc<HistogramCore>,
}

struct HistogramCore {
    desc: Desc,
    bounds: Vec<f64>,
    series: DashMap<Vec<String>, HistogramSeries>,
}

impl Histogram {
    /// Bucket boundaries must be non-empty, finite and strictly ascending.
    pub fn new(
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<Self, MetricsError> {
        let ascending = buckets.windows(2).all(|w| w[0] < w[1]);
        if buckets.is_empty() || !ascending || buckets.iter().any(|b| !b.is_finite()) {
            return Err(MetricsError::InvalidBuckets(name.to_string()));
        }

        Ok(Self {
            inner: Arc::new(HistogramCore {
                desc: Desc::new(name, help, label_names),
                bounds: buckets.to_vec(),
                series: DashMap::new(),
            }),
        })
    }

    /// Record one observation. `value` must be finite and non-negative.
    pub fn observe(&self, labels: &[(&str, &str)], value: f64) -> Result<(), MetricsError> {
        if !value.is_finite() || value < 0.0 {
            return Err(MetricsError::InvalidValue {
                metric: self.inner.desc.name.clone(),
                value,
            });
        }
        let key = self.inner.desc.series_key(labels)?;
        let bounds = &self.inner.bounds;

        let mut series = self.inner.series.entry(key).or_insert_with(|| HistogramSeries {
            cumulative: vec![0; bounds.len()],
            sum: 0.0,
            count: 0,
        });
        for (slot, bound) in series.cumulative.iter_mut().zip(bounds) {
            if value <= *bound {
                *slot += 1;
            }
        }
        series.sum += value;
        series.count += 1;
        Ok(())
    }

    /// Snapshot of one series, or `None` if it was never observed.
    pub fn snapshot(
        &self,
        labels: &[(&str, &str)],
    ) -> Result<Option<HistogramSnapshot>, MetricsError> {
        let key = self.inner.desc.series_key(labels)?;
        Ok(self.inner.series.get(&key).map(|s| HistogramSnapshot {
            buckets: self
                .inner
                .bounds
                .iter()
                .copied()
                .zip(s.cumulative.iter().copied())
                .collect(),
            sum: s.sum,
            count: s.count,
        }))
    }
}

impl Collector for Histogram {
    fn names(&self) -> Vec<&str> {
        vec![self.inner.desc.name.as_str()]
    }

    fn render(&self, out: &mut String) -> fmt::Result {
        let desc = &self.inner.desc;
        desc.write_header(out, "histogram")?;

        let mut series: Vec<(Vec<String>, Vec<u64>, f64, u64)> = self
            .inner
            .series
            .iter()
            .map(|r| {
                let s = r.value();
                (r.key().clone(), s.cumulative.clone(), s.sum, s.count)
            })
            .collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));

        let bucket_name = format!("{}_bucket", desc.name);
        let sum_name = format!("{}_sum", desc.name);
        let count_name = format!("{}_count", desc.name);

        for (values, cumulative, sum, count) in &series {
            let pairs = desc.pairs(values);
            for (bound, hits) in self.inner.bounds.iter().zip(cumulative) {
                let le = format_value(*bound);
                let mut with_le = pairs.clone();
                with_le.push(("le", le.as_str()));
                write_sample(out, &bucket_name, &with_le, *hits as f64)?;
            }
            let mut with_inf = pairs.clone();
            with_inf.push(("le", "+Inf"));
            write_sample(out, &bucket_name, &with_inf, *count as f64)?;
            write_sample(out, &sum_name, &pairs, *sum)?;
            write_sample(out, &count_name, &pairs, *count as f64)?;
        }
        Ok(())
    }

    fn reset(&self) {
        self.inner.series.clear();
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered set of collectors with unique metric names.
#[derive(Default)]
pub struct Registry {
    collectors: RwLock<Vec<Box<dyn Collector>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collector. Fails if any of its names is already taken.
    pub fn register<C>(&self, collector: C) -> Result<(), MetricsError>
    where
        C: Collector + 'static,
    {
        let mut collectors = self.collectors.write().unwrap_or_else(PoisonError::into_inner);

        for name in collector.names() {
            if collectors.iter().any(|c| c.names().contains(&name)) {
                return Err(MetricsError::DuplicateName(name.to_string()));
            }
        }

        collectors.push(Box::new(collector));
        Ok(())
    }

    /// Render every collector in registration order.
    pub fn render(&self) -> Result<String, MetricsError> {
        let collectors = self.collectors.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for collector in collectors.iter() {
            collector.render(&mut out)?;
        }
        Ok(out)
    }

    /// Clear the values of every registered collector.
    pub fn reset(&self) {
        let collectors = self.collectors.read().unwrap_or_else(PoisonError::into_inner);
        for collector in collectors.iter() {
            collector.reset();
        }
    }
}
