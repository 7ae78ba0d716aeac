//! Normalized metric model and text exposition rendering.
//!
//! Provider responses are mapped into [`MetricFamily`] groups; the family owns the
//! label-key schema so every sample under one metric name shares identical keys by
//! construction.

// std
use std::fmt::Write;
// crates.io
use serde::{Deserialize, Serialize};

/// Kind of a metric family in the exposition output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
	/// Point-in-time measurement.
	Gauge,
	/// Monotonically increasing count.
	Counter,
}
impl MetricKind {
	fn as_str(&self) -> &'static str {
		match self {
			Self::Gauge => "gauge",
			Self::Counter => "counter",
		}
	}
}

/// One labelled numeric sample within a family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
	/// Label values, positionally matched to the family's label keys.
	pub label_values: Vec<String>,
	/// Numeric value.
	pub value: f64,
}

/// A named group of samples sharing one label-key schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricFamily {
	/// Metric name.
	pub name: String,
	/// Help text rendered into the exposition output.
	pub help: String,
	/// Family kind.
	pub kind: MetricKind,
	/// Ordered label keys shared by every sample.
	pub label_keys: Vec<String>,
	/// Collected samples.
	pub samples: Vec<Sample>,
}
impl MetricFamily {
	/// Create an empty gauge family with the given label-key schema.
	pub fn gauge(name: impl Into<String>, help: impl Into<String>, label_keys: &[&str]) -> Self {
		Self::new(name, help, MetricKind::Gauge, label_keys)
	}

	/// Create an empty counter family with the given label-key schema.
	pub fn counter(name: impl Into<String>, help: impl Into<String>, label_keys: &[&str]) -> Self {
		Self::new(name, help, MetricKind::Counter, label_keys)
	}

	fn new(
		name: impl Into<String>,
		help: impl Into<String>,
		kind: MetricKind,
		label_keys: &[&str],
	) -> Self {
		Self {
			name: name.into(),
			help: help.into(),
			kind,
			label_keys: label_keys.iter().map(|key| (*key).to_owned()).collect(),
			samples: Vec::new(),
		}
	}

	/// Append a sample; a label arity mismatch drops the sample with a warning so a
	/// family is never partially malformed.
	pub fn push(&mut self, label_values: Vec<String>, value: f64) {
		if label_values.len() != self.label_keys.len() {
			tracing::warn!(
				metric = %self.name,
				expected = self.label_keys.len(),
				got = label_values.len(),
				"label arity mismatch; dropping sample"
			);

			return;
		}

		self.samples.push(Sample { label_values, value });
	}

	/// Whether the family carries no samples.
	pub fn is_empty(&self) -> bool {
		self.samples.is_empty()
	}
}

/// Map a raw status string onto a binary gauge value.
///
/// Anything other than the healthy sentinel collapses to `0.0`; there is no
/// distinct "unknown" classification.
pub fn status_value(raw: &str, healthy: &str) -> f64 {
	if raw == healthy { 1.0 } else { 0.0 }
}

/// Render metric families into the line-oriented text exposition format.
pub fn render(families: &[MetricFamily]) -> String {
	let mut out = String::new();

	for family in families {
		if family.is_empty() {
			continue;
		}

		let _ = writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help));
		let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind.as_str());

		for sample in &family.samples {
			if family.label_keys.is_empty() {
				let _ = writeln!(out, "{} {}", family.name, format_value(sample.value));

				continue;
			}

			let labels = family
				.label_keys
				.iter()
				.zip(&sample.label_values)
				.map(|(key, value)| format!("{key}=\"{}\"", escape_label_value(value)))
				.collect::<Vec<_>>()
				.join(",");
			let _ = writeln!(out, "{}{{{labels}}} {}", family.name, format_value(sample.value));
		}
	}

	out
}

fn format_value(value: f64) -> String {
	if value == value.trunc() && value.abs() < 1e15 {
		(value as i64).to_string()
	} else {
		value.to_string()
	}
}

fn escape_label_value(value: &str) -> String {
	value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(help: &str) -> String {
	help.replace('\\', "\\\\").replace('\n', "\\n")
}
