pub mod collector;
pub mod runs;
pub mod sampler;
pub mod stream;

use serde::Serialize;

use crate::counters::MetricSpec;

pub use collector::SampleCollector;
pub use runs::RunRegistry;
pub use sampler::SamplingRun;

/// Outcome of reading one counter once: a value or the reason there is none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Reading {
    #[serde(rename = "value")]
    Value(f64),
    #[serde(rename = "errorMessage")]
    Error(String),
}

impl Reading {
    #[cfg(test)]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Value(_) => None,
            Self::Error(e) => Some(e),
        }
    }
}

/// One spec's reading from one collection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleResult {
    pub path: String,
    #[serde(flatten)]
    pub spec: MetricSpec,
    #[serde(flatten)]
    pub reading: Reading,
}

impl SampleResult {
    pub fn new(spec: MetricSpec, reading: Reading) -> Self {
        Self {
            path: spec.path(),
            spec,
            reading,
        }
    }

    #[cfg(test)]
    pub fn value(&self) -> Option<f64> {
        self.reading.value()
    }

    pub fn error(&self) -> Option<&str> {
        self.reading.error()
    }
}
