pub mod demo;
pub mod memory;
pub mod path;
pub mod system;

use thiserror::Error;

pub use path::{MalformedPath, MetricSpec};
pub use system::SystemHost;

/// Why the host could not enumerate or read a counter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CounterError {
    #[error("category '{0}' does not exist")]
    CategoryNotFound(String),
    #[error("counter '{counter}' does not exist in category '{category}'")]
    CounterNotFound { category: String, counter: String },
    #[error("instance '{instance}' does not exist in category '{category}'")]
    InstanceNotFound { category: String, instance: String },
    #[error("category '{0}' is multi-instance; an instance name is required")]
    InstanceRequired(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("counter unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    SingleInstance,
    MultiInstance,
}

/// An open handle onto one counter. Dropping it releases whatever the host
/// allocated for it.
pub trait CounterHandle: Send {
    /// The next (possibly rate-computed) value of the counter.
    fn next_value(&mut self) -> Result<f64, CounterError>;

    /// The raw integer value, for counters such as a process id.
    fn raw_value(&mut self) -> Result<i64, CounterError>;
}

/// The host's counter subsystem: enumeration plus scoped reads.
pub trait CounterHost: Send + Sync {
    fn categories(&self) -> Result<Vec<String>, CounterError>;

    fn category_kind(&self, category: &str) -> Result<CategoryKind, CounterError>;

    fn instances(&self, category: &str) -> Result<Vec<String>, CounterError>;

    fn counters(
        &self,
        category: &str,
        instance: Option<&str>,
    ) -> Result<Vec<String>, CounterError>;

    fn open(&self, spec: &MetricSpec) -> Result<Box<dyn CounterHandle>, CounterError>;

    /// Opens a handle, takes one reading and releases the handle.
    fn read(&self, spec: &MetricSpec) -> Result<f64, CounterError> {
        let mut handle = self.open(spec)?;
        handle.next_value()
    }

    /// Like [`CounterHost::read`], but returns the raw integer value.
    fn read_raw(&self, spec: &MetricSpec) -> Result<i64, CounterError> {
        let mut handle = self.open(spec)?;
        handle.raw_value()
    }
}
