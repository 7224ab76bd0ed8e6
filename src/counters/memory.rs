use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::{CategoryKind, CounterError, CounterHandle, CounterHost, MetricSpec};

/// Where a simulated counter gets its readings from.
#[derive(Debug, Clone, PartialEq)]
pub enum CounterSource {
    Fixed(f64),
    /// Uniformly random in `low..=high` on every read.
    Range { low: f64, high: f64 },
    /// Every read fails with this message.
    Fail(String),
}

#[derive(Debug)]
struct Category {
    kind: CategoryKind,
    instances: Vec<String>,
    counters: Vec<String>,
    sources: HashMap<(Option<String>, String), CounterSource>,
}

impl Category {
    fn new(kind: CategoryKind) -> Self {
        Self {
            kind,
            instances: Vec::new(),
            counters: Vec::new(),
            sources: HashMap::new(),
        }
    }

    fn add(&mut self, instance: Option<&str>, counter: &str, source: CounterSource) {
        if let Some(instance) = instance {
            if !self.instances.iter().any(|i| i == instance) {
                self.instances.push(instance.to_owned());
            }
        }
        if !self.counters.iter().any(|c| c == counter) {
            self.counters.push(counter.to_owned());
        }
        self.sources
            .insert((instance.map(str::to_owned), counter.to_owned()), source);
    }
}

/// Table-driven counter host. Backs the `demo` host and every test that
/// needs a deterministic counter subsystem.
pub struct InMemoryHost {
    categories: Mutex<BTreeMap<String, Category>>,
    denied: Mutex<HashSet<String>>,
    rng: Arc<Mutex<StdRng>>,
    open_handles: Arc<AtomicUsize>,
}

impl InMemoryHost {
    pub fn new(seed: u64) -> Self {
        Self {
            categories: Mutex::new(BTreeMap::new()),
            denied: Mutex::new(HashSet::new()),
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Adds a counter to a single-instance category, creating it if needed.
    pub fn single(self, category: &str, counter: &str, source: CounterSource) -> Self {
        self.categories
            .lock()
            .entry(category.to_owned())
            .or_insert_with(|| Category::new(CategoryKind::SingleInstance))
            .add(None, counter, source);
        self
    }

    /// Adds one instance's counter to a multi-instance category.
    pub fn instance(
        self,
        category: &str,
        instance: &str,
        counter: &str,
        source: CounterSource,
    ) -> Self {
        self.categories
            .lock()
            .entry(category.to_owned())
            .or_insert_with(|| Category::new(CategoryKind::MultiInstance))
            .add(Some(instance), counter, source);
        self
    }

    /// Makes every enumeration and read of `category` fail with access denied.
    pub fn deny(self, category: &str) -> Self {
        self.denied.lock().insert(category.to_owned());
        self
    }

    /// Simulates an instance going away (a process exiting).
    #[cfg(test)]
    pub fn remove_instance(&self, category: &str, instance: &str) {
        if let Some(cat) = self.categories.lock().get_mut(category) {
            cat.instances.retain(|i| i != instance);
            cat.sources.retain(|(i, _), _| i.as_deref() != Some(instance));
        }
    }

    /// Number of handles currently open against this host.
    #[cfg(test)]
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    fn with_category<T>(
        &self,
        category: &str,
        f: impl FnOnce(&Category) -> Result<T, CounterError>,
    ) -> Result<T, CounterError> {
        if self.denied.lock().contains(category) {
            return Err(CounterError::AccessDenied(format!(
                "category '{category}'"
            )));
        }
        let categories = self.categories.lock();
        let cat = categories
            .get(category)
            .ok_or_else(|| CounterError::CategoryNotFound(category.to_owned()))?;
        f(cat)
    }
}

impl CounterHost for InMemoryHost {
    fn categories(&self) -> Result<Vec<String>, CounterError> {
        Ok(self.categories.lock().keys().cloned().collect())
    }

    fn category_kind(&self, category: &str) -> Result<CategoryKind, CounterError> {
        self.with_category(category, |cat| Ok(cat.kind))
    }

    fn instances(&self, category: &str) -> Result<Vec<String>, CounterError> {
        self.with_category(category, |cat| Ok(cat.instances.clone()))
    }

    fn counters(
        &self,
        category: &str,
        instance: Option<&str>,
    ) -> Result<Vec<String>, CounterError> {
        self.with_category(category, |cat| match instance {
            Some(i) if !cat.instances.iter().any(|known| known == i) => {
                Err(CounterError::InstanceNotFound {
                    category: category.to_owned(),
                    instance: i.to_owned(),
                })
            }
            _ => Ok(cat.counters.clone()),
        })
    }

    fn open(&self, spec: &MetricSpec) -> Result<Box<dyn CounterHandle>, CounterError> {
        let source = self.with_category(spec.category(), |cat| {
            match (cat.kind, spec.instance()) {
                (CategoryKind::MultiInstance, None) => {
                    return Err(CounterError::InstanceRequired(
                        spec.category().to_owned(),
                    ))
                }
                (CategoryKind::SingleInstance, Some(i)) => {
                    return Err(CounterError::InstanceNotFound {
                        category: spec.category().to_owned(),
                        instance: i.to_owned(),
                    })
                }
                (CategoryKind::MultiInstance, Some(i))
                    if !cat.instances.iter().any(|known| known == i) =>
                {
                    return Err(CounterError::InstanceNotFound {
                        category: spec.category().to_owned(),
                        instance: i.to_owned(),
                    })
                }
                _ => {}
            }

            let key = (spec.instance().map(str::to_owned), spec.counter().to_owned());
            cat.sources
                .get(&key)
                .cloned()
                .ok_or_else(|| CounterError::CounterNotFound {
                    category: spec.category().to_owned(),
                    counter: spec.counter().to_owned(),
                })
        })?;

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryHandle {
            source,
            rng: self.rng.clone(),
            open_handles: self.open_handles.clone(),
        }))
    }
}

struct MemoryHandle {
    source: CounterSource,
    rng: Arc<Mutex<StdRng>>,
    open_handles: Arc<AtomicUsize>,
}

impl CounterHandle for MemoryHandle {
    fn next_value(&mut self) -> Result<f64, CounterError> {
        match &self.source {
            CounterSource::Fixed(v) => Ok(*v),
            CounterSource::Range { low, high } => {
                // gen_range panics on an empty or non-finite range
                if !(low.is_finite() && high.is_finite() && low <= high) {
                    return Err(CounterError::Unavailable(format!(
                        "invalid simulated range {low}..={high}"
                    )));
                }
                Ok(self.rng.lock().gen_range(*low..=*high))
            }
            CounterSource::Fail(msg) => Err(CounterError::Unavailable(msg.clone())),
        }
    }

    fn raw_value(&mut self) -> Result<i64, CounterError> {
        self.next_value().map(|v| v.round() as i64)
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
