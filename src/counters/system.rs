use std::collections::BTreeMap;

use sysinfo::{Pid, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{CategoryKind, CounterError, CounterHandle, CounterHost, MetricSpec};

// ─── Counter tables ──────────────────────────────────────────────

const PROCESSOR: &str = "Processor";
const MEMORY: &str = "Memory";
const PROCESS: &str = "Process";
const SYSTEM: &str = "System";

const TOTAL_INSTANCE: &str = "_Total";

static PROCESSOR_COUNTERS: &[&str] = &["% Processor Time", "% Idle Time"];
static MEMORY_COUNTERS: &[&str] = &[
    "Available Bytes",
    "Available MBytes",
    "Committed Bytes",
    "% Committed Bytes In Use",
];
static PROCESS_COUNTERS: &[&str] = &[
    "ID Process",
    "% Processor Time",
    "Working Set",
    "Virtual Bytes",
    "Elapsed Time",
];
static SYSTEM_COUNTERS: &[&str] = &["System Up Time", "Processes", "Processor Queue Length"];

/// Live counters read from the operating system through `sysinfo`.
///
/// Exposes a small Windows-flavoured catalogue (`Processor`, `Memory`,
/// `Process`, `System`). Process instances are named the way the Windows
/// counter subsystem names them: the executable name without `.exe`, with
/// `#1`, `#2`, ... appended to repeats in pid order.
#[derive(Debug, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }

    fn table(category: &str) -> Result<(CategoryKind, &'static [&'static str]), CounterError> {
        match category {
            PROCESSOR => Ok((CategoryKind::MultiInstance, PROCESSOR_COUNTERS)),
            MEMORY => Ok((CategoryKind::SingleInstance, MEMORY_COUNTERS)),
            PROCESS => Ok((CategoryKind::MultiInstance, PROCESS_COUNTERS)),
            SYSTEM => Ok((CategoryKind::SingleInstance, SYSTEM_COUNTERS)),
            other => Err(CounterError::CategoryNotFound(other.to_owned())),
        }
    }
}

/// Windows-style instance names for every running process.
fn process_instances(system: &System) -> BTreeMap<String, Pid> {
    let mut by_name: BTreeMap<String, Vec<Pid>> = BTreeMap::new();
    for (pid, process) in system.processes() {
        let name = process.name();
        let name = name
            .strip_suffix(".exe")
            .or_else(|| name.strip_suffix(".EXE"))
            .unwrap_or(name);
        by_name.entry(name.to_owned()).or_default().push(*pid);
    }

    let mut instances = BTreeMap::new();
    for (name, mut pids) in by_name {
        pids.sort_by_key(|pid| pid.as_u32());
        for (i, pid) in pids.into_iter().enumerate() {
            let instance = if i == 0 {
                name.clone()
            } else {
                format!("{name}#{i}")
            };
            instances.insert(instance, pid);
        }
    }
    instances
}

fn cpu_instances(system: &System) -> Vec<String> {
    std::iter::once(TOTAL_INSTANCE.to_owned())
        .chain((0..system.cpus().len()).map(|i| i.to_string()))
        .collect()
}

impl CounterHost for SystemHost {
    fn categories(&self) -> Result<Vec<String>, CounterError> {
        Ok([PROCESSOR, MEMORY, PROCESS, SYSTEM]
            .iter()
            .map(|c| (*c).to_owned())
            .collect())
    }

    fn category_kind(&self, category: &str) -> Result<CategoryKind, CounterError> {
        Self::table(category).map(|(kind, _)| kind)
    }

    fn instances(&self, category: &str) -> Result<Vec<String>, CounterError> {
        Self::table(category)?;
        let mut system = System::new();
        match category {
            PROCESSOR => {
                system.refresh_cpu();
                Ok(cpu_instances(&system))
            }
            PROCESS => {
                system.refresh_processes();
                Ok(process_instances(&system).into_keys().collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn counters(
        &self,
        category: &str,
        instance: Option<&str>,
    ) -> Result<Vec<String>, CounterError> {
        let (_, counters) = Self::table(category)?;
        if let Some(instance) = instance {
            if !self.instances(category)?.iter().any(|i| i == instance) {
                return Err(CounterError::InstanceNotFound {
                    category: category.to_owned(),
                    instance: instance.to_owned(),
                });
            }
        }
        Ok(counters.iter().map(|c| (*c).to_owned()).collect())
    }

    fn open(&self, spec: &MetricSpec) -> Result<Box<dyn CounterHandle>, CounterError> {
        let (kind, counters) = Self::table(spec.category())?;
        if !counters.contains(&spec.counter()) {
            return Err(CounterError::CounterNotFound {
                category: spec.category().to_owned(),
                counter: spec.counter().to_owned(),
            });
        }

        let not_found = |instance: &str| CounterError::InstanceNotFound {
            category: spec.category().to_owned(),
            instance: instance.to_owned(),
        };

        let mut system = System::new();
        let target = match (kind, spec.instance()) {
            (CategoryKind::MultiInstance, None) => {
                return Err(CounterError::InstanceRequired(spec.category().to_owned()))
            }
            (CategoryKind::SingleInstance, Some(i)) => return Err(not_found(i)),
            (CategoryKind::SingleInstance, None) => Target::Global,
            (CategoryKind::MultiInstance, Some(i)) if spec.category() == PROCESS => {
                system.refresh_processes();
                let pid = process_instances(&system)
                    .remove(i)
                    .ok_or_else(|| not_found(i))?;
                Target::Process(pid)
            }
            (CategoryKind::MultiInstance, Some(i)) => {
                system.refresh_cpu();
                if i == TOTAL_INSTANCE {
                    Target::AllCpus
                } else {
                    let index: usize = i.parse().map_err(|_| not_found(i))?;
                    if index >= system.cpus().len() {
                        return Err(not_found(i));
                    }
                    Target::Cpu(index)
                }
            }
        };

        Ok(Box::new(SystemCounter {
            system,
            category: spec.category().to_owned(),
            counter: spec.counter().to_owned(),
            target,
        }))
    }
}

// ─── Handle ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Target {
    Global,
    AllCpus,
    Cpu(usize),
    Process(Pid),
}

/// One open counter. Owns its own `System` snapshot, released on drop.
struct SystemCounter {
    system: System,
    category: String,
    counter: String,
    target: Target,
}

impl SystemCounter {
    fn unavailable(&self, why: &str) -> CounterError {
        CounterError::Unavailable(format!(
            "{}\\{}: {why}",
            self.category, self.counter
        ))
    }

    /// Usage figures need two refreshes spaced by the minimum interval.
    fn cpu_usage(&mut self) -> Result<f64, CounterError> {
        match self.target {
            Target::Process(pid) => {
                self.refresh_process(pid)?;
                std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
                self.refresh_process(pid)?;
                let process = self
                    .system
                    .process(pid)
                    .ok_or_else(|| self.unavailable("process exited"))?;
                Ok(f64::from(process.cpu_usage()))
            }
            Target::AllCpus => {
                self.system.refresh_cpu();
                std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
                self.system.refresh_cpu();
                Ok(f64::from(self.system.global_cpu_info().cpu_usage()))
            }
            Target::Cpu(index) => {
                self.system.refresh_cpu();
                std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
                self.system.refresh_cpu();
                self.system
                    .cpus()
                    .get(index)
                    .map(|cpu| f64::from(cpu.cpu_usage()))
                    .ok_or_else(|| self.unavailable("processor went offline"))
            }
            Target::Global => Err(self.unavailable("not a processor counter")),
        }
    }

    fn refresh_process(&mut self, pid: Pid) -> Result<(), CounterError> {
        if self.system.refresh_process(pid) {
            Ok(())
        } else {
            Err(self.unavailable("process exited"))
        }
    }

    fn process_value(&mut self, pid: Pid) -> Result<f64, CounterError> {
        self.refresh_process(pid)?;
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| self.unavailable("process exited"))?;
        match self.counter.as_str() {
            "ID Process" => Ok(f64::from(pid.as_u32())),
            "Working Set" => Ok(process.memory() as f64),
            "Virtual Bytes" => Ok(process.virtual_memory() as f64),
            "Elapsed Time" => Ok(process.run_time() as f64),
            _ => Err(self.unavailable("unsupported counter")),
        }
    }

    fn memory_value(&mut self) -> Result<f64, CounterError> {
        self.system.refresh_memory();
        let total = self.system.total_memory() as f64;
        let available = self.system.available_memory() as f64;
        let used = self.system.used_memory() as f64;
        match self.counter.as_str() {
            "Available Bytes" => Ok(available),
            "Available MBytes" => Ok(available / (1024.0 * 1024.0)),
            "Committed Bytes" => Ok(used),
            "% Committed Bytes In Use" if total > 0.0 => Ok(used / total * 100.0),
            "% Committed Bytes In Use" => Ok(0.0),
            _ => Err(self.unavailable("unsupported counter")),
        }
    }

    fn system_value(&mut self) -> Result<f64, CounterError> {
        match self.counter.as_str() {
            "System Up Time" => Ok(System::uptime() as f64),
            "Processes" => {
                self.system.refresh_processes();
                Ok(self.system.processes().len() as f64)
            }
            "Processor Queue Length" => Ok(System::load_average().one),
            _ => Err(self.unavailable("unsupported counter")),
        }
    }
}

impl CounterHandle for SystemCounter {
    fn next_value(&mut self) -> Result<f64, CounterError> {
        match (self.category.as_str(), self.counter.as_str()) {
            (PROCESSOR, "% Processor Time") | (PROCESS, "% Processor Time") => {
                self.cpu_usage()
            }
            (PROCESSOR, "% Idle Time") => self.cpu_usage().map(|busy| 100.0 - busy),
            (PROCESS, _) => match self.target {
                Target::Process(pid) => self.process_value(pid),
                _ => Err(self.unavailable("no process selected")),
            },
            (MEMORY, _) => self.memory_value(),
            (SYSTEM, _) => self.system_value(),
            _ => Err(self.unavailable("unsupported counter")),
        }
    }

    fn raw_value(&mut self) -> Result<i64, CounterError> {
        self.next_value().map(|v| v as i64)
    }
}
