use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::memory::{CounterSource, InMemoryHost};

// ─── Name pools ──────────────────────────────────────────────────

/// Some pool names carry `_` on purpose; correlation must keep them whole.
static APP_POOLS: &[&str] = &[
    "DefaultAppPool",
    "Orders_Api",
    "Reporting",
    ".NET v4.5",
    "Billing_Svc_v2",
];

static ASPNET_APPS: &[&str] = &[
    "_LM_W3SVC_1_ROOT",
    "_LM_W3SVC_2_ROOT_orders",
    "_LM_W3SVC_2_ROOT_billing",
];

static OTHER_PROCESSES: &[&str] = &["svchost", "svchost#1", "lsass", "Idle"];

const CPUS: usize = 4;

pub const WORKER_CATEGORY: &str = "W3SVC_W3WP";
pub const PROCESS_CATEGORY: &str = "Process";
pub const ASPNET_CATEGORY: &str = "ASP.NET Apps v4.0.30319";
pub const SECURITY_CATEGORY: &str = "Security System-Wide Statistics";

// ─── Public entry point ──────────────────────────────────────────

/// Builds a simulated web-server host: one `w3wp` worker per app pool, the
/// matching `W3SVC_W3WP` instances, plus the usual processor, memory and
/// ASP.NET categories. One extra worker has no app pool instance, as happens
/// while a pool is recycling.
pub fn host(seed: u64) -> InMemoryHost {
    // Deterministic RNG so re-runs produce the same layout.
    let mut rng = StdRng::seed_from_u64(seed);
    let mut host = InMemoryHost::new(seed);

    let mut pids: Vec<u32> = Vec::with_capacity(APP_POOLS.len() + 1);
    while pids.len() < APP_POOLS.len() + 1 {
        let pid = rng.gen_range(1_000..=30_000u32);
        if !pids.contains(&pid) {
            pids.push(pid);
        }
    }

    host = seed_workers(host, &pids);
    host = seed_processes(host, &pids, &mut rng);
    host = seed_system(host);
    host = seed_aspnet(host);

    tracing::info!(
        seed,
        app_pools = APP_POOLS.len(),
        "demo counter host ready"
    );
    host
}

// ─── W3SVC_W3WP ──────────────────────────────────────────────────

fn seed_workers(mut host: InMemoryHost, pids: &[u32]) -> InMemoryHost {
    let mut instances: Vec<String> = vec!["__Total".into()];
    instances.extend(
        APP_POOLS
            .iter()
            .zip(pids)
            .map(|(pool, pid)| format!("{pid}_{pool}")),
    );

    for instance in &instances {
        host = host
            .instance(
                WORKER_CATEGORY,
                instance,
                "Requests / Sec",
                CounterSource::Range { low: 0.0, high: 250.0 },
            )
            .instance(
                WORKER_CATEGORY,
                instance,
                "Active Requests",
                CounterSource::Range { low: 0.0, high: 20.0 },
            )
            .instance(
                WORKER_CATEGORY,
                instance,
                "Current File Cache Memory Usage",
                CounterSource::Range { low: 1.0e6, high: 6.4e7 },
            );
    }
    host
}

// ─── Process ─────────────────────────────────────────────────────

fn seed_processes(mut host: InMemoryHost, pids: &[u32], rng: &mut StdRng) -> InMemoryHost {
    let workers = pids.iter().enumerate().map(|(i, pid)| {
        let name = if i == 0 {
            "w3wp".to_owned()
        } else {
            format!("w3wp#{i}")
        };
        (name, *pid)
    });
    let others = OTHER_PROCESSES
        .iter()
        .map(|name| ((*name).to_owned(), rng.gen_range(4..=999u32)));

    for (instance, pid) in workers.chain(others).collect::<Vec<_>>() {
        host = host
            .instance(
                PROCESS_CATEGORY,
                &instance,
                "ID Process",
                CounterSource::Fixed(f64::from(pid)),
            )
            .instance(
                PROCESS_CATEGORY,
                &instance,
                "% Processor Time",
                CounterSource::Range { low: 0.0, high: 100.0 },
            )
            .instance(
                PROCESS_CATEGORY,
                &instance,
                "Working Set",
                CounterSource::Range { low: 8.0e7, high: 6.0e8 },
            )
            .instance(
                PROCESS_CATEGORY,
                &instance,
                "Thread Count",
                CounterSource::Range { low: 20.0, high: 80.0 },
            );
    }

    host.instance(
        PROCESS_CATEGORY,
        "Idle",
        "IO Read Bytes/sec",
        CounterSource::Fail("no I/O data collected for this instance".into()),
    )
}

// ─── Processor / Memory ──────────────────────────────────────────

fn seed_system(mut host: InMemoryHost) -> InMemoryHost {
    let cpus = std::iter::once("_Total".to_owned()).chain((0..CPUS).map(|i| i.to_string()));
    for cpu in cpus {
        host = host
            .instance(
                "Processor",
                &cpu,
                "% Processor Time",
                CounterSource::Range { low: 0.0, high: 100.0 },
            )
            .instance(
                "Processor",
                &cpu,
                "% Idle Time",
                CounterSource::Range { low: 0.0, high: 100.0 },
            );
    }

    host.single(
        "Memory",
        "Available MBytes",
        CounterSource::Range { low: 2_048.0, high: 12_288.0 },
    )
    .single("Memory", "Pages/sec", CounterSource::Range { low: 0.0, high: 400.0 })
    .single(
        "Memory",
        "% Committed Bytes In Use",
        CounterSource::Range { low: 20.0, high: 90.0 },
    )
    // Listed but unreadable without elevation, like on a real box
    .single(SECURITY_CATEGORY, "NTLM Authentications", CounterSource::Fixed(0.0))
    .deny(SECURITY_CATEGORY)
}

// ─── ASP.NET Apps ────────────────────────────────────────────────

fn seed_aspnet(mut host: InMemoryHost) -> InMemoryHost {
    let apps = std::iter::once("__Total__").chain(ASPNET_APPS.iter().copied());
    for app in apps {
        host = host
            .instance(
                ASPNET_CATEGORY,
                app,
                "Requests/Sec",
                CounterSource::Range { low: 0.0, high: 120.0 },
            )
            .instance(
                ASPNET_CATEGORY,
                app,
                "Errors Total",
                CounterSource::Range { low: 0.0, high: 5.0 },
            )
            .instance(
                ASPNET_CATEGORY,
                app,
                "Sessions Active",
                CounterSource::Range { low: 0.0, high: 300.0 },
            );
    }
    host
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::{CounterHost, MetricSpec};

    #[test]
    fn same_seed_same_layout() {
        let a = host(42);
        let b = host(42);
        assert_eq!(
            a.instances(WORKER_CATEGORY).unwrap(),
            b.instances(WORKER_CATEGORY).unwrap()
        );
        assert_eq!(a.instances(WORKER_CATEGORY).unwrap().len(), APP_POOLS.len() + 1);
    }

    #[test]
    fn workers_expose_process_ids() {
        let host = host(1);
        let worker_pids: Vec<String> = host
            .instances(WORKER_CATEGORY)
            .unwrap()
            .into_iter()
            .filter(|i| i != "__Total")
            .filter_map(|i| i.split_once('_').map(|(pid, _)| pid.to_owned()))
            .collect();

        let spec = MetricSpec::new(PROCESS_CATEGORY, "ID Process", Some("w3wp")).unwrap();
        let pid = host.read_raw(&spec).unwrap();
        assert!(worker_pids.contains(&pid.to_string()));
    }

    #[test]
    fn security_category_is_listed_but_denied() {
        let host = host(1);
        assert!(host.categories().unwrap().iter().any(|c| c == SECURITY_CATEGORY));
        assert!(matches!(
            host.counters(SECURITY_CATEGORY, None),
            Err(crate::counters::CounterError::AccessDenied(_))
        ));
    }

    #[test]
    fn idle_io_counter_fails() {
        let host = host(1);
        let spec = MetricSpec::parse(r"\Process(Idle)\IO Read Bytes/sec").unwrap();
        assert!(host.read(&spec).is_err());
    }
}
