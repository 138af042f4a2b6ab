use clap::Parser;
use std::io::Write;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use sessiond_common::StoreConfig;
use sessiond_core::{Clock, DocumentStore, InMemoryDocumentStore, SystemClock};
use sessiond_provider::ProviderFacade;
use sessiond_stress_tests::metrics::Metrics;
use sessiond_stress_tests::workload::WorkloadProfile;
use sessiond_stress_tests::worker;

#[derive(Parser)]
#[command(name = "sessiond-stress", about = "sessiond lock-protocol stress test harness")]
struct Args {
    /// How long to run (seconds)
    #[arg(long, default_value_t = 5)]
    duration: u64,

    /// Workload profile: read-heavy | balanced | write-heavy | write-only
    #[arg(long, default_value = "balanced")]
    workload: String,

    /// Number of distinct session ids in the key space
    #[arg(long, default_value_t = 1000)]
    key_space: usize,

    /// Number of concurrent tasks driving the workload
    #[arg(long, default_value_t = 16)]
    concurrency: usize,

    /// Fail if the error rate exceeds this fraction
    #[arg(long, default_value_t = 0.01)]
    max_error_rate: f64,

    /// Fail if mutual-exclusion violations exceed this count
    #[arg(long, default_value_t = 0)]
    max_violations: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let profile = WorkloadProfile::from_name(&args.workload).unwrap_or_else(|| {
        eprintln!(
            "Unknown workload {:?}. Valid values: read-heavy, balanced, write-heavy, write-only",
            args.workload
        );
        process::exit(3);
    });

    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new(Arc::new(SystemClock) as Arc<dyn Clock>));
    let config = StoreConfig::new("AccountEndpoint=https://localhost;AccountKey=stress", "sessions-db");
    let facade = ProviderFacade::new("stress", store, Arc::new(SystemClock), config).unwrap_or_else(|e| {
        eprintln!("Failed to build provider facade: {e}");
        process::exit(3);
    });
    let facade = Arc::new(facade);

    let duration = Duration::from_secs(args.duration);

    print!("Running {}s {} workload ", args.duration, profile.as_name());
    std::io::stdout().flush().ok();

    let dot_handle = tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await; // consume the immediate first tick
        loop {
            interval.tick().await;
            print!(".");
            std::io::stdout().flush().ok();
        }
    });

    let (metrics, history) =
        worker::run(facade, profile, args.key_space, args.concurrency, duration).await;

    dot_handle.abort();
    println!();

    let violations = history.check_correctness();
    let violation_count = violations.len() as u64;

    print_report(&args, &metrics, violation_count, profile);

    for v in &violations {
        eprintln!(
            "VIOLATION session_id={} overlapping leases {:?} and {:?}",
            v.session_id, v.first, v.second
        );
    }

    let error_rate_exceeded = metrics.requests_total > 0 && metrics.error_rate() > args.max_error_rate;
    let violations_exceeded = violation_count > args.max_violations;

    let exit_code = if error_rate_exceeded {
        1
    } else if violations_exceeded {
        2
    } else {
        0
    };

    process::exit(exit_code);
}

fn print_report(args: &Args, metrics: &Metrics, violation_count: u64, profile: WorkloadProfile) {
    let pass_fail = |exceeded: bool| if exceeded { "✗" } else { "✓" };

    let error_rate_exceeded = metrics.requests_total > 0 && metrics.error_rate() > args.max_error_rate;
    let violations_exceeded = violation_count > args.max_violations;
    let overall_pass = !error_rate_exceeded && !violations_exceeded;

    println!("sessiond Stress Test Results");
    println!("============================");
    println!("Duration:              {:.1} s", args.duration as f64);
    println!("Workload:              {}", profile.as_name());
    println!("Key space:             {}", args.key_space);
    println!("Concurrency:           {}", args.concurrency);
    println!();
    println!("Requests:              {}", format_thousands(metrics.requests_total));
    println!("Throughput:            {:.1} rps", metrics.throughput_rps());
    println!("P50 latency:           {:.1} ms", ns_to_ms(metrics.p50_ns()));
    println!("P99 latency:           {:.1} ms", ns_to_ms(metrics.p99_ns()));
    println!();
    println!("Errors:                {}", format_thousands(metrics.errors));
    println!(
        "Error rate:            {:.3}%    [threshold: {:.3}%]  {}",
        metrics.error_rate() * 100.0,
        args.max_error_rate * 100.0,
        pass_fail(error_rate_exceeded),
    );
    println!();
    println!(
        "Lock violations:       {}        [threshold: {}]        {}",
        violation_count,
        args.max_violations,
        pass_fail(violations_exceeded),
    );
    println!();
    println!("Result: {}", if overall_pass { "PASS" } else { "FAIL" });
}

fn format_thousands(n: u64) -> String {
    if n >= 1_000_000 {
        format!("~{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("~{}K", n / 1_000)
    } else {
        n.to_string()
    }
}

fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}
