//! Stress tests for the security graph.
//!
//! These helpers drive one graph from several `std::thread` workers and
//! report how many operations failed.

use scopegraph_core::schema::model::Cve;
use scopegraph_core::search::{Predicate, Query, Searcher};
use scopegraph_core::{RequestContext, SecurityGraph, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Records written per batch.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            batch_size: 10,
        }
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record<T, E>(&self, result: &Result<T, E>) {
        let counter = if result.is_ok() {
            &self.successful
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

fn stress_cve(thread: usize, n: usize) -> Cve {
    Cve {
        id: format!("CVE-9{thread:03}-{n:05}"),
        cvss: (n % 100) as f32 / 10.0,
        summary: format!("stress record {n} from worker {thread}"),
    }
}

/// Every thread upserts its own CVEs in batches.
///
/// Afterwards the store holds `threads * operations` records.
pub fn stress_concurrent_upserts(graph: Arc<SecurityGraph>, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let graph = Arc::clone(&graph);
            let counters = Arc::clone(&counters);
            let config = config.clone();
            thread::spawn(move || {
                let ctx = RequestContext::unrestricted();
                let ids: Vec<usize> = (0..config.operations).collect();
                for chunk in ids.chunks(config.batch_size.max(1)) {
                    let batch: Vec<Cve> = chunk.iter().map(|n| stress_cve(t, *n)).collect();
                    counters.record(&graph.stores().cves.upsert_batch(&ctx, &batch));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    counters.finish(start)
}

/// Readers search CVEs while one writer keeps upserting and deleting.
///
/// Every search must see a consistent index: each hit still carries the
/// searched summary token.
pub fn stress_search_during_writes(graph: Arc<SecurityGraph>, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    let writer = {
        let graph = Arc::clone(&graph);
        let counters = Arc::clone(&counters);
        let config = config.clone();
        thread::spawn(move || {
            let ctx = RequestContext::unrestricted();
            for n in 0..config.operations {
                let cve = stress_cve(0, n % 50);
                let result = if n % 4 == 3 {
                    graph.stores().cves.delete_batch(&ctx, &[cve.id])
                } else {
                    graph.stores().cves.upsert_batch(&ctx, &[cve])
                };
                counters.record(&result);
            }
        })
    };

    let readers: Vec<_> = (0..config.threads)
        .map(|_| {
            let graph = Arc::clone(&graph);
            let counters = Arc::clone(&counters);
            let operations = config.operations;
            thread::spawn(move || {
                let ctx = RequestContext::unrestricted();
                let query = Query::new(Predicate::field("CVE Summary", "stress"));
                for _ in 0..operations {
                    let result = graph.searchers().cves.search(&ctx, &query).and_then(|hits| {
                        let ids: Vec<String> = hits.into_iter().map(|h| h.id).collect();
                        let (found, _) = graph.stores().cves.get_batch(&ctx, &ids)?;
                        Ok(found)
                    });
                    counters.record(&result);
                }
            })
        })
        .collect();

    writer.join().expect("Writer panicked");
    for handle in readers {
        handle.join().expect("Reader panicked");
    }
    counters.finish(start)
}

/// Scoped readers search the fixture concurrently; a result set that
/// differs from `expected` counts as a failure.
pub fn stress_scoped_searches(
    graph: Arc<SecurityGraph>,
    ctx: RequestContext,
    expected: Vec<String>,
    config: &StressConfig,
) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let expected = Arc::new(expected);
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let graph = Arc::clone(&graph);
            let counters = Arc::clone(&counters);
            let ctx = ctx.clone();
            let expected = Arc::clone(&expected);
            let operations = config.operations;
            thread::spawn(move || {
                for _ in 0..operations {
                    let result = graph
                        .searchers()
                        .components
                        .search(&ctx, &Query::match_all())
                        .map_err(|err| err.to_string())
                        .and_then(|hits| {
                            let mut ids: Vec<String> = hits.into_iter().map(|h| h.id).collect();
                            ids.sort();
                            if ids == *expected {
                                Ok(())
                            } else {
                                Err(format!("unexpected result set {ids:?}"))
                            }
                        });
                    counters.record(&result);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    counters.finish(start)
}
