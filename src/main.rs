use clap::{Parser, ValueEnum};
use core_affinity::CoreId;
use crossbeam_queue::SegQueue;
use log::{debug, info, warn};
use rand::Rng;
use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

use locking_queues::{
    BlockingQueue, CoarseQueue, ConcurrentQueue, CountableWrapper, FineQueue, Granularity, Handle,
};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Pushed by the driver to release consumers blocked in `wait_and_pop`.
const STOP: i32 = -1;

fn main() -> Result<(), BenchError> {
    let config = BenchConfig::parse();
    let _logger = flexi_logger::Logger::try_with_str(&config.log_level)?.start()?;
    config.validate()?;

    let summary = match (config.queue, config.blocking) {
        (QueueKind::Coarse, false) => benchmark_producer_consumer(CoarseQueue::new(), &config),
        (QueueKind::Fine, false) => benchmark_producer_consumer(FineQueue::new(), &config),
        (QueueKind::Coarse, true) => benchmark_blocking::<CoarseQueue<i32>>(&config),
        (QueueKind::Fine, true) => benchmark_blocking::<FineQueue<i32>>(&config),
        (QueueKind::SegQueue, _) => benchmark_producer_consumer(SegQueue::new(), &config),
        (QueueKind::ConcurrentQueue, _) => benchmark_producer_consumer(
            concurrent_queue::ConcurrentQueue::unbounded(),
            &config,
        ),
    };
    summary.report();
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum BenchError {
    #[error("--duration must be at least one second")]
    ZeroDuration,
    #[error("at least one producer, consumer or mixed thread is needed")]
    NoThreads,
    #[error("--push-probability must lie in [0, 1], got {0}")]
    PushProbability(f64),
    #[error("--blocking needs a locking queue, {0:?} cannot block on pop")]
    BlockingUnsupported(QueueKind),
    #[error("could not start the logger: {0}")]
    Logger(#[from] flexi_logger::FlexiLoggerError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum QueueKind {
    Coarse,
    Fine,
    SegQueue,
    ConcurrentQueue,
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct BenchConfig {
    /// queue implementation to benchmark.
    #[arg(long, value_enum, default_value_t = QueueKind::Fine)]
    queue: QueueKind,
    /// number of elements to add to the queue before starting the main
    /// threaded test.
    #[arg(long)]
    prefill: usize,
    /// number of threads pushing elements onto the queue.
    #[arg(long)]
    producer_threads: usize,
    /// number of threads popping elements off the queue.
    #[arg(long)]
    consumer_threads: usize,
    /// number of threads that randomly either push or pop.
    #[arg(long, default_value_t = 0)]
    mixed_threads: usize,
    /// chance that a mixed thread pushes rather than pops.
    #[arg(long, default_value_t = 0.5)]
    push_probability: f64,
    /// duration in seconds to run the test
    #[arg(long)]
    duration: usize,
    /// consumers block in wait_and_pop instead of polling.
    #[arg(long)]
    blocking: bool,
    /// pin every worker thread to its own core, round robin.
    #[arg(long)]
    pin_threads: bool,
    /// log filter, e.g. "info" or "locking_queues=trace".
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl BenchConfig {
    fn validate(&self) -> Result<(), BenchError> {
        if self.duration == 0 {
            return Err(BenchError::ZeroDuration);
        }
        if self.worker_count() == 0 {
            return Err(BenchError::NoThreads);
        }
        if !(0.0..=1.0).contains(&self.push_probability) {
            return Err(BenchError::PushProbability(self.push_probability));
        }
        if self.blocking && !matches!(self.queue, QueueKind::Coarse | QueueKind::Fine) {
            return Err(BenchError::BlockingUnsupported(self.queue));
        }
        Ok(())
    }

    fn worker_count(&self) -> usize {
        self.producer_threads + self.consumer_threads + self.mixed_threads
    }

    fn core_ids(&self) -> Vec<CoreId> {
        if !self.pin_threads {
            return Vec::new();
        }
        let core_ids = core_affinity::get_core_ids().unwrap_or_default();
        if core_ids.is_empty() {
            warn!("no core ids available, running unpinned");
        }
        core_ids
    }
}

fn pin_to_core(core_ids: &[CoreId], worker: usize) {
    if core_ids.is_empty() {
        return;
    }
    let core = core_ids[worker % core_ids.len()];
    if !core_affinity::set_for_current(core) {
        warn!("could not pin worker {worker} to core {}", core.id);
    }
}

struct Summary {
    queue: &'static str,
    enqueues: usize,
    dequeues: usize,
    elapsed: Duration,
}

impl Summary {
    fn report(&self) {
        let throughput = (self.enqueues + self.dequeues) as f64 / self.elapsed.as_secs_f64();
        info!(
            "{} queue: {} enqueues, {} dequeues in {:.2?}",
            self.queue, self.enqueues, self.dequeues, self.elapsed
        );
        println!("throughput: {}", throughput);
        println!("number of enqueues: {}", self.enqueues);
        println!("number of dequeues: {}", self.dequeues);
    }
}

fn benchmark_producer_consumer<C>(queue: C, config: &BenchConfig) -> Summary
where
    C: ConcurrentQueue<i32>,
    for<'a> &'a C: Send,
{
    let mut handle = queue.register();
    for i in 0..config.prefill {
        handle.enqueue(i as i32);
    }

    let core_ids = config.core_ids();
    let done: AtomicBool = AtomicBool::new(false);
    let enqueues = AtomicUsize::new(0);
    let dequeues = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for worker in 0..config.producer_threads {
            let (queue, done, enqueues, core_ids) = (&queue, &done, &enqueues, &core_ids);
            s.spawn(move || {
                pin_to_core(core_ids, worker);
                let mut local_enqueues = 0;
                let mut handle = queue.register();
                while !done.load(Ordering::Relaxed) {
                    handle.enqueue(worker as i32);
                    local_enqueues += 1;
                }
                enqueues.fetch_add(local_enqueues, Ordering::Relaxed);
            });
        }
        for worker in config.producer_threads..config.producer_threads + config.consumer_threads {
            let (queue, done, dequeues, core_ids) = (&queue, &done, &dequeues, &core_ids);
            s.spawn(move || {
                pin_to_core(core_ids, worker);
                let mut local_dequeues = 0;
                let mut handle = queue.register();
                while !done.load(Ordering::Relaxed) {
                    if handle.dequeue().is_some() {
                        local_dequeues += 1;
                    }
                }
                dequeues.fetch_add(local_dequeues, Ordering::Relaxed);
            });
        }
        for worker in config.producer_threads + config.consumer_threads..config.worker_count() {
            let (queue, done, enqueues, dequeues, core_ids) =
                (&queue, &done, &enqueues, &dequeues, &core_ids);
            s.spawn(move || {
                pin_to_core(core_ids, worker);
                let mut rng = rand::thread_rng();
                let (mut local_enqueues, mut local_dequeues) = (0, 0);
                let mut handle = queue.register();
                while !done.load(Ordering::Relaxed) {
                    if rng.gen_bool(config.push_probability) {
                        handle.enqueue(worker as i32);
                        local_enqueues += 1;
                    } else if handle.dequeue().is_some() {
                        local_dequeues += 1;
                    }
                }
                enqueues.fetch_add(local_enqueues, Ordering::Relaxed);
                dequeues.fetch_add(local_dequeues, Ordering::Relaxed);
            });
        }

        thread::sleep(Duration::from_secs(config.duration as u64));
        done.store(true, Ordering::Relaxed);
    });

    Summary {
        queue: <C::Granularity as Granularity>::NAME,
        enqueues: enqueues.into_inner(),
        dequeues: dequeues.into_inner(),
        elapsed: start.elapsed(),
    }
}

/// Runs consumers that sleep in `wait_and_pop`. Once the time is up the
/// driver pushes one [`STOP`] per consumer; consumers drain whatever was
/// queued ahead of it before they see it.
fn benchmark_blocking<Q>(config: &BenchConfig) -> Summary
where
    Q: BlockingQueue<i32> + ConcurrentQueue<i32> + Sync,
{
    let queue = CountableWrapper::<Q>::default();
    for i in 0..config.prefill {
        queue.push(i as i32);
    }

    let core_ids = config.core_ids();
    let done = AtomicBool::new(false);
    let enqueues = AtomicUsize::new(0);
    let dequeues = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for worker in 0..config.producer_threads {
            let (queue, done, enqueues, core_ids) = (&queue, &done, &enqueues, &core_ids);
            s.spawn(move || {
                pin_to_core(core_ids, worker);
                let mut local_enqueues = 0;
                while !done.load(Ordering::Relaxed) {
                    queue.push(worker as i32);
                    local_enqueues += 1;
                }
                enqueues.fetch_add(local_enqueues, Ordering::Relaxed);
            });
        }
        for worker in config.producer_threads..config.producer_threads + config.consumer_threads {
            let (queue, dequeues, core_ids) = (&queue, &dequeues, &core_ids);
            s.spawn(move || {
                pin_to_core(core_ids, worker);
                let mut local_dequeues = 0;
                while queue.wait_and_pop() != STOP {
                    local_dequeues += 1;
                }
                dequeues.fetch_add(local_dequeues, Ordering::Relaxed);
            });
        }
        for worker in config.producer_threads + config.consumer_threads..config.worker_count() {
            let (queue, done, enqueues, dequeues, core_ids) =
                (&queue, &done, &enqueues, &dequeues, &core_ids);
            s.spawn(move || {
                pin_to_core(core_ids, worker);
                let mut rng = rand::thread_rng();
                let (mut local_enqueues, mut local_dequeues) = (0, 0);
                while !done.load(Ordering::Relaxed) {
                    if rng.gen_bool(config.push_probability) {
                        queue.push(worker as i32);
                        local_enqueues += 1;
                    } else {
                        match queue.try_pop() {
                            // Stop tokens belong to the consumers.
                            Some(STOP) => queue.push(STOP),
                            Some(_) => local_dequeues += 1,
                            None => {}
                        }
                    }
                }
                enqueues.fetch_add(local_enqueues, Ordering::Relaxed);
                dequeues.fetch_add(local_dequeues, Ordering::Relaxed);
            });
        }

        thread::sleep(Duration::from_secs(config.duration as u64));
        done.store(true, Ordering::Relaxed);
        for _ in 0..config.consumer_threads {
            queue.push(STOP);
        }
    });

    let leftover = queue.len();
    let in_flight = queue.enq_count() - queue.deq_count();
    if in_flight == leftover {
        debug!(
            "conservation holds: {} pushed, {} popped, {} left",
            queue.enq_count(),
            queue.deq_count(),
            leftover
        );
    } else {
        warn!("conservation violated: {in_flight} values unaccounted for, {leftover} left in queue");
    }

    Summary {
        queue: <Q::Granularity as Granularity>::NAME,
        enqueues: enqueues.into_inner(),
        dequeues: dequeues.into_inner(),
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::{BenchConfig, BenchError, QueueKind};

    fn parse(args: &[&str]) -> BenchConfig {
        let base = ["bench", "--prefill", "0", "--producer-threads", "1", "--consumer-threads", "1"];
        BenchConfig::parse_from(base.iter().chain(args))
    }

    #[test]
    fn defaults_to_fine_queue() {
        let config = parse(&["--duration", "1"]);
        assert_eq!(config.queue, QueueKind::Fine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_duration() {
        let config = parse(&["--duration", "0"]);
        assert!(matches!(config.validate(), Err(BenchError::ZeroDuration)));
    }

    #[test]
    fn rejects_blocking_baseline() {
        let config = parse(&["--duration", "1", "--queue", "seg-queue", "--blocking"]);
        assert!(matches!(
            config.validate(),
            Err(BenchError::BlockingUnsupported(QueueKind::SegQueue))
        ));
    }

    #[test]
    fn rejects_probability_out_of_range() {
        let config = parse(&["--duration", "1", "--push-probability", "1.5"]);
        assert!(matches!(config.validate(), Err(BenchError::PushProbability(_))));
    }
}
