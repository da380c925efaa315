use image_signature::config::ExtractionConfiguration;
use image_signature::core_modules::feature_point::{Centroid, FeaturePoint, Signature};
use image_signature::core_modules::pixel::{Pixel, PixelBuffer};
use image_signature::core_modules::signature_builder::SignatureExtractor;
use image_signature::error::{ConfigurationError, ExtractionError};
use image_signature::record::{ExtractionRecord, TaskId};
use image_signature::scheduler::{ExtractionScheduler, PoolStatus, completion_callback};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tokio::time::timeout;

const PATIENCE: Duration = Duration::from_secs(10);
const PANICKING_WIDTH: u32 = 98;
const FAILING_WIDTH: u32 = 99;

/// Images are identified by their width; the signature echoes it back.
fn image(width: u32) -> PixelBuffer {
    PixelBuffer::filled(width, 1, Pixel::rgb(0, 0, 0)).unwrap()
}

fn echo_signature(width: u32) -> Signature {
    Signature::from_centroids(vec![Centroid::new(
        FeaturePoint::new(width as f64, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
        1.0,
    )])
}

fn echoed_width(record: &ExtractionRecord) -> u32 {
    record.signature().unwrap()[0].point.x as u32
}

/// Blocks each extraction until the test opens the gate for that image width.
#[derive(Default)]
struct GatedExtractor {
    gates: Mutex<HashMap<u32, mpsc::Receiver<()>>>,
}

impl GatedExtractor {
    fn gate(&self, width: u32) -> mpsc::Sender<()> {
        let (sender, receiver) = mpsc::channel();
        self.gates.lock().unwrap().insert(width, receiver);
        sender
    }
}

impl SignatureExtractor for GatedExtractor {
    fn extract(&self, image: &PixelBuffer, _config: &ExtractionConfiguration) -> Result<Signature, ExtractionError> {
        let gate = self.gates.lock().unwrap().remove(&image.width());
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        match image.width() {
            PANICKING_WIDTH => panic!("extractor exploded"),
            FAILING_WIDTH => Err(ExtractionError::ZeroTotalWeight),
            width => Ok(echo_signature(width)),
        }
    }
}

/// Sleeps `width` milliseconds and tracks how many extractions overlap.
#[derive(Default)]
struct SleepyExtractor {
    running: AtomicUsize,
    peak: Arc<AtomicUsize>,
}

impl SignatureExtractor for SleepyExtractor {
    fn extract(&self, image: &PixelBuffer, _config: &ExtractionConfiguration) -> Result<Signature, ExtractionError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(image.width() as u64));
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(echo_signature(image.width()))
    }
}

fn config() -> Arc<ExtractionConfiguration> {
    Arc::new(ExtractionConfiguration::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_tasks_go_to_the_worker_that_frees_up_first() {
    let extractor = GatedExtractor::default();
    let open_a = extractor.gate(1);
    let open_b = extractor.gate(2);
    let open_c = extractor.gate(3);

    let order = Arc::new(Mutex::new(Vec::<TaskId>::new()));
    let seen = Arc::clone(&order);
    let scheduler = ExtractionScheduler::with_extractor(extractor);
    scheduler
        .initialize(
            2,
            Some(completion_callback(move |record: &ExtractionRecord| {
                seen.lock().unwrap().push(record.task_id);
            })),
        )
        .unwrap();

    let ticket_a = scheduler.submit_with_ticket(Some("a".into()), image(1), config()).unwrap();
    let ticket_b = scheduler.submit_with_ticket(Some("b".into()), image(2), config()).unwrap();
    let ticket_c = scheduler.submit_with_ticket(Some("c".into()), image(3), config()).unwrap();
    assert_eq!(
        (ticket_a.task_id(), ticket_b.task_id(), ticket_c.task_id()),
        (0, 1, 2)
    );

    assert_eq!(
        scheduler.pool_status().await.unwrap(),
        PoolStatus {
            pool_size: 2,
            idle: 0,
            busy: 2,
            queued: 1
        }
    );

    open_b.send(()).unwrap();
    let record_b = timeout(PATIENCE, ticket_b).await.unwrap().unwrap();
    assert_eq!(record_b.worker_id, 1);
    assert_eq!(record_b.label.as_deref(), Some("b"));
    assert_eq!(echoed_width(&record_b), 2);

    // C was handed straight to the worker that finished B.
    let status = scheduler.pool_status().await.unwrap();
    assert_eq!((status.busy, status.queued, status.idle), (2, 0, 0));

    open_c.send(()).unwrap();
    let record_c = timeout(PATIENCE, ticket_c).await.unwrap().unwrap();
    assert_eq!(record_c.worker_id, 1);

    open_a.send(()).unwrap();
    let record_a = timeout(PATIENCE, ticket_a).await.unwrap().unwrap();
    assert_eq!(record_a.worker_id, 0);

    scheduler.shutdown().await;
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 0]);
}

#[tokio::test]
async fn second_initialize_is_rejected_and_pool_survives() {
    let scheduler = ExtractionScheduler::with_extractor(GatedExtractor::default());
    scheduler.initialize(2, None).unwrap();

    assert!(matches!(
        scheduler.initialize(4, None),
        Err(ConfigurationError::AlreadyInitialized)
    ));
    assert_eq!(scheduler.pool_size(), Some(2));

    let record = timeout(PATIENCE, scheduler.submit_with_ticket(None, image(5), config()).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed_width(&record), 5);
    assert_eq!(record.display_label(), "task-0");
    scheduler.shutdown().await;
}

#[tokio::test]
async fn pool_size_must_be_in_range() {
    let scheduler = ExtractionScheduler::with_extractor(GatedExtractor::default());
    assert!(matches!(
        scheduler.initialize(0, None),
        Err(ConfigurationError::InvalidPoolSize(0))
    ));
    assert!(matches!(
        scheduler.initialize(65, None),
        Err(ConfigurationError::InvalidPoolSize(65))
    ));
    assert!(!scheduler.is_initialized());

    scheduler.initialize(64, None).unwrap();
    assert_eq!(scheduler.pool_status().await.unwrap().idle, 64);
    scheduler.shutdown().await;
}

#[test]
fn initialize_needs_a_runtime() {
    let scheduler = ExtractionScheduler::new();
    assert!(matches!(
        scheduler.initialize(1, None),
        Err(ConfigurationError::NoRuntime)
    ));
}

#[tokio::test]
async fn submit_before_initialize_is_rejected() {
    let scheduler = ExtractionScheduler::new();
    assert!(matches!(
        scheduler.submit(image(4), config()),
        Err(ConfigurationError::NotInitialized)
    ));
    assert!(matches!(
        scheduler.pool_status().await,
        Err(ConfigurationError::NotInitialized)
    ));
}

#[tokio::test]
async fn invalid_configurations_are_rejected_at_submit() {
    let scheduler = ExtractionScheduler::with_extractor(GatedExtractor::default());
    scheduler.initialize(1, None).unwrap();

    let broken = ExtractionConfiguration {
        grey_levels: 1,
        ..ExtractionConfiguration::default()
    };
    assert!(matches!(
        scheduler.submit(image(4), broken),
        Err(ConfigurationError::InvalidParameter { name: "grey_levels", .. })
    ));

    // Rejected submissions do not consume task ids.
    assert_eq!(scheduler.submit(image(4), config()).unwrap(), 0);
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_are_delivered_and_the_worker_moves_on() {
    let failures = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&failures);
    let scheduler = ExtractionScheduler::with_extractor(GatedExtractor::default());
    scheduler
        .initialize(
            1,
            Some(completion_callback(move |record: &ExtractionRecord| {
                if !record.is_success() {
                    counted.fetch_add(1, Ordering::SeqCst);
                }
            })),
        )
        .unwrap();

    let failing = scheduler.submit_with_ticket(None, image(FAILING_WIDTH), config()).unwrap();
    let panicking = scheduler.submit_with_ticket(None, image(PANICKING_WIDTH), config()).unwrap();
    let healthy = scheduler.submit_with_ticket(None, image(7), config()).unwrap();

    let failed = timeout(PATIENCE, failing).await.unwrap().unwrap();
    assert_eq!(failed.error(), Some(&ExtractionError::ZeroTotalWeight));
    assert!(failed.signature_as_svf().is_err());

    let panicked = timeout(PATIENCE, panicking).await.unwrap().unwrap();
    match panicked.error() {
        Some(ExtractionError::WorkerPanicked(message)) => assert!(message.contains("extractor exploded")),
        other => panic!("expected a worker panic, got {other:?}"),
    }

    let record = timeout(PATIENCE, healthy).await.unwrap().unwrap();
    assert_eq!(echoed_width(&record), 7);
    assert_eq!(record.worker_id, 0);

    scheduler.shutdown().await;
    assert_eq!(failures.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn a_panicking_callback_does_not_stop_delivery() {
    let scheduler = ExtractionScheduler::with_extractor(GatedExtractor::default());
    scheduler
        .initialize(
            1,
            Some(completion_callback(|_: &ExtractionRecord| panic!("callback exploded"))),
        )
        .unwrap();

    let first = scheduler.submit_with_ticket(None, image(3), config()).unwrap();
    let second = scheduler.submit_with_ticket(None, image(4), config()).unwrap();
    assert!(timeout(PATIENCE, first).await.unwrap().unwrap().is_success());
    assert!(timeout(PATIENCE, second).await.unwrap().unwrap().is_success());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn callbacks_can_be_replaced_and_removed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = ExtractionScheduler::with_extractor(GatedExtractor::default());

    // Set before initialize, kept when initialize gets no callback of its own.
    let counted = Arc::clone(&calls);
    scheduler
        .set_completion_callback(Some(completion_callback(move |_: &ExtractionRecord| {
            counted.fetch_add(1, Ordering::SeqCst);
        })))
        .unwrap();
    scheduler.initialize(1, None).unwrap();

    let ticket = scheduler.submit_with_ticket(None, image(3), config()).unwrap();
    timeout(PATIENCE, ticket).await.unwrap().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    scheduler.set_completion_callback(None).unwrap();
    let ticket = scheduler.submit_with_ticket(None, image(3), config()).unwrap();
    timeout(PATIENCE, ticket).await.unwrap().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_drains_queued_work() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&delivered);
    let scheduler = ExtractionScheduler::with_extractor(SleepyExtractor::default());
    scheduler
        .initialize(
            2,
            Some(completion_callback(move |record: &ExtractionRecord| {
                seen.lock().unwrap().push(record.task_id);
            })),
        )
        .unwrap();

    for width in [20, 5, 10, 1, 15] {
        scheduler.submit(image(width), config()).unwrap();
    }
    timeout(PATIENCE, scheduler.shutdown()).await.unwrap();

    let mut delivered = delivered.lock().unwrap().clone();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![0, 1, 2, 3, 4]);

    assert!(matches!(
        scheduler.submit(image(1), config()),
        Err(ConfigurationError::ShutDown)
    ));
    assert!(matches!(
        scheduler.initialize(1, None),
        Err(ConfigurationError::AlreadyInitialized)
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_task_completes_once_within_the_pool(
        pool_size in 1usize..5,
        sleeps in prop::collection::vec(1u32..8, 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let (records, peak, observed) = runtime.block_on(async {
            let extractor = SleepyExtractor::default();
            let peak = Arc::clone(&extractor.peak);
            let scheduler = ExtractionScheduler::with_extractor(extractor);
            let records = Arc::new(Mutex::new(Vec::<ExtractionRecord>::new()));
            let sink = Arc::clone(&records);
            scheduler
                .initialize(
                    pool_size,
                    Some(completion_callback(move |record: &ExtractionRecord| {
                        sink.lock().unwrap().push(record.clone());
                    })),
                )
                .unwrap();

            let mut observed = Vec::new();
            for &sleep in &sleeps {
                scheduler.submit(image(sleep), config()).unwrap();
                observed.push(scheduler.pool_status().await.unwrap());
            }
            let drained = timeout(PATIENCE, async {
                loop {
                    let status = scheduler.pool_status().await.unwrap();
                    observed.push(status);
                    if status.busy == 0 && status.queued == 0 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            });
            drained.await.unwrap();
            timeout(PATIENCE, scheduler.shutdown()).await.unwrap();

            let records = records.lock().unwrap().clone();
            (records, peak, observed)
        });

        for status in &observed {
            prop_assert_eq!(status.pool_size, pool_size);
            prop_assert_eq!(status.idle + status.busy, pool_size);
            // Nothing waits while a worker sits idle.
            prop_assert!(status.idle == 0 || status.queued == 0);
        }
        prop_assert_eq!(observed.last().map(|status| status.idle), Some(pool_size));

        prop_assert_eq!(records.len(), sleeps.len());
        let mut ids: Vec<TaskId> = records.iter().map(|record| record.task_id).collect();
        ids.sort_unstable();
        prop_assert_eq!(ids, (0..sleeps.len() as TaskId).collect::<Vec<_>>());

        for record in &records {
            prop_assert!(record.worker_id < pool_size);
            prop_assert_eq!(echoed_width(record), sleeps[record.task_id as usize]);
        }
        prop_assert!(peak.load(Ordering::SeqCst) <= pool_size);
    }
}
