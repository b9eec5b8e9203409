//! Passive advertisement scanner
//!
//! Manufacturer data seen while scanning is decoded into a 32-bit token and
//! handed to a `DetectionHandler` as an independent unit of work. Units run
//! on a bounded `JoinSet`; the scan loop never waits for them.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use futures::stream::{Stream, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::config::{ConfigError, ScanConfig, ShutdownPolicy};
use crate::message::{decode_token, MessageRouter, Payload};

/// Errors for scanning
#[derive(Error, Debug, Clone)]
pub enum ScannerError {
    #[error("No Bluetooth adapter found")]
    NoAdapter,
    #[error("Adapter error: {0}")]
    Adapter(String),
    #[error("Scan handler failed: {0}")]
    HandlerFailure(String),
    #[error("Invalid scan configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<btleplug::Error> for ScannerError {
    fn from(e: btleplug::Error) -> Self {
        ScannerError::Adapter(e.to_string())
    }
}

/// One advertisement carrying manufacturer data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub address: String,
    /// Company identifier -> raw bytes
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

/// Producer of detections
#[async_trait]
pub trait DetectionSource: Send {
    async fn start(&mut self) -> Result<(), ScannerError>;

    /// Next detection; `None` once the source is exhausted
    async fn next_detection(&mut self) -> Option<Detection>;

    async fn stop(&mut self) -> Result<(), ScannerError>;
}

/// Consumer of one decoded detection
#[async_trait]
pub trait DetectionHandler: Send + Sync + 'static {
    async fn handle_detection(&self, device: String, token: u32) -> Result<(), ScannerError>;
}

#[async_trait]
impl DetectionHandler for MessageRouter {
    async fn handle_detection(&self, device: String, token: u32) -> Result<(), ScannerError> {
        self.handle(&device, Payload::Token(token))
            .map(|_| ())
            .map_err(|e| ScannerError::HandlerFailure(e.to_string()))
    }
}

type EventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Detection source backed by the host adapter through btleplug
pub struct BtleplugSource {
    adapter: Adapter,
    events: Option<EventStream>,
}

impl BtleplugSource {
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            events: None,
        }
    }

    /// Use the first adapter the platform reports
    pub async fn first_adapter() -> Result<Self, ScannerError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(ScannerError::NoAdapter)?;
        Ok(Self::new(adapter))
    }
}

#[async_trait]
impl DetectionSource for BtleplugSource {
    async fn start(&mut self) -> Result<(), ScannerError> {
        self.events = Some(self.adapter.events().await?);
        self.adapter.start_scan(ScanFilter::default()).await?;
        tracing::info!("Passive scan started");
        Ok(())
    }

    async fn next_detection(&mut self) -> Option<Detection> {
        let events = self.events.as_mut()?;
        while let Some(event) = events.next().await {
            if let CentralEvent::ManufacturerDataAdvertisement {
                id,
                manufacturer_data,
            } = event
            {
                let address = match self.adapter.peripheral(&id).await {
                    Ok(peripheral) => peripheral.address().to_string(),
                    Err(_) => format!("{:?}", id),
                };
                return Some(Detection {
                    address,
                    manufacturer_data: manufacturer_data.into_iter().collect(),
                });
            }
        }
        None
    }

    async fn stop(&mut self) -> Result<(), ScannerError> {
        self.events = None;
        self.adapter.stop_scan().await?;
        tracing::info!("Passive scan stopped");
        Ok(())
    }
}

/// Counters collected over one scan window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub detections: usize,
    pub dispatched: usize,
    /// Units skipped because `max_in_flight` units were already running
    pub dropped: usize,
    pub completed: usize,
    pub failed: usize,
    /// Units aborted at shutdown
    pub abandoned: usize,
    /// Addresses seen during the window
    pub seen: BTreeSet<String>,
}

/// One scan window
pub struct ScanSession;

impl ScanSession {
    /// Scan until `config.timeout` elapses or the source ends, then apply the shutdown policy
    pub async fn run<S, H>(
        source: &mut S,
        handler: Arc<H>,
        config: &ScanConfig,
    ) -> Result<ScanReport, ScannerError>
    where
        S: DetectionSource + ?Sized,
        H: DetectionHandler,
    {
        config.validate()?;
        source.start().await?;

        let permits = Arc::new(Semaphore::new(config.max_in_flight));
        let mut tasks: JoinSet<Result<(), ScannerError>> = JoinSet::new();
        let mut report = ScanReport::default();

        let deadline = tokio::time::sleep(config.timeout());
        tokio::pin!(deadline);

        // Detections are pulled by one long-lived future and handed over on a
        // channel, so a select! wake-up never drops a half-read detection.
        let (detection_tx, mut detection_rx) = mpsc::channel::<Detection>(config.max_in_flight);
        {
            let reader = &mut *source;
            let producer = async move {
                while let Some(detection) = reader.next_detection().await {
                    if detection_tx.send(detection).await.is_err() {
                        break;
                    }
                }
            };
            tokio::pin!(producer);
            let mut producer_done = false;

            loop {
                tokio::select! {
                    _ = &mut deadline => {
                        tracing::info!("Scan window closed");
                        break;
                    }
                    _ = &mut producer, if !producer_done => {
                        producer_done = true;
                    }
                    detection = detection_rx.recv() => {
                        let Some(detection) = detection else {
                            tracing::info!("Detection source ended");
                            break;
                        };
                        Self::dispatch(&mut report, &mut tasks, &permits, &handler, detection);
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        Self::record(&mut report, joined);
                    }
                }
            }
        }

        if let Err(e) = source.stop().await {
            tracing::warn!("Failed to stop scan: {}", e);
        }

        match config.shutdown {
            ShutdownPolicy::Drain { grace_ms } => {
                let drained = tokio::time::timeout(Duration::from_millis(grace_ms), async {
                    while let Some(joined) = tasks.join_next().await {
                        Self::record(&mut report, joined);
                    }
                })
                .await;
                if drained.is_err() {
                    tracing::warn!(pending = tasks.len(), "Drain grace expired, aborting scan handlers");
                    report.abandoned += tasks.len();
                    tasks.abort_all();
                }
            }
            ShutdownPolicy::Abandon => {
                report.abandoned += tasks.len();
                tasks.abort_all();
            }
        }
        while tasks.join_next().await.is_some() {}

        tracing::info!(
            detections = report.detections,
            dispatched = report.dispatched,
            dropped = report.dropped,
            failed = report.failed,
            abandoned = report.abandoned,
            "Scan finished"
        );
        Ok(report)
    }

    fn dispatch<H: DetectionHandler>(
        report: &mut ScanReport,
        tasks: &mut JoinSet<Result<(), ScannerError>>,
        permits: &Arc<Semaphore>,
        handler: &Arc<H>,
        detection: Detection,
    ) {
        report.detections += 1;
        report.seen.insert(detection.address.clone());

        for (company, data) in &detection.manufacturer_data {
            let token = decode_token(data);
            let Ok(permit) = permits.clone().try_acquire_owned() else {
                tracing::warn!(
                    device = %detection.address,
                    company,
                    "Too many scan handlers in flight, dropping detection"
                );
                report.dropped += 1;
                continue;
            };
            let handler = handler.clone();
            let device = detection.address.clone();
            tasks.spawn(async move {
                let _permit = permit;
                handler.handle_detection(device, token).await
            });
            report.dispatched += 1;
        }
    }

    fn record(report: &mut ScanReport, joined: Result<Result<(), ScannerError>, JoinError>) {
        match joined {
            Ok(Ok(())) => report.completed += 1,
            Ok(Err(e)) => {
                tracing::warn!("Scan handler failed: {}", e);
                report.failed += 1;
            }
            Err(e) if e.is_panic() => {
                tracing::error!("Scan handler panicked: {}", e);
                report.failed += 1;
            }
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct QueueSource {
        queue: VecDeque<Detection>,
        end_when_empty: bool,
        started: bool,
        stopped: bool,
    }

    impl QueueSource {
        fn new(detections: Vec<Detection>, end_when_empty: bool) -> Self {
            Self {
                queue: detections.into(),
                end_when_empty,
                started: false,
                stopped: false,
            }
        }
    }

    #[async_trait]
    impl DetectionSource for QueueSource {
        async fn start(&mut self) -> Result<(), ScannerError> {
            self.started = true;
            Ok(())
        }

        async fn next_detection(&mut self) -> Option<Detection> {
            match self.queue.pop_front() {
                Some(detection) => Some(detection),
                None if self.end_when_empty => None,
                None => std::future::pending().await,
            }
        }

        async fn stop(&mut self) -> Result<(), ScannerError> {
            self.stopped = true;
            Ok(())
        }
    }

    struct SlowHandler {
        delay: Duration,
        handled: AtomicUsize,
    }

    #[async_trait]
    impl DetectionHandler for SlowHandler {
        async fn handle_detection(&self, _device: String, _token: u32) -> Result<(), ScannerError> {
            tokio::time::sleep(self.delay).await;
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl DetectionHandler for PanickingHandler {
        async fn handle_detection(&self, _device: String, token: u32) -> Result<(), ScannerError> {
            if token == 0 {
                panic!("bad token");
            }
            Err(ScannerError::HandlerFailure("rejected".into()))
        }
    }

    fn detection(address: &str, data: &[u8]) -> Detection {
        Detection {
            address: address.to_string(),
            manufacturer_data: BTreeMap::from([(0xFFFF, data.to_vec())]),
        }
    }

    fn slow(delay_secs: u64) -> Arc<SlowHandler> {
        Arc::new(SlowHandler {
            delay: Duration::from_secs(delay_secs),
            handled: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_end_finishes_scan_and_drains() {
        let mut source = QueueSource::new(
            vec![
                detection("AA:BB:CC:DD:EE:01", &[1, 0, 0, 0]),
                detection("AA:BB:CC:DD:EE:02", &[2, 0, 0, 0]),
            ],
            true,
        );
        let handler = slow(1);
        let report = ScanSession::run(&mut source, handler.clone(), &ScanConfig::default())
            .await
            .expect("Scan");

        assert!(source.started && source.stopped);
        assert_eq!(report.detections, 2);
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.completed, 2);
        assert_eq!(report.abandoned, 0);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
        assert!(report.seen.contains("AA:BB:CC:DD:EE:02"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_handlers_drop_detections() {
        let mut source = QueueSource::new(
            vec![
                detection("AA:BB:CC:DD:EE:01", &[1]),
                detection("AA:BB:CC:DD:EE:02", &[2]),
                detection("AA:BB:CC:DD:EE:03", &[3]),
            ],
            false,
        );
        let config = ScanConfig {
            timeout_secs: 5,
            max_in_flight: 1,
            shutdown: ShutdownPolicy::Abandon,
        };
        let handler = slow(10);
        let report = ScanSession::run(&mut source, handler.clone(), &config)
            .await
            .expect("Scan");

        assert_eq!(report.detections, 3);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.dropped, 2);
        assert_eq!(report.abandoned, 1);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_within_grace() {
        let mut source = QueueSource::new(vec![detection("AA:BB:CC:DD:EE:01", &[1])], false);
        let config = ScanConfig {
            timeout_secs: 1,
            max_in_flight: 4,
            shutdown: ShutdownPolicy::Drain { grace_ms: 5_000 },
        };
        let handler = slow(3);
        let report = ScanSession::run(&mut source, handler.clone(), &config)
            .await
            .expect("Scan");
        assert_eq!(report.completed, 1);
        assert_eq!(report.abandoned, 0);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_after_grace() {
        let mut source = QueueSource::new(vec![detection("AA:BB:CC:DD:EE:01", &[1])], false);
        let config = ScanConfig {
            timeout_secs: 1,
            max_in_flight: 4,
            shutdown: ShutdownPolicy::Drain { grace_ms: 1_000 },
        };
        let handler = slow(30);
        let report = ScanSession::run(&mut source, handler.clone(), &config)
            .await
            .expect("Scan");
        assert_eq!(report.completed, 0);
        assert_eq!(report.abandoned, 1);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_errors_and_panics_are_contained() {
        let mut source = QueueSource::new(
            vec![
                detection("AA:BB:CC:DD:EE:01", &[0, 0, 0, 0]),
                detection("AA:BB:CC:DD:EE:02", &[7]),
            ],
            true,
        );
        let report = ScanSession::run(&mut source, Arc::new(PanickingHandler), &ScanConfig::default())
            .await
            .expect("Scan survives failing handlers");
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.completed, 0);
    }

    /// Yields each detection only after an await, the way a radio event stream does
    struct PacedSource {
        queue: VecDeque<Detection>,
        pace: Duration,
    }

    #[async_trait]
    impl DetectionSource for PacedSource {
        async fn start(&mut self) -> Result<(), ScannerError> {
            Ok(())
        }

        async fn next_detection(&mut self) -> Option<Detection> {
            let detection = self.queue.pop_front()?;
            tokio::time::sleep(self.pace).await;
            Some(detection)
        }

        async fn stop(&mut self) -> Result<(), ScannerError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_detections_survive_handler_completions() {
        let mut source = PacedSource {
            queue: (1..=5u8)
                .map(|i| detection(&format!("AA:BB:CC:DD:EE:0{}", i), &[i]))
                .collect(),
            pace: Duration::from_millis(5),
        };
        let handler = slow(0);
        let report = ScanSession::run(&mut source, handler.clone(), &ScanConfig::default())
            .await
            .expect("Scan");

        assert_eq!(report.detections, 5);
        assert_eq!(report.dispatched, 5);
        assert_eq!(report.completed, 5);
        assert_eq!(report.seen.len(), 5);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_start() {
        let mut source = QueueSource::new(vec![], true);
        let config = ScanConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        let result = ScanSession::run(&mut source, slow(0), &config).await;
        assert!(matches!(result, Err(ScannerError::Config(_))));
        assert!(!source.started);
    }

    #[tokio::test]
    async fn test_router_handles_tokens() {
        use crate::config::AuthPolicy;
        use crate::identity::IdentityVerifier;

        let router = Arc::new(MessageRouter::new(
            IdentityVerifier::new(["AA:BB:CC:DD:EE:FF"]),
            AuthPolicy::Enforce,
        ));
        let mut rx = router.subscribe();

        router
            .handle_detection("aa:bb:cc:dd:ee:ff".into(), 0x1234)
            .await
            .expect("Known device");
        let msg = rx.recv().await.expect("Published");
        assert_eq!(msg.payload, Payload::Token(0x1234));

        let err = router
            .handle_detection("11:22:33:44:55:66".into(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ScannerError::HandlerFailure(_)));
    }
}
