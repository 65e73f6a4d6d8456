use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::PilotErr;
use crate::error::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One decoded still frame from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// The device flagged this screen as secure; the console blanks it.
    pub is_sensitive: bool,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Where frames come from. The backend client is the production source; tests
/// substitute their own.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn fetch_frame(&self, device_id: &str) -> Result<Frame>;
}

#[async_trait]
impl FrameSource for phonepilot_backend_client::Client {
    async fn fetch_frame(&self, device_id: &str) -> Result<Frame> {
        let shot = self.screenshot(device_id).await?;
        if !shot.success {
            return Err(PilotErr::Screenshot(
                shot.error
                    .unwrap_or_else(|| "backend reported a failed capture".to_string()),
            ));
        }
        let data = BASE64.decode(shot.base64_data.as_bytes())?;
        Ok(Frame {
            width: shot.width,
            height: shot.height,
            is_sensitive: shot.is_sensitive,
            data,
            captured_at: Utc::now(),
        })
    }
}

/// Fetches still frames on a fixed cadence while the screenshot transport is
/// active.
///
/// Overlap suppression is structural: the fetch is awaited inside the tick
/// loop, and missed ticks are skipped rather than queued, so a slow backend
/// produces late frames instead of a pile-up of concurrent requests. A
/// response that lands after the panel moved on (stop, or the owner bumped
/// the display generation for a device switch) is discarded instead of being
/// applied to the wrong device.
pub struct ScreenshotPoller {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl ScreenshotPoller {
    pub fn spawn(
        source: Arc<dyn FrameSource>,
        device_id: String,
        interval: Duration,
        frames: watch::Sender<Option<Frame>>,
        current_generation: Arc<AtomicU64>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let generation = current_generation.load(Ordering::SeqCst);
        let join = tokio::spawn(poll_loop(
            source,
            device_id,
            interval,
            frames,
            current_generation,
            generation,
            cancel.clone(),
        ));
        Self {
            cancel,
            join: Some(join),
        }
    }

    /// Stops polling immediately. Does not wait for an in-flight fetch; its
    /// result, if any, is discarded by the generation/cancel checks.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn stopped(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for ScreenshotPoller {
    fn drop(&mut self) {
        // A dropped poller must not keep a timer alive across device
        // switches.
        self.cancel.cancel();
    }
}

#[allow(clippy::too_many_arguments)]
async fn poll_loop(
    source: Arc<dyn FrameSource>,
    device_id: String,
    interval: Duration,
    frames: watch::Sender<Option<Frame>>,
    current_generation: Arc<AtomicU64>,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        match source.fetch_frame(&device_id).await {
            Ok(frame) => {
                if cancel.is_cancelled()
                    || current_generation.load(Ordering::SeqCst) != generation
                {
                    debug!("discarding stale frame for {device_id}");
                    return;
                }
                let _ = frames.send(Some(frame));
            }
            Err(err) => {
                if cancel.is_cancelled() {
                    return;
                }
                debug!("screenshot poll for {device_id} failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use pretty_assertions::assert_eq;

    struct StubSource {
        delay: Duration,
        fetches: AtomicUsize,
        in_flight: AtomicBool,
        overlapped: AtomicBool,
    }

    impl StubSource {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                fetches: AtomicUsize::new(0),
                in_flight: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
            }
        }

        fn frame() -> Frame {
            Frame {
                width: 1080,
                height: 2400,
                is_sensitive: false,
                data: vec![1, 2, 3],
                captured_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl FrameSource for StubSource {
        async fn fetch_frame(&self, _device_id: &str) -> Result<Frame> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(Self::frame())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_cadence_and_publishes_frames() {
        let source = Arc::new(StubSource::new(Duration::from_millis(10)));
        let (tx, mut rx) = watch::channel(None);
        let generation = Arc::new(AtomicU64::new(0));
        let poller = ScreenshotPoller::spawn(
            source.clone(),
            "dev-1".into(),
            Duration::from_millis(500),
            tx,
            generation,
        );

        tokio::time::sleep(Duration::from_millis(1600)).await;
        poller.stopped().await;

        assert!(source.fetches.load(Ordering::SeqCst) >= 2);
        let frame = rx.borrow_and_update().clone().expect("no frame published");
        assert_eq!((frame.width, frame.height), (1080, 2400));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_never_overlap_and_ticks_are_skipped() {
        // Each fetch takes 1200ms against a 500ms cadence: queued ticks would
        // fire five fetches inside 5s, skipping keeps it at four or fewer.
        let source = Arc::new(StubSource::new(Duration::from_millis(1200)));
        let (tx, _rx) = watch::channel(None);
        let generation = Arc::new(AtomicU64::new(0));
        let poller = ScreenshotPoller::spawn(
            source.clone(),
            "dev-1".into(),
            Duration::from_millis(500),
            tx,
            generation,
        );

        tokio::time::sleep(Duration::from_millis(5000)).await;
        poller.stopped().await;

        assert!(!source.overlapped.load(Ordering::SeqCst), "fetches overlapped");
        let fetches = source.fetches.load(Ordering::SeqCst);
        assert!((2..=4).contains(&fetches), "unexpected fetch count {fetches}");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_frame_is_discarded() {
        let source = Arc::new(StubSource::new(Duration::from_millis(100)));
        let (tx, rx) = watch::channel(None);
        let generation = Arc::new(AtomicU64::new(0));
        let poller = ScreenshotPoller::spawn(
            source.clone(),
            "dev-1".into(),
            Duration::from_millis(500),
            tx,
            generation.clone(),
        );

        // Device switched while the first fetch is still in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        generation.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(*rx.borrow(), None);
        // The loop noticed the stale generation and exited on its own.
        poller.stopped().await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_polling_immediately() {
        let source = Arc::new(StubSource::new(Duration::from_millis(10)));
        let (tx, _rx) = watch::channel(None);
        let generation = Arc::new(AtomicU64::new(0));
        let poller = ScreenshotPoller::spawn(
            source.clone(),
            "dev-1".into(),
            Duration::from_millis(500),
            tx,
            generation,
        );

        tokio::time::sleep(Duration::from_millis(600)).await;
        poller.stopped().await;
        let after_stop = source.fetches.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), after_stop);
    }
}
