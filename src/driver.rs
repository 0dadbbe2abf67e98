//! Driver spawns and owns the poll loop

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, Ticker};
use crate::enrichment::Enrichment;
use crate::events::LoggerEvent;
use crate::pipeline::Pipeline;
use crate::sink::RecordSink;
use crate::source::TelemetrySource;
use crate::types::SessionState;
use crate::{LoggerError, Result};

enum Control {
    Pause(oneshot::Sender<Result<()>>),
    Resume(oneshot::Sender<Result<()>>),
}

/// Handle to a running logger.
///
/// Dropping the handle cancels the loop; the open lap is then closed with
/// the shutdown policy. Use [`DriverHandle::stop`] to wait for that.
pub struct DriverHandle {
    events: broadcast::Sender<LoggerEvent>,
    state: watch::Receiver<SessionState>,
    control: mpsc::Sender<Control>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Subscribe to the status stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LoggerEvent> {
        self.events.subscribe()
    }

    /// The status stream as a [`Stream`]. Events missed by a slow consumer
    /// are skipped.
    pub fn event_stream(&self) -> impl Stream<Item = LoggerEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "status consumer lagged");
                    None
                }
            }
        })
    }

    /// Lifecycle state as of the last finished tick
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch the lifecycle state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Control::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(Control::Resume).await
    }

    /// Cancel the loop and wait for the shutdown policy to be applied.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "logger task did not exit cleanly");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    async fn request(&self, make: impl FnOnce(oneshot::Sender<Result<()>>) -> Control) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.control.send(make(tx)).await.map_err(|_| LoggerError::Shutdown)?;
        rx.await.map_err(|_| LoggerError::Shutdown)?
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns the poll loop on the tokio runtime
pub struct Driver;

impl Driver {
    /// Spawn the loop. It runs one pipeline tick per ticker tick until
    /// cancelled or until the ticker ends.
    pub fn spawn<S, E, K, C, T>(pipeline: Pipeline<S, E, K, C>, ticker: T) -> DriverHandle
    where
        S: TelemetrySource,
        E: Enrichment,
        K: RecordSink,
        C: Clock,
        T: Ticker,
    {
        let events = pipeline.event_sender();
        let (state_tx, state_rx) = watch::channel(pipeline.state());
        let (control_tx, control_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Self::poll_task(pipeline, ticker, control_rx, state_tx, cancel.clone()));

        DriverHandle { events, state: state_rx, control: control_tx, cancel, task: Some(task) }
    }

    async fn poll_task<S, E, K, C, T>(
        mut pipeline: Pipeline<S, E, K, C>,
        mut ticker: T,
        mut control: mpsc::Receiver<Control>,
        state: watch::Sender<SessionState>,
        cancel: CancellationToken,
    ) where
        S: TelemetrySource,
        E: Enrichment,
        K: RecordSink,
        C: Clock,
        T: Ticker,
    {
        info!("poll loop started");
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("poll loop cancelled");
                    break;
                }
                Some(request) = control.recv() => {
                    let (reply, result) = match request {
                        Control::Pause(reply) => (reply, pipeline.pause().await),
                        Control::Resume(reply) => (reply, pipeline.resume().await),
                    };
                    state.send_replace(pipeline.state());
                    let _ = reply.send(result);
                }
                running = ticker.tick() => {
                    if !running {
                        debug!("ticker ended");
                        break;
                    }
                    ticks += 1;
                    pipeline.tick().await;
                }
            }
            state.send_replace(pipeline.state());
        }

        pipeline.shutdown().await;
        state.send_replace(pipeline.state());
        info!(ticks, "poll loop ended");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::{ManualClock, ManualTicker};
    use crate::config::LoggerConfig;
    use crate::session::LapPolicy;
    use crate::test_utils::{CountingEnrichment, Frame, MemorySink, ScriptedSource, raw_sample, session_info, test_utc};

    fn spawn(config: &LoggerConfig) -> (DriverHandle, crate::clock::TickHandle, ScriptedSource, MemorySink) {
        let source = ScriptedSource::new();
        let sink = MemorySink::default();
        let pipeline = Pipeline::new(
            config,
            source.clone(),
            CountingEnrichment::default(),
            sink.clone(),
            ManualClock::new(test_utc()),
        );
        let (ticker, ticks) = ManualTicker::new();
        (Driver::spawn(pipeline, ticker), ticks, source, sink)
    }

    #[tokio::test]
    async fn runs_ticks_and_reports_state() {
        let (handle, ticks, source, sink) = spawn(&LoggerConfig::default());

        for (lap, d) in [(1, 0.0), (1, 100.0), (2, 0.0)] {
            source.push(Frame::sample(raw_sample(lap, d, d / 10.0), session_info("Test Track")));
        }
        assert!(ticks.ticks(3).await);

        assert_eq!(handle.state(), SessionState::Logging);
        assert_eq!(sink.records().len(), 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn event_stream_yields_status_events() {
        let (handle, ticks, source, _) = spawn(&LoggerConfig::default());
        let stream = handle.event_stream();

        source.push(Frame::sample(raw_sample(1, 0.0, 0.0), session_info("Test Track")));
        assert!(ticks.tick().await);
        handle.stop().await;

        let events: Vec<_> = stream.collect().await;
        assert!(matches!(events.first(), Some(LoggerEvent::StateChanged { from: SessionState::Idle, .. })));
        assert!(events.iter().any(|e| matches!(e, LoggerEvent::SessionStarted { .. })));
        assert!(matches!(events.last(), Some(LoggerEvent::StateChanged { to: SessionState::Idle, .. })));
    }

    #[tokio::test]
    async fn pause_and_resume_through_handle() {
        let (handle, ticks, source, _) = spawn(&LoggerConfig::default());
        assert!(matches!(handle.pause().await, Err(LoggerError::InvalidTransition { .. })));

        source.push(Frame::sample(raw_sample(1, 0.0, 0.0), session_info("Test Track")));
        assert!(ticks.tick().await);

        assert!(handle.pause().await.is_ok());
        assert_eq!(*handle.watch_state().borrow(), SessionState::Paused);
        assert!(handle.resume().await.is_ok());
        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_applies_shutdown_policy() {
        let config = LoggerConfig { shutdown_policy: LapPolicy::Flush, ..Default::default() };
        let (handle, ticks, source, sink) = spawn(&config);
        let mut state = handle.watch_state();

        source.push(Frame::sample(raw_sample(1, 0.0, 0.0), session_info("Test Track")));
        assert!(ticks.tick().await);
        handle.stop().await;

        assert_eq!(sink.records().len(), 1);
        assert_eq!(*state.borrow_and_update(), SessionState::Idle);
    }

    #[tokio::test]
    async fn dropping_the_ticker_handle_ends_the_loop() {
        let (handle, ticks, _, _) = spawn(&LoggerConfig::default());
        drop(ticks);

        let mut state = handle.watch_state();
        let finished = tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                let _ = state.changed().await;
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(finished.is_ok());
    }
}
