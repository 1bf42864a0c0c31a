//! FeedManager
//!
//! This module drives SNR pulses from bar feeds.
//! Responsibilities:
//!   • Keep one SNR pulse per feed key
//!   • Pre-feed history from the bar source during warm-up
//!   • Spawn per-feed live streams and event processors
//!   • Keep the latest snapshot per feed
//!   • Broadcast valid snapshots to all subscribers of that feed
//!
//! FeedManager is an Arc-managed async service so spawned tasks can hold
//! `self` for as long as the feed lives.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use common::logger::{TraceId, child_span, root_span};
use tokio::sync::{
    Mutex,
    mpsc::{self, Receiver, Sender},
};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, field, info, warn};

use crate::config::SnrConfig;
use crate::error::SnrError;
use crate::feed::BarSource;
use crate::pulse::{Pulse, PulseValidity, SnrPulse, SnrPulseResult};
use crate::types::{
    Bar, DataRequest, FeedEvent, FeedKey, FeedParams, SubscriptionRequest, UnsubscribeRequest,
};

/// Capacity of the channel between a live bar stream and its processor.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-feed pulse state plus the ordering guard.
#[derive(Clone, Debug)]
pub struct FeedPulseState {
    pub snr: SnrPulse,
    pub last_ts_ms: Option<u64>,
}

/// What happened to one bar.
#[derive(Clone, Debug, PartialEq)]
pub enum BarOutcome {
    Applied(SnrPulseResult),

    /// Older than the last applied bar; not fed to the pulse.
    OutOfOrder { last_ts_ms: u64 },

    Rejected(SnrError),
}

impl FeedPulseState {
    pub fn new(snr: SnrPulse) -> Self {
        Self {
            snr,
            last_ts_ms: None,
        }
    }

    /// Feed one bar. Equal timestamps are accepted; older ones are dropped.
    pub fn apply(&mut self, bar: Bar) -> BarOutcome {
        if let Some(last_ts_ms) = self.last_ts_ms {
            if bar.ts_ms < last_ts_ms {
                return BarOutcome::OutOfOrder { last_ts_ms };
            }
        }

        match self.snr.evaluate(bar.into()) {
            Ok(result) => {
                self.last_ts_ms = Some(bar.ts_ms);
                BarOutcome::Applied(result)
            }
            Err(e) => BarOutcome::Rejected(e),
        }
    }
}

/// FeedManager orchestrates bar streaming, SNR evaluation and snapshot
/// broadcasting.
pub struct FeedManager<C> {
    /// Latest snapshot indexed by feed
    pub states: Arc<Mutex<HashMap<FeedKey, SnrPulseResult>>>,

    /// Bar source implementation
    pub source: Arc<C>,

    /// Components interested in receiving snapshots
    pub subscribers: Arc<Mutex<HashMap<FeedKey, Vec<Sender<SnrPulseResult>>>>>,

    /// Per-feed pulse engines
    pub pulses: Arc<Mutex<HashMap<FeedKey, FeedPulseState>>>,

    /// Live stream and processor tasks per feed
    tasks: Mutex<HashMap<FeedKey, Vec<JoinHandle<()>>>>,

    /// Freshly constructed pulse, cloned for every new feed
    template: SnrPulse,

    /// Historical bars requested before going live (0 = none)
    warmup_bars: usize,
}

impl<C: BarSource> FeedManager<C> {
    /// Create a new FeedManager wrapped in Arc<Self> for multi-task ownership.
    ///
    /// The config is validated once here so per-feed construction cannot fail.
    pub fn new(source: Arc<C>, config: SnrConfig, warmup_bars: usize) -> Result<Arc<Self>, SnrError> {
        let template = SnrPulse::new(config)?;

        Ok(Arc::new(Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            source,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            pulses: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(HashMap::new()),
            template,
            warmup_bars,
        }))
    }

    pub fn config(&self) -> &SnrConfig {
        self.template.config()
    }

    /// Subscribe a component to a feed.
    ///
    /// Responsibilities:
    ///   • Store subscriber channel
    ///   • On the first subscriber: create the pulse, pre-feed history,
    ///     start the live stream and its processor
    ///
    /// No lock is held while history is fetched. If the feed is unsubscribed
    /// meanwhile, the subscription is abandoned.
    pub async fn subscribe(self: Arc<Self>, request: SubscriptionRequest) -> anyhow::Result<()> {
        let SubscriptionRequest {
            key,
            params,
            sender_ch,
        } = request;

        {
            let mut map = self.subscribers.lock().await;

            if let Some(existing) = map.get_mut(&key) {
                existing.push(sender_ch);
                info!(feed = %key, subscribers = existing.len(), "added subscriber to existing feed");
                return Ok(());
            }

            // pending entry; the channel is installed once warm-up is done
            map.insert(key.clone(), Vec::new());
        }

        self.pulses
            .lock()
            .await
            .insert(key.clone(), FeedPulseState::new(self.template.clone()));

        if self.warmup_bars > 0 {
            if let Err(e) = self
                .warm_up(&key, params.clone())
                .instrument(child_span("warm_up"))
                .await
            {
                self.subscribers.lock().await.remove(&key);
                self.pulses.lock().await.remove(&key);
                self.states.lock().await.remove(&key);
                return Err(e);
            }

            if let Some(snapshot) = self.snapshot(&key).await {
                if snapshot.validity == PulseValidity::Valid {
                    let _ = sender_ch.send(snapshot).await;
                }
            }
        }

        let mut map = self.subscribers.lock().await;

        let Some(channels) = map.get_mut(&key) else {
            self.pulses.lock().await.remove(&key);
            self.states.lock().await.remove(&key);
            info!(feed = %key, "feed unsubscribed during warm-up");
            return Ok(());
        };
        channels.push(sender_ch);
        info!(feed = %key, "subscribed to bar feed");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let source = Arc::clone(&self.source);
        let stream_key = key.clone();
        let stream_task = tokio::spawn(async move {
            if let Err(e) = source.stream_bars(stream_key.clone(), params, tx).await {
                error!(feed = %stream_key, error = ?e, "bar stream failed");
            }
        });

        let mm = Arc::clone(&self);
        let process_key = key.clone();
        let process_task = tokio::spawn(async move {
            mm.process_event_stream(rx, process_key).await;
        });

        self.tasks
            .lock()
            .await
            .insert(key, vec![stream_task, process_task]);
        drop(map);

        Ok(())
    }

    /// Stop a feed: drop its subscribers, tasks, pulse and snapshot.
    ///
    /// Returns `false` if the feed was not subscribed.
    pub async fn unsubscribe(&self, request: UnsubscribeRequest) -> bool {
        let UnsubscribeRequest { key } = request;

        let was_subscribed = self.subscribers.lock().await.remove(&key).is_some();

        if let Some(handles) = self.tasks.lock().await.remove(&key) {
            for handle in handles {
                handle.abort();
            }
        }
        self.pulses.lock().await.remove(&key);
        self.states.lock().await.remove(&key);

        if was_subscribed {
            info!(feed = %key, "unsubscribed from bar feed");
        }
        was_subscribed
    }

    /// Pre-feed up to `warmup_bars` historical bars into the feed's pulse.
    ///
    /// Returns the number of bars applied.
    pub async fn warm_up(&self, key: &FeedKey, params: Option<FeedParams>) -> anyhow::Result<usize> {
        let req = DataRequest {
            key: key.clone(),
            limit: self.warmup_bars,
            params,
        };

        let resp = self
            .source
            .request_bars(req)
            .await
            .with_context(|| format!("historical bar request failed for {key}"))?;

        anyhow::ensure!(
            resp.key == *key,
            "historical response for {} does not match request {}",
            resp.key,
            key
        );

        let mut applied = 0;
        for bar in resp.bars {
            if self.apply_bar(key, bar).await.is_some() {
                applied += 1;
            }
        }

        info!(feed = %key, applied, "warm-up history applied");
        Ok(applied)
    }

    /// Process incoming events for a single feed.
    ///
    /// Responsibilities:
    ///   • Feed bars to the pulse, in arrival order
    ///   • Store the latest snapshot
    ///   • Notify subscribers once the pulse is valid
    pub async fn process_event_stream(self: Arc<Self>, mut event_rx: Receiver<FeedEvent>, key: FeedKey) {
        let trace_id = TraceId::new();
        let span = root_span("snr_feed", &trace_id);
        span.record("feed_id", &field::display(&key));

        async move {
            while let Some(event) = event_rx.recv().await {
                let bar = match event {
                    FeedEvent::Bar(bar) => bar,
                    FeedEvent::KeepAlive => continue,
                    FeedEvent::Unsubscribed { key: upstream } => {
                        info!(feed = %upstream, "feed closed upstream");
                        break;
                    }
                };

                if let Some(snapshot) = self.apply_bar(&key, bar).await {
                    if snapshot.validity == PulseValidity::Valid {
                        self.broadcast(&key, snapshot).await;
                    }
                }
            }

            info!(feed = %key, "bar stream ended");
        }
        .instrument(span)
        .await
    }

    /// Latest snapshot for a feed, if any bar has been applied.
    pub async fn snapshot(&self, key: &FeedKey) -> Option<SnrPulseResult> {
        self.states.lock().await.get(key).copied()
    }

    /// Apply one bar and store the resulting snapshot.
    ///
    /// Bars for feeds without a pulse (never subscribed, or already
    /// unsubscribed) are dropped.
    async fn apply_bar(&self, key: &FeedKey, bar: Bar) -> Option<SnrPulseResult> {
        let mut pulses = self.pulses.lock().await;
        let Some(state) = pulses.get_mut(key) else {
            debug!(feed = %key, ts_ms = bar.ts_ms, "bar for unsubscribed feed dropped");
            return None;
        };

        match state.apply(bar) {
            BarOutcome::Applied(snapshot) => {
                // still under the pulses guard: unsubscribe must not interleave
                self.states.lock().await.insert(key.clone(), snapshot);
                Some(snapshot)
            }
            BarOutcome::OutOfOrder { last_ts_ms } => {
                warn!(
                    feed = %key,
                    ts_ms = bar.ts_ms,
                    last_ts_ms,
                    "out-of-order bar dropped"
                );
                None
            }
            BarOutcome::Rejected(e) => {
                warn!(feed = %key, error = %e, "bar rejected");
                None
            }
        }
    }

    async fn broadcast(&self, key: &FeedKey, snapshot: SnrPulseResult) {
        let mut subs = self.subscribers.lock().await;

        let Some(channels) = subs.get_mut(key) else {
            return;
        };

        let mut open = Vec::with_capacity(channels.len());
        for ch in channels.drain(..) {
            if ch.send(snapshot).await.is_ok() {
                open.push(ch);
            } else {
                debug!(feed = %key, "dropping closed subscriber");
            }
        }
        *channels = open;
    }
}
