use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::models::{
    ItemId, OutcomeType, RecommendationEvent, ScoredItem, StrategyPerformance, StrategyTag, UserId,
};

/// Message for asynchronous event-log writes
enum TrackMessage {
    Exposure(RecommendationEvent),
    Outcome {
        user_id: UserId,
        item_id: ItemId,
        outcome: OutcomeType,
        value: Option<f64>,
        at: DateTime<Utc>,
    },
}

/// Overall recommendation statistics for a time window
#[derive(Debug, Serialize)]
pub struct RecommendationStats {
    pub period_days: i64,
    pub total_recommendations: u64,
    pub total_clicks: u64,
    pub total_ratings: u64,
    pub avg_rating: Option<f64>,
    pub overall_ctr: f64,
    pub overall_rating_rate: f64,
}

/// Records exposures and outcomes for strategy comparison
///
/// Writes flow through a background task fed by an unbounded channel, so
/// tracking adds no latency to the request that triggered it and is safe to
/// retry. Reads (performance aggregation) take the log lock briefly.
#[derive(Clone)]
pub struct EventTracker {
    log: Arc<RwLock<Vec<RecommendationEvent>>>,
    write_tx: mpsc::UnboundedSender<TrackMessage>,
}

/// Handle for gracefully shutting down the event writer
pub struct EventWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl EventWriterHandle {
    /// Initiates a graceful shutdown of the event writer
    ///
    /// Sends a shutdown signal to the writer task and waits for it to flush
    /// all pending messages into the log.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Event writer shutdown signal sent");
    }
}

impl EventTracker {
    /// Creates a new tracker with its background writer task
    pub fn new() -> (Self, EventWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let log = Arc::new(RwLock::new(Vec::new()));

        let writer_log = Arc::clone(&log);
        tokio::spawn(async move {
            Self::event_writer_task(writer_log, write_rx, shutdown_rx).await;
        });

        let tracker = Self { log, write_tx };
        let handle = EventWriterHandle { shutdown_tx };

        (tracker, handle)
    }

    /// Background task that applies tracking messages to the log
    ///
    /// On shutdown signal, drains all remaining messages before exiting.
    async fn event_writer_task(
        log: Arc<RwLock<Vec<RecommendationEvent>>>,
        mut write_rx: mpsc::UnboundedReceiver<TrackMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Event writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    Self::apply(&log, msg).await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Event writer shutting down, flushing remaining messages");
                    while let Ok(msg) = write_rx.try_recv() {
                        Self::apply(&log, msg).await;
                    }
                    tracing::info!("Event writer task stopped");
                    break;
                }
            }
        }
    }

    async fn apply(log: &RwLock<Vec<RecommendationEvent>>, msg: TrackMessage) {
        let mut events = log.write().await;
        match msg {
            TrackMessage::Exposure(event) => events.push(event),
            TrackMessage::Outcome {
                user_id,
                item_id,
                outcome,
                value,
                at,
            } => {
                // Target the most recent exposure for this user-item pair
                let Some(event) = events
                    .iter_mut()
                    .rev()
                    .find(|e| e.user_id == user_id && e.item_id == item_id)
                else {
                    tracing::debug!(user_id, item_id, "Outcome without matching exposure");
                    return;
                };

                match outcome {
                    OutcomeType::Click => {
                        // Idempotent under retries: the first click wins
                        if event.clicked_at.is_none() {
                            event.clicked_at = Some(at);
                        }
                    }
                    OutcomeType::Rating => {
                        event.rated_at = Some(at);
                        event.rating_value = value;
                    }
                    OutcomeType::ThumbsUp => {
                        if event.thumbs_up {
                            // Re-activating the active thumb clears both
                            event.thumbs_up = false;
                            event.thumbs_up_at = None;
                        } else {
                            event.thumbs_up = true;
                            event.thumbs_up_at = Some(at);
                        }
                        event.thumbs_down = false;
                        event.thumbs_down_at = None;
                    }
                    OutcomeType::ThumbsDown => {
                        if event.thumbs_down {
                            event.thumbs_down = false;
                            event.thumbs_down_at = None;
                        } else {
                            event.thumbs_down = true;
                            event.thumbs_down_at = Some(at);
                        }
                        event.thumbs_up = false;
                        event.thumbs_up_at = None;
                    }
                }
            }
        }
    }

    /// Records one exposure, returning its event id immediately
    ///
    /// The write itself happens on the background task.
    pub fn record_exposure(
        &self,
        user_id: UserId,
        item_id: ItemId,
        strategy: StrategyTag,
        position: usize,
        score: f64,
    ) -> Uuid {
        let event = RecommendationEvent::new(user_id, item_id, strategy, position, score);
        let event_id = event.id;

        if let Err(e) = self.write_tx.send(TrackMessage::Exposure(event)) {
            tracing::error!(error = %e, "Failed to queue exposure event");
        }
        event_id
    }

    /// Records a whole returned list as exposures, one per position
    pub fn record_list(&self, user_id: UserId, items: &[ScoredItem]) {
        for (idx, item) in items.iter().enumerate() {
            self.record_exposure(user_id, item.item_id, item.strategy, idx + 1, item.score);
        }
    }

    /// Records a user outcome against the most recent matching exposure
    ///
    /// Fire-and-forget: the update is applied by the background task.
    pub fn record_outcome(
        &self,
        user_id: UserId,
        item_id: ItemId,
        outcome: OutcomeType,
        value: Option<f64>,
    ) {
        let msg = TrackMessage::Outcome {
            user_id,
            item_id,
            outcome,
            value,
            at: Utc::now(),
        };
        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to queue outcome event");
        }
    }

    /// Per-strategy performance over a trailing window
    ///
    /// With `strategy` set, the map holds that one entry; otherwise one entry
    /// per strategy seen in the window.
    pub async fn performance(
        &self,
        strategy: Option<StrategyTag>,
        window_days: i64,
    ) -> HashMap<String, StrategyPerformance> {
        let cutoff = Utc::now() - Duration::days(window_days);
        let events = self.log.read().await;

        let mut grouped: HashMap<StrategyTag, Vec<&RecommendationEvent>> = HashMap::new();
        for event in events.iter().filter(|e| e.exposed_at >= cutoff) {
            if strategy.is_some_and(|s| s != event.strategy) {
                continue;
            }
            grouped.entry(event.strategy).or_default().push(event);
        }

        grouped
            .into_iter()
            .map(|(tag, events)| {
                let exposures = events.len() as u64;
                let clicks = events.iter().filter(|e| e.clicked_at.is_some()).count();
                let ups = events.iter().filter(|e| e.thumbs_up).count();
                let downs = events.iter().filter(|e| e.thumbs_down).count();
                let ratings: Vec<f64> =
                    events.iter().filter_map(|e| e.rating_value).collect();

                let rate = |count: usize| count as f64 / exposures as f64;
                let avg_rating_given = if ratings.is_empty() {
                    None
                } else {
                    Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
                };

                (
                    tag.to_string(),
                    StrategyPerformance {
                        exposures,
                        click_rate: rate(clicks),
                        thumbs_up_rate: rate(ups),
                        thumbs_down_rate: rate(downs),
                        avg_rating_given,
                    },
                )
            })
            .collect()
    }

    /// Overall exposure/outcome counts for a trailing window
    pub async fn stats(&self, window_days: i64) -> RecommendationStats {
        let cutoff = Utc::now() - Duration::days(window_days);
        let events = self.log.read().await;

        let windowed: Vec<&RecommendationEvent> =
            events.iter().filter(|e| e.exposed_at >= cutoff).collect();

        let total = windowed.len() as u64;
        let clicks = windowed.iter().filter(|e| e.clicked_at.is_some()).count() as u64;
        let ratings: Vec<f64> = windowed.iter().filter_map(|e| e.rating_value).collect();

        let pct = |count: u64| {
            if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        };

        RecommendationStats {
            period_days: window_days,
            total_recommendations: total,
            total_clicks: clicks,
            total_ratings: ratings.len() as u64,
            avg_rating: if ratings.is_empty() {
                None
            } else {
                Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
            },
            overall_ctr: pct(clicks),
            overall_rating_rate: pct(ratings.len() as u64),
        }
    }

    /// Snapshot of an event by id, for tests and debugging
    pub async fn event(&self, event_id: Uuid) -> Option<RecommendationEvent> {
        let events = self.log.read().await;
        events.iter().find(|e| e.id == event_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    async fn settle() {
        // Give the background writer time to drain the channel
        tokio::time::sleep(StdDuration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_exposure_then_click_is_idempotent() {
        let (tracker, _handle) = EventTracker::new();

        let event_id = tracker.record_exposure(1, 10, StrategyTag::Latent, 1, 4.2);
        tracker.record_outcome(1, 10, OutcomeType::Click, None);
        settle().await;

        let event = tracker.event(event_id).await.unwrap();
        let first_click = event.clicked_at.unwrap();

        // A retried click does not move the timestamp
        tracker.record_outcome(1, 10, OutcomeType::Click, None);
        settle().await;
        let event = tracker.event(event_id).await.unwrap();
        assert_eq!(event.clicked_at.unwrap(), first_click);
    }

    #[tokio::test]
    async fn test_outcome_targets_most_recent_exposure() {
        let (tracker, _handle) = EventTracker::new();

        let older = tracker.record_exposure(1, 10, StrategyTag::Content, 3, 2.0);
        let newer = tracker.record_exposure(1, 10, StrategyTag::Latent, 1, 4.0);
        tracker.record_outcome(1, 10, OutcomeType::Rating, Some(4.5));
        settle().await;

        assert!(tracker.event(older).await.unwrap().rating_value.is_none());
        assert_eq!(
            tracker.event(newer).await.unwrap().rating_value,
            Some(4.5)
        );
    }

    #[tokio::test]
    async fn test_thumbs_toggle_sequence() {
        let (tracker, _handle) = EventTracker::new();
        let event_id = tracker.record_exposure(1, 10, StrategyTag::Neighborhood, 2, 3.0);

        // Up then down leaves only down set
        tracker.record_outcome(1, 10, OutcomeType::ThumbsUp, None);
        tracker.record_outcome(1, 10, OutcomeType::ThumbsDown, None);
        settle().await;
        let event = tracker.event(event_id).await.unwrap();
        assert!(!event.thumbs_up);
        assert!(event.thumbs_down);

        // A second down toggles both back off
        tracker.record_outcome(1, 10, OutcomeType::ThumbsDown, None);
        settle().await;
        let event = tracker.event(event_id).await.unwrap();
        assert!(!event.thumbs_up);
        assert!(!event.thumbs_down);
        assert!(event.thumbs_up_at.is_none());
        assert!(event.thumbs_down_at.is_none());
    }

    #[tokio::test]
    async fn test_outcome_without_exposure_is_ignored() {
        let (tracker, _handle) = EventTracker::new();
        tracker.record_outcome(1, 10, OutcomeType::Click, None);
        settle().await;

        let stats = tracker.stats(7).await;
        assert_eq!(stats.total_recommendations, 0);
        assert_eq!(stats.total_clicks, 0);
    }

    #[tokio::test]
    async fn test_performance_aggregates_per_strategy() {
        let (tracker, _handle) = EventTracker::new();

        for item_id in [10, 11, 12, 13] {
            tracker.record_exposure(1, item_id, StrategyTag::Latent, 1, 4.0);
        }
        tracker.record_exposure(1, 20, StrategyTag::Content, 5, 2.0);

        tracker.record_outcome(1, 10, OutcomeType::Click, None);
        tracker.record_outcome(1, 11, OutcomeType::Click, None);
        tracker.record_outcome(1, 12, OutcomeType::Rating, Some(5.0));
        tracker.record_outcome(1, 13, OutcomeType::ThumbsDown, None);
        settle().await;

        let all = tracker.performance(None, 30).await;
        assert_eq!(all.len(), 2);

        let latent = &all["latent"];
        assert_eq!(latent.exposures, 4);
        assert_eq!(latent.click_rate, 0.5);
        assert_eq!(latent.thumbs_down_rate, 0.25);
        assert_eq!(latent.avg_rating_given, Some(5.0));

        let only_content = tracker.performance(Some(StrategyTag::Content), 30).await;
        assert_eq!(only_content.len(), 1);
        assert_eq!(only_content["content"].exposures, 1);
        assert_eq!(only_content["content"].click_rate, 0.0);
    }

    #[tokio::test]
    async fn test_stats_window() {
        let (tracker, _handle) = EventTracker::new();
        tracker.record_exposure(1, 10, StrategyTag::Popularity, 1, 8.0);
        tracker.record_outcome(1, 10, OutcomeType::Click, None);
        tracker.record_outcome(1, 10, OutcomeType::Rating, Some(4.0));
        settle().await;

        let stats = tracker.stats(7).await;
        assert_eq!(stats.total_recommendations, 1);
        assert_eq!(stats.total_clicks, 1);
        assert_eq!(stats.total_ratings, 1);
        assert_eq!(stats.avg_rating, Some(4.0));
        assert_eq!(stats.overall_ctr, 100.0);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_flushes_pending_writes() {
        let (tracker, handle) = EventTracker::new();
        let event_id = tracker.record_exposure(1, 10, StrategyTag::Latent, 1, 4.0);

        handle.shutdown().await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        assert!(tracker.event(event_id).await.is_some());
    }
}
