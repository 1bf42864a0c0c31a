use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pulse::SnrPulseResult;

/// Identifies one bar feed: where it comes from and what it carries.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FeedKey {
    pub venue: String,
    pub data_type: String,
}

impl FeedKey {
    pub fn new(venue: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            data_type: data_type.into(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.venue, self.data_type)
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.venue, self.data_type)
    }
}

/// One price-range observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts_ms: u64,
    pub high: f64,
    pub low: f64,
}

impl Bar {
    pub fn new(ts_ms: u64, high: f64, low: f64) -> Self {
        Self { ts_ms, high, low }
    }
}

/// Auxiliary string parameters carried by feed commands.
pub type FeedParams = HashMap<String, String>;

/// Start receiving SNR snapshots for a feed.
pub struct SubscriptionRequest {
    pub key: FeedKey,
    pub params: Option<FeedParams>,
    pub sender_ch: tokio::sync::mpsc::Sender<SnrPulseResult>,
}

/// Stop a feed and drop its filter state.
#[derive(Debug, Clone)]
pub struct UnsubscribeRequest {
    pub key: FeedKey,
}

/// Request for historical bars, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequest {
    pub key: FeedKey,
    pub limit: usize,
    pub params: Option<FeedParams>,
}

/// Historical bars answering a [`DataRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse {
    pub key: FeedKey,
    pub bars: Vec<Bar>,
    pub params: Option<FeedParams>,
}

/// Events delivered by a live bar stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Bar(Bar),
    KeepAlive,
    Unsubscribed { key: FeedKey },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_key_renders_venue_and_type() {
        let key = FeedKey::new("BINANCE", "BTCUSDT-1-MINUTE-LAST");

        assert_eq!(key.id(), "BINANCE/BTCUSDT-1-MINUTE-LAST");
        assert_eq!(key.to_string(), key.id());
    }

    #[test]
    fn data_response_round_trips_through_json() {
        let resp = DataResponse {
            key: FeedKey::new("SIM", "bars"),
            bars: vec![Bar::new(1, 101.0, 100.0)],
            params: Some(FeedParams::from([("aggregation".into(), "1m".into())])),
        };

        let json = serde_json::to_string(&resp).unwrap();
        let back: DataResponse = serde_json::from_str(&json).unwrap();

        assert_eq!(back.key, resp.key);
        assert_eq!(back.bars, resp.bars);
        assert_eq!(back.params, resp.params);
    }
}
