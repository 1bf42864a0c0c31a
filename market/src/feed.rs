use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use crate::types::{DataRequest, DataResponse, FeedEvent, FeedKey, FeedParams};

/// Source of price bars for a venue (live stream plus history).
#[async_trait]
pub trait BarSource: Send + Sync + 'static {
    /// Start live delivery for `key`. Bars must be sent in timestamp order.
    async fn stream_bars(
        &self,
        key: FeedKey,
        params: Option<FeedParams>,
        sender: Sender<FeedEvent>,
    ) -> anyhow::Result<()>;

    /// Fetch up to `req.limit` historical bars, oldest first.
    async fn request_bars(&self, req: DataRequest) -> anyhow::Result<DataResponse>;
}
