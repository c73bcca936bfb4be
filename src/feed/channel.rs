//! In-process feed backed by a caller-owned sender
//!
//! Used for replays and tests: whoever holds the sender decides what the
//! engine sees.

use super::{FeedError, PriceFeed, PriceTick};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

pub struct ChannelFeed {
    rx: Mutex<Option<mpsc::Receiver<PriceTick>>>,
}

impl ChannelFeed {
    /// Create the feed and the sender that drives it
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<PriceTick>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl PriceFeed for ChannelFeed {
    async fn subscribe(&self) -> Result<mpsc::Receiver<PriceTick>, FeedError> {
        self.rx.lock().await.take().ok_or(FeedError::AlreadySubscribed)
    }
}
