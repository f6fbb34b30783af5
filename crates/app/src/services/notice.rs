//! User-facing notices (the prompts a UI would show as alerts).

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotice {
    pub title: String,
    pub message: String,
}

/// Fan-out of notices to whoever is displaying them.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    tx: broadcast::Sender<UserNotice>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeBoard {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { tx }
    }

    pub fn post(&self, title: &str, message: &str) {
        info!(title, "User notice");
        // Nobody listening is fine; the notice is only informational.
        let _ = self.tx.send(UserNotice {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserNotice> {
        self.tx.subscribe()
    }
}

/// Next notice for a slow reader. Notices dropped while it lagged are
/// skipped; `None` once the board is gone.
pub async fn next_notice(rx: &mut broadcast::Receiver<UserNotice>) -> Option<UserNotice> {
    loop {
        match rx.recv().await {
            Ok(notice) => return Some(notice),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notice reader fell behind");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
