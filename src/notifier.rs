//! Best-effort notifications.
//!
//! Posting a note never decides whether a workflow succeeded. The notifier
//! logs failures and reports acceptance as a plain `bool`.

use tracing::{info, warn};

use crate::platform::{NoteTarget, Platform};

pub struct Notifier<'a> {
    platform: &'a dyn Platform,
}

impl<'a> Notifier<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }

    /// Post `body` on `target`. Returns whether the platform accepted it.
    pub async fn notify(&self, target: NoteTarget, body: &str) -> bool {
        match self.platform.post_note(target, body).await {
            Ok(()) => {
                info!(target = ?target, "Note posted");
                true
            }
            Err(e) => {
                warn!(target = ?target, error = %e, "Failed to post note");
                false
            }
        }
    }
}
