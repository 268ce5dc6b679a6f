use std::{
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
    time::Duration,
};

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::LinkEvent;

pub const DEFAULT_NOTICE_DISMISS_AFTER: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// One surfaced feedback message. Ids grow monotonically across both kinds,
/// so a dismissal can always be matched against the exact notice it aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
}

/// Surfaces command feedback: at most one success and one error notice at a
/// time, each auto-dismissed after a fixed duration unless dismissed earlier.
/// A dismissal that arrives after its notice was superseded is ignored
/// instead of hiding the newer one.
pub struct NoticeCenter {
    next_id: AtomicU64,
    current: Mutex<SurfacedNotices>,
    dismiss_after: Duration,
    events: broadcast::Sender<LinkEvent>,
}

#[derive(Default)]
struct SurfacedNotices {
    success: Option<Notice>,
    error: Option<Notice>,
}

impl NoticeCenter {
    pub(crate) fn new(events: broadcast::Sender<LinkEvent>, dismiss_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            current: Mutex::new(SurfacedNotices::default()),
            dismiss_after,
            events,
        })
    }

    /// Surfaces a notice, replacing any current one of the same kind, and
    /// schedules its auto-dismissal. Returns the assigned id.
    pub async fn post(self: &Arc<Self>, kind: NoticeKind, message: impl Into<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let notice = Notice {
            id,
            kind,
            message: message.into(),
        };

        {
            let mut current = self.current.lock().await;
            match kind {
                NoticeKind::Success => current.success = Some(notice.clone()),
                NoticeKind::Error => current.error = Some(notice.clone()),
            }
        }
        let _ = self.events.send(LinkEvent::NoticePosted(notice));

        let center = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(center.dismiss_after).await;
            center.dismiss(id).await;
        });

        id
    }

    /// Clears the notice with the given id if it is still surfaced. Stale ids
    /// are a no-op.
    pub async fn dismiss(&self, id: u64) {
        let mut dismissed = false;
        {
            let mut current = self.current.lock().await;
            if current.success.as_ref().map(|notice| notice.id) == Some(id) {
                current.success = None;
                dismissed = true;
            } else if current.error.as_ref().map(|notice| notice.id) == Some(id) {
                current.error = None;
                dismissed = true;
            }
        }
        if dismissed {
            debug!(id, "notice dismissed");
            let _ = self.events.send(LinkEvent::NoticeDismissed { id });
        }
    }

    pub async fn current(&self, kind: NoticeKind) -> Option<Notice> {
        let current = self.current.lock().await;
        match kind {
            NoticeKind::Success => current.success.clone(),
            NoticeKind::Error => current.error.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/notify_tests.rs"]
mod tests;
