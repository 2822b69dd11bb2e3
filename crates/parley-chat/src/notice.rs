//! Transient notices for validation and upload failures

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// How long a notice stays visible
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub raised_at: Instant,
}

impl Notice {
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.raised_at) >= ttl
    }
}

/// Notices that dismiss themselves after a fixed time
#[derive(Debug)]
pub struct Notices {
    items: VecDeque<Notice>,
    ttl: Duration,
}

impl Default for Notices {
    fn default() -> Self {
        Self::with_ttl(NOTICE_TTL)
    }
}

impl Notices {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            items: VecDeque::new(),
            ttl,
        }
    }

    /// Raise a notice
    pub fn push(&mut self, message: impl Into<String>) -> Notice {
        let notice = Notice {
            message: message.into(),
            raised_at: Instant::now(),
        };
        self.items.push_back(notice.clone());
        notice
    }

    /// Notices still visible, dropping the expired ones
    pub fn active(&mut self) -> Vec<Notice> {
        let now = Instant::now();
        let ttl = self.ttl;
        self.items.retain(|n| !n.is_expired(now, ttl));
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_notices_expire() {
        let mut notices = Notices::default();
        notices.push("Message is empty");
        tokio::time::advance(Duration::from_secs(2)).await;
        notices.push("Unsupported file type: a.exe");
        assert_eq!(notices.active().len(), 2);

        tokio::time::advance(Duration::from_secs(1)).await;
        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "Unsupported file type: a.exe");

        tokio::time::advance(NOTICE_TTL).await;
        assert!(notices.active().is_empty());
    }
}
