use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The page the scan currently considers "here".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPage {
    pub url: String,
    pub title: String,
}

/// One scan, from start to stop.
///
/// The token is the liveness capability: every delayed continuation checks
/// it before committing, so work issued before a stop never lands after it.
#[derive(Debug)]
pub struct ScanSession {
    id: Uuid,
    token: CancellationToken,
    current: Mutex<Option<CurrentPage>>,
    hovered: Mutex<HashSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            current: Mutex::new(None),
            hovered: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn stop(&self) {
        self.token.cancel();
        lock(&self.hovered).clear();
    }

    pub fn current(&self) -> Option<CurrentPage> {
        lock(&self.current).clone()
    }

    pub fn set_current(&self, url: &str, title: &str) {
        *lock(&self.current) = Some(CurrentPage {
            url: url.to_string(),
            title: title.to_string(),
        });
    }

    /// Update the title only if `url` is still the current page.
    pub fn retitle(&self, url: &str, title: &str) {
        if let Some(current) = lock(&self.current).as_mut()
            && current.url == url
        {
            current.title = title.to_string();
        }
    }

    /// First hover on `url` in this session?
    pub fn mark_hovered(&self, url: &str) -> bool {
        lock(&self.hovered).insert(url.to_string())
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep unless cancelled first. Returns `false` when the token fired.
pub async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_ends_session() {
        let session = ScanSession::new();
        assert!(session.is_active());
        session.stop();
        assert!(!session.is_active());
        assert!(session.token().is_cancelled());
    }

    #[test]
    fn test_hover_dedup_resets_on_stop() {
        let session = ScanSession::new();
        assert!(session.mark_hovered("https://www.notion.so/a"));
        assert!(!session.mark_hovered("https://www.notion.so/a"));
        session.stop();
        assert!(session.mark_hovered("https://www.notion.so/a"));
    }

    #[test]
    fn test_retitle_ignores_other_pages() {
        let session = ScanSession::new();
        session.set_current("https://www.notion.so/a", "Untitled Page");
        session.retitle("https://www.notion.so/b", "B");
        assert_eq!(session.current().unwrap().title, "Untitled Page");
        session.retitle("https://www.notion.so/a", "A");
        assert_eq!(session.current().unwrap().title, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_cut_short_by_cancel() {
        let token = CancellationToken::new();
        assert!(pause(&token, Duration::from_secs(5)).await);

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        assert!(!pause(&token, Duration::from_secs(60)).await);
    }
}
