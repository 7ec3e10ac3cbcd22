//! In-memory download session tracking.
//!
//! The tracker is deliberately synchronous (std RwLock, no await): progress
//! advances from inside `Stream::poll_next` on the byte stream, which cannot
//! block on an async lock. Sessions are keyed by token and hold a rolling
//! window of (instant, bytes) samples for the transfer rate.

use chrono::Utc;
use datashare_core::constants::{
    RATE_WINDOW_SECS, SESSION_IDLE_TIMEOUT_SECS, SESSION_RETENTION_SECS,
};
use datashare_core::models::download::{DownloadSession, DownloadStatus};
use datashare_core::AppError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::AppResult;

struct SessionState {
    session: DownloadSession,
    /// Trailing (sample instant, cumulative bytes) window for rate math.
    samples: VecDeque<(Instant, u64)>,
    /// Instant of the last state change, for idle/retention sweeping.
    touched: Instant,
}

impl SessionState {
    fn touch(&mut self) {
        self.session.last_activity_at = Utc::now();
        self.touched = Instant::now();
    }

    fn recompute_rate(&mut self, now: Instant) {
        let window = Duration::from_secs(RATE_WINDOW_SECS);
        while let Some(&(t, _)) = self.samples.front() {
            if now.duration_since(t) > window && self.samples.len() > 1 {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(&f), Some(&l)) if l.0 > f.0 => (f, l),
            _ => {
                self.session.transfer_rate_bps = 0.0;
                self.session.eta_seconds = None;
                return;
            }
        };

        let elapsed = last.0.duration_since(first.0).as_secs_f64();
        let rate = (last.1.saturating_sub(first.1)) as f64 / elapsed;
        self.session.transfer_rate_bps = rate;
        self.session.eta_seconds = if rate > 0.0 && self.session.total_bytes > 0 {
            let remaining = self
                .session
                .total_bytes
                .saturating_sub(self.session.bytes_transferred);
            Some((remaining as f64 / rate).ceil() as u64)
        } else {
            None
        };
    }
}

pub struct ProgressTracker {
    sessions: RwLock<HashMap<String, Arc<RwLock<SessionState>>>>,
    idle_timeout: Duration,
    retention: Duration,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(SESSION_IDLE_TIMEOUT_SECS, SESSION_RETENTION_SECS)
    }
}

impl ProgressTracker {
    pub fn new(idle_timeout_secs: u64, retention_secs: u64) -> Self {
        ProgressTracker {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            retention: Duration::from_secs(retention_secs),
        }
    }

    fn entry(&self, token: &str) -> AppResult<Arc<RwLock<SessionState>>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound(token.to_string()))
    }

    /// Register a session in `Pending`. A restarted download for the same
    /// token replaces the previous session, carrying the new resume offset.
    pub fn start(&self, token: &str, total_bytes: u64, resume_offset: u64) {
        let now = Utc::now();
        let state = SessionState {
            session: DownloadSession {
                token: token.to_string(),
                status: DownloadStatus::Pending,
                bytes_transferred: resume_offset,
                total_bytes,
                started_at: now,
                last_activity_at: now,
                transfer_rate_bps: 0.0,
                eta_seconds: None,
                error_message: None,
                resume_offset,
            },
            samples: VecDeque::from([(Instant::now(), resume_offset)]),
            touched: Instant::now(),
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(token.to_string(), Arc::new(RwLock::new(state)));
    }

    /// Record bytes sent. First advance moves `Pending` to `InProgress`.
    pub fn advance(&self, token: &str, bytes: u64) -> AppResult<()> {
        let entry = self.entry(token)?;
        let mut state = entry.write().unwrap_or_else(|e| e.into_inner());

        if state.session.status == DownloadStatus::Pending
            || state.session.status == DownloadStatus::Interrupted
        {
            state.session.status = DownloadStatus::InProgress;
        }
        state.session.bytes_transferred += bytes;
        let transferred = state.session.bytes_transferred;
        let now = Instant::now();
        state.samples.push_back((now, transferred));
        state.recompute_rate(now);
        state.touch();
        Ok(())
    }

    pub fn finish(&self, token: &str) -> AppResult<()> {
        let entry = self.entry(token)?;
        let mut state = entry.write().unwrap_or_else(|e| e.into_inner());
        state.session.status = DownloadStatus::Completed;
        state.session.eta_seconds = Some(0);
        state.touch();
        tracing::info!(
            bytes = state.session.bytes_transferred,
            "Download completed"
        );
        Ok(())
    }

    pub fn fail(&self, token: &str, message: impl Into<String>) -> AppResult<()> {
        let entry = self.entry(token)?;
        let mut state = entry.write().unwrap_or_else(|e| e.into_inner());
        state.session.status = DownloadStatus::Failed;
        state.session.error_message = Some(message.into());
        state.touch();
        Ok(())
    }

    /// Mark a session interrupted, remembering how far it got so a retry can
    /// pick up from there. No-op on terminal sessions.
    pub fn interrupt(&self, token: &str) -> AppResult<()> {
        let entry = self.entry(token)?;
        let mut state = entry.write().unwrap_or_else(|e| e.into_inner());
        if state.session.status.is_terminal() {
            return Ok(());
        }
        state.session.status = DownloadStatus::Interrupted;
        state.session.resume_offset = state.session.bytes_transferred;
        state.touch();
        tracing::warn!(
            bytes = state.session.bytes_transferred,
            "Download interrupted"
        );
        Ok(())
    }

    pub fn get(&self, token: &str) -> AppResult<DownloadSession> {
        let entry = self.entry(token)?;
        let state = entry.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.session.clone())
    }

    /// One sweep pass: idle in-flight sessions become `Interrupted`; terminal
    /// and interrupted sessions past the retention window are dropped, so an
    /// abandoned interruption cannot hold its map entry forever. Returns the
    /// number of sessions reclaimed.
    pub fn sweep(&self) -> usize {
        let idle = self.idle_timeout;
        let retention = self.retention;
        let now = Instant::now();

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, entry| {
            let mut state = entry.write().unwrap_or_else(|e| e.into_inner());
            let age = now.duration_since(state.touched);
            match state.session.status {
                DownloadStatus::Pending | DownloadStatus::InProgress if age > idle => {
                    state.session.status = DownloadStatus::Interrupted;
                    state.session.resume_offset = state.session.bytes_transferred;
                    // Restart the clock: the retention window for the
                    // interrupted session begins now.
                    state.touch();
                    true
                }
                DownloadStatus::Completed
                | DownloadStatus::Failed
                | DownloadStatus::Interrupted
                    if age > retention =>
                {
                    false
                }
                _ => true,
            }
        });
        before - sessions.len()
    }

    /// Background sweeper loop. Spawn once at startup.
    pub fn spawn_sweeper(self: &Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                let reclaimed = tracker.sweep();
                if reclaimed > 0 {
                    tracing::debug!(reclaimed, "Reclaimed expired download sessions");
                }
            }
        })
    }
}
