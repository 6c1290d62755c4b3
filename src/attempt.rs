//! 单次 STA 连接尝试
//!
//! `Idle → Connecting → {Connected | TimedOut}`，不自动重试。

use crate::clock::elapsed_ms;
use crate::radio::RadioControl;
use crate::storage::StationCredentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Connecting,
    Connected,
    TimedOut,
}

#[derive(Debug)]
pub struct ConnectionAttempt {
    state: AttemptState,
    started_at: u32,
    timeout_ms: u32,
}

impl ConnectionAttempt {
    /// 发起连接；SSID 为空时什么都不做，停在 `Idle`
    pub fn start<R: RadioControl + ?Sized>(
        radio: &mut R,
        credentials: &StationCredentials,
        timeout_ms: u32,
        now: u32,
    ) -> Self {
        let mut attempt = Self {
            state: AttemptState::Idle,
            started_at: now,
            timeout_ms,
        };

        if !credentials.is_configured() {
            return attempt;
        }

        log::info!(
            "[Station] Connecting to {:?} (timeout {}ms)",
            credentials.ssid,
            timeout_ms
        );
        attempt.state = match radio.join(&credentials.ssid, &credentials.password) {
            Ok(()) => AttemptState::Connecting,
            Err(e) => {
                log::warn!("[Station] Join request rejected: {}", e);
                AttemptState::TimedOut
            }
        };
        attempt
    }

    /// 按固定节奏调用，推进状态
    pub fn poll<R: RadioControl + ?Sized>(&mut self, radio: &R, now: u32) -> AttemptState {
        if self.state == AttemptState::Connecting {
            if radio.is_connected() {
                log::info!(
                    "[Station] Connected after {}ms",
                    elapsed_ms(now, self.started_at)
                );
                self.state = AttemptState::Connected;
            } else if elapsed_ms(now, self.started_at) >= self.timeout_ms {
                log::warn!("[Station] Connection timed out after {}ms", self.timeout_ms);
                self.state = AttemptState::TimedOut;
            }
        }
        self.state
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == AttemptState::Connected
    }

    /// 已到终态（或根本没开始）
    pub fn is_finished(&self) -> bool {
        self.state != AttemptState::Connecting
    }
}
