//! 毫秒时钟
//!
//! 时间戳是会回绕的 `u32` 毫秒计数，所有超时判断都用差值。

use std::time::{Duration, Instant};

pub trait Clock {
    /// 当前毫秒计数，允许回绕
    fn now_ms(&self) -> u32;

    /// 两次 tick 之间让出 CPU
    fn idle(&self, ms: u32);
}

/// 从 `since` 到 `now` 经过的毫秒数，计数回绕后仍然正确
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// 基于 `Instant` 和 `thread::sleep` 的时钟，ESP-IDF 的 std 环境同样可用
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // truncation is the wrap
        self.origin.elapsed().as_millis() as u32
    }

    fn idle(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_across_wrap() {
        assert_eq!(elapsed_ms(100, 40), 60);
        assert_eq!(elapsed_ms(10, u32::MAX - 9), 20);
        assert_eq!(elapsed_ms(5, 5), 0);
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock::new();
        let start = clock.now_ms();
        clock.idle(5);
        assert!(elapsed_ms(clock.now_ms(), start) >= 5);
    }
}
