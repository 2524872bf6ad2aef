use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Blocking wait used for retry backoff and provider spacing.
///
/// Production code sleeps the calling thread; tests inject a recorder so
/// schedules can be asserted without wall-clock time.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in call order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|delays| delays.clone())
            .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<T: Sleeper + ?Sized> Sleeper for Box<T> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Current epoch time in milliseconds.
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_string_respects_char_boundaries() {
        assert_eq!(truncate_string("Baščaršija", 4), "Ba\u{161}");
        assert_eq!(truncate_string("Mostar", 64), "Mostar");
    }

    #[test]
    fn recording_sleeper_shares_state_across_clones() {
        let sleeper = RecordingSleeper::new();
        let shared = sleeper.clone();
        shared.sleep(Duration::from_secs(5));
        shared.sleep(Duration::from_secs(10));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
    }
}
