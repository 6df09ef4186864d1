//! API key set with rotation on key-level rejections.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Status codes that mean "this key is unusable right now".
/// 402 is left out: payment problems need the user to act.
pub const ROTATABLE_STATUS_CODES: [u16; 3] = [401, 403, 429];

/// Lowercase phrases that mark a rejection as credit or quota exhaustion
/// whatever its status code.
pub const CREDIT_EXHAUSTED_PATTERNS: &[&str] = &[
    "insufficient credit",
    "credit exhausted",
    "credit limit",
    "out of credit",
    "no credit",
    "balance exhausted",
    "insufficient balance",
    "quota exceeded",
    "quota limit",
    "rate limit exceeded",
    "account blocked",
    "key blocked",
    "api key blocked",
];

/// Whether a rejection with this status and message should move on to the
/// next key.
pub fn should_rotate(status: u16, message: &str) -> bool {
    if ROTATABLE_STATUS_CODES.contains(&status) {
        return true;
    }
    let message = message.to_lowercase();
    CREDIT_EXHAUSTED_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// A completed move to another key. Positions are one-based for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRotation {
    pub from: usize,
    pub to: usize,
    pub total: usize,
}

/// Every key has been tried since the last success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeysExhausted;

impl fmt::Display for KeysExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("all API keys exhausted")
    }
}

impl std::error::Error for KeysExhausted {}

#[derive(Debug)]
struct RotationState {
    current: usize,
    /// Index the current failure cycle started from.
    cycle_start: Option<usize>,
}

pub struct KeyRing {
    keys: Vec<String>,
    state: Mutex<RotationState>,
}

impl KeyRing {
    pub fn new(keys: Vec<String>) -> Self {
        Self::with_start(keys, 0)
    }

    /// Start from `start`, wrapped into range.
    pub fn with_start(keys: Vec<String>, start: usize) -> Self {
        let current = if keys.is_empty() { 0 } else { start % keys.len() };
        Self {
            keys,
            state: Mutex::new(RotationState {
                current,
                cycle_start: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.state().current
    }

    pub fn current_key(&self) -> Option<String> {
        let current = self.state().current;
        self.keys.get(current).cloned()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Advance to the next key, or report that the cycle came back around to
    /// where it started. Exhaustion clears the cycle so a later request can
    /// try every key again.
    pub fn rotate(&self) -> Result<KeyRotation, KeysExhausted> {
        let total = self.keys.len();
        if total <= 1 {
            return Err(KeysExhausted);
        }

        let mut state = self.state();
        let from = state.current;
        let start = *state.cycle_start.get_or_insert(from);
        let next = (from + 1) % total;
        if next == start {
            state.cycle_start = None;
            return Err(KeysExhausted);
        }
        state.current = next;
        Ok(KeyRotation {
            from: from + 1,
            to: next + 1,
            total,
        })
    }

    /// Forget the current failure cycle; called after a successful request.
    pub fn reset_cycle(&self) {
        self.state().cycle_start = None;
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: Vec<String> = self.keys.iter().map(|key| mask_key(key)).collect();
        f.debug_struct("KeyRing")
            .field("keys", &masked)
            .field("current", &self.current_index())
            .finish()
    }
}

/// Show only the first and last four characters of a key.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(count: usize, start: usize) -> KeyRing {
        let keys = (1..=count).map(|n| format!("key{n}")).collect();
        KeyRing::with_start(keys, start)
    }

    #[test]
    fn rotatable_statuses_always_rotate() {
        assert!(should_rotate(401, ""));
        assert!(should_rotate(403, "forbidden"));
        assert!(should_rotate(429, "slow down"));
    }

    #[test]
    fn payment_required_needs_credit_wording() {
        assert!(!should_rotate(402, "Payment required"));
        assert!(should_rotate(402, "Insufficient credit on this account"));
        assert!(should_rotate(400, "API key blocked"));
        assert!(should_rotate(500, "Quota exceeded for today"));
        assert!(!should_rotate(500, "internal server error"));
        assert!(!should_rotate(400, "invalid model"));
    }

    #[test]
    fn three_keys_from_zero_visit_each_once() {
        let ring = ring(3, 0);
        assert_eq!(ring.current_key().as_deref(), Some("key1"));

        let first = ring.rotate().unwrap();
        assert_eq!((first.from, first.to, first.total), (1, 2, 3));
        assert_eq!(ring.current_key().as_deref(), Some("key2"));

        let second = ring.rotate().unwrap();
        assert_eq!((second.from, second.to, second.total), (2, 3, 3));
        assert_eq!(ring.current_key().as_deref(), Some("key3"));

        assert_eq!(ring.rotate(), Err(KeysExhausted));
        assert_eq!(ring.current_key().as_deref(), Some("key3"));
    }

    #[test]
    fn rotation_wraps_around_from_a_middle_start() {
        let ring = ring(3, 1);
        assert_eq!(ring.rotate().map(|r| r.to), Ok(3));
        assert_eq!(ring.rotate().map(|r| r.to), Ok(1));
        assert_eq!(ring.current_index(), 0);
        assert_eq!(ring.rotate(), Err(KeysExhausted));
    }

    #[test]
    fn single_key_is_always_exhausted() {
        let ring = ring(1, 0);
        assert_eq!(ring.rotate(), Err(KeysExhausted));
        assert_eq!(ring.rotate(), Err(KeysExhausted));
        assert_eq!(ring.current_key().as_deref(), Some("key1"));

        let empty = KeyRing::new(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.current_key(), None);
        assert_eq!(empty.rotate(), Err(KeysExhausted));
    }

    #[test]
    fn reset_allows_a_fresh_cycle() {
        let ring = ring(3, 0);
        ring.rotate().unwrap();
        ring.reset_cycle();

        // The new cycle starts at key2, so two more rotations succeed.
        assert_eq!(ring.rotate().map(|r| r.to), Ok(3));
        assert_eq!(ring.rotate().map(|r| r.to), Ok(1));
        assert_eq!(ring.rotate(), Err(KeysExhausted));
    }

    #[test]
    fn exhaustion_clears_the_cycle() {
        let ring = ring(2, 0);
        assert!(ring.rotate().is_ok());
        assert_eq!(ring.rotate(), Err(KeysExhausted));
        // A later request starts over from the current key.
        assert_eq!(ring.rotate().map(|r| (r.from, r.to)), Ok((2, 1)));
    }

    #[test]
    fn start_index_wraps_into_range() {
        assert_eq!(ring(3, 4).current_index(), 1);
    }

    #[test]
    fn debug_output_masks_keys() {
        let ring = KeyRing::new(vec!["pplx-abcdefghijklmnop".to_string()]);
        let debug = format!("{ring:?}");
        assert!(debug.contains("pplx...mnop"));
        assert!(!debug.contains("abcdefghijkl"));
        assert_eq!(mask_key("short"), "*****");
    }
}
