//! Small helpers over the OS random source.

/// Uniform value in `[0, 1)`, or `0.5` when the OS source is unavailable.
pub fn unit_f64() -> f64 {
    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return 0.5;
    }
    // 53 significant bits fit an f64 mantissa exactly.
    (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
}

/// Uniform index in `0..len`; `0` for an empty range or a failed source.
pub fn index_below(len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return 0;
    }
    (u64::from_le_bytes(bytes) % len as u64) as usize
}

/// 32 lowercase hex characters from 16 random bytes.
pub fn hex_id() -> Option<String> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).ok()?;
    Some(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_values_stay_in_range() {
        for _ in 0..200 {
            let value = unit_f64();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn index_below_respects_bounds() {
        assert_eq!(index_below(0), 0);
        assert_eq!(index_below(1), 0);
        for _ in 0..200 {
            assert!(index_below(3) < 3);
        }
    }

    #[test]
    fn hex_ids_are_32_chars_and_distinct() {
        let a = hex_id().unwrap();
        let b = hex_id().unwrap();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_ne!(a, b);
    }
}
