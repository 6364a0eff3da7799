//! Request, invocation, command and session identifiers.

use chrono::Utc;
use uuid::Uuid;

/// Length of every generated identifier.
pub const ID_LEN: usize = 19;

const TIME_DIGITS: usize = 8;
const RANDOM_DIGITS: usize = ID_LEN - TIME_DIGITS;
const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Returns a fresh 19-character identifier: the current time in
/// milliseconds followed by random digits, both base 36.
pub fn new_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let mut id = to_base36(millis);
    while id.len() < TIME_DIGITS {
        id.push('0');
    }

    let random = to_base36(Uuid::new_v4().as_u128());
    let start = random.len().saturating_sub(RANDOM_DIGITS);
    id.push_str(&random[start..]);
    while id.len() < ID_LEN {
        id.push('0');
    }
    id
}

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_shape() {
        for _ in 0..100 {
            let id = new_id();
            assert_eq!(id.len(), ID_LEN);
            assert!(id.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_new_id_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
