// ABOUTME: Configuration helpers for Codex
// ABOUTME: Environment variable constants plus validated typed readers

pub mod constants;

pub use constants::*;

use tracing::warn;

/// Read an environment variable as a u64, falling back to a default.
///
/// Values outside the accepted range are rejected with a warning so a typo
/// in deployment config cannot silently produce a pathological setting.
pub fn env_u64_in_range(name: &str, range: std::ops::RangeInclusive<u64>, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(value) if range.contains(&value) => value,
            Ok(value) => {
                warn!(
                    "{} = {} is outside the accepted range {:?}, using default {}",
                    name, value, range, default
                );
                default
            }
            Err(_) => {
                warn!("{} = {:?} is not a number, using default {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read an environment variable as a usize, falling back to a default.
pub fn env_usize_in_range(
    name: &str,
    range: std::ops::RangeInclusive<usize>,
    default: usize,
) -> usize {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<usize>() {
            Ok(value) if range.contains(&value) => value,
            Ok(value) => {
                warn!(
                    "{} = {} is outside the accepted range {:?}, using default {}",
                    name, value, range, default
                );
                default
            }
            Err(_) => {
                warn!("{} = {:?} is not a number, using default {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_u64_default_when_unset() {
        std::env::remove_var("CODEX_TEST_UNSET_U64");
        assert_eq!(env_u64_in_range("CODEX_TEST_UNSET_U64", 1..=100, 30), 30);
    }

    #[test]
    fn test_env_u64_rejects_out_of_range() {
        std::env::set_var("CODEX_TEST_RANGE_U64", "5000");
        assert_eq!(env_u64_in_range("CODEX_TEST_RANGE_U64", 1..=100, 30), 30);
        std::env::remove_var("CODEX_TEST_RANGE_U64");
    }

    #[test]
    fn test_env_u64_accepts_in_range() {
        std::env::set_var("CODEX_TEST_OK_U64", "42");
        assert_eq!(env_u64_in_range("CODEX_TEST_OK_U64", 1..=100, 30), 42);
        std::env::remove_var("CODEX_TEST_OK_U64");
    }

    #[test]
    fn test_env_usize_rejects_garbage() {
        std::env::set_var("CODEX_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_usize_in_range("CODEX_TEST_GARBAGE", 10..=10000, 200), 200);
        std::env::remove_var("CODEX_TEST_GARBAGE");
    }
}
