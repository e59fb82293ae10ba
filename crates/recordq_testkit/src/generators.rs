//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for one record payload, empty payloads included.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..600)
}

/// Strategy for a run of record payloads.
pub fn payloads_strategy(max_records: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(), 1..=max_records)
}

/// Strategy for bytes a torn write leaves behind.
///
/// The first byte is always `0xFF`, so the bytes can never start a frame for
/// a sequence number below 255.
pub fn garbage_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64).prop_map(|mut bytes| {
        bytes.insert(0, 0xFF);
        bytes
    })
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for tests that touch the file system.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

/// Builds a single-threaded runtime for driving the queue inside a
/// proptest body.
pub fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn garbage_never_looks_like_an_early_frame(garbage in garbage_strategy()) {
            prop_assert!(!garbage.is_empty());
            prop_assert_eq!(garbage[0], 0xFF);
        }

        #[test]
        fn payload_runs_are_non_empty(payloads in payloads_strategy(8)) {
            prop_assert!(!payloads.is_empty());
            prop_assert!(payloads.len() <= 8);
        }
    }
}
