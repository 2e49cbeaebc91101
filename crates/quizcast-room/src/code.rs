//! Room-code generation.
//!
//! Codes are short, fixed-length, and drawn from a reduced alphabet so
//! players can read one off a friend's screen without ambiguity.
//! Uniqueness is probabilistic here: [`CodeAllocator::generate_unique`]
//! probes an existence check with bounded retries, and the caller closes
//! the remaining check-then-create window by relying on the store's
//! uniqueness constraint at insert time.

use std::time::Duration;

use quizcast_protocol::{CODE_ALPHABET, CODE_LEN, RoomCode, code_from_alphabet};
use rand::Rng;

/// Bounded-retry policy for unique-code generation, kept explicit so it
/// can be tested apart from any store.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total candidate codes tried before giving up.
    pub max_attempts: u32,

    /// Attempts after this many failures are preceded by the backoff
    /// delay, easing pressure on the store under congestion.
    pub backoff_after: u32,

    /// Fixed delay inserted once backoff kicks in.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_after: 3,
            backoff_delay: Duration::from_millis(50),
        }
    }
}

/// Failure modes of unique-code allocation.
#[derive(Debug, thiserror::Error)]
pub enum AllocError<E> {
    /// Every candidate was reported taken.
    #[error("room code space exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The existence probe itself failed.
    #[error("room code existence probe failed")]
    Probe(#[source] E),
}

/// Generates room codes.
#[derive(Debug, Clone, Default)]
pub struct CodeAllocator {
    policy: RetryPolicy,
}

impl CodeAllocator {
    /// Creates an allocator with the given retry policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns one uniformly random fixed-length code.
    pub fn generate(&self) -> RoomCode {
        let mut rng = rand::rng();
        let code: String = (0..CODE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..CODE_ALPHABET.len());
                CODE_ALPHABET[idx] as char
            })
            .collect();
        code_from_alphabet(code)
    }

    /// Generates candidates until `exists` reports one free, within the
    /// policy's attempt budget.
    ///
    /// The probe is the only side effect; creating the room (and failing
    /// on a concurrent duplicate) is the caller's job.
    pub async fn generate_unique<F, Fut, E>(
        &self,
        mut exists: F,
    ) -> Result<RoomCode, AllocError<E>>
    where
        F: FnMut(RoomCode) -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        for attempt in 1..=self.policy.max_attempts {
            if attempt > self.policy.backoff_after {
                tokio::time::sleep(self.policy.backoff_delay).await;
            }
            let candidate = self.generate();
            let taken = exists(candidate.clone())
                .await
                .map_err(AllocError::Probe)?;
            if !taken {
                if attempt > 1 {
                    tracing::debug!(attempt, code = %candidate, "room code found after collisions");
                }
                return Ok(candidate);
            }
            tracing::debug!(attempt, code = %candidate, "room code collision");
        }
        tracing::warn!(
            attempts = self.policy.max_attempts,
            "room code generation exhausted its attempt budget"
        );
        Err(AllocError::Exhausted {
            attempts: self.policy.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_generate_has_fixed_length_and_alphabet() {
        let allocator = CodeAllocator::default();
        for _ in 0..200 {
            let code = allocator.generate();
            assert_eq!(code.as_str().len(), CODE_LEN);
            for ch in code.as_str().bytes() {
                assert!(
                    CODE_ALPHABET.contains(&ch),
                    "character {} outside alphabet",
                    ch as char
                );
            }
        }
    }

    #[test]
    fn test_generate_is_not_constant() {
        let allocator = CodeAllocator::default();
        let first = allocator.generate();
        let distinct = (0..50).any(|_| allocator.generate() != first);
        assert!(distinct, "200+ bits of entropy should not repeat 50 times");
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_unique_probes_until_free() {
        // Probe reports "taken" nine times, then "free" on the tenth.
        let allocator = CodeAllocator::default();
        let calls = AtomicU32::new(0);

        let code = allocator
            .generate_unique(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<bool, Infallible>(n < 10) }
            })
            .await
            .expect("tenth candidate is free");

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(code.as_str().len(), CODE_LEN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_unique_exhausts_at_attempt_budget() {
        let allocator = CodeAllocator::default();
        let calls = AtomicU32::new(0);

        let result = allocator
            .generate_unique(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<bool, Infallible>(true) }
            })
            .await;

        assert!(matches!(
            result,
            Err(AllocError::Exhausted { attempts: 10 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 10, "never exceeds budget");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_kicks_in_after_third_attempt() {
        // With the auto-advancing paused clock, each sleep advances the
        // clock by exactly its duration — elapsed time counts backoffs.
        let allocator = CodeAllocator::new(RetryPolicy {
            max_attempts: 10,
            backoff_after: 3,
            backoff_delay: Duration::from_millis(50),
        });
        let start = Instant::now();

        let result = allocator
            .generate_unique(|_| async { Ok::<bool, Infallible>(true) })
            .await;
        assert!(matches!(result, Err(AllocError::Exhausted { .. })));

        // Attempts 4..=10 each sleep once: 7 * 50ms.
        assert_eq!(start.elapsed(), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_probe_error_surfaces() {
        let allocator = CodeAllocator::default();
        let result = allocator
            .generate_unique(|_| async { Err::<bool, &str>("store down") })
            .await;
        assert!(matches!(result, Err(AllocError::Probe("store down"))));
    }
}
