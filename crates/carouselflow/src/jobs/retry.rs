use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_seconds: i64,
    pub max_seconds: i64,
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_seconds: 2,
            max_seconds: 15 * 60,
            jitter_pct: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    NonRetryable,
}

/// Unknown codes default to retryable; only failures that cannot change on a
/// second attempt are terminal.
pub fn classify(code: &str) -> FailureClass {
    match code {
        "TIMEOUT" | "RATE_LIMIT" | "PROVIDER_DOWN" | "BAD_COMPLETION" => FailureClass::Retryable,
        "BAD_PAYLOAD" | "BAD_PROMPT" => FailureClass::NonRetryable,
        _ => FailureClass::Retryable,
    }
}

/// Delay after failed attempt `attempt_no`: base * 2^(attempt_no - 1),
/// capped at `max_seconds`, with +/- `jitter_pct` applied.
pub fn next_delay_seconds(attempt_no: i32, policy: &RetryPolicy, rng: &mut impl Rng) -> i64 {
    let attempt_no = attempt_no.max(1) as u32;
    let exp = attempt_no.saturating_sub(1);

    // 2^exp with overflow protection; the cap handles the saturated case.
    let pow2 = 1_i64.checked_shl(exp).unwrap_or(i64::MAX);
    let mut delay = policy.base_seconds.saturating_mul(pow2);

    if delay > policy.max_seconds {
        delay = policy.max_seconds;
    }

    let jitter_range = (delay as f64) * policy.jitter_pct;
    let jitter = rng.gen_range(-jitter_range..=jitter_range);

    let jittered = (delay as f64 + jitter).round() as i64;
    jittered.clamp(0, policy.max_seconds)
}
