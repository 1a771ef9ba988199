use sha2::{Digest, Sha256};

/// Outcome of checking a trigger request against the configured secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerVerdict {
    Authorized,
    /// No secret configured on the server side.
    MissingEnv,
    /// Header absent or it did not match the secret.
    BadHeader,
}

/// Shared-secret check for the processing trigger.
///
/// The secret is read from config once at startup and captured here, so a
/// mid-flight env change cannot flip auth behavior between requests.
#[derive(Clone)]
pub struct TriggerAuth {
    secret: Option<String>,
}

impl TriggerAuth {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// True when a secret is configured at all.
    pub fn env_ok(&self) -> bool {
        self.secret.is_some()
    }

    pub fn check(&self, presented: Option<&str>) -> TriggerVerdict {
        let Some(secret) = self.secret.as_deref() else {
            return TriggerVerdict::MissingEnv;
        };
        match presented {
            Some(value) if digest_eq(value, secret) => TriggerVerdict::Authorized,
            _ => TriggerVerdict::BadHeader,
        }
    }
}

/// Compare via fixed-size digests so the comparison cost does not depend
/// on where the first mismatching byte sits.
fn digest_eq(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    let mut diff = 0u8;
    for (x, y) in da.iter().zip(db.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
