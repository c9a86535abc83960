//! Short-lived proof records keyed by normalized user identifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use poll_gateway::ProofSubmission;

/// Stored proofs expire after 5 minutes; the voter is expected to cast
/// within that window or generate a fresh proof.
pub const PROOF_EXPIRY: Duration = Duration::from_secs(300);

/// In-memory proof store. Last write wins per key; there is no
/// transactional guarantee across store/fetch pairs and callers must
/// tolerate a record having expired or never arrived.
#[derive(Clone)]
pub struct ProofStore {
    records: Arc<Mutex<HashMap<String, StoredProof>>>,
}

struct StoredProof {
    submission: ProofSubmission,
    expires_at: Instant,
}

impl ProofStore {
    pub fn new() -> Self {
        ProofStore {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Store a record under `key`, replacing any previous one.
    pub fn put(&self, key: &str, submission: ProofSubmission) {
        self.put_with_ttl(key, submission, PROOF_EXPIRY);
    }

    fn put_with_ttl(&self, key: &str, submission: ProofSubmission, ttl: Duration) {
        let mut records = self.records.lock().expect("proof store mutex poisoned");
        records.retain(|_, record| record.expires_at > Instant::now());
        records.insert(
            key.to_string(),
            StoredProof {
                submission,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// The live record under `key`, or `None` when nothing is stored or the
    /// record expired. Expired entries are removed on the way out.
    pub fn fetch(&self, key: &str) -> Option<ProofSubmission> {
        let mut records = self.records.lock().expect("proof store mutex poisoned");
        if let Some(record) = records.get(key) {
            if record.expires_at > Instant::now() {
                return Some(record.submission.clone());
            }
        }
        records.remove(key);
        None
    }

    #[cfg(test)]
    fn put_expired(&self, key: &str, submission: ProofSubmission) {
        self.put_with_ttl(key, submission, Duration::ZERO);
    }
}
