// Identity — authenticating a connecting device by its hardware address

mod address;

pub use address::{address_from_device_path, is_nearby, normalize, verify};

/// Checks reported hardware addresses against the configured known set
#[derive(Debug, Clone, Default)]
pub struct IdentityVerifier {
    known: Vec<String>,
}

impl IdentityVerifier {
    /// Create a verifier trusting the given addresses (any notation)
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known.into_iter().map(Into::into).collect(),
        }
    }

    /// Known addresses as configured
    pub fn known(&self) -> &[String] {
        &self.known
    }

    /// Compare a received address with one known address, logging the verdict
    pub fn verify_against(&self, received: Option<&str>, known: Option<&str>) -> bool {
        let matched = verify(received, known);
        if matched {
            tracing::info!(
                received = received.unwrap_or_default(),
                normalized = %normalize(received),
                known = known.unwrap_or_default(),
                "Device verification succeeded"
            );
        } else {
            tracing::warn!(
                received = received.unwrap_or_default(),
                normalized = %normalize(received),
                known = known.unwrap_or_default(),
                "Device verification failed"
            );
        }
        matched
    }

    /// True iff `received` matches any known address
    pub fn verify(&self, received: &str) -> bool {
        self.find_match(received).is_some()
    }

    /// First known address `received` matches, logging the verdict
    pub fn find_match(&self, received: &str) -> Option<&str> {
        let matched = self
            .known
            .iter()
            .find(|known| verify(Some(received), Some(known)))
            .map(String::as_str);
        match matched {
            Some(known) => tracing::info!(
                received,
                normalized = %normalize(Some(received)),
                known,
                "Device verification succeeded"
            ),
            None => tracing::warn!(
                received,
                normalized = %normalize(Some(received)),
                known = self.known.len(),
                "Device verification failed"
            ),
        }
        matched
    }

    /// Whether `address` is among the currently visible `candidates`
    pub fn is_nearby<S: AsRef<str>>(&self, address: &str, candidates: &[S]) -> bool {
        let nearby = is_nearby(Some(address), candidates);
        if nearby {
            tracing::info!(address, "Device is in the list of nearby devices");
        } else {
            tracing::info!(address, "Device is not in the list of nearby devices");
        }
        nearby
    }

    /// Known addresses that appear among `candidates`
    pub fn known_nearby<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<String> {
        self.known
            .iter()
            .filter(|known| self.is_nearby(known, candidates))
            .cloned()
            .collect()
    }
}
