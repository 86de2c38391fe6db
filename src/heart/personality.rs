//! Rotating node identity.

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the public prefix of a personality id.
pub const PUBLIC_ID_LEN: usize = 8;

/// The node's identity for one epoch.
///
/// A personality is generated from scratch on every epoch rollover and is
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    /// High-entropy opaque identifier (32 lowercase hex characters)
    pub id: String,
    /// First [`PUBLIC_ID_LEN`] characters of `id`
    pub public_id: String,
    /// One character of `id`, picked at a uniformly random index
    pub feature: char,
}

impl Personality {
    /// Generate a fresh personality.
    pub fn generate() -> Self {
        Self::from_id(Uuid::new_v4().simple().to_string(), &mut rand::thread_rng())
    }

    fn from_id<R: Rng>(id: String, rng: &mut R) -> Self {
        let public_id = id.chars().take(PUBLIC_ID_LEN).collect();
        let index = rng.gen_range(0..id.len());
        // Simple-format UUIDs are ASCII hex, so byte and char indices agree.
        let feature = char::from(id.as_bytes()[index]);

        Self {
            id,
            public_id,
            feature,
        }
    }
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.public_id, self.feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_public_id_is_prefix() {
        let personality = Personality::generate();
        assert_eq!(personality.id.len(), 32);
        assert_eq!(personality.public_id.len(), PUBLIC_ID_LEN);
        assert!(personality.id.starts_with(&personality.public_id));
    }

    #[test]
    fn test_feature_comes_from_id() {
        for _ in 0..100 {
            let personality = Personality::generate();
            assert!(personality.id.contains(personality.feature));
            assert!(personality.feature.is_ascii_hexdigit());
        }
    }

    #[test]
    fn test_personalities_are_fresh() {
        let ids: HashSet<String> = (0..50).map(|_| Personality::generate().id).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_feature_index_covers_whole_id() {
        let id = "0123456789abcdefghijklmnopqrstuv".to_string();
        let mut rng = StdRng::seed_from_u64(7);

        let features: HashSet<char> = (0..2000)
            .map(|_| Personality::from_id(id.clone(), &mut rng).feature)
            .collect();

        assert_eq!(features.len(), id.len());
    }

    #[test]
    fn test_display_uses_public_id() {
        let personality = Personality::from_id(
            "deadbeef00000000000000000000000f".to_string(),
            &mut StdRng::seed_from_u64(1),
        );
        assert!(personality.to_string().starts_with("deadbeef ("));
    }
}
