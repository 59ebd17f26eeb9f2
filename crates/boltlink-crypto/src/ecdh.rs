//! X25519 ephemeral key agreement for the session handshake.

use x25519_dalek::{PublicKey, StaticSecret};

/// An ephemeral X25519 keypair generated per handshake attempt.
pub struct EphemeralKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Build a keypair from a fixed seed. Deterministic handshakes for tests.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The 32-byte public key sent in the hello exchange.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// X25519 Diffie-Hellman with the peer's public key bytes.
    #[must_use]
    pub fn agree(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let peer = PublicKey::from(*peer_public);
        *self.secret.diffie_hellman(&peer).as_bytes()
    }
}

impl std::fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the secret scalar.
        f.debug_struct("EphemeralKeypair")
            .field("public", &hex_fmt(&self.public_bytes()))
            .finish_non_exhaustive()
    }
}

fn hex_fmt(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree() {
        let client = EphemeralKeypair::generate();
        let lock = EphemeralKeypair::generate();
        let a = client.agree(&lock.public_bytes());
        let b = lock.agree(&client.public_bytes());
        assert_eq!(a, b);
    }

    #[test]
    fn seeded_keypair_is_deterministic() {
        let a = EphemeralKeypair::from_seed([7; 32]);
        let b = EphemeralKeypair::from_seed([7; 32]);
        assert_eq!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn different_peers_different_secrets() {
        let client = EphemeralKeypair::from_seed([1; 32]);
        let lock_a = EphemeralKeypair::from_seed([2; 32]);
        let lock_b = EphemeralKeypair::from_seed([3; 32]);
        assert_ne!(
            client.agree(&lock_a.public_bytes()),
            client.agree(&lock_b.public_bytes())
        );
    }

    #[test]
    fn debug_hides_secret() {
        let pair = EphemeralKeypair::from_seed([9; 32]);
        let rendered = format!("{pair:?}");
        assert!(rendered.contains("public"));
        assert!(!rendered.contains("secret"));
    }
}
