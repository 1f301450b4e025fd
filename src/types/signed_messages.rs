/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the generic [SignedMessage] trait and the [Keypair] signing wrapper.
//! Implementations live with the message definitions in [crate::messages].

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use super::basic::SignatureBytes;
use super::validators::BFTNode;

/// A signed message must consist of:
/// 1. Message bytes [SignedMessage::message_bytes]: the values that the signature is over, and
/// 2. Signature bytes [SignedMessage::signature_bytes]: the signature in bytes.
///
/// Given the two values satisfying the above, and a public key of the signer, the signature can
/// be verified against the message.
pub trait SignedMessage {
    // The values contained in the message that should be signed (represented as a vector of bytes).
    fn message_bytes(&self) -> Vec<u8>;

    // The signature (in bytes) from the message.
    fn signature_bytes(&self) -> SignatureBytes;

    // Verifies the correctness of the signature given the values that should be signed.
    fn is_correct(&self, pk: &VerifyingKey) -> bool {
        let signature = Signature::from_bytes(&self.signature_bytes().bytes());
        pk.verify(&self.message_bytes(), &signature).is_ok()
    }
}

/// A wrapper around [SigningKey](ed25519_dalek::SigningKey) which implements a
/// [convenience method](Keypair::sign) for creating signatures.
pub struct Keypair(SigningKey);

impl Keypair {
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Convenience method for creating signatures over values or messages represented as vectors
    /// of bytes.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    /// Get the [`BFTNode`] identity corresponding to this keypair.
    pub fn node(&self) -> BFTNode {
        BFTNode::new(self.public())
    }
}
