//! Deniable Anonymous Group Authentication (DAGA).
//!
//! A client holding a long-term key-pair proves to a federation of
//! servers that it belongs to a declared group without revealing
//! which member it is. The run produces a per-round linkage tag: two
//! authentications by the same client within one round carry the same
//! tag, while tags from different rounds are unlinkable.
//!
//! The crate covers the cryptographic engine: the distributed
//! challenge round ([`challenge`]), the client's OR-proof
//! ([`client::proof`]), the per-server tag transformation with its
//! transformation and misbehavior proofs ([`server`]), and final tag
//! extraction ([`client::get_final_linkage_tag`]), together with the
//! wire representations ([`message`]) and the leader/child hooks of
//! the roster walk ([`protocol`]). Transport between participants and
//! generation of the per-round context are the caller's concern.

pub use crypto::{
	ristretto, schnorr, seeded_rng, ECPoint, ECScalar, Rng, POINT_SIZE, SCALAR_SIZE,
};

pub use challenge::{
	check_openings, finalize_challenge, initialize_challenge, verify_commitment_signatures,
	Challenge, ChallengeCommitment, ChallengeState, ServerSignature,
};
pub use client::{
	get_final_linkage_tag, new_initial_tag_and_commitments,
	proof::{new_client_proof, verify_client_proof, ClientProof, DEFAULT_PROOF_TIMEOUT},
	AuthenticationMessage, Client, InitialTagAndCommitments,
};
pub use context::AuthenticationContext;
pub use error::{Error, Result};
pub use server::{
	proof::{verify_misbehaving_proof, verify_server_proof, ServerProof},
	Server, ServerMessage,
};

/// Distributed generation of the per-round client challenge
pub mod challenge;
/// Client-side protocol: identity, tag derivation, proof session and
/// final tag extraction
pub mod client;
/// The per-round authentication context
pub mod context;
/// Group suite, key-pairs and signatures
pub mod crypto;
mod error;
/// Wire representations and persisted identities
pub mod message;
/// Leader/child hooks for the server-roster walk
pub mod protocol;
/// Server-side protocol: challenge round participation and the tag
/// transformation chain
pub mod server;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;
