//! Schnorr key-pairs and signatures over the abstract suite.
//!
//! One fixed scheme is used for every signature in the protocol
//! (commitments, challenges and per-server chain entries) so that
//! byte-compatibility is pinned down in a single place.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{hash_to_scalar, ECPoint, ECScalar, Rng};

/// A long-term identity key-pair.
#[derive(Clone, Debug)]
pub struct Keypair<P: ECPoint> {
	private: P::Scalar,
	public: P,
}

impl<P: ECPoint> Keypair<P> {
	pub fn generate(rng: &mut Rng) -> Self {
		Self::from_private(P::Scalar::random(rng))
	}

	pub fn from_private(private: P::Scalar) -> Self {
		let public = P::from_scalar(&private);
		Keypair { private, public }
	}

	pub fn public(&self) -> P {
		self.public
	}

	pub(crate) fn private(&self) -> &P::Scalar {
		&self.private
	}
}

/// A Schnorr signature `(R, z)` with `z = k + e * priv` and
/// `e = H(R || pub || msg)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrSignature<P: ECPoint> {
	#[serde(bound = "")]
	r: P,
	#[serde(bound = "")]
	z: P::Scalar,
}

impl<P: ECPoint> SchnorrSignature<P> {
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut bytes = Vec::with_capacity(2 * 32);
		bytes.extend_from_slice(&self.r.as_bytes());
		bytes.extend_from_slice(&self.z.to_bytes());
		bytes
	}
}

impl<P: ECPoint> std::fmt::Display for SchnorrSignature<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", hex::encode(self.to_bytes()))
	}
}

fn build_challenge<P: ECPoint>(nonce_commitment: P, public: P, msg: &[u8]) -> P::Scalar {
	let mut hasher = Sha256::new();
	hasher.update(nonce_commitment.as_bytes());
	hasher.update(public.as_bytes());
	hasher.update(msg);
	let digest: [u8; 32] = hasher.finalize().into();
	P::Scalar::from_bytes_mod_order(&digest)
}

/// Sign `msg` with a deterministic (EdDSA-style) nonce derived from
/// the private key and the message.
pub fn sign<P: ECPoint>(keypair: &Keypair<P>, msg: &[u8]) -> SchnorrSignature<P> {
	let mut nonce_input = Vec::with_capacity(32 + msg.len());
	nonce_input.extend_from_slice(&keypair.private.to_bytes());
	nonce_input.extend_from_slice(msg);
	let k = hash_to_scalar::<P>(&nonce_input);

	let r = P::from_scalar(&k);
	let e = build_challenge(r, keypair.public, msg);

	SchnorrSignature { r, z: k + &(e * keypair.private.clone()) }
}

/// Check a signature against a public key: `z * g == R + e * pub`.
pub fn verify<P: ECPoint>(public: P, msg: &[u8], signature: &SchnorrSignature<P>) -> bool {
	let e = build_challenge(signature.r, public, msg);
	P::from_scalar(&signature.z) == signature.r + public * &e
}
