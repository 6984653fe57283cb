//! Per-server proofs: the transformation proof an honest chain step
//! carries, and the misbehavior proof that publicly attributes a
//! malformed request to the client.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
	context::AuthenticationContext,
	crypto::{hash_to_scalar, ECPoint, ECScalar, Rng},
	server::{Server, ServerMessage},
};

/// A server's proof for its chain entry. `r2` is present on the
/// honest (transformation) branch and absent on the misbehaving
/// branch, which is how the two are told apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProof<P: ECPoint> {
	#[serde(bound = "")]
	pub t1: P,
	#[serde(bound = "")]
	pub t2: P,
	#[serde(bound = "")]
	pub t3: P,
	#[serde(bound = "")]
	pub c: P::Scalar,
	#[serde(bound = "")]
	pub r1: P::Scalar,
	#[serde(bound = "")]
	pub r2: Option<P::Scalar>,
}

impl<P: ECPoint> ServerProof<P> {
	/// Canonical byte view used as signature input. The optional
	/// response is preceded by a presence flag so the two proof kinds
	/// can never encode to the same bytes.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut bytes = Vec::with_capacity(6 * 32 + 1);
		bytes.extend_from_slice(&self.t1.as_bytes());
		bytes.extend_from_slice(&self.t2.as_bytes());
		bytes.extend_from_slice(&self.t3.as_bytes());
		bytes.extend_from_slice(&self.c.to_bytes());
		bytes.extend_from_slice(&self.r1.to_bytes());
		match &self.r2 {
			Some(r2) => {
				bytes.push(1);
				bytes.extend_from_slice(&r2.to_bytes());
			},
			None => bytes.push(0),
		}
		bytes
	}
}

/// Fiat-Shamir challenge of the transformation proof, binding the
/// context, the tag transition, the server's round commitment and the
/// client's chain step.
#[allow(clippy::too_many_arguments)]
fn transformation_challenge<P: ECPoint>(
	context: &AuthenticationContext<P>,
	t_prev: P,
	t_new: P,
	round_commitment: P,
	chain_in: P,
	chain_out: P,
	t1: P,
	t2: P,
	t3: P,
) -> P::Scalar {
	let mut hasher = Sha256::new();
	hasher.update(context.to_bytes());
	for point in [t_prev, t_new, round_commitment, chain_in, chain_out, t1, t2, t3] {
		hasher.update(point.as_bytes());
	}
	let digest: [u8; 32] = hasher.finalize().into();
	P::Scalar::from_bytes_mod_order(&digest)
}

/// Fiat-Shamir challenge of the misbehavior proof, binding the
/// context, the client's commitment to `s`, the accused server's key
/// and the published share.
fn misbehavior_challenge<P: ECPoint>(
	context: &AuthenticationContext<P>,
	s_commitment: P,
	server_key: P,
	t1: P,
	t2: P,
	t3: P,
) -> P::Scalar {
	let mut hasher = Sha256::new();
	hasher.update(context.to_bytes());
	for point in [s_commitment, server_key, t1, t2, t3] {
		hasher.update(point.as_bytes());
	}
	let digest: [u8; 32] = hasher.finalize().into();
	P::Scalar::from_bytes_mod_order(&digest)
}

/// The ephemeral secret a server derives for a chain step, reduced
/// from the shared-secret point. Verifiers recompute it from the
/// chain difference `S[k+1] - S[k]`, which equals the server's view
/// exactly when the client followed the protocol.
pub(crate) fn ephemeral_secret<P: ECPoint>(shared_secret_point: P) -> P::Scalar {
	let mut secret = hash_to_scalar::<P>(&shared_secret_point.as_bytes());
	// The secret must be invertible. Mapping zero to one slightly
	// biases the hash, which is safe as it doesn't meaningfully
	// impact collision resistance.
	if secret == P::Scalar::zero() {
		secret = P::Scalar::from(1);
	}
	secret
}

impl<P: ECPoint> Server<P> {
	/// Prove that the appended tag is `T_prev` raised by `r_k *
	/// secret_k^-1`, with `r_k` the round secret committed in the
	/// context and `secret_k` the ephemeral secret of this chain step.
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn generate_transformation_proof(
		&self,
		context: &AuthenticationContext<P>,
		secret: &P::Scalar,
		t_prev: P,
		t_new: P,
		chain_in: P,
		chain_out: P,
		rng: &mut Rng,
	) -> ServerProof<P> {
		let g = P::generator();
		let round = self.round_secret();

		let v1 = P::Scalar::random(rng);
		let v2 = P::Scalar::random(rng);

		let t1 = t_prev * &v1 - t_new * &v2;
		let t2 = g * &v1;
		let t3 = g * &v2;

		let c = transformation_challenge(
			context,
			t_prev,
			t_new,
			round.commitment(),
			chain_in,
			chain_out,
			t1,
			t2,
			t3,
		);

		let r1 = v1 - c.clone() * round.secret().clone();
		let r2 = v2 - c.clone() * secret.clone();

		ServerProof { t1, t2, t3, c, r1, r2: Some(r2) }
	}

	/// Accuse the client of a malformed chain step: publish the true
	/// shared-secret point `t3 = priv_k * Z` (with `Z = S[m+1]`, the
	/// client's commitment to `s`) and prove `log_g(Y_k) ==
	/// log_Z(t3)`. Any observer can then compare `t3` against the
	/// chain difference the client actually sent.
	pub fn generate_misbehaving_proof(
		&self,
		context: &AuthenticationContext<P>,
		s_commitment: P,
		rng: &mut Rng,
	) -> ServerProof<P> {
		let g = P::generator();
		let share = s_commitment * self.keypair().private();

		let v = P::Scalar::random(rng);
		let t1 = s_commitment * &v;
		let t2 = g * &v;
		let t3 = share;

		let c = misbehavior_challenge(context, s_commitment, self.public_key(), t1, t2, t3);
		let r1 = v - c.clone() * self.keypair().private().clone();

		ServerProof { t1, t2, t3, c, r1, r2: None }
	}
}

impl<P: ECPoint> crate::server::RoundSecret<P> {
	pub(crate) fn secret(&self) -> &P::Scalar {
		&self.secret
	}

	pub(crate) fn commitment(&self) -> P {
		self.commitment
	}
}

/// Check the transformation proof at chain position `position` of a
/// server message.
pub fn verify_server_proof<P: ECPoint>(
	context: &AuthenticationContext<P>,
	position: usize,
	msg: &ServerMessage<P>,
) -> bool {
	let m = context.num_servers();
	if position >= msg.proofs.len() ||
		msg.proofs.len() != msg.tags.len() ||
		msg.proofs.len() != msg.indexes.len()
	{
		return false
	}

	let proof = &msg.proofs[position];
	let r2 = match &proof.r2 {
		Some(r2) => r2,
		None => return false,
	};

	let server_index = msg.indexes[position] as usize;
	let s_commits = &msg.request.tag_and_commitments.s_commits;
	if server_index >= m || s_commits.len() != m + 2 {
		return false
	}

	let round_commitment = match context.server_round_commitment(msg.indexes[position]) {
		Ok(point) => point,
		Err(_) => return false,
	};

	let t_prev = if position == 0 {
		msg.request.tag_and_commitments.t0
	} else {
		msg.tags[position - 1]
	};
	let t_new = msg.tags[position];

	let chain_in = s_commits[server_index];
	let chain_out = s_commits[server_index + 1];
	let secret = ephemeral_secret::<P>(chain_out - chain_in);

	let c = transformation_challenge(
		context,
		t_prev,
		t_new,
		round_commitment,
		chain_in,
		chain_out,
		proof.t1,
		proof.t2,
		proof.t3,
	);
	if c != proof.c {
		return false
	}

	let g = P::generator();
	proof.t1 == t_prev * &proof.r1 - t_new * r2 &&
		proof.t2 == g * &proof.r1 + round_commitment * &proof.c &&
		proof.t3 == g * r2 + P::from_scalar(&secret) * &proof.c
}

/// Check a misbehavior proof from server `server_index` against the
/// client's commitment to `s`.
pub fn verify_misbehaving_proof<P: ECPoint>(
	context: &AuthenticationContext<P>,
	server_index: u32,
	proof: &ServerProof<P>,
	s_commitment: P,
) -> bool {
	if proof.r2.is_some() {
		return false
	}

	let server_key = match context.server_key(server_index) {
		Ok(key) => key,
		Err(_) => return false,
	};

	let c = misbehavior_challenge(context, s_commitment, server_key, proof.t1, proof.t2, proof.t3);
	if c != proof.c {
		return false
	}

	let g = P::generator();
	proof.t1 == s_commitment * &proof.r1 + proof.t3 * &proof.c &&
		proof.t2 == g * &proof.r1 + server_key * &proof.c
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{generate_test_context, make_authentication_message};
	use rand::SeedableRng;

	type Point = crate::crypto::ristretto::Point;
	type Scalar = crate::crypto::ristretto::Scalar;

	async fn processed_message(
		seed: u8,
		servers_to_run: usize,
	) -> (
		crate::context::AuthenticationContext<Point>,
		Vec<Server<Point>>,
		ServerMessage<Point>,
		Rng,
	) {
		let mut rng = Rng::from_seed([seed; 32]);
		let (clients, servers, context) = generate_test_context(2, 3, &mut rng);

		let (request, challenge) =
			make_authentication_message(&context, &clients[0], &servers, &mut rng).await;
		let mut msg = ServerMessage::new(request);
		for server in servers.iter().take(servers_to_run) {
			let round_challenge = if msg.indexes.is_empty() { Some(&challenge) } else { None };
			server.process_authentication(&context, &mut msg, round_challenge, &mut rng).unwrap();
		}
		(context, servers, msg, rng)
	}

	#[tokio::test]
	async fn every_honest_step_verifies() {
		let (context, _, msg, _) = processed_message(70, 3).await;

		for position in 0..3 {
			assert!(msg.proofs[position].r2.is_some());
			assert!(verify_server_proof(&context, position, &msg));
		}
	}

	#[tokio::test]
	async fn out_of_range_positions_fail() {
		let (context, _, msg, _) = processed_message(71, 2).await;

		assert!(verify_server_proof(&context, 0, &msg));
		assert!(verify_server_proof(&context, 1, &msg));
		assert!(!verify_server_proof(&context, 2, &msg));
	}

	#[tokio::test]
	async fn any_tampered_proof_element_fails() {
		let (context, _, msg, _) = processed_message(72, 2).await;
		let position = 1;
		let one = Scalar::from(1);

		assert!(verify_server_proof(&context, position, &msg));

		let mut bad = msg.clone();
		bad.proofs[position].c = bad.proofs[position].c.clone() + &one;
		assert!(!verify_server_proof(&context, position, &bad));

		let mut bad = msg.clone();
		bad.proofs[position].t1 = bad.proofs[position].t1 + Point::generator();
		assert!(!verify_server_proof(&context, position, &bad));

		let mut bad = msg.clone();
		bad.proofs[position].t2 = bad.proofs[position].t2 + Point::generator();
		assert!(!verify_server_proof(&context, position, &bad));

		let mut bad = msg.clone();
		bad.proofs[position].t3 = bad.proofs[position].t3 + Point::generator();
		assert!(!verify_server_proof(&context, position, &bad));

		let mut bad = msg.clone();
		bad.proofs[position].r1 = bad.proofs[position].r1.clone() + &one;
		assert!(!verify_server_proof(&context, position, &bad));

		let mut bad = msg.clone();
		bad.proofs[position].r2 =
			Some(bad.proofs[position].r2.clone().unwrap() + &one);
		assert!(!verify_server_proof(&context, position, &bad));

		// Dropping the second response turns it into a (bogus)
		// misbehavior proof, which fails as such
		let mut bad = msg.clone();
		bad.proofs[position].r2 = None;
		assert!(!verify_server_proof(&context, position, &bad));
		assert!(!verify_misbehaving_proof(
			&context,
			bad.indexes[position],
			&bad.proofs[position],
			bad.request.tag_and_commitments.s_commitment(),
		));
	}

	#[tokio::test]
	async fn misbehavior_proof_roundtrip() {
		let mut rng = Rng::from_seed([73; 32]);
		let (clients, servers, context) = generate_test_context(2, 2, &mut rng);

		let (request, _) =
			make_authentication_message(&context, &clients[0], &servers, &mut rng).await;
		let s_commitment = request.tag_and_commitments.s_commitment();

		let proof = servers[0].generate_misbehaving_proof(&context, s_commitment, &mut rng);
		assert!(proof.r2.is_none());
		// The published share is the server's true view of the shared
		// secret
		assert_eq!(proof.t3, s_commitment * servers[0].keypair().private());

		assert!(verify_misbehaving_proof(&context, 0, &proof, s_commitment));

		// Wrong accused server
		assert!(!verify_misbehaving_proof(&context, 1, &proof, s_commitment));

		// Wrong base point
		assert!(!verify_misbehaving_proof(&context, 0, &proof, Point::generator()));

		let one = Scalar::from(1);
		let mut bad = proof.clone();
		bad.c = bad.c.clone() + &one;
		assert!(!verify_misbehaving_proof(&context, 0, &bad, s_commitment));

		let mut bad = proof.clone();
		bad.t1 = bad.t1 + Point::generator();
		assert!(!verify_misbehaving_proof(&context, 0, &bad, s_commitment));

		let mut bad = proof.clone();
		bad.t2 = bad.t2 + Point::generator();
		assert!(!verify_misbehaving_proof(&context, 0, &bad, s_commitment));

		let mut bad = proof.clone();
		bad.t3 = bad.t3 + Point::generator();
		assert!(!verify_misbehaving_proof(&context, 0, &bad, s_commitment));

		let mut bad = proof.clone();
		bad.r1 = bad.r1.clone() + &one;
		assert!(!verify_misbehaving_proof(&context, 0, &bad, s_commitment));

		// A second response never belongs on a misbehavior proof
		let mut bad = proof.clone();
		bad.r2 = Some(one);
		assert!(!verify_misbehaving_proof(&context, 0, &bad, s_commitment));
	}

	#[tokio::test]
	async fn proof_encoding_distinguishes_the_branches() {
		let mut rng = Rng::from_seed([74; 32]);
		let (clients, servers, context) = generate_test_context(2, 2, &mut rng);

		let (request, challenge) =
			make_authentication_message(&context, &clients[0], &servers, &mut rng).await;
		let mut msg = ServerMessage::new(request);
		servers[0]
			.process_authentication(&context, &mut msg, Some(&challenge), &mut rng)
			.unwrap();

		let transformation_bytes = msg.proofs[0].to_bytes();
		assert_eq!(transformation_bytes.len(), 6 * 32 + 1);

		let misbehavior = servers[0].generate_misbehaving_proof(
			&context,
			msg.request.tag_and_commitments.s_commitment(),
			&mut rng,
		);
		assert_eq!(misbehavior.to_bytes().len(), 5 * 32 + 1);
	}
}
