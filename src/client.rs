pub mod proof;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
	context::AuthenticationContext,
	crypto::{
		schnorr::{self, Keypair},
		ECPoint, ECScalar, Rng, POINT_SIZE, SCALAR_SIZE,
	},
	error::{Error, Result},
	server::{
		proof::{verify_misbehaving_proof, verify_server_proof},
		ServerMessage,
	},
};

use proof::ClientProof;

/// A group member: its position in the context's member list and its
/// long-term key-pair.
#[derive(Clone, Debug)]
pub struct Client<P: ECPoint> {
	index: u32,
	keypair: Keypair<P>,
}

impl<P: ECPoint> Client<P> {
	/// Create a client identity, generating a key-pair unless an
	/// existing private key is supplied.
	pub fn new(index: u32, private: Option<P::Scalar>, rng: &mut Rng) -> Self {
		let keypair = match private {
			Some(private) => Keypair::from_private(private),
			None => Keypair::generate(rng),
		};
		Client { index, keypair }
	}

	pub fn index(&self) -> u32 {
		self.index
	}

	pub fn public_key(&self) -> P {
		self.keypair.public()
	}

	pub(crate) fn keypair(&self) -> &Keypair<P> {
		&self.keypair
	}
}

/// The client's initial linkage tag `T0 = s * h_i` together with the
/// shared-commitment vector `S`. `S[0] = g`, each `S[k+1] = S[k] +
/// s * y_k` encodes the secret the client shares with server `k`, and
/// the final entry `S[m+1] = s * g` is the public commitment to `s`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialTagAndCommitments<P: ECPoint> {
	#[serde(bound = "")]
	pub t0: P,
	#[serde(bound = "")]
	pub s_commits: Vec<P>,
}

impl<P: ECPoint> InitialTagAndCommitments<P> {
	/// The commitment to the aggregation randomness, `S[m+1]`.
	pub fn s_commitment(&self) -> P {
		*self.s_commits.last().expect("S is never empty by construction")
	}
}

/// Derive the initial tag and shared commitments for the client at
/// `client_index`. Returns the structure together with the private
/// aggregation randomness `s`, which the caller must keep for the
/// proof (it is wiped on drop).
pub fn new_initial_tag_and_commitments<P: ECPoint>(
	context: &AuthenticationContext<P>,
	client_index: u32,
	rng: &mut Rng,
) -> Result<(InitialTagAndCommitments<P>, P::Scalar)> {
	let generator = context.generator(client_index)?;
	let s = P::Scalar::random(rng);

	let mut s_commits = Vec::with_capacity(context.num_servers() + 2);
	s_commits.push(P::generator());
	for server_key in context.server_keys() {
		let previous = *s_commits.last().expect("just pushed");
		s_commits.push(previous + *server_key * &s);
	}
	s_commits.push(P::from_scalar(&s));

	let t0 = generator * &s;

	Ok((InitialTagAndCommitments { t0, s_commits }, s))
}

/// The complete client request: the context it authenticates under,
/// the initial tag and commitments, and the OR-proof over the group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationMessage<P: ECPoint> {
	#[serde(bound = "")]
	pub context: AuthenticationContext<P>,
	#[serde(bound = "")]
	pub tag_and_commitments: InitialTagAndCommitments<P>,
	#[serde(bound = "")]
	pub proof: ClientProof<P>,
}

impl<P: ECPoint> AuthenticationMessage<P> {
	pub fn new(
		context: AuthenticationContext<P>,
		tag_and_commitments: InitialTagAndCommitments<P>,
		proof: ClientProof<P>,
	) -> Self {
		AuthenticationMessage { context, tag_and_commitments, proof }
	}

	/// Canonical byte view used as signature input along the server
	/// chain: context members and generators, then `S`, `T0` and the
	/// three moves of the proof, every element fixed-length.
	pub fn to_bytes(&self) -> Vec<u8> {
		let point_count = self.tag_and_commitments.s_commits.len() + 1 + self.proof.t.len();
		let scalar_count = 1 + self.proof.c.len() + self.proof.r.len();
		let mut bytes = self.context.to_bytes();
		bytes.reserve(POINT_SIZE * point_count + SCALAR_SIZE * scalar_count);

		for point in &self.tag_and_commitments.s_commits {
			bytes.extend_from_slice(&point.as_bytes());
		}
		bytes.extend_from_slice(&self.tag_and_commitments.t0.as_bytes());
		bytes.extend_from_slice(&self.proof.cs.to_bytes());
		for point in &self.proof.t {
			bytes.extend_from_slice(&point.as_bytes());
		}
		for scalar in &self.proof.c {
			bytes.extend_from_slice(&scalar.to_bytes());
		}
		for scalar in &self.proof.r {
			bytes.extend_from_slice(&scalar.to_bytes());
		}
		bytes
	}
}

/// Verify a fully processed server chain and extract the final
/// linkage tag.
///
/// Every server must have contributed exactly once, every chain
/// signature and per-server proof must verify, and a misbehaving step
/// must have left the tag untouched. If any server attached a (valid)
/// misbehavior proof the result is the identity element: a tag that
/// never authenticates, attributable to the client.
pub fn get_final_linkage_tag<P: ECPoint>(
	context: &AuthenticationContext<P>,
	msg: &ServerMessage<P>,
) -> Result<P> {
	let m = context.num_servers();
	if msg.request.context != *context {
		return Err(Error::MalformedMessage(
			"message was built for a different context".to_string(),
		))
	}
	if msg.indexes.len() != m {
		return Err(Error::MalformedMessage(format!(
			"incomplete server chain: {} of {m} entries",
			msg.indexes.len()
		)))
	}
	if msg.tags.len() != m || msg.proofs.len() != m || msg.sigs.len() != m {
		return Err(Error::MalformedMessage(
			"parallel vectors have different lengths".to_string(),
		))
	}

	let mut seen = vec![false; m];
	for &index in &msg.indexes {
		if index as usize >= m || std::mem::replace(&mut seen[index as usize], true) {
			return Err(Error::MalformedMessage(format!(
				"server indexes are not a permutation: {index}"
			)))
		}
	}

	let request_bytes = msg.request.to_bytes();
	for (position, sig) in msg.sigs.iter().enumerate() {
		if sig.index != msg.indexes[position] {
			return Err(Error::InvalidServerProof(format!(
				"signature at position {position} is from server {}, expected {}",
				sig.index, msg.indexes[position]
			)))
		}
		let mut payload = request_bytes.clone();
		payload.extend_from_slice(&msg.tags[position].as_bytes());
		payload.extend_from_slice(&msg.proofs[position].to_bytes());
		payload.extend_from_slice(&sig.index.to_be_bytes());
		if !schnorr::verify(context.server_key(sig.index)?, &payload, &sig.sig) {
			return Err(Error::InvalidServerProof(format!(
				"bad chain signature from server {}",
				sig.index
			)))
		}
	}

	let s_commitment = msg.request.tag_and_commitments.s_commitment();
	let mut tag = msg.request.tag_and_commitments.t0;
	let mut misbehaving = false;
	for position in 0..m {
		let server_index = msg.indexes[position];
		let proof = &msg.proofs[position];
		if proof.r2.is_some() {
			if !verify_server_proof(context, position, msg) {
				return Err(Error::InvalidServerProof(format!(
					"transformation proof from server {server_index} does not verify"
				)))
			}
		} else {
			if !verify_misbehaving_proof(context, server_index, proof, s_commitment) {
				return Err(Error::InvalidServerProof(format!(
					"misbehavior proof from server {server_index} does not verify"
				)))
			}
			if msg.tags[position] != tag {
				return Err(Error::InvalidServerProof(format!(
					"server {server_index} reported misbehavior but changed the tag"
				)))
			}
			debug!("server {server_index} attached a misbehavior proof");
			misbehaving = true;
		}
		tag = msg.tags[position];
	}

	if misbehaving {
		// The bottom tag: attributable misbehavior, never a valid
		// authentication.
		Ok(P::point_at_infinity())
	} else {
		Ok(tag)
	}
}
