pub mod proof;

use itertools::izip;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
	challenge::{Challenge, ServerSignature},
	client::{proof::verify_client_proof, AuthenticationMessage},
	context::AuthenticationContext,
	crypto::{
		schnorr::{self, Keypair},
		ECPoint, ECScalar, Rng,
	},
	error::{Error, Result},
};

use proof::ServerProof;

/// A server's secret for the current round and the public commitment
/// `R = r * g` that the context carries for it. Replaced wholesale at
/// every round change.
#[derive(Clone, Debug)]
pub struct RoundSecret<P: ECPoint> {
	secret: P::Scalar,
	commitment: P,
}

/// A serving server: its roster position, long-term key-pair and
/// (once a round has started) its per-round secret.
#[derive(Clone, Debug)]
pub struct Server<P: ECPoint> {
	index: u32,
	keypair: Keypair<P>,
	round_secret: Option<RoundSecret<P>>,
}

impl<P: ECPoint> Server<P> {
	/// Create a server identity, generating a key-pair unless an
	/// existing private key is supplied. The round secret starts
	/// unset; call [`Server::generate_new_round_secret`] before
	/// serving.
	pub fn new(index: u32, private: Option<P::Scalar>, rng: &mut Rng) -> Self {
		let keypair = match private {
			Some(private) => Keypair::from_private(private),
			None => Keypair::generate(rng),
		};
		Server { index, keypair, round_secret: None }
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

	/// Swap in a fresh round secret, returning the commitment `R` to
	/// publish in the next context. Exclusive access (`&mut`) makes
	/// the swap atomic with respect to message processing.
	pub fn generate_new_round_secret(&mut self, rng: &mut Rng) -> P {
		let secret = P::Scalar::random(rng);
		let commitment = P::from_scalar(&secret);
		self.round_secret = Some(RoundSecret { secret, commitment });
		commitment
	}

	pub fn round_commitment(&self) -> Option<P> {
		self.round_secret.as_ref().map(|round| round.commitment)
	}

	/// Reinstate a persisted round secret (see
	/// [`crate::message::StoredServer`]).
	pub fn restore_round_secret(&mut self, secret: P::Scalar) {
		let commitment = P::from_scalar(&secret);
		self.round_secret = Some(RoundSecret { secret, commitment });
	}

	pub(crate) fn round_secret_cloned(&self) -> Option<P::Scalar> {
		self.round_secret.as_ref().map(|round| round.secret.clone())
	}

	pub(crate) fn round_secret(&self) -> &RoundSecret<P> {
		self.round_secret
			.as_ref()
			.expect("round secret must be generated before serving a round")
	}
}

/// The in-flight authentication: the client's request plus four
/// parallel vectors growing by one entry per visited server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage<P: ECPoint> {
	#[serde(bound = "")]
	pub request: AuthenticationMessage<P>,
	#[serde(bound = "")]
	pub tags: Vec<P>,
	#[serde(bound = "")]
	pub proofs: Vec<ServerProof<P>>,
	pub indexes: Vec<u32>,
	#[serde(bound = "")]
	pub sigs: Vec<ServerSignature<P>>,
}

impl<P: ECPoint> ServerMessage<P> {
	/// Wrap a client request for its walk along the server chain.
	pub fn new(request: AuthenticationMessage<P>) -> Self {
		ServerMessage { request, tags: vec![], proofs: vec![], indexes: vec![], sigs: vec![] }
	}
}

impl<P: ECPoint> Server<P> {
	/// This server's step of the authentication chain: validate the
	/// message, transform the running tag under our round secret (or
	/// detect a misbehaving client and prove it), and append our
	/// entry. The client's request itself is never modified.
	///
	/// The first server in the chain vets the request before any
	/// server spends work on it and must be handed the finalized
	/// round challenge for that: the client's proof only counts if it
	/// answers the `cs` the full roster signed this round. Later
	/// servers rely on the chain signatures instead and ignore
	/// `round_challenge`.
	pub fn process_authentication(
		&self,
		context: &AuthenticationContext<P>,
		msg: &mut ServerMessage<P>,
		round_challenge: Option<&Challenge<P>>,
		rng: &mut Rng,
	) -> Result<()> {
		let m = context.num_servers();
		if msg.request.context != *context {
			return Err(Error::MalformedMessage(
				"message was built for a different context".to_string(),
			))
		}
		if self.index as usize >= m {
			return Err(Error::BadContext(format!(
				"server index {} out of range for a roster of {m}",
				self.index
			)))
		}

		if msg.tags.len() != msg.proofs.len() ||
			msg.tags.len() != msg.indexes.len() ||
			msg.tags.len() != msg.sigs.len()
		{
			return Err(Error::MalformedMessage(
				"parallel vectors have different lengths".to_string(),
			))
		}
		if msg.tags.len() >= m {
			return Err(Error::MalformedMessage(format!(
				"chain already carries {} entries for a roster of {m}",
				msg.tags.len()
			)))
		}

		let s_commits = &msg.request.tag_and_commitments.s_commits;
		if s_commits.len() != m + 2 {
			return Err(Error::MalformedMessage(format!(
				"expected {} shared commitments, got {}",
				m + 2,
				s_commits.len()
			)))
		}
		if s_commits[0] != P::generator() {
			return Err(Error::MalformedMessage(
				"shared commitments do not start at the generator".to_string(),
			))
		}

		if msg.indexes.is_empty() {
			let round_challenge = round_challenge.ok_or_else(|| {
				Error::InvalidChallenge(
					"the first server in the chain needs the finalized round challenge"
						.to_string(),
				)
			})?;
			round_challenge.verify_signatures(context)?;
			if round_challenge.cs != msg.request.proof.cs {
				return Err(Error::InvalidChallenge(
					"client proof does not answer the current round challenge".to_string(),
				))
			}
			if !verify_client_proof(context, &msg.request.tag_and_commitments, &msg.request.proof)
			{
				return Err(Error::InvalidClientProof(
					"client proof does not verify".to_string(),
				))
			}
		}

		// Any byte of the request or of an earlier entry mutated in
		// transit invalidates the signatures collected so far.
		let request_bytes = msg.request.to_bytes();
		for (tag, proof, &index, sig) in izip!(&msg.tags, &msg.proofs, &msg.indexes, &msg.sigs) {
			if sig.index != index {
				return Err(Error::InvalidServerProof(format!(
					"chain entry of server {index} is signed by server {}",
					sig.index
				)))
			}
			let mut payload = request_bytes.clone();
			payload.extend_from_slice(&tag.as_bytes());
			payload.extend_from_slice(&proof.to_bytes());
			payload.extend_from_slice(&index.to_be_bytes());
			if !schnorr::verify(context.server_key(index)?, &payload, &sig.sig) {
				return Err(Error::InvalidServerProof(format!(
					"bad chain signature from server {index}"
				)))
			}
		}

		if msg.indexes.contains(&self.index) {
			return Err(Error::DuplicateServerEntry(self.index))
		}

		let round_secret = self.round_secret().secret.clone();

		let t_prev = match msg.tags.last() {
			Some(tag) => *tag,
			None => msg.request.tag_and_commitments.t0,
		};

		// The secret this client shares with us, as committed in its
		// chain step.
		let shared_secret = s_commits[m + 1] * self.keypair.private();
		let chain_in = s_commits[self.index as usize];
		let chain_out = s_commits[self.index as usize + 1];

		let (t_new, proof) = if chain_out == chain_in + shared_secret {
			let secret = proof::ephemeral_secret::<P>(shared_secret);
			let exponent =
				round_secret * secret.invert().expect("the ephemeral secret is never zero");
			let t_new = t_prev * &exponent;
			let proof = self.generate_transformation_proof(
				context, &secret, t_prev, t_new, chain_in, chain_out, rng,
			);
			debug!("server {} transformed the linkage tag", self.index);
			(t_new, proof)
		} else {
			warn!(
				"server {} detected a malformed shared commitment, attaching misbehavior proof",
				self.index
			);
			let proof = self.generate_misbehaving_proof(context, s_commits[m + 1], rng);
			(t_prev, proof)
		};

		let mut payload = request_bytes;
		payload.extend_from_slice(&t_new.as_bytes());
		payload.extend_from_slice(&proof.to_bytes());
		payload.extend_from_slice(&self.index.to_be_bytes());
		let sig = schnorr::sign(&self.keypair, &payload);

		msg.tags.push(t_new);
		msg.proofs.push(proof);
		msg.indexes.push(self.index);
		msg.sigs.push(ServerSignature { index: self.index, sig });
		Ok(())
	}
}
