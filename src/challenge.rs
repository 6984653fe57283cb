//! Distributed generation of the per-round master client challenge.
//!
//! Every serving server contributes a committed random scalar; once all
//! commitments are opened the challenge is the sum of the openings, so
//! no subset of fewer than `m` servers can bias it. The challenge then
//! does a signing round-robin across the roster and is released to the
//! client only with the full set of signatures attached.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
	context::AuthenticationContext,
	crypto::{
		schnorr::{self, SchnorrSignature},
		ECPoint, ECScalar, Rng,
	},
	error::{Error, Result},
	server::Server,
};

/// A server's signature over a protocol value, tagged with the
/// signer's roster index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSignature<P: ECPoint> {
	pub index: u32,
	#[serde(bound = "")]
	pub sig: SchnorrSignature<P>,
}

/// A signed commitment `o * g` to one server's challenge contribution.
/// The opening `o` stays with its server until the reveal step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeCommitment<P: ECPoint> {
	#[serde(bound = "")]
	pub commitment: P,
	#[serde(bound = "")]
	pub sig: ServerSignature<P>,
}

/// The challenge as it travels through the signing round-robin. Keeps
/// the commitments and openings so that every visited server can
/// re-verify the full opening phase before adding its signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeState<P: ECPoint> {
	#[serde(bound = "")]
	pub cs: P::Scalar,
	#[serde(bound = "")]
	pub commitments: Vec<ChallengeCommitment<P>>,
	#[serde(bound = "")]
	pub openings: Vec<P::Scalar>,
	#[serde(bound = "")]
	pub sigs: Vec<ServerSignature<P>>,
}

/// The finalized challenge delivered to the client: the scalar plus
/// one signature per serving server (commitments and openings are not
/// part of the release).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge<P: ECPoint> {
	#[serde(bound = "")]
	pub cs: P::Scalar,
	#[serde(bound = "")]
	pub sigs: Vec<ServerSignature<P>>,
}

impl<P: ECPoint> Challenge<P> {
	/// Check that every serving server of `context` signed this
	/// challenge. A challenge from a previous round fails here, since
	/// the roster's round keys are fresh per round.
	pub fn verify_signatures(&self, context: &AuthenticationContext<P>) -> Result<()> {
		let m = context.num_servers();
		if self.sigs.len() != m {
			return Err(Error::InvalidChallenge(format!(
				"expected {} signatures, got {}",
				m,
				self.sigs.len()
			)))
		}

		let mut seen = vec![false; m];
		let cs_bytes = self.cs.to_bytes();
		for sig in &self.sigs {
			let key = context
				.server_key(sig.index)
				.map_err(|_| Error::InvalidChallenge(format!("unknown server index {}", sig.index)))?;
			if std::mem::replace(&mut seen[sig.index as usize], true) {
				return Err(Error::InvalidChallenge(format!(
					"duplicate signature from server {}",
					sig.index
				)))
			}
			if !schnorr::verify(key, &cs_bytes, &sig.sig) {
				return Err(Error::InvalidChallenge(format!(
					"bad signature from server {}",
					sig.index
				)))
			}
		}
		Ok(())
	}
}

impl<P: ECPoint> Server<P> {
	/// Pick a fresh challenge contribution and commit to it. Returns
	/// the signed commitment together with the opening, which must be
	/// withheld until the reveal step.
	pub fn generate_commitment(&self, rng: &mut Rng) -> (ChallengeCommitment<P>, P::Scalar) {
		let opening = P::Scalar::random(rng);
		let commitment = P::from_scalar(&opening);
		let sig = schnorr::sign(self.keypair(), &commitment.as_bytes());
		(
			ChallengeCommitment {
				commitment,
				sig: ServerSignature { index: self.index(), sig },
			},
			opening,
		)
	}

	/// One stop of the signing round-robin: re-verify the whole
	/// commit/open phase and the signatures collected so far, then
	/// append our own signature over the challenge. Once all `m`
	/// signatures are present further visits are accepting no-ops,
	/// which lets the round-robin close back at the leader.
	pub fn check_update_challenge(
		&self,
		context: &AuthenticationContext<P>,
		state: &mut ChallengeState<P>,
	) -> Result<()> {
		verify_commitment_signatures(context, &state.commitments)?;

		let cs = check_openings(context, &state.commitments, &state.openings)?;
		if cs != state.cs {
			return Err(Error::InvalidChallenge(
				"challenge does not match the sum of the openings".to_string(),
			))
		}

		let m = context.num_servers();
		let cs_bytes = state.cs.to_bytes();
		let mut seen = vec![false; m];
		for sig in &state.sigs {
			let key = context.server_key(sig.index).map_err(|_| {
				Error::InvalidChallenge(format!("unknown server index {}", sig.index))
			})?;
			if std::mem::replace(&mut seen[sig.index as usize], true) {
				return Err(Error::InvalidChallenge(format!(
					"duplicate signature from server {}",
					sig.index
				)))
			}
			if !schnorr::verify(key, &cs_bytes, &sig.sig) {
				warn!("rejecting challenge: bad signature from server {}", sig.index);
				return Err(Error::InvalidChallenge(format!(
					"bad signature from server {}",
					sig.index
				)))
			}
		}

		if seen[self.index() as usize] {
			// Our signature is already in: either the round-robin has
			// come full circle (fine) or someone replayed us early.
			return if state.sigs.len() == m {
				Ok(())
			} else {
				Err(Error::InvalidChallenge(format!(
					"server {} has already signed this challenge",
					self.index()
				)))
			}
		}

		debug!("server {} signing round challenge", self.index());
		let sig = schnorr::sign(self.keypair(), &cs_bytes);
		state.sigs.push(ServerSignature { index: self.index(), sig });
		Ok(())
	}
}

/// Leader-side check of the commitment phase: one commitment per
/// server, carried at its own roster position, each correctly signed.
pub fn verify_commitment_signatures<P: ECPoint>(
	context: &AuthenticationContext<P>,
	commitments: &[ChallengeCommitment<P>],
) -> Result<()> {
	let m = context.num_servers();
	if commitments.len() != m {
		return Err(Error::InvalidChallenge(format!(
			"expected {} commitments, got {}",
			m,
			commitments.len()
		)))
	}

	for (position, commitment) in commitments.iter().enumerate() {
		if commitment.sig.index as usize != position {
			return Err(Error::InvalidChallenge(format!(
				"commitment at position {position} claims index {}",
				commitment.sig.index
			)))
		}
		let key = context.server_key(commitment.sig.index)?;
		if !schnorr::verify(key, &commitment.commitment.as_bytes(), &commitment.sig.sig) {
			return Err(Error::InvalidChallenge(format!(
				"bad commitment signature from server {position}"
			)))
		}
	}
	Ok(())
}

/// Leader-side check of the reveal phase: every opening matches its
/// commitment. Returns the master challenge `cs = sum of openings`.
pub fn check_openings<P: ECPoint>(
	context: &AuthenticationContext<P>,
	commitments: &[ChallengeCommitment<P>],
	openings: &[P::Scalar],
) -> Result<P::Scalar> {
	let m = context.num_servers();
	if commitments.len() != m {
		return Err(Error::InvalidChallenge(format!(
			"expected {} commitments, got {}",
			m,
			commitments.len()
		)))
	}
	if openings.len() != m {
		return Err(Error::InvalidChallenge(format!(
			"expected {} openings, got {}",
			m,
			openings.len()
		)))
	}

	for (position, (commitment, opening)) in commitments.iter().zip(openings).enumerate() {
		if commitment.commitment != P::from_scalar(opening) {
			return Err(Error::InvalidChallenge(format!(
				"opening from server {position} does not match its commitment"
			)))
		}
	}

	Ok(openings.iter().cloned().sum())
}

/// Verify the full commit/open phase and start the signing
/// round-robin with an empty signature set.
pub fn initialize_challenge<P: ECPoint>(
	context: &AuthenticationContext<P>,
	commitments: Vec<ChallengeCommitment<P>>,
	openings: Vec<P::Scalar>,
) -> Result<ChallengeState<P>> {
	verify_commitment_signatures(context, &commitments)?;
	let cs = check_openings(context, &commitments, &openings)?;
	Ok(ChallengeState { cs, commitments, openings, sigs: vec![] })
}

/// Close the round: the state must carry exactly one signature per
/// serving server. The emitted challenge drops the commitments and
/// openings.
pub fn finalize_challenge<P: ECPoint>(
	context: &AuthenticationContext<P>,
	state: &ChallengeState<P>,
) -> Result<Challenge<P>> {
	if state.sigs.len() != context.num_servers() {
		return Err(Error::InvalidChallenge(format!(
			"round-robin incomplete: {} of {} signatures",
			state.sigs.len(),
			context.num_servers()
		)))
	}
	let challenge = Challenge { cs: state.cs.clone(), sigs: state.sigs.clone() };
	challenge.verify_signatures(context)?;
	Ok(challenge)
}
