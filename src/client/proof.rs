//! The client's OR-proof: a 3-move sigma protocol proving, without
//! revealing which, that one clause of
//! `T0 = s*h_k  AND  Sm = s*g  AND  X_k = x_k*g` holds.
//!
//! The prover runs as its own task and exchanges the protocol moves
//! with the controlling code through four one-way queues (commitments,
//! master challenge, sub-challenges, responses), so that the generic
//! sigma machinery stays isolated from the "send commitments to the
//! servers, wait for their challenge" control flow. Closing a queue on
//! the producer side signals that the phase is complete.

use std::time::Duration;

use rand::{Rng as _, SeedableRng as _};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
	challenge::Challenge,
	context::AuthenticationContext,
	crypto::{ECPoint, ECScalar, Rng},
	error::{Error, Result},
};

use super::{Client, InitialTagAndCommitments};

/// How long the proof session waits for the server federation by
/// default before giving up with [`Error::ProtocolTimeout`].
pub const DEFAULT_PROOF_TIMEOUT: Duration = Duration::from_secs(30);

/// The client's proof `P`: the master challenge it answered, the `3n`
/// clause commitments, the `n` sub-challenges (summing to `cs`) and
/// the `2n` responses (per clause: one for the shared `s` witness, one
/// for the private-key witness).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProof<P: ECPoint> {
	#[serde(bound = "")]
	pub cs: P::Scalar,
	#[serde(bound = "")]
	pub t: Vec<P>,
	#[serde(bound = "")]
	pub c: Vec<P::Scalar>,
	#[serde(bound = "")]
	pub r: Vec<P::Scalar>,
}

/// The public values of the OR-statement, shared by prover and
/// verifier.
struct OrStatement<P: ECPoint> {
	t0: P,
	s_commitment: P,
	client_keys: Vec<P>,
	generators: Vec<P>,
}

impl<P: ECPoint> OrStatement<P> {
	fn new(
		context: &AuthenticationContext<P>,
		tag_and_commitments: &InitialTagAndCommitments<P>,
	) -> Self {
		OrStatement {
			t0: tag_and_commitments.t0,
			s_commitment: tag_and_commitments.s_commitment(),
			client_keys: context.client_keys().to_vec(),
			generators: context.generators().to_vec(),
		}
	}

	fn clauses(&self) -> usize {
		self.client_keys.len()
	}
}

/// A clause the prover simulated in advance: its pre-picked challenge
/// and responses, from which the commitments were back-computed.
struct SimulatedClause<P: ECPoint> {
	challenge: P::Scalar,
	response_tag: P::Scalar,
	response_key: P::Scalar,
}

/// Prover state carried from the commitment move to the response
/// move. The blinding scalars are wiped on drop.
struct ProverCommitState<P: ECPoint> {
	w_tag: P::Scalar,
	w_key: P::Scalar,
	simulated: Vec<Option<SimulatedClause<P>>>,
}

/// First move: honest commitments for the true clause, simulated
/// commitments (from pre-picked challenge/responses) for every other
/// clause. Emits `3n` points in clause order.
fn commit_phase<P: ECPoint>(
	statement: &OrStatement<P>,
	true_index: usize,
	rng: &mut Rng,
) -> (Vec<P>, ProverCommitState<P>) {
	let g = P::generator();
	let w_tag = P::Scalar::random(rng);
	let w_key = P::Scalar::random(rng);

	let mut commitments = Vec::with_capacity(3 * statement.clauses());
	let mut simulated = Vec::with_capacity(statement.clauses());
	for k in 0..statement.clauses() {
		if k == true_index {
			commitments.push(statement.generators[k] * &w_tag);
			commitments.push(g * &w_tag);
			commitments.push(g * &w_key);
			simulated.push(None);
		} else {
			let clause = SimulatedClause {
				challenge: P::Scalar::random(rng),
				response_tag: P::Scalar::random(rng),
				response_key: P::Scalar::random(rng),
			};
			commitments
				.push(statement.generators[k] * &clause.response_tag + statement.t0 * &clause.challenge);
			commitments.push(g * &clause.response_tag + statement.s_commitment * &clause.challenge);
			commitments
				.push(g * &clause.response_key + statement.client_keys[k] * &clause.challenge);
			simulated.push(Some(clause));
		}
	}

	(commitments, ProverCommitState { w_tag, w_key, simulated })
}

/// Third move: fix the true clause's challenge so that all challenges
/// sum to the master challenge, then answer it honestly. Returns the
/// `n` sub-challenges and the `2n` responses.
fn response_phase<P: ECPoint>(
	state: ProverCommitState<P>,
	s: &P::Scalar,
	private_key: &P::Scalar,
	cs: &P::Scalar,
) -> (Vec<P::Scalar>, Vec<P::Scalar>) {
	let simulated_sum: P::Scalar = state
		.simulated
		.iter()
		.flatten()
		.map(|clause| clause.challenge.clone())
		.sum();
	let true_challenge = cs.clone() - simulated_sum;

	let mut sub_challenges = Vec::with_capacity(state.simulated.len());
	let mut responses = Vec::with_capacity(2 * state.simulated.len());
	for clause in &state.simulated {
		match clause {
			Some(clause) => {
				sub_challenges.push(clause.challenge.clone());
				responses.push(clause.response_tag.clone());
				responses.push(clause.response_key.clone());
			},
			None => {
				sub_challenges.push(true_challenge.clone());
				responses.push(state.w_tag.clone() - true_challenge.clone() * s.clone());
				responses.push(state.w_key.clone() - true_challenge.clone() * private_key.clone());
			},
		}
	}

	(sub_challenges, responses)
}

/// Recompute every clause's three commitment equations and check that
/// the sub-challenges sum to the master challenge.
fn verify_clauses<P: ECPoint>(statement: &OrStatement<P>, proof: &ClientProof<P>) -> bool {
	let n = statement.clauses();
	if proof.t.len() != 3 * n || proof.c.len() != n || proof.r.len() != 2 * n {
		warn!("client proof has the wrong shape for a group of {n}");
		return false
	}

	let challenge_sum: P::Scalar = proof.c.iter().cloned().sum();
	if challenge_sum != proof.cs {
		return false
	}

	let g = P::generator();
	for k in 0..n {
		let c_k = &proof.c[k];
		let r_tag = &proof.r[2 * k];
		let r_key = &proof.r[2 * k + 1];

		if proof.t[3 * k] != statement.generators[k] * r_tag + statement.t0 * c_k {
			return false
		}
		if proof.t[3 * k + 1] != g * r_tag + statement.s_commitment * c_k {
			return false
		}
		if proof.t[3 * k + 2] != g * r_key + statement.client_keys[k] * c_k {
			return false
		}
	}
	true
}

/// The sigma driver task. Pushes the commitments, waits for the
/// master challenge, then pushes the sub-challenges and responses.
/// Dropping the channel bundle on the controller side makes this task
/// exit cleanly; all secret state is wiped as it is dropped.
#[allow(clippy::too_many_arguments)]
async fn run_prover<P: ECPoint>(
	statement: OrStatement<P>,
	true_index: usize,
	s: P::Scalar,
	private_key: P::Scalar,
	commits: mpsc::Sender<P>,
	mut challenge: mpsc::Receiver<P::Scalar>,
	sub_challenges: mpsc::Sender<Vec<P::Scalar>>,
	responses: mpsc::Sender<P::Scalar>,
	mut rng: Rng,
) -> Result<()> {
	let (commitments, state) = commit_phase(&statement, true_index, &mut rng);
	for commitment in commitments {
		if commits.send(commitment).await.is_err() {
			return Err(Error::SessionAborted("commitment queue closed".to_string()))
		}
	}
	// Commitment phase complete
	drop(commits);

	let cs = challenge
		.recv()
		.await
		.ok_or_else(|| Error::SessionAborted("challenge queue closed".to_string()))?;

	let (c, r) = response_phase(state, &s, &private_key, &cs);
	if sub_challenges.send(c).await.is_err() {
		return Err(Error::SessionAborted("sub-challenge queue closed".to_string()))
	}
	for response in r {
		if responses.send(response).await.is_err() {
			return Err(Error::SessionAborted("response queue closed".to_string()))
		}
	}
	Ok(())
}

/// Run the 3-move proof session against the server federation.
///
/// The caller supplies the transport: `push_commitments` carries the
/// prover's commitments out (to be broadcast to the servers, typically
/// over an anonymous circuit), and `pull_challenge` delivers the
/// collectively signed [`Challenge`] back. The challenge signatures
/// are verified against the *current* roster before the proof
/// continues, so a replayed challenge from an earlier round is
/// rejected here. If the federation does not answer within `deadline`
/// the session fails with [`Error::ProtocolTimeout`].
#[allow(clippy::too_many_arguments)]
pub async fn new_client_proof<P: ECPoint>(
	context: &AuthenticationContext<P>,
	client: &Client<P>,
	tag_and_commitments: &InitialTagAndCommitments<P>,
	s: &P::Scalar,
	push_commitments: &mpsc::Sender<Vec<P>>,
	pull_challenge: &mut mpsc::Receiver<Challenge<P>>,
	deadline: Duration,
	rng: &mut Rng,
) -> Result<ClientProof<P>> {
	let n = context.num_clients();
	if n < 2 {
		// A one-clause OR-proof would expose the only possible prover
		return Err(Error::BadContext(
			"group authentication requires at least two members".to_string(),
		))
	}
	if client.index() as usize >= n {
		return Err(Error::BadContext(format!(
			"client index {} out of range for a group of {n}",
			client.index()
		)))
	}

	let (commits_tx, mut commits_rx) = mpsc::channel(3 * n);
	let (challenge_tx, challenge_rx) = mpsc::channel(1);
	let (sub_challenges_tx, mut sub_challenges_rx) = mpsc::channel(1);
	let (responses_tx, mut responses_rx) = mpsc::channel(2 * n);

	let statement = OrStatement::new(context, tag_and_commitments);
	let prover = tokio::spawn(run_prover(
		statement,
		client.index() as usize,
		s.clone(),
		client.keypair().private().clone(),
		commits_tx,
		challenge_rx,
		sub_challenges_tx,
		responses_tx,
		Rng::from_seed(rng.gen()),
	));

	let mut t = Vec::with_capacity(3 * n);
	while let Some(commitment) = commits_rx.recv().await {
		t.push(commitment);
	}
	if t.len() != 3 * n {
		return Err(Error::SessionAborted(format!(
			"received {} commitments from the prover, expected {}",
			t.len(),
			3 * n
		)))
	}

	push_commitments
		.send(t.clone())
		.await
		.map_err(|_| Error::SessionAborted("commitment consumer dropped".to_string()))?;

	let challenge = match tokio::time::timeout(deadline, pull_challenge.recv()).await {
		Err(_) => {
			warn!("no challenge from the server federation within {deadline:?}");
			return Err(Error::ProtocolTimeout(format!(
				"no challenge from the server federation within {deadline:?}"
			)))
		},
		Ok(None) =>
			return Err(Error::SessionAborted("challenge channel dropped".to_string())),
		Ok(Some(challenge)) => challenge,
	};
	challenge.verify_signatures(context)?;
	debug!("received signed round challenge, completing proof");

	let cs = challenge.cs.clone();
	challenge_tx
		.send(cs.clone())
		.await
		.map_err(|_| Error::SessionAborted("prover exited early".to_string()))?;

	let c = sub_challenges_rx
		.recv()
		.await
		.ok_or_else(|| Error::SessionAborted("prover exited early".to_string()))?;

	let mut r = Vec::with_capacity(2 * n);
	while let Some(response) = responses_rx.recv().await {
		r.push(response);
	}
	if r.len() != 2 * n {
		return Err(Error::SessionAborted(format!(
			"received {} responses from the prover, expected {}",
			r.len(),
			2 * n
		)))
	}

	prover.await.expect("prover task panicked")?;

	Ok(ClientProof { cs, t, c, r })
}

/// Check a client proof against the context and the tag/commitments
/// it claims to prove. A proof over a single-member group never
/// verifies.
pub fn verify_client_proof<P: ECPoint>(
	context: &AuthenticationContext<P>,
	tag_and_commitments: &InitialTagAndCommitments<P>,
	proof: &ClientProof<P>,
) -> bool {
	if context.num_clients() < 2 {
		return false
	}
	let statement = OrStatement::new(context, tag_and_commitments);
	verify_clauses(&statement, proof)
}
