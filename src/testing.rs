//! Shared fixtures for the crate's tests: deterministic contexts with
//! freshly keyed clients and servers, a complete challenge round, and
//! stand-in transport channels for the proof session.

use tokio::sync::mpsc;

use crate::{
	challenge::{finalize_challenge, initialize_challenge, Challenge},
	client::{
		new_initial_tag_and_commitments,
		proof::{new_client_proof, DEFAULT_PROOF_TIMEOUT},
		AuthenticationMessage, Client,
	},
	context::AuthenticationContext,
	crypto::{
		ristretto::{Point, Scalar},
		ECPoint, ECScalar, Rng,
	},
	server::Server,
};

/// Fresh clients, servers (with round secrets) and the matching
/// context for one test round.
pub(crate) fn generate_test_context(
	n: usize,
	m: usize,
	rng: &mut Rng,
) -> (Vec<Client<Point>>, Vec<Server<Point>>, AuthenticationContext<Point>) {
	let clients: Vec<_> = (0..n).map(|i| Client::new(i as u32, None, rng)).collect();

	let mut servers: Vec<_> = (0..m).map(|i| Server::new(i as u32, None, rng)).collect();
	let round_commitments: Vec<_> =
		servers.iter_mut().map(|server| server.generate_new_round_secret(rng)).collect();

	// Per-round generators come from the external context-generation
	// protocol; any non-identity elements do for tests
	let generators: Vec<_> = (0..n).map(|_| Point::from_scalar(&Scalar::random(rng))).collect();

	let context = AuthenticationContext::new(
		clients.iter().map(Client::public_key).collect(),
		generators,
		servers.iter().map(Server::public_key).collect(),
		round_commitments,
	)
	.unwrap();

	(clients, servers, context)
}

/// Run the complete distributed challenge round over `servers`.
pub(crate) fn build_round_challenge(
	context: &AuthenticationContext<Point>,
	servers: &[Server<Point>],
	rng: &mut Rng,
) -> Challenge<Point> {
	let (commitments, openings): (Vec<_>, Vec<_>) =
		servers.iter().map(|server| server.generate_commitment(rng)).unzip();

	let mut state = initialize_challenge(context, commitments, openings).unwrap();
	for server in servers {
		server.check_update_challenge(context, &mut state).unwrap();
	}
	finalize_challenge(context, &state).unwrap()
}

/// Transport stand-in for the proof session: swallows the prover's
/// commitments and answers with the prepared challenge.
pub(crate) fn dummy_server_channels(
	challenge: Challenge<Point>,
) -> (mpsc::Sender<Vec<Point>>, mpsc::Receiver<Challenge<Point>>) {
	let (push_commitments, mut commitments_rx) = mpsc::channel(1);
	let (challenge_tx, pull_challenge) = mpsc::channel(1);

	tokio::spawn(async move {
		if commitments_rx.recv().await.is_some() {
			let _ = challenge_tx.send(challenge).await;
		}
	});

	(push_commitments, pull_challenge)
}

/// A complete, honest client request for the given context, together
/// with the finalized round challenge it answers (the first server of
/// a chain walk needs the latter).
pub(crate) async fn make_authentication_message(
	context: &AuthenticationContext<Point>,
	client: &Client<Point>,
	servers: &[Server<Point>],
	rng: &mut Rng,
) -> (AuthenticationMessage<Point>, Challenge<Point>) {
	let (tag_and_commitments, s) =
		new_initial_tag_and_commitments(context, client.index(), rng).unwrap();

	let challenge = build_round_challenge(context, servers, rng);
	let (push_commitments, mut pull_challenge) = dummy_server_channels(challenge.clone());

	let proof = new_client_proof(
		context,
		client,
		&tag_and_commitments,
		&s,
		&push_commitments,
		&mut pull_challenge,
		DEFAULT_PROOF_TIMEOUT,
		rng,
	)
	.await
	.unwrap();

	(AuthenticationMessage::new(context.clone(), tag_and_commitments, proof), challenge)
}
