//! End-to-end protocol runs: challenge round, client proof, server
//! chain and final tag extraction together.

use rand::SeedableRng;

use crate::{
	client::{get_final_linkage_tag, proof::verify_client_proof},
	crypto::{
		ristretto::{Point, Scalar},
		ECPoint, ECScalar, Rng,
	},
	error::Error,
	server::{proof::verify_misbehaving_proof, ServerMessage},
	testing::{generate_test_context, make_authentication_message},
};

/// Walk a request through every server in roster order and extract
/// the final tag.
async fn run_round(n: usize, m: usize, client_index: u32, seed: u8) -> Point {
	let mut rng = Rng::from_seed([seed; 32]);
	let (clients, servers, context) = generate_test_context(n, m, &mut rng);

	let (request, challenge) =
		make_authentication_message(&context, &clients[client_index as usize], &servers, &mut rng)
			.await;

	let mut msg = ServerMessage::new(request.clone());
	for server in &servers {
		let round_challenge = if msg.indexes.is_empty() { Some(&challenge) } else { None };
		server.process_authentication(&context, &mut msg, round_challenge, &mut rng).unwrap();
	}
	assert_eq!(msg.indexes.len(), m);

	let tag = get_final_linkage_tag(&context, &msg).unwrap();
	assert!(!tag.is_point_at_infinity());

	// Replaying the same request within the round yields the same tag
	let mut replay = ServerMessage::new(request);
	for server in &servers {
		let round_challenge = if replay.indexes.is_empty() { Some(&challenge) } else { None };
		server.process_authentication(&context, &mut replay, round_challenge, &mut rng).unwrap();
	}
	assert_eq!(get_final_linkage_tag(&context, &replay).unwrap(), tag);

	tag
}

#[tokio::test]
async fn two_clients_two_servers() {
	run_round(2, 2, 0, 100).await;
}

#[tokio::test]
async fn five_clients_five_servers() {
	let mut rng = Rng::from_seed([101; 32]);
	let (clients, servers, context) = generate_test_context(5, 5, &mut rng);

	let (request, challenge) =
		make_authentication_message(&context, &clients[3], &servers, &mut rng).await;
	let mut msg = ServerMessage::new(request);

	for server in &servers {
		let round_challenge = if msg.indexes.is_empty() { Some(&challenge) } else { None };
		server.process_authentication(&context, &mut msg, round_challenge, &mut rng).unwrap();
	}

	assert_eq!(msg.indexes.len(), 5);
	let mut sorted = msg.indexes.clone();
	sorted.sort_unstable();
	assert_eq!(sorted, vec![0, 1, 2, 3, 4]);

	let tag = get_final_linkage_tag(&context, &msg).unwrap();
	assert!(!tag.is_point_at_infinity());
}

#[tokio::test]
async fn thirteen_clients_thirteen_servers() {
	run_round(13, 13, 7, 102).await;
}

#[tokio::test]
async fn server_ordering_does_not_change_the_tag() {
	let mut rng = Rng::from_seed([103; 32]);
	let (clients, servers, context) = generate_test_context(3, 3, &mut rng);

	let (request, challenge) =
		make_authentication_message(&context, &clients[0], &servers, &mut rng).await;

	let mut in_order = ServerMessage::new(request.clone());
	for index in [0usize, 1, 2] {
		let round_challenge = if in_order.indexes.is_empty() { Some(&challenge) } else { None };
		servers[index]
			.process_authentication(&context, &mut in_order, round_challenge, &mut rng)
			.unwrap();
	}

	let mut shuffled = ServerMessage::new(request);
	for index in [2usize, 0, 1] {
		let round_challenge = if shuffled.indexes.is_empty() { Some(&challenge) } else { None };
		servers[index]
			.process_authentication(&context, &mut shuffled, round_challenge, &mut rng)
			.unwrap();
	}
	assert_eq!(shuffled.indexes, vec![2, 0, 1]);

	assert_eq!(
		get_final_linkage_tag(&context, &in_order).unwrap(),
		get_final_linkage_tag(&context, &shuffled).unwrap(),
	);
}

#[tokio::test]
async fn tampered_commitment_yields_the_bottom_tag() {
	let mut rng = Rng::from_seed([104; 32]);
	let (clients, servers, context) = generate_test_context(2, 2, &mut rng);

	let (mut request, challenge) =
		make_authentication_message(&context, &clients[0], &servers, &mut rng).await;
	// The client malforms the chain step of the first server
	request.tag_and_commitments.s_commits[1] = Point::point_at_infinity();
	let s_commitment = request.tag_and_commitments.s_commitment();

	let mut msg = ServerMessage::new(request);
	for server in &servers {
		let round_challenge = if msg.indexes.is_empty() { Some(&challenge) } else { None };
		server.process_authentication(&context, &mut msg, round_challenge, &mut rng).unwrap();
	}

	// The first server detected the misbehavior and proved it
	assert!(msg.proofs[0].r2.is_none());
	assert!(verify_misbehaving_proof(&context, 0, &msg.proofs[0], s_commitment));

	// The extraction succeeds but produces the bottom tag
	let tag = get_final_linkage_tag(&context, &msg).unwrap();
	assert!(tag.is_point_at_infinity());
}

#[tokio::test]
async fn corrupted_sub_challenge_stops_the_chain() {
	let mut rng = Rng::from_seed([105; 32]);
	let (clients, servers, context) = generate_test_context(2, 2, &mut rng);

	let (mut request, challenge) =
		make_authentication_message(&context, &clients[0], &servers, &mut rng).await;
	request.proof.c[0] = request.proof.c[0].clone() + &Scalar::from(1);

	assert!(!verify_client_proof(
		&context,
		&request.tag_and_commitments,
		&request.proof
	));

	let mut msg = ServerMessage::new(request);
	assert!(matches!(
		servers[0].process_authentication(&context, &mut msg, Some(&challenge), &mut rng),
		Err(Error::InvalidClientProof(_))
	));
	assert!(msg.indexes.is_empty());
}

#[tokio::test]
async fn tags_are_unlinkable_across_rounds() {
	let mut rng = Rng::from_seed([106; 32]);

	// The same long-term client keys serve in two rounds with fresh
	// generators, server round keys and round secrets
	let (clients, servers, context) = generate_test_context(2, 2, &mut rng);
	let client_keys: Vec<_> = clients.iter().map(|client| client.public_key()).collect();

	let (request, challenge) =
		make_authentication_message(&context, &clients[0], &servers, &mut rng).await;
	let mut msg = ServerMessage::new(request);
	for server in &servers {
		let round_challenge = if msg.indexes.is_empty() { Some(&challenge) } else { None };
		server.process_authentication(&context, &mut msg, round_challenge, &mut rng).unwrap();
	}
	let first_round_tag = get_final_linkage_tag(&context, &msg).unwrap();

	// A new round: same long-term client identities, fresh per-round
	// generators, server keys and round secrets
	let mut next_servers: Vec<_> =
		(0..2).map(|i| crate::server::Server::new(i, None, &mut rng)).collect();
	let round_commitments: Vec<_> = next_servers
		.iter_mut()
		.map(|server| server.generate_new_round_secret(&mut rng))
		.collect();
	let generators: Vec<_> =
		(0..2).map(|_| Point::from_scalar(&Scalar::random(&mut rng))).collect();
	let next_context = crate::context::AuthenticationContext::new(
		client_keys,
		generators,
		next_servers.iter().map(|server| server.public_key()).collect(),
		round_commitments,
	)
	.unwrap();

	let (request, next_challenge) =
		make_authentication_message(&next_context, &clients[0], &next_servers, &mut rng).await;
	let mut msg = ServerMessage::new(request);
	for server in &next_servers {
		let round_challenge = if msg.indexes.is_empty() { Some(&next_challenge) } else { None };
		server
			.process_authentication(&next_context, &mut msg, round_challenge, &mut rng)
			.unwrap();
	}
	let second_round_tag = get_final_linkage_tag(&next_context, &msg).unwrap();

	assert_ne!(first_round_tag, second_round_tag);
}

#[tokio::test]
async fn incomplete_chain_is_rejected_at_extraction() {
	let mut rng = Rng::from_seed([107; 32]);
	let (clients, servers, context) = generate_test_context(2, 3, &mut rng);

	let (request, challenge) =
		make_authentication_message(&context, &clients[0], &servers, &mut rng).await;
	let mut msg = ServerMessage::new(request);
	servers[0].process_authentication(&context, &mut msg, Some(&challenge), &mut rng).unwrap();
	servers[1].process_authentication(&context, &mut msg, None, &mut rng).unwrap();

	assert!(matches!(
		get_final_linkage_tag(&context, &msg),
		Err(Error::MalformedMessage(_))
	));
}

#[tokio::test]
async fn tampered_chain_entry_is_rejected_at_extraction() {
	let mut rng = Rng::from_seed([108; 32]);
	let (clients, servers, context) = generate_test_context(2, 2, &mut rng);

	let (request, challenge) =
		make_authentication_message(&context, &clients[0], &servers, &mut rng).await;
	let mut msg = ServerMessage::new(request);
	for server in &servers {
		let round_challenge = if msg.indexes.is_empty() { Some(&challenge) } else { None };
		server.process_authentication(&context, &mut msg, round_challenge, &mut rng).unwrap();
	}

	// A flipped tag breaks the chain signature
	let mut bad = msg.clone();
	bad.tags[1] = bad.tags[1] + Point::generator();
	assert!(matches!(
		get_final_linkage_tag(&context, &bad),
		Err(Error::InvalidServerProof(_))
	));

	// A duplicated index is not a permutation of the roster
	let mut bad = msg.clone();
	bad.indexes[1] = 0;
	assert!(matches!(
		get_final_linkage_tag(&context, &bad),
		Err(Error::MalformedMessage(_))
	));
}
