//! The per-round authentication context.
//!
//! A context is produced by the external context-generation protocol
//! and consumed read-only by every participant of a round. It pins
//! down the group membership (client public keys), the per-round
//! client generators, and the serving roster (per-round server public
//! keys together with the commitments to their round secrets).

use serde::{Deserialize, Serialize};

use crate::{
	crypto::ECPoint,
	error::{Error, Result},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationContext<P: ECPoint> {
	/// Client public keys `x`, one per group member.
	#[serde(bound = "")]
	client_keys: Vec<P>,
	/// Per-round generators `h`, one per group member.
	#[serde(bound = "")]
	generators: Vec<P>,
	/// Per-round server public keys `y`.
	#[serde(bound = "")]
	server_keys: Vec<P>,
	/// Commitments `R = r * g` to the servers' round secrets.
	#[serde(bound = "")]
	server_round_commitments: Vec<P>,
}

impl<P: ECPoint> AuthenticationContext<P> {
	/// Validate and freeze a context. A single-member group is accepted
	/// here (the proof layer rejects it, since a one-clause OR proof is
	/// meaningless), but there must be at least one server and every
	/// point must be a valid non-identity group element.
	pub fn new(
		client_keys: Vec<P>,
		generators: Vec<P>,
		server_keys: Vec<P>,
		server_round_commitments: Vec<P>,
	) -> Result<Self> {
		if client_keys.is_empty() {
			return Err(Error::BadContext("no clients in group".to_string()))
		}
		if server_keys.is_empty() {
			return Err(Error::BadContext("no servers in roster".to_string()))
		}
		if generators.len() != client_keys.len() {
			return Err(Error::BadContext(format!(
				"expected {} per-round generators, got {}",
				client_keys.len(),
				generators.len()
			)))
		}
		if server_round_commitments.len() != server_keys.len() {
			return Err(Error::BadContext(format!(
				"expected {} round-secret commitments, got {}",
				server_keys.len(),
				server_round_commitments.len()
			)))
		}

		for point in client_keys
			.iter()
			.chain(&generators)
			.chain(&server_keys)
			.chain(&server_round_commitments)
		{
			if point.is_point_at_infinity() {
				return Err(Error::BadContext("identity element in context".to_string()))
			}
		}

		Ok(AuthenticationContext {
			client_keys,
			generators,
			server_keys,
			server_round_commitments,
		})
	}

	/// Number of clients in the group (`n`).
	pub fn num_clients(&self) -> usize {
		self.client_keys.len()
	}

	/// Number of serving servers (`m`).
	pub fn num_servers(&self) -> usize {
		self.server_keys.len()
	}

	pub fn client_keys(&self) -> &[P] {
		&self.client_keys
	}

	pub fn generators(&self) -> &[P] {
		&self.generators
	}

	pub fn server_keys(&self) -> &[P] {
		&self.server_keys
	}

	pub fn server_round_commitments(&self) -> &[P] {
		&self.server_round_commitments
	}

	pub fn client_key(&self, index: u32) -> Result<P> {
		self.client_keys
			.get(index as usize)
			.copied()
			.ok_or_else(|| Error::BadContext(format!("client index {index} out of range")))
	}

	pub fn generator(&self, index: u32) -> Result<P> {
		self.generators
			.get(index as usize)
			.copied()
			.ok_or_else(|| Error::BadContext(format!("client index {index} out of range")))
	}

	pub fn server_key(&self, index: u32) -> Result<P> {
		self.server_keys
			.get(index as usize)
			.copied()
			.ok_or_else(|| Error::BadContext(format!("server index {index} out of range")))
	}

	pub fn server_round_commitment(&self, index: u32) -> Result<P> {
		self.server_round_commitments
			.get(index as usize)
			.copied()
			.ok_or_else(|| Error::BadContext(format!("server index {index} out of range")))
	}

	/// Re-run the construction checks. Used for contexts that arrived
	/// over the wire, where deserialization bypasses the constructor.
	pub fn validate(&self) -> Result<()> {
		Self::new(
			self.client_keys.clone(),
			self.generators.clone(),
			self.server_keys.clone(),
			self.server_round_commitments.clone(),
		)
		.map(|_| ())
	}

	/// Canonical byte view used as hash/signature input: the client
	/// keys, then the server keys, then the per-round generators.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut bytes = Vec::with_capacity(
			32 * (self.client_keys.len() + self.server_keys.len() + self.generators.len()),
		);
		for point in self.client_keys.iter().chain(&self.server_keys).chain(&self.generators) {
			bytes.extend_from_slice(&point.as_bytes());
		}
		bytes
	}
}
