//! Wire representations of the protocol messages and persisted
//! identities.
//!
//! The in-memory structures are flattened for transport: the context
//! travels explicitly (a receiver may hold a different resolution of
//! it than the sender) and the leading `S[0] = g` of the shared
//! commitments is implied rather than sent. Everything here encodes
//! with bincode through serde.

use serde::{Deserialize, Serialize};

use crate::{
	challenge::ServerSignature,
	client::{proof::ClientProof, AuthenticationMessage, InitialTagAndCommitments},
	context::AuthenticationContext,
	crypto::ECPoint,
	error::{Error, Result},
	server::{proof::ServerProof, Server, ServerMessage},
};

/// The context resolutions a message can carry. There is one today;
/// the sum type keeps richer resolutions representable on the wire
/// without a format change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireContext<P: ECPoint> {
	#[serde(bound = "")]
	Minimum(AuthenticationContext<P>),
}

impl<P: ECPoint> WireContext<P> {
	pub fn resolve(self) -> AuthenticationContext<P> {
		match self {
			WireContext::Minimum(context) => context,
		}
	}

	pub fn as_context(&self) -> &AuthenticationContext<P> {
		match self {
			WireContext::Minimum(context) => context,
		}
	}
}

/// Wire form of [`AuthenticationMessage`]: `s_commits` carries
/// `S[1..]` only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAuthenticationMessage<P: ECPoint> {
	#[serde(bound = "")]
	pub context: WireContext<P>,
	#[serde(bound = "")]
	pub s_commits: Vec<P>,
	#[serde(bound = "")]
	pub t0: P,
	#[serde(bound = "")]
	pub proof: ClientProof<P>,
}

impl<P: ECPoint> NetAuthenticationMessage<P> {
	pub fn encode(msg: &AuthenticationMessage<P>) -> Self {
		NetAuthenticationMessage {
			context: WireContext::Minimum(msg.context.clone()),
			s_commits: msg.tag_and_commitments.s_commits[1..].to_vec(),
			t0: msg.tag_and_commitments.t0,
			proof: msg.proof.clone(),
		}
	}

	pub fn decode(self) -> Result<AuthenticationMessage<P>> {
		let context = self.context.resolve();
		context.validate()?;
		if self.s_commits.len() != context.num_servers() + 1 {
			return Err(Error::MalformedMessage(format!(
				"expected {} shared commitments on the wire, got {}",
				context.num_servers() + 1,
				self.s_commits.len()
			)))
		}

		let mut s_commits = Vec::with_capacity(self.s_commits.len() + 1);
		s_commits.push(P::generator());
		s_commits.extend(self.s_commits);

		Ok(AuthenticationMessage {
			context,
			tag_and_commitments: InitialTagAndCommitments { t0: self.t0, s_commits },
			proof: self.proof,
		})
	}
}

/// Wire form of [`ServerMessage`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetServerMessage<P: ECPoint> {
	#[serde(bound = "")]
	pub request: NetAuthenticationMessage<P>,
	#[serde(bound = "")]
	pub tags: Vec<P>,
	#[serde(bound = "")]
	pub proofs: Vec<ServerProof<P>>,
	pub indexes: Vec<u32>,
	#[serde(bound = "")]
	pub sigs: Vec<ServerSignature<P>>,
}

impl<P: ECPoint> NetServerMessage<P> {
	pub fn encode(msg: &ServerMessage<P>) -> Self {
		NetServerMessage {
			request: NetAuthenticationMessage::encode(&msg.request),
			tags: msg.tags.clone(),
			proofs: msg.proofs.clone(),
			indexes: msg.indexes.clone(),
			sigs: msg.sigs.clone(),
		}
	}

	pub fn decode(self) -> Result<ServerMessage<P>> {
		if self.tags.len() != self.proofs.len() ||
			self.tags.len() != self.indexes.len() ||
			self.tags.len() != self.sigs.len()
		{
			return Err(Error::MalformedMessage(
				"parallel vectors have different lengths".to_string(),
			))
		}
		Ok(ServerMessage {
			request: self.request.decode()?,
			tags: self.tags,
			proofs: self.proofs,
			indexes: self.indexes,
			sigs: self.sigs,
		})
	}
}

pub type ProtocolVersion = u16;

/// Currently active wire protocol version.
pub const CURRENT_PROTOCOL_VERSION: ProtocolVersion = 1;

/// A message as it travels between participants: the protocol version
/// it was encoded under and the opaque payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedMessage {
	pub version: ProtocolVersion,
	pub payload: Vec<u8>,
}

/// Frame a server message for transport.
pub fn serialize_for_version<P: ECPoint>(
	message: &NetServerMessage<P>,
	version: ProtocolVersion,
) -> VersionedMessage {
	let payload = match version {
		1 => bincode::serialize(message).expect("serialization can't fail"),
		_ => panic!("unsupported wire protocol version {version}"),
	};
	VersionedMessage { version, payload }
}

/// Restore a server message from a transport frame.
pub fn deserialize_for_version<P: ECPoint>(
	message: VersionedMessage,
) -> Result<NetServerMessage<P>> {
	match message.version {
		1 => bincode::deserialize(&message.payload).map_err(|e| {
			Error::MalformedMessage(format!(
				"failed to decode wire message (version {}): {e:?}",
				message.version
			))
		}),
		_ => Err(Error::MalformedMessage(format!(
			"unsupported wire protocol version {}",
			message.version
		))),
	}
}

/// A client identity as persisted to disk between sessions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredClient<P: ECPoint> {
	#[serde(bound = "")]
	pub private_key: P::Scalar,
	pub index: u32,
}

impl<P: ECPoint> StoredClient<P> {
	pub fn encode(client: &crate::client::Client<P>) -> Self {
		StoredClient {
			private_key: client.keypair().private().clone(),
			index: client.index(),
		}
	}

	pub fn decode(self, rng: &mut crate::crypto::Rng) -> crate::client::Client<P> {
		crate::client::Client::new(self.index, Some(self.private_key), rng)
	}
}

/// A server identity as persisted to disk, including the secret of
/// the round it is currently serving.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredServer<P: ECPoint> {
	#[serde(bound = "")]
	pub private_key: P::Scalar,
	pub index: u32,
	#[serde(bound = "")]
	pub per_round_secret: Option<P::Scalar>,
}

impl<P: ECPoint> StoredServer<P> {
	pub fn encode(server: &Server<P>) -> Self {
		StoredServer {
			private_key: server.keypair().private().clone(),
			index: server.index(),
			per_round_secret: server.round_secret_cloned(),
		}
	}

	pub fn decode(self, rng: &mut crate::crypto::Rng) -> Server<P> {
		let mut server = Server::new(self.index, Some(self.private_key), rng);
		if let Some(secret) = self.per_round_secret {
			server.restore_round_secret(secret);
		}
		server
	}
}
