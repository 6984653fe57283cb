use thiserror::Error;

/// Protocol errors surfaced at the crate boundary. Error payloads
/// describe the failed check and never contain secret material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	#[error("bad context: {0}")]
	BadContext(String),

	#[error("invalid challenge: {0}")]
	InvalidChallenge(String),

	#[error("invalid client proof: {0}")]
	InvalidClientProof(String),

	#[error("invalid server proof: {0}")]
	InvalidServerProof(String),

	#[error("server {0} has already processed this request")]
	DuplicateServerEntry(u32),

	#[error("protocol timeout: {0}")]
	ProtocolTimeout(String),

	#[error("malformed message: {0}")]
	MalformedMessage(String),

	/// A proof-session queue was dropped mid-run (the session was
	/// cancelled by the other side).
	#[error("proof session aborted: {0}")]
	SessionAborted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
