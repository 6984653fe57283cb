//! Leader/child hooks for walking an authentication request along
//! the server roster.
//!
//! One node runs per server process. The leader is handed the
//! client's request and starts the chain; every child resolves its
//! own server identity from the embedded context and appends its
//! entry. How messages travel between nodes (tree broadcast, direct
//! links) is the transport layer's concern; a node only decides
//! whether the chain must keep going or is complete.
//!
//! Misusing the state machine (initialising a node twice, collecting
//! the result from a child or before starting) is a programming
//! error and panics.

use tokio::sync::oneshot;
use tracing::debug;

use crate::{
	challenge::Challenge,
	context::AuthenticationContext,
	crypto::{ECPoint, Rng},
	error::{Error, Result},
	message::{NetAuthenticationMessage, NetServerMessage},
	server::{Server, ServerMessage},
};

/// How a child node recovers the server identity serving the round
/// described by a context.
pub type ServerResolver<P> =
	Box<dyn Fn(&AuthenticationContext<P>) -> Result<Server<P>> + Send + Sync>;

enum Role<P: ECPoint> {
	Idle,
	Leader {
		server: Server<P>,
		request: Option<NetAuthenticationMessage<P>>,
		round_challenge: Challenge<P>,
		result_tx: Option<oneshot::Sender<NetServerMessage<P>>>,
		result_rx: Option<oneshot::Receiver<NetServerMessage<P>>>,
		started: bool,
	},
	Child {
		resolver: ServerResolver<P>,
	},
}

/// What the transport should do with the message a node produced.
pub enum NodeOutput<P: ECPoint> {
	/// Pass the message on to the next server of the walk.
	Forward(NetServerMessage<P>),
	/// Every server has contributed; route the message back to the
	/// leader.
	Complete(NetServerMessage<P>),
}

pub struct AuthenticationNode<P: ECPoint> {
	role: Role<P>,
}

impl<P: ECPoint> Default for AuthenticationNode<P> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P: ECPoint> AuthenticationNode<P> {
	pub fn new() -> Self {
		AuthenticationNode { role: Role::Idle }
	}

	/// Initialise this node as the round's leader, holding the client
	/// request to be walked along the roster and the finalized round
	/// challenge (which the leader has from the challenge round it
	/// led) that the request must answer.
	pub fn leader_setup(
		&mut self,
		request: NetAuthenticationMessage<P>,
		round_challenge: Challenge<P>,
		server: Server<P>,
	) {
		assert!(
			matches!(self.role, Role::Idle),
			"protocol node is already initialised"
		);
		let (result_tx, result_rx) = oneshot::channel();
		self.role = Role::Leader {
			server,
			request: Some(request),
			round_challenge,
			result_tx: Some(result_tx),
			result_rx: Some(result_rx),
			started: false,
		};
	}

	/// Initialise this node as a child that serves whichever round
	/// context the incoming messages carry.
	pub fn child_setup(&mut self, resolver: ServerResolver<P>) {
		assert!(
			matches!(self.role, Role::Idle),
			"protocol node is already initialised"
		);
		self.role = Role::Child { resolver };
	}

	/// Leader only: run the first chain step over the held request.
	pub fn start(&mut self, rng: &mut Rng) -> Result<NodeOutput<P>> {
		let Role::Leader { server, request, round_challenge, started, .. } = &mut self.role
		else {
			panic!("start called on a non-leader node")
		};
		let request = request.take().expect("protocol already started");

		let auth_message = request.decode()?;
		let context = auth_message.context.clone();
		let mut msg = ServerMessage::new(auth_message);
		server.process_authentication(&context, &mut msg, Some(&*round_challenge), rng)?;
		*started = true;
		debug!("leader (server {}) started the authentication chain", server.index());

		Ok(Self::route(&context, msg))
	}

	/// Child only: append this node's chain entry to an in-flight
	/// authentication.
	pub fn process(&mut self, incoming: NetServerMessage<P>, rng: &mut Rng) -> Result<NodeOutput<P>> {
		let Role::Child { resolver } = &self.role else {
			panic!("process called on a non-child node")
		};

		let mut msg = incoming.decode()?;
		let context = msg.request.context.clone();
		let server = resolver(&context)?;
		server.process_authentication(&context, &mut msg, None, rng)?;

		Ok(Self::route(&context, msg))
	}

	fn route(context: &AuthenticationContext<P>, msg: ServerMessage<P>) -> NodeOutput<P> {
		let net = NetServerMessage::encode(&msg);
		if msg.indexes.len() == context.num_servers() {
			NodeOutput::Complete(net)
		} else {
			NodeOutput::Forward(net)
		}
	}

	/// Leader only: hand over the completed chain for
	/// [`AuthenticationNode::wait_for_result`].
	pub fn deliver_result(&mut self, msg: NetServerMessage<P>) {
		let Role::Leader { result_tx, .. } = &mut self.role else {
			panic!("deliver_result called on a non-leader node")
		};
		if let Some(tx) = result_tx.take() {
			// The receiver half may already have been dropped by a
			// cancelled caller, which is fine.
			let _ = tx.send(msg);
		}
	}

	/// Leader only, after [`AuthenticationNode::start`]: wait for the
	/// completed chain to come back.
	pub async fn wait_for_result(&mut self) -> Result<NetServerMessage<P>> {
		let Role::Leader { started, result_rx, .. } = &mut self.role else {
			panic!("wait_for_result called on a non-leader node")
		};
		assert!(*started, "wait_for_result called before the protocol was started");

		let result_rx = result_rx.take().expect("result already consumed");
		result_rx
			.await
			.map_err(|_| Error::SessionAborted("protocol node dropped the result".to_string()))
	}
}
