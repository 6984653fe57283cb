#[macro_use]
mod helpers;
pub mod ristretto;
pub mod schnorr;

use generic_array::{typenum::Unsigned, ArrayLength, GenericArray};

use std::fmt::Debug;

use rand::SeedableRng;
use sha2::{Digest, Sha256};
use zeroize::{DefaultIsZeroes, ZeroizeOnDrop};

/// Size of a compressed point and of a scalar in bytes, used when
/// pre-sizing canonical byte views. Tests (indirectly) check that
/// these are correct.
pub const POINT_SIZE: usize = 32;
pub const SCALAR_SIZE: usize = 32;

// Ideally, we want to use a concrete implementation (like ChaCha20) instead of StdRng
// to prevent it from potentially changing from under us
pub type Rng = rand::rngs::StdRng;

/// Deterministic randomness derived from arbitrary seed bytes
/// (e.g. a transcript hash). The seed is compressed to 32 bytes
/// through SHA-256 before keying the stream.
pub fn seeded_rng(seed: &[u8]) -> Rng {
	let digest: [u8; 32] = Sha256::digest(seed).into();
	Rng::from_seed(digest)
}

/// A point on a prime-order group with a fixed generator. The group
/// must have a canonical fixed-length compressed encoding.
pub trait ECPoint:
	Clone
	+ Copy
	+ Debug
	+ Default
	+ DefaultIsZeroes
	+ 'static
	+ serde::Serialize
	+ for<'de> serde::Deserialize<'de>
	+ std::ops::Mul<Self::Scalar, Output = Self>
	+ for<'a> std::ops::Mul<&'a Self::Scalar, Output = Self>
	+ std::ops::Sub<Output = Self>
	+ std::ops::Add<Output = Self>
	+ std::iter::Sum
	+ PartialEq
	+ Ord
	+ Sync
	+ Send
{
	type Scalar: ECScalar;

	type CompressedPointLength: ArrayLength<u8> + Unsigned;

	/// The fixed group generator `g`.
	fn generator() -> Self;

	fn from_scalar(scalar: &Self::Scalar) -> Self;

	fn as_bytes(&self) -> GenericArray<u8, Self::CompressedPointLength>;

	fn point_at_infinity() -> Self;

	fn is_point_at_infinity(&self) -> bool {
		self == &Self::point_at_infinity()
	}
}

/// An element of the scalar field of the group. Implementations must
/// wipe their memory on drop and compare in constant time.
pub trait ECScalar:
	Clone
	+ Debug
	+ Sized
	+ Default
	+ serde::Serialize
	+ for<'de> serde::Deserialize<'de>
	+ for<'a> std::ops::Mul<&'a Self, Output = Self>
	+ for<'a> std::ops::Add<&'a Self, Output = Self>
	+ std::ops::Mul<Output = Self>
	+ std::ops::Add<Output = Self>
	+ std::ops::Sub<Output = Self>
	+ std::iter::Sum
	+ zeroize::Zeroize
	+ PartialEq
	+ Ord
	+ Sync
	+ Send
	+ ZeroizeOnDrop
	+ std::convert::From<u32>
{
	fn random(rng: &mut Rng) -> Self;

	fn from_bytes_mod_order(x: &[u8; 32]) -> Self;

	fn zero() -> Self;

	fn invert(&self) -> Option<Self>;

	fn to_bytes(&self) -> [u8; 32];
}

/// Reduce a SHA-256 digest of `data` to a scalar. All hash-to-scalar
/// derivations in the protocol go through this single reduction.
pub fn hash_to_scalar<P: ECPoint>(data: &[u8]) -> P::Scalar {
	let digest: [u8; 32] = Sha256::digest(data).into();
	P::Scalar::from_bytes_mod_order(&digest)
}
