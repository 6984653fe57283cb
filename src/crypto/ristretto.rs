//! The default suite: the Ristretto prime-order group over Curve25519.

use serde::{Deserialize, Serialize};

use super::{ECPoint, ECScalar};

type PK = curve25519_dalek::ristretto::RistrettoPoint;
type SK = curve25519_dalek::scalar::Scalar;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point(PK);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scalar(SK);

mod point_impls {

	use curve25519_dalek::traits::Identity;

	use super::*;

	impl Ord for Point {
		fn cmp(&self, other: &Self) -> std::cmp::Ordering {
			self.as_bytes().cmp(&other.as_bytes())
		}
	}

	impl PartialOrd for Point {
		fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
			Some(self.cmp(other))
		}
	}

	impl ECPoint for Point {
		type Scalar = Scalar;

		type CompressedPointLength = typenum::U32;

		fn generator() -> Self {
			Point(curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT)
		}

		fn from_scalar(scalar: &Self::Scalar) -> Self {
			Point(curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT * scalar.0)
		}

		fn as_bytes(&self) -> generic_array::GenericArray<u8, Self::CompressedPointLength> {
			self.0.compress().to_bytes().into()
		}

		fn point_at_infinity() -> Self {
			Point(PK::identity())
		}
	}

	derive_point_impls!(Point, Scalar);

	impl std::ops::Add for Point {
		type Output = Self;

		fn add(self, rhs: Self) -> Self::Output {
			Point(self.0 + rhs.0)
		}
	}

	impl std::ops::Sub for Point {
		type Output = Self;

		fn sub(self, rhs: Self) -> Self::Output {
			Point(self.0 - rhs.0)
		}
	}

	impl<B: std::borrow::Borrow<Scalar>> std::ops::Mul<B> for Point {
		type Output = Self;

		fn mul(self, rhs: B) -> Self::Output {
			Point(self.0 * rhs.borrow().0)
		}
	}
}

mod scalar_impls {

	use zeroize::Zeroize;

	use super::*;

	impl Ord for Scalar {
		fn cmp(&self, other: &Self) -> std::cmp::Ordering {
			self.0.as_bytes().cmp(other.0.as_bytes())
		}
	}

	impl PartialOrd for Scalar {
		fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
			Some(self.cmp(other))
		}
	}

	impl ECScalar for Scalar {
		fn random(rng: &mut crate::crypto::Rng) -> Self {
			use rand::RngCore;

			// Instead of calling SK::random() directly, we copy its
			// implementation so we can use our own (version of) Rng
			let mut scalar_bytes = [0u8; 64];
			rng.fill_bytes(&mut scalar_bytes);
			Scalar(SK::from_bytes_mod_order_wide(&scalar_bytes))
		}

		fn from_bytes_mod_order(x: &[u8; 32]) -> Self {
			Scalar(SK::from_bytes_mod_order(*x))
		}

		fn zero() -> Self {
			Scalar(SK::ZERO)
		}

		fn invert(&self) -> Option<Self> {
			if self.0 != SK::ZERO {
				Some(Scalar(self.0.invert()))
			} else {
				None
			}
		}

		fn to_bytes(&self) -> [u8; 32] {
			self.0.to_bytes()
		}
	}

	impl From<u32> for Scalar {
		fn from(x: u32) -> Self {
			Scalar(SK::from(x))
		}
	}

	derive_scalar_impls!(Scalar);

	impl Zeroize for Scalar {
		fn zeroize(&mut self) {
			self.0.zeroize();
		}
	}

	impl std::ops::Add for &Scalar {
		type Output = Scalar;

		fn add(self, rhs: Self) -> Self::Output {
			Scalar(self.0 + rhs.0)
		}
	}

	impl std::ops::Sub for &Scalar {
		type Output = Scalar;

		fn sub(self, rhs: Self) -> Self::Output {
			Scalar(self.0 - rhs.0)
		}
	}

	impl std::ops::Mul for &Scalar {
		type Output = Scalar;

		fn mul(self, rhs: Self) -> Self::Output {
			Scalar(self.0 * rhs.0)
		}
	}
}

#[test]
fn sanity_check_point_at_infinity() {
	// Sanity check: point at infinity should correspond
	// to "zero" on the elliptic curve
	assert_eq!(Point::point_at_infinity(), Point::from_scalar(&Scalar::zero()));
}
