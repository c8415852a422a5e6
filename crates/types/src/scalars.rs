//! Scalar aliases and shared integer math.

/// Token amounts in micro-tokens, the smallest accounting unit.
pub type MicroToken = u128;

/// Opaque user account address (hex-encoded in logs).
pub type UserAddress = [u8; 32];

/// Safe multiplication followed by division using checked intermediate math.
/// Returns None if the divisor is zero or the product overflows.
#[inline]
pub fn mul_div_u128(n: u128, mul: u128, div: u128) -> Option<u128> {
    if div == 0 {
        return None;
    }
    n.checked_mul(mul).map(|product| product / div)
}
