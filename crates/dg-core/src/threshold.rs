//! Shamir secret sharing over the secp256k1 prime field for 32-byte secrets.
//!
//! Sized for threshold-wrapping the CEK; not a general secret-sharing
//! facility.

use std::sync::OnceLock;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;

use crate::error::{DgError, Result};

pub const SECRET_LEN: usize = 32;

/// secp256k1 field prime.
const PRIME_HEX: &[u8] = b"FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F";

fn prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| BigUint::parse_bytes(PRIME_HEX, 16).expect("secp256k1 prime literal"))
}

/// Fermat inverse: a^(p-2) mod p.
fn mod_inv(a: &BigUint, p: &BigUint) -> BigUint {
    a.modpow(&(p - 2u32), p)
}

/// Horner evaluation of a0 + a1 x + ... mod p.
fn eval_poly(coeffs: &[BigUint], x: &BigUint, p: &BigUint) -> BigUint {
    coeffs
        .iter()
        .rev()
        .fold(BigUint::zero(), |acc, c| (acc * x + c) % p)
}

fn random_element(p: &BigUint) -> BigUint {
    let mut buf = [0u8; SECRET_LEN];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    BigUint::from_bytes_be(&buf) % p
}

fn to_fixed_bytes(value: &BigUint) -> [u8; SECRET_LEN] {
    let raw = value.to_bytes_be();
    let mut out = [0u8; SECRET_LEN];
    out[SECRET_LEN - raw.len()..].copy_from_slice(&raw);
    out
}

/// Split `secret` into `n` shares with reconstruction threshold `k`.
/// Shares are points `(x, y)` with `x` in `1..=n`.
pub fn split_secret(
    secret: &[u8; SECRET_LEN],
    n: u8,
    k: u8,
) -> Result<Vec<(u8, [u8; SECRET_LEN])>> {
    if n == 0 || k < 2 || k > n {
        return Err(DgError::InvalidParameter(format!(
            "invalid threshold parameters (n={n}, k={k})"
        )));
    }
    let p = prime();
    let mut coeffs = Vec::with_capacity(k as usize);
    coeffs.push(BigUint::from_bytes_be(secret) % p);
    for _ in 1..k {
        coeffs.push(random_element(p));
    }
    Ok((1..=n)
        .map(|x| {
            let y = eval_poly(&coeffs, &BigUint::from(x), p);
            (x, to_fixed_bytes(&y))
        })
        .collect())
}

/// Lagrange interpolation at x = 0 over the first `k` shares.
pub fn combine_shares(shares: &[(u8, [u8; SECRET_LEN])], k: usize) -> Result<[u8; SECRET_LEN]> {
    if k < 2 || shares.len() < k {
        return Err(DgError::InvalidCiphertext(
            "insufficient shares to reconstruct secret".into(),
        ));
    }
    let p = prime();
    let points: Vec<(BigUint, BigUint)> = shares[..k]
        .iter()
        .map(|(x, y)| (BigUint::from(*x), BigUint::from_bytes_be(y) % p))
        .collect();

    let mut acc = BigUint::zero();
    for (j, (xj, yj)) in points.iter().enumerate() {
        let mut num = BigUint::one();
        let mut den = BigUint::one();
        for (m, (xm, _)) in points.iter().enumerate() {
            if m == j {
                continue;
            }
            num = num * ((p - xm) % p) % p;
            den = den * ((p + xj - xm) % p) % p;
        }
        let lj = num * mod_inv(&den, p) % p;
        acc = (acc + yj * lj) % p;
    }
    Ok(to_fixed_bytes(&acc))
}
