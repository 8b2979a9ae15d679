//! Chunking polynomials over GF(2).
//!
//! A `Pol` is a polynomial with coefficients in GF(2), packed into a u64
//! (bit i = coefficient of x^i). It parameterizes the rolling Rabin
//! fingerprint: the same polynomial over the same bytes always produces the
//! same boundaries, so a manifest records the polynomial that produced it.
//!
//! Random draws pick irreducible polynomials of degree 53, which keeps the
//! fingerprint below 2^53 and leaves headroom for the byte-wide shift in
//! the rolling update.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::Error;

/// Degree of randomly drawn chunking polynomials.
const RANDOM_POL_DEGREE: u32 = 53;

/// A polynomial over GF(2), bit i holding the coefficient of x^i.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pol(u64);

impl Pol {
    /// Wrap a raw coefficient word.
    pub const fn new(value: u64) -> Self {
        Pol(value)
    }

    /// The raw coefficient word.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Degree of the polynomial; -1 for the zero polynomial.
    pub fn degree(self) -> i64 {
        63 - i64::from(self.0.leading_zeros())
    }

    /// Draw a random irreducible polynomial of degree 53.
    ///
    /// Candidates get the degree bit and the constant term forced (an even
    /// polynomial is divisible by x) and are retried until irreducible.
    /// Irreducible polynomials of degree d have density ~1/d, so the loop
    /// terminates after ~53 candidates on average.
    pub fn random(rng: &mut impl Rng) -> Pol {
        loop {
            let bits = rng.gen::<u64>() & ((1 << RANDOM_POL_DEGREE) - 1);
            let candidate = Pol(bits | (1 << RANDOM_POL_DEGREE) | 1);
            if candidate.irreducible() {
                return candidate;
            }
        }
    }

    /// Polynomial addition: XOR in GF(2).
    fn add(self, other: Pol) -> Pol {
        Pol(self.0 ^ other.0)
    }

    /// Remainder of self divided by `m`, by long division in GF(2).
    pub(crate) fn modulo(self, m: Pol) -> Pol {
        debug_assert_ne!(m.0, 0, "polynomial division by zero");
        let mut num = self.0;
        let md = m.degree();
        let mut diff = Pol(num).degree() - md;
        while diff >= 0 && num != 0 {
            num ^= m.0 << diff;
            diff = Pol(num).degree() - md;
        }
        Pol(num)
    }

    /// (self * f) mod m, reducing after every single-bit shift so the
    /// intermediate never leaves 64 bits.
    fn mulmod(self, f: Pol, m: Pol) -> Pol {
        if self.0 == 0 || f.0 == 0 {
            return Pol(0);
        }
        let mut res = Pol(0);
        for i in 0..=f.degree() {
            if (f.0 >> i) & 1 == 1 {
                let mut a = self.modulo(m);
                for _ in 0..i {
                    a = Pol(a.0 << 1).modulo(m);
                }
                res = res.add(a).modulo(m);
            }
        }
        res
    }

    /// Greatest common divisor in GF(2).
    fn gcd(self, other: Pol) -> Pol {
        if other.0 == 0 {
            return self;
        }
        if self.0 == 0 {
            return other;
        }
        other.gcd(self.modulo(other))
    }

    /// x^(2^p) + x, reduced mod `g`: p repeated squarings of x.
    fn qp(p: u32, g: Pol) -> Pol {
        let mut res = Pol(2);
        for _ in 0..p {
            res = res.mulmod(res, g);
        }
        res.add(Pol(2)).modulo(g)
    }

    /// Irreducibility over GF(2).
    ///
    /// Every irreducible polynomial of degree i divides x^(2^i) + x, so a
    /// polynomial of degree d is irreducible iff its gcd with x^(2^i) + x
    /// is trivial for all i up to d/2.
    pub fn irreducible(self) -> bool {
        for i in 1..=(self.degree() / 2) as u32 {
            if self.gcd(Self::qp(i, self)).0 != 1 {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Pol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl FromStr for Pol {
    type Err = Error;

    /// Parse the manifest rendering: hex with an optional `0x` marker.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(digits, 16)
            .map(Pol)
            .map_err(|_| Error::BadPolynomial(s.to_string()))
    }
}
