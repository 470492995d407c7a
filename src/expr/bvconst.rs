//! Fixed-width bit-vector constant algebra.
//!
//! Values up to 64 bits wide live in a plain machine word; wider values fall
//! back to an arbitrary-precision representation. Every operation wraps modulo
//! `2^width`, and the bits above `width` are kept zero at all times.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};

use crate::arch::Endianness;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Repr {
    Small(u64),
    Big(BigUint),
}

/// A fixed-width unsigned integer with wrapping semantics.
///
/// Width-changing and binary operations check their width contracts and panic
/// on misuse: a width mismatch is a programming error of the caller, not a
/// runtime condition.
#[derive(Debug, Clone, Eq)]
pub struct BvConst {
    width: u32,
    repr: Repr,
}

fn mask64(width: u32) -> u64 {
    debug_assert!(width >= 1 && width <= 64);
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn big_mask(width: u32) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

impl BvConst {
    /// Create a constant from a machine word, truncated to `width` bits.
    ///
    /// # Panics
    ///
    /// Panics if `width` is zero.
    pub fn new(value: u64, width: u32) -> Self {
        assert!(width > 0, "BvConst: width cannot be zero");

        let repr = if width <= 64 {
            Repr::Small(value & mask64(width))
        } else {
            Repr::Big(BigUint::from(value))
        };
        Self { width, repr }
    }

    /// Parse a decimal, `0x`-hex or `0b`-binary literal, truncated to `width`
    /// bits. A leading `-` negates the parsed magnitude modulo `2^width`.
    ///
    /// # Panics
    ///
    /// Panics if `width` is zero or the literal is malformed.
    pub fn from_str_literal(s: &str, width: u32) -> Self {
        assert!(width > 0, "BvConst: width cannot be zero");

        let (negate, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x") {
            (16, hex)
        } else if let Some(bin) = digits.strip_prefix("0b") {
            (2, bin)
        } else {
            (10, digits)
        };

        let magnitude = BigUint::parse_bytes(digits.as_bytes(), radix)
            .unwrap_or_else(|| panic!("BvConst: malformed literal `{s}`"));
        let value = Self::from_big(magnitude, width);
        if negate {
            value.neg()
        } else {
            value
        }
    }

    /// Build a constant of width `bytes.len() * 8` from raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is empty.
    pub fn from_bytes(bytes: &[u8], end: Endianness) -> Self {
        assert!(!bytes.is_empty(), "BvConst: empty byte slice");

        let width = bytes.len() as u32 * 8;
        let big = match end {
            Endianness::Big => BigUint::from_bytes_be(bytes),
            Endianness::Little => BigUint::from_bytes_le(bytes),
        };
        Self::from_big(big, width)
    }

    fn from_big(big: BigUint, width: u32) -> Self {
        if width <= 64 {
            let masked = big & big_mask(width);
            Self {
                width,
                repr: Repr::Small(masked.to_u64().unwrap_or(0)),
            }
        } else {
            Self {
                width,
                repr: Repr::Big(big & big_mask(width)),
            }
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    fn as_big(&self) -> BigUint {
        match &self.repr {
            Repr::Small(v) => BigUint::from(*v),
            Repr::Big(b) => b.clone(),
        }
    }

    /// Two's complement signed view.
    fn as_signed_big(&self) -> BigInt {
        let unsigned = BigInt::from_biguint(Sign::Plus, self.as_big());
        if self.sign_bit() {
            unsigned - (BigInt::one() << self.width)
        } else {
            unsigned
        }
    }

    fn check_same_width(&self, other: &Self, op: &str) {
        assert!(
            self.width == other.width,
            "BvConst: {op}: width mismatch ({} vs {})",
            self.width,
            other.width
        );
    }

    pub fn sign_bit(&self) -> bool {
        self.get_bit(self.width - 1) == 1
    }

    /// The value of bit `idx` (0 = least significant).
    ///
    /// # Panics
    ///
    /// Panics if `idx >= width`.
    pub fn get_bit(&self, idx: u32) -> u8 {
        assert!(idx < self.width, "BvConst: get_bit: invalid index {idx}");
        match &self.repr {
            Repr::Small(v) => ((v >> idx) & 1) as u8,
            Repr::Big(b) => u8::from(b.bit(idx as u64)),
        }
    }

    /// The byte at index `idx` (0 = least significant byte).
    ///
    /// # Panics
    ///
    /// Panics if the byte lies beyond the width.
    pub fn get_byte(&self, idx: u32) -> u8 {
        assert!(
            idx * 8 < self.width,
            "BvConst: get_byte: invalid index {idx}"
        );
        match &self.repr {
            Repr::Small(v) => (v >> (idx * 8)) as u8,
            Repr::Big(b) => {
                let bytes = b.to_bytes_le();
                bytes.get(idx as usize).copied().unwrap_or(0)
            }
        }
    }

    // ---- arithmetic ----

    pub fn add(&self, other: &Self) -> Self {
        self.check_same_width(other, "add");
        match (&self.repr, &other.repr) {
            (Repr::Small(a), Repr::Small(b)) => Self::new(a.wrapping_add(*b), self.width),
            _ => Self::from_big(self.as_big() + other.as_big(), self.width),
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.check_same_width(other, "sub");
        match (&self.repr, &other.repr) {
            (Repr::Small(a), Repr::Small(b)) => Self::new(a.wrapping_sub(*b), self.width),
            _ => {
                let modulus = BigUint::one() << self.width;
                Self::from_big(self.as_big() + modulus - other.as_big(), self.width)
            }
        }
    }

    pub fn mul(&self, other: &Self) -> Self {
        self.check_same_width(other, "mul");
        match (&self.repr, &other.repr) {
            (Repr::Small(a), Repr::Small(b)) => Self::new(a.wrapping_mul(*b), self.width),
            _ => Self::from_big(self.as_big() * other.as_big(), self.width),
        }
    }

    /// Unsigned division.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn udiv(&self, other: &Self) -> Self {
        self.check_same_width(other, "udiv");
        assert!(!other.is_zero(), "BvConst: udiv: division by zero");
        Self::from_big(self.as_big() / other.as_big(), self.width)
    }

    /// Signed (truncating) division.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn sdiv(&self, other: &Self) -> Self {
        self.check_same_width(other, "sdiv");
        assert!(!other.is_zero(), "BvConst: sdiv: division by zero");
        let q = self.as_signed_big() / other.as_signed_big();
        Self::from_signed_big(q, self.width)
    }

    /// Unsigned remainder.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn urem(&self, other: &Self) -> Self {
        self.check_same_width(other, "urem");
        assert!(!other.is_zero(), "BvConst: urem: division by zero");
        Self::from_big(self.as_big() % other.as_big(), self.width)
    }

    /// Signed remainder; the result takes the sign of the dividend.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn srem(&self, other: &Self) -> Self {
        self.check_same_width(other, "srem");
        assert!(!other.is_zero(), "BvConst: srem: division by zero");
        let r = self.as_signed_big() % other.as_signed_big();
        Self::from_signed_big(r, self.width)
    }

    fn from_signed_big(v: BigInt, width: u32) -> Self {
        let modulus = BigInt::one() << width;
        let wrapped = ((v % &modulus) + &modulus) % &modulus;
        Self::from_big(
            wrapped.to_biguint().expect("wrapped value is nonnegative"),
            width,
        )
    }

    pub fn neg(&self) -> Self {
        match &self.repr {
            Repr::Small(v) => Self::new(v.wrapping_neg(), self.width),
            Repr::Big(b) => {
                let modulus = BigUint::one() << self.width;
                Self::from_big(modulus - b, self.width)
            }
        }
    }

    // ---- bitwise ----

    pub fn and(&self, other: &Self) -> Self {
        self.check_same_width(other, "and");
        match (&self.repr, &other.repr) {
            (Repr::Small(a), Repr::Small(b)) => Self::new(a & b, self.width),
            _ => Self::from_big(self.as_big() & other.as_big(), self.width),
        }
    }

    pub fn or(&self, other: &Self) -> Self {
        self.check_same_width(other, "or");
        match (&self.repr, &other.repr) {
            (Repr::Small(a), Repr::Small(b)) => Self::new(a | b, self.width),
            _ => Self::from_big(self.as_big() | other.as_big(), self.width),
        }
    }

    pub fn xor(&self, other: &Self) -> Self {
        self.check_same_width(other, "xor");
        match (&self.repr, &other.repr) {
            (Repr::Small(a), Repr::Small(b)) => Self::new(a ^ b, self.width),
            _ => Self::from_big(self.as_big() ^ other.as_big(), self.width),
        }
    }

    pub fn not(&self) -> Self {
        match &self.repr {
            Repr::Small(v) => Self::new(!v, self.width),
            Repr::Big(b) => Self::from_big(b ^ big_mask(self.width), self.width),
        }
    }

    // ---- shifts ----

    /// Shift left; shifting by `width` or more yields zero.
    pub fn shl(&self, amount: u32) -> Self {
        if amount >= self.width {
            return Self::new(0, self.width);
        }
        match &self.repr {
            Repr::Small(v) => Self::new(v << amount, self.width),
            Repr::Big(b) => Self::from_big(b << amount, self.width),
        }
    }

    /// Logical shift right; shifting by `width` or more yields zero.
    pub fn lshr(&self, amount: u32) -> Self {
        if amount >= self.width {
            return Self::new(0, self.width);
        }
        match &self.repr {
            Repr::Small(v) => Self::new(v >> amount, self.width),
            Repr::Big(b) => Self::from_big(b >> amount, self.width),
        }
    }

    /// Arithmetic shift right; the sign bit fills the vacated positions.
    pub fn ashr(&self, amount: u32) -> Self {
        let sign = self.sign_bit();
        if amount >= self.width {
            return if sign {
                Self::from_big(big_mask(self.width), self.width)
            } else {
                Self::new(0, self.width)
            };
        }

        let shifted = self.lshr(amount);
        if !sign || amount == 0 {
            return shifted;
        }
        // fill the top `amount` bits with ones
        let fill = big_mask(amount) << (self.width - amount);
        Self::from_big(shifted.as_big() | fill, self.width)
    }

    // ---- width changes ----

    /// Zero extension to `width` bits.
    ///
    /// # Panics
    ///
    /// Panics if `width` is smaller than the current width.
    pub fn zext(&self, width: u32) -> Self {
        assert!(
            width >= self.width,
            "BvConst: zext: invalid width ({} > {width})",
            self.width
        );
        Self::from_big(self.as_big(), width)
    }

    /// Sign extension to `width` bits.
    ///
    /// # Panics
    ///
    /// Panics if `width` is smaller than the current width.
    pub fn sext(&self, width: u32) -> Self {
        assert!(
            width >= self.width,
            "BvConst: sext: invalid width ({} > {width})",
            self.width
        );
        if !self.sign_bit() || width == self.width {
            return Self::from_big(self.as_big(), width);
        }
        let fill = big_mask(width - self.width) << self.width;
        Self::from_big(self.as_big() | fill, width)
    }

    /// The bit slice `[high:low]`, of width `high - low + 1`.
    ///
    /// # Panics
    ///
    /// Panics if `high < low` or `high >= width`.
    pub fn extract(&self, high: u32, low: u32) -> Self {
        assert!(
            high >= low && high < self.width,
            "BvConst: extract: invalid range [{high}:{low}] on width {}",
            self.width
        );
        Self::from_big(self.as_big() >> low, high - low + 1)
    }

    /// Concatenation: `self` becomes the most significant part.
    pub fn concat(&self, other: &Self) -> Self {
        let width = self.width + other.width;
        Self::from_big((self.as_big() << other.width) | other.as_big(), width)
    }

    // ---- predicates ----

    pub fn is_zero(&self) -> bool {
        match &self.repr {
            Repr::Small(v) => *v == 0,
            Repr::Big(b) => b.is_zero(),
        }
    }

    pub fn has_all_bits(&self) -> bool {
        match &self.repr {
            Repr::Small(v) => *v == mask64(self.width),
            Repr::Big(b) => *b == big_mask(self.width),
        }
    }

    fn ucmp(&self, other: &Self) -> Ordering {
        self.check_same_width(other, "compare");
        match (&self.repr, &other.repr) {
            (Repr::Small(a), Repr::Small(b)) => a.cmp(b),
            _ => self.as_big().cmp(&other.as_big()),
        }
    }

    fn scmp(&self, other: &Self) -> Ordering {
        self.check_same_width(other, "compare");
        match (self.sign_bit(), other.sign_bit()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            // same sign: two's complement order agrees with unsigned order
            _ => self.ucmp(other),
        }
    }

    pub fn eq_value(&self, other: &Self) -> bool {
        self.ucmp(other) == Ordering::Equal
    }

    pub fn ult(&self, other: &Self) -> bool {
        self.ucmp(other) == Ordering::Less
    }

    pub fn ule(&self, other: &Self) -> bool {
        self.ucmp(other) != Ordering::Greater
    }

    pub fn ugt(&self, other: &Self) -> bool {
        self.ucmp(other) == Ordering::Greater
    }

    pub fn uge(&self, other: &Self) -> bool {
        self.ucmp(other) != Ordering::Less
    }

    pub fn slt(&self, other: &Self) -> bool {
        self.scmp(other) == Ordering::Less
    }

    pub fn sle(&self, other: &Self) -> bool {
        self.scmp(other) != Ordering::Greater
    }

    pub fn sgt(&self, other: &Self) -> bool {
        self.scmp(other) == Ordering::Greater
    }

    pub fn sge(&self, other: &Self) -> bool {
        self.scmp(other) != Ordering::Less
    }

    // ---- views ----

    /// Reinterpret as `u64`.
    ///
    /// # Panics
    ///
    /// Panics if the width exceeds 64 bits.
    pub fn as_u64(&self) -> u64 {
        match &self.repr {
            Repr::Small(v) => *v,
            Repr::Big(_) => {
                panic!("BvConst: as_u64: width {} does not fit a u64", self.width)
            }
        }
    }

    /// Sign-extending reinterpretation as `i64`.
    ///
    /// # Panics
    ///
    /// Panics if the width exceeds 64 bits.
    pub fn as_i64(&self) -> i64 {
        let v = self.as_u64();
        if self.width == 64 || !self.sign_bit() {
            v as i64
        } else {
            (v | !mask64(self.width)) as i64
        }
    }

    /// The raw bytes of the value; the width is rounded up to whole bytes.
    pub fn as_bytes(&self, end: Endianness) -> Vec<u8> {
        let n_bytes = ((self.width + 7) / 8) as usize;
        let mut le = match &self.repr {
            Repr::Small(v) => v.to_le_bytes().to_vec(),
            Repr::Big(b) => b.to_bytes_le(),
        };
        le.resize(n_bytes, 0);
        if end == Endianness::Big {
            le.reverse();
        }
        le
    }
}

impl PartialEq for BvConst {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.repr == other.repr
    }
}

impl Hash for BvConst {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.width.hash(state);
        match &self.repr {
            Repr::Small(v) => v.hash(state),
            Repr::Big(b) => b.to_bytes_le().hash(state),
        }
    }
}

impl fmt::Display for BvConst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Small(v) => write!(f, "{v}"),
            Repr::Big(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::LowerHex for BvConst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Small(v) => write!(f, "{v:#x}"),
            Repr::Big(b) => write!(f, "{b:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_wrap_at_width() {
        let c = BvConst::new(0x1ff, 8);
        assert_eq!(c.as_u64(), 0xff);

        let sum = c.add(&BvConst::new(1, 8));
        assert!(sum.is_zero());
    }

    #[test]
    fn signed_views_sign_extend() {
        let c = BvConst::new(1, 8).neg();
        assert_eq!(c.as_u64(), 255);
        assert_eq!(c.as_i64(), -1);
    }

    #[test]
    fn division_truncates_toward_zero() {
        let a = BvConst::new(7, 8).neg();
        let b = BvConst::new(2, 8);
        assert_eq!(a.sdiv(&b).as_i64(), -3);
        assert_eq!(a.srem(&b).as_i64(), -1);
    }

    #[test]
    fn big_width_shifts() {
        let c = BvConst::from_str_literal("0xff000000000000000000000000000000", 128);
        assert_eq!(
            format!("{:x}", c.lshr(1)),
            "0x7f800000000000000000000000000000"
        );
        assert_eq!(
            format!("{:x}", c.ashr(1)),
            "0xff800000000000000000000000000000"
        );
    }

    #[test]
    fn negative_decimal_literal() {
        let c = BvConst::from_str_literal("-1", 32);
        assert!(c.has_all_bits());
    }
}
