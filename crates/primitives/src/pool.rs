//! Pool of numeric literals referenced by opcode programs and expression
//! trees through stable 1-based indices.
//!
//! The first [`nlconst::SIZE`] slots always hold the well-known values of
//! [`nlconst`]; [`Pool::get_index`] returns the reserved index for those
//! instead of growing the pool.

use crate::MathError;
use core::cell::RefCell;
use std::rc::Rc;

/// Reserved 1-based pool indices for well-known constants.
///
/// The positions are fixed by the upstream front end and must never move:
/// opcode programs reference them by number.
pub mod nlconst {
    /// `1.0`
    pub const ONE: u32 = 1;
    /// `10.0`
    pub const TEN: u32 = 2;
    /// `0.1`
    pub const TENTH: u32 = 3;
    /// `0.25`
    pub const QUARTER: u32 = 4;
    /// `0.5`
    pub const HALF: u32 = 5;
    /// `2.0`
    pub const TWO: u32 = 6;
    /// `4.0`
    pub const FOUR: u32 = 7;
    /// `0.0`
    pub const ZERO: u32 = 8;
    /// `1/sqrt(2*pi)`
    pub const OOSQRT2PI: u32 = 9;
    /// `1/ln(10)`
    pub const OOLN10: u32 = 10;
    /// `1/ln(2)`
    pub const OOLN2: u32 = 11;
    /// `pi`
    pub const PI: u32 = 12;
    /// `pi/2`
    pub const PIHALF: u32 = 13;
    /// `sqrt(2)`
    pub const SQRT2: u32 = 14;
    /// `3.0`
    pub const THREE: u32 = 15;
    /// `5.0`
    pub const FIVE: u32 = 16;
    /// Number of reserved slots.
    pub const SIZE: u32 = FIVE;
}

/// Shared handle to a pool.
///
/// Pools are reference counted; the core is single threaded so a plain [`Rc`]
/// carries the count.
pub type PoolRef = Rc<RefCell<Pool>>;

/// Append-only array of doubles addressed by 1-based indices.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pool {
    data: Vec<f64>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// Creates a pool seeded with the reserved well-known constants.
    pub fn new() -> Self {
        let data = vec![
            1.,
            10.,
            0.1,
            0.25,
            0.5,
            2.,
            4.,
            0.,
            1. / (2. * core::f64::consts::PI).sqrt(),
            1. / 10f64.ln(),
            1. / 2f64.ln(),
            core::f64::consts::PI,
            core::f64::consts::FRAC_PI_2,
            core::f64::consts::SQRT_2,
            3.,
            5.,
        ];
        debug_assert_eq!(data.len(), nlconst::SIZE as usize);
        Self { data }
    }

    /// Creates an owned pool from a borrowed value array, copying the data.
    ///
    /// This is the copy-and-own operation: the caller keeps no tie to the
    /// source storage and the new pool grows independently.
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            data: values.to_vec(),
        }
    }

    /// Wraps the pool into the shared, reference-counted handle.
    pub fn into_shared(self) -> PoolRef {
        Rc::new(RefCell::new(self))
    }

    /// Number of values stored, reserved slots included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the pool holds no values at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw value slice, for bindings that index the pool directly.
    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// Looks up the value at a 1-based index.
    pub fn get(&self, idx: u32) -> Option<f64> {
        if idx == 0 {
            return None;
        }
        self.data.get(idx as usize - 1).copied()
    }

    /// Looks up the value at a 1-based index, reporting a range error for an
    /// index the pool does not cover.
    pub fn value(&self, idx: u32) -> Result<f64, MathError> {
        self.get(idx).ok_or(MathError::Range)
    }

    /// Returns a 1-based index `i` such that `pool[i-1] == val`.
    ///
    /// Well-known values map onto their reserved slot; anything else is
    /// appended at the first free slot. Non-reserved literals are not
    /// deduplicated.
    pub fn get_index(&mut self, val: f64) -> u32 {
        if let Some(idx) = well_known_index(val) {
            return idx;
        }

        self.data.push(val);
        self.data.len() as u32
    }
}

/// Matches `val` against the reserved constants, within a small multiple of
/// machine epsilon scaled by the constant's magnitude.
fn well_known_index(val: f64) -> Option<u32> {
    const WELL_KNOWN: [(f64, u32); 9] = [
        (0., nlconst::ZERO),
        (0.25, nlconst::QUARTER),
        (0.5, nlconst::HALF),
        (1., nlconst::ONE),
        (2., nlconst::TWO),
        (3., nlconst::THREE),
        (4., nlconst::FOUR),
        (5., nlconst::FIVE),
        (10., nlconst::TEN),
    ];

    for (w, idx) in WELL_KNOWN {
        if (val - w).abs() < f64::EPSILON * w.max(1.) {
            return Some(idx);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_slots() {
        let pool = Pool::new();
        assert_eq!(pool.get(nlconst::ONE), Some(1.));
        assert_eq!(pool.get(nlconst::ZERO), Some(0.));
        assert_eq!(pool.get(nlconst::TWO), Some(2.));
        assert_eq!(pool.get(nlconst::TENTH), Some(0.1));
        assert_eq!(pool.get(nlconst::PI), Some(core::f64::consts::PI));
        assert_eq!(pool.get(nlconst::FIVE), Some(5.));
        assert_eq!(pool.len(), nlconst::SIZE as usize);
    }

    #[test]
    fn get_index_well_known() {
        let mut pool = Pool::new();
        assert_eq!(pool.get_index(1.), nlconst::ONE);
        assert_eq!(pool.get_index(0.), nlconst::ZERO);
        assert_eq!(pool.get_index(10.), nlconst::TEN);
        assert_eq!(pool.get_index(0.5), nlconst::HALF);
        // No growth for reserved values.
        assert_eq!(pool.len(), nlconst::SIZE as usize);
    }

    #[test]
    fn get_index_appends_new_literal() {
        let mut pool = Pool::new();
        let idx = pool.get_index(42.5);
        assert_eq!(idx, nlconst::SIZE + 1);
        assert_eq!(pool.get(idx), Some(42.5));

        let idx2 = pool.get_index(-3.25);
        assert_eq!(idx2, idx + 1);
        assert_eq!(pool.get(idx2), Some(-3.25));
    }

    #[test]
    fn get_index_near_equality() {
        let mut pool = Pool::new();
        // One ulp away from 2.0 still resolves to the reserved slot.
        let almost_two = 2.0_f64 + f64::EPSILON;
        assert_eq!(pool.get_index(almost_two), nlconst::TWO);
    }

    #[test]
    fn from_values_copies() {
        let src = Pool::new();
        let copy = Pool::from_values(src.values());
        assert_eq!(copy.values(), src.values());

        let mut copy = copy;
        copy.get_index(7.125);
        // Source unchanged after the copy grows.
        assert_eq!(src.len(), nlconst::SIZE as usize);
    }

    #[test]
    fn zero_index_is_invalid() {
        let pool = Pool::new();
        assert_eq!(pool.get(0), None);
        assert!(pool.value(0).is_err());
    }

    #[test]
    #[cfg(feature = "serde")]
    fn serde_roundtrip() {
        let pool = Pool::new();
        let json = serde_json::to_string(&pool).unwrap();
        let back: Pool = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pool);
    }
}
