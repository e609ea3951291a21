/*
  Copyright© 2023 Raúl Wolters(1)

  This file is part of rustronomy-basins.

  rustronomy is free software: you can redistribute it and/or modify it under
  the terms of the European Union Public License version 1.2 or later, as
  published by the European Commission.

  rustronomy is distributed in the hope that it will be useful, but WITHOUT ANY
  WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
  A PARTICULAR PURPOSE. See the European Union Public License for more details.

  You should have received a copy of the EUPL in an/all official language(s) of
  the European Union along with rustronomy.  If not, see
  <https://ec.europa.eu/info/european-union-public-licence_en/>.

  (1) Resident of the Kingdom of the Netherlands; agreement between licensor and
  licensee subject to Dutch law as per article 15 of the EUPL.
*/

//! Numeric cost adapter: maps each supported element type onto the total
//! ordering, frontier strategy and widened threshold arithmetic that the
//! scheduler and simplifier require. One monomorphised instantiation per
//! element type replaces a runtime dtype dispatch table.

use std::cmp::Ordering;

use num_traits::Zero;

/// Bucket count above which an integer cost domain falls back to the heap
/// frontier. A topology spanning the full `u32` or `i64` range would
/// otherwise allocate one bucket per distinct value.
pub(crate) const MAX_BUCKETS: usize = 1 << 22;

mod private {
  pub trait Sealed {}
}

/// Cost element of a topology grid.
///
/// Implemented for the eight supported element types: `u8`, `u16`, `u32`,
/// `i16`, `i32`, `i64`, `f32` and `f64`. The trait is sealed: an element
/// type without a cost adapter cannot reach the engine.
pub trait CostValue:
  private::Sealed
  + Copy
  + PartialOrd
  + Zero
  + std::fmt::Debug
  + Send
  + Sync
  + 'static
{
  /// Element type tag used in log output
  const DTYPE: &'static str;

  /// Total order over all values of the type (IEEE 754 `totalOrder` for the
  /// float types).
  fn total_cmp(&self, other: &Self) -> Ordering;

  /// Bucket count for a bucket-queue frontier over values in
  /// `[lowest, highest]`, or `None` when the type (or this particular value
  /// range) requires a heap frontier instead.
  fn bucket_count(lowest: Self, highest: Self) -> Option<usize>;

  /// Bucket index of `self` in a frontier whose lowest value is `lowest`.
  /// Only called when [`CostValue::bucket_count`] returned `Some`.
  fn bucket_of(self, lowest: Self) -> usize;

  /// `true` iff a basin with floor value `floor` lies within merging depth
  /// of a saddle at `saddle`, i.e. `saddle - floor < h`. Integer types
  /// evaluate this in `i128` so the subtraction cannot overflow near the
  /// bounds of the element type.
  fn within_merge_depth(saddle: Self, floor: Self, h: Self) -> bool;

  /// `true` iff `self` is a usable merging threshold: non-negative, and
  /// finite for the float types.
  fn is_valid_threshold(self) -> bool;
}

macro_rules! impl_cost_unsigned {
  ($($t:ty => $tag:literal),+ $(,)?) => {$(
    impl private::Sealed for $t {}
    impl CostValue for $t {
      const DTYPE: &'static str = $tag;

      #[inline]
      fn total_cmp(&self, other: &Self) -> Ordering {
        Ord::cmp(self, other)
      }

      #[inline]
      fn bucket_count(lowest: Self, highest: Self) -> Option<usize> {
        let span = (highest as i128) - (lowest as i128);
        let count = usize::try_from(span).ok()?.checked_add(1)?;
        (count <= MAX_BUCKETS).then_some(count)
      }

      #[inline]
      fn bucket_of(self, lowest: Self) -> usize {
        ((self as i128) - (lowest as i128)) as usize
      }

      #[inline]
      fn within_merge_depth(saddle: Self, floor: Self, h: Self) -> bool {
        (saddle as i128) - (floor as i128) < h as i128
      }

      #[inline]
      fn is_valid_threshold(self) -> bool {
        true
      }
    }
  )+};
}

macro_rules! impl_cost_signed {
  ($($t:ty => $tag:literal),+ $(,)?) => {$(
    impl private::Sealed for $t {}
    impl CostValue for $t {
      const DTYPE: &'static str = $tag;

      #[inline]
      fn total_cmp(&self, other: &Self) -> Ordering {
        Ord::cmp(self, other)
      }

      #[inline]
      fn bucket_count(lowest: Self, highest: Self) -> Option<usize> {
        let span = (highest as i128) - (lowest as i128);
        let count = usize::try_from(span).ok()?.checked_add(1)?;
        (count <= MAX_BUCKETS).then_some(count)
      }

      #[inline]
      fn bucket_of(self, lowest: Self) -> usize {
        ((self as i128) - (lowest as i128)) as usize
      }

      #[inline]
      fn within_merge_depth(saddle: Self, floor: Self, h: Self) -> bool {
        (saddle as i128) - (floor as i128) < h as i128
      }

      #[inline]
      fn is_valid_threshold(self) -> bool {
        self >= 0
      }
    }
  )+};
}

macro_rules! impl_cost_float {
  ($($t:ty => $tag:literal),+ $(,)?) => {$(
    impl private::Sealed for $t {}
    impl CostValue for $t {
      const DTYPE: &'static str = $tag;

      #[inline]
      fn total_cmp(&self, other: &Self) -> Ordering {
        <$t>::total_cmp(self, other)
      }

      #[inline]
      fn bucket_count(_lowest: Self, _highest: Self) -> Option<usize> {
        None
      }

      #[inline]
      fn bucket_of(self, _lowest: Self) -> usize {
        unreachable!("float cost domains always use the heap frontier")
      }

      #[inline]
      fn within_merge_depth(saddle: Self, floor: Self, h: Self) -> bool {
        //native-precision comparison, same rounding as the element type
        saddle < floor + h
      }

      #[inline]
      fn is_valid_threshold(self) -> bool {
        self.is_finite() && self >= 0.0
      }
    }
  )+};
}

impl_cost_unsigned!(u8 => "u8", u16 => "u16", u32 => "u32");
impl_cost_signed!(i16 => "i16", i32 => "i32", i64 => "i64");
impl_cost_float!(f32 => "f32", f64 => "f64");

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bucket_counts() {
    assert_eq!(u8::bucket_count(0, 255), Some(256));
    assert_eq!(u8::bucket_count(10, 10), Some(1));
    assert_eq!(u16::bucket_count(0, u16::MAX), Some(65536));
    assert_eq!(i16::bucket_count(i16::MIN, i16::MAX), Some(65536));
    //float domains never bucket
    assert_eq!(f32::bucket_count(0.0, 1.0), None);
    assert_eq!(f64::bucket_count(-1.0, 1.0), None);
  }

  #[test]
  fn wide_integer_ranges_fall_back_to_the_heap() {
    assert_eq!(u32::bucket_count(0, u32::MAX), None);
    assert_eq!(i64::bucket_count(i64::MIN, i64::MAX), None);
    //a narrow i64 range still buckets
    assert_eq!(i64::bucket_count(-5, 5), Some(11));
  }

  #[test]
  fn bucket_offsets_respect_the_domain_floor() {
    assert_eq!(17u8.bucket_of(10), 7);
    assert_eq!((-3i16).bucket_of(-10), 7);
    assert_eq!(i64::MAX.bucket_of(i64::MAX), 0);
  }

  #[test]
  fn merge_depth_does_not_overflow_at_type_bounds() {
    //i16::MAX - i16::MIN overflows i16 but not the widened comparison
    assert!(!i16::within_merge_depth(i16::MAX, i16::MIN, 100));
    assert!(i16::within_merge_depth(i16::MIN + 1, i16::MIN, 2));
    assert!(!i64::within_merge_depth(i64::MAX, i64::MIN, i64::MAX));
  }

  #[test]
  fn merge_depth_is_strict() {
    //saddle exactly h above the floor does not merge
    assert!(!u8::within_merge_depth(12, 10, 2));
    assert!(u8::within_merge_depth(11, 10, 2));
    assert!(!f64::within_merge_depth(12.0, 10.0, 2.0));
    assert!(f64::within_merge_depth(11.9, 10.0, 2.0));
  }

  #[test]
  fn threshold_validity() {
    assert!(0u8.is_valid_threshold());
    assert!(0i32.is_valid_threshold());
    assert!(!(-1i32).is_valid_threshold());
    assert!(!(-1i64).is_valid_threshold());
    assert!(2.5f32.is_valid_threshold());
    assert!(0.0f64.is_valid_threshold());
    assert!(!(-0.5f64).is_valid_threshold());
    assert!(!f32::NAN.is_valid_threshold());
    assert!(!f64::INFINITY.is_valid_threshold());
  }

  #[test]
  fn float_total_order_handles_nan() {
    use std::cmp::Ordering::*;
    assert_eq!(CostValue::total_cmp(&1.0f32, &2.0f32), Less);
    assert_eq!(CostValue::total_cmp(&f32::NAN, &f32::INFINITY), Greater);
    assert_eq!(CostValue::total_cmp(&2.0f64, &2.0f64), Equal);
  }
}
