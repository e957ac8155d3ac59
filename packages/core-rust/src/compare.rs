//! Ordering of field values for query sorting.
//!
//! Two comparators are provided and selected per store via [`CompareMode`]:
//!
//! - [`compare`] is a total order. Values of different kinds order by
//!   [`ValueKind`] rank (null, bool, number, string); integers and floats
//!   are one numeric kind and compare exactly, without lossy casts.
//! - [`legacy_less`] reproduces the historical `less` predicate: nulls
//!   first, integers and floats compared numerically, other mixed kinds
//!   compared by string form, and equal nulls or equal booleans reporting
//!   "less". It is not a strict weak ordering, so it must only drive
//!   [`sort_by_less`], never `slice::sort_by`.

use std::cmp::Ordering;

use crate::types::{Value, ValueKind};

/// Comparator used when sorting query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    /// Total order via [`compare`]; ties keep their base order.
    #[default]
    Strict,
    /// Historical predicate via [`legacy_less`]; tie order is unspecified.
    Legacy,
}

/// Total order over two values.
#[must_use]
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => compare_floats(*x, *y),
        (Value::Int(x), Value::Float(y)) => compare_int_float(*x, *y),
        (Value::Float(x), Value::Int(y)) => compare_int_float(*y, *x).reverse(),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn rank(value: &Value) -> ValueKind {
    value.kind()
}

/// `-0.0` equals `0.0`; NaNs fall back to IEEE total ordering so every pair
/// of floats is comparable.
fn compare_floats(x: f64, y: f64) -> Ordering {
    x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y))
}

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer against a float.
fn compare_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        // Positive NaN sorts above every number, negative NaN below.
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }

    let whole_part = f.trunc();
    // In range [-2^63, 2^63) and integral, so the cast is exact.
    #[allow(clippy::cast_possible_truncation)]
    let whole = whole_part as i64;
    match i.cmp(&whole) {
        Ordering::Equal => {
            let fraction = f - whole_part;
            if fraction > 0.0 {
                Ordering::Less
            } else if fraction < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

/// Historical `less` predicate.
///
/// Precedence: a null `a` is always less (including null vs null); a null
/// `b` is never greater than `a`; integers and floats compare numerically;
/// other mixed kinds compare by string form; equal booleans report `true`.
#[must_use]
pub fn legacy_less(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) => true,
        (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => !(*x && !*y),
        (Value::Int(x), Value::Int(y)) => x < y,
        (Value::Float(x), Value::Float(y)) => x < y,
        (Value::Int(x), Value::Float(y)) => compare_int_float(*x, *y) == Ordering::Less,
        (Value::Float(x), Value::Int(y)) => compare_int_float(*y, *x) == Ordering::Greater,
        (Value::String(x), Value::String(y)) => x < y,
        _ => a.to_string() < b.to_string(),
    }
}

/// Deterministic merge sort driven only by a `less` predicate.
///
/// An element from the right run is emitted before the current left one only
/// when `less(right, left)` holds. Safe for predicates that are not strict
/// weak orderings: the result is always a permutation of the input.
pub fn sort_by_less<T, F>(items: Vec<T>, less: &mut F) -> Vec<T>
where
    F: FnMut(&T, &T) -> bool,
{
    if items.len() <= 1 {
        return items;
    }

    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = sort_by_less(left, less);
    let right = sort_by_less(right, less);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => less(r, l),
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged
}
