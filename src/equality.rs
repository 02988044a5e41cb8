/// Comparison used to decide whether a new value should notify
/// subscribers. Plain function pointer so signals stay `Copy`-free and
/// cheap to construct.
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Default policy: structural equality.
pub fn partial_eq<T: PartialEq>(a: &T, b: &T) -> bool {
	a == b
}

/// Treat every write as a change. The rendition of "equality checking
/// disabled": a set always notifies, a recompute always cascades.
pub fn never_equal<T>(_: &T, _: &T) -> bool {
	false
}

/// Float equality that treats NaN as equal to NaN. Without this a signal
/// stuck on NaN would notify on every write forever.
pub fn f64_eq(a: &f64, b: &f64) -> bool {
	if a.is_nan() {
		return b.is_nan();
	}
	a == b
}

pub fn f32_eq(a: &f32, b: &f32) -> bool {
	if a.is_nan() {
		return b.is_nan();
	}
	a == b
}
