use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use reactivity::{
	batch, derived, effect, in_batch, memo, signal, Context, Derived, DerivedFamily, Effect,
	MemoFamily, Memoized, Notifier, ReactiveMap, ReactiveSet, Signal,
};

mod mock;

use mock::Probe;

#[test]
fn signal_basics() {
	let s = signal(1);
	assert_eq!(s.get(), 1);
	assert_eq!(s.peek(), 1);

	assert!(s.set(2));
	assert_eq!(s.get(), 2);
	assert!(!s.set(2));

	assert_eq!(s.replace(5), 2);
	assert_eq!(s.get(), 5);

	assert!(s.update(|value| value + 1));
	assert_eq!(s.get(), 6);
	assert!(!s.update(|value| *value));

	assert_eq!(s.with(|value| value * 10), 60);
}

#[test]
fn signal_notifies_effect() {
	let s = signal(0);

	let probe = mock::SharedProbe::new();

	probe.get().expect_observe().times(1).return_const(());

	let _e = Effect::new({
		let s = s.clone();
		let probe = probe.clone();
		move || {
			probe.get().observe(s.get());
		}
	});

	probe.get().checkpoint();

	probe.get().expect_observe().times(1).return_const(());

	s.set(1);

	probe.get().checkpoint();

	probe.get().expect_observe().times(0).return_const(());

	s.set(1);

	probe.get().checkpoint();
}

#[test]
fn effect_dispose_and_deferred() {
	let s = signal(0);
	let results = Rc::new(RefCell::new(Vec::new()));

	let e = Effect::new({
		let s = s.clone();
		let results = results.clone();
		move || results.borrow_mut().push(s.get())
	});

	s.set(1);
	assert_eq!(*results.borrow(), [0, 1]);

	drop(e);

	s.set(2);
	assert_eq!(*results.borrow(), [0, 1]);

	let deferred = Effect::deferred({
		let s = s.clone();
		let results = results.clone();
		move || results.borrow_mut().push(s.get())
	});

	s.set(3);
	assert_eq!(*results.borrow(), [0, 1]);

	deferred.call();
	assert_eq!(*results.borrow(), [0, 1, 3]);

	s.set(4);
	assert_eq!(*results.borrow(), [0, 1, 3, 4]);
}

#[test]
fn signal_without_equality_check() {
	let s = Signal::with_equals(0, reactivity::never_equal);
	let results = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let s = s.clone();
		let results = results.clone();
		move || results.borrow_mut().push(s.get())
	});

	s.set(0);
	assert_eq!(*results.borrow(), [0, 0]);
}

#[test]
fn float_equality_treats_nan_as_equal() {
	let s = Signal::with_equals(f64::NAN, reactivity::f64_eq);
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new({
		let s = s.clone();
		let runs = runs.clone();
		move || {
			s.get();
			runs.set(runs.get() + 1);
		}
	});

	assert_eq!(runs.get(), 1);

	s.set(f64::NAN);
	assert_eq!(runs.get(), 1);

	s.set(1.0);
	assert_eq!(runs.get(), 2);

	s.set(1.0);
	assert_eq!(runs.get(), 2);
}

#[test]
fn signal_map() {
	let s = signal(1);
	let doubled = s.map(|value| value * 2);

	assert_eq!(doubled.call(), 2);

	s.set(5);
	assert_eq!(doubled.call(), 10);
}

#[test]
fn untracked_read_is_not_a_dependency() {
	let s = signal(0);
	let results = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let s = s.clone();
		let results = results.clone();
		move || results.borrow_mut().push(s.peek())
	});

	s.set(1);
	assert_eq!(s.get(), 1);
	assert_eq!(*results.borrow(), [0]);
}

#[test]
fn dependencies_follow_the_latest_run() {
	let use_left = signal(true);
	let left = signal(1);
	let right = signal(10);
	let runs = Rc::new(Cell::new(0));
	let seen = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let use_left = use_left.clone();
		let left = left.clone();
		let right = right.clone();
		let runs = runs.clone();
		let seen = seen.clone();
		move || {
			runs.set(runs.get() + 1);
			let value = if use_left.get() { left.get() } else { right.get() };
			seen.borrow_mut().push(value);
		}
	});

	assert_eq!(*seen.borrow(), [1]);

	// Only the branch the last run actually read is a dependency.
	right.set(20);
	assert_eq!(runs.get(), 1);

	left.set(2);
	assert_eq!(*seen.borrow(), [1, 2]);

	use_left.set(false);
	assert_eq!(*seen.borrow(), [1, 2, 20]);

	// The switching run dropped the edge to `left`.
	left.set(3);
	assert_eq!(runs.get(), 3);
	assert_eq!(*seen.borrow(), [1, 2, 20]);

	right.set(30);
	assert_eq!(*seen.borrow(), [1, 2, 20, 30]);
}

#[test]
fn derived_is_lazy_and_cached() {
	let s = signal(0);
	let count = Rc::new(Cell::new(0));

	let d = Derived::new({
		let s = s.clone();
		let count = count.clone();
		move || {
			count.set(count.get() + 1);
			s.get() + 1
		}
	});

	assert_eq!(count.get(), 0);

	assert_eq!(d.call(), 1);
	assert_eq!(count.get(), 1);

	d.call();
	assert_eq!(count.get(), 1);

	s.set(1);
	assert_eq!(count.get(), 1);

	assert_eq!(d.call(), 2);
	assert_eq!(count.get(), 2);

	s.set(1);
	d.call();
	assert_eq!(count.get(), 2);
}

#[test]
fn first_computation_does_not_notify() {
	let s = signal(1);

	let d = Derived::new({
		let s = s.clone();
		move || s.get() + 1
	});

	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new({
		let d = d.clone();
		let runs = runs.clone();
		move || {
			runs.set(runs.get() + 1);
			d.call();
		}
	});

	// The first compute happened inside the effect's initial run and
	// must not schedule a second one.
	assert_eq!(runs.get(), 1);

	s.set(2);
	assert_eq!(runs.get(), 2);
}

#[test]
fn invalidated_dependency_recomputes_only_itself() {
	let s = signal(0);
	let trace = Rc::new(RefCell::new(Vec::new()));

	let f = Derived::new({
		let s = s.clone();
		let trace = trace.clone();
		move || {
			trace.borrow_mut().push("f");
			s.get() + 1
		}
	});

	let g = Derived::new({
		let f = f.clone();
		let trace = trace.clone();
		move || {
			trace.borrow_mut().push("g");
			f.call() + 1
		}
	});

	assert_eq!(g.call(), 2);
	assert_eq!(*trace.borrow(), ["g", "f"]);

	trace.borrow_mut().clear();

	f.invalidate();
	assert!(trace.borrow().is_empty());

	// The rerun of `f` lands on the same value, so `g` stays cached.
	assert_eq!(g.call(), 2);
	assert_eq!(*trace.borrow(), ["f"]);
}

#[test]
fn nested_derived_chain() {
	let s = signal(0);
	let trace = Rc::new(RefCell::new(Vec::new()));

	let f = Derived::new({
		let s = s.clone();
		let trace = trace.clone();
		move || {
			trace.borrow_mut().push("f");
			s.get()
		}
	});

	let g = Derived::new({
		let f = f.clone();
		let trace = trace.clone();
		move || {
			trace.borrow_mut().push("g");
			f.call() / 2
		}
	});

	let h = Derived::new({
		let g = g.clone();
		let trace = trace.clone();
		move || {
			trace.borrow_mut().push("h");
			g.call() / 2
		}
	});

	assert_eq!(h.call(), 0);
	assert_eq!(*trace.borrow(), ["h", "g", "f"]);
	trace.borrow_mut().clear();

	g.invalidate();
	assert!(trace.borrow().is_empty());
	assert_eq!(h.call(), 0);
	assert_eq!(*trace.borrow(), ["g"]);
	trace.borrow_mut().clear();

	s.set(1);
	assert!(trace.borrow().is_empty());
	assert_eq!(f.call(), 1);
	assert_eq!(*trace.borrow(), ["f"]);
	assert_eq!(g.call(), 0);
	assert_eq!(*trace.borrow(), ["f", "g"]);
	trace.borrow_mut().clear();

	s.set(2);
	assert!(trace.borrow().is_empty());
	assert_eq!(g.call(), 1);
	assert_eq!(*trace.borrow(), ["f", "g"]);
	assert_eq!(h.call(), 0);
	assert_eq!(*trace.borrow(), ["f", "g", "h"]);
	trace.borrow_mut().clear();

	let values = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let h = h.clone();
		let values = values.clone();
		move || values.borrow_mut().push(h.call())
	});

	assert!(trace.borrow().is_empty());
	assert_eq!(*values.borrow(), [0]);

	s.set(3);
	assert_eq!(*trace.borrow(), ["f", "g"]);
	assert_eq!(*values.borrow(), [0]);
	trace.borrow_mut().clear();

	s.set(4);
	assert_eq!(*trace.borrow(), ["f", "g", "h"]);
	assert_eq!(*values.borrow(), [0, 1]);
	trace.borrow_mut().clear();

	s.set(5);
	assert_eq!(*trace.borrow(), ["f", "g"]);
	assert_eq!(*values.borrow(), [0, 1]);
	trace.borrow_mut().clear();

	s.set(6);
	assert_eq!(*trace.borrow(), ["f", "g", "h"]);
	assert_eq!(*values.borrow(), [0, 1]);
}

#[test]
fn derived_dispose() {
	let s = signal(1);
	let count = Rc::new(Cell::new(0));

	let d = Derived::new({
		let s = s.clone();
		let count = count.clone();
		move || {
			count.set(count.get() + 1);
			s.get() + 1
		}
	});

	assert_eq!(d.call(), 2);
	assert_eq!(count.get(), 1);

	d.dispose();
	d.dispose();

	s.set(5);
	assert_eq!(d.call(), 2);
	assert_eq!(count.get(), 1);

	d.invalidate();
	assert_eq!(d.call(), 6);
	assert_eq!(count.get(), 2);

	// The recomputation re-registered the dependency.
	s.set(7);
	assert_eq!(d.call(), 8);
	assert_eq!(count.get(), 3);
}

#[test]
fn dropping_a_derived_releases_it() {
	let s = signal(1);
	let marker = Rc::new(());

	let d = Derived::new({
		let s = s.clone();
		let marker = marker.clone();
		move || {
			let _alive = &marker;
			s.get() + 1
		}
	});

	assert_eq!(d.call(), 2);
	assert_eq!(Rc::strong_count(&marker), 2);

	// The signal holds only a weak edge to its subscriber, so dropping
	// the handle frees the body and its closure.
	drop(d);
	assert_eq!(Rc::strong_count(&marker), 1);

	assert!(s.set(5));
}

#[test]
fn batch_coalesces_reruns() {
	let value = signal(0);
	let history = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let value = value.clone();
		let history = history.clone();
		move || history.borrow_mut().push(value.get())
	});

	assert_eq!(*history.borrow(), [0]);

	let increment = {
		let value = value.clone();
		move || {
			value.update(|v| v + 1);
		}
	};

	increment();
	assert_eq!(*history.borrow(), [0, 1]);

	increment();
	increment();
	assert_eq!(*history.borrow(), [0, 1, 2, 3]);

	batch({
		let history = history.clone();
		let increment = increment.clone();
		move || {
			increment();
			increment();
			assert_eq!(*history.borrow(), [0, 1, 2, 3]);
		}
	});

	assert_eq!(*history.borrow(), [0, 1, 2, 3, 5]);
}

#[test]
fn nested_batch_flushes_at_each_explicit_close() {
	let s = signal(0);
	let history = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let s = s.clone();
		let history = history.clone();
		move || history.borrow_mut().push(s.get())
	});

	assert_eq!(*history.borrow(), [0]);

	let increment = {
		let s = s.clone();
		move || {
			s.update(|v| v + 1);
		}
	};

	batch({
		let history = history.clone();
		let increment = increment.clone();
		move || {
			increment();
			assert_eq!(*history.borrow(), [0]);
			batch({
				let increment = increment.clone();
				move || {
					increment();
					increment();
				}
			});
			assert_eq!(*history.borrow(), [0, 3]);
			increment();
			increment();
			assert_eq!(*history.borrow(), [0, 3]);
		}
	});

	assert_eq!(*history.borrow(), [0, 3, 5]);
}

#[test]
fn batch_returns_value_and_reports_state() {
	assert!(!in_batch());

	let s = signal(0);

	let result = batch({
		let s = s.clone();
		move || {
			assert!(in_batch());
			s.set(3);
			s.get() + 1
		}
	});

	assert_eq!(result, 4);
	assert!(!in_batch());
}

#[test]
fn diamond_reruns_once() {
	let a = signal(1);

	let left = Derived::new({
		let a = a.clone();
		move || a.get() + 1
	});

	let right = Derived::new({
		let a = a.clone();
		move || a.get() * 2
	});

	let probe = mock::SharedProbe::new();

	probe.get().expect_observe().times(1).return_const(());

	let _e = Effect::new({
		let left = left.clone();
		let right = right.clone();
		let probe = probe.clone();
		move || {
			probe.get().observe(left.call() + right.call());
		}
	});

	probe.get().checkpoint();

	probe.get().expect_observe().with(mockall::predicate::eq(7)).times(1).return_const(());

	a.set(2);

	probe.get().checkpoint();
}

#[test]
fn memo_is_lazy_until_called() {
	let s = signal(0);
	let count = Rc::new(Cell::new(0));

	let doubled = Memoized::new({
		let s = s.clone();
		let count = count.clone();
		move || {
			count.set(count.get() + 1);
			s.get() * 2
		}
	});

	assert_eq!(count.get(), 0);

	assert_eq!(doubled.call(), 0);
	assert_eq!(count.get(), 1);

	s.set(1);
	assert_eq!(count.get(), 1);

	assert_eq!(doubled.call(), 2);
	assert_eq!(doubled.call(), 2);
	assert_eq!(count.get(), 2);
}

#[test]
fn nested_memo_invalidation() {
	let trace = Rc::new(RefCell::new(Vec::new()));

	let f = Memoized::new({
		let trace = trace.clone();
		move || trace.borrow_mut().push("f")
	});

	let g = Memoized::new({
		let f = f.clone();
		let trace = trace.clone();
		move || {
			f.call();
			trace.borrow_mut().push("g");
		}
	});

	let h = Memoized::new({
		let g = g.clone();
		let trace = trace.clone();
		move || {
			g.call();
			trace.borrow_mut().push("h");
		}
	});

	h.call();
	assert_eq!(*trace.borrow(), ["f", "g", "h"]);
	trace.borrow_mut().clear();

	g.invalidate();
	assert!(trace.borrow().is_empty());
	h.call();
	assert_eq!(*trace.borrow(), ["g", "h"]);
	trace.borrow_mut().clear();

	f.invalidate();
	g.call();
	assert_eq!(*trace.borrow(), ["f", "g"]);
	h.call();
	assert_eq!(*trace.borrow(), ["f", "g", "h"]);
}

#[test]
fn memo_pulls_derived_eagerly() {
	let s = signal(0);

	let f = Derived::new({
		let s = s.clone();
		move || s.get() + 1
	});

	let g = Memoized::new({
		let f = f.clone();
		move || f.call() + 1
	});

	assert_eq!(g.call(), 2);

	s.set(2);
	assert_eq!(g.call(), 4);
}

#[test]
fn effect_with_two_memos() {
	let s = signal(0);

	let f = Memoized::new({
		let s = s.clone();
		move || s.get() * 2
	});

	let g = Memoized::new({
		let s = s.clone();
		move || s.get() * 3
	});

	let results = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let f = f.clone();
		let g = g.clone();
		let results = results.clone();
		move || results.borrow_mut().push(f.call() + g.call())
	});

	assert_eq!(*results.borrow(), [0]);

	s.set(1);
	assert_eq!(f.call() + g.call(), 5);
	assert_eq!(*results.borrow(), [0, 5]);
}

struct Rect {
	x: Signal<i64>,
	y: Signal<i64>,
}

impl Rect {
	fn new(x: i64, y: i64) -> Rc<Rect> {
		Rc::new(Rect {
			x: signal(x),
			y: signal(y),
		})
	}
}

#[test]
fn memo_family_caches_per_owner() {
	let count = Rc::new(Cell::new(0));

	let sizes = MemoFamily::new({
		let count = count.clone();
		move |rect: &Rect| {
			count.set(count.get() + 1);
			rect.x.get() * rect.y.get()
		}
	});

	let first = Rect::new(0, 0);
	let second = Rect::new(0, 0);

	assert_eq!(sizes.call(&first), 0);
	assert_eq!(count.get(), 1);

	first.x.set(2);
	assert_eq!(count.get(), 1);
	assert_eq!(sizes.call(&first), 0);
	assert_eq!(count.get(), 2);

	first.y.set(3);
	assert_eq!(sizes.call(&first), 6);
	assert_eq!(sizes.call(&first), 6);
	assert_eq!(count.get(), 3);

	assert_eq!(sizes.call(&second), 0);
	assert_eq!(count.get(), 4);

	first.x.set(5);
	assert_eq!(sizes.call(&second), 0);
	assert_eq!(count.get(), 4);

	// Both handles share one cache per owner.
	sizes.of(&second).call();
	assert_eq!(count.get(), 4);

	assert_eq!(sizes.len(), 2);
	drop(first);
	assert_eq!(sizes.len(), 1);
}

#[test]
fn derived_family_recomputes_per_owner() {
	let count = Rc::new(Cell::new(0));

	let areas = DerivedFamily::new({
		let count = count.clone();
		move |rect: &Rect| {
			count.set(count.get() + 1);
			rect.x.get() * rect.y.get()
		}
	});

	let rect = Rect::new(1, 2);

	assert_eq!(areas.call(&rect), 2);
	assert_eq!(areas.call(&rect), 2);
	assert_eq!(count.get(), 1);

	rect.x.set(3);
	assert_eq!(areas.call(&rect), 6);
	assert_eq!(count.get(), 2);
}

#[test]
fn reactive_map_basics() {
	let map: Rc<ReactiveMap<&str, i64>> = Rc::new(ReactiveMap::new());

	assert_eq!(map.get(&"x"), None);
	assert_eq!(map.len(), 0);
	assert!(map.is_empty());
	assert!(map.items().is_empty());

	map.insert("x", 0);
	map.insert("y", 0);

	let history = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let map = map.clone();
		let history = history.clone();
		move || {
			let size = map.get(&"x").unwrap() * map.get(&"y").unwrap();
			history.borrow_mut().push(size);
		}
	});

	assert_eq!(*history.borrow(), [0]);

	map.insert("x", 2);
	map.insert("y", 3);
	assert_eq!(*history.borrow(), [0, 0, 6]);
}

#[test]
fn reactive_map_notifies_only_on_change() {
	let map: Rc<ReactiveMap<i64, i64>> = Rc::new(ReactiveMap::new());
	map.insert(1, 2);

	let history = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let map = map.clone();
		let history = history.clone();
		move || {
			let mut items = map.items();
			items.sort();
			history.borrow_mut().push(items);
		}
	});

	assert_eq!(*history.borrow(), [vec![(1, 2)]]);

	map.insert(1, 2);
	assert_eq!(*history.borrow(), [vec![(1, 2)]]);

	map.insert(1, 3);
	assert_eq!(*history.borrow(), [vec![(1, 2)], vec![(1, 3)]]);
}

#[test]
fn reactive_map_fine_grained_channels() {
	let map: Rc<ReactiveMap<i64, i64>> = Rc::new(ReactiveMap::new());
	map.insert(1, 2);
	map.insert(3, 4);

	let one = Rc::new(RefCell::new(Vec::new()));
	let keys = Rc::new(RefCell::new(Vec::new()));
	let items = Rc::new(RefCell::new(Vec::new()));

	let _value_reader = Effect::new({
		let map = map.clone();
		let one = one.clone();
		move || one.borrow_mut().push(map.get(&1).unwrap())
	});

	let _keys_reader = Effect::new({
		let map = map.clone();
		let keys = keys.clone();
		move || {
			let mut known = map.keys();
			known.sort();
			keys.borrow_mut().push(known);
		}
	});

	let _items_reader = Effect::new({
		let map = map.clone();
		let items = items.clone();
		move || {
			let mut all = map.items();
			all.sort();
			items.borrow_mut().push(all);
		}
	});

	map.insert(1, 20);

	assert_eq!(*one.borrow(), [2, 20]);
	// Updating an existing key leaves the key set untouched.
	assert_eq!(*keys.borrow(), [vec![1, 3]]);
	assert_eq!(
		*items.borrow(),
		[vec![(1, 2), (3, 4)], vec![(1, 20), (3, 4)]]
	);
}

#[test]
fn reactive_map_missing_key_then_insert() {
	let map: Rc<ReactiveMap<i64, i64>> = Rc::new(ReactiveMap::new());

	let history = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let map = map.clone();
		let history = history.clone();
		move || history.borrow_mut().push(map.get(&1))
	});

	assert_eq!(*history.borrow(), [None]);

	map.insert(1, 2);
	assert_eq!(*history.borrow(), [None, Some(2)]);
}

#[test]
fn reactive_map_remove() {
	let map: Rc<ReactiveMap<i64, i64>> = Rc::new(ReactiveMap::new());
	map.insert(1, 2);
	map.insert(3, 4);

	let keys = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let map = map.clone();
		let keys = keys.clone();
		move || {
			let mut known = map.keys();
			known.sort();
			keys.borrow_mut().push(known);
		}
	});

	assert_eq!(*keys.borrow(), [vec![1, 3]]);

	assert_eq!(map.remove(&1), Some(2));
	assert_eq!(*keys.borrow(), [vec![1, 3], vec![3]]);

	assert_eq!(map.remove(&1), None);
	assert_eq!(*keys.borrow(), [vec![1, 3], vec![3]]);

	assert_eq!(map.get(&1), None);
	assert_eq!(map.len(), 1);
}

#[test]
fn reactive_map_inside_batch() {
	let map: Rc<ReactiveMap<i64, i64>> = Rc::new(ReactiveMap::new());
	let history = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let map = map.clone();
		let history = history.clone();
		move || {
			let mut items = map.items();
			items.sort();
			history.borrow_mut().push(items);
		}
	});

	assert_eq!(*history.borrow(), [Vec::new()]);

	batch({
		let map = map.clone();
		let history = history.clone();
		move || {
			map.insert(1, 2);
			map.insert(3, 4);
			assert_eq!(*history.borrow(), [Vec::new()]);
		}
	});

	assert_eq!(*history.borrow(), [vec![], vec![(1, 2), (3, 4)]]);
}

#[test]
fn reactive_set_membership() {
	let set: Rc<ReactiveSet<i64>> = Rc::new(ReactiveSet::new());

	let membership = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new({
		let set = set.clone();
		let membership = membership.clone();
		move || membership.borrow_mut().push(set.contains(&5))
	});

	assert_eq!(*membership.borrow(), [false]);

	assert!(set.insert(5));
	assert_eq!(*membership.borrow(), [false, true]);

	assert!(!set.insert(5));
	assert_eq!(*membership.borrow(), [false, true]);

	let items = Rc::new(RefCell::new(Vec::new()));

	let _items_reader = Effect::new({
		let set = set.clone();
		let items = items.clone();
		move || {
			let mut all = set.items();
			all.sort();
			items.borrow_mut().push(all);
		}
	});

	assert_eq!(*items.borrow(), [vec![5]]);

	assert!(set.remove(&5));
	assert_eq!(*membership.borrow(), [false, true, false]);
	assert_eq!(*items.borrow(), [vec![5], vec![]]);

	assert!(!set.remove(&5));
	assert_eq!(set.len(), 0);
	assert!(set.is_empty());
}

#[test]
fn notifier_coalesces_in_batch() {
	let notifier = Notifier::new();
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new({
		let notifier = notifier.clone();
		let runs = runs.clone();
		move || {
			notifier.track();
			runs.set(runs.get() + 1);
		}
	});

	assert_eq!(runs.get(), 1);

	notifier.notify();
	assert_eq!(runs.get(), 2);

	batch({
		let notifier = notifier.clone();
		move || {
			notifier.notify();
			notifier.notify();
		}
	});

	assert_eq!(runs.get(), 3);
}

#[test]
fn contexts_are_isolated() {
	let first = Context::new();
	let second = Context::new();

	let x = Signal::new_in(&first, 1);
	let y = Signal::new_in(&second, 2);

	let sizes_in_first = Rc::new(RefCell::new(Vec::new()));
	let sizes_in_second = Rc::new(RefCell::new(Vec::new()));

	let _in_first = Effect::new_in(&first, {
		let x = x.clone();
		let y = y.clone();
		let sizes = sizes_in_first.clone();
		move || sizes.borrow_mut().push(x.get() * y.get())
	});

	let _in_second = Effect::new_in(&second, {
		let x = x.clone();
		let y = y.clone();
		let sizes = sizes_in_second.clone();
		move || sizes.borrow_mut().push(x.get() * y.get())
	});

	assert_eq!(*sizes_in_first.borrow(), [2]);
	assert_eq!(*sizes_in_second.borrow(), [2]);

	// Each effect only tracked the signal living in its own context.
	x.set(3);
	assert_eq!(*sizes_in_first.borrow(), [2, 6]);
	assert_eq!(*sizes_in_second.borrow(), [2]);

	y.set(4);
	assert_eq!(*sizes_in_first.borrow(), [2, 6]);
	assert_eq!(*sizes_in_second.borrow(), [2, 12]);
}

#[test]
fn panic_in_effect_propagates_and_unwinds_clean() {
	let s = signal(0);
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new({
		let s = s.clone();
		let runs = runs.clone();
		move || {
			runs.set(runs.get() + 1);
			if s.get() > 0 {
				panic!("positive");
			}
		}
	});

	assert_eq!(runs.get(), 1);

	let result = catch_unwind(AssertUnwindSafe(|| {
		s.set(1);
	}));
	assert!(result.is_err());
	assert_eq!(runs.get(), 2);
	assert!(!in_batch());

	// Unrelated graphs keep working after the unwind.
	let other = signal(10);
	let results = Rc::new(RefCell::new(Vec::new()));
	let _watcher = Effect::new({
		let other = other.clone();
		let results = results.clone();
		move || results.borrow_mut().push(other.get())
	});
	other.set(11);
	assert_eq!(*results.borrow(), [10, 11]);

	// The failed effect read its source before panicking, so it is
	// still wired up and fails again on the next change.
	let result = catch_unwind(AssertUnwindSafe(|| {
		s.set(2);
	}));
	assert!(result.is_err());
	assert_eq!(runs.get(), 3);
}

#[test]
fn panic_in_memo_leaves_it_stale() {
	let s = signal(0);

	let failing: Memoized<i64> = Memoized::new({
		let s = s.clone();
		move || panic!("bad {}", s.get())
	});

	s.set(2);

	let result = catch_unwind(AssertUnwindSafe(|| failing.call()));
	assert!(result.is_err());

	// The memo is already stale, so the write only marks it again and
	// returns quietly.
	assert!(s.set(0));

	let result = catch_unwind(AssertUnwindSafe(|| failing.call()));
	assert!(result.is_err());
}

#[test]
fn failed_rerun_keeps_former_sources() {
	let s = signal(0);
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new({
		let s = s.clone();
		let runs = runs.clone();
		move || {
			let n = runs.get();
			runs.set(n + 1);
			if n > 0 {
				panic!("rerun");
			}
			s.get();
		}
	});

	assert_eq!(runs.get(), 1);

	// The second run panics before reading anything. Its empty edge set
	// is rolled back to the previous one, so the third change still
	// reaches the effect.
	let result = catch_unwind(AssertUnwindSafe(|| {
		s.set(1);
	}));
	assert!(result.is_err());
	assert_eq!(runs.get(), 2);

	let result = catch_unwind(AssertUnwindSafe(|| {
		s.set(2);
	}));
	assert!(result.is_err());
	assert_eq!(runs.get(), 3);
}

#[test]
fn capture_macros() {
	let s = signal(2);

	let tenfold = derived!((s) s.get() * 10);
	assert_eq!(tenfold.call(), 20);

	let results = Rc::new(RefCell::new(Vec::new()));
	let _e = effect!((s, results) results.borrow_mut().push(s.get()));

	batch!((s) {
		s.set(3);
		s.set(4);
	});

	assert_eq!(*results.borrow(), [2, 4]);

	let plus_one = memo!((s) s.get() + 1);
	assert_eq!(plus_one.call(), 5);
}
