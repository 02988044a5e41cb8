use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;

use fxhash::FxHashMap;

use crate::batch::Batch;
use crate::context::{default_context, Context};
use crate::notifier::Notifier;
use crate::signal::Signal;

/// A map whose reads are tracked per key and whose key set is a
/// reactive channel of its own.
///
/// Every key, present or not, is backed by a `Signal<Option<V>>`;
/// reading an absent key subscribes to it, so the reader reacts when the
/// key later appears. Key-set operations ([`len`](ReactiveMap::len),
/// [`keys`](ReactiveMap::keys)) subscribe to a separate structure
/// channel that fires only when presence changes, not on value updates.
pub struct ReactiveMap<K, V: 'static> {
	signals: RefCell<FxHashMap<K, Signal<Option<V>>>>,
	structure: Notifier,
	context: Context,
}

impl<K, V> ReactiveMap<K, V>
where
	K: Eq + Hash + Clone + 'static,
	V: Clone + PartialEq + 'static,
{
	pub fn new() -> Self {
		ReactiveMap::new_in(&default_context())
	}

	pub fn new_in(context: &Context) -> Self {
		ReactiveMap {
			signals: RefCell::new(FxHashMap::default()),
			structure: Notifier::new_in(context),
			context: context.clone(),
		}
	}

	fn signal_for(&self, key: &K) -> Signal<Option<V>> {
		if let Some(signal) = self.signals.borrow().get(key) {
			return signal.clone();
		}
		let signal = Signal::new_in(&self.context, None);
		self.signals
			.borrow_mut()
			.insert(key.clone(), signal.clone());
		signal
	}

	/// Value under `key`, or `None`. Absent keys are readable and
	/// subscribe the reader like present ones.
	pub fn get(&self, key: &K) -> Option<V> {
		self.signal_for(key).get()
	}

	pub fn contains_key(&self, key: &K) -> bool {
		self.signal_for(key).with(Option::is_some)
	}

	/// Store a value, returning the previous one. Subscribers of the
	/// key see the change; the structure channel fires only when the
	/// key was absent before.
	pub fn insert(&self, key: K, value: V) -> Option<V> {
		let signal = self.signal_for(&key);
		let scope = Batch::defer_in(&self.context);
		let old = signal.peek();
		signal.set(Some(value));
		if old.is_none() {
			self.structure.notify();
		}
		scope.commit();
		old
	}

	/// Remove a key, returning its value. The key's signal survives, so
	/// existing subscribers keep reacting if the key comes back.
	pub fn remove(&self, key: &K) -> Option<V> {
		let signal = match self.signals.borrow().get(key) {
			Some(signal) => signal.clone(),
			None => return None,
		};
		let old = signal.peek();
		if old.is_none() {
			return None;
		}
		let scope = Batch::defer_in(&self.context);
		signal.set(None);
		self.structure.notify();
		scope.commit();
		old
	}

	/// Number of present keys. Subscribes to the structure channel only.
	pub fn len(&self) -> usize {
		self.structure.track();
		self.signals
			.borrow()
			.values()
			.filter(|signal| signal.peek().is_some())
			.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Present keys, in no particular order. Subscribes to the
	/// structure channel only, not to the individual values.
	pub fn keys(&self) -> Vec<K> {
		self.structure.track();
		self.signals
			.borrow()
			.iter()
			.filter(|(_, signal)| signal.peek().is_some())
			.map(|(key, _)| key.clone())
			.collect()
	}

	/// Present entries. Subscribes to the structure channel and to
	/// every present key's value.
	pub fn items(&self) -> Vec<(K, V)> {
		self.structure.track();
		let signals = self.signals.borrow();
		let mut items = Vec::with_capacity(signals.len());
		for (key, signal) in signals.iter() {
			if let Some(value) = signal.get() {
				items.push((key.clone(), value));
			}
		}
		items
	}
}

impl<K, V> Default for ReactiveMap<K, V>
where
	K: Eq + Hash + Clone + 'static,
	V: Clone + PartialEq + 'static,
{
	fn default() -> Self {
		ReactiveMap::new()
	}
}

impl<K, V> fmt::Debug for ReactiveMap<K, V>
where
	K: fmt::Debug,
	V: Clone + fmt::Debug + 'static,
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let signals = self.signals.borrow();
		let mut map = f.debug_map();
		for (key, signal) in signals.iter() {
			if let Some(value) = signal.peek() {
				map.entry(key, &value);
			}
		}
		map.finish()
	}
}

/// A set with per-element presence tracking and a reactive element set,
/// mirroring [`ReactiveMap`] without the values.
pub struct ReactiveSet<T> {
	signals: RefCell<FxHashMap<T, Signal<bool>>>,
	structure: Notifier,
	context: Context,
}

impl<T> ReactiveSet<T>
where
	T: Eq + Hash + Clone + 'static,
{
	pub fn new() -> Self {
		ReactiveSet::new_in(&default_context())
	}

	pub fn new_in(context: &Context) -> Self {
		ReactiveSet {
			signals: RefCell::new(FxHashMap::default()),
			structure: Notifier::new_in(context),
			context: context.clone(),
		}
	}

	fn signal_for(&self, value: &T) -> Signal<bool> {
		if let Some(signal) = self.signals.borrow().get(value) {
			return signal.clone();
		}
		let signal = Signal::new_in(&self.context, false);
		self.signals
			.borrow_mut()
			.insert(value.clone(), signal.clone());
		signal
	}

	/// Membership test that subscribes to this element's presence, so
	/// the reader reacts when it is inserted or removed later.
	pub fn contains(&self, value: &T) -> bool {
		self.signal_for(value).get()
	}

	/// Returns whether the value was newly inserted.
	pub fn insert(&self, value: T) -> bool {
		let signal = self.signal_for(&value);
		let scope = Batch::defer_in(&self.context);
		let added = signal.set(true);
		if added {
			self.structure.notify();
		}
		scope.commit();
		added
	}

	/// Returns whether the value was present.
	pub fn remove(&self, value: &T) -> bool {
		let signal = match self.signals.borrow().get(value) {
			Some(signal) => signal.clone(),
			None => return false,
		};
		if !signal.peek() {
			return false;
		}
		let scope = Batch::defer_in(&self.context);
		signal.set(false);
		self.structure.notify();
		scope.commit();
		true
	}

	/// Number of elements. Subscribes to the structure channel only.
	pub fn len(&self) -> usize {
		self.structure.track();
		self.signals
			.borrow()
			.values()
			.filter(|signal| signal.peek())
			.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Current elements, in no particular order. Subscribes to the
	/// structure channel only.
	pub fn items(&self) -> Vec<T> {
		self.structure.track();
		self.signals
			.borrow()
			.iter()
			.filter(|(_, signal)| signal.peek())
			.map(|(value, _)| value.clone())
			.collect()
	}
}

impl<T> Default for ReactiveSet<T>
where
	T: Eq + Hash + Clone + 'static,
{
	fn default() -> Self {
		ReactiveSet::new()
	}
}

impl<T> fmt::Debug for ReactiveSet<T>
where
	T: fmt::Debug,
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let signals = self.signals.borrow();
		let mut set = f.debug_set();
		for (value, signal) in signals.iter() {
			if signal.peek() {
				set.entry(value);
			}
		}
		set.finish()
	}
}
