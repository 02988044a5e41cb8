use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fxhash::FxHashMap;

use crate::context::{default_context, Context};
use crate::dependencies::{Dependencies, Subscribers};
use crate::derived::Derived;
use crate::equality::{partial_eq, EqualsFn};
use crate::{Computation, Subscribable};

/// A cache-only computed value.
///
/// Unlike [`Derived`], a `Memoized` never compares results: any
/// dependency change throws the cached value away immediately and
/// notifies subscribers, and the next read recomputes. That makes it a
/// hard puller in the subscriber graph; a dirty lazy value with a
/// `Memoized` downstream recomputes eagerly, the same as with an
/// [`Effect`](crate::Effect) attached.
pub struct Memoized<T: 'static> {
	body: Rc<MemoBody<T>>,
}

struct MemoBody<T: 'static> {
	func: Box<dyn Fn() -> T>,
	value: RefCell<Option<T>>,
	stale: Cell<bool>,
	dependencies: Dependencies,
	subscribers: Subscribers,
	context: Context,
	this: Weak<MemoBody<T>>,
}

impl<T: 'static> Memoized<T> {
	pub fn new(func: impl Fn() -> T + 'static) -> Self {
		Memoized::new_in(&default_context(), func)
	}

	pub fn new_in(context: &Context, func: impl Fn() -> T + 'static) -> Self {
		let body = Rc::new_cyclic(|this| MemoBody {
			func: Box::new(func),
			value: RefCell::new(None),
			stale: Cell::new(true),
			dependencies: Dependencies::new(),
			subscribers: Subscribers::new(),
			context: context.clone(),
			this: this.clone(),
		});
		Memoized { body }
	}

	/// Cached value, computing it on the first read or after an
	/// invalidation. Subscribes the running computation, if any.
	pub fn call(&self) -> T
	where
		T: Clone,
	{
		self.body.call()
	}

	/// Drop the cached value and notify subscribers that it is gone.
	/// Does nothing when already stale, so cascades cannot loop.
	pub fn invalidate(&self) {
		self.body.invalidate();
	}

	pub fn dispose(&self) {
		self.body.dispose();
	}

	pub fn context(&self) -> &Context {
		&self.body.context
	}
}

impl<T: 'static> MemoBody<T> {
	fn track(&self) {
		let this: Weak<dyn Subscribable> = self.this.clone();
		self.subscribers.track(&self.context, &this);
	}

	fn call(&self) -> T
	where
		T: Clone,
	{
		self.track();
		if self.stale.get() {
			self.recompute();
		}
		let value = self.value.borrow();
		value.clone().expect("memoized has no value after recompute")
	}

	fn recompute(&self) {
		let this = self.this.upgrade().expect("memoized body outlived its handle");
		let restore = self.dependencies.keep_on_failure(self.this.clone());
		let _scope = self.context.enter(this);
		let value = (self.func)();
		*self.value.borrow_mut() = Some(value);
		self.stale.set(false);
		restore.complete();
	}

	fn invalidate(&self) {
		if !self.stale.get() {
			self.value.borrow_mut().take();
			self.stale.set(true);
			self.subscribers.notify(&self.context);
		}
	}
}

impl<T: 'static> Subscribable for MemoBody<T> {
	fn subscribe(&self, computation: Weak<dyn Computation>) {
		self.subscribers.attach(computation);
	}

	fn unsubscribe(&self, computation: &Weak<dyn Computation>) {
		self.subscribers.detach(computation);
	}
}

impl<T: 'static> Computation for MemoBody<T> {
	fn trigger(self: Rc<Self>) {
		self.invalidate();
	}

	fn dispose(&self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}

	fn add_dependency(&self, source: Weak<dyn Subscribable>) {
		self.dependencies.add(source);
	}

	fn subscribers(&self) -> Vec<Weak<dyn Computation>> {
		self.subscribers.snapshot()
	}
}

impl<T: 'static> Drop for MemoBody<T> {
	fn drop(&mut self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}
}

impl<T: 'static> Clone for Memoized<T> {
	fn clone(&self) -> Self {
		Memoized {
			body: self.body.clone(),
		}
	}
}

/// Shorthand for [`Memoized::new`] on the default context.
pub fn memo<T: 'static>(func: impl Fn() -> T + 'static) -> Memoized<T> {
	Memoized::new(func)
}

/// One [`Memoized`] per owner object, created lazily on first access.
///
/// The map keys owners by allocation identity and holds them weakly, so
/// a family never keeps its owners alive; entries of dropped owners are
/// pruned as the map is used. Calling a memo whose owner has been
/// dropped is a usage error and panics.
pub struct MemoFamily<O: 'static, T: 'static> {
	func: Rc<dyn Fn(&O) -> T>,
	map: RefCell<FxHashMap<*const O, (Weak<O>, Memoized<T>)>>,
	context: Context,
}

impl<O: 'static, T: 'static> MemoFamily<O, T> {
	pub fn new(func: impl Fn(&O) -> T + 'static) -> Self {
		MemoFamily::new_in(&default_context(), func)
	}

	pub fn new_in(context: &Context, func: impl Fn(&O) -> T + 'static) -> Self {
		MemoFamily {
			func: Rc::new(func),
			map: RefCell::new(FxHashMap::default()),
			context: context.clone(),
		}
	}

	/// The owner's memo, created on first access. Repeated calls for
	/// the same owner return handles to the same computation.
	pub fn of(&self, owner: &Rc<O>) -> Memoized<T> {
		let key = Rc::as_ptr(owner);
		let mut map = self.map.borrow_mut();
		if let Some((live, memo)) = map.get(&key) {
			// a dead entry at this address is a reused allocation
			if live.strong_count() > 0 {
				return memo.clone();
			}
		}
		map.retain(|_, (live, _)| live.strong_count() > 0);
		let live = Rc::downgrade(owner);
		let weak = live.clone();
		let func = self.func.clone();
		let memo = Memoized::new_in(&self.context, move || {
			let owner = weak.upgrade().expect("memoized owner was dropped");
			func(&owner)
		});
		map.insert(key, (live, memo.clone()));
		memo
	}

	pub fn call(&self, owner: &Rc<O>) -> T
	where
		T: Clone,
	{
		self.of(owner).call()
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		let mut map = self.map.borrow_mut();
		map.retain(|_, (live, _)| live.strong_count() > 0);
		map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// One [`Derived`] per owner object; the lazy, equality-gated
/// counterpart of [`MemoFamily`] with the same ownership rules.
pub struct DerivedFamily<O: 'static, T: 'static> {
	func: Rc<dyn Fn(&O) -> T>,
	equals: EqualsFn<T>,
	map: RefCell<FxHashMap<*const O, (Weak<O>, Derived<T>)>>,
	context: Context,
}

impl<O: 'static, T: PartialEq + 'static> DerivedFamily<O, T> {
	pub fn new(func: impl Fn(&O) -> T + 'static) -> Self {
		DerivedFamily::new_in(&default_context(), func)
	}

	pub fn new_in(context: &Context, func: impl Fn(&O) -> T + 'static) -> Self {
		DerivedFamily::with_equals_in(context, func, partial_eq)
	}
}

impl<O: 'static, T: 'static> DerivedFamily<O, T> {
	pub fn with_equals_in(
		context: &Context,
		func: impl Fn(&O) -> T + 'static,
		equals: EqualsFn<T>,
	) -> Self {
		DerivedFamily {
			func: Rc::new(func),
			equals,
			map: RefCell::new(FxHashMap::default()),
			context: context.clone(),
		}
	}

	/// The owner's derived value, created on first access.
	pub fn of(&self, owner: &Rc<O>) -> Derived<T> {
		let key = Rc::as_ptr(owner);
		let mut map = self.map.borrow_mut();
		if let Some((live, derived)) = map.get(&key) {
			if live.strong_count() > 0 {
				return derived.clone();
			}
		}
		map.retain(|_, (live, _)| live.strong_count() > 0);
		let live = Rc::downgrade(owner);
		let weak = live.clone();
		let func = self.func.clone();
		let derived = Derived::with_equals_in(
			&self.context,
			move || {
				let owner = weak.upgrade().expect("derived owner was dropped");
				func(&owner)
			},
			self.equals,
		);
		map.insert(key, (live, derived.clone()));
		derived
	}

	pub fn call(&self, owner: &Rc<O>) -> T
	where
		T: Clone,
	{
		self.of(owner).call()
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		let mut map = self.map.borrow_mut();
		map.retain(|_, (live, _)| live.strong_count() > 0);
		map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
