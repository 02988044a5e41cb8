use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::{default_context, Context};
use crate::dependencies::{pulled, Dependencies, Subscribers};
use crate::equality::{partial_eq, EqualsFn};
use crate::{Computation, Subscribable};

/// A lazily recomputed value derived from other reactive values.
///
/// A `Derived` caches the result of its function and tracks what the
/// function read. When a dependency changes it only marks itself dirty;
/// the function reruns on the next read, or immediately if some eager
/// consumer is reachable through the subscriber graph. A recomputation
/// that produces an equal value does not propagate further, so change
/// cascades are cut off as early as possible.
pub struct Derived<T: 'static> {
	body: Rc<DerivedBody<T>>,
}

pub(crate) struct DerivedBody<T: 'static> {
	func: Box<dyn Fn() -> T>,
	value: RefCell<Option<T>>,
	dirty: Cell<bool>,
	equals: EqualsFn<T>,
	dependencies: Dependencies,
	subscribers: Subscribers,
	context: Context,
	this: Weak<DerivedBody<T>>,
}

impl<T: PartialEq + 'static> Derived<T> {
	pub fn new(func: impl Fn() -> T + 'static) -> Self {
		Derived::with_equals(func, partial_eq)
	}

	pub fn new_in(context: &Context, func: impl Fn() -> T + 'static) -> Self {
		Derived::with_equals_in(context, func, partial_eq)
	}
}

impl<T: 'static> Derived<T> {
	/// A derived value with a custom change predicate; see
	/// [`Signal::with_equals`](crate::Signal::with_equals).
	pub fn with_equals(func: impl Fn() -> T + 'static, equals: EqualsFn<T>) -> Self {
		Derived::with_equals_in(&default_context(), func, equals)
	}

	pub fn with_equals_in(
		context: &Context,
		func: impl Fn() -> T + 'static,
		equals: EqualsFn<T>,
	) -> Self {
		let body = Rc::new_cyclic(|this| DerivedBody {
			func: Box::new(func),
			value: RefCell::new(None),
			dirty: Cell::new(true),
			equals,
			dependencies: Dependencies::new(),
			subscribers: Subscribers::new(),
			context: context.clone(),
			this: this.clone(),
		});
		Derived { body }
	}

	/// Current value, recomputing first if a dependency changed since
	/// the last read. Subscribes the running computation, if any.
	pub fn call(&self) -> T
	where
		T: Clone,
	{
		self.body.call()
	}

	/// Mark the cached value stale. If an eager consumer is reachable
	/// the function reruns before this returns (or at the end of the
	/// open batch); otherwise the rerun waits for the next read.
	pub fn invalidate(&self) {
		self.body.clone().trigger();
	}

	/// Detach from all dependencies. The value stops updating until the
	/// next read re-runs the function. Idempotent.
	pub fn dispose(&self) {
		self.body.dispose();
	}

	pub fn context(&self) -> &Context {
		&self.body.context
	}
}

impl<T: 'static> DerivedBody<T> {
	fn track(&self) {
		let this: Weak<dyn Subscribable> = self.this.clone();
		self.subscribers.track(&self.context, &this);
	}

	/// Full read path minus the value hand-off: register with the
	/// caller, pull freshness out of our own dependencies, recompute if
	/// still dirty.
	fn pull(&self) {
		self.track();
		self.dependencies.refresh_all();
		if self.dirty.get() {
			self.recompute();
		}
	}

	fn call(&self) -> T
	where
		T: Clone,
	{
		self.pull();
		let value = self.value.borrow();
		value.clone().expect("derived has no value after recompute")
	}

	fn recompute(&self) {
		let this = self.this.upgrade().expect("derived body outlived its handle");
		let restore = self.dependencies.keep_on_failure(self.this.clone());
		let _scope = self.context.enter(this);
		let value = (self.func)();
		self.dirty.set(false);
		let publish = {
			let mut slot = self.value.borrow_mut();
			match slot.take() {
				Some(old) if (self.equals)(&old, &value) => {
					// unchanged; keep the old value, cut the cascade here
					*slot = Some(old);
					false
				}
				Some(_) => {
					*slot = Some(value);
					true
				}
				None => {
					// first computation; nobody can have observed a previous value
					*slot = Some(value);
					false
				}
			}
		};
		if publish {
			self.subscribers.notify(&self.context);
		}
		restore.complete();
	}
}

impl<T: 'static> Subscribable for DerivedBody<T> {
	fn subscribe(&self, computation: Weak<dyn Computation>) {
		self.subscribers.attach(computation);
	}

	fn unsubscribe(&self, computation: &Weak<dyn Computation>) {
		self.subscribers.detach(computation);
	}

	fn refresh(&self) {
		// Skip when already being computed further up the stack.
		if self.dirty.get() && !self.context.on_stack(Weak::as_ptr(&self.this) as *const ()) {
			self.pull();
		}
	}
}

impl<T: 'static> Computation for DerivedBody<T> {
	fn trigger(self: Rc<Self>) {
		self.dirty.set(true);
		if pulled(self.subscribers.snapshot()) {
			self.pull();
		}
	}

	fn dispose(&self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}

	fn add_dependency(&self, source: Weak<dyn Subscribable>) {
		self.dependencies.add(source);
	}

	fn is_lazy(&self) -> bool {
		true
	}

	fn subscribers(&self) -> Vec<Weak<dyn Computation>> {
		self.subscribers.snapshot()
	}
}

impl<T: 'static> Drop for DerivedBody<T> {
	fn drop(&mut self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}
}

impl<T: 'static> Clone for Derived<T> {
	fn clone(&self) -> Self {
		Derived {
			body: self.body.clone(),
		}
	}
}

impl<T: fmt::Debug + 'static> fmt::Debug for Derived<T> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Derived")
			.field("value", &self.body.value.borrow())
			.field("dirty", &self.body.dirty.get())
			.finish()
	}
}

/// Shorthand for [`Derived::new`] on the default context.
pub fn derived<T: PartialEq + 'static>(func: impl Fn() -> T + 'static) -> Derived<T> {
	Derived::new(func)
}
