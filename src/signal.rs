use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::{default_context, Context};
use crate::dependencies::Subscribers;
use crate::derived::Derived;
use crate::equality::{partial_eq, EqualsFn};
use crate::{Computation, Subscribable};

/// A writable reactive value, the leaf of the dependency graph.
///
/// Reading through [`get`](Signal::get) or [`with`](Signal::with) inside
/// a running computation subscribes that computation to the signal.
/// Writing notifies subscribers, except when the equality function says
/// the new value is the same as the old one.
///
/// Handles are cheap clones of the same underlying cell.
pub struct Signal<T> {
	body: Rc<SignalBody<T>>,
}

pub(crate) struct SignalBody<T> {
	value: RefCell<T>,
	equals: EqualsFn<T>,
	subscribers: Subscribers,
	context: Context,
	this: Weak<SignalBody<T>>,
}

impl<T: PartialEq + 'static> Signal<T> {
	pub fn new(value: T) -> Self {
		Signal::with_equals(value, partial_eq)
	}

	pub fn new_in(context: &Context, value: T) -> Self {
		Signal::with_equals_in(context, value, partial_eq)
	}
}

impl<T: 'static> Signal<T> {
	/// A signal with a custom change predicate. Writes for which
	/// `equals` returns true keep the old value and notify nobody.
	pub fn with_equals(value: T, equals: EqualsFn<T>) -> Self {
		Signal::with_equals_in(&default_context(), value, equals)
	}

	pub fn with_equals_in(context: &Context, value: T, equals: EqualsFn<T>) -> Self {
		let body = Rc::new_cyclic(|this| SignalBody {
			value: RefCell::new(value),
			equals,
			subscribers: Subscribers::new(),
			context: context.clone(),
			this: this.clone(),
		});
		Signal { body }
	}

	/// Read the current value and subscribe the running computation,
	/// if any.
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.body.track();
		self.body.value.borrow().clone()
	}

	/// Read without subscribing.
	pub fn peek(&self) -> T
	where
		T: Clone,
	{
		self.body.value.borrow().clone()
	}

	/// Borrowed read for values that are expensive to clone. Subscribes
	/// like [`get`](Signal::get). `func` must not write this signal.
	pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		self.body.track();
		func(&self.body.value.borrow())
	}

	/// Store a new value. Returns whether the write was published to
	/// subscribers; an equality-suppressed write keeps the old value.
	pub fn set(&self, value: T) -> bool {
		let changed = {
			let mut slot = self.body.value.borrow_mut();
			let changed = !(self.body.equals)(&slot, &value);
			if changed {
				*slot = value;
			}
			changed
		};
		if changed {
			self.body.subscribers.notify(&self.body.context);
		}
		changed
	}

	/// Store a new value and hand back the previous one. The swap always
	/// happens; notification stays equality-gated like [`set`](Signal::set).
	pub fn replace(&self, value: T) -> T {
		let (old, changed) = {
			let mut slot = self.body.value.borrow_mut();
			let changed = !(self.body.equals)(&slot, &value);
			(std::mem::replace(&mut *slot, value), changed)
		};
		if changed {
			self.body.subscribers.notify(&self.body.context);
		}
		old
	}

	/// Compute a new value from the current one and store it. The read
	/// does not subscribe. `func` must not touch this signal itself.
	pub fn update(&self, func: impl FnOnce(&T) -> T) -> bool {
		let value = {
			let slot = self.body.value.borrow();
			func(&slot)
		};
		self.set(value)
	}

	/// A lazy derived value computed from this signal through `func`.
	pub fn map<U: PartialEq + Clone + 'static>(
		&self,
		func: impl Fn(&T) -> U + 'static,
	) -> Derived<U> {
		let this = self.clone();
		Derived::new_in(&self.body.context, move || this.with(|value| func(value)))
	}

	pub fn context(&self) -> &Context {
		&self.body.context
	}
}

impl<T: 'static> SignalBody<T> {
	fn track(&self) {
		let this: Weak<dyn Subscribable> = self.this.clone();
		self.subscribers.track(&self.context, &this);
	}
}

impl<T: 'static> Subscribable for SignalBody<T> {
	fn subscribe(&self, computation: Weak<dyn Computation>) {
		self.subscribers.attach(computation);
	}

	fn unsubscribe(&self, computation: &Weak<dyn Computation>) {
		self.subscribers.detach(computation);
	}
}

impl<T> Clone for Signal<T> {
	fn clone(&self) -> Self {
		Signal {
			body: self.body.clone(),
		}
	}
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_tuple("Signal")
			.field(&*self.body.value.borrow())
			.finish()
	}
}

/// Shorthand for [`Signal::new`] on the default context.
pub fn signal<T: PartialEq + 'static>(value: T) -> Signal<T> {
	Signal::new(value)
}
