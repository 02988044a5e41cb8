use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::context::{default_context, Context};
use crate::dependencies::{pulled, Dependencies, Subscribers};
use crate::equality::{partial_eq, EqualsFn};
use crate::task::{SharedTask, TrackedRun};
use crate::{Computation, Subscribable};

/// The asynchronous counterpart of [`Derived`](crate::Derived): the same
/// lazy, dirty-flagged, equality-gated contract, with the recomputation
/// running as a suspendable task.
///
/// Reads single-flight. A call made while a recomputation is in flight
/// joins it and resolves to the same value instead of running the body
/// a second time; the in-flight handle is cleared when the run settles,
/// so the next call after a new invalidation starts fresh.
pub struct AsyncDerived<T: Clone + 'static> {
	body: Rc<AsyncBody<T>>,
}

struct AsyncBody<T: Clone + 'static> {
	func: Box<dyn Fn() -> LocalBoxFuture<'static, T>>,
	value: RefCell<Option<T>>,
	dirty: Cell<bool>,
	equals: EqualsFn<T>,
	inflight: RefCell<Option<SharedTask<T>>>,
	dependencies: Dependencies,
	subscribers: Subscribers,
	context: Context,
	this: Weak<AsyncBody<T>>,
}

impl<T: Clone + PartialEq + 'static> AsyncDerived<T> {
	pub fn new<Fut>(func: impl Fn() -> Fut + 'static) -> Self
	where
		Fut: Future<Output = T> + 'static,
	{
		AsyncDerived::with_equals(func, partial_eq)
	}

	pub fn new_in<Fut>(context: &Context, func: impl Fn() -> Fut + 'static) -> Self
	where
		Fut: Future<Output = T> + 'static,
	{
		AsyncDerived::with_equals_in(context, func, partial_eq)
	}
}

impl<T: Clone + 'static> AsyncDerived<T> {
	pub fn with_equals<Fut>(func: impl Fn() -> Fut + 'static, equals: EqualsFn<T>) -> Self
	where
		Fut: Future<Output = T> + 'static,
	{
		AsyncDerived::with_equals_in(&default_context(), func, equals)
	}

	/// Reads belong inside the async body; anything the closure reads
	/// before returning the future is not tracked.
	pub fn with_equals_in<Fut>(
		context: &Context,
		func: impl Fn() -> Fut + 'static,
		equals: EqualsFn<T>,
	) -> Self
	where
		Fut: Future<Output = T> + 'static,
	{
		let body = Rc::new_cyclic(|this| AsyncBody {
			func: Box::new(move || func().boxed_local()),
			value: RefCell::new(None),
			dirty: Cell::new(true),
			equals,
			inflight: RefCell::new(None),
			dependencies: Dependencies::new(),
			subscribers: Subscribers::new(),
			context: context.clone(),
			this: this.clone(),
		});
		AsyncDerived { body }
	}

	/// Resolve the current value, awaiting a recomputation when a
	/// dependency changed. The returned future does not borrow `self`
	/// and registers the tracking edge twice: when it first runs, and
	/// again at the point where the value becomes available, since the
	/// caller may be resumed under a different computation scope than it
	/// started in.
	pub fn call(&self) -> impl Future<Output = T> {
		let body = self.body.clone();
		async move {
			body.track();
			let task = body.resolve();
			let value = task.await;
			body.track();
			value
		}
	}

	/// Last settled value without awaiting, or `None` before the first
	/// completed run. Subscribes like a read; a stale value stays
	/// visible until a run replaces it.
	pub fn latest(&self) -> Option<T> {
		self.body.track();
		self.body.value.borrow().clone()
	}

	/// Mark stale. If an eager consumer is reachable, a recomputation
	/// task starts right away; otherwise the rerun waits for the next
	/// call.
	pub fn invalidate(&self) {
		self.body.clone().trigger();
	}

	pub fn dispose(&self) {
		self.body.dispose();
	}

	pub fn context(&self) -> &Context {
		&self.body.context
	}
}

impl<T: Clone + 'static> AsyncBody<T> {
	fn track(&self) {
		let this: Weak<dyn Subscribable> = self.this.clone();
		self.subscribers.track(&self.context, &this);
	}

	/// Join the in-flight run or start a new one.
	fn resolve(&self) -> SharedTask<T> {
		if let Some(task) = self.inflight.borrow().as_ref() {
			return task.clone();
		}
		let task = self.pipeline().boxed_local().shared();
		*self.inflight.borrow_mut() = Some(task.clone());
		task
	}

	fn pipeline(&self) -> impl Future<Output = T> {
		let body = self.this.upgrade().expect("async derived body outlived its handle");
		async move {
			// Cleared on completion, panic and abandonment alike.
			let _clear = ClearSlot { body: body.clone() };
			body.resolve_dependencies().await;
			if body.dirty.get() {
				let computation: Rc<dyn Computation> = body.clone();
				let run = TrackedRun::new(&body.context, computation, (body.func)());
				let value = run.await;
				body.store(value);
			}
			let value = body.value.borrow();
			value
				.clone()
				.expect("async derived has no value after recompute")
		}
	}

	/// The asynchronous form of dependency sync: sources that resolve
	/// staleness by awaiting hand back a future, everything else
	/// refreshes inline.
	async fn resolve_dependencies(&self) {
		for source in self.dependencies.snapshot() {
			match source.refresh_deferred() {
				Some(task) => task.await,
				None => source.refresh(),
			}
		}
	}

	fn store(&self, value: T) {
		self.dirty.set(false);
		let publish = {
			let mut slot = self.value.borrow_mut();
			match slot.take() {
				Some(old) if (self.equals)(&old, &value) => {
					*slot = Some(old);
					false
				}
				Some(_) => {
					*slot = Some(value);
					true
				}
				None => {
					*slot = Some(value);
					false
				}
			}
		};
		if publish {
			self.subscribers.notify(&self.context);
		}
	}
}

struct ClearSlot<T: Clone + 'static> {
	body: Rc<AsyncBody<T>>,
}

impl<T: Clone + 'static> Drop for ClearSlot<T> {
	fn drop(&mut self) {
		self.body.inflight.borrow_mut().take();
	}
}

impl<T: Clone + 'static> Subscribable for AsyncBody<T> {
	fn subscribe(&self, computation: Weak<dyn Computation>) {
		self.subscribers.attach(computation);
	}

	fn unsubscribe(&self, computation: &Weak<dyn Computation>) {
		self.subscribers.detach(computation);
	}

	fn refresh_deferred(&self) -> Option<LocalBoxFuture<'static, ()>> {
		if !self.dirty.get() && self.inflight.borrow().is_none() {
			return None;
		}
		let body = self.this.upgrade()?;
		let task = body.resolve();
		Some(task.map(|_| ()).boxed_local())
	}
}

impl<T: Clone + 'static> Computation for AsyncBody<T> {
	fn trigger(self: Rc<Self>) {
		self.dirty.set(true);
		if pulled(self.subscribers.snapshot()) {
			let task = self.resolve();
			self.context.spawn(task.map(|_| ()).boxed_local());
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

impl<T: Clone + 'static> Drop for AsyncBody<T> {
	fn drop(&mut self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}
}

impl<T: Clone + 'static> Clone for AsyncDerived<T> {
	fn clone(&self) -> Self {
		AsyncDerived {
			body: self.body.clone(),
		}
	}
}

/// The asynchronous counterpart of [`Effect`](crate::Effect): every
/// dependency change starts the body as a task on the context's spawner
/// instead of running it inline.
///
/// Requires a spawner; see [`Context::set_spawner`].
#[must_use]
pub struct AsyncEffect {
	body: Rc<AsyncEffectBody>,
}

struct AsyncEffectBody {
	func: Box<dyn Fn() -> LocalBoxFuture<'static, ()>>,
	dependencies: Dependencies,
	context: Context,
	this: Weak<AsyncEffectBody>,
}

impl AsyncEffect {
	/// Create the effect and start its first run as a task right away.
	pub fn new<Fut>(func: impl Fn() -> Fut + 'static) -> Self
	where
		Fut: Future<Output = ()> + 'static,
	{
		AsyncEffect::new_in(&default_context(), func)
	}

	pub fn new_in<Fut>(context: &Context, func: impl Fn() -> Fut + 'static) -> Self
	where
		Fut: Future<Output = ()> + 'static,
	{
		let effect = AsyncEffect::deferred_in(context, func);
		effect.call();
		effect
	}

	/// Create without the initial run; the effect reacts to nothing
	/// until [`call`](AsyncEffect::call) runs it once.
	pub fn deferred<Fut>(func: impl Fn() -> Fut + 'static) -> Self
	where
		Fut: Future<Output = ()> + 'static,
	{
		AsyncEffect::deferred_in(&default_context(), func)
	}

	pub fn deferred_in<Fut>(context: &Context, func: impl Fn() -> Fut + 'static) -> Self
	where
		Fut: Future<Output = ()> + 'static,
	{
		let body = Rc::new_cyclic(|this| AsyncEffectBody {
			func: Box::new(move || func().boxed_local()),
			dependencies: Dependencies::new(),
			context: context.clone(),
			this: this.clone(),
		});
		AsyncEffect { body }
	}

	/// Start one run as a task and hand back a joinable handle to it.
	/// Dropping the handle does not cancel the run.
	pub fn call(&self) -> SharedTask<()> {
		self.body.clone().start()
	}

	pub fn dispose(&self) {
		self.body.dispose();
	}

	pub fn context(&self) -> &Context {
		&self.body.context
	}
}

impl AsyncEffectBody {
	fn start(self: Rc<Self>) -> SharedTask<()> {
		let computation: Rc<dyn Computation> = self.clone();
		let run = TrackedRun::new(&self.context, computation, (self.func)());
		let task = run.boxed_local().shared();
		self.context.spawn(task.clone().map(|_| ()).boxed_local());
		task
	}
}

impl Computation for AsyncEffectBody {
	fn trigger(self: Rc<Self>) {
		self.start();
	}

	fn dispose(&self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}

	fn add_dependency(&self, source: Weak<dyn Subscribable>) {
		self.dependencies.add(source);
	}
}

impl Drop for AsyncEffectBody {
	fn drop(&mut self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}
}

impl Clone for AsyncEffect {
	fn clone(&self) -> Self {
		AsyncEffect {
			body: self.body.clone(),
		}
	}
}
