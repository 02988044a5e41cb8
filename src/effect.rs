use std::rc::{Rc, Weak};

use crate::context::{default_context, Context};
use crate::dependencies::Dependencies;
use crate::{Computation, Subscribable};

/// An eager computation. Every notification from any dependency reruns
/// the whole function; there is no dirty flag and no equality gate.
///
/// Dropping the last handle detaches the effect from its dependencies,
/// so an effect nobody holds on to stops reacting. Hold it for as long
/// as the reaction should stay alive.
#[must_use]
pub struct Effect<T: 'static = ()> {
	body: Rc<EffectBody<T>>,
}

struct EffectBody<T: 'static> {
	func: Box<dyn Fn() -> T>,
	dependencies: Dependencies,
	context: Context,
	this: Weak<EffectBody<T>>,
}

impl<T: 'static> Effect<T> {
	/// Create the effect and run it once right away, establishing the
	/// initial dependency set.
	pub fn new(func: impl Fn() -> T + 'static) -> Self {
		Effect::new_in(&default_context(), func)
	}

	pub fn new_in(context: &Context, func: impl Fn() -> T + 'static) -> Self {
		let effect = Effect::deferred_in(context, func);
		effect.call();
		effect
	}

	/// Create without the initial run. The effect has no dependencies
	/// and reacts to nothing until [`call`](Effect::call) runs it.
	pub fn deferred(func: impl Fn() -> T + 'static) -> Self {
		Effect::deferred_in(&default_context(), func)
	}

	pub fn deferred_in(context: &Context, func: impl Fn() -> T + 'static) -> Self {
		let body = Rc::new_cyclic(|this| EffectBody {
			func: Box::new(func),
			dependencies: Dependencies::new(),
			context: context.clone(),
			this: this.clone(),
		});
		Effect { body }
	}

	/// Run the function now, rebuilding the dependency set from the
	/// reads it performs.
	pub fn call(&self) -> T {
		self.body.run()
	}

	/// Detach from all dependencies. The effect stays usable: the next
	/// [`call`](Effect::call) re-runs and re-tracks. Idempotent.
	pub fn dispose(&self) {
		self.body.dispose();
	}

	pub fn context(&self) -> &Context {
		&self.body.context
	}
}

impl<T: 'static> EffectBody<T> {
	fn run(&self) -> T {
		let this = self.this.upgrade().expect("effect body outlived its handle");
		let restore = self.dependencies.keep_on_failure(self.this.clone());
		let _scope = self.context.enter(this);
		let value = (self.func)();
		restore.complete();
		value
	}
}

impl<T: 'static> Computation for EffectBody<T> {
	fn trigger(self: Rc<Self>) {
		self.run();
	}

	fn dispose(&self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}

	fn add_dependency(&self, source: Weak<dyn Subscribable>) {
		self.dependencies.add(source);
	}
}

impl<T: 'static> Drop for EffectBody<T> {
	fn drop(&mut self) {
		let this: Weak<dyn Computation> = self.this.clone();
		self.dependencies.detach_all(&this);
	}
}

impl<T: 'static> Clone for Effect<T> {
	fn clone(&self) -> Self {
		Effect {
			body: self.body.clone(),
		}
	}
}

/// Shorthand for [`Effect::new`] on the default context.
pub fn effect<T: 'static>(func: impl Fn() -> T + 'static) -> Effect<T> {
	Effect::new(func)
}
