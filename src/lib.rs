pub mod macros;

mod addr;
mod batch;
mod collections;
mod context;
mod dependencies;
mod derived;
mod effect;
mod equality;
mod future;
mod memo;
mod notifier;
mod signal;
mod task;

use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;

pub use batch::{batch, in_batch, Batch};
pub use collections::{ReactiveMap, ReactiveSet};
pub use context::{default_context, Context};
pub use derived::{derived, Derived};
pub use effect::{effect, Effect};
pub use equality::{f32_eq, f64_eq, never_equal, partial_eq, EqualsFn};
pub use future::{AsyncDerived, AsyncEffect};
pub use memo::{memo, DerivedFamily, MemoFamily, Memoized};
pub use notifier::Notifier;
pub use signal::{signal, Signal};
pub use task::SharedTask;

/// A dependency source: something computations subscribe to while they
/// read it, and whose staleness they can have resolved before reading.
pub trait Subscribable: 'static {
	/// Notify this source that `computation` started to listen.
	fn subscribe(&self, computation: Weak<dyn Computation>);

	/// Notify this source that `computation` stopped to listen.
	fn unsubscribe(&self, computation: &Weak<dyn Computation>);

	/// Bring the source up to date synchronously. Plain values are
	/// always current, so doing nothing is the common case.
	fn refresh(&self) {}

	/// The awaitable form of [`refresh`](Subscribable::refresh), for
	/// sources that resolve staleness by running a task. `None` means
	/// there is nothing to wait for.
	fn refresh_deferred(&self) -> Option<LocalBoxFuture<'static, ()>> {
		None
	}
}

/// A dependency consumer: something that reads sources during a run and
/// reacts when one of them changes.
pub trait Computation: 'static {
	/// Called when a source this computation listens to changed.
	fn trigger(self: Rc<Self>);

	/// Drop every subscription this computation holds. The next run
	/// re-registers whatever it still reads.
	fn dispose(&self);

	/// Record an edge to a source read during the current run.
	fn add_dependency(&self, source: Weak<dyn Subscribable>);

	/// Lazy computations recompute on read, not on notification; a
	/// change starts work only when some transitive subscriber is eager.
	fn is_lazy(&self) -> bool {
		false
	}

	/// Downstream edges, for deciding whether a lazy computation has an
	/// eager consumer somewhere below it. Sinks have none.
	fn subscribers(&self) -> Vec<Weak<dyn Computation>> {
		Vec::new()
	}
}
