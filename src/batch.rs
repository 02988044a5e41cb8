use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use crate::addr::WeakAddr;
use crate::context::{default_context, Context};
use crate::Computation;

/// An open batch scope. While it exists, every notification in its
/// context is deferred into a deduplicated pending set instead of
/// running immediately; closing the scope flushes that set to a
/// fixpoint.
///
/// `new`/`new_in` scopes always flush when they close. `defer`/`defer_in`
/// scopes flush only when they are the outermost scope; nested ones hand
/// their pending set to the parent instead, so intermediate bookkeeping
/// writes coalesce into the enclosing flush.
#[must_use]
pub struct Batch {
	body: Rc<BatchBody>,
	closed: Cell<bool>,
}

pub(crate) struct BatchBody {
	pending: RefCell<BTreeSet<WeakAddr<dyn Computation>>>,
	force_flush: bool,
	context: Context,
}

impl Batch {
	#[must_use]
	pub fn new() -> Batch {
		Batch::new_in(&default_context())
	}

	#[must_use]
	pub fn new_in(context: &Context) -> Batch {
		Batch::open(context, true)
	}

	#[must_use]
	pub fn defer() -> Batch {
		Batch::defer_in(&default_context())
	}

	#[must_use]
	pub fn defer_in(context: &Context) -> Batch {
		Batch::open(context, false)
	}

	fn open(context: &Context, force_flush: bool) -> Batch {
		let body = Rc::new(BatchBody {
			pending: RefCell::new(BTreeSet::new()),
			force_flush,
			context: context.clone(),
		});
		context.push_batch(body.clone());
		Batch {
			body,
			closed: Cell::new(false),
		}
	}

	/// Close the scope now instead of at drop.
	pub fn commit(self) {
		self.close();
	}

	fn close(&self) {
		if self.closed.replace(true) {
			return;
		}
		let context = self.body.context.clone();
		if self.body.force_flush || context.batch_depth() == 1 {
			// The pop must happen even when a trigger panics mid-flush.
			let _pop = PopBatch {
				context: &context,
				expected: Rc::as_ptr(&self.body),
			};
			if std::thread::panicking() {
				tracing::warn!("batch scope dropped during unwind, pending work discarded");
			} else {
				self.body.flush();
			}
		} else {
			let popped = context.pop_batch();
			assert!(
				Rc::ptr_eq(&popped, &self.body),
				"batch stack out of order"
			);
			context.schedule(self.body.drain());
		}
	}
}

impl Drop for Batch {
	fn drop(&mut self) {
		self.close();
	}
}

impl BatchBody {
	pub(crate) fn schedule(&self, computations: impl IntoIterator<Item = Weak<dyn Computation>>) {
		let mut pending = self.pending.borrow_mut();
		for computation in computations {
			pending.insert(WeakAddr::new(computation));
		}
	}

	fn drain(&self) -> Vec<Weak<dyn Computation>> {
		let set = std::mem::take(&mut *self.pending.borrow_mut());
		set.iter().map(|item| (**item).clone()).collect()
	}

	/// Run pending computations until no new work appears. Each
	/// computation triggers at most once per flush; one that is
	/// re-scheduled while its own round is still running is left for the
	/// next round instead of running twice.
	fn flush(&self) {
		let mut triggered: BTreeSet<WeakAddr<dyn Computation>> = BTreeSet::new();
		loop {
			let todo: Vec<WeakAddr<dyn Computation>> = {
				let mut pending = self.pending.borrow_mut();
				if pending.is_empty() {
					break;
				}
				let todo = pending
					.iter()
					.filter(|item| !triggered.contains(*item))
					.cloned()
					.collect();
				pending.clear();
				todo
			};
			tracing::trace!(round_len = todo.len(), "batch flush round");
			for item in todo {
				if self.pending.borrow().contains(&item) {
					// re-added during this round; the next round runs it
					continue;
				}
				if let Some(computation) = item.upgrade() {
					triggered.insert(item);
					computation.trigger();
				}
			}
		}
	}
}

struct PopBatch<'a> {
	context: &'a Context,
	expected: *const BatchBody,
}

impl Drop for PopBatch<'_> {
	fn drop(&mut self) {
		let popped = self.context.pop_batch();
		assert!(
			Rc::as_ptr(&popped) == self.expected,
			"batch stack out of order"
		);
	}
}

impl Context {
	/// Function-wrapping form of a batch scope bound to this context.
	pub fn batch<R>(&self, func: impl FnOnce() -> R) -> R {
		let scope = Batch::new_in(self);
		let result = func();
		scope.commit();
		result
	}
}

/// Run `func` inside a flushing batch scope on the default context.
/// Writes inside are deferred, deduplicated and flushed on the way out.
pub fn batch<R>(func: impl FnOnce() -> R) -> R {
	default_context().batch(func)
}

/// True while a batch scope is open on the default context.
pub fn in_batch() -> bool {
	default_context().in_batch()
}
