use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawn, LocalSpawnExt};
use smallvec::SmallVec;

use crate::batch::BatchBody;
use crate::Computation;

/// Shared state of one reactive graph: the stack of currently executing
/// computations, the stack of open batches and the task spawner used by
/// the async computations.
///
/// Every signal and computation is bound to exactly one context at
/// construction time. Contexts are cheap to clone and independent of each
/// other; work in one context never schedules into another.
#[derive(Clone)]
pub struct Context {
	body: Rc<ContextBody>,
}

pub(crate) struct ContextBody {
	stack: RefCell<SmallVec<[Rc<dyn Computation>; 4]>>,
	batches: RefCell<SmallVec<[Rc<BatchBody>; 2]>>,
	spawner: RefCell<Option<Rc<dyn LocalSpawn>>>,
}

thread_local! {
	static DEFAULT: Context = Context::new();
}

/// The context used by constructors that do not name one explicitly.
/// Thread-local: an `Rc`-based graph never crosses threads anyway.
pub fn default_context() -> Context {
	DEFAULT.with(Clone::clone)
}

impl Context {
	pub fn new() -> Self {
		Context {
			body: Rc::new(ContextBody {
				stack: RefCell::new(SmallVec::new_const()),
				batches: RefCell::new(SmallVec::new_const()),
				spawner: RefCell::new(None),
			}),
		}
	}

	/// Install the task starter used by [`AsyncDerived`](crate::AsyncDerived)
	/// and [`AsyncEffect`](crate::AsyncEffect). Required before any async
	/// computation in this context needs to run.
	pub fn set_spawner(&self, spawner: impl LocalSpawn + 'static) {
		*self.body.spawner.borrow_mut() = Some(Rc::new(spawner));
	}

	pub fn in_batch(&self) -> bool {
		!self.body.batches.borrow().is_empty()
	}

	pub(crate) fn spawner(&self) -> Rc<dyn LocalSpawn> {
		self.body
			.spawner
			.borrow()
			.clone()
			.expect("no task spawner configured for this context")
	}

	/// Start a task on the configured spawner. Asking for async work
	/// without a spawner, or after its executor shut down, is a defect
	/// in the embedding program.
	pub(crate) fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
		self.spawner()
			.spawn_local(task)
			.expect("task spawner rejected the task");
	}

	/// Scoped acquisition for a computation run: dispose its previous
	/// dependency edges, push it, and pop again when the returned guard
	/// drops, on every exit path.
	pub(crate) fn enter(&self, computation: Rc<dyn Computation>) -> Scope {
		computation.dispose();
		self.resume(computation)
	}

	/// Push without the dispose that [`enter`](Context::enter) performs.
	/// Used when a suspended computation re-acquires the stack for one
	/// poll slice; its dependency set must survive across slices.
	pub(crate) fn resume(&self, computation: Rc<dyn Computation>) -> Scope {
		let expected = Rc::as_ptr(&computation) as *const ();
		self.body.stack.borrow_mut().push(computation);
		Scope {
			body: self.body.clone(),
			expected,
		}
	}

	pub(crate) fn current(&self) -> Option<Rc<dyn Computation>> {
		self.body.stack.borrow().last().cloned()
	}

	pub(crate) fn on_stack(&self, addr: *const ()) -> bool {
		self.body
			.stack
			.borrow()
			.iter()
			.any(|c| Rc::as_ptr(c) as *const () == addr)
	}

	/// Add computations to the innermost open batch. All notification
	/// paths open an implicit batch first, so an empty batch stack here
	/// is a defect in the runtime itself.
	pub(crate) fn schedule(&self, computations: impl IntoIterator<Item = Weak<dyn Computation>>) {
		let batches = self.body.batches.borrow();
		let top = batches.last().expect("no open batch to schedule into");
		top.schedule(computations);
	}

	pub(crate) fn push_batch(&self, batch: Rc<BatchBody>) {
		self.body.batches.borrow_mut().push(batch);
	}

	pub(crate) fn pop_batch(&self) -> Rc<BatchBody> {
		self.body
			.batches
			.borrow_mut()
			.pop()
			.expect("batch stack underflow")
	}

	pub(crate) fn batch_depth(&self) -> usize {
		self.body.batches.borrow().len()
	}
}

impl Default for Context {
	fn default() -> Self {
		Context::new()
	}
}

/// Guard returned by [`Context::enter`]. Popping asserts that the entry
/// being removed is the one that was pushed; anything else means the
/// stack discipline was broken by reentrant misuse.
pub(crate) struct Scope {
	body: Rc<ContextBody>,
	expected: *const (),
}

impl Drop for Scope {
	fn drop(&mut self) {
		let popped = self
			.body
			.stack
			.borrow_mut()
			.pop()
			.expect("computation stack underflow");
		assert!(
			Rc::as_ptr(&popped) as *const () == self.expected,
			"computation stack out of order"
		);
	}
}
