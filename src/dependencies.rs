use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use fxhash::FxHashSet;

use crate::addr::WeakAddr;
use crate::batch::Batch;
use crate::context::Context;
use crate::{Computation, Subscribable};

/// The consumer side of the dependency graph: which computations are
/// listening to a source. Entries are weak and keyed by address, so a
/// source never keeps its consumers alive on its own.
pub(crate) struct Subscribers {
	set: RefCell<BTreeSet<WeakAddr<dyn Computation>>>,
}

impl Subscribers {
	pub fn new() -> Self {
		Subscribers {
			set: RefCell::new(BTreeSet::new()),
		}
	}

	pub fn attach(&self, computation: Weak<dyn Computation>) {
		self.set.borrow_mut().insert(WeakAddr::new(computation));
	}

	pub fn detach(&self, computation: &Weak<dyn Computation>) {
		self.set
			.borrow_mut()
			.remove(&WeakAddr::new(computation.clone()));
	}

	/// Live subscribers, pruning entries whose computation is gone.
	pub fn snapshot(&self) -> Vec<Weak<dyn Computation>> {
		let mut set = self.set.borrow_mut();
		set.retain(|item| item.strong_count() > 0);
		set.iter().map(|item| (**item).clone()).collect()
	}

	/// Register the edge between this source and the computation that is
	/// currently executing, if any. Reading yourself mid-run is not an
	/// edge. The insertions on both sides are plain set mutations and do
	/// not themselves count as reads.
	pub fn track(&self, context: &Context, this: &Weak<dyn Subscribable>) {
		let Some(current) = context.current() else {
			return;
		};
		if Rc::as_ptr(&current) as *const () == Weak::as_ptr(this) as *const () {
			return;
		}
		self.attach(Rc::downgrade(&current));
		current.add_dependency(this.clone());
	}

	/// Hand every current subscriber to the open batch, or open an
	/// implicit one around the hand-off so the work flushes right away.
	pub fn notify(&self, context: &Context) {
		let subscribers = self.snapshot();
		if subscribers.is_empty() {
			return;
		}
		if context.in_batch() {
			context.schedule(subscribers);
		} else {
			let scope = Batch::defer_in(context);
			context.schedule(subscribers);
			scope.commit();
		}
	}
}

/// The producer side: which sources a computation read during its last
/// run. Weak, so depending on a value does not keep it alive.
pub(crate) struct Dependencies {
	set: RefCell<BTreeSet<WeakAddr<dyn Subscribable>>>,
}

impl Dependencies {
	pub fn new() -> Self {
		Dependencies {
			set: RefCell::new(BTreeSet::new()),
		}
	}

	pub fn add(&self, source: Weak<dyn Subscribable>) {
		self.set.borrow_mut().insert(WeakAddr::new(source));
	}

	/// Detach `parent` from every live source and clear the set. The
	/// parent comes in as a weak handle so this also works while the
	/// owning body is being dropped.
	pub fn detach_all(&self, parent: &Weak<dyn Computation>) {
		let items = std::mem::take(&mut *self.set.borrow_mut());
		for item in &items {
			if let Some(source) = item.upgrade() {
				source.unsubscribe(parent);
			}
		}
	}

	pub fn snapshot(&self) -> Vec<Rc<dyn Subscribable>> {
		let mut set = self.set.borrow_mut();
		set.retain(|item| item.strong_count() > 0);
		set.iter().filter_map(|item| item.upgrade()).collect()
	}

	/// Pull staleness out of every lazy dependency before a read. The
	/// sources decide for themselves whether anything needs recomputing.
	pub fn refresh_all(&self) {
		for source in self.snapshot() {
			source.refresh();
		}
	}

	/// Failure guard around one computation run. A run that unwinds
	/// after `dispose` may leave the computation with fewer edges than
	/// before; if the edges it did record are a subset of the previous
	/// ones, the previous set is put back so a later change can still
	/// retrigger the computation. Runs that reached new sources before
	/// failing keep what they recorded.
	pub fn keep_on_failure(&self, parent: Weak<dyn Computation>) -> RestoreOnFailure<'_> {
		RestoreOnFailure {
			dependencies: self,
			parent,
			previous: self.set.borrow().iter().cloned().collect(),
			completed: false,
		}
	}
}

pub(crate) struct RestoreOnFailure<'a> {
	dependencies: &'a Dependencies,
	parent: Weak<dyn Computation>,
	previous: Vec<WeakAddr<dyn Subscribable>>,
	completed: bool,
}

impl RestoreOnFailure<'_> {
	pub fn complete(mut self) {
		self.completed = true;
	}
}

impl Drop for RestoreOnFailure<'_> {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		{
			let current = self.dependencies.set.borrow();
			let previous: FxHashSet<*const ()> = self.previous.iter().map(WeakAddr::thin).collect();
			if current.iter().any(|item| !previous.contains(&item.thin())) {
				return;
			}
		}
		for prev in &self.previous {
			if let Some(source) = prev.upgrade() {
				source.subscribe(self.parent.clone());
				self.dependencies.add((**prev).clone());
			}
		}
	}
}

/// Walk the subscriber graph breadth-first: a dirty lazy node recomputes
/// eagerly only if some non-lazy consumer is reachable through chains of
/// lazy ones. The visited set keeps the walk finite on cyclic graphs.
pub(crate) fn pulled(seed: Vec<Weak<dyn Computation>>) -> bool {
	let mut visited: FxHashSet<*const ()> = FxHashSet::default();
	let mut queue = seed;
	while let Some(item) = queue.pop() {
		let Some(computation) = item.upgrade() else {
			continue;
		};
		if !visited.insert(Rc::as_ptr(&computation) as *const ()) {
			continue;
		}
		if !computation.is_lazy() {
			return true;
		}
		queue.extend(computation.subscribers());
	}
	false
}
