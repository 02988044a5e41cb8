use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Poll;

use futures::future::{LocalBoxFuture, Shared};

use crate::context::Context;
use crate::Computation;

/// Handle to a spawned reactive task. Clones share one underlying run;
/// every holder that awaits it observes the same settled value, and
/// dropping a clone does not cancel the run.
pub type SharedTask<T> = Shared<LocalBoxFuture<'static, T>>;

/// Future adapter that runs a computation body inside its scope.
///
/// The computation is disposed once, at the first poll, mirroring the
/// dispose-then-run shape of the synchronous computations. During every
/// poll slice the computation sits on its context's execution stack, so
/// reads performed by the body track to it regardless of how the task
/// interleaves with other tasks on the same executor; while the task is
/// suspended, nothing of it remains on the stack.
pub struct TrackedRun<T> {
	computation: Rc<dyn Computation>,
	context: Context,
	inner: LocalBoxFuture<'static, T>,
	begun: bool,
}

impl<T> TrackedRun<T> {
	pub(crate) fn new(
		context: &Context,
		computation: Rc<dyn Computation>,
		inner: LocalBoxFuture<'static, T>,
	) -> Self {
		TrackedRun {
			computation,
			context: context.clone(),
			inner,
			begun: false,
		}
	}
}

impl<T> Future for TrackedRun<T> {
	type Output = T;

	fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<T> {
		let this = self.get_mut();
		if !this.begun {
			this.begun = true;
			this.computation.dispose();
		}
		let _scope = this.context.resume(this.computation.clone());
		this.inner.as_mut().poll(cx)
	}
}
