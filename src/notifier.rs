use std::rc::{Rc, Weak};

use crate::context::{default_context, Context};
use crate::dependencies::Subscribers;
use crate::{Computation, Subscribable};

/// A value-less notification channel: trackable and notifiable like a
/// signal but carrying no data. Used where a change has no natural value
/// representation, such as the key set of a reactive collection.
pub struct Notifier {
	body: Rc<NotifierBody>,
}

struct NotifierBody {
	subscribers: Subscribers,
	context: Context,
	this: Weak<NotifierBody>,
}

impl Notifier {
	pub fn new() -> Self {
		Notifier::new_in(&default_context())
	}

	pub fn new_in(context: &Context) -> Self {
		let body = Rc::new_cyclic(|this| NotifierBody {
			subscribers: Subscribers::new(),
			context: context.clone(),
			this: this.clone(),
		});
		Notifier { body }
	}

	/// Subscribe the running computation, if any.
	pub fn track(&self) {
		let this: Weak<dyn Subscribable> = self.body.this.clone();
		self.body.subscribers.track(&self.body.context, &this);
	}

	/// Schedule every subscriber for a re-run.
	pub fn notify(&self) {
		self.body.subscribers.notify(&self.body.context);
	}

	pub fn context(&self) -> &Context {
		&self.body.context
	}
}

impl Subscribable for NotifierBody {
	fn subscribe(&self, computation: Weak<dyn Computation>) {
		self.subscribers.attach(computation);
	}

	fn unsubscribe(&self, computation: &Weak<dyn Computation>) {
		self.subscribers.detach(computation);
	}
}

impl Default for Notifier {
	fn default() -> Self {
		Notifier::new()
	}
}

impl Clone for Notifier {
	fn clone(&self) -> Self {
		Notifier {
			body: self.body.clone(),
		}
	}
}
