//! Subscription callbacks

use std::future::Future;

use crate::message::Message;

/// Receives the messages of a subscription.
///
/// Implemented for any `Fn(Message) -> impl Future<Output = ()>`, so an
/// async closure works directly:
///
/// ```ignore
/// actor.subscribe(topic, |msg: Message| async move {
///     println!("{:?}", msg.as_string());
/// }).await?;
/// ```
pub trait Callback: Send + Sync + 'static {
    fn on_message(&self, message: Message) -> impl Future<Output = ()> + Send;
}

impl<F, Fut> Callback for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn on_message(&self, message: Message) -> impl Future<Output = ()> + Send {
        self(message)
    }
}
