use crate::{Reply, Result};

/// Receives the reply for one command.
///
/// `deliver` consumes the responder, so it runs at most once per
/// registration. It is invoked on the inbound-processing task: keep it short
/// and never block in it. A returned error is reported to the client's
/// [`ErrorSink`](crate::ErrorSink) and does not affect other calls.
///
/// Any `FnOnce(Reply) -> Result<()>` closure is a responder:
///
/// ```
/// use amplink_rpc::{Reply, Responder};
///
/// fn takes_responder(_r: impl Responder) {}
///
/// takes_responder(|reply: Reply| {
///     println!("{}.{} replied", reply.iface, reply.method);
///     Ok(())
/// });
/// ```
pub trait Responder: Send + 'static {
    fn deliver(self: Box<Self>, reply: Reply) -> Result<()>;
}

impl<F> Responder for F
where
    F: FnOnce(Reply) -> Result<()> + Send + 'static,
{
    fn deliver(self: Box<Self>, reply: Reply) -> Result<()> {
        (*self)(reply)
    }
}

/// Owned, type-erased responder as stored in the registry.
pub type BoxedResponder = Box<dyn Responder>;
