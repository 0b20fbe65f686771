//! Responder strategies: turning a dispatch outcome into one reply.

use crate::protocol::ResponseEnvelope;
use crate::store::DispatchOutcome;
use std::fmt;

/// Single-shot handle for answering one dispatch request.
///
/// `send` consumes the handle, so no request can be answered twice.
pub struct Reply {
    send: Box<dyn FnOnce(ResponseEnvelope) + Send>,
}

impl Reply {
    pub fn new<F>(send: F) -> Self
    where
        F: FnOnce(ResponseEnvelope) + Send + 'static,
    {
        Self {
            send: Box::new(send),
        }
    }

    pub fn send(self, envelope: ResponseEnvelope) {
        (self.send)(envelope)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").finish_non_exhaustive()
    }
}

/// Policy that settles a dispatch outcome into exactly one reply.
pub trait DispatchResponder: Send + Sync {
    fn respond(&self, outcome: DispatchOutcome, reply: Reply);
}

impl<F> DispatchResponder for F
where
    F: Fn(DispatchOutcome, Reply) + Send + Sync,
{
    fn respond(&self, outcome: DispatchOutcome, reply: Reply) {
        self(outcome, reply)
    }
}

/// Default responder.
///
/// A plain value is answered right away; a deferred one is answered when it
/// settles. Rejections are logged before the error reply goes out.
#[derive(Clone, Copy, Debug, Default)]
pub struct PromiseResponder;

impl DispatchResponder for PromiseResponder {
    fn respond(&self, outcome: DispatchOutcome, reply: Reply) {
        match outcome {
            DispatchOutcome::Ready(value) => reply.send(ResponseEnvelope::Resolved(value)),
            DispatchOutcome::Deferred(deferred) => deferred.on_settle(move |settlement| {
                if let Err(message) = &settlement {
                    tracing::error!(error = %message, "error dispatching result");
                }
                reply.send(settlement.into());
            }),
        }
    }
}
