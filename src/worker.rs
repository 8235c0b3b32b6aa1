//! The single task that talks to the backend.
//!
//! A [`CallWorker`] owns the transport (and with it the request id counter) plus the
//! cached chain height. It pulls one [`Call`] at a time off its queue, validates it,
//! executes it and answers on the call's reply channel before looking at the queue
//! again, so at most one exchange is ever in flight. Nothing else can reach the
//! transport, which is why no locking is needed.
//!
//! This only holds because bitcoind's HTTP link cannot pipeline requests. A backend
//! that could would call for a connection pool here instead.

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    relay::RelayError,
    rpc::{Outcome, RpcTransport},
    validator,
};

pub(crate) type Reply = Result<Outcome, RelayError>;

/// One submission of a relayed call. Consumed exactly once by the worker.
pub(crate) struct Call {
    pub method: String,
    pub arguments: Vec<Value>,
    pub reply: oneshot::Sender<Reply>,
    pub tries_remaining: u32,
}

pub(crate) struct CallWorker {
    transport: RpcTransport,
    queue: mpsc::Receiver<Call>,
    shutdown: CancellationToken,
    height: watch::Sender<u64>,
}

impl CallWorker {
    pub fn new(
        transport: RpcTransport,
        queue: mpsc::Receiver<Call>,
        shutdown: CancellationToken,
        height: watch::Sender<u64>,
    ) -> Self {
        Self {
            transport,
            queue,
            shutdown,
            height,
        }
    }

    pub async fn run(mut self) {
        info!(endpoint:% = self.transport.url(); "Call worker started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Call worker received shutdown signal");
                    break;
                }
                call = self.queue.recv() => match call {
                    Some(call) => self.process_call(call).await,
                    None => {
                        info!("All relay clients dropped, call worker exiting");
                        break;
                    },
                },
            }
        }

        let abandoned = self.drain();
        info!(abandoned = abandoned, last_id = self.transport.last_id(); "Call worker stopped");
    }

    async fn process_call(&mut self, call: Call) {
        let Call {
            method,
            arguments,
            reply,
            tries_remaining,
        } = call;

        let result = match validator::validate(&method, &arguments) {
            Ok(params) => Ok(self.execute(&method, &params, tries_remaining).await),
            Err(e) => {
                warn!(method = &*method, error:% = e; "Rejected call");
                Err(RelayError::Validation(e))
            },
        };

        if reply.send(result).is_err() {
            warn!(method = &*method; "Caller stopped waiting before the reply was ready");
        }
    }

    async fn execute(&mut self, method: &str, params: &[Value], tries_remaining: u32) -> Outcome {
        debug!(
            method = method,
            id = self.transport.last_id() + 1,
            tries_remaining = tries_remaining;
            "Dispatching call to backend"
        );

        let outcome = Outcome::from(self.transport.call(method, params).await);
        match &outcome {
            Outcome::Result(result) => self.observe_height(method, result),
            Outcome::BusinessError(error) => {
                debug!(method = method, error:% = error; "Backend returned an RPC error");
            },
            Outcome::TransportError(e) => {
                warn!(method = method, tries_remaining = tries_remaining, error:% = e; "Backend exchange failed");
            },
        }
        outcome
    }

    fn observe_height(&self, method: &str, result: &Value) {
        let height = match method {
            "getblockcount" => result.as_u64(),
            "getblockchaininfo" | "getinfo" => result.get("blocks").and_then(Value::as_u64),
            _ => None,
        };

        if let Some(height) = height {
            self.height.send_if_modified(|current| {
                let changed = *current != height;
                *current = height;
                changed
            });
        }
    }

    /// Stops intake and answers every call still buffered in the queue.
    fn drain(&mut self) -> usize {
        self.queue.close();

        let mut abandoned = 0;
        while let Ok(call) = self.queue.try_recv() {
            abandoned += 1;
            let _ = call.reply.send(Err(RelayError::Closed));
        }
        abandoned
    }
}
