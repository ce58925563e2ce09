//! # Loopback Transport
//!
//! An in-process transport: a pump task receives transactions over a channel
//! and serves each one on its own task, so a slow handler never blocks the
//! calls queued behind it.
//!
//! A bridging loopback joins two registries. Tokens in the request are
//! resolved in the caller's registry and adopted by the dispatcher's; tokens
//! in the reply travel back the other way.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;
use transact::Codec;
use transact::InterfaceDescriptor;
use transact::TransactionId;

use crate::dispatch::Dispatcher;
use crate::registry::Registry;
use crate::transport;
use crate::transport::Transport;

struct Envelope {
    descriptor: InterfaceDescriptor,
    id: TransactionId,
    request: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

/// Transport that delivers straight into a local dispatcher.
pub struct Loopback {
    tx: mpsc::UnboundedSender<Envelope>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    dispatcher: Arc<Dispatcher>,
    caller: Option<Weak<Registry>>,
}

impl Loopback {
    /// Starts the pump task. Must be called inside a tokio runtime.
    ///
    /// Callers must share the dispatcher's registry; tokens pass untouched.
    pub fn spawn(dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Self::start(dispatcher, None)
    }

    /// Starts a pump for callers whose tokens were minted by `caller`.
    pub fn bridge(dispatcher: Arc<Dispatcher>, caller: &Arc<Registry>) -> Arc<Self> {
        Self::start(dispatcher, Some(Arc::downgrade(caller)))
    }

    fn start(dispatcher: Arc<Dispatcher>, caller: Option<Weak<Registry>>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let pump = dispatcher.clone();

        tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    _ = &mut stop_rx => break,
                    next = rx.recv() => match next {
                        Some(envelope) => envelope,
                        None => break,
                    },
                };

                let dispatcher = pump.clone();
                tokio::spawn(async move {
                    let reply = dispatcher
                        .on_transact(&envelope.descriptor, envelope.id, &envelope.request)
                        .await;
                    // The caller may have given up; nothing to do then.
                    let _ = envelope.reply.send(reply);
                });
            }
            debug!(descriptor = %pump.descriptor(), "loopback pump stopped");
        });

        Arc::new(Self { tx, stop: Mutex::new(Some(stop_tx)), dispatcher, caller })
    }

    /// Stops the pump. Queued and later transactions fail as closed.
    pub fn shutdown(&self) {
        let stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
    }

    fn caller(&self) -> transport::Result<Option<Arc<Registry>>> {
        match &self.caller {
            None => Ok(None),
            Some(caller) => caller
                .upgrade()
                .map(Some)
                .ok_or_else(|| transport::Error::Closed("caller registry dropped".into())),
        }
    }
}

/// Moves every token in `buf` from the `from` table to the `to` table.
fn translate(buf: &mut [u8], from: &Registry, to: &Arc<Registry>) -> transact::Result<()> {
    transact::map_handles(buf, |token| Ok(to.adopt(&from.resolve(token)?).id()))
}

/// Answers for the far side when a token could not cross.
fn reject(descriptor: &InterfaceDescriptor, error: transact::Error) -> transport::Result<Vec<u8>> {
    warn!(descriptor = %descriptor, error = %error, "token translation failed");
    transact::encode_reply(descriptor, &Err(error), &Codec::default())
        .map_err(|e| transport::Error::Io(e.to_string()))
}

#[async_trait::async_trait]
impl Transport for Loopback {
    async fn send(
        &self,
        descriptor: &InterfaceDescriptor,
        id: TransactionId,
        mut request: Vec<u8>,
    ) -> transport::Result<Vec<u8>> {
        let caller = self.caller()?;
        let callee = self.dispatcher.registry();

        if let Some(caller) = &caller {
            if let Err(e) = translate(&mut request, caller, callee) {
                return reject(descriptor, e);
            }
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope { descriptor: descriptor.clone(), id, request, reply: reply_tx };

        self.tx
            .send(envelope)
            .map_err(|_| transport::Error::Closed("loopback pump stopped".into()))?;

        let mut reply = reply_rx.await.map_err(|_| transport::Error::Cancelled)?;

        if let Some(caller) = &caller {
            if let Err(e) = translate(&mut reply, callee, caller) {
                return reject(descriptor, e);
            }
        }
        Ok(reply)
    }

    fn local_dispatcher(&self) -> Option<Arc<Dispatcher>> {
        Some(self.dispatcher.clone())
    }
}
