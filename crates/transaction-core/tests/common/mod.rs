// Shared fixtures for the transaction layer integration tests
//
// Messages follow the RFC 3261 §24 call flow between alice@atlanta and
// bob@biloxi. A `Recorder` stands in for the transport and captures every
// callback the layer raises, so tests can assert on what was sent and
// delivered without touching the network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use siptx_transaction_core::{
    Destination, KillCallbackKind, MessageCallbackKind, Method, NameAddr, Request, Response,
    SipMessage, StackRuntime, Transaction, TransactionId, TransactionLayer,
    TransactionLayerConfig, Transport, TransportError, TransportErrorCallbackKind, Via,
};

static TRACING: Once = Once::new();

/// Installs a test subscriber once; honours RUST_LOG.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const ALICE: &str = "sip:alice@atlanta.example.com";
pub const BOB: &str = "sip:bob@biloxi.example.com";

pub fn invite(branch: &str) -> Request {
    request(Method::Invite, BOB, Via::udp("pc33.atlanta.example.com", None).with_branch(branch))
}

pub fn invite_tcp(branch: &str) -> Request {
    request(Method::Invite, BOB, Via::tcp("pc33.atlanta.example.com", None).with_branch(branch))
}

pub fn options(branch: &str) -> Request {
    request(Method::Options, BOB, Via::udp("pc33.atlanta.example.com", None).with_branch(branch))
}

pub fn request(method: Method, uri: &str, via: Via) -> Request {
    Request::builder(method.clone(), uri)
        .via(via)
        .from(NameAddr::new(ALICE).with_tag("1928301774"))
        .to(NameAddr::new(BOB))
        .call_id("a84b4c76e66710@pc33.atlanta.example.com")
        .cseq(314159, method)
        .build()
}

/// ACK for a non-2xx final response, as the client transaction would send it.
pub fn ack_for(invite: &Request, response: &Response) -> Request {
    let mut ack = invite.clone();
    ack.method = Method::Ack;
    if let Some(cseq) = ack.headers.cseq.as_mut() {
        cseq.method = Method::Ack;
    }
    ack.headers.to = response.headers.to.clone();
    ack
}

pub fn response(request: &Request, status: u16, reason: &str) -> Response {
    Response::for_request(request, status, reason).with_to_tag("a6c85cf")
}

/// Transport and callback capture in one place.
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<(SipMessage, Destination)>>,
    messages: Mutex<Vec<(MessageCallbackKind, SipMessage)>>,
    kills: Mutex<Vec<(KillCallbackKind, TransactionId)>>,
    transport_errors: Mutex<Vec<(TransportErrorCallbackKind, TransportError)>>,
    fail_sends: AtomicBool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wires the recorder into `layer` as transport and as every callback.
    pub fn attach(self: &Arc<Self>, layer: &TransactionLayer) {
        layer.set_transport_arc(self.clone());

        let recorder = self.clone();
        layer
            .callbacks()
            .set_message_callback_all(move |kind, _tx, message| {
                recorder.messages.lock().unwrap().push((kind, message.clone()));
            });
        for kind in KillCallbackKind::ALL {
            let recorder = self.clone();
            layer.callbacks().set_kill_callback(kind, move |kind, tx| {
                recorder.kills.lock().unwrap().push((kind, tx.id()));
            });
        }
        for kind in TransportErrorCallbackKind::ALL {
            let recorder = self.clone();
            layer
                .callbacks()
                .set_transport_error_callback(kind, move |kind, _tx, error| {
                    recorder.transport_errors.lock().unwrap().push((kind, error.clone()));
                });
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(SipMessage, Destination)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn message_kinds(&self) -> Vec<MessageCallbackKind> {
        self.messages.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }

    pub fn messages_of(&self, kind: MessageCallbackKind) -> Vec<SipMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn kills(&self) -> Vec<(KillCallbackKind, TransactionId)> {
        self.kills.lock().unwrap().clone()
    }

    pub fn transport_errors(&self) -> Vec<(TransportErrorCallbackKind, TransportError)> {
        self.transport_errors.lock().unwrap().clone()
    }
}

impl Transport for Recorder {
    fn send(
        &self,
        _transaction: &Transaction,
        message: &SipMessage,
        destination: &Destination,
    ) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("connection refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((message.clone(), destination.clone()));
        Ok(())
    }
}

/// A layer with default timers and a fresh recorder attached.
pub fn layer() -> (TransactionLayer, Arc<Recorder>) {
    init_tracing();
    let layer = TransactionLayer::init(Arc::new(StackRuntime::new()), TransactionLayerConfig::default())
        .expect("default configuration is valid");
    let recorder = Recorder::new();
    recorder.attach(&layer);
    (layer, recorder)
}

/// One scheduler tick: timer pass then execute pass.
pub fn tick(layer: &TransactionLayer) {
    layer.timers_execute_all();
    layer.execute_all();
}
