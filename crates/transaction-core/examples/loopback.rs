/**
 * Loopback Example
 *
 * Two transaction layers, "alice" and "bob", exchange messages through an
 * in-memory transport. It shows:
 *
 * 1. Alice creates an INVITE client transaction and sends the INVITE
 * 2. Bob's dispatcher creates an INVITE server transaction for it
 * 3. Bob answers 180 Ringing then 486 Busy Here from his message callback
 * 4. Alice's transaction builds the ACK, which completes Bob's transaction
 * 5. Both sides run a background scheduler until their transactions terminate
 *
 * To run this example with full logging:
 * ```
 * RUST_LOG=siptx_transaction_core=trace cargo run --example loopback
 * ```
 */

use std::sync::Arc;
use std::time::Duration;

use siptx_transaction_core::prelude::*;
use tokio::sync::mpsc;
use tracing::info;

/// Hands every sent message to the peer's inbox.
struct Loopback {
    peer: mpsc::UnboundedSender<SipMessage>,
}

impl Transport for Loopback {
    fn send(
        &self,
        transaction: &Transaction,
        message: &SipMessage,
        destination: &Destination,
    ) -> std::result::Result<(), TransportError> {
        info!(id = %transaction.id(), %destination, "{}", describe(message));
        self.peer
            .send(message.clone())
            .map_err(|_| TransportError::SendFailed("peer inbox closed".to_string()))
    }
}

fn describe(message: &SipMessage) -> String {
    match message {
        SipMessage::Request(request) => format!("--> {}", request.method),
        SipMessage::Response(response) => format!("<-- {} {}", response.status, response.reason),
    }
}

fn stack(peer: mpsc::UnboundedSender<SipMessage>, runtime: &Arc<StackRuntime>) -> Result<Arc<TransactionLayer>> {
    let config = TransactionLayerConfig::default()
        .with_t1(Duration::from_millis(50))
        .with_t2(Duration::from_millis(400))
        .with_t4(Duration::from_millis(500))
        .with_timer_d(Duration::from_millis(500));
    let layer = Arc::new(TransactionLayer::init(runtime.clone(), config)?);
    layer.set_transport(Loopback { peer });
    for kind in KillCallbackKind::ALL {
        layer.callbacks().set_kill_callback(kind, |kind, tx| {
            info!(id = %tx.id(), ?kind, "Transaction terminated");
        });
    }
    Ok(layer)
}

/// Feeds received messages into `layer`'s dispatcher.
fn pump(layer: Arc<TransactionLayer>, mut inbox: mpsc::UnboundedReceiver<SipMessage>) {
    tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            match layer.dispatch(SipEvent::incoming(message)) {
                Ok(Dispatch::Unmatched(event)) => info!(event = ?event.event_type, "Passed up to the dialog layer"),
                Ok(_) => {}
                Err(error) => info!(%error, "Discarded"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siptx_transaction_core=debug,loopback=info".into()),
        )
        .init();

    let runtime = Arc::new(StackRuntime::new());
    let (to_bob, bob_inbox) = mpsc::unbounded_channel();
    let (to_alice, alice_inbox) = mpsc::unbounded_channel();
    let alice = stack(to_bob, &runtime)?;
    let bob = stack(to_alice, &runtime)?;

    // Bob rings, then declines from inside his INVITE callback
    let responder = Arc::downgrade(&bob);
    bob.callbacks()
        .set_message_callback(MessageCallbackKind::IstInviteReceived, move |_, tx, message| {
            let (Some(bob), Some(invite)) = (responder.upgrade(), message.as_request()) else {
                return;
            };
            for (status, reason) in [(180, "Ringing"), (486, "Busy Here")] {
                let response = Response::for_request(invite, status, reason).with_to_tag("a6c85cf");
                if let Err(error) = bob.dispatch(SipEvent::outgoing(response).for_transaction(tx.id())) {
                    info!(%error, "Could not queue response");
                }
            }
        });
    alice.callbacks().set_message_callback_all(|kind, tx, message| {
        info!(id = %tx.id(), ?kind, "alice: {}", describe(message));
    });

    pump(alice.clone(), alice_inbox);
    pump(bob.clone(), bob_inbox);
    let schedulers = [
        spawn(alice.clone(), Duration::from_millis(5)),
        spawn(bob.clone(), Duration::from_millis(5)),
    ];

    let invite = Request::builder(Method::Invite, "sip:bob@biloxi.example.com")
        .via(Via::udp("pc33.atlanta.example.com", None).with_branch(alice.generate_branch()))
        .from(NameAddr::new("sip:alice@atlanta.example.com").with_tag("1928301774"))
        .to(NameAddr::new("sip:bob@biloxi.example.com"))
        .call_id(format!("{}@pc33.atlanta.example.com", alice.generate_branch()))
        .cseq(314159, Method::Invite)
        .build();
    let mut event = SipEvent::outgoing(invite);
    let tx = alice.create_transaction(&mut event)?;
    alice.dispatch(event)?;

    while TransactionKind::ALL
        .iter()
        .any(|kind| alice.transaction_count(*kind) + bob.transaction_count(*kind) > 0)
    {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    info!(id = %tx.id(), state = ?tx.state(), "Call attempt finished");

    for scheduler in schedulers {
        scheduler.shutdown().await;
    }
    Ok(())
}
