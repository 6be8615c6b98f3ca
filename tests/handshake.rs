//! Cross-node scenarios driven through the pure state structs. Delivery is
//! simulated by handing one side's published payload to the other side's
//! handler, which is all the broker does for non-retained traffic.

use kidconnect::common::types::presence_bytes;
use kidconnect::common::{ControlPayload, GroupRecord, SessionPayload, Status};
use kidconnect::state::sessions::SessionEntry;
use kidconnect::state::{GroupRegistry, PresenceTracker, SessionNegotiator};

fn deliver(log_owner: &mut SessionNegotiator, chat_id: &str, payload: &SessionPayload) {
    let delivered = log_owner.append(chat_id, SessionEntry {
        sender: payload.sender.clone(),
        text: payload.text.clone(),
        sent_at: payload.sent_at,
    });
    assert!(delivered, "both sides must know session {chat_id}");
}

#[test]
fn request_accept_handshake_converges_on_one_topic() {
    let mut alice = SessionNegotiator::new("alice");
    let mut bob = SessionNegotiator::new("bob");

    // alice publishes {sender:"alice", messageMode:"private"} to
    // bob_Control; bob records it.
    alice.validate_target("bob").unwrap();
    bob.record_request("alice", 1_700_000_000_000);

    let pending = bob.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].sender, "alice");

    // bob accepts entry 1 and announces the derived topic.
    let (requester, chat_id) = bob.accept(1).unwrap();
    assert_eq!(requester, "alice");
    assert_eq!(chat_id, "alice_bob_1700000000000");

    // alice adopts the announced id verbatim, never computing her own.
    let announcement = ControlPayload::ChatConfirmation {
        sender: "bob".into(),
        chat_id: chat_id.clone(),
    };
    let ControlPayload::ChatConfirmation { sender, chat_id: announced } = announcement else {
        unreachable!()
    };
    alice.open_session(&announced, &sender);

    assert!(alice.is_session(&chat_id));
    assert!(bob.is_session(&chat_id));

    // alice says hi; bob's log gains the line.
    let hi = alice.compose(&chat_id, "hi", 10).unwrap();
    deliver(&mut bob, &chat_id, &hi);

    let bob_log = &bob.session(&chat_id).unwrap().log;
    assert_eq!(bob_log.len(), 1);
    assert_eq!(bob_log[0].sender, "alice");
    assert_eq!(bob_log[0].text, "hi");

    // One message from each side leaves both logs with exactly two
    // entries in send order.
    let hello = bob.compose(&chat_id, "hello back", 20).unwrap();
    deliver(&mut alice, &chat_id, &hello);

    for negotiator in [&alice, &bob] {
        let log = &negotiator.session(&chat_id).unwrap().log;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sender, "alice");
        assert_eq!(log[1].sender, "bob");
    }
}

#[test]
fn presence_converges_for_clean_and_unclean_exits() {
    // The graceful announce and the registered last will are produced by
    // the same serializer; a tracker fed either payload ends up in the
    // same terminal state.
    let graceful = presence_bytes("bob", Status::Offline);
    let last_will = presence_bytes("bob", Status::Offline);
    assert_eq!(graceful, last_will);

    let mut clean_observer = PresenceTracker::new();
    let mut crash_observer = PresenceTracker::new();
    clean_observer.record("bob", Status::Online);
    crash_observer.record("bob", Status::Online);
    assert_eq!(clean_observer.status("bob"), Some(Status::Online));

    clean_observer.record("bob", Status::Offline);
    crash_observer.record("bob", Status::Offline);
    assert_eq!(clean_observer.status("bob"), Some(Status::Offline));
    assert_eq!(crash_observer.status("bob"), Some(Status::Offline));
}

#[test]
fn group_record_round_trips_through_a_third_party_mirror() {
    let mut leader = GroupRegistry::new("x");
    leader.create("devs").unwrap();
    let published = leader.add_member("devs", "y").unwrap();
    assert_eq!(published.members, vec!["x", "y"]);

    // A third party applies the retained record and reproduces it exactly.
    let wire = serde_json::to_vec(&published).unwrap();
    let received: GroupRecord = serde_json::from_slice(&wire).unwrap();

    let mut observer = GroupRegistry::new("z");
    observer.update_local(received.clone());
    assert_eq!(observer.get("devs").unwrap().members, vec!["x", "y"]);

    // The retained echo back at the leader is an idempotent re-upsert.
    leader.update_local(received);
    assert_eq!(leader.get("devs").unwrap().members, vec!["x", "y"]);
    assert_eq!(leader.list().count(), 1);
}
