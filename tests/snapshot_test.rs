//! Snapshot encoding: the persisted JSON shape and tolerant decoding.

use chrono::{DateTime, TimeZone, Utc};
use disco_rs::engine::{Ledger, Snapshot};
use disco_rs::mail::EmailAddress;
use disco_rs::workflows::lunchtime;
use disco_rs::workflows::saturday::{self, State};
use proptest::prelude::*;

type SaturdaySnapshot = Snapshot<State, saturday::Payload>;

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 16, 0, 0).unwrap()
}

#[test]
fn payload_fields_sit_at_the_top_level() {
    let mut snapshot =
        SaturdaySnapshot::new(State::InviteSent, anchor(), saturday::Payload::default());
    snapshot
        .payload
        .participants
        .update_count(&EmailAddress::new("Ann <ann@example.com>"), 2, None);
    snapshot.processed_event_ids.record("m-1");

    let value: serde_json::Value = serde_json::from_slice(&snapshot.encode().unwrap()).unwrap();
    assert_eq!(value["state"], "invite_sent");
    assert_eq!(value["reference_time"], "2026-10-17T16:00:00Z");
    assert_eq!(value["next_event"], serde_json::Value::Null);
    assert_eq!(value["participants"][0]["address"], "Ann <ann@example.com>");
    assert_eq!(value["participants"][0]["count"], 2);
    assert_eq!(value["processed_email_ids"], serde_json::json!(["m-1"]));
}

#[test]
fn unknown_fields_and_missing_defaults_are_tolerated() {
    let bytes = br#"{
        "state": "badger_sent",
        "reference_time": "2026-10-17T16:00:00Z",
        "schema": 3
    }"#;
    let snapshot = SaturdaySnapshot::decode(bytes).unwrap();
    assert_eq!(snapshot.state, State::BadgerSent);
    assert_eq!(snapshot.next_event, None);
    assert!(snapshot.payload.participants.is_empty());
    assert!(snapshot.processed_event_ids.is_empty());
}

#[test]
fn unknown_state_does_not_decode() {
    let bytes = br#"{"state":"dancing","reference_time":"2026-10-17T16:00:00Z"}"#;
    assert!(SaturdaySnapshot::decode(bytes).is_err());
    let bytes = br#"{"state":"pending"}"#;
    assert!(SaturdaySnapshot::decode(bytes).is_err());
}

#[test]
fn lunchtime_payload_keeps_its_optional_fields_out_when_unset() {
    let snapshot = Snapshot::new(
        lunchtime::State::Pending,
        anchor(),
        lunchtime::Payload {
            guid: "g".into(),
            boss_guid: "b".into(),
            ..lunchtime::Payload::default()
        },
    );
    let value: serde_json::Value = serde_json::from_slice(&snapshot.encode().unwrap()).unwrap();
    assert_eq!(value["guid"], "g");
    assert!(value.get("thread_email").is_none());
    assert!(value.get("game_on_game_key").is_none());

    let mut with_game = snapshot.clone();
    with_game.payload.game_on_game_key = Some(lunchtime::GameKey::K);
    let encoded = with_game.encode().unwrap();
    let decoded = Snapshot::<lunchtime::State, lunchtime::Payload>::decode(&encoded).unwrap();
    assert_eq!(decoded.payload.game_on_game_key, Some(lunchtime::GameKey::K));
}

#[test]
fn ledger_records_each_id_once() {
    let mut ledger = Ledger::default();
    ledger.record("a");
    ledger.record("b");
    ledger.record("a");
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.iter().collect::<Vec<_>>(), vec!["a", "b"]);

    let collected: Ledger = ["x", "y", "x"].into_iter().collect();
    assert_eq!(collected.len(), 2);
    assert!(collected.contains("y"));
}

proptest! {
    /// Whatever the engine writes, recovery reads back unchanged, however
    /// long the ledger has grown.
    #[test]
    fn encoded_snapshots_decode_to_themselves(
        state in prop::sample::select(State::ALL.to_vec()),
        next_offset in proptest::option::of(-86_400i64..604_800),
        counts in proptest::collection::vec(0u32..5, 0..20),
        ids in proptest::collection::vec("[a-z0-9<>@.-]{1,40}", 0..500),
    ) {
        let mut snapshot = SaturdaySnapshot::new(state, anchor(), saturday::Payload::default());
        snapshot.next_event = next_offset.map(|secs| anchor() + chrono::Duration::seconds(secs));
        for (i, count) in counts.iter().enumerate() {
            snapshot
                .payload
                .participants
                .update_count(&EmailAddress::new(format!("p{i}@example.com")), *count, None);
        }
        snapshot.processed_event_ids = ids.into_iter().collect();

        let decoded = SaturdaySnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, snapshot);
    }
}
