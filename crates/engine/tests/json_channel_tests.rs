//! Integration tests for the structured-text channel

use std::sync::Arc;

use serde_json::json;
use sqlbridge_engine::{
    control, ChannelConfig, ChannelState, Error, Field, FieldType, JsonChannel, JsonCodec,
    Message, MessageSchema, Msg, OpenParams, PredicateTyping, RecordCodec,
};
use sqlbridge_storage::Connection;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn scheme() -> MessageSchema {
    let header = Arc::new(
        Message::builder("header", 0)
            .key("s0")
            .field(Field::new("s0", FieldType::Int8))
            .field(Field::string("s1"))
            .build(),
    );
    let msg = Message::builder("msg", 10)
        .key("header.s0")
        .field(Field::message("header", Arc::clone(&header)))
        .field(Field::new("f0", FieldType::Int8))
        .field(Field::new("f1", FieldType::Double))
        .build();
    MessageSchema::new(vec![header, Arc::new(msg)]).unwrap()
}

struct Fixture {
    _dir: TempDir,
    path: String,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db").to_str().unwrap().to_string();
        Fixture { _dir: dir, path }
    }

    fn config(&self, props: &[(&str, &str)]) -> ChannelConfig {
        ChannelConfig::new(self.path.clone())
            .with_table("test")
            .with_props(props.iter().copied())
            .unwrap()
    }

    fn channel(&self, props: &[(&str, &str)]) -> JsonChannel {
        JsonChannel::new(self.config(props), scheme()).unwrap()
    }

    fn db(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }
}

/// Records used by the query tests; the first two share `header.s0`
fn samples(schema: &MessageSchema) -> Vec<Vec<u8>> {
    let msg = schema.by_name("msg").unwrap();
    [
        json!({"header": {"s0": 10, "s1": "first"}, "f0": 1, "f1": 10.1}),
        json!({"header": {"s0": 10, "s1": "second"}, "f0": 1, "f1": 11.1}),
        json!({"header": {"s0": 20, "s1": "first"}, "f0": 1, "f1": 20.1}),
    ]
    .iter()
    .map(|v| JsonCodec.decode(msg, v.to_string().as_bytes()).unwrap())
    .collect()
}

fn write_samples(fx: &Fixture) -> Vec<Vec<u8>> {
    let schema = scheme();
    let records = samples(&schema);
    let mut writer = fx.channel(&[("dir", "w")]);
    writer.open(&OpenParams::new()).unwrap();
    for (seq, record) in records.iter().enumerate() {
        writer
            .post(&Msg::data(10, seq as i64, record.clone()))
            .unwrap();
    }
    writer.close();
    records
}

fn drain(channel: &mut JsonChannel) -> Vec<Msg> {
    let mut out = Vec::new();
    while let Some(msg) = channel.process().unwrap() {
        out.push(msg);
    }
    out
}

// ============================================================================
// Write Tests
// ============================================================================

#[test]
fn test_rows_are_encoded_and_keyed() {
    let fx = Fixture::new();
    write_samples(&fx);

    let db = fx.db();
    let mut stmt = db
        .prepare("SELECT seq, name, data FROM test ORDER BY rowid")
        .unwrap();
    let rows: Vec<(i64, String, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].0, rows[0].1.as_str()), (1, "msg"));
    assert_eq!(rows[1].0, 2);
    let data: serde_json::Value = serde_json::from_str(&rows[0].2).unwrap();
    assert_eq!(data["header"]["s1"], "second");
    assert_eq!(data["f1"], 11.1);

    let indices: i64 = db
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'index' AND name = 'json_4_test_msg'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(indices, 1);
}

#[test]
fn test_control_messages_ignored() {
    let fx = Fixture::new();
    let mut c = fx.channel(&[("dir", "w")]);
    c.open(&OpenParams::new()).unwrap();
    c.post(&control::end_of_data()).unwrap();
    assert_eq!(c.pending_writes(), 0);
}

#[test]
fn test_rejected_posts() {
    let fx = Fixture::new();
    let mut c = fx.channel(&[("dir", "w")]);
    assert!(matches!(
        c.post(&Msg::data(10, 0, Vec::new())),
        Err(Error::InvalidState(_))
    ));
    c.open(&OpenParams::new()).unwrap();
    assert!(matches!(
        c.post(&Msg::data(0, 0, Vec::new())),
        Err(Error::UnknownMessage(_))
    ));
    assert!(matches!(
        c.post(&Msg::data(42, 0, Vec::new())),
        Err(Error::UnknownMessage(_))
    ));
    // shorter than the fixed region
    assert!(matches!(
        c.post(&Msg::data(10, 0, vec![0; 3])),
        Err(Error::Codec { .. })
    ));
}

#[test]
fn test_read_only_post_rejected() {
    let fx = Fixture::new();
    write_samples(&fx);
    let record = samples(&scheme()).remove(0);

    let mut c = fx.channel(&[("dir", "r")]);
    c.open(&OpenParams::new()).unwrap();
    let err = c.post(&Msg::data(10, 5, record)).unwrap_err();
    assert!(matches!(err, Error::InvalidState(ref m) if m.contains("inserts not enabled")));
}

#[test]
fn test_table_required() {
    let fx = Fixture::new();
    let config = ChannelConfig::new(fx.path.clone());
    assert!(matches!(
        JsonChannel::new(config, scheme()),
        Err(Error::Config { ref key, .. }) if key == "table"
    ));
}

#[test]
fn test_bulk_commit() {
    let fx = Fixture::new();
    let schema = scheme();
    let msg = schema.by_name("msg").unwrap();
    let mut c = fx.channel(&[("dir", "w"), ("bulk-size", "4")]);
    c.open(&OpenParams::new()).unwrap();
    let db = fx.db();
    let count = |db: &Connection| -> i64 {
        db.query_row("SELECT count(*) FROM test", [], |r| r.get(0))
            .unwrap()
    };

    for i in 0..6i64 {
        let payload = json!({"header": {"s0": i}, "f0": i});
        let record = JsonCodec.decode(msg, payload.to_string().as_bytes()).unwrap();
        c.post(&Msg::data(10, i, record)).unwrap();
    }
    assert_eq!(count(&db), 4);
    assert_eq!(c.pending_writes(), 2);
    c.flush().unwrap();
    assert_eq!(count(&db), 6);
}

// ============================================================================
// Replay Tests
// ============================================================================

#[test]
fn test_query_filters() {
    let cases: Vec<(Vec<(&str, &str)>, Vec<usize>)> = vec![
        (vec![], vec![1, 2]),
        (vec![("query", "msg")], vec![1, 2]),
        (vec![("query.header.s1", "first")], vec![2]),
        (vec![("query.header.s1", "second")], vec![1]),
        (vec![("query", "msg"), ("query.f0", "1")], vec![1, 2]),
        (vec![("query", "msg"), ("query.header.s0", "10")], vec![1]),
    ];

    for (props, expected) in cases {
        let fx = Fixture::new();
        let records = write_samples(&fx);

        let mut reader = fx.channel(&[("dir", "r"), ("autoclose", "yes")]);
        reader
            .open(&OpenParams::from_props(props.iter().copied()).unwrap())
            .unwrap();
        let out = drain(&mut reader);

        let (data, ctrl): (Vec<_>, Vec<_>) = out.into_iter().partition(|m| m.is_data());
        assert_eq!(ctrl.len(), 1, "props {:?}", props);
        assert!(control::is_end_of_data(&ctrl[0]));
        let seqs: Vec<usize> = data.iter().map(|m| m.seq as usize).collect();
        assert_eq!(seqs, expected, "props {:?}", props);
        for m in &data {
            assert_eq!(m.msgid, 10);
            assert_eq!(m.data, records[m.seq as usize]);
        }
        assert_eq!(reader.state(), ChannelState::Closed);
    }
}

#[test]
fn test_predicate_typing() {
    let fx = Fixture::new();
    write_samples(&fx);

    let mut c = fx.channel(&[("dir", "r")]);
    c.open(&OpenParams::new().with_filter("header.s0", "10"))
        .unwrap();
    assert_eq!(c.predicate_typing(), Some(PredicateTyping::Untyped));
    // integer payload value never equals the text '10'
    let out = drain(&mut c);
    assert_eq!(out.len(), 1);
    assert!(control::is_end_of_data(&out[0]));
    // not read-only with autoclose, so the channel stays open
    assert_eq!(c.state(), ChannelState::Active);
    assert!(!c.is_replaying());
    assert!(c.process().unwrap().is_none());
    c.close();

    c.open(
        &OpenParams::new()
            .with_query("msg")
            .with_filter("header.s0", "10"),
    )
    .unwrap();
    assert_eq!(c.predicate_typing(), Some(PredicateTyping::Typed));
    let out = drain(&mut c);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].seq, 1);
}

#[test]
fn test_invalid_query() {
    let fx = Fixture::new();
    write_samples(&fx);

    let mut c = fx.channel(&[("dir", "r")]);
    let err = c.open(&OpenParams::new().with_query("missing")).unwrap_err();
    assert!(matches!(err, Error::UnknownMessage(_)));
    assert_eq!(c.state(), ChannelState::Closed);

    let err = c
        .open(&OpenParams::new().with_query("msg").with_filter("f0", "one"))
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    let err = c
        .open(&OpenParams::new().with_query("msg").with_filter("f0.x", "1"))
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[test]
fn test_write_only_does_not_replay() {
    let fx = Fixture::new();
    write_samples(&fx);

    let mut c = fx.channel(&[("dir", "w")]);
    c.open(&OpenParams::new()).unwrap();
    assert!(!c.is_replaying());
    assert!(c.process().unwrap().is_none());
}

#[test]
fn test_read_write_replays_existing_rows() {
    let fx = Fixture::new();
    write_samples(&fx);

    let mut c = fx.channel(&[("dir", "rw"), ("autoclose", "yes")]);
    c.open(&OpenParams::new()).unwrap();
    let out = drain(&mut c);
    assert_eq!(out.len(), 3);
    assert_eq!(c.state(), ChannelState::Active);
}

#[test]
fn test_empty_table_single_end_of_data() {
    let fx = Fixture::new();
    let mut c = fx.channel(&[]);
    c.open(&OpenParams::new()).unwrap();
    let out = drain(&mut c);
    assert_eq!(out.len(), 1);
    assert!(control::is_end_of_data(&out[0]));
}

#[test]
fn test_empty_payload() {
    let fx = Fixture::new();
    write_samples(&fx);
    fx.db()
        .execute(
            "INSERT INTO test(seq, name, data) VALUES (7, 'msg', NULL)",
            [],
        )
        .unwrap();

    let mut c = fx.channel(&[("dir", "r")]);
    c.open(&OpenParams::new().with_query("msg")).unwrap();
    let out = drain(&mut c);
    assert_eq!(out.len(), 4);
    assert_eq!((out[2].msgid, out[2].seq), (10, 7));
    assert!(out[2].data.is_empty());
}

#[test]
fn test_bad_rows() {
    let fx = Fixture::new();
    write_samples(&fx);
    fx.db()
        .execute("INSERT INTO test(seq, name, data) VALUES (8, '', '{}')", [])
        .unwrap();

    let mut c = fx.channel(&[("dir", "r")]);
    c.open(&OpenParams::new()).unwrap();
    assert!(c.process().unwrap().unwrap().is_data());
    assert!(c.process().unwrap().unwrap().is_data());
    let err = c.process().unwrap_err();
    assert!(matches!(err, Error::Extract { ref reason, .. } if reason.contains("seq 8")));

    let fx = Fixture::new();
    write_samples(&fx);
    fx.db()
        .execute(
            "INSERT INTO test(seq, name, data) VALUES (9, 'other', '{}')",
            [],
        )
        .unwrap();
    let mut c = fx.channel(&[("dir", "r")]);
    c.open(&OpenParams::new()).unwrap();
    drain_until_error(&mut c);
}

fn drain_until_error(c: &mut JsonChannel) {
    loop {
        match c.process() {
            Ok(Some(m)) => assert!(m.is_data()),
            Ok(None) => panic!("replay finished without an error"),
            Err(e) => {
                assert!(matches!(e, Error::Extract { .. }));
                return;
            }
        }
    }
}

// ============================================================================
// Child Reader Tests
// ============================================================================

#[test]
fn test_child_reader() {
    let fx = Fixture::new();
    let schema = scheme();
    let records = samples(&schema);

    let mut c = fx.channel(&[("dir", "rw")]);
    c.open(&OpenParams::new()).unwrap();
    for (seq, record) in records.iter().enumerate() {
        c.post(&Msg::data(10, seq as i64, record.clone())).unwrap();
    }
    c.flush().unwrap();

    let params = OpenParams::new()
        .with_query("msg")
        .with_filter("header.s1", "first");
    let mut reader = c.reader(&params).unwrap();
    assert_eq!(reader.predicate_typing(), Some(PredicateTyping::Typed));
    let first = reader.process().unwrap().unwrap();
    assert_eq!(first.seq, 2);
    assert_eq!(first.data, records[2]);
    assert!(control::is_end_of_data(&reader.process().unwrap().unwrap()));
    assert!(!reader.is_replaying());
    assert!(reader.process().unwrap().is_none());

    // the channel's own replay is independent of the reader
    let out = drain(&mut c);
    assert_eq!(out.len(), 3);
}

#[test]
fn test_child_reader_requires_open_channel() {
    let fx = Fixture::new();
    let c = fx.channel(&[]);
    assert!(matches!(
        c.reader(&OpenParams::new()),
        Err(Error::InvalidState(_))
    ));
}
