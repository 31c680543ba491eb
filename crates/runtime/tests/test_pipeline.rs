//! Pipeline tests: parse, operate, emit
//!
//! These run the whole data path the way an application would: JSON
//! text in through the adapter, the collection algebra over the
//! resulting tree, and text back out, checking losslessness along the
//! way.

use std::io::Write;
use strata_runtime::{
    Builder, EmitConfig, Event, EventSource, Generic, JsonSink, JsonSource, OpCode, OpFlags,
    OpRequest, ParseConfig, ParseFlags, Schema, VecSink, compare, decode, emit, execute,
    execute_local,
};

/// Opt-in log output for debugging test runs (`RUST_LOG=trace`).
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn json_builder() -> Builder {
    init_tracing();
    Builder::with_schema(Schema::Json)
}

fn parse_json(b: &Builder, text: &str) -> Generic {
    let mut source = JsonSource::from_str(text).unwrap();
    decode(
        b,
        &mut source,
        &ParseConfig {
            flags: ParseFlags::DISABLE_DIRECTORY,
            ..ParseConfig::default()
        },
    )
}

fn render_json(b: &Builder, v: Generic) -> String {
    let mut sink = JsonSink::compact();
    emit(v, b.schema(), &EmitConfig::default(), &mut sink).unwrap();
    sink.into_string()
}

#[test]
fn test_emit_parse_round_trip() {
    let b = json_builder();
    let text = r#"{"service":"api","port":8080,"ratio":0.5,"tags":["blue","green"],"meta":{"owner":null,"active":true}}"#;
    let v1 = parse_json(&b, text);
    assert!(!v1.is_invalid());
    let rendered = render_json(&b, v1);
    let v2 = parse_json(&b, &rendered);
    assert_eq!(compare(v1, v2), 0);
}

#[test]
fn test_parse_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"from": "disk", "n": 3}}"#).unwrap();

    let b = json_builder();
    let mut source = JsonSource::from_file(file.path()).unwrap();
    let v = decode(
        &b,
        &mut source,
        &ParseConfig {
            flags: ParseFlags::DISABLE_DIRECTORY,
            ..ParseConfig::default()
        },
    );
    let pairs = v.mapping_pairs().unwrap();
    assert_eq!(pairs[0].value.as_str(), Some("disk"));
    assert_eq!(pairs[1].value.get_int(), Some(3));
}

#[test]
fn test_operate_then_emit() {
    let b = json_builder();
    let v = parse_json(&b, r#"{"xs": [5, 3, 1, 4, 2, 3]}"#);

    let path = [b.string("xs")];
    let xs = execute(&b, v, &mut OpRequest::new(OpCode::GetAtPath).items(&path));

    let unique = execute(&b, xs, &mut OpRequest::new(OpCode::Unique));
    let sorted = execute(&b, unique, &mut OpRequest::new(OpCode::Sort { cmp: None }));
    let updated = execute(
        &b,
        v,
        &mut OpRequest::new(OpCode::Set {
            key: b.string("xs"),
            value: sorted,
        }),
    );
    assert_eq!(render_json(&b, updated), r#"{"xs":[1,2,3,4,5]}"#);
}

#[test]
fn test_scratch_pipeline_discards_temporaries() {
    let b = json_builder();
    let v = parse_json(&b, r#"[10, 11, 12, 13, 14, 15, 16, 17, 18, 19]"#);
    let before = b.used();

    let doubled = execute_local(
        &b,
        v,
        &mut OpRequest::new(OpCode::Map {
            f: &|scratch: &Builder, item: Generic| {
                scratch.int(item.get_int().unwrap() * 2)
            },
        }),
    );
    let items = doubled.sequence_items().unwrap();
    assert_eq!(items.len(), 10);
    assert_eq!(items[9].get_int(), Some(38));
    assert!(b.contains(doubled));
    // Only the published result landed in this builder's tag.
    assert!(b.used() > before);
}

#[test]
fn test_directory_round_trip_through_events() {
    use strata_runtime::emit_directory;

    let b = Builder::with_schema(Schema::Yaml1_2Core);
    let mut source = strata_runtime::VecSource::new(vec![
        Event::StreamStart,
        Event::DocumentStart(strata_runtime::DocumentState {
            version: Some(strata_runtime::VersionDirective { major: 1, minor: 2 }),
            version_explicit: true,
            ..Default::default()
        }),
        Event::plain_scalar("alpha"),
        Event::DocumentEnd,
        Event::DocumentStart(Default::default()),
        Event::plain_scalar("beta"),
        Event::DocumentEnd,
        Event::StreamEnd,
    ]);
    let dir = decode(&b, &mut source, &ParseConfig::default());
    assert!(!dir.is_invalid());

    let mut sink = VecSink::new();
    emit_directory(dir, b.schema(), &EmitConfig::default(), &mut sink).unwrap();

    // The replayed stream reconstructs both documents and the version
    // directive of the first.
    let replayed = sink.events;
    let versions: Vec<_> = replayed
        .iter()
        .filter_map(|e| match e {
            Event::DocumentStart(state) => Some(state.version),
            _ => None,
        })
        .collect();
    assert_eq!(versions.len(), 2);
    assert_eq!(
        versions[0],
        Some(strata_runtime::VersionDirective { major: 1, minor: 2 })
    );
    assert!(replayed.contains(&Event::plain_scalar("alpha")));
    assert!(replayed.contains(&Event::plain_scalar("beta")));

    // And decoding the replay lands on an equal directory.
    let mut source = strata_runtime::VecSource::new(replayed);
    let dir2 = decode(&b, &mut source, &ParseConfig::default());
    assert_eq!(compare(dir, dir2), 0);
}

#[test]
fn test_yaml_shaped_events_with_anchors() {
    use strata_runtime::{CollectionStart, ScalarEvent, VecSource};

    let b = Builder::with_schema(Schema::Yaml1_1);
    // defaults: &base {retries: 2}; service inherits via alias.
    let mut source = VecSource::document(vec![
        Event::MappingStart(CollectionStart::default()),
        Event::plain_scalar("defaults"),
        Event::MappingStart(CollectionStart {
            anchor: Some("base".into()),
            ..CollectionStart::default()
        }),
        Event::plain_scalar("retries"),
        Event::plain_scalar("2"),
        Event::MappingEnd,
        Event::plain_scalar("service"),
        Event::Alias("base".into()),
        Event::Scalar(ScalarEvent {
            value: "enabled".into(),
            ..ScalarEvent::default()
        }),
        Event::plain_scalar("on"),
        Event::MappingEnd,
    ]);
    let v = decode(
        &b,
        &mut source,
        &ParseConfig {
            flags: ParseFlags::DISABLE_DIRECTORY,
            ..ParseConfig::default()
        },
    );
    let service_retries = [b.string("service"), b.string("retries")];
    let got = execute(
        &b,
        v,
        &mut OpRequest::new(OpCode::GetAtPath).items(&service_retries),
    );
    assert_eq!(got.get_int(), Some(2));

    // YAML 1.1 classifies "on" as a boolean.
    let enabled = [b.string("enabled")];
    let got = execute(&b, v, &mut OpRequest::new(OpCode::GetAtPath).items(&enabled));
    assert_eq!(got.get_bool(), Some(true));
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_pipeline_matches_sequential() {
    let b = json_builder();
    let numbers: Vec<String> = (0..500).map(|i| i.to_string()).collect();
    let text = format!("[{}]", numbers.join(","));
    let v = parse_json(&b, &text);

    let square = |w: &Builder, item: Generic| {
        let n = item.get_int().unwrap();
        w.int(n * n)
    };
    let sequential = execute(&b, v, &mut OpRequest::new(OpCode::Map { f: &square }));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap();
    let parallel = execute(
        &b,
        v,
        &mut OpRequest::new(OpCode::Map { f: &square })
            .flags(OpFlags::PARALLEL)
            .pool(&pool),
    );
    assert_eq!(compare(sequential, parallel), 0);

    let add = |w: &Builder, acc: Generic, item: Generic| {
        w.int(acc.get_int().unwrap() + item.get_int().unwrap())
    };
    let total = execute(
        &b,
        parallel,
        &mut OpRequest::new(OpCode::Reduce {
            f: &add,
            init: b.int(0),
        })
        .flags(OpFlags::PARALLEL)
        .pool(&pool),
    );
    let expected: i64 = (0..500i64).map(|n| n * n).sum();
    assert_eq!(total.get_int(), Some(expected));
}

#[test]
fn test_exhausted_source_is_not_a_panic() {
    struct Broken;
    impl EventSource for Broken {
        fn next_event(&mut self) -> Result<Option<Event>, strata_runtime::ErrorKind> {
            Err(strata_runtime::ErrorKind::IoError)
        }
    }
    let b = json_builder();
    let v = decode(&b, &mut Broken, &ParseConfig::default());
    assert!(v.is_invalid());
}
