//! Sequential overlay across files and formats.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{Conf, DbConfig, write_file};
use crate::decode::{DecodeError, Format};
use crate::error::{ConfigError, ErrorKind, Origin};
use crate::loader::{Loader, Source};

const A_YML: &str = "## a.yml
domain: example.com
db:
  master:  rw@/example
  slave:   ro@/example
  timeout: 0.5s
";

const B_YML: &str = "## b.yml
is_dev: true
";

const C_YML: &str = "## c.yml
db:
  master:  rw@/example2
  slave:   ro@/example2
  timeout: 200ms
";

fn expected_a() -> Conf {
    Conf {
        domain: "example.com".to_string(),
        is_dev: false,
        timeout: Duration::ZERO,
        db: DbConfig {
            master: "rw@/example".to_string(),
            slave: "ro@/example".to_string(),
            timeout: Duration::from_millis(500),
        },
    }
}

#[test]
fn test_load_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(&dir, "a.yml", A_YML);

    let mut conf = Conf::default();
    Loader::new().load(&mut conf, [&a]).unwrap();
    assert_eq!(conf, expected_a());
}

#[test]
fn test_later_files_override_earlier() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(&dir, "a.yml", A_YML);
    let b = write_file(&dir, "b.yml", B_YML);
    let c = write_file(&dir, "c.yml", C_YML);
    let loader = Loader::new();

    let mut two = Conf::default();
    loader.load(&mut two, [&a, &b]).unwrap();
    let mut expected = expected_a();
    expected.is_dev = true;
    assert_eq!(two, expected);

    let mut three = Conf::default();
    loader.load(&mut three, [&a, &b, &c]).unwrap();
    expected.db = DbConfig {
        master: "rw@/example2".to_string(),
        slave: "ro@/example2".to_string(),
        timeout: Duration::from_millis(200),
    };
    assert_eq!(three, expected);
}

#[test]
fn test_missing_file_names_the_path_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(&dir, "a.yml", A_YML);
    let c = write_file(&dir, "c.yml", C_YML);
    let missing = dir.path().join("nothing.yml");

    let mut conf = Conf::default();
    let err = Loader::new().load(&mut conf, [&a, &missing, &c]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceRead);
    assert_eq!(err.origin(), Some(&Origin::Path(missing.clone())));
    assert!(err.to_string().contains("nothing.yml"));
    // a.yml stays applied, c.yml is never read.
    assert_eq!(conf, expected_a());
}

#[test]
fn test_malformed_yaml_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let err_file = write_file(&dir, "err.yml", "## err.yml\ndb:\n  master  rw@/example2\n");

    let mut conf = Conf::default();
    let err = Loader::new().load(&mut conf, [&err_file]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(err.to_string().contains("err.yml"));
    assert_eq!(conf, Conf::default());
}

#[test]
fn test_load_json_and_toml_files() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Loader::new();

    let a = write_file(&dir, "a.json", r#"{"foo": "bar"}"#);
    let b = write_file(&dir, "b.json", r#"{"bar": "baz"}"#);
    let mut from_json: HashMap<String, String> = HashMap::new();
    loader.load_json(&mut from_json, [&a, &b]).unwrap();
    assert_eq!(from_json["foo"], "bar");
    assert_eq!(from_json["bar"], "baz");

    let a = write_file(&dir, "a.toml", "foo = \"bar\"\n");
    let b = write_file(&dir, "b.toml", "bar = \"baz\"\nfoo = \"qux\"\n");
    let mut from_toml: HashMap<String, String> = HashMap::new();
    loader.load_toml(&mut from_toml, [&a, &b]).unwrap();
    assert_eq!(from_toml["foo"], "qux");
    assert_eq!(from_toml["bar"], "baz");
}

#[test]
fn test_plain_load_leaves_template_text_alone() {
    let mut conf: HashMap<String, String> = HashMap::new();
    Loader::new()
        .load_bytes(&mut conf, b"foo: '{{ env \"FOO\" }}'")
        .unwrap();
    assert_eq!(conf["foo"], "{{ env \"FOO\" }}");
}

#[test]
fn test_load_sources_mixes_paths_and_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(&dir, "a.yml", A_YML);

    let mut conf = Conf::default();
    Loader::new()
        .load_sources(
            &mut conf,
            Format::Yaml,
            false,
            [Source::from(a), Source::from(b"is_dev: true\n".to_vec())],
        )
        .unwrap();
    assert!(conf.is_dev);
    assert_eq!(conf.domain, "example.com");
}

#[test]
fn test_buffer_origin_is_its_position() {
    let mut conf = Conf::default();
    let err = Loader::new()
        .load_sources(
            &mut conf,
            Format::Json,
            false,
            [
                Source::Bytes(br#"{"domain": "ok"}"#.to_vec()),
                Source::Bytes(b"{ not json".to_vec()),
            ],
        )
        .unwrap_err();
    assert_eq!(err.origin(), Some(&Origin::Bytes(1)));
    assert_eq!(conf.domain, "ok");
}

#[test]
fn test_disallow_unknown_fields() {
    #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
    struct St {
        foo: String,
    }
    let src = br#"{"foo":"FOO","bar":"BAR"}"#;

    let mut st = St::default();
    Loader::new().load_with_env_json_bytes(&mut st, src).unwrap();
    assert_eq!(st.foo, "FOO");

    let strict = Loader::new();
    strict.disallow_unknown_fields(true);
    let mut st = St::default();
    let err = strict.load_with_env_json_bytes(&mut st, src).unwrap_err();
    assert!(err.to_string().contains("unknown field"));
    match err {
        ConfigError::Decode { format, source, .. } => {
            assert_eq!(format, Format::Json);
            assert_eq!(source, DecodeError::UnknownField("bar".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_unknown_field_policy_covers_yaml() {
    let strict = Loader::new();
    strict.disallow_unknown_fields(true);
    let mut conf = Conf::default();
    let err = strict
        .load_bytes(&mut conf, b"domain: example.com\nport: 80\n")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(err.to_string().contains("unknown field \"port\""));
}

#[test]
fn test_map_target_replaces_nested_values_across_sources() {
    let loader = Loader::new();
    let mut conf: HashMap<String, HashMap<String, String>> = HashMap::new();
    loader
        .load_bytes(&mut conf, b"db:\n  master: rw@/example\n  slave: ro@/example\n")
        .unwrap();
    loader.load_bytes(&mut conf, b"db:\n  master: rw@/local\n").unwrap();

    assert_eq!(conf["db"].len(), 1);
    assert_eq!(conf["db"]["master"], "rw@/local");
}

#[test]
fn test_untyped_target_keeps_unnamed_top_level_keys() {
    let loader = Loader::new();
    let mut doc = serde_json::Value::Object(serde_json::Map::new());
    loader
        .load_json_bytes(&mut doc, br#"{"db": {"master": "a", "slave": "b"}, "domain": "x"}"#)
        .unwrap();
    loader.load_json_bytes(&mut doc, br#"{"db": {"master": "c"}}"#).unwrap();

    assert_eq!(doc, serde_json::json!({"db": {"master": "c"}, "domain": "x"}));
}

#[test]
fn test_yaml_numbers_fill_string_fields() {
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Release {
        #[serde(default)]
        password: String,
        #[serde(default)]
        version: String,
    }

    let mut release = Release::default();
    Loader::new()
        .load_bytes(&mut release, b"password: 12345\nversion: 1.10\n")
        .unwrap();
    assert_eq!(release.password, "12345");
    assert_eq!(release.version, "1.10");
}

#[test]
fn test_skip_serializing_if_field_is_not_unknown() {
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Service {
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    }

    let strict = Loader::new();
    strict.disallow_unknown_fields(true);
    let mut service = Service::default();
    strict
        .load_bytes(&mut service, b"name: api\nport: 8080\n")
        .unwrap();
    assert_eq!(service.name, "api");
    assert_eq!(service.port, Some(8080));

    let err = strict
        .load_bytes(&mut service, b"name: api\nhost: localhost\n")
        .unwrap_err();
    assert!(err.to_string().contains("unknown field \"host\""));
}
