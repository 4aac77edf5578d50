use std::io::Write;

use waypoint::config::{Config, EnvOverrides, normalize_listen};
use waypoint::server::ServerOptions;

fn no_env() -> EnvOverrides {
    EnvOverrides::default()
}

#[test]
fn test_config_defaults() {
    let cfg = Config::load_with(None, no_env()).unwrap();

    assert_eq!(cfg.server.prefixes, vec!["http://127.0.0.1:8080/"]);
    assert_eq!(cfg.server.read_timeout_secs, 30);
    assert_eq!(cfg.server.max_request_bytes, 1024 * 1024);
    assert!(!cfg.server.expose_error_details);
    assert_eq!(cfg.logging.max_level(), tracing::Level::INFO);
}

#[test]
fn test_config_listen_override() {
    let env = EnvOverrides {
        listen: Some("0.0.0.0:3000".to_string()),
        ..EnvOverrides::default()
    };
    let cfg = Config::load_with(None, env).unwrap();

    assert_eq!(cfg.server.prefixes, vec!["http://0.0.0.0:3000/"]);
}

#[test]
fn test_config_blank_listen_is_ignored() {
    let env = EnvOverrides {
        listen: Some("   ".to_string()),
        ..EnvOverrides::default()
    };
    let cfg = Config::load_with(None, env).unwrap();

    assert_eq!(cfg.server.prefixes, vec!["http://127.0.0.1:8080/"]);
}

#[test]
fn test_config_expose_errors_flag() {
    for (value, expected) in [("true", true), ("1", true), ("off", false), ("No", false)] {
        let env = EnvOverrides {
            expose_errors: Some(value.to_string()),
            ..EnvOverrides::default()
        };
        let cfg = Config::load_with(None, env).unwrap();
        assert_eq!(cfg.server.expose_error_details, expected, "value {value:?}");
    }
}

#[test]
fn test_config_bad_flag_is_an_error() {
    let env = EnvOverrides {
        expose_errors: Some("maybe".to_string()),
        ..EnvOverrides::default()
    };
    let err = Config::load_with(None, env).unwrap_err();

    assert!(err.to_string().contains("WAYPOINT_EXPOSE_ERRORS"));
}

#[test]
fn test_config_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "server:\n  prefixes:\n    - http://+:9000/\n    - http://127.0.0.1:9001/\n  read_timeout_secs: 5\nlogging:\n  level: debug"
    )
    .unwrap();

    let cfg = Config::load_with(Some(file.path()), no_env()).unwrap();

    assert_eq!(
        cfg.server.prefixes,
        vec!["http://+:9000/", "http://127.0.0.1:9001/"]
    );
    assert_eq!(cfg.server.read_timeout_secs, 5);
    assert_eq!(cfg.server.max_request_bytes, 1024 * 1024);
    assert_eq!(cfg.logging.max_level(), tracing::Level::DEBUG);
}

#[test]
fn test_config_env_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  prefixes: [\"http://127.0.0.1:9000/\"]").unwrap();

    let env = EnvOverrides {
        listen: Some("http://localhost:7000/".to_string()),
        expose_errors: Some("yes".to_string()),
    };
    let cfg = Config::load_with(Some(file.path()), env).unwrap();

    assert_eq!(cfg.server.prefixes, vec!["http://localhost:7000/"]);
    assert!(cfg.server.expose_error_details);
}

#[test]
fn test_config_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    let err = Config::load_with(Some(&path), no_env()).unwrap_err();
    assert!(err.to_string().contains("reading config file"));
}

#[test]
fn test_config_validation() {
    let cfg = Config::from_yaml_str("server:\n  prefixes: []").unwrap();
    assert!(cfg.server.prefixes.is_empty());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  prefixes: []").unwrap();
    assert!(Config::load_with(Some(file.path()), no_env()).is_err());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  max_request_bytes: 0").unwrap();
    assert!(Config::load_with(Some(file.path()), no_env()).is_err());
}

#[test]
fn test_config_unknown_level_falls_back_to_info() {
    let cfg = Config::from_yaml_str("logging:\n  level: chatty").unwrap();
    assert_eq!(cfg.logging.max_level(), tracing::Level::INFO);
}

#[test]
fn test_normalize_listen() {
    assert_eq!(normalize_listen("127.0.0.1:8000"), "http://127.0.0.1:8000/");
    assert_eq!(normalize_listen(" 0.0.0.0:5000 "), "http://0.0.0.0:5000/");
    assert_eq!(normalize_listen("http://+:80"), "http://+:80/");
    assert_eq!(normalize_listen("http://host:1/"), "http://host:1/");
}

#[test]
fn test_server_options_from_config() {
    let cfg = Config::from_yaml_str("server:\n  read_timeout_secs: 3\n  expose_error_details: true")
        .unwrap();
    let options = ServerOptions::from(&cfg.server);

    assert_eq!(options.read_timeout.as_secs(), 3);
    assert!(options.expose_error_details);
}
