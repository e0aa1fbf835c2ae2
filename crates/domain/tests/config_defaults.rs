use pb_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn default_session_timings_match_reaper_contract() {
    let config = Config::default();
    assert_eq!(config.sessions.idle_timeout_secs, 300);
    assert_eq!(config.sessions.tick_ms, 1000);
    assert_eq!(config.sessions.release_grace_ms, 2000);
    assert_eq!(config.sessions.event_filter, vec!["stimulation_info".to_string()]);
}

#[test]
fn full_config_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8084

[devices]
global_credential = "1b2c3d"

[[devices.robots]]
serial = "00e20145"
address = "192.168.1.40"

[[devices.robots]]
serial = "00A10B22"
address = "192.168.1.41"
port = 8443
credential = "own"

[sessions]
idle_timeout_secs = 120
gate_timeout_secs = 10

[recognizer]
url = "http://127.0.0.1:9000/v1/stt"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.devices.robots.len(), 2);
    assert_eq!(config.sessions.idle_timeout_secs, 120);
    // Unset keys keep their defaults.
    assert_eq!(config.sessions.tick_ms, 1000);

    let robot = config.devices.find("00a10b22").unwrap();
    assert_eq!(robot.target(), "192.168.1.41:8443");
    assert_eq!(config.devices.credential_for(robot).as_deref(), Some("own"));

    let robot = config.devices.find("00E20145").unwrap();
    assert_eq!(config.devices.credential_for(robot).as_deref(), Some("1b2c3d"));

    assert!(config
        .validate()
        .iter()
        .all(|i| i.severity == pb_domain::config::ConfigSeverity::Warning));
}

#[test]
fn api_token_env_default() {
    let config = Config::default();
    assert_eq!(config.server.api_token_env, "PB_API_TOKEN");
}
