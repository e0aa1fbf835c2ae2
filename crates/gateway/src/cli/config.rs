use pb_domain::config::{Config, ConfigSeverity};

const REDACTED: &str = "********";

/// Validate the config, printing any issues.  Returns `false` when errors
/// were found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
/// Secrets are masked.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(&redacted(config))?;
    print!("{output}");
    Ok(())
}

fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    let mask = |s: &mut Option<String>| {
        if s.as_deref().is_some_and(|v| !v.is_empty()) {
            *s = Some(REDACTED.into());
        }
    };
    mask(&mut config.server.api_token);
    mask(&mut config.devices.global_credential);
    for robot in &mut config.devices.robots {
        mask(&mut robot.credential);
    }
    config
}
