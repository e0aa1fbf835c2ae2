use pb_domain::config::{normalize_serial, Config};

/// Print the configured robots and where each one's credential comes from.
pub fn list(config: &Config) {
    let robots = &config.devices.robots;
    if robots.is_empty() {
        println!("No robots configured.");
        return;
    }

    println!("{:<20} {:<28} CREDENTIAL", "SERIAL", "TARGET");
    for robot in robots {
        let source = match robot.credential.as_deref() {
            Some(c) if !c.is_empty() => "device",
            _ if config.devices.credential_for(robot).is_some() => "global",
            _ => "MISSING",
        };
        println!(
            "{:<20} {:<28} {source}",
            normalize_serial(&robot.serial),
            robot.target(),
        );
    }
    println!("\n{} robot(s)", robots.len());
}
