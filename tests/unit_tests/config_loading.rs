// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use knxip_core::cfg::{cli::resolve_config_path, config::Config, enums::ConnectionMode};

#[test]
fn routing_fixture_loads_and_validates() -> Result<()> {
    let cfg = resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load tests/config.yaml")?;

    assert_eq!(cfg.connection.mode, ConnectionMode::Routing);
    assert_eq!(cfg.connection.individual_address()?.to_string(), "1.1.250");
    assert_eq!(
        cfg.connection.multicast_group()?,
        "224.0.23.12".parse::<Ipv4Addr>().expect("valid multicast address literal")
    );
    assert_eq!(cfg.runtime.telegram_queue_capacity, 256);
    Ok(())
}

#[test]
fn secure_tunnelling_fixture_loads_and_validates() -> Result<()> {
    let cfg = resolve_config_path("tests/config_secure_tunnelling.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load tests/config_secure_tunnelling.yaml")?;

    assert_eq!(cfg.connection.mode, ConnectionMode::SecureTunnellingTcp);
    assert!(cfg.connection.mode.is_secure());
    assert!(cfg.connection.mode.is_tunnelling());

    let secure = cfg.secure.expect("secure section present");
    assert_eq!(secure.backbone_key, [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ]);
    assert_eq!(secure.device_authentication_password.as_deref(), Some("trustme"));
    Ok(())
}
