//! UAPI settings parsing and generation.
//!
//! Settings arrive in the cross-platform userspace API `set` format: one
//! `key=value` per line, interface keys first, then one section per peer
//! opened by a `public_key=` line. An empty line ends the settings.

use std::fmt::Write as FmtWrite;

use crate::error::{Result, TunnelError};
use crate::keys::{PrivateKey, PublicKey};
use crate::obfuscation::ObfuscationParams;
use crate::types::{AllowedIp, Endpoint, PresharedKey};

/// Only protocol version the device speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Interface-level configuration parsed from settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    /// The interface private key, if set.
    pub private_key: Option<PrivateKey>,
    /// Requested UDP listen port; `None` or `Some(0)` picks a free port.
    pub listen_port: Option<u16>,
    /// Firewall mark for transport sockets.
    pub fwmark: Option<u32>,
    /// AmneziaWG obfuscation parameters.
    pub obfuscation: ObfuscationParams,
    /// Configured peers, in settings order.
    pub peers: Vec<PeerConfig>,
}

impl DeviceConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the configuration back into UAPI `set` lines.
    #[must_use]
    pub fn to_uapi(&self) -> String {
        let mut out = String::new();
        self.write_interface(&mut out, self.listen_port);
        for peer in &self.peers {
            peer.write_uapi(&mut out);
        }
        out
    }

    pub(crate) fn write_interface(&self, out: &mut String, listen_port: Option<u16>) {
        if let Some(key) = &self.private_key {
            let _ = writeln!(out, "private_key={}", key.to_hex());
        }
        if let Some(port) = listen_port {
            let _ = writeln!(out, "listen_port={port}");
        }
        if let Some(mark) = self.fwmark {
            let _ = writeln!(out, "fwmark={mark}");
        }
        self.obfuscation.write_uapi(out);
    }
}

/// Configuration for one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerConfig {
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Optional preshared key.
    pub preshared_key: Option<PresharedKey>,
    /// Optional endpoint.
    pub endpoint: Option<Endpoint>,
    /// Persistent keepalive interval in seconds; `None` when disabled.
    pub persistent_keepalive: Option<u16>,
    /// Allowed IPs for this peer.
    pub allowed_ips: Vec<AllowedIp>,
}

impl PeerConfig {
    /// Creates a new peer config with the given public key.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: None,
            endpoint: None,
            persistent_keepalive: None,
            allowed_ips: Vec::new(),
        }
    }

    fn write_uapi(&self, out: &mut String) {
        let _ = writeln!(out, "public_key={}", self.public_key.to_hex());
        if let Some(psk) = &self.preshared_key {
            let _ = writeln!(out, "preshared_key={}", psk.to_hex());
        }
        if let Some(endpoint) = &self.endpoint {
            let _ = writeln!(out, "endpoint={endpoint}");
        }
        if let Some(keepalive) = self.persistent_keepalive {
            let _ = writeln!(out, "persistent_keepalive_interval={keepalive}");
        }
        if !self.allowed_ips.is_empty() {
            out.push_str("replace_allowed_ips=true\n");
        }
        for ip in &self.allowed_ips {
            let _ = writeln!(out, "allowed_ip={ip}");
        }
    }
}

/// Peer section being assembled by the parser.
struct ParsedPeer {
    config: PeerConfig,
    /// Not present before this section opened.
    created: bool,
    remove: bool,
    update_only: bool,
}

/// Parses UAPI `set` settings into a [`DeviceConfig`].
///
/// # Errors
///
/// Returns [`TunnelError::Parse`] naming the offending line for malformed
/// lines, unknown keys and bad values, and [`TunnelError::InvalidConfig`]
/// if the obfuscation parameters are inconsistent.
pub fn parse_uapi(settings: &str) -> Result<DeviceConfig> {
    let mut config = DeviceConfig::new();
    let mut current: Option<ParsedPeer> = None;

    for (idx, line) in settings.lines().enumerate() {
        let line_number = idx + 1;

        if line.is_empty() {
            break;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(parse_error(line_number, format!("expected key=value, got {line:?}")));
        };

        if key == "public_key" {
            let public_key = PublicKey::from_hex(value)
                .map_err(|e| parse_error(line_number, format!("public_key: {e}")))?;
            finish_peer(&mut config, current.take());
            let existing = config.peers.iter().position(|p| p.public_key == public_key);
            let (peer, created) = match existing {
                Some(i) => (config.peers.remove(i), false),
                None => (PeerConfig::new(public_key), true),
            };
            current = Some(ParsedPeer { config: peer, created, remove: false, update_only: false });
            continue;
        }

        match current.as_mut() {
            None => parse_interface_key(&mut config, key, value, line_number)?,
            Some(peer) => parse_peer_key(peer, key, value, line_number)?,
        }
    }
    finish_peer(&mut config, current);

    config.obfuscation.validate()?;
    Ok(config)
}

fn finish_peer(config: &mut DeviceConfig, peer: Option<ParsedPeer>) {
    let Some(peer) = peer else {
        return;
    };
    if peer.remove || (peer.update_only && peer.created) {
        return;
    }
    config.peers.push(peer.config);
}

fn parse_error(line: usize, message: String) -> TunnelError {
    TunnelError::Parse { line, message }
}

fn parse_true(key: &str, value: &str, line: usize) -> Result<()> {
    if value == "true" {
        Ok(())
    } else {
        Err(parse_error(line, format!("{key} only accepts \"true\", got {value:?}")))
    }
}

fn parse_interface_key(config: &mut DeviceConfig, key: &str, value: &str, line: usize) -> Result<()> {
    match key {
        "private_key" => {
            let private_key = PrivateKey::from_hex(value)
                .map_err(|e| parse_error(line, format!("private_key: {e}")))?;
            config.private_key = (!private_key.is_zero()).then_some(private_key);
        }
        "listen_port" => {
            config.listen_port = Some(
                value
                    .parse()
                    .map_err(|_| parse_error(line, format!("invalid listen_port {value:?}")))?,
            );
        }
        "fwmark" => {
            let mark: u32 = value
                .parse()
                .map_err(|_| parse_error(line, format!("invalid fwmark {value:?}")))?;
            config.fwmark = (mark != 0).then_some(mark);
        }
        "replace_peers" => {
            parse_true(key, value, line)?;
            config.peers.clear();
        }
        _ => {
            let known = config
                .obfuscation
                .apply(key, value)
                .map_err(|message| parse_error(line, format!("{key}: {message}")))?;
            if !known {
                return Err(parse_error(line, format!("unknown interface key {key:?}")));
            }
        }
    }
    Ok(())
}

fn parse_peer_key(peer: &mut ParsedPeer, key: &str, value: &str, line: usize) -> Result<()> {
    let config = &mut peer.config;
    match key {
        "remove" => {
            parse_true(key, value, line)?;
            peer.remove = true;
        }
        "update_only" => {
            parse_true(key, value, line)?;
            peer.update_only = true;
        }
        "preshared_key" => {
            let psk = PresharedKey::from_hex(value)
                .map_err(|e| parse_error(line, format!("preshared_key: {e}")))?;
            config.preshared_key = (!psk.is_zero()).then_some(psk);
        }
        "endpoint" => {
            config.endpoint = Some(value.parse().map_err(|e| parse_error(line, format!("{e}")))?);
        }
        "persistent_keepalive_interval" => {
            let seconds: u16 = value
                .parse()
                .map_err(|_| parse_error(line, format!("invalid persistent_keepalive_interval {value:?}")))?;
            config.persistent_keepalive = (seconds != 0).then_some(seconds);
        }
        "replace_allowed_ips" => {
            parse_true(key, value, line)?;
            config.allowed_ips.clear();
        }
        "allowed_ip" => {
            let ip = AllowedIp::from_cidr(value).map_err(|e| parse_error(line, format!("{e}")))?;
            if !config.allowed_ips.contains(&ip) {
                config.allowed_ips.push(ip);
            }
        }
        "protocol_version" => {
            if value != PROTOCOL_VERSION.to_string() {
                return Err(parse_error(line, format!("unsupported protocol_version {value:?}")));
            }
        }
        _ => return Err(parse_error(line, format!("unknown peer key {key:?}"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_SIZE;
    use test_case::test_case;

    fn test_private_key() -> PrivateKey {
        PrivateKey::from_bytes(&[1u8; KEY_SIZE]).expect("valid key")
    }

    fn test_public_key() -> PublicKey {
        PublicKey::from_bytes(&[2u8; KEY_SIZE]).expect("valid key")
    }

    #[test]
    fn empty_settings_parse_to_default() {
        let config = parse_uapi("").expect("valid settings");
        assert_eq!(config, DeviceConfig::default());
    }

    #[test]
    fn listen_port_only() {
        let config = parse_uapi("listen_port=51820\n").expect("valid settings");
        assert_eq!(config.listen_port, Some(51820));
        assert!(config.private_key.is_none());
        assert!(config.peers.is_empty());
    }

    #[test]
    fn full_settings_with_peer() {
        let settings = format!(
            "private_key={}\n\
             listen_port=0\n\
             jc=4\njmin=40\njmax=70\nh1=11\nh2=12\nh3=13\nh4=14\n\
             replace_peers=true\n\
             public_key={}\n\
             endpoint=192.168.1.1:51820\n\
             persistent_keepalive_interval=25\n\
             replace_allowed_ips=true\n\
             allowed_ip=0.0.0.0/0\n\
             allowed_ip=::/0\n\
             protocol_version=1\n",
            test_private_key().to_hex(),
            test_public_key().to_hex()
        );

        let config = parse_uapi(&settings).expect("valid settings");
        assert_eq!(config.private_key, Some(test_private_key()));
        assert_eq!(config.obfuscation.junk_packet_count, Some(4));
        assert_eq!(config.obfuscation.transport_packet_magic_header, Some(14));
        assert_eq!(config.peers.len(), 1);

        let peer = &config.peers[0];
        assert_eq!(peer.public_key, test_public_key());
        assert_eq!(peer.persistent_keepalive, Some(25));
        assert_eq!(peer.allowed_ips.len(), 2);
        assert_eq!(peer.endpoint.as_ref().map(ToString::to_string).as_deref(), Some("192.168.1.1:51820"));
    }

    #[test]
    fn empty_line_ends_settings() {
        let config = parse_uapi("listen_port=1\n\nthis is ignored\n").expect("valid settings");
        assert_eq!(config.listen_port, Some(1));
    }

    #[test]
    fn zero_private_key_clears_key() {
        let settings = format!("private_key={}\n", "00".repeat(KEY_SIZE));
        assert!(parse_uapi(&settings).expect("valid").private_key.is_none());
    }

    #[test]
    fn removed_peer_is_dropped() {
        let settings = format!(
            "public_key={key}\nallowed_ip=10.0.0.2/32\npublic_key={key}\nremove=true\n",
            key = test_public_key().to_hex()
        );
        assert!(parse_uapi(&settings).expect("valid").peers.is_empty());
    }

    #[test]
    fn repeated_peer_sections_merge() {
        let settings = format!(
            "public_key={key}\nallowed_ip=10.0.0.2/32\npublic_key={key}\nallowed_ip=10.0.0.3/32\n",
            key = test_public_key().to_hex()
        );
        let config = parse_uapi(&settings).expect("valid");
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.peers[0].allowed_ips.len(), 2);
    }

    #[test_case("listen_port" ; "missing equals")]
    #[test_case("listen_port=abc" ; "non numeric port")]
    #[test_case("listen_port=70000" ; "port out of range")]
    #[test_case("private_key=abcd" ; "short key")]
    #[test_case("bogus=1" ; "unknown interface key")]
    #[test_case("replace_peers=false" ; "replace_peers false")]
    #[test_case("jc=lots" ; "non numeric junk count")]
    fn malformed_interface_line_rejected(settings: &str) {
        assert!(matches!(parse_uapi(settings), Err(TunnelError::Parse { line: 1, .. })));
    }

    #[test]
    fn malformed_peer_line_reports_line_number() {
        let settings = format!("listen_port=1\npublic_key={}\nendpoint=nowhere\n", test_public_key().to_hex());
        assert!(matches!(parse_uapi(&settings), Err(TunnelError::Parse { line: 3, .. })));
    }

    #[test]
    fn unsupported_protocol_version_rejected() {
        let settings = format!("public_key={}\nprotocol_version=2\n", test_public_key().to_hex());
        assert!(parse_uapi(&settings).is_err());
    }

    #[test]
    fn inconsistent_obfuscation_rejected() {
        assert!(matches!(
            parse_uapi("jmin=100\njmax=10\n"),
            Err(TunnelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn update_only_does_not_create_peer() {
        let settings = format!(
            "public_key={}\nupdate_only=true\nallowed_ip=10.0.0.2/32\n",
            test_public_key().to_hex()
        );
        assert!(parse_uapi(&settings).expect("valid").peers.is_empty());
    }

    #[test]
    fn update_only_updates_existing_peer() {
        let settings = format!(
            "public_key={key}\nallowed_ip=10.0.0.2/32\n\
             public_key={key}\nupdate_only=true\npersistent_keepalive_interval=25\n",
            key = test_public_key().to_hex()
        );
        let config = parse_uapi(&settings).expect("valid");
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.peers[0].persistent_keepalive, Some(25));
        assert_eq!(config.peers[0].allowed_ips.len(), 1);
    }

    #[test]
    fn to_uapi_reparses_to_same_config() {
        let settings = format!(
            "private_key={}\nlisten_port=51820\n\
             public_key={}\nendpoint=[fd00::1]:51820\n\
             persistent_keepalive_interval=25\nallowed_ip=10.0.0.0/24\n",
            test_private_key().to_hex(),
            test_public_key().to_hex()
        );
        let original = parse_uapi(&settings).expect("valid settings");

        let parsed = parse_uapi(&original.to_uapi()).expect("valid settings");
        assert_eq!(parsed, original);
    }
}
