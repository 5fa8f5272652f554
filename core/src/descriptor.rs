/// Connection descriptor codec: `<host>:<port>:<peerID>`
use crate::error::{Result, ShareError};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = ':';

/// How to reach a peer. Only obtainable through [`ConnectionDescriptor::parse`]
/// or [`ConnectionDescriptor::new`], both of which validate every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionDescriptor {
    host: String,
    port: u16,
    peer_id: String,
}

impl ConnectionDescriptor {
    /// Build a descriptor from already-separated parts
    pub fn new(host: &str, port: u16, peer_id: &str) -> Result<Self> {
        let host = validate_field("host", host)?;
        let peer_id = validate_field("peer id", peer_id)?;
        if port == 0 {
            return Err(ShareError::Format("port must be a positive integer".to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            peer_id: peer_id.to_string(),
        })
    }

    /// Parse the canonical text form. Padded fields are rejected, so a
    /// descriptor that parses formats back to exactly `text`.
    pub fn parse(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split(SEPARATOR).collect();
        if fields.len() != 3 {
            return Err(ShareError::Format(format!(
                "expected <host>:<port>:<peerID>, got {} field(s)",
                fields.len()
            )));
        }

        let port = parse_port(fields[1])?;
        Self::new(fields[0], port, fields[2])
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// `host:port`, used to build request URLs
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn validate_field<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(ShareError::Format(format!("{} must not be empty", name)));
    }
    if value.trim() != value {
        return Err(ShareError::Format(format!("{} must not be padded: {:?}", name, value)));
    }
    if !value.is_ascii() {
        return Err(ShareError::Format(format!("{} must be ASCII", name)));
    }
    if value.contains(SEPARATOR) {
        return Err(ShareError::Format(format!("{} must not contain ':'", name)));
    }
    Ok(value)
}

// Only canonical decimal is accepted so that formatting gives back the input.
fn parse_port(field: &str) -> Result<u16> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ShareError::Format(format!("invalid port: {:?}", field)));
    }
    if field.len() > 1 && field.starts_with('0') {
        return Err(ShareError::Format(format!("invalid port: {:?}", field)));
    }
    match field.parse::<u16>() {
        Ok(0) | Err(_) => Err(ShareError::Format(format!(
            "port must be between 1 and 65535, got {}",
            field
        ))),
        Ok(p) => Ok(p),
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}{}", self.host, SEPARATOR, self.port, SEPARATOR, self.peer_id)
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_descriptor() {
        let d = ConnectionDescriptor::parse("127.0.0.1:9000:nodeABC").unwrap();
        assert_eq!(d.host(), "127.0.0.1");
        assert_eq!(d.port(), 9000);
        assert_eq!(d.peer_id(), "nodeABC");
        assert_eq!(d.to_string(), "127.0.0.1:9000:nodeABC");
    }

    #[test]
    fn test_round_trip() {
        for s in ["localhost:1:a", "10.0.0.7:65535:0c1f-77", "media.lan:8080:x"] {
            let d: ConnectionDescriptor = s.parse().unwrap();
            assert_eq!(d.to_string(), s);
            assert_eq!(ConnectionDescriptor::parse(&d.to_string()).unwrap(), d);
        }
    }

    #[test]
    fn test_rejects_padded_fields() {
        for s in [" host:80:peer", "host : 80:peer", "host:80 :peer", "host:80:peer ", "host:80:\tpeer"] {
            assert!(
                matches!(ConnectionDescriptor::parse(s), Err(ShareError::Format(_))),
                "{:?} should be rejected",
                s
            );
        }
        assert!(ConnectionDescriptor::new(" host", 80, "peer").is_err());
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        assert!(matches!(ConnectionDescriptor::parse("host:80"), Err(ShareError::Format(_))));
        assert!(matches!(ConnectionDescriptor::parse("a:1:b:c"), Err(ShareError::Format(_))));
        assert!(matches!(ConnectionDescriptor::parse(""), Err(ShareError::Format(_))));
    }

    #[test]
    fn test_rejects_bad_ports() {
        for s in ["h:0:p", "h:-1:p", "h:65536:p", "h:+80:p", "h:080:p", "h:eighty:p", "h::p"] {
            assert!(
                matches!(ConnectionDescriptor::parse(s), Err(ShareError::Format(_))),
                "{} should be rejected",
                s
            );
        }
    }

    #[test]
    fn test_rejects_empty_fields() {
        assert!(ConnectionDescriptor::parse(":80:p").is_err());
        assert!(ConnectionDescriptor::parse("h:80:  ").is_err());
        assert!(ConnectionDescriptor::new("h", 0, "p").is_err());
        assert!(ConnectionDescriptor::new("", 1, "p").is_err());
    }

    #[test]
    fn test_rejects_non_ascii() {
        assert!(ConnectionDescriptor::parse("hôte:80:p").is_err());
    }
}
