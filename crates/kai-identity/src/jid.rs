use std::fmt;

use thiserror::Error;

pub const USER_SERVER: &str = "s.whatsapp.net";
pub const LEGACY_USER_SERVER: &str = "c.us";
pub const GROUP_SERVER: &str = "g.us";
pub const ANONYMOUS_SERVER: &str = "lid";
pub const BROADCAST_SERVER: &str = "broadcast";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Reasons an identifier failed to parse.
pub enum JidParseError {
    #[error("identifier cannot be empty")]
    Empty,
    #[error("identifier '{0}' has no server part")]
    MissingServer(String),
    #[error("identifier '{0}' has an empty user part")]
    EmptyUser(String),
    #[error("identifier '{0}' has an invalid device suffix")]
    InvalidDevice(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A parsed transport identifier in the shape `user[:device]@server`.
pub struct Jid {
    user: String,
    device: Option<u16>,
    server: String,
}

impl Jid {
    /// Parses `user[:device]@server`. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, JidParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(JidParseError::Empty);
        }
        let Some((user_and_device, server)) = raw.split_once('@') else {
            return Err(JidParseError::MissingServer(raw.to_string()));
        };
        let server = server.trim();
        if server.is_empty() {
            return Err(JidParseError::MissingServer(raw.to_string()));
        }

        let (user, device) = match user_and_device.split_once(':') {
            Some((user, device)) => {
                let device = device
                    .parse::<u16>()
                    .map_err(|_| JidParseError::InvalidDevice(raw.to_string()))?;
                (user, Some(device))
            }
            None => (user_and_device, None),
        };
        // Agent suffixes (`user_1`) belong to the device, not the account.
        let user = user.split('_').next().unwrap_or_default().trim();
        if user.is_empty() {
            return Err(JidParseError::EmptyUser(raw.to_string()));
        }

        Ok(Self {
            user: user.to_string(),
            device,
            server: server.to_ascii_lowercase(),
        })
    }

    pub fn user(&self) -> &str {
        self.user.as_str()
    }

    pub fn device(&self) -> Option<u16> {
        self.device
    }

    pub fn server(&self) -> &str {
        self.server.as_str()
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_anonymous(&self) -> bool {
        self.server == ANONYMOUS_SERVER
    }

    pub fn is_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER
    }

    /// Drops the device part and folds the legacy user server onto the
    /// current one, giving the account-level identity.
    pub fn to_normalized_user(&self) -> Jid {
        let server = if self.server == LEGACY_USER_SERVER {
            USER_SERVER.to_string()
        } else {
            self.server.clone()
        };
        Jid {
            user: self.user.clone(),
            device: None,
            server,
        }
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device {
            Some(device) => write!(f, "{}:{}@{}", self.user, device, self.server),
            None => write!(f, "{}@{}", self.user, self.server),
        }
    }
}

pub fn is_group_id(raw: &str) -> bool {
    raw.trim().ends_with("@g.us")
}

pub fn is_anonymous_id(raw: &str) -> bool {
    Jid::parse(raw).map(|jid| jid.is_anonymous()).unwrap_or(false)
}

pub fn is_broadcast_id(raw: &str) -> bool {
    raw.trim().ends_with("@broadcast")
}

/// Returns the account-level form of `raw`, or `None` when it does not parse.
pub fn normalize_user_id(raw: &str) -> Option<String> {
    Jid::parse(raw)
        .ok()
        .map(|jid| jid.to_normalized_user().to_string())
}

/// Returns the portion of `raw` before the server delimiter, without any
/// device suffix. Malformed identifiers yield `None`.
pub fn user_part(raw: &str) -> Option<String> {
    Jid::parse(raw).ok().map(|jid| jid.user().to_string())
}

/// Returns the display handle used in mention text: the user part when the
/// identifier parses, otherwise the raw text before any `@`.
pub fn display_handle(raw: &str) -> String {
    user_part(raw).unwrap_or_else(|| {
        raw.trim()
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::{
        display_handle, is_anonymous_id, is_broadcast_id, is_group_id, normalize_user_id,
        user_part, Jid, JidParseError,
    };

    #[test]
    fn unit_jid_parse_extracts_user_device_and_server() {
        let jid = Jid::parse("233500000000:12@s.whatsapp.net").expect("parse device jid");
        assert_eq!(jid.user(), "233500000000");
        assert_eq!(jid.device(), Some(12));
        assert_eq!(jid.server(), "s.whatsapp.net");
        assert_eq!(jid.to_string(), "233500000000:12@s.whatsapp.net");
    }

    #[test]
    fn unit_jid_parse_rejects_malformed_shapes() {
        assert_eq!(Jid::parse("   "), Err(JidParseError::Empty));
        assert!(matches!(
            Jid::parse("233500000000"),
            Err(JidParseError::MissingServer(_))
        ));
        assert!(matches!(
            Jid::parse("@s.whatsapp.net"),
            Err(JidParseError::EmptyUser(_))
        ));
        assert!(matches!(
            Jid::parse("2335:abc@s.whatsapp.net"),
            Err(JidParseError::InvalidDevice(_))
        ));
    }

    #[test]
    fn functional_normalize_user_id_drops_device_and_folds_legacy_server() {
        assert_eq!(
            normalize_user_id("233500000000:3@s.whatsapp.net").as_deref(),
            Some("233500000000@s.whatsapp.net")
        );
        assert_eq!(
            normalize_user_id("233500000000@c.us").as_deref(),
            Some("233500000000@s.whatsapp.net")
        );
        assert_eq!(normalize_user_id("not-an-id"), None);
    }

    #[test]
    fn functional_kind_predicates_match_server_part() {
        assert!(is_group_id("120363000000000000@g.us"));
        assert!(!is_group_id("233500000000@s.whatsapp.net"));
        assert!(is_anonymous_id("123456789@lid"));
        assert!(!is_anonymous_id("@lid"));
        assert!(is_broadcast_id("status@broadcast"));
    }

    #[test]
    fn regression_user_part_never_panics_on_garbage() {
        for raw in ["", "@", "::@", "a:b:c@d", "\u{1F600}@lid", "x@"] {
            let _ = user_part(raw);
            let _ = display_handle(raw);
        }
        assert_eq!(user_part("a:b:c@d"), None);
        assert_eq!(display_handle("x@"), "x");
    }

    #[test]
    fn regression_user_part_strips_agent_suffix() {
        assert_eq!(
            user_part("233500000000_1:4@s.whatsapp.net").as_deref(),
            Some("233500000000")
        );
    }
}
