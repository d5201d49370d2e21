use crate::error::{MigrationError, Result};
use std::fmt;
use std::str::FromStr;

/// Parsed `scheme://[user[:password]@]host[:port][/path]` store URI.
///
/// `Display` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub scheme: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub path: Option<String>,
}

impl ConnectionString {
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |why: &str| MigrationError::InvalidConnectionString(format!("{}: {}", why, redact(uri)));

        let (scheme, rest) = uri.trim().split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return Err(invalid("bad scheme"));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(&rest[idx..])),
            None => (rest, None),
        };

        let (credentials, host_port) = match authority.rsplit_once('@') {
            Some((credentials, host_port)) => (Some(credentials), host_port),
            None => (None, authority),
        };
        let (username, password) = match credentials {
            Some(c) => match c.split_once(':') {
                Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
                None => (Some(c.to_string()), None),
            },
            None => (None, None),
        };
        if username.as_deref() == Some("") {
            return Err(invalid("empty user name"));
        }

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;
                (host, Some(port))
            }
            None => (host_port, None),
        };

        let path = path.filter(|p| *p != "/").map(str::to_string);
        if host.is_empty() && path.is_none() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            username,
            password,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Filesystem location for file-backed schemes: `sqlite://data/p.db` is
    /// `data/p.db`, `sqlite:///tmp/p.db` is `/tmp/p.db`
    pub fn location(&self) -> String {
        format!("{}{}", self.host, self.path.as_deref().unwrap_or_default())
    }
}

impl FromStr for ConnectionString {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.username {
            f.write_str(user)?;
            if self.password.is_some() {
                f.write_str(":****")?;
            }
            f.write_str("@")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionString({})", self)
    }
}

/// Best-effort password mask for strings that failed to parse
fn redact(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rsplit_once('@') {
        Some((credentials, _)) => match credentials.split_once(':') {
            Some((user, _)) => format!("{}://{}:****@{}", scheme, user, &rest[credentials.len() + 1..]),
            None => uri.to_string(),
        },
        None => uri.to_string(),
    }
}
