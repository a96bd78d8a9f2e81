use anyhow::Result;

/// Connection target of an `sftp://` store spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SftpTarget {
    pub username: String,
    pub host: String,
    pub port: u16,
    /// Remote directory holding the buckets; `None` means the login directory.
    pub base: Option<String>,
}

impl SftpTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for SftpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sftp://{}@{}:{}", self.username, self.host, self.port)?;
        if let Some(base) = &self.base {
            write!(f, "{}", base)?;
        }
        Ok(())
    }
}

pub fn parse_remote_host(input: &str) -> Result<(String, String, u16)> {
    let at_pos =
        input.find('@').ok_or_else(|| anyhow::anyhow!("missing user name, e.g. user@host[:port]"))?;
    let (user_part, host_part) = input.split_at(at_pos);
    let user = user_part.trim();
    let host_port = &host_part[1..]; // skip '@'
    if user.is_empty() || host_port.is_empty() {
        return Err(anyhow::anyhow!("user name or host is empty"));
    }

    // host:port, default to 22 if not provided
    let (host, port) = if let Some(colon) = host_port.rfind(':') {
        let (h, p_str) = host_port.split_at(colon);
        let p_str = &p_str[1..]; // skip ':'
        let p: u16 = p_str.parse().map_err(|_| anyhow::anyhow!("invalid port: {}", p_str))?;
        (h.to_string(), p)
    } else {
        (host_port.to_string(), 22)
    };
    if host.is_empty() {
        return Err(anyhow::anyhow!("host is empty"));
    }

    Ok((user.to_string(), host, port))
}

/// Parse the part after `sftp://`: `user@host[:port][/base/dir]`.
pub fn parse_sftp_target(input: &str) -> Result<SftpTarget> {
    let (authority, base) = match input.find('/') {
        Some(pos) => (&input[..pos], Some(&input[pos..])),
        None => (input, None),
    };
    let (username, host, port) = parse_remote_host(authority)?;
    let base = base
        .map(|b| crate::transfer::normalize_path(b, false))
        .filter(|b| !b.is_empty() && b != "/");
    Ok(SftpTarget { username, host, port, base })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_host_with_and_without_port() {
        assert_eq!(
            parse_remote_host("bob@files.local").unwrap(),
            ("bob".into(), "files.local".into(), 22)
        );
        assert_eq!(
            parse_remote_host("bob@10.0.0.5:2200").unwrap(),
            ("bob".into(), "10.0.0.5".into(), 2200)
        );
        assert!(parse_remote_host("files.local").is_err());
        assert!(parse_remote_host("bob@host:notaport").is_err());
        assert!(parse_remote_host("@host").is_err());
    }

    #[test]
    fn sftp_target_base_is_normalized() {
        let t = parse_sftp_target("alice@h:2022//srv//buckets/").unwrap();
        assert_eq!(t.base.as_deref(), Some("/srv/buckets"));
        assert_eq!(t.addr(), "h:2022");
        assert_eq!(t.to_string(), "sftp://alice@h:2022/srv/buckets");

        let t = parse_sftp_target("alice@h").unwrap();
        assert_eq!(t.base, None);
        assert_eq!(t.port, 22);

        let t = parse_sftp_target("alice@h/").unwrap();
        assert_eq!(t.base, None);
    }
}
