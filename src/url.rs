//! Remote operand parsing (`[user@]host[:port]:path`, `scp://[user@]host[:port]/path`)
//! and POSIX path helpers for paths on the remote side.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
}

pub fn parse_remote(operand: &str) -> Option<RemoteSpec> {
    let s = operand.trim();
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("scp://") {
        return parse_scp_uri(&s["scp://".len()..]);
    }
    parse_short_form(s)
}

fn parse_scp_uri(rest: &str) -> Option<RemoteSpec> {
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let (user, hostport) = split_user(authority);
    let (host, port) = if let Some(stripped) = hostport.strip_prefix('[') {
        let (h, tail) = stripped.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse().ok()?),
            None => None,
        };
        (h.to_string(), port)
    } else {
        match hostport.split_once(':') {
            Some((h, p)) => (h.to_string(), Some(p.parse().ok()?)),
            None => (hostport.to_string(), None),
        }
    };
    if host.is_empty() {
        return None;
    }
    Some(RemoteSpec {
        user,
        host,
        port,
        path: if path.is_empty() { ".".to_string() } else { path.to_string() },
    })
}

fn parse_short_form(s: &str) -> Option<RemoteSpec> {
    let (user, rest) = split_user(s);
    let (host, path) = if let Some(stripped) = rest.strip_prefix('[') {
        let (h, tail) = stripped.split_once(']')?;
        (h, tail.strip_prefix(':')?)
    } else {
        let (h, p) = rest.split_once(':')?;
        // A slash before the colon means a local path such as ./a:b
        if h.contains('/') {
            return None;
        }
        // Drive letters (C:\x) stay local on Windows
        #[cfg(windows)]
        if h.len() == 1 {
            return None;
        }
        (h, p)
    };
    if host.is_empty() {
        return None;
    }
    Some(RemoteSpec {
        user,
        host: host.to_string(),
        port: None,
        path: if path.is_empty() { ".".to_string() } else { path.to_string() },
    })
}

fn split_user(s: &str) -> (Option<String>, &str) {
    // The user part ends at the last '@' before any path separator
    let head = s.split('/').next().unwrap_or(s);
    match head.rfind('@') {
        Some(at) if at > 0 => (Some(s[..at].to_string()), &s[at + 1..]),
        _ => (None, s),
    }
}

/// Final component of a remote path; trailing slashes are ignored.
pub fn remote_basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Parent directory of a remote path, `.` when there is none. A path ending
/// in `/` already names a directory and is its own parent (`/srv/inbox/` ->
/// `/srv/inbox`).
pub fn remote_parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/".to_string() } else { ".".to_string() };
    }
    if trimmed.len() != path.len() {
        return trimmed.to_string();
    }
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(pos) => trimmed[..pos].trim_end_matches('/').to_string(),
        None => ".".to_string(),
    }
}

pub fn join_remote(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent == "." {
        name.to_string()
    } else if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}
