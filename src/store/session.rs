use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::error::{StoreError, StoreErrorKind};
use crate::parse::SftpTarget;

/// Key authentication: agent first, then the usual private key files under ~/.ssh.
fn try_key_authentication(sess: &mut ssh2::Session, username: &str) -> bool {
    if sess.authenticated() {
        return true;
    }
    if sess.userauth_agent(username).is_ok() && sess.authenticated() {
        return true;
    }
    if let Some(home_p) = dirs::home_dir() {
        for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
            let p = home_p.join(".ssh").join(name);
            if p.exists() {
                let _ = sess.userauth_pubkey_file(username, None, &p, None);
                if sess.authenticated() {
                    return true;
                }
            }
        }
    }
    false
}

/// Create and configure the TCP connection.
fn create_tcp_connection(addr: &str) -> Result<TcpStream, StoreError> {
    let mut addrs = addr.to_socket_addrs().map_err(|e| {
        StoreError::new(StoreErrorKind::Invalid, format!("cannot resolve {}: {}", addr, e))
    })?;
    let sock = addrs.next().ok_or_else(|| {
        StoreError::new(StoreErrorKind::Invalid, format!("no address for {}", addr))
    })?;
    let tcp = TcpStream::connect_timeout(&sock, Duration::from_secs(10))
        .map_err(|e| StoreError::transient(format!("connect {} failed: {}", addr, e)))?;
    let _ = tcp.set_read_timeout(Some(Duration::from_secs(30)));
    let _ = tcp.set_write_timeout(Some(Duration::from_secs(30)));
    Ok(tcp)
}

/// Open an authenticated session and an SFTP channel on it. Transport
/// problems are transient; a rejected login is not.
pub(super) fn connect_sftp(
    target: &SftpTarget,
) -> Result<(ssh2::Session, ssh2::Sftp), StoreError> {
    let addr = target.addr();
    let tcp = create_tcp_connection(&addr)?;
    let mut sess = ssh2::Session::new()
        .map_err(|e| StoreError::transient(format!("cannot create SSH session {}: {}", addr, e)))?;
    sess.set_tcp_stream(tcp);
    sess.handshake()
        .map_err(|e| StoreError::transient(format!("SSH handshake failed {}: {}", addr, e)))?;
    if !try_key_authentication(&mut sess, &target.username) {
        return Err(StoreError::new(
            StoreErrorKind::PermissionDenied,
            format!("SSH authentication failed for {}@{}", target.username, addr),
        ));
    }
    let sftp = sess.sftp().map_err(|e| map_ssh_error(&e, "create SFTP channel"))?;
    Ok((sess, sftp))
}

/// Resolve the bucket base directory: the login directory when unset, and a
/// leading `/~` is expanded relative to it.
pub(super) fn resolve_base(sftp: &ssh2::Sftp, base: Option<&str>) -> Result<String, StoreError> {
    let home = || -> Result<String, StoreError> {
        let p = sftp.realpath(Path::new(".")).map_err(|e| map_ssh_error(&e, "realpath ."))?;
        Ok(p.to_string_lossy().to_string())
    };
    match base {
        None => home(),
        Some(b) if b == "/~" || b.starts_with("/~/") => {
            let tail = b.trim_start_matches("/~").trim_start_matches('/');
            let home = home()?;
            if tail.is_empty() {
                Ok(home)
            } else {
                Ok(format!("{}/{}", home.trim_end_matches('/'), tail))
            }
        }
        Some(b) => Ok(b.to_string()),
    }
}

const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_NO_SUCH_PATH: i32 = 10;

pub(super) fn map_ssh_error(err: &ssh2::Error, what: &str) -> StoreError {
    let kind = match err.code() {
        ssh2::ErrorCode::SFTP(FX_NO_SUCH_FILE) | ssh2::ErrorCode::SFTP(FX_NO_SUCH_PATH) => {
            StoreErrorKind::NotFound
        }
        ssh2::ErrorCode::SFTP(FX_PERMISSION_DENIED) => StoreErrorKind::PermissionDenied,
        _ => StoreErrorKind::Transient,
    };
    StoreError::new(kind, format!("{}: {}", what, err))
}
