// Privacy Guard — Peer Identification
//
// Identifies the process on the other end of a Unix socket connection from
// its SO_PEERCRED credentials, resolving /proc/<pid>/exe where possible.
// Used only as context for structured logs; access control is left to the
// socket's file permissions.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Information about the process that connected to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub pid: Option<u32>,
    pub uid: u32,
    pub gid: u32,
    /// Resolved path to the peer's executable, when readable.
    pub exe_path: Option<PathBuf>,
}

impl PeerInfo {
    /// Build peer info from socket credentials.
    pub fn from_credentials(pid: Option<u32>, uid: u32, gid: u32) -> Self {
        let exe_path = pid.and_then(|pid| resolve_exe(pid).ok());
        Self {
            pid,
            uid,
            gid,
            exe_path,
        }
    }

    #[cfg(target_os = "linux")]
    pub fn from_stream(stream: &tokio::net::UnixStream) -> io::Result<Self> {
        let cred = stream.peer_cred()?;
        let pid = cred.pid().and_then(|p| u32::try_from(p).ok());
        Ok(Self::from_credentials(pid, cred.uid(), cred.gid()))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn from_stream(stream: &tokio::net::UnixStream) -> io::Result<Self> {
        let cred = stream.peer_cred()?;
        Ok(Self::from_credentials(None, cred.uid(), cred.gid()))
    }

    /// Short actor string for log lines.
    pub fn actor_string(&self) -> String {
        let pid = self
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string());
        match &self.exe_path {
            Some(exe) => format!("pid:{} uid:{} exe:{}", pid, self.uid, exe.display()),
            None => format!("pid:{} uid:{}", pid, self.uid),
        }
    }
}

impl std::fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "PID {}", pid)?,
            None => write!(f, "PID ?")?,
        }
        write!(f, " uid={} gid={}", self.uid, self.gid)?;
        if let Some(exe) = &self.exe_path {
            write!(f, " ({})", exe.display())?;
        }
        Ok(())
    }
}

fn resolve_exe(pid: u32) -> io::Result<PathBuf> {
    fs::read_link(format!("/proc/{}/exe", pid))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_info_for_current_process() {
        let pid = std::process::id();
        let info = PeerInfo::from_credentials(Some(pid), 1000, 1000);

        if cfg!(target_os = "linux") {
            assert_eq!(info.pid, Some(pid));
            assert!(info.exe_path.is_some(), "Should resolve current process");
        }
    }

    #[test]
    fn test_actor_string_format() {
        let info = PeerInfo {
            pid: Some(12345),
            uid: 5000,
            gid: 100,
            exe_path: Some(PathBuf::from("/usr/bin/test")),
        };

        let actor = info.actor_string();
        assert!(actor.contains("pid:12345"));
        assert!(actor.contains("uid:5000"));
        assert!(actor.contains("exe:/usr/bin/test"));
    }

    #[test]
    fn test_display_without_pid() {
        let info = PeerInfo::from_credentials(None, 0, 0);
        let display = format!("{}", info);
        assert!(display.contains("PID ?"));
        assert!(display.contains("uid=0"));
        assert!(info.exe_path.is_none());
    }

    #[test]
    fn test_nonexistent_pid_has_no_exe() {
        // PID 0 is the kernel; /proc/0/exe is never readable.
        let info = PeerInfo::from_credentials(Some(0), 0, 0);
        assert!(info.exe_path.is_none());
    }
}
