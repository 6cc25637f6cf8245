use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;

/// Where the server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Target::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// How replies are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// No type annotations or quoting, meant for pipes and scripts.
    Raw,
    /// `(integer) 1`, `"quoted"`, `1) ` prefixes.
    Formatted,
}

impl OutputMode {
    /// `--no-raw` wins over everything, otherwise output is raw when asked for or when stdout is
    /// not a terminal.
    pub fn resolve(raw: bool, no_raw: bool, is_tty: bool) -> Self {
        if no_raw {
            OutputMode::Formatted
        } else if raw || !is_tty {
            OutputMode::Raw
        } else {
            OutputMode::Formatted
        }
    }
}

/// TLS settings. Only used for TCP targets.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Server name to verify and send as SNI, defaults to the target host.
    pub sni: Option<String>,
    pub cacert: Option<PathBuf>,
    pub cacertdir: Option<PathBuf>,
    /// Client certificate, requires `key`.
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// Skip server certificate verification.
    pub insecure: bool,
}

/// Everything a [`Session`](crate::session::Session) needs to connect and run commands.
#[derive(Debug, Clone)]
pub struct Config {
    pub target: Target,
    pub tls: Option<TlsConfig>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database selected right after connecting, 0 means no SELECT is sent.
    pub db: i64,
    pub output_mode: OutputMode,
    /// How many times a command is executed.
    pub repeat: u64,
    /// Pause between repeated executions.
    pub interval: Duration,
    /// SCAN MATCH pattern.
    pub pattern: String,
    /// SCAN COUNT hint.
    pub count: u64,
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: Target::Tcp {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
            tls: None,
            user: None,
            password: None,
            db: 0,
            output_mode: OutputMode::Formatted,
            repeat: 1,
            interval: Duration::ZERO,
            pattern: "*".to_string(),
            count: 10,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_mode_resolution() {
        use OutputMode::{Formatted, Raw};

        assert_eq!(OutputMode::resolve(false, false, true), Formatted);
        assert_eq!(OutputMode::resolve(false, false, false), Raw);
        assert_eq!(OutputMode::resolve(true, false, true), Raw);
        assert_eq!(OutputMode::resolve(true, true, false), Formatted);
        assert_eq!(OutputMode::resolve(false, true, false), Formatted);
    }

    #[test]
    fn target_display() {
        let tcp = Target::Tcp {
            host: "localhost".to_string(),
            port: 6380,
        };
        assert_eq!(tcp.to_string(), "localhost:6380");

        let unix = Target::Unix(PathBuf::from("/tmp/redis.sock"));
        assert_eq!(unix.to_string(), "/tmp/redis.sock");
    }
}
