use std::future::Future;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use itertools::Itertools;
use respcli::codec::DEFAULT_MAX_FRAME_SIZE;
use respcli::config::{DEFAULT_HOST, DEFAULT_PORT};
use respcli::session::{is_command, Session};
use respcli::{Config, Error, OutputMode, Target, TlsConfig};
use tokio::sync::mpsc;
use tracing::{debug, Level};

/// When no command is given, respcli starts in interactive mode.
#[derive(Parser, Debug)]
#[command(name = "respcli", version, about, disable_help_flag = true)]
struct Args {
    /// Server hostname
    #[arg(short = 'h', value_name = "hostname", default_value = DEFAULT_HOST)]
    hostname: String,

    /// Server port
    #[arg(short = 'p', value_name = "port", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Server socket (overrides hostname and port)
    #[arg(short = 's', value_name = "socket")]
    socket: Option<PathBuf>,

    /// Password to use when connecting to the server
    #[arg(
        short = 'a',
        value_name = "password",
        env = "REDISCLI_AUTH",
        hide_env_values = true
    )]
    password: Option<String>,

    /// Used to send ACL style 'AUTH username pass'. Needs -a
    #[arg(long, value_name = "username")]
    user: Option<String>,

    /// Alias of -a for consistency with the new --user option
    #[arg(long, value_name = "password")]
    pass: Option<String>,

    /// Read the password from STDIN, -a and REDISCLI_AUTH are ignored
    #[arg(long)]
    askpass: bool,

    /// Execute specified command N times
    #[arg(short = 'r', value_name = "repeat", default_value_t = 1)]
    repeat: u64,

    /// When -r is used, waits <interval> seconds per command. Sub-second times like 0.1 work
    #[arg(
        short = 'i',
        value_name = "interval",
        default_value_t = 0.0,
        allow_negative_numbers = true
    )]
    interval: f64,

    /// Database number
    #[arg(short = 'n', value_name = "db", default_value_t = 0)]
    db: i64,

    /// Return exit error code when command execution fails
    #[arg(short = 'e')]
    exit_error: bool,

    /// Establish a secure TLS connection
    #[arg(long)]
    tls: bool,

    /// Server name indication for TLS
    #[arg(long, value_name = "host")]
    sni: Option<String>,

    /// CA Certificate file to verify with
    #[arg(long, value_name = "file")]
    cacert: Option<PathBuf>,

    /// Directory where trusted CA certificates are stored
    #[arg(long, value_name = "dir")]
    cacertdir: Option<PathBuf>,

    /// Allow insecure TLS connection by skipping cert validation
    #[arg(long)]
    insecure: bool,

    /// Client certificate to authenticate with
    #[arg(long, value_name = "file")]
    cert: Option<PathBuf>,

    /// Private key file to authenticate with
    #[arg(long, value_name = "file")]
    key: Option<PathBuf>,

    /// Use raw formatting for replies (default when STDOUT is not a tty)
    #[arg(long)]
    raw: bool,

    /// Force formatted output even when STDOUT is not a tty
    #[arg(long)]
    no_raw: bool,

    /// List all keys using the SCAN command
    #[arg(long)]
    scan: bool,

    /// Keys pattern when using --scan
    #[arg(long, value_name = "pat", default_value = "*")]
    pattern: String,

    /// Count option when using --scan
    #[arg(long, value_name = "count", default_value_t = 10)]
    count: u64,

    /// Largest reply, in bytes, buffered before giving up
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Log protocol traffic to STDERR
    #[arg(long)]
    verbose: bool,

    /// Output this help and exit
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Command and arguments, sent as a single line
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "cmd"
    )]
    command: Vec<String>,
}

impl Args {
    /// `--askpass` wins, then `--pass`, then `-a` or REDISCLI_AUTH.
    fn resolve_password(&self) -> io::Result<Option<String>> {
        if self.askpass {
            let password = rpassword::prompt_password("Please input password: ")?;
            return Ok(Some(password).filter(|p| !p.is_empty()));
        }

        let non_empty = |password: &Option<String>| password.clone().filter(|p| !p.is_empty());
        Ok(non_empty(&self.pass).or_else(|| non_empty(&self.password)))
    }

    fn into_config(self, password: Option<String>) -> Config {
        let target = match self.socket {
            Some(path) => Target::Unix(path),
            None => Target::Tcp {
                host: self.hostname,
                port: self.port,
            },
        };

        let tls = self.tls.then(|| TlsConfig {
            sni: self.sni,
            cacert: self.cacert,
            cacertdir: self.cacertdir,
            cert: self.cert,
            key: self.key,
            insecure: self.insecure,
        });

        Config {
            target,
            tls,
            user: self.user,
            password,
            db: self.db,
            output_mode: OutputMode::resolve(self.raw, self.no_raw, io::stdout().is_terminal()),
            repeat: self.repeat,
            interval: Duration::try_from_secs_f64(self.interval).unwrap_or(Duration::ZERO),
            pattern: self.pattern,
            count: self.count,
            max_frame_size: self.max_frame_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Error> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .try_init()
        .map_err(|e| eprintln!("Failed to initialize global tracing: {}", e));

    let password = args.resolve_password()?;
    let exit_error = args.exit_error;
    let scan = args.scan;
    let command = args.command.iter().join(" ");

    let mut session = Session::new(args.into_config(password));

    let failed = if scan {
        session.connect().await.is_err() || session.scan_repeated().await.is_err()
    } else if !command.is_empty() {
        match session.connect().await {
            Ok(()) => match session.run_repeated(&command).await {
                Ok(reply) => reply.is_error(),
                Err(_) => true,
            },
            Err(_) => true,
        }
    } else {
        let lines = spawn_line_reader(io::BufReader::new(io::stdin()));
        interactive(&mut session, lines, tokio::signal::ctrl_c()).await?;
        false
    };

    session.close();

    if failed && exit_error {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Reads lines on a plain thread. A blocking read on stdin cannot be cancelled, inside the runtime
/// it would keep the process alive after Ctrl-C until the next line arrives.
fn spawn_line_reader<R>(reader: R) -> mpsc::UnboundedReceiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in reader.lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    rx
}

async fn interactive<F>(
    session: &mut Session,
    lines: mpsc::UnboundedReceiver<io::Result<String>>,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future,
{
    tokio::select! {
        result = read_eval_print(session, lines) => result,
        _ = shutdown => {
            debug!("interrupted");
            println!();
            Ok(())
        }
    }
}

async fn read_eval_print(
    session: &mut Session,
    mut lines: mpsc::UnboundedReceiver<io::Result<String>>,
) -> Result<(), Error> {
    // A failed first connect is retried before the next command.
    let _ = session.connect().await;

    loop {
        print!("{}> ", session.prompt());
        io::stdout().flush()?;

        let Some(line) = lines.recv().await.transpose()? else {
            println!();
            return Ok(());
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_command(line, "exit") || is_command(line, "quit") {
            return Ok(());
        }

        if !session.is_connected() && session.connect().await.is_err() {
            continue;
        }

        // The session already reported any failure.
        let _ = session.execute_and_print(line).await;
    }
}
