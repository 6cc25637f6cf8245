use std::io::{self, Stdout, Write};

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::connection::{Connection, Error};
use crate::format;
use crate::frame::Frame;

/// A client session: one connection, the tracked database and an output sink.
///
/// Commands are strictly sequential, every method that talks to the server takes `&mut self` and
/// reads the full reply before returning.
pub struct Session<W: Write = Stdout> {
    config: Config,
    connection: Option<Connection>,
    db: i64,
    output: W,
}

impl Session<Stdout> {
    pub fn new(config: Config) -> Self {
        Self::with_output(config, io::stdout())
    }
}

impl<W: Write> Session<W> {
    pub fn with_output(config: Config, output: W) -> Self {
        let db = config.db;
        Self {
            config,
            connection: None,
            db,
            output,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The database the session believes is selected.
    pub fn db(&self) -> i64 {
        self.db
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Connects, then authenticates and selects the tracked database.
    ///
    /// Only a failure to establish the connection is an error. AUTH and SELECT failures are
    /// reported to the output and leave the session connected.
    #[instrument(skip(self), fields(target = %self.config.target))]
    pub async fn connect(&mut self) -> Result<(), Error> {
        self.close();

        let connection = match Connection::open(
            &self.config.target,
            self.config.tls.as_ref(),
            self.config.max_frame_size,
        )
        .await
        {
            Ok(connection) => connection,
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        };
        self.connection = Some(connection);
        info!("connected");

        // SELECT is pointless when the connection broke during AUTH.
        if self.auth().await.is_ok() {
            let _ = self.select_db().await;
        }

        Ok(())
    }

    async fn auth(&mut self) -> Result<(), Error> {
        let Some(password) = self.config.password.as_deref() else {
            return Ok(());
        };
        let command = match self.config.user.as_deref() {
            Some(user) => format!("AUTH {} {}", user, password),
            None => format!("AUTH {}", password),
        };

        if let Frame::Error(msg) = self.execute(&command).await? {
            warn!("authentication failed");
            writeln!(self.output, "AUTH failed: {}", msg)?;
        }

        Ok(())
    }

    async fn select_db(&mut self) -> Result<(), Error> {
        if self.db == 0 {
            return Ok(());
        }

        let command = format!("SELECT {}", self.db);
        if let Frame::Error(msg) = self.execute(&command).await? {
            warn!(db = self.db, "database selection failed");
            writeln!(self.output, "SELECT {} failed: {}", self.db, msg)?;
            self.db = 0;
        }

        Ok(())
    }

    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            debug!("connection closed");
        }
    }

    /// Sends `line` and returns the decoded reply without printing it.
    ///
    /// Failures are reported to the output. The connection is dropped on failure since a reply may
    /// have been left half read.
    pub async fn execute(&mut self, line: &str) -> Result<Frame, Error> {
        let result = self.round_trip(line).await;

        if let Err(err) = &result {
            self.close();
            self.report(err);
        }

        result
    }

    async fn round_trip(&mut self, line: &str) -> Result<Frame, Error> {
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;

        debug!(command = %redact(line), "sending command");
        connection.write_line(line).await?;

        let frame = connection.read_frame().await?.ok_or(Error::Closed)?;
        debug!(reply = %frame, "received reply");

        Ok(frame)
    }

    /// Executes `line` and renders the reply.
    ///
    /// `INFO` payloads are written verbatim in every mode. A successful `SELECT <n>` updates the
    /// tracked database from the command text, a failed one resets it to 0.
    pub async fn execute_and_print(&mut self, line: &str) -> Result<Frame, Error> {
        let reply = self.execute(line).await?;

        match &reply {
            Frame::Bulk(payload) if is_command(line, "info") => self.output.write_all(payload)?,
            reply => self.print(reply)?,
        }
        self.output.flush()?;

        if is_command(line, "select") {
            self.track_select(line, &reply);
        }

        Ok(reply)
    }

    fn track_select(&mut self, line: &str, reply: &Frame) {
        match reply {
            Frame::Simple(status) if status == "OK" => {
                self.db = line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|db| db.parse().ok())
                    .unwrap_or(0);
            }
            Frame::Error(_) => self.db = 0,
            _ => {}
        }
    }

    /// Runs `line` the configured number of times, pausing between runs.
    ///
    /// Stops at the first failure. Returns the last reply.
    pub async fn run_repeated(&mut self, line: &str) -> Result<Frame, Error> {
        let mut reply = self.execute_and_print(line).await?;
        for _ in 1..self.config.repeat.max(1) {
            self.pause().await;
            reply = self.execute_and_print(line).await?;
        }

        Ok(reply)
    }

    /// Runs a full `scan` the configured number of times, pausing between cycles.
    pub async fn scan_repeated(&mut self) -> Result<(), Error> {
        self.scan().await?;
        for _ in 1..self.config.repeat.max(1) {
            self.pause().await;
            self.scan().await?;
        }

        Ok(())
    }

    async fn pause(&self) {
        if !self.config.interval.is_zero() {
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Lists every key matching the configured pattern with SCAN.
    ///
    /// Keys are printed page by page as they arrive. The loop ends when the server hands back
    /// cursor `0`.
    pub async fn scan(&mut self) -> Result<(), Error> {
        let mut cursor = String::from("0");

        loop {
            let command = format!(
                "SCAN {} MATCH {} COUNT {}",
                cursor, self.config.pattern, self.config.count
            );

            // A page is `[cursor, [key, ...]]`.
            let (next, keys) = match self.execute(&command).await? {
                Frame::Array(page) => match <[Frame; 2]>::try_from(page) {
                    Ok([Frame::Bulk(next), Frame::Array(keys)]) => (next, keys),
                    Ok(page) => return Err(self.unexpected_reply(Frame::Array(page.into()))),
                    Err(page) => return Err(self.unexpected_reply(Frame::Array(page))),
                },
                reply => return Err(self.unexpected_reply(reply)),
            };

            for key in &keys {
                self.print(key)?;
            }
            self.output.flush()?;

            cursor = String::from_utf8_lossy(&next).into_owned();
            if cursor == "0" {
                return Ok(());
            }
        }
    }

    /// Renders `frame` in the configured output mode.
    pub fn print(&mut self, frame: &Frame) -> Result<(), Error> {
        format::write_frame(&mut self.output, frame, self.config.output_mode)?;
        Ok(())
    }

    /// The prompt prefix: `host:port`, `host:port[db]` or `not connected`.
    pub fn prompt(&self) -> String {
        if !self.is_connected() {
            return "not connected".to_string();
        }

        if self.db != 0 {
            format!("{}[{}]", self.config.target, self.db)
        } else {
            self.config.target.to_string()
        }
    }

    fn unexpected_reply(&mut self, reply: Frame) -> Error {
        if reply.is_error() {
            let _ = self.print(&reply);
            let _ = self.output.flush();
            return Error::UnexpectedReply(reply);
        }

        let err = Error::UnexpectedReply(reply);
        self.report(&err);
        err
    }

    fn report(&mut self, err: &Error) {
        debug!(%err, "command failed");
        // Nothing sensible left to do when the output itself is broken.
        let _ = writeln!(self.output, "{}", err);
        let _ = self.output.flush();
    }
}

/// Whether the first word of `line` is `command`, ignoring case.
pub fn is_command(line: &str, command: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|name| name.eq_ignore_ascii_case(command))
}

// Keeps passwords out of the logs.
fn redact(line: &str) -> &str {
    if is_command(line, "auth") {
        "AUTH <redacted>"
    } else {
        line
    }
}
