//! Subprocess execution with concurrent output draining
//!
//! Runs one external tool to completion while two reader threads drain its
//! stdout and stderr into channels. The forwarding loop decodes the bytes,
//! echoes them to the console behind a visual prefix, and hands every
//! complete stdout line to the caller's [`LineParser`]. The loop only
//! terminates once both channels are drained *and* closed and the child
//! has been reaped; checking exit first could lose trailing buffered
//! output.
//!
//! A non-zero exit is returned, not raised: some tools (image installers
//! in particular) exit non-zero for already-installed items, and the
//! caller decides whether that is fatal for its phase.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{LodestarError, Result};
use crate::parsers::LineParser;
use crate::process_guard::{ChildRegistry, CommandProcessGroup};

/// Visual prefix prepended to every forwarded tool output line.
pub const OUTPUT_PREFIX: &str = "┃ ";

/// Sleep between polls while both streams are quiet and the child runs.
const DRAIN_IDLE: Duration = Duration::from_millis(25);

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Full decoded stdout text
    pub stdout: String,
    /// Full decoded stderr text
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    /// Whether the tool exited with code 0
    pub success: bool,
}

impl ToolOutput {
    /// Check that the tool succeeded and return an error if not, for the
    /// callers that do treat non-zero as fatal.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(LodestarError::system(format!(
                "{} failed (exit code {}): {}",
                context,
                self.exit_code.unwrap_or(-1),
                self.stderr.trim()
            )))
        }
    }
}

/// Run `cmd` to completion, echoing both streams to the console with
/// `prefix` and feeding each complete stdout line to `parser`.
pub fn run_with_line_parse(
    cmd: &[String],
    prefix: &str,
    parser: &mut dyn LineParser,
) -> Result<ToolOutput> {
    let (program, args) = cmd
        .split_first()
        .ok_or_else(|| LodestarError::system("empty command line"))?;
    debug!("running {:?}", cmd);

    // Open the prefixed block; the substitution below continues it
    print!("\n{prefix}");
    let _ = std::io::stdout().flush();

    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .in_new_process_group()
        .spawn()
        .map_err(|e| LodestarError::system(format!("failed to spawn {}: {}", program, e)))?;

    let pid = child.id();
    {
        let registry = ChildRegistry::global();
        let mut guard = registry.lock().expect("child registry mutex poisoned");
        guard.register(pid);
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LodestarError::state("child stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| LodestarError::state("child stderr was not piped"))?;
    let out_rx = spawn_reader(stdout);
    let err_rx = spawn_reader(stderr);

    let nl_prefix = format!("\n{prefix}");
    let mut out_buf = StreamBuffer::default();
    let mut err_buf = StreamBuffer::default();
    let mut out_open = true;
    let mut err_open = true;

    let wait_result: std::io::Result<ExitStatus> = loop {
        let mut moved = false;

        moved |= pump(&out_rx, &mut out_buf, &mut out_open);
        for line in out_buf.take_lines() {
            parser.on_line(&line);
        }
        let chunk = out_buf.take_display();
        if !chunk.is_empty() {
            print!("{}", chunk.replace('\n', &nl_prefix));
            let _ = std::io::stdout().flush();
        }

        moved |= pump(&err_rx, &mut err_buf, &mut err_open);
        err_buf.take_lines();
        let chunk = err_buf.take_display();
        if !chunk.is_empty() {
            eprint!("{}", chunk.replace('\n', &nl_prefix));
            let _ = std::io::stderr().flush();
        }

        if !out_open && !err_open {
            // Both streams hit EOF and their queues are drained; reap
            break child.wait();
        }
        if !moved {
            thread::sleep(DRAIN_IDLE);
        }
    };

    {
        let registry = ChildRegistry::global();
        let mut guard = registry.lock().expect("child registry mutex poisoned");
        guard.unregister(pid);
    }
    println!();

    if !out_buf.pending.is_empty() {
        warn!("stdout ended with {} undecodable byte(s): {:?}", out_buf.pending.len(), out_buf.pending);
    }
    if !err_buf.pending.is_empty() {
        warn!("stderr ended with {} undecodable byte(s): {:?}", err_buf.pending.len(), err_buf.pending);
    }

    let status = wait_result?;
    let exit_code = status.code();
    if !status.success() {
        warn!("{} exited with {:?}", program, exit_code);
    }

    Ok(ToolOutput {
        stdout: out_buf.text,
        stderr: err_buf.text,
        exit_code,
        success: status.success(),
    })
}

/// One blocking reader per stream, forwarding raw chunks over a channel.
/// The channel disconnects exactly at stream EOF, which gives the main
/// loop its termination signal without polling the child first.
fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
    rx
}

/// Drain everything currently queued on `rx` into `buf`. Flips `open` to
/// false once the sender is gone and the queue is empty.
fn pump(rx: &Receiver<Vec<u8>>, buf: &mut StreamBuffer, open: &mut bool) -> bool {
    if !*open {
        return false;
    }
    let mut moved = false;
    loop {
        match rx.try_recv() {
            Ok(chunk) => {
                buf.push_bytes(&chunk);
                moved = true;
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                *open = false;
                break;
            }
        }
    }
    moved
}

/// Buffers raw bytes from one stream until they decode as UTF-8, tracking
/// the full transcript, the pending display text, and complete lines.
#[derive(Default)]
struct StreamBuffer {
    /// Bytes that do not yet form a decodable unit
    pending: Vec<u8>,
    /// Full decoded transcript
    text: String,
    /// Decoded text since the last newline, for line extraction
    line: String,
    /// Decoded text since the last display flush
    fresh: String,
}

impl StreamBuffer {
    fn push_bytes(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(_) => {
                    let bytes = std::mem::take(&mut self.pending);
                    let decoded = String::from_utf8(bytes).unwrap_or_default();
                    self.absorb(&decoded);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    let bad = e.error_len();
                    if valid > 0 {
                        let decoded = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                        self.absorb(&decoded);
                    }
                    match bad {
                        // Incomplete sequence at the end; wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            warn!("dropping {} undecodable byte(s) from tool output", len);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    fn absorb(&mut self, decoded: &str) {
        self.text.push_str(decoded);
        self.line.push_str(decoded);
        self.fresh.push_str(decoded);
    }

    /// Extract complete lines, splitting on \n, \r\n or a bare \r (the
    /// package manager redraws progress lines with carriage returns).
    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.line.find(['\n', '\r']) {
            let mut end = pos + 1;
            if self.line.as_bytes()[pos] == b'\r' && self.line.as_bytes().get(end) == Some(&b'\n') {
                end += 1;
            }
            let raw: String = self.line.drain(..end).collect();
            lines.push(raw.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    fn take_display(&mut self) -> String {
        std::mem::take(&mut self.fresh)
    }
}
