//! Operator controls
//!
//! Abort and reset commands typed on the kiosk terminal, plus Ctrl-C. Input is
//! read on helper threads and delivered to the scan loop over a channel so all
//! scanning state stays on one thread.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::io::BufRead;
use tracing::{debug, info, warn};

/// Command sent to the scan loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Stop scanning and release the camera
    Abort,
    /// Forget the card currently being read
    Reset,
}

/// Parses a key binding like "q", "R" or "Esc" into its canonical form
pub fn parse_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Empty key binding"));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(anyhow!("Key binding must be a single token: {:?}", key));
    }

    let canonical = match key.to_uppercase().as_str() {
        "ESCAPE" | "ESC" => "ESC".to_string(),
        "SPACE" => " ".to_string(),
        other => other.to_string(),
    };
    Ok(canonical)
}

/// Key bindings for the operator commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlKeys {
    abort: String,
    reset: String,
}

impl Default for ControlKeys {
    fn default() -> Self {
        Self {
            abort: "Q".to_string(),
            reset: "R".to_string(),
        }
    }
}

impl ControlKeys {
    pub fn new(abort: &str, reset: &str) -> Result<Self> {
        let abort = parse_key(abort).context("Invalid abort key")?;
        let reset = parse_key(reset).context("Invalid reset key")?;
        if abort == reset {
            return Err(anyhow!("Abort and reset keys must differ ({:?})", abort));
        }
        Ok(Self { abort, reset })
    }

    /// Command for one line of terminal input
    pub fn command_for(&self, line: &str) -> Option<ControlCommand> {
        let input = if line.trim().is_empty() && line.contains(' ') {
            " ".to_string()
        } else {
            parse_key(line).ok()?
        };

        if input == self.abort {
            Some(ControlCommand::Abort)
        } else if input == self.reset {
            Some(ControlCommand::Reset)
        } else {
            None
        }
    }
}

/// Receiving end of the operator controls
pub struct ControlListener {
    receiver: Receiver<ControlCommand>,
}

impl ControlListener {
    /// Listener fed by an existing channel
    pub fn from_receiver(receiver: Receiver<ControlCommand>) -> Self {
        Self { receiver }
    }

    /// Listener that never receives anything
    pub fn disabled() -> Self {
        let (_sender, receiver) = crossbeam_channel::unbounded();
        Self { receiver }
    }

    /// Start the terminal and Ctrl-C listeners
    pub fn spawn(keys: ControlKeys, read_stdin: bool, handle_ctrl_c: bool) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();

        if read_stdin {
            let tx = sender.clone();
            std::thread::Builder::new()
                .name("control-stdin".to_string())
                .spawn(move || read_terminal(keys, tx))
                .context("Failed to start terminal control thread")?;
        }

        if handle_ctrl_c {
            let tx = sender.clone();
            std::thread::Builder::new()
                .name("control-signal".to_string())
                .spawn(move || wait_for_ctrl_c(tx))
                .context("Failed to start signal thread")?;
        }

        info!(
            "Operator controls ready (terminal: {}, ctrl-c: {})",
            read_stdin, handle_ctrl_c
        );
        Ok(Self::from_receiver(receiver))
    }

    /// Next pending command, if any
    pub fn poll(&self) -> Option<ControlCommand> {
        match self.receiver.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

fn read_terminal(keys: ControlKeys, sender: Sender<ControlCommand>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Terminal input error: {}", e);
                break;
            }
        };

        if let Some(command) = keys.command_for(&line) {
            debug!("Operator command {:?}", command);
            if sender.send(command).is_err() {
                break;
            }
        }
    }
    debug!("Terminal control closed");
}

fn wait_for_ctrl_c(sender: Sender<ControlCommand>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("Ctrl-C handling unavailable: {}", e);
            return;
        }
    };

    match runtime.block_on(tokio::signal::ctrl_c()) {
        Ok(()) => {
            info!("Ctrl-C received");
            let _ = sender.send(ControlCommand::Abort);
        }
        Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
    }
}
