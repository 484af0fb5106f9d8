//! A simple binary that puts the terminal in raw mode and prints every byte
//! it reads, plus window resizes. Useful for debugging input handling.
//!
//! Press Ctrl+C or 'q' to exit.

use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use fresh_tty::services::tracing_setup;
use fresh_tty::{TerminalDevice, TtyConfig};
use std::fmt::Arguments;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Weak};
use std::thread;

#[derive(Parser, Debug)]
#[command(name = "tty_debug")]
#[command(about = "Print raw terminal input bytes and resize events", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file (default: system temp dir)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Open /dev/tty instead of stdin/stdout
    #[arg(long)]
    dev_tty: bool,

    /// Also print every chunk received through the input mirror
    #[arg(long)]
    mirror: bool,
}

fn log_line(device: &TerminalDevice, args: Arguments<'_>) {
    // Raw mode disables output processing, so return the carriage explicitly.
    let line = format!("{args}\r\n");
    let _ = device.write(line.as_bytes());
}

macro_rules! log_line {
    ($device:expr, $($arg:tt)*) => {
        log_line($device, format_args!($($arg)*))
    };
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .unwrap_or_else(|| std::env::temp_dir().join("fresh-tty-debug.log"));
    tracing_setup::init_global(&log_file)
        .with_context(|| format!("Failed to set up logging to {}", log_file.display()))?;

    let config = match &args.config {
        Some(path) => TtyConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TtyConfig::default(),
    };

    println!("TTY Debug Tool");
    println!("==============");
    println!("Press Ctrl+C or 'q' to exit.\n");

    let mut mirror_thread = None;
    let device = if args.dev_tty {
        TerminalDevice::open_dev_tty(config)?
    } else if args.mirror {
        let (tx, rx) = config.mirror_channel();
        mirror_thread = Some(spawn_mirror_printer(rx));
        TerminalDevice::open_mirrored(config, tx)?
    } else {
        TerminalDevice::open(config)?
    };
    let device = Arc::new(device);

    let weak: Weak<TerminalDevice> = Arc::downgrade(&device);
    device.notify_resize(Some(Arc::new(move || {
        if let Some(device) = weak.upgrade() {
            let size = device.window_size();
            log_line!(&device, "Resize: width={}, height={}", size.cols, size.rows);
        }
    })));

    device.start().context("Failed to enter raw mode")?;

    let size = device.window_size();
    log_line!(&device, "Size: width={}, height={}", size.cols, size.rows);

    let result = run_read_loop(&device);

    device
        .stop()
        .context("Failed to restore terminal mode; run `reset` to recover")?;
    device.close()?;
    drop(device);

    if let Some(handle) = mirror_thread {
        let _ = handle.join();
    }

    println!("\nExiting.");
    result
}

fn run_read_loop(device: &TerminalDevice) -> AnyhowResult<()> {
    let mut buf = [0u8; 256];
    loop {
        let n = match device.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read from terminal"),
        };

        let bytes = &buf[..n];
        let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
        log_line!(
            device,
            "Read {} bytes: {} {:?}",
            n,
            hex.join(" "),
            String::from_utf8_lossy(bytes)
        );

        // Exit on Ctrl+C or 'q'
        if bytes.contains(&0x03) || bytes == b"q" {
            break;
        }
    }
    Ok(())
}

fn spawn_mirror_printer(rx: mpsc::Receiver<Vec<u8>>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        // Ends when the device, and with it the sender, is dropped.
        for chunk in rx {
            let mut err = io::stderr();
            let _ = write!(err, "[mirror] {} bytes\r\n", chunk.len());
        }
    })
}
