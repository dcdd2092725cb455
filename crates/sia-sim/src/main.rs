//! SIA-DCS test traffic generator.
//!
//! Builds protocol-correct SIA-DCS frames (CRC-16/ARC, correct LENGTH,
//! optional AES-CBC encryption for keyed accounts) and sends them over
//! TCP to a receiver, printing the ACK/NAK/DUH response. Port of
//! `original_source/sia_simulator.py`'s scripted scenario list and
//! interactive mode, built with `clap` the way `packet-analyzer` and
//! `ro2-patcher` structure their standalone CLIs.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

use sia_common::crypto::{AesKey, encrypt_cbc_zero_iv, pad_front_to_block};
use sia_common::frame::Frame;

#[derive(Parser)]
#[command(name = "sia-sim")]
#[command(about = "SIA-DCS protocol traffic generator", long_about = None)]
struct Cli {
    /// Target host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Target port.
    #[arg(long, default_value_t = 65100)]
    port: u16,
    /// Account id to send as.
    #[arg(long, default_value = "AAA")]
    account: String,
    /// Hex-encoded AES key (16/24/32 bytes), if the account is encrypted.
    #[arg(long)]
    key: Option<String>,
    /// Receiver id (`R` field).
    #[arg(long, default_value = "1")]
    receiver: String,
    /// Line/partition id (`L` field).
    #[arg(long, default_value = "1")]
    line: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the canned scenario list (one frame per alarm code).
    Test,
    /// Send a single custom event code/zone pair.
    Send {
        /// Two-letter SIA event code, e.g. BA, FA, PA.
        code: String,
        /// Zone number; "000" is conventionally a heartbeat/no-zone event.
        #[arg(default_value = "001")]
        zone: String,
    },
    /// Read `send <code> <zone>` / `test` / `quit` commands from stdin.
    Interactive,
}

/// `(code, zone, description)` — same scenario list as the original
/// simulator's `test_scenarios`.
const SCENARIOS: &[(&str, &str, &str)] = &[
    ("BA", "001", "Burglary Alarm - Zone 001"),
    ("FA", "002", "Fire Alarm - Zone 002"),
    ("PA", "003", "Panic Alarm - Zone 003"),
    ("OP", "001", "Opening - Zone 001"),
    ("CL", "001", "Closing - Zone 001"),
    ("TA", "004", "Tamper Alarm - Zone 004"),
    ("CA", "001", "Cancel Alarm - Zone 001"),
    ("BR", "001", "Burglary Restore - Zone 001"),
    ("YK", "000", "Heartbeat/Test Message"),
];

struct Simulator {
    host: String,
    port: u16,
    account: String,
    receiver: String,
    line: String,
    key: Option<AesKey>,
    sequence: u32,
}

impl Simulator {
    fn new(cli: &Cli) -> Result<Self> {
        let key = match &cli.key {
            Some(hex_key) => {
                let bytes = hex::decode(hex_key).context("--key is not valid hex")?;
                Some(AesKey::from_bytes(&bytes).context("--key must decode to 16, 24, or 32 bytes")?)
            }
            None => None,
        };
        Ok(Self {
            host: cli.host.clone(),
            port: cli.port,
            account: cli.account.clone(),
            receiver: cli.receiver.clone(),
            line: cli.line.clone(),
            key,
            sequence: 0,
        })
    }

    /// Build one `"SIA-DCS"<seq>R<receiver>L<line>#<account>[...]<ts>` frame.
    fn build_message(&mut self, code: &str, zone: &str) -> Vec<u8> {
        self.sequence += 1;
        let seq = self.sequence % 10_000;

        let zone_text = if zone == "000" { String::new() } else { zone.to_string() };
        let content_block = format!("#{}|N{}{}", self.account, code.to_uppercase(), zone_text);

        let (marker, bracket) = match &self.key {
            Some(key) => {
                let padded = pad_front_to_block(content_block.as_bytes());
                let ciphertext = encrypt_cbc_zero_iv(key, &padded).expect("already block-aligned");
                ("*SIA-DCS", hex::encode_upper(ciphertext))
            }
            None => ("\"SIA-DCS\"", content_block.clone()),
        };

        let timestamp = Utc::now().format("_%H:%M:%S,%m-%d-%Y").to_string();
        let body = format!(
            "{marker}{seq:04}R{}L{}#{}[{bracket}]{timestamp}",
            self.receiver, self.line, self.account
        );

        let mut wire = Frame::new(body.into_bytes()).encode();
        wire.extend_from_slice(b"\r\n");
        wire
    }

    async fn send(&mut self, code: &str, zone: &str) -> Result<String> {
        let wire = self.build_message(code, zone);
        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;

        stream.write_all(&wire).await?;
        stream.flush().await?;
        println!("-> sent: {}", String::from_utf8_lossy(&wire).trim());

        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .context("timed out waiting for response")??;
        if n == 0 {
            bail!("connection closed with no response");
        }
        let response = String::from_utf8_lossy(&buf[..n]).trim().to_string();
        println!("<- response: {response}");
        Ok(response)
    }

    async fn run_scenarios(&mut self) -> Result<()> {
        println!("{}", "=".repeat(60));
        println!("SIA-DCS Protocol Simulator");
        println!("Target: {}:{}  Account: {}", self.host, self.port, self.account);
        println!("{}", "=".repeat(60));

        for (code, zone, description) in SCENARIOS {
            println!("\n[test] {description}");
            self.send(code, zone).await?;
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        println!("\n{}", "=".repeat(60));
        println!("scenarios complete");
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        println!("commands: 'send <code> <zone>', 'test', 'quit'");
        let stdin = io::stdin();
        print!("> ");
        io::stdout().flush().ok();
        for line in stdin.lock().lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                print!("> ");
                io::stdout().flush().ok();
                continue;
            }
            match trimmed.split_whitespace().collect::<Vec<_>>().as_slice() {
                ["quit"] | ["exit"] | ["q"] => break,
                ["test"] => self.run_scenarios().await?,
                ["send", code] => {
                    self.send(code, "001").await?;
                }
                ["send", code, zone] => {
                    self.send(code, zone).await?;
                }
                _ => println!("unknown command: {trimmed:?} (try 'send BA 001' or 'test')"),
            }
            print!("> ");
            io::stdout().flush().ok();
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .init();

    let cli = Cli::parse();
    let mut sim = Simulator::new(&cli)?;
    info!(host = %cli.host, port = cli.port, account = %cli.account, "sia-sim starting");

    match &cli.command {
        Commands::Test => sim.run_scenarios().await,
        Commands::Send { code, zone } => sim.send(code, zone).await.map(|_| ()),
        Commands::Interactive => sim.run_interactive().await,
    }
}
