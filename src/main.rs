use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;

use lightmesh::common::{Clock, MonotonicClock};
use lightmesh::mesh::{
    parse_hardware_id, Mailbox, MeshNode, MeshService, RngJitter, Role, Token, TOKEN_MAX,
};
use lightmesh::network::UdpTransport;
use lightmesh::pattern::RainbowPattern;
use lightmesh::{Config, Simulation};

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

#[derive(Parser)]
#[command(name = "lightmesh")]
#[command(about = "Coordinator-less leader election and frame streaming for LED nodes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a mesh node over UDP broadcast
    Node {
        /// JSON config file; missing keys take defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the shared UDP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Hardware address to derive the token from, e.g. 24:0a:c4:12:34:56
        #[arg(long, conflicts_with = "token")]
        hardware_id: Option<String>,

        /// Explicit 24-bit token (decimal or 0x-prefixed hex)
        #[arg(short, long, value_parser = parse_token)]
        token: Option<Token>,

        /// Override the output brightness (0-255)
        #[arg(short, long)]
        brightness: Option<u8>,

        /// Start in manual mode, outside the mesh
        #[arg(long)]
        manual: bool,
    },

    /// Run an in-memory simulation and print the outcome
    Simulate {
        /// Number of nodes
        #[arg(short, long, default_value_t = 3)]
        nodes: usize,

        /// Per-delivery loss probability
        #[arg(short, long, default_value_t = 0.0)]
        loss: f64,

        /// Virtual time to simulate
        #[arg(short, long, default_value_t = 10_000)]
        duration_ms: u64,

        /// Seed for tokens, jitter and loss
        #[arg(short, long, default_value_t = 1)]
        seed: u64,
    },

    /// Print the default configuration as JSON
    DefaultConfig,
}

fn parse_token(text: &str) -> Result<Token, String> {
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    }
    .map_err(|e| e.to_string())?;
    if value > TOKEN_MAX {
        return Err(format!("token must fit in 24 bits (max {TOKEN_MAX:#X})"));
    }
    Ok(Token::new(value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Node {
            config,
            port,
            hardware_id,
            token,
            brightness,
            manual,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path)
                    .with_context(|| format!("loading config from {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(port) = port {
                config.network.port = port;
            }
            if let Some(brightness) = brightness {
                config.mesh.brightness = brightness;
            }

            let token = match (token, hardware_id) {
                (Some(token), _) => token,
                (None, Some(hw)) => Token::from_hardware_id(&parse_hardware_id(&hw)?)?,
                (None, None) => {
                    let token = Token::new(rand::rng().random_range(1..=TOKEN_MAX));
                    warn!("No token or hardware id given, using random token {token}");
                    token
                }
            };
            run_node(config, token, !manual).await
        }
        Command::Simulate {
            nodes,
            loss,
            duration_ms,
            seed,
        } => simulate(nodes, loss, duration_ms, seed),
        Command::DefaultConfig => {
            println!("{}", Config::default().to_json()?);
            Ok(())
        }
    }
}

async fn run_node(config: Config, token: Token, participating: bool) -> anyhow::Result<()> {
    info!("Starting lightmesh node {token}");

    let clock = Arc::new(MonotonicClock::new());
    let (tx, mailbox) = Mailbox::channel(config.mesh.mailbox_capacity);
    let transport = UdpTransport::bind(&config.network, tx).await?;
    let node = MeshNode::new(
        token,
        config.mesh.clone(),
        Box::new(RngJitter::from_os_rng()),
        clock.now_ms(),
    )?
    .with_participating(participating);

    let (mode_tx, mode_rx) = watch::channel(participating);
    let service = MeshService::new(
        node,
        mailbox,
        transport,
        RainbowPattern::default(),
        clock,
        mode_rx,
    );

    let mut status = service.subscribe();
    tokio::spawn(async move {
        let mut last_role: Option<Role> = None;
        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            if last_role != Some(snapshot.role) {
                info!(
                    "Node {} is {} (highest seen {}, participating: {})",
                    snapshot.token, snapshot.role, snapshot.highest_token_seen, snapshot.participating
                );
                last_role = Some(snapshot.role);
            }
        }
    });

    // "auto" / "manual" on stdin switch the mode. A plain thread, so a
    // pending read never holds up runtime shutdown.
    std::thread::spawn(move || read_mode_lines(std::io::stdin().lock(), &mode_tx));

    tokio::select! {
        _ = service.run() => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutting down");
        }
    }
    Ok(())
}

fn read_mode_lines(input: impl BufRead, mode: &watch::Sender<bool>) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "auto" => {
                mode.send_replace(true);
            }
            "manual" => {
                mode.send_replace(false);
            }
            "" => {}
            other => warn!("Unknown mode '{other}', expected 'auto' or 'manual'"),
        }
    }
}

fn simulate(nodes: usize, loss: f64, duration_ms: u64, seed: u64) -> anyhow::Result<()> {
    if nodes == 0 {
        bail!("need at least one node");
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let tokens: Vec<Token> = (0..nodes)
        .map(|_| Token::new(rng.random_range(1..=TOKEN_MAX)))
        .collect();

    let mut sim = Simulation::new(&tokens, lightmesh::MeshConfig::default(), loss, seed)?;
    for (i, event) in sim.run_for(duration_ms) {
        info!("[{}] node {i} ({}): {event:?}", sim.now_ms(), tokens[i]);
    }

    println!("After {}ms:", sim.now_ms());
    for (i, token) in tokens.iter().enumerate() {
        let node = sim.node(i);
        println!(
            "  node {i} {token}: {} frames shown {} chunks sent {}",
            node.role(),
            sim.pattern(i).frames_shown(),
            node.stats().chunks_sent
        );
    }
    let (delivered, dropped) = sim.hub().counters();
    println!("  datagrams delivered {delivered} dropped {dropped}");
    Ok(())
}
