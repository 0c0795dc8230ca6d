//! Room Relay Server - Main Entry Point
//!
//! TCP listener (optionally TLS) for room presence and signaling relay.

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::rustls::{self, pki_types::PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use room_relay::identity::{hash_password, StaticCredentials};
use room_relay::transport::serve_connection;
use room_relay::{LifecycleManager, ServerConfig};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "room-relay-server")]
#[command(about = "Room presence and signaling relay for peer-to-peer meetings")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/server.toml")]
    config: PathBuf,

    /// Override host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Override signaling port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (defaults to the config file's value)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the argon2 hash of a password for the `[accounts]` table and exit
    #[arg(long, value_name = "PASSWORD")]
    hash_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(password) = &args.hash_password {
        println!("{}", hash_password(password)?);
        return Ok(());
    }

    let config = if args.config.exists() {
        Some(ServerConfig::from_file(&args.config)?)
    } else {
        None
    };
    let config_found = config.is_some();
    let config = config.unwrap_or_default();

    let log_level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level)).init();

    if !config_found {
        info!("Config file {} not found, using defaults", args.config.display());
    }

    let host = args.host.unwrap_or_else(|| config.host.clone());
    let port = args.port.unwrap_or(config.port);

    let acceptor = match config.tls_paths() {
        Some((certfile, keyfile)) => {
            let tls_config = rustls::ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(load_certs(certfile)?, load_key(keyfile)?)?;
            Some(TlsAcceptor::from(Arc::new(tls_config)))
        }
        None => {
            warn!("No certfile/keyfile configured, serving plain TCP");
            None
        }
    };

    let credentials = StaticCredentials::new(&config.accounts)?;
    if credentials.is_empty() {
        info!("No accounts configured, authentication will always fail");
    }
    let manager = Arc::new(LifecycleManager::new(Arc::new(credentials)));
    let max_frame_bytes = config.max_frame_bytes;

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Room relay listening on {}", addr);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Accept failed: {}", e);
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let manager = manager.clone();

        tokio::spawn(async move {
            let peer = peer_addr.to_string();
            // serve_connection logs its own errors
            let _ = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        serve_connection(tls_stream, &peer, manager, max_frame_bytes).await
                    }
                    Err(e) => {
                        error!("TLS handshake failed for {}: {}", peer, e);
                        return;
                    }
                },
                None => serve_connection(stream, &peer, manager, max_frame_bytes).await,
            };
        });
    }
}

/// Load TLS certificates
fn load_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    Ok(certs)
}

/// Load TLS private key
fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let key = rustls_pemfile::private_key(&mut reader)?;
    key.ok_or_else(|| anyhow::anyhow!("No private key found in {}", path.display()))
}
