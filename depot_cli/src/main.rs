//! The `depot` binary: serve a package store, or publish, list and
//! download packages from one.

use anyhow::{Context, Result};
use chrono::TimeZone;
use clap::{Arg, Command};
use std::path::{Path, PathBuf};

use depot_core::config::AppConfig;
use depot_core::protocol::STATUS_OK;
use depot_core::{DepotClient, FileStore, StoreEntry, TRANSFER_PORT, TransferError};

/// Initialize the tracing subscriber. `RUST_LOG` controls the filter;
/// logs go to stderr so table output on stdout stays clean.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::load();

    let matches = Command::new("depot")
        .version("0.1.0")
        .about("A minimal package manager to set up a new machine on a local network.")
        .subcommand_required(true)
        .arg(
            Arg::new("server")
                .short('s')
                .long("server")
                .value_name("HOST")
                .global(true)
                .help("The server address (host or host:port)"),
        )
        .subcommand(
            Command::new("serve")
                .about("Run the transfer server")
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .value_name("DIR")
                        .help("Directory to store published archives in"),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_name("PORT")
                        .value_parser(clap::value_parser!(u16))
                        .help("Listen port"),
                ),
        )
        .subcommand(
            Command::new("publish")
                .about("Package a folder or file and publish it to the server")
                .arg(Arg::new("path").required(true).value_name("PATH")),
        )
        .subcommand(Command::new("list").about("List packages held by the server"))
        .subcommand(
            Command::new("download")
                .about("Download the first package whose name contains the query")
                .arg(Arg::new("query").required(true).value_name("QUERY"))
                .arg(
                    Arg::new("out")
                        .short('o')
                        .long("out")
                        .value_name("DIR")
                        .help("The download destination"),
                ),
        )
        .subcommand(
            Command::new("package")
                .about("Package a folder or file without publishing it")
                .arg(Arg::new("path").required(true).value_name("PATH")),
        )
        .get_matches();

    let server_for = |m: &clap::ArgMatches| -> Result<String> {
        m.get_one::<String>("server")
            .cloned()
            .or_else(|| config.server_addr.clone())
            .context("no server address: pass --server or set one in the config file")
    };

    match matches.subcommand() {
        Some(("serve", sub)) => {
            let dir = sub
                .get_one::<String>("dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| config.store_dir.clone());
            let port = sub
                .get_one::<u16>("port")
                .copied()
                .unwrap_or(TRANSFER_PORT);
            let store = FileStore::open(&dir)
                .await
                .with_context(|| format!("failed to open store directory {}", dir.display()))?;
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
                .await
                .with_context(|| format!("failed to bind port {port}"))?;
            tracing::info!("Serving {} on port {port}", dir.display());
            depot_core::run_server(listener, store).await;
        }
        Some(("publish", sub)) => {
            let path = PathBuf::from(sub.get_one::<String>("path").expect("required"));
            let client = DepotClient::new(server_for(sub)?);
            match client.publish(&path).await? {
                STATUS_OK => println!("Upload succeeded!"),
                code if code > 299 => {
                    println!("Upload failed. The remote server responded with code {code}")
                }
                code => println!("The remote server responded with code {code}"),
            }
        }
        Some(("list", sub)) => {
            let client = DepotClient::new(server_for(sub)?);
            let items = client.list().await?;
            render_listing(&items);
        }
        Some(("download", sub)) => {
            let query = sub.get_one::<String>("query").expect("required");
            let out = sub
                .get_one::<String>("out")
                .map(PathBuf::from)
                .unwrap_or_else(|| config.download_dir.clone());
            let client = DepotClient::new(server_for(sub)?);
            match client.download(query, &out).await {
                Ok(path) => println!("Downloaded to {}", path.display()),
                Err(TransferError::NotFound) => println!("No files available"),
                Err(e) => return Err(e.into()),
            }
        }
        Some(("package", sub)) => {
            let path = PathBuf::from(sub.get_one::<String>("path").expect("required"));
            let archive = tokio::task::spawn_blocking(move || {
                depot_core::archive::package_path(&path, Path::new("."))
            })
            .await??;
            println!("Packaged into {}", archive.display());
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

/// Render the listing table in arrival order, exactly as the server
/// sent it.
fn render_listing(items: &[StoreEntry]) {
    if items.is_empty() {
        println!("No items available");
        return;
    }
    println!("{:<25} {:<25} {:>12}", "Item", "Uploaded On", "Bytes");
    println!("-------------------------------------------------------------------");
    for item in items {
        println!(
            "{:<25} {:>25} {:>12}",
            item.name,
            format_timestamp(item.modified_at),
            item.size
        );
    }
}

/// Epoch seconds to the listing's human-readable local-time form.
fn format_timestamp(secs: u64) -> String {
    match chrono::Local.timestamp_opt(secs as i64, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%B %d, %Y at %I:%M %p").to_string(),
        _ => secs.to_string(),
    }
}
