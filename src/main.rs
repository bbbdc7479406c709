//! Main entry point for the zipmount CLI application.
//!
//! Opens a local or remote ZIP archive, builds its directory tree and either
//! prints it (`-l`) or serves it over FUSE until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use zipmount::units::format_size;
use zipmount::{
    ArchiveEntry, Cli, DirNode, EntryMap, HttpRangeReader, LocalFileReader, Node, ReadAt,
    ZipArchive, build_tree, logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet)?;

    if cli.is_http_url() {
        let reader = Arc::new(HttpRangeReader::new(cli.archive.clone()).await?);

        serve(reader.clone(), &cli).await?;

        tracing::info!(
            "Total bytes transferred: {}",
            format_size(reader.transferred_bytes())
        );
    } else {
        let reader = Arc::new(LocalFileReader::new(Path::new(&cli.archive))?);
        serve(reader, &cli).await?;
    }

    Ok(())
}

/// Build the tree for the archive behind `reader`, then list or mount it
async fn serve<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let archive = ZipArchive::open(reader)
        .await
        .with_context(|| format!("Failed to open archive {}", cli.archive))?;

    let config = cli.mount_config();
    let entries = archive
        .entries()
        .iter()
        .map(|entry| Arc::clone(entry) as Arc<dyn ArchiveEntry>);
    let map = EntryMap::from_entries(entries, config.permissions);
    let root = build_tree(cli.display_name(), &map);

    tracing::info!(
        archive = %cli.archive,
        entries = archive.len(),
        files = map.len(),
        "archive opened"
    );

    if cli.list {
        print_tree(&root);
        return Ok(());
    }

    mount(root, cli, config).await
}

/// Print every node with its mode and size, depth first
fn print_tree(root: &DirNode) {
    println!("{}", root.name());
    print_dir(root, "");
}

fn print_dir(dir: &DirNode, prefix: &str) {
    for (name, _) in dir.list() {
        let Some(node) = dir.lookup(name) else {
            continue;
        };
        let path = format!("{}{}", prefix, name);
        let attr = node.stat();
        match node {
            Node::Dir(child) => {
                println!("{:>10}  {:04o}  {}/", "-", attr.mode, path);
                print_dir(child, &format!("{}/", path));
            }
            Node::File(_) => {
                println!("{:>10}  {:04o}  {}", attr.size, attr.mode, path);
            }
        }
    }
}

#[cfg(feature = "fuse")]
async fn mount(root: Arc<DirNode>, cli: &Cli, config: zipmount::MountConfig) -> Result<()> {
    use zipmount::fs::{ArchiveFs, spawn_mount};

    let mountpoint = cli
        .mountpoint
        .as_deref()
        .context("MOUNTPOINT is required unless -l is given")?;

    let fs = ArchiveFs::new(root, config.clone(), tokio::runtime::Handle::current());
    let session = spawn_mount(fs, mountpoint, &config)
        .with_context(|| format!("Failed to mount on {}", mountpoint.display()))?;

    tracing::info!(mountpoint = %mountpoint.display(), "mounted, press Ctrl-C to unmount");
    tokio::signal::ctrl_c().await?;

    drop(session);
    tracing::info!(mountpoint = %mountpoint.display(), "unmounted");
    Ok(())
}

#[cfg(not(feature = "fuse"))]
async fn mount(_root: Arc<DirNode>, _cli: &Cli, _config: zipmount::MountConfig) -> Result<()> {
    anyhow::bail!("zipmount was built without FUSE support; use -l to list the archive")
}
