//! remote-vfs command line entry point

use std::path::PathBuf;

use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use remote_vfs::config::Config;
use remote_vfs::connector::FileType;
use remote_vfs::{FileSystemRegistry, ResolvedPath};

/// Print usage information
fn print_usage() {
    eprintln!("Usage: remote-vfs <config.yaml> <command> <uri>");
    eprintln!();
    eprintln!("remote-vfs - Access SFTP and S3 storage through mount URIs");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to configuration file");
    eprintln!("  command        One of: stat, ls, cat");
    eprintln!("  uri            Resource to operate on");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  remote-vfs /etc/remote-vfs/config.yaml ls sftp://deploy@files.example.org/data/");
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Stat,
    List,
    Cat,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "stat" => Some(Command::Stat),
            "ls" => Some(Command::List),
            "cat" => Some(Command::Cat),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let Some(command) = Command::parse(&args[2]) else {
        eprintln!("Unknown command: {}", args[2]);
        print_usage();
        std::process::exit(1);
    };
    let uri = &args[3];

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Loaded configuration from {:?}", config_path);

    let registry = FileSystemRegistry::new();

    // Mount all configured filesystems
    for mount_config in &config.mounts {
        let key = mount_config.key();
        if let Err(e) = mount_config.builder(&registry).build().await {
            error!("Failed to mount {}: {}", key, e);
            continue;
        }
    }

    if registry.count() == 0 {
        error!("No filesystems were mounted successfully");
        std::process::exit(1);
    }

    info!("{} filesystem(s) mounted", registry.count());

    let outcome = match registry.resolve(uri) {
        Ok(target) => run(command, &target).await,
        Err(e) => Err(e),
    };

    let closed = registry.close().await;

    if let Err(e) = outcome {
        eprintln!("{}: {}", uri, e);
        std::process::exit(1);
    }
    closed?;
    Ok(())
}

async fn run(command: Command, target: &ResolvedPath) -> remote_vfs::Result<()> {
    match command {
        Command::Stat => {
            let meta = target.stat().await?;
            println!("uri:   {}", target.uri());
            println!("type:  {:?}", meta.file_type);
            println!("size:  {}", meta.size);
            if let Some(mode) = meta.mode {
                println!("mode:  {:o}", mode);
            }
            if let (Some(uid), Some(gid)) = (meta.uid, meta.gid) {
                println!("owner: {}:{}", uid, gid);
            }
        }
        Command::List => {
            let mut entries = target.filesystem().list_dir(target.path());
            while let Some(entry) = entries.try_next().await? {
                let marker = match entry.file_type {
                    FileType::Directory => "/",
                    FileType::Symlink => "@",
                    FileType::File => "",
                };
                println!("{}{}", entry.name, marker);
            }
        }
        Command::Cat => {
            let data = target.read().await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
