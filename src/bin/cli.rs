//! hashkv CLI
//!
//! Command-line interface for inspecting and poking a hashkv database file.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use hashkv::Engine;

/// hashkv CLI
#[derive(Parser, Debug)]
#[command(name = "hashkv-cli")]
#[command(about = "CLI for hashkv embedded key-value files")]
#[command(version)]
struct Args {
    /// Database file
    #[arg(short, long, default_value = "./hashkv.db")]
    file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Print file statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hashkv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let mut engine = match Engine::open_path(args.file.as_ref()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("failed to open {}: {}", args.file, e);
            std::process::exit(1);
        }
    };

    let result = run(&mut engine, args.command);

    if let Err(e) = result.and_then(|_| engine.close()) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(engine: &mut Engine, command: Commands) -> hashkv::Result<()> {
    match command {
        Commands::Get { key } => {
            match engine.get(key.as_bytes())? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => println!("(not found)"),
            }
        }
        Commands::Set { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            let existed = engine.delete(key.as_bytes())?;
            println!("{}", if existed { "OK" } else { "(not found)" });
        }
        Commands::Stats => {
            println!("file:         {}", engine.path().display());
            println!("file size:    {} bytes", engine.file_size());
            println!("tables:       {}", engine.table_count());
            println!("entries:      {}", engine.entry_count());
            println!("storage type: {}", engine.storage_type());
        }
    }
    Ok(())
}
