///! # CLI - Versioned Partition Shell
///!
///! A REPL over the version graph, the remote store and local partitions.
///! Reads commands from stdin and prints results to stdout; logs go to
///! stderr. Works interactively or scripted (pipe commands via stdin).
///!
///! ## Commands
///!
///! ```text
///! CREATE domain partitions              Create a domain
///! BASE domain k=v ...                   Publish and close a base version
///! DELTA domain parent k=v|-k ...        Publish and close a delta (-k deletes)
///! VERSIONS domain                       List versions
///! PLAN domain partition version         Show the update plan
///! UPDATE domain partition version       Update a local partition
///! GET domain partition key              Read the partition's current version
///! CLEAN domain                          Purge versions outside retention
///! EXIT / QUIT                           Shut down
///! ```
///!
///! Keys are routed to partitions by `crc32(key) % partitions`.
///!
///! ## Configuration
///!
///! ```text
///! VERSA_DATA_DIR         local partition roots        (default: "data/partitions")
///! VERSA_REMOTE_DIR       remote version store         (default: "data/remote")
///! VERSA_METADATA_DIR     domain graph documents       (default: "data/metadata")
///! VERSA_KEEP_VERSIONS    cleaner retention N          (default: 3, 0 = disabled)
///! VERSA_CACHE_BASES      cached bases per partition   (default: 1)
///! VERSA_DELETE_METADATA  cleaner deletes metadata too (default: "false")
///! RUST_LOG               log filter                   (default: "warn")
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! > CREATE clicks 1
///! OK (1 partitions)
///! > BASE clicks a=1 b=2
///! OK v0
///! > DELTA clicks 0 -a
///! OK v1
///! > UPDATE clicks 0 1
///! OK v1 (Update data fetch=0ms, Update execution=1ms, Update merge=0ms)
///! > GET clicks 0 a
///! (nil)
///! ```

mod shell;

use anyhow::Result;
use shell::{Reply, Shell, USAGE};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let config = config::Config::from_env()?;
    let mut shell = Shell::open(config)?;
    let cfg = shell.config();

    println!(
        "versa started (data={}, remote={}, metadata={}, keep={}, cache_bases={})",
        cfg.data_dir.display(),
        cfg.remote_dir.display(),
        cfg.metadata_dir.display(),
        cfg.keep_versions,
        cfg.cache_bases
    );
    for line in USAGE {
        println!("{}", line);
    }
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match shell.execute(&line) {
            Ok(Reply::Lines(lines)) => {
                for l in lines {
                    println!("{}", l);
                }
            }
            Ok(Reply::Exit) => {
                println!("bye");
                break;
            }
            Err(e) => println!("ERR {:#}", e),
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
