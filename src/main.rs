//! EMBERKV - Durable In-Memory Key-Value Store
//! Interactive front end over the storage engine.

use std::io::{self, BufRead, Write};

use emberkv::config::Config;
use emberkv::engine::Ember;

fn main() {
    env_logger::init();

    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║           EMBERKV Storage Engine          ║");
    println!("  ║     Durable Key-Value Store v0.3.0        ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Commands:");
    println!("    set <key> <value>          - Store a key-value pair");
    println!("    setex <key> <ms> <value>   - Store with a TTL in milliseconds");
    println!("    get <key>                  - Retrieve a value by key");
    println!("    del <key>                  - Delete a key");
    println!("    ttl <key>                  - Remaining TTL in milliseconds");
    println!("    scan                       - List all key-value pairs");
    println!("    snapshot                   - Force a snapshot now");
    println!("    info                       - Show engine statistics");
    println!("    exit                       - Shutdown engine");
    println!();

    let config = Config::default();
    let mut engine = match Ember::open(config) {
        Ok(e) => e,
        Err(err) => {
            eprintln!("[ERROR] Failed to open engine: {}", err);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("emberkv> ");
        stdout.flush().unwrap();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap() == 0 {
            break; // EOF
        }

        let parts: Vec<&str> = line.trim().split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0].to_lowercase().as_str() {
            "set" => {
                if parts.len() < 3 {
                    println!("  Usage: set <key> <value>");
                    continue;
                }
                let key = parts[1].as_bytes().to_vec();
                let value = parts[2..].join(" ").as_bytes().to_vec();
                match engine.set(key, value) {
                    Ok(()) => println!("  OK"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "setex" => {
                if parts.len() < 4 {
                    println!("  Usage: setex <key> <ttl_ms> <value>");
                    continue;
                }
                let ttl_ms = match parts[2].parse::<u64>() {
                    Ok(ms) => ms,
                    Err(_) => {
                        println!("  ERROR: ttl must be a number of milliseconds");
                        continue;
                    }
                };
                let key = parts[1].as_bytes().to_vec();
                let value = parts[3..].join(" ").as_bytes().to_vec();
                match engine.set_with_ttl(key, value, ttl_ms) {
                    Ok(()) => println!("  OK"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "get" => {
                if parts.len() < 2 {
                    println!("  Usage: get <key>");
                    continue;
                }
                match engine.get(parts[1].as_bytes()) {
                    Some(value) => match String::from_utf8(value) {
                        Ok(s) => println!("  \"{}\"", s),
                        Err(_) => println!("  <binary data>"),
                    },
                    None => println!("  (nil)"),
                }
            }
            "del" | "delete" => {
                if parts.len() < 2 {
                    println!("  Usage: del <key>");
                    continue;
                }
                match engine.delete(parts[1].as_bytes().to_vec()) {
                    Ok(()) => println!("  OK (deleted)"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "ttl" => {
                if parts.len() < 2 {
                    println!("  Usage: ttl <key>");
                    continue;
                }
                match engine.ttl(parts[1].as_bytes()) {
                    Some(ms) => println!("  {} ms", ms),
                    None => println!("  (no ttl)"),
                }
            }
            "scan" | "list" => {
                let entries = engine.scan();
                if entries.is_empty() {
                    println!("  (empty)");
                } else {
                    for (key, value) in &entries {
                        let k = String::from_utf8_lossy(key);
                        let v = String::from_utf8_lossy(value);
                        println!("  {} -> {}", k, v);
                    }
                    println!("  ({} entries)", entries.len());
                }
            }
            "snapshot" => match engine.snapshot() {
                Ok(()) => println!("  OK (snapshot published)"),
                Err(e) => println!("  ERROR: {}", e),
            },
            "info" | "stats" => {
                println!("  Entries:    {}", engine.len());
                println!("  Index size: {} bytes", engine.index_size());
                println!("{}", engine.metrics().report());
            }
            "exit" | "quit" | "q" => {
                println!("  Shutting down EMBERKV...");
                if let Err(e) = engine.close() {
                    eprintln!("[ERROR] Shutdown failed: {}", e);
                    std::process::exit(1);
                }
                return;
            }
            _ => {
                println!("  Unknown command: '{}'. Type 'exit' to quit.", parts[0]);
            }
        }
    }

    if let Err(e) = engine.close() {
        eprintln!("[ERROR] Shutdown failed: {}", e);
        std::process::exit(1);
    }
}
