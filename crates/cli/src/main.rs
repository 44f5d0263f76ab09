//! # CLI — CinderKV Interactive Shell
//!
//! A REPL-style command-line interface for the CinderKV database. Reads
//! commands from stdin, executes them against the facade, and prints
//! results to stdout. Designed for both interactive use and scripted
//! testing (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value      Insert or update a key-value pair
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! KEYS               List all live keys
//! MERGE              Compact the data directory to a single segment
//! BEGIN              Open a transaction; SET/GET/DEL now run inside it
//! COMMIT             Commit the open transaction
//! ROLLBACK           Discard the open transaction
//! STATS              Print database debug info
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! CINDER_DIR             Data directory             (default: "data")
//! CINDER_BLOOM_N         Expected key count         (default: 100000)
//! CINDER_BLOOM_FP        Filter false-positive rate (default: 0.01)
//! CINDER_SYNC_ON_PUT     fsync every engine write   (default: "false")
//! CINDER_MAX_FILE_MB     Segment roll size in MiB   (default: 2)
//! CINDER_MERGE_ON_CLOSE  Compact on EXIT            (default: "false")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! CinderKV started (dir=data, bloom_n=100000, fp=0.01)
//! > SET name Alice
//! OK
//! > BEGIN
//! OK
//! > SET name Bob
//! OK
//! > ROLLBACK
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use db::{Db, DbError, DbOptions, Transaction};
use engine::Options as EngineOptions;
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn print_get(result: Result<Vec<u8>, DbError>) {
    match result {
        Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
        Err(DbError::KeyNotFound) => println!("(nil)"),
        Err(e) => println!("ERR read failed: {}", e),
    }
}

fn main() -> Result<()> {
    let dir = env_or("CINDER_DIR", "data");
    let bloom_n: usize = env_or("CINDER_BLOOM_N", "100000").parse().unwrap_or(100_000);
    let bloom_fp: f64 = env_or("CINDER_BLOOM_FP", "0.01").parse().unwrap_or(0.01);
    let sync_on_put: bool = env_or("CINDER_SYNC_ON_PUT", "false").parse().unwrap_or(false);
    let max_file_mb: u64 = env_or("CINDER_MAX_FILE_MB", "2").parse().unwrap_or(2);
    let merge_on_close: bool = env_or("CINDER_MERGE_ON_CLOSE", "false")
        .parse()
        .unwrap_or(false);

    let db = Db::open(
        &dir,
        EngineOptions {
            read_write: true,
            sync_on_put,
            max_file_size: max_file_mb * 1024 * 1024,
        },
        DbOptions {
            bloom_n,
            bloom_fp,
            merge_on_close,
        },
    )?;

    println!(
        "CinderKV started (dir={}, bloom_n={}, fp={})",
        dir, bloom_n, bloom_fp
    );
    println!("Commands: SET key value | GET key | DEL key | KEYS | MERGE");
    println!("          BEGIN | COMMIT | ROLLBACK | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let mut txn: Option<Transaction> = None;
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else if let Some(t) = txn.as_mut() {
                            match t.put(k.as_bytes(), v.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        } else {
                            match db.put(k.as_bytes(), v.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match txn.as_ref() {
                            Some(t) => print_get(t.get(k.as_bytes())),
                            None => print_get(db.get(k.as_bytes())),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        if let Some(t) = txn.as_mut() {
                            match t.delete(k.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR del failed: {}", e),
                            }
                        } else {
                            match db.delete(k.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR del failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "KEYS" => match db.keys() {
                    Ok(keys) => {
                        for key in &keys {
                            println!("{}", String::from_utf8_lossy(key));
                        }
                        println!("({} keys)", keys.len());
                    }
                    Err(e) => println!("ERR keys failed: {}", e),
                },
                "MERGE" => match db.merge() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR merge failed: {}", e),
                },
                "BEGIN" => {
                    if txn.is_some() {
                        println!("ERR transaction already open");
                    } else {
                        txn = Some(db.begin());
                        println!("OK");
                    }
                }
                "COMMIT" => match txn.take() {
                    Some(mut t) => match t.commit() {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR commit failed: {}", e),
                    },
                    None => println!("ERR no open transaction"),
                },
                "ROLLBACK" => match txn.take() {
                    Some(mut t) => match t.rollback() {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR rollback failed: {}", e),
                    },
                    None => println!("ERR no open transaction"),
                },
                "STATS" => {
                    println!("{:?}", db);
                    if let Some(t) = txn.as_ref() {
                        println!("{:?}", t);
                    }
                }
                "EXIT" | "QUIT" => break,
                other => println!("ERR unknown command: {}", other),
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    drop(txn);
    db.close()?;
    println!("bye");
    Ok(())
}
