//! aerolite-cli - Command-line interface for aerolite
//!
//! One-shot record and info commands against a single node.

use aerolite_client::{Client, ClientConfig, Record};
use aerolite_protocol::digest::hash_key;
use aerolite_protocol::info::split_info_value;
use aerolite_protocol::particle::ParticleValue;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// Info keys queried when `info` is run without arguments.
const DEFAULT_INFO_KEYS: &[&str] = &[
    "build",
    "edition",
    "node",
    "service",
    "services",
    "statistics",
    "version",
];

#[derive(Parser)]
#[command(name = "aerolite-cli")]
#[command(about = "Command-line interface for aerolite record nodes")]
#[command(version)]
struct Cli {
    /// Node address
    #[arg(short, long, env = "AEROLITE_SERVER", default_value = "127.0.0.1:3000")]
    server: SocketAddr,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query node info values
    Info {
        /// Info keys to request (defaults to a diagnostic set)
        #[arg(value_delimiter = ',')]
        keys: Vec<String>,
    },

    /// Read a record
    Get {
        /// Namespace
        #[arg(short, long)]
        namespace: String,

        /// Set name
        #[arg(long, default_value = "")]
        set: String,

        /// Record key
        key: String,

        /// Bin names to fetch (all bins when omitted)
        #[arg(short, long, value_delimiter = ',')]
        bins: Vec<String>,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a record
    Put {
        /// Namespace
        #[arg(short, long)]
        namespace: String,

        /// Set name
        #[arg(long, default_value = "")]
        set: String,

        /// Record key
        key: String,

        /// Bin to write as name=value; integers store as integers
        #[arg(short, long = "bin", required = true)]
        bins: Vec<String>,

        /// Record TTL in seconds (0 uses the namespace default)
        #[arg(long, default_value = "0")]
        ttl: u32,
    },

    /// Delete a record
    Delete {
        /// Namespace
        #[arg(short, long)]
        namespace: String,

        /// Set name
        #[arg(long, default_value = "")]
        set: String,

        /// Record key
        key: String,
    },

    /// Print the RIPEMD-160 digest of a key (local, no connection)
    Digest {
        /// Set name
        #[arg(long, default_value = "")]
        set: String,

        /// Record key
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Handle digest command locally (no node connection needed)
    if let Commands::Digest { set, key } = &cli.command {
        println!("{}", hex::encode(hash_key(set, key)));
        return Ok(());
    }

    let config = ClientConfig::new(cli.server);
    let mut client = Client::connect(config).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    match cli.command {
        Commands::Info { keys } => {
            let keys = if keys.is_empty() {
                DEFAULT_INFO_KEYS.iter().map(|k| k.to_string()).collect()
            } else {
                keys
            };
            let values = client.info(&keys).await?;
            for key in &keys {
                match values.get(key.as_str()) {
                    Some(value) if value.contains(';') => {
                        println!("{}", format!("{:<12}", key).cyan());
                        for item in split_info_value(value) {
                            println!("  {}", item);
                        }
                    }
                    Some(value) => {
                        println!("{} {}", format!("{:<12}", key).cyan(), value);
                    }
                    None => {
                        println!("{} {}", format!("{:<12}", key).cyan(), "(absent)".dimmed());
                    }
                }
            }
        }
        Commands::Get {
            namespace,
            set,
            key,
            bins,
            json,
        } => {
            let bins: Vec<&str> = bins.iter().map(String::as_str).collect();
            match client.get(&namespace, &set, &key, &bins).await {
                Ok(record) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&record_to_json(&record))?);
                    } else {
                        print_record(&record);
                    }
                }
                Err(e) if e.is_not_found() => {
                    eprintln!("{}", "Record not found".yellow());
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Put {
            namespace,
            set,
            key,
            bins,
            ttl,
        } => {
            let mut parsed: Vec<(&str, ParticleValue)> = Vec::with_capacity(bins.len());
            for pair in &bins {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("invalid bin '{pair}', expected name=value"))?;
                parsed.push((name, parse_bin_value(value)));
            }
            client.put(&namespace, &set, &key, &parsed, ttl).await?;
            println!("{}", "OK".green());
        }
        Commands::Delete {
            namespace,
            set,
            key,
        } => {
            if client.delete(&namespace, &set, &key).await? {
                println!("{}", "Deleted".green());
            } else {
                eprintln!("{}", "Record not found".yellow());
                std::process::exit(1);
            }
        }
        Commands::Digest { .. } => unreachable!(), // Already handled above
    }

    Ok(())
}

/// Integers become integer bins; everything else stores as a string.
fn parse_bin_value(value: &str) -> ParticleValue {
    match value.parse::<i64>() {
        Ok(n) => ParticleValue::Integer(n),
        Err(_) => ParticleValue::from(value),
    }
}

fn print_record(record: &Record) {
    println!(
        "{} {}   {} {}",
        "generation:".dimmed(),
        record.generation,
        "ttl:".dimmed(),
        record.ttl
    );
    let mut names: Vec<&String> = record.bins.keys().collect();
    names.sort();
    for name in names {
        println!("{} {}", format!("{:<12}", name).cyan(), record.bins[name]);
    }
}

fn record_to_json(record: &Record) -> serde_json::Value {
    let bins: serde_json::Map<String, serde_json::Value> = record
        .bins
        .iter()
        .map(|(name, value)| (name.clone(), particle_to_json(value)))
        .collect();
    serde_json::json!({
        "generation": record.generation,
        "ttl": record.ttl,
        "bins": bins,
    })
}

fn particle_to_json(value: &ParticleValue) -> serde_json::Value {
    match value {
        ParticleValue::Null => serde_json::Value::Null,
        ParticleValue::Integer(n) => serde_json::json!(n),
        ParticleValue::Double(d) => serde_json::json!(d),
        ParticleValue::String(s) => serde_json::json!(s),
        ParticleValue::Blob(data) => serde_json::json!(hex::encode(data)),
        ParticleValue::Unknown { data, .. } => serde_json::json!(hex::encode(data)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bin_value_integer() {
        assert_eq!(parse_bin_value("42"), ParticleValue::Integer(42));
        assert_eq!(parse_bin_value("-7"), ParticleValue::Integer(-7));
    }

    #[test]
    fn test_parse_bin_value_string() {
        assert_eq!(parse_bin_value("hello"), ParticleValue::from("hello"));
        assert_eq!(parse_bin_value("3.14"), ParticleValue::from("3.14"));
        assert_eq!(parse_bin_value(""), ParticleValue::from(""));
    }

    #[test]
    fn test_particle_to_json_shapes() {
        assert_eq!(particle_to_json(&ParticleValue::Null), serde_json::Value::Null);
        assert_eq!(
            particle_to_json(&ParticleValue::Integer(9)),
            serde_json::json!(9)
        );
        assert_eq!(
            particle_to_json(&ParticleValue::from("x")),
            serde_json::json!("x")
        );
        assert_eq!(
            particle_to_json(&ParticleValue::from(vec![0xde, 0xad])),
            serde_json::json!("dead")
        );
    }

    #[test]
    fn test_record_to_json_includes_metadata() {
        let mut bins = std::collections::HashMap::new();
        bins.insert("n".to_string(), ParticleValue::Integer(1));
        let record = Record {
            generation: 3,
            ttl: 60,
            digest: None,
            found: true,
            bins,
        };
        let json = record_to_json(&record);
        assert_eq!(json["generation"], 3);
        assert_eq!(json["ttl"], 60);
        assert_eq!(json["bins"]["n"], 1);
    }
}
