use base64::Engine;
use clap::{Parser, Subcommand};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use doh_proxy::doh::query::{BASE64_URL, DNS_JSON_CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE};

#[derive(Parser)]
#[command(name = "doh-cli")]
#[command(about = "Query a running DoH proxy", long_about = None)]
struct Cli {
    /// DoH endpoint of the proxy.
    #[arg(short, long, default_value = "http://localhost:8080/dns-query")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve through the JSON API
    Json {
        name: String,
        #[arg(short = 't', long = "type", default_value = "A")]
        record_type: String,
    },
    /// Resolve with an RFC 8484 wire-format message
    Wire {
        name: String,
        #[arg(short = 't', long = "type", default_value = "A")]
        record_type: String,
        /// Send the message as a POST body instead of a `dns` parameter
        #[arg(long)]
        post: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Json { name, record_type } => {
            client
                .get(&cli.url)
                .query(&[("name", name.as_str()), ("type", record_type.as_str())])
                .header(ACCEPT, DNS_JSON_CONTENT_TYPE)
                .send()
                .await?
        }
        Commands::Wire {
            name,
            record_type,
            post,
        } => {
            let qtype = record_type_code(&record_type)
                .ok_or_else(|| format!("unknown record type {record_type}"))?;
            let message = build_query(&name, qtype);
            let request = if post {
                client
                    .post(&cli.url)
                    .header(CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
                    .body(message)
            } else {
                client
                    .get(&cli.url)
                    .query(&[("dns", BASE64_URL.encode(&message))])
            };
            request.header(ACCEPT, DNS_MESSAGE_CONTENT_TYPE).send().await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let cache = res
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    println!("status: {status}  x-cache: {cache}");

    let body = res.bytes().await?;
    if content_type.contains("json") {
        let json: Value = serde_json::from_slice(&body)?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", hex(&body));
    }

    if !status.is_success() {
        eprintln!("Error: proxy returned status {status}");
    }
    Ok(())
}

fn record_type_code(name: &str) -> Option<u16> {
    let code = match name.to_ascii_uppercase().as_str() {
        "A" => 1,
        "NS" => 2,
        "CNAME" => 5,
        "SOA" => 6,
        "PTR" => 12,
        "MX" => 15,
        "TXT" => 16,
        "AAAA" => 28,
        "SRV" => 33,
        "HTTPS" => 65,
        "ANY" => 255,
        other => return other.parse().ok(),
    };
    Some(code)
}

/// Minimal recursive query: ID 0, RD set, one question of class IN.
fn build_query(name: &str, qtype: u16) -> Vec<u8> {
    let mut message = vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
    for label in name.trim_end_matches('.').split('.').filter(|l| !l.is_empty()) {
        let bytes = &label.as_bytes()[..label.len().min(63)];
        message.push(bytes.len() as u8);
        message.extend_from_slice(bytes);
    }
    message.push(0);
    message.extend_from_slice(&qtype.to_be_bytes());
    message.extend_from_slice(&1u16.to_be_bytes());
    message
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_layout() {
        let message = build_query("example.com.", 28);
        assert_eq!(&message[..12], &[0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&message[12..20], b"\x07example");
        assert_eq!(&message[20..25], b"\x03com\x00");
        assert_eq!(&message[25..], &[0, 28, 0, 1]);
    }

    #[test]
    fn test_record_type_code() {
        assert_eq!(record_type_code("aaaa"), Some(28));
        assert_eq!(record_type_code("99"), Some(99));
        assert_eq!(record_type_code("bogus"), None);
    }
}
