//! Non-interactive command execution against a legacy SSH 1.5 server.
//!
//! Usage:
//!   cargo run --example exec_command <host> <port> <username> <password> <command>
//!
//! Example:
//!   cargo run --example exec_command 192.0.2.10 22 operator secret "uname -a"
//!
//! Set RUST_LOG=debug to watch the handshake stages.

use std::env;
use std::process::ExitCode;

use skiff_proto::ssh1::{Credentials, Ssh1Client, Ssh1ClientConfig};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 6 {
        eprintln!(
            "Usage: {} <host> <port> <username> <password> <command>",
            args[0]
        );
        return ExitCode::FAILURE;
    }

    let host = &args[1];
    let port: u16 = match args[2].parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("Invalid port: {}", args[2]);
            return ExitCode::FAILURE;
        }
    };
    let credentials = Credentials::new(args[3].clone(), args[4].clone());
    let command = args[5].clone();

    let mut client = match Ssh1Client::dial(
        host,
        port,
        credentials,
        Some(command),
        Ssh1ClientConfig::default(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Connection failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let output = {
        let input = client.input().expect("connected client has streams");
        match input.read_to_end().await {
            Ok(output) => output,
            Err(e) => {
                eprintln!("Session failed: {}", e);
                let _ = client.disconnect().await;
                return ExitCode::FAILURE;
            }
        }
    };

    print!("{}", String::from_utf8_lossy(&output));

    let status = client.exit_status().unwrap_or(0);
    if let Err(e) = client.disconnect().await {
        eprintln!("Disconnect failed: {}", e);
    }

    ExitCode::from(status.min(u32::from(u8::MAX)) as u8)
}
