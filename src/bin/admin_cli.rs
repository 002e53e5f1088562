use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use iplimit::admin;
use iplimit::config::LimitConfig;
use iplimit::gate::LimitState;
use iplimit::store::Store;
use iplimit::sweeper;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/iplimit.yaml".to_string();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: admin_cli [--conf FILE]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            _ => {}
        }
        i += 1;
    }

    let config = LimitConfig::from_file(&conf_file)
        .with_context(|| format!("Cannot load config: {}", conf_file))?;

    let store = Store::open(&config).await?;
    let state = Arc::new(LimitState::with_config_path(
        store,
        config,
        Some(PathBuf::from(&conf_file)),
    ));

    tokio::spawn(sweeper::run(Arc::clone(&state)));

    tracing::info!("[admin] console started, type 'help' for commands, 'quit' to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first() {
            None => continue,
            Some(&"quit") | Some(&"exit") => break,
            _ => {
                for reply in admin::handle_command(&state, &tokens).await {
                    println!("{}", reply);
                }
            }
        }
    }

    Ok(())
}
