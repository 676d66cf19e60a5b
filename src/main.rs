use anyhow::Context as _;
use dotenvy::dotenv;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use voxhub::command::{self, Output};
use voxhub::{AudioConfig, AudioService, CancellationSource};

struct Terminal;

impl Output for Terminal {
    fn info(&mut self, line: String) {
        println!("{}", line);
    }

    fn error(&mut self, line: String) {
        eprintln!("{}", line);
    }
}

async fn run_line(service: &AudioService, line: &str, out: &mut Terminal) {
    let Some(rest) = command::strip_prefix(line) else {
        out.error(format!("Commands start with {0}, try `{0} help`", command::PREFIX));
        return;
    };
    let Some(args) = command::parse(rest, out) else {
        return;
    };

    // Ctrl+C ends the running command instead of the program.
    let interrupt = CancellationSource::new();
    let watcher = tokio::spawn({
        let interrupt = interrupt.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        }
    });

    let result = command::execute(service, args, &interrupt, out).await;
    watcher.abort();

    if let Err(e) = result {
        error!("Voice command failed: {:?}", e);
        out.error(format!("Error: {}", e));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var_os("AUDIO_CONFIG").map(PathBuf::from);
    let config = AudioConfig::from_env(config_path.as_deref()).context("Failed to load audio config")?;

    for dir in [&config.recordings_dir, &config.output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }

    let service = AudioService::from_config(&config).context("Failed to set up audio providers")?;
    info!("Type `/voice help` for commands, `quit` to exit");

    let mut out = Terminal;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        run_line(&service, line, &mut out).await;
    }

    info!("Shutting down");
    Ok(())
}
