mod cli;

use hlsrelay::{
    config::{self, ActiveConfig},
    transcode::{HlsOverrides, Orchestrator, StartRequest},
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::time::Duration;

/// Options for a single `run` invocation.
struct RunArgs {
    url: String,
    user_agent: Option<String>,
    referer: Option<String>,
    subtitles: bool,
    mpegts: bool,
    seek: Option<u32>,
}

async fn run_job(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let orchestrator = Orchestrator::new(ActiveConfig::resolve(config.transcode));
    orchestrator
        .prepare()
        .await
        .context("Failed to prepare temp root")?;

    tracing::info!(
        transcoder = ?orchestrator.transcoder_path(),
        temp_root = ?orchestrator.config().temp_root,
        "Starting hlsrelay"
    );

    let mut request = StartRequest::new(args.url);
    if let Some(user_agent) = args.user_agent {
        request = request.header("user-agent", user_agent);
    }
    if let Some(referer) = args.referer {
        request = request.header("referer", referer);
    }
    request.subtitles = args.subtitles;
    if args.mpegts {
        request.hls = Some(HlsOverrides {
            fragmented_mp4: Some(false),
            ..Default::default()
        });
    }

    let job = orchestrator.start(request).await?;
    let token = job.token().to_string();
    if let Some(offset) = args.seek.filter(|offset| *offset > 0) {
        orchestrator.seek(&token, offset).await?;
    }

    println!("Token: {}", token);
    println!("Playlist: {}", job.playlist().display());
    println!("Press Ctrl-C to stop.");

    let mut current = job;
    let mut last_line: Option<String> = None;
    let mut tick = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
            _ = tick.tick() => {}
        }

        match orchestrator.resolve(&token) {
            Ok(job) => current = job,
            Err(_) => {
                println!("Transcoder exited (code {:?})", current.exit_code());
                break;
            }
        }

        let latest = current.log().snapshot().pop();
        if latest.is_some() && latest != last_line {
            if let Some(line) = &latest {
                println!("{}", line);
            }
            last_line = latest;
        }
    }

    orchestrator.stop(&token).await;
    orchestrator.shutdown().await;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "hlsrelay=trace,hlsrelay_common=debug".to_string()
        } else {
            "hlsrelay=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            url,
            user_agent,
            referer,
            subtitles,
            mpegts,
            seek,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_job(
                cli.config.as_deref(),
                RunArgs {
                    url,
                    user_agent,
                    referer,
                    subtitles,
                    mpegts,
                    seek,
                },
            ))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("hlsrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let active = ActiveConfig::resolve(config.transcode);

    let version = std::process::Command::new(&active.transcoder)
        .arg("-version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| {
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        });

    match version {
        Some(version) => {
            println!("✓ transcoder ({}) - {}", version, active.transcoder.display());
            println!("\nAll required tools are available!");
        }
        None => {
            println!("✗ transcoder - {}", active.transcoder.display());
            println!("\nThe transcoder is missing. Install ffmpeg or set transcode.transcoder_path.");
        }
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let transcode = &config.transcode;
    println!("  Transcoding enabled: {}", transcode.enabled);
    println!("  Max concurrent jobs: {}", transcode.job_limit());
    println!("  Idle timeout: {}s", transcode.idle_timeout().as_secs());
    if transcode.allowed_hosts.is_empty() {
        println!("  Allowed hosts: any");
    } else {
        println!("  Allowed hosts: {}", transcode.allowed_hosts.join(", "));
    }
    println!(
        "  HLS: {}s segments, window {}, {}",
        transcode.hls.segment_seconds,
        transcode.hls.window_size,
        if transcode.hls.fragmented_mp4 { "fMP4" } else { "MPEG-TS" }
    );

    Ok(())
}
