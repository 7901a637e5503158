use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hlsrelay")]
#[command(author, version, about = "On-demand HLS transcoding of remote media")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcode a remote source to HLS until interrupted
    Run {
        /// Source URL (http or https)
        #[arg(required = true)]
        url: String,

        /// User agent sent to the source host
        #[arg(long)]
        user_agent: Option<String>,

        /// Referer sent to the source host
        #[arg(long)]
        referer: Option<String>,

        /// Keep subtitle streams
        #[arg(long)]
        subtitles: bool,

        /// Write MPEG-TS segments instead of fMP4
        #[arg(long)]
        mpegts: bool,

        /// Start position in seconds
        #[arg(long, value_name = "SECONDS")]
        seek: Option<u32>,
    },

    /// Check that the transcoder is available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run() {
        let cli = Cli::try_parse_from([
            "hlsrelay",
            "-v",
            "run",
            "https://example.com/a.m3u8",
            "--referer",
            "https://site.test/",
            "--mpegts",
            "--seek",
            "30",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                url,
                referer,
                mpegts,
                seek,
                subtitles,
                ..
            } => {
                assert_eq!(url, "https://example.com/a.m3u8");
                assert_eq!(referer.as_deref(), Some("https://site.test/"));
                assert!(mpegts);
                assert!(!subtitles);
                assert_eq!(seek, Some(30));
            }
            _ => panic!("expected run"),
        }
    }
}
