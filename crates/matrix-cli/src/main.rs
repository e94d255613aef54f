use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use matrixfeed_core::{
    feed_name, BlinkRate, Brightness, Command, IconCategory, IconPayload, Rotation, ScrollSettings, TestPattern,
};
use matrixfeed_mqtt::{Dispatcher, MqttConfig, MqttEvent, MqttService};
use rumqttc::QoS;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Send one command to the LED matrix.
#[derive(Debug, Parser)]
#[command(name = "matrixfeed-cli", version)]
struct Cli {
    /// Wait up to SECS for one message on the debug feed after sending
    #[arg(long, value_name = "SECS")]
    wait_echo: Option<u64>,

    /// Print the wire string instead of publishing it
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Built-in test pattern (opcode 00)
    Test {
        #[arg(value_enum)]
        pattern: PatternArg,
    },
    /// Show an icon (opcode 01)
    Icon(IconArgs),
    /// Scroll a message (opcode 02)
    Scroll { text: String },
    /// Scroll speed and repeat count (opcode 03)
    ScrollSettings {
        #[arg(long, default_value_t = 25)]
        speed: u32,
        #[arg(long, default_value_t = 3)]
        repeat: u32,
    },
    /// Brightness 0-15 (FF00)
    Brightness {
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Rotation 0-3 (FF01)
    Rotation {
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Blink rate 0-3: always on, 2Hz, 1Hz, 0.5Hz (FF02)
    Blink {
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Hand-written wire string, checked before sending
    Raw { wire: String },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct IconArgs {
    /// 16 hex character bitmap
    hex: Option<String>,
    /// sunny, cloudy or rainy
    #[arg(long)]
    category: Option<IconCategory>,
    /// Weather provider icon code, e.g. 10n
    #[arg(long)]
    code: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PatternArg {
    Smiley,
    Neutral,
    Frown,
    Full,
    Standby,
    Weather,
    LetterA,
}

impl From<PatternArg> for TestPattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::Smiley => TestPattern::FaceSmiley,
            PatternArg::Neutral => TestPattern::FaceNeutral,
            PatternArg::Frown => TestPattern::FaceFrown,
            PatternArg::Full => TestPattern::AllFullBrightness,
            PatternArg::Standby => TestPattern::Standby,
            PatternArg::Weather => TestPattern::Weather,
            PatternArg::LetterA => TestPattern::LetterA,
        }
    }
}

// Settings the encoder would silently drop are rejected here instead.
fn build_command(cmd: Cmd) -> Result<Command> {
    let command = match cmd {
        Cmd::Test { pattern } => Command::Test(pattern.into()),
        Cmd::Icon(args) => {
            let payload = match (args.hex, args.category, args.code) {
                (Some(hex), _, _) => IconPayload::from_hex(&hex)?,
                (_, Some(category), _) => category.payload(),
                (_, _, Some(code)) => matrixfeed_core::map_icon_to_payload(&code)?,
                (None, None, None) => return Err(anyhow!("an icon bitmap, --category or --code is required")),
            };
            Command::DisplayIcon(payload)
        }
        Cmd::Scroll { text } => Command::ScrollText(text),
        Cmd::ScrollSettings { speed, repeat } => Command::ScrollSettings(ScrollSettings::new(speed, repeat)?),
        Cmd::Brightness { value } => Command::SetBrightness(
            Brightness::new(value).ok_or_else(|| anyhow!("brightness must be 0..=15, got {}", value))?,
        ),
        Cmd::Rotation { value } => Command::SetRotation(
            Rotation::new(value).ok_or_else(|| anyhow!("rotation must be 0..=3, got {}", value))?,
        ),
        Cmd::Blink { value } => Command::SetBlinkRate(
            BlinkRate::new(value).ok_or_else(|| anyhow!("blink rate must be 0..=3, got {}", value))?,
        ),
        Cmd::Raw { wire } => wire.parse::<Command>()?,
    };
    Ok(command)
}

/// Payload of the first message on `debug_feed`.
async fn next_echo(rx: &mut broadcast::Receiver<MqttEvent>, debug_feed: &str) -> Result<String, broadcast::error::RecvError> {
    loop {
        match rx.recv().await {
            Ok(MqttEvent::Publish { topic, payload }) if feed_name(&topic) == debug_feed => {
                return Ok(String::from_utf8_lossy(&payload).into_owned());
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(e) => return Err(e),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rumqttc=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();

    let cli = Cli::parse();
    let command = match build_command(cli.command) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid command: {:#}", e);
            std::process::exit(1);
        }
    };
    if cli.dry_run {
        println!("{}", command);
        return;
    }

    let cfg = MqttConfig::from_env();
    eprintln!("Connecting to {}:{}", cfg.host, cfg.port);
    let mqtt = match MqttService::connect(cfg.clone()).await {
        Ok(m) => m,
        Err(e) => {
            eprintln!("MQTT setup failed: {}", e);
            std::process::exit(2);
        }
    };

    // Listen before publishing so a fast echo is not missed
    let mut rx = mqtt.events();
    if cli.wait_echo.is_some() {
        if let Err(e) = mqtt.subscribe(&cfg.debug_topic(), QoS::AtMostOnce).await {
            eprintln!("Subscribe to {} failed: {}", cfg.debug_topic(), e);
        }
    }
    if let Err(e) = mqtt.wait_until_connected(CONNECT_TIMEOUT).await {
        eprintln!("MQTT connect failed: {}", e);
        std::process::exit(2);
    }

    let dispatcher = Dispatcher::new(mqtt.clone(), cfg.command_topic());
    if let Err(e) = dispatcher.send(&command).await {
        eprintln!("Publish failed: {}", e);
        std::process::exit(2);
    }

    let mut code = 0;
    if let Some(secs) = cli.wait_echo {
        // Wait for one debug message, then print and exit
        match timeout(Duration::from_secs(secs), next_echo(&mut rx, &cfg.debug_feed)).await {
            Ok(Ok(payload)) => println!("{}: {}", cfg.debug_feed, payload),
            Ok(Err(e)) => {
                eprintln!("MQTT event stream closed: {}", e);
                code = 3;
            }
            Err(_) => {
                eprintln!("Timeout waiting for {} echo", cfg.debug_feed);
                code = 4;
            }
        }
    }

    if let Err(e) = mqtt.shutdown(Duration::from_secs(5)).await {
        eprintln!("MQTT disconnect incomplete: {}", e);
    }
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wire(args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("matrixfeed-cli").chain(args.iter().copied()))?;
        Ok(build_command(cli.command)?.encode())
    }

    #[test]
    fn test_subcommands_encode() {
        assert_eq!(wire(&["test", "letter-a"]).unwrap(), "00FC");
        assert_eq!(wire(&["icon", "--category", "cloudy"]).unwrap(), "01001826439966000000");
        assert_eq!(wire(&["icon", "--code", "13d"]).unwrap(), "01081422550808281000");
        assert_eq!(wire(&["icon", "08221c551c220800"]).unwrap(), "0108221C551C22080000");
        assert_eq!(wire(&["scroll", "Hello"]).unwrap(), "02Hello");
        assert_eq!(wire(&["scroll-settings"]).unwrap(), "031903");
        assert_eq!(wire(&["scroll-settings", "--speed", "0", "--repeat", "0"]).unwrap(), "030000");
        assert_eq!(wire(&["brightness", "15"]).unwrap(), "FF000F");
        assert_eq!(wire(&["rotation", "1"]).unwrap(), "FF0101");
        assert_eq!(wire(&["blink", "0"]).unwrap(), "FF0200");
        assert_eq!(wire(&["raw", "ff0203"]).unwrap(), "FF0203");
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(wire(&["brightness", "16"]).is_err());
        assert!(wire(&["rotation", "-1"]).is_err());
        assert!(wire(&["blink", "4"]).is_err());
        assert!(wire(&["scroll-settings", "--speed", "256"]).is_err());
        assert!(wire(&["icon", "--code", "07d"]).is_err());
        assert!(wire(&["raw", "FF0010"]).is_err());
    }

    #[test]
    fn test_icon_needs_exactly_one_source() {
        assert!(wire(&["icon"]).is_err());
        assert!(wire(&["icon", "08221C551C220800", "--category", "sunny"]).is_err());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from(["matrixfeed-cli", "--wait-echo", "5", "--dry-run", "test", "smiley"]).unwrap();
        assert_eq!(cli.wait_echo, Some(5));
        assert!(cli.dry_run);
    }
}
