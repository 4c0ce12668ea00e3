use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::decode::cmd_decode;
use cli::info::cmd_info;
use cli::reframe::cmd_reframe;

mod cli;
mod input;
pub(crate) mod timestamp;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_level = cli.loglevel.to_level_filter();

    let multi = MultiProgress::new();

    let mut env_builder = env_logger::Builder::from_default_env();
    env_builder.filter_level(base_level);
    match cli.log_format {
        LogFormat::Plain => {
            env_builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            env_builder.format(|buf, record| {
                use std::io::Write;
                let line = json_record(&buf.timestamp().to_string(), record);
                writeln!(buf, "{line}")
            });
        }
    }

    let pb = if cli.progress {
        let logger = env_builder.build();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        Some(&multi)
    } else {
        env_builder.try_init()?;
        None
    };

    match cli.command {
        Commands::Decode(ref args) => cmd_decode(args, &cli, pb)?,
        Commands::Info(ref args) => cmd_info(args, &cli, pb)?,
        Commands::Reframe(ref args) => cmd_reframe(args, &cli, pb)?,
    }

    Ok(())
}

fn json_record(timestamp: &str, record: &log::Record) -> serde_json::Value {
    serde_json::json!({
        "ts": timestamp,
        "lvl": record.level().as_str(),
        "target": record.target(),
        "msg": record.args().to_string(),
    })
}

#[test]
fn json_log_lines_parse() {
    let line = json_record(
        "2026-01-01T00:00:00Z",
        &log::Record::builder()
            .args(format_args!("bad \u{1b}[1m \"slice\"\n"))
            .level(log::Level::Warn)
            .target("h264au::process::assemble")
            .build(),
    )
    .to_string();

    let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed["msg"], "bad \u{1b}[1m \"slice\"\n");
    assert_eq!(parsed["lvl"], "WARN");
    assert!(!line.contains('\n'));
}
