use super::decoder_thread::{DecodeSummary, DecoderThreadConfig, spawn_decoder_thread};
use super::output::FrameWriter;
use super::progress::{create_progress_bar, estimate_total_frames};
use crate::cli::command::{Cli, DecodeArgs};
use crate::timestamp::{rate, time_str};
use anyhow::{Result, bail};
use h264au::process::session::SessionConfig;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::mpsc;
use std::time::Instant;

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    if args.hardware_stall_threshold == 0 || args.software_stall_threshold == 0 {
        bail!("Stall thresholds must be at least 1 access unit");
    }

    log::info!(
        "Decoding H.264 stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let is_pipe = args.input.to_string_lossy() == "-";

    let mut writer = match &args.output_path {
        Some(path) => Some(FrameWriter::create(path)?),
        None => {
            log::info!("No output path given, frames are decoded and discarded");
            None
        }
    };

    let should_estimate = !args.no_estimate_progress && !is_pipe && multi.is_some();
    let total_frames = if should_estimate {
        let estimate = estimate_total_frames(&args.input, args.chunk_size)?;
        Some(args.max_frames.map_or(estimate, |max| estimate.min(max)))
    } else {
        if is_pipe {
            log::debug!("Skipping progress estimation for pipe input");
        } else if args.no_estimate_progress {
            log::debug!("Progress estimation disabled by --no-estimate-progress flag");
        }
        None
    };

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, total_frames)?),
        None => None,
    };

    let session = SessionConfig::default()
        .with_hardware_stall_threshold(args.hardware_stall_threshold)
        .with_software_stall_threshold(args.software_stall_threshold)
        .with_fail_level(cli.fail_level());

    let (tx, rx) = mpsc::channel();
    let decode_thread = spawn_decoder_thread(DecoderThreadConfig {
        input_path: args.input.clone(),
        chunk_size: args.chunk_size,
        max_frames: args.max_frames,
        session,
        tx,
        pb_clone: pb.clone(),
    });

    let start_time = Instant::now();
    let mut received = 0u64;

    while let Ok(result) = rx.recv() {
        match result {
            Ok(frame) => {
                if let Some(writer) = writer.as_mut() {
                    writer.write_frame(&frame)?;
                }
                received += 1;
                if let Some(ref pb) = pb {
                    pb.set_position(received);
                }
            }
            Err(e) => {
                if let Some(pb) = pb {
                    pb.finish_with_message("decode failed");
                }
                return Err(e);
            }
        }
    }

    if let Some(writer) = writer.as_mut() {
        writer.finalize()?;
        log::info!(
            "Wrote {} frames ({} bytes)",
            writer.frames_written,
            writer.bytes_written
        );
    }

    match decode_thread.join() {
        Ok(Ok(summary)) => {
            finalize_progress_bar(&pb, total_frames, received, start_time);
            log_summary(&summary, start_time);
        }
        Ok(Err(e)) => {
            if let Some(pb) = pb {
                pb.finish_with_message("decode failed");
            }
            return Err(e);
        }
        Err(_) => {
            if let Some(pb) = pb {
                pb.finish_with_message("decode thread panicked");
            }
            bail!("Decode thread panicked");
        }
    }

    Ok(())
}

fn log_summary(summary: &DecodeSummary, start_time: Instant) {
    let elapsed = start_time.elapsed();

    if summary.dropped_units > 0 {
        log::warn!(
            "Dropped {} access units before the first IDR",
            summary.dropped_units
        );
    }
    if summary.fallbacks > 0 {
        log::warn!("Hardware decoding failed, finished in {}", summary.backend);
    }

    log::info!(
        "Decoded {} frames from {} packets ({} bytes) with the {} decoder in {} ({:.1} fps)",
        summary.frames,
        summary.packets,
        summary.bytes,
        summary.backend,
        time_str(elapsed),
        rate(summary.frames, elapsed)
    );
}

fn finalize_progress_bar(
    pb: &Option<ProgressBar>,
    total_frames: Option<u64>,
    decoded_frames: u64,
    start_time: Instant,
) {
    if let Some(pb) = pb {
        let fps = rate(decoded_frames, start_time.elapsed());

        if total_frames.is_some() {
            pb.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
        } else {
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
        }

        pb.finish_with_message(format!("speed: {fps:.1} fps"));
    }
}
