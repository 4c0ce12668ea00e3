use crate::input::InputReader;
use anyhow::Result;
use h264au::process::assemble::Assembler;
use h264au::process::gate::{GateOutcome, StreamGate};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;

/// Counts the access units the gate would forward, which bounds the number
/// of frames a decoder can emit.
pub fn estimate_total_frames(input_path: &Path, chunk_size: usize) -> Result<u64> {
    log::info!("Counting access units for progress estimation");
    let count_start = std::time::Instant::now();

    let mut input_reader = InputReader::new(input_path)?;
    let mut assembler = Assembler::default();
    let mut gate = StreamGate::default();
    let mut decodable = 0u64;
    let mut bytes_read = 0u64;

    let mut count = |assembler: &mut Assembler, gate: &mut StreamGate| -> Result<()> {
        for unit in assembler.by_ref() {
            if let GateOutcome::Forward(_) = gate.push(unit)? {
                decodable += 1;
            }
        }
        Ok(())
    };

    input_reader.process_chunks(chunk_size.max(1), |chunk| {
        bytes_read += chunk.len() as u64;
        assembler.push_bytes(chunk)?;
        count(&mut assembler, &mut gate)?;

        Ok(true)
    })?;

    assembler.finish()?;
    count(&mut assembler, &mut gate)?;

    let count_elapsed = count_start.elapsed();
    let read_speed_mbps = if count_elapsed.as_secs_f64() > 0.0 {
        (bytes_read as f64) / 1_000_000.0 / count_elapsed.as_secs_f64()
    } else {
        0.0
    };

    log::info!(
        "Found {decodable} decodable access units in {:.3}s ({:.1} MB/s, {} bytes)",
        count_elapsed.as_secs_f64(),
        read_speed_mbps,
        bytes_read
    );

    Ok(decodable)
}

pub fn create_progress_bar(multi: &MultiProgress, total_frames: Option<u64>) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_frames {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);

        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
        )?);

        pb
    };
    pb.set_message("opening decoder");
    Ok(pb)
}
