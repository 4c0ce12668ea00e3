use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, ReframeArgs};
use crate::input::InputReader;
use crate::timestamp::time_str;
use h264au::process::assemble::Assembler;
use h264au::process::gate::{GateOutcome, StreamGate};
use h264au::structs::access_unit::AccessUnit;

struct Reframer {
    assembler: Assembler,
    gate: Option<StreamGate>,
    writer: Box<dyn Write>,
    units_written: u64,
    bytes_written: u64,
}

impl Reframer {
    fn drain(&mut self) -> Result<()> {
        while let Some(unit) = self.assembler.next() {
            let unit = match self.gate.as_mut() {
                Some(gate) => match gate.push(unit)? {
                    GateOutcome::Forward(unit) => unit,
                    GateOutcome::Hold | GateOutcome::Drop(_) => continue,
                },
                None => unit,
            };
            self.write_unit(&unit)?;
        }

        Ok(())
    }

    fn write_unit(&mut self, unit: &AccessUnit) -> Result<()> {
        self.writer.write_all(unit.as_ref())?;
        self.units_written += 1;
        self.bytes_written += unit.len() as u64;

        Ok(())
    }
}

pub fn cmd_reframe(args: &ReframeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let start = Instant::now();
    let mut input_reader = InputReader::new(&args.input)?;

    let writer: Box<dyn Write> = if args.output_path.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else {
        let file = File::create(&args.output_path)
            .with_context(|| format!("Failed to create {}", args.output_path.display()))?;
        Box::new(BufWriter::new(file))
    };

    let mut assembler = Assembler::default();
    assembler.set_fail_level(cli.fail_level());

    let mut reframer = Reframer {
        assembler,
        gate: (!args.no_gate).then(StreamGate::default),
        writer,
        units_written: 0,
        bytes_written: 0,
    };

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} {pos} access units | elapsed: {elapsed_precise}",
            )?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        }
        None => None,
    };

    input_reader.process_chunks(args.chunk_size.max(1), |chunk| {
        reframer.assembler.push_bytes(chunk)?;
        reframer.drain()?;
        if let Some(ref pb) = pb {
            pb.set_position(reframer.units_written);
        }

        Ok(true)
    })?;

    reframer.assembler.finish()?;
    reframer.drain()?;
    if let Some(saved) = reframer.gate.as_mut().and_then(StreamGate::finish) {
        reframer.write_unit(&saved)?;
    }
    reframer.writer.flush()?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if let Some(gate) = &reframer.gate {
        if gate.dropped() > 0 {
            log::warn!("Dropped {} access units before the first IDR", gate.dropped());
        }
    }
    log::info!(
        "Wrote {} access units ({} bytes) in {}",
        reframer.units_written,
        reframer.bytes_written,
        time_str(start.elapsed())
    );

    Ok(())
}
