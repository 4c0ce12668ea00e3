use std::collections::BTreeMap;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use h264au::process::assemble::Assembler;
use h264au::process::gate::{GateOutcome, StreamGate};
use h264au::structs::access_unit::AccessUnit;
use h264au::structs::slice::SliceHeader;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing H.264 stream: {}", args.input.display());

    let report = analyze_stream(args, cli, multi)?;

    if report.access_units == 0 {
        println!("No H.264 access units found in the input.");
        println!("This doesn't appear to be an Annex-B byte stream.");
        return Ok(());
    }

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

#[derive(Debug, Default, Serialize)]
struct StreamReport {
    total_bytes: u64,
    nal_units: u64,
    nal_types: BTreeMap<String, u64>,
    access_units: u64,
    keyframes: u64,
    slice_types: BTreeMap<String, u64>,
    /// Slices with `nal_ref_idc == 0`, never used for prediction.
    non_reference_slices: u64,
    slice_parse_failures: u64,
    largest_access_unit: usize,
    gate: GateReport,
}

#[derive(Debug, Default, Serialize)]
struct GateReport {
    /// Index of the access unit the gate synchronized on.
    first_sync_unit: Option<u64>,
    forwarded: u64,
    dropped: u64,
    held_parameter_sets: u64,
}

struct AnalysisContext {
    assembler: Assembler,
    gate: StreamGate,
    report: StreamReport,
    pb: Option<ProgressBar>,
}

impl AnalysisContext {
    fn process_units(&mut self) -> Result<()> {
        while let Some(unit) = self.assembler.next() {
            self.inspect(&unit);

            let index = self.report.access_units - 1;
            match self.gate.push(unit)? {
                GateOutcome::Forward(_) => {
                    if self.report.gate.first_sync_unit.is_none() {
                        self.report.gate.first_sync_unit = Some(index);
                    }
                    self.report.gate.forwarded += 1;
                }
                GateOutcome::Hold => self.report.gate.held_parameter_sets += 1,
                GateOutcome::Drop(_) => self.report.gate.dropped += 1,
            }
        }

        if let Some(ref pb) = self.pb {
            pb.set_message(format!(
                "{} access units, {} keyframes",
                self.report.access_units, self.report.keyframes
            ));
        }

        Ok(())
    }

    fn inspect(&mut self, unit: &AccessUnit) {
        let report = &mut self.report;
        report.access_units += 1;
        report.largest_access_unit = report.largest_access_unit.max(unit.len());
        if unit.flags.is_key {
            report.keyframes += 1;
        }

        for nal in unit.nal_units() {
            report.nal_units += 1;
            *report.nal_types.entry(nal.kind.to_string()).or_default() += 1;

            if nal.kind.is_slice() {
                if nal.nal_ref_idc() == 0 {
                    report.non_reference_slices += 1;
                }
                match SliceHeader::read(&nal) {
                    Ok(header) => {
                        *report
                            .slice_types
                            .entry(header.slice_type.to_string())
                            .or_default() += 1;
                    }
                    Err(e) => {
                        log::debug!("Slice header at offset {}: {e}", nal.offset);
                        report.slice_parse_failures += 1;
                    }
                }
            }
        }
    }
}

fn analyze_stream(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<StreamReport> {
    let mut input_reader = InputReader::new(&args.input)?;

    let mut assembler = Assembler::default();
    assembler.set_fail_level(cli.fail_level());

    let mut context = AnalysisContext {
        assembler,
        gate: StreamGate::default(),
        report: StreamReport::default(),
        pb: None,
    };

    if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Analyzing access units...");
        context.pb = Some(pb);
    }

    input_reader.process_chunks(64 * 1024, |chunk| {
        context.report.total_bytes += chunk.len() as u64;
        context.assembler.push_bytes(chunk)?;
        context.process_units()?;

        Ok(true)
    })?;

    context.assembler.finish()?;
    context.process_units()?;
    if context.gate.finish().is_some() {
        context.report.gate.forwarded += 1;
    }

    if let Some(pb) = context.pb.take() {
        pb.finish_and_clear();
    }

    Ok(context.report)
}

fn print_report(report: &StreamReport) {
    println!();
    println!("H.264 Stream Information");
    println!("========================");
    println!();

    println!("Analysis Summary");
    let size_mb = report.total_bytes as f64 / (1024.0 * 1024.0);
    println!("  Size                      {size_mb:.2} MB ({} bytes)", report.total_bytes);
    println!("  NAL units                 {}", report.nal_units);
    println!("  Access units              {}", report.access_units);
    println!("  Keyframes (IDR)           {}", report.keyframes);
    println!("  Largest access unit       {} bytes", report.largest_access_unit);
    if report.non_reference_slices > 0 {
        println!("  Non-reference slices      {}", report.non_reference_slices);
    }
    if report.slice_parse_failures > 0 {
        println!("  Unreadable slice headers  {}", report.slice_parse_failures);
    }
    println!();

    println!("NAL Unit Types");
    for (kind, count) in &report.nal_types {
        println!("  {kind:24}  {count}");
    }
    println!();

    if !report.slice_types.is_empty() {
        println!("Slice Types");
        for (kind, count) in &report.slice_types {
            println!("  {kind:24}  {count}");
        }
        println!();
    }

    println!("Decoder Synchronization");
    match report.gate.first_sync_unit {
        Some(index) => println!("  First decodable unit      #{index}"),
        None => println!("  First decodable unit      none (no IDR with parameter sets)"),
    }
    println!("  Forwarded                 {}", report.gate.forwarded);
    println!("  Dropped before sync       {}", report.gate.dropped);
    println!("  Parameter-set-only units  {}", report.gate.held_parameter_sets);
    println!();
}
