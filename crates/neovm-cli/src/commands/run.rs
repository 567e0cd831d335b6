//! `neovm run`: execute a script under the gas meter.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use neovm::{Debugger, ExecutionEngine, LoadOptions, Script, VmState};
use serde_json::json;

use super::{item_json, item_text, read_limits, read_script};
use crate::gas::{GasMeter, DATOSHI_PER_GAS};
use crate::output::{self, StyledOutput};

/// Arguments for the run command.
pub struct RunArgs {
    pub script: String,
    pub limits: Option<PathBuf>,
    pub gas: Option<u64>,
    pub fee_factor: u64,
    pub break_points: Vec<usize>,
    pub json: bool,
    pub color: String,
}

/// Run the script; returns the final engine state
pub fn execute(args: RunArgs) -> anyhow::Result<VmState> {
    let bytes = read_script(&args.script)?;
    let limits = read_limits(args.limits.as_deref())?;
    let script = Arc::new(Script::new(bytes, true).context("Invalid script")?);

    let mut engine = ExecutionEngine::with_limits(limits);
    engine
        .load_script(Arc::clone(&script), LoadOptions::default())
        .context("Failed to load script")?;

    let mut out = StyledOutput::new(output::resolve_color_choice(Some(&args.color)));
    let mut debugger = Debugger::with_host(engine, GasMeter::new(args.gas, args.fee_factor));
    for &position in &args.break_points {
        debugger.add_break_point(&script, position);
    }

    let state = loop {
        let state = debugger.execute();
        if state != VmState::Break {
            break state;
        }
        if !args.json {
            print_break(&mut out, debugger.engine());
        }
    };

    let (engine, meter) = debugger.into_inner();
    if args.json {
        print_json(&engine, &meter);
    } else {
        print_summary(&mut out, &engine, &meter);
    }
    Ok(state)
}

fn print_break(out: &mut StyledOutput, engine: &ExecutionEngine) {
    let Some(context) = engine.current_context() else {
        return;
    };
    out.warning("BREAK");
    out.plain(&format!(" at offset {}", context.instruction_pointer()));
    if let Ok(Some(instruction)) = context.current_instruction() {
        out.dim(&format!("  {instruction}"));
    }
    out.newline();

    let heap = engine.reference_counter().heap();
    let stack = context.evaluation_stack();
    for (index, item) in stack.iter().rev().enumerate() {
        out.plain(&format!("  [{index}] {}", item_text(item, heap)));
        out.newline();
    }
    out.flush();
}

fn print_summary(out: &mut StyledOutput, engine: &ExecutionEngine, meter: &GasMeter) {
    match engine.state() {
        VmState::Halt => out.success("HALT"),
        VmState::Fault => out.error("FAULT"),
        state => out.warning(&format!("{state:?}").to_uppercase()),
    }
    out.dim(&format!(
        "  gas consumed: {} datoshi ({:.8} GAS)",
        meter.consumed(),
        meter.consumed() as f64 / DATOSHI_PER_GAS as f64
    ));
    out.newline();

    let heap = engine.reference_counter().heap();
    if let Some(error) = engine.fault_error() {
        out.error("error: ");
        out.plain(&error.to_string());
        out.newline();
        if let Some(exception) = engine.uncaught_exception() {
            out.info("exception: ");
            out.plain(&item_text(exception, heap));
            out.newline();
        }
    }

    let results = engine.result_stack();
    if !results.is_empty() {
        out.info("result stack:");
        out.newline();
        for (index, item) in results.iter().rev().enumerate() {
            out.plain(&format!("  [{index}] {}", item_text(item, heap)));
            out.newline();
        }
    }
    out.flush();
}

fn print_json(engine: &ExecutionEngine, meter: &GasMeter) {
    let heap = engine.reference_counter().heap();
    let stack: Vec<_> = engine.result_stack().iter().map(|item| item_json(item, heap)).collect();
    let report = json!({
        "state": format!("{:?}", engine.state()).to_uppercase(),
        "gasconsumed": meter.consumed(),
        "stack": stack,
        "exception": engine.fault_error().map(|error| error.to_string()),
        "uncaught": engine.uncaught_exception().map(|item| item_json(item, heap)),
    });
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
}
