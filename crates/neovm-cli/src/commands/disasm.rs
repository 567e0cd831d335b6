//! `neovm disasm`: list the instructions of a script.

use anyhow::Context;
use neovm::Script;
use serde_json::json;

use super::read_script;
use crate::output::{self, StyledOutput};

/// Arguments for the disasm command.
pub struct DisasmArgs {
    pub script: String,
    pub json: bool,
    pub color: String,
}

pub fn execute(args: DisasmArgs) -> anyhow::Result<()> {
    let bytes = read_script(&args.script)?;
    // Decoding is lazy so that a truncated tail is reported, not rejected
    let script = Script::new(bytes, false).context("Invalid script")?;

    if args.json {
        let mut listing = Vec::new();
        for (offset, decoded) in script.instructions() {
            let instruction = decoded.with_context(|| format!("Decoding failed at {offset}"))?;
            listing.push(json!({
                "offset": offset,
                "opcode": instruction.opcode.name(),
                "operand": hex::encode(instruction.operand()),
                "text": instruction.to_string(),
            }));
        }
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    let mut out = StyledOutput::new(output::resolve_color_choice(Some(&args.color)));
    for (offset, decoded) in script.instructions() {
        out.dim(&format!("{offset:04x}  "));
        match decoded {
            Ok(instruction) => out.plain(&instruction.to_string()),
            Err(error) => out.error(&error.to_string()),
        }
        out.newline();
    }
    out.flush();
    Ok(())
}
