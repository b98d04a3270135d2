use anyhow::{Context, Result};
use kiln_core::configs::manifest::manifest_schema;

pub fn execute() -> Result<()> {
    let schema = serde_json::to_string_pretty(&manifest_schema())
        .context("Failed to render manifest schema")?;
    println!("{}", schema);
    Ok(())
}
