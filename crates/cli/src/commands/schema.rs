use anyhow::Result;
use kiln_core::configs::targets::config_schema_json;

pub fn execute() -> Result<()> {
    println!("{}", config_schema_json()?);
    Ok(())
}
