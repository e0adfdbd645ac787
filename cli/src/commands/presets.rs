use std::io::Write;

use dagwave_core::api::{list_presets, CliError};

pub fn presets_cmd() -> Result<i32, CliError> {
    let mut out = std::io::stdout().lock();
    for info in list_presets() {
        writeln!(
            out,
            "{:<10} {:<8} {}",
            info.name.as_str(),
            info.security_level,
            info.description
        )?;
    }
    Ok(0)
}
