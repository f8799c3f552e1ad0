//! Dump command: print a recipe's definition.

use super::{load_recipe, Target};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

pub fn dump(recipe: Option<&Path>, target: Target, pretty: bool) -> Result<()> {
    let recipe = load_recipe(recipe)?;
    let def = target.state(&recipe).marshal()?;

    let mut stdout = std::io::stdout().lock();
    if pretty {
        serde_json::to_writer_pretty(&mut stdout, &def)?;
        writeln!(stdout)?;
    } else {
        def.write_to(&mut stdout)?;
    }
    Ok(())
}
