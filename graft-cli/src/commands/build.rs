//! Build command: solve a recipe on the executor.

use super::{load_recipe, Target};
use anyhow::{Context, Result};
use colored::Colorize;
use graft_core::{run_solve, Config, SolveOpt};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub struct BuildArgs {
    pub recipe: Option<PathBuf>,
    pub local: Vec<(String, PathBuf)>,
    pub target: Target,
}

/// Solve the recipe, writing the definition to stdout and progress to stderr.
pub async fn build(config: &Config, args: BuildArgs, cancel: CancellationToken) -> Result<()> {
    let recipe = load_recipe(args.recipe.as_deref())?;
    let session = config.session_config()?;
    let state = args.target.state(&recipe);

    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    let local_dirs = local_dirs(&recipe.local_name, cwd, args.local);

    eprintln!(
        "{} Solving {} graph on {}",
        "→".blue().bold(),
        format!("{:?}", args.target).to_lowercase(),
        session.client.endpoint.to_string().bold()
    );

    let opt = SolveOpt { local_dirs, ..Default::default() };
    let display = config.progress.display();
    let report =
        run_solve(&session, &state, opt, &mut std::io::stdout(), display, cancel).await?;

    eprintln!(
        "{} Solved in {:.2}s ({} steps, {} cached)",
        "✓".green().bold(),
        report.duration.as_secs_f64(),
        report.summary.vertices,
        report.summary.cached
    );
    for (key, value) in &report.response.exporter_response {
        eprintln!("  {} {}", format!("{}:", key).dimmed(), value);
    }
    Ok(())
}

/// The recipe's local name binds to `cwd` unless overridden.
fn local_dirs(
    default_name: &str,
    cwd: PathBuf,
    overrides: Vec<(String, PathBuf)>,
) -> BTreeMap<String, PathBuf> {
    let mut dirs = BTreeMap::new();
    dirs.insert(default_name.to_string(), cwd.clone());
    for (name, path) in overrides {
        let path = if path.is_absolute() { path } else { cwd.join(path) };
        dirs.insert(name, path);
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_dirs_default_binding() {
        let dirs = local_dirs("src", PathBuf::from("/work"), vec![]);
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs["src"], PathBuf::from("/work"));
    }

    #[test]
    fn test_local_dirs_overrides() {
        let dirs = local_dirs(
            "src",
            PathBuf::from("/work"),
            vec![
                ("src".to_string(), PathBuf::from("/elsewhere")),
                ("assets".to_string(), PathBuf::from("static")),
            ],
        );
        assert_eq!(dirs["src"], PathBuf::from("/elsewhere"));
        assert_eq!(dirs["assets"], PathBuf::from("/work/static"));
    }
}
