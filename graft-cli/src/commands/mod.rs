//! CLI command implementations

mod build;
mod dump;

pub use build::{build, BuildArgs};
pub use dump::dump;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use graft_core::{Recipe, State};
use std::path::{Path, PathBuf};

/// Which of the recipe's graphs to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// The toolchain graph that compiles the artifact
    Build,
    /// The minimal filesystem holding only the artifact
    Output,
}

impl Target {
    pub fn state(self, recipe: &Recipe) -> State {
        match self {
            Target::Build => recipe.build_state(),
            Target::Output => recipe.output_state(),
        }
    }
}

/// Parse a `NAME=PATH` local directory binding.
pub fn parse_local(s: &str) -> Result<(String, PathBuf)> {
    let Some((name, path)) = s.split_once('=') else {
        bail!("invalid local binding {:?}, expected NAME=PATH", s);
    };
    if name.is_empty() || path.is_empty() {
        bail!("invalid local binding {:?}, expected NAME=PATH", s);
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

/// Load the recipe at `path`, or the built-in one.
pub fn load_recipe(path: Option<&Path>) -> Result<Recipe> {
    match path {
        Some(path) => Recipe::load(path).context("Failed to load recipe"),
        None => Ok(Recipe::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local() {
        assert_eq!(
            parse_local("src=/home/me/project").unwrap(),
            ("src".to_string(), PathBuf::from("/home/me/project"))
        );
        assert_eq!(parse_local("a=b=c").unwrap().1, PathBuf::from("b=c"));
        assert!(parse_local("src").is_err());
        assert!(parse_local("=path").is_err());
        assert!(parse_local("src=").is_err());
    }

    #[test]
    fn test_default_recipe() {
        let recipe = load_recipe(None).unwrap();
        assert_eq!(recipe.local_name, "src");
    }
}
