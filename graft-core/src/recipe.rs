//! Declarative recipe for a compile-and-extract build.
//!
//! A recipe describes the build graph (toolchain image, sources copied from a
//! local directory, build steps) and the artifact extracted into a minimal
//! output filesystem. The default recipe builds a Go program.

use crate::error::{GraftError, Result};
use crate::graph::{
    assemble_output, copy, image, local, mkdir, State, DEFAULT_DIR_MODE, DEFAULT_PATH_ENV_UNIX,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    /// Toolchain image the build runs in.
    pub base_image: String,
    /// Environment for build steps.
    pub env: BTreeMap<String, String>,
    /// Directory sources are copied into and steps run from.
    pub workdir: String,
    /// Symbolic local directory the sources come from.
    pub local_name: String,
    /// Paths inside the local directory to copy into `workdir`. Entries
    /// containing `*`, `?` or `[` are matched as patterns.
    pub sources: Vec<String>,
    /// Shell-form commands, run in order.
    pub steps: Vec<String>,
    /// Artifact path, relative paths resolve against `workdir`.
    pub artifact: String,
    /// Destination in the output filesystem. A trailing `/` names a directory.
    pub output_path: String,
}

impl Default for Recipe {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), format!("/usr/local/go/bin:{}", DEFAULT_PATH_ENV_UNIX));

        Self {
            base_image: "docker.io/library/golang:1.17-alpine".to_string(),
            env,
            workdir: "/meta-buildkit".to_string(),
            local_name: "src".to_string(),
            sources: vec!["go.mod".to_string(), "go.sum".to_string(), "main.go".to_string()],
            steps: vec![
                "go mod download".to_string(),
                "go build -o meta-buildkit main.go".to_string(),
            ],
            artifact: "meta-buildkit".to_string(),
            output_path: "/bin/".to_string(),
        }
    }
}

impl Recipe {
    /// Load a recipe from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraftError::IoError { path: path.to_path_buf(), source: e })?;
        let recipe: Recipe = serde_json::from_str(&content).map_err(|e| {
            GraftError::InvalidConfig {
                reason: format!("Failed to parse recipe {}: {}", path.display(), e),
            }
        })?;
        recipe.validate()?;
        Ok(recipe)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("base_image", &self.base_image),
            ("workdir", &self.workdir),
            ("local_name", &self.local_name),
            ("artifact", &self.artifact),
            ("output_path", &self.output_path),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(GraftError::InvalidConfig {
                    reason: format!("recipe field `{}` must not be empty", field),
                });
            }
        }
        Ok(())
    }

    /// The build graph: toolchain, sources and steps.
    pub fn build_state(&self) -> State {
        let src = local(&self.local_name);

        let mut state = image(&self.base_image);
        for (key, value) in &self.env {
            state = state.add_env(key, value);
        }
        state = state.file(mkdir(&self.workdir, DEFAULT_DIR_MODE)).dir(&self.workdir);

        for source in &self.sources {
            let pattern = source.contains(['*', '?', '[']);
            state = state.file(copy(&src, source, ".").allow_wildcard(pattern));
        }
        for step in &self.steps {
            state = state.run(step.as_str()).into_root();
        }
        state
    }

    /// The output graph: only the artifact, copied out of the build graph.
    pub fn output_state(&self) -> State {
        let build = self.build_state();
        let artifact = if self.artifact.starts_with('/') {
            self.artifact.clone()
        } else {
            format!("{}/{}", self.workdir.trim_end_matches('/'), self.artifact)
        };
        assemble_output(&build, &artifact, &self.output_path)
    }
}
