//! Output graph assembly.

use crate::graph::state::{copy, mkdir, resolve_path, scratch, State, DEFAULT_DIR_MODE};

/// `PATH` of the assembled output filesystem.
const OUTPUT_PATH_ENV: &str = "/bin";

/// Build a minimal filesystem holding only `artifact_path` from `build`.
///
/// Starts from the empty filesystem, sets a bare `PATH`, creates the
/// destination directory and copies the artifact into `dest_path`. The build
/// state is embedded only as the copy source, so none of its toolchain,
/// sources or caches land in the result.
pub fn assemble_output(build: &State, artifact_path: &str, dest_path: &str) -> State {
    let dest = resolve_path("/", dest_path);
    let dest_dir = match dest.trim_end_matches('/') {
        "" => "/".to_string(),
        dir if dest.ends_with('/') => dir.to_string(),
        file => match file.rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        },
    };

    let output = scratch().add_env("PATH", OUTPUT_PATH_ENV);
    let output = if dest_dir == "/" {
        output
    } else {
        output.file(mkdir(dest_dir, DEFAULT_DIR_MODE))
    };
    output.file(copy(build, artifact_path, dest))
}
