use std::sync::LazyLock;

use crate::build_info::BuildInfo;
use crate::build_info::BUILD_INFO;

/// `<image version> (<branch>@<short sha>[-dirty])`, shown by `--version` and logged at start.
pub static VERSION: LazyLock<String> =
    LazyLock::new(|| describe(env!("IMAGE_VERSION"), &BUILD_INFO));

fn describe(image_version: &str, info: &BuildInfo) -> String {
    let sha = info
        .commit_sha1
        .map(|sha| &sha[..sha.len().min(8)])
        .unwrap_or("unknown");
    let dirty = if info.git_dirty { "-dirty" } else { "" };
    match info.branch {
        Some(branch) => format!("{image_version} ({branch}@{sha}{dirty})"),
        None => format!("{image_version} ({sha}{dirty})"),
    }
}
