use std::sync::LazyLock;

/// Git metadata captured by `build.rs`.
pub(crate) struct BuildInfo {
    pub branch: Option<&'static str>,
    pub commit_sha1: Option<&'static str>,
    pub git_dirty: bool,
}

pub(crate) static BUILD_INFO: LazyLock<BuildInfo> = LazyLock::new(|| BuildInfo {
    branch: option_env!("VERGEN_GIT_BRANCH"),
    commit_sha1: option_env!("VERGEN_GIT_SHA"),
    git_dirty: option_env!("VERGEN_GIT_DIRTY") == Some("true"),
});
