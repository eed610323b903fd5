//! 构建元信息：crate 版本、git commit、构建时间，以及本地库 schema 版本上限

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const GIT_SHA: &str = env!("VERGEN_GIT_SHA");

pub const BUILD_TIME: &str = env!("VERGEN_BUILD_TIMESTAMP");

// build.rs 生成：`pub const SDK_DB_VERSION: i64 = <migrations/ 中最大的 V 编号>;`
include!(concat!(env!("OUT_DIR"), "/schema_version.rs"));

/// 日志用的单行版本描述
pub fn version_line() -> String {
    format!("v{} (git {}, schema v{})", SDK_VERSION, GIT_SHA, SDK_DB_VERSION)
}
