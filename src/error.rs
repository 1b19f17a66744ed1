use thiserror::Error;

/// Errors surfaced by the symbolization core.
///
/// Rendering never produces one of these: a frame that cannot be resolved
/// degrades to its raw address instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A string that should have been a hex address was not one.
    #[error("malformed address {0:?}")]
    MalformedAddress(String),

    /// A Breakpad symbol file failed to decode.
    #[error("malformed symbol file: {0}")]
    MalformedSymbolFile(String),

    /// A crash-report input failed to parse.
    #[error("{0}")]
    Parse(String),

    /// An Apple report declared a version no dialect is known for.
    #[error("unknown report version: {0}")]
    UnknownReportVersion(u32),

    /// A collaborating service failed or returned an unusable result.
    #[error("service error: {0:#}")]
    Service(anyhow::Error),
}
