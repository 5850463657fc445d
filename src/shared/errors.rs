#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to create state path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve home directory for state root")]
    HomeDirectoryUnavailable,
    #[error("failed to read state file {path}: {source}")]
    ReadState {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse state file {path}: {source}")]
    ParseState {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write state file {path}: {source}")]
    WriteState {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
