#[derive(Debug, thiserror::Error)]
pub enum LoomError {
    #[error("agent error: {0}")]
    Agent(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("duplicate plugin names: {0:?}")]
    DuplicatePlugins(Vec<String>),

    #[error("agent loop exceeded {0} iterations without a final response")]
    IterationLimit(usize),

    #[error("transfer target agent not found: {0}")]
    TransferTargetMissing(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoomError::Agent("test error".to_string());
        assert_eq!(err.to_string(), "agent error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let loom_err: LoomError = io_err.into();
        assert!(matches!(loom_err, LoomError::Io(_)));
    }

    #[test]
    fn test_duplicate_plugins_message() {
        let err = LoomError::DuplicatePlugins(vec!["a".into(), "a".into()]);
        assert!(err.to_string().contains('a'));
    }

    #[test]
    fn test_result_type() {
        let ok_result: Result<i32> = Ok(42);
        assert_eq!(ok_result.unwrap(), 42);

        let err_result: Result<i32> = Err(LoomError::Config("invalid".to_string()));
        assert!(err_result.is_err());
    }
}
