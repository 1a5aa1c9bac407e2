pub mod backend_error {
    use thiserror::Error;

    /// Errors raised by a browser backend.
    #[derive(Debug, Error)]
    pub enum BackendError {
        #[error("Backend not ready: no live browser session")]
        NotReady,

        #[error("Navigation failed: {0}")]
        Navigation(String),

        #[error("Query '{expression}' failed: {message}")]
        Query { expression: String, message: String },

        #[error("Element {0} is no longer on the page")]
        StaleElement(String),

        #[error("Script evaluation failed: {0}")]
        Script(String),

        #[error("Backend call timed out: {0}")]
        Timeout(String),

        #[error("Operation not supported by this backend: {0}")]
        NotSupported(String),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Serialization error: {0}")]
        Serialization(#[from] serde_json::Error),

        #[error("{0}")]
        Other(String),
    }

    impl BackendError {
        /// True when no further call can succeed until the session is relaunched.
        pub fn is_session_fatal(&self) -> bool {
            matches!(self, BackendError::NotReady)
        }
    }
}
