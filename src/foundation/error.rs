/// Result alias used across the crate.
pub type HeadcastResult<T> = Result<T, HeadcastError>;

/// Errors surfaced by the streaming pipeline.
#[derive(thiserror::Error, Debug)]
pub enum HeadcastError {
    /// Malformed source image or driving sequence. Raised before any frame is produced.
    #[error("input error: {0}")]
    Input(String),

    /// Inference backend failure while rendering one frame.
    #[error("render error at frame {frame}: {message}")]
    Render {
        /// Content frame index that failed.
        frame: u64,
        /// Backend-provided message.
        message: String,
    },

    /// A registered observer failed to accept a frame.
    #[error("observer '{observer}' failed: {source}")]
    Observer {
        /// Observer name.
        observer: String,
        /// Underlying delivery failure.
        #[source]
        source: ObserverError,
    },

    /// The artifact assembler failed after every frame rendered.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Invalid configuration value or file.
    #[error("config error: {0}")]
    Config(String),

    /// The job was cancelled between frames.
    #[error("job cancelled before frame {0}")]
    Cancelled(u64),

    /// Context-wrapped I/O and miscellaneous failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HeadcastError {
    /// Build an [`HeadcastError::Input`].
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Build an [`HeadcastError::Render`] for content frame `frame`.
    pub fn render(frame: u64, msg: impl Into<String>) -> Self {
        Self::Render {
            frame,
            message: msg.into(),
        }
    }

    /// Build an [`HeadcastError::Assembly`].
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    /// Build an [`HeadcastError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Failure reported by a frame observer for a single delivery.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The observer's downstream is gone (closed socket, dropped receiver).
    #[error("observer closed")]
    Closed,

    /// The delivery attempt failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The observer panicked while handling a frame.
    #[error("observer panicked: {0}")]
    Panicked(String),
}

impl ObserverError {
    /// Build an [`ObserverError::Delivery`].
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
