#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("remote error: {0}")]
    Remote(#[from] mira_api::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine disposed")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, Error>;
