use crate::cache::FetchError;
use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Fetch(FetchError),

    #[from]
    Json(serde_json::Error),

    #[from]
    Io(std::io::Error),

    /// Rejected configuration value
    InvalidConfig(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}
