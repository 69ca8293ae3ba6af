use confluence_client::confluence::ConfluenceError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Confluence(#[from] ConfluenceError),

    #[error("config error: {0}")]
    Config(String),
}
