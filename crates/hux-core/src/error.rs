use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("redis transport error: {0}")]
    Transport(#[from] redis::RedisError),

    #[error("event channel closed by transport")]
    ChannelClosed,
}
