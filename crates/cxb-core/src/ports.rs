use async_trait::async_trait;

use crate::errors::FetchError;

/// Downloads an uploaded file by its platform file id.
///
/// Implementations must refuse files larger than `max_bytes` with
/// [`FetchError::TooLarge`] instead of buffering them.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self, file_id: &str, max_bytes: u64) -> Result<Vec<u8>, FetchError>;
}
