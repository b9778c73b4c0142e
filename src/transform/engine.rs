//! Transform engine seam
//!
//! The request pipeline only knows this trait. An engine receives the
//! sniffed source stream and an owned [`OperationList`] and returns the
//! encoded output as another stream. Dropping the returned stream (or the
//! pending future) must release the input.

use async_trait::async_trait;

use super::pipeline::OperationList;
use super::ByteStream;
use crate::error::ImagistError;

#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// Run `operations` over `input`, yielding the encoded image
    ///
    /// Failures before the first output byte are reported as
    /// [`ImagistError::TransformFailure`]; errors after that surface as
    /// `Err` items on the returned stream.
    async fn execute(
        &self,
        input: ByteStream,
        operations: OperationList,
    ) -> Result<ByteStream, ImagistError>;

    /// Engine name for logs
    fn name(&self) -> &'static str;
}
