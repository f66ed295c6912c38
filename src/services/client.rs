use crate::error::{AppDetectError, Result};
use crate::services::wire::decode_line;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;

/// One-shot query: connect, read the single response line, return it without the newline.
/// The line is checked to be a well-formed response before it is returned.
pub async fn query(socket_path: &Path, timeout: Duration) -> Result<String> {
    let read = async {
        let mut stream = UnixStream::connect(socket_path).await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok::<_, std::io::Error>(response)
    };

    let response = tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| {
            AppDetectError::ServiceUnavailable(format!(
                "Сервер {} не ответил за {:?}",
                socket_path.display(),
                timeout
            ))
        })??;

    let Some(line) = response.strip_suffix('\n') else {
        return Err(AppDetectError::Internal(format!(
            "Неполный ответ сервера: {:?}",
            response
        )));
    };

    decode_line(line)?;
    Ok(line.to_string())
}
