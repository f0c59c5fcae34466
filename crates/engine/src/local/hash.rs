use md5::{Digest, Md5};
use std::path::Path;
use tokio::io::AsyncReadExt;

const BUFFER_SIZE: usize = 64 * 1024;

/// Lowercase hex MD5 of a file's contents, streamed in fixed-size chunks.
pub(crate) async fn md5_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_md5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(md5_file(&path).await.unwrap(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_md5_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.bin");
        let data = vec![b'x'; BUFFER_SIZE * 2 + 7];
        std::fs::write(&path, &data).unwrap();
        assert_eq!(md5_file(&path).await.unwrap(), hex::encode(Md5::digest(&data)));
    }

    #[tokio::test]
    async fn test_md5_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(md5_file(&dir.path().join("missing")).await.is_err());
    }
}
