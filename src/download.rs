//! Streaming writers: gzip decode + SHA-256 in one pass, or raw copy with an
//! advisory MD5 ETag check.

use crate::error::MirrorError;
use crate::store::ObjectBody;
use flate2::write::MultiGzDecoder;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::warn;

const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Resolves `name` under `root`, refusing names that could escape it.
pub(crate) fn destination_path(root: &Path, name: &str) -> Result<PathBuf, MirrorError> {
    let relative = Path::new(name);
    let safe = !name.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(MirrorError::UnsafeKey(name.to_string()));
    }
    Ok(root.join(relative))
}

/// Sibling path the archive fetcher writes to before the rename.
pub(crate) fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Creates (truncating) a destination file and any missing parent directories.
pub(crate) async fn create_destination(path: &Path) -> Result<File, MirrorError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(File::create(path).await?)
}

/// Moves decoded bytes out of the decoder's buffer into the hash and file.
async fn drain(
    decoder: &mut MultiGzDecoder<Vec<u8>>,
    hasher: &mut Sha256,
    writer: &mut BufWriter<File>,
) -> Result<(), MirrorError> {
    let decoded = decoder.get_mut();
    if !decoded.is_empty() {
        hasher.update(&decoded[..]);
        writer.write_all(&decoded[..]).await?;
        decoded.clear();
    }
    Ok(())
}

/// Decompresses a gzip body into `file`, hashing the decompressed bytes as
/// they are written. Concatenated gzip members decode as one stream.
///
/// Returns the lowercase hex SHA-256 of the decompressed content. The file
/// handle is consumed and closed on every path.
pub(crate) async fn stream_decompressed(
    key: &str,
    mut body: ObjectBody,
    file: File,
) -> Result<String, MirrorError> {
    let decompress_error = |source: std::io::Error| MirrorError::Decompress {
        key: key.to_string(),
        source,
    };

    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let mut decoder = MultiGzDecoder::new(Vec::new());
    let mut hasher = Sha256::new();

    while let Some(chunk) = body.stream.next().await {
        decoder.write_all(&chunk?).map_err(decompress_error)?;
        drain(&mut decoder, &mut hasher, &mut writer).await?;
    }
    decoder.try_finish().map_err(decompress_error)?;
    drain(&mut decoder, &mut hasher, &mut writer).await?;
    writer.flush().await?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// A plain MD5 ETag (single-part upload); multipart ETags contain `-`.
fn md5_etag(etag: Option<&str>) -> Option<String> {
    etag.filter(|e| e.len() == 32 && e.chars().all(|c| c.is_ascii_hexdigit()))
        .map(|e| e.to_ascii_lowercase())
}

/// Copies a body into `file` unchanged. When the store reported a plain MD5
/// ETag the bytes are hashed on the way and a disagreement is logged.
///
/// SSE-KMS and SSE-C objects carry 32-hex ETags that are not content MD5s,
/// so a disagreement never fails the transfer.
///
/// Returns the number of bytes written.
pub(crate) async fn stream_raw(
    key: &str,
    mut body: ObjectBody,
    file: File,
) -> Result<u64, MirrorError> {
    use md5::Md5;

    let expected = md5_etag(body.etag.as_deref());
    let mut hasher = expected.as_ref().map(|_| Md5::new());
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let mut written = 0u64;

    while let Some(chunk) = body.stream.next().await {
        let chunk = chunk?;
        if let Some(ref mut h) = hasher {
            h.update(&chunk);
        }
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;

    if let (Some(expected), Some(hasher)) = (expected, hasher) {
        let computed = format!("{:x}", hasher.finalize());
        if computed != expected {
            warn!(
                "ETag of {} is {} but the content MD5 is {}; the object may be encrypted server-side",
                key, expected, computed
            );
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    #[test]
    fn test_destination_path_rejects_escapes() {
        let root = Path::new("/var/lib/clamav/");
        assert_eq!(
            destination_path(root, "daily.cld").unwrap(),
            PathBuf::from("/var/lib/clamav/daily.cld")
        );
        assert!(destination_path(root, "sub/daily.cld").is_ok());
        assert!(destination_path(root, "../etc/passwd").is_err());
        assert!(destination_path(root, "/etc/passwd").is_err());
        assert!(destination_path(root, "").is_err());
    }

    #[test]
    fn test_part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/tmp/db.cld")),
            PathBuf::from("/tmp/db.cld.part")
        );
    }

    #[tokio::test]
    async fn test_stream_decompressed_writes_and_hashes_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = b"ClamAV-VDB:signature-data\n".repeat(5000);
        let compressed = gzip(&payload);

        // Deliver in small chunks to exercise incremental decoding.
        let chunks: Vec<Result<bytes::Bytes, MirrorError>> = compressed
            .chunks(777)
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();
        let body = ObjectBody {
            etag: None,
            stream: futures_util::stream::iter(chunks).boxed(),
        };

        let path = dir.path().join("db.cld");
        let file = create_destination(&path).await.unwrap();
        let digest = stream_decompressed("db.cld.gz", body, file).await.unwrap();

        assert_eq!(digest, sha256_hex(&payload));
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_stream_decompressed_rejects_non_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let file = create_destination(&dir.path().join("x")).await.unwrap();
        let body = ObjectBody::from_bytes(b"definitely not gzip".to_vec());

        let err = stream_decompressed("x.gz", body, file).await.unwrap_err();
        assert!(matches!(err, MirrorError::Decompress { .. }));
    }

    #[tokio::test]
    async fn test_stream_decompressed_reads_every_gzip_member() {
        let dir = tempfile::tempdir().unwrap();
        let mut concatenated = gzip(b"first-half;");
        concatenated.extend_from_slice(&gzip(b"second-half"));

        let path = dir.path().join("db.cld");
        let file = create_destination(&path).await.unwrap();
        let body = ObjectBody::from_bytes(concatenated);
        let digest = stream_decompressed("db.cld.gz", body, file).await.unwrap();

        assert_eq!(digest, sha256_hex(b"first-half;second-half"));
        assert_eq!(std::fs::read(&path).unwrap(), b"first-half;second-half");
    }

    #[tokio::test]
    async fn test_stream_raw_tolerates_non_md5_etags() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"hello".to_vec();

        let mut good = ObjectBody::from_bytes(data.clone());
        good.etag = Some("5d41402abc4b2a76b9719d911017c592".to_string());
        let file = create_destination(&dir.path().join("good")).await.unwrap();
        assert_eq!(stream_raw("good", good, file).await.unwrap(), 5);

        // SSE-KMS style ETag: 32 hex digits, not the content MD5.
        let mut encrypted = ObjectBody::from_bytes(data.clone());
        encrypted.etag = Some("9b2cf535f27731c974343645a3985328".to_string());
        let path = dir.path().join("encrypted");
        let file = create_destination(&path).await.unwrap();
        assert_eq!(stream_raw("encrypted", encrypted, file).await.unwrap(), 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");

        let mut multipart = ObjectBody::from_bytes(data);
        multipart.etag = Some("d41d8cd98f00b204e9800998ecf8427e-2".to_string());
        let file = create_destination(&dir.path().join("multi")).await.unwrap();
        assert!(stream_raw("multi", multipart, file).await.is_ok());
    }
}
