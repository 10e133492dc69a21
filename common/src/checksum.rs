use anyhow::{Context, Result};
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

/// Number of leading bytes that participate in the content checksum.
///
/// Files shorter than this are hashed in full; longer files are hashed only
/// up to the cap. Two files identical in their first [`MAX_HASH_BYTES`] but
/// differing afterwards hash the same - this is an intentional bounded-cost
/// heuristic, not an integrity check.
pub const MAX_HASH_BYTES: u64 = 1_048_576;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// MD5 over at most the first [`MAX_HASH_BYTES`] bytes of a file, hex encoded.
pub async fn truncated_md5(path: &std::path::Path) -> Result<String> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed opening {:?} for hashing", path))?;
    let mut reader = file.take(MAX_HASH_BYTES);
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let count = reader
            .read(&mut buffer)
            .await
            .with_context(|| format!("failed reading {:?} for hashing", path))?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }
    Ok(hex::encode(hasher.finalize()))
}
