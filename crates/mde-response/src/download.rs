use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use futures::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::{ResponseError, Result};
use crate::evidence::Evidence;

/// Download and extract every evidence that resolved a download URL.
///
/// The vendor serves acquired files gzipped. Each one is written to
/// `<dir>/<sha256>.gz`, extracted to `<dir>/<sha256>` and the archive removed.
/// Failures are logged per evidence; only successful downloads are returned.
pub async fn download_evidences(
    http: &reqwest::Client,
    evidences: Vec<Evidence>,
    dir: &Path,
) -> Vec<Evidence> {
    let mut downloaded = Vec::new();
    tracing::info!(count = evidences.len(), dir = %dir.display(), "downloading evidence files");

    for mut evidence in evidences {
        let Some(url) = evidence.download_url.clone() else {
            continue;
        };
        match download_one(http, &evidence.sha256, &url, dir).await {
            Ok(path) => {
                tracing::info!(sha256 = %evidence.sha256, path = %path.display(), "evidence extracted");
                evidence.download_path = Some(path);
                downloaded.push(evidence);
            }
            Err(e) => {
                tracing::error!(sha256 = %evidence.sha256, error = %e, "failed to download evidence");
            }
        }
    }
    downloaded
}

async fn download_one(
    http: &reqwest::Client,
    sha256: &str,
    url: &str,
    dir: &Path,
) -> Result<PathBuf> {
    // the hash becomes a file name
    if sha256.is_empty() || !sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ResponseError::Download(format!(
            "refusing to store evidence under non-hex hash {sha256:?}"
        )));
    }
    tokio::fs::create_dir_all(dir).await?;
    let archive = dir.join(format!("{sha256}.gz"));
    let target = dir.join(sha256);

    let result = fetch_and_extract(http, url, &archive, &target).await;
    if tokio::fs::try_exists(&archive).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            tracing::warn!(path = %archive.display(), error = %e, "could not remove archive");
        }
    }
    result.map(|()| target)
}

async fn fetch_and_extract(
    http: &reqwest::Client,
    url: &str,
    archive: &Path,
    target: &Path,
) -> Result<()> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| ResponseError::Download(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ResponseError::Download(format!("HTTP {status} from {url}")));
    }

    let mut file = tokio::fs::File::create(archive).await?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ResponseError::Download(e.to_string()))?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let (from, to) = (archive.to_path_buf(), target.to_path_buf());
    tokio::task::spawn_blocking(move || gunzip(&from, &to))
        .await
        .map_err(|e| ResponseError::Download(e.to_string()))?
}

/// Extract `archive` into `target` through a temp file in the same directory,
/// so a failed extraction never leaves a truncated `target`.
fn gunzip(archive: &Path, target: &Path) -> Result<()> {
    let dir = target.parent().unwrap_or(Path::new("."));
    let mut decoder = GzDecoder::new(BufReader::new(File::open(archive)?));
    let mut tmp = NamedTempFile::new_in(dir)?;
    std::io::copy(&mut decoder, &mut tmp)
        .map_err(|e| ResponseError::Download(format!("bad gzip archive: {e}")))?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn gz(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn evidence(sha: &str, url: Option<String>) -> Evidence {
        let mut e = Evidence::new(sha, None, "a.exe", "C:\\", "m1");
        e.download_url = url;
        e
    }

    #[tokio::test]
    async fn downloads_and_extracts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/blob/aaa.gz")
            .with_body(gz(b"MZ payload"))
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let done = download_evidences(
            &reqwest::Client::new(),
            vec![
                evidence("aaa", Some(format!("{}/blob/aaa.gz", server.url()))),
                evidence("bbb", None),
            ],
            dir.path(),
        )
        .await;

        assert_eq!(done.len(), 1);
        let path = done[0].download_path.clone().unwrap();
        assert_eq!(path, dir.path().join("aaa"));
        assert_eq!(std::fs::read(&path).unwrap(), b"MZ payload");
        assert!(!dir.path().join("aaa.gz").exists());
    }

    #[tokio::test]
    async fn http_error_and_bad_archive_are_skipped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/blob/dead.gz")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/blob/beef.gz")
            .with_body("not gzip")
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let done = download_evidences(
            &reqwest::Client::new(),
            vec![
                evidence("dead", Some(format!("{}/blob/dead.gz", server.url()))),
                evidence("beef", Some(format!("{}/blob/beef.gz", server.url()))),
            ],
            dir.path(),
        )
        .await;

        assert!(done.is_empty());
        assert!(!dir.path().join("dead").exists());
        assert!(!dir.path().join("beef").exists());
        // failed extraction leaves no archive behind
        assert!(!dir.path().join("beef.gz").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn non_hex_hash_is_never_fetched() {
        let mut server = mockito::Server::new_async().await;
        let blob = server
            .mock("GET", "/blob/x.gz")
            .expect(0)
            .with_body(gz(b"MZ"))
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let done = download_evidences(
            &reqwest::Client::new(),
            vec![evidence("../outside", Some(format!("{}/blob/x.gz", server.url())))],
            &dir.path().join("downloads"),
        )
        .await;

        assert!(done.is_empty());
        assert!(!dir.path().join("outside").exists());
        assert!(!dir.path().join("outside.gz").exists());
        blob.assert_async().await;
    }
}
