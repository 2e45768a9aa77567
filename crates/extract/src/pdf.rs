//! PDF extraction shells out to poppler's `pdftotext`/`pdfinfo`, which handle
//! the long tail of malformed court PDFs far better than anything in-process.

use super::ExtractError;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

pub struct PdfTooling {
    pub pdftotext: PathBuf,
    pub pdfinfo: PathBuf,
}

impl PdfTooling {
    /// Extract text and a page count from PDF bytes. The page count comes
    /// from `pdfinfo`; when that fails, form feeds in the extracted text are
    /// counted instead.
    pub async fn extract(&self, content: &[u8]) -> Result<(String, u32), ExtractError> {
        let mut scratch = tempfile::NamedTempFile::new()?;
        scratch.write_all(content)?;
        scratch.flush()?;
        let path = scratch.path().to_owned();

        let output = tokio::process::Command::new(&self.pdftotext)
            .arg("-enc")
            .arg("UTF-8")
            .arg(&path)
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => {
                    ExtractError::MissingTool(self.pdftotext.display().to_string())
                }
                _ => ExtractError::Io(err),
            })?;

        if !output.status.success() {
            return Err(ExtractError::Corrupted(format!(
                "pdftotext exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        let pages = match self.page_count(&path).await {
            Ok(pages) => pages,
            Err(err) => {
                tracing::debug!(error = %err, "pdfinfo failed; counting form feeds");
                text.matches('\u{c}').count() as u32 + 1
            }
        };

        Ok((text, pages))
    }

    async fn page_count(&self, path: &std::path::Path) -> Result<u32, ExtractError> {
        let output = tokio::process::Command::new(&self.pdfinfo)
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => {
                    ExtractError::MissingTool(self.pdfinfo.display().to_string())
                }
                _ => ExtractError::Io(err),
            })?;

        if !output.status.success() {
            return Err(ExtractError::Corrupted(format!(
                "pdfinfo exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .find_map(|line| {
                let rest = line.strip_prefix("Pages:")?;
                rest.trim().parse::<u32>().ok()
            })
            .ok_or_else(|| ExtractError::Corrupted("pdfinfo reported no page count".to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tooling() -> PdfTooling {
        PdfTooling {
            pdftotext: "pdftotext".into(),
            pdfinfo: "pdfinfo".into(),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_tool_error() {
        let tooling = PdfTooling {
            pdftotext: "/nonexistent/pdftotext".into(),
            pdfinfo: "/nonexistent/pdfinfo".into(),
        };
        let err = tooling.extract(b"%PDF-1.4").await.unwrap_err();
        assert!(matches!(err, ExtractError::MissingTool(_)));
    }

    // Requires poppler-utils on the host.
    #[tokio::test]
    #[ignore]
    async fn garbage_input_is_reported_as_corrupted() {
        let err = tooling().extract(b"not a pdf at all").await.unwrap_err();
        assert!(matches!(err, ExtractError::Corrupted(_)));
    }
}
