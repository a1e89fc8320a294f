use std::{path::PathBuf, process::Stdio, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch renderer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("renderer exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("failed to read rendered output: {0}")]
    Output(#[source] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

/// Turns a repository identifier into a single rendered document.
///
/// Implementations may be arbitrarily slow; callers run them on their own task.
#[async_trait]
pub trait RepoRenderer: Send + Sync {
    async fn render(&self, repo_url: &str, max_file_bytes: u64) -> Result<String, RenderError>;
}

/// Runs an external `rendergit`-compatible program and collects the file it writes.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("rendergit-{}.html", Uuid::new_v4()))
    }
}

#[async_trait]
impl RepoRenderer for CommandRenderer {
    async fn render(&self, repo_url: &str, max_file_bytes: u64) -> Result<String, RenderError> {
        let out_path = Self::scratch_path();

        let output = Command::new(&self.program)
            .arg(repo_url)
            .arg("--out")
            .arg(&out_path)
            .arg("--no-open")
            .arg("--max-bytes")
            .arg(max_file_bytes.to_string())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&out_path).await;
            return Err(RenderError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let rendered = tokio::fs::read_to_string(&out_path)
            .await
            .map_err(RenderError::Output);
        let _ = tokio::fs::remove_file(&out_path).await;
        rendered
    }
}

/// Adapts a synchronous render function by running it on the blocking pool.
pub struct BlockingRenderer<F> {
    render_fn: Arc<F>,
}

impl<F> BlockingRenderer<F>
where
    F: Fn(&str, u64) -> Result<String, RenderError> + Send + Sync + 'static,
{
    pub fn new(render_fn: F) -> Self {
        Self {
            render_fn: Arc::new(render_fn),
        }
    }
}

#[async_trait]
impl<F> RepoRenderer for BlockingRenderer<F>
where
    F: Fn(&str, u64) -> Result<String, RenderError> + Send + Sync + 'static,
{
    async fn render(&self, repo_url: &str, max_file_bytes: u64) -> Result<String, RenderError> {
        let render_fn = Arc::clone(&self.render_fn);
        let repo_url = repo_url.to_string();

        tokio::task::spawn_blocking(move || render_fn(&repo_url, max_file_bytes))
            .await
            .map_err(|err| RenderError::Failed(format!("render task aborted: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let renderer = CommandRenderer::new("rendergit-definitely-not-installed");
        let err = renderer
            .render("https://github.com/owner/repo", 1024)
            .await
            .expect_err("program does not exist");

        assert!(matches!(err, RenderError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_reports_exit_status() {
        let renderer = CommandRenderer::new("false");
        let err = renderer
            .render("https://github.com/owner/repo", 1024)
            .await
            .expect_err("false exits non-zero");

        assert!(matches!(err, RenderError::CommandFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reads_document_written_by_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("rendergit-cmd-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create script dir");
        let script = dir.join("fake-rendergit");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf '<html>%s %s</html>' \"$1\" \"$6\" > \"$3\"\n",
        )
        .expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("make script executable");

        let renderer = CommandRenderer::new(script.to_string_lossy());
        let html = renderer
            .render("https://github.com/owner/repo", 2048)
            .await
            .expect("render succeeds");

        assert_eq!(html, "<html>https://github.com/owner/repo 2048</html>");
        std::fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[tokio::test]
    async fn blocking_renderer_propagates_result_and_failure() {
        let renderer = BlockingRenderer::new(|repo_url: &str, max_file_bytes: u64| {
            if repo_url.is_empty() {
                Err(RenderError::Failed("empty repo".to_string()))
            } else {
                Ok(format!("{repo_url}:{max_file_bytes}"))
            }
        });

        assert_eq!(
            renderer.render("owner/repo", 10).await.expect("render"),
            "owner/repo:10"
        );
        let err = renderer.render("", 10).await.expect_err("empty repo fails");
        assert_eq!(err.to_string(), "empty repo");
    }

    #[tokio::test]
    async fn blocking_renderer_panics_become_failures() {
        let renderer = BlockingRenderer::new(|_: &str, _: u64| -> Result<String, RenderError> {
            panic!("renderer crashed")
        });

        let err = renderer.render("owner/repo", 10).await.expect_err("panic");
        assert!(err.to_string().contains("render task aborted"));
    }
}
