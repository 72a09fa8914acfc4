//! Bake submission: stage the uploaded scene, register a registry job and
//! run the baking tool inside it.

use std::path::{Path, PathBuf};

use lightbake_core::bake::{BakeKind, BakeRequest};
use lightbake_core::job::CANCELLED_MESSAGE;
use lightbake_core::types::JobId;
use lightbake_jobs::{JobContext, JobRegistry};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::command::BakeCommand;
use crate::config::BakerConfig;
use crate::error::BakerError;
use crate::outcome::{map_exit, TOOL_NAME};
use crate::runner::run_process;

/// Turns bake requests into registry jobs backed by the baking tool.
#[derive(Debug, Clone)]
pub struct Baker {
    config: BakerConfig,
}

impl Baker {
    pub fn new(config: BakerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BakerConfig {
        &self.config
    }

    /// Where the uploaded scene for `name` is staged.
    pub fn input_path(&self, name: &str) -> PathBuf {
        self.config.upload_dir.join(format!("{name}.glb"))
    }

    /// Where the baked scene for `game`/`name` is written.
    pub fn output_path(&self, kind: BakeKind, game: &str, name: &str) -> PathBuf {
        self.config
            .models_dir
            .join(game)
            .join(kind.target_dir())
            .join(format!("{name}.glb"))
    }

    /// Stage `payload` and register a job that bakes it.
    ///
    /// The job's cancel handler fires a token the runner checks before
    /// spawning and while the process runs, so a cancel issued right after
    /// submission is never lost. On success the job result is
    /// `{"output": "<path>"}`.
    pub async fn submit(
        &self,
        registry: &JobRegistry,
        request: BakeRequest,
        payload: &[u8],
    ) -> Result<JobId, BakerError> {
        request.validate()?;

        let input = self.input_path(&request.name);
        let output = self.output_path(request.kind, &request.game, &request.name);

        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        tokio::fs::write(&input, payload).await?;
        if let Some(dir) = output.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let command = BakeCommand::new(
            &self.config,
            &request.params,
            &input,
            &output,
            &request.name,
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let id = registry.submit(
            move |ctx| async move { run_bake(command, ctx, token, input, output).await },
            move || cancel.cancel(),
        );

        tracing::info!(
            job_id = %id,
            kind = request.kind.as_str(),
            game = %request.game,
            name = %request.name,
            bytes = payload.len(),
            "Bake submitted",
        );
        Ok(id)
    }
}

async fn run_bake(
    command: BakeCommand,
    ctx: JobContext,
    cancel: CancellationToken,
    input: PathBuf,
    output: PathBuf,
) -> Result<serde_json::Value, String> {
    let job_id = ctx.id();
    tracing::info!(job_id = %job_id, input = %input.display(), "Bake started");

    let exit = match run_process(command.to_command(), &ctx, &cancel).await {
        Ok(exit) => exit,
        Err(e) if e.is_cancelled() => return Err(CANCELLED_MESSAGE.to_string()),
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Bake could not start");
            return Err(e.to_string());
        }
    };

    map_exit(TOOL_NAME, &exit)?;
    Ok(json!({ "output": display_path(&output) }))
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use lightbake_core::bake::BakeParams;
    use lightbake_core::error::CoreError;
    use lightbake_core::job::{JobStatus, JobView};

    use super::*;

    /// Write an executable stand-in for Blender that ignores its arguments.
    fn fake_blender(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("blender");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn baker(dir: &Path, body: &str) -> Baker {
        Baker::new(BakerConfig {
            blender_exec: fake_blender(dir, body),
            bake_script: "bake.py".into(),
            models_dir: dir.join("models"),
            hdri_dir: dir.join("hdr"),
            upload_dir: dir.join("upload"),
            dump_dir: dir.join("dump"),
        })
    }

    fn request(name: &str) -> BakeRequest {
        BakeRequest {
            kind: BakeKind::Island,
            game: "lba2".into(),
            name: name.into(),
            params: BakeParams::default(),
        }
    }

    async fn wait_terminal(registry: &JobRegistry, id: JobId) -> JobView {
        for _ in 0..1000 {
            let view = registry.get(id, 0).unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn successful_bake_reports_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let baker = baker(
            dir.path(),
            "echo '[PROGRESS]:Importing model'\necho '[PROGRESS]:Baking:0.5:Rock'\nexit 0",
        );
        let registry = JobRegistry::new();

        let id = baker
            .submit(&registry, request("citadel"), b"glTF")
            .await
            .unwrap();
        let view = wait_terminal(&registry, id).await;

        assert_eq!(view.status, JobStatus::Done);
        assert_eq!(view.progress.len(), 2);
        let expected = dir.path().join("models/lba2/islands/citadel.glb");
        assert_eq!(
            view.result,
            Some(json!({ "output": expected.to_string_lossy() }))
        );
        assert_eq!(
            std::fs::read(dir.path().join("upload/citadel.glb")).unwrap(),
            b"glTF"
        );
        assert!(dir.path().join("models/lba2/islands").is_dir());
    }

    #[tokio::test]
    async fn failing_bake_embeds_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let baker = baker(dir.path(), "echo 'Python: Traceback' >&2\nexit 1");
        let registry = JobRegistry::new();

        let id = baker
            .submit(&registry, request("scene"), b"glTF")
            .await
            .unwrap();
        let view = wait_terminal(&registry, id).await;

        assert_eq!(view.status, JobStatus::Error);
        let error = view.error.unwrap();
        assert!(error.starts_with("Blender exited with code 1, errors="), "{error}");
        assert!(error.contains("Python: Traceback"));
    }

    #[tokio::test]
    async fn cancel_right_after_submit_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let baker = baker(dir.path(), "echo '[PROGRESS]:Baking:0.1'\nexit 0");
        let registry = JobRegistry::new();

        let id = baker
            .submit(&registry, request("scene"), b"glTF")
            .await
            .unwrap();
        registry.cancel(id).unwrap();

        let view = wait_terminal(&registry, id).await;
        assert!(view.is_cancelled());
        assert!(view.progress.is_empty());
        assert_matches!(registry.cancel(id), Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_while_running_reports_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let baker = baker(dir.path(), "echo '[PROGRESS]:Baking:0.1'\nexec sleep 30");
        let registry = JobRegistry::new();

        let id = baker
            .submit(&registry, request("scene"), b"glTF")
            .await
            .unwrap();
        for _ in 0..1000 {
            if !registry.get(id, 0).unwrap().progress.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        registry.cancel(id).unwrap();

        let view = wait_terminal(&registry, id).await;
        assert_eq!(view.status, JobStatus::Error);
        assert_eq!(view.error.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(view.progress.len(), 1);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_staging() {
        let dir = tempfile::tempdir().unwrap();
        let baker = baker(dir.path(), "exit 0");
        let registry = JobRegistry::new();

        let result = baker.submit(&registry, request("../escape"), b"x").await;
        assert_matches!(result, Err(BakerError::Core(CoreError::Validation(_))));
        assert!(registry.is_empty());
        assert!(!dir.path().join("upload").exists());
    }

    #[test]
    fn iso_scenes_land_in_their_own_directory() {
        let baker = Baker::new(BakerConfig {
            blender_exec: "blender".into(),
            bake_script: "bake.py".into(),
            models_dir: "www/models".into(),
            hdri_dir: "hdr".into(),
            upload_dir: "/tmp".into(),
            dump_dir: "/tmp".into(),
        });
        assert_eq!(
            baker.output_path(BakeKind::IsoScene, "lba1", "twinsen_house"),
            PathBuf::from("www/models/lba1/iso_scenes/twinsen_house.glb")
        );
        assert_eq!(baker.input_path("x"), PathBuf::from("/tmp/x.glb"));
    }
}
