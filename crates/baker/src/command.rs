//! Command line of the baking tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use lightbake_core::bake::BakeParams;

use crate::config::BakerConfig;

/// Fully resolved invocation of the baking tool.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl BakeCommand {
    /// Build the invocation for one bake.
    ///
    /// `name` names the debug dump file; `params` must already be validated.
    pub fn new(
        config: &BakerConfig,
        params: &BakeParams,
        input: &Path,
        output: &Path,
        name: &str,
    ) -> Self {
        let mut args: Vec<OsString> = vec![
            "-b".into(),
            "-P".into(),
            config.bake_script.clone().into(),
            "--".into(),
        ];

        let mut push = |flag: &str, value: OsString| {
            args.push(flag.into());
            args.push(value);
        };

        push("--input", input.into());
        push("--output", output.into());
        push("--steps", params.steps.clone().into());
        push("--samples", params.samples.to_string().into());
        push("--resolution", params.resolution.to_string().into());
        push("--margin", params.margin.to_string().into());
        push("--denoise", params.denoise.as_str().into());

        if let Some(hdri) = &params.hdri {
            push("--hdri", config.hdri_dir.join(hdri).into());
            push(
                "--hdriRotation",
                params.hdri_rotation.unwrap_or(0.0).to_string().into(),
            );
            push(
                "--hdriExposure",
                params.hdri_exposure.unwrap_or(1.0).to_string().into(),
            );
        }

        if let Some(step) = params.dump_step() {
            push("--dumpAfter", step.into());
            push("--dumpFile", config.dump_dir.join(format!("{name}.blend")).into());
        }

        Self {
            program: config.blender_exec.clone(),
            args,
        }
    }

    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}
