use std::path::PathBuf;

/// Baking tool configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BakerConfig {
    /// Path to the Blender executable.
    pub blender_exec: PathBuf,
    /// Python script run inside Blender.
    pub bake_script: PathBuf,
    /// Root of the per-game model tree that receives baked outputs.
    pub models_dir: PathBuf,
    /// Directory holding HDR environment maps.
    pub hdri_dir: PathBuf,
    /// Where uploaded scenes are written before baking.
    pub upload_dir: PathBuf,
    /// Where debug `.blend` dumps are written.
    pub dump_dir: PathBuf,
}

impl BakerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default                  |
    /// |---------------------|--------------------------|
    /// | `BLENDER_EXEC_PATH` | `blender`                |
    /// | `BAKE_SCRIPT_PATH`  | `utils/blender/bake.py`  |
    /// | `MODELS_DIR`        | `www/models`             |
    /// | `HDRI_DIR`          | `www/data/hdr`           |
    /// | `UPLOAD_DIR`        | system temp dir          |
    /// | `DUMP_DIR`          | system temp dir          |
    pub fn from_env() -> Self {
        let path = |var: &str, default: PathBuf| {
            std::env::var_os(var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        Self {
            blender_exec: path("BLENDER_EXEC_PATH", "blender".into()),
            bake_script: path("BAKE_SCRIPT_PATH", "utils/blender/bake.py".into()),
            models_dir: path("MODELS_DIR", "www/models".into()),
            hdri_dir: path("HDRI_DIR", "www/data/hdr".into()),
            upload_dir: path("UPLOAD_DIR", std::env::temp_dir()),
            dump_dir: path("DUMP_DIR", std::env::temp_dir()),
        }
    }
}
