//! Mapping of a finished process into a job outcome.

use lightbake_core::job::CANCELLED_MESSAGE;

/// Display name of the baking tool used in failure messages.
pub const TOOL_NAME: &str = "Blender";

/// What is known about a process once it has exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `-1` when the process was terminated by a signal.
    pub code: i32,
    /// Everything the process wrote to stderr, chunk by chunk.
    pub errors: Vec<String>,
    /// Whether cancellation was requested before the exit was observed.
    pub cancelled: bool,
}

/// Turn a process exit into a job outcome.
///
/// A clean exit (code 0, nothing on stderr) succeeds. Anything else is a
/// failure, reported as [`CANCELLED_MESSAGE`] when cancellation was
/// requested and as `"<tool> exited with code N..."` otherwise.
pub fn map_exit(tool: &str, exit: &ProcessExit) -> Result<(), String> {
    if exit.code == 0 && exit.errors.is_empty() {
        return Ok(());
    }
    if exit.cancelled {
        return Err(CANCELLED_MESSAGE.to_string());
    }
    if exit.errors.is_empty() {
        Err(format!("{tool} exited with code {}.", exit.code))
    } else {
        Err(format!(
            "{tool} exited with code {}, errors={}",
            exit.code,
            exit.errors.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_exit_succeeds() {
        let exit = ProcessExit::default();
        assert_eq!(map_exit(TOOL_NAME, &exit), Ok(()));
    }

    #[test]
    fn clean_exit_wins_over_late_cancel() {
        let exit = ProcessExit {
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(map_exit(TOOL_NAME, &exit), Ok(()));
    }

    #[test]
    fn non_zero_exit_embeds_code() {
        let exit = ProcessExit {
            code: 3,
            ..Default::default()
        };
        assert_eq!(
            map_exit(TOOL_NAME, &exit),
            Err("Blender exited with code 3.".to_string())
        );
    }

    #[test]
    fn stderr_output_fails_even_with_zero_exit() {
        let exit = ProcessExit {
            code: 0,
            errors: vec!["Warning: a".into(), "Error: b".into()],
            cancelled: false,
        };
        assert_eq!(
            map_exit(TOOL_NAME, &exit),
            Err("Blender exited with code 0, errors=Warning: a\nError: b".to_string())
        );
    }

    #[test]
    fn cancelled_failure_uses_distinguished_message() {
        let exit = ProcessExit {
            code: -1,
            errors: vec!["killed".into()],
            cancelled: true,
        };
        assert_eq!(
            map_exit(TOOL_NAME, &exit),
            Err(CANCELLED_MESSAGE.to_string())
        );
    }
}
