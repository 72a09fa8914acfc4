//! Line protocol spoken by the baking tool on stdout.
//!
//! ```text
//! [PROGRESS]:<stage>[:<value>[:<details>]]
//! [INFO]:<message>
//! ```
//!
//! Every other line is tool chatter and carries no meaning.

use lightbake_core::progress::ProgressEvent;

pub const PROGRESS_PREFIX: &str = "[PROGRESS]:";
pub const INFO_PREFIX: &str = "[INFO]:";

/// One classified stdout line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolLine {
    Progress(ProgressEvent),
    Info(String),
    Other,
}

/// Classify one line of tool output.
///
/// Progress values that are missing, unparseable or not finite become `0`.
/// Only the first three `:`-separated fields of a progress line are used.
pub fn parse_line(line: &str) -> ProtocolLine {
    let line = line.trim_end_matches(['\n', '\r']);

    if let Some(content) = line.strip_prefix(PROGRESS_PREFIX) {
        let mut fields = content.split(':');
        let stage = fields.next().unwrap_or_default();
        if stage.is_empty() {
            return ProtocolLine::Other;
        }
        let value = fields.next().map(parse_value).unwrap_or(0.0);
        let details = fields.next().filter(|d| !d.is_empty());

        let mut event = ProgressEvent::new(stage, value);
        if let Some(details) = details {
            event = event.with_details(details);
        }
        return ProtocolLine::Progress(event);
    }

    if let Some(message) = line.strip_prefix(INFO_PREFIX) {
        return ProtocolLine::Info(message.to_string());
    }

    ProtocolLine::Other
}

fn parse_value(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn stage_only_progress_has_zero_value() {
        let line = parse_line("[PROGRESS]:Importing model\n");
        assert_eq!(
            line,
            ProtocolLine::Progress(ProgressEvent::new("Importing model", 0.0))
        );
    }

    #[test]
    fn progress_with_value_and_details() {
        let line = parse_line("[PROGRESS]:Baking:0.25:Rock_01\r\n");
        assert_eq!(
            line,
            ProtocolLine::Progress(ProgressEvent::new("Baking", 0.25).with_details("Rock_01"))
        );
    }

    #[test]
    fn malformed_value_defaults_to_zero() {
        assert_matches!(
            parse_line("[PROGRESS]:Baking:half"),
            ProtocolLine::Progress(ProgressEvent { value, .. }) if value == 0.0
        );
        assert_matches!(
            parse_line("[PROGRESS]:Baking:NaN"),
            ProtocolLine::Progress(ProgressEvent { value, .. }) if value == 0.0
        );
    }

    #[test]
    fn text_after_third_field_is_dropped() {
        let ProtocolLine::Progress(event) = parse_line("[PROGRESS]:Baking:0.5:Scene:Rock") else {
            panic!("expected progress line");
        };
        assert_eq!(event.details.as_deref(), Some("Scene"));
    }

    #[test]
    fn empty_details_are_absent() {
        let ProtocolLine::Progress(event) = parse_line("[PROGRESS]:Denoising:0.1:") else {
            panic!("expected progress line");
        };
        assert!(event.details.is_none());
    }

    #[test]
    fn info_and_other_lines() {
        assert_eq!(
            parse_line("[INFO]:Found 12 objects"),
            ProtocolLine::Info("Found 12 objects".into())
        );
        assert_eq!(parse_line("Blender 4.1.0 (hash 1234)"), ProtocolLine::Other);
        assert_eq!(parse_line("[PROGRESS]:"), ProtocolLine::Other);
        assert_eq!(parse_line(""), ProtocolLine::Other);
    }
}
