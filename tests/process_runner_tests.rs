//! Tests for the process runner
//!
//! These drive real `/bin/sh` children and verify:
//! - Complete stdout/stderr capture, including unterminated final chunks
//! - Non-zero exits returned to the caller, not raised
//! - Line-parser feeding (stdout only, complete lines only, in order)

use lodestar::parsers::{LineParser, SilentParser};
use lodestar::process_runner::{OUTPUT_PREFIX, run_with_line_parse};

/// Records every line it is fed.
#[derive(Default)]
struct CollectParser {
    lines: Vec<String>,
}

impl LineParser for CollectParser {
    fn on_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

// =============================================================================
// Output Capture
// =============================================================================

#[test]
fn test_captures_stdout_without_trailing_newline() {
    let mut parser = SilentParser;
    let output = run_with_line_parse(&sh("printf 'no trailing newline'"), OUTPUT_PREFIX, &mut parser)
        .expect("tool runs");

    assert!(output.success);
    assert_eq!(output.stdout, "no trailing newline");
}

#[test]
fn test_captures_streams_separately() {
    let mut parser = SilentParser;
    let output = run_with_line_parse(&sh("echo to-out; echo to-err >&2"), OUTPUT_PREFIX, &mut parser)
        .expect("tool runs");

    assert_eq!(output.stdout, "to-out\n");
    assert_eq!(output.stderr, "to-err\n");
}

#[test]
fn test_captures_large_output_completely() {
    let mut parser = CollectParser::default();
    let output = run_with_line_parse(&sh("seq 1 2000"), OUTPUT_PREFIX, &mut parser)
        .expect("tool runs");

    assert_eq!(output.stdout.lines().count(), 2000);
    assert_eq!(parser.lines.len(), 2000);
    assert_eq!(parser.lines[0], "1");
    assert_eq!(parser.lines[1999], "2000");
}

#[test]
fn test_captures_output_split_across_chunks() {
    let mut parser = CollectParser::default();
    let output = run_with_line_parse(
        &sh("printf '[1/2] first\\n'; sleep 1; printf '[2/2] second\\n'"),
        OUTPUT_PREFIX,
        &mut parser,
    )
    .expect("tool runs");

    assert_eq!(parser.lines, vec!["[1/2] first", "[2/2] second"]);
    assert_eq!(output.stdout, "[1/2] first\n[2/2] second\n");
}

// =============================================================================
// Exit Semantics
// =============================================================================

#[test]
fn test_nonzero_exit_is_returned_not_raised() {
    let mut parser = SilentParser;
    let output = run_with_line_parse(&sh("exit 42"), OUTPUT_PREFIX, &mut parser)
        .expect("a failing tool is not an error");

    assert!(!output.success);
    assert_eq!(output.exit_code, Some(42));
}

#[test]
fn test_ensure_success_reports_stderr() {
    let mut parser = SilentParser;
    let output = run_with_line_parse(&sh("echo broken >&2; exit 1"), OUTPUT_PREFIX, &mut parser)
        .expect("tool runs");

    let err = output.ensure_success("removal batch").expect_err("should fail");
    let message = err.to_string();
    assert!(message.contains("removal batch"));
    assert!(message.contains("broken"));
}

#[test]
fn test_missing_tool_is_a_spawn_error() {
    let mut parser = SilentParser;
    let cmd = vec!["lodestar-no-such-tool-zz".to_string()];
    assert!(run_with_line_parse(&cmd, OUTPUT_PREFIX, &mut parser).is_err());
}

#[test]
fn test_empty_command_line_is_rejected() {
    let mut parser = SilentParser;
    assert!(run_with_line_parse(&[], OUTPUT_PREFIX, &mut parser).is_err());
}

// =============================================================================
// Parser Feeding
// =============================================================================

#[test]
fn test_parser_receives_complete_lines_in_order() {
    let mut parser = CollectParser::default();
    run_with_line_parse(&sh("printf 'a\\nb\\nc\\n'"), OUTPUT_PREFIX, &mut parser)
        .expect("tool runs");

    assert_eq!(parser.lines, vec!["a", "b", "c"]);
}

#[test]
fn test_parser_does_not_see_the_unterminated_tail() {
    let mut parser = CollectParser::default();
    let output = run_with_line_parse(&sh("printf 'done\\npartial'"), OUTPUT_PREFIX, &mut parser)
        .expect("tool runs");

    // The tail is captured but never offered as a line
    assert_eq!(parser.lines, vec!["done"]);
    assert_eq!(output.stdout, "done\npartial");
}

#[test]
fn test_parser_is_not_fed_stderr() {
    let mut parser = CollectParser::default();
    run_with_line_parse(&sh("echo '[1/2] only-on-stderr' >&2"), OUTPUT_PREFIX, &mut parser)
        .expect("tool runs");

    assert!(parser.lines.is_empty());
}
