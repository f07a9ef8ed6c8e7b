//! GDB/MI output parser.
//!
//! Classifies one raw line of debugger output into a record and decodes
//! the embedded value grammar. Malformed lines come back as errors so the
//! caller can surface them as raw diagnostics; they never abort the
//! session.

use crate::types::*;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unrecognized output line: {0}")]
    Unrecognized(String),
    #[error("unknown async class `{0}`")]
    UnknownAsyncClass(String),
    #[error("expected `{0}`")]
    Expected(char),
    #[error("expected an identifier")]
    ExpectedIdentifier,
    #[error("unterminated string constant")]
    UnterminatedString,
    #[error("list mixes named and bare values")]
    MixedList,
}

fn result_record_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)?\^(done|running|connected|error|exit)(?:,(.*))?$")
            .expect("result record pattern")
    })
}

fn async_record_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)?([*=])([a-zA-Z][a-zA-Z0-9-]*)(?:,(.*))?$")
            .expect("async record pattern")
    })
}

/// Parse one line of debugger output. `Ok(None)` means the line carries
/// nothing to act on (blank, or the `(gdb)` prompt marker).
pub fn parse_line(line: &str) -> Result<Option<MiRecord>, ParseError> {
    let line = line.trim();

    if line.is_empty() || line == "(gdb)" {
        return Ok(None);
    }

    if let Some(stream) = parse_stream_record(line) {
        return Ok(Some(MiRecord::Stream(stream)));
    }

    if let Some(caps) = async_record_re().captures(line) {
        let token = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let kind = match caps.get(2).map(|m| m.as_str()) {
            Some("*") => AsyncKind::Exec,
            _ => AsyncKind::Notify,
        };
        let class = parse_async_class(caps.get(3).map(|m| m.as_str()).unwrap_or_default())?;
        let results = match caps.get(4) {
            Some(m) => parse_results(m.as_str())?,
            None => Vec::new(),
        };
        return Ok(Some(MiRecord::Async(AsyncRecord {
            token,
            kind,
            class,
            results,
        })));
    }

    if let Some(caps) = result_record_re().captures(line) {
        let token = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let class = match caps.get(2).map(|m| m.as_str()) {
            Some("done") => ResultClass::Done,
            Some("running") => ResultClass::Running,
            Some("connected") => ResultClass::Connected,
            Some("error") => ResultClass::Error,
            _ => ResultClass::Exit,
        };
        let results = match caps.get(3) {
            Some(m) => parse_results(m.as_str())?,
            None => Vec::new(),
        };
        return Ok(Some(MiRecord::Result(ResultRecord {
            token,
            class,
            results,
        })));
    }

    Err(ParseError::Unrecognized(line.to_string()))
}

fn parse_stream_record(line: &str) -> Option<StreamRecord> {
    let kind = match line.chars().next()? {
        '~' => StreamKind::Console,
        '@' => StreamKind::Target,
        '&' => StreamKind::Log,
        _ => return None,
    };
    let payload = &line[1..];
    let content = if payload.starts_with('"') {
        parse_string(payload)
            .map(|(s, _)| s)
            .unwrap_or_else(|_| payload.to_string())
    } else {
        payload.to_string()
    };
    Some(StreamRecord { kind, content })
}

fn parse_async_class(s: &str) -> Result<AsyncClass, ParseError> {
    let class = match s {
        "running" => AsyncClass::Running,
        "stopped" => AsyncClass::Stopped,
        "thread-group-added" => AsyncClass::ThreadGroupAdded,
        "thread-group-removed" => AsyncClass::ThreadGroupRemoved,
        "thread-group-started" => AsyncClass::ThreadGroupStarted,
        "thread-group-exited" => AsyncClass::ThreadGroupExited,
        "thread-created" => AsyncClass::ThreadCreated,
        "thread-exited" => AsyncClass::ThreadExited,
        "thread-selected" => AsyncClass::ThreadSelected,
        "library-loaded" => AsyncClass::LibraryLoaded,
        "library-unloaded" => AsyncClass::LibraryUnloaded,
        "traceframe-changed" => AsyncClass::TraceframeChanged,
        "tsv-created" => AsyncClass::TsvCreated,
        "tsv-deleted" => AsyncClass::TsvDeleted,
        "tsv-modified" => AsyncClass::TsvModified,
        "breakpoint-created" => AsyncClass::BreakpointCreated,
        "breakpoint-modified" => AsyncClass::BreakpointModified,
        "breakpoint-deleted" => AsyncClass::BreakpointDeleted,
        "record-started" => AsyncClass::RecordStarted,
        "record-stopped" => AsyncClass::RecordStopped,
        "cmd-param-changed" => AsyncClass::CmdParamChanged,
        "memory-changed" => AsyncClass::MemoryChanged,
        other => return Err(ParseError::UnknownAsyncClass(other.to_string())),
    };
    Ok(class)
}

/// Decode the comma-separated `name=value` text after a record header.
pub fn parse_results(input: &str) -> Result<Vec<MiResult>, ParseError> {
    let mut results = Vec::new();
    let mut rest = input.trim_start();
    while !rest.is_empty() {
        let (result, remaining) = parse_result_pair(rest)?;
        results.push(result);
        rest = remaining.strip_prefix(',').unwrap_or(remaining).trim_start();
    }
    Ok(results)
}

fn parse_result_pair(input: &str) -> Result<(MiResult, &str), ParseError> {
    let (name, rest) = parse_identifier(input)?;
    let rest = rest.strip_prefix('=').ok_or(ParseError::Expected('='))?;
    let (value, rest) = parse_value(rest)?;
    Ok((MiResult { name, value }, rest))
}

fn parse_identifier(input: &str) -> Result<(String, &str), ParseError> {
    let end = input
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(input.len());
    if end == 0 {
        return Err(ParseError::ExpectedIdentifier);
    }
    Ok((input[..end].to_string(), &input[end..]))
}

fn parse_value(input: &str) -> Result<(MiValue, &str), ParseError> {
    match input.chars().next() {
        Some('"') => {
            let (s, rest) = parse_string(input)?;
            Ok((MiValue::Const(s), rest))
        }
        Some('{') => {
            let (tuple, rest) = parse_tuple(input)?;
            Ok((MiValue::Tuple(tuple), rest))
        }
        Some('[') => {
            let (list, rest) = parse_list(input)?;
            Ok((MiValue::List(list), rest))
        }
        _ => {
            // Some debuggers emit bare constants; take everything up to
            // the next structural character.
            let end = input
                .find([',', ']', '}', ' '])
                .unwrap_or(input.len());
            if end == 0 {
                return Err(ParseError::ExpectedIdentifier);
            }
            Ok((MiValue::Const(input[..end].to_string()), &input[end..]))
        }
    }
}

fn parse_string(input: &str) -> Result<(String, &str), ParseError> {
    debug_assert!(input.starts_with('"'));
    let mut out = String::new();
    let mut chars = input[1..].char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(ParseError::UnterminatedString),
            },
            '"' => return Ok((out, &input[1 + i + 1..])),
            other => out.push(other),
        }
    }
    Err(ParseError::UnterminatedString)
}

fn parse_tuple(input: &str) -> Result<(Vec<MiResult>, &str), ParseError> {
    debug_assert!(input.starts_with('{'));
    let mut rest = &input[1..];
    let mut results = Vec::new();
    loop {
        if let Some(remaining) = rest.strip_prefix('}') {
            return Ok((results, remaining));
        }
        if rest.is_empty() {
            return Err(ParseError::Expected('}'));
        }
        let (result, remaining) = parse_result_pair(rest)?;
        results.push(result);
        rest = remaining.strip_prefix(',').unwrap_or(remaining);
    }
}

fn parse_list(input: &str) -> Result<(MiList, &str), ParseError> {
    debug_assert!(input.starts_with('['));
    let mut rest = &input[1..];
    if let Some(remaining) = rest.strip_prefix(']') {
        return Ok((MiList::Values(Vec::new()), remaining));
    }
    let named = looks_named(rest);
    let mut results = Vec::new();
    let mut values = Vec::new();
    loop {
        if let Some(remaining) = rest.strip_prefix(']') {
            let list = if named {
                MiList::Results(results)
            } else {
                MiList::Values(values)
            };
            return Ok((list, remaining));
        }
        if rest.is_empty() {
            return Err(ParseError::Expected(']'));
        }
        if looks_named(rest) != named {
            return Err(ParseError::MixedList);
        }
        if named {
            let (result, remaining) = parse_result_pair(rest)?;
            results.push(result);
            rest = remaining;
        } else {
            let (value, remaining) = parse_value(rest)?;
            values.push(value);
            rest = remaining;
        }
        rest = rest.strip_prefix(',').unwrap_or(rest);
    }
}

fn looks_named(input: &str) -> bool {
    let end = input
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(input.len());
    end > 0 && input[end..].starts_with('=')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> MiRecord {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn parses_done_without_results() {
        match parse("^done") {
            MiRecord::Result(record) => {
                assert_eq!(record.class, ResultClass::Done);
                assert_eq!(record.token, None);
                assert!(record.results.is_empty());
            }
            other => panic!("expected result record, got {:?}", other),
        }
    }

    #[test]
    fn parses_result_with_token() {
        match parse(r#"123^done,bkpt={number="1",type="breakpoint"}"#) {
            MiRecord::Result(record) => {
                assert_eq!(record.token, Some(123));
                let bkpt = record.results.find_tuple("bkpt").unwrap();
                assert_eq!(bkpt.find_const("number"), Some("1"));
                assert_eq!(bkpt.find_const("type"), Some("breakpoint"));
            }
            other => panic!("expected result record, got {:?}", other),
        }
    }

    #[test]
    fn parses_error_record_message() {
        match parse(r#"^error,msg="No symbol table is loaded.  Use the \"file\" command.""#) {
            MiRecord::Result(record) => {
                assert_eq!(record.class, ResultClass::Error);
                assert_eq!(
                    record.error_message(),
                    Some("No symbol table is loaded.  Use the \"file\" command.")
                );
            }
            other => panic!("expected result record, got {:?}", other),
        }
    }

    #[test]
    fn parses_exec_async_record() {
        match parse(r#"*stopped,reason="breakpoint-hit",thread-id="1""#) {
            MiRecord::Async(record) => {
                assert_eq!(record.kind, AsyncKind::Exec);
                assert_eq!(record.class, AsyncClass::Stopped);
                assert_eq!(record.results.find_const("reason"), Some("breakpoint-hit"));
            }
            other => panic!("expected async record, got {:?}", other),
        }
    }

    #[test]
    fn parses_async_record_with_token() {
        match parse(r#"7*running,thread-id="all""#) {
            MiRecord::Async(record) => {
                assert_eq!(record.token, Some(7));
                assert_eq!(record.class, AsyncClass::Running);
            }
            other => panic!("expected async record, got {:?}", other),
        }
    }

    #[test]
    fn parses_notify_records() {
        for line in [
            r#"=thread-group-added,id="i1""#,
            r#"=thread-group-started,id="i1",pid="28655""#,
            r#"=thread-created,id="1",group-id="i1""#,
            r#"=breakpoint-modified,bkpt={number="2"}"#,
        ] {
            match parse(line) {
                MiRecord::Async(record) => assert_eq!(record.kind, AsyncKind::Notify),
                other => panic!("expected async record for {}, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn parses_stream_records() {
        match parse("~\"Hello, World!\\n\"") {
            MiRecord::Stream(stream) => {
                assert_eq!(stream.kind, StreamKind::Console);
                assert_eq!(stream.content, "Hello, World!\n");
            }
            other => panic!("expected stream record, got {:?}", other),
        }
        match parse("@\"target output\"") {
            MiRecord::Stream(stream) => assert_eq!(stream.kind, StreamKind::Target),
            other => panic!("expected stream record, got {:?}", other),
        }
        match parse("&\"log text\"") {
            MiRecord::Stream(stream) => assert_eq!(stream.kind, StreamKind::Log),
            other => panic!("expected stream record, got {:?}", other),
        }
    }

    #[test]
    fn prompt_and_blank_lines_are_skipped() {
        assert_eq!(parse_line("(gdb)").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn garbage_is_rejected_not_panicked() {
        assert!(matches!(
            parse_line("something went wrong"),
            Err(ParseError::Unrecognized(_))
        ));
        assert!(matches!(
            parse_line("*blorp,reason=\"x\""),
            Err(ParseError::UnknownAsyncClass(_))
        ));
    }

    #[test]
    fn decodes_frame_tuple_with_lookup() {
        let results = parse_results(r#"frame={level="0",addr="0x1",func="foo"}"#).unwrap();
        let frame = results.find_tuple("frame").unwrap();
        assert_eq!(frame.find_const("func"), Some("foo"));
        assert_eq!(frame.find_const("level"), Some("0"));
        assert_eq!(frame.find_const("addr"), Some("0x1"));
    }

    #[test]
    fn decodes_named_lists() {
        let results = parse_results(
            r#"stack=[frame={level="0",func="f"},frame={level="1",func="g"}]"#,
        )
        .unwrap();
        match results.find("stack").unwrap() {
            MiValue::List(MiList::Results(items)) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].name, "frame");
                assert_eq!(items[1].value.as_tuple().unwrap().find_const("func"), Some("g"));
            }
            other => panic!("expected named list, got {:?}", other),
        }
    }

    #[test]
    fn decodes_bare_value_lists() {
        let results = parse_results(r#"thread-groups=["i1","i2"]"#).unwrap();
        match results.find("thread-groups").unwrap() {
            MiValue::List(MiList::Values(values)) => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[0].as_const(), Some("i1"));
            }
            other => panic!("expected value list, got {:?}", other),
        }
    }

    #[test]
    fn empty_list_is_allowed() {
        let results = parse_results("args=[]").unwrap();
        assert!(results.find("args").unwrap().as_list().unwrap().is_empty());
    }

    #[test]
    fn mixed_lists_are_rejected() {
        assert_eq!(
            parse_results(r#"xs=["bare",name="value"]"#),
            Err(ParseError::MixedList)
        );
    }

    #[test]
    fn supports_deep_nesting() {
        let results = parse_results(
            r#"a={b=[{c={d="1"}},{c={d="2"}}],e="x"}"#,
        )
        .unwrap();
        let a = results.find_tuple("a").unwrap();
        match a.find("b").unwrap() {
            MiValue::List(MiList::Values(values)) => {
                let c = values[1].as_tuple().unwrap().find_tuple("c").unwrap();
                assert_eq!(c.find_const("d"), Some("2"));
            }
            other => panic!("expected list, got {:?}", other),
        }
        assert_eq!(a.find_const("e"), Some("x"));
    }

    #[test]
    fn structural_round_trip() {
        let input = r#"bkpt={number="1",disp="keep",enabled="y",addr="0x08048564",func="main",file="myprog.c",thread-groups=["i1"],times="0"}"#;
        let decoded = parse_results(input).unwrap();
        let serialized = results_to_string(&decoded);
        let reparsed = parse_results(&serialized).unwrap();
        assert_eq!(reparsed, decoded);
    }

    #[test]
    fn round_trip_preserves_escapes() {
        let decoded = parse_results(r#"msg="a \"b\"\nc\\d""#).unwrap();
        assert_eq!(decoded.find_const("msg"), Some("a \"b\"\nc\\d"));
        let reparsed = parse_results(&results_to_string(&decoded)).unwrap();
        assert_eq!(reparsed, decoded);
    }
}
