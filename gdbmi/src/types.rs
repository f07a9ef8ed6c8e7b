//! GDB/MI data model.
//!
//! Record and value types for the machine interface protocol, plus the
//! projections the debugger reports stops with: stack frames, threads and
//! breakpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One classified line of debugger output.
#[derive(Debug, Clone, PartialEq)]
pub enum MiRecord {
    Result(ResultRecord),
    Async(AsyncRecord),
    Stream(StreamRecord),
}

/// A `<token>^<class>[,<results>]` record answering a posted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub token: Option<u32>,
    pub class: ResultClass,
    pub results: Vec<MiResult>,
}

impl ResultRecord {
    /// The `msg` field of an `^error` record, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.results.find_const("msg")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

/// Whether an out-of-band record came in as `*class` or `=class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncKind {
    Exec,
    Notify,
}

/// An unsolicited `*`/`=` record reporting a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncRecord {
    pub token: Option<u32>,
    pub kind: AsyncKind,
    pub class: AsyncClass,
    pub results: Vec<MiResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncClass {
    // Exec async records
    Running,
    Stopped,

    // Notify async records
    ThreadGroupAdded,
    ThreadGroupRemoved,
    ThreadGroupStarted,
    ThreadGroupExited,
    ThreadCreated,
    ThreadExited,
    ThreadSelected,
    LibraryLoaded,
    LibraryUnloaded,
    TraceframeChanged,
    TsvCreated,
    TsvDeleted,
    TsvModified,
    BreakpointCreated,
    BreakpointModified,
    BreakpointDeleted,
    RecordStarted,
    RecordStopped,
    CmdParamChanged,
    MemoryChanged,
}

/// A `~`/`@`/`&` stream record carrying free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Console,
    Target,
    Log,
}

/// A `name=value` pair from a result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiResult {
    pub name: String,
    pub value: MiValue,
}

/// The recursive MI value grammar: constant, tuple or list.
///
/// Result lists are ordered; lookup by name returns the first match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MiValue {
    Const(String),
    Tuple(Vec<MiResult>),
    List(MiList),
}

/// List elements are homogeneous: all `name=value` pairs or all bare
/// values, never mixed. The decoder rejects mixed lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MiList {
    Results(Vec<MiResult>),
    Values(Vec<MiValue>),
}

impl MiValue {
    pub fn as_const(&self) -> Option<&str> {
        match self {
            MiValue::Const(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[MiResult]> {
        match self {
            MiValue::Tuple(results) => Some(results),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&MiList> {
        match self {
            MiValue::List(list) => Some(list),
            _ => None,
        }
    }
}

impl MiList {
    pub fn len(&self) -> usize {
        match self {
            MiList::Results(results) => results.len(),
            MiList::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First-match lookup over an ordered result list.
pub trait ResultsExt {
    fn find(&self, name: &str) -> Option<&MiValue>;
    fn find_const(&self, name: &str) -> Option<&str>;
    fn find_tuple(&self, name: &str) -> Option<&[MiResult]>;
    fn find_u32(&self, name: &str) -> Option<u32>;
}

impl ResultsExt for [MiResult] {
    fn find(&self, name: &str) -> Option<&MiValue> {
        self.iter().find(|r| r.name == name).map(|r| &r.value)
    }

    fn find_const(&self, name: &str) -> Option<&str> {
        self.find(name).and_then(MiValue::as_const)
    }

    fn find_tuple(&self, name: &str) -> Option<&[MiResult]> {
        self.find(name).and_then(MiValue::as_tuple)
    }

    fn find_u32(&self, name: &str) -> Option<u32> {
        self.find_const(name).and_then(|s| s.parse().ok())
    }
}

pub(crate) fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

impl fmt::Display for MiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiValue::Const(s) => write!(f, "\"{}\"", escape_c_string(s)),
            MiValue::Tuple(results) => {
                f.write_str("{")?;
                write_results(f, results)?;
                f.write_str("}")
            }
            MiValue::List(list) => {
                f.write_str("[")?;
                match list {
                    MiList::Results(results) => write_results(f, results)?,
                    MiList::Values(values) => {
                        for (i, value) in values.iter().enumerate() {
                            if i > 0 {
                                f.write_str(",")?;
                            }
                            write!(f, "{}", value)?;
                        }
                    }
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for MiResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

fn write_results(f: &mut fmt::Formatter<'_>, results: &[MiResult]) -> fmt::Result {
    for (i, result) in results.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", result)?;
    }
    Ok(())
}

/// Serialize a result list back to MI text, e.g. for auditing decoded
/// structures.
pub fn results_to_string(results: &[MiResult]) -> String {
    results
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Reason field of a `*stopped` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    BreakpointHit,
    WatchpointTrigger,
    ReadWatchpointTrigger,
    AccessWatchpointTrigger,
    FunctionFinished,
    LocationReached,
    WatchpointScope,
    EndSteppingRange,
    ExitedSignalled,
    Exited,
    ExitedNormally,
    SignalReceived,
    SolibEvent,
    Fork,
    Vfork,
    SyscallEntry,
    SyscallReturn,
    Exec,
    NoHistory,
    /// A reason this build does not know about; kept verbatim so the stop
    /// is still surfaced.
    Other(String),
}

impl StopReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "breakpoint-hit" => StopReason::BreakpointHit,
            "watchpoint-trigger" => StopReason::WatchpointTrigger,
            "read-watchpoint-trigger" => StopReason::ReadWatchpointTrigger,
            "access-watchpoint-trigger" => StopReason::AccessWatchpointTrigger,
            "function-finished" => StopReason::FunctionFinished,
            "location-reached" => StopReason::LocationReached,
            "watchpoint-scope" => StopReason::WatchpointScope,
            "end-stepping-range" => StopReason::EndSteppingRange,
            "exited-signalled" => StopReason::ExitedSignalled,
            "exited" => StopReason::Exited,
            "exited-normally" => StopReason::ExitedNormally,
            "signal-received" => StopReason::SignalReceived,
            "solib-event" => StopReason::SolibEvent,
            "fork" => StopReason::Fork,
            "vfork" => StopReason::Vfork,
            "syscall-entry" => StopReason::SyscallEntry,
            "syscall-return" => StopReason::SyscallReturn,
            "exec" => StopReason::Exec,
            "no-history" => StopReason::NoHistory,
            other => StopReason::Other(other.to_string()),
        }
    }

    /// True for the `exited*` family that ends the inferior.
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            StopReason::Exited | StopReason::ExitedNormally | StopReason::ExitedSignalled
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::BreakpointHit => "breakpoint-hit",
            StopReason::WatchpointTrigger => "watchpoint-trigger",
            StopReason::ReadWatchpointTrigger => "read-watchpoint-trigger",
            StopReason::AccessWatchpointTrigger => "access-watchpoint-trigger",
            StopReason::FunctionFinished => "function-finished",
            StopReason::LocationReached => "location-reached",
            StopReason::WatchpointScope => "watchpoint-scope",
            StopReason::EndSteppingRange => "end-stepping-range",
            StopReason::ExitedSignalled => "exited-signalled",
            StopReason::Exited => "exited",
            StopReason::ExitedNormally => "exited-normally",
            StopReason::SignalReceived => "signal-received",
            StopReason::SolibEvent => "solib-event",
            StopReason::Fork => "fork",
            StopReason::Vfork => "vfork",
            StopReason::SyscallEntry => "syscall-entry",
            StopReason::SyscallReturn => "syscall-return",
            StopReason::Exec => "exec",
            StopReason::NoHistory => "no-history",
            StopReason::Other(other) => other,
        };
        write!(f, "{}", s)
    }
}

/// A source breakpoint as the IDE manages it. The debugger-assigned id
/// stays `None` until the insert command is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub id: Option<String>,
    pub file: String,
    pub line: u32,
    pub enabled: bool,
    pub condition: Option<String>,
    pub ignore_count: u32,
    pub pending: bool,
}

impl Breakpoint {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Breakpoint {
            id: None,
            file: file.into(),
            line,
            enabled: true,
            condition: None,
            ignore_count: 0,
            pending: true,
        }
    }

    /// Fold the `bkpt={...}` tuple of a confirmed insert into this
    /// breakpoint: assign the id and clear the pending flag.
    pub fn apply_mi(&mut self, tuple: &[MiResult]) {
        if let Some(number) = tuple.find_const("number") {
            self.id = Some(number.to_string());
        }
        if let Some(line) = tuple.find_u32("line") {
            self.line = line;
        }
        if let Some(enabled) = tuple.find_const("enabled") {
            self.enabled = enabled == "y";
        }
        self.pending = tuple
            .find_const("addr")
            .map(|addr| addr == "<PENDING>")
            .unwrap_or(false);
    }
}

/// One stack frame as reported by `-stack-list-frames` or a stop event.
/// Stop-event frames carry no `level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub level: Option<u32>,
    pub addr: Option<String>,
    pub func: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn from_mi(tuple: &[MiResult]) -> Self {
        StackFrame {
            level: tuple.find_u32("level"),
            addr: tuple.find_const("addr").map(str::to_string),
            func: tuple.find_const("func").map(str::to_string),
            file: tuple.find_const("file").map(str::to_string),
            fullname: tuple.find_const("fullname").map(str::to_string),
            line: tuple.find_u32("line"),
        }
    }

    /// Frames from the `stack=[frame={...},...]` list of a
    /// `-stack-list-frames` response.
    pub fn list_from_mi(results: &[MiResult]) -> Vec<StackFrame> {
        let mut frames = Vec::new();
        if let Some(MiList::Results(items)) = results.find("stack").and_then(MiValue::as_list) {
            for item in items {
                if let Some(tuple) = item.value.as_tuple() {
                    frames.push(StackFrame::from_mi(tuple));
                }
            }
        }
        frames
    }

    /// Full path when the debugger supplied one, else the bare file name.
    pub fn source_path(&self) -> Option<&str> {
        self.fullname.as_deref().or(self.file.as_deref())
    }

    pub fn kind(&self) -> FrameKind {
        match self.source_path() {
            Some(path) => FrameKind::classify(path),
            None => FrameKind::Unknown,
        }
    }

    /// Function name cleaned up for display.
    pub fn display_function(&self) -> Option<String> {
        self.func.as_deref().map(demangle_function)
    }
}

/// Classification of a frame by its source file suffix: model source,
/// generated C, or anything else (runtime, libc, no source at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Modelica,
    C,
    Unknown,
}

impl FrameKind {
    pub fn classify(path: &str) -> FrameKind {
        match file_suffix(path) {
            Some("mo") => FrameKind::Modelica,
            Some("c") | Some("h") | Some("cpp") | Some("hpp") => FrameKind::C,
            _ => FrameKind::Unknown,
        }
    }
}

pub(crate) fn file_suffix(path: &str) -> Option<&str> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, suffix) = name.rsplit_once('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(suffix)
    }
}

/// Strip generated-code decoration from a function name: the `omc_`
/// prefix, and `_omcQuot_<hex>` mangling of quoted identifiers.
pub fn demangle_function(name: &str) -> String {
    if let Some(hex) = name.strip_prefix("_omcQuot_") {
        if let Some(decoded) = decode_hex_identifier(hex) {
            return format!("'{}'", decoded);
        }
    }
    if let Some(stripped) = name.strip_prefix("omc_") {
        return stripped.to_string();
    }
    name.to_string()
}

fn decode_hex_identifier(hex: &str) -> Option<String> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    let mut out = String::with_capacity(hex.len() / 2);
    let bytes = hex.as_bytes();
    for pair in bytes.chunks(2) {
        let pair = std::str::from_utf8(pair).ok()?;
        let byte = u8::from_str_radix(pair, 16).ok()?;
        out.push(byte as char);
    }
    Some(out)
}

/// One thread from a `-thread-info` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: Option<u32>,
    pub target_id: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub frame: Option<StackFrame>,
}

impl Thread {
    pub fn from_mi(tuple: &[MiResult]) -> Self {
        Thread {
            id: tuple.find_u32("id"),
            target_id: tuple.find_const("target-id").map(str::to_string),
            name: tuple.find_const("name").map(str::to_string),
            state: tuple.find_const("state").map(str::to_string),
            frame: tuple.find_tuple("frame").map(StackFrame::from_mi),
        }
    }

    /// Threads and the current thread id from a `-thread-info` response.
    pub fn list_from_mi(results: &[MiResult]) -> (Vec<Thread>, Option<u32>) {
        let mut threads = Vec::new();
        if let Some(list) = results.find("threads").and_then(MiValue::as_list) {
            match list {
                MiList::Values(values) => {
                    for value in values {
                        if let Some(tuple) = value.as_tuple() {
                            threads.push(Thread::from_mi(tuple));
                        }
                    }
                }
                MiList::Results(items) => {
                    for item in items {
                        if let Some(tuple) = item.value.as_tuple() {
                            threads.push(Thread::from_mi(tuple));
                        }
                    }
                }
            }
        }
        let current = results.find_u32("current-thread-id");
        (threads, current)
    }
}
