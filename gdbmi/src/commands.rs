//! Wire-format command builders.
//!
//! Pure functions that turn typed arguments into MI command text. The
//! dispatcher prepends the token and does any console wrapping; nothing
//! here touches I/O or state.

/// Quote an argument for the debugger's CLI, escaping embedded quotes and
/// backslashes.
pub(crate) fn escape_argument(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for ch in arg.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/* Setup commands */

pub fn set_confirm(on: bool) -> String {
    format!("gdb-set confirm {}", on_off(on))
}

pub fn set_print_object(on: bool) -> String {
    format!("gdb-set print object {}", on_off(on))
}

pub fn set_breakpoint_pending(on: bool) -> String {
    format!("gdb-set breakpoint pending {}", on_off(on))
}

pub fn set_width(width: u32) -> String {
    format!("gdb-set width {}", width)
}

pub fn set_height(height: u32) -> String {
    format!("gdb-set height {}", height)
}

/// Limit on printed collection elements; 0 means unlimited.
pub fn set_print_elements(number_of_elements: u32) -> String {
    format!("gdb-set print elements {}", number_of_elements)
}

pub fn set_args(arguments: &[String]) -> String {
    let mut cmd = String::from("exec-arguments");
    for arg in arguments {
        cmd.push(' ');
        if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
            cmd.push_str(&escape_argument(arg));
        } else {
            cmd.push_str(arg);
        }
    }
    cmd
}

pub fn attach(process_id: u32) -> String {
    format!("target-attach {}", process_id)
}

/// Unbuffer the inferior's stdout so target output shows up as it is
/// produced rather than at exit.
pub fn change_std_stream_buffer() -> String {
    format!(
        "data-evaluate-expression {}",
        escape_argument("setbuf(stdout,0)")
    )
}

/* Breakpoint commands */

pub fn break_insert(
    file: &str,
    line: u32,
    is_disabled: bool,
    condition: Option<&str>,
    ignore_count: u32,
    is_pending: bool,
) -> String {
    let mut cmd = String::from("break-insert");
    if is_disabled {
        cmd.push_str(" -d");
    }
    if let Some(condition) = condition {
        cmd.push_str(&format!(" -c {}", escape_argument(condition)));
    }
    if ignore_count > 0 {
        cmd.push_str(&format!(" -i {}", ignore_count));
    }
    if is_pending {
        cmd.push_str(" -f");
    }
    cmd.push_str(&format!(" {}", escape_argument(&format!("{}:{}", file, line))));
    cmd
}

/// Insert at a raw location spec (function name, address). Used for the
/// internal catch breakpoint.
pub fn break_insert_location(location: &str) -> String {
    format!("break-insert -f {}", escape_argument(location))
}

pub fn break_delete(breakpoint_ids: &[String]) -> String {
    format!("break-delete {}", breakpoint_ids.join(" "))
}

pub fn break_enable(breakpoint_ids: &[String]) -> String {
    format!("break-enable {}", breakpoint_ids.join(" "))
}

pub fn break_disable(breakpoint_ids: &[String]) -> String {
    format!("break-disable {}", breakpoint_ids.join(" "))
}

pub fn break_after(breakpoint_id: &str, count: u32) -> String {
    format!("break-after {} {}", breakpoint_id, count)
}

pub fn break_condition(breakpoint_id: &str, condition: &str) -> String {
    format!(
        "break-condition {} {}",
        breakpoint_id,
        escape_argument(condition)
    )
}

/* Program context commands */

pub fn exec_run() -> String {
    "exec-run".to_string()
}

pub fn exec_continue() -> String {
    "exec-continue".to_string()
}

pub fn exec_next() -> String {
    "exec-next".to_string()
}

pub fn exec_step() -> String {
    "exec-step".to_string()
}

pub fn exec_finish() -> String {
    "exec-finish".to_string()
}

pub fn exec_interrupt() -> String {
    "exec-interrupt".to_string()
}

/* Thread commands */

pub fn thread_info() -> String {
    "thread-info".to_string()
}

pub fn thread_select(num: u32) -> String {
    format!("thread-select {}", num)
}

/* Stack manipulation commands */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintValues {
    No,
    All,
    Simple,
}

impl PrintValues {
    fn flag(self) -> &'static str {
        match self {
            PrintValues::No => "--no-values",
            PrintValues::All => "--all-values",
            PrintValues::Simple => "--simple-values",
        }
    }
}

pub fn stack_list_frames() -> String {
    "stack-list-frames".to_string()
}

pub fn stack_select_frame(num: u32) -> String {
    format!("stack-select-frame {}", num)
}

pub fn stack_list_variables(print_values: PrintValues) -> String {
    format!("stack-list-variables {}", print_values.flag())
}

/// Full backtrace of every thread. Post with the console flag; this is a
/// CLI command, not an MI one.
pub fn create_full_backtrace() -> String {
    "thread apply all bt full".to_string()
}

/* Data manipulation commands */

/// Index into the boxed-value layouts the generated runtime uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaType {
    Record = 0,
    List = 1,
    Option = 2,
    Tuple = 3,
    Array = 4,
}

pub fn data_evaluate_expression(expression: &str) -> String {
    format!("data-evaluate-expression {}", escape_argument(expression))
}

pub fn get_type_of_any(expression: &str) -> String {
    data_evaluate_expression(&format!("getTypeOfAny({})", expression))
}

pub fn any_string(expression: &str) -> String {
    data_evaluate_expression(&format!("anyString({})", expression))
}

pub fn get_meta_type_element(expression: &str, index: u32, meta_type: MetaType) -> String {
    data_evaluate_expression(&format!(
        "getMetaTypeElement({}, {}, {})",
        expression, index, meta_type as u32
    ))
}

pub fn array_length(expression: &str) -> String {
    data_evaluate_expression(&format!("arrayLength({})", expression))
}

pub fn list_length(expression: &str) -> String {
    data_evaluate_expression(&format!("listLength({})", expression))
}

pub fn is_option_none(expression: &str) -> String {
    data_evaluate_expression(&format!("isOptionNone({})", expression))
}

pub fn gdb_exit() -> String {
    "gdb-exit".to_string()
}
