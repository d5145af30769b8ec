//! Command line handed to a plug-in.
//!
//! ```text
//! [interpreter] [interp_arg] <plug-in> -gimp <read_fd> <write_fd> <-query|-init|-run> <0|1|2>
//! ```

use std::ffi::OsString;
use std::path::Path;

use easel_config::StackTraceMode;

use crate::interpreter::ResolvedInterpreter;
use crate::protocol::CallMode;

/// Marker telling the executable it was started as a plug-in.
pub const PLUG_IN_FLAG: &str = "-gimp";

/// Builds the argv for `plug_in`. The descriptors are the child's ends.
pub(crate) fn build(
    plug_in: &Path,
    interpreter: Option<&ResolvedInterpreter>,
    read_fd: i32,
    write_fd: i32,
    mode: CallMode,
    stack_trace: StackTraceMode,
) -> Vec<OsString> {
    let mut argv: Vec<OsString> = Vec::with_capacity(9);
    if let Some(resolved) = interpreter {
        argv.push(resolved.program().into());
        if let Some(arg) = resolved.interp_arg() {
            argv.push(arg.into());
        }
    }
    argv.push(plug_in.as_os_str().to_owned());
    argv.push(PLUG_IN_FLAG.into());
    argv.push(read_fd.to_string().into());
    argv.push(write_fd.to_string().into());
    argv.push(mode.as_arg().into());
    argv.push(stack_trace.as_arg().into());
    argv
}
