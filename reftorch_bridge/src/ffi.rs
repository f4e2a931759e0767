//! C ABI for engines living in another process image. Every entry point runs
//! inside `ffi_guard` and leaves a readable message in the thread-local last
//! error when it fails.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use libc::{c_char, c_int};

use crate::catalogue;
use crate::config::BridgeConfig;
use crate::dispatch::panic_message;
use crate::logging;
use crate::node::Node;
use crate::session::Session;
use crate::view::ViewField;
use crate::writer::Signal;

pub const TAG_NUMBER: u8 = 0;
pub const TAG_CHAR: u8 = 1;
pub const TAG_FUNC: u8 = 2;
pub const TAG_IDENT: u8 = 3;
pub const TAG_OPEN: u8 = 4;
pub const TAG_CLOSE: u8 = 5;

pub const PROCEED: c_int = 0;
pub const SEARCH_ALTERNATIVE: c_int = 1;

/// One view-field node. `value` is the number, the code point, or the symbol
/// id; brackets ignore it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfiNode {
    pub tag: u8,
    pub value: i64,
}

/// Node buffer owned by this library; release it with `reftorch_nodes_free`.
#[repr(C)]
#[derive(Debug)]
pub struct FfiNodes {
    pub ptr: *mut FfiNode,
    pub len: usize,
}

impl FfiNode {
    pub fn from_node(node: Node) -> Self {
        let (tag, value) = match node {
            Node::Number(n) => (TAG_NUMBER, n),
            Node::Char(c) => (TAG_CHAR, c as i64),
            Node::Func(id) => (TAG_FUNC, id as i64),
            Node::Ident(id) => (TAG_IDENT, id as i64),
            Node::Open => (TAG_OPEN, 0),
            Node::Close => (TAG_CLOSE, 0),
        };
        FfiNode { tag, value }
    }

    pub fn to_node(self) -> Result<Node, String> {
        let symbol = |v: i64| u32::try_from(v).map_err(|_| format!("symbol id {} out of range", v));
        match self.tag {
            TAG_NUMBER => Ok(Node::Number(self.value)),
            TAG_CHAR => u32::try_from(self.value)
                .ok()
                .and_then(char::from_u32)
                .map(Node::Char)
                .ok_or_else(|| format!("{} is not a character", self.value)),
            TAG_FUNC => symbol(self.value).map(Node::Func),
            TAG_IDENT => symbol(self.value).map(Node::Ident),
            TAG_OPEN => Ok(Node::Open),
            TAG_CLOSE => Ok(Node::Close),
            other => Err(format!("unknown node tag {}", other)),
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_error(message: impl Into<String>) {
    let msg = message.into().replace('\0', " ");
    let cstr = CString::new(msg).unwrap_or_default();
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = Some(cstr);
    });
}

fn clear_error() {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

fn ffi_guard<T, F>(default: T, f: F) -> T
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(payload) => {
            set_error(format!("panic: {}", panic_message(payload.as_ref())));
            default
        }
    }
}

fn cstr_to_string(ptr: *const c_char) -> Result<String, String> {
    if ptr.is_null() {
        return Err("null string pointer".to_string());
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_owned)
        .map_err(|_| "string is not valid UTF-8".to_string())
}

fn into_ffi_nodes(nodes: &[Node]) -> FfiNodes {
    let boxed: Box<[FfiNode]> = nodes.iter().map(|&n| FfiNode::from_node(n)).collect();
    let len = boxed.len();
    let ptr = Box::into_raw(boxed) as *mut FfiNode;
    FfiNodes { ptr, len }
}

/// Creates a session from the TOML file at `config_path`, or from
/// `REFTORCH_CONFIG`/defaults when `config_path` is null. Returns null on
/// failure.
///
/// # Safety
/// `config_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn reftorch_session_new(config_path: *const c_char) -> *mut Session {
    ffi_guard(ptr::null_mut(), || {
        clear_error();
        let cfg = if config_path.is_null() {
            BridgeConfig::from_env()
        } else {
            match cstr_to_string(config_path) {
                Ok(path) => BridgeConfig::load(path),
                Err(err) => {
                    set_error(err);
                    return ptr::null_mut();
                }
            }
        };
        match cfg.and_then(|cfg| Session::from_config(&cfg)) {
            Ok(session) => Box::into_raw(Box::new(session)),
            Err(err) => {
                set_error(err.to_string());
                ptr::null_mut()
            }
        }
    })
}

/// # Safety
/// `session` must come from `reftorch_session_new` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn reftorch_session_free(session: *mut Session) {
    ffi_guard((), || {
        if session.is_null() {
            return;
        }
        drop(Box::from_raw(session));
    })
}

/// Runs operation `name` over the call expression `nodes[..len]`. On
/// proceed, `out` receives the rewritten expression. Returns 0 for proceed
/// and 1 for search-alternative.
///
/// # Safety
/// `session` must be live, `name` a valid NUL-terminated string, `nodes`
/// valid for `len` reads (or null with `len == 0`), and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn reftorch_invoke(
    session: *mut Session,
    name: *const c_char,
    nodes: *const FfiNode,
    len: usize,
    out: *mut FfiNodes,
) -> c_int {
    ffi_guard(SEARCH_ALTERNATIVE, || {
        clear_error();
        if session.is_null() || out.is_null() || (nodes.is_null() && len > 0) {
            set_error("null pointer passed to reftorch_invoke");
            return SEARCH_ALTERNATIVE;
        }
        let name = match cstr_to_string(name) {
            Ok(name) => name,
            Err(err) => {
                set_error(err);
                return SEARCH_ALTERNATIVE;
            }
        };
        let raw = if len == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(nodes, len)
        };
        let decoded = match raw.iter().map(|n| n.to_node()).collect::<Result<Vec<_>, _>>() {
            Ok(decoded) => decoded,
            Err(err) => {
                set_error(err);
                return SEARCH_ALTERNATIVE;
            }
        };

        let session = &mut *session;
        let mut field = ViewField::new(decoded);
        let span = field.full_span();
        let outcome = session.invoke(&name, &mut field, span);
        match outcome.signal {
            Signal::Proceed => {
                *out = into_ffi_nodes(field.nodes());
                PROCEED
            }
            Signal::SearchAlternative => {
                let msg = outcome
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| format!("{} failed", name));
                set_error(msg);
                *out = FfiNodes {
                    ptr: ptr::null_mut(),
                    len: 0,
                };
                SEARCH_ALTERNATIVE
            }
        }
    })
}

/// # Safety
/// `nodes` must come from `reftorch_invoke` and be freed once.
#[no_mangle]
pub unsafe extern "C" fn reftorch_nodes_free(nodes: FfiNodes) {
    ffi_guard((), || {
        if nodes.ptr.is_null() {
            return;
        }
        let slice = ptr::slice_from_raw_parts_mut(nodes.ptr, nodes.len);
        drop(Box::from_raw(slice));
    })
}

/// The calling thread's last error, or null. Valid until the next call on
/// this thread.
#[no_mangle]
pub extern "C" fn reftorch_last_error() -> *const c_char {
    ffi_guard(ptr::null(), || {
        LAST_ERROR.with(|cell| match &*cell.borrow() {
            Some(msg) => msg.as_ptr(),
            None => ptr::null(),
        })
    })
}

/// The operation catalogue as JSON. Free with `reftorch_string_free`.
#[no_mangle]
pub extern "C" fn reftorch_catalogue_json() -> *mut c_char {
    ffi_guard(ptr::null_mut(), || {
        clear_error();
        let json = match catalogue::catalogue_json() {
            Ok(json) => json,
            Err(err) => {
                set_error(err.to_string());
                return ptr::null_mut();
            }
        };
        match CString::new(json) {
            Ok(c) => c.into_raw(),
            Err(_) => {
                set_error("catalogue JSON contained a null byte");
                ptr::null_mut()
            }
        }
    })
}

/// # Safety
/// `ptr` must come from a `reftorch_*` function returning an owned string.
#[no_mangle]
pub unsafe extern "C" fn reftorch_string_free(ptr: *mut c_char) {
    ffi_guard((), || {
        if ptr.is_null() {
            return;
        }
        drop(CString::from_raw(ptr));
    })
}

/// Installs the stderr subscriber. A null `filter` uses the `log_filter` of
/// the config named by `REFTORCH_CONFIG`.
/// Returns 0 when installed, 1 when a subscriber already existed.
///
/// # Safety
/// `filter` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn reftorch_init_logging(filter: *const c_char) -> c_int {
    ffi_guard(1, || {
        clear_error();
        let filter = if filter.is_null() {
            match BridgeConfig::from_env() {
                Ok(cfg) => cfg.log_filter,
                Err(err) => {
                    set_error(err.to_string());
                    return 1;
                }
            }
        } else {
            match cstr_to_string(filter) {
                Ok(f) => f,
                Err(err) => {
                    set_error(err);
                    return 1;
                }
            }
        };
        if logging::init_logging(&filter) {
            0
        } else {
            1
        }
    })
}
