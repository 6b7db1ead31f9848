//! Thread-local error trace.
//!
//! Every fallible operation that fails appends a frame to this trace before
//! returning. The trace is a bounded ring: once it holds [`MAX_FRAMES`]
//! entries, further frames are silently discarded (the caller can still see
//! `frame_count()` grow past the cap to notice truncation happened). The
//! first nonzero code reported since the last [`clear`] call "wins" and is
//! what [`first_code`] returns, regardless of what happens afterward —
//! matching the propagate-and-annotate discipline callers are expected to
//! follow: forward the failure, add your own frame, don't swallow the
//! original code.

use std::cell::RefCell;

use super::error::ErrorCode;

/// Bound on the number of frames kept per thread.
pub const MAX_FRAMES: usize = 32;

/// One recorded failure site.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub file: &'static str,
    pub function: &'static str,
    pub line: u32,
    pub code: ErrorCode,
    pub message: String,
}

struct TraceState {
    frames: Vec<TraceFrame>,
    reported: usize,
    first_code: Option<ErrorCode>,
}

impl TraceState {
    fn new() -> Self {
        Self {
            frames: Vec::new(),
            reported: 0,
            first_code: None,
        }
    }
}

thread_local! {
    static TRACE: RefCell<TraceState> = RefCell::new(TraceState::new());
}

/// Append a frame to the current thread's trace.
pub fn report(file: &'static str, function: &'static str, line: u32, code: ErrorCode, message: impl Into<String>) {
    TRACE.with(|cell| {
        let mut state = cell.borrow_mut();
        if state.first_code.is_none() {
            state.first_code = Some(code);
        }
        state.reported += 1;
        if state.frames.len() < MAX_FRAMES {
            state.frames.push(TraceFrame {
                file,
                function,
                line,
                code,
                message: message.into(),
            });
        }
    });
}

/// The first nonzero code reported since the last [`clear`], if any.
pub fn first_code() -> Option<ErrorCode> {
    TRACE.with(|cell| cell.borrow().first_code)
}

/// Number of frames actually reported (may exceed [`MAX_FRAMES`] — the
/// excess was discarded, not kept).
pub fn frame_count() -> usize {
    TRACE.with(|cell| cell.borrow().reported)
}

/// Whether the trace overflowed its ring and discarded frames.
pub fn truncated() -> bool {
    TRACE.with(|cell| cell.borrow().reported > MAX_FRAMES)
}

/// A snapshot of the frames currently held (oldest first).
pub fn frames() -> Vec<TraceFrame> {
    TRACE.with(|cell| cell.borrow().frames.clone())
}

/// Reset the trace for the current thread.
pub fn clear() {
    TRACE.with(|cell| *cell.borrow_mut() = TraceState::new());
}

/// Capture the enclosing function's name, BusTub/`wednesday`-style
/// `__FUNCTION__` substitute. There is no standard library equivalent, so
/// this uses the usual `std::any::type_name` trick: name an inner item,
/// take its type name, and strip the trailing `::f`.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Record an [`Error`](super::error::Error) at the call site and return it,
/// for use as `return Err(traced!(Error::NoMemory))`.
#[macro_export]
macro_rules! traced {
    ($err:expr) => {{
        let err = $err;
        $crate::common::trace::report(
            file!(),
            $crate::function_name!(),
            line!(),
            $crate::common::error::Error::code(&err),
            ::std::string::ToString::to_string(&err),
        );
        err
    }};
    ($err:expr, $($fmt:tt)+) => {{
        let err = $err;
        $crate::common::trace::report(
            file!(),
            $crate::function_name!(),
            line!(),
            $crate::common::error::Error::code(&err),
            format!($($fmt)+),
        );
        err
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_code_wins() {
        clear();
        report("f.rs", "g", 1, ErrorCode::ENoMem, "first");
        report("f.rs", "g", 2, ErrorCode::EInval, "second");
        assert_eq!(first_code(), Some(ErrorCode::ENoMem));
        assert_eq!(frame_count(), 2);
        clear();
    }

    #[test]
    fn overflow_is_discarded_silently() {
        clear();
        for i in 0..(MAX_FRAMES + 5) {
            report("f.rs", "g", i as u32, ErrorCode::EInval, "x");
        }
        assert_eq!(frames().len(), MAX_FRAMES);
        assert_eq!(frame_count(), MAX_FRAMES + 5);
        assert!(truncated());
        clear();
    }

    #[test]
    fn clear_resets_everything() {
        report("f.rs", "g", 1, ErrorCode::EExist, "x");
        clear();
        assert_eq!(first_code(), None);
        assert_eq!(frame_count(), 0);
        assert!(frames().is_empty());
    }
}
