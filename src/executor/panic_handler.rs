use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// What was recovered from a caught panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicInfo {
    pub message: String,
}

impl PanicInfo {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };

        Self { message }
    }
}

impl std::fmt::Display for PanicInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Run `f`, turning a panic into `Err(PanicInfo)`.
///
/// Worker closures are caller code we cannot audit for unwind safety; the
/// state they touch is owned by the invocation, so asserting it is sound
/// for our purposes.
pub fn isolate<F, R>(f: F) -> Result<R, PanicInfo>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(PanicInfo::from_payload)
}
