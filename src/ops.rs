//! Operator implementations behind the `ObservableExt` surface.

pub mod catch;
pub mod context;
pub mod observe_on;
pub mod on_error_resume_next;
pub mod on_error_return;
pub mod retry;
pub mod share;
pub mod subscribe_on;
